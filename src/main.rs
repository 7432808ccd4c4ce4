use lotta::cli::Args;
use lotta::config::{PathConfig, PlayerSettings};
use lotta::core::event_bus::{EventBus, downcast_event};
use lotta::core::events::{AnimationFinishedEvent, AnimationLoadedEvent};
use lotta::core::player::AnimationPlayer;
use lotta::entities::SolidEngine;

use anyhow::{Context, Result, bail};
use clap::Parser;
use glam::{Affine2, Vec2};
use log::{debug, info, warn};
use std::sync::Arc;

fn init_logging(args: &Args, path_config: &PathConfig) -> Result<()> {
    // 0 (default) = warn, 1 (-v) = info, 2 (-vv) = debug, 3+ (-vvv) = trace
    let log_level = match args.verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    if let Some(log_path_opt) = &args.log_file {
        let log_path = log_path_opt
            .clone()
            .unwrap_or_else(|| path_config.config_file("lotta.log"));
        let file = std::fs::File::create(&log_path)
            .with_context(|| format!("Failed to create log file: {}", log_path.display()))?;

        env_logger::Builder::new()
            .filter_level(log_level)
            .format_timestamp_millis()
            .target(env_logger::Target::Pipe(Box::new(file)))
            .init();
        info!("Logging to file: {} (level: {:?})", log_path.display(), log_level);
    } else {
        // Respects RUST_LOG if set
        let default_level = match args.verbosity {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
            .format_timestamp_millis()
            .init();
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    let path_config = PathConfig::from_env_and_cli(args.config_dir.clone());

    if let Err(e) = path_config.ensure_dirs() {
        eprintln!("Warning: Failed to create config directory: {}", e);
    }
    init_logging(&args, &path_config)?;

    info!("lotta {} starting", env!("CARGO_PKG_VERSION"));
    debug!("Command-line args: {:?}", args);

    let settings_path = path_config.settings_file();
    info!("Config path: {}", settings_path.display());
    let mut settings = match PlayerSettings::load_or_default(&settings_path) {
        Ok(s) => s,
        Err(e) => {
            warn!("{:#}, using defaults", e);
            PlayerSettings::default()
        }
    };
    args.apply_to(&mut settings);
    let settings = settings.sanitized();

    if args.save_config {
        settings.save(&settings_path)?;
        println!("Settings written to {}", settings_path.display());
        return Ok(());
    }

    let Some(input) = args.input.as_deref() else {
        use clap::CommandFactory;
        let _ = Args::command().print_help();
        println!();
        return Ok(());
    };

    let bus = EventBus::new();
    bus.subscribe::<AnimationFinishedEvent, _>(|_| info!("Animation finished"));

    let cache_enabled = settings.frame_cache_enabled;
    let mut player =
        AnimationPlayer::new(Arc::new(SolidEngine), settings).with_events(bus.emitter());
    if !player.load(input) {
        bail!("Failed to load animation: {}", input);
    }
    println!(
        "{}: {} frames, {:.2}s, markers: [{}]",
        input,
        player.total_frames(),
        player.duration(),
        player.marker_names().join(", ")
    );

    if let Some(scale) = args.scale {
        player.set_screen_transform(Affine2::from_scale(Vec2::splat(scale)));
    }
    if let Some((begin, end)) = args.segment_range() {
        player.set_segment(begin, end);
    }
    if let Some(marker) = &args.marker
        && !player.select_marker(marker)
    {
        warn!("Unknown marker '{}'", marker);
    }
    if let Some(frame) = args.frame {
        player.seek(frame);
    }

    // Simulated playback
    let fps = args.fps.max(1.0);
    let ticks = (args.time * fps).ceil() as u32;
    let mut redraws = 0u32;
    for _ in 0..ticks {
        if player.tick(1.0 / fps).redraw {
            redraws += 1;
        }
    }
    player.pause();
    player.tick(0.0);
    player.render_static();

    for event in bus.poll() {
        if let Some(AnimationLoadedEvent(ok)) = downcast_event::<AnimationLoadedEvent>(&event) {
            debug!("Loaded event: {}", ok);
        }
    }
    println!(
        "frame {:.2} @ {} after {} tick(s), {} redraw(s)",
        player.frame(),
        player.render_size(),
        ticks,
        redraws
    );
    if cache_enabled {
        let stats = player.frame_cache().stats();
        info!(
            "Frame cache: {} frames, {} hits / {} misses ({:.0}%)",
            player.frame_cache().len(),
            stats.hits(),
            stats.misses(),
            stats.hit_rate() * 100.0
        );
    }

    if let Some(output) = &args.output {
        let image = player
            .current_image()
            .and_then(|img| img.to_rgba_image())
            .context("No frame to write")?;
        image
            .save(output)
            .with_context(|| format!("Failed to write {}", output.display()))?;
        println!("Wrote {}", output.display());
    }
    Ok(())
}

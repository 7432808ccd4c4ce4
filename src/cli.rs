use clap::Parser;
use std::path::PathBuf;

use crate::config::PlayerSettings;
use crate::entities::frame::Size;

// Build version with engine info
const VERSION_INFO: &str = const_format::concatcp!(
    env!("CARGO_PKG_VERSION"), "\n",
    "Engine: solid (headless reference)\n",
    "Target: ", std::env::consts::ARCH, "-", std::env::consts::OS
);

/// Headless vector animation player: plays a scene and writes the presented frame
#[derive(Parser, Debug)]
#[command(author, version = VERSION_INFO, about, long_about = None)]
pub struct Args {
    /// Animation to load (Lottie JSON)
    #[arg(value_name = "FILE")]
    pub input: Option<String>,

    /// Write the presented frame as PNG
    #[arg(short = 'o', long = "output", value_name = "PNG")]
    pub output: Option<PathBuf>,

    /// Seek to this frame before rendering
    #[arg(long = "frame", value_name = "N")]
    pub frame: Option<f32>,

    /// Play for this many seconds of simulated time
    #[arg(short = 't', long = "time", value_name = "SECONDS", default_value_t = 0.0)]
    pub time: f32,

    /// Tick rate while playing
    #[arg(long = "fps", value_name = "FPS", default_value_t = 60.0)]
    pub fps: f32,

    /// Box size, e.g. 512x512
    #[arg(short = 's', long = "size", value_name = "WxH", value_parser = parse_size)]
    pub size: Option<Size>,

    /// On-screen scale (drives dynamic resolution)
    #[arg(long = "scale", value_name = "FACTOR")]
    pub scale: Option<f32>,

    /// Playback speed multiplier
    #[arg(long = "speed", value_name = "X")]
    pub speed: Option<f32>,

    /// Play range [START, END) in frames
    #[arg(long = "segment", value_names = ["START", "END"], num_args = 2)]
    pub segment: Option<Vec<f32>>,

    /// Play a named marker range
    #[arg(short = 'm', long = "marker", value_name = "NAME")]
    pub marker: Option<String>,

    /// Disable looping
    #[arg(long = "once")]
    pub once: bool,

    /// Render on the calling thread instead of a worker
    #[arg(long = "inline")]
    pub inline: bool,

    /// Enable the frame cache
    #[arg(long = "cache")]
    pub cache: bool,

    /// Write the effective settings to the config directory and exit
    #[arg(long = "save-config")]
    pub save_config: bool,

    /// Enable debug logging to file (default: lotta.log)
    #[arg(short = 'l', long = "log", value_name = "LOG_FILE")]
    pub log_file: Option<Option<PathBuf>>,

    /// Increase logging verbosity (default: warn, -v: info, -vv: debug, -vvv+: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbosity: u8,

    /// Custom configuration directory (overrides default platform paths)
    #[arg(short = 'c', long = "config-dir", value_name = "DIR")]
    pub config_dir: Option<PathBuf>,
}

impl Args {
    /// Overlay command line flags on loaded settings
    pub fn apply_to(&self, settings: &mut PlayerSettings) {
        if let Some(size) = self.size {
            settings.box_size = size;
        }
        if let Some(speed) = self.speed {
            settings.speed = speed;
        }
        if self.once {
            settings.looping = false;
        }
        if self.inline {
            settings.threaded = false;
        }
        if self.cache {
            settings.frame_cache_enabled = true;
        }
        // Headless runs start paused unless asked to play
        settings.autoplay = self.time > 0.0;
    }

    /// Start/end pair from `--segment`
    pub fn segment_range(&self) -> Option<(f32, f32)> {
        match self.segment.as_deref() {
            Some([begin, end]) => Some((*begin, *end)),
            _ => None,
        }
    }
}

/// Parse "WxH" (also "W" for a square)
pub fn parse_size(s: &str) -> Result<Size, String> {
    let s = s.trim().to_ascii_lowercase();
    let (w, h) = match s.split_once('x') {
        Some((w, h)) => (w, h),
        None => (s.as_str(), s.as_str()),
    };
    let w: u32 = w.trim().parse().map_err(|_| format!("bad width in '{}'", s))?;
    let h: u32 = h.trim().parse().map_err(|_| format!("bad height in '{}'", s))?;
    if w == 0 || h == 0 {
        return Err(format!("size must be non-zero: '{}'", s));
    }
    Ok(Size::new(w, h))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("640x360"), Ok(Size::new(640, 360)));
        assert_eq!(parse_size("256"), Ok(Size::new(256, 256)));
        assert_eq!(parse_size(" 32X16 "), Ok(Size::new(32, 16)));
        assert!(parse_size("0x10").is_err());
        assert!(parse_size("axb").is_err());
    }

    #[test]
    fn test_flags_override_settings() {
        let args = Args::parse_from([
            "lotta", "anim.json", "--size", "128x64", "--once", "--inline", "--segment", "10", "40",
        ]);
        let mut settings = PlayerSettings::default();
        args.apply_to(&mut settings);
        assert_eq!(settings.box_size, Size::new(128, 64));
        assert!(!settings.looping);
        assert!(!settings.threaded);
        assert!(!settings.autoplay);
        assert_eq!(args.segment_range(), Some((10.0, 40.0)));
        assert_eq!(args.input.as_deref(), Some("anim.json"));
    }

    #[test]
    fn test_verbosity_counts() {
        let args = Args::parse_from(["lotta", "-vv", "-t", "1.5"]);
        assert_eq!(args.verbosity, 2);
        assert_eq!(args.time, 1.5);
        assert!(args.input.is_none());
    }
}

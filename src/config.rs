//! Player settings and config file locations
//!
//! `PlayerSettings` is the serde-backed settings block (`lotta.json`).
//! Missing fields fall back to defaults, so old or partial files keep loading.
//!
//! Config directory priority:
//! 1. CLI `--config-dir`
//! 2. `LOTTA_CONFIG_DIR` environment variable
//! 3. Local folder IF a config file exists there (`lotta.json`, `lotta.log`)
//! 4. Platform config directory from dirs-next
//!
//! Platform paths:
//! - Linux: ~/.config/lotta/{name}
//! - macOS: ~/Library/Application Support/lotta/{name}
//! - Windows: %APPDATA%\lotta\{name}

use anyhow::{Context, Result};
use log::{debug, info};
use std::path::{Path, PathBuf};

use crate::convert::PostProcess;
use crate::core::cache_man::MIN_BUDGET_MB;
use crate::entities::frame::Size;

/// Settings file name
pub const SETTINGS_FILE: &str = "lotta.json";
/// Environment override for the config directory
pub const CONFIG_DIR_ENV: &str = "LOTTA_CONFIG_DIR";

/// Player settings
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct PlayerSettings {
    // Playback
    pub autoplay: bool,
    pub looping: bool,
    pub speed: f32,

    // Threading
    pub threaded: bool,

    // Resolution
    pub box_size: Size,
    pub dynamic_resolution: bool,
    pub resolution_threshold: f32, // relative, 0.01-1.0
    pub resize_min_interval: f64,  // seconds
    pub max_render_size: Size,

    // Frame cache
    pub frame_cache_enabled: bool,
    pub frame_cache_budget_mb: usize, // >= 16
    pub frame_cache_step: u32,        // >= 1
    pub live_cache_threshold: usize,  // instances of one source before caching while playing
    pub live_cache_force: bool,

    // Presentation
    pub post_process: PostProcess,
    pub texture_ring_size: usize,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            autoplay: true,
            looping: true,
            speed: 1.0,
            threaded: true,
            box_size: Size::new(512, 512),
            dynamic_resolution: true,
            resolution_threshold: 0.15,
            resize_min_interval: 0.10,
            max_render_size: Size::new(4096, 4096),
            frame_cache_enabled: false,
            frame_cache_budget_mb: 256,
            frame_cache_step: 1,
            live_cache_threshold: 4,
            live_cache_force: false,
            post_process: PostProcess::default(),
            texture_ring_size: 2,
        }
    }
}

impl PlayerSettings {
    /// Clamp fields to their valid ranges
    pub fn sanitized(mut self) -> Self {
        self.speed = if self.speed.is_finite() { self.speed.max(0.0) } else { 1.0 };
        self.resolution_threshold = if self.resolution_threshold.is_nan() {
            0.15
        } else {
            self.resolution_threshold.clamp(0.01, 1.0)
        };
        self.resize_min_interval = self.resize_min_interval.max(0.0);
        self.frame_cache_budget_mb = self.frame_cache_budget_mb.max(MIN_BUDGET_MB);
        self.frame_cache_step = self.frame_cache_step.max(1);
        self.live_cache_threshold = self.live_cache_threshold.max(1);
        self.texture_ring_size = self.texture_ring_size.max(2);
        self
    }

    /// Load from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings: {}", path.display()))?;
        let settings: PlayerSettings = serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse settings: {}", path.display()))?;
        debug!("Settings loaded from {}", path.display());
        Ok(settings.sanitized())
    }

    /// Load from `path` if it exists, defaults otherwise
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            info!("No settings at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Save as pretty JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize settings")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write settings: {}", path.display()))?;
        debug!("Settings saved to {}", path.display());
        Ok(())
    }
}

/// Configuration for overriding default paths
#[derive(Debug, Clone, Default)]
pub struct PathConfig {
    /// Custom config directory (from CLI or ENV)
    pub config_dir: Option<PathBuf>,
}

impl PathConfig {
    /// Priority: CLI args -> ENV var -> None (use defaults)
    pub fn from_env_and_cli(cli_dir: Option<PathBuf>) -> Self {
        let config_dir = cli_dir.or_else(|| std::env::var(CONFIG_DIR_ENV).ok().map(PathBuf::from));
        Self { config_dir }
    }

    /// Path to a file in the config directory
    pub fn config_file(&self, name: &str) -> PathBuf {
        self.config_dir().join(name)
    }

    /// Settings file path
    pub fn settings_file(&self) -> PathBuf {
        self.config_file(SETTINGS_FILE)
    }

    /// Create the config directory if missing
    pub fn ensure_dirs(&self) -> Result<()> {
        let dir = self.config_dir();
        if !dir.exists() {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;
        }
        Ok(())
    }

    pub fn config_dir(&self) -> PathBuf {
        if let Some(dir) = &self.config_dir {
            return dir.clone();
        }
        if let Ok(current_dir) = std::env::current_dir()
            && has_local_config_files(&current_dir)
        {
            return current_dir;
        }
        if let Some(dir) = dirs_next::config_dir() {
            return dir.join("lotta");
        }
        PathBuf::from(".")
    }
}

fn has_local_config_files(dir: &Path) -> bool {
    [SETTINGS_FILE, "lotta.log"].iter().any(|f| dir.join(f).exists())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_file_with_custom_dir() {
        let config = PathConfig {
            config_dir: Some(PathBuf::from("/custom")),
        };
        assert_eq!(config.settings_file(), PathBuf::from("/custom/lotta.json"));
    }

    #[test]
    fn test_cli_overrides_env() {
        let config = PathConfig::from_env_and_cli(Some(PathBuf::from("/from-cli")));
        assert_eq!(config.config_dir(), PathBuf::from("/from-cli"));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let s: PlayerSettings = serde_json::from_str(r#"{"threaded": false, "frame_cache_step": 0}"#).unwrap();
        assert!(!s.threaded);
        assert!(s.looping);
        let s = s.sanitized();
        assert_eq!(s.frame_cache_step, 1);
        assert_eq!(s.box_size, Size::new(512, 512));
    }

    #[test]
    fn test_sanitize_ranges() {
        let s = PlayerSettings {
            resolution_threshold: 7.0,
            frame_cache_budget_mb: 1,
            texture_ring_size: 0,
            speed: -2.0,
            ..PlayerSettings::default()
        }
        .sanitized();
        assert_eq!(s.resolution_threshold, 1.0);
        assert_eq!(s.frame_cache_budget_mb, 16);
        assert_eq!(s.texture_ring_size, 2);
        assert_eq!(s.speed, 0.0);
    }

    #[test]
    fn test_save_load_file() {
        let dir = std::env::temp_dir().join(format!("lotta_cfg_{}", std::process::id()));
        let config = PathConfig {
            config_dir: Some(dir.clone()),
        };
        config.ensure_dirs().unwrap();

        let settings = PlayerSettings {
            speed: 2.0,
            live_cache_force: true,
            ..PlayerSettings::default()
        };
        settings.save(&config.settings_file()).unwrap();
        let loaded = PlayerSettings::load_or_default(&config.settings_file()).unwrap();
        assert_eq!(loaded, settings);

        assert!(PlayerSettings::load_or_default(&dir.join("missing.json")).is_ok());
        let _ = std::fs::remove_dir_all(&dir);
    }
}

use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{LazyLock, RwLock};
use std::time::Duration;

pub const CURRENT_VERSION: u32 = 1;
const SETTINGS_FILENAME: &str = "config.yaml";
const APP_NAME: &str = "folio";
const MIN_TIMER_MS: u64 = 1;

/// Heuristics for deciding when a block has been read
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingSettings {
    /// Floor on the dwell time required to count a block as read
    pub min_viewing_time_ms: u64,
    pub reading_speed_wpm: u32,
    /// Fraction of the block's area that must be on screen
    pub visibility_threshold: f32,
    /// How often still-visible blocks are checked against their dwell threshold
    pub sweep_interval_ms: u64,
    /// Largest page jump from the furthest confirmed block that still counts
    pub max_page_distance: usize,
    /// Minimum spacing between two persisted progress writes
    pub persist_throttle_ms: u64,
}

impl Default for TrackingSettings {
    fn default() -> Self {
        Self {
            min_viewing_time_ms: 4000,
            reading_speed_wpm: 250,
            visibility_threshold: 0.5,
            sweep_interval_ms: 2000,
            max_page_distance: 2,
            persist_throttle_ms: 3000,
        }
    }
}

impl TrackingSettings {
    pub fn min_viewing_time(&self) -> Duration {
        Duration::from_millis(self.min_viewing_time_ms)
    }

    /// Never zero, so a timer re-armed on firing always moves forward
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms.max(MIN_TIMER_MS))
    }

    pub fn persist_throttle(&self) -> Duration {
        Duration::from_millis(self.persist_throttle_ms.max(MIN_TIMER_MS))
    }
}

/// Page windowing and rendering
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowSettings {
    /// Pages kept mounted on each side of the visible range
    pub overscan: usize,
    /// Page height at zoom 1.0 before the real size is known
    pub standard_page_height: f64,
    pub render_workers: usize,
    /// Rendered pages kept after they leave the window
    pub content_cache_size: usize,
}

impl Default for WindowSettings {
    fn default() -> Self {
        Self {
            overscan: 2,
            standard_page_height: 1100.0,
            render_workers: 2,
            content_cache_size: 16,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default)]
    pub tracking: TrackingSettings,

    #[serde(default)]
    pub window: WindowSettings,
}

fn default_version() -> u32 {
    CURRENT_VERSION
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            tracking: TrackingSettings::default(),
            window: WindowSettings::default(),
        }
    }
}

static SETTINGS: LazyLock<RwLock<Settings>> = LazyLock::new(|| RwLock::new(Settings::default()));

fn preferred_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|config| config.join(APP_NAME).join(SETTINGS_FILENAME))
}

pub fn load_settings() {
    let Some(path) = preferred_config_path() else {
        warn!("Could not determine config directory, using default settings");
        return;
    };
    if path.exists() {
        load_settings_from_path(&path);
    } else {
        info!("Settings file not found, creating with defaults at {path:?}");
        if let Ok(settings) = SETTINGS.read() {
            save_settings_to_file(&settings, &path);
        }
    }
}

pub fn load_settings_from_path(path: &Path) {
    match read_settings(path) {
        Some(settings) => {
            if let Ok(mut global) = SETTINGS.write() {
                *global = settings;
            }
        }
        None => warn!("Keeping current settings after failed load of {path:?}"),
    }
}

/// Parse a settings file, migrating it in place if it is from an older version
pub fn read_settings(path: &Path) -> Option<Settings> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            error!("Failed to read settings file {path:?}: {e}");
            return None;
        }
    };
    match serde_yaml::from_str::<Settings>(&content) {
        Ok(mut settings) => {
            debug!("Loaded settings from {path:?}");
            if settings.version < CURRENT_VERSION {
                migrate_settings(&mut settings);
                save_settings_to_file(&settings, path);
            }
            Some(settings)
        }
        Err(e) => {
            error!("Failed to parse settings file {path:?}: {e}");
            None
        }
    }
}

fn migrate_settings(settings: &mut Settings) {
    info!(
        "Migrating settings from v{} to v{}",
        settings.version, CURRENT_VERSION
    );
    settings.version = CURRENT_VERSION;
}

pub fn save_settings_to_file(settings: &Settings, path: &Path) {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            if let Err(e) = fs::create_dir_all(parent) {
                error!("Failed to create config directory {parent:?}: {e}");
                return;
            }
        }
    }

    let content = match serde_yaml::to_string(settings) {
        Ok(content) => content,
        Err(e) => {
            error!("Failed to serialize settings: {e}");
            return;
        }
    };

    match fs::write(path, content) {
        Ok(()) => debug!("Saved settings to {path:?}"),
        Err(e) => error!("Failed to save settings to {path:?}: {e}"),
    }
}

pub fn get_tracking() -> TrackingSettings {
    SETTINGS
        .read()
        .map(|s| s.tracking.clone())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(
            &path,
            "version: 1\ntracking:\n  reading_speed_wpm: 300\nwindow:\n  overscan: 4\n",
        )
        .unwrap();

        let settings = read_settings(&path).unwrap();
        assert_eq!(settings.tracking.reading_speed_wpm, 300);
        assert_eq!(settings.tracking.min_viewing_time_ms, 4000);
        assert_eq!(settings.window.overscan, 4);
        assert_eq!(settings.window.render_workers, 2);
    }

    #[test]
    fn old_version_is_migrated_and_rewritten() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "version: 0\n").unwrap();

        let settings = read_settings(&path).unwrap();
        assert_eq!(settings.version, CURRENT_VERSION);
        let rewritten = fs::read_to_string(&path).unwrap();
        assert!(rewritten.contains(&format!("version: {CURRENT_VERSION}")));
    }

    #[test]
    fn save_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.yaml");
        save_settings_to_file(&Settings::default(), &path);
        assert_eq!(read_settings(&path), Some(Settings::default()));
    }

    #[test]
    fn zero_intervals_are_clamped() {
        let tracking = TrackingSettings {
            sweep_interval_ms: 0,
            persist_throttle_ms: 0,
            ..TrackingSettings::default()
        };
        assert_eq!(tracking.sweep_interval(), Duration::from_millis(1));
        assert_eq!(tracking.persist_throttle(), Duration::from_millis(1));
        assert_eq!(
            TrackingSettings::default().sweep_interval(),
            Duration::from_millis(2000)
        );
    }

    #[test]
    fn garbage_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "tracking: [not, a, map]\n").unwrap();
        assert_eq!(read_settings(&path), None);
    }
}

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use mandelzoom_core::{Region, RenderConfig, Shape, Strategy};
use mandelzoom_render::{JuliaBatchSettings, DEFAULT_COLORMAP};

/// Persisted defaults for new sessions and batch jobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppPreferences {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    #[serde(default = "default_resolution")]
    pub width: u32,
    #[serde(default = "default_resolution")]
    pub height: u32,
    #[serde(default = "default_degree")]
    pub degree: u32,
    #[serde(default = "default_escape_threshold")]
    pub escape_threshold: f64,
    #[serde(default)]
    pub strategy: Strategy,
    #[serde(default = "default_region")]
    pub region: Region,

    /// Coloring identifier (`none`, `log`, `sqrt`, `hist`).
    #[serde(default = "default_coloring")]
    pub coloring: String,
    #[serde(default = "default_colormap")]
    pub colormap: String,
    #[serde(default = "default_cycles")]
    pub cycles: f64,

    /// How many previous regions `back` can return to.
    #[serde(default = "default_history_depth")]
    pub history_depth: usize,

    #[serde(default)]
    pub julia: JuliaBatchSettings,
    #[serde(default = "default_fps")]
    pub fps: u32,
}

fn default_max_iterations() -> u32 {
    RenderConfig::DEFAULT_MAX_ITERATIONS
}

fn default_resolution() -> u32 {
    RenderConfig::DEFAULT_RESOLUTION
}

fn default_degree() -> u32 {
    RenderConfig::DEFAULT_DEGREE
}

fn default_escape_threshold() -> f64 {
    RenderConfig::DEFAULT_ESCAPE_THRESHOLD
}

fn default_region() -> Region {
    Region::DEFAULT
}

fn default_coloring() -> String {
    "log".to_string()
}

fn default_colormap() -> String {
    DEFAULT_COLORMAP.to_string()
}

fn default_cycles() -> f64 {
    1.0
}

fn default_history_depth() -> usize {
    20
}

fn default_fps() -> u32 {
    mandelzoom_render::animate::DEFAULT_FPS
}

impl Default for AppPreferences {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            width: default_resolution(),
            height: default_resolution(),
            degree: default_degree(),
            escape_threshold: default_escape_threshold(),
            strategy: Strategy::default(),
            region: default_region(),
            coloring: default_coloring(),
            colormap: default_colormap(),
            cycles: default_cycles(),
            history_depth: default_history_depth(),
            julia: JuliaBatchSettings::default(),
            fps: default_fps(),
        }
    }
}

impl AppPreferences {
    /// Load preferences from next to the executable, falling back to defaults.
    pub fn load() -> Self {
        Self::load_from(&config_path())
    }

    /// Load from `path`. A missing or corrupt file yields defaults.
    pub fn load_from(path: &Path) -> Self {
        if path.exists() {
            match fs::read_to_string(path) {
                Ok(json) => match serde_json::from_str::<AppPreferences>(&json) {
                    Ok(prefs) => {
                        info!("Loaded preferences from {}", path.display());
                        return prefs;
                    }
                    Err(e) => {
                        error!("Failed to parse preferences: {e}");
                    }
                },
                Err(e) => {
                    error!("Failed to read preferences file: {e}");
                }
            }
        } else {
            debug!("No preferences file at {}", path.display());
        }
        Self::default()
    }

    /// Persist preferences next to the executable.
    pub fn save(&self) {
        self.save_to(&config_path());
    }

    pub fn save_to(&self, path: &Path) {
        if let Some(parent) = path.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                error!("Failed to create config directory: {e}");
                return;
            }
        }
        match serde_json::to_string_pretty(self) {
            Ok(json) => {
                if let Err(e) = fs::write(path, &json) {
                    error!("Failed to write preferences: {e}");
                } else {
                    debug!("Saved preferences");
                }
            }
            Err(e) => error!("Failed to serialize preferences: {e}"),
        }
    }

    /// Kernel configuration these preferences describe.
    pub fn render_config(&self) -> mandelzoom_core::Result<RenderConfig> {
        RenderConfig::new(
            Shape::new(self.height, self.width),
            self.max_iterations,
            self.degree,
            self.escape_threshold,
            self.strategy,
        )
    }
}

fn config_path() -> PathBuf {
    crate::app_dir::exe_directory().join("preferences.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let p = AppPreferences::default();
        assert_eq!(p.max_iterations, 100);
        assert_eq!((p.width, p.height), (800, 800));
        assert_eq!(p.escape_threshold, 2.0);
        assert_eq!(p.region, Region::DEFAULT);
        assert_eq!(p.strategy, Strategy::REFERENCE);
        assert_eq!(p.coloring, "log");
        assert_eq!(p.colormap, "RdPu_r");
        assert_eq!(p.cycles, 1.0);
        assert_eq!(p.history_depth, 20);
        assert_eq!(p.julia.sample_step, 80);
        assert!(p.render_config().is_ok());
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let p: AppPreferences =
            serde_json::from_str(r#"{"max_iterations": 300, "coloring": "hist"}"#).unwrap();
        assert_eq!(p.max_iterations, 300);
        assert_eq!(p.coloring, "hist");
        assert_eq!(p.width, 800);
        assert_eq!(p.colormap, "RdPu_r");
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = std::env::temp_dir().join("mandelzoom_test_prefs");
        let path = dir.join("preferences.json");
        let prefs = AppPreferences {
            degree: 3,
            cycles: 2.5,
            ..Default::default()
        };
        prefs.save_to(&path);
        assert_eq!(AppPreferences::load_from(&path), prefs);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn corrupt_file_uses_defaults() {
        let dir = std::env::temp_dir().join("mandelzoom_test_prefs_corrupt");
        let _ = std::fs::create_dir_all(&dir);
        let path = dir.join("preferences.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert_eq!(AppPreferences::load_from(&path), AppPreferences::default());
        let _ = std::fs::remove_dir_all(&dir);
    }
}

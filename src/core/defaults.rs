use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::paths;
use crate::preset::DEFAULT_PRESET;

/// Root configuration structure for mvgmvs.json
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MvgMvsConfig {
    #[serde(default)]
    pub defaults: Defaults,
}

/// All configurable defaults that can be overridden via mvgmvs.json
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Defaults {
    #[serde(default)]
    pub tools: ToolDirs,

    /// Extra folders searched for the tool binaries and the sensor database,
    /// after PATH, the executable's folder and the current directory.
    #[serde(default)]
    pub search_paths: Vec<String>,

    #[serde(default = "default_preset")]
    pub default_preset: String,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            tools: ToolDirs::default(),
            search_paths: Vec::new(),
            default_preset: default_preset(),
        }
    }
}

/// Tool folders. Any folder left unset is searched for.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ToolDirs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openmvg_bin: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub colmap_bin: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openmvs_bin: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensor_db_dir: Option<String>,
}

impl ToolDirs {
    /// Fill every unset folder from `fallback`.
    pub fn or(self, fallback: &ToolDirs) -> ToolDirs {
        ToolDirs {
            openmvg_bin: self.openmvg_bin.or_else(|| fallback.openmvg_bin.clone()),
            colmap_bin: self.colmap_bin.or_else(|| fallback.colmap_bin.clone()),
            openmvs_bin: self.openmvs_bin.or_else(|| fallback.openmvs_bin.clone()),
            sensor_db_dir: self.sensor_db_dir.or_else(|| fallback.sensor_db_dir.clone()),
        }
    }
}

fn default_preset() -> String {
    DEFAULT_PRESET.to_string()
}

/// Expand `~` and `$VAR` in a configured path.
pub fn expand_path(raw: &str) -> PathBuf {
    let expanded = shellexpand::full(raw)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| raw.to_string());
    PathBuf::from(expanded)
}

// =============================================================================
// Loading functions
// =============================================================================

/// Load defaults, merging file config with built-in defaults.
/// If mvgmvs.json is missing or invalid, silently returns built-in defaults.
pub fn load_defaults() -> Defaults {
    load_config().defaults
}

/// Load the full mvgmvs.json config, falling back to defaults on any error.
pub fn load_config() -> MvgMvsConfig {
    let path = match paths::mvgmvs_json() {
        Ok(path) => path,
        Err(_) => return MvgMvsConfig::default(),
    };

    if !path.exists() {
        return MvgMvsConfig::default();
    }

    match load_config_from(&path) {
        Ok(config) => config,
        Err(err) => {
            crate::log_status!("config", "Ignoring {}: {}", path.display(), err.details);
            MvgMvsConfig::default()
        }
    }
}

/// Load config from an explicit file.
pub fn load_config_from(path: &Path) -> crate::Result<MvgMvsConfig> {
    let content = fs::read_to_string(path).map_err(|e| {
        crate::Error::internal_io(e.to_string(), Some(format!("read {}", path.display())))
    })?;

    serde_json::from_str(&content)
        .map_err(|e| crate::Error::config_invalid_json(path.display().to_string(), e))
}

/// Get the path to mvgmvs.json (for display purposes)
pub fn config_path() -> crate::Result<String> {
    Ok(paths::mvgmvs_json()?.display().to_string())
}

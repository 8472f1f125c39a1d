//! Run configuration.
//!
//! [`AppConfig`] holds paths, file naming, the time-axis policy, plot size and
//! the experiment [`Registry`]. Every field has a default matching the Phase II
//! Cohort B export tree, so an empty TOML file (or none at all) is valid.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::data::registry::Registry;
use crate::data::trace::TimeAxisMode;
use crate::error::ErgError;

/// Looked up in the working directory when no `--config` is given.
pub const DEFAULT_CONFIG_FILE: &str = "erg-extract.toml";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    /// Root of the export tree; timepoint folders live directly below it.
    pub base_folder: PathBuf,

    /// Marker CSV output path.
    pub markers_csv: PathBuf,

    /// Directory trace images are written to. Created if missing.
    pub traces_dir: PathBuf,

    /// First word of every export file name (`"Rabbit 13080 DA.json"`).
    pub subject_prefix: String,

    /// Export file extension, without the dot.
    pub extension: String,

    pub time_axis: TimeAxisMode,

    /// Default log filter; `RUST_LOG` takes precedence.
    pub log_level: String,

    pub plot: PlotConfig,

    pub registry: Registry,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            base_folder: PathBuf::from("Data/Data Phase II Cohort B/All .esp6 Files"),
            markers_csv: PathBuf::from("Data/markers.csv"),
            traces_dir: PathBuf::from("Traces"),
            subject_prefix: "Rabbit".to_string(),
            extension: "json".to_string(),
            time_axis: TimeAxisMode::Nominal,
            log_level: "info".to_string(),
            plot: PlotConfig::default(),
            registry: Registry::cohort_b(),
        }
    }
}

/// Trace image size in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlotConfig {
    pub width: u32,
    pub height: u32,
}

impl Default for PlotConfig {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
        }
    }
}

impl AppConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ErgError> {
        let cfg: AppConfig =
            toml::from_str(text).map_err(|e| ErgError::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_file(path: &Path) -> Result<Self, ErgError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ErgError::Config(format!("reading {}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Explicit path, else [`DEFAULT_CONFIG_FILE`] in the working directory
    /// if present. `None` means built-in defaults.
    pub fn locate(explicit: Option<&Path>) -> Option<PathBuf> {
        match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => {
                let local = Path::new(DEFAULT_CONFIG_FILE);
                local.is_file().then(|| local.to_path_buf())
            }
        }
    }

    /// Load from the located file, or defaults when there is none.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ErgError> {
        match Self::locate(explicit) {
            Some(path) => Self::from_file(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ErgError> {
        if self.extension.is_empty() || self.extension.starts_with('.') {
            return Err(ErgError::Config(format!(
                "extension must be given without a leading dot, got '{}'",
                self.extension
            )));
        }
        if self.plot.width == 0 || self.plot.height == 0 {
            return Err(ErgError::Config("plot size must be non-zero".to_string()));
        }
        self.registry.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let cfg = AppConfig::from_toml_str("").unwrap();
        assert_eq!(cfg, AppConfig::default());
        assert_eq!(cfg.time_axis, TimeAxisMode::Nominal);
    }

    #[test]
    fn partial_override() {
        let cfg = AppConfig::from_toml_str(
            r#"
            base_folder = "/data/erg"
            time_axis = "declared"

            [plot]
            width = 1024
            "#,
        )
        .unwrap();
        assert_eq!(cfg.base_folder, PathBuf::from("/data/erg"));
        assert_eq!(cfg.time_axis, TimeAxisMode::Declared);
        assert_eq!(cfg.plot.width, 1024);
        assert_eq!(cfg.plot.height, 600);
        assert_eq!(cfg.subject_prefix, "Rabbit");
    }

    #[test]
    fn custom_registry() {
        let cfg = AppConfig::from_toml_str(
            r#"
            [[registry.timepoints]]
            name = "Baseline"
            folder = "base"

            [[registry.groups]]
            name = "Control"
            subjects = [1, 2]

            [[registry.steps.da]]
            label = "DA 0.01 cd.s/m2"
            index = 1

            [[registry.steps.la]]
            label = "LA 3 cd.s/m2 30 Hz Flicker"
            index = 1
            "#,
        )
        .unwrap();
        assert_eq!(cfg.registry.folder_for("Baseline").unwrap(), "base");
        assert_eq!(cfg.registry.groups()[0].subjects, vec![1, 2]);
    }

    #[test]
    fn rejects_overlapping_groups() {
        let err = AppConfig::from_toml_str(
            r#"
            [[registry.timepoints]]
            name = "Baseline"
            folder = "base"

            [[registry.groups]]
            name = "A"
            subjects = [1, 2]

            [[registry.groups]]
            name = "B"
            subjects = [2, 3]

            [[registry.steps.da]]
            label = "DA 1 cd"
            index = 1

            [[registry.steps.la]]
            label = "LA 1 cd"
            index = 1
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ErgError::InvalidRegistry(_)));
    }

    #[test]
    fn rejects_bad_values() {
        assert!(AppConfig::from_toml_str("extension = \".json\"").is_err());
        assert!(AppConfig::from_toml_str("time_axis = \"linear\"").is_err());
        assert!(AppConfig::from_toml_str("[plot]\nheight = 0").is_err());
    }

    #[test]
    fn rejects_misspelled_keys() {
        let err = AppConfig::from_toml_str("time_axes = \"declared\"").unwrap_err();
        assert!(matches!(&err, ErgError::Config(msg) if msg.contains("time_axes")));
        assert!(AppConfig::from_toml_str("[plot]\nwidht = 1024").is_err());
    }

    #[test]
    fn reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.toml");
        std::fs::write(&path, "traces_dir = \"out/traces\"").unwrap();
        let cfg = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(cfg.traces_dir, PathBuf::from("out/traces"));

        assert!(AppConfig::load(Some(&dir.path().join("missing.toml"))).is_err());
    }
}

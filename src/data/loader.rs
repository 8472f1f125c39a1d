use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use log::debug;
use serde_json::Value as JsonValue;

use super::model::{Recording, RecordingPair};
use super::registry::{Protocol, Registry};
use crate::error::ErgError;

// ---------------------------------------------------------------------------
// RecordingSource – the file-format collaborator
// ---------------------------------------------------------------------------

/// Anything that can turn an export file path into a parsed [`Recording`].
pub trait RecordingSource {
    fn load_file(&self, path: &Path) -> Result<Recording>;
}

/// Reads the parser's output dumped to disk.  Dispatch by extension.
///
/// Supported formats:
/// * `.json` – either the recording object itself, or the parser's full
///   result tuple as an array whose element 1 is the recording
#[derive(Debug, Clone, Copy, Default)]
pub struct ExportFileSource;

impl RecordingSource for ExportFileSource {
    fn load_file(&self, path: &Path) -> Result<Recording> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();

        match ext.as_str() {
            "json" => load_json(path),
            other => bail!("Unsupported export file extension: .{other}"),
        }
    }
}

// ---------------------------------------------------------------------------
// JSON loader
// ---------------------------------------------------------------------------

/// Expected JSON schema (step and channel keys are 1-based integers):
///
/// ```json
/// {
///   "markers": { "1": [ {"chan": 1, "eye": "OD", "name": "a", "amp": -21.3, "time": 14.5} ] },
///   "data": { "1": { "channels": { "1": { "results": { "1":
///       { "data": { "start": -20.0, "delta": 0.5, "values": [ ... ] } } } } } } }
/// }
/// ```
fn load_json(path: &Path) -> Result<Recording> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let root: JsonValue = serde_json::from_str(&text).context("parsing JSON")?;

    let recording = match root {
        JsonValue::Array(mut items) => {
            if items.len() < 2 {
                bail!(
                    "Expected the parser result tuple to have at least 2 elements, got {}",
                    items.len()
                );
            }
            items.swap_remove(1)
        }
        obj @ JsonValue::Object(_) => obj,
        other => bail!("Expected a JSON object or array at top level, got {other}"),
    };

    serde_json::from_value(recording).context("unexpected recording structure")
}

// ---------------------------------------------------------------------------
// RecordingLoader – (subject, timepoint) → file pair
// ---------------------------------------------------------------------------

/// Resolves a visit to its DA/LA export files and loads both.
///
/// Nothing is cached; every call re-reads storage.
pub struct RecordingLoader<'a, S> {
    source: S,
    registry: &'a Registry,
    base_folder: PathBuf,
    subject_prefix: String,
    extension: String,
}

impl<'a, S: RecordingSource> RecordingLoader<'a, S> {
    pub fn new(
        source: S,
        registry: &'a Registry,
        base_folder: impl Into<PathBuf>,
        subject_prefix: impl Into<String>,
        extension: impl Into<String>,
    ) -> Self {
        RecordingLoader {
            source,
            registry,
            base_folder: base_folder.into(),
            subject_prefix: subject_prefix.into(),
            extension: extension.into(),
        }
    }

    #[cfg(test)]
    pub fn source(&self) -> &S {
        &self.source
    }

    /// `"Rabbit 13080 DA.json"`
    pub fn file_name(&self, subject: u32, protocol: Protocol) -> String {
        format!(
            "{} {subject} {protocol}.{}",
            self.subject_prefix, self.extension
        )
    }

    pub fn path_for(
        &self,
        subject: u32,
        timepoint: &str,
        protocol: Protocol,
    ) -> Result<PathBuf, ErgError> {
        let folder = self.registry.folder_for(timepoint)?;
        Ok(self
            .base_folder
            .join(folder)
            .join(self.file_name(subject, protocol)))
    }

    /// Load the DA and LA recordings of one visit.
    ///
    /// Any parser failure on either file becomes [`ErgError::LoadFailure`];
    /// an unregistered timepoint is [`ErgError::UnknownTimepoint`].
    pub fn load(&self, subject: u32, timepoint: &str) -> Result<RecordingPair, ErgError> {
        let da_path = self.path_for(subject, timepoint, Protocol::Da)?;
        let la_path = self.path_for(subject, timepoint, Protocol::La)?;

        let failure = |err: anyhow::Error| ErgError::LoadFailure {
            subject,
            timepoint: timepoint.to_string(),
            source: err.into(),
        };

        let da = self
            .source
            .load_file(&da_path)
            .with_context(|| format!("loading {}", da_path.display()))
            .map_err(failure)?;
        let la = self
            .source
            .load_file(&la_path)
            .with_context(|| format!("loading {}", la_path.display()))
            .map_err(failure)?;

        debug!(
            "subject {subject} {timepoint}: {} DA and {} LA markers",
            da.marker_count(),
            la.marker_count()
        );
        Ok(RecordingPair { da, la })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const RECORDING: &str = r#"{
        "markers": {"1": [{"chan": 1, "eye": "OD", "name": "a", "amp": -5.0, "time": 12.0}]},
        "data": {}
    }"#;

    fn loader<'a>(registry: &'a Registry, base: &Path) -> RecordingLoader<'a, ExportFileSource> {
        RecordingLoader::new(ExportFileSource, registry, base, "Rabbit", "json")
    }

    #[test]
    fn builds_paths_from_naming_convention() {
        let reg = Registry::cohort_b();
        let l = loader(&reg, Path::new("base"));
        assert_eq!(l.file_name(13080, Protocol::Da), "Rabbit 13080 DA.json");
        assert_eq!(
            l.path_for(13080, "Day 8", Protocol::La).unwrap(),
            Path::new("base")
                .join("Day 8 Phase II Cohort B (4.30.2024)")
                .join("Rabbit 13080 LA.json")
        );
        assert!(matches!(
            l.path_for(13080, "Day 9", Protocol::Da),
            Err(ErgError::UnknownTimepoint(_))
        ));
    }

    #[test]
    fn loads_both_halves() {
        let reg = Registry::cohort_b();
        let dir = tempfile::tempdir().unwrap();
        let folder = dir.path().join(reg.folder_for("Baseline").unwrap());
        fs::create_dir_all(&folder).unwrap();
        fs::write(folder.join("Rabbit 13076 DA.json"), RECORDING).unwrap();
        // LA half wrapped the way the parser returns it: (header, recording)
        fs::write(
            folder.join("Rabbit 13076 LA.json"),
            format!("[{{\"version\": 6}}, {RECORDING}]"),
        )
        .unwrap();

        let pair = loader(&reg, dir.path()).load(13076, "Baseline").unwrap();
        assert_eq!(pair.da.marker_count(), 1);
        assert_eq!(pair.la.marker_count(), 1);
    }

    #[test]
    fn missing_file_is_load_failure() {
        let reg = Registry::cohort_b();
        let dir = tempfile::tempdir().unwrap();
        let err = loader(&reg, dir.path()).load(13077, "Day 22").unwrap_err();
        match err {
            ErgError::LoadFailure { subject, timepoint, .. } => {
                assert_eq!(subject, 13077);
                assert_eq!(timepoint, "Day 22");
            }
            other => panic!("expected LoadFailure, got {other:?}"),
        }
    }

    #[test]
    fn malformed_file_is_load_failure() {
        let reg = Registry::cohort_b();
        let dir = tempfile::tempdir().unwrap();
        let folder = dir.path().join(reg.folder_for("Day 30").unwrap());
        fs::create_dir_all(&folder).unwrap();
        fs::write(folder.join("Rabbit 13078 DA.json"), RECORDING).unwrap();
        fs::write(folder.join("Rabbit 13078 LA.json"), r#"{"markers": {"1": 7}}"#).unwrap();

        let err = loader(&reg, dir.path()).load(13078, "Day 30").unwrap_err();
        assert!(err.is_recoverable());
    }

    #[test]
    fn rejects_unknown_extension() {
        let err = ExportFileSource
            .load_file(Path::new("Rabbit 1 DA.esp6"))
            .unwrap_err();
        assert!(err.to_string().contains(".esp6"));
    }

    #[test]
    fn rejects_short_tuple() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.json");
        fs::write(&path, "[{}]").unwrap();
        assert!(ExportFileSource.load_file(&path).is_err());
    }
}

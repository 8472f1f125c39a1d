use std::fs::File;
use std::io::Write;
use std::path::Path;

use serde::Serialize;

use crate::data::markers::MarkerRow;
use crate::error::ErgError;

/// Visit context prepended to every marker row.
#[derive(Debug, Clone, Copy)]
pub struct VisitContext<'a> {
    pub subject: u32,
    pub group: &'a str,
    pub timepoint: &'a str,
}

#[derive(Serialize)]
struct CsvRecord<'a> {
    #[serde(rename = "Subject")]
    subject: u32,
    #[serde(rename = "Group")]
    group: &'a str,
    #[serde(rename = "Timepoint")]
    timepoint: &'a str,
    #[serde(rename = "Step")]
    step: &'a str,
    #[serde(rename = "Condition")]
    condition: &'static str,
    #[serde(rename = "Chan")]
    chan: u32,
    #[serde(rename = "Eye")]
    eye: &'a str,
    #[serde(rename = "Marker")]
    marker: &'a str,
    #[serde(rename = "Amp")]
    amp: f64,
    #[serde(rename = "Time")]
    time: f64,
}

// ---------------------------------------------------------------------------
// MarkerCsvWriter
// ---------------------------------------------------------------------------

/// Appends marker rows to one CSV, in the order they are given. The header is
/// written on creation, so a run that loads nothing leaves a header-only file.
pub struct MarkerCsvWriter<W: Write> {
    writer: csv::Writer<W>,
    rows: usize,
}

impl MarkerCsvWriter<File> {
    pub fn create(path: &Path) -> Result<Self, ErgError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        Self::new(File::create(path)?)
    }
}

impl<W: Write> MarkerCsvWriter<W> {
    pub const HEADER: [&'static str; 10] = [
        "Subject",
        "Group",
        "Timepoint",
        "Step",
        "Condition",
        "Chan",
        "Eye",
        "Marker",
        "Amp",
        "Time",
    ];

    pub fn new(inner: W) -> Result<Self, ErgError> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(inner);
        writer.write_record(Self::HEADER)?;
        Ok(MarkerCsvWriter { writer, rows: 0 })
    }

    pub fn write_rows(&mut self, visit: VisitContext<'_>, rows: &[MarkerRow]) -> Result<(), ErgError> {
        for row in rows {
            self.writer.serialize(CsvRecord {
                subject: visit.subject,
                group: visit.group,
                timepoint: visit.timepoint,
                step: &row.step_label,
                condition: row.condition.as_str(),
                chan: row.channel,
                eye: &row.eye,
                marker: &row.marker_name,
                amp: row.amplitude,
                time: row.time,
            })?;
            self.rows += 1;
        }
        Ok(())
    }

    /// Number of marker rows written so far.
    pub fn rows_written(&self) -> usize {
        self.rows
    }

    pub fn flush(&mut self) -> Result<(), ErgError> {
        self.writer.flush()?;
        Ok(())
    }

    /// Flush and hand back the underlying writer.
    pub fn finish(self) -> Result<W, ErgError> {
        self.writer
            .into_inner()
            .map_err(|e| ErgError::Io(e.into_error()))
    }
}

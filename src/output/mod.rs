//! Output sinks: the marker CSV and per-eye trace images.

pub mod csv_sink;
pub mod plot;

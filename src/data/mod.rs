/// Data layer: experiment registry, loading, and extraction.
///
/// Architecture:
/// ```text
///  <base>/<timepoint folder>/Rabbit <id> DA.json
///  <base>/<timepoint folder>/Rabbit <id> LA.json
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  (subject, timepoint) → RecordingPair
///   └──────────┘
///        │            registry: timepoints, groups, step tables
///        ▼
///   ┌──────────┐   ┌──────────┐
///   │  markers  │   │  trace    │
///   └──────────┘   └──────────┘
///   MarkerRow       ExtractedTrace (µV, time axis, stimulus tag)
/// ```

pub mod loader;
pub mod markers;
pub mod model;
pub mod registry;
pub mod trace;

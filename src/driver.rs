use std::io::Write;

use anyhow::Result;
use log::{debug, info, warn};

use crate::data::loader::{RecordingLoader, RecordingSource};
use crate::data::markers::extract_all_markers;
use crate::data::model::{Eye, RecordingPair};
use crate::data::registry::{Protocol, Registry};
use crate::data::trace::{extract_protocol, TimeAxisMode};
use crate::error::ErgError;
use crate::output::csv_sink::{MarkerCsvWriter, VisitContext};
use crate::output::plot::TraceSink;

// ---------------------------------------------------------------------------
// RunSummary
// ---------------------------------------------------------------------------

/// What a run did. `outputs` counts CSV rows or images depending on the pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub visits_processed: usize,
    pub visits_skipped: usize,
    pub outputs: usize,
}

// ---------------------------------------------------------------------------
// Driver – groups → subjects → timepoints
// ---------------------------------------------------------------------------

/// Walks the roster in registry order, loading one visit at a time.
///
/// A visit whose files fail to load is logged and skipped; every other
/// error stops the run.
pub struct Driver<'a, S> {
    registry: &'a Registry,
    loader: &'a RecordingLoader<'a, S>,
    time_axis: TimeAxisMode,
}

impl<'a, S: RecordingSource> Driver<'a, S> {
    pub fn new(
        registry: &'a Registry,
        loader: &'a RecordingLoader<'a, S>,
        time_axis: TimeAxisMode,
    ) -> Self {
        Driver {
            registry,
            loader,
            time_axis,
        }
    }

    /// Call `f` with every visit that loads, in roster order.
    fn for_each_visit<F>(&self, mut f: F) -> Result<RunSummary>
    where
        F: FnMut(VisitContext<'_>, &RecordingPair) -> Result<usize>,
    {
        let mut summary = RunSummary::default();

        for group in self.registry.groups() {
            for &subject in &group.subjects {
                for tp in self.registry.timepoints() {
                    let pair = match self.loader.load(subject, &tp.name) {
                        Ok(pair) => pair,
                        Err(err) if err.is_recoverable() => {
                            warn!("{}, skipping", error_chain(&err));
                            summary.visits_skipped += 1;
                            continue;
                        }
                        Err(err) => return Err(err.into()),
                    };

                    let visit = VisitContext {
                        subject,
                        group: &group.name,
                        timepoint: &tp.name,
                    };
                    summary.outputs += f(visit, &pair)?;
                    summary.visits_processed += 1;
                    // `pair` dropped here; nothing is kept between visits.
                }
            }
        }

        Ok(summary)
    }

    /// Write every marker of every loadable visit to `csv`.
    pub fn export_markers<W: Write>(&self, csv: &mut MarkerCsvWriter<W>) -> Result<RunSummary> {
        let summary = self.for_each_visit(|visit, pair| {
            let rows = extract_all_markers(pair, self.registry)
                .map_err(|e| e.at(visit.subject, visit.timepoint))?;
            csv.write_rows(visit, &rows)?;
            debug!(
                "subject {} {}: {} marker rows",
                visit.subject,
                visit.timepoint,
                rows.len()
            );
            Ok(rows.len())
        })?;
        csv.flush()?;

        info!(
            "Markers: {} rows from {} visits ({} skipped)",
            summary.outputs, summary.visits_processed, summary.visits_skipped
        );
        Ok(summary)
    }

    /// Send both eyes of every step of every loadable visit to `sink`.
    pub fn export_traces<T: TraceSink>(&self, sink: &mut T) -> Result<RunSummary> {
        let summary = self.for_each_visit(|visit, pair| {
            let mut emitted = 0;
            for protocol in Protocol::ALL {
                let traces = extract_protocol(pair, self.registry, protocol, self.time_axis)
                    .map_err(|e| e.at(visit.subject, visit.timepoint))?;
                for trace in &traces {
                    for eye in Eye::BOTH {
                        sink.emit(visit.subject, visit.timepoint, trace, eye)?;
                        emitted += 1;
                    }
                }
            }
            Ok(emitted)
        })?;

        info!(
            "Traces: {} images from {} visits ({} skipped)",
            summary.outputs, summary.visits_processed, summary.visits_skipped
        );
        Ok(summary)
    }
}

/// `err` followed by each of its causes, `": "`-separated.
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut text = err.to_string();
    let mut cause = err.source();
    while let Some(inner) = cause {
        text.push_str(": ");
        text.push_str(&inner.to_string());
        cause = inner.source();
    }
    text
}

/// The domain error that stopped a run, if it was one.
pub fn fatal_cause(err: &anyhow::Error) -> Option<&ErgError> {
    err.downcast_ref::<ErgError>()
}

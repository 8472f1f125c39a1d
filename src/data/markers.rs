use super::model::RecordingPair;
use super::registry::{Protocol, Registry};
use crate::error::ConsistencyError;

/// One flattened marker, tagged with the step and protocol it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerRow {
    pub step_label: String,
    pub condition: Protocol,
    pub channel: u32,
    pub eye: String,
    pub marker_name: String,
    pub amplitude: f64,
    pub time: f64,
}

/// Flatten every marker of one protocol's steps into rows.
///
/// Steps are visited in step-table order and markers in recording order.
/// A step index missing from the recording fails the whole extraction rather
/// than leaving a silent gap in the output.
pub fn extract_markers(
    pair: &RecordingPair,
    registry: &Registry,
    protocol: Protocol,
) -> Result<Vec<MarkerRow>, ConsistencyError> {
    let recording = pair.get(protocol);
    let mut rows = Vec::new();

    for step in registry.steps_for(protocol) {
        let markers =
            recording
                .markers_at(step.index)
                .ok_or_else(|| ConsistencyError::StepNotFound {
                    protocol,
                    label: step.label.clone(),
                    index: step.index,
                })?;

        rows.extend(markers.iter().map(|m| MarkerRow {
            step_label: step.label.clone(),
            condition: protocol,
            channel: m.chan,
            eye: m.eye.clone(),
            marker_name: m.name.clone(),
            amplitude: m.amp,
            time: m.time,
        }));
    }

    Ok(rows)
}

/// DA rows followed by LA rows for one visit.
pub fn extract_all_markers(
    pair: &RecordingPair,
    registry: &Registry,
) -> Result<Vec<MarkerRow>, ConsistencyError> {
    let mut rows = extract_markers(pair, registry, Protocol::Da)?;
    rows.extend(extract_markers(pair, registry, Protocol::La)?);
    Ok(rows)
}

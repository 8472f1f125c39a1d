//! Waveform extraction: per-eye series of one stimulus step, rescaled to µV
//! and placed on a time axis, plus the stimulus classification used to name
//! and scale the plots.

use log::warn;
use serde::Deserialize;

use super::model::{Eye, Recording, RecordingPair, SampleSeries};
use super::registry::{Protocol, Registry, StimulusStep};
use crate::error::ConsistencyError;

/// Raw amplitude units per display unit (nV → µV).
pub const AMPLITUDE_DIVISOR: f64 = 1000.0;

/// Sample pitch assumed when building the time axis, ms.
pub const NOMINAL_PITCH_MS: f64 = 0.5;

const PITCH_TOLERANCE_MS: f64 = 1e-6;

/// Which sample pitch the time axis is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeAxisMode {
    /// Fixed [`NOMINAL_PITCH_MS`] regardless of what the series declares.
    #[default]
    Nominal,
    /// The OD series' own declared interval.
    Declared,
}

// ---------------------------------------------------------------------------
// Stimulus classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StimulusClass {
    /// Short tag: `"DA 0.01"`, `"CW 150"`, `"20 Hz Flicker"`.
    pub tag: String,
    pub is_flicker: bool,
}

/// Classify a step label.
///
/// The label must open with `DA`, `LA` or `CW`, a space and a number; that
/// prefix is the plain tag. For light-adapted steps a `NN Hz Flicker` run
/// anywhere in the label (the last one wins) replaces the tag and marks the
/// step as flicker.
pub fn classify_label(label: &str, protocol: Protocol) -> Result<StimulusClass, ConsistencyError> {
    let plain = plain_tag(label).ok_or_else(|| ConsistencyError::LabelFormat(label.to_string()))?;

    if protocol == Protocol::La {
        if let Some(tag) = flicker_tag(label) {
            return Ok(StimulusClass {
                tag: tag.to_string(),
                is_flicker: true,
            });
        }
    }

    Ok(StimulusClass {
        tag: plain.to_string(),
        is_flicker: false,
    })
}

/// `(DA|LA|CW) <digits><any char><digits>` at the start of the label,
/// trimmed. One trailing character after the first digit run is swallowed,
/// which is how `"DA 0.01"` keeps its fraction and `"CW 150 cd"` ends at the
/// space.
fn plain_tag(label: &str) -> Option<&str> {
    let rest = ["DA ", "LA ", "CW "]
        .iter()
        .find_map(|p| label.strip_prefix(p))?;
    let prefix_len = label.len() - rest.len();

    let int_len = leading_digits(rest);
    if int_len == 0 {
        return None;
    }

    let end = match rest[int_len..].chars().next() {
        Some(sep) => {
            let frac_start = int_len + sep.len_utf8();
            frac_start + leading_digits(&rest[frac_start..])
        }
        // Nothing after the digits: the last digit has to stand in for the
        // separator, so at least two are needed.
        None if int_len >= 2 => int_len,
        None => return None,
    };

    Some(label[..prefix_len + end].trim())
}

fn leading_digits(s: &str) -> usize {
    s.bytes().take_while(u8::is_ascii_digit).count()
}

/// Rightmost `NN Hz Flicker` in the label.
fn flicker_tag(label: &str) -> Option<&str> {
    const SUFFIX: &str = " Hz Flicker";
    label
        .rmatch_indices(SUFFIX)
        .find(|&(pos, _)| {
            pos >= 2 && label.as_bytes()[pos - 2..pos].iter().all(u8::is_ascii_digit)
        })
        .map(|(pos, _)| &label[pos - 2..pos + SUFFIX.len()])
}

/// Amplitude axis bounds (µV) for a protocol and stimulus kind.
pub fn display_range(protocol: Protocol, is_flicker: bool) -> (f64, f64) {
    match (protocol, is_flicker) {
        (Protocol::Da, _) => (-150.0, 250.0),
        (Protocol::La, false) => (-150.0, 75.0),
        (Protocol::La, true) => (-50.0, 75.0),
    }
}

// ---------------------------------------------------------------------------
// Trace extraction
// ---------------------------------------------------------------------------

/// One eye's waveform in display units.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceSeries {
    pub eye: Eye,
    pub amplitudes: Vec<f64>,
    /// Interval the recording declares for this series, ms.
    pub declared_interval: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedTrace {
    pub step_label: String,
    pub protocol: Protocol,
    pub stimulus: StimulusClass,
    /// Shared by both eyes; its length follows the OD series.
    pub time: Vec<f64>,
    pub od: TraceSeries,
    pub os: TraceSeries,
}

impl ExtractedTrace {
    pub fn series(&self, eye: Eye) -> &TraceSeries {
        match eye {
            Eye::Od => &self.od,
            Eye::Os => &self.os,
        }
    }

    pub fn display_range(&self) -> (f64, f64) {
        display_range(self.protocol, self.stimulus.is_flicker)
    }
}

/// `n` evenly spaced points starting at `start`, `pitch` apart.
pub fn time_axis(start: f64, n: usize, pitch: f64) -> Vec<f64> {
    (0..n).map(|i| start + pitch * i as f64).collect()
}

/// Raw amplitudes converted to display units.
pub fn rescale(values: &[f64]) -> Vec<f64> {
    values.iter().map(|v| v / AMPLITUDE_DIVISOR).collect()
}

/// Extract both eyes of one labelled step.
pub fn extract_trace(
    pair: &RecordingPair,
    registry: &Registry,
    protocol: Protocol,
    step_label: &str,
    mode: TimeAxisMode,
) -> Result<ExtractedTrace, ConsistencyError> {
    let step = registry
        .steps_for(protocol)
        .iter()
        .find(|s| s.label == step_label)
        .ok_or_else(|| ConsistencyError::UnknownStep {
            protocol,
            label: step_label.to_string(),
        })?;
    extract_step(pair, protocol, step, mode)
}

/// Every step of a protocol, in step-table order.
pub fn extract_protocol(
    pair: &RecordingPair,
    registry: &Registry,
    protocol: Protocol,
    mode: TimeAxisMode,
) -> Result<Vec<ExtractedTrace>, ConsistencyError> {
    registry
        .steps_for(protocol)
        .iter()
        .map(|step| extract_trace(pair, registry, protocol, &step.label, mode))
        .collect()
}

fn extract_step(
    pair: &RecordingPair,
    protocol: Protocol,
    step: &StimulusStep,
    mode: TimeAxisMode,
) -> Result<ExtractedTrace, ConsistencyError> {
    let stimulus = classify_label(&step.label, protocol)?;
    let recording = pair.get(protocol);

    if !recording.has_step(step.index) {
        return Err(ConsistencyError::StepNotFound {
            protocol,
            label: step.label.clone(),
            index: step.index,
        });
    }

    let od_raw = eye_series(recording, protocol, step, Eye::Od)?;
    let os_raw = eye_series(recording, protocol, step, Eye::Os)?;
    let od = TraceSeries {
        eye: Eye::Od,
        amplitudes: rescale(&od_raw.values),
        declared_interval: od_raw.delta,
    };
    let os = TraceSeries {
        eye: Eye::Os,
        amplitudes: rescale(&os_raw.values),
        declared_interval: os_raw.delta,
    };

    if od_raw.is_empty() {
        warn!("{protocol} step '{}' has no OD samples", step.label);
    }
    if (od.declared_interval - NOMINAL_PITCH_MS).abs() > PITCH_TOLERANCE_MS {
        warn!(
            "{protocol} step '{}' declares a {} ms interval, nominal pitch is {NOMINAL_PITCH_MS} ms",
            step.label, od.declared_interval
        );
    }
    if od.amplitudes.len() != os.amplitudes.len() {
        warn!(
            "{protocol} step '{}': {} has {} samples, {} has {}",
            step.label,
            od.eye,
            od.amplitudes.len(),
            os.eye,
            os.amplitudes.len()
        );
    }

    let pitch = match mode {
        TimeAxisMode::Nominal => NOMINAL_PITCH_MS,
        TimeAxisMode::Declared if od.declared_interval > 0.0 => od.declared_interval,
        TimeAxisMode::Declared => {
            warn!(
                "{protocol} step '{}' declares a non-positive interval ({} ms), using {NOMINAL_PITCH_MS} ms",
                step.label, od.declared_interval
            );
            NOMINAL_PITCH_MS
        }
    };

    Ok(ExtractedTrace {
        step_label: step.label.clone(),
        protocol,
        stimulus,
        time: time_axis(od_raw.start, od_raw.len(), pitch),
        od,
        os,
    })
}

fn eye_series<'r>(
    recording: &'r Recording,
    protocol: Protocol,
    step: &StimulusStep,
    eye: Eye,
) -> Result<&'r SampleSeries, ConsistencyError> {
    recording
        .series_at(step.index, eye.channel())
        .ok_or_else(|| ConsistencyError::ChannelNotFound {
            protocol,
            label: step.label.clone(),
            index: step.index,
            channel: eye.channel(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::{ChannelData, ResultEntry, StepData, PRIMARY_RESULT};

    fn series(start: f64, delta: f64, values: Vec<f64>) -> ChannelData {
        let mut ch = ChannelData::default();
        ch.results.insert(
            PRIMARY_RESULT,
            ResultEntry {
                data: SampleSeries {
                    start,
                    delta,
                    values,
                },
            },
        );
        ch
    }

    fn recording(registry: &Registry, protocol: Protocol, delta: f64) -> Recording {
        let mut rec = Recording::default();
        for step in registry.steps_for(protocol) {
            let mut data = StepData::default();
            let od: Vec<f64> = (0..9).map(|i| (i as f64 - 4.0) * 12_345.0).collect();
            let os: Vec<f64> = od.iter().map(|v| -v).collect();
            data.channels.insert(1, series(-20.0, delta, od));
            data.channels.insert(2, series(-20.0, delta, os));
            rec.data.insert(step.index, data);
        }
        rec
    }

    fn pair(registry: &Registry) -> RecordingPair {
        RecordingPair {
            da: recording(registry, Protocol::Da, 0.5),
            la: recording(registry, Protocol::La, 0.5),
        }
    }

    #[test]
    fn classifies_plain_labels() {
        let c = classify_label("DA 0.01 cd.s/m2 + OP", Protocol::Da).unwrap();
        assert_eq!(c.tag, "DA 0.01");
        assert!(!c.is_flicker);

        assert_eq!(classify_label("DA 10 cd.s/m2 + OP", Protocol::Da).unwrap().tag, "DA 10");
        assert_eq!(classify_label("DA 1 cd.s/m2 + OP", Protocol::Da).unwrap().tag, "DA 1");
        assert_eq!(classify_label("CW 150 cd/m2", Protocol::Da).unwrap().tag, "CW 150");
        assert_eq!(classify_label("LA 3 cd.s/m2 + OP", Protocol::La).unwrap().tag, "LA 3");
        assert_eq!(classify_label("LA 0.03 cd.s/m2 + OP", Protocol::La).unwrap().tag, "LA 0.03");
        assert_eq!(classify_label("DA 10", Protocol::Da).unwrap().tag, "DA 10");
    }

    #[test]
    fn classifies_flicker_labels() {
        let c = classify_label("LA 3 cd.s/m2 20 Hz Flicker", Protocol::La).unwrap();
        assert_eq!(c.tag, "20 Hz Flicker");
        assert!(c.is_flicker);

        let c = classify_label("LA 3 cd.s/m2 10 Hz Flicker", Protocol::La).unwrap();
        assert_eq!(c.tag, "10 Hz Flicker");

        // Only light-adapted steps are checked for flicker.
        let c = classify_label("DA 3 cd.s/m2 30 Hz Flicker", Protocol::Da).unwrap();
        assert_eq!(c.tag, "DA 3");
        assert!(!c.is_flicker);

        // A single-digit frequency is not a flicker tag.
        let c = classify_label("LA 3 cd.s/m2 5 Hz Flicker", Protocol::La).unwrap();
        assert_eq!(c.tag, "LA 3");
        assert!(!c.is_flicker);
    }

    #[test]
    fn rejects_unrecognised_labels() {
        for label in ["Photopic 3", "DA x", "DA 1", "da 0.1 cd", ""] {
            assert_eq!(
                classify_label(label, Protocol::Da),
                Err(ConsistencyError::LabelFormat(label.to_string())),
                "{label}"
            );
        }
    }

    #[test]
    fn every_registered_label_classifies() {
        let reg = Registry::cohort_b();
        for protocol in Protocol::ALL {
            for step in reg.steps_for(protocol) {
                classify_label(&step.label, protocol).unwrap();
            }
        }
    }

    #[test]
    fn display_ranges() {
        assert_eq!(display_range(Protocol::Da, false), (-150.0, 250.0));
        assert_eq!(display_range(Protocol::La, false), (-150.0, 75.0));
        assert_eq!(display_range(Protocol::La, true), (-50.0, 75.0));
    }

    #[test]
    fn time_axis_shape() {
        let t = time_axis(-20.0, 9, NOMINAL_PITCH_MS);
        assert_eq!(t.len(), 9);
        assert_eq!(t[0], -20.0);
        assert_eq!(t[8], -20.0 + 0.5 * 8.0);
        assert!(t.windows(2).all(|w| w[1] > w[0]));
        assert!(time_axis(3.0, 0, NOMINAL_PITCH_MS).is_empty());
    }

    #[test]
    fn amplitudes_are_divided_by_a_thousand() {
        let reg = Registry::cohort_b();
        let pair = pair(&reg);
        let trace = extract_trace(&pair, &reg, Protocol::Da, "DA 3 cd.s/m2 + OP", TimeAxisMode::Nominal)
            .unwrap();

        let raw_od = &pair.da.series_at(8, 1).unwrap().values;
        let raw_os = &pair.da.series_at(8, 2).unwrap().values;
        for (out, raw) in trace.od.amplitudes.iter().zip(raw_od) {
            assert_eq!(*out, raw / 1000.0);
        }
        for (out, raw) in trace.os.amplitudes.iter().zip(raw_os) {
            assert_eq!(*out, raw / 1000.0);
        }
        assert_eq!(trace.time.len(), raw_od.len());
        assert_eq!(trace.time[0], -20.0);
        assert_eq!(trace.stimulus.tag, "DA 3");
        assert_eq!(trace.display_range(), (-150.0, 250.0));
    }

    #[test]
    fn flicker_step_extraction() {
        let reg = Registry::cohort_b();
        let pair = pair(&reg);
        let trace = extract_trace(
            &pair,
            &reg,
            Protocol::La,
            "LA 3 cd.s/m2 40 Hz Flicker",
            TimeAxisMode::Nominal,
        )
        .unwrap();
        assert!(trace.stimulus.is_flicker);
        assert_eq!(trace.stimulus.tag, "40 Hz Flicker");
        assert_eq!(trace.display_range(), (-50.0, 75.0));
        assert_eq!(trace.series(Eye::Os).eye, Eye::Os);
    }

    #[test]
    fn declared_interval_mode_uses_series_pitch() {
        let reg = Registry::cohort_b();
        let pair = RecordingPair {
            da: recording(&reg, Protocol::Da, 0.25),
            la: recording(&reg, Protocol::La, 0.25),
        };

        let nominal =
            extract_trace(&pair, &reg, Protocol::Da, "CW 150 cd/m2", TimeAxisMode::Nominal).unwrap();
        assert_eq!(nominal.time[8], -16.0);
        assert_eq!(nominal.od.declared_interval, 0.25);

        let declared =
            extract_trace(&pair, &reg, Protocol::Da, "CW 150 cd/m2", TimeAxisMode::Declared).unwrap();
        assert_eq!(declared.time[8], -18.0);
    }

    #[test]
    fn non_positive_declared_interval_falls_back_to_nominal() {
        let reg = Registry::cohort_b();
        for delta in [0.0, -0.5] {
            let pair = RecordingPair {
                da: recording(&reg, Protocol::Da, delta),
                la: recording(&reg, Protocol::La, delta),
            };
            let trace =
                extract_trace(&pair, &reg, Protocol::La, "LA 3 cd.s/m2 + OP", TimeAxisMode::Declared)
                    .unwrap();
            assert_eq!(trace.od.declared_interval, delta);
            assert_eq!(trace.time[8], -16.0);
            assert!(trace.time.windows(2).all(|w| w[1] > w[0]));
        }
    }

    #[test]
    fn missing_step_and_channel_are_errors() {
        let reg = Registry::cohort_b();
        let mut p = pair(&reg);
        p.la.data.remove(&2);
        let err = extract_protocol(&p, &reg, Protocol::La, TimeAxisMode::Nominal).unwrap_err();
        assert!(matches!(err, ConsistencyError::StepNotFound { index: 2, .. }));

        let mut p = pair(&reg);
        if let Some(step) = p.da.data.get_mut(&4) {
            step.channels.remove(&2);
        }
        let err = extract_protocol(&p, &reg, Protocol::Da, TimeAxisMode::Nominal).unwrap_err();
        assert!(matches!(
            err,
            ConsistencyError::ChannelNotFound { index: 4, channel: 2, .. }
        ));
    }

    #[test]
    fn unknown_step_label() {
        let reg = Registry::cohort_b();
        let err = extract_trace(&pair(&reg), &reg, Protocol::Da, "LA 3 cd.s/m2 + OP", TimeAxisMode::Nominal)
            .unwrap_err();
        assert!(matches!(err, ConsistencyError::UnknownStep { protocol: Protocol::Da, .. }));
    }

    #[test]
    fn whole_protocol_in_table_order() {
        let reg = Registry::cohort_b();
        let traces = extract_protocol(&pair(&reg), &reg, Protocol::La, TimeAxisMode::Nominal).unwrap();
        let labels: Vec<&str> = traces.iter().map(|t| t.step_label.as_str()).collect();
        let table: Vec<&str> = reg.steps_for(Protocol::La).iter().map(|s| s.label.as_str()).collect();
        assert_eq!(labels, table);

        let tags: Vec<&str> = traces.iter().map(|t| t.stimulus.tag.as_str()).collect();
        assert_eq!(
            tags,
            [
                "LA 0.03",
                "LA 0.3",
                "LA 3",
                "10 Hz Flicker",
                "20 Hz Flicker",
                "30 Hz Flicker",
                "40 Hz Flicker"
            ]
        );
    }
}

use std::collections::BTreeMap;
use std::fmt;

use serde::Deserialize;

use super::registry::Protocol;

// ---------------------------------------------------------------------------
// Eye – fixed channel convention
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Eye {
    /// Right eye, recorded on channel 1.
    Od,
    /// Left eye, recorded on channel 2.
    Os,
}

impl Eye {
    pub const BOTH: [Eye; 2] = [Eye::Od, Eye::Os];

    pub fn channel(self) -> u32 {
        match self {
            Eye::Od => 1,
            Eye::Os => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Eye::Od => "OD",
            Eye::Os => "OS",
        }
    }
}

impl fmt::Display for Eye {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Marker – one annotated event
// ---------------------------------------------------------------------------

/// An annotated event (a-wave trough, b-wave peak, OP, ...) as stored by the
/// acquisition software. The `eye` text is carried through verbatim.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Marker {
    pub chan: u32,
    pub eye: String,
    pub name: String,
    pub amp: f64,
    pub time: f64,
}

// ---------------------------------------------------------------------------
// SampleSeries – one channel's waveform for one step
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SampleSeries {
    /// Time of the first sample, ms relative to the flash.
    pub start: f64,
    /// Declared sampling interval, ms.
    pub delta: f64,
    /// Raw amplitudes (nV).
    pub values: Vec<f64>,
}

impl SampleSeries {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ResultEntry {
    pub data: SampleSeries,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct ChannelData {
    #[serde(default)]
    pub results: BTreeMap<u32, ResultEntry>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct StepData {
    #[serde(default)]
    pub channels: BTreeMap<u32, ChannelData>,
}

// ---------------------------------------------------------------------------
// Recording – one parsed export file
// ---------------------------------------------------------------------------

/// Result number holding the averaged waveform of a channel.
pub const PRIMARY_RESULT: u32 = 1;

/// The parsed content of one export file, keyed by 1-based step index.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct Recording {
    #[serde(default)]
    pub markers: BTreeMap<u32, Vec<Marker>>,
    #[serde(default)]
    pub data: BTreeMap<u32, StepData>,
}

impl Recording {
    /// Markers of a step; `None` if the step is absent.
    pub fn markers_at(&self, step: u32) -> Option<&[Marker]> {
        self.markers.get(&step).map(Vec::as_slice)
    }

    pub fn has_step(&self, step: u32) -> bool {
        self.data.contains_key(&step)
    }

    /// Primary result series of one channel within a step.
    pub fn series_at(&self, step: u32, channel: u32) -> Option<&SampleSeries> {
        self.data
            .get(&step)?
            .channels
            .get(&channel)?
            .results
            .get(&PRIMARY_RESULT)
            .map(|r| &r.data)
    }

    /// Total number of markers across all steps.
    pub fn marker_count(&self) -> usize {
        self.markers.values().map(Vec::len).sum()
    }
}

// ---------------------------------------------------------------------------
// RecordingPair – the DA and LA halves of one visit
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct RecordingPair {
    pub da: Recording,
    pub la: Recording,
}

impl RecordingPair {
    pub fn get(&self, protocol: Protocol) -> &Recording {
        match protocol {
            Protocol::Da => &self.da,
            Protocol::La => &self.la,
        }
    }
}

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ErgError;

// ---------------------------------------------------------------------------
// Protocol – dark- or light-adapted acquisition
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Protocol {
    #[serde(rename = "DA")]
    Da,
    #[serde(rename = "LA")]
    La,
}

impl Protocol {
    pub const ALL: [Protocol; 2] = [Protocol::Da, Protocol::La];

    /// Tag used in file names and in the CSV `Condition` column.
    pub fn as_str(self) -> &'static str {
        match self {
            Protocol::Da => "DA",
            Protocol::La => "LA",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Registry entries
// ---------------------------------------------------------------------------

/// A named visit and the folder its export files are stored in.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Timepoint {
    pub name: String,
    pub folder: String,
}

/// A treatment group and its subjects, in roster order.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Group {
    pub name: String,
    pub subjects: Vec<u32>,
}

/// A stimulus condition and its 1-based step index in the recording.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StimulusStep {
    pub label: String,
    pub index: u32,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StepTables {
    pub da: Vec<StimulusStep>,
    pub la: Vec<StimulusStep>,
}

// ---------------------------------------------------------------------------
// Registry – the fixed experiment design
// ---------------------------------------------------------------------------

/// Immutable lookup tables describing the experiment: which timepoints exist
/// and where they live, who belongs to which group, and which step of each
/// protocol holds which stimulus condition.
///
/// Iteration order of every table is declaration order.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Registry {
    timepoints: Vec<Timepoint>,
    groups: Vec<Group>,
    steps: StepTables,
}

impl Default for Registry {
    fn default() -> Self {
        Self::cohort_b()
    }
}

impl Registry {
    pub fn new(timepoints: Vec<Timepoint>, groups: Vec<Group>, steps: StepTables) -> Self {
        Registry {
            timepoints,
            groups,
            steps,
        }
    }

    /// Phase II Cohort B: six visits, seven rabbits in three groups.
    pub fn cohort_b() -> Self {
        let timepoints = [
            ("Baseline", "Baseline Cohort B (4.11.2024)"),
            ("Day 8", "Day 8 Phase II Cohort B (4.30.2024)"),
            ("Day 15", "Day 15 Phase II Cohort B (5.7.2024)"),
            ("Day 22", "Day 22 Phase II Cohort B (5.14.2024)"),
            ("Day 30", "Day 30 Phase II Cohort B (5.22.2024)"),
            ("Day 38", "Day 38 Phase II Cohort B (5.30.2024)"),
        ]
        .into_iter()
        .map(|(name, folder)| Timepoint {
            name: name.to_string(),
            folder: folder.to_string(),
        })
        .collect();

        let groups = [
            ("Group 1", vec![13080, 13081]),
            ("Group 2", vec![13075, 13079]),
            ("Group 3", vec![13076, 13077, 13078]),
        ]
        .into_iter()
        .map(|(name, subjects)| Group {
            name: name.to_string(),
            subjects,
        })
        .collect();

        let da = numbered(&[
            "DA 0.001 cd.s/m2 + OP",
            "DA 0.003 cd.s/m2 + OP",
            "DA 0.01 cd.s/m2 + OP",
            "DA 0.03 cd.s/m2 + OP",
            "DA 0.1 cd.s/m2 + OP",
            "DA 0.3 cd.s/m2 + OP",
            "DA 1 cd.s/m2 + OP",
            "DA 3 cd.s/m2 + OP",
            "DA 10 cd.s/m2 + OP",
            "CW 150 cd/m2",
        ]);
        let la = numbered(&[
            "LA 0.03 cd.s/m2 + OP",
            "LA 0.3 cd.s/m2 + OP",
            "LA 3 cd.s/m2 + OP",
            "LA 3 cd.s/m2 10 Hz Flicker",
            "LA 3 cd.s/m2 20 Hz Flicker",
            "LA 3 cd.s/m2 30 Hz Flicker",
            "LA 3 cd.s/m2 40 Hz Flicker",
        ]);

        Registry::new(timepoints, groups, StepTables { da, la })
    }

    pub fn timepoints(&self) -> &[Timepoint] {
        &self.timepoints
    }

    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    /// Storage folder for a timepoint name.
    pub fn folder_for(&self, timepoint: &str) -> Result<&str, ErgError> {
        self.timepoints
            .iter()
            .find(|tp| tp.name == timepoint)
            .map(|tp| tp.folder.as_str())
            .ok_or_else(|| ErgError::UnknownTimepoint(timepoint.to_string()))
    }

    /// Ordered step table of a protocol.
    pub fn steps_for(&self, protocol: Protocol) -> &[StimulusStep] {
        match protocol {
            Protocol::Da => &self.steps.da,
            Protocol::La => &self.steps.la,
        }
    }

    /// Check the tables are internally consistent.
    ///
    /// Rejects: a subject listed under two groups (or twice in one), duplicate
    /// timepoint names, duplicate step labels or indices within a protocol,
    /// empty step tables, and step index 0.
    pub fn validate(&self) -> Result<(), ErgError> {
        let mut owner: BTreeMap<u32, &str> = BTreeMap::new();
        for group in &self.groups {
            for &subject in &group.subjects {
                if let Some(prev) = owner.insert(subject, &group.name) {
                    return Err(ErgError::InvalidRegistry(format!(
                        "subject {subject} listed under both '{prev}' and '{}'",
                        group.name
                    )));
                }
            }
        }

        let mut names = BTreeSet::new();
        for tp in &self.timepoints {
            if !names.insert(tp.name.as_str()) {
                return Err(ErgError::InvalidRegistry(format!(
                    "timepoint '{}' declared twice",
                    tp.name
                )));
            }
        }

        for protocol in Protocol::ALL {
            let steps = self.steps_for(protocol);
            if steps.is_empty() {
                return Err(ErgError::InvalidRegistry(format!(
                    "{protocol} step table is empty"
                )));
            }
            let mut labels = BTreeSet::new();
            let mut indices = BTreeSet::new();
            for step in steps {
                if step.index == 0 {
                    return Err(ErgError::InvalidRegistry(format!(
                        "{protocol} step '{}' has index 0; step indices are 1-based",
                        step.label
                    )));
                }
                if !labels.insert(step.label.as_str()) || !indices.insert(step.index) {
                    return Err(ErgError::InvalidRegistry(format!(
                        "{protocol} step '{}' (index {}) is not unique",
                        step.label, step.index
                    )));
                }
            }
        }

        Ok(())
    }
}

fn numbered(labels: &[&str]) -> Vec<StimulusStep> {
    labels
        .iter()
        .zip(1u32..)
        .map(|(label, index)| StimulusStep {
            label: label.to_string(),
            index,
        })
        .collect()
}

use thiserror::Error;

use crate::data::registry::Protocol;

/// Boxed cause carried by [`ErgError::LoadFailure`].
pub type BoxedCause = Box<dyn std::error::Error + Send + Sync + 'static>;

// ---------------------------------------------------------------------------
// ErgError – everything the pipeline can fail with
// ---------------------------------------------------------------------------

#[derive(Error, Debug)]
pub enum ErgError {
    #[error("unknown timepoint '{0}'")]
    UnknownTimepoint(String),

    /// One (subject, timepoint) could not be loaded. Recoverable: the driver
    /// skips the pair and moves on.
    #[error("failed to load subject:{subject}, timepoint:{timepoint}")]
    LoadFailure {
        subject: u32,
        timepoint: String,
        #[source]
        source: BoxedCause,
    },

    /// The registry and the loaded recording disagree. Fatal.
    #[error("subject:{subject}, timepoint:{timepoint}: {source}")]
    Consistency {
        subject: u32,
        timepoint: String,
        #[source]
        source: ConsistencyError,
    },

    #[error("invalid registry: {0}")]
    InvalidRegistry(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl ErgError {
    /// Whether the driver may skip the current pair and continue.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ErgError::LoadFailure { .. })
    }
}

// ---------------------------------------------------------------------------
// ConsistencyError – registry vs. recording mismatches
// ---------------------------------------------------------------------------

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConsistencyError {
    #[error("{protocol} step '{label}' (index {index}) not found in recording")]
    StepNotFound {
        protocol: Protocol,
        label: String,
        index: u32,
    },

    #[error("{protocol} step '{label}' (index {index}) has no result for channel {channel}")]
    ChannelNotFound {
        protocol: Protocol,
        label: String,
        index: u32,
        channel: u32,
    },

    #[error("step label '{0}' does not name a stimulus")]
    LabelFormat(String),

    #[error("{protocol} has no step labelled '{label}'")]
    UnknownStep { protocol: Protocol, label: String },
}

impl ConsistencyError {
    /// Attach the (subject, timepoint) the mismatch was found in.
    pub fn at(self, subject: u32, timepoint: &str) -> ErgError {
        ErgError::Consistency {
            subject,
            timepoint: timepoint.to_string(),
            source: self,
        }
    }
}

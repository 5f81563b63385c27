//! Fault types and reporting for speech pipeline stations.
//!
//! No single sentence's failure stops a run. Stations recover locally and hand
//! the fault to an [`ErrorReporter`] instead of returning it.

use std::fmt;
use std::sync::Mutex;

/// Why a sequencer message was discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Violation {
    /// Index already played or skipped.
    StaleIndex,
    /// Index already waiting in the pending map.
    DuplicateIndex,
    /// Index at or beyond the announced sentence count.
    BeyondEnd,
    /// A second end-of-stream announcement.
    RepeatedEndOfStream,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Violation::StaleIndex => "index below cursor",
            Violation::DuplicateIndex => "duplicate pending index",
            Violation::BeyondEnd => "index after declared end of stream",
            Violation::RepeatedEndOfStream => "repeated end-of-stream",
        };
        f.write_str(text)
    }
}

/// Recoverable faults raised by pipeline stations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineFault {
    /// The sentence splitter failed; the buffer was kept as one segment.
    Segmentation(String),
    /// Synthesis failed or timed out; the sentence will be skipped.
    Synthesis { index: u64, message: String },
    /// The player failed; the sequencer moved on to the next index.
    Playback { index: u64, message: String },
    /// A sequencer message broke the ordering protocol and was discarded.
    ProtocolViolation { index: u64, violation: Violation },
}

impl fmt::Display for PipelineFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineFault::Segmentation(msg) => write!(f, "Segmentation fault: {}", msg),
            PipelineFault::Synthesis { index, message } => {
                write!(f, "Synthesis failure for sentence {}: {}", index, message)
            }
            PipelineFault::Playback { index, message } => {
                write!(f, "Playback failure for sentence {}: {}", index, message)
            }
            PipelineFault::ProtocolViolation { index, violation } => {
                write!(f, "Protocol violation for sentence {}: {}", index, violation)
            }
        }
    }
}

impl std::error::Error for PipelineFault {}

/// Trait for reporting station faults.
pub trait ErrorReporter: Send + Sync {
    /// Reports a fault from a station.
    fn report(&self, station: &str, fault: &PipelineFault);
}

/// Reporter that logs faults through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

impl ErrorReporter for LogReporter {
    fn report(&self, station: &str, fault: &PipelineFault) {
        tracing::warn!(station, "{}", fault);
    }
}

/// Reporter that keeps every fault, for inspection after a run.
#[derive(Debug, Default)]
pub struct CollectingReporter {
    faults: Mutex<Vec<(String, PipelineFault)>>,
}

impl CollectingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// All faults reported so far, with the reporting station's name.
    pub fn faults(&self) -> Vec<(String, PipelineFault)> {
        match self.faults.lock() {
            Ok(faults) => faults.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Number of protocol violations reported so far.
    pub fn violation_count(&self) -> usize {
        self.faults()
            .iter()
            .filter(|(_, f)| matches!(f, PipelineFault::ProtocolViolation { .. }))
            .count()
    }
}

impl ErrorReporter for CollectingReporter {
    fn report(&self, station: &str, fault: &PipelineFault) {
        let mut faults = match self.faults.lock() {
            Ok(faults) => faults,
            Err(poisoned) => poisoned.into_inner(),
        };
        faults.push((station.to_string(), fault.clone()));
    }
}

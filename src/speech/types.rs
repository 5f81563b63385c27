//! Message types for the speech pipeline.
//!
//! Defines the data structures that flow between pipeline stations and the
//! per-run stop signal shared by all of them.

use crate::speech::artifact::AudioArtifact;
use tokio::sync::{OwnedSemaphorePermit, watch};

/// A complete sentence carved out of the token stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentenceUnit {
    /// Position in segmentation order, starting at 0, never reused.
    pub index: u64,
    /// Trimmed sentence text.
    pub text: String,
}

impl SentenceUnit {
    /// Creates a new sentence unit.
    pub fn new(index: u64, text: impl Into<String>) -> Self {
        Self {
            index,
            text: text.into(),
        }
    }
}

/// Result of synthesizing one sentence.
#[derive(Debug)]
pub enum SynthesisOutcome {
    /// Audio is ready to be played.
    Ready(AudioArtifact),
    /// Synthesis failed or timed out; the sentence is skipped.
    Failed(String),
}

impl SynthesisOutcome {
    /// Returns true if the outcome carries playable audio.
    pub fn is_ready(&self) -> bool {
        matches!(self, SynthesisOutcome::Ready(_))
    }
}

/// A worker's report for one sentence index.
#[derive(Debug)]
pub struct Completion {
    /// Index of the sentence that was synthesized.
    pub index: u64,
    /// Audio or failure record.
    pub outcome: SynthesisOutcome,
    /// Intake slot, held until the sentence is played, skipped or released.
    pub(crate) slot: Option<OwnedSemaphorePermit>,
}

impl Completion {
    /// Creates a successful completion.
    pub fn ready(artifact: AudioArtifact) -> Self {
        Self {
            index: artifact.index(),
            outcome: SynthesisOutcome::Ready(artifact),
            slot: None,
        }
    }

    /// Creates a failure record.
    pub fn failed(index: u64, reason: impl Into<String>) -> Self {
        Self {
            index,
            outcome: SynthesisOutcome::Failed(reason.into()),
            slot: None,
        }
    }

    /// Attaches the intake slot the sentence occupies.
    pub(crate) fn holding(mut self, slot: OwnedSemaphorePermit) -> Self {
        self.slot = Some(slot);
        self
    }
}

/// Messages consumed by the sequencer.
#[derive(Debug)]
pub enum SequencerEvent {
    /// A synthesis worker finished a sentence (in any order).
    Completed(Completion),
    /// Segmentation finished; exactly `total` sentences were produced.
    EndOfStream { total: u64 },
}

/// Owner side of a run's stop signal.
///
/// Replaces a shared `running` flag: every station holds a [`StopListener`]
/// and can both poll it and await it inside `tokio::select!`.
#[derive(Debug)]
pub struct StopSignal {
    tx: watch::Sender<bool>,
}

impl StopSignal {
    /// Creates a signal in the running state.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// Creates a listener for a station.
    pub fn listener(&self) -> StopListener {
        StopListener {
            rx: self.tx.subscribe(),
        }
    }

    /// Requests every listener to stop. Idempotent.
    pub fn stop(&self) {
        self.tx.send_replace(true);
    }

    /// Returns true once [`stop`](Self::stop) has been called.
    pub fn is_stopped(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Listener side of a run's stop signal.
#[derive(Debug, Clone)]
pub struct StopListener {
    rx: watch::Receiver<bool>,
}

impl StopListener {
    /// Returns true if stop has been requested.
    pub fn is_stopped(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once stop has been requested.
    ///
    /// If the [`StopSignal`] is dropped without stopping, this never resolves.
    pub async fn stopped(&mut self) {
        if self.rx.wait_for(|stopped| *stopped).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_sentence_unit_creation() {
        let unit = SentenceUnit::new(3, "How are you?");
        assert_eq!(unit.index, 3);
        assert_eq!(unit.text, "How are you?");
    }

    #[test]
    fn test_failed_completion() {
        let completion = Completion::failed(4, "HTTP 500");
        assert_eq!(completion.index, 4);
        assert!(!completion.outcome.is_ready());
        match completion.outcome {
            SynthesisOutcome::Failed(reason) => assert_eq!(reason, "HTTP 500"),
            SynthesisOutcome::Ready(_) => panic!("Expected failure record"),
        }
    }

    #[test]
    fn test_ready_completion_takes_artifact_index() {
        let artifact = AudioArtifact::in_memory(9, vec![1, 2, 3]);
        let completion = Completion::ready(artifact);
        assert_eq!(completion.index, 9);
        assert!(completion.outcome.is_ready());
    }

    #[test]
    fn test_stop_signal_starts_running() {
        let signal = StopSignal::new();
        let listener = signal.listener();
        assert!(!signal.is_stopped());
        assert!(!listener.is_stopped());
    }

    #[test]
    fn test_stop_signal_reaches_all_listeners() {
        let signal = StopSignal::new();
        let a = signal.listener();
        let b = a.clone();

        signal.stop();
        signal.stop();

        assert!(signal.is_stopped());
        assert!(a.is_stopped());
        assert!(b.is_stopped());
    }

    #[tokio::test]
    async fn test_stopped_resolves_after_stop() {
        let signal = StopSignal::new();
        let mut listener = signal.listener();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            signal.stop();
            // Keep the sender alive until the listener observed it.
            tokio::time::sleep(Duration::from_millis(50)).await;
        });

        tokio::time::timeout(Duration::from_secs(1), listener.stopped())
            .await
            .expect("listener should observe stop");
    }

    #[tokio::test]
    async fn test_stopped_pending_when_signal_dropped() {
        let signal = StopSignal::new();
        let mut listener = signal.listener();
        drop(signal);

        let result = tokio::time::timeout(Duration::from_millis(30), listener.stopped()).await;
        assert!(result.is_err(), "dropping the signal is not a stop request");
    }
}

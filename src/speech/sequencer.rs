//! Sequencer station: plays synthesized sentences in segmentation order.
//!
//! Completions arrive in whatever order the workers finish. Out-of-turn
//! arrivals wait in a pending map keyed by index; whenever the entry at the
//! cursor shows up, every consecutive ready entry is drained in one go. Each
//! completion is therefore stored at most once and drained at most once.

use crate::defaults;
use crate::playback::Player;
use crate::speech::artifact::AudioArtifact;
use crate::speech::dispatcher::InFlight;
use crate::speech::report::{ErrorReporter, LogReporter, PipelineFault, Violation};
use crate::speech::types::{Completion, SequencerEvent, StopListener, SynthesisOutcome};
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Configuration for the sequencer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequencerConfig {
    /// How long to wait for the next event once the sentence count is known.
    pub completion_grace: Duration,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            completion_grace: defaults::completion_grace(defaults::synthesis_timeout()),
        }
    }
}

/// Why the sequencer stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequencerOutcome {
    /// Every announced sentence was played or skipped.
    Finished,
    /// The run's stop signal fired.
    Stopped,
    /// All event senders went away before the run finished.
    Disconnected,
    /// No event arrived within the completion grace period.
    TimedOut,
}

impl SequencerOutcome {
    pub fn is_finished(&self) -> bool {
        matches!(self, SequencerOutcome::Finished)
    }
}

/// Counters collected over one sequencer run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequencerReport {
    /// Sentences handed to the player successfully.
    pub played: u64,
    /// Sentences passed over because synthesis or playback failed.
    pub skipped: u64,
    /// Discarded protocol-violating messages.
    pub violations: u64,
    /// Ready artifacts released without being played.
    pub abandoned: u64,
    pub outcome: SequencerOutcome,
}

/// Ordering state machine.
///
/// The pure part (`accept`, `announce_total`, `take_next`) has no I/O; [`run`]
/// wires it to the event channel and the player.
///
/// [`run`]: Sequencer::run
pub struct Sequencer {
    config: SequencerConfig,
    reporter: Arc<dyn ErrorReporter>,
    /// Next index to play.
    cursor: u64,
    /// Out-of-turn completions, keyed by index. Each one holds an intake
    /// slot, so the dispatcher's intake depth bounds this map.
    pending: BTreeMap<u64, Completion>,
    /// Final sentence count, once announced.
    total: Option<u64>,
    played: u64,
    skipped: u64,
    violations: u64,
    abandoned: u64,
}

impl Sequencer {
    /// Creates a sequencer with default configuration.
    pub fn new() -> Self {
        Self::with_config(SequencerConfig::default())
    }

    /// Creates a sequencer with custom configuration.
    pub fn with_config(config: SequencerConfig) -> Self {
        Self {
            config,
            reporter: Arc::new(LogReporter),
            cursor: 0,
            pending: BTreeMap::new(),
            total: None,
            played: 0,
            skipped: 0,
            violations: 0,
            abandoned: 0,
        }
    }

    /// Sets a custom error reporter.
    pub fn with_error_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn total(&self) -> Option<u64> {
        self.total
    }

    /// Records a completion. Returns false if it was discarded as a violation.
    ///
    /// The first completion for an index wins; later ones are discarded.
    pub fn accept(&mut self, completion: Completion) -> bool {
        let index = completion.index;

        if index < self.cursor {
            self.violation(index, Violation::StaleIndex);
            return false;
        }
        if self.total.is_some_and(|total| index >= total) {
            self.violation(index, Violation::BeyondEnd);
            return false;
        }
        match self.pending.entry(index) {
            Entry::Occupied(_) => {
                self.violation(index, Violation::DuplicateIndex);
                false
            }
            Entry::Vacant(entry) => {
                entry.insert(completion);
                true
            }
        }
    }

    /// Records the final sentence count from the segmentation side.
    ///
    /// Pending entries at or beyond `total` are discarded as violations. A
    /// second announcement is itself a violation and changes nothing.
    pub fn announce_total(&mut self, total: u64) {
        if self.total.is_some() {
            self.violation(total, Violation::RepeatedEndOfStream);
            return;
        }
        self.total = Some(total);

        let out_of_range = self.pending.split_off(&total);
        for index in out_of_range.into_keys() {
            self.violation(index, Violation::BeyondEnd);
        }
        tracing::debug!(total, cursor = self.cursor, "sentence count announced");
    }

    /// Removes the entry at the cursor, if it has arrived, and advances.
    pub fn take_next(&mut self) -> Option<Completion> {
        let completion = self.pending.remove(&self.cursor)?;
        self.cursor += 1;
        Some(completion)
    }

    /// True once the cursor reached the announced count with nothing in flight.
    pub fn is_complete(&self, in_flight: usize) -> bool {
        in_flight == 0 && self.total.is_some_and(|total| self.cursor >= total)
    }

    /// Releases everything still pending without playing it.
    ///
    /// Returns the number of ready artifacts released.
    pub fn abandon(&mut self) -> u64 {
        let mut released = 0;
        for (_, completion) in std::mem::take(&mut self.pending) {
            if let SynthesisOutcome::Ready(artifact) = completion.outcome {
                release(artifact);
                released += 1;
            }
        }
        self.abandoned += released;
        released
    }

    /// Runs the sequencer station until the run finishes or is cut short.
    ///
    /// # Arguments
    /// * `events` - Completions from the workers and the end-of-stream handshake
    /// * `player` - Playback backend, called one artifact at a time
    /// * `in_flight` - Dispatcher gauge of sentences not yet reported
    /// * `stop` - Run stop signal
    pub async fn run(
        mut self,
        mut events: mpsc::Receiver<SequencerEvent>,
        player: Arc<dyn Player>,
        in_flight: InFlight,
        mut stop: StopListener,
    ) -> SequencerReport {
        let outcome = loop {
            if self.is_complete(in_flight.get()) {
                break SequencerOutcome::Finished;
            }
            if stop.is_stopped() {
                break SequencerOutcome::Stopped;
            }

            let grace = self.total.map(|_| self.config.completion_grace);
            let wait = tokio::select! {
                biased;
                _ = stop.stopped() => break SequencerOutcome::Stopped,
                wait = next_event(&mut events, grace) => wait,
            };

            match wait {
                Wait::Event(SequencerEvent::Completed(completion)) => {
                    if self.accept(completion) && !self.drain(player.as_ref(), &mut stop).await {
                        break SequencerOutcome::Stopped;
                    }
                }
                Wait::Event(SequencerEvent::EndOfStream { total }) => self.announce_total(total),
                Wait::Closed => break SequencerOutcome::Disconnected,
                Wait::Elapsed => break SequencerOutcome::TimedOut,
            }
        };

        let released = self.abandon();
        if released > 0 {
            tracing::info!(released, ?outcome, "released unplayed sentences");
        }

        tracing::debug!(
            played = self.played,
            skipped = self.skipped,
            violations = self.violations,
            ?outcome,
            "sequencer finished"
        );

        SequencerReport {
            played: self.played,
            skipped: self.skipped,
            violations: self.violations,
            abandoned: self.abandoned,
            outcome,
        }
    }

    /// Plays or skips every consecutive entry from the cursor on.
    ///
    /// Returns false if the stop signal cut playback short.
    async fn drain(&mut self, player: &dyn Player, stop: &mut StopListener) -> bool {
        while let Some(Completion {
            index,
            outcome,
            slot: _slot,
        }) = self.take_next()
        {
            let artifact = match outcome {
                SynthesisOutcome::Ready(artifact) => artifact,
                SynthesisOutcome::Failed(reason) => {
                    tracing::debug!(index, %reason, "skipping sentence without audio");
                    self.skipped += 1;
                    continue;
                }
            };

            let result = tokio::select! {
                biased;
                _ = stop.stopped() => None,
                result = player.play(&artifact) => Some(result),
            };

            match result {
                None => {
                    release(artifact);
                    self.abandoned += 1;
                    return false;
                }
                Some(Ok(())) => {
                    tracing::info!(index, "sentence played");
                    self.played += 1;
                }
                Some(Err(e)) => {
                    self.reporter.report(
                        "sequencer",
                        &PipelineFault::Playback {
                            index,
                            message: e.to_string(),
                        },
                    );
                    self.skipped += 1;
                }
            }
            release(artifact);
        }
        true
    }

    fn violation(&mut self, index: u64, violation: Violation) {
        self.violations += 1;
        self.reporter.report(
            "sequencer",
            &PipelineFault::ProtocolViolation { index, violation },
        );
    }
}

impl Default for Sequencer {
    fn default() -> Self {
        Self::new()
    }
}

enum Wait {
    Event(SequencerEvent),
    Closed,
    Elapsed,
}

async fn next_event(
    events: &mut mpsc::Receiver<SequencerEvent>,
    grace: Option<Duration>,
) -> Wait {
    let received = match grace {
        Some(grace) => match tokio::time::timeout(grace, events.recv()).await {
            Ok(received) => received,
            Err(_) => return Wait::Elapsed,
        },
        None => events.recv().await,
    };
    match received {
        Some(event) => Wait::Event(event),
        None => Wait::Closed,
    }
}

fn release(artifact: AudioArtifact) {
    let index = artifact.index();
    if let Err(e) = artifact.release() {
        tracing::warn!(index, error = %e, "failed to release audio artifact");
    }
}

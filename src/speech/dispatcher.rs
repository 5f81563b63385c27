//! Synthesis dispatcher: a bounded intake feeding a pool of synthesis workers.
//!
//! Each worker takes the next sentence, calls the synthesizer under a per-call
//! timeout and posts the result to the completion channel as soon as it is
//! done, regardless of what other workers are doing. Ordering is the
//! sequencer's job.

use crate::defaults;
use crate::error::{Result, SayflowError};
use crate::speech::artifact::ArtifactStore;
use crate::speech::report::{ErrorReporter, LogReporter, PipelineFault};
use crate::speech::types::{Completion, SentenceUnit, SequencerEvent, StopListener};
use crate::tts::Synthesizer;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore, mpsc};
use tokio::task::JoinHandle;

/// Configuration for the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Number of synthesis workers.
    pub workers: usize,
    /// Sentences accepted but not yet played before `submit` waits.
    pub intake_depth: usize,
    /// Upper bound for a single synthesis call.
    pub synthesis_timeout: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            workers: defaults::WORKERS,
            intake_depth: defaults::INTAKE_DEPTH,
            synthesis_timeout: defaults::synthesis_timeout(),
        }
    }
}

/// Shared count of sentences submitted but not yet reported.
#[derive(Debug, Clone, Default)]
pub struct InFlight(Arc<AtomicUsize>);

impl InFlight {
    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    fn increment(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    fn decrement(&self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A queued sentence together with the intake slot it occupies.
struct Job {
    unit: SentenceUnit,
    slot: OwnedSemaphorePermit,
}

/// Builder for a worker pool.
pub struct Dispatcher {
    config: DispatcherConfig,
    synthesizer: Arc<dyn Synthesizer>,
    store: ArtifactStore,
    reporter: Arc<dyn ErrorReporter>,
}

impl Dispatcher {
    /// Creates a dispatcher that keeps artifacts in memory.
    pub fn new(config: DispatcherConfig, synthesizer: Arc<dyn Synthesizer>) -> Self {
        Self {
            config,
            synthesizer,
            store: ArtifactStore::in_memory(),
            reporter: Arc::new(LogReporter),
        }
    }

    /// Sets where synthesized audio is kept.
    pub fn with_artifact_store(mut self, store: ArtifactStore) -> Self {
        self.store = store;
        self
    }

    /// Sets a custom error reporter.
    pub fn with_error_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Starts the workers.
    ///
    /// # Arguments
    /// * `completions` - Sender for the sequencer's event channel
    /// * `stop` - Run stop signal; queued sentences are discarded once it fires
    pub fn spawn(
        self,
        completions: mpsc::Sender<SequencerEvent>,
        stop: StopListener,
    ) -> DispatcherHandle {
        let workers = self.config.workers.max(1);
        let depth = self.config.intake_depth.max(1);

        let (intake_tx, intake_rx) = mpsc::channel::<Job>(depth);
        let intake_rx = Arc::new(Mutex::new(intake_rx));
        let in_flight = InFlight::default();

        let worker_handles = (0..workers)
            .map(|id| {
                let worker = Worker {
                    id,
                    synthesizer: self.synthesizer.clone(),
                    store: self.store.clone(),
                    timeout: self.config.synthesis_timeout,
                    completions: completions.clone(),
                    in_flight: in_flight.clone(),
                    stop: stop.clone(),
                    reporter: self.reporter.clone(),
                };
                let intake = intake_rx.clone();
                tokio::spawn(worker.run(intake))
            })
            .collect();

        tracing::debug!(
            workers,
            intake_depth = depth,
            synthesizer = self.synthesizer.name(),
            "dispatcher started"
        );

        DispatcherHandle {
            intake: intake_tx,
            slots: Arc::new(Semaphore::new(depth)),
            in_flight,
            stop,
            workers: worker_handles,
        }
    }
}

/// Handle to a running worker pool.
pub struct DispatcherHandle {
    intake: mpsc::Sender<Job>,
    slots: Arc<Semaphore>,
    in_flight: InFlight,
    stop: StopListener,
    workers: Vec<JoinHandle<()>>,
}

impl DispatcherHandle {
    /// Queues a sentence for synthesis.
    ///
    /// Waits while `intake_depth` sentences sit between submission and
    /// playback (queued, being synthesized or waiting their turn). Fails with [`SayflowError::PipelineStopped`] once the run
    /// is stopped.
    pub async fn submit(&self, unit: SentenceUnit) -> Result<()> {
        if self.stop.is_stopped() {
            return Err(SayflowError::PipelineStopped);
        }

        let mut stop = self.stop.clone();
        let slot = tokio::select! {
            slot = self.slots.clone().acquire_owned() => {
                slot.map_err(|_| SayflowError::PipelineStopped)?
            }
            _ = stop.stopped() => return Err(SayflowError::PipelineStopped),
        };

        let index = unit.index;
        self.in_flight.increment();
        if self.intake.send(Job { unit, slot }).await.is_err() {
            self.in_flight.decrement();
            return Err(SayflowError::PipelineStopped);
        }
        tracing::debug!(index, "sentence submitted");
        Ok(())
    }

    /// Sentences submitted whose completion has not been posted yet.
    pub fn in_flight(&self) -> usize {
        self.in_flight.get()
    }

    /// Shared in-flight gauge, for the sequencer's termination check.
    pub fn in_flight_gauge(&self) -> InFlight {
        self.in_flight.clone()
    }

    /// Free intake slots.
    pub fn available_slots(&self) -> usize {
        self.slots.available_permits()
    }

    /// Stops accepting sentences and waits for the workers to drain the
    /// intake and exit.
    pub async fn close(self) {
        drop(self.intake);
        for handle in self.workers {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "synthesis worker panicked");
            }
        }
    }
}

struct Worker {
    id: usize,
    synthesizer: Arc<dyn Synthesizer>,
    store: ArtifactStore,
    timeout: Duration,
    completions: mpsc::Sender<SequencerEvent>,
    in_flight: InFlight,
    stop: StopListener,
    reporter: Arc<dyn ErrorReporter>,
}

impl Worker {
    async fn run(self, intake: Arc<Mutex<mpsc::Receiver<Job>>>) {
        let mut sequencer_gone = false;

        while let Some(Job { unit, slot }) = next_job(&intake).await {
            if sequencer_gone || self.stop.is_stopped() {
                tracing::debug!(worker = self.id, index = unit.index, "discarding queued sentence");
                drop(slot);
                self.in_flight.decrement();
                continue;
            }

            // The slot travels with the completion and frees once the
            // sequencer is done with the sentence.
            let completion = self.synthesize(unit).await.holding(slot);
            self.in_flight.decrement();

            if self
                .completions
                .send(SequencerEvent::Completed(completion))
                .await
                .is_err()
            {
                // The undelivered artifact is dropped here, which removes its file.
                tracing::debug!(worker = self.id, "sequencer gone, discarding remaining work");
                sequencer_gone = true;
            }
        }

        tracing::debug!(worker = self.id, "synthesis worker exiting");
    }

    async fn synthesize(&self, unit: SentenceUnit) -> Completion {
        let index = unit.index;
        let result = match tokio::time::timeout(self.timeout, self.synthesizer.synthesize(&unit.text))
            .await
        {
            Ok(Ok(bytes)) => self.store.persist(index, bytes).await,
            Ok(Err(e)) => Err(e),
            Err(_) => Err(SayflowError::SynthesisTimeout {
                timeout_ms: self.timeout.as_millis() as u64,
            }),
        };

        match result {
            Ok(artifact) => {
                tracing::debug!(worker = self.id, index, "sentence synthesized");
                Completion::ready(artifact)
            }
            Err(e) => {
                let message = e.to_string();
                self.reporter.report(
                    "dispatcher",
                    &PipelineFault::Synthesis {
                        index,
                        message: message.clone(),
                    },
                );
                Completion::failed(index, message)
            }
        }
    }
}

async fn next_job(intake: &Mutex<mpsc::Receiver<Job>>) -> Option<Job> {
    intake.lock().await.recv().await
}

//! Speech pipeline orchestrator.
//!
//! Connects the stations for one run:
//! Token stream → Segmenter → Dispatcher (workers) → Sequencer → Player
//!
//! The segmentation driver owns the token stream. After the last fragment it
//! flushes the segmenter and announces the final sentence count to the
//! sequencer, which then knows exactly when the run is over.

use crate::config::Config;
use crate::defaults;
use crate::error::{Result, SayflowError};
use crate::playback::Player;
use crate::speech::artifact::ArtifactStore;
use crate::speech::dispatcher::{Dispatcher, DispatcherConfig, DispatcherHandle};
use crate::speech::report::{ErrorReporter, LogReporter};
use crate::speech::segmenter::{Segmenter, SentenceSplitter};
use crate::speech::sequencer::{Sequencer, SequencerConfig, SequencerOutcome, SequencerReport};
use crate::speech::types::{SentenceUnit, SequencerEvent, StopListener, StopSignal};
use crate::tts::Synthesizer;
use futures_util::{Stream, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Configuration for the speech pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SpeechPipelineConfig {
    /// Dispatcher configuration.
    pub dispatcher: DispatcherConfig,
    /// Sequencer configuration.
    pub sequencer: SequencerConfig,
}

impl SpeechPipelineConfig {
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.dispatcher.workers = workers;
        self
    }

    pub fn with_intake_depth(mut self, depth: usize) -> Self {
        self.dispatcher.intake_depth = depth;
        self
    }

    /// Sets the per-call synthesis timeout and derives the completion grace
    /// period from it.
    pub fn with_synthesis_timeout(mut self, timeout: Duration) -> Self {
        self.dispatcher.synthesis_timeout = timeout;
        self.sequencer.completion_grace = defaults::completion_grace(timeout);
        self
    }

    pub fn with_completion_grace(mut self, grace: Duration) -> Self {
        self.sequencer.completion_grace = grace;
        self
    }

    /// Creates configuration from app config.
    pub fn from_config(config: &Config) -> Self {
        let timeout = Duration::from_millis(config.synthesis.timeout_ms);
        let pipeline_config = Self::default()
            .with_workers(config.synthesis.workers)
            .with_intake_depth(config.synthesis.intake_depth)
            .with_synthesis_timeout(timeout);

        match config.pipeline.completion_grace_ms {
            Some(ms) => pipeline_config.with_completion_grace(Duration::from_millis(ms)),
            None => pipeline_config,
        }
    }

    fn event_capacity(&self) -> usize {
        (self.dispatcher.workers + self.dispatcher.intake_depth).max(1)
    }
}

/// What happened during one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Sentences produced by segmentation.
    pub sentences: u64,
    pub played: u64,
    pub skipped: u64,
    pub violations: u64,
    pub abandoned: u64,
    pub outcome: SequencerOutcome,
}

impl RunSummary {
    fn new(sentences: u64, report: SequencerReport) -> Self {
        Self {
            sentences,
            played: report.played,
            skipped: report.skipped,
            violations: report.violations,
            abandoned: report.abandoned,
            outcome: report.outcome,
        }
    }

    /// True if every sentence was either played or skipped.
    pub fn is_complete(&self) -> bool {
        self.outcome.is_finished()
    }
}

/// Handle to a running speech pipeline.
pub struct SpeechPipelineHandle {
    stop: Arc<StopSignal>,
    driver: JoinHandle<u64>,
    sequencer: JoinHandle<SequencerReport>,
}

impl SpeechPipelineHandle {
    /// Stops the run: no more sentences are accepted, queued synthesis is
    /// discarded and nothing else is played.
    pub fn stop(&self) {
        self.stop.stop();
    }

    /// Shared stop signal, e.g. for a Ctrl-C handler.
    pub fn stop_signal(&self) -> Arc<StopSignal> {
        self.stop.clone()
    }

    /// Returns true if the pipeline is running.
    pub fn is_running(&self) -> bool {
        !self.stop.is_stopped() && !self.sequencer.is_finished()
    }

    /// Waits for the run to end.
    pub async fn wait(self) -> Result<RunSummary> {
        let report = self
            .sequencer
            .await
            .map_err(|e| SayflowError::Other(format!("sequencer task failed: {}", e)))?;

        // Nothing more will be played; release the segmentation side too.
        if !report.outcome.is_finished() {
            self.stop.stop();
        }

        let sentences = self
            .driver
            .await
            .map_err(|e| SayflowError::Other(format!("segmentation task failed: {}", e)))?;

        let summary = RunSummary::new(sentences, report);
        tracing::info!(
            sentences = summary.sentences,
            played = summary.played,
            skipped = summary.skipped,
            outcome = ?summary.outcome,
            "speech pipeline finished"
        );
        Ok(summary)
    }
}

/// Speech pipeline that orchestrates all stations.
pub struct SpeechPipeline {
    config: SpeechPipelineConfig,
    store: ArtifactStore,
    reporter: Arc<dyn ErrorReporter>,
    splitter: Option<Box<dyn SentenceSplitter>>,
}

impl SpeechPipeline {
    /// Creates a new pipeline with default configuration and in-memory audio.
    pub fn new() -> Self {
        Self::with_config(SpeechPipelineConfig::default())
    }

    /// Creates a new pipeline with custom configuration.
    pub fn with_config(config: SpeechPipelineConfig) -> Self {
        Self {
            config,
            store: ArtifactStore::in_memory(),
            reporter: Arc::new(LogReporter),
            splitter: None,
        }
    }

    /// Sets where synthesized audio is kept between synthesis and playback.
    pub fn with_artifact_store(mut self, store: ArtifactStore) -> Self {
        self.store = store;
        self
    }

    /// Sets the reporter shared by all stations.
    pub fn with_error_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Replaces the default Unicode sentence splitter.
    pub fn with_splitter(mut self, splitter: Box<dyn SentenceSplitter>) -> Self {
        self.splitter = Some(splitter);
        self
    }

    /// Starts all stations and returns immediately.
    ///
    /// # Arguments
    /// * `fragments` - Token stream; the run's input ends when it does
    /// * `synthesizer` - Text-to-speech backend
    /// * `player` - Playback backend
    pub fn start<S>(
        self,
        fragments: S,
        synthesizer: Arc<dyn Synthesizer>,
        player: Arc<dyn Player>,
    ) -> SpeechPipelineHandle
    where
        S: Stream<Item = String> + Send + 'static,
    {
        let stop = Arc::new(StopSignal::new());
        let (events_tx, events_rx) = mpsc::channel::<SequencerEvent>(self.config.event_capacity());

        let dispatcher = Dispatcher::new(self.config.dispatcher.clone(), synthesizer)
            .with_artifact_store(self.store.for_run())
            .with_error_reporter(self.reporter.clone())
            .spawn(events_tx.clone(), stop.listener());

        let sequencer = Sequencer::with_config(self.config.sequencer.clone())
            .with_error_reporter(self.reporter.clone());
        let sequencer_task = tokio::spawn(sequencer.run(
            events_rx,
            player,
            dispatcher.in_flight_gauge(),
            stop.listener(),
        ));

        let segmenter = match self.splitter {
            Some(splitter) => Segmenter::with_splitter(splitter),
            None => Segmenter::new(),
        }
        .with_error_reporter(self.reporter);

        let driver_task = tokio::spawn(drive(
            fragments,
            segmenter,
            dispatcher,
            events_tx,
            stop.listener(),
        ));

        SpeechPipelineHandle {
            stop,
            driver: driver_task,
            sequencer: sequencer_task,
        }
    }

    /// Runs the pipeline to the end of the token stream and all playback.
    pub async fn run<S>(
        self,
        fragments: S,
        synthesizer: Arc<dyn Synthesizer>,
        player: Arc<dyn Player>,
    ) -> Result<RunSummary>
    where
        S: Stream<Item = String> + Send + 'static,
    {
        self.start(fragments, synthesizer, player).wait().await
    }
}

impl Default for SpeechPipeline {
    fn default() -> Self {
        Self::new()
    }
}

/// Segmentation driver: token stream → segmenter → dispatcher, then the
/// end-of-stream handshake. Returns the number of sentences produced.
async fn drive<S>(
    fragments: S,
    mut segmenter: Segmenter,
    dispatcher: DispatcherHandle,
    events: mpsc::Sender<SequencerEvent>,
    mut stop: StopListener,
) -> u64
where
    S: Stream<Item = String> + Send,
{
    let mut fragments = std::pin::pin!(fragments);

    let mut stopped = loop {
        let fragment = tokio::select! {
            biased;
            _ = stop.stopped() => break true,
            fragment = fragments.next() => fragment,
        };
        let Some(fragment) = fragment else {
            break false;
        };
        if fragment.is_empty() {
            continue;
        }
        if submit_all(&dispatcher, segmenter.ingest(&fragment)).await.is_err() {
            break true;
        }
    };

    if !stopped {
        stopped = submit_all(&dispatcher, segmenter.flush()).await.is_err();
    }

    let total = segmenter.sentence_count();
    if stopped {
        // In-flight synthesis finishes or times out on its own; its results
        // have nowhere to go and are cleaned up on drop.
        tracing::debug!(total, "segmentation stopped");
        return total;
    }

    tracing::debug!(total, "token stream ended");
    let announced = tokio::select! {
        biased;
        _ = stop.stopped() => false,
        sent = events.send(SequencerEvent::EndOfStream { total }) => sent.is_ok(),
    };
    if !announced {
        return total;
    }

    tokio::select! {
        _ = dispatcher.close() => {}
        _ = stop.stopped() => {}
    }
    total
}

async fn submit_all(dispatcher: &DispatcherHandle, units: Vec<SentenceUnit>) -> Result<()> {
    for unit in units {
        dispatcher.submit(unit).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::MockPlayer;
    use crate::speech::report::{CollectingReporter, PipelineFault};
    use crate::tts::MockSynthesizer;
    use futures_util::stream;
    use tempfile::TempDir;

    fn fragments(parts: &[&str]) -> impl Stream<Item = String> + Send + 'static {
        stream::iter(parts.iter().map(|p| p.to_string()).collect::<Vec<_>>())
    }

    fn fast_config() -> SpeechPipelineConfig {
        SpeechPipelineConfig::default()
            .with_workers(3)
            .with_synthesis_timeout(Duration::from_secs(2))
    }

    #[test]
    fn test_default_config() {
        let config = SpeechPipelineConfig::default();
        assert_eq!(config.dispatcher.workers, 1);
        assert_eq!(config.dispatcher.intake_depth, 5);
        assert_eq!(config.sequencer.completion_grace, Duration::from_secs(35));
        assert_eq!(config.event_capacity(), 6);
    }

    #[test]
    fn test_timeout_moves_grace() {
        let config = SpeechPipelineConfig::default().with_synthesis_timeout(Duration::from_secs(1));
        assert_eq!(config.sequencer.completion_grace, Duration::from_secs(6));

        let config = config.with_completion_grace(Duration::from_millis(1500));
        assert_eq!(config.dispatcher.synthesis_timeout, Duration::from_secs(1));
        assert_eq!(config.sequencer.completion_grace, Duration::from_millis(1500));
    }

    #[test]
    fn test_from_config() {
        let mut config = Config::default();
        config.synthesis.workers = 4;
        config.synthesis.intake_depth = 8;
        config.synthesis.timeout_ms = 1000;

        let pipeline_config = SpeechPipelineConfig::from_config(&config);
        assert_eq!(pipeline_config.dispatcher.workers, 4);
        assert_eq!(pipeline_config.dispatcher.intake_depth, 8);
        assert_eq!(pipeline_config.sequencer.completion_grace, Duration::from_secs(6));

        config.pipeline.completion_grace_ms = Some(250);
        let pipeline_config = SpeechPipelineConfig::from_config(&config);
        assert_eq!(
            pipeline_config.sequencer.completion_grace,
            Duration::from_millis(250)
        );
    }

    #[tokio::test]
    async fn test_plays_sentences_in_order_despite_fast_last_sentence() {
        let synth = MockSynthesizer::new("mock")
            .with_delay_for("Hi there.", Duration::from_millis(60))
            .with_delay_for("How are you?", Duration::from_millis(30));
        let player = MockPlayer::new();

        let summary = SpeechPipeline::with_config(fast_config())
            .run(
                fragments(&["Hi there. How ", "are you? I'm ", "fine."]),
                Arc::new(synth),
                Arc::new(player.clone()),
            )
            .await
            .unwrap();

        assert_eq!(
            player.played_texts(),
            vec!["Hi there.", "How are you?", "I'm fine."]
        );
        assert_eq!(summary.sentences, 3);
        assert_eq!(summary.played, 3);
        assert!(summary.is_complete());
        assert!(!player.overlapped());
    }

    #[tokio::test]
    async fn test_empty_stream_finishes_without_playing() {
        let player = MockPlayer::new();
        let summary = SpeechPipeline::new()
            .run(
                fragments(&["", "   "]),
                Arc::new(MockSynthesizer::new("mock")),
                Arc::new(player.clone()),
            )
            .await
            .unwrap();

        assert_eq!(summary.sentences, 0);
        assert_eq!(summary.outcome, SequencerOutcome::Finished);
        assert!(player.played_indices().is_empty());
    }

    #[tokio::test]
    async fn test_synthesis_failure_is_skipped() {
        let synth = MockSynthesizer::new("mock").with_failure_for("Two.");
        let reporter = Arc::new(CollectingReporter::new());
        let player = MockPlayer::new();

        let summary = SpeechPipeline::with_config(fast_config())
            .with_error_reporter(reporter.clone())
            .run(
                fragments(&["One. Two. ", "Three."]),
                Arc::new(synth),
                Arc::new(player.clone()),
            )
            .await
            .unwrap();

        assert_eq!(player.played_texts(), vec!["One.", "Three."]);
        assert_eq!(summary.skipped, 1);
        assert!(matches!(
            reporter.faults()[0].1,
            PipelineFault::Synthesis { index: 1, .. }
        ));
    }

    #[tokio::test]
    async fn test_splitter_failure_speaks_buffer_whole() {
        struct BrokenSplitter;

        impl SentenceSplitter for BrokenSplitter {
            fn split(&self, _text: &str) -> Result<Vec<String>> {
                Err(SayflowError::Segmentation {
                    message: "splitter unavailable".to_string(),
                })
            }
        }

        let reporter = Arc::new(CollectingReporter::new());
        let player = MockPlayer::new();

        let summary = SpeechPipeline::new()
            .with_splitter(Box::new(BrokenSplitter))
            .with_error_reporter(reporter.clone())
            .run(
                fragments(&["One. ", "Two."]),
                Arc::new(MockSynthesizer::new("mock")),
                Arc::new(player.clone()),
            )
            .await
            .unwrap();

        assert_eq!(player.played_texts(), vec!["One. Two."]);
        assert_eq!(summary.sentences, 1);
        assert!(matches!(
            reporter.faults()[0].1,
            PipelineFault::Segmentation(_)
        ));
    }

    fn numbered_sentences(n: usize) -> String {
        (0..n).map(|i| format!("Sentence {i}. ")).collect()
    }

    #[tokio::test]
    async fn test_stalled_first_sentence_bounds_finished_audio() {
        let synth = MockSynthesizer::new("mock")
            .with_delay_for("Sentence 0.", Duration::from_secs(5));
        let config = SpeechPipelineConfig::default()
            .with_workers(2)
            .with_intake_depth(2)
            .with_synthesis_timeout(Duration::from_secs(10));
        let text = numbered_sentences(200);

        let handle = SpeechPipeline::with_config(config).start(
            fragments(&[text.as_str()]),
            Arc::new(synth.clone()),
            Arc::new(MockPlayer::new()),
        );
        tokio::time::sleep(Duration::from_millis(300)).await;
        handle.stop();

        let summary = tokio::time::timeout(Duration::from_secs(2), handle.wait())
            .await
            .expect("stop should end the run")
            .unwrap();
        assert_eq!(summary.outcome, SequencerOutcome::Stopped);
        assert!(summary.abandoned <= 2, "held {} finished sentences", summary.abandoned);
        assert!(synth.calls() <= 2, "synthesized {} sentences ahead", synth.calls());
    }

    #[tokio::test]
    async fn test_slow_first_sentence_with_shallow_intake_finishes() {
        let synth = MockSynthesizer::new("mock")
            .with_delay_for("Sentence 0.", Duration::from_millis(100));
        let player = MockPlayer::new();
        let config = SpeechPipelineConfig::default()
            .with_workers(2)
            .with_intake_depth(2)
            .with_synthesis_timeout(Duration::from_secs(2));

        let summary = SpeechPipeline::with_config(config)
            .run(
                fragments(&[numbered_sentences(10).as_str()]),
                Arc::new(synth),
                Arc::new(player.clone()),
            )
            .await
            .unwrap();

        assert!(summary.is_complete());
        assert_eq!(player.played_indices(), (0..10).collect::<Vec<u64>>());
    }

    #[tokio::test]
    async fn test_files_removed_after_run() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::directory(dir.path(), "run", "opus");
        let player = MockPlayer::new();

        let summary = SpeechPipeline::with_config(fast_config())
            .with_artifact_store(store)
            .run(
                fragments(&["First one. Second one. Third one."]),
                Arc::new(MockSynthesizer::new("mock")),
                Arc::new(player.clone()),
            )
            .await
            .unwrap();

        assert_eq!(summary.played, 3);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_runs_sharing_a_store_keep_their_audio() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::directory(dir.path(), "shared", "opus");
        let synth = MockSynthesizer::new("mock").with_delay(Duration::from_millis(20));
        let player_a = MockPlayer::new();
        let player_b = MockPlayer::new();

        let run_a = SpeechPipeline::with_config(fast_config())
            .with_artifact_store(store.clone())
            .run(
                fragments(&["Alpha one. Alpha two."]),
                Arc::new(synth.clone()),
                Arc::new(player_a.clone()),
            );
        let run_b = SpeechPipeline::with_config(fast_config())
            .with_artifact_store(store)
            .run(
                fragments(&["Bravo one. Bravo two."]),
                Arc::new(synth),
                Arc::new(player_b.clone()),
            );
        let (a, b) = tokio::join!(run_a, run_b);

        assert!(a.unwrap().is_complete());
        assert!(b.unwrap().is_complete());
        assert_eq!(player_a.played_texts(), vec!["Alpha one.", "Alpha two."]);
        assert_eq!(player_b.played_texts(), vec!["Bravo one.", "Bravo two."]);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_stop_ends_open_stream() {
        let handle = SpeechPipeline::new().start(
            fragments(&["Said before stop. "]).chain(stream::pending()),
            Arc::new(MockSynthesizer::new("mock")),
            Arc::new(MockPlayer::new()),
        );
        assert!(handle.is_running());

        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.stop();
        assert!(!handle.is_running());

        let summary = tokio::time::timeout(Duration::from_secs(1), handle.wait())
            .await
            .expect("stop should end the run")
            .unwrap();
        assert_eq!(summary.outcome, SequencerOutcome::Stopped);
        assert_eq!(summary.played, 0, "unconfirmed sentence is never played");
    }

    #[tokio::test]
    async fn test_stop_with_hanging_synthesis_returns_promptly() {
        let handle = SpeechPipeline::with_config(
            SpeechPipelineConfig::default().with_synthesis_timeout(Duration::from_secs(30)),
        )
        .start(
            fragments(&["One. Two. Three."]),
            Arc::new(MockSynthesizer::new("mock").hanging()),
            Arc::new(MockPlayer::new()),
        );

        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.stop_signal().stop();

        let summary = tokio::time::timeout(Duration::from_secs(1), handle.wait())
            .await
            .expect("stop must not wait for hung synthesis")
            .unwrap();
        assert_eq!(summary.outcome, SequencerOutcome::Stopped);
    }
}

//! Text-to-speech synthesis backends.

#[cfg(feature = "http")]
pub mod http;

use crate::error::{Result, SayflowError};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Trait for text-to-speech synthesis.
///
/// This trait allows swapping implementations (remote service vs mock).
/// Retry policy, if any, belongs to the implementation; the pipeline calls
/// each sentence exactly once.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Synthesize one sentence into encoded audio bytes.
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>>;

    /// Name for logging.
    fn name(&self) -> &str;
}

/// Implement Synthesizer for Arc<T> to allow sharing across runs.
#[async_trait]
impl<T: Synthesizer + ?Sized> Synthesizer for Arc<T> {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        (**self).synthesize(text).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Mock synthesizer for testing.
///
/// Returns the sentence text as "audio" bytes. Latency, failures and hangs can
/// be configured per sentence text.
#[derive(Debug, Clone, Default)]
pub struct MockSynthesizer {
    name: String,
    delay: Duration,
    delays: HashMap<String, Duration>,
    failures: HashSet<String>,
    hangs: HashSet<String>,
    hang_all: bool,
    calls: Arc<AtomicUsize>,
    active: Arc<AtomicUsize>,
    max_active: Arc<AtomicUsize>,
}

impl MockSynthesizer {
    /// Create a new mock synthesizer with no latency.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    /// Delay every call by `delay` unless a per-sentence delay applies.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Delay calls for exactly `text` by `delay`.
    pub fn with_delay_for(mut self, text: &str, delay: Duration) -> Self {
        self.delays.insert(text.to_string(), delay);
        self
    }

    /// Fail calls for exactly `text`.
    pub fn with_failure_for(mut self, text: &str) -> Self {
        self.failures.insert(text.to_string());
        self
    }

    /// Never return for exactly `text`.
    pub fn with_hang_for(mut self, text: &str) -> Self {
        self.hangs.insert(text.to_string());
        self
    }

    /// Never return for any text.
    pub fn hanging(mut self) -> Self {
        self.hang_all = true;
        self
    }

    /// Number of synthesize calls started so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of calls that were running at the same time.
    pub fn max_concurrent(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Synthesizer for MockSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let current = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(current, Ordering::SeqCst);

        if self.hang_all || self.hangs.contains(text) {
            std::future::pending::<()>().await;
        }

        let delay = self.delays.get(text).copied().unwrap_or(self.delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        self.active.fetch_sub(1, Ordering::SeqCst);
        if self.failures.contains(text) {
            return Err(SayflowError::Synthesis {
                message: "mock synthesis failure".to_string(),
            });
        }
        Ok(text.as_bytes().to_vec())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn test_mock_returns_text_bytes() {
        let synth = MockSynthesizer::new("mock");
        let audio = synth.synthesize("Hello.").await.unwrap();
        assert_eq!(audio, b"Hello.");
        assert_eq!(synth.calls(), 1);
    }

    #[tokio::test]
    async fn test_mock_failure_for_text() {
        let synth = MockSynthesizer::new("mock").with_failure_for("Bad.");

        assert!(synth.synthesize("Good.").await.is_ok());
        match synth.synthesize("Bad.").await {
            Err(SayflowError::Synthesis { message }) => {
                assert_eq!(message, "mock synthesis failure");
            }
            other => panic!("Expected Synthesis error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_mock_delay_for_text() {
        let synth =
            MockSynthesizer::new("mock").with_delay_for("Slow.", Duration::from_millis(40));

        let start = Instant::now();
        synth.synthesize("Fast.").await.unwrap();
        assert!(start.elapsed() < Duration::from_millis(40));

        let start = Instant::now();
        synth.synthesize("Slow.").await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(40));
    }

    #[tokio::test]
    async fn test_mock_hang() {
        let synth = MockSynthesizer::new("mock").with_hang_for("Stuck.");
        let result =
            tokio::time::timeout(Duration::from_millis(30), synth.synthesize("Stuck.")).await;
        assert!(result.is_err(), "hanging call should not return");
    }

    #[tokio::test]
    async fn test_mock_clones_share_counters() {
        let synth = MockSynthesizer::new("mock");
        let shared: Arc<dyn Synthesizer> = Arc::new(synth.clone());

        shared.synthesize("One.").await.unwrap();
        shared.synthesize("Two.").await.unwrap();

        assert_eq!(synth.calls(), 2);
        assert_eq!(shared.name(), "mock");
    }
}

//! Audio playback backends.
//!
//! The sequencer calls [`Player::play`] one artifact at a time, strictly in
//! sentence order, and waits for it to return before playing the next one.

pub mod command;

use crate::error::{Result, SayflowError};
use crate::speech::artifact::AudioArtifact;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub use command::CommandPlayer;

/// Pluggable audio output.
#[async_trait]
pub trait Player: Send + Sync {
    /// Play one artifact to completion.
    async fn play(&self, artifact: &AudioArtifact) -> Result<()>;

    /// Name for logging.
    fn name(&self) -> &str {
        "player"
    }
}

#[async_trait]
impl<T: Player + ?Sized> Player for Arc<T> {
    async fn play(&self, artifact: &AudioArtifact) -> Result<()> {
        (**self).play(artifact).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Mock player that records what it was asked to play.
#[derive(Debug, Clone, Default)]
pub struct MockPlayer {
    played: Arc<Mutex<Vec<(u64, Vec<u8>)>>>,
    failures: HashSet<u64>,
    delay: Duration,
    playing: Arc<AtomicBool>,
    overlapped: Arc<AtomicBool>,
}

impl MockPlayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail when asked to play `index`.
    pub fn with_failure_on(mut self, index: u64) -> Self {
        self.failures.insert(index);
        self
    }

    /// Take `delay` for every playback.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Indices in the order `play` was called (including failed attempts).
    pub fn played_indices(&self) -> Vec<u64> {
        self.entries().into_iter().map(|(index, _)| index).collect()
    }

    /// Payloads as UTF-8 text, in play order.
    pub fn played_texts(&self) -> Vec<String> {
        self.entries()
            .into_iter()
            .map(|(_, bytes)| String::from_utf8_lossy(&bytes).to_string())
            .collect()
    }

    /// Returns true if `play` was ever entered while another call was running.
    pub fn overlapped(&self) -> bool {
        self.overlapped.load(Ordering::SeqCst)
    }

    fn entries(&self) -> Vec<(u64, Vec<u8>)> {
        match self.played.lock() {
            Ok(played) => played.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl Player for MockPlayer {
    async fn play(&self, artifact: &AudioArtifact) -> Result<()> {
        if self.playing.swap(true, Ordering::SeqCst) {
            self.overlapped.store(true, Ordering::SeqCst);
        }

        let bytes = artifact.bytes().await?;
        {
            let mut played = match self.played.lock() {
                Ok(played) => played,
                Err(poisoned) => poisoned.into_inner(),
            };
            played.push((artifact.index(), bytes));
        }

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.playing.store(false, Ordering::SeqCst);

        if self.failures.contains(&artifact.index()) {
            return Err(SayflowError::Playback {
                message: "mock playback failure".to_string(),
            });
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "mock"
    }
}

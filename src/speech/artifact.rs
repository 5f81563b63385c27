//! Transient audio artifacts and their storage.
//!
//! An [`AudioArtifact`] owns the synthesized audio for one sentence. When the
//! payload lives on disk, the file is deleted on [`AudioArtifact::release`] or,
//! failing that, when the artifact is dropped. Abandoned, discarded and
//! undeliverable artifacts therefore never leave files behind.

use crate::defaults;
use crate::error::{Result, SayflowError};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// Runs started by this process, for per-run file prefixes.
static RUN_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Where an artifact's audio bytes live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioPayload {
    /// Bytes held in memory.
    Memory(Vec<u8>),
    /// Bytes persisted to a file owned by the artifact.
    File(PathBuf),
}

/// Synthesized audio for one sentence index.
#[derive(Debug)]
pub struct AudioArtifact {
    index: u64,
    payload: AudioPayload,
    released: bool,
}

impl AudioArtifact {
    /// Creates an artifact holding its bytes in memory.
    pub fn in_memory(index: u64, bytes: Vec<u8>) -> Self {
        Self {
            index,
            payload: AudioPayload::Memory(bytes),
            released: false,
        }
    }

    /// Creates an artifact that owns (and will delete) `path`.
    pub fn from_file(index: u64, path: PathBuf) -> Self {
        Self {
            index,
            payload: AudioPayload::File(path),
            released: false,
        }
    }

    /// Sentence index this audio belongs to.
    pub fn index(&self) -> u64 {
        self.index
    }

    /// The payload handle.
    pub fn payload(&self) -> &AudioPayload {
        &self.payload
    }

    /// Path of the backing file, if persisted.
    pub fn path(&self) -> Option<&Path> {
        match &self.payload {
            AudioPayload::File(path) => Some(path),
            AudioPayload::Memory(_) => None,
        }
    }

    /// Reads the audio bytes regardless of where they live.
    pub async fn bytes(&self) -> Result<Vec<u8>> {
        match &self.payload {
            AudioPayload::Memory(bytes) => Ok(bytes.clone()),
            AudioPayload::File(path) => {
                tokio::fs::read(path)
                    .await
                    .map_err(|e| SayflowError::Artifact {
                        index: self.index,
                        message: format!("failed to read {}: {}", path.display(), e),
                    })
            }
        }
    }

    /// Releases the underlying resource now, surfacing removal errors.
    ///
    /// A file that is already gone counts as released.
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        remove_backing_file(self.index, &self.payload)
    }
}

impl Drop for AudioArtifact {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = remove_backing_file(self.index, &self.payload) {
            tracing::warn!(index = self.index, error = %e, "failed to clean up audio artifact");
        }
    }
}

fn remove_backing_file(index: u64, payload: &AudioPayload) -> Result<()> {
    let AudioPayload::File(path) = payload else {
        return Ok(());
    };
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(SayflowError::Artifact {
            index,
            message: format!("failed to remove {}: {}", path.display(), e),
        }),
    }
}

/// Turns synthesized bytes into artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactStore {
    /// Keep audio in memory.
    Memory,
    /// Persist audio as `<dir>/<prefix>_<index:05>.<extension>`.
    Directory {
        dir: PathBuf,
        prefix: String,
        extension: String,
    },
}

impl ArtifactStore {
    /// Store that keeps audio in memory.
    pub fn in_memory() -> Self {
        ArtifactStore::Memory
    }

    /// Store that persists audio files into `dir`.
    pub fn directory(
        dir: impl Into<PathBuf>,
        prefix: impl Into<String>,
        extension: impl Into<String>,
    ) -> Self {
        ArtifactStore::Directory {
            dir: dir.into(),
            prefix: prefix.into(),
            extension: extension.into(),
        }
    }

    /// Directory store under the system temp dir with a per-process prefix.
    pub fn temp_dir() -> Self {
        Self::directory(
            defaults::artifact_dir(),
            defaults::artifact_prefix(),
            defaults::ARTIFACT_EXTENSION,
        )
    }

    /// Narrows the store to a single run.
    ///
    /// Every run numbers its sentences from 0, so directory stores get a
    /// process-wide run number appended to the prefix. Runs sharing a store
    /// never touch each other's files.
    pub fn for_run(&self) -> Self {
        match self {
            ArtifactStore::Memory => ArtifactStore::Memory,
            ArtifactStore::Directory {
                dir,
                prefix,
                extension,
            } => {
                let run = RUN_COUNTER.fetch_add(1, Ordering::Relaxed);
                ArtifactStore::Directory {
                    dir: dir.clone(),
                    prefix: format!("{prefix}-r{run}"),
                    extension: extension.clone(),
                }
            }
        }
    }

    /// Deterministic file path for `index`, or `None` for the memory store.
    pub fn path_for(&self, index: u64) -> Option<PathBuf> {
        match self {
            ArtifactStore::Memory => None,
            ArtifactStore::Directory {
                dir,
                prefix,
                extension,
            } => Some(dir.join(format!("{prefix}_{index:05}.{extension}"))),
        }
    }

    /// Wraps synthesized bytes for `index` into an artifact.
    pub async fn persist(&self, index: u64, bytes: Vec<u8>) -> Result<AudioArtifact> {
        let (ArtifactStore::Directory { dir, .. }, Some(path)) = (self, self.path_for(index)) else {
            return Ok(AudioArtifact::in_memory(index, bytes));
        };

        let to_artifact_error = |e: std::io::Error| SayflowError::Artifact {
            index,
            message: format!("failed to write {}: {}", path.display(), e),
        };
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(to_artifact_error)?;
        tokio::fs::write(&path, &bytes)
            .await
            .map_err(to_artifact_error)?;

        Ok(AudioArtifact::from_file(index, path))
    }
}

impl Default for ArtifactStore {
    fn default() -> Self {
        Self::temp_dir()
    }
}

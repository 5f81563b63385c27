//! Streaming speech pipeline: sentence segmentation and ordered synthesis.
//!
//! Implements a multi-station pipeline architecture:
//! ```text
//! ┌───────────┐    ┌───────────┐  intake  ┌──────────────┐ completions ┌───────────┐    ┌────────┐
//! │  Token    │───▶│ Segmenter │─────────▶│  Dispatcher  │────────────▶│ Sequencer │───▶│ Player │
//! │  stream   │    │           │ (depth B)│  (W workers) │ (any order) │ (pending) │    │        │
//! └───────────┘    └───────────┘          └──────────────┘             └───────────┘    └────────┘
//!                        │                                                   ▲
//!                        └────────── end of stream { total } ────────────────┘
//! ```
//!
//! Sentences are synthesized concurrently and played strictly in the order
//! they were segmented.

pub mod artifact;
pub mod dispatcher;
pub mod pipeline;
pub mod report;
pub mod segmenter;
pub mod sequencer;
pub mod types;

pub use artifact::{ArtifactStore, AudioArtifact, AudioPayload};
pub use dispatcher::{Dispatcher, DispatcherConfig, DispatcherHandle, InFlight};
pub use pipeline::{RunSummary, SpeechPipeline, SpeechPipelineConfig, SpeechPipelineHandle};
pub use report::{CollectingReporter, ErrorReporter, LogReporter, PipelineFault, Violation};
pub use segmenter::{Segmenter, SentenceSplitter, UnicodeSentenceSplitter};
pub use sequencer::{Sequencer, SequencerConfig, SequencerOutcome, SequencerReport};
pub use types::{
    Completion, SentenceUnit, SequencerEvent, StopListener, StopSignal, SynthesisOutcome,
};

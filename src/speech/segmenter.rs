//! Sentence segmenter for incrementally arriving text.
//!
//! Accumulates token fragments and confirms a sentence only once text after it
//! shows up: the last segment the splitter returns may still grow, so it is
//! held back until the next boundary or until [`Segmenter::flush`].

use crate::defaults::SENTENCE_TERMINALS;
use crate::error::Result;
use crate::speech::report::{ErrorReporter, LogReporter, PipelineFault};
use crate::speech::types::SentenceUnit;
use std::sync::Arc;
use unicode_segmentation::UnicodeSegmentation;

/// Splits text into sentence segments.
///
/// Concatenating the returned segments should reproduce the input; the
/// segmenter keeps the last one verbatim as its new buffer.
pub trait SentenceSplitter: Send {
    fn split(&self, text: &str) -> Result<Vec<String>>;
}

/// Splitter based on Unicode sentence boundaries (UAX #29).
///
/// Abbreviations followed by a capitalized word ("Dr. Smith") split early;
/// decimals ("3.14") do not split.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnicodeSentenceSplitter;

impl SentenceSplitter for UnicodeSentenceSplitter {
    fn split(&self, text: &str) -> Result<Vec<String>> {
        Ok(text.split_sentence_bounds().map(str::to_string).collect())
    }
}

/// Turns a stream of text fragments into indexed sentences.
pub struct Segmenter {
    splitter: Box<dyn SentenceSplitter>,
    reporter: Arc<dyn ErrorReporter>,
    buffer: String,
    next_index: u64,
    flushed: bool,
}

impl Segmenter {
    /// Creates a segmenter using Unicode sentence boundaries.
    pub fn new() -> Self {
        Self::with_splitter(Box::new(UnicodeSentenceSplitter))
    }

    /// Creates a segmenter with a custom splitter.
    pub fn with_splitter(splitter: Box<dyn SentenceSplitter>) -> Self {
        Self {
            splitter,
            reporter: Arc::new(LogReporter),
            buffer: String::new(),
            next_index: 0,
            flushed: false,
        }
    }

    /// Sets a custom error reporter.
    pub fn with_error_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Appends a fragment and returns the sentences it completed.
    ///
    /// Boundary detection only runs when the fragment itself contains
    /// sentence-terminal punctuation.
    pub fn ingest(&mut self, fragment: &str) -> Vec<SentenceUnit> {
        if self.flushed {
            tracing::warn!(fragment, "fragment after flush ignored");
            return Vec::new();
        }
        if fragment.trim().is_empty() {
            // Keep spacing between tokens, but never split on it.
            if !self.buffer.is_empty() {
                self.buffer.push_str(fragment);
            }
            return Vec::new();
        }

        self.buffer.push_str(fragment);
        if !fragment.contains(SENTENCE_TERMINALS) {
            return Vec::new();
        }

        let mut segments = self.split_buffer();
        if segments.len() < 2 {
            return Vec::new();
        }

        // The last segment may still be extended by later fragments.
        self.buffer = segments.pop().unwrap_or_default();
        segments
            .iter()
            .filter_map(|segment| self.confirm(segment))
            .collect()
    }

    /// Emits whatever remains buffered, with or without terminal punctuation.
    ///
    /// Only the first call does anything; afterwards the sentence count is
    /// final.
    pub fn flush(&mut self) -> Vec<SentenceUnit> {
        if self.flushed {
            return Vec::new();
        }
        self.flushed = true;

        if self.buffer.trim().is_empty() {
            self.buffer.clear();
            return Vec::new();
        }

        let segments = self.split_buffer();
        self.buffer.clear();
        segments
            .iter()
            .filter_map(|segment| self.confirm(segment))
            .collect()
    }

    /// Number of sentence indices issued so far.
    pub fn sentence_count(&self) -> u64 {
        self.next_index
    }

    /// Text held back waiting for a boundary.
    pub fn buffered(&self) -> &str {
        &self.buffer
    }

    /// Returns true once [`flush`](Self::flush) has run.
    pub fn is_flushed(&self) -> bool {
        self.flushed
    }

    fn split_buffer(&self) -> Vec<String> {
        match self.splitter.split(&self.buffer) {
            Ok(segments) => segments,
            Err(e) => {
                self.reporter
                    .report("segmenter", &PipelineFault::Segmentation(e.to_string()));
                vec![self.buffer.clone()]
            }
        }
    }

    fn confirm(&mut self, segment: &str) -> Option<SentenceUnit> {
        let text = segment.trim();
        if text.is_empty() {
            return None;
        }
        let unit = SentenceUnit::new(self.next_index, text);
        self.next_index += 1;
        tracing::debug!(index = unit.index, text = %unit.text, "sentence confirmed");
        Some(unit)
    }
}

impl Default for Segmenter {
    fn default() -> Self {
        Self::new()
    }
}

//! Streaming response pipeline — token stream in, utterance units out.
//!
//! Tokens accumulate in a buffer; on a sentence-terminal boundary (terminal
//! punctuation followed by whitespace, with common abbreviations filtered
//! out) the buffer is flushed as one unit, immediately eligible for speech
//! synthesis, so audio can start before generation finishes.
//!
//! Units partition the streamed text exactly: concatenating every emitted
//! unit (plus the final flush) reproduces the stream byte for byte.

use sotto_core::error::ProviderError;
use sotto_core::message::MessageToolCall;
use sotto_core::provider::{StreamChunk, Usage};
use std::collections::VecDeque;
use tokio::sync::mpsc;

/// Words that end in a period without ending a sentence.
const ABBREVIATIONS: &[&str] = &[
    "mr.", "mrs.", "ms.", "dr.", "prof.", "sr.", "jr.", "vs.", "etc.", "e.g.", "i.e.", "a.m.",
    "p.m.", "inc.", "ltd.", "corp.", "st.", "ave.",
];

const DEFAULT_MIN_UNIT_CHARS: usize = 10;

/// Detects sentence boundaries in accumulating text.
pub struct SentenceSegmenter {
    buffer: String,
    min_unit_chars: usize,
}

impl SentenceSegmenter {
    pub fn new() -> Self {
        Self {
            buffer: String::new(),
            min_unit_chars: DEFAULT_MIN_UNIT_CHARS,
        }
    }

    /// Minimum characters before a candidate counts as a full sentence;
    /// shorter fragments ride along with the next unit.
    pub fn with_min_unit_chars(mut self, min: usize) -> Self {
        self.min_unit_chars = min;
        self
    }

    /// Add streamed text, returning any units completed by it.
    pub fn push(&mut self, text: &str) -> Vec<String> {
        self.buffer.push_str(text);

        let mut units = Vec::new();
        while let Some(end) = self.next_boundary() {
            units.push(self.buffer[..end].to_string());
            self.buffer.drain(..end);
        }
        units
    }

    /// Take whatever remains, even without terminal punctuation. Returns
    /// `None` when only whitespace (or nothing) is left; that tail is
    /// dropped rather than sent to synthesis.
    pub fn flush(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        if rest.trim().is_empty() { None } else { Some(rest) }
    }

    /// Byte index just past the first acceptable sentence boundary, if any.
    fn next_boundary(&self) -> Option<usize> {
        let bytes = self.buffer.as_bytes();
        let mut i = 0;

        while i < bytes.len() {
            if matches!(bytes[i], b'.' | b'!' | b'?') {
                // Consume the whole punctuation run
                let mut end = i + 1;
                while end < bytes.len() && matches!(bytes[end], b'.' | b'!' | b'?') {
                    end += 1;
                }
                // A boundary needs trailing whitespace; consume all of it
                if end < bytes.len() && bytes[end].is_ascii_whitespace() {
                    while end < bytes.len() && bytes[end].is_ascii_whitespace() {
                        end += 1;
                    }
                    if self.acceptable(&self.buffer[..end]) {
                        return Some(end);
                    }
                }
                i = end;
            } else {
                i += 1;
            }
        }
        None
    }

    /// Long enough, and not ending on a known abbreviation.
    fn acceptable(&self, candidate: &str) -> bool {
        let trimmed = candidate.trim();
        if trimmed.len() < self.min_unit_chars {
            return false;
        }
        let last_word = trimmed
            .rsplit(char::is_whitespace)
            .next()
            .unwrap_or("")
            .to_lowercase();
        !ABBREVIATIONS.contains(&last_word.as_str())
    }
}

impl Default for SentenceSegmenter {
    fn default() -> Self {
        Self::new()
    }
}

/// A cooperative, pull-based stream of utterance units over a provider
/// token stream.
///
/// Finite — it ends when the underlying stream ends — and not restartable;
/// a new stream needs a new instance. If the provider errors mid-stream,
/// the partial buffer is flushed as a best-effort final unit and the error
/// is yielded afterwards, so the caller decides whether to speak the
/// partial unit.
pub struct UtteranceStream {
    rx: mpsc::Receiver<Result<StreamChunk, ProviderError>>,
    segmenter: SentenceSegmenter,
    ready: VecDeque<String>,
    tool_calls: Vec<MessageToolCall>,
    usage: Option<Usage>,
    pending_error: Option<ProviderError>,
    finished: bool,
}

impl UtteranceStream {
    pub fn new(rx: mpsc::Receiver<Result<StreamChunk, ProviderError>>) -> Self {
        Self {
            rx,
            segmenter: SentenceSegmenter::new(),
            ready: VecDeque::new(),
            tool_calls: Vec::new(),
            usage: None,
            pending_error: None,
            finished: false,
        }
    }

    pub fn with_min_unit_chars(mut self, min: usize) -> Self {
        self.segmenter = SentenceSegmenter::new().with_min_unit_chars(min);
        self
    }

    /// Pull the next completed unit. `None` means the stream is drained.
    pub async fn next_unit(&mut self) -> Option<Result<String, ProviderError>> {
        loop {
            if let Some(unit) = self.ready.pop_front() {
                return Some(Ok(unit));
            }
            if let Some(e) = self.pending_error.take() {
                self.finished = true;
                return Some(Err(e));
            }
            if self.finished {
                return None;
            }

            match self.rx.recv().await {
                Some(Ok(chunk)) => {
                    if let Some(content) = &chunk.content {
                        self.ready.extend(self.segmenter.push(content));
                    }
                    if !chunk.tool_calls.is_empty() {
                        self.tool_calls.extend(chunk.tool_calls);
                    }
                    if chunk.usage.is_some() {
                        self.usage = chunk.usage;
                    }
                    if chunk.done {
                        self.ready.extend(self.segmenter.flush());
                        self.finished = true;
                    }
                }
                Some(Err(e)) => {
                    // Best-effort partial unit, then the error
                    self.ready.extend(self.segmenter.flush());
                    self.pending_error = Some(e);
                }
                None => {
                    self.ready.extend(self.segmenter.flush());
                    self.finished = true;
                }
            }
        }
    }

    /// Tool calls accumulated from the stream (complete once drained).
    pub fn tool_calls(&self) -> &[MessageToolCall] {
        &self.tool_calls
    }

    /// Usage reported by the final chunk, if any.
    pub fn usage(&self) -> Option<Usage> {
        self.usage.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect_units(texts: &[&str]) -> (Vec<String>, Option<String>) {
        let mut seg = SentenceSegmenter::new();
        let mut units = Vec::new();
        for t in texts {
            units.extend(seg.push(t));
        }
        (units, seg.flush())
    }

    #[test]
    fn splits_on_sentence_boundaries() {
        let (units, rest) =
            collect_units(&["The kettle is on. ", "Tea will be ready in four minutes."]);
        assert_eq!(units, vec!["The kettle is on. "]);
        assert_eq!(rest.as_deref(), Some("Tea will be ready in four minutes."));
    }

    #[test]
    fn boundary_may_arrive_across_tokens() {
        let (units, rest) = collect_units(&["It is raining outside", ".", " ", "Take a coat."]);
        assert_eq!(units, vec!["It is raining outside. "]);
        assert_eq!(rest.as_deref(), Some("Take a coat."));
    }

    #[test]
    fn abbreviations_do_not_split() {
        let (units, rest) = collect_units(&["Ask Dr. Lee about e.g. the results. Then rest."]);
        assert_eq!(units, vec!["Ask Dr. Lee about e.g. the results. "]);
        assert_eq!(rest.as_deref(), Some("Then rest."));
    }

    #[test]
    fn short_fragments_ride_along() {
        // "No. " is under the minimum length, so it joins the next sentence
        let (units, rest) = collect_units(&["No. I would rather walk home today. Really."]);
        assert_eq!(units, vec!["No. I would rather walk home today. "]);
        assert_eq!(rest.as_deref(), Some("Really."));
    }

    #[test]
    fn exclamation_and_question_marks_split() {
        let (units, rest) = collect_units(&["What a day it was! Did you see the storm? I did."]);
        assert_eq!(
            units,
            vec!["What a day it was! ", "Did you see the storm? "]
        );
        assert_eq!(rest.as_deref(), Some("I did."));
    }

    #[test]
    fn ellipsis_treated_as_one_boundary() {
        let (units, rest) = collect_units(&["Well, let me think... That could work."]);
        assert_eq!(units, vec!["Well, let me think... "]);
        assert_eq!(rest.as_deref(), Some("That could work."));
    }

    #[test]
    fn reconstruction_is_exact() {
        let text = "One sentence here. Another one follows! A third? And a tail without ending";
        let mut seg = SentenceSegmenter::new();
        let mut out = String::new();
        // Feed in awkward 3-byte slices to stress token boundaries
        let bytes: Vec<char> = text.chars().collect();
        for chunk in bytes.chunks(3) {
            let s: String = chunk.iter().collect();
            for unit in seg.push(&s) {
                out.push_str(&unit);
            }
        }
        if let Some(rest) = seg.flush() {
            out.push_str(&rest);
        }
        assert_eq!(out, text);
    }

    #[test]
    fn whitespace_only_flush_is_none() {
        let mut seg = SentenceSegmenter::new();
        seg.push("   ");
        assert!(seg.flush().is_none());
    }

    // -- UtteranceStream ----------------------------------------------------

    async fn drain(
        mut stream: UtteranceStream,
    ) -> (Vec<String>, Option<ProviderError>, UtteranceStream) {
        let mut units = Vec::new();
        let mut error = None;
        while let Some(item) = stream.next_unit().await {
            match item {
                Ok(u) => units.push(u),
                Err(e) => error = Some(e),
            }
        }
        (units, error, stream)
    }

    fn content_chunk(text: &str) -> StreamChunk {
        StreamChunk {
            content: Some(text.into()),
            tool_calls: vec![],
            done: false,
            usage: None,
        }
    }

    #[tokio::test]
    async fn stream_emits_units_then_ends() {
        let (tx, rx) = mpsc::channel(8);
        tokio::spawn(async move {
            tx.send(Ok(content_chunk("The lights are off. "))).await.unwrap();
            tx.send(Ok(content_chunk("Good night"))).await.unwrap();
            tx.send(Ok(StreamChunk {
                content: None,
                tool_calls: vec![],
                done: true,
                usage: Some(Usage {
                    prompt_tokens: 5,
                    completion_tokens: 9,
                    total_tokens: 14,
                }),
            }))
            .await
            .unwrap();
        });

        let (units, error, stream) = drain(UtteranceStream::new(rx)).await;
        assert!(error.is_none());
        assert_eq!(units, vec!["The lights are off. ", "Good night"]);
        assert_eq!(stream.usage().unwrap().total_tokens, 14);
    }

    #[tokio::test]
    async fn midstream_error_flushes_partial_then_propagates() {
        let (tx, rx) = mpsc::channel(8);
        tokio::spawn(async move {
            tx.send(Ok(content_chunk("Here is the first part. and then"))).await.unwrap();
            tx.send(Err(ProviderError::StreamInterrupted("connection lost".into())))
                .await
                .unwrap();
        });

        let (units, error, _) = drain(UtteranceStream::new(rx)).await;
        assert_eq!(units, vec!["Here is the first part. ", "and then"]);
        assert!(matches!(error, Some(ProviderError::StreamInterrupted(_))));
    }

    #[tokio::test]
    async fn closed_channel_flushes_remainder() {
        let (tx, rx) = mpsc::channel(8);
        tx.send(Ok(content_chunk("Unfinished thought"))).await.unwrap();
        drop(tx);

        let (units, error, _) = drain(UtteranceStream::new(rx)).await;
        assert!(error.is_none());
        assert_eq!(units, vec!["Unfinished thought"]);
    }

    #[tokio::test]
    async fn tool_calls_collected_from_final_chunk() {
        let (tx, rx) = mpsc::channel(8);
        tx.send(Ok(StreamChunk {
            content: None,
            tool_calls: vec![MessageToolCall {
                id: "call_1".into(),
                name: "get_current_time".into(),
                arguments: "{}".into(),
            }],
            done: true,
            usage: None,
        }))
        .await
        .unwrap();
        drop(tx);

        let (units, error, stream) = drain(UtteranceStream::new(rx)).await;
        assert!(units.is_empty());
        assert!(error.is_none());
        assert_eq!(stream.tool_calls().len(), 1);
        assert_eq!(stream.tool_calls()[0].name, "get_current_time");
    }
}

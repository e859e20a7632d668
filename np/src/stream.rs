//! Streaming response handling
//!
//! Separates reasoning from content, forwards prose for live display until
//! the summary delimiter shows up, and splits the finished buffer into
//! prose and AI summary.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::events::EventEmitter;
use crate::llm::{CompletionRequest, LlmClient, LlmError, StreamChunk};

/// Separates chapter prose from its memory summary
pub const SUMMARY_DELIMITER: &str = "[AI_SUMMARY]";

/// Prose and summary parts of one response
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SplitResponse {
    pub content: String,
    pub summary: String,
}

/// Split a buffer on the first delimiter
///
/// A missing delimiter yields the whole buffer as content and an empty summary.
pub fn split_summary(buffer: &str) -> SplitResponse {
    match buffer.split_once(SUMMARY_DELIMITER) {
        Some((content, summary)) => SplitResponse {
            content: content.trim().to_string(),
            summary: summary.trim().to_string(),
        },
        None => SplitResponse {
            content: buffer.trim().to_string(),
            summary: String::new(),
        },
    }
}

/// What the live view should do with a content fragment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiveUpdate {
    /// Append the fragment
    Append(String),
    /// The delimiter just appeared; replace the view with this prose
    Reset(String),
    /// Nothing to show
    Suppressed,
}

/// Rolling content buffer with delimiter detection
#[derive(Debug, Default)]
pub struct StreamProcessor {
    buffer: String,
    delimiter_seen: bool,
}

impl StreamProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a content fragment and decide what to forward
    pub fn push_content(&mut self, fragment: &str) -> LiveUpdate {
        if fragment.is_empty() {
            return LiveUpdate::Suppressed;
        }
        self.buffer.push_str(fragment);

        if self.delimiter_seen {
            return LiveUpdate::Suppressed;
        }
        if self.buffer.contains(SUMMARY_DELIMITER) {
            debug!("StreamProcessor: summary delimiter observed");
            self.delimiter_seen = true;
            return LiveUpdate::Reset(split_summary(&self.buffer).content);
        }
        LiveUpdate::Append(fragment.to_string())
    }

    pub fn delimiter_seen(&self) -> bool {
        self.delimiter_seen
    }

    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Consume the processor and return the raw buffer
    pub fn into_buffer(self) -> String {
        self.buffer
    }

    /// Consume the processor and split the buffer
    pub fn finish(self) -> SplitResponse {
        split_summary(&self.buffer)
    }
}

/// Whether content fragments go to the live view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamMode {
    /// Chapter prose: forward content until the delimiter
    Prose,
    /// JSON payload: forward reasoning only, buffer content
    Structured,
}

/// How a streamed request ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamOutcome {
    /// The full raw content buffer
    Finished(String),
    /// Cancelled; the partial buffer was discarded
    Cancelled,
}

/// Run one streamed request to completion or cancellation
///
/// Cancellation is checked before the request, on every delta, and while
/// waiting; the in-flight transfer is dropped when it fires.
pub async fn run_stream(
    llm: &dyn LlmClient,
    request: CompletionRequest,
    mode: StreamMode,
    emitter: &EventEmitter,
    cancel: &CancellationToken,
) -> Result<StreamOutcome, LlmError> {
    debug!(?mode, json_mode = request.json_mode, "run_stream: called");
    if cancel.is_cancelled() {
        return Ok(StreamOutcome::Cancelled);
    }

    let (chunk_tx, mut chunk_rx) = mpsc::channel::<StreamChunk>(256);
    let call = llm.stream(request, chunk_tx);
    tokio::pin!(call);

    let mut processor = StreamProcessor::new();
    let mut result = None;
    let mut channel_open = true;

    while channel_open || result.is_none() {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                debug!(buffered = processor.buffer().len(), "run_stream: cancelled, discarding partial buffer");
                return Ok(StreamOutcome::Cancelled);
            }

            chunk = chunk_rx.recv(), if channel_open => match chunk {
                Some(StreamChunk::ReasoningDelta(text)) => emitter.reasoning(&text),
                Some(StreamChunk::TextDelta(text)) => {
                    let update = processor.push_content(&text);
                    if mode == StreamMode::Prose {
                        match update {
                            LiveUpdate::Append(t) => emitter.content(&t),
                            LiveUpdate::Reset(t) => emitter.content_reset(&t),
                            LiveUpdate::Suppressed => {}
                        }
                    }
                }
                Some(StreamChunk::MessageDone { stop_reason, usage }) => {
                    debug!(?stop_reason, ?usage, "run_stream: message done");
                }
                None => channel_open = false,
            },

            res = &mut call, if result.is_none() => {
                result = Some(res);
            }
        }
    }

    let response = match result {
        Some(r) => r?,
        None => return Err(LlmError::InvalidResponse("Stream ended without a result".to_string())),
    };

    // Clients that do not emit deltas still return the assembled content
    if processor.is_empty()
        && let Some(content) = response.content.as_deref()
        && !content.is_empty()
    {
        warn!("run_stream: no content deltas received, using assembled response");
        let update = processor.push_content(content);
        if mode == StreamMode::Prose
            && let LiveUpdate::Append(t) | LiveUpdate::Reset(t) = update
        {
            emitter.content_reset(&t);
        }
    }

    Ok(StreamOutcome::Finished(processor.into_buffer()))
}

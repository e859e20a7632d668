//! LlmClient trait definition

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{CompletionRequest, CompletionResponse, LlmError, StreamChunk};

/// Stateless LLM client - each call is independent
///
/// Every request carries its full context; no conversation state is kept
/// between calls.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Send a single completion request and wait for the full response
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;

    /// Streaming completion
    ///
    /// Sends reasoning and content deltas to the channel as they arrive and
    /// returns the assembled response. Dropping the returned future aborts
    /// the transfer.
    async fn stream(
        &self,
        request: CompletionRequest,
        chunk_tx: mpsc::Sender<StreamChunk>,
    ) -> Result<CompletionResponse, LlmError>;
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tracing::debug;

    /// One scripted reply
    #[derive(Debug, Clone)]
    pub enum MockReply {
        /// Stream the reasoning then the content, then finish
        Text { reasoning: String, content: String },
        /// Fail with a server error
        Fail(String),
        /// Stream the content, then never finish
        Stall(String),
    }

    impl MockReply {
        pub fn text(content: impl Into<String>) -> Self {
            MockReply::Text {
                reasoning: String::new(),
                content: content.into(),
            }
        }

        pub fn json(value: serde_json::Value) -> Self {
            Self::text(value.to_string())
        }
    }

    /// Mock LLM client for unit tests
    pub struct MockLlmClient {
        replies: Vec<MockReply>,
        call_count: AtomicUsize,
        requests: Mutex<Vec<CompletionRequest>>,
    }

    impl MockLlmClient {
        pub fn new(replies: Vec<MockReply>) -> Self {
            debug!(reply_count = %replies.len(), "MockLlmClient::new: called");
            Self {
                replies,
                call_count: AtomicUsize::new(0),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub fn call_count(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }

        /// Requests received so far
        pub fn requests(&self) -> Vec<CompletionRequest> {
            self.requests.lock().unwrap().clone()
        }

        fn next_reply(&self, request: &CompletionRequest) -> Result<MockReply, LlmError> {
            self.requests.lock().unwrap().push(request.clone());
            let idx = self.call_count.fetch_add(1, Ordering::SeqCst);
            debug!(%idx, "MockLlmClient: fetching reply");
            self.replies
                .get(idx)
                .cloned()
                .ok_or_else(|| LlmError::InvalidResponse("No more mock responses".to_string()))
        }
    }

    /// Split text into a few pieces on char boundaries
    fn pieces(text: &str) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        chars.chunks(7).map(|c| c.iter().collect()).collect()
    }

    #[async_trait]
    impl LlmClient for MockLlmClient {
        async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
            debug!("MockLlmClient::complete: called");
            match self.next_reply(&request)? {
                MockReply::Text { content, .. } => Ok(CompletionResponse::text(content)),
                MockReply::Fail(message) => Err(LlmError::ApiError { status: 500, message }),
                MockReply::Stall(_) => std::future::pending().await,
            }
        }

        async fn stream(
            &self,
            request: CompletionRequest,
            chunk_tx: mpsc::Sender<StreamChunk>,
        ) -> Result<CompletionResponse, LlmError> {
            debug!("MockLlmClient::stream: called");
            match self.next_reply(&request)? {
                MockReply::Text { reasoning, content } => {
                    if !reasoning.is_empty() {
                        let _ = chunk_tx.send(StreamChunk::ReasoningDelta(reasoning.clone())).await;
                    }
                    for piece in pieces(&content) {
                        let _ = chunk_tx.send(StreamChunk::TextDelta(piece)).await;
                    }
                    Ok(CompletionResponse {
                        content: Some(content),
                        reasoning: Some(reasoning),
                        ..Default::default()
                    })
                }
                MockReply::Fail(message) => Err(LlmError::ApiError { status: 500, message }),
                MockReply::Stall(partial) => {
                    let _ = chunk_tx.send(StreamChunk::TextDelta(partial)).await;
                    std::future::pending().await
                }
            }
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[tokio::test]
        async fn test_mock_client_returns_replies_in_order() {
            let client = MockLlmClient::new(vec![MockReply::text("one"), MockReply::text("two")]);
            let req = CompletionRequest::new("sys", "user", 0.7);

            let first = client.complete(req.clone()).await.unwrap();
            assert_eq!(first.content.as_deref(), Some("one"));
            let second = client.complete(req).await.unwrap();
            assert_eq!(second.content.as_deref(), Some("two"));
            assert_eq!(client.call_count(), 2);
        }

        #[tokio::test]
        async fn test_mock_stream_sends_deltas() {
            let client = MockLlmClient::new(vec![MockReply::Text {
                reasoning: "thinking".to_string(),
                content: "a fairly long piece of content".to_string(),
            }]);
            let (tx, mut rx) = mpsc::channel(64);
            client.stream(CompletionRequest::new("s", "u", 0.7), tx).await.unwrap();

            let mut text = String::new();
            let mut reasoning = String::new();
            while let Some(chunk) = rx.recv().await {
                match chunk {
                    StreamChunk::TextDelta(t) => text.push_str(&t),
                    StreamChunk::ReasoningDelta(r) => reasoning.push_str(&r),
                    StreamChunk::MessageDone { .. } => {}
                }
            }
            assert_eq!(text, "a fairly long piece of content");
            assert_eq!(reasoning, "thinking");
        }

        #[tokio::test]
        async fn test_mock_client_errors_when_exhausted() {
            let client = MockLlmClient::new(vec![]);
            assert!(client.complete(CompletionRequest::new("s", "u", 0.7)).await.is_err());
        }
    }
}

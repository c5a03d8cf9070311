//! Text-completion backends.
//!
//! The orchestrator talks to a [`CompletionBackend`]: given a system prompt
//! and a user message it returns either the full completion text or a
//! [`FragmentStream`] of incremental text.
//!
//! | Provider | Type | Wire format |
//! |----------|------|-------------|
//! | `anthropic` | [`AnthropicBackend`] | Messages API, SSE `content_block_delta` events |
//! | `openai-compatible` | [`ChatCompletionsBackend`] | `/chat/completions`, SSE `data:` chunks ending in `[DONE]` |
//!
//! Failures are never retried. Every HTTP call and every streamed fragment is
//! bounded by the configured timeout; a timeout is an ordinary
//! [`CompletionError`]. Dropping a [`FragmentStream`] drops the underlying
//! response and releases its connection.

mod anthropic;
mod chat;
#[cfg(any(test, feature = "test-utils"))]
mod mock;

pub use anthropic::AnthropicBackend;
pub use chat::ChatCompletionsBackend;
#[cfg(any(test, feature = "test-utils"))]
pub use mock::StaticBackend;

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use eventsource_stream::{Event, Eventsource};
use futures::stream::{self, Stream, StreamExt};
use thiserror::Error;

use crate::config::CompletionConfig;

/// One completion call.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system_prompt: String,
    pub user_message: String,
    pub max_output_tokens: u32,
}

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("API key not found (environment variable {0} is not set)")]
    MissingCredentials(String),
    #[error("API returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("no response within {0} seconds")]
    Timeout(u64),
    #[error("stream failed: {0}")]
    Stream(String),
}

/// Ordered, finite sequence of completion text fragments.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, CompletionError>> + Send>>;

#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Provider name for logging.
    fn name(&self) -> &str;

    /// Return the whole completion at once.
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError>;

    /// Start a streamed completion.
    async fn stream(&self, request: &CompletionRequest) -> Result<FragmentStream, CompletionError>;
}

/// Build the configured backend, reading credentials from the environment.
pub fn create_backend(
    config: &CompletionConfig,
) -> Result<Arc<dyn CompletionBackend>, CompletionError> {
    let api_key = config
        .api_key()
        .ok_or_else(|| CompletionError::MissingCredentials(config.api_key_env.clone()))?;
    let timeout = Duration::from_secs(config.timeout_secs);

    let backend: Arc<dyn CompletionBackend> = match config.provider.as_str() {
        "openai-compatible" => Arc::new(ChatCompletionsBackend::new(
            api_key,
            config.model.clone(),
            config.base_url.clone(),
            timeout,
        )?),
        _ => Arc::new(AnthropicBackend::new(
            api_key,
            config.model.clone(),
            config.base_url.clone(),
            timeout,
        )?),
    };
    Ok(backend)
}

/// What one SSE event means for the fragment stream.
pub(crate) enum SseStep {
    Text(String),
    Skip,
    Stop,
}

/// Turn an SSE response body into a [`FragmentStream`].
///
/// `parse` classifies each event. The stream ends at the first
/// [`SseStep::Stop`] or error. When the body closes without a stop event the
/// stream fails if `require_stop` is set and ends quietly otherwise.
pub(crate) fn sse_fragments(
    response: reqwest::Response,
    timeout: Duration,
    require_stop: bool,
    parse: fn(&Event) -> Result<SseStep, CompletionError>,
) -> FragmentStream {
    let events = Box::pin(response.bytes_stream().eventsource());

    let fragments = stream::unfold(Some(events), move |state| async move {
        let mut events = state?;
        loop {
            let next = match tokio::time::timeout(timeout, events.next()).await {
                Ok(next) => next,
                Err(_) => return Some((Err(CompletionError::Timeout(timeout.as_secs())), None)),
            };
            match next {
                Some(Ok(event)) => match parse(&event) {
                    Ok(SseStep::Text(text)) => return Some((Ok(text), Some(events))),
                    Ok(SseStep::Skip) => continue,
                    Ok(SseStep::Stop) => return None,
                    Err(e) => return Some((Err(e), None)),
                },
                Some(Err(e)) => return Some((Err(CompletionError::Stream(e.to_string())), None)),
                None if require_stop => {
                    return Some((
                        Err(CompletionError::Stream(
                            "connection closed before the end of the message".to_string(),
                        )),
                        None,
                    ))
                }
                None => return None,
            }
        }
    });

    Box::pin(fragments)
}

/// Await `fut` under `timeout`, mapping expiry to [`CompletionError::Timeout`].
pub(crate) async fn within<T>(
    timeout: Duration,
    fut: impl std::future::Future<Output = Result<T, CompletionError>>,
) -> Result<T, CompletionError> {
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| CompletionError::Timeout(timeout.as_secs()))?
}

/// Reject non-2xx responses, keeping the body for the error message.
/// Reading the body is bounded by `timeout` like every other wait.
pub(crate) async fn check_status(
    response: reqwest::Response,
    timeout: Duration,
) -> Result<reqwest::Response, CompletionError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = within(timeout, async { Ok(response.text().await.unwrap_or_default()) }).await?;
    Err(CompletionError::Status {
        status: status.as_u16(),
        body,
    })
}

pub(crate) fn http_client() -> Result<reqwest::Client, CompletionError> {
    Ok(reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .build()?)
}

//! Anthropic Messages API backend.

use std::time::Duration;

use async_trait::async_trait;
use eventsource_stream::Event;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::{
    check_status, http_client, sse_fragments, within, CompletionBackend, CompletionError,
    CompletionRequest, FragmentStream, SseStep,
};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";

pub struct AnthropicBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    timeout: Duration,
}

impl AnthropicBackend {
    pub fn new(
        api_key: String,
        model: String,
        base_url: Option<String>,
        timeout: Duration,
    ) -> Result<Self, CompletionError> {
        Ok(Self {
            client: http_client()?,
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            api_key,
            model,
            timeout,
        })
    }

    async fn send(
        &self,
        request: &CompletionRequest,
        stream: bool,
    ) -> Result<reqwest::Response, CompletionError> {
        let body = json!({
            "model": self.model,
            "max_tokens": request.max_output_tokens,
            "system": request.system_prompt,
            "messages": [{"role": "user", "content": request.user_message}],
            "stream": stream,
        });
        debug!(model = %self.model, stream, "sending messages request");

        let pending = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send();
        let response = within(self.timeout, async {
            pending.await.map_err(CompletionError::from)
        })
        .await?;
        check_status(response, self.timeout).await
    }
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct DeltaEvent {
    delta: Delta,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum Delta {
    #[serde(rename = "text_delta")]
    Text { text: String },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct ErrorEvent {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(rename = "type")]
    kind: String,
    message: String,
}

fn parse_event(event: &Event) -> Result<SseStep, CompletionError> {
    match event.event.as_str() {
        "content_block_delta" => {
            let parsed: DeltaEvent = serde_json::from_str(&event.data).map_err(|e| {
                CompletionError::Malformed(format!("content_block_delta: {}", e))
            })?;
            match parsed.delta {
                Delta::Text { text } => Ok(SseStep::Text(text)),
                Delta::Other => Ok(SseStep::Skip),
            }
        }
        "message_stop" => Ok(SseStep::Stop),
        "error" => {
            let parsed: ErrorEvent = serde_json::from_str(&event.data)
                .map_err(|e| CompletionError::Malformed(format!("error event: {}", e)))?;
            Err(CompletionError::Stream(format!(
                "{}: {}",
                parsed.error.kind, parsed.error.message
            )))
        }
        // message_start, content_block_start/stop, message_delta, ping and
        // anything newer carry no text.
        _ => Ok(SseStep::Skip),
    }
}

#[async_trait]
impl CompletionBackend for AnthropicBackend {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        let response = self.send(request, false).await?;
        let parsed: MessagesResponse = within(self.timeout, async {
            response
                .json()
                .await
                .map_err(|e| CompletionError::Malformed(e.to_string()))
        })
        .await?;

        let text: String = parsed
            .content
            .into_iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text),
                ContentBlock::Other => None,
            })
            .collect();
        if text.is_empty() {
            return Err(CompletionError::Malformed(
                "response contained no text content".to_string(),
            ));
        }
        Ok(text)
    }

    async fn stream(&self, request: &CompletionRequest) -> Result<FragmentStream, CompletionError> {
        let response = self.send(request, true).await?;
        Ok(sse_fragments(response, self.timeout, true, parse_event))
    }
}

//! OpenAI-compatible chat completions backend (OpenAI, Perplexity and
//! similar `/chat/completions` endpoints).

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

const DEFAULT_BASE_URL: &str = "https://api.perplexity.ai";

pub struct ChatCompletionsBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    timeout: Duration,
}

impl ChatCompletionsBackend {
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
            "messages": [
                {"role": "system", "content": request.system_prompt},
                {"role": "user", "content": request.user_message}
            ],
            "stream": stream,
        });
        debug!(model = %self.model, stream, "sending chat completions request");

        let pending = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
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
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Deserialize, Default)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

fn parse_event(event: &Event) -> Result<SseStep, CompletionError> {
    let data = event.data.trim();
    if data == "[DONE]" {
        return Ok(SseStep::Stop);
    }
    let chunk: ChatChunk = serde_json::from_str(data)
        .map_err(|e| CompletionError::Malformed(format!("stream chunk: {}", e)))?;
    match chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content)
    {
        Some(text) if !text.is_empty() => Ok(SseStep::Text(text)),
        _ => Ok(SseStep::Skip),
    }
}

#[async_trait]
impl CompletionBackend for ChatCompletionsBackend {
    fn name(&self) -> &str {
        "openai-compatible"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        let response = self.send(request, false).await?;
        let parsed: ChatResponse = within(self.timeout, async {
            response
                .json()
                .await
                .map_err(|e| CompletionError::Malformed(e.to_string()))
        })
        .await?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| CompletionError::Malformed("response contained no choices".to_string()))
    }

    async fn stream(&self, request: &CompletionRequest) -> Result<FragmentStream, CompletionError> {
        let response = self.send(request, true).await?;
        Ok(sse_fragments(response, self.timeout, false, parse_event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::tests::{request, sse_response};
    use futures::StreamExt;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn backend(server: &MockServer) -> ChatCompletionsBackend {
        ChatCompletionsBackend::new(
            "pplx-test".to_string(),
            "llama-3.1-70b-instruct".to_string(),
            Some(format!("{}/", server.uri())),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn complete_returns_first_choice() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer pplx-test"))
            .and(body_partial_json(serde_json::json!({
                "messages": [
                    {"role": "system", "content": "You are a house."},
                    {"role": "user", "content": "Is the roof sound?"}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"index": 0, "message": {"role": "assistant", "content": "Sound as ever."}}]
            })))
            .mount(&server)
            .await;

        let text = backend(&server).complete(&request()).await.unwrap();
        assert_eq!(text, "Sound as ever.");
    }

    #[tokio::test]
    async fn empty_choices_are_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"choices": []})))
            .mount(&server)
            .await;

        assert!(matches!(
            backend(&server).complete(&request()).await,
            Err(CompletionError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn stream_reads_deltas_until_done() {
        let sse = concat!(
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"Mind \"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"the step.\"}}]}\n\n",
            "data: [DONE]\n\n",
        );
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({"stream": true})))
            .respond_with(sse_response(sse))
            .mount(&server)
            .await;

        let fragments: Vec<String> = backend(&server)
            .stream(&request())
            .await
            .unwrap()
            .map(|f| f.unwrap())
            .collect()
            .await;
        assert_eq!(fragments, vec!["Mind ", "the step."]);
    }

    #[tokio::test]
    async fn malformed_chunk_fails_stream() {
        let sse = "data: {not json\n\n";
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(sse_response(sse))
            .mount(&server)
            .await;

        let mut stream = backend(&server).stream(&request()).await.unwrap();
        assert!(matches!(
            stream.next().await,
            Some(Err(CompletionError::Malformed(_)))
        ));
        assert!(stream.next().await.is_none());
    }
}

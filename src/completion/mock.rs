//! Scripted backend for deterministic tests.
//!
//! `StaticBackend` answers every call with the same fragments, optionally
//! failing before the first fragment or after a given number of them. It
//! records every request it receives so tests can inspect the prompts.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream;
use tokio::sync::Mutex;

use super::{CompletionBackend, CompletionError, CompletionRequest, FragmentStream};

#[derive(Clone, Debug)]
enum Failure {
    None,
    OnCall(String),
    AfterFragments(usize, String),
}

pub struct StaticBackend {
    fragments: Vec<String>,
    failure: Failure,
    requests: Arc<Mutex<Vec<CompletionRequest>>>,
}

impl StaticBackend {
    /// Succeeds with `fragments`; blocking calls get them concatenated.
    pub fn new<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fragments: fragments.into_iter().map(Into::into).collect(),
            failure: Failure::None,
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Fails every call with a stream error carrying `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        let mut backend = Self::new(Vec::<String>::new());
        backend.failure = Failure::OnCall(message.into());
        backend
    }

    /// Streams the first `count` fragments, then fails with `message`.
    /// Blocking calls fail outright.
    pub fn failing_after(mut self, count: usize, message: impl Into<String>) -> Self {
        self.failure = Failure::AfterFragments(count, message.into());
        self
    }

    /// Every request received so far, oldest first.
    pub async fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().await.clone()
    }

    async fn record(&self, request: &CompletionRequest) {
        self.requests.lock().await.push(request.clone());
    }
}

#[async_trait]
impl CompletionBackend for StaticBackend {
    fn name(&self) -> &str {
        "static"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        self.record(request).await;
        match &self.failure {
            Failure::None => Ok(self.fragments.concat()),
            Failure::OnCall(msg) | Failure::AfterFragments(_, msg) => {
                Err(CompletionError::Stream(msg.clone()))
            }
        }
    }

    async fn stream(&self, request: &CompletionRequest) -> Result<FragmentStream, CompletionError> {
        self.record(request).await;
        let items: Vec<Result<String, CompletionError>> = match &self.failure {
            Failure::None => self.fragments.iter().cloned().map(Ok).collect(),
            Failure::OnCall(msg) => return Err(CompletionError::Stream(msg.clone())),
            Failure::AfterFragments(count, msg) => self
                .fragments
                .iter()
                .take(*count)
                .cloned()
                .map(Ok)
                .chain(std::iter::once(Err(CompletionError::Stream(msg.clone()))))
                .collect(),
        };
        Ok(Box::pin(stream::iter(items)))
    }
}

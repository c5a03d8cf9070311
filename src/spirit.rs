//! Response orchestration: retrieval, prompt assembly and the completion call.
//!
//! [`HouseSpirit`] never returns an error to its caller. Every failure on the
//! request path (missing credentials, an invalid persona, a template problem,
//! a backend failure or timeout) becomes an in-character apology with empty
//! provenance.
//!
//! Streaming answers are pulled through [`SpiritStream::next_fragment`]. The
//! sequence always ends with exactly one fragment whose `done` flag is set;
//! its text is empty on success and carries the apology on failure.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::NaiveDateTime;
use futures::StreamExt;
use tracing::{debug, info, warn};

use crate::completion::{CompletionBackend, CompletionRequest, FragmentStream};
use crate::config::Config;
use crate::models::{ConversationExchange, RetrievedChunk, DATE_FORMAT};
use crate::persona::{render_system_prompt, PersonaConfig};
use crate::retriever::top_k;
use crate::situation::{Room, SituationalContext};
use crate::vectorize::CorpusIndex;

pub const MISSING_CREDENTIALS_APOLOGY: &str = "I apologize, but I cannot access my memory banks without proper authorization (API key not found).";
pub const INVALID_PERSONA_APOLOGY: &str =
    "I seem to be having trouble remembering my configuration...";
pub const EMPTY_RESPONSE_APOLOGY: &str = "I seem to be having trouble accessing my memories...";

/// Apology for a failure while answering, with the error detail.
pub fn backend_apology(detail: impl std::fmt::Display) -> String {
    format!(
        "I apologize, but I'm having difficulty processing your question: {}",
        detail
    )
}

#[derive(Debug, Clone, PartialEq)]
pub struct AskRequest {
    pub resident_name: String,
    pub room: Room,
    pub question: String,
}

/// Final answer plus the provenance of the context it was given.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SpiritResponse {
    pub text: String,
    pub sources: BTreeSet<String>,
    pub relevance: Vec<String>,
}

impl SpiritResponse {
    fn apology(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    /// The loggable record of this answer to `request`, stamped at `now`.
    pub fn to_exchange(&self, request: &AskRequest, now: NaiveDateTime) -> ConversationExchange {
        ConversationExchange::stamped(
            now,
            request.resident_name.as_str(),
            request.room.display_name(),
            request.question.as_str(),
            self.text.as_str(),
            self.sources.iter().cloned().collect(),
            self.relevance.clone(),
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    pub text: String,
    pub done: bool,
}

/// Per-request knobs taken from the application config.
#[derive(Debug, Clone)]
pub struct SpiritSettings {
    pub top_k: usize,
    pub max_output_tokens: u32,
    pub context_aware: bool,
    pub weather: String,
    pub season: Option<String>,
}

impl SpiritSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            top_k: config.retrieval.top_k,
            max_output_tokens: config.completion.max_output_tokens,
            context_aware: config.persona.context_aware,
            weather: config.persona.weather.clone(),
            season: config.persona.season.clone(),
        }
    }
}

impl Default for SpiritSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

pub struct HouseSpirit {
    index: Arc<CorpusIndex>,
    persona: PersonaConfig,
    template: String,
    backend: Option<Arc<dyn CompletionBackend>>,
    settings: SpiritSettings,
}

/// A request that passed every precondition and is ready to send.
struct Prepared {
    request: CompletionRequest,
    sources: BTreeSet<String>,
    relevance: Vec<String>,
}

impl HouseSpirit {
    pub fn new(
        index: Arc<CorpusIndex>,
        persona: PersonaConfig,
        template: String,
        backend: Option<Arc<dyn CompletionBackend>>,
        settings: SpiritSettings,
    ) -> Self {
        Self {
            index,
            persona,
            template,
            backend,
            settings,
        }
    }

    /// Answer `request` at the current local time.
    pub async fn respond(&self, request: &AskRequest, streaming: bool) -> SpiritResponse {
        self.respond_at(request, streaming, chrono::Local::now().naive_local())
            .await
    }

    pub async fn respond_at(
        &self,
        request: &AskRequest,
        streaming: bool,
        now: NaiveDateTime,
    ) -> SpiritResponse {
        if streaming {
            return self.respond_stream_at(request, now).await.into_response().await;
        }

        let (backend, prepared) = match self.prepare(request, now).await {
            Ok(ready) => ready,
            Err(apology) => return SpiritResponse::apology(apology),
        };

        match backend.complete(&prepared.request).await {
            Ok(text) if !text.trim().is_empty() => {
                info!(backend = backend.name(), chars = text.len(), "answer complete");
                SpiritResponse {
                    text,
                    sources: prepared.sources,
                    relevance: prepared.relevance,
                }
            }
            Ok(_) => {
                warn!(backend = backend.name(), "backend returned an empty answer");
                SpiritResponse::apology(EMPTY_RESPONSE_APOLOGY)
            }
            Err(e) => {
                warn!(backend = backend.name(), error = %e, "completion failed");
                SpiritResponse::apology(backend_apology(e))
            }
        }
    }

    /// Start a streamed answer at the current local time.
    pub async fn respond_stream(&self, request: &AskRequest) -> SpiritStream {
        self.respond_stream_at(request, chrono::Local::now().naive_local())
            .await
    }

    pub async fn respond_stream_at(&self, request: &AskRequest, now: NaiveDateTime) -> SpiritStream {
        let (backend, prepared) = match self.prepare(request, now).await {
            Ok(ready) => ready,
            Err(apology) => return SpiritStream::failed(apology),
        };

        match backend.stream(&prepared.request).await {
            Ok(fragments) => SpiritStream {
                state: StreamState::Streaming(fragments),
                text: String::new(),
                sources: prepared.sources,
                relevance: prepared.relevance,
            },
            Err(e) => {
                warn!(backend = backend.name(), error = %e, "could not start stream");
                SpiritStream::failed(backend_apology(e))
            }
        }
    }

    /// Check preconditions, retrieve context and build the completion request.
    /// `Err` carries the apology to return instead.
    async fn prepare(
        &self,
        request: &AskRequest,
        now: NaiveDateTime,
    ) -> Result<(Arc<dyn CompletionBackend>, Prepared), String> {
        let Some(backend) = self.backend.clone() else {
            warn!("no completion backend credentials configured");
            return Err(MISSING_CREDENTIALS_APOLOGY.to_string());
        };
        if let Err(e) = self.persona.validate() {
            warn!(error = %e, "persona configuration invalid");
            return Err(INVALID_PERSONA_APOLOGY.to_string());
        }

        let hits = self.retrieve(&request.question).await;

        let situation = self.settings.context_aware.then(|| {
            SituationalContext::at(request.room, self.settings.weather.as_str(), now)
                .with_season(self.settings.season.as_deref())
        });

        let system_prompt = render_system_prompt(&self.template, &self.persona, situation.as_ref())
            .map_err(|e| {
                warn!(error = %e, "system prompt could not be rendered");
                backend_apology(e)
            })?;
        let user_message = user_message(request, &hits, situation.as_ref(), now);

        debug!(
            hits = hits.len(),
            prompt_chars = system_prompt.len(),
            "request prepared"
        );

        Ok((
            backend,
            Prepared {
                request: CompletionRequest {
                    system_prompt,
                    user_message,
                    max_output_tokens: self.settings.max_output_tokens,
                },
                sources: hits
                    .iter()
                    .map(|h| h.chunk.source_filename.clone())
                    .collect(),
                relevance: relevance_annotations(&hits),
            },
        ))
    }

    /// Top-k retrieval on the blocking pool, where query encoding may run a
    /// local model. A failure means answering without context.
    async fn retrieve(&self, question: &str) -> Vec<RetrievedChunk> {
        let index = Arc::clone(&self.index);
        let query = question.to_string();
        let k = self.settings.top_k;
        let result = tokio::task::spawn_blocking(move || top_k(&index, &query, k))
            .await
            .map_err(anyhow::Error::from)
            .and_then(|hits| hits);
        match result {
            Ok(hits) => hits,
            Err(e) => {
                warn!(error = %e, "retrieval failed, answering without context");
                Vec::new()
            }
        }
    }
}

fn user_message(
    request: &AskRequest,
    hits: &[RetrievedChunk],
    situation: Option<&SituationalContext>,
    now: NaiveDateTime,
) -> String {
    let context: Vec<&str> = hits.iter().map(|h| h.chunk.text.as_str()).collect();

    let mut lines = vec![
        format!("Context from my memory: {}", context.join(" ")),
        String::new(),
        format!("Current room focus: {}", request.room),
        format!("Resident name: {}", request.resident_name),
        format!("Current date: {}", now.format(DATE_FORMAT)),
    ];
    if let Some(ctx) = situation {
        lines.push(format!("Time of day: {}", ctx.time_of_day));
        lines.push(format!("Season: {}", ctx.season));
        lines.push(format!("Weather: {}", ctx.weather));
    }
    lines.push(format!("Question: {}", request.question));
    lines.join("\n")
}

/// `"<file> (chunk <rank>, score: <score>)"` per hit, in rank order.
pub fn relevance_annotations(hits: &[RetrievedChunk]) -> Vec<String> {
    hits.iter()
        .enumerate()
        .map(|(rank, hit)| {
            format!(
                "{} (chunk {}, score: {:.4})",
                hit.chunk.source_filename,
                rank + 1,
                hit.score
            )
        })
        .collect()
}

enum StreamState {
    Streaming(FragmentStream),
    Failed(String),
    Finished,
}

/// Pull-based streamed answer.
///
/// Dropping the stream early drops the backend response with it.
pub struct SpiritStream {
    state: StreamState,
    text: String,
    sources: BTreeSet<String>,
    relevance: Vec<String>,
}

impl SpiritStream {
    fn failed(apology: impl Into<String>) -> Self {
        Self {
            state: StreamState::Failed(apology.into()),
            text: String::new(),
            sources: BTreeSet::new(),
            relevance: Vec::new(),
        }
    }

    /// The next fragment, or `None` once the `done` fragment has been returned.
    pub async fn next_fragment(&mut self) -> Option<Fragment> {
        match std::mem::replace(&mut self.state, StreamState::Finished) {
            StreamState::Finished => None,
            StreamState::Failed(apology) => Some(self.fail(apology)),
            StreamState::Streaming(mut fragments) => match fragments.next().await {
                Some(Ok(text)) => {
                    self.text.push_str(&text);
                    self.state = StreamState::Streaming(fragments);
                    Some(Fragment { text, done: false })
                }
                Some(Err(e)) => {
                    warn!(error = %e, received = self.text.len(), "stream failed");
                    Some(self.fail(backend_apology(e)))
                }
                None if self.text.trim().is_empty() => {
                    warn!("stream ended without any text");
                    Some(self.fail(EMPTY_RESPONSE_APOLOGY.to_string()))
                }
                None => {
                    info!(chars = self.text.len(), "answer complete");
                    Some(Fragment {
                        text: String::new(),
                        done: true,
                    })
                }
            },
        }
    }

    fn fail(&mut self, apology: String) -> Fragment {
        self.text = apology.clone();
        self.sources.clear();
        self.relevance.clear();
        Fragment {
            text: apology,
            done: true,
        }
    }

    /// Provenance of the answer so far; empty after a failure.
    pub fn sources(&self) -> &BTreeSet<String> {
        &self.sources
    }

    pub fn relevance(&self) -> &[String] {
        &self.relevance
    }

    /// Drain any remaining fragments and return the accumulated answer.
    pub async fn into_response(mut self) -> SpiritResponse {
        while self.next_fragment().await.is_some() {}
        SpiritResponse {
            text: self.text,
            sources: self.sources,
            relevance: self.relevance,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::StaticBackend;
    use crate::models::DocumentChunk;
    use crate::persona::DEFAULT_TEMPLATE;
    use crate::vectorize::dense::tests::HashingEncoder;
    use crate::vectorize::dense::{DenseVectorizer, SentenceEncoder};
    use crate::vectorize::tfidf::TfidfVectorizer;
    use chrono::NaiveDate;

    fn index(docs: &[(&str, &str)]) -> Arc<CorpusIndex> {
        let chunks: Vec<DocumentChunk> = docs
            .iter()
            .map(|(text, file)| DocumentChunk::new(*text, *file))
            .collect();
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        Arc::new(CorpusIndex::new(chunks, Box::new(TfidfVectorizer::fit(&texts))).unwrap())
    }

    fn house_docs() -> Arc<CorpusIndex> {
        index(&[
            ("The boiler was replaced in 2019 with a condensing model.", "boiler.md"),
            ("The garden wall leans after the 1987 storm.", "garden.txt"),
            ("Boiler pressure should sit between 1 and 1.5 bar.", "boiler.md"),
            ("The loft was converted in 2000.", "loft.pdf"),
        ])
    }

    fn spirit(index: Arc<CorpusIndex>, backend: Option<Arc<dyn CompletionBackend>>) -> HouseSpirit {
        HouseSpirit::new(
            index,
            PersonaConfig::default(),
            DEFAULT_TEMPLATE.to_string(),
            backend,
            SpiritSettings::default(),
        )
    }

    fn ask(question: &str) -> AskRequest {
        AskRequest {
            resident_name: "Ann".to_string(),
            room: Room::Kitchen,
            question: question.to_string(),
        }
    }

    fn noon() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 15)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    #[tokio::test]
    async fn test_blocking_answer_with_provenance() {
        let backend = Arc::new(StaticBackend::new(["Keep it at 1.2 bar."]));
        let house = spirit(house_docs(), Some(backend.clone()));

        let resp = house
            .respond_at(&ask("what should the boiler pressure be?"), false, noon())
            .await;

        assert_eq!(resp.text, "Keep it at 1.2 bar.");
        assert!(resp.sources.contains("boiler.md"));
        assert_eq!(resp.relevance.len(), 3);
        assert!(resp.relevance[0].starts_with("boiler.md (chunk 1, score: 0."));

        let sent = backend.requests().await;
        assert_eq!(sent.len(), 1);
        assert!(sent[0].user_message.contains("Boiler pressure should sit"));
        assert!(sent[0].user_message.contains("Current room focus: Kitchen"));
        assert!(sent[0].user_message.contains("Current date: 15-01-2024"));
        assert!(sent[0].user_message.contains("Season: winter"));
        assert!(sent[0].user_message.ends_with("Question: what should the boiler pressure be?"));
        assert!(sent[0].system_prompt.contains("nurturing and practical nature in the Kitchen"));
        assert_eq!(sent[0].max_output_tokens, 2048);
    }

    #[tokio::test]
    async fn test_empty_corpus_degrades_gracefully() {
        let backend = Arc::new(StaticBackend::new(["I have no papers, but I am here."]));
        let house = spirit(index(&[]), Some(backend.clone()));

        for streaming in [false, true] {
            let resp = house.respond_at(&ask("anything?"), streaming, noon()).await;
            assert!(!resp.text.is_empty());
            assert!(resp.sources.is_empty());
            assert!(resp.relevance.is_empty());
        }
        let sent = backend.requests().await;
        assert!(sent[0].user_message.starts_with("Context from my memory: \n"));
    }

    #[tokio::test]
    async fn test_missing_backend_apologises() {
        let house = spirit(house_docs(), None);
        let resp = house.respond_at(&ask("hello"), false, noon()).await;
        assert_eq!(resp.text, MISSING_CREDENTIALS_APOLOGY);
        assert!(resp.sources.is_empty());

        let mut stream = house.respond_stream_at(&ask("hello"), noon()).await;
        let only = stream.next_fragment().await.unwrap();
        assert!(only.done);
        assert_eq!(only.text, MISSING_CREDENTIALS_APOLOGY);
        assert!(stream.next_fragment().await.is_none());
    }

    #[tokio::test]
    async fn test_invalid_persona_apologises() {
        let mut persona = PersonaConfig::default();
        persona.rooms.clear();
        let house = HouseSpirit::new(
            house_docs(),
            persona,
            DEFAULT_TEMPLATE.to_string(),
            Some(Arc::new(StaticBackend::new(["unused"]))),
            SpiritSettings::default(),
        );
        let resp = house.respond_at(&ask("hello"), false, noon()).await;
        assert_eq!(resp.text, INVALID_PERSONA_APOLOGY);
    }

    #[tokio::test]
    async fn test_template_failure_apologises() {
        let backend = Arc::new(StaticBackend::new(["unused"]));
        let house = HouseSpirit::new(
            house_docs(),
            PersonaConfig::default(),
            "Built by {architect}".to_string(),
            Some(backend.clone()),
            SpiritSettings::default(),
        );
        let resp = house.respond_at(&ask("hello"), false, noon()).await;
        assert!(resp
            .text
            .starts_with("I apologize, but I'm having difficulty processing your question:"));
        assert!(resp.text.contains("architect"));
        assert!(backend.requests().await.is_empty());
    }

    #[tokio::test]
    async fn test_backend_failure_apologises() {
        let house = spirit(house_docs(), Some(Arc::new(StaticBackend::failing("503 busy"))));
        let resp = house.respond_at(&ask("boiler?"), false, noon()).await;
        assert_eq!(resp.text, backend_apology("stream failed: 503 busy"));
        assert!(resp.sources.is_empty());
        assert!(resp.relevance.is_empty());
    }

    #[tokio::test]
    async fn test_stream_fragments_then_done() {
        let backend = Arc::new(StaticBackend::new(["My ", "boiler ", "hums."]));
        let house = spirit(house_docs(), Some(backend));

        let mut stream = house.respond_stream_at(&ask("boiler pressure"), noon()).await;
        let mut seen = Vec::new();
        while let Some(fragment) = stream.next_fragment().await {
            seen.push(fragment);
        }

        let done: Vec<&Fragment> = seen.iter().filter(|f| f.done).collect();
        assert_eq!(done.len(), 1);
        assert_eq!(seen.last().unwrap(), &Fragment { text: String::new(), done: true });
        let texts: Vec<&str> = seen.iter().filter(|f| !f.done).map(|f| f.text.as_str()).collect();
        assert_eq!(texts, vec!["My ", "boiler ", "hums."]);
        assert!(stream.sources().contains("boiler.md"));

        let resp = stream.into_response().await;
        assert_eq!(resp.text, "My boiler hums.");
        assert_eq!(resp.relevance.len(), 3);
    }

    #[tokio::test]
    async fn test_mid_stream_failure_replaces_text() {
        let backend = StaticBackend::new(["My ", "boiler ", "hums."]).failing_after(1, "reset");
        let house = spirit(house_docs(), Some(Arc::new(backend)));

        let mut stream = house.respond_stream_at(&ask("boiler"), noon()).await;
        let first = stream.next_fragment().await.unwrap();
        assert_eq!(first, Fragment { text: "My ".to_string(), done: false });
        let last = stream.next_fragment().await.unwrap();
        assert!(last.done);
        assert!(last.text.contains("reset"));

        let resp = stream.into_response().await;
        assert_eq!(resp.text, last.text);
        assert!(resp.sources.is_empty());
        assert!(resp.relevance.is_empty());
    }

    #[tokio::test]
    async fn test_empty_answer_apologises() {
        let house = spirit(house_docs(), Some(Arc::new(StaticBackend::new(Vec::<String>::new()))));
        let resp = house.respond_at(&ask("boiler"), true, noon()).await;
        assert_eq!(resp.text, EMPTY_RESPONSE_APOLOGY);
    }

    #[tokio::test]
    async fn test_context_unaware_message_omits_situation() {
        let backend = Arc::new(StaticBackend::new(["ok"]));
        let settings = SpiritSettings {
            context_aware: false,
            ..SpiritSettings::default()
        };
        let house = HouseSpirit::new(
            house_docs(),
            PersonaConfig::default(),
            DEFAULT_TEMPLATE.to_string(),
            Some(backend.clone()),
            settings,
        );
        house.respond_at(&ask("loft"), false, noon()).await;
        let sent = backend.requests().await;
        assert!(!sent[0].user_message.contains("Season:"));
        assert!(!sent[0].system_prompt.contains("Current Context:"));
    }

    #[tokio::test]
    async fn test_season_override_reaches_message() {
        let backend = Arc::new(StaticBackend::new(["ok"]));
        let settings = SpiritSettings {
            season: Some("Summer".to_string()),
            ..SpiritSettings::default()
        };
        let house = HouseSpirit::new(
            house_docs(),
            PersonaConfig::default(),
            DEFAULT_TEMPLATE.to_string(),
            Some(backend.clone()),
            settings,
        );
        // January would otherwise be winter.
        house.respond_at(&ask("loft"), false, noon()).await;
        let sent = backend.requests().await;
        assert!(sent[0].user_message.contains("Season: summer"));
    }

    /// Records the thread each query is encoded on.
    struct ThreadRecordingEncoder {
        inner: HashingEncoder,
        threads: std::sync::Mutex<Vec<std::thread::ThreadId>>,
    }

    impl SentenceEncoder for ThreadRecordingEncoder {
        fn model_name(&self) -> &str {
            "recording"
        }
        fn dims(&self) -> usize {
            self.inner.dims
        }
        fn encode(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            self.threads.lock().unwrap().push(std::thread::current().id());
            self.inner.encode(texts)
        }
    }

    #[tokio::test]
    async fn test_query_encoding_runs_off_the_runtime_thread() {
        let encoder = Arc::new(ThreadRecordingEncoder {
            inner: HashingEncoder { dims: 32 },
            threads: std::sync::Mutex::new(Vec::new()),
        });
        let chunks = vec![
            DocumentChunk::new("The boiler was replaced in 2019.", "boiler.md"),
            DocumentChunk::new("The loft was converted in 2000.", "loft.md"),
        ];
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectorizer = DenseVectorizer::fit(encoder.clone(), &texts).unwrap();
        let index = Arc::new(CorpusIndex::new(chunks, Box::new(vectorizer)).unwrap());

        let house = spirit(index, Some(Arc::new(StaticBackend::new(["ok"]))));
        let resp = house.respond_at(&ask("boiler"), false, noon()).await;
        assert!(resp.sources.contains("boiler.md"));

        let threads = encoder.threads.lock().unwrap();
        // Corpus fit then one query.
        assert_eq!(threads.len(), 2);
        assert_ne!(threads[1], std::thread::current().id());
    }

    #[test]
    fn test_exchange_uses_display_room() {
        let resp = SpiritResponse {
            text: "hi".to_string(),
            sources: BTreeSet::from(["a.md".to_string()]),
            relevance: vec!["a.md (chunk 1, score: 0.5000)".to_string()],
        };
        let ex = resp.to_exchange(&ask("q"), noon());
        assert_eq!(ex.room, "Kitchen");
        assert_eq!(ex.date, "15-01-2024");
        assert_eq!(ex.time, "12:00:00");
        assert_eq!(ex.unique_files, vec!["a.md"]);
    }
}

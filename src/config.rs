//! TOML application configuration.
//!
//! Every section carries serde defaults, so an absent file or a partial file
//! both produce a usable [`Config`]. [`load_config`] applies environment
//! overrides and validates the numeric and enumerated settings before
//! anything else runs.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub paths: PathsConfig,
    pub corpus: CorpusConfig,
    pub chunking: ChunkingConfig,
    pub retrieval: RetrievalConfig,
    pub embedding: EmbeddingConfig,
    pub completion: CompletionConfig,
    pub persona: PersonaSettings,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PathsConfig {
    pub documents_dirs: Vec<PathBuf>,
    pub history_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub persona_template: PathBuf,
    pub persona_config: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            documents_dirs: vec![PathBuf::from("documents"), PathBuf::from("history")],
            history_dir: PathBuf::from("history"),
            logs_dir: PathBuf::from("logs"),
            persona_template: PathBuf::from("prompts/house_spirit_prompt.txt"),
            persona_config: PathBuf::from("config/house_config.json"),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct CorpusConfig {
    /// Glob patterns matched against file names; matches are never extracted.
    pub exclude_globs: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    1000
}
fn default_chunk_overlap() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_vectorizer")]
    pub vectorizer: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            vectorizer: default_vectorizer(),
            top_k: default_top_k(),
        }
    }
}

fn default_vectorizer() -> String {
    "tfidf".to_string()
}
fn default_top_k() -> usize {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_embedding_model(),
            batch_size: default_batch_size(),
        }
    }
}

fn default_embedding_model() -> String {
    "all-minilm-l6-v2".to_string()
}
fn default_batch_size() -> usize {
    64
}

#[derive(Debug, Deserialize, Clone)]
pub struct CompletionConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_completion_model")]
    pub model: String,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_streaming")]
    pub streaming: bool,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_completion_model(),
            base_url: None,
            api_key_env: default_api_key_env(),
            max_output_tokens: default_max_output_tokens(),
            timeout_secs: default_timeout_secs(),
            streaming: default_streaming(),
        }
    }
}

fn default_provider() -> String {
    "anthropic".to_string()
}
fn default_completion_model() -> String {
    "claude-3-5-sonnet-20241022".to_string()
}
fn default_api_key_env() -> String {
    "ANTHROPIC_API_KEY".to_string()
}
fn default_max_output_tokens() -> u32 {
    2048
}
fn default_timeout_secs() -> u64 {
    120
}
fn default_streaming() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct PersonaSettings {
    #[serde(default = "default_context_aware")]
    pub context_aware: bool,
    #[serde(default = "default_weather")]
    pub weather: String,
    /// Fixed season name instead of the one derived from the month.
    #[serde(default)]
    pub season: Option<String>,
}

impl Default for PersonaSettings {
    fn default() -> Self {
        Self {
            context_aware: default_context_aware(),
            weather: default_weather(),
            season: None,
        }
    }
}

fn default_context_aware() -> bool {
    true
}
fn default_weather() -> String {
    "sunny".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl CompletionConfig {
    /// Reads the API key from the configured environment variable.
    /// Empty values count as absent.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let mut config: Config = if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content).with_context(|| "Failed to parse config file")?
    } else {
        info!("no config file at {}, using defaults", path.display());
        Config::default()
    };

    apply_env_overrides(&mut config);
    validate(&config)?;
    Ok(config)
}

fn apply_env_overrides(config: &mut Config) {
    if let Ok(level) = std::env::var("HOUSE_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Ok(kind) = std::env::var("HOUSE_VECTORIZER") {
        config.retrieval.vectorizer = kind;
    }
}

pub fn validate(config: &Config) -> Result<()> {
    // Validate chunking
    if config.chunking.chunk_size == 0 {
        bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.chunk_overlap >= config.chunking.chunk_size {
        bail!(
            "chunking.chunk_overlap ({}) must be smaller than chunking.chunk_size ({})",
            config.chunking.chunk_overlap,
            config.chunking.chunk_size
        );
    }

    // Validate retrieval
    if config.retrieval.top_k == 0 {
        bail!("retrieval.top_k must be >= 1");
    }
    match config.retrieval.vectorizer.as_str() {
        "tfidf" | "dense" => {}
        other => bail!(
            "Unknown vectorizer: '{}'. Must be tfidf or dense.",
            other
        ),
    }

    // Validate completion
    match config.completion.provider.as_str() {
        "anthropic" | "openai-compatible" => {}
        other => bail!(
            "Unknown completion provider: '{}'. Must be anthropic or openai-compatible.",
            other
        ),
    }
    if config.completion.max_output_tokens == 0 {
        bail!("completion.max_output_tokens must be > 0");
    }
    if config.completion.timeout_secs == 0 {
        bail!("completion.timeout_secs must be > 0");
    }

    Ok(())
}

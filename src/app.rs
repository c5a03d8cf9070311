//! Application context shared by the CLI commands.
//!
//! [`HouseApp`] is built once from the loaded [`Config`] and owns the
//! process-lifetime state: the lazily built corpus index and the
//! conversation log. Commands borrow it instead of reaching for globals.

use std::sync::Arc;

use anyhow::Result;

use crate::completion::CompletionBackend;
use crate::config::Config;
use crate::loader::{load_documents, LoadOptions, LoadReport};
use crate::logstore::ConversationLog;
use crate::models::DocumentChunk;
use crate::persona::{load_persona, load_template};
use crate::spirit::{HouseSpirit, SpiritSettings};
use crate::vectorize::{build_index, CorpusIndex, IndexCache};

pub struct HouseApp {
    config: Config,
    index: IndexCache,
    log: ConversationLog,
}

impl HouseApp {
    pub fn new(config: Config) -> Self {
        let log = ConversationLog::open(&config.paths.logs_dir, &config.paths.history_dir);
        Self {
            config,
            index: IndexCache::new(),
            log,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn log(&self) -> &ConversationLog {
        &self.log
    }

    /// Extract and chunk the configured document directories.
    pub async fn load_corpus(&self) -> Result<(Vec<DocumentChunk>, LoadReport)> {
        let opts = LoadOptions::from_config(&self.config, chrono::Local::now().date_naive());
        tokio::task::spawn_blocking(move || load_documents(&opts)).await?
    }

    /// The corpus index, built on first use.
    pub async fn index(&self) -> Result<Arc<CorpusIndex>> {
        self.index
            .get_or_build(|| async {
                let (chunks, _) = self.load_corpus().await?;
                build_index(&self.config, chunks).await
            })
            .await
    }

    /// Assemble the orchestrator from the index, persona files and `backend`.
    pub async fn spirit(&self, backend: Option<Arc<dyn CompletionBackend>>) -> Result<HouseSpirit> {
        let index = self.index().await?;
        let (persona, _) = load_persona(&self.config.paths.persona_config);
        let (template, _) = load_template(&self.config.paths.persona_template);
        Ok(HouseSpirit::new(
            index,
            persona,
            template,
            backend,
            SpiritSettings::from_config(&self.config),
        ))
    }
}

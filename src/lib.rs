//! # House Spirit
//!
//! A retrieval-grounded conversational persona for a home.
//!
//! House Spirit ingests a local document corpus (manuals, deeds, notes,
//! scanned receipts), indexes it with TF-IDF or dense sentence embeddings,
//! and answers residents' questions in the voice of the house itself. Every
//! exchange is logged to daily CSV, JSON and Markdown files, and a
//! resident's history can be replayed newest first.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌─────────────┐   ┌────────────┐
//! │   Loader    │──▶│ Vectorizer  │──▶│ CorpusIndex │
//! │ PDF/MD/OCR  │   │ TF-IDF/Dense│   │  (once)     │
//! └─────────────┘   └─────────────┘   └─────┬──────┘
//!                                            │ top-k
//!        ┌──────────────┐              ┌─────▼──────┐     ┌─────────────┐
//!        │   Persona    │─────────────▶│   Spirit   │────▶│  Completion │
//!        │ template+ctx │              │ orchestrate│◀────│   backend   │
//!        └──────────────┘              └─────┬──────┘     └─────────────┘
//!                                            ▼
//!                                  ┌──────────────────┐
//!                                  │ Conversation log │
//!                                  │  CSV/JSON/MD     │
//!                                  └──────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! house index                                   # load and index documents
//! house ask --name Ann --room kitchen "Is the boiler due a service?"
//! house history --name Ann
//! house patterns --name Ann
//! house persona render --room garden
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`extract`] | Per-file-type text extraction (PDF, text, OCR) |
//! | [`chunk`] | Overlapping character-window chunking |
//! | [`loader`] | Directory walking and corpus assembly |
//! | [`vectorize`] | TF-IDF and dense vectorizers, corpus index |
//! | [`retriever`] | Top-k cosine retrieval |
//! | [`situation`] | Rooms, seasons, weather and time of day |
//! | [`persona`] | Persona config, template rendering |
//! | [`completion`] | Completion backends (Anthropic, OpenAI-compatible) |
//! | [`spirit`] | Response orchestration, streaming |
//! | [`logstore`] | Daily CSV/JSON/Markdown logs, history |
//! | [`insights`] | Conversation pattern analysis |
//! | [`app`] | Application context for the CLI |

pub mod app;
pub mod ask;
pub mod chunk;
pub mod completion;
pub mod config;
pub mod extract;
pub mod history;
pub mod index_cmd;
pub mod insights;
pub mod loader;
pub mod logstore;
pub mod models;
pub mod persona;
pub mod persona_cmd;
pub mod retriever;
pub mod situation;
pub mod spirit;
pub mod vectorize;

//! # ExamKit
//!
//! A retrieval-augmented assessment pipeline: ingest study materials,
//! generate and review questions with a language model, run exam and
//! practice sessions, and score submitted answers automatically with
//! reviewer override.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌──────────┐
//! │ Materials │──▶│   Pipeline    │──▶│  SQLite   │
//! │ PDF/text  │   │ Chunk+Embed  │   │ chunks    │
//! └──────────┘   └──────────────┘   └────┬─────┘
//!                                        │ cosine retrieval
//!                                        ▼
//!                  ┌────────────────────────────┐
//!                  │  Sessions: questions →     │
//!                  │  answers → script → ready  │
//!                  │  → active → ended          │
//!                  └────────────┬───────────────┘
//!                               ▼
//!                  ┌────────────────────────────┐
//!                  │  Scoring: auto-evaluate,   │
//!                  │  reviewer override, totals │
//!                  └────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Typed error hierarchy |
//! | [`models`] | Core data types and status machines |
//! | [`bloom`] | Bloom taxonomy levels and difficulty mapping |
//! | [`chunking`] | Semantic-aware text chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`retrieval`] | Cosine-similarity chunk search |
//! | [`llm`] | Language-model client and JSON discipline |
//! | [`prompts`] | Prompt builders |
//! | [`generator`] | Question and reference-answer generation |
//! | [`sessions`] | Session lifecycle operations |
//! | [`scoring`] | Answer evaluation and aggregates |
//! | [`ingest`] | Material ingestion pipeline |
//! | [`extract`] | PDF and text extraction |
//! | [`blob`] | Uploaded file storage |
//! | [`store`] | Storage trait, SQLite and in-memory backends |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod blob;
pub mod bloom;
pub mod chunking;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod generator;
pub mod ingest;
pub mod llm;
pub mod migrate;
pub mod models;
pub mod prompts;
pub mod retrieval;
pub mod scoring;
pub mod sessions;
pub mod store;

//! # NeuraShield
//!
//! Retrieval-augmented code analysis for Python repositories.
//!
//! NeuraShield extracts Python source from a repository, splits it into
//! function/class-sized chunks, embeds them into a local vector index, and
//! uses the most similar indexed code as context when asking a chat model
//! for bug, optimization and security reports. CI helpers turn those
//! reports into a merge gate, a Markdown PR comment and an HTML dashboard.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────────┐   ┌──────────┐
//! │  Extractor  │──▶│ Preprocess+Chunk │──▶│  SQLite  │
//! │ git + t-s   │   │      +Embed      │   │  vectors │
//! └─────────────┘   └──────────────────┘   └────┬─────┘
//!                                               │
//!                  ┌────────────────────────────┤
//!                  ▼                            ▼
//!           ┌─────────────┐              ┌────────────┐
//!           │  Analyzer   │─────────────▶│  Reports   │
//!           │ RAG + LLM   │              │ gate/html  │
//!           └─────────────┘              └────────────┘
//! ```
//!
//! Pure logic (chunking, retrieval, prompts, gating, rendering) lives in
//! `neurashield_core`; this crate adds everything that touches the network,
//! the filesystem, processes or SQLite.
//!
//! ## Quick Start
//!
//! ```bash
//! shield ingest https://github.com/org/repo.git
//! shield analyze app/views.py --type security
//! shield pr $(git diff --name-only origin/main)
//! shield gate pr_analysis_results.json
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`extract`] | Clone + tree-sitter extraction |
//! | [`embedding`] | HTTP embedding providers, batched embedding |
//! | [`llm`] | HTTP chat providers |
//! | [`sqlite_index`] | SQLite-backed vector index |
//! | [`ingest`] | Ingestion pipeline |
//! | [`progress`] | Ingest progress on stderr |
//! | [`search`] | Free-text search over the index |
//! | [`stats`] | `init`, `stats` and `clear` |
//! | [`analyze`] | Analysis commands |
//! | [`ci`] | Merge gate and dashboard |
//! | [`precommit`] | Pre-commit scanner |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema creation |

pub mod analyze;
pub mod ci;
pub mod config;
pub mod db;
pub mod embedding;
pub mod extract;
pub mod ingest;
pub mod llm;
pub mod migrate;
pub mod precommit;
pub mod progress;
pub mod search;
pub mod sqlite_index;
pub mod stats;

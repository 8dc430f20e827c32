//! # NeuraShield Core
//!
//! I/O-free logic for NeuraShield: data models, source preprocessing,
//! token-bounded chunking, the vector index abstraction, retrieval context
//! assembly, prompt templates, the analysis orchestrator, CI gating, and
//! report rendering.
//!
//! This crate contains no tokio, sqlx, HTTP, process, or filesystem code.
//! Providers (embedding, chat, persistent index) are supplied by the
//! `neurashield` app crate through the traits defined here.

pub mod analysis;
pub mod chunk;
pub mod context;
pub mod embedding;
pub mod findings;
pub mod gate;
pub mod models;
pub mod preprocess;
pub mod prompts;
pub mod report;
pub mod store;

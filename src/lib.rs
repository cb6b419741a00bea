//! Voice-matched short-form script generation.
//!
//! The crate is organised around a six-stage pipeline (see [`pipeline`]) that
//! sits on top of a corpus of prior viral scripts ([`corpus`]), a hosted LLM
//! ([`llm`]) and an embedding service ([`embedding`]). Persistence is SQLite
//! backed ([`store`]).

pub mod config;
pub mod corpus;
pub mod cost;
pub mod embedding;
pub mod llm;
pub mod pipeline;
pub mod sqlite_persistence;
pub mod store;
pub mod voice;

//! Exemplar corpus: retrieval for the pipeline plus ingestion tooling.

pub mod ingest;
pub mod ranking;
mod retrieval;

pub use ingest::{backfill_embeddings, ingest_delimited, BackfillReport, IngestReport};
pub use retrieval::{
    CorpusRetriever, RetrievalError, RetrievalOptions, RetrievalResult, RetrievalStats,
};

//! medchat vector crate - embedding service, term corpus, relevance classifier.
//!
//! Turns text into sentence embeddings, loads the reference medical term
//! corpus once at startup, and decides whether a message is in-domain by
//! cosine similarity against every reference term.

pub mod classifier;
pub mod corpus;
pub mod embedding;
pub mod similarity;

pub use classifier::RelevanceClassifier;
pub use corpus::{ReferenceTerm, TermCorpus};
pub use embedding::{DynEmbeddingService, EmbeddingService, MockEmbedding, OnnxEmbeddingService};
pub use similarity::cosine_similarity;

#[cfg(test)]
pub(crate) mod test_support;

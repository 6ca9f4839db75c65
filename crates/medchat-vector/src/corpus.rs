//! Reference term corpus.
//!
//! The corpus is a plain-text file with one medical phrase per line. Every
//! phrase is embedded once at startup; the resulting vectors are immutable
//! and shared by all requests.

use std::path::Path;

use medchat_core::error::MedchatError;
use tracing::{debug, error, info};

use crate::embedding::DynEmbeddingService;

/// One corpus line and its embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceTerm {
    pub phrase: String,
    pub vector: Vec<f32>,
}

/// The embedded reference terms used by the relevance classifier.
#[derive(Debug, Clone, Default)]
pub struct TermCorpus {
    terms: Vec<ReferenceTerm>,
}

impl TermCorpus {
    /// A corpus with no terms. The classifier rejects every message.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load and embed the corpus file at `path`.
    ///
    /// Never fails: an unreadable file or an embedding error is logged and
    /// yields an empty corpus.
    pub async fn load(path: &Path, embedder: &dyn DynEmbeddingService) -> Self {
        match Self::try_load(path, embedder).await {
            Ok(corpus) => {
                info!(
                    path = %path.display(),
                    terms = corpus.len(),
                    "Loaded medical term corpus"
                );
                corpus
            }
            Err(e) => {
                error!(
                    path = %path.display(),
                    error = %e,
                    "Failed to load medical term corpus; all messages will be treated as non-medical"
                );
                Self::empty()
            }
        }
    }

    /// Load and embed the corpus file, propagating the first failure.
    pub async fn try_load(
        path: &Path,
        embedder: &dyn DynEmbeddingService,
    ) -> Result<Self, MedchatError> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            MedchatError::Corpus(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_phrases(content.lines(), embedder).await
    }

    /// Embed each non-blank phrase after trimming surrounding whitespace.
    pub async fn from_phrases<'a, I>(
        phrases: I,
        embedder: &dyn DynEmbeddingService,
    ) -> Result<Self, MedchatError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut terms = Vec::new();
        for phrase in phrases.into_iter().map(str::trim).filter(|p| !p.is_empty()) {
            let vector = embedder.embed_boxed(phrase).await.map_err(|e| {
                MedchatError::Corpus(format!("Failed to embed term '{}': {}", phrase, e))
            })?;
            debug!(term = phrase, "Embedded reference term");
            terms.push(ReferenceTerm {
                phrase: phrase.to_string(),
                vector,
            });
        }
        Ok(Self { terms })
    }

    pub fn terms(&self) -> &[ReferenceTerm] {
        &self.terms
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FailingEmbedding, LexiconEmbedding};
    use std::io::Write;

    #[tokio::test]
    async fn test_load_skips_blank_lines_and_trims() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "headache\n\n   \n  fever  \ncough").unwrap();

        let corpus = TermCorpus::load(file.path(), &LexiconEmbedding).await;

        let phrases: Vec<&str> = corpus.terms().iter().map(|t| t.phrase.as_str()).collect();
        assert_eq!(phrases, vec!["headache", "fever", "cough"]);
        assert!(corpus.terms().iter().all(|t| !t.vector.is_empty()));
    }

    #[tokio::test]
    async fn test_load_missing_file_yields_empty() {
        let corpus = TermCorpus::load(Path::new("/nonexistent/terms.txt"), &LexiconEmbedding).await;
        assert!(corpus.is_empty());
        assert_eq!(corpus.len(), 0);
    }

    #[tokio::test]
    async fn test_try_load_missing_file_is_corpus_error() {
        let result =
            TermCorpus::try_load(Path::new("/nonexistent/terms.txt"), &LexiconEmbedding).await;
        assert!(matches!(result, Err(MedchatError::Corpus(_))));
    }

    #[tokio::test]
    async fn test_load_embedding_failure_yields_empty() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "headache").unwrap();

        let corpus = TermCorpus::load(file.path(), &FailingEmbedding).await;
        assert!(corpus.is_empty());
    }

    #[tokio::test]
    async fn test_empty_file_yields_empty_corpus() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let corpus = TermCorpus::load(file.path(), &LexiconEmbedding).await;
        assert!(corpus.is_empty());
    }

    #[tokio::test]
    async fn test_from_phrases() {
        let corpus = TermCorpus::from_phrases(["chest pain", ""], &LexiconEmbedding)
            .await
            .unwrap();
        assert_eq!(corpus.len(), 1);
        assert_eq!(corpus.terms()[0].phrase, "chest pain");
    }
}

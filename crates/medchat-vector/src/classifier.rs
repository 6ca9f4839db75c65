//! Medical relevance gate.
//!
//! A message is medical when its embedding is closer than the threshold to
//! at least one reference term. The classifier fails closed: an empty
//! corpus or an embedding error means "not medical".

use std::sync::Arc;

use medchat_core::types::ClassificationResult;
use tracing::{debug, warn};

use crate::corpus::TermCorpus;
use crate::embedding::DynEmbeddingService;
use crate::similarity::cosine_similarity;

/// Default similarity threshold.
pub const DEFAULT_THRESHOLD: f32 = 0.5;

/// Scores messages against the reference term corpus.
#[derive(Clone)]
pub struct RelevanceClassifier {
    corpus: Arc<TermCorpus>,
    embedder: Arc<dyn DynEmbeddingService>,
    threshold: f32,
}

impl std::fmt::Debug for RelevanceClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelevanceClassifier")
            .field("terms", &self.corpus.len())
            .field("threshold", &self.threshold)
            .finish()
    }
}

impl RelevanceClassifier {
    pub fn new(
        corpus: Arc<TermCorpus>,
        embedder: Arc<dyn DynEmbeddingService>,
        threshold: f32,
    ) -> Self {
        Self {
            corpus,
            embedder,
            threshold,
        }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn corpus_size(&self) -> usize {
        self.corpus.len()
    }

    /// True when the message is medical at the configured threshold.
    pub async fn is_relevant(&self, text: &str) -> bool {
        self.classify_with(text, self.threshold).await.is_relevant
    }

    /// True when any reference term scores strictly above `threshold`.
    pub async fn is_relevant_with(&self, text: &str, threshold: f32) -> bool {
        self.classify_with(text, threshold).await.is_relevant
    }

    pub async fn classify(&self, text: &str) -> ClassificationResult {
        self.classify_with(text, self.threshold).await
    }

    /// Score `text` against every term and report the best match.
    pub async fn classify_with(&self, text: &str, threshold: f32) -> ClassificationResult {
        if self.corpus.is_empty() {
            warn!("Medical term corpus is empty; classifying message as non-medical");
            return ClassificationResult::not_relevant();
        }

        let lowered = text.to_lowercase();
        let vector = match self.embedder.embed_boxed(&lowered).await {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "Failed to embed message; classifying as non-medical");
                return ClassificationResult::not_relevant();
            }
        };

        let best = self
            .corpus
            .terms()
            .iter()
            .map(|term| (term, cosine_similarity(&vector, &term.vector)))
            .fold(None, |best: Option<(&_, f32)>, (term, score)| match best {
                Some((_, top)) if top >= score => best,
                _ => Some((term, score)),
            });

        let Some((term, score)) = best else {
            return ClassificationResult::not_relevant();
        };

        let is_relevant = score > threshold;
        debug!(
            best_term = %term.phrase,
            score,
            threshold,
            is_relevant,
            "Classified message"
        );

        ClassificationResult {
            is_relevant,
            max_score: Some(score),
            best_term: Some(term.phrase.clone()),
        }
    }
}

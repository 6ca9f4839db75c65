use medchat_core::error::MedchatError;

use crate::embedding::EmbeddingService;
use crate::similarity::l2_normalize;

/// Words grouped into concept axes. Texts sharing a concept score high.
const LEXICON: &[(&str, usize)] = &[
    ("headache", 0),
    ("migraine", 0),
    ("fever", 1),
    ("temperature", 1),
    ("cough", 2),
    ("coughing", 2),
    ("chest", 3),
    ("pain", 4),
    ("ache", 4),
    ("breathing", 5),
    ("breath", 5),
    ("nausea", 6),
    ("vomiting", 6),
    ("weather", 7),
    ("forecast", 7),
    ("football", 8),
];

const AXES: usize = 9;

/// Bag-of-concepts embedder with hand-picked semantics for tests.
#[derive(Debug, Default, Clone)]
pub struct LexiconEmbedding;

impl EmbeddingService for LexiconEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, MedchatError> {
        if text.is_empty() {
            return Err(MedchatError::Embedding("Cannot embed empty text".to_string()));
        }
        let mut v = vec![0.0f32; AXES];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let word = word.to_lowercase();
            if let Some((_, axis)) = LEXICON.iter().find(|(w, _)| *w == word) {
                v[*axis] += 1.0;
            }
        }
        l2_normalize(&mut v);
        Ok(v)
    }

    fn dimensions(&self) -> usize {
        AXES
    }
}

/// Embedder that always fails, for error-path tests.
#[derive(Debug, Default, Clone)]
pub struct FailingEmbedding;

impl EmbeddingService for FailingEmbedding {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, MedchatError> {
        Err(MedchatError::Embedding("model unavailable".to_string()))
    }

    fn dimensions(&self) -> usize {
        AXES
    }
}

use crate::embed::EmbeddingProvider;
use crate::error::{FaqError, Result};
use crate::model::{QaPair, Record};
use crate::pairs::{derive_pairs, ReplySelection};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Canonical answers used when the corpus yields no pairs.
pub fn fallback_seed() -> Vec<QaPair> {
    vec![
        QaPair::new(
            "how to reset my password",
            "To reset your password, go to settings -> security -> reset password.",
        ),
        QaPair::new(
            "where is my order",
            "You can track your order from the 'My Orders' section in your account.",
        ),
        QaPair::new(
            "how to contact support",
            "Contact support via email at support@example.com or call 1800-123-456.",
        ),
        QaPair::new(
            "what is the refund policy",
            "Refunds are processed within 5-7 business days after approval.",
        ),
    ]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KbSource {
    Derived,
    Fallback,
}

impl KbSource {
    pub fn as_str(self) -> &'static str {
        match self {
            KbSource::Derived => "derived",
            KbSource::Fallback => "fallback",
        }
    }
}

/// Pairs aligned 1:1 with their question embeddings. Never empty, and not
/// mutated after construction.
#[derive(Debug, Clone)]
pub struct KnowledgeBase {
    pairs: Vec<QaPair>,
    embeddings: Vec<Vec<f32>>,
    dim: usize,
    model_id: String,
    source: KbSource,
    built_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KbSummary {
    pub source: KbSource,
    pub pairs: usize,
    pub dim: usize,
    pub model_id: String,
    pub built_at: DateTime<Utc>,
}

impl KnowledgeBase {
    /// Assembles a knowledge base from precomputed rows. Rejects empty input,
    /// a pair/row count mismatch, and rows of differing width.
    pub fn from_parts(
        pairs: Vec<QaPair>,
        embeddings: Vec<Vec<f32>>,
        model_id: impl Into<String>,
    ) -> Result<Self> {
        Self::assemble(pairs, embeddings, model_id.into(), KbSource::Derived)
    }

    fn assemble(
        pairs: Vec<QaPair>,
        embeddings: Vec<Vec<f32>>,
        model_id: String,
        source: KbSource,
    ) -> Result<Self> {
        if pairs.is_empty() {
            return Err(FaqError::InvalidInput(
                "knowledge base needs at least one pair".to_string(),
            ));
        }
        if pairs.len() != embeddings.len() {
            return Err(FaqError::InvalidInput(format!(
                "{} pairs but {} embedding rows",
                pairs.len(),
                embeddings.len()
            )));
        }
        let dim = embeddings[0].len();
        if let Some(bad) = embeddings.iter().find(|row| row.len() != dim) {
            return Err(FaqError::DimensionMismatch {
                expected: dim,
                actual: bad.len(),
            });
        }

        Ok(Self {
            pairs,
            embeddings,
            dim,
            model_id,
            source,
            built_at: Utc::now(),
        })
    }

    /// Derives pairs from `records` and embeds their questions. Falls back to
    /// [`fallback_seed`] when nothing can be derived.
    pub fn build<E>(records: &[Record], embedder: &E, selection: ReplySelection) -> Result<Self>
    where
        E: EmbeddingProvider + ?Sized,
    {
        Self::build_with_seed(records, embedder, selection, &fallback_seed())
    }

    /// Like [`KnowledgeBase::build`] with a caller-supplied seed. An empty
    /// `seed` means the built-in one.
    pub fn build_with_seed<E>(
        records: &[Record],
        embedder: &E,
        selection: ReplySelection,
        seed: &[QaPair],
    ) -> Result<Self>
    where
        E: EmbeddingProvider + ?Sized,
    {
        let derived = derive_pairs(records, selection);
        let (pairs, source) = if derived.is_empty() {
            let pairs = if seed.is_empty() {
                fallback_seed()
            } else {
                seed.to_vec()
            };
            warn!(
                records = records.len(),
                seed_pairs = pairs.len(),
                "no question/answer pairs derived; using fallback seed"
            );
            (pairs, KbSource::Fallback)
        } else {
            info!(
                records = records.len(),
                pairs = derived.len(),
                selection = selection.as_str(),
                "derived question/answer pairs"
            );
            (derived, KbSource::Derived)
        };

        let questions: Vec<&str> = pairs.iter().map(|p| p.question.as_str()).collect();
        let embeddings = embedder
            .encode(&questions, true)
            .map_err(FaqError::EmbedderUnavailable)?;

        let kb = Self::assemble(pairs, embeddings, embedder.model_id().to_string(), source)?;
        info!(
            pairs = kb.len(),
            dim = kb.dim(),
            model = %kb.model_id,
            source = ?kb.source,
            "built knowledge base"
        );
        Ok(kb)
    }

    pub fn pairs(&self) -> &[QaPair] {
        &self.pairs
    }

    pub fn embeddings(&self) -> &[Vec<f32>] {
        &self.embeddings
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Always false for a constructed knowledge base.
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn source(&self) -> KbSource {
        self.source
    }

    pub fn summary(&self) -> KbSummary {
        KbSummary {
            source: self.source,
            pairs: self.len(),
            dim: self.dim,
            model_id: self.model_id.clone(),
            built_at: self.built_at,
        }
    }
}

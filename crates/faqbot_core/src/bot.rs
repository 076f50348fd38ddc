use crate::cache::KbCache;
use crate::config::BotConfig;
use crate::embed::EmbeddingProvider;
use crate::error::{FaqError, Result};
use crate::flows::GuidedFlow;
use crate::intent::classify;
use crate::knowledge::KnowledgeBase;
use crate::model::{Decision, Intent, Record, RetrievalMatch};
use crate::retrieval::retrieve;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Serialize)]
pub struct Reply {
    pub intent: Intent,
    pub text: String,
    /// Present only when the query went through similarity retrieval.
    pub retrieval: Option<RetrievalMatch>,
}

/// Answers free-text queries from a shared, read-only knowledge base.
/// Cheap to clone and safe to share across threads.
#[derive(Clone)]
pub struct SupportBot {
    kb: Arc<KnowledgeBase>,
    embedder: Arc<dyn EmbeddingProvider>,
    config: BotConfig,
}

impl SupportBot {
    /// Fails when `embedder` is not the model that built `kb`.
    pub fn new(
        kb: Arc<KnowledgeBase>,
        embedder: Arc<dyn EmbeddingProvider>,
        config: BotConfig,
    ) -> Result<Self> {
        if kb.model_id() != embedder.model_id() {
            return Err(FaqError::InvalidInput(format!(
                "knowledge base was built with '{}' but queries would use '{}'",
                kb.model_id(),
                embedder.model_id()
            )));
        }
        Ok(Self {
            kb,
            embedder,
            config,
        })
    }

    /// Builds (or reuses) the knowledge base for `records` through `cache`.
    pub fn from_records(
        records: &[Record],
        embedder: Arc<dyn EmbeddingProvider>,
        config: BotConfig,
        cache: &KbCache,
    ) -> Result<Self> {
        let kb = cache.get_or_build(records, embedder.as_ref(), config.selection)?;
        Self::new(kb, embedder, config)
    }

    pub fn knowledge_base(&self) -> &KnowledgeBase {
        &self.kb
    }

    pub fn config(&self) -> &BotConfig {
        &self.config
    }

    pub fn retrieve(&self, query: &str) -> Result<RetrievalMatch> {
        retrieve(query, &self.kb, self.embedder.as_ref(), self.config.threshold)
    }

    /// Routes `query` by intent. Guided intents return the flow placeholder
    /// without touching the embedder; everything else goes to retrieval.
    pub fn reply(&self, query: &str) -> Result<Reply> {
        let intent = classify(query);
        if let Some(flow) = GuidedFlow::for_intent(intent) {
            debug!(%intent, "routing to guided flow");
            return Ok(Reply {
                intent,
                text: flow.placeholder(),
                retrieval: None,
            });
        }

        let result = self.retrieve(query)?;
        debug!(score = result.score, decision = ?result.decision, "retrieval finished");
        let text = match (&result.decision, &result.answer) {
            (Decision::Hit, Some(answer)) => answer.clone(),
            _ => self.config.dont_know.clone(),
        };
        Ok(Reply {
            intent,
            text,
            retrieval: Some(result),
        })
    }
}

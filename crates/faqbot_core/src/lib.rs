//! FAQ retrieval for customer-support conversations.
//!
//! ```text
//! records -> derive_pairs -> KnowledgeBase (pairs + embeddings)
//! query -> classify -> guided flow | retrieve -> answer or "don't know"
//! ```

pub mod bot;
pub mod cache;
pub mod config;
pub mod embed;
pub mod error;
pub mod eval;
pub mod flows;
pub mod ingest;
pub mod intent;
pub mod knowledge;
pub mod lazy_embed;
pub mod minilm_embed;
pub mod model;
pub mod pairs;
pub mod retrieval;
pub mod storage;

pub use bot::{Reply, SupportBot};
pub use cache::{fingerprint, CacheKey, KbCache};
pub use config::{
    BotConfig, DEFAULT_EMBEDDING_DIM, DEFAULT_MODEL_ID, DEFAULT_REQUIRED_PASS_RATE,
    DEFAULT_THRESHOLD, DONT_KNOW_MESSAGE,
};
pub use embed::{l2_normalize, EmbeddingProvider, HashEmbeddingProvider};
pub use error::{FaqError, Result};
pub use eval::{evaluate_cases, CaseExpectation, EvalCase, EvalOutcome, EvalSummary};
pub use flows::{FlowOutcome, FormField, GuidedFlow};
pub use ingest::{load_records, read_records, IngestReport};
pub use intent::classify;
pub use knowledge::{fallback_seed, KbSource, KbSummary, KnowledgeBase};
pub use lazy_embed::LazyEmbedder;
pub use minilm_embed::MiniLmEmbeddingProvider;
pub use model::{Decision, Intent, NoMatch, QaPair, Record, RetrievalMatch};
pub use pairs::{derive_pairs, ReplyIndex, ReplySelection};
pub use retrieval::{accepts, cosine_similarity, decide, retrieve, top_match};
pub use storage::{load_pairs_jsonl, read_pairs_jsonl, save_pairs_jsonl, write_pairs_jsonl};

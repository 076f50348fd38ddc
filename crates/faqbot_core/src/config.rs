use crate::pairs::ReplySelection;
use serde::{Deserialize, Serialize};

/// Minimum cosine similarity for an answer to be accepted. Inclusive.
pub const DEFAULT_THRESHOLD: f32 = 0.4;
pub const DEFAULT_EMBEDDING_DIM: usize = 384;
pub const DEFAULT_MODEL_ID: &str = "all-MiniLM-L6-v2";
pub const DEFAULT_REQUIRED_PASS_RATE: f32 = 0.85;
pub const DONT_KNOW_MESSAGE: &str = "Sorry, I don't know that yet.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotConfig {
    pub threshold: f32,
    pub selection: ReplySelection,
    pub dont_know: String,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            selection: ReplySelection::default(),
            dont_know: DONT_KNOW_MESSAGE.to_string(),
        }
    }
}

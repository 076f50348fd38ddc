use serde::{Deserialize, Serialize};
use std::fmt;

/// One conversational message from the support corpus.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Record {
    /// `None` when the source value was missing or not numeric.
    pub id: Option<i64>,
    pub text: String,
    /// True when the message was written by the customer.
    pub is_inbound: bool,
    pub in_reply_to_id: Option<i64>,
}

impl Record {
    pub fn inbound(id: i64, text: impl Into<String>) -> Self {
        Self {
            id: Some(id),
            text: text.into(),
            is_inbound: true,
            in_reply_to_id: None,
        }
    }

    pub fn reply(id: i64, text: impl Into<String>, in_reply_to_id: i64) -> Self {
        Self {
            id: Some(id),
            text: text.into(),
            is_inbound: false,
            in_reply_to_id: Some(in_reply_to_id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QaPair {
    pub question: String,
    pub answer: String,
}

impl QaPair {
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
        }
    }
}

/// Closed set of user goals. `Faq` is the default when no pattern group matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    OrderStatus,
    Refund,
    Faq,
}

impl Intent {
    pub fn as_str(self) -> &'static str {
        match self {
            Intent::OrderStatus => "order_status",
            Intent::Refund => "refund",
            Intent::Faq => "faq",
        }
    }

    /// Human-readable label, e.g. "order status".
    pub fn label(self) -> String {
        self.as_str().replace('_', " ")
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Hit,
    Miss,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalMatch {
    /// Row of the best candidate, reported even on a miss.
    pub index: Option<usize>,
    pub answer: Option<String>,
    pub score: f32,
    pub decision: Decision,
}

impl RetrievalMatch {
    pub fn into_answer(self) -> Result<String, NoMatch> {
        match (self.decision, self.answer) {
            (Decision::Hit, Some(answer)) => Ok(answer),
            _ => Err(NoMatch {
                best_score: self.score,
            }),
        }
    }
}

/// No knowledge base entry cleared the acceptance threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoMatch {
    pub best_score: f32,
}

impl fmt::Display for NoMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "no match (best score {:.4})", self.best_score)
    }
}

impl std::error::Error for NoMatch {}

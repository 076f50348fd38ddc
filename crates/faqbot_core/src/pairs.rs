//! Question/answer pair derivation from threaded support conversations.
//!
//! A customer message becomes a question when some support reply points at
//! its id through `in_reply_to_id`. Records without a usable id, replies
//! to unknown messages, and blank texts are skipped without error. When
//! several replies answer one message, [`ReplySelection::Last`] keeps the
//! last one seen, even if it is blank.

use crate::model::{QaPair, Record};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Which reply to use when several support messages answer the same
/// customer message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplySelection {
    First,
    /// Last reply in iteration order wins.
    #[default]
    Last,
    /// One pair per reply, in iteration order.
    All,
}

impl ReplySelection {
    pub fn as_str(self) -> &'static str {
        match self {
            ReplySelection::First => "first",
            ReplySelection::Last => "last",
            ReplySelection::All => "all",
        }
    }
}

/// Outbound reply texts grouped by the id they answer, in encounter order.
#[derive(Debug, Default, Clone)]
pub struct ReplyIndex<'a> {
    replies: HashMap<i64, Vec<&'a str>>,
}

impl<'a> ReplyIndex<'a> {
    pub fn build(records: &'a [Record]) -> Self {
        let mut replies: HashMap<i64, Vec<&'a str>> = HashMap::new();
        for record in records.iter().filter(|r| !r.is_inbound) {
            if let Some(parent) = record.in_reply_to_id {
                replies.entry(parent).or_default().push(record.text.as_str());
            }
        }
        Self { replies }
    }

    pub fn replies_to(&self, id: i64) -> &[&'a str] {
        self.replies.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Replies to `id` narrowed by `selection`. `First`/`Last` pick from
    /// every reply, blank ones included; a blank pick yields nothing. `All`
    /// keeps the non-blank replies. Texts are returned as written.
    pub fn select(&self, id: i64, selection: ReplySelection) -> Vec<&'a str> {
        let replies = self.replies_to(id);
        let picked: Vec<&'a str> = match selection {
            ReplySelection::First => replies.first().copied().into_iter().collect(),
            ReplySelection::Last => replies.last().copied().into_iter().collect(),
            ReplySelection::All => replies.to_vec(),
        };
        picked
            .into_iter()
            .filter(|a| !a.trim().is_empty())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.replies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.replies.is_empty()
    }
}

/// Derives pairs in inbound record order.
pub fn derive_pairs(records: &[Record], selection: ReplySelection) -> Vec<QaPair> {
    let index = ReplyIndex::build(records);
    let mut pairs = Vec::new();

    for record in records.iter().filter(|r| r.is_inbound) {
        let Some(id) = record.id else {
            continue;
        };
        let question = record.text.as_str();
        if question.trim().is_empty() {
            continue;
        }

        for answer in index.select(id, selection) {
            pairs.push(QaPair::new(question, answer));
        }
    }

    pairs
}

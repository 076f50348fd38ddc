//! Keyword router that runs before similarity retrieval.
//!
//! Pattern groups are tried in a fixed priority order: order status first,
//! then refund. The first group with any matching pattern decides the
//! intent; text matching no group is a FAQ question. That priority is the
//! only disambiguation rule, so "refund for my order status" routes to
//! order status.

use crate::model::Intent;
use regex::Regex;
use std::sync::LazyLock;

struct PatternGroup {
    intent: Intent,
    patterns: &'static LazyLock<Vec<Regex>>,
}

fn compile(sources: &[&str]) -> Vec<Regex> {
    sources.iter().filter_map(|s| Regex::new(s).ok()).collect()
}

static ORDER_STATUS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"order status",
        r"track order",
        r"where is my order",
        r"delivery status",
    ])
});

static REFUND: LazyLock<Vec<Regex>> =
    LazyLock::new(|| compile(&[r"refund", r"return", r"money back"]));

static GROUPS: [PatternGroup; 2] = [
    PatternGroup {
        intent: Intent::OrderStatus,
        patterns: &ORDER_STATUS,
    },
    PatternGroup {
        intent: Intent::Refund,
        patterns: &REFUND,
    },
];

pub fn classify(text: &str) -> Intent {
    let lowered = text.to_lowercase();
    GROUPS
        .iter()
        .find(|group| group.patterns.iter().any(|re| re.is_match(&lowered)))
        .map(|group| group.intent)
        .unwrap_or(Intent::Faq)
}

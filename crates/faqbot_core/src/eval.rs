use crate::bot::SupportBot;
use crate::error::Result;
use crate::model::{Decision, Intent};
use serde::{Deserialize, Serialize};
use std::time::Instant;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalCase {
    pub case_id: String,
    pub query: String,
    pub expected_intent: Intent,
    /// Absent: answer not checked. `null`: retrieval must miss. Text: the
    /// reply must equal it.
    #[serde(
        default,
        deserialize_with = "deserialize_optional_nullable_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub expected_answer: Option<Option<String>>,
    #[serde(default)]
    pub min_similarity: Option<f32>,
}

/// Absent → `None`, null → `Some(None)`, `"text"` → `Some(Some("text"))`.
fn deserialize_optional_nullable_string<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<Option<String>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let val: Option<String> = Option::deserialize(deserializer)?;
    Ok(Some(val))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalOutcome {
    pub case_id: String,
    pub passed: bool,
    pub actual_intent: Intent,
    pub actual_decision: Option<Decision>,
    pub actual_answer: String,
    pub score: Option<f32>,
    pub latency_ms: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub pass_rate: f32,
    pub outcomes: Vec<EvalOutcome>,
}

impl EvalSummary {
    pub fn meets(&self, required_pass_rate: f32) -> bool {
        self.pass_rate >= required_pass_rate
    }
}

pub struct CaseExpectation;

impl CaseExpectation {
    pub fn matches(
        case: &EvalCase,
        actual_intent: Intent,
        actual_decision: Option<Decision>,
        actual_answer: &str,
        score: Option<f32>,
    ) -> bool {
        if case.expected_intent != actual_intent {
            return false;
        }

        match &case.expected_answer {
            Some(Some(expected)) if expected != actual_answer => return false,
            Some(None) if actual_decision != Some(Decision::Miss) => return false,
            _ => {}
        }

        if let Some(min_sim) = case.min_similarity {
            if score.unwrap_or(f32::MIN) < min_sim {
                return false;
            }
        }

        true
    }
}

/// Runs every case through the full reply path. Embedder failures abort the run.
pub fn evaluate_cases(bot: &SupportBot, cases: &[EvalCase]) -> Result<EvalSummary> {
    let mut outcomes = Vec::with_capacity(cases.len());

    for case in cases {
        let start = Instant::now();
        let reply = bot.reply(&case.query)?;
        let latency_ms = start.elapsed().as_secs_f64() * 1000.0;

        let decision = reply.retrieval.as_ref().map(|r| r.decision);
        let score = reply.retrieval.as_ref().map(|r| r.score);
        let passed = CaseExpectation::matches(case, reply.intent, decision, &reply.text, score);

        outcomes.push(EvalOutcome {
            case_id: case.case_id.clone(),
            passed,
            actual_intent: reply.intent,
            actual_decision: decision,
            actual_answer: reply.text,
            score,
            latency_ms,
        });
    }

    let total = outcomes.len();
    let passed = outcomes.iter().filter(|o| o.passed).count();
    let failed = total.saturating_sub(passed);
    let pass_rate = if total == 0 {
        0.0
    } else {
        passed as f32 / total as f32
    };

    Ok(EvalSummary {
        total,
        passed,
        failed,
        pass_rate,
        outcomes,
    })
}

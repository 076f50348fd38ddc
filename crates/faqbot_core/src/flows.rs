//! Form-based flows for intents that bypass retrieval.

use crate::model::Intent;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormField {
    pub key: &'static str,
    pub label: &'static str,
    pub placeholder: Option<&'static str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuidedFlow {
    pub intent: Intent,
    pub title: &'static str,
    pub fields: &'static [FormField],
    pub submit_label: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "message", rename_all = "snake_case")]
pub enum FlowOutcome {
    Accepted(String),
    Incomplete(String),
}

impl FlowOutcome {
    pub fn message(&self) -> &str {
        match self {
            FlowOutcome::Accepted(m) | FlowOutcome::Incomplete(m) => m,
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, FlowOutcome::Accepted(_))
    }
}

const ORDER_STATUS_FIELDS: &[FormField] = &[
    FormField {
        key: "order_id",
        label: "Order ID",
        placeholder: Some("e.g., ORD12345"),
    },
    FormField {
        key: "email",
        label: "Email used for the order",
        placeholder: None,
    },
];

const REFUND_FIELDS: &[FormField] = &[
    FormField {
        key: "order_id",
        label: "Order ID",
        placeholder: None,
    },
    FormField {
        key: "reason",
        label: "Reason for refund",
        placeholder: None,
    },
];

pub const ORDER_STATUS_FLOW: GuidedFlow = GuidedFlow {
    intent: Intent::OrderStatus,
    title: "Order status",
    fields: ORDER_STATUS_FIELDS,
    submit_label: "Check Status",
};

pub const REFUND_FLOW: GuidedFlow = GuidedFlow {
    intent: Intent::Refund,
    title: "Refund request",
    fields: REFUND_FIELDS,
    submit_label: "Submit Refund Request",
};

impl GuidedFlow {
    /// The flow for a guided intent; `None` for [`Intent::Faq`].
    pub fn for_intent(intent: Intent) -> Option<&'static GuidedFlow> {
        match intent {
            Intent::OrderStatus => Some(&ORDER_STATUS_FLOW),
            Intent::Refund => Some(&REFUND_FLOW),
            Intent::Faq => None,
        }
    }

    /// Reply shown in the conversation when the flow is triggered.
    pub fn placeholder(&self) -> String {
        format!("Guided flow for **{}** displayed above.", self.intent.label())
    }

    /// Validates a submission. Every field must be present and non-blank.
    pub fn submit(&self, values: &HashMap<String, String>) -> FlowOutcome {
        let value = |key: &str| values.get(key).map(|v| v.trim()).unwrap_or("");
        if self.fields.iter().any(|f| value(f.key).is_empty()) {
            let hint = match self.intent {
                Intent::OrderStatus => "Please fill in both Order ID and Email.",
                _ => "Please fill all fields.",
            };
            return FlowOutcome::Incomplete(hint.to_string());
        }

        let message = match self.intent {
            Intent::OrderStatus => format!(
                "Status check for **{}** queued. Updates will be sent to **{}**.",
                value("order_id"),
                value("email")
            ),
            Intent::Refund => format!(
                "Refund request for **{}** received. Our team will contact you within 24-48 hours.",
                value("order_id")
            ),
            Intent::Faq => "Submitted.".to_string(),
        };
        FlowOutcome::Accepted(message)
    }
}

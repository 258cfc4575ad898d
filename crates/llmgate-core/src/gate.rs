use bytes::Bytes;
use serde::Deserialize;

use crate::models::ModelTable;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Allow,
    Deny { model: String },
}

#[derive(Debug, Deserialize)]
struct ModelField {
    model: Option<String>,
}

/// Inspects the request body's `model` field against the table.
///
/// Reading the body is destructive in the underlying transport, so the gate
/// returns the exact bytes it read; the caller forwards those bytes, never
/// the original body. Malformed or model-less bodies are allowed through —
/// they are the upstream's problem, not a security boundary.
pub fn gate_request(body: Bytes, table: &ModelTable) -> (GateDecision, Bytes) {
    let model = serde_json::from_slice::<ModelField>(&body)
        .ok()
        .and_then(|parsed| parsed.model);
    let Some(model) = model else {
        return (GateDecision::Allow, body);
    };
    if table.is_denied(&model) {
        return (GateDecision::Deny { model }, body);
    }
    (GateDecision::Allow, body)
}

/*
 * Responsibility
 * - 既存ドキュメント × リクエストボディ の差分/オーバーレイ計算 (StateContext)
 * - update は closed-schema: incoming の未知キーは result に入らない
 * - result は常に新しい値。existing/incoming を書き換えない
 */
use serde_json::{Map, Value};

use crate::model::state::StateError;
use crate::model::state::machine::{Role, State};

/// Reserved document field holding the lifecycle state.
pub const STATE_FIELD: &str = "state";

/// Request-scoped overlay of an incoming change against a stored document.
///
/// Constructed per request, consumed once the transition decision is made.
/// `result` is built functionally from `existing` and the allowed overlay;
/// the caller-supplied documents are never mutated.
#[derive(Debug, Clone)]
pub struct StateContext {
    existing: Option<Map<String, Value>>,
    incoming: Option<Map<String, Value>>,
    current_role: Role,
    result: Map<String, Value>,
}

fn as_object(document: &Value) -> Result<&Map<String, Value>, StateError> {
    document.as_object().ok_or(StateError::MalformedDocument {
        reason: "expected a JSON object",
    })
}

/// Closed-schema overlay: every key of `existing` keeps its value unless
/// `incoming` carries the same key, in which case the incoming value wins.
/// Keys that exist only in `incoming` are dropped.
fn overlay(existing: &Map<String, Value>, incoming: &Map<String, Value>) -> Map<String, Value> {
    existing
        .iter()
        .map(|(key, value)| (key.clone(), incoming.get(key).unwrap_or(value).clone()))
        .collect()
}

impl StateContext {
    /// Context over a stored document with no incoming change.
    pub fn read_only(existing: &Value, current_role: Role) -> Result<Self, StateError> {
        let existing = as_object(existing)?.clone();
        Ok(Self {
            result: existing.clone(),
            existing: Some(existing),
            incoming: None,
            current_role,
        })
    }

    /// Create-mode context: there is no stored document, so the result starts
    /// as a full copy of the incoming one.
    pub fn create(current_role: Role, incoming: &Value) -> Result<Self, StateError> {
        let incoming = as_object(incoming)?.clone();
        Ok(Self {
            result: incoming.clone(),
            existing: None,
            incoming: Some(incoming),
            current_role,
        })
    }

    /// Update-mode context: the result is `existing` overlaid with the
    /// incoming values for keys the stored document already has.
    pub fn update(existing: &Value, incoming: &Value, current_role: Role) -> Result<Self, StateError> {
        let existing = as_object(existing)?.clone();
        let incoming = as_object(incoming)?.clone();
        Ok(Self {
            result: overlay(&existing, &incoming),
            existing: Some(existing),
            incoming: Some(incoming),
            current_role,
        })
    }

    /// True iff some key present in both documents differs structurally.
    ///
    /// The reserved `state` field is machine-managed and travels out-of-band
    /// with the transition request, so it does not count as an attribute.
    /// Keys present only in `incoming` cannot differ from anything and are
    /// ignored (the overlay drops them anyway).
    pub fn attributes_changed(&self) -> bool {
        let (Some(existing), Some(incoming)) = (&self.existing, &self.incoming) else {
            return false;
        };
        existing.iter().any(|(key, value)| {
            key != STATE_FIELD && incoming.get(key).is_some_and(|v| v != value)
        })
    }

    /// Lifecycle state recorded in the stored document.
    pub fn current_state(&self) -> Result<State, StateError> {
        self.existing
            .as_ref()
            .and_then(|existing| existing.get(STATE_FIELD))
            .and_then(Value::as_str)
            .and_then(State::parse)
            .ok_or(StateError::MalformedDocument {
                reason: "missing or unknown lifecycle state",
            })
    }

    /// Write the destination state into the result. Permission checks are the
    /// state machine's job; call this only after the transition is authorized.
    pub fn apply_state(&mut self, destination: State) {
        self.result.insert(
            STATE_FIELD.to_string(),
            Value::String(destination.as_str().to_string()),
        );
    }

    pub fn current_role(&self) -> Role {
        self.current_role
    }

    pub fn result(&self) -> Value {
        Value::Object(self.result.clone())
    }

    pub fn into_result(self) -> Value {
        Value::Object(self.result)
    }
}

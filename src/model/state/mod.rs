/*
 * Responsibility
 * - StateContext (差分/オーバーレイ) と machine (遷移テーブル) の公開
 * - transition(): 認可済みロールによる状態遷移の判定 + マージ結果の生成
 */
pub mod context;
pub mod machine;

use serde_json::Value;
use thiserror::Error;

pub use context::StateContext;
pub use machine::{Role, State};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StateError {
    /// Authorization/business-rule failure: the role is not on the requested
    /// edge, or content changed in a state that forbids it. Distinct from a
    /// credential failure.
    #[error("transition denied: {reason}")]
    TransitionDenied { reason: &'static str },

    /// The incoming payload (or the stored document) is not usable as a
    /// registry document. Rejected before any diff/merge runs.
    #[error("malformed document: {reason}")]
    MalformedDocument { reason: &'static str },
}

/// Decide a lifecycle transition and produce the merged document.
///
/// `existing == None` is a create: the destination must be the initial state
/// and the result is the incoming document stamped with it. Otherwise the
/// incoming change is overlaid onto the stored document, the edge table is
/// consulted for `role`, and a same-state destination is treated as a no-op
/// content update rather than a transition.
pub fn transition(
    existing: Option<&Value>,
    incoming: &Value,
    role: Role,
    destination: State,
) -> Result<Value, StateError> {
    let Some(existing) = existing else {
        if destination != State::INITIAL {
            return Err(StateError::TransitionDenied {
                reason: "new records start in the initial lifecycle state",
            });
        }
        let mut ctx = StateContext::create(role, incoming)?;
        ctx.apply_state(State::INITIAL);
        return Ok(ctx.into_result());
    };

    let mut ctx = StateContext::update(existing, incoming, role)?;
    let current = ctx.current_state()?;
    let changed = ctx.attributes_changed();

    if changed && current.content_frozen() {
        return Err(StateError::TransitionDenied {
            reason: "attributes cannot change in a content-frozen state",
        });
    }

    if destination == current {
        // No-op resubmission: no edge traversal, only the edit gate applies.
        if changed && !machine::may_edit(current, ctx.current_role()) {
            return Err(StateError::TransitionDenied {
                reason: "role may not edit records in this state",
            });
        }
    } else if !machine::can_transition(current, destination, ctx.current_role()) {
        return Err(StateError::TransitionDenied {
            reason: "role is not permitted on this transition",
        });
    }

    ctx.apply_state(destination);
    Ok(ctx.into_result())
}

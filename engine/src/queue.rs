//! Pending actions and replay ordering.

use crate::route::RoutePatch;
use crate::{ActionId, ActionKind, ActionPayload, ActionState, HttpMethod, Timestamp};
use serde::{Deserialize, Serialize};

/// A mutation about to be attempted live or queued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAction {
    /// Remote resource path, relative to the API base
    pub endpoint: String,
    pub method: HttpMethod,
    pub payload: ActionPayload,
}

impl NewAction {
    pub fn new(endpoint: impl Into<String>, method: HttpMethod, payload: ActionPayload) -> Self {
        Self {
            endpoint: endpoint.into(),
            method,
            payload,
        }
    }

    pub fn kind(&self) -> ActionKind {
        self.payload.kind()
    }
}

/// A durably queued mutation that the server has not acknowledged yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingAction {
    /// Locally assigned, never reused
    pub id: ActionId,
    /// Sent as `Idempotency-Key` on every attempt
    pub client_ref: String,
    pub kind: ActionKind,
    pub endpoint: String,
    pub method: HttpMethod,
    pub payload: ActionPayload,
    /// Milliseconds since epoch; the replay ordering key
    pub created_at: Timestamp,
    pub state: ActionState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub retry_count: u32,
}

impl PendingAction {
    /// Whether a drain should pick this action up.
    pub fn is_replayable(&self) -> bool {
        ActionState::REPLAYABLE.contains(&self.state)
    }

    /// Position in replay order.
    pub fn replay_key(&self) -> (Timestamp, ActionId) {
        (self.created_at, self.id)
    }

    /// The cache patch to re-apply once this action has been replayed.
    ///
    /// The patch was already applied when the action was queued, so only an
    /// idempotent patch is re-applied, and only when no action still in
    /// `unresolved` and later in replay order targets the same item. The
    /// cached item then keeps showing the newest queued change.
    pub fn reconciliation_patch(&self, unresolved: &[PendingAction]) -> Option<RoutePatch> {
        let patch = self.payload.route_patch()?;
        if !patch.change.is_idempotent() {
            return None;
        }

        let superseded = unresolved
            .iter()
            .filter(|other| other.id != self.id && other.replay_key() > self.replay_key())
            .filter_map(|other| other.payload.route_patch())
            .any(|later| later.same_target(&patch));

        (!superseded).then_some(patch)
    }
}

/// Sort actions into replay order.
///
/// Order is `created_at` ascending, ties broken by id so that two actions
/// queued within the same millisecond still replay in enqueue order. Kind and
/// endpoint never influence the order.
pub fn replay_order(mut actions: Vec<PendingAction>) -> Vec<PendingAction> {
    actions.sort_by_key(PendingAction::replay_key);
    actions
}

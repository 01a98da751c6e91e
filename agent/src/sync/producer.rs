//! Producer contract: try live, fall back to the queue.

use std::sync::Arc;

use fieldsync_engine::outcome::{is_session_invalid_message, UNAUTHORIZED};
use fieldsync_engine::{ActionId, NewAction, Notification, Outcome};
use serde::Serialize;
use uuid::Uuid;

use super::SyncEngine;
use crate::db;
use crate::now_millis;

/// Result of [`SyncEngine::perform`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum PerformOutcome {
    /// The server accepted the action live.
    Applied { already_applied: bool },
    /// Stored for replay; the cache already shows it as done.
    Queued { action_id: ActionId },
    /// The server refused the action. Nothing was stored.
    Rejected { status: u16, message: String },
    /// The action could not be turned into a request.
    Invalid { message: String },
    /// Live call failed and the queue could not store the action either.
    NotSaved { reason: String },
}

impl PerformOutcome {
    /// Whether the user can treat the action as done.
    pub fn is_accepted(&self) -> bool {
        matches!(
            self,
            PerformOutcome::Applied { .. } | PerformOutcome::Queued { .. }
        )
    }
}

impl SyncEngine {
    /// Perform a mutation.
    ///
    /// Offline, or on a 5xx, transport error or timeout, the action is queued
    /// and the cached route patched as if it had succeeded. A definite 4xx is
    /// surfaced instead; a 401 also drops the session. The same policy holds
    /// for every kind of action.
    pub async fn perform(self: &Arc<Self>, action: NewAction) -> PerformOutcome {
        let kind = action.kind();
        let client_ref = Uuid::new_v4().to_string();

        // A body that cannot be built now will not build at replay either
        let body = match action.payload.replay_body() {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(%kind, error = %e, "Rejecting malformed action");
                return PerformOutcome::Invalid {
                    message: e.to_string(),
                };
            }
        };

        if !self.connectivity.is_online() {
            tracing::debug!(%kind, "Offline; queueing action");
            return self.enqueue(action, &client_ref).await;
        }

        let outcome = match self
            .client
            .send(action.method, &action.endpoint, &body, Some(&client_ref))
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(%kind, error = %e, "Could not build request");
                return PerformOutcome::Invalid {
                    message: e.to_string(),
                };
            }
        };

        if outcome.is_success() {
            self.apply_optimistic(&action).await;
            return PerformOutcome::Applied {
                already_applied: outcome == Outcome::AlreadyApplied,
            };
        }

        if outcome.should_enqueue() {
            tracing::info!(
                %kind,
                status = ?outcome.status(),
                error = outcome.message().unwrap_or_default(),
                "Live call failed; queueing action"
            );
            let queued = self.enqueue(action, &client_ref).await;
            if queued.is_accepted() {
                self.trigger();
            }
            return queued;
        }

        let status = outcome.status().unwrap_or_default();
        let message = outcome.message().unwrap_or_default().to_string();
        if status == UNAUTHORIZED || is_session_invalid_message(&message) {
            self.client.session().invalidate();
            self.notifier.notify(Notification::SessionInvalid {
                message: Some(message.clone()),
            });
        }
        tracing::info!(%kind, status, error = %message, "Action rejected by server");
        PerformOutcome::Rejected { status, message }
    }

    async fn enqueue(&self, action: NewAction, client_ref: &str) -> PerformOutcome {
        match db::enqueue_action(&self.pool, &action, client_ref, now_millis()).await {
            Ok(action_id) => {
                tracing::info!(action_id, kind = %action.kind(), "Action saved offline");
                self.apply_optimistic(&action).await;
                self.notifier
                    .notify(Notification::SavedOffline { action_id });
                PerformOutcome::Queued { action_id }
            }
            Err(e) => {
                tracing::error!(kind = %action.kind(), error = %e, "Could not save action offline");
                let reason = e.to_string();
                self.notifier.notify(Notification::CouldNotSaveOffline {
                    reason: reason.clone(),
                });
                PerformOutcome::NotSaved { reason }
            }
        }
    }

    async fn apply_optimistic(&self, action: &NewAction) {
        let Some(patch) = action.payload.route_patch() else {
            return;
        };
        if let Err(e) = db::patch_route_item(&self.pool, &patch, now_millis()).await {
            tracing::warn!(route_id = %patch.route_id, error = %e, "Could not patch cached route");
        }
    }
}

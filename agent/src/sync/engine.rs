//! Single-flight, ordered replay of the pending action queue.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use fieldsync_engine::{
    replay_order, ActionId, ActionState, DrainSummary, Notification, PendingAction,
};
use serde::Serialize;
use tokio::sync::Mutex;

use crate::connectivity::Connectivity;
use crate::db::{self, ActionUpdate, Pool, StoreError};
use crate::notify::Notifier;
use crate::remote::ApiClient;
use crate::now_millis;

/// What a call to [`SyncEngine::drain`] did.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "camelCase")]
pub enum DrainOutcome {
    /// Not online; nothing was attempted.
    Offline,
    /// Another drain was running and will pick up the work.
    Coalesced,
    /// The queue was replayed.
    Completed(DrainSummary),
}

/// Replays queued actions against the remote API.
///
/// At most one drain runs at a time. A trigger that arrives while a drain is
/// running is folded into it: the running drain makes one more pass before it
/// releases the gate.
#[derive(Debug)]
pub struct SyncEngine {
    pub(crate) pool: Pool,
    pub(crate) client: ApiClient,
    pub(crate) connectivity: Arc<Connectivity>,
    pub(crate) notifier: Arc<Notifier>,
    gate: Mutex<()>,
    rerun: AtomicBool,
}

impl SyncEngine {
    pub fn new(
        pool: Pool,
        client: ApiClient,
        connectivity: Arc<Connectivity>,
        notifier: Arc<Notifier>,
    ) -> Self {
        Self {
            pool,
            client,
            connectivity,
            notifier,
            gate: Mutex::new(()),
            rerun: AtomicBool::new(false),
        }
    }

    pub fn new_shared(
        pool: Pool,
        client: ApiClient,
        connectivity: Arc<Connectivity>,
        notifier: Arc<Notifier>,
    ) -> Arc<Self> {
        Arc::new(Self::new(pool, client, connectivity, notifier))
    }

    pub fn connectivity(&self) -> &Arc<Connectivity> {
        &self.connectivity
    }

    pub fn notifier(&self) -> &Arc<Notifier> {
        &self.notifier
    }

    /// Number of unresolved actions (PENDING, ERROR or SYNCING).
    pub async fn pending_count(&self) -> Result<i64, StoreError> {
        db::count_actions_by_state(&self.pool, &ActionState::UNRESOLVED).await
    }

    /// Drain the queue.
    ///
    /// Publishes one notification summarizing every pass this call ran.
    pub async fn drain(&self) -> DrainOutcome {
        if !self.connectivity.is_online() {
            tracing::debug!("Offline; drain skipped");
            return DrainOutcome::Offline;
        }

        let mut total = DrainSummary::new();
        let mut passes = 0usize;

        loop {
            let guard = match self.gate.try_lock() {
                Ok(guard) => guard,
                Err(_) => {
                    self.rerun.store(true, Ordering::SeqCst);
                    // The holder may have read the flag before it was set
                    match self.gate.try_lock() {
                        Ok(guard) => guard,
                        Err(_) if passes == 0 => {
                            tracing::debug!("Drain already running; coalesced");
                            return DrainOutcome::Coalesced;
                        }
                        Err(_) => break,
                    }
                }
            };

            self.rerun.store(false, Ordering::SeqCst);
            passes += 1;

            match self.drain_once().await {
                Ok(summary) => total.merge(summary),
                Err(e) => tracing::error!(error = %e, "Drain pass aborted"),
            }

            drop(guard);

            if !self.rerun.load(Ordering::SeqCst) || !self.connectivity.is_online() {
                break;
            }
            tracing::debug!("Trigger arrived during drain; running another pass");
        }

        self.finish(&total);
        DrainOutcome::Completed(total)
    }

    /// Spawn a drain in the background.
    pub fn trigger(self: &Arc<Self>) {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            engine.drain().await;
        });
    }

    /// Drain on every offline to online transition.
    pub fn spawn_reconnect_listener(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let engine = Arc::clone(self);
        let mut rx = self.connectivity.subscribe();

        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let online = *rx.borrow_and_update();
                if online {
                    tracing::info!("Back online; draining queue");
                    engine.drain().await;
                }
            }
        })
    }

    async fn drain_once(&self) -> Result<DrainSummary, StoreError> {
        let recovered = db::reset_interrupted(&self.pool).await?;
        if recovered > 0 {
            tracing::warn!(count = recovered, "Recovered actions left SYNCING by an interrupted drain");
        }

        let actions = replay_order(
            db::list_actions_by_state(&self.pool, &ActionState::REPLAYABLE).await?,
        );
        let mut summary = DrainSummary::new();
        if actions.is_empty() {
            return Ok(summary);
        }

        tracing::info!(count = actions.len(), "Draining pending actions");
        self.notifier.notify(Notification::SyncStarted {
            pending: actions.len(),
        });

        for action in &actions {
            self.replay(action, &mut summary).await;
        }

        tracing::info!(
            succeeded = summary.succeeded,
            failed = summary.failed,
            "Drain pass finished"
        );
        Ok(summary)
    }

    async fn replay(&self, action: &PendingAction, summary: &mut DrainSummary) {
        let id = action.id;

        let syncing = match action.state.transition(ActionState::Syncing) {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!(action_id = id, error = %e, "Skipping action");
                return;
            }
        };
        if let Err(e) = db::update_action(&self.pool, id, &ActionUpdate::state(syncing)).await {
            tracing::error!(action_id = id, error = %e, "Could not mark action SYNCING; skipping");
            return;
        }

        let body = match action.payload.replay_body() {
            Ok(body) => body,
            Err(e) => {
                let message = format!("could not build request: {}", e);
                self.mark_failed(id, &message).await;
                summary.record_local_failure(id, message);
                return;
            }
        };

        let outcome = match self
            .client
            .send(action.method, &action.endpoint, &body, Some(&action.client_ref))
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                let message = e.to_string();
                self.mark_failed(id, &message).await;
                summary.record_local_failure(id, message);
                return;
            }
        };

        summary.record(id, &outcome);

        if outcome.is_success() {
            tracing::debug!(action_id = id, kind = %action.kind, ?outcome, "Action replayed");
            if let Err(e) = db::delete_action(&self.pool, id).await {
                // Left behind; the next replay is answered with 409
                tracing::error!(action_id = id, error = %e, "Could not delete replayed action");
            }
            self.reconcile(action).await;
        } else {
            let message = outcome.message().unwrap_or("unknown error");
            tracing::warn!(
                action_id = id,
                kind = %action.kind,
                status = ?outcome.status(),
                error = %message,
                "Replay failed"
            );
            self.mark_failed(id, message).await;
        }
    }

    async fn mark_failed(&self, id: ActionId, message: &str) {
        if let Err(e) = db::update_action(&self.pool, id, &ActionUpdate::failed(message)).await {
            tracing::error!(action_id = id, error = %e, "Could not record failure");
        }
    }

    async fn reconcile(&self, action: &PendingAction) {
        let unresolved =
            match db::list_actions_by_state(&self.pool, &ActionState::UNRESOLVED).await {
                Ok(unresolved) => unresolved,
                Err(e) => {
                    tracing::warn!(action_id = action.id, error = %e, "Could not read queue; skipping reconciliation");
                    return;
                }
            };
        let Some(patch) = action.reconciliation_patch(&unresolved) else {
            return;
        };
        match db::patch_route_item(&self.pool, &patch, now_millis()).await {
            Ok(true) => {}
            Ok(false) => tracing::debug!(route_id = %patch.route_id, "Route not cached; nothing to reconcile"),
            Err(e) => tracing::warn!(route_id = %patch.route_id, error = %e, "Could not reconcile cached route"),
        }
    }

    fn finish(&self, total: &DrainSummary) {
        if total.session_looks_invalid() {
            self.client.session().invalidate();
        }
        if let Some(notification) = total.notification() {
            self.notifier.notify(notification);
        }
    }
}

//! Drain accounting and user-facing notifications.

use crate::outcome::{FailureClass, Outcome, UNAUTHORIZED};
use crate::ActionId;
use serde::{Deserialize, Serialize};

/// Tally of one drain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrainSummary {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Ids left in ERROR by this drain
    pub failed_ids: Vec<ActionId>,
    /// Text of the most recent failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// A failure said the session can no longer act
    pub session_invalid: bool,
    #[serde(skip)]
    unauthorized: usize,
}

impl DrainSummary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome of one replayed action.
    pub fn record(&mut self, id: ActionId, outcome: &Outcome) {
        self.attempted += 1;

        match outcome.failure_class() {
            None => self.succeeded += 1,
            Some(class) => {
                self.failed += 1;
                self.failed_ids.push(id);
                self.last_error = outcome.message().map(str::to_string);
                if class == FailureClass::SessionInvalid {
                    self.session_invalid = true;
                }
                if outcome.status() == Some(UNAUTHORIZED) {
                    self.unauthorized += 1;
                }
            }
        }
    }

    /// Record an action that failed before it could be sent.
    pub fn record_local_failure(&mut self, id: ActionId, message: impl Into<String>) {
        self.attempted += 1;
        self.failed += 1;
        self.failed_ids.push(id);
        self.last_error = Some(message.into());
    }

    /// Fold a later pass into this one.
    pub fn merge(&mut self, other: DrainSummary) {
        self.attempted += other.attempted;
        self.succeeded += other.succeeded;
        self.failed += other.failed;
        self.failed_ids.extend(other.failed_ids);
        if other.last_error.is_some() {
            self.last_error = other.last_error;
        }
        self.session_invalid |= other.session_invalid;
        self.unauthorized += other.unauthorized;
    }

    /// Whether the session looks unusable: an explicit employee error, or
    /// every failure of the drain being a 401.
    pub fn session_looks_invalid(&self) -> bool {
        self.session_invalid || (self.failed > 0 && self.unauthorized == self.failed)
    }

    /// The single notification reporting this drain.
    ///
    /// `None` when nothing was attempted.
    pub fn notification(&self) -> Option<Notification> {
        if self.attempted == 0 {
            return None;
        }
        if self.session_looks_invalid() {
            return Some(Notification::SessionInvalid {
                message: self.last_error.clone(),
            });
        }
        if self.failed == 0 {
            Some(Notification::SyncSucceeded {
                count: self.succeeded,
            })
        } else {
            Some(Notification::SyncPartiallyFailed {
                failed: self.failed,
                last_error: self.last_error.clone().unwrap_or_default(),
            })
        }
    }
}

/// Urgency of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// Toast-style messages for the promoter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Notification {
    SavedOffline { action_id: ActionId },
    CouldNotSaveOffline { reason: String },
    SyncStarted { pending: usize },
    SyncSucceeded { count: usize },
    SyncPartiallyFailed { failed: usize, last_error: String },
    SessionInvalid { message: Option<String> },
}

impl Notification {
    pub fn severity(&self) -> Severity {
        match self {
            Notification::SavedOffline { .. }
            | Notification::SyncStarted { .. }
            | Notification::SyncSucceeded { .. } => Severity::Info,
            Notification::SyncPartiallyFailed { .. } => Severity::Warning,
            Notification::CouldNotSaveOffline { .. } | Notification::SessionInvalid { .. } => {
                Severity::Error
            }
        }
    }

    /// Text shown to the user.
    pub fn text(&self) -> String {
        match self {
            Notification::SavedOffline { .. } => {
                "Saved offline. It will be sent when you are back online.".to_string()
            }
            Notification::CouldNotSaveOffline { reason } => {
                format!("Could not save offline: {}", reason)
            }
            Notification::SyncStarted { pending } => {
                format!("Syncing {} pending action(s)...", pending)
            }
            Notification::SyncSucceeded { count } => {
                format!("{} action(s) synced.", count)
            }
            Notification::SyncPartiallyFailed { failed, last_error } => {
                format!("{} action(s) failed to sync. Last error: {}", failed, last_error)
            }
            Notification::SessionInvalid { .. } => {
                "Your session is no longer linked to an employee record. Sign out and sign in again before syncing.".to_string()
            }
        }
    }
}

//! Action kinds, HTTP methods and the queue state machine.
//!
//! All three are stored as their upper-case wire names so the durable store
//! and the remote API agree on spelling.

use crate::{error::Result, Error};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The closed set of mutations a promoter can perform offline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionKind {
    Location,
    Checkin,
    Checkout,
    ProductCheck,
    Photo,
    DocumentUpload,
    Form,
    TimeClock,
}

impl ActionKind {
    /// All kinds, in declaration order.
    pub const ALL: [ActionKind; 8] = [
        ActionKind::Location,
        ActionKind::Checkin,
        ActionKind::Checkout,
        ActionKind::ProductCheck,
        ActionKind::Photo,
        ActionKind::DocumentUpload,
        ActionKind::Form,
        ActionKind::TimeClock,
    ];

    /// Wire name of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Location => "LOCATION",
            ActionKind::Checkin => "CHECKIN",
            ActionKind::Checkout => "CHECKOUT",
            ActionKind::ProductCheck => "PRODUCT_CHECK",
            ActionKind::Photo => "PHOTO",
            ActionKind::DocumentUpload => "DOCUMENT_UPLOAD",
            ActionKind::Form => "FORM",
            ActionKind::TimeClock => "TIME_CLOCK",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        ActionKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| Error::UnknownValue {
                field: "action kind",
                value: s.to_string(),
            })
    }
}

/// HTTP methods a queued mutation may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Post,
    Put,
    Patch,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "PATCH" => Ok(HttpMethod::Patch),
            _ => Err(Error::UnknownValue {
                field: "http method",
                value: s.to_string(),
            }),
        }
    }
}

/// Lifecycle state of a queued action.
///
/// Success is not a state: an acknowledged action is deleted from the queue.
///
/// ```text
/// PENDING -> SYNCING -> (deleted | ERROR)
/// ERROR   -> SYNCING
/// SYNCING -> PENDING   (recovery of an interrupted drain)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ActionState {
    Pending,
    Syncing,
    Error,
}

impl ActionState {
    /// States selected for replay by a drain.
    pub const REPLAYABLE: [ActionState; 2] = [ActionState::Pending, ActionState::Error];

    /// States that count as "not yet resolved" for the pending badge.
    pub const UNRESOLVED: [ActionState; 3] = [
        ActionState::Pending,
        ActionState::Error,
        ActionState::Syncing,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionState::Pending => "PENDING",
            ActionState::Syncing => "SYNCING",
            ActionState::Error => "ERROR",
        }
    }

    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(&self, next: ActionState) -> bool {
        matches!(
            (self, next),
            (ActionState::Pending, ActionState::Syncing)
                | (ActionState::Error, ActionState::Syncing)
                | (ActionState::Syncing, ActionState::Error)
                | (ActionState::Syncing, ActionState::Pending)
        )
    }

    /// Validate a transition, returning the target state.
    pub fn transition(self, next: ActionState) -> Result<ActionState> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(Error::InvalidTransition {
                from: self,
                to: next,
            })
        }
    }
}

impl fmt::Display for ActionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(ActionState::Pending),
            "SYNCING" => Ok(ActionState::Syncing),
            "ERROR" => Ok(ActionState::Error),
            _ => Err(Error::UnknownValue {
                field: "action state",
                value: s.to_string(),
            }),
        }
    }
}

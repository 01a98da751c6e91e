//! Classification of remote call results.
//!
//! | response                   | outcome          | queue effect              |
//! |----------------------------|------------------|---------------------------|
//! | 2xx                        | `Applied`        | delete                    |
//! | 409                        | `AlreadyApplied` | delete                    |
//! | other 4xx                  | `Rejected`       | ERROR, kept for review    |
//! | 5xx, transport, timeout    | `Retryable`      | ERROR, retried next drain |

use serde::{Deserialize, Serialize};

/// HTTP status the server uses for "already applied".
pub const CONFLICT: u16 = 409;

/// HTTP status that signals a missing or expired credential.
pub const UNAUTHORIZED: u16 = 401;

/// Longest server message kept on an action.
const MAX_MESSAGE_LEN: usize = 500;

/// Result of one live or replayed remote call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum Outcome {
    /// The server accepted the mutation.
    Applied,
    /// The server reported the mutation as already present.
    AlreadyApplied,
    /// The server refused the mutation; retrying the same body will not help.
    Rejected { status: u16, message: String },
    /// The call did not reach a verdict.
    Retryable {
        status: Option<u16>,
        message: String,
    },
}

/// How a failed outcome should be surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FailureClass {
    Transient,
    Terminal,
    SessionInvalid,
}

impl Outcome {
    /// Classify an HTTP response.
    pub fn from_status(status: u16, body: &str) -> Self {
        match status {
            200..=299 => Outcome::Applied,
            CONFLICT => Outcome::AlreadyApplied,
            400..=499 => Outcome::Rejected {
                status,
                message: extract_error_message(status, body),
            },
            _ => Outcome::Retryable {
                status: Some(status),
                message: extract_error_message(status, body),
            },
        }
    }

    /// Classify a call that never produced a response.
    pub fn transport(message: impl Into<String>) -> Self {
        Outcome::Retryable {
            status: None,
            message: message.into(),
        }
    }

    /// Whether the action can be removed from the queue.
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Applied | Outcome::AlreadyApplied)
    }

    /// The HTTP status, when there was one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Outcome::Applied | Outcome::AlreadyApplied => None,
            Outcome::Rejected { status, .. } => Some(*status),
            Outcome::Retryable { status, .. } => *status,
        }
    }

    /// Error text recorded on the action.
    pub fn message(&self) -> Option<&str> {
        match self {
            Outcome::Applied | Outcome::AlreadyApplied => None,
            Outcome::Rejected { message, .. } | Outcome::Retryable { message, .. } => {
                Some(message)
            }
        }
    }

    /// Failure class, or `None` for a success.
    pub fn failure_class(&self) -> Option<FailureClass> {
        match self {
            Outcome::Applied | Outcome::AlreadyApplied => None,
            Outcome::Rejected { message, .. } if is_session_invalid_message(message) => {
                Some(FailureClass::SessionInvalid)
            }
            Outcome::Rejected { .. } => Some(FailureClass::Terminal),
            Outcome::Retryable { .. } => Some(FailureClass::Transient),
        }
    }

    /// Producer policy after a failed live call.
    ///
    /// Network errors and 5xx are queued; definite 4xx answers are surfaced to
    /// the user instead. Applies to every call site alike.
    pub fn should_enqueue(&self) -> bool {
        matches!(self, Outcome::Retryable { .. })
    }
}

/// Whether an error message says the caller's employee record cannot be
/// resolved, which no amount of retrying will fix.
pub fn is_session_invalid_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("employee")
        && ["not linked", "unlinked", "not found", "invalid"]
            .iter()
            .any(|marker| lower.contains(marker))
}

/// Pull a human readable message out of an error body.
///
/// Understands `{"message": ...}` and `{"error": ...}` bodies, falls back to
/// the raw text, and finally to the bare status.
pub fn extract_error_message(status: u16, body: &str) -> String {
    let trimmed = body.trim();

    if let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        for key in ["message", "error", "detail"] {
            match value.get(key) {
                Some(serde_json::Value::String(s)) if !s.is_empty() => return truncate(s),
                Some(serde_json::Value::Array(items)) if !items.is_empty() => {
                    let joined: Vec<String> = items
                        .iter()
                        .map(|v| match v {
                            serde_json::Value::String(s) => s.clone(),
                            other => other.to_string(),
                        })
                        .collect();
                    return truncate(&joined.join("; "));
                }
                _ => {}
            }
        }
    }

    if trimmed.is_empty() {
        format!("HTTP {}", status)
    } else {
        truncate(trimmed)
    }
}

fn truncate(s: &str) -> String {
    if s.chars().count() <= MAX_MESSAGE_LEN {
        s.to_string()
    } else {
        s.chars().take(MAX_MESSAGE_LEN).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_statuses() {
        assert_eq!(Outcome::from_status(200, ""), Outcome::Applied);
        assert_eq!(Outcome::from_status(201, "{}"), Outcome::Applied);
        assert_eq!(Outcome::from_status(204, ""), Outcome::Applied);
        assert!(Outcome::from_status(204, "").is_success());
    }

    #[test]
    fn conflict_is_idempotent_success() {
        let outcome = Outcome::from_status(409, r#"{"message":"already checked in"}"#);
        assert_eq!(outcome, Outcome::AlreadyApplied);
        assert!(outcome.is_success());
        assert_eq!(outcome.failure_class(), None);
    }

    #[test]
    fn client_errors_are_terminal() {
        let outcome = Outcome::from_status(400, r#"{"message":"quantity must be positive"}"#);
        assert_eq!(
            outcome,
            Outcome::Rejected {
                status: 400,
                message: "quantity must be positive".into()
            }
        );
        assert_eq!(outcome.failure_class(), Some(FailureClass::Terminal));
        assert!(!outcome.should_enqueue());
    }

    #[test]
    fn server_and_transport_errors_are_retryable() {
        let outcome = Outcome::from_status(503, "upstream unavailable");
        assert_eq!(outcome.failure_class(), Some(FailureClass::Transient));
        assert!(outcome.should_enqueue());
        assert_eq!(outcome.status(), Some(503));

        let outcome = Outcome::transport("connection refused");
        assert!(outcome.should_enqueue());
        assert_eq!(outcome.status(), None);
        assert_eq!(outcome.message(), Some("connection refused"));
    }

    #[test]
    fn session_invalid_detection() {
        let outcome = Outcome::from_status(
            400,
            r#"{"message":"Employee not linked to this user"}"#,
        );
        assert_eq!(outcome.failure_class(), Some(FailureClass::SessionInvalid));

        assert!(is_session_invalid_message("employee record invalid"));
        assert!(!is_session_invalid_message("product not found"));
        assert!(!is_session_invalid_message("employee already checked in"));
    }

    #[test]
    fn message_extraction() {
        assert_eq!(extract_error_message(400, r#"{"error":"bad date"}"#), "bad date");
        assert_eq!(
            extract_error_message(422, r#"{"message":["a is required","b too long"]}"#),
            "a is required; b too long"
        );
        assert_eq!(extract_error_message(500, "  Internal  "), "Internal");
        assert_eq!(extract_error_message(502, ""), "HTTP 502");
        assert_eq!(extract_error_message(400, &"x".repeat(2000)).len(), 500);
    }
}

//! Bearer credential shared by every outgoing request.

use std::sync::{Arc, RwLock};

/// Holds the current bearer token.
#[derive(Debug, Default)]
pub struct Session {
    token: RwLock<Option<String>>,
}

impl Session {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: RwLock::new(token),
        }
    }

    pub fn new_shared(token: Option<String>) -> Arc<Self> {
        Arc::new(Self::new(token))
    }

    /// The token to send, if signed in.
    pub fn token(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.token().is_some()
    }

    /// Install a token after re-authentication.
    pub fn set_token(&self, token: impl Into<String>) {
        *self
            .token
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(token.into());
        tracing::info!("Session token installed");
    }

    /// Drop the token; the user has to sign in again.
    pub fn invalidate(&self) {
        let had_token = self
            .token
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
            .is_some();
        if had_token {
            tracing::warn!("Session invalidated");
        }
    }
}

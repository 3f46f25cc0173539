//! Session gate between the board and the authentication flow.
//!
//! The board never fetches or writes while no session is confirmed. When
//! the remote service reports an unauthorized condition the session is
//! invalidated and the caller is told to hand control to login.

use std::sync::atomic::{AtomicBool, Ordering};

pub trait SessionGate: Send + Sync {
    /// Whether a session is currently confirmed.
    fn is_active(&self) -> bool;

    /// Drop the current session after an unauthorized response.
    fn invalidate(&self);
}

/// Session backed by a configured CRM API key.
///
/// Active when a key is present, until invalidated. A fixed key means a new
/// process, so nothing re-activates it.
#[derive(Debug)]
pub struct ApiKeySession {
    active: AtomicBool,
}

impl ApiKeySession {
    pub fn new(api_key: Option<&str>) -> Self {
        let has_key = api_key.is_some_and(|k| !k.trim().is_empty());
        Self {
            active: AtomicBool::new(has_key),
        }
    }
}

impl SessionGate for ApiKeySession {
    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn invalidate(&self) {
        self.active.store(false, Ordering::SeqCst);
    }
}

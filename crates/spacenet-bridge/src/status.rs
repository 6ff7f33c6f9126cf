use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;

/// Configuration/authentication lifecycle value pushed to the host.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Error = 0,
    NeedsInit = 1,
    NeedsLogin = 2,
    LoggedIn = 3,
    LoggedOut = 4,
    Locked = 5,
}

impl SessionStatus {
    #[must_use]
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::NeedsInit => "needs_init",
            Self::NeedsLogin => "needs_login",
            Self::LoggedIn => "logged_in",
            Self::LoggedOut => "logged_out",
            Self::Locked => "locked",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receives status changes. Implemented for plain closures; the host boundary
/// implements it for `(callback, context)` pairs.
pub trait StatusListener: Send + Sync {
    fn on_status(&self, status: SessionStatus);
}

impl<F> StatusListener for F
where
    F: Fn(SessionStatus) + Send + Sync,
{
    fn on_status(&self, status: SessionStatus) {
        self(status);
    }
}

/// Append-only fan-out of status changes.
///
/// Listeners are never deduplicated: subscribing the same listener twice
/// notifies it twice. `publish` calls every listener synchronously on the
/// publishing task, in subscription order. A listener that blocks stalls the
/// publish and everything behind it, so listeners must only hand the value
/// off (post to a UI queue, send on a channel) and return.
#[derive(Default)]
pub struct StatusBroadcaster {
    listeners: Mutex<Vec<Arc<dyn StatusListener>>>,
}

impl fmt::Debug for StatusBroadcaster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatusBroadcaster")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

impl StatusBroadcaster {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, listener: Arc<dyn StatusListener>) {
        let mut listeners = self.lock();
        listeners.push(listener);
        tracing::debug!(listeners = listeners.len(), "Status listener subscribed");
    }

    /// Notifies the listeners subscribed at the time of the call. A listener
    /// subscribed from inside a notification first hears the next publish.
    pub fn publish(&self, status: SessionStatus) {
        let listeners = self.lock().clone();
        tracing::debug!(
            status = status.as_str(),
            listeners = listeners.len(),
            "Posting session status change"
        );
        for listener in listeners {
            listener.on_status(status);
        }
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Arc<dyn StatusListener>>> {
        self.listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

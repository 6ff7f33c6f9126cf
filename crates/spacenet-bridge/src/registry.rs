//! Presentation contexts registered by the native host.
//!
//! Each context carries a "show" capability and, once the host sets it, a
//! "dismiss" capability. Registration timing belongs to the host, so every
//! lookup that misses degrades to a no-op instead of an error.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::dialog::{DialogHandle, DialogRequest};
use crate::token::CorrelationToken;

/// Puts a dialog on screen and returns the host handle for it, or `None` when
/// the host could not display it.
pub trait ShowDialog: Send + Sync {
    fn show(&self, request: &DialogRequest) -> Option<DialogHandle>;
}

impl<F> ShowDialog for F
where
    F: Fn(&DialogRequest) -> Option<DialogHandle> + Send + Sync,
{
    fn show(&self, request: &DialogRequest) -> Option<DialogHandle> {
        self(request)
    }
}

/// Takes a dialog off screen. The token of the dialog's request travels with
/// the handle so the host never has to recover it from the handle itself.
pub trait DismissDialog: Send + Sync {
    fn dismiss(&self, handle: DialogHandle, token: CorrelationToken);
}

impl<F> DismissDialog for F
where
    F: Fn(DialogHandle, CorrelationToken) + Send + Sync,
{
    fn dismiss(&self, handle: DialogHandle, token: CorrelationToken) {
        self(handle, token);
    }
}

/// Identifies one native surface able to host dialogs.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PresentationContextId(String);

impl PresentationContextId {
    /// Empty identifiers stand for "no context" and are rejected.
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Option<Self> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(Self(trimmed.to_string()))
    }

    /// Identifier for a host object pointer. Null pointers are rejected.
    #[must_use]
    pub fn from_host_ptr(ptr: usize) -> Option<Self> {
        if ptr == 0 {
            return None;
        }
        Some(Self(format!("host:{ptr:#x}")))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PresentationContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone)]
struct PresentationEntry {
    show: Arc<dyn ShowDialog>,
    dismiss: Option<Arc<dyn DismissDialog>>,
}

type PresentationTable = HashMap<PresentationContextId, PresentationEntry>;

/// Process-wide table of presentation contexts.
///
/// Capabilities are cloned out of the lock before they are invoked, so a host
/// callback may re-enter the registry (for example to register a dismiss
/// capability from inside "show") without deadlocking.
#[derive(Default)]
pub struct PresentationRegistry {
    entries: Mutex<PresentationTable>,
}

impl fmt::Debug for PresentationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut contexts = self.lock().keys().cloned().collect::<Vec<_>>();
        contexts.sort();
        f.debug_struct("PresentationRegistry")
            .field("contexts", &contexts)
            .finish()
    }
}

impl PresentationRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the entry for `context`. Replacing drops any dismiss
    /// capability set for the previous registration. A missing capability is
    /// ignored.
    pub fn register(
        &self,
        context: &PresentationContextId,
        show: Option<Arc<dyn ShowDialog>>,
    ) -> bool {
        let Some(show) = show else {
            tracing::warn!(%context, "Ignoring presentation registration without show capability");
            return false;
        };
        let replaced = self
            .lock()
            .insert(
                context.clone(),
                PresentationEntry {
                    show,
                    dismiss: None,
                },
            )
            .is_some();
        tracing::debug!(%context, replaced, "Presentation context registered");
        true
    }

    /// Attaches a dismiss capability to an existing entry.
    pub fn set_dismiss_capability(
        &self,
        context: &PresentationContextId,
        dismiss: Option<Arc<dyn DismissDialog>>,
    ) -> bool {
        let Some(dismiss) = dismiss else {
            return false;
        };
        let mut entries = self.lock();
        match entries.get_mut(context) {
            Some(entry) => {
                entry.dismiss = Some(dismiss);
                tracing::debug!(%context, "Dismiss capability attached");
                true
            }
            None => {
                tracing::debug!(%context, "Dismiss capability for unknown presentation context");
                false
            }
        }
    }

    /// Removes the entry. Sessions still referencing it keep waiting for their
    /// reply; only their dismissal becomes a no-op.
    pub fn unregister(&self, context: &PresentationContextId) -> bool {
        let removed = self.lock().remove(context).is_some();
        if removed {
            tracing::debug!(%context, "Presentation context unregistered");
        }
        removed
    }

    #[must_use]
    pub fn is_registered(&self, context: &PresentationContextId) -> bool {
        self.lock().contains_key(context)
    }

    /// Invokes the show capability registered for `request.context`. `None`
    /// means the dialog could not be displayed.
    pub fn show(&self, request: &DialogRequest) -> Option<DialogHandle> {
        let show = self
            .lock()
            .get(&request.context)
            .map(|entry| Arc::clone(&entry.show));
        let Some(show) = show else {
            tracing::warn!(
                context = %request.context,
                token = %request.token,
                "No show capability registered for presentation context"
            );
            return None;
        };
        let handle = show.show(request);
        tracing::debug!(
            context = %request.context,
            token = %request.token,
            kind = request.kind.as_str(),
            accessory = request.accessory.as_str(),
            shown = handle.is_some(),
            "Dialog show requested"
        );
        handle
    }

    /// Invokes the dismiss capability when both the entry and its dismiss
    /// capability exist.
    pub fn dismiss(
        &self,
        context: &PresentationContextId,
        handle: DialogHandle,
        token: CorrelationToken,
    ) -> bool {
        let dismiss = self
            .lock()
            .get(context)
            .and_then(|entry| entry.dismiss.clone());
        match dismiss {
            Some(dismiss) => {
                dismiss.dismiss(handle, token);
                tracing::debug!(%context, %handle, %token, "Dialog dismissed");
                true
            }
            None => {
                tracing::debug!(%context, %handle, %token, "Dialog not dismissable");
                false
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, PresentationTable> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::dialog::{AccessoryKind, DialogHandle, DialogKind};
use crate::registry::{PresentationContextId, PresentationRegistry};
use crate::token::CorrelationToken;

/// One dialog that is on screen (or was asked to be) and whose reply is
/// still owed to the task that opened it.
#[derive(Debug)]
pub struct DialogSession {
    context: PresentationContextId,
    token: CorrelationToken,
    kind: DialogKind,
    accessory: AccessoryKind,
    handle: Mutex<Option<DialogHandle>>,
    withdrawn: AtomicBool,
    registry: Arc<PresentationRegistry>,
}

impl DialogSession {
    pub(crate) fn new(
        context: PresentationContextId,
        token: CorrelationToken,
        kind: DialogKind,
        accessory: AccessoryKind,
        registry: Arc<PresentationRegistry>,
    ) -> Self {
        Self {
            context,
            token,
            kind,
            accessory,
            handle: Mutex::new(None),
            withdrawn: AtomicBool::new(false),
            registry,
        }
    }

    #[must_use]
    pub fn context(&self) -> &PresentationContextId {
        &self.context
    }

    #[must_use]
    pub fn token(&self) -> CorrelationToken {
        self.token
    }

    #[must_use]
    pub fn kind(&self) -> DialogKind {
        self.kind
    }

    #[must_use]
    pub fn accessory(&self) -> AccessoryKind {
        self.accessory
    }

    #[must_use]
    pub fn handle(&self) -> Option<DialogHandle> {
        *self.lock_handle()
    }

    pub(crate) fn set_handle(&self, handle: Option<DialogHandle>) {
        *self.lock_handle() = handle;
    }

    /// Forgets the host handle once the dialog has resolved.
    pub fn clear_handle(&self) -> Option<DialogHandle> {
        self.lock_handle().take()
    }

    /// Asks the host to take the dialog off screen. No-op when the handle is
    /// unknown, already cleared, or the context is gone or has no dismiss
    /// capability.
    pub fn dismiss(&self) -> bool {
        let Some(handle) = self.clear_handle() else {
            return false;
        };
        self.registry.dismiss(&self.context, handle, self.token)
    }

    /// Dismissal initiated by our side rather than by the user. The waiter
    /// sees the session as withdrawn and does not treat its cancelled reply as
    /// a user cancellation.
    pub(crate) fn withdraw(&self) -> bool {
        self.withdrawn.store(true, Ordering::SeqCst);
        self.dismiss()
    }

    #[must_use]
    pub fn is_withdrawn(&self) -> bool {
        self.withdrawn.load(Ordering::SeqCst)
    }

    fn lock_handle(&self) -> MutexGuard<'_, Option<DialogHandle>> {
        self.handle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::DialogSession;
    use crate::dialog::{AccessoryKind, DialogHandle, DialogKind, DialogRequest};
    use crate::registry::{PresentationContextId, PresentationRegistry};
    use crate::token::CorrelationToken;

    fn session_with_counter() -> (DialogSession, Arc<PresentationRegistry>, Arc<AtomicUsize>) {
        let registry = Arc::new(PresentationRegistry::new());
        let context = PresentationContextId::new("ctx1").expect("context");
        let dismissed = Arc::new(AtomicUsize::new(0));
        let dismissed_clone = Arc::clone(&dismissed);
        registry.register(
            &context,
            Some(Arc::new(|_: &DialogRequest| DialogHandle::from_raw(1))),
        );
        registry.set_dismiss_capability(
            &context,
            Some(Arc::new(move |_: DialogHandle, _: CorrelationToken| {
                dismissed_clone.fetch_add(1, Ordering::SeqCst);
            })),
        );
        let session = DialogSession::new(
            context,
            CorrelationToken::from_raw(1).expect("token"),
            DialogKind::Alert,
            AccessoryKind::OkCancel,
            Arc::clone(&registry),
        );
        (session, registry, dismissed)
    }

    #[test]
    fn dismiss_uses_handle_once() {
        let (session, _registry, dismissed) = session_with_counter();
        session.set_handle(DialogHandle::from_raw(1));

        assert!(session.dismiss());
        assert!(!session.dismiss());
        assert_eq!(session.handle(), None);
        assert_eq!(dismissed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn withdraw_marks_session_and_dismisses() {
        let (session, _registry, dismissed) = session_with_counter();
        session.set_handle(DialogHandle::from_raw(1));
        assert!(!session.is_withdrawn());

        assert!(session.withdraw());
        assert!(session.is_withdrawn());
        assert_eq!(dismissed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dismiss_without_handle_is_noop() {
        let (session, _registry, dismissed) = session_with_counter();
        assert!(!session.dismiss());
        assert_eq!(dismissed.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn dismiss_after_unregister_degrades_to_noop() {
        let (session, registry, dismissed) = session_with_counter();
        session.set_handle(DialogHandle::from_raw(1));
        registry.unregister(session.context());

        assert!(!session.dismiss());
        assert_eq!(dismissed.load(Ordering::SeqCst), 0);
    }
}

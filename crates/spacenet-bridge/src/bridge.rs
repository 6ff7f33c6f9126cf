use std::sync::Arc;

use tokio::runtime::Handle;

use crate::dialog::{AccessoryKind, DialogKind, DialogRequest, DispatchHint};
use crate::pending::PendingReplies;
use crate::registry::{PresentationContextId, PresentationRegistry};
use crate::reply::{DialogOutcome, ReplyReceiver};
use crate::session::DialogSession;
use crate::status::{SessionStatus, StatusBroadcaster, StatusListener};
use crate::token::CorrelationToken;

/// Content of a dialog before it is bound to a context and token.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DialogSpec {
    pub kind: DialogKind,
    pub title: String,
    pub message: String,
    pub accessory: AccessoryKind,
    pub accessory_text: String,
}

impl DialogSpec {
    #[must_use]
    pub fn new(kind: DialogKind, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            title: title.into(),
            message: message.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_accessory(mut self, accessory: AccessoryKind, text: impl Into<String>) -> Self {
        self.accessory = accessory;
        self.accessory_text = text.into();
        self
    }
}

/// Service object tying the presentation registry, the correlation table and
/// the status broadcaster together.
///
/// The host boundary has no per-request context, so one bridge lives for the
/// whole process; it is still constructed explicitly and handed to
/// collaborators so tests can run several side by side.
#[derive(Debug)]
pub struct DialogBridge {
    registry: Arc<PresentationRegistry>,
    pending: PendingReplies,
    broadcaster: StatusBroadcaster,
    runtime: Handle,
}

impl DialogBridge {
    /// `runtime` runs the waiter tasks spawned by UI adapters.
    #[must_use]
    pub fn new(runtime: Handle) -> Arc<Self> {
        Arc::new(Self {
            registry: Arc::new(PresentationRegistry::new()),
            pending: PendingReplies::new(),
            broadcaster: StatusBroadcaster::new(),
            runtime,
        })
    }

    /// Builds a bridge on the runtime the caller is currently inside.
    pub fn current() -> crate::Result<Arc<Self>> {
        let runtime =
            Handle::try_current().map_err(|err| crate::BridgeError::Runtime(err.to_string()))?;
        Ok(Self::new(runtime))
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<PresentationRegistry> {
        &self.registry
    }

    #[must_use]
    pub fn pending(&self) -> &PendingReplies {
        &self.pending
    }

    #[must_use]
    pub fn broadcaster(&self) -> &StatusBroadcaster {
        &self.broadcaster
    }

    #[must_use]
    pub fn runtime(&self) -> &Handle {
        &self.runtime
    }

    pub fn subscribe_status(&self, listener: Arc<dyn StatusListener>) {
        self.broadcaster.subscribe(listener);
    }

    pub fn publish_status(&self, status: SessionStatus) {
        self.broadcaster.publish(status);
    }

    /// Inbound reply from the host.
    pub fn deliver(&self, token: CorrelationToken, outcome: DialogOutcome) -> bool {
        self.pending.deliver(token, outcome)
    }

    /// Registers a waiter, then asks the host to show the dialog.
    ///
    /// Returns `None` when nothing could be shown; the waiter is abandoned
    /// right away so the table does not keep an entry nobody will answer.
    pub fn open_dialog(
        &self,
        context: &PresentationContextId,
        spec: DialogSpec,
        dispatch: DispatchHint,
    ) -> Option<(Arc<DialogSession>, ReplyReceiver)> {
        let (token, receiver) = self.pending.begin_wait();
        let session = Arc::new(DialogSession::new(
            context.clone(),
            token,
            spec.kind,
            spec.accessory,
            Arc::clone(&self.registry),
        ));
        let request = DialogRequest {
            context: context.clone(),
            token,
            kind: spec.kind,
            title: spec.title,
            message: spec.message,
            accessory: spec.accessory,
            accessory_text: spec.accessory_text,
            dispatch,
        };

        match self.registry.show(&request) {
            Some(handle) => {
                // A fast host may already have answered; the handle is then
                // stale and dismissing it is harmless.
                if self.pending.is_pending(token) {
                    session.set_handle(Some(handle));
                }
                Some((session, receiver))
            }
            None if self.pending.is_pending(token) => {
                self.pending.abandon(token);
                tracing::warn!(%context, %token, "Dialog could not be displayed");
                None
            }
            // Answered synchronously from inside "show" without a handle.
            None => Some((session, receiver)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{DialogBridge, DialogSpec};
    use crate::dialog::{AccessoryKind, DialogHandle, DialogKind, DialogRequest, DispatchHint};
    use crate::registry::PresentationContextId;
    use crate::reply::DialogOutcome;

    fn ctx() -> PresentationContextId {
        PresentationContextId::new("ctx1").expect("context")
    }

    #[tokio::test]
    async fn open_without_presenter_leaves_no_pending_entry() {
        let bridge = DialogBridge::current().expect("runtime");
        let opened = bridge.open_dialog(
            &ctx(),
            DialogSpec::new(DialogKind::Notify, "t", "m"),
            DispatchHint::Foreground,
        );
        assert!(opened.is_none());
        assert!(bridge.pending().is_empty());
    }

    #[tokio::test]
    async fn synchronous_answer_from_show_is_not_lost() {
        let bridge = DialogBridge::current().expect("runtime");
        let weak = Arc::downgrade(&bridge);
        bridge.registry().register(
            &ctx(),
            Some(Arc::new(move |request: &DialogRequest| {
                if let Some(bridge) = weak.upgrade() {
                    bridge.deliver(request.token, DialogOutcome::Answered("now".to_string()));
                }
                DialogHandle::from_raw(1)
            })),
        );

        let (session, mut receiver) = bridge
            .open_dialog(
                &ctx(),
                DialogSpec::new(DialogKind::App, "t", "m")
                    .with_accessory(AccessoryKind::TextInput, ""),
                DispatchHint::Foreground,
            )
            .expect("dialog opened");

        assert_eq!(session.handle(), None);
        assert_eq!(
            receiver.recv().await,
            Some(DialogOutcome::Answered("now".to_string()))
        );
        assert!(bridge.pending().is_empty());
    }
}

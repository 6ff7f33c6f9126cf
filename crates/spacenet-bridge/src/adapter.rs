//! Dialog capabilities handed to configuration and authentication logic.
//!
//! Every call opens a [`DialogSession`] on one presentation context. The
//! `show_*` methods return immediately and hand the resolved value to a
//! continuation from a waiter task; the `prompt_*` methods await it in place.
//! At most one dialog per adapter is on screen: opening a new one withdraws
//! the previous one, whose continuation then receives `None`.

use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::bridge::{DialogBridge, DialogSpec};
use crate::config::{BridgeConfig, DEFAULT_ALERT_TIMEOUT_MS};
use crate::dialog::{AccessoryKind, DialogKind, DispatchHint};
use crate::registry::PresentationContextId;
use crate::reply::{DialogOutcome, ReplyReceiver};
use crate::session::DialogSession;

/// Cancels the operation a dialog belongs to (for example an in-flight
/// browser login) when the user closes the dialog or it times out. Dialogs
/// withdrawn by the adapter itself never cancel.
#[derive(Clone)]
pub struct CancelHandle(Arc<dyn Fn() + Send + Sync>);

impl CancelHandle {
    pub fn new(cancel: impl Fn() + Send + Sync + 'static) -> Self {
        Self(Arc::new(cancel))
    }

    pub fn cancel(&self) {
        (self.0)();
    }
}

impl fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CancelHandle")
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageLevel {
    Plain,
    Info,
    Note,
    Notice,
    Error,
}

impl MessageLevel {
    #[must_use]
    pub fn dialog_kind(self) -> DialogKind {
        match self {
            Self::Plain => DialogKind::App,
            Self::Info | Self::Note => DialogKind::Notify,
            Self::Notice => DialogKind::Alert,
            Self::Error => DialogKind::Error,
        }
    }

    /// Notices go away on their own after the alert timeout.
    #[must_use]
    pub fn auto_dismisses(self) -> bool {
        matches!(self, Self::Notice)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProgressStyle {
    Spinner,
    Bar,
}

impl ProgressStyle {
    fn accessory(self) -> AccessoryKind {
        match self {
            Self::Spinner => AccessoryKind::Spinner,
            Self::Bar => AccessoryKind::ProgressBar,
        }
    }
}

#[derive(Clone, Debug)]
struct ProgressState {
    style: ProgressStyle,
    title: String,
}

/// When a resolved dialog should cancel the surrounding operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CancelPolicy {
    /// Messages and progress indicators: closing them at all means "stop".
    AnyReply,
    /// Input dialogs: only an explicit cancel means "stop".
    CancelledReply,
}

impl CancelPolicy {
    fn cancels(self, outcome: &DialogOutcome) -> bool {
        match self {
            Self::AnyReply => true,
            Self::CancelledReply => outcome.is_cancelled(),
        }
    }
}

type CurrentSession = Arc<Mutex<Option<Arc<DialogSession>>>>;

/// State a waiter task needs after the adapter call has returned.
#[derive(Clone)]
struct Waiter {
    bridge: Arc<DialogBridge>,
    current: CurrentSession,
    cancel: Option<CancelHandle>,
}

impl Waiter {
    async fn wait(
        self,
        session: Arc<DialogSession>,
        mut receiver: ReplyReceiver,
        policy: CancelPolicy,
        timeout: Option<Duration>,
    ) -> DialogOutcome {
        let received = match timeout {
            Some(limit) => match tokio::time::timeout(limit, receiver.recv()).await {
                Ok(received) => received,
                Err(_) => {
                    tracing::debug!(token = %session.token(), ?limit, "Dialog timed out");
                    session.dismiss();
                    self.bridge.pending().abandon(session.token());
                    self.release(&session);
                    if !session.is_withdrawn() {
                        self.propagate_cancel(&session);
                    }
                    return DialogOutcome::Cancelled;
                }
            },
            None => receiver.recv().await,
        };
        let outcome = received.unwrap_or(DialogOutcome::Cancelled);

        session.clear_handle();
        self.release(&session);
        if !session.is_withdrawn() && policy.cancels(&outcome) {
            self.propagate_cancel(&session);
        }
        outcome
    }

    fn release(&self, session: &DialogSession) {
        let mut current = lock_current(&self.current);
        if current
            .as_ref()
            .is_some_and(|open| open.token() == session.token())
        {
            *current = None;
        }
    }

    fn propagate_cancel(&self, session: &DialogSession) {
        if let Some(cancel) = &self.cancel {
            tracing::debug!(token = %session.token(), "Propagating dialog cancellation");
            cancel.cancel();
        }
    }
}

/// Withdraws a prompt whose future is dropped before the reply arrives, so
/// its token does not stay pending.
struct AbandonOnDrop<'a> {
    waiter: &'a Waiter,
    session: Option<Arc<DialogSession>>,
}

impl<'a> AbandonOnDrop<'a> {
    fn new(waiter: &'a Waiter, session: Arc<DialogSession>) -> Self {
        Self {
            waiter,
            session: Some(session),
        }
    }

    fn disarm(mut self) {
        self.session = None;
    }
}

impl Drop for AbandonOnDrop<'_> {
    fn drop(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        tracing::debug!(token = %session.token(), "Prompt dropped before its reply");
        session.withdraw();
        self.waiter.bridge.pending().abandon(session.token());
        self.waiter.release(&session);
    }
}

/// Dialog capability set bound to one presentation context.
pub struct UiSessionAdapter {
    bridge: Arc<DialogBridge>,
    context: PresentationContextId,
    dispatch: DispatchHint,
    alert_timeout: Duration,
    cancel: Option<CancelHandle>,
    current: CurrentSession,
    progress: Mutex<Option<ProgressState>>,
}

impl fmt::Debug for UiSessionAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UiSessionAdapter")
            .field("context", &self.context)
            .field("dispatch", &self.dispatch)
            .field("alert_timeout", &self.alert_timeout)
            .field("cancellable", &self.cancel.is_some())
            .finish()
    }
}

impl UiSessionAdapter {
    #[must_use]
    pub fn new(bridge: Arc<DialogBridge>, context: PresentationContextId) -> Self {
        Self {
            bridge,
            context,
            dispatch: DispatchHint::Foreground,
            alert_timeout: Duration::from_millis(DEFAULT_ALERT_TIMEOUT_MS),
            cancel: None,
            current: Arc::default(),
            progress: Mutex::new(None),
        }
    }

    /// Adapter for flows presented off the main UI (settings screens).
    #[must_use]
    pub fn background(bridge: Arc<DialogBridge>, context: PresentationContextId) -> Self {
        Self {
            dispatch: DispatchHint::Background,
            ..Self::new(bridge, context)
        }
    }

    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelHandle) -> Self {
        self.cancel = Some(cancel);
        self
    }

    #[must_use]
    pub fn with_alert_timeout(mut self, alert_timeout: Duration) -> Self {
        self.alert_timeout = alert_timeout;
        self
    }

    #[must_use]
    pub fn with_config(self, config: &BridgeConfig) -> Self {
        self.with_alert_timeout(config.alert_timeout)
    }

    #[must_use]
    pub fn context(&self) -> &PresentationContextId {
        &self.context
    }

    /// Whether requests go to the host as foreground or background dialogs.
    #[must_use]
    pub fn dispatch(&self) -> DispatchHint {
        self.dispatch
    }

    #[must_use]
    pub fn bridge(&self) -> &Arc<DialogBridge> {
        &self.bridge
    }

    /// The dialog currently on screen for this adapter, if any.
    #[must_use]
    pub fn current_session(&self) -> Option<Arc<DialogSession>> {
        lock_current(&self.current).clone()
    }

    pub fn show_message(&self, title: &str, message: &str) -> bool {
        self.show_level(MessageLevel::Plain, title, message, "")
    }

    pub fn show_info_message(&self, title: &str, message: &str) -> bool {
        self.show_level(MessageLevel::Info, title, message, "")
    }

    pub fn show_note_message(&self, title: &str, message: &str, note: &str) -> bool {
        self.show_level(MessageLevel::Note, title, message, note)
    }

    pub fn show_notice_message(&self, title: &str, message: &str) -> bool {
        self.show_level(MessageLevel::Notice, title, message, "")
    }

    pub fn show_error_message(&self, title: &str, message: &str) -> bool {
        self.show_level(MessageLevel::Error, title, message, "")
    }

    /// Shows a message without input. `detail` is rendered below the message
    /// by the host when not empty.
    pub fn show_level(
        &self,
        level: MessageLevel,
        title: &str,
        message: &str,
        detail: &str,
    ) -> bool {
        let spec = DialogSpec::new(level.dialog_kind(), title, message)
            .with_accessory(AccessoryKind::None, detail);
        let timeout = level.auto_dismisses().then_some(self.alert_timeout);
        self.spawn_dialog(spec, CancelPolicy::AnyReply, timeout, |_| {})
    }

    pub fn show_message_with_input(
        &self,
        title: &str,
        message: &str,
        default_value: &str,
        on_input: impl FnOnce(Option<String>) + Send + 'static,
    ) -> bool {
        let spec = input_spec(title, message, AccessoryKind::TextInput, default_value);
        self.spawn_dialog(spec, CancelPolicy::CancelledReply, None, move |outcome| {
            on_input(outcome.into_value());
        })
    }

    pub fn show_message_with_secure_input(
        &self,
        title: &str,
        message: &str,
        on_input: impl FnOnce(Option<String>) + Send + 'static,
    ) -> bool {
        let spec = input_spec(title, message, AccessoryKind::SecureInput, "");
        self.spawn_dialog(spec, CancelPolicy::CancelledReply, None, move |outcome| {
            on_input(outcome.into_value());
        })
    }

    /// Secure input the host asks for twice; only matching entries come back.
    pub fn show_message_with_secure_verified_input(
        &self,
        title: &str,
        message: &str,
        on_input: impl FnOnce(Option<String>) + Send + 'static,
    ) -> bool {
        let spec = input_spec(title, message, AccessoryKind::SecureInputWithVerify, "");
        self.spawn_dialog(spec, CancelPolicy::CancelledReply, None, move |outcome| {
            on_input(outcome.into_value());
        })
    }

    pub fn show_message_with_yes_no_input(
        &self,
        title: &str,
        message: &str,
        on_answer: impl FnOnce(Option<bool>) + Send + 'static,
    ) -> bool {
        let spec = input_spec(title, message, AccessoryKind::YesNo, "");
        self.spawn_dialog(spec, CancelPolicy::CancelledReply, None, move |outcome| {
            on_answer(outcome.into_value().map(|answer| parse_confirmation(&answer)));
        })
    }

    pub fn show_message_with_file_input(
        &self,
        title: &str,
        message: &str,
        default_path: &str,
        on_path: impl FnOnce(Option<PathBuf>) + Send + 'static,
    ) -> bool {
        let spec = input_spec(title, message, AccessoryKind::FileInput, default_path);
        self.spawn_dialog(spec, CancelPolicy::CancelledReply, None, move |outcome| {
            on_path(outcome.into_value().and_then(parse_path));
        })
    }

    pub async fn prompt_input(
        &self,
        title: &str,
        message: &str,
        default_value: &str,
    ) -> Option<String> {
        let spec = input_spec(title, message, AccessoryKind::TextInput, default_value);
        self.ask(spec).await.into_value()
    }

    pub async fn prompt_secure_input(&self, title: &str, message: &str) -> Option<String> {
        let spec = input_spec(title, message, AccessoryKind::SecureInput, "");
        self.ask(spec).await.into_value()
    }

    pub async fn prompt_secure_verified_input(
        &self,
        title: &str,
        message: &str,
    ) -> Option<String> {
        let spec = input_spec(title, message, AccessoryKind::SecureInputWithVerify, "");
        self.ask(spec).await.into_value()
    }

    pub async fn prompt_yes_no(&self, title: &str, message: &str) -> Option<bool> {
        let spec = input_spec(title, message, AccessoryKind::YesNo, "");
        self.ask(spec)
            .await
            .into_value()
            .map(|answer| parse_confirmation(&answer))
    }

    pub async fn prompt_file(
        &self,
        title: &str,
        message: &str,
        default_path: &str,
    ) -> Option<PathBuf> {
        let spec = input_spec(title, message, AccessoryKind::FileInput, default_path);
        self.ask(spec).await.into_value().and_then(parse_path)
    }

    /// Puts up a progress indicator. Closing it from the host cancels the
    /// surrounding operation.
    pub fn start_progress(&self, style: ProgressStyle, title: &str, message: &str) -> bool {
        *self.lock_progress() = Some(ProgressState {
            style,
            title: title.to_string(),
        });
        self.show_progress(style, title, message, None)
    }

    /// Replaces the indicator with updated text; `percent` only applies to
    /// progress bars and is clamped to 100.
    pub fn update_progress(&self, message: &str, percent: Option<u8>) -> bool {
        let Some(state) = self.lock_progress().clone() else {
            tracing::debug!(context = %self.context, "Progress update without active indicator");
            return false;
        };
        self.show_progress(state.style, &state.title, message, percent)
    }

    pub fn done_progress(&self) -> bool {
        if self.lock_progress().take().is_none() {
            return false;
        }
        self.dismiss_message()
    }

    /// Takes the current dialog off screen. Its continuation receives `None`
    /// and no cancellation is propagated.
    pub fn dismiss_message(&self) -> bool {
        let Some(session) = lock_current(&self.current).take() else {
            return false;
        };
        self.withdraw(&session);
        true
    }

    fn show_progress(
        &self,
        style: ProgressStyle,
        title: &str,
        message: &str,
        percent: Option<u8>,
    ) -> bool {
        let accessory_text = match (style, percent) {
            (ProgressStyle::Bar, Some(percent)) => percent.min(100).to_string(),
            _ => String::new(),
        };
        let spec = DialogSpec::new(DialogKind::App, title, message)
            .with_accessory(style.accessory(), accessory_text);
        self.spawn_dialog(spec, CancelPolicy::AnyReply, None, |_| {})
    }

    fn withdraw(&self, session: &DialogSession) {
        session.withdraw();
        self.bridge.pending().abandon(session.token());
    }

    fn waiter(&self) -> Waiter {
        Waiter {
            bridge: Arc::clone(&self.bridge),
            current: Arc::clone(&self.current),
            cancel: self.cancel.clone(),
        }
    }

    /// Opens the dialog and makes it the adapter's current one.
    fn open(&self, spec: DialogSpec) -> Option<(Arc<DialogSession>, ReplyReceiver)> {
        let previous = lock_current(&self.current).take();
        if let Some(previous) = previous {
            self.withdraw(&previous);
        }
        let (session, receiver) = self.bridge.open_dialog(&self.context, spec, self.dispatch)?;
        // Already answered while "show" ran when the token is gone.
        if self.bridge.pending().is_pending(session.token()) {
            *lock_current(&self.current) = Some(Arc::clone(&session));
        }
        Some((session, receiver))
    }

    fn spawn_dialog(
        &self,
        spec: DialogSpec,
        policy: CancelPolicy,
        timeout: Option<Duration>,
        on_outcome: impl FnOnce(DialogOutcome) + Send + 'static,
    ) -> bool {
        let collects_input = policy == CancelPolicy::CancelledReply;
        let Some((session, receiver)) = self.open(spec) else {
            if let Some(cancel) = self.cancel.as_ref().filter(|_| collects_input) {
                cancel.cancel();
            }
            on_outcome(DialogOutcome::Cancelled);
            return false;
        };
        let waiter = self.waiter();
        self.bridge.runtime().spawn(async move {
            let outcome = waiter.wait(session, receiver, policy, timeout).await;
            on_outcome(outcome);
        });
        true
    }

    async fn ask(&self, spec: DialogSpec) -> DialogOutcome {
        let Some((session, receiver)) = self.open(spec) else {
            if let Some(cancel) = &self.cancel {
                cancel.cancel();
            }
            return DialogOutcome::Cancelled;
        };
        let waiter = self.waiter();
        let abandoned = AbandonOnDrop::new(&waiter, Arc::clone(&session));
        let outcome = waiter
            .clone()
            .wait(session, receiver, CancelPolicy::CancelledReply, None)
            .await;
        abandoned.disarm();
        outcome
    }

    fn lock_progress(&self) -> MutexGuard<'_, Option<ProgressState>> {
        self.progress
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn lock_current(current: &CurrentSession) -> MutexGuard<'_, Option<Arc<DialogSession>>> {
    current
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn input_spec(title: &str, message: &str, accessory: AccessoryKind, text: &str) -> DialogSpec {
    DialogSpec::new(DialogKind::Notify, title, message).with_accessory(accessory, text)
}

/// Hosts answer a confirmed yes/no dialog with an empty string; typed
/// answers are also accepted.
#[must_use]
pub fn parse_confirmation(answer: &str) -> bool {
    !matches!(
        answer.trim().to_ascii_lowercase().as_str(),
        "no" | "n" | "false" | "0"
    )
}

fn parse_path(raw: String) -> Option<PathBuf> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(PathBuf::from(trimmed))
}

#![allow(clippy::expect_used)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use spacenet_bridge::{
    AccessoryKind, CancelHandle, CorrelationToken, DialogBridge, DialogHandle, DialogKind,
    DialogOutcome, DialogRequest, DispatchHint, PresentationContextId, ProgressStyle,
    UiSessionAdapter,
};
use tokio::sync::oneshot;

const WAIT: Duration = Duration::from_secs(2);

/// Host stand-in: records every request and every dismissal. The handle it
/// returns is the request's token value.
#[derive(Default)]
struct RecordingHost {
    shown: Mutex<Vec<DialogRequest>>,
    dismissed: Mutex<Vec<(usize, u64)>>,
}

impl RecordingHost {
    fn attach(self: &Arc<Self>, bridge: &DialogBridge, context: &PresentationContextId) {
        let shows = Arc::clone(self);
        bridge.registry().register(
            context,
            Some(Arc::new(move |request: &DialogRequest| {
                shows
                    .shown
                    .lock()
                    .expect("shown lock")
                    .push(request.clone());
                DialogHandle::from_raw(request.token.as_u64() as usize)
            })),
        );
        let dismissals = Arc::clone(self);
        bridge.registry().set_dismiss_capability(
            context,
            Some(Arc::new(move |handle: DialogHandle, token: CorrelationToken| {
                dismissals
                    .dismissed
                    .lock()
                    .expect("dismissed lock")
                    .push((handle.as_raw(), token.as_u64()));
            })),
        );
    }

    fn shown(&self) -> Vec<DialogRequest> {
        self.shown.lock().expect("shown lock").clone()
    }

    fn last_token(&self) -> CorrelationToken {
        self.shown().last().expect("a dialog was shown").token
    }

    fn dismissed(&self) -> Vec<(usize, u64)> {
        self.dismissed.lock().expect("dismissed lock").clone()
    }
}

fn ctx1() -> PresentationContextId {
    PresentationContextId::new("ctx1").expect("context")
}

fn setup() -> (Arc<DialogBridge>, Arc<RecordingHost>, UiSessionAdapter) {
    let bridge = DialogBridge::current().expect("inside tokio runtime");
    let host = Arc::new(RecordingHost::default());
    host.attach(&bridge, &ctx1());
    let adapter = UiSessionAdapter::new(Arc::clone(&bridge), ctx1());
    (bridge, host, adapter)
}

fn counting_cancel() -> (CancelHandle, Arc<AtomicUsize>) {
    let count = Arc::new(AtomicUsize::new(0));
    let count_clone = Arc::clone(&count);
    let cancel = CancelHandle::new(move || {
        count_clone.fetch_add(1, Ordering::SeqCst);
    });
    (cancel, count)
}

async fn eventually(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + WAIT;
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn yes_no_dialog_end_to_end() {
    let (bridge, host, adapter) = setup();
    let (tx, rx) = oneshot::channel();

    assert!(adapter.show_message_with_yes_no_input("Confirm", "Proceed?", move |answer| {
        let _ = tx.send(answer);
    }));

    let shown = host.shown();
    assert_eq!(shown.len(), 1);
    assert_eq!(shown[0].accessory.as_str(), "yes-no");
    assert_eq!(shown[0].context, ctx1());
    assert_eq!(bridge.pending().len(), 1);

    assert!(bridge.deliver(shown[0].token, DialogOutcome::Answered("yes".to_string())));

    let answer = tokio::time::timeout(WAIT, rx)
        .await
        .expect("continuation ran")
        .expect("answer sent");
    assert_eq!(answer, Some(true));
    assert!(bridge.pending().is_empty());
    eventually(|| adapter.current_session().is_none()).await;
}

#[tokio::test]
async fn duplicate_and_unknown_deliveries_are_ignored() {
    let (bridge, host, adapter) = setup();
    let (tx, rx) = oneshot::channel();
    adapter.show_message_with_input("Name", "Your name?", "anon", move |value| {
        let _ = tx.send(value);
    });
    let token = host.last_token();
    assert_eq!(host.shown()[0].accessory_text, "anon");

    let stray = CorrelationToken::from_raw(token.as_u64() + 100).expect("token");
    assert!(!bridge.deliver(stray, DialogOutcome::Answered("stray".to_string())));
    assert!(bridge.deliver(token, DialogOutcome::Answered("alice".to_string())));
    assert!(!bridge.deliver(token, DialogOutcome::Answered("bob".to_string())));

    let value = tokio::time::timeout(WAIT, rx)
        .await
        .expect("continuation ran")
        .expect("value sent");
    assert_eq!(value.as_deref(), Some("alice"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn reply_delivered_from_host_thread() {
    let (bridge, host, adapter) = setup();
    let (tx, rx) = oneshot::channel();
    adapter.show_message_with_secure_input("Unlock", "Passphrase", move |value| {
        let _ = tx.send(value);
    });
    assert_eq!(host.shown()[0].accessory, AccessoryKind::SecureInput);

    let token = host.last_token();
    let host_bridge = Arc::clone(&bridge);
    std::thread::spawn(move || {
        host_bridge.deliver(token, DialogOutcome::Answered("s3cret".to_string()))
    })
    .join()
    .expect("host thread");

    let value = tokio::time::timeout(WAIT, rx)
        .await
        .expect("continuation ran")
        .expect("value sent");
    assert_eq!(value.as_deref(), Some("s3cret"));
}

#[tokio::test]
async fn unregister_keeps_waiting_and_dismiss_becomes_noop() {
    let (bridge, host, adapter) = setup();
    let (tx, rx) = oneshot::channel();
    adapter.show_message_with_yes_no_input("Confirm", "Delete?", move |answer| {
        let _ = tx.send(answer);
    });
    let token = host.last_token();
    let session = adapter.current_session().expect("dialog on screen");

    assert!(bridge.registry().unregister(&ctx1()));
    assert!(bridge.pending().is_pending(token));
    assert!(!session.dismiss());
    assert!(host.dismissed().is_empty());

    assert!(bridge.deliver(token, DialogOutcome::Answered("no".to_string())));
    let answer = tokio::time::timeout(WAIT, rx)
        .await
        .expect("continuation ran")
        .expect("answer sent");
    assert_eq!(answer, Some(false));
}

#[tokio::test]
async fn cancelled_input_propagates_cancellation() {
    let (bridge, host, adapter) = setup();
    let (cancel, cancelled) = counting_cancel();
    let adapter = adapter.with_cancel(cancel);

    let (tx, rx) = oneshot::channel();
    adapter.show_message_with_input("Code", "Enter code", "", move |value| {
        let _ = tx.send(value);
    });
    bridge.deliver(host.last_token(), DialogOutcome::Cancelled);
    let value = tokio::time::timeout(WAIT, rx)
        .await
        .expect("continuation ran")
        .expect("value sent");
    assert_eq!(value, None);
    assert_eq!(cancelled.load(Ordering::SeqCst), 1);

    let (tx, rx) = oneshot::channel();
    adapter.show_message_with_input("Code", "Enter code", "", move |value| {
        let _ = tx.send(value);
    });
    bridge.deliver(host.last_token(), DialogOutcome::Answered("42".to_string()));
    let value = tokio::time::timeout(WAIT, rx)
        .await
        .expect("continuation ran")
        .expect("value sent");
    assert_eq!(value.as_deref(), Some("42"));
    assert_eq!(cancelled.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn new_dialog_withdraws_previous_without_cancelling() {
    let (bridge, host, adapter) = setup();
    let (cancel, cancelled) = counting_cancel();
    let adapter = adapter.with_cancel(cancel);

    let (tx, rx) = oneshot::channel();
    adapter.show_message_with_yes_no_input("First", "?", move |answer| {
        let _ = tx.send(answer);
    });
    let first = host.last_token();
    adapter.show_message_with_input("Second", "?", "", |_| {});
    let second = host.last_token();

    let answer = tokio::time::timeout(WAIT, rx)
        .await
        .expect("continuation ran")
        .expect("answer sent");
    assert_eq!(answer, None);
    assert_eq!(host.dismissed(), vec![(first.as_u64() as usize, first.as_u64())]);
    assert!(!bridge.pending().is_pending(first));
    assert!(bridge.pending().is_pending(second));
    assert_eq!(cancelled.load(Ordering::SeqCst), 0);
    assert_eq!(
        adapter.current_session().map(|session| session.token()),
        Some(second)
    );

    // A late reply for the withdrawn dialog goes nowhere.
    assert!(!bridge.deliver(first, DialogOutcome::Answered("yes".to_string())));
}

#[tokio::test]
async fn show_failure_resolves_input_as_cancelled() {
    let bridge = DialogBridge::current().expect("inside tokio runtime");
    let (cancel, cancelled) = counting_cancel();
    let adapter = UiSessionAdapter::new(Arc::clone(&bridge), ctx1()).with_cancel(cancel);

    let received = Arc::new(Mutex::new(Vec::new()));
    let received_clone = Arc::clone(&received);
    let shown = adapter.show_message_with_file_input("Key", "Select key file", "", move |path| {
        received_clone.lock().expect("received lock").push(path);
    });

    assert!(!shown);
    assert_eq!(*received.lock().expect("received lock"), vec![None]);
    assert_eq!(cancelled.load(Ordering::SeqCst), 1);
    assert!(bridge.pending().is_empty());
}

#[tokio::test]
async fn notice_timeout_dismisses_and_cancels_the_operation() {
    let (bridge, host, adapter) = setup();
    let (cancel, cancelled) = counting_cancel();
    let adapter = adapter
        .with_alert_timeout(Duration::from_millis(20))
        .with_cancel(cancel);

    assert!(adapter.show_notice_message("Heads up", "Space is starting"));
    let token = host.last_token();
    assert_eq!(host.shown()[0].kind, DialogKind::Alert);

    eventually(|| !host.dismissed().is_empty()).await;
    assert_eq!(host.dismissed(), vec![(token.as_u64() as usize, token.as_u64())]);
    assert!(!bridge.pending().is_pending(token));
    eventually(|| cancelled.load(Ordering::SeqCst) == 1).await;
    assert!(adapter.current_session().is_none());

    // The late reply finds nothing to resolve and cancels nothing more.
    assert!(!bridge.deliver(token, DialogOutcome::Answered(String::new())));
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(cancelled.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn closing_a_plain_message_cancels_the_operation() {
    let (bridge, host, adapter) = setup();
    let (cancel, cancelled) = counting_cancel();
    let adapter = adapter.with_cancel(cancel);

    adapter.show_info_message("Login", "Continue in your browser");
    assert_eq!(host.shown()[0].kind, DialogKind::Notify);
    bridge.deliver(host.last_token(), DialogOutcome::Answered(String::new()));

    eventually(|| cancelled.load(Ordering::SeqCst) == 1).await;
}

#[tokio::test]
async fn progress_updates_replace_the_indicator() {
    let (bridge, host, adapter) = setup();
    let (cancel, cancelled) = counting_cancel();
    let adapter = adapter.with_cancel(cancel);

    assert!(!adapter.update_progress("nothing yet", None));
    assert!(adapter.start_progress(ProgressStyle::Bar, "Deploying", "Starting"));
    let first = host.last_token();
    assert!(adapter.update_progress("Halfway", Some(50)));
    let second = host.last_token();
    assert!(adapter.update_progress("Almost", Some(250)));
    let third = host.last_token();

    let shown = host.shown();
    assert_eq!(shown.len(), 3);
    assert_eq!(shown[1].accessory, AccessoryKind::ProgressBar);
    assert_eq!(shown[1].title, "Deploying");
    assert_eq!(shown[1].message, "Halfway");
    assert_eq!(shown[1].accessory_text, "50");
    assert_eq!(shown[2].accessory_text, "100");

    assert!(adapter.done_progress());
    assert!(!adapter.done_progress());
    let dismissed_tokens = host
        .dismissed()
        .into_iter()
        .map(|(_, token)| token)
        .collect::<Vec<_>>();
    assert_eq!(
        dismissed_tokens,
        vec![first.as_u64(), second.as_u64(), third.as_u64()]
    );
    eventually(|| bridge.pending().is_empty()).await;
    tokio::task::yield_now().await;
    assert_eq!(cancelled.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn prompt_yes_no_awaits_host_answer() {
    let bridge = DialogBridge::current().expect("inside tokio runtime");
    let weak = Arc::downgrade(&bridge);
    bridge.registry().register(
        &ctx1(),
        Some(Arc::new(move |request: &DialogRequest| {
            let token = request.token;
            let weak = weak.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(10));
                if let Some(bridge) = weak.upgrade() {
                    bridge.deliver(token, DialogOutcome::Answered("n".to_string()));
                }
            });
            DialogHandle::from_raw(1)
        })),
    );
    let adapter = UiSessionAdapter::background(Arc::clone(&bridge), ctx1());

    let answer = tokio::time::timeout(WAIT, adapter.prompt_yes_no("Reset", "Reset owner?"))
        .await
        .expect("prompt resolved");
    assert_eq!(answer, Some(false));
    assert!(bridge.pending().is_empty());
}

#[tokio::test]
async fn prompt_dropped_by_caller_timeout_is_withdrawn() {
    let (bridge, host, adapter) = setup();
    let (cancel, cancelled) = counting_cancel();
    let adapter = adapter.with_cancel(cancel);

    let answer = tokio::time::timeout(
        Duration::from_millis(20),
        adapter.prompt_input("Device name", "Name this device", "laptop"),
    )
    .await;
    assert!(answer.is_err(), "nobody answered the prompt");

    let token = host.last_token();
    assert!(bridge.pending().is_empty());
    assert!(adapter.current_session().is_none());
    assert_eq!(host.dismissed(), vec![(token.as_u64() as usize, token.as_u64())]);
    assert_eq!(cancelled.load(Ordering::SeqCst), 0);

    drop(adapter);
    assert!(!bridge.deliver(token, DialogOutcome::Answered("late".to_string())));
    assert!(bridge.pending().is_empty());
}

#[tokio::test]
async fn background_adapter_marks_requests() {
    let (bridge, host, _) = setup();
    let adapter = UiSessionAdapter::background(Arc::clone(&bridge), ctx1());
    adapter.show_error_message("Failed", "Could not save");
    let shown = host.shown();
    assert_eq!(shown[0].dispatch, DispatchHint::Background);
    assert_eq!(shown[0].kind, DialogKind::Error);
    assert!(adapter.dismiss_message());
    assert!(!adapter.dismiss_message());
}

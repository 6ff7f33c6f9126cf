use tokio::sync::oneshot;

use crate::token::CorrelationToken;

/// What the native side answered for one dialog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialogOutcome {
    Answered(String),
    Cancelled,
}

impl DialogOutcome {
    /// Maps the `(ok, text)` pair the host passes across the C boundary.
    #[must_use]
    pub fn from_host(ok: bool, text: Option<String>) -> Self {
        if ok {
            Self::Answered(text.unwrap_or_default())
        } else {
            Self::Cancelled
        }
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    #[must_use]
    pub fn into_value(self) -> Option<String> {
        match self {
            Self::Answered(value) => Some(value),
            Self::Cancelled => None,
        }
    }
}

/// Creates the single-slot channel backing one pending dialog.
pub(crate) fn reply_channel(token: CorrelationToken) -> (ReplySender, ReplyReceiver) {
    let (tx, rx) = oneshot::channel();
    (
        ReplySender { token, tx },
        ReplyReceiver {
            token,
            rx: Some(rx),
        },
    )
}

/// Delivering half. Consumed by the single send, so a second delivery
/// through the same sender cannot be expressed.
#[derive(Debug)]
pub(crate) struct ReplySender {
    token: CorrelationToken,
    tx: oneshot::Sender<DialogOutcome>,
}

impl ReplySender {
    /// Returns false when the waiter already gave up.
    pub(crate) fn send(self, outcome: DialogOutcome) -> bool {
        if self.tx.send(outcome).is_err() {
            tracing::debug!(token = %self.token, "Dialog reply dropped, waiter is gone");
            return false;
        }
        true
    }
}

/// Waiting half of a dialog reply.
///
/// Yields at most one outcome. If the sender is dropped without a send (the
/// token was abandoned after a timeout or the dialog could not be shown) the
/// wait resolves to [`DialogOutcome::Cancelled`]. Every call after the first
/// resolved one returns `None` immediately.
#[derive(Debug)]
pub struct ReplyReceiver {
    token: CorrelationToken,
    rx: Option<oneshot::Receiver<DialogOutcome>>,
}

impl ReplyReceiver {
    #[must_use]
    pub fn token(&self) -> CorrelationToken {
        self.token
    }

    #[must_use]
    pub fn is_consumed(&self) -> bool {
        self.rx.is_none()
    }

    /// Suspends until the reply arrives. Has no timeout of its own; wrap it in
    /// `tokio::time::timeout` and abandon the token on expiry. Dropping this
    /// future before it completes keeps the receiver usable.
    pub async fn recv(&mut self) -> Option<DialogOutcome> {
        let rx = self.rx.as_mut()?;
        let outcome = rx.await.unwrap_or(DialogOutcome::Cancelled);
        self.rx = None;
        Some(outcome)
    }

    /// Blocking variant for logic running on a plain OS thread. Must not be
    /// called from inside an async context.
    pub fn blocking_recv(&mut self) -> Option<DialogOutcome> {
        let rx = self.rx.take()?;
        Some(rx.blocking_recv().unwrap_or(DialogOutcome::Cancelled))
    }
}

#[cfg(test)]
mod tests {
    use super::{DialogOutcome, reply_channel};
    use crate::token::CorrelationToken;

    fn token() -> CorrelationToken {
        CorrelationToken::from_raw(7).expect("token")
    }

    #[tokio::test]
    async fn receiver_yields_exactly_one_outcome() {
        let (tx, mut rx) = reply_channel(token());
        assert!(tx.send(DialogOutcome::Answered("hello".to_string())));

        assert_eq!(
            rx.recv().await,
            Some(DialogOutcome::Answered("hello".to_string()))
        );
        assert!(rx.is_consumed());
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn dropped_sender_resolves_as_cancelled() {
        let (tx, mut rx) = reply_channel(token());
        drop(tx);
        assert_eq!(rx.recv().await, Some(DialogOutcome::Cancelled));
    }

    #[tokio::test]
    async fn timed_out_wait_leaves_receiver_usable() {
        let (tx, mut rx) = reply_channel(token());
        let timed_out =
            tokio::time::timeout(std::time::Duration::from_millis(10), rx.recv()).await;
        assert!(timed_out.is_err());
        assert!(!rx.is_consumed());

        assert!(tx.send(DialogOutcome::Cancelled));
        assert_eq!(rx.recv().await, Some(DialogOutcome::Cancelled));
    }

    #[test]
    fn blocking_recv_from_another_thread() {
        let (tx, mut rx) = reply_channel(token());
        let sender = std::thread::spawn(move || tx.send(DialogOutcome::Answered("x".into())));
        assert_eq!(
            rx.blocking_recv(),
            Some(DialogOutcome::Answered("x".to_string()))
        );
        assert!(sender.join().unwrap_or(false));
        assert_eq!(rx.blocking_recv(), None);
    }

    #[test]
    fn host_reply_mapping() {
        assert_eq!(
            DialogOutcome::from_host(true, Some("abc".to_string())),
            DialogOutcome::Answered("abc".to_string())
        );
        assert_eq!(
            DialogOutcome::from_host(true, None),
            DialogOutcome::Answered(String::new())
        );
        assert!(DialogOutcome::from_host(false, Some("ignored".to_string())).is_cancelled());
    }
}

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::reply::{DialogOutcome, ReplyReceiver, ReplySender, reply_channel};
use crate::token::{CorrelationToken, TokenMint};

type PendingReply = ReplySender;
type PendingTable = HashMap<CorrelationToken, PendingReply>;

/// Correlation table: tokens of dialogs whose reply has not arrived yet.
///
/// Deliveries come from host threads at arbitrary times. Removal and send
/// happen as one step per token, so a reply is delivered at most once and
/// unknown tokens are ignored.
#[derive(Debug)]
pub struct PendingReplies {
    mint: TokenMint,
    table: Mutex<PendingTable>,
}

impl Default for PendingReplies {
    fn default() -> Self {
        Self::new()
    }
}

impl PendingReplies {
    #[must_use]
    pub fn new() -> Self {
        Self {
            mint: TokenMint::new(),
            table: Mutex::new(PendingTable::new()),
        }
    }

    /// Registers a waiter. Call before the dialog is shown so a fast reply
    /// cannot race ahead of its waiter.
    pub fn begin_wait(&self) -> (CorrelationToken, ReplyReceiver) {
        let token = self.mint.mint();
        let (tx, rx) = reply_channel(token);
        self.lock().insert(token, tx);
        tracing::debug!(%token, "Dialog reply pending");
        (token, rx)
    }

    /// Hands `outcome` to the waiter for `token` and forgets the token.
    /// Stale, duplicate or post-timeout deliveries are no-ops.
    pub fn deliver(&self, token: CorrelationToken, outcome: DialogOutcome) -> bool {
        let sender = self.lock().remove(&token);
        match sender {
            Some(sender) => {
                tracing::debug!(
                    %token,
                    cancelled = outcome.is_cancelled(),
                    "Dialog reply delivered"
                );
                sender.send(outcome)
            }
            None => {
                tracing::debug!(%token, "Dialog reply without pending waiter");
                false
            }
        }
    }

    /// Drops the waiter for `token` without an answer. The waiter resolves as
    /// cancelled; a reply that arrives later is ignored.
    pub fn abandon(&self, token: CorrelationToken) -> bool {
        let removed = self.lock().remove(&token).is_some();
        if removed {
            tracing::debug!(%token, "Dialog reply abandoned");
        }
        removed
    }

    #[must_use]
    pub fn is_pending(&self, token: CorrelationToken) -> bool {
        self.lock().contains_key(&token)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, PendingTable> {
        self.table
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

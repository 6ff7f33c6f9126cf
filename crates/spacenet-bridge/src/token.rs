use std::fmt;
use std::num::NonZeroU64;
use std::sync::atomic::{AtomicU64, Ordering};

/// Key matching one outstanding dialog request to its eventual reply.
///
/// Tokens are minted before the dialog is shown, so the native side only ever
/// needs to echo the token back; it never has to know which task is waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CorrelationToken(NonZeroU64);

impl CorrelationToken {
    /// Rebuilds a token from the raw value the native side echoes back.
    /// Zero is never minted, so it is rejected here.
    #[must_use]
    pub fn from_raw(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(Self)
    }

    #[must_use]
    pub fn as_u64(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for CorrelationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dlg-{}", self.0)
    }
}

/// Monotonic token source. One per correlation table.
#[derive(Debug)]
pub(crate) struct TokenMint {
    next: AtomicU64,
}

impl TokenMint {
    pub(crate) fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    pub(crate) fn mint(&self) -> CorrelationToken {
        loop {
            let raw = self.next.fetch_add(1, Ordering::SeqCst);
            if let Some(token) = CorrelationToken::from_raw(raw) {
                return token;
            }
        }
    }
}

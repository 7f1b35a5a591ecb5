//! Membership, callback, and per-item error types for waitsets.

use crate::types::{AccountId, InterestSet, SequenceToken};
use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// One watched account, as supplied to `create` or `do_wait`.
///
/// An explicit interest set fully replaces the waitset's default for this
/// account; `None` means "use the default".
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WaitSetAccount {
    pub account: AccountId,
    pub interests: Option<InterestSet>,
}

impl WaitSetAccount {
    /// Watch an account under the waitset's default interests.
    pub fn new(account: impl Into<AccountId>) -> Self {
        Self {
            account: account.into(),
            interests: None,
        }
    }

    /// Watch an account under its own interest set.
    pub fn with_interests(account: impl Into<AccountId>, interests: InterestSet) -> Self {
        Self {
            account: account.into(),
            interests: Some(interests),
        }
    }
}

/// How a wait cycle ended.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WaitDisposition {
    /// A qualifying change occurred (or had already occurred past the
    /// caller's baseline). Carries the new baseline and the accounts that
    /// changed since the last delivery.
    Completed {
        sequence: SequenceToken,
        changed: Vec<AccountId>,
    },

    /// A newer `do_wait` took over the pending slot. No data delivered.
    Superseded,

    /// The waitset was destroyed, swept, or the transport timed out and
    /// cancelled the wait. No data delivered.
    Cancelled,
}

/// The per-wait-cycle handle a caller parks on a waitset.
///
/// Resolves exactly once, with a [`WaitDisposition`]. The paired
/// [`WaitHandle`] is what the transport blocks on with its own deadline;
/// state accessors here never block.
pub struct WaitCallback {
    state: Mutex<Option<WaitDisposition>>,
    signal: Sender<WaitDisposition>,
    created_at: Instant,
}

impl WaitCallback {
    /// Create a callback and the transport-side handle that observes it.
    pub fn new() -> (Arc<WaitCallback>, WaitHandle) {
        let (signal, receiver) = bounded(1);
        let callback = Arc::new(WaitCallback {
            state: Mutex::new(None),
            signal,
            created_at: Instant::now(),
        });
        (callback, WaitHandle { receiver })
    }

    /// Resolve with the given disposition. First resolution wins; later
    /// calls are no-ops and return false.
    pub(crate) fn resolve(&self, disposition: WaitDisposition) -> bool {
        let mut state = self.state.lock();
        if state.is_some() {
            return false;
        }
        *state = Some(disposition.clone());
        // bounded(1) and resolved at most once, so this cannot fill; a
        // dropped handle just means nobody is listening.
        let _ = self.signal.try_send(disposition);
        true
    }

    /// Whether a qualifying change was delivered.
    ///
    /// False while pending and for superseded/cancelled resolutions.
    pub fn completed(&self) -> bool {
        matches!(*self.state.lock(), Some(WaitDisposition::Completed { .. }))
    }

    /// The delivered sequence, if completed.
    pub fn sequence(&self) -> Option<SequenceToken> {
        match &*self.state.lock() {
            Some(WaitDisposition::Completed { sequence, .. }) => Some(*sequence),
            _ => None,
        }
    }

    /// The delivered change delta, if completed.
    pub fn changed(&self) -> Vec<AccountId> {
        match &*self.state.lock() {
            Some(WaitDisposition::Completed { changed, .. }) => changed.clone(),
            _ => Vec::new(),
        }
    }

    /// The final disposition, if resolved.
    pub fn disposition(&self) -> Option<WaitDisposition> {
        self.state.lock().clone()
    }

    /// Time since the callback was created.
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }
}

/// Transport-side receiver for a callback's resolution.
pub struct WaitHandle {
    receiver: Receiver<WaitDisposition>,
}

impl WaitHandle {
    /// Wait for the resolution (blocking).
    pub fn recv(&self) -> Result<WaitDisposition, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Check for a resolution without blocking.
    pub fn try_recv(&self) -> Result<WaitDisposition, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Wait for the resolution with a deadline. On timeout the transport
    /// must cancel the wait through
    /// [`WaitSet::cancel_wait`](crate::waitset::WaitSet::cancel_wait).
    pub fn recv_timeout(
        &self,
        timeout: Duration,
    ) -> Result<WaitDisposition, crossbeam_channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }
}

/// Why a per-item entry was skipped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitSetErrorKind {
    /// The account does not exist in the directory.
    AccountNotFound,
}

/// Non-fatal, per-item error returned alongside an otherwise successful
/// call. The call's valid entries still take effect.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitSetError {
    pub account: AccountId,
    pub kind: WaitSetErrorKind,
}

impl WaitSetError {
    pub fn account_not_found(account: AccountId) -> Self {
        Self {
            account,
            kind: WaitSetErrorKind::AccountNotFound,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_callback_starts_unresolved() {
        let (cb, handle) = WaitCallback::new();
        assert!(!cb.completed());
        assert!(cb.sequence().is_none());
        assert!(handle.try_recv().is_err());
    }

    #[test]
    fn test_first_resolution_wins() {
        let (cb, handle) = WaitCallback::new();
        assert!(cb.resolve(WaitDisposition::Superseded));
        assert!(!cb.resolve(WaitDisposition::Cancelled));

        assert_eq!(cb.disposition(), Some(WaitDisposition::Superseded));
        assert!(!cb.completed());
        assert_eq!(handle.try_recv().unwrap(), WaitDisposition::Superseded);
    }

    #[test]
    fn test_completed_carries_sequence_and_delta() {
        let (cb, handle) = WaitCallback::new();
        let seq: SequenceToken = "3".parse().unwrap();
        cb.resolve(WaitDisposition::Completed {
            sequence: seq,
            changed: vec!["alice".into()],
        });

        assert!(cb.completed());
        assert_eq!(cb.sequence(), Some(seq));
        assert_eq!(cb.changed(), vec![AccountId::from("alice")]);
        match handle.recv().unwrap() {
            WaitDisposition::Completed { sequence, changed } => {
                assert_eq!(sequence, seq);
                assert_eq!(changed, vec![AccountId::from("alice")]);
            }
            other => panic!("Expected Completed, got {:?}", other),
        }
    }

    #[test]
    fn test_resolve_with_dropped_handle_is_harmless() {
        let (cb, handle) = WaitCallback::new();
        drop(handle);
        assert!(cb.resolve(WaitDisposition::Cancelled));
        assert_eq!(cb.disposition(), Some(WaitDisposition::Cancelled));
    }
}

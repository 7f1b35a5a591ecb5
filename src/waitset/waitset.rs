//! The waitset state machine: membership, sequence, and the wait/notify
//! protocol.

use crate::directory::AccountDirectory;
use crate::types::{AccountId, InterestSet, MailboxChange, SequenceToken, WaitSetId};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::trace;

use super::types::{WaitCallback, WaitDisposition, WaitSetAccount, WaitSetError};

/// Lock-protected mutable state of a waitset.
struct Inner {
    /// Watched accounts. The value is the per-account interest override;
    /// `None` means the waitset default applies.
    subscriptions: HashMap<AccountId, Option<InterestSet>>,

    /// Advances by one step per matched change. Never decreases.
    sequence: SequenceToken,

    /// The one live callback, if a caller is currently waiting.
    pending: Option<Arc<WaitCallback>>,

    /// Accounts that changed since the last delivered resolution.
    pending_delta: BTreeSet<AccountId>,

    /// Last create/lookup/do_wait touch, for idle sweeping.
    last_access: Instant,
}

/// A group of watched accounts with an interest filter, a monotone sequence,
/// and at most one pending wait callback.
///
/// Owned by the registry entry that created it; all state transitions happen
/// under the waitset's own lock, held only for bounded work.
pub struct WaitSet {
    id: WaitSetId,
    owner: AccountId,
    created_by_admin: bool,
    watch_all: bool,
    default_interests: InterestSet,
    directory: Arc<dyn AccountDirectory>,
    inner: Mutex<Inner>,
}

impl WaitSet {
    pub(crate) fn new(
        id: WaitSetId,
        owner: AccountId,
        created_by_admin: bool,
        watch_all: bool,
        default_interests: InterestSet,
        directory: Arc<dyn AccountDirectory>,
    ) -> Self {
        Self {
            id,
            owner,
            created_by_admin,
            watch_all,
            default_interests,
            directory,
            inner: Mutex::new(Inner {
                subscriptions: HashMap::new(),
                sequence: SequenceToken::initial(),
                pending: None,
                pending_delta: BTreeSet::new(),
                last_access: Instant::now(),
            }),
        }
    }

    pub fn id(&self) -> WaitSetId {
        self.id
    }

    pub fn owner(&self) -> &AccountId {
        &self.owner
    }

    pub fn created_by_admin(&self) -> bool {
        self.created_by_admin
    }

    pub fn watch_all(&self) -> bool {
        self.watch_all
    }

    pub fn default_interests(&self) -> &InterestSet {
        &self.default_interests
    }

    pub fn member_count(&self) -> usize {
        self.inner.lock().subscriptions.len()
    }

    pub fn is_member(&self, account: &AccountId) -> bool {
        self.inner.lock().subscriptions.contains_key(account)
    }

    /// The sequence as of the latest matched change.
    pub fn current_sequence(&self) -> SequenceToken {
        self.inner.lock().sequence
    }

    /// Register interest in a change, or consume one that already happened.
    ///
    /// Membership deltas are applied first: each add is validated against
    /// the directory (invalid entries become per-item errors, valid ones
    /// take effect), removals of non-members are no-ops. Then, if `since`
    /// differs from the current sequence, the callback resolves immediately
    /// and synchronously with the current sequence and the accumulated
    /// delta. Otherwise the callback is parked, superseding (and resolving
    /// as such) any previously pending one.
    ///
    /// Never blocks: a caller that wants a bounded wait blocks on the
    /// [`WaitHandle`](super::WaitHandle) with its own deadline.
    pub fn do_wait(
        &self,
        callback: &Arc<WaitCallback>,
        since: SequenceToken,
        add: Vec<WaitSetAccount>,
        remove: &[AccountId],
    ) -> Vec<WaitSetError> {
        let mut inner = self.inner.lock();
        inner.last_access = Instant::now();

        let errors = Self::apply_membership(&mut inner, &*self.directory, add, remove);

        if since != inner.sequence {
            // Changes were matched past the caller's baseline; deliver them
            // without parking.
            let sequence = inner.sequence;
            let changed: Vec<AccountId> = inner.pending_delta.iter().cloned().collect();
            inner.pending_delta.clear();
            trace!(waitset = %self.id, %sequence, delta = changed.len(), "do_wait resolved immediately");
            callback.resolve(WaitDisposition::Completed { sequence, changed });
            return errors;
        }

        if let Some(previous) = inner.pending.take() {
            trace!(waitset = %self.id, "pending callback superseded");
            previous.resolve(WaitDisposition::Superseded);
        }
        inner.pending = Some(Arc::clone(callback));
        errors
    }

    /// Transport-side cancellation, e.g. on long-poll timeout.
    ///
    /// Clears the pending slot iff it still holds this callback and
    /// resolves it as cancelled. A stale callback (already superseded or
    /// resolved) is left alone.
    pub fn cancel_wait(&self, callback: &Arc<WaitCallback>) {
        let mut inner = self.inner.lock();
        let is_current = inner
            .pending
            .as_ref()
            .is_some_and(|pending| Arc::ptr_eq(pending, callback));
        if is_current {
            inner.pending = None;
            trace!(waitset = %self.id, "pending callback cancelled by transport");
            callback.resolve(WaitDisposition::Cancelled);
        }
    }

    /// Seed or extend membership without touching the wait state. Used by
    /// the registry at create time.
    pub(crate) fn add_members(&self, add: Vec<WaitSetAccount>) -> Vec<WaitSetError> {
        let mut inner = self.inner.lock();
        Self::apply_membership(&mut inner, &*self.directory, add, &[])
    }

    fn apply_membership(
        inner: &mut Inner,
        directory: &dyn AccountDirectory,
        add: Vec<WaitSetAccount>,
        remove: &[AccountId],
    ) -> Vec<WaitSetError> {
        let mut errors = Vec::new();
        for entry in add {
            if !directory.account_exists(&entry.account) {
                errors.push(WaitSetError::account_not_found(entry.account));
                continue;
            }
            // Re-adding an existing member updates its override in place.
            inner.subscriptions.insert(entry.account, entry.interests);
        }
        for account in remove {
            inner.subscriptions.remove(account);
        }
        errors
    }

    /// Apply one committed mailbox change. Returns true if this waitset
    /// matched it.
    ///
    /// On a match the sequence advances one step and the account joins the
    /// pending delta; a pending callback, if any, resolves with the new
    /// sequence and the delta, and the delta baseline resets.
    pub(crate) fn apply_change(&self, change: &MailboxChange) -> bool {
        let mut inner = self.inner.lock();

        let matched = {
            let override_set = match inner.subscriptions.get(&change.account) {
                Some(entry) => entry.as_ref(),
                None if self.watch_all => None,
                None => return false,
            };
            override_set
                .unwrap_or(&self.default_interests)
                .contains(change.change_type)
        };
        if !matched {
            return false;
        }

        inner.sequence = inner.sequence.next();
        inner.pending_delta.insert(change.account.clone());

        if let Some(callback) = inner.pending.take() {
            let sequence = inner.sequence;
            let changed: Vec<AccountId> = inner.pending_delta.iter().cloned().collect();
            inner.pending_delta.clear();
            trace!(waitset = %self.id, %sequence, "pending callback resolved");
            callback.resolve(WaitDisposition::Completed { sequence, changed });
        }
        true
    }

    /// Subscribe a newly created account under the default interests.
    ///
    /// Watch-all growth only: never advances the sequence or resolves a
    /// callback. A later qualifying change does that.
    pub(crate) fn admit_account(&self, account: &AccountId) {
        let mut inner = self.inner.lock();
        inner.subscriptions.entry(account.clone()).or_insert(None);
    }

    /// Resolve any pending callback as cancelled. Destroy/sweep path.
    pub(crate) fn cancel_pending(&self) {
        let callback = self.inner.lock().pending.take();
        if let Some(callback) = callback {
            trace!(waitset = %self.id, "pending callback cancelled");
            callback.resolve(WaitDisposition::Cancelled);
        }
    }

    /// Mark the waitset as recently used without other effects.
    pub(crate) fn touch(&self) {
        self.inner.lock().last_access = Instant::now();
    }

    /// Time since the last create/lookup/do_wait touch.
    pub(crate) fn idle(&self) -> Duration {
        self.inner.lock().last_access.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::InMemoryDirectory;
    use crate::types::{InterestType, ItemId};

    fn test_waitset(watch_all: bool) -> (Arc<InMemoryDirectory>, WaitSet) {
        let directory = Arc::new(InMemoryDirectory::new());
        directory.create_account("alice");
        directory.create_account("bob");
        let ws = WaitSet::new(
            WaitSetId(1),
            "owner".into(),
            true,
            watch_all,
            InterestSet::of([InterestType::Message]),
            directory.clone(),
        );
        (directory, ws)
    }

    fn message_to(account: &str) -> MailboxChange {
        MailboxChange::new(account, InterestType::Message, ItemId(100))
    }

    #[test]
    fn test_wait_parks_until_change() {
        let (_dir, ws) = test_waitset(false);
        ws.add_members(vec![WaitSetAccount::new("alice")]);

        let (cb, _handle) = WaitCallback::new();
        let errors = ws.do_wait(&cb, SequenceToken::initial(), Vec::new(), &[]);
        assert!(errors.is_empty());
        assert!(!cb.completed());

        assert!(ws.apply_change(&message_to("alice")));
        assert!(cb.completed());
        assert!(cb.sequence().unwrap() > SequenceToken::initial());
        assert_eq!(cb.changed(), vec![AccountId::from("alice")]);
    }

    #[test]
    fn test_stale_baseline_resolves_immediately() {
        let (_dir, ws) = test_waitset(false);
        ws.add_members(vec![WaitSetAccount::new("alice")]);

        // Change lands while nobody is waiting.
        assert!(ws.apply_change(&message_to("alice")));

        let (cb, _handle) = WaitCallback::new();
        ws.do_wait(&cb, SequenceToken::initial(), Vec::new(), &[]);
        assert!(cb.completed());
        assert_eq!(cb.sequence(), Some(ws.current_sequence()));
        assert_eq!(cb.changed(), vec![AccountId::from("alice")]);
    }

    #[test]
    fn test_caught_up_baseline_parks() {
        let (_dir, ws) = test_waitset(false);
        ws.add_members(vec![WaitSetAccount::new("alice")]);
        ws.apply_change(&message_to("alice"));

        let (cb1, _h1) = WaitCallback::new();
        ws.do_wait(&cb1, SequenceToken::initial(), Vec::new(), &[]);
        let seq = cb1.sequence().unwrap();

        // Caller acknowledges the delivered sequence; nothing new yet.
        let (cb2, _h2) = WaitCallback::new();
        ws.do_wait(&cb2, seq, Vec::new(), &[]);
        assert!(!cb2.completed());
    }

    #[test]
    fn test_new_wait_supersedes_pending() {
        let (_dir, ws) = test_waitset(false);
        ws.add_members(vec![WaitSetAccount::new("alice")]);

        let (cb1, _h1) = WaitCallback::new();
        ws.do_wait(&cb1, SequenceToken::initial(), Vec::new(), &[]);
        let (cb2, _h2) = WaitCallback::new();
        ws.do_wait(&cb2, SequenceToken::initial(), Vec::new(), &[]);

        assert_eq!(cb1.disposition(), Some(WaitDisposition::Superseded));
        assert!(!cb1.completed());

        // Only the new callback resolves on the next change.
        ws.apply_change(&message_to("alice"));
        assert!(cb2.completed());
    }

    #[test]
    fn test_non_member_change_ignored() {
        let (_dir, ws) = test_waitset(false);
        ws.add_members(vec![WaitSetAccount::new("alice")]);

        let (cb, _handle) = WaitCallback::new();
        ws.do_wait(&cb, SequenceToken::initial(), Vec::new(), &[]);

        assert!(!ws.apply_change(&message_to("bob")));
        assert!(!cb.completed());
        assert_eq!(ws.current_sequence(), SequenceToken::initial());
    }

    #[test]
    fn test_interest_filter_uses_override() {
        let (_dir, ws) = test_waitset(false);
        ws.add_members(vec![WaitSetAccount::with_interests(
            "alice",
            InterestSet::of([InterestType::Document]),
        )]);

        // Default is message-only, but the override replaces it entirely.
        assert!(!ws.apply_change(&message_to("alice")));
        assert!(ws.apply_change(&MailboxChange::new(
            "alice",
            InterestType::Document,
            ItemId(7)
        )));
    }

    #[test]
    fn test_invalid_add_reported_not_fatal() {
        let (_dir, ws) = test_waitset(false);
        let (cb, _handle) = WaitCallback::new();

        let errors = ws.do_wait(
            &cb,
            SequenceToken::initial(),
            vec![
                WaitSetAccount::new("alice"),
                WaitSetAccount::new("nobody-home"),
            ],
            &[],
        );

        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].account, AccountId::from("nobody-home"));
        // The valid entry still took effect.
        assert!(ws.is_member(&"alice".into()));
        assert!(!ws.is_member(&"nobody-home".into()));
    }

    #[test]
    fn test_remove_non_member_is_noop() {
        let (_dir, ws) = test_waitset(false);
        ws.add_members(vec![WaitSetAccount::new("alice")]);

        let (cb, _handle) = WaitCallback::new();
        let errors = ws.do_wait(
            &cb,
            SequenceToken::initial(),
            Vec::new(),
            &["bob".into(), "alice".into()],
        );
        assert!(errors.is_empty());
        assert_eq!(ws.member_count(), 0);
    }

    #[test]
    fn test_delta_preserved_between_waits() {
        let (_dir, ws) = test_waitset(false);
        ws.add_members(vec![WaitSetAccount::new("alice"), WaitSetAccount::new("bob")]);

        // Two changes with nobody waiting accumulate into one delta.
        ws.apply_change(&message_to("alice"));
        ws.apply_change(&message_to("bob"));

        let (cb, _handle) = WaitCallback::new();
        ws.do_wait(&cb, SequenceToken::initial(), Vec::new(), &[]);
        let mut changed = cb.changed();
        changed.sort();
        assert_eq!(changed, vec![AccountId::from("alice"), AccountId::from("bob")]);
    }

    #[test]
    fn test_watch_all_matches_unlisted_account() {
        let (_dir, ws) = test_waitset(true);
        // No explicit members at all.
        assert!(ws.apply_change(&message_to("alice")));
    }

    #[test]
    fn test_admit_account_never_signals() {
        let (_dir, ws) = test_waitset(true);
        let (cb, _handle) = WaitCallback::new();
        ws.do_wait(&cb, SequenceToken::initial(), Vec::new(), &[]);

        ws.admit_account(&"carol".into());
        assert!(!cb.completed());
        assert_eq!(ws.current_sequence(), SequenceToken::initial());
        assert!(ws.is_member(&"carol".into()));

        // A real change under the new account does signal.
        ws.apply_change(&message_to("carol"));
        assert!(cb.completed());
    }

    #[test]
    fn test_admit_keeps_existing_override() {
        let (_dir, ws) = test_waitset(true);
        ws.add_members(vec![WaitSetAccount::with_interests(
            "alice",
            InterestSet::of([InterestType::Task]),
        )]);

        ws.admit_account(&"alice".into());

        // Override survives: message (default) does not match, task does.
        assert!(!ws.apply_change(&message_to("alice")));
        assert!(ws.apply_change(&MailboxChange::new("alice", InterestType::Task, ItemId(1))));
    }

    #[test]
    fn test_cancel_wait_resolves_cancelled() {
        let (_dir, ws) = test_waitset(false);
        ws.add_members(vec![WaitSetAccount::new("alice")]);

        let (cb, _handle) = WaitCallback::new();
        ws.do_wait(&cb, SequenceToken::initial(), Vec::new(), &[]);
        ws.cancel_wait(&cb);

        assert_eq!(cb.disposition(), Some(WaitDisposition::Cancelled));

        // Later change accumulates instead of resolving the dead callback.
        ws.apply_change(&message_to("alice"));
        assert_eq!(cb.disposition(), Some(WaitDisposition::Cancelled));
    }

    #[test]
    fn test_cancel_wait_ignores_stale_callback() {
        let (_dir, ws) = test_waitset(false);
        ws.add_members(vec![WaitSetAccount::new("alice")]);

        let (cb1, _h1) = WaitCallback::new();
        ws.do_wait(&cb1, SequenceToken::initial(), Vec::new(), &[]);
        let (cb2, _h2) = WaitCallback::new();
        ws.do_wait(&cb2, SequenceToken::initial(), Vec::new(), &[]);

        // cb1 was superseded; cancelling it must not clear cb2's slot.
        ws.cancel_wait(&cb1);
        ws.apply_change(&message_to("alice"));
        assert!(cb2.completed());
    }
}

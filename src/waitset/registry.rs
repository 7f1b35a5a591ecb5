//! Process-wide waitset registry.

use crate::directory::{AccountCreatedListener, AccountDirectory};
use crate::error::{Result, WatchError};
use crate::types::{AccountId, InterestSet, WaitSetId};
use parking_lot::RwLock;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::types::{WaitSetAccount, WaitSetError};
use super::waitset::WaitSet;

/// Registry configuration.
#[derive(Clone, Debug)]
pub struct RegistryConfig {
    /// Waitsets untouched for longer than this are removed by `sweep`.
    pub max_idle: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            // Matches the transport's reconnect cadence: a client gone for
            // this long is not coming back to this waitset.
            max_idle: Duration::from_secs(20 * 60),
        }
    }
}

/// The process-wide id → waitset directory.
///
/// One instance is wired at startup next to the directory collaborator.
/// The registry owns its waitsets: destroying an entry is the only way a
/// waitset dies, and a pending callback is always resolved (as cancelled)
/// on the way out. The map lock is held only for map operations, never
/// across callback resolution.
pub struct WaitSetRegistry {
    config: RegistryConfig,
    directory: Arc<dyn AccountDirectory>,
    waitsets: RwLock<HashMap<WaitSetId, Arc<WaitSet>>>,
    /// Monotone id source; destroyed ids are never reused.
    next_id: AtomicU64,
}

impl WaitSetRegistry {
    pub fn new(directory: Arc<dyn AccountDirectory>) -> Self {
        Self::with_config(directory, RegistryConfig::default())
    }

    pub fn with_config(directory: Arc<dyn AccountDirectory>, config: RegistryConfig) -> Self {
        Self {
            config,
            directory,
            waitsets: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Create a waitset owned by `requester`.
    ///
    /// Each initial account is validated against the directory; invalid
    /// entries become per-item errors while the waitset is still created
    /// with the valid subset. With `watch_all` the initial list is ignored
    /// and the waitset is seeded with every currently known account under
    /// the default interests.
    pub fn create(
        &self,
        requester: impl Into<AccountId>,
        is_admin: bool,
        default_interests: InterestSet,
        watch_all: bool,
        initial_accounts: Vec<WaitSetAccount>,
    ) -> (WaitSetId, Vec<WaitSetError>) {
        let id = WaitSetId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let owner = requester.into();
        let waitset = Arc::new(WaitSet::new(
            id,
            owner.clone(),
            is_admin,
            watch_all,
            default_interests,
            Arc::clone(&self.directory),
        ));

        let errors = if watch_all {
            for account in self.directory.all_accounts() {
                waitset.admit_account(&account);
            }
            Vec::new()
        } else {
            waitset.add_members(initial_accounts)
        };

        self.waitsets.write().insert(id, Arc::clone(&waitset));
        debug!(
            waitset = %id,
            %owner,
            watch_all,
            members = waitset.member_count(),
            "waitset created"
        );
        (id, errors)
    }

    /// Look up a live waitset.
    pub fn lookup(&self, id: WaitSetId) -> Result<Arc<WaitSet>> {
        let waitset = self
            .waitsets
            .read()
            .get(&id)
            .cloned()
            .ok_or(WatchError::WaitSetNotFound(id))?;
        waitset.touch();
        Ok(waitset)
    }

    /// Destroy a waitset.
    ///
    /// `requester` must be the owner; `None` marks an admin caller. The
    /// permission check happens before any mutation, and a pending callback
    /// is resolved as cancelled after the entry leaves the map.
    pub fn destroy(&self, requester: Option<&AccountId>, id: WaitSetId) -> Result<()> {
        let waitset = {
            let mut map = self.waitsets.write();
            match map.entry(id) {
                Entry::Vacant(_) => return Err(WatchError::WaitSetNotFound(id)),
                Entry::Occupied(entry) => {
                    if let Some(requester) = requester {
                        if requester != entry.get().owner() {
                            return Err(WatchError::PermissionDenied {
                                requester: requester.clone(),
                                waitset: id,
                            });
                        }
                    }
                    entry.remove()
                }
            }
        };
        waitset.cancel_pending();
        debug!(waitset = %id, "waitset destroyed");
        Ok(())
    }

    /// Remove waitsets idle past the configured window.
    ///
    /// No internal timer: the embedding server calls this on its own
    /// schedule. Returns the removed ids.
    pub fn sweep(&self) -> Vec<WaitSetId> {
        let expired: Vec<Arc<WaitSet>> = {
            let mut map = self.waitsets.write();
            let ids: Vec<WaitSetId> = map
                .iter()
                .filter(|(_, ws)| ws.idle() > self.config.max_idle)
                .map(|(id, _)| *id)
                .collect();
            ids.iter().filter_map(|id| map.remove(id)).collect()
        };

        let mut removed = Vec::with_capacity(expired.len());
        for waitset in expired {
            waitset.cancel_pending();
            removed.push(waitset.id());
        }
        if !removed.is_empty() {
            debug!(count = removed.len(), "idle waitsets swept");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.waitsets.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.waitsets.read().is_empty()
    }

    /// All live waitsets, for fan-out. The lock is released before the
    /// caller acts on any of them.
    pub(crate) fn snapshot(&self) -> Vec<Arc<WaitSet>> {
        self.waitsets.read().values().cloned().collect()
    }
}

impl AccountCreatedListener for WaitSetRegistry {
    /// Grow every watch-all waitset to cover a newly created account.
    ///
    /// Admission only: sequences and pending callbacks are untouched until
    /// a qualifying change arrives.
    fn account_created(&self, account: &AccountId) {
        for waitset in self.snapshot() {
            if waitset.watch_all() {
                waitset.admit_account(account);
            }
        }
    }
}

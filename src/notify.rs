//! Fan-out from mailbox commits to waitsets.

use crate::types::MailboxChange;
use crate::waitset::WaitSetRegistry;
use std::sync::Arc;
use tracing::trace;

/// Delivers committed mailbox changes to every matching waitset.
///
/// Runs inline on the commit path, so the work per event is strictly
/// bounded: one registry snapshot under the read lock, then one short
/// per-waitset lock each for filter match, sequence advance, and callback
/// resolution. No waitset's update is serialized behind another's lock.
pub struct ChangeNotifier {
    registry: Arc<WaitSetRegistry>,
}

impl ChangeNotifier {
    pub fn new(registry: Arc<WaitSetRegistry>) -> Self {
        Self { registry }
    }

    /// Fan one committed change out to all matching waitsets.
    ///
    /// Returns how many waitsets matched (and therefore advanced their
    /// sequence).
    pub fn notify(&self, change: &MailboxChange) -> usize {
        let mut matched = 0;
        for waitset in self.registry.snapshot() {
            if waitset.apply_change(change) {
                matched += 1;
            }
        }
        trace!(
            account = %change.account,
            change_type = %change.change_type,
            matched,
            "change fanned out"
        );
        matched
    }
}

//! Waitsets: subscription groups with a wait/notify protocol.
//!
//! A waitset tracks a group of watched accounts under an interest-type
//! filter. Callers cycle through `do_wait` calls: each call either consumes
//! changes that already happened past the caller's sequence baseline or
//! parks a single-shot callback that the next matching change resolves.
//!
//! - At most one callback is pending per waitset; a newer `do_wait`
//!   supersedes the old one, destroy and timeout cancel it. Every outcome
//!   is an observable [`WaitDisposition`], never a silent drop.
//! - Changes matched while nobody waits accumulate in the pending delta and
//!   surface on the very next call.
//!
//! # Example
//!
//! ```ignore
//! let registry = WaitSetRegistry::new(directory);
//! let (id, errors) = registry.create(
//!     "owner", true, InterestSet::of([InterestType::Message]), false,
//!     vec![WaitSetAccount::new("alice")],
//! );
//!
//! let ws = registry.lookup(id)?;
//! let (cb, handle) = WaitCallback::new();
//! ws.do_wait(&cb, SequenceToken::initial(), Vec::new(), &[]);
//!
//! // Transport owns the deadline:
//! match handle.recv_timeout(Duration::from_secs(30)) {
//!     Ok(WaitDisposition::Completed { sequence, changed }) => { /* respond */ }
//!     _ => ws.cancel_wait(&cb),
//! }
//! ```

mod registry;
mod types;
mod waitset;

pub use registry::{RegistryConfig, WaitSetRegistry};
pub use types::{
    WaitCallback, WaitDisposition, WaitHandle, WaitSetAccount, WaitSetError, WaitSetErrorKind,
};
pub use waitset::WaitSet;

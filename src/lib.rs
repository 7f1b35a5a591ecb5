//! # Mailwatch
//!
//! In-memory mailbox change notification: clients register interest in one
//! or more accounts through a waitset and learn, without polling, when a
//! qualifying change lands.
//!
//! ## Core Concepts
//!
//! - **WaitSet**: a group of watched accounts plus an interest-type filter,
//!   a monotone sequence token, and at most one pending wait callback
//! - **Registry**: the process-wide id → waitset directory with
//!   create/lookup/destroy and idle sweeping
//! - **ChangeNotifier**: fan-out from a mailbox commit to every matching
//!   waitset, inline on the commit path
//! - **Directory**: the provisioning collaborator consumed for account
//!   existence checks and account-created notifications
//!
//! Everything is transient: a process restart loses all waitsets and
//! reconnecting clients recreate them.
//!
//! ## Example
//!
//! ```ignore
//! use mailwatch::{
//!     ChangeNotifier, InMemoryDirectory, InterestSet, InterestType, MailboxChange,
//!     SequenceToken, WaitCallback, WaitSetAccount, WaitSetRegistry,
//! };
//!
//! let directory = Arc::new(InMemoryDirectory::new());
//! let registry = Arc::new(WaitSetRegistry::new(directory.clone()));
//! let notifier = ChangeNotifier::new(registry.clone());
//!
//! let (id, errors) = registry.create(
//!     "owner", true, InterestSet::of([InterestType::Message]), false,
//!     vec![WaitSetAccount::new("alice")],
//! );
//!
//! let ws = registry.lookup(id)?;
//! let (cb, handle) = WaitCallback::new();
//! ws.do_wait(&cb, SequenceToken::initial(), Vec::new(), &[]);
//! // ... a mailbox commit calls notifier.notify(&change) and the handle fires
//! ```

pub mod directory;
pub mod error;
pub mod notify;
pub mod types;
pub mod waitset;

// Re-exports
pub use directory::{AccountCreatedListener, AccountDirectory, InMemoryDirectory};
pub use error::{Result, WatchError};
pub use notify::ChangeNotifier;
pub use types::{
    AccountId, InterestSet, InterestType, ItemId, MailboxChange, SequenceToken, WaitSetId,
};
pub use waitset::{
    RegistryConfig, WaitCallback, WaitDisposition, WaitHandle, WaitSet, WaitSetAccount,
    WaitSetError, WaitSetErrorKind, WaitSetRegistry,
};

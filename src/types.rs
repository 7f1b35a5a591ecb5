//! Core types for the notification service.

use crate::error::WatchError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Opaque identifier for a watched account (mailbox owner).
///
/// Assigned by the directory collaborator; the core never inspects its
/// contents.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountId(pub String);

impl AccountId {
    pub fn new(id: impl Into<String>) -> Self {
        AccountId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccountId({})", self.0)
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AccountId {
    fn from(s: &str) -> Self {
        AccountId(s.to_string())
    }
}

impl From<String> for AccountId {
    fn from(s: String) -> Self {
        AccountId(s)
    }
}

/// Unique identifier for a waitset, assigned by the registry.
///
/// Ids are unique for the registry's lifetime; a destroyed id is never
/// reused.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WaitSetId(pub u64);

impl fmt::Debug for WaitSetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WaitSetId({})", self.0)
    }
}

impl fmt::Display for WaitSetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Position in a waitset's change history.
///
/// Opaque to callers: compare for equality or order, render with `Display`,
/// parse with `FromStr`. Serialized as a decimal string on the wire.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SequenceToken(u64);

impl SequenceToken {
    /// The baseline a freshly created waitset starts at.
    pub fn initial() -> Self {
        SequenceToken(0)
    }

    /// The token for the next matched change. Strictly greater than `self`.
    pub(crate) fn next(self) -> Self {
        SequenceToken(self.0 + 1)
    }
}

impl fmt::Debug for SequenceToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Seq({})", self.0)
    }
}

impl fmt::Display for SequenceToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SequenceToken {
    type Err = WatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u64>()
            .map(SequenceToken)
            .map_err(|_| WatchError::InvalidSequenceToken(s.to_string()))
    }
}

impl Serialize for SequenceToken {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SequenceToken {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A category of mailbox change a waitset can watch for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterestType {
    Message,
    Contact,
    Appointment,
    Task,
    Document,
}

impl InterestType {
    /// Every concrete interest type, in canonical order.
    pub const ALL: [InterestType; 5] = [
        InterestType::Message,
        InterestType::Contact,
        InterestType::Appointment,
        InterestType::Task,
        InterestType::Document,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InterestType::Message => "message",
            InterestType::Contact => "contact",
            InterestType::Appointment => "appointment",
            InterestType::Task => "task",
            InterestType::Document => "document",
        }
    }
}

impl fmt::Display for InterestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A set of concrete interest types.
///
/// The name `all` is accepted when parsing and expands to the full set right
/// there; no wildcard value is ever stored, so membership checks only ever
/// compare concrete types.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterestSet(BTreeSet<InterestType>);

impl InterestSet {
    pub fn empty() -> Self {
        InterestSet(BTreeSet::new())
    }

    /// The full set of concrete types.
    pub fn all() -> Self {
        InterestSet(InterestType::ALL.into_iter().collect())
    }

    pub fn of(types: impl IntoIterator<Item = InterestType>) -> Self {
        InterestSet(types.into_iter().collect())
    }

    /// Parse a comma-separated list of interest names.
    ///
    /// `all` expands to every concrete type; an unrecognized name is a fatal
    /// error and nothing is applied.
    pub fn parse_names(names: &str) -> crate::error::Result<Self> {
        let mut set = BTreeSet::new();
        for name in names.split(',').map(str::trim).filter(|n| !n.is_empty()) {
            match name {
                "message" => {
                    set.insert(InterestType::Message);
                }
                "contact" => {
                    set.insert(InterestType::Contact);
                }
                "appointment" => {
                    set.insert(InterestType::Appointment);
                }
                "task" => {
                    set.insert(InterestType::Task);
                }
                "document" => {
                    set.insert(InterestType::Document);
                }
                "all" => {
                    set.extend(InterestType::ALL);
                }
                other => return Err(WatchError::UnknownInterestType(other.to_string())),
            }
        }
        Ok(InterestSet(set))
    }

    pub fn insert(&mut self, ty: InterestType) {
        self.0.insert(ty);
    }

    pub fn contains(&self, ty: InterestType) -> bool {
        self.0.contains(&ty)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = InterestType> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<InterestType> for InterestSet {
    fn from_iter<I: IntoIterator<Item = InterestType>>(iter: I) -> Self {
        InterestSet(iter.into_iter().collect())
    }
}

/// Identifier of the changed item inside a mailbox (message id, document
/// id, ...). Carried through from the commit event; the core never
/// dereferences it.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemId(pub u64);

impl fmt::Debug for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ItemId({})", self.0)
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One committed mailbox change, as delivered by the commit path.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MailboxChange {
    /// The account whose mailbox changed.
    pub account: AccountId,

    /// What kind of item changed.
    pub change_type: InterestType,

    /// The changed item.
    pub item: ItemId,
}

impl MailboxChange {
    pub fn new(account: impl Into<AccountId>, change_type: InterestType, item: ItemId) -> Self {
        Self {
            account: account.into(),
            change_type,
            item,
        }
    }
}

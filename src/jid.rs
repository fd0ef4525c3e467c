//! Protocol addresses ("jids").
//!
//! A participant may be named either by a bare phone number or by a fully
//! qualified `<user>@<server>` address. Everything that reaches the protocol
//! stack or the fingerprinting code goes through [`Jid::normalize`] first.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Server part used to qualify bare phone numbers.
pub const USER_SERVER: &str = "s.whatsapp.net";

/// Server part of group addresses.
pub const GROUP_SERVER: &str = "g.us";

/// A fully qualified protocol address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Jid(String);

impl Jid {
    // ---

    /// Qualify an identifier with the user server.
    ///
    /// Identifiers that already contain `@` are kept as they are, so
    /// normalization is idempotent. Bare numbers lose surrounding whitespace
    /// and a leading `+`.
    ///
    /// ```
    /// use yowsup_rpc_bridge::Jid;
    ///
    /// let jid = Jid::normalize("+49176123456");
    /// assert_eq!(jid.as_str(), "49176123456@s.whatsapp.net");
    /// assert_eq!(Jid::normalize(jid.as_str()), jid);
    /// ```
    pub fn normalize(id: &str) -> Self {
        // ---
        let id = id.trim();
        if id.contains('@') {
            return Self(id.to_string());
        }
        let number = id.strip_prefix('+').unwrap_or(id);
        Self(format!("{number}@{USER_SERVER}"))
    }

    /// Build a group address from its bare id.
    pub fn group(id: &str) -> Self {
        // ---
        Self(format!("{id}@{GROUP_SERVER}"))
    }

    /// The part before `@` (phone number or group id).
    pub fn user(&self) -> &str {
        // ---
        match self.0.split_once('@') {
            Some((user, _)) => user,
            None => &self.0,
        }
    }

    /// The part after `@`, if any.
    pub fn server(&self) -> Option<&str> {
        // ---
        self.0.split_once('@').map(|(_, server)| server)
    }

    pub fn is_group(&self) -> bool {
        self.server() == Some(GROUP_SERVER)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Jid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Jid {
    fn from(value: &str) -> Self {
        Self::normalize(value)
    }
}

/// Parse a comma-separated participant list.
///
/// Entries are trimmed, empty entries dropped, each one normalized, and
/// duplicates (after normalization) removed while keeping first-seen order.
pub fn parse_participants(numbers: &str) -> Vec<Jid> {
    // ---
    let mut jids: Vec<Jid> = Vec::new();
    for entry in numbers.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let jid = Jid::normalize(entry);
        if !jids.contains(&jid) {
            jids.push(jid);
        }
    }
    jids
}

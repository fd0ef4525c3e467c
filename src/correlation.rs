use crate::Jid;
use sha1::{Digest, Sha1};
use std::fmt;

/// Fingerprint of a participant set, used to match a group-created
/// notification to the `group_create` call that caused it.
///
/// The fingerprint only depends on the set of bare user parts: order,
/// duplicates and bare-vs-qualified spelling do not change it.
///
/// # Format
///
/// Lower-case hex SHA-1, 40 characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CorrelationKey(String);

impl CorrelationKey {
    // ---

    /// Fingerprint a set of participants.
    pub fn from_jids<'a, I>(jids: I) -> Self
    where
        I: IntoIterator<Item = &'a Jid>,
    {
        // ---
        let mut users: Vec<&str> = jids.into_iter().map(Jid::user).collect();
        users.sort_unstable();
        users.dedup();

        let mut hasher = Sha1::new();
        for user in users {
            hasher.update(user.as_bytes());
        }
        Self(hex::encode(hasher.finalize()))
    }

    /// Fingerprint raw identifiers (bare numbers or jids) after normalizing
    /// each of them.
    pub fn from_identifiers<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        // ---
        let jids: Vec<Jid> = ids
            .into_iter()
            .map(|id| Jid::normalize(id.as_ref()))
            .collect();
        Self::from_jids(&jids)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_format() {
        // ---
        let key = CorrelationKey::from_identifiers(["49176123456", "49175654321"]);
        assert_eq!(key.as_str().len(), 40);
        assert!(key.as_str().chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_known_digest() {
        // ---
        // sha1("4917565432149176123456")
        let key = CorrelationKey::from_identifiers(["49176123456", "49175654321"]);
        let mut hasher = Sha1::new();
        hasher.update(b"4917565432149176123456");
        assert_eq!(key.as_str(), hex::encode(hasher.finalize()));
    }

    #[test]
    fn test_order_and_qualification_do_not_matter() {
        // ---
        let a = CorrelationKey::from_identifiers(["49176123456", "49175654321"]);
        let b = CorrelationKey::from_identifiers([
            "49175654321@s.whatsapp.net",
            "49176123456",
        ]);
        let c = CorrelationKey::from_identifiers([
            "49176123456@s.whatsapp.net",
            "49175654321@s.whatsapp.net",
            "49176123456",
        ]);
        assert_eq!(a, b);
        assert_eq!(a, c);
    }

    #[test]
    fn test_different_membership_differs() {
        // ---
        let a = CorrelationKey::from_identifiers(["49176123456", "49175654321"]);
        let b = CorrelationKey::from_identifiers(["49176123456", "49175654322"]);
        let c = CorrelationKey::from_identifiers(["49176123456", "49175654321", "4917000"]);
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_ne!(b, c);
    }
}

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ids::AccountId;

/// Opaque token identifying an anonymous session.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SessionKey(String);

impl SessionKey {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shown: String = self.0.chars().take(8).collect();
        write!(f, "SessionKey({shown}…)")
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who a record belongs to. Exactly one scope, never both.
///
/// Every resolver and lifecycle call receives an `Owner` explicitly; there is
/// no ambient request context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Owner {
    Identity(AccountId),
    Session(SessionKey),
}

impl Owner {
    /// Collapse raw request parts into an owner scope.
    ///
    /// An authenticated identity always wins; a session key is only consulted
    /// when no identity is present. The two scopes are never merged.
    pub fn from_request(
        identity: Option<AccountId>,
        session: Option<SessionKey>,
    ) -> Option<Owner> {
        match (identity, session) {
            (Some(account), _) => Some(Owner::Identity(account)),
            (None, Some(key)) => Some(Owner::Session(key)),
            (None, None) => None,
        }
    }

    pub fn identity(&self) -> Option<AccountId> {
        match self {
            Owner::Identity(account) => Some(*account),
            Owner::Session(_) => None,
        }
    }

    pub fn session(&self) -> Option<&SessionKey> {
        match self {
            Owner::Identity(_) => None,
            Owner::Session(key) => Some(key),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_wins_over_session() {
        let account = AccountId::new();
        let owner = Owner::from_request(
            Some(account),
            Some(SessionKey::new("abc123")),
        );
        assert_eq!(owner, Some(Owner::Identity(account)));
    }

    #[test]
    fn session_used_without_identity() {
        let owner = Owner::from_request(None, Some(SessionKey::new("abc123")));
        assert_eq!(owner, Some(Owner::Session(SessionKey::new("abc123"))));
    }

    #[test]
    fn neither_part_resolves_to_none() {
        assert_eq!(Owner::from_request(None, None), None);
    }
}

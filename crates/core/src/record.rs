use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::criteria::Condition;
use crate::error::CoreError;
use crate::ids::{AccountId, RecordId};
use crate::owner::Owner;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordKind {
    View,
    Query,
    Context,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::View => "view",
            Self::Query => "query",
            Self::Context => "context",
        }
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "view" => Ok(Self::View),
            "query" => Ok(Self::Query),
            "context" => Ok(Self::Context),
            _ => Err(CoreError::Serialization(format!("unknown record kind: {s}"))),
        }
    }
}

/// A persisted (or about-to-be-persisted) view/query/context configuration.
///
/// `id` is `None` until the record has been committed; a dry-run save hands
/// back a record in that state. The share set is only attached once loaded
/// from storage, so reading it on an unsaved record is a hard error rather
/// than an empty set.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub id: Option<RecordId>,
    pub kind: RecordKind,
    pub owner: Owner,
    pub name: Option<String>,
    pub description: Option<String>,
    pub definition: Option<Condition>,
    pub session_default: bool,
    pub archived: bool,
    pub count: Option<u64>,
    shares: Option<BTreeSet<AccountId>>,
}

impl Record {
    pub fn draft(kind: RecordKind, owner: Owner) -> Self {
        Self {
            id: None,
            kind,
            owner,
            name: None,
            description: None,
            definition: None,
            session_default: false,
            archived: false,
            count: None,
            shares: None,
        }
    }

    pub fn is_persisted(&self) -> bool {
        self.id.is_some()
    }

    /// Identities granted read access. Only meaningful for a persisted
    /// record; fails loudly otherwise.
    pub fn shared_with(&self) -> Result<&BTreeSet<AccountId>, CoreError> {
        self.shares.as_ref().ok_or_else(|| {
            CoreError::UnsavedRecord(
                "shared recipients are only available on a persisted record".into(),
            )
        })
    }

    pub fn attach_shares(&mut self, shares: BTreeSet<AccountId>) {
        self.shares = Some(shares);
    }

    pub fn detach_shares(&mut self) {
        self.shares = None;
    }
}

use std::collections::BTreeSet;

use openview_core::{Account, AccountId, Owner, Record, RecordId, RecordKind};

use crate::error::StorageError;

/// Lookup filters applied on top of the owner scope. `archived` widens the
/// default listing to retired records; the default excludes them.
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    pub kind: Option<RecordKind>,
    pub archived: bool,
    pub session_default: Option<bool>,
}

pub trait RecordStore {
    /// Persist one save as a single transaction: provision any new accounts,
    /// insert the archive snapshot when requested, upsert the record row and
    /// replace its share set. Nothing is visible externally unless all of it
    /// commits.
    fn persist(
        &mut self,
        record: &Record,
        shares: &BTreeSet<AccountId>,
        new_accounts: &[Account],
        archive_snapshot: Option<&Record>,
    ) -> Result<RecordId, StorageError>;

    /// Fetch a record by primary key within the owner scope, regardless of
    /// archival state. The caller decides how an archived hit is surfaced.
    fn get_record(&self, owner: &Owner, id: RecordId) -> Result<Option<Record>, StorageError>;

    fn find_owned(
        &self,
        owner: &Owner,
        filter: &RecordFilter,
    ) -> Result<Vec<Record>, StorageError>;

    /// The owner's live session-default record of the given kind, if any.
    fn find_default(
        &self,
        owner: &Owner,
        kind: RecordKind,
    ) -> Result<Option<Record>, StorageError>;

    fn delete_record(&mut self, id: RecordId) -> Result<(), StorageError>;

    fn set_count(&mut self, id: RecordId, count: Option<u64>) -> Result<(), StorageError>;

    fn record_count(&self) -> Result<u64, StorageError>;

    fn count_by_kind(&self, owner: &Owner) -> Result<Vec<(RecordKind, u64)>, StorageError>;

    fn insert_account(&mut self, account: &Account) -> Result<(), StorageError>;

    fn account_by_username(&self, username: &str) -> Result<Option<Account>, StorageError>;

    fn account_by_email(&self, email: &str) -> Result<Option<Account>, StorageError>;

    fn account_count(&self) -> Result<u64, StorageError>;
}

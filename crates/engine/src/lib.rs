pub mod error;
pub mod form;
pub mod notify;
pub mod resolver;
pub mod share;

pub use error::EngineError;
pub use form::{RecordDraft, RecordForm, SaveOptions};
pub use notify::{MailError, MailTransport, Notifier, ShareInvite};
pub use resolver::Lookup;

use openview_core::{Owner, Record, RecordId, RecordKind, ValidationErrors};
use openview_storage::{RecordStore, SqliteStore};

/// Facade over the ownership resolver and the record lifecycle manager.
///
/// Every method takes the acting owner explicitly; there is no ambient
/// request context, and an owner can never observe or mutate another
/// owner's records through any path here.
pub struct Engine {
    store: SqliteStore,
    notifier: Notifier,
}

impl Engine {
    pub fn new(store: SqliteStore, notifier: Notifier) -> Self {
        Self { store, notifier }
    }

    pub fn store(&self) -> &SqliteStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut SqliteStore {
        &mut self.store
    }

    /// Block until every invitation queued so far has been handed to the
    /// mail transport.
    pub fn flush_mail(&self) {
        self.notifier.flush();
    }

    // ========================================================================
    // Ownership resolver
    // ========================================================================

    pub fn get(
        &self,
        owner: &Owner,
        kind: RecordKind,
        lookup: &Lookup,
    ) -> Result<Record, EngineError> {
        resolver::resolve(&self.store, owner, kind, lookup)
    }

    /// Default listing; archived records are absent.
    pub fn list(&self, owner: &Owner, kind: RecordKind) -> Result<Vec<Record>, EngineError> {
        resolver::list(&self.store, owner, kind)
    }

    /// Archived records retained for history views.
    pub fn history(&self, owner: &Owner, kind: RecordKind) -> Result<Vec<Record>, EngineError> {
        resolver::history(&self.store, owner, kind)
    }

    // ========================================================================
    // Record lifecycle
    // ========================================================================

    /// Create a new record for the owner. A draft asking to become the
    /// session default is refused when the owner already has one of this
    /// kind; `save_session` is the path that mutates it.
    pub fn create(
        &mut self,
        owner: &Owner,
        kind: RecordKind,
        draft: RecordDraft,
        options: SaveOptions,
    ) -> Result<Record, EngineError> {
        if draft.session_default == Some(true)
            && self.store.find_default(owner, kind)?.is_some()
        {
            let mut errors = ValidationErrors::new();
            errors.add(
                "session_default",
                "a session default record of this kind already exists",
            );
            return Err(EngineError::Validation(errors));
        }
        let form = RecordForm::new(owner.clone(), kind, draft);
        form.save(&mut self.store, &self.notifier, options)
    }

    /// Save the owner's session-default record of this kind, creating it on
    /// first save and mutating it in place afterwards. One owner never ends
    /// up with two defaults.
    pub fn save_session(
        &mut self,
        owner: &Owner,
        kind: RecordKind,
        mut draft: RecordDraft,
        options: SaveOptions,
    ) -> Result<Record, EngineError> {
        draft.session_default = Some(true);
        let form = match self.store.find_default(owner, kind)? {
            Some(existing) => RecordForm::with_instance(draft, existing),
            None => RecordForm::new(owner.clone(), kind, draft),
        };
        form.save(&mut self.store, &self.notifier, options)
    }

    /// Apply a draft to a record addressed by primary key. NotFound and
    /// Gone follow the resolver rules.
    pub fn update(
        &mut self,
        owner: &Owner,
        kind: RecordKind,
        pk: RecordId,
        draft: RecordDraft,
        options: SaveOptions,
    ) -> Result<Record, EngineError> {
        let existing = resolver::resolve(&self.store, owner, kind, &Lookup::by_pk(pk))?;
        let form = RecordForm::with_instance(draft, existing);
        form.save(&mut self.store, &self.notifier, options)
    }

    /// Physically remove a record. Refused while the record is delegated to
    /// other identities, and for the session-default record.
    pub fn delete(
        &mut self,
        owner: &Owner,
        kind: RecordKind,
        pk: RecordId,
    ) -> Result<(), EngineError> {
        let record = resolver::resolve(&self.store, owner, kind, &Lookup::by_pk(pk))?;
        if !record.shared_with()?.is_empty() {
            return Err(EngineError::Forbidden(
                "record is shared with other identities".into(),
            ));
        }
        if record.session_default {
            return Err(EngineError::Forbidden(
                "the session default record cannot be deleted".into(),
            ));
        }
        self.store.delete_record(pk)?;
        tracing::debug!(record = %pk, kind = kind.as_str(), "record deleted");
        Ok(())
    }

    /// Write back a cardinality computed by the external query pipeline.
    pub fn set_count(
        &mut self,
        owner: &Owner,
        kind: RecordKind,
        pk: RecordId,
        count: Option<u64>,
    ) -> Result<(), EngineError> {
        resolver::resolve(&self.store, owner, kind, &Lookup::by_pk(pk))?;
        self.store.set_count(pk, count)?;
        Ok(())
    }

    /// Live record counts per kind within the owner scope.
    pub fn stats(&self, owner: &Owner) -> Result<Vec<(RecordKind, u64)>, EngineError> {
        Ok(self.store.count_by_kind(owner)?)
    }
}

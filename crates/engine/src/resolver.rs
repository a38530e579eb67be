use openview_core::{Owner, Record, RecordId, RecordKind};
use openview_storage::{RecordFilter, RecordStore};

use crate::error::EngineError;

/// How a request addresses a record within its owner scope.
///
/// `archived` widens the lookup to retired records (history views); by
/// default an archived record addressed by primary key resolves to `Gone`
/// and is invisible everywhere else.
#[derive(Debug, Clone, Default)]
pub struct Lookup {
    pub pk: Option<RecordId>,
    pub session: bool,
    pub archived: bool,
}

impl Lookup {
    pub fn by_pk(pk: RecordId) -> Self {
        Self {
            pk: Some(pk),
            ..Self::default()
        }
    }

    pub fn session_default() -> Self {
        Self {
            session: true,
            ..Self::default()
        }
    }

    pub fn include_archived(mut self) -> Self {
        self.archived = true;
        self
    }
}

/// Locate the unique record the lookup addresses, or a definitive error.
///
/// The owner scope is absolute: a primary key belonging to someone else
/// resolves exactly like a key that never existed.
pub fn resolve<S: RecordStore>(
    store: &S,
    owner: &Owner,
    kind: RecordKind,
    lookup: &Lookup,
) -> Result<Record, EngineError> {
    if let Some(pk) = lookup.pk {
        let record = store
            .get_record(owner, pk)?
            .filter(|r| r.kind == kind)
            .ok_or_else(|| EngineError::NotFound(pk.to_string()))?;
        if record.archived && !lookup.archived {
            return Err(EngineError::Gone(pk.to_string()));
        }
        return Ok(record);
    }

    if lookup.session {
        return store
            .find_default(owner, kind)?
            .ok_or_else(|| EngineError::NotFound(format!("session {}", kind.as_str())));
    }

    Err(EngineError::NotFound(format!(
        "no lookup key for {}",
        kind.as_str()
    )))
}

pub fn list<S: RecordStore>(
    store: &S,
    owner: &Owner,
    kind: RecordKind,
) -> Result<Vec<Record>, EngineError> {
    let filter = RecordFilter {
        kind: Some(kind),
        archived: false,
        session_default: None,
    };
    Ok(store.find_owned(owner, &filter)?)
}

/// Archived records only, still addressable for history views.
pub fn history<S: RecordStore>(
    store: &S,
    owner: &Owner,
    kind: RecordKind,
) -> Result<Vec<Record>, EngineError> {
    let filter = RecordFilter {
        kind: Some(kind),
        archived: true,
        session_default: None,
    };
    Ok(store.find_owned(owner, &filter)?)
}

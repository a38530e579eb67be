use std::collections::BTreeSet;

use openview_core::{
    AccountId, Condition, Owner, Record, RecordId, RecordKind, ValidationErrors,
};
use openview_storage::RecordStore;

use crate::error::EngineError;
use crate::notify::{Notifier, ShareInvite};
use crate::share;

const NAME_MAX_LEN: usize = 200;

/// Raw field mapping from a request body. `None` means "field not supplied";
/// supplied fields replace the stored value.
#[derive(Debug, Clone, Default)]
pub struct RecordDraft {
    pub name: Option<String>,
    pub description: Option<String>,
    pub definition: Option<Condition>,
    pub session_default: Option<bool>,
    /// Free-text, comma/whitespace-delimited usernames and emails.
    pub recipients: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct SaveOptions {
    /// When false, validation runs in full but nothing is written and no
    /// notification is scheduled.
    pub commit: bool,
    /// Freeze the pre-change content as a standalone archived record in the
    /// same transaction as the save.
    pub archive: bool,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            commit: true,
            archive: false,
        }
    }
}

impl SaveOptions {
    pub fn dry_run() -> Self {
        Self {
            commit: false,
            archive: false,
        }
    }

    pub fn archived() -> Self {
        Self {
            commit: true,
            archive: true,
        }
    }
}

/// Validates a draft against an owner scope and applies it, mirroring the
/// contract of a bound web form: all field errors are collected up front,
/// persistence only happens on a fully valid draft.
pub struct RecordForm {
    owner: Owner,
    kind: RecordKind,
    draft: RecordDraft,
    instance: Option<Record>,
    errors: ValidationErrors,
    validated: bool,
    count_needs_update: bool,
}

impl RecordForm {
    pub fn new(owner: Owner, kind: RecordKind, draft: RecordDraft) -> Self {
        Self {
            owner,
            kind,
            draft,
            instance: None,
            errors: ValidationErrors::new(),
            validated: false,
            count_needs_update: false,
        }
    }

    /// Bind the form to an existing record; owner and kind come from it.
    pub fn with_instance(draft: RecordDraft, instance: Record) -> Self {
        let mut form = Self::new(instance.owner.clone(), instance.kind, draft);
        form.instance = Some(instance);
        form
    }

    pub fn is_valid(&mut self) -> bool {
        if !self.validated {
            self.run_validation();
            self.validated = true;
        }
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &ValidationErrors {
        &self.errors
    }

    /// Whether this save changes the criteria that determine the result
    /// set. Meaningful once validation has run.
    pub fn count_needs_update(&self) -> bool {
        self.count_needs_update
    }

    fn run_validation(&mut self) {
        if let Some(name) = &self.draft.name {
            if name.chars().count() > NAME_MAX_LEN {
                self.errors.add(
                    "name",
                    format!("ensure this value has at most {NAME_MAX_LEN} characters"),
                );
            }
        }
        if let Some(condition) = &self.draft.definition {
            validate_condition(condition, &mut self.errors);
        }

        let before = self
            .instance
            .as_ref()
            .and_then(|r| r.definition.as_ref());
        let after = self.draft.definition.as_ref().or(before);
        self.count_needs_update = match (before, after) {
            (None, None) => false,
            (Some(a), Some(b)) => match (a.fingerprint(), b.fingerprint()) {
                (Ok(fa), Ok(fb)) => fa != fb,
                _ => true,
            },
            _ => true,
        };
    }

    /// Validate, merge, and persist in one atomic unit of work, then
    /// schedule invitations for first-time share recipients.
    pub fn save<S: RecordStore>(
        mut self,
        store: &mut S,
        notifier: &Notifier,
        options: SaveOptions,
    ) -> Result<Record, EngineError> {
        if !self.is_valid() {
            return Err(EngineError::Validation(self.errors));
        }

        let prior = self.instance.clone();
        let prior_shares: BTreeSet<AccountId> = prior
            .as_ref()
            .and_then(|r| r.shared_with().ok().cloned())
            .unwrap_or_default();

        let mut record = match self.instance.take() {
            Some(record) => record,
            None => Record::draft(self.kind, self.owner.clone()),
        };

        if let Some(name) = self.draft.name.take() {
            record.name = Some(name);
        }
        if let Some(description) = self.draft.description.take() {
            record.description = Some(description);
        }
        if let Some(definition) = self.draft.definition.take() {
            record.definition = Some(definition);
        }
        if let Some(flag) = self.draft.session_default {
            record.session_default = flag;
        }
        if self.count_needs_update {
            record.count = None;
        }

        // Recipient resolution is pure reads; provisioned accounts only hit
        // storage on commit, inside the save transaction.
        let resolution = match self.draft.recipients.as_deref() {
            Some(raw) => Some(share::resolve_recipients(store, raw)?),
            None => None,
        };
        let desired_shares = match &resolution {
            Some(resolution) => resolution.account_ids(),
            None => prior_shares.clone(),
        };

        if !options.commit {
            record.detach_shares();
            return Ok(record);
        }

        if record.id.is_none() {
            record.id = Some(RecordId::new());
        }

        let snapshot = options.archive.then(|| {
            let mut snapshot = prior.clone().unwrap_or_else(|| record.clone());
            snapshot.id = Some(RecordId::new());
            snapshot.archived = true;
            snapshot.session_default = false;
            snapshot.detach_shares();
            snapshot
        });

        let new_accounts = resolution
            .as_ref()
            .map(|r| r.provisioned.clone())
            .unwrap_or_default();

        let record_id = store.persist(
            &record,
            &desired_shares,
            &new_accounts,
            snapshot.as_ref(),
        )?;
        record.attach_shares(desired_shares);

        tracing::debug!(
            record = %record_id,
            kind = record.kind.as_str(),
            archived_snapshot = snapshot.is_some(),
            count_reset = self.count_needs_update,
            "record saved",
        );

        if let Some(resolution) = resolution {
            let first_time: Vec<String> = resolution
                .grants
                .iter()
                .filter(|account| !prior_shares.contains(&account.id))
                .map(|account| account.email.clone())
                .collect();
            if !first_time.is_empty() {
                notifier.enqueue(ShareInvite {
                    record_id,
                    kind: record.kind,
                    record_name: record.name.clone(),
                    to: first_time,
                });
            }
        }

        Ok(record)
    }
}

fn validate_condition(condition: &Condition, errors: &mut ValidationErrors) {
    match condition {
        Condition::Filter { field, .. } => {
            if field.trim().is_empty() {
                errors.add("definition", "filter field name must not be blank");
            }
        }
        Condition::Branch { children, .. } => {
            if children.is_empty() {
                errors.add("definition", "branch must contain at least one condition");
            }
            for child in children {
                validate_condition(child, errors);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use openview_core::{FieldValue, Junction, Operator, SessionKey};

    fn session_owner() -> Owner {
        Owner::Session(SessionKey::new("s1"))
    }

    #[test]
    fn empty_draft_is_valid_and_needs_no_recount() {
        let mut form = RecordForm::new(
            session_owner(),
            RecordKind::Context,
            RecordDraft::default(),
        );
        assert!(form.is_valid());
        assert!(!form.count_needs_update());
    }

    #[test]
    fn collects_all_field_errors() {
        let draft = RecordDraft {
            name: Some("x".repeat(NAME_MAX_LEN + 1)),
            definition: Some(Condition::Branch {
                junction: Junction::And,
                children: vec![Condition::filter("", Operator::Eq, FieldValue::Null)],
            }),
            ..Default::default()
        };
        let mut form = RecordForm::new(session_owner(), RecordKind::Context, draft);
        assert!(!form.is_valid());
        assert_eq!(form.errors().len(), 2);
        assert!(!form.errors().field("name").is_empty());
        assert!(!form.errors().field("definition").is_empty());
    }

    #[test]
    fn empty_branch_is_rejected() {
        let draft = RecordDraft {
            definition: Some(Condition::Branch {
                junction: Junction::Or,
                children: vec![],
            }),
            ..Default::default()
        };
        let mut form = RecordForm::new(session_owner(), RecordKind::Context, draft);
        assert!(!form.is_valid());
        assert_eq!(
            form.errors().field("definition"),
            ["branch must contain at least one condition"]
        );
    }

    #[test]
    fn new_definition_triggers_recount() {
        let draft = RecordDraft {
            definition: Some(Condition::filter(
                "title.salary",
                Operator::Gt,
                FieldValue::Integer(15000),
            )),
            ..Default::default()
        };
        let mut form = RecordForm::new(session_owner(), RecordKind::Context, draft);
        assert!(form.is_valid());
        assert!(form.count_needs_update());
    }

    #[test]
    fn unchanged_definition_keeps_count() {
        let condition =
            Condition::filter("title.salary", Operator::Gt, FieldValue::Integer(15000));
        let mut instance = Record::draft(RecordKind::Context, session_owner());
        instance.definition = Some(condition.clone());
        instance.attach_shares(BTreeSet::new());

        let draft = RecordDraft {
            definition: Some(condition),
            name: Some("renamed".into()),
            ..Default::default()
        };
        let mut form = RecordForm::with_instance(draft, instance);
        assert!(form.is_valid());
        assert!(!form.count_needs_update());
    }
}

use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;

use openview_core::{Account, AccountId};
use openview_storage::{RecordStore, StorageError};

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9-]+(\.[A-Za-z0-9-]+)*\.[A-Za-z]{2,}$")
        .expect("email pattern compiles")
});

/// Basic address-shape check. Deliverability is not our problem; this only
/// separates plausible addresses from garbage tokens.
pub fn is_valid_email(token: &str) -> bool {
    EMAIL_RE.is_match(token)
}

/// Split the free-text recipient field on commas and whitespace.
pub fn split_tokens(raw: &str) -> Vec<&str> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Outcome of resolving a recipient list: every account that should hold a
/// grant after the save, plus the subset that does not exist yet and must be
/// provisioned inside the save transaction.
#[derive(Debug, Default)]
pub struct Resolution {
    pub grants: Vec<Account>,
    pub provisioned: Vec<Account>,
}

impl Resolution {
    pub fn account_ids(&self) -> BTreeSet<AccountId> {
        self.grants.iter().map(|a| a.id).collect()
    }
}

/// Resolve each token independently: an existing username or email grants
/// that account; a well-formed unknown email provisions an inactive account;
/// anything else is dropped without error.
pub fn resolve_recipients<S: RecordStore>(
    store: &S,
    raw: &str,
) -> Result<Resolution, StorageError> {
    let mut resolution = Resolution::default();
    let mut seen = BTreeSet::new();

    for token in split_tokens(raw) {
        let existing = match store.account_by_username(token)? {
            Some(account) => Some(account),
            None => store.account_by_email(token)?,
        };

        let account = match existing {
            Some(account) => account,
            None if is_valid_email(token) => {
                // The same unknown address may appear twice in one list;
                // provision it once.
                match resolution.provisioned.iter().find(|a| a.email == token) {
                    Some(account) => account.clone(),
                    None => {
                        let account = Account::provisional(token);
                        resolution.provisioned.push(account.clone());
                        account
                    }
                }
            }
            None => continue,
        };

        if seen.insert(account.id) {
            resolution.grants.push(account);
        }
    }

    Ok(resolution)
}

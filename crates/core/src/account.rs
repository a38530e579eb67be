use serde::{Deserialize, Serialize};

use crate::ids::AccountId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub username: String,
    pub email: String,
    pub active: bool,
}

impl Account {
    /// Provision an account for a share recipient known only by email.
    /// The account is created inactive with no usable credentials; the
    /// invitation flow is responsible for activation.
    pub fn provisional(email: impl Into<String>) -> Self {
        let email = email.into();
        Self {
            id: AccountId::new(),
            username: email.clone(),
            email,
            active: false,
        }
    }
}

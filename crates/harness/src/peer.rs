use std::sync::{Arc, Mutex, Once};

use rand::distributions::Alphanumeric;
use rand::Rng;

use openview_core::{Account, AccountId, Owner, SessionKey};
use openview_engine::{Engine, Notifier, ShareInvite};
use openview_storage::{RecordStore, SqliteStore, StorageError};

use crate::outbox::{Outbox, RecordingTransport};

static TRACING: Once = Once::new();

fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// One in-memory engine plus a recording outbox, the unit the integration
/// suites drive.
pub struct TestPeer {
    pub engine: Engine,
    pub outbox: Outbox,
}

impl TestPeer {
    pub fn new() -> Result<Self, StorageError> {
        init_tracing();
        let outbox: Outbox = Arc::new(Mutex::new(Vec::new()));
        let notifier = Notifier::start(Box::new(RecordingTransport::new(outbox.clone())));
        let store = SqliteStore::open_in_memory()?;
        Ok(Self {
            engine: Engine::new(store, notifier),
            outbox,
        })
    }

    /// A fresh anonymous owner backed by a random session token.
    pub fn session_owner(&self) -> Owner {
        let token: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(16)
            .map(char::from)
            .collect();
        Owner::Session(SessionKey::new(token))
    }

    /// Register an active account with the conventional test address
    /// `<username>@email.com`.
    pub fn create_account(&mut self, username: &str) -> Result<Account, StorageError> {
        let account = Account {
            id: AccountId::new(),
            username: username.to_string(),
            email: format!("{username}@email.com"),
            active: true,
        };
        self.engine.store_mut().insert_account(&account)?;
        Ok(account)
    }

    pub fn identity_owner(&mut self, username: &str) -> Result<Owner, StorageError> {
        Ok(Owner::Identity(self.create_account(username)?.id))
    }

    /// Drain the notifier and return everything delivered so far.
    pub fn sent_mail(&self) -> Vec<ShareInvite> {
        self.engine.flush_mail();
        self.outbox.lock().expect("outbox lock").clone()
    }

    pub fn record_count(&self) -> Result<u64, StorageError> {
        self.engine.store().record_count()
    }

    pub fn account_count(&self) -> Result<u64, StorageError> {
        self.engine.store().account_count()
    }
}

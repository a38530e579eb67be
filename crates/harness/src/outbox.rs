use std::sync::{Arc, Mutex};

use openview_engine::{MailError, MailTransport, ShareInvite};

/// Shared in-memory outbox, the test double for a real mail transport.
pub type Outbox = Arc<Mutex<Vec<ShareInvite>>>;

pub struct RecordingTransport {
    outbox: Outbox,
}

impl RecordingTransport {
    pub fn new(outbox: Outbox) -> Self {
        Self { outbox }
    }
}

impl MailTransport for RecordingTransport {
    fn deliver(&self, invite: &ShareInvite) -> Result<(), MailError> {
        self.outbox
            .lock()
            .expect("outbox lock")
            .push(invite.clone());
        Ok(())
    }
}

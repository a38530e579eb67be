use std::thread::JoinHandle;

use crossbeam::channel::{bounded, unbounded, Sender};
use thiserror::Error;

use openview_core::{RecordId, RecordKind};

/// One invitation message per save, addressed to every recipient granted
/// access for the first time by that save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareInvite {
    pub record_id: RecordId,
    pub kind: RecordKind,
    pub record_name: Option<String>,
    pub to: Vec<String>,
}

#[derive(Debug, Error)]
pub enum MailError {
    #[error("mail transport error: {0}")]
    Transport(String),
}

/// Outbound delivery seam. Real deployments put SMTP behind this; tests
/// record into a shared outbox.
pub trait MailTransport: Send {
    fn deliver(&self, invite: &ShareInvite) -> Result<(), MailError>;
}

enum Command {
    Deliver(ShareInvite),
    Flush(Sender<()>),
}

/// Hands invitations to a background worker so a save never waits on mail
/// transport latency. `enqueue` guarantees the message is queued before it
/// returns; delivery itself is fire-and-forget. Failures are logged, never
/// surfaced to the saving caller.
pub struct Notifier {
    tx: Option<Sender<Command>>,
    worker: Option<JoinHandle<()>>,
}

impl Notifier {
    pub fn start(transport: Box<dyn MailTransport>) -> Self {
        let (tx, rx) = unbounded::<Command>();
        let worker = std::thread::spawn(move || {
            for command in rx {
                match command {
                    Command::Deliver(invite) => {
                        if let Err(e) = transport.deliver(&invite) {
                            tracing::warn!(
                                record = %invite.record_id,
                                error = %e,
                                "share invitation delivery failed",
                            );
                        }
                    }
                    Command::Flush(ack) => {
                        let _ = ack.send(());
                    }
                }
            }
        });
        Self {
            tx: Some(tx),
            worker: Some(worker),
        }
    }

    pub fn enqueue(&self, invite: ShareInvite) {
        tracing::debug!(record = %invite.record_id, recipients = invite.to.len(), "invite queued");
        let Some(tx) = &self.tx else {
            tracing::warn!(record = %invite.record_id, "invite dropped, notifier is shut down");
            return;
        };
        if let Err(err) = tx.send(Command::Deliver(invite)) {
            if let Command::Deliver(invite) = err.0 {
                tracing::warn!(record = %invite.record_id, "invite dropped, notifier worker is gone");
            }
        }
    }

    /// Block until everything queued so far has been handed to the
    /// transport. Intended for tests and orderly shutdown.
    pub fn flush(&self) {
        if let Some(tx) = &self.tx {
            let (ack_tx, ack_rx) = bounded(1);
            if tx.send(Command::Flush(ack_tx)).is_ok() {
                let _ = ack_rx.recv();
            }
        }
    }

    fn shutdown(&mut self) {
        self.tx.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Drop for Notifier {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct Recording(Arc<Mutex<Vec<ShareInvite>>>);

    impl MailTransport for Recording {
        fn deliver(&self, invite: &ShareInvite) -> Result<(), MailError> {
            self.0.lock().unwrap().push(invite.clone());
            Ok(())
        }
    }

    fn invite(to: &[&str]) -> ShareInvite {
        ShareInvite {
            record_id: RecordId::new(),
            kind: RecordKind::Query,
            record_name: None,
            to: to.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn delivers_in_background_and_flushes() {
        let outbox = Arc::new(Mutex::new(Vec::new()));
        let notifier = Notifier::start(Box::new(Recording(outbox.clone())));

        notifier.enqueue(invite(&["a@b.com"]));
        notifier.enqueue(invite(&["c@d.com", "e@f.com"]));
        notifier.flush();

        let sent = outbox.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].to, ["c@d.com", "e@f.com"]);
    }

    #[test]
    fn enqueue_after_shutdown_does_not_panic() {
        let outbox = Arc::new(Mutex::new(Vec::new()));
        let mut notifier = Notifier::start(Box::new(Recording(outbox.clone())));
        notifier.shutdown();

        notifier.enqueue(invite(&["a@b.com"]));
        notifier.flush();
        assert!(outbox.lock().unwrap().is_empty());
    }

    struct Failing;

    impl MailTransport for Failing {
        fn deliver(&self, _: &ShareInvite) -> Result<(), MailError> {
            Err(MailError::Transport("smtp down".into()))
        }
    }

    #[test]
    fn transport_failure_does_not_propagate() {
        let notifier = Notifier::start(Box::new(Failing));
        notifier.enqueue(invite(&["a@b.com"]));
        notifier.flush();
        // Worker is still alive and draining.
        notifier.enqueue(invite(&["c@d.com"]));
        notifier.flush();
    }
}

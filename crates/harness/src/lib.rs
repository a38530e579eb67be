pub mod outbox;
pub mod peer;

pub use outbox::{Outbox, RecordingTransport};
pub use peer::TestPeer;

pub mod account;
pub mod criteria;
pub mod error;
pub mod ids;
pub mod owner;
pub mod record;
pub mod validation;

pub use account::Account;
pub use criteria::{Condition, FieldValue, Junction, Operator};
pub use error::CoreError;
pub use ids::*;
pub use owner::{Owner, SessionKey};
pub use record::{Record, RecordKind};
pub use validation::ValidationErrors;

pub mod error;
pub mod schema;
pub mod store;
pub mod traits;

pub use error::StorageError;
pub use store::SqliteStore;
pub use traits::*;

mod capsule_store;
mod message_store;
mod schema;

pub use capsule_store::{CapsuleStore, SqliteCapsuleStore};
pub use message_store::{MessageStore, SqliteMessageStore};

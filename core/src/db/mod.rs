//! Local SQLite storage

pub mod key_value;
mod pool;

pub use key_value::SqliteKeyStore;
pub use pool::{open_memory_pool, open_pool};

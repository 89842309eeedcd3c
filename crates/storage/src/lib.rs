pub mod audit;
pub mod sessions;
pub mod store;

pub use audit::AuditWriteQueue;
pub use sessions::SessionArchive;
pub use store::{keys, FileStore, KeyValueStore, MemoryStore};

pub mod backup;
pub mod filesystem;
pub mod state_store;

pub use backup::{BackupEntry, BackupPolicy, PruneReport};
pub use state_store::{read_path, StateStore};

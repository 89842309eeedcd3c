pub mod check_cmd;
pub mod run_cmd;
pub mod sessions_cmd;

use std::path::PathBuf;
use warden_core::Paths;
use warden_storage::FileStore;

pub(crate) fn open_store(state: Option<PathBuf>) -> FileStore {
    match state {
        Some(path) => FileStore::at(path),
        None => FileStore::new(&Paths::default()),
    }
}

use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Paths {
    pub base: PathBuf,
}

impl Paths {
    pub fn new() -> Self {
        let base = dirs::home_dir()
            .map(|h| h.join(".warden"))
            .unwrap_or_else(|| PathBuf::from(".warden"));
        Self { base }
    }

    pub fn with_base(base: PathBuf) -> Self {
        Self { base }
    }

    pub fn config_file(&self) -> PathBuf {
        self.base.join("config.json")
    }

    /// Single persisted key-value document backing the file store.
    pub fn state_file(&self) -> PathBuf {
        self.base.join("state.json")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.base.join("logs")
    }
}

impl Default for Paths {
    fn default() -> Self {
        Self::new()
    }
}

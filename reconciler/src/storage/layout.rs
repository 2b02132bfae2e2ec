//! Storage layout configuration

use std::path::PathBuf;

use crate::errors::ReconcilerError;
use crate::filesys::dir::Dir;
use crate::filesys::file::File;

/// Storage layout for the reconciler
#[derive(Debug, Clone)]
pub struct StorageLayout {
    /// Base directory for all storage
    pub base_dir: PathBuf,
}

impl StorageLayout {
    /// Create a new storage layout
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Get the settings file path
    pub fn settings_file(&self) -> File {
        File::new(self.base_dir.join("settings.json"))
    }

    /// Directory holding the append-only event log
    pub fn events_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("events"))
    }

    /// The append-only event log
    pub fn event_log_file(&self) -> File {
        self.events_dir().file("events.jsonl")
    }

    /// Get the logs directory
    pub fn logs_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("logs"))
    }

    /// Setup the storage layout (create directories)
    pub async fn setup(&self) -> Result<(), ReconcilerError> {
        self.events_dir().create().await?;
        self.logs_dir().create().await?;
        Ok(())
    }
}

impl Default for StorageLayout {
    fn default() -> Self {
        #[cfg(target_os = "linux")]
        let base_dir = PathBuf::from("/var/lib/reconciler");

        #[cfg(not(target_os = "linux"))]
        let base_dir = std::env::var_os("HOME")
            .or_else(|| std::env::var_os("USERPROFILE"))
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".reconciler");

        Self::new(base_dir)
    }
}

//! File operations

use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::errors::ReconcilerError;

/// A file wrapper with path
#[derive(Debug, Clone)]
pub struct File {
    path: PathBuf,
}

impl File {
    /// Create a new file reference
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Get the file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check if the file exists
    pub async fn exists(&self) -> bool {
        fs::metadata(&self.path).await.is_ok()
    }

    /// Read file contents as string
    pub async fn read_string(&self) -> Result<String, ReconcilerError> {
        let mut file = fs::File::open(&self.path).await?;
        let mut contents = String::new();
        file.read_to_string(&mut contents).await?;
        Ok(contents)
    }

    /// Read file as JSON
    pub async fn read_json<T: DeserializeOwned>(&self) -> Result<T, ReconcilerError> {
        let contents = self.read_string().await?;
        let value = serde_json::from_str(&contents)?;
        Ok(value)
    }

    /// Write JSON to file, replacing it atomically
    pub async fn write_json<T: Serialize>(&self, value: &T) -> Result<(), ReconcilerError> {
        let contents = serde_json::to_string_pretty(value)?;
        self.ensure_parent().await?;
        self.write_atomic(contents.as_bytes()).await
    }

    /// Append one line, creating the file if needed.
    ///
    /// The line is written with a single `write_all` so a reader never sees a
    /// partial row from this process.
    pub async fn append_line(&self, line: &str) -> Result<(), ReconcilerError> {
        self.ensure_parent().await?;

        let mut buf = Vec::with_capacity(line.len() + 1);
        buf.extend_from_slice(line.as_bytes());
        buf.push(b'\n');

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&buf).await?;
        file.flush().await?;
        Ok(())
    }

    /// Read non-empty lines; a missing file reads as empty
    pub async fn read_lines(&self) -> Result<Vec<String>, ReconcilerError> {
        if !self.exists().await {
            return Ok(Vec::new());
        }
        let contents = self.read_string().await?;
        Ok(contents
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Replace the file with the given lines, atomically
    pub async fn write_lines(&self, lines: &[String]) -> Result<(), ReconcilerError> {
        let mut contents = lines.join("\n");
        if !contents.is_empty() {
            contents.push('\n');
        }
        self.ensure_parent().await?;
        self.write_atomic(contents.as_bytes()).await
    }

    async fn ensure_parent(&self) -> Result<(), ReconcilerError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Atomic write using a temporary file
    async fn write_atomic(&self, contents: &[u8]) -> Result<(), ReconcilerError> {
        let temp_path = self.path.with_extension("tmp");

        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(contents).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&temp_path, &self.path).await?;
        Ok(())
    }
}

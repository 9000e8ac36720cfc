//! Snapshot file
//!
//! A single JSON array holding every link, written as a whole and read once on startup

use std::path::Path;
use std::path::PathBuf;

use tokio::fs;
use tokio::fs::OpenOptions;

use crate::links::Link;

use super::Result;

/// Location of the snapshot file
#[derive(Clone, Debug)]
pub struct Snapshot {
    /// Path of the file
    path: PathBuf,
}

impl Snapshot {
    /// Snapshot at the given path, the file does not have to exist yet
    pub fn new<P>(path: P) -> Self
    where
        P: Into<PathBuf>,
    {
        Self { path: path.into() }
    }

    /// Path of the snapshot file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read all links from the snapshot
    ///
    /// The file is created when missing. An empty file holds no links, anything else that is not
    /// a JSON array of links is an error.
    pub async fn read(&self) -> Result<Vec<Link>> {
        OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.path)
            .await?;

        let contents = fs::read(&self.path).await?;

        if contents.iter().all(u8::is_ascii_whitespace) {
            tracing::warn!("Empty snapshot file: {}", self.path.display());
            return Ok(Vec::new());
        }

        // `null` is what an empty list used to be written as
        let links = serde_json::from_slice::<Option<Vec<Link>>>(&contents)?;

        Ok(links.unwrap_or_default())
    }

    /// Replace the snapshot with the given links
    pub async fn write(&self, links: &[Link]) -> Result<()> {
        let contents = serde_json::to_vec(links)?;

        fs::write(&self.path, contents).await?;

        Ok(())
    }
}

//! Memory storage
//!
//! Only survives a restart through the snapshot file

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::links::Link;
use crate::links::LinkSummary;
use crate::links::NewLink;

use super::Error;
use super::Result;
use super::Snapshot;

/// An in-memory storage
///
/// Both maps have their own lock, a create takes the full URL lock first and the shortcut lock
/// second. Readers only ever hold one lock at a time, so a lookup by one key can see a link the
/// other key does not know about yet.
#[derive(Clone, Debug)]
pub struct Memory {
    /// All links by shortcut
    by_shortcut: Arc<RwLock<HashMap<String, Link>>>,

    /// Shortcuts by full URL
    by_full_url: Arc<RwLock<HashMap<String, String>>>,

    /// Snapshot to load from and save to
    snapshot: Snapshot,
}

impl Memory {
    /// Create a new empty Memory storage
    pub fn new(snapshot: Snapshot) -> Self {
        Self {
            by_shortcut: Arc::new(RwLock::new(HashMap::new())),
            by_full_url: Arc::new(RwLock::new(HashMap::new())),
            snapshot,
        }
    }

    pub async fn get_by_shortcut(&self, shortcut: &str) -> Result<Link> {
        match self.by_shortcut.read().await.get(shortcut) {
            Some(link) if link.is_deleted => Err(Error::Deleted),
            Some(link) => Ok(link.clone()),
            None => Err(Error::NotFound),
        }
    }

    pub async fn get_by_full_url(&self, full_url: &str) -> Result<Link> {
        let shortcut = self
            .by_full_url
            .read()
            .await
            .get(full_url)
            .cloned()
            .ok_or(Error::NotFound)?;

        self.by_shortcut
            .read()
            .await
            .get(&shortcut)
            .cloned()
            .ok_or(Error::NotFound)
    }

    pub async fn get_by_owner(&self, owner_id: &str) -> Result<Vec<LinkSummary>> {
        Ok(self
            .by_shortcut
            .read()
            .await
            .values()
            .filter(|link| link.owner_id == owner_id && !link.is_deleted)
            .map(Link::summary)
            .collect())
    }

    pub async fn create(&self, candidate: &NewLink<'_>) -> Result<(Link, bool)> {
        self.insert(Link {
            full_url: candidate.full_url.to_string(),
            shortcut: candidate.shortcut.to_string(),
            owner_id: candidate.owner_id.to_string(),
            is_deleted: false,
        })
        .await
    }

    /// Insert a link as is, unless its full URL is already known
    async fn insert(&self, link: Link) -> Result<(Link, bool)> {
        let mut by_full_url = self.by_full_url.write().await;

        if let Some(shortcut) = by_full_url.get(&link.full_url) {
            if let Some(existing) = self.by_shortcut.read().await.get(shortcut) {
                return Ok((existing.clone(), false));
            }
        }

        {
            let mut by_shortcut = self.by_shortcut.write().await;

            if by_shortcut.contains_key(&link.shortcut) {
                return Err(Error::ShortcutTaken);
            }

            by_shortcut.insert(link.shortcut.clone(), link.clone());
        }

        by_full_url.insert(link.full_url.clone(), link.shortcut.clone());

        Ok((link, true))
    }

    pub async fn soft_delete(&self, shortcuts: &[String], owner_id: &str) -> Result<()> {
        let mut by_shortcut = self.by_shortcut.write().await;

        for shortcut in shortcuts {
            if let Some(link) = by_shortcut.get_mut(shortcut) {
                if link.owner_id == owner_id {
                    link.is_deleted = true;
                }
            }
        }

        Ok(())
    }

    pub async fn load_snapshot(&self) -> Result<()> {
        let links = self.snapshot.read().await?;

        let mut restored = 0;
        let mut skipped = 0;

        for link in links {
            match self.insert(link).await {
                Ok((_, true)) => restored += 1,
                Ok((existing, false)) => {
                    tracing::debug!("Skipping known URL from snapshot: {}", existing.full_url);
                    skipped += 1;
                }
                Err(err) => {
                    tracing::debug!("Skipping link from snapshot: {err}");
                    skipped += 1;
                }
            }
        }

        tracing::info!(
            "Restored links from {}: {restored}, skipped: {skipped}",
            self.snapshot.path().display()
        );

        Ok(())
    }

    pub async fn save_snapshot(&self) -> Result<()> {
        let mut links = self
            .by_shortcut
            .read()
            .await
            .values()
            .cloned()
            .collect::<Vec<Link>>();

        links.sort_by(|a, b| a.shortcut.cmp(&b.shortcut));

        self.snapshot.write(&links).await?;

        tracing::info!("Saved links: {}", links.len());

        Ok(())
    }
}

//! Link service
//!
//! Validates URLs, hands out unique shortcuts and builds the short URLs that are shown to users

use thiserror::Error;
use url::Url;

use crate::links::BatchItem;
use crate::links::BatchResult;
use crate::links::Link;
use crate::links::LinkSummary;
use crate::links::NewLink;
use crate::shortcut;
use crate::storage;
use crate::storage::Storage;
use crate::storage::Transaction;

/// Number of shortcuts tried before giving up on a single link
pub const MAX_SHORTCUT_ATTEMPTS: usize = 5;

/// Number of links in a batch committed at once
pub const BATCH_COMMIT_SIZE: usize = 1000;

/// Service errors
#[derive(Debug, Error)]
pub enum Error {
    /// The URL is not an absolute URL with a host
    #[error("Invalid URL: `{0}`")]
    InvalidUrl(String),

    /// No link with the given shortcut exists
    #[error("Link not found")]
    NotFound,

    /// The link has been deleted by its owner
    #[error("Link is deleted")]
    Deleted,

    /// Every generated shortcut was already taken
    #[error("Could not generate a unique shortcut after {0} attempts")]
    ShortcutExhausted(usize),

    /// Storage failure
    #[error(transparent)]
    Storage(storage::Error),
}

impl From<storage::Error> for Error {
    fn from(err: storage::Error) -> Self {
        match err {
            storage::Error::NotFound => Self::NotFound,
            storage::Error::Deleted => Self::Deleted,
            err => Self::Storage(err),
        }
    }
}

/// Result type of the service
pub type Result<T> = core::result::Result<T, Error>;

/// Link service
#[derive(Clone, Debug)]
pub struct LinkService {
    /// Storage of all links
    storage: Storage,

    /// Length of generated shortcuts
    shortcut_length: usize,

    /// Prefix for short URLs, when not set the host of the request is used
    base_url: Option<String>,
}

impl LinkService {
    pub fn new(storage: Storage, shortcut_length: usize, base_url: Option<String>) -> Self {
        Self {
            storage,
            shortcut_length,
            base_url,
        }
    }

    /// The storage behind the service
    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Create a link for the URL, or return the existing one
    ///
    /// The second value is `false` when the URL was already known
    pub async fn create_link(&self, full_url: &str, owner_id: &str) -> Result<(Link, bool)> {
        validate_url(full_url)?;

        self.create_unique(full_url, owner_id, None).await
    }

    /// Full URL behind a shortcut
    pub async fn get_full_url(&self, shortcut: &str) -> Result<String> {
        let link = self.storage.get_by_shortcut(shortcut).await?;

        Ok(link.full_url)
    }

    pub async fn get_links_for_owner(&self, owner_id: &str) -> Result<Vec<LinkSummary>> {
        Ok(self.storage.get_by_owner(owner_id).await?)
    }

    /// Soft-delete links, only those of the owner are touched
    pub async fn soft_delete_links(&self, shortcuts: &[String], owner_id: &str) -> Result<()> {
        self.storage.soft_delete(shortcuts, owner_id).await?;

        Ok(())
    }

    /// Create links for all items
    ///
    /// All URLs are validated before anything is stored. With a storage that supports
    /// transactions the links are committed in chunks of [`BATCH_COMMIT_SIZE`], a failure rolls
    /// back the current chunk. Otherwise every link is stored on its own.
    pub async fn bulk_create(
        &self,
        items: Vec<BatchItem>,
        owner_id: &str,
        host: Option<&str>,
    ) -> Result<Vec<BatchResult>> {
        for item in &items {
            validate_url(&item.full_url)?;
        }

        let mut transaction = match self.storage.begin_transaction().await {
            Ok(transaction) => Some(transaction),
            Err(storage::Error::TransactionsUnsupported) => None,
            Err(err) => return Err(err.into()),
        };

        let mut results = Vec::with_capacity(items.len());
        let total = items.len();

        for (index, item) in items.into_iter().enumerate() {
            let (link, _) = self
                .create_unique(&item.full_url, owner_id, transaction.as_mut())
                .await?;

            results.push(BatchResult {
                correlation_id: item.correlation_id,
                short_url: self.build_short_url(&link.shortcut, host),
                shortcut: link.shortcut,
            });

            let chunk_done = (index + 1) % BATCH_COMMIT_SIZE == 0;
            if chunk_done && index + 1 < total {
                if let Some(done) = transaction.take() {
                    done.commit().await?;
                    transaction = Some(self.storage.begin_transaction().await?);
                }
            }
        }

        if let Some(transaction) = transaction {
            transaction.commit().await?;
        }

        tracing::debug!("Created batch of {total} links");

        Ok(results)
    }

    /// Externally visible URL for a shortcut
    pub fn build_short_url(&self, shortcut: &str, host: Option<&str>) -> String {
        match &self.base_url {
            Some(base_url) => format!("{}/{shortcut}", base_url.trim_end_matches('/')),
            None => format!("http://{}/{shortcut}", host.unwrap_or("localhost")),
        }
    }

    /// Store a link under a fresh shortcut, retrying on collisions
    ///
    /// Inside a transaction the insert itself returns an existing link for the URL, no second
    /// connection is taken from the pool while the transaction holds one.
    async fn create_unique(
        &self,
        full_url: &str,
        owner_id: &str,
        mut transaction: Option<&mut Transaction>,
    ) -> Result<(Link, bool)> {
        if transaction.is_none() {
            match self.storage.get_by_full_url(full_url).await {
                Ok(link) => return Ok((link, false)),
                Err(storage::Error::NotFound) => {}
                Err(err) => return Err(err.into()),
            }
        }

        for attempt in 1..=MAX_SHORTCUT_ATTEMPTS {
            let shortcut = shortcut::generate(self.shortcut_length);

            let candidate = NewLink {
                full_url,
                shortcut: &shortcut,
                owner_id,
            };

            match self
                .storage
                .create(&candidate, transaction.as_deref_mut())
                .await
            {
                Err(storage::Error::ShortcutTaken) => {
                    tracing::debug!("Shortcut `{shortcut}` is taken (attempt {attempt})");
                }
                result => return Ok(result?),
            }
        }

        Err(Error::ShortcutExhausted(MAX_SHORTCUT_ATTEMPTS))
    }
}

/// Check the URL is absolute and has a host
///
/// Control characters are rejected, the stored URL has to be exactly the one redirected to.
fn validate_url(full_url: &str) -> Result<()> {
    if full_url.bytes().any(|byte| byte.is_ascii_control()) {
        return Err(Error::InvalidUrl(full_url.to_string()));
    }

    match Url::parse(full_url) {
        Ok(url) if url.host_str().is_some_and(|host| !host.is_empty()) => Ok(()),
        _ => Err(Error::InvalidUrl(full_url.to_string())),
    }
}

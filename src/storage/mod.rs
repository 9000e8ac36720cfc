//! All things related to the storage of links
//!
//! Two variants exist, picked once at startup: an in-memory store when no database is configured
//! and a Postgres store otherwise. Both are backed by a snapshot file.

use std::path::PathBuf;
use std::time::Duration;

use sqlx::PgPool;
use thiserror::Error;

pub use memory::Memory;
pub use postgres::Postgres;
pub use postgres::Transaction;
pub use retry::RetryPolicy;
pub use snapshot::Snapshot;

use crate::links::Link;
use crate::links::LinkSummary;
use crate::links::NewLink;

mod memory;
mod postgres;
mod retry;
mod snapshot;

/// Name of the unique constraint on `links.shortcut`
const SHORTCUT_CONSTRAINT: &str = "links_shortcut_key";

/// Storage errors
#[derive(Debug, Error)]
pub enum Error {
    /// No link with the given key exists
    #[error("Link not found")]
    NotFound,

    /// The link exists but has been soft-deleted
    #[error("Link is deleted")]
    Deleted,

    /// The shortcut of the candidate is already in use
    #[error("Shortcut is already taken")]
    ShortcutTaken,

    /// The storage can not run transactions, continue without one
    #[error("Storage does not support transactions")]
    TransactionsUnsupported,

    /// A query did not finish in time
    #[error("Query timed out after {0:?}")]
    Timeout(Duration),

    /// Any other database error
    #[error("Database error: {0}")]
    Database(sqlx::Error),

    /// Migrations could not be applied
    #[error("Migrations could not run: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// The snapshot file could not be read or written
    #[error("Snapshot I/O error: {0}")]
    SnapshotIo(#[from] std::io::Error),

    /// The snapshot file does not contain a valid list of links
    #[error("Snapshot is corrupt: {0}")]
    SnapshotFormat(#[from] serde_json::Error),
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() && db_err.constraint() == Some(SHORTCUT_CONSTRAINT) {
                return Self::ShortcutTaken;
            }
        }

        Self::Database(err)
    }
}

/// Result type for all storage interactions
pub type Result<T> = core::result::Result<T, Error>;

/// Which database to use, if any
#[derive(Clone, Debug)]
pub enum DatabaseConfig {
    /// Keep everything in memory
    InMemory,

    /// Connect to Postgres with the given connection string
    Connect(String),

    /// Use an existing Postgres pool
    ExistingConnection(PgPool),
}

/// Everything needed to set up a storage
#[derive(Clone, Debug)]
pub struct StorageConfig {
    /// The database to use
    pub database: DatabaseConfig,

    /// Path of the snapshot file
    pub snapshot_path: PathBuf,

    /// Timeout and retry budget for database queries
    pub retry: RetryPolicy,
}

/// Link storage
///
/// All variants share the same contract, see the individual operations
#[derive(Clone, Debug)]
pub enum Storage {
    /// In-memory storage
    Memory(Memory),

    /// Postgres storage
    Postgres(Postgres),
}

impl Storage {
    /// Setup the storage matching the configuration
    pub async fn from_config(config: StorageConfig) -> Result<Self> {
        let snapshot = Snapshot::new(config.snapshot_path);

        let storage = match config.database {
            DatabaseConfig::InMemory => Self::Memory(Memory::new(snapshot)),
            DatabaseConfig::Connect(url) => {
                Self::Postgres(Postgres::connect(&url, config.retry, snapshot).await?)
            }
            DatabaseConfig::ExistingConnection(pool) => {
                Self::Postgres(Postgres::new_with_pool(pool, config.retry, snapshot).await?)
            }
        };

        tracing::info!("Using {} storage", storage.kind());

        Ok(storage)
    }

    /// Human readable name of the variant
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Memory(_) => "memory",
            Self::Postgres(_) => "postgres",
        }
    }

    /// Find a link by its shortcut
    ///
    /// A soft-deleted link results in [`Error::Deleted`], an unknown one in [`Error::NotFound`]
    pub async fn get_by_shortcut(&self, shortcut: &str) -> Result<Link> {
        match self {
            Self::Memory(memory) => memory.get_by_shortcut(shortcut).await,
            Self::Postgres(postgres) => postgres.get_by_shortcut(shortcut).await,
        }
    }

    /// Find a link by its full URL
    ///
    /// DOES NOT respect the soft-delete, used to make creation idempotent
    pub async fn get_by_full_url(&self, full_url: &str) -> Result<Link> {
        match self {
            Self::Memory(memory) => memory.get_by_full_url(full_url).await,
            Self::Postgres(postgres) => postgres.get_by_full_url(full_url).await,
        }
    }

    /// Find all links of an owner
    ///
    /// Respects the soft-delete
    pub async fn get_by_owner(&self, owner_id: &str) -> Result<Vec<LinkSummary>> {
        match self {
            Self::Memory(memory) => memory.get_by_owner(owner_id).await,
            Self::Postgres(postgres) => postgres.get_by_owner(owner_id).await,
        }
    }

    /// Create a link
    ///
    /// When a link for the same full URL already exists it is returned instead, with `false` as
    /// second value. A shortcut collision results in [`Error::ShortcutTaken`].
    pub async fn create(
        &self,
        candidate: &NewLink<'_>,
        transaction: Option<&mut Transaction>,
    ) -> Result<(Link, bool)> {
        match self {
            Self::Memory(memory) => memory.create(candidate).await,
            Self::Postgres(postgres) => postgres.create(candidate, transaction).await,
        }
    }

    /// Soft-delete the links of an owner
    ///
    /// Shortcuts that are unknown or owned by someone else are skipped
    pub async fn soft_delete(&self, shortcuts: &[String], owner_id: &str) -> Result<()> {
        match self {
            Self::Memory(memory) => memory.soft_delete(shortcuts, owner_id).await,
            Self::Postgres(postgres) => postgres.soft_delete(shortcuts, owner_id).await,
        }
    }

    /// Load all links of the snapshot file into the storage
    pub async fn load_snapshot(&self) -> Result<()> {
        match self {
            Self::Memory(memory) => memory.load_snapshot().await,
            Self::Postgres(postgres) => postgres.load_snapshot().await,
        }
    }

    /// Write all links, deleted ones included, to the snapshot file
    pub async fn save_snapshot(&self) -> Result<()> {
        match self {
            Self::Memory(memory) => memory.save_snapshot().await,
            Self::Postgres(postgres) => postgres.save_snapshot().await,
        }
    }

    /// Start a transaction
    ///
    /// [`Error::TransactionsUnsupported`] means: go on without one
    pub async fn begin_transaction(&self) -> Result<Transaction> {
        match self {
            Self::Memory(_) => Err(Error::TransactionsUnsupported),
            Self::Postgres(postgres) => postgres.begin_transaction().await,
        }
    }

    /// Check the storage is reachable
    pub async fn ping(&self) -> Result<()> {
        match self {
            Self::Memory(_) => Ok(()),
            Self::Postgres(postgres) => postgres.ping().await,
        }
    }
}

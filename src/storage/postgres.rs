//! Postgres storage

use std::time::Duration;

use sqlx::Acquire;
use sqlx::PgPool;
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;
use tokio::time::timeout;

use crate::links::Link;
use crate::links::LinkSummary;
use crate::links::NewLink;

use super::Error;
use super::Result;
use super::RetryPolicy;
use super::Snapshot;
use super::retry::with_retry;

/// Migrator to run migrations on startup
static MIGRATOR: Migrator = sqlx::migrate!();

/// Insert a link, or return the existing one for the same URL
///
/// `xmax` is only zero for freshly inserted rows
const CREATE_LINK: &str = r#"
    INSERT INTO links (url, shortcut, owner_id)
    VALUES ($1, $2, $3)
    ON CONFLICT (url) DO UPDATE SET shortcut = links.shortcut
    RETURNING url, shortcut, owner_id, is_deleted, (xmax = 0) AS inserted
"#;

/// Postgres storage
#[derive(Clone, Debug)]
pub struct Postgres {
    /// Pool of connections
    connection_pool: PgPool,

    /// Timeout and retry budget for queries
    retry: RetryPolicy,

    /// Snapshot to load from and save to
    snapshot: Snapshot,
}

/// An open transaction, rolled back when dropped without a commit
pub struct Transaction {
    /// The `SQLx` transaction
    inner: sqlx::Transaction<'static, sqlx::Postgres>,
}

impl Transaction {
    /// Commit all work done so far
    pub async fn commit(self) -> Result<()> {
        self.inner.commit().await?;

        Ok(())
    }
}

/// Row returned by [`CREATE_LINK`]
#[derive(sqlx::FromRow)]
struct CreatedRow {
    /// The stored link
    #[sqlx(flatten)]
    link: Link,

    /// Whether the link was inserted or already existed
    inserted: bool,
}

impl Postgres {
    /// Connect to Postgres
    ///
    /// Migrations will be run
    pub async fn connect(
        database_connection_string: &str,
        retry: RetryPolicy,
        snapshot: Snapshot,
    ) -> Result<Self> {
        let connection_pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(3))
            .connect(database_connection_string)
            .await?;

        Self::new_with_pool(connection_pool, retry, snapshot).await
    }

    /// Create Postgres storage with existing pool
    ///
    /// Migrations will be run
    pub async fn new_with_pool(
        connection_pool: PgPool,
        retry: RetryPolicy,
        snapshot: Snapshot,
    ) -> Result<Self> {
        MIGRATOR.run(&connection_pool).await?;

        Ok(Self {
            connection_pool,
            retry,
            snapshot,
        })
    }

    pub async fn get_by_shortcut(&self, shortcut: &str) -> Result<Link> {
        let link = with_retry("get_by_shortcut", self.retry, || {
            sqlx::query_as::<_, Link>(
                r#"
                SELECT url, shortcut, owner_id, is_deleted
                FROM links
                WHERE shortcut = $1
                "#,
            )
            .bind(shortcut)
            .fetch_optional(&self.connection_pool)
        })
        .await?;

        match link {
            Some(link) if link.is_deleted => Err(Error::Deleted),
            Some(link) => Ok(link),
            None => Err(Error::NotFound),
        }
    }

    pub async fn get_by_full_url(&self, full_url: &str) -> Result<Link> {
        with_retry("get_by_full_url", self.retry, || {
            sqlx::query_as::<_, Link>(
                r#"
                SELECT url, shortcut, owner_id, is_deleted
                FROM links
                WHERE url = $1
                "#,
            )
            .bind(full_url)
            .fetch_optional(&self.connection_pool)
        })
        .await?
        .ok_or(Error::NotFound)
    }

    pub async fn get_by_owner(&self, owner_id: &str) -> Result<Vec<LinkSummary>> {
        with_retry("get_by_owner", self.retry, || {
            sqlx::query_as::<_, LinkSummary>(
                r#"
                SELECT shortcut, url
                FROM links
                WHERE owner_id = $1
                    AND NOT is_deleted
                ORDER BY shortcut
                "#,
            )
            .bind(owner_id)
            .fetch_all(&self.connection_pool)
        })
        .await
    }

    /// Create a link, inside the transaction when one is given
    ///
    /// Within a transaction every insert runs in its own savepoint, a collision only undoes that
    /// single insert. Queries inside a transaction are not retried.
    pub async fn create(
        &self,
        candidate: &NewLink<'_>,
        transaction: Option<&mut Transaction>,
    ) -> Result<(Link, bool)> {
        let row = match transaction {
            Some(transaction) => {
                timeout(
                    self.retry.timeout,
                    create_in_savepoint(candidate, transaction),
                )
                .await
                .map_err(|_| Error::Timeout(self.retry.timeout))??
            }
            None => {
                with_retry("create", self.retry, || {
                    sqlx::query_as::<_, CreatedRow>(CREATE_LINK)
                        .bind(candidate.full_url)
                        .bind(candidate.shortcut)
                        .bind(candidate.owner_id)
                        .fetch_one(&self.connection_pool)
                })
                .await?
            }
        };

        Ok((row.link, row.inserted))
    }

    pub async fn soft_delete(&self, shortcuts: &[String], owner_id: &str) -> Result<()> {
        let result = with_retry("soft_delete", self.retry, || {
            sqlx::query(
                r#"
                UPDATE links
                SET is_deleted = TRUE
                WHERE shortcut = ANY($1)
                    AND owner_id = $2
                "#,
            )
            .bind(shortcuts)
            .bind(owner_id)
            .execute(&self.connection_pool)
        })
        .await?;

        tracing::debug!("Soft-deleted links: {}", result.rows_affected());

        Ok(())
    }

    /// Insert every link of the snapshot that does not conflict with a stored one
    ///
    /// A link the database refuses is logged and skipped, the rest is still restored
    pub async fn load_snapshot(&self) -> Result<()> {
        let links = self.snapshot.read().await?;

        let mut restored = 0;
        let mut skipped = 0;

        for link in &links {
            let inserted = with_retry("restore", self.retry, || {
                sqlx::query_scalar::<_, String>(
                    r#"
                    INSERT INTO links (url, shortcut, owner_id, is_deleted)
                    VALUES ($1, $2, $3, $4)
                    ON CONFLICT DO NOTHING
                    RETURNING shortcut
                    "#,
                )
                .bind(&link.full_url)
                .bind(&link.shortcut)
                .bind(&link.owner_id)
                .bind(link.is_deleted)
                .fetch_optional(&self.connection_pool)
            })
            .await;

            match inserted {
                Ok(Some(_)) => restored += 1,
                Ok(None) => skipped += 1,
                Err(err) => {
                    tracing::warn!("Skipping link `{}` from snapshot: {err}", link.shortcut);
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
        let links = with_retry("save_snapshot", self.retry, || {
            sqlx::query_as::<_, Link>(
                r#"
                SELECT url, shortcut, owner_id, is_deleted
                FROM links
                ORDER BY shortcut
                "#,
            )
            .fetch_all(&self.connection_pool)
        })
        .await?;

        self.snapshot.write(&links).await?;

        tracing::info!("Saved links: {}", links.len());

        Ok(())
    }

    pub async fn begin_transaction(&self) -> Result<Transaction> {
        let inner = timeout(self.retry.timeout, self.connection_pool.begin())
            .await
            .map_err(|_| Error::Timeout(self.retry.timeout))??;

        Ok(Transaction { inner })
    }

    pub async fn ping(&self) -> Result<()> {
        with_retry("ping", self.retry, || {
            sqlx::query("SELECT 1").execute(&self.connection_pool)
        })
        .await?;

        Ok(())
    }
}

/// Insert a link within a savepoint of the transaction
async fn create_in_savepoint(
    candidate: &NewLink<'_>,
    transaction: &mut Transaction,
) -> Result<CreatedRow> {
    let mut savepoint = Acquire::begin(&mut transaction.inner).await?;

    let row = sqlx::query_as::<_, CreatedRow>(CREATE_LINK)
        .bind(candidate.full_url)
        .bind(candidate.shortcut)
        .bind(candidate.owner_id)
        .fetch_one(&mut *savepoint)
        .await?;

    savepoint.commit().await?;

    Ok(row)
}

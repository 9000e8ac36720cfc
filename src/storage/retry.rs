//! Retrying database queries
//!
//! Errors are classified by their Postgres error code, only transient failures are retried

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tokio::time::timeout;

use super::Error;
use super::Result;

/// Whether a failed query is worth another attempt
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Classification {
    /// Connection problems, serialization failures, deadlocks
    Retriable,

    /// Everything else: constraint violations, syntax errors, bad data
    NonRetriable,
}

/// Timeout and retry budget for queries
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one
    pub attempts: u32,

    /// Maximum duration of a single attempt
    pub timeout: Duration,

    /// Pause between attempts, multiplied by the attempt number
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            timeout: Duration::from_secs(5),
            delay: Duration::from_millis(100),
        }
    }
}

/// Classify a `SQLx` error
pub fn classify(err: &sqlx::Error) -> Classification {
    match err {
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut => Classification::Retriable,
        sqlx::Error::Database(db_err) => db_err
            .code()
            .map_or(Classification::NonRetriable, |code| classify_code(&code)),
        _ => Classification::NonRetriable,
    }
}

/// Classify a Postgres error code (SQLSTATE)
///
/// See <https://www.postgresql.org/docs/current/errcodes-appendix.html>
pub fn classify_code(code: &str) -> Classification {
    match code {
        // connection_exception, connection_does_not_exist, connection_failure
        "08000" | "08003" | "08006"
        // transaction_rollback, serialization_failure, deadlock_detected
        | "40000" | "40001" | "40P01"
        // cannot_connect_now
        | "57P03" => Classification::Retriable,
        _ => Classification::NonRetriable,
    }
}

/// Run a query, retrying retriable failures within the budget of the policy
///
/// Every attempt is bound by the timeout of the policy, a timeout is not retried. The last error
/// is returned when the budget runs out.
pub async fn with_retry<T, F, Fut>(operation: &str, policy: RetryPolicy, mut query: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = core::result::Result<T, sqlx::Error>>,
{
    let mut attempt = 1;

    loop {
        let result = timeout(policy.timeout, query())
            .await
            .map_err(|_| Error::Timeout(policy.timeout))?;

        match result {
            Ok(value) => return Ok(value),
            Err(err)
                if classify(&err) == Classification::Retriable && attempt < policy.attempts =>
            {
                tracing::warn!(
                    "Query `{operation}` failed (attempt {attempt}/{}): {err}",
                    policy.attempts
                );

                sleep(policy.delay * attempt).await;
                attempt += 1;
            }
            Err(err) => {
                tracing::debug!("Query `{operation}` failed: {err}");

                return Err(Error::from(err));
            }
        }
    }
}

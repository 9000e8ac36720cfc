//! Configuration
//!
//! Read once from the environment on startup and passed down from there

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use anyhow::Result;
use anyhow::ensure;
use rand::Rng;
use rand::distr::Alphanumeric;

use crate::shortcut;
use crate::storage::DatabaseConfig;
use crate::storage::RetryPolicy;
use crate::storage::StorageConfig;
use crate::utils::env_var;
use crate::utils::env_var_or_else;
use crate::utils::env_var_parse;

const DEFAULT_ADDRESS: &str = "0.0.0.0:8080";
const DEFAULT_STORAGE_PATH: &str = "storage.json";
const DEFAULT_TOKEN_LIFETIME_HOURS: u64 = 24;
const DEFAULT_SNAPSHOT_INTERVAL_SECS: u64 = 60;

/// Length of a generated JWT secret
const GENERATED_SECRET_LENGTH: usize = 32;

/// Application configuration
#[derive(Clone, Debug)]
pub struct Config {
    /// Address to listen on
    pub address: SocketAddr,

    /// Prefix of short URLs, the request host is used when not set
    pub base_url: Option<String>,

    /// Database to use, in-memory when no connection string is set
    pub database: DatabaseConfig,

    /// Path of the snapshot file
    pub storage_path: PathBuf,

    /// Length of generated shortcuts
    pub shortcut_length: usize,

    /// Secret to sign owner tokens with
    pub jwt_secret: String,

    /// How long an owner token stays valid
    pub token_lifetime: Duration,

    /// How often the snapshot is saved, never when `None`
    pub snapshot_interval: Option<Duration>,

    /// Timeout and retry budget for database queries
    pub retry: RetryPolicy,
}

impl Config {
    /// Read the configuration from the environment
    ///
    /// # Errors
    ///
    /// Will return `Err` when a value is set but invalid, or a duration is zero or too large
    pub fn from_env() -> Result<Self> {
        let mut address = env_var_or_else("ADDRESS", || String::from(DEFAULT_ADDRESS))
            .parse::<SocketAddr>()?;

        // optional override of just the port
        if let Some(port) = env_var("PORT") {
            address.set_port(port.parse::<u16>()?);
        }

        let database =
            env_var("DATABASE_URL").map_or(DatabaseConfig::InMemory, DatabaseConfig::Connect);

        let jwt_secret = env_var_or_else("JWT_SECRET", || {
            let jwt_secret = generate_secret();
            tracing::info!("`JWT_SECRET` is not set, generating temporary one: {jwt_secret}");
            jwt_secret
        });

        let default_retry = RetryPolicy::default();
        let query_timeout_secs =
            env_var_parse("QUERY_TIMEOUT_SECS", default_retry.timeout.as_secs())?;
        ensure!(
            query_timeout_secs > 0,
            "`QUERY_TIMEOUT_SECS` must be greater than zero"
        );
        let retry = RetryPolicy {
            attempts: env_var_parse("QUERY_RETRY_ATTEMPTS", default_retry.attempts)?.max(1),
            timeout: Duration::from_secs(query_timeout_secs),
            ..default_retry
        };

        let token_lifetime_hours =
            env_var_parse("TOKEN_LIFETIME_HOURS", DEFAULT_TOKEN_LIFETIME_HOURS)?;
        ensure!(
            token_lifetime_hours > 0,
            "`TOKEN_LIFETIME_HOURS` must be greater than zero"
        );
        let token_lifetime = token_lifetime_hours
            .checked_mul(3600)
            .map(Duration::from_secs)
            .context("`TOKEN_LIFETIME_HOURS` is too large")?;

        let snapshot_interval =
            env_var_parse("SNAPSHOT_INTERVAL_SECS", DEFAULT_SNAPSHOT_INTERVAL_SECS)?;

        Ok(Self {
            address,
            base_url: env_var("BASE_URL"),
            database,
            storage_path: PathBuf::from(env_var_or_else("FILE_STORAGE_PATH", || {
                String::from(DEFAULT_STORAGE_PATH)
            })),
            shortcut_length: env_var_parse("SHORTCUT_LENGTH", shortcut::DEFAULT_LENGTH)?.max(1),
            jwt_secret,
            token_lifetime,
            snapshot_interval: (snapshot_interval > 0)
                .then(|| Duration::from_secs(snapshot_interval)),
            retry,
        })
    }

    /// Storage part of the configuration
    pub fn storage(&self) -> StorageConfig {
        StorageConfig {
            database: self.database.clone(),
            snapshot_path: self.storage_path.clone(),
            retry: self.retry,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            address: SocketAddr::from(([0, 0, 0, 0], 8080)),
            base_url: None,
            database: DatabaseConfig::InMemory,
            storage_path: PathBuf::from(DEFAULT_STORAGE_PATH),
            shortcut_length: shortcut::DEFAULT_LENGTH,
            jwt_secret: generate_secret(),
            token_lifetime: Duration::from_secs(DEFAULT_TOKEN_LIFETIME_HOURS * 3600),
            snapshot_interval: Some(Duration::from_secs(DEFAULT_SNAPSHOT_INTERVAL_SECS)),
            retry: RetryPolicy::default(),
        }
    }
}

/// Generate a random secret
fn generate_secret() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(GENERATED_SECRET_LENGTH)
        .map(char::from)
        .collect()
}

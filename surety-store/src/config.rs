//! Configuration for the ledger store

use crate::types::AccountId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Data directory for RocksDB
    pub data_dir: PathBuf,

    /// Owner identity (operational flag, authorized callers)
    pub owner: AccountId,

    /// Identity of the store itself, published as the data address
    pub store_id: AccountId,

    /// Airline registered (unfunded) when the store is first created
    pub first_airline: Option<AccountId>,

    /// Minimum deposit that funds an airline
    pub minimum_funding: Decimal,

    /// Write mailbox capacity
    pub mailbox_capacity: usize,

    /// RocksDB configuration
    pub rocksdb: RocksDBConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/surety"),
            owner: AccountId::new("owner"),
            store_id: AccountId::new("surety-store"),
            first_airline: None,
            minimum_funding: Decimal::from(10),
            mailbox_capacity: 1000,
            rocksdb: RocksDBConfig::default(),
        }
    }
}

/// RocksDB configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RocksDBConfig {
    /// Write buffer size (MB)
    pub write_buffer_size_mb: usize,

    /// Max write buffers
    pub max_write_buffer_number: i32,

    /// Max background jobs (compaction + flush)
    pub max_background_jobs: i32,

    /// Enable statistics
    pub enable_statistics: bool,
}

impl Default for RocksDBConfig {
    fn default() -> Self {
        Self {
            write_buffer_size_mb: 64,
            max_write_buffer_number: 2,
            max_background_jobs: 2,
            enable_statistics: false,
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(data_dir) = std::env::var("SURETY_DATA_DIR") {
            config.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(owner) = std::env::var("SURETY_OWNER") {
            config.owner = AccountId::new(owner);
        }

        if let Ok(store_id) = std::env::var("SURETY_STORE_ID") {
            config.store_id = AccountId::new(store_id);
        }

        if let Ok(airline) = std::env::var("SURETY_FIRST_AIRLINE") {
            config.first_airline = Some(AccountId::new(airline));
        }

        if let Ok(minimum) = std::env::var("SURETY_MINIMUM_FUNDING") {
            config.minimum_funding = minimum.parse().map_err(|e| {
                crate::Error::Config(format!("Invalid SURETY_MINIMUM_FUNDING: {}", e))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the store cannot run with
    pub fn validate(&self) -> crate::Result<()> {
        if self.owner.is_empty() {
            return Err(crate::Error::Config("owner must not be empty".to_string()));
        }
        if self.store_id.is_empty() {
            return Err(crate::Error::Config("store_id must not be empty".to_string()));
        }
        if self.minimum_funding <= Decimal::ZERO {
            return Err(crate::Error::Config(
                "minimum_funding must be positive".to_string(),
            ));
        }
        if self.mailbox_capacity == 0 {
            return Err(crate::Error::Config(
                "mailbox_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

//! Gateway node configuration and the deployment address record

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use surety_store::{AccountId, Error, Result};

/// Node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Ledger store configuration
    pub store: surety_store::Config,

    /// Identity the gateway uses as a store caller
    pub gateway_id: AccountId,

    /// Identity of the status-report relay (authorized at bootstrap)
    pub oracle_relay: AccountId,

    /// Buffered status requests per slow subscriber
    pub status_request_capacity: usize,

    /// Deployment record settings
    pub deployment: DeploymentConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store: surety_store::Config::default(),
            gateway_id: AccountId::new("gateway"),
            oracle_relay: AccountId::new("oracle-relay"),
            status_request_capacity: 256,
            deployment: DeploymentConfig::default(),
        }
    }
}

/// Where and how to publish the deployment record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentConfig {
    /// Network name used as the record's top-level key
    pub network: String,

    /// Ledger endpoint clients connect to
    pub url: String,

    /// Files the record is written to
    pub output_paths: Vec<PathBuf>,
}

impl Default for DeploymentConfig {
    fn default() -> Self {
        Self {
            network: "localhost".to_string(),
            url: "http://localhost:8545".to_string(),
            output_paths: vec![PathBuf::from("./data/deployment.json")],
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Config {
            store: surety_store::Config::from_env()?,
            ..Default::default()
        };

        if let Ok(id) = std::env::var("SURETY_GATEWAY_ID") {
            config.gateway_id = AccountId::new(id);
        }

        if let Ok(relay) = std::env::var("SURETY_ORACLE_RELAY") {
            config.oracle_relay = AccountId::new(relay);
        }

        if let Ok(url) = std::env::var("SURETY_RPC_URL") {
            config.deployment.url = url;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the node cannot run with
    pub fn validate(&self) -> Result<()> {
        self.store.validate()?;
        if self.gateway_id.is_empty() || self.oracle_relay.is_empty() {
            return Err(Error::Config(
                "gateway_id and oracle_relay must not be empty".to_string(),
            ));
        }
        if self.gateway_id == self.store.owner || self.gateway_id == self.store.store_id {
            return Err(Error::Config(
                "gateway_id must differ from the store owner and store_id".to_string(),
            ));
        }
        if self.status_request_capacity == 0 {
            return Err(Error::Config(
                "status_request_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Addresses published for display and status collaborators
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkAddresses {
    /// Ledger endpoint
    pub url: String,

    /// Store identity
    #[serde(rename = "dataAddress")]
    pub data_address: String,

    /// Gateway identity
    #[serde(rename = "appAddress")]
    pub app_address: String,
}

/// `{ "<network>": { "url", "dataAddress", "appAddress" } }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeploymentRecord(pub BTreeMap<String, NetworkAddresses>);

impl DeploymentRecord {
    /// Record for one network
    pub fn new(network: impl Into<String>, addresses: NetworkAddresses) -> Self {
        let mut networks = BTreeMap::new();
        networks.insert(network.into(), addresses);
        Self(networks)
    }

    /// Addresses for `network`
    pub fn network(&self, network: &str) -> Option<&NetworkAddresses> {
        self.0.get(network)
    }

    /// Pretty JSON
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to encode deployment record: {}", e)))
    }

    /// Write the record to every path, creating parent directories
    pub fn write_all(&self, paths: &[PathBuf]) -> Result<()> {
        let json = self.to_json()?;
        for path in paths {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, &json)?;
            tracing::info!(path = %path.display(), "Deployment record written");
        }
        Ok(())
    }
}

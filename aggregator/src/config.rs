use crate::types::{Address, ChainId};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fs, path::Path, time::Duration};
use thiserror::Error;
use tracing::warn;

/// Default (and minimum) time to collect operator responses for a task.
pub const DEFAULT_OPERATOR_RESPONSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default capacity of a task mailbox.
pub const DEFAULT_MAILBOX_SIZE: usize = 1024;

/// Errors that can occur when loading a [Config].
#[derive(Error, Debug)]
pub enum Error {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("mailbox size must be positive")]
    InvalidMailboxSize,
}

/// Contracts the aggregator reads operator and group state from on a chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainConfig {
    pub rpc_url: String,
    #[serde(with = "address")]
    pub operator_info_provider_address: Address,
    #[serde(with = "address")]
    pub operator_key_manager_address: Address,
    #[serde(with = "address")]
    pub central_scheduler_address: Address,
}

/// Addresses are written as `0x`-prefixed hex.
mod address {
    use crate::types::Address;
    use commonware_utils::{from_hex_formatted, hex};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(address: &Address, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{}", hex(address)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Address, D::Error> {
        let raw = String::deserialize(deserializer)?;
        let bytes = from_hex_formatted(&raw)
            .ok_or_else(|| de::Error::custom(format!("invalid hex: {raw}")))?;
        let bytes: [u8; 20] = bytes
            .try_into()
            .map_err(|_| de::Error::custom(format!("invalid address length: {raw}")))?;
        Ok(Address::new(bytes))
    }
}

/// Configuration for the [crate::Service].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// How long a task collects responses before it is finalized.
    #[serde(default = "default_timeout_ms")]
    pub operator_response_timeout_ms: u64,

    /// Minimum capacity of a task mailbox (raised to the number of registered
    /// operators when that is larger).
    #[serde(default = "default_mailbox_size")]
    pub mailbox_size: usize,

    /// Chains the aggregator accepts requests for.
    #[serde(default)]
    pub chains: BTreeMap<ChainId, ChainConfig>,
}

fn default_timeout_ms() -> u64 {
    DEFAULT_OPERATOR_RESPONSE_TIMEOUT.as_millis() as u64
}

fn default_mailbox_size() -> usize {
    DEFAULT_MAILBOX_SIZE
}

impl Default for Config {
    fn default() -> Self {
        Self {
            operator_response_timeout_ms: default_timeout_ms(),
            mailbox_size: DEFAULT_MAILBOX_SIZE,
            chains: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Reads and validates a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let raw = fs::read_to_string(path)?;
        Self::parse(&raw)
    }

    /// Parses and validates a JSON configuration.
    pub fn parse(raw: &str) -> Result<Self, Error> {
        let config: Self = serde_json::from_str(raw)?;
        config.finalize()
    }

    /// Clamps the response timeout to its minimum and checks the remaining fields.
    pub fn finalize(mut self) -> Result<Self, Error> {
        if self.operator_response_timeout_ms < default_timeout_ms() {
            warn!(
                configured_ms = self.operator_response_timeout_ms,
                minimum_ms = default_timeout_ms(),
                "operator response timeout below minimum, using minimum"
            );
            self.operator_response_timeout_ms = default_timeout_ms();
        }
        if self.mailbox_size == 0 {
            return Err(Error::InvalidMailboxSize);
        }
        Ok(self)
    }

    /// Returns the response timeout, never less than [DEFAULT_OPERATOR_RESPONSE_TIMEOUT].
    pub fn operator_response_timeout(&self) -> Duration {
        Duration::from_millis(self.operator_response_timeout_ms)
            .max(DEFAULT_OPERATOR_RESPONSE_TIMEOUT)
    }
}

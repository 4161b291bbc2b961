//! Service configuration: a JSON file with serde defaults for every field,
//! so an empty `{}` yields a runnable local setup.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use dripgate_dispenser::model::{MintMetadata, StrategyKind};
use dripgate_dispenser::orchestrator::OrchestratorConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("admin_key_hash must be a 64-hex-character blake2 digest")]
    BadAdminHash,
}

/// Names and indices binding the gateway to one concrete runtime. The
/// allowlist lives in a double map keyed by mint id then EVM address; calls
/// are addressed by (pallet index, call index).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    pub allowlist_pallet: String,
    pub allowlist_storage: String,
    pub allowlist_call_index: [u8; 2],
    pub transfer_call_index: [u8; 2],
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            allowlist_pallet: "MintGate".to_owned(),
            allowlist_storage: "EvmAllowlist".to_owned(),
            allowlist_call_index: [60, 0],
            transfer_call_index: [10, 3],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub listen: SocketAddr,
    pub chain_endpoint: String,
    /// Drip amount in base units.
    pub drip_amount: u128,
    pub poll_interval_ms: u64,
    pub submit_patience_secs: u64,
    /// Hex blake2_256 digest of the admin pre-shared key. The admin surface
    /// stays disabled while unset.
    pub admin_key_hash: Option<String>,
    pub chain: ChainConfig,
    pub mints: Vec<MintMetadata>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen: ([0, 0, 0, 0], 8080).into(),
            chain_endpoint: "ws://127.0.0.1:9944".to_owned(),
            drip_amount: 150_000_000_000_000,
            poll_interval_ms: 1_000,
            submit_patience_secs: 120,
            admin_key_hash: None,
            chain: ChainConfig::default(),
            mints: vec![MintMetadata {
                token_type: "BAB".to_owned(),
                mint_id: 1,
                strategy: StrategyKind::Whitelist,
                extra: Default::default(),
            }],
        }
    }
}

impl ServiceConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn orchestrator(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            drip_amount: self.drip_amount,
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            submit_patience: Duration::from_secs(self.submit_patience_secs),
        }
    }

    /// Decoded admin digest, or `None` when the surface is disabled.
    pub fn admin_hash(&self) -> Result<Option<[u8; 32]>, ConfigError> {
        let Some(raw) = &self.admin_key_hash else {
            return Ok(None);
        };
        let bare = raw.strip_prefix("0x").unwrap_or(raw);
        if bare.len() != 64 || !bare.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(ConfigError::BadAdminHash);
        }
        let mut digest = [0u8; 32];
        for (i, chunk) in bare.as_bytes().chunks(2).enumerate() {
            let pair = std::str::from_utf8(chunk).map_err(|_| ConfigError::BadAdminHash)?;
            digest[i] = u8::from_str_radix(pair, 16).map_err(|_| ConfigError::BadAdminHash)?;
        }
        Ok(Some(digest))
    }
}

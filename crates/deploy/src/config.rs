//! Run configuration, prerequisite address sets and the key identifying a run.

use std::path::{Path, PathBuf};

use alloy_core::primitives::Address;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::Url;

use crate::{
    Environment,
    linker::{STRING_HELPERS, TOKEN_LIBRARY},
};

/// The default name for the dmmup configuration file.
pub const CONFIG_FILENAME: &str = "Dmmup.toml";

/// Default time to wait for a transaction receipt.
pub const DEFAULT_RECEIPT_TIMEOUT_SECS: u64 = 120;

/// Token addresses deployed by the upstream stage.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TokenAddresses {
    /// DAI stable asset.
    pub dai: Address,
    /// USDC stable asset.
    pub usdc: Address,
    /// LINK, the oracle fee token.
    pub link: Address,
    /// Wrapped ether.
    pub weth: Address,
}

/// Library addresses deployed by the upstream stage.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LibraryAddresses {
    /// `DmmTokenLibrary`, linked into both factories.
    pub token_library: Address,
    /// `StringHelpers`, linked into the underlying-token valuator.
    pub string_helpers: Address,
}

impl LibraryAddresses {
    /// Look up a library address by its contract name.
    pub fn address_of(&self, library: &str) -> Option<Address> {
        match library {
            TOKEN_LIBRARY => Some(self.token_library),
            STRING_HELPERS => Some(self.string_helpers),
            _ => None,
        }
    }
}

/// Everything the pipeline consumes from the upstream stage.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Prerequisites {
    pub tokens: TokenAddresses,
    pub libraries: LibraryAddresses,
}

/// Configuration of a provisioning run, serializable to/from TOML.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionConfig {
    /// Target environment literal (`LOCAL`, `TESTNET` or `PRODUCTION`).
    ///
    /// Kept as a raw string so that an unknown value surfaces as a configuration error from
    /// the environment policy rather than as a parse failure.
    pub environment: String,
    /// JSON-RPC endpoint of the node that signs for the deployer.
    pub rpc_url: Url,
    /// Unlocked account every transaction is sent from.
    pub deployer: Address,
    /// Directory of truffle build files.
    pub artifacts_dir: PathBuf,
    /// Directory persisted ecosystem states are written to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_dir: Option<PathBuf>,
    /// Maximum time to wait for a transaction receipt, in seconds.
    #[serde(default = "default_receipt_timeout_secs")]
    pub receipt_timeout_secs: u64,
    /// Addresses deployed by the upstream stage.
    pub prerequisites: Prerequisites,
}

fn default_receipt_timeout_secs() -> u64 {
    DEFAULT_RECEIPT_TIMEOUT_SECS
}

impl ProvisionConfig {
    /// Load the configuration from a TOML file, or from `Dmmup.toml` inside a directory.
    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            anyhow::bail!(
                "Configuration file or directory not found: {}",
                path.display()
            );
        }

        let config_path = if path.is_dir() {
            path.join(CONFIG_FILENAME)
        } else {
            path.to_path_buf()
        };

        let content = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config from {}", config_path.display()))?;
        let config: Self =
            toml::from_str(&content).context("Failed to parse config file as TOML")?;
        tracing::info!(path = %config_path.display(), "Configuration loaded");
        Ok(config)
    }

    /// Where persisted states live: the configured directory, or `<data dir>/dmmup`.
    pub fn resolved_state_dir(&self) -> anyhow::Result<PathBuf> {
        match &self.state_dir {
            Some(dir) => Ok(dir.clone()),
            None => dirs::data_dir()
                .map(|dir| dir.join("dmmup"))
                .context("No data directory on this platform, set `state_dir` explicitly"),
        }
    }
}

/// Inputs that identify a provisioning run.
///
/// Two runs with the same key provision the same ecosystem, so a persisted state recorded
/// under that key may be resumed. Any change to these inputs starts a fresh run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunKey {
    pub environment: Environment,
    pub chain_id: u64,
    pub deployer: Address,
    pub prerequisites: Prerequisites,
}

impl RunKey {
    /// Compute a SHA-256 hash of the run inputs, hex encoded.
    pub fn compute_hash(&self) -> String {
        let json = serde_json::to_string(self).expect("RunKey serialization should never fail");

        let mut hasher = Sha256::new();
        hasher.update(json.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Short identifier used in file names.
    pub fn id(&self) -> String {
        self.compute_hash()[..16].to_string()
    }
}

//! Command line interface and configuration layering.

use std::path::{Path, PathBuf};

use alloy_core::primitives::Address;
use anyhow::Context;
use clap::Parser;
use dmm_deploy::{CONFIG_FILENAME, ProvisionConfig};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::Serialize;
use tracing::level_filters::LevelFilter;
use url::Url;

/// Prefix of the environment variables layered over the config file.
pub const ENV_PREFIX: &str = "DMM_";

#[derive(Parser)]
#[command(name = "dmmup")]
#[command(
    author,
    version,
    about = "Provision the DMM contract ecosystem on a running node"
)]
pub struct Cli {
    /// The verbosity level.
    #[arg(short, long, env = "DMM_VERBOSITY", default_value_t = LevelFilter::INFO)]
    pub verbosity: LevelFilter,

    /// Path to the Dmmup.toml configuration file, or to the directory holding it.
    ///
    /// Values from the file are overridden by `DMM_` environment variables (nested keys
    /// separated by `__`, e.g. `DMM_PREREQUISITES__TOKENS__DAI`), then by the flags below.
    #[arg(short, long, alias = "conf", env = "DMM_CONFIG", default_value = CONFIG_FILENAME)]
    pub config: PathBuf,

    /// Target environment: LOCAL, TESTNET or PRODUCTION.
    #[arg(short, long, alias = "env")]
    pub environment: Option<String>,

    /// JSON-RPC endpoint of the node that signs for the deployer.
    #[arg(long, alias = "rpc")]
    pub rpc_url: Option<Url>,

    /// Unlocked account every transaction is sent from.
    #[arg(long)]
    pub deployer: Option<Address>,

    /// Directory of truffle build files.
    #[arg(long, alias = "artifacts")]
    pub artifacts_dir: Option<PathBuf>,

    /// Directory persisted ecosystem states are written to.
    ///
    /// Defaults to `<data dir>/dmmup`.
    #[arg(long)]
    pub state_dir: Option<PathBuf>,

    /// Ignore any persisted state and provision every component again.
    #[arg(long, env = "DMM_FRESH", default_value_t = false)]
    pub fresh: bool,
}

/// Command line values layered last over the config file and environment.
#[derive(Debug, Default, Serialize)]
struct ConfigOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    environment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    rpc_url: Option<Url>,
    #[serde(skip_serializing_if = "Option::is_none")]
    deployer: Option<Address>,
    #[serde(skip_serializing_if = "Option::is_none")]
    artifacts_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    state_dir: Option<PathBuf>,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            environment: self.environment.clone(),
            rpc_url: self.rpc_url.clone(),
            deployer: self.deployer,
            artifacts_dir: self.artifacts_dir.clone(),
            state_dir: self.state_dir.clone(),
        }
    }

    /// Resolve the run configuration from the config file, `DMM_` variables and flags.
    pub fn load_config(&self) -> anyhow::Result<ProvisionConfig> {
        let config_path = config_file(&self.config);

        Figment::new()
            .merge(Toml::file(&config_path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .merge(Serialized::defaults(self.overrides()))
            .extract()
            .with_context(|| {
                format!(
                    "Failed to load configuration (file: {})",
                    config_path.display()
                )
            })
    }
}

fn config_file(path: &Path) -> PathBuf {
    if path.is_dir() {
        path.join(CONFIG_FILENAME)
    } else {
        path.to_path_buf()
    }
}

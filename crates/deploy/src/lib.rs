//! dmm-deploy - Provisioning library for the DMM ecosystem.
//!
//! This crate deploys the DMM contracts in dependency order, links the factory and
//! valuator artifacts to pre-deployed libraries, and runs the environment-specific
//! post-deployment configuration (oracle funding on remote networks, market registration
//! on local ones).
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use dmm_deploy::{ProvisionConfig, Provisioner, RpcBackend, TruffleArtifactResolver};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = ProvisionConfig::load_from_file("Dmmup.toml".as_ref())?;
//! let backend = RpcBackend::new(config.rpc_url.clone(), Duration::from_secs(120))?;
//! let resolver = TruffleArtifactResolver::new(&config.artifacts_dir);
//!
//! let state = Provisioner::new(&resolver, &backend, config.deployer, config.prerequisites)
//!     .provision_ecosystem(&config.environment)
//!     .await?;
//! println!("controller: {:?}", state.controller());
//! # Ok(())
//! # }
//! ```

mod artifact;
pub use artifact::{ArtifactResolver, Bytecode, ContractArtifact, TruffleArtifactResolver};

mod backend;
pub use backend::{
    CallArg, ChainBackend, Receipt, Submission, encode_args, encode_call, method_signature,
};

mod component;
pub use component::Component;

mod config;
pub use config::{
    CONFIG_FILENAME, DEFAULT_RECEIPT_TIMEOUT_SECS, LibraryAddresses, Prerequisites,
    ProvisionConfig, RunKey, TokenAddresses,
};

mod environment;
pub use environment::{Environment, EnvironmentConfig, resolve as resolve_environment};

mod error;
pub use error::{ProvisionError, Result};

pub mod linker;

pub mod markets;
pub use markets::{MarketProvisioner, MarketSpec};

mod orchestrator;
pub use orchestrator::{
    FUNDING_AMOUNT, FUNDING_TRANSFER_BUDGET, ORACLE_REQUEST_BUDGET, ProvisionFailure,
    Provisioner, provision_ecosystem,
};

pub mod plan;
pub use plan::{DeploymentPlan, PlanNode, Step};

pub mod rpc;
pub use rpc::RpcBackend;

mod state;
pub use state::{EcosystemState, RegisteredMarket};

mod store;
pub use store::StateStore;

mod submitter;

pub mod units;

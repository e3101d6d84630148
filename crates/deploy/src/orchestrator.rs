//! Deployment orchestration: runs the provisioning plan step by step against a backend.

use std::collections::HashMap;

use alloy_core::primitives::Address;

use crate::{
    ArtifactResolver, CallArg, ChainBackend, Component, ContractArtifact, EcosystemState,
    Environment, EnvironmentConfig, Prerequisites, ProvisionError, Result, RunKey, StateStore,
    Submission, linker,
    markets::{MarketProvisioner, MarketSpec},
    plan::{DeploymentPlan, Step, deploy_budget},
    submitter::Submitter,
    units,
};

/// Budget of the fee-token transfer to the collateral valuator.
pub const FUNDING_TRANSFER_BUDGET: u64 = 300_000;
/// Budget of the collateral value request.
pub const ORACLE_REQUEST_BUDGET: u64 = 1_000_000;
/// Fee tokens sent to the collateral valuator, in whole tokens.
pub const FUNDING_AMOUNT: u64 = 10;

const FUNDING_TRANSFER_FACT: &str = "oracle-funding";
const ORACLE_REQUEST_FACT: &str = "oracle-request";

/// A failed provisioning run: the first error and everything recorded before it.
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct ProvisionFailure {
    #[source]
    pub error: ProvisionError,
    pub partial: EcosystemState,
}

/// Runs the provisioning pipeline for one deployer account.
pub struct Provisioner<'a, R, B> {
    resolver: &'a R,
    backend: &'a B,
    deployer: Address,
    prerequisites: Prerequisites,
    store: Option<StateStore>,
    fresh: bool,
}

impl<'a, R: ArtifactResolver, B: ChainBackend> Provisioner<'a, R, B> {
    pub fn new(
        resolver: &'a R,
        backend: &'a B,
        deployer: Address,
        prerequisites: Prerequisites,
    ) -> Self {
        Self {
            resolver,
            backend,
            deployer,
            prerequisites,
            store: None,
            fresh: false,
        }
    }

    /// Persist the state after every step and resume from what the store already holds.
    pub fn with_store(mut self, store: StateStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Ignore any persisted state and provision from scratch.
    pub fn fresh(mut self, fresh: bool) -> Self {
        self.fresh = fresh;
        self
    }

    /// The key identifying a run of this provisioner on `chain_id`.
    pub fn run_key(&self, environment: Environment, chain_id: u64) -> RunKey {
        RunKey {
            environment,
            chain_id,
            deployer: self.deployer,
            prerequisites: self.prerequisites.clone(),
        }
    }

    /// Provision the ecosystem for `environment`.
    ///
    /// Resolves to the complete state, or to the first error together with the partially
    /// populated state.
    pub async fn provision_ecosystem(
        self,
        environment: &str,
    ) -> Result<EcosystemState, ProvisionFailure> {
        let mut state = EcosystemState::new();

        match self.run(environment, &mut state).await {
            Ok(()) => Ok(state),
            Err(error) => {
                tracing::warn!(kind = error.kind(), %error, "Provisioning aborted");
                Err(ProvisionFailure {
                    error,
                    partial: state,
                })
            }
        }
    }

    async fn run(&self, environment: &str, state: &mut EcosystemState) -> Result<()> {
        // Unknown environments halt before anything else happens.
        let environment = Environment::resolve(environment)?;
        let env_config = environment.config();

        tracing::info!(
            %environment,
            oracle = %env_config.oracle_endpoint,
            job_id = %env_config.job_id,
            deployer = %self.deployer,
            "Provisioning DMM ecosystem..."
        );

        if let Some(store) = &self.store {
            let chain_id = self.backend.chain_id().await?;
            let expected = self.run_key(environment, chain_id);
            if store.run_key() != &expected {
                return Err(ProvisionError::Store(anyhow::anyhow!(
                    "state store belongs to run {} ({} on chain {}), \
                     this run is {} ({} on chain {})",
                    store.run_key().id(),
                    store.run_key().environment,
                    store.run_key().chain_id,
                    expected.id(),
                    environment,
                    chain_id
                )));
            }

            if self.fresh {
                store.clear()?;
            } else if let Some(persisted) = store.load()? {
                *state = persisted;
            }
        }

        let plan = DeploymentPlan::for_environment(environment);
        let pending: Vec<Step> = plan
            .execution_order()?
            .into_iter()
            .filter(|step| {
                let done = state.is_complete(*step, &MarketSpec::DEFAULT_SYMBOLS);
                if done {
                    tracing::info!(%step, "Already recorded, skipping");
                }
                !done
            })
            .collect();

        if pending.is_empty() {
            tracing::info!("Ecosystem already provisioned");
            return Ok(());
        }

        let mut artifacts = self.prepare_artifacts(&pending).await?;
        let submitter = Submitter::new(self.backend, self.deployer, self.store.as_ref());

        for step in pending {
            match step {
                Step::Deploy(component) => {
                    let artifact = artifacts.remove(&component).ok_or_else(|| {
                        ProvisionError::Plan(format!("no artifact prepared for {component}"))
                    })?;
                    self.deploy_component(
                        &submitter,
                        &plan,
                        component,
                        &artifact,
                        &env_config,
                        state,
                    )
                    .await?;
                }
                Step::FundOracle => self.fund_oracle(&submitter, &env_config, state).await?,
                Step::ProvisionMarkets => {
                    let markets = MarketSpec::defaults(&self.prerequisites.tokens);
                    MarketProvisioner::from_submitter(submitter.clone())
                        .provision(state, &markets)
                        .await?;
                }
            }
            submitter.persist(state)?;
        }

        tracing::info!("Ecosystem provisioned");
        Ok(())
    }

    /// Resolve, detect and link a fresh artifact for every pending deploy step.
    async fn prepare_artifacts(
        &self,
        pending: &[Step],
    ) -> Result<HashMap<Component, ContractArtifact>> {
        let components: Vec<Component> = pending
            .iter()
            .filter_map(|step| match step {
                Step::Deploy(component) => Some(*component),
                _ => None,
            })
            .collect();

        let mut artifacts = HashMap::with_capacity(components.len());
        for component in &components {
            artifacts.insert(*component, self.resolver.resolve(component.artifact_name())?);
        }

        if components.iter().any(Component::requires_network_detection) {
            let chain_id = self.backend.chain_id().await?;
            for (component, artifact) in artifacts.iter_mut() {
                if component.requires_network_detection() {
                    artifact.detect_network(chain_id);
                }
            }
        }

        for (component, artifact) in artifacts.iter_mut() {
            linker::link_component(*component, artifact, &self.prerequisites.libraries)?;
        }

        Ok(artifacts)
    }

    fn constructor_args(
        &self,
        component: Component,
        env_config: &EnvironmentConfig,
        state: &EcosystemState,
    ) -> Result<Vec<CallArg>> {
        let tokens = &self.prerequisites.tokens;
        let step = Step::Deploy(component);

        let args = match component {
            Component::InterestRateModel | Component::TokenFactory | Component::Blacklist => {
                vec![]
            }
            Component::CollateralValuator => vec![
                CallArg::Address(tokens.link),
                CallArg::Uint256(units::tenth()),
                CallArg::Bytes32(env_config.job_id),
            ],
            Component::UnderlyingTokenValuator => vec![
                CallArg::Address(tokens.dai),
                CallArg::Address(tokens.usdc),
            ],
            Component::EtherFactory => vec![CallArg::Address(tokens.weth)],
            Component::Controller => {
                let mut args = Component::CONTROLLER_PREREQUISITES
                    .into_iter()
                    .map(|c| state.require(c, step).map(CallArg::Address))
                    .collect::<Result<Vec<_>>>()?;
                args.extend([
                    // minimum collateralization
                    CallArg::Uint256(units::ONE),
                    // minimum reserve ratio
                    CallArg::Uint256(units::half()),
                    CallArg::Address(tokens.weth),
                ]);
                args
            }
        };

        Ok(args)
    }

    async fn deploy_component(
        &self,
        submitter: &Submitter<'_, B>,
        plan: &DeploymentPlan,
        component: Component,
        artifact: &ContractArtifact,
        env_config: &EnvironmentConfig,
        state: &mut EcosystemState,
    ) -> Result<()> {
        let step = Step::Deploy(component);
        if let Some(node) = plan.node(step) {
            for required in node.required_components() {
                state.require(required, step)?;
            }
        }

        if component.requires_network_detection() && artifact.network_id.is_none() {
            return Err(ProvisionError::Deployment {
                artifact: artifact.name.clone(),
                reason: "network detection has not been performed".to_string(),
            });
        }
        if !artifact.is_linked() {
            return Err(ProvisionError::Deployment {
                artifact: artifact.name.clone(),
                reason: "bytecode has unlinked library placeholders".to_string(),
            });
        }

        let args = self.constructor_args(component, env_config, state)?;
        let budget = deploy_budget(component);

        tracing::info!(%component, artifact = %artifact.name, budget, "Deploying...");
        let submission = Submission::Deploy {
            artifact,
            args: &args,
        };
        let receipt = submitter
            .submit(state, &component.to_string(), submission, budget)
            .await?;
        let address = submission.deployed_address(&receipt)?;
        state.record(component, address)?;
        tracing::info!(%component, %address, "Deployed");

        Ok(())
    }

    async fn fund_oracle(
        &self,
        submitter: &Submitter<'_, B>,
        env_config: &EnvironmentConfig,
        state: &mut EcosystemState,
    ) -> Result<()> {
        let valuator = state.require(Component::CollateralValuator, Step::FundOracle)?;
        let link = self.prerequisites.tokens.link;

        if state.funding_transfer().is_none() {
            tracing::info!(%valuator, amount = FUNDING_AMOUNT, "Sending LINK to collateral valuator");
            let args = [
                CallArg::Address(valuator),
                CallArg::Uint256(units::whole(FUNDING_AMOUNT)),
            ];
            let receipt = submitter
                .submit(
                    state,
                    FUNDING_TRANSFER_FACT,
                    Submission::Call {
                        contract: link,
                        method: "transfer",
                        args: &args,
                    },
                    FUNDING_TRANSFER_BUDGET,
                )
                .await?;
            state.record_funding_transfer(receipt.tx_hash)?;
            submitter.persist(state)?;
        }

        if state.oracle_request().is_none() {
            tracing::info!(oracle = %env_config.oracle_endpoint, "Sending oracle request");
            let args = [CallArg::Address(env_config.oracle_endpoint)];
            let receipt = submitter
                .submit(
                    state,
                    ORACLE_REQUEST_FACT,
                    Submission::Call {
                        contract: valuator,
                        method: "getCollateralValue",
                        args: &args,
                    },
                    ORACLE_REQUEST_BUDGET,
                )
                .await?;
            state.record_oracle_request(receipt.tx_hash)?;
        }

        Ok(())
    }
}

/// Provision the ecosystem without persistence.
///
/// Resolves on full success or fails with the first error encountered, carrying the
/// partially populated state.
pub async fn provision_ecosystem<R: ArtifactResolver, B: ChainBackend>(
    resolver: &R,
    backend: &B,
    environment: &str,
    deployer: Address,
    prerequisites: Prerequisites,
) -> Result<EcosystemState, ProvisionFailure> {
    Provisioner::new(resolver, backend, deployer, prerequisites)
        .provision_ecosystem(environment)
        .await
}

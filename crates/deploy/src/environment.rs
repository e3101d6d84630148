//! Environment policy: maps the target environment to its oracle configuration and
//! decides which conditional steps of the pipeline run.

use alloy_core::primitives::{Address, B256, address, b256};
use serde::{Deserialize, Serialize};

use crate::{ProvisionError, Result};

/// Oracle endpoint used on the test network.
const TESTNET_ORACLE: Address = address!("7AFe1118Ea78C1eae84ca8feE5C65Bc76CcF879e");
/// Oracle job identifier used on the test network.
const TESTNET_JOB_ID: B256 =
    b256!("00000000000000000000000000000000d4b380b30cb64722b8843ead232985c3");

/// Target environment of a provisioning run.
///
/// Parsing is case-sensitive: only `LOCAL`, `TESTNET` and `PRODUCTION` are accepted.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Environment {
    Local,
    Testnet,
    Production,
}

/// Oracle settings resolved for an environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    /// Address of the oracle the collateral valuator queries.
    pub oracle_endpoint: Address,
    /// Job identifier passed to the collateral valuator constructor.
    pub job_id: B256,
}

impl Environment {
    /// Resolve an environment literal, failing with a configuration error on anything else.
    pub fn resolve(value: &str) -> Result<Self> {
        value
            .parse()
            .map_err(|_| ProvisionError::Configuration(value.to_string()))
    }

    /// The oracle endpoint and job identifier for this environment.
    pub fn config(&self) -> EnvironmentConfig {
        match self {
            Environment::Local | Environment::Production => EnvironmentConfig {
                oracle_endpoint: Address::ZERO,
                job_id: B256::ZERO,
            },
            Environment::Testnet => EnvironmentConfig {
                oracle_endpoint: TESTNET_ORACLE,
                job_id: TESTNET_JOB_ID,
            },
        }
    }

    /// Whether the collateral valuator is funded and queried after deployment.
    pub fn runs_oracle_funding(&self) -> bool {
        matches!(self, Environment::Testnet | Environment::Production)
    }

    /// Whether the default markets are registered with the controller.
    pub fn runs_market_provisioning(&self) -> bool {
        matches!(self, Environment::Local)
    }
}

/// Resolve an environment literal to its `(oracle_endpoint, job_id)` pair.
pub fn resolve(value: &str) -> Result<(Address, B256)> {
    let config = Environment::resolve(value)?.config();
    Ok((config.oracle_endpoint, config.job_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_known_environments() {
        assert_eq!(Environment::resolve("LOCAL").unwrap(), Environment::Local);
        assert_eq!(Environment::resolve("TESTNET").unwrap(), Environment::Testnet);
        assert_eq!(
            Environment::resolve("PRODUCTION").unwrap(),
            Environment::Production
        );
    }

    #[test]
    fn test_resolve_is_case_sensitive() {
        for value in ["local", "Testnet", "production", "", "STAGING", " LOCAL"] {
            let err = Environment::resolve(value).unwrap_err();
            assert!(
                matches!(err, ProvisionError::Configuration(ref found) if found == value),
                "expected configuration error for {value:?}, got {err:?}"
            );
        }
    }

    #[test]
    fn test_oracle_configuration_is_deterministic() {
        assert_eq!(resolve("LOCAL").unwrap(), (Address::ZERO, B256::ZERO));
        assert_eq!(resolve("PRODUCTION").unwrap(), (Address::ZERO, B256::ZERO));

        let (oracle, job_id) = resolve("TESTNET").unwrap();
        assert_eq!(
            oracle,
            "0x7AFe1118Ea78C1eae84ca8feE5C65Bc76CcF879e"
                .parse::<Address>()
                .unwrap()
        );
        assert_eq!(
            job_id,
            "0x00000000000000000000000000000000d4b380b30cb64722b8843ead232985c3"
                .parse::<B256>()
                .unwrap()
        );
        assert_eq!(resolve("TESTNET").unwrap(), (oracle, job_id));
    }

    #[test]
    fn test_conditional_step_gates() {
        assert!(Environment::Local.runs_market_provisioning());
        assert!(!Environment::Local.runs_oracle_funding());

        for env in [Environment::Testnet, Environment::Production] {
            assert!(env.runs_oracle_funding());
            assert!(!env.runs_market_provisioning());
        }
    }

    #[test]
    fn test_display_round_trips_literal() {
        assert_eq!(Environment::Testnet.to_string(), "TESTNET");
        assert_eq!(
            Environment::resolve(&Environment::Production.to_string()).unwrap(),
            Environment::Production
        );
    }
}

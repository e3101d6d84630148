//! The write-once record of everything a provisioning run has produced.

use std::collections::BTreeMap;

use alloy_core::primitives::{Address, B256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Component, ProvisionError, Result, plan::Step};

/// A market registered with the controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredMarket {
    pub symbol: String,
    pub underlying: Address,
    pub tx_hash: B256,
}

/// Additive record of resolved component addresses and completed post-deploy calls.
///
/// Created empty at run start and populated as each step succeeds. Recorded facts are never
/// overwritten or removed; an attempt to record a fact twice fails with
/// [`ProvisionError::StateConflict`].
///
/// Transactions that were sent but not yet confirmed are journaled separately as pending,
/// keyed by the fact they will establish, and dropped once the outcome is known.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EcosystemState {
    addresses: BTreeMap<Component, Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    funding_transfer: Option<B256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    oracle_request: Option<B256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ownership_transfer: Option<B256>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    markets: Vec<RegisteredMarket>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pending: BTreeMap<String, B256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    updated_at: Option<DateTime<Utc>>,
}

fn write_once<T: Copy + ToString>(slot: &mut Option<T>, value: T, fact: &str) -> Result<()> {
    if let Some(existing) = slot {
        return Err(ProvisionError::StateConflict {
            fact: fact.to_string(),
            existing: existing.to_string(),
        });
    }
    *slot = Some(value);
    Ok(())
}

impl EcosystemState {
    /// An empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the address of a freshly deployed component.
    pub fn record(&mut self, component: Component, address: Address) -> Result<()> {
        if let Some(existing) = self.addresses.get(&component) {
            return Err(ProvisionError::StateConflict {
                fact: component.to_string(),
                existing: existing.to_string(),
            });
        }
        self.addresses.insert(component, address);
        self.touch();
        Ok(())
    }

    /// The address of a component, if it has been deployed.
    pub fn address(&self, component: Component) -> Option<Address> {
        self.addresses.get(&component).copied()
    }

    /// The address of a component that `step` depends on.
    pub fn require(&self, component: Component, step: Step) -> Result<Address> {
        self.address(component)
            .ok_or_else(|| ProvisionError::MissingDependency {
                step: step.to_string(),
                missing: component,
            })
    }

    /// Every recorded address, in dependency order.
    pub fn addresses(&self) -> impl Iterator<Item = (Component, Address)> + '_ {
        self.addresses.iter().map(|(c, a)| (*c, *a))
    }

    pub fn interest_rate_model(&self) -> Option<Address> {
        self.address(Component::InterestRateModel)
    }

    pub fn collateral_valuator(&self) -> Option<Address> {
        self.address(Component::CollateralValuator)
    }

    pub fn underlying_token_valuator(&self) -> Option<Address> {
        self.address(Component::UnderlyingTokenValuator)
    }

    pub fn ether_factory(&self) -> Option<Address> {
        self.address(Component::EtherFactory)
    }

    pub fn token_factory(&self) -> Option<Address> {
        self.address(Component::TokenFactory)
    }

    pub fn blacklist(&self) -> Option<Address> {
        self.address(Component::Blacklist)
    }

    pub fn controller(&self) -> Option<Address> {
        self.address(Component::Controller)
    }

    pub fn record_funding_transfer(&mut self, tx_hash: B256) -> Result<()> {
        write_once(&mut self.funding_transfer, tx_hash, "funding-transfer")?;
        self.touch();
        Ok(())
    }

    pub fn funding_transfer(&self) -> Option<B256> {
        self.funding_transfer
    }

    pub fn record_oracle_request(&mut self, tx_hash: B256) -> Result<()> {
        write_once(&mut self.oracle_request, tx_hash, "oracle-request")?;
        self.touch();
        Ok(())
    }

    pub fn oracle_request(&self) -> Option<B256> {
        self.oracle_request
    }

    pub fn record_ownership_transfer(&mut self, tx_hash: B256) -> Result<()> {
        write_once(&mut self.ownership_transfer, tx_hash, "ownership-transfer")?;
        self.touch();
        Ok(())
    }

    /// Whether token factory ownership has been handed to the controller.
    pub fn ownership_transferred(&self) -> bool {
        self.ownership_transfer.is_some()
    }

    pub fn record_market(&mut self, market: RegisteredMarket) -> Result<()> {
        if let Some(existing) = self.market(&market.symbol) {
            return Err(ProvisionError::StateConflict {
                fact: format!("market {}", market.symbol),
                existing: existing.tx_hash.to_string(),
            });
        }
        self.markets.push(market);
        self.touch();
        Ok(())
    }

    pub fn market(&self, symbol: &str) -> Option<&RegisteredMarket> {
        self.markets.iter().find(|m| m.symbol == symbol)
    }

    /// Registered markets, in registration order.
    pub fn markets(&self) -> &[RegisteredMarket] {
        &self.markets
    }

    /// When the state last changed.
    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    /// The transaction sent for `fact` whose outcome is not known yet.
    pub fn pending(&self, fact: &str) -> Option<B256> {
        self.pending.get(fact).copied()
    }

    /// Journal a sent transaction before waiting for it.
    pub fn record_pending(&mut self, fact: &str, tx_hash: B256) -> Result<()> {
        if let Some(existing) = self.pending.get(fact) {
            return Err(ProvisionError::StateConflict {
                fact: format!("pending {fact}"),
                existing: existing.to_string(),
            });
        }
        self.pending.insert(fact.to_string(), tx_hash);
        self.touch();
        Ok(())
    }

    /// Forget the pending transaction of `fact` once it is confirmed or rejected.
    pub fn clear_pending(&mut self, fact: &str) {
        if self.pending.remove(fact).is_some() {
            self.touch();
        }
    }

    /// Whether a step has nothing left to do.
    pub fn is_complete(&self, step: Step, market_symbols: &[&str]) -> bool {
        match step {
            Step::Deploy(component) => self.addresses.contains_key(&component),
            Step::FundOracle => self.funding_transfer.is_some() && self.oracle_request.is_some(),
            Step::ProvisionMarkets => {
                self.ownership_transferred()
                    && market_symbols.iter().all(|s| self.market(s).is_some())
            }
        }
    }

    fn touch(&mut self) {
        self.updated_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_state_is_empty() {
        let state = EcosystemState::new();
        assert_eq!(state.addresses().count(), 0);
        assert!(state.controller().is_none());
        assert!(!state.ownership_transferred());
        assert!(state.updated_at().is_none());
    }

    #[test]
    fn test_record_is_write_once() {
        let mut state = EcosystemState::new();
        let first = Address::with_last_byte(1);
        state.record(Component::Blacklist, first).unwrap();

        let err = state
            .record(Component::Blacklist, Address::with_last_byte(2))
            .unwrap_err();
        assert!(matches!(err, ProvisionError::StateConflict { .. }));
        assert_eq!(state.blacklist(), Some(first));
        assert!(state.updated_at().is_some());
    }

    #[test]
    fn test_require_reports_missing_component() {
        let state = EcosystemState::new();
        let err = state
            .require(Component::TokenFactory, Step::Deploy(Component::Controller))
            .unwrap_err();
        assert!(matches!(
            err,
            ProvisionError::MissingDependency {
                missing: Component::TokenFactory,
                ..
            }
        ));
    }

    #[test]
    fn test_post_deploy_facts_are_write_once() {
        let mut state = EcosystemState::new();
        state.record_funding_transfer(B256::with_last_byte(1)).unwrap();
        assert!(state.record_funding_transfer(B256::with_last_byte(2)).is_err());
        assert!(!state.is_complete(Step::FundOracle, &[]));

        state.record_oracle_request(B256::with_last_byte(3)).unwrap();
        assert!(state.is_complete(Step::FundOracle, &[]));

        state.record_ownership_transfer(B256::with_last_byte(4)).unwrap();
        assert!(state.record_ownership_transfer(B256::with_last_byte(5)).is_err());
    }

    #[test]
    fn test_market_completion() {
        let mut state = EcosystemState::new();
        let market = RegisteredMarket {
            symbol: "mDAI".to_string(),
            underlying: Address::with_last_byte(1),
            tx_hash: B256::with_last_byte(1),
        };

        state.record_ownership_transfer(B256::with_last_byte(9)).unwrap();
        state.record_market(market.clone()).unwrap();
        assert!(state.record_market(market).is_err());

        assert!(state.is_complete(Step::ProvisionMarkets, &["mDAI"]));
        assert!(!state.is_complete(Step::ProvisionMarkets, &["mDAI", "mUSDC"]));
    }

    #[test]
    fn test_pending_transactions() {
        let mut state = EcosystemState::new();
        assert!(state.pending("oracle-funding").is_none());

        state
            .record_pending("oracle-funding", B256::with_last_byte(1))
            .unwrap();
        assert!(
            state
                .record_pending("oracle-funding", B256::with_last_byte(2))
                .is_err()
        );
        assert_eq!(state.pending("oracle-funding"), Some(B256::with_last_byte(1)));

        let json = serde_json::to_value(&state).unwrap();
        assert!(json["pending"]["oracle-funding"].is_string());

        state.clear_pending("oracle-funding");
        assert!(state.pending("oracle-funding").is_none());
        assert!(serde_json::to_value(&state).unwrap().get("pending").is_none());
    }

    #[test]
    fn test_state_json_uses_component_names() {
        let mut state = EcosystemState::new();
        state
            .record(Component::InterestRateModel, Address::with_last_byte(1))
            .unwrap();

        let json = serde_json::to_value(&state).unwrap();
        assert!(json["addresses"]["interest-rate-model"].is_string());

        let back: EcosystemState = serde_json::from_value(json).unwrap();
        assert_eq!(back, state);
    }
}

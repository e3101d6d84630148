//! Market provisioning: hands the token factory to the controller and registers the
//! default markets.

use alloy_core::primitives::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::{
    CallArg, ChainBackend, Component, EcosystemState, ProvisionError, Result, Submission,
    TokenAddresses, plan::Step, state::RegisteredMarket, submitter::Submitter, units,
};

/// Budget of the ownership transfer call.
pub const TRANSFER_OWNERSHIP_BUDGET: u64 = 300_000;
/// Budget of each market registration call.
pub const ADD_MARKET_BUDGET: u64 = 6_000_000;

/// Parameters of a market registered with the controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketSpec {
    pub underlying: Address,
    pub symbol: String,
    pub name: String,
    pub decimals: u8,
    pub min_deposit: U256,
    pub max_deposit: U256,
    pub total_supply_cap: U256,
}

impl MarketSpec {
    /// The markets registered on a local network, in registration order.
    pub fn defaults(tokens: &TokenAddresses) -> [MarketSpec; 2] {
        [
            MarketSpec {
                underlying: tokens.dai,
                symbol: "mDAI".to_string(),
                name: "DMM: DAI".to_string(),
                decimals: 18,
                min_deposit: units::tenth(),
                max_deposit: units::tenth(),
                total_supply_cap: units::whole(100),
            },
            MarketSpec {
                underlying: tokens.usdc,
                symbol: "mUSDC".to_string(),
                name: "DMM: USDC".to_string(),
                decimals: 6,
                min_deposit: U256::from(100_000u64),
                max_deposit: U256::from(100_000u64),
                total_supply_cap: U256::from(100_000_000u64),
            },
        ]
    }

    /// Symbols of the default markets, in registration order.
    pub const DEFAULT_SYMBOLS: [&'static str; 2] = ["mDAI", "mUSDC"];

    /// Arguments of `addMarket`.
    pub fn to_args(&self) -> Vec<CallArg> {
        vec![
            CallArg::Address(self.underlying),
            CallArg::String(self.symbol.clone()),
            CallArg::String(self.name.clone()),
            CallArg::Uint8(self.decimals),
            CallArg::Uint256(self.min_deposit),
            CallArg::Uint256(self.max_deposit),
            CallArg::Uint256(self.total_supply_cap),
        ]
    }
}

/// State key of the ownership transfer transaction.
const OWNERSHIP_TRANSFER_FACT: &str = "ownership-transfer";

/// Registers markets with the controller once it owns the token factory.
pub struct MarketProvisioner<'a, B> {
    submitter: Submitter<'a, B>,
}

impl<'a, B: ChainBackend> MarketProvisioner<'a, B> {
    pub fn new(backend: &'a B, deployer: Address) -> Self {
        Self {
            submitter: Submitter::new(backend, deployer, None),
        }
    }

    pub(crate) fn from_submitter(submitter: Submitter<'a, B>) -> Self {
        Self { submitter }
    }

    /// Transfer token factory ownership to the controller, unless already recorded.
    pub async fn transfer_factory_ownership(&self, state: &mut EcosystemState) -> Result<()> {
        if state.ownership_transferred() {
            tracing::info!("Token factory already owned by the controller, skipping transfer");
            return Ok(());
        }

        let step = Step::ProvisionMarkets;
        let factory = state.require(Component::TokenFactory, step)?;
        let controller = state.require(Component::Controller, step)?;

        tracing::info!(%factory, %controller, "Transferring token factory ownership to controller...");
        let args = [CallArg::Address(controller)];
        let receipt = self
            .submitter
            .submit(
                state,
                OWNERSHIP_TRANSFER_FACT,
                Submission::Call {
                    contract: factory,
                    method: "transferOwnership",
                    args: &args,
                },
                TRANSFER_OWNERSHIP_BUDGET,
            )
            .await?;

        state.record_ownership_transfer(receipt.tx_hash)?;
        self.submitter.persist(state)
    }

    /// Register one market. Requires the ownership transfer to be recorded first.
    pub async fn register_market(
        &self,
        state: &mut EcosystemState,
        market: &MarketSpec,
    ) -> Result<()> {
        if state.market(&market.symbol).is_some() {
            tracing::info!(symbol = %market.symbol, "Market already registered, skipping");
            return Ok(());
        }

        let controller = state.require(Component::Controller, Step::ProvisionMarkets)?;
        if !state.ownership_transferred() {
            return Err(ProvisionError::Authorization {
                contract: controller,
                method: "addMarket".to_string(),
                reason: "token factory ownership has not been transferred to the controller"
                    .to_string(),
            });
        }

        tracing::info!(
            symbol = %market.symbol,
            underlying = %market.underlying,
            decimals = market.decimals,
            "Registering market..."
        );
        let args = market.to_args();
        let receipt = self
            .submitter
            .submit(
                state,
                &format!("market {}", market.symbol),
                Submission::Call {
                    contract: controller,
                    method: "addMarket",
                    args: &args,
                },
                ADD_MARKET_BUDGET,
            )
            .await?;

        state.record_market(RegisteredMarket {
            symbol: market.symbol.clone(),
            underlying: market.underlying,
            tx_hash: receipt.tx_hash,
        })?;
        self.submitter.persist(state)
    }

    /// Transfer ownership, then register every market in order.
    pub async fn provision(&self, state: &mut EcosystemState, markets: &[MarketSpec]) -> Result<()> {
        self.transfer_factory_ownership(state).await?;
        for market in markets {
            self.register_market(state, market).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens() -> TokenAddresses {
        TokenAddresses {
            dai: Address::with_last_byte(1),
            usdc: Address::with_last_byte(2),
            link: Address::with_last_byte(3),
            weth: Address::with_last_byte(4),
        }
    }

    #[test]
    fn test_default_markets_are_literal() {
        let [dai, usdc] = MarketSpec::defaults(&tokens());

        assert_eq!(dai.symbol, "mDAI");
        assert_eq!(dai.name, "DMM: DAI");
        assert_eq!(dai.underlying, tokens().dai);
        assert_eq!(dai.decimals, 18);
        assert_eq!(dai.min_deposit, U256::from(100_000_000_000_000_000u128));
        assert_eq!(dai.max_deposit, U256::from(100_000_000_000_000_000u128));
        assert_eq!(dai.total_supply_cap, U256::from(100_000_000_000_000_000_000u128));

        assert_eq!(usdc.symbol, "mUSDC");
        assert_eq!(usdc.name, "DMM: USDC");
        assert_eq!(usdc.underlying, tokens().usdc);
        assert_eq!(usdc.decimals, 6);
        assert_eq!(usdc.min_deposit, U256::from(100_000u64));
        assert_eq!(usdc.max_deposit, U256::from(100_000u64));
        assert_eq!(usdc.total_supply_cap, U256::from(100_000_000u64));

        assert_eq!(MarketSpec::DEFAULT_SYMBOLS, [dai.symbol.as_str(), usdc.symbol.as_str()]);
    }

    #[test]
    fn test_add_market_args() {
        let [dai, _] = MarketSpec::defaults(&tokens());
        let args = dai.to_args();

        assert_eq!(
            crate::backend::method_signature("addMarket", &args),
            "addMarket(address,string,string,uint8,uint256,uint256,uint256)"
        );
        assert_eq!(args[3], CallArg::Uint8(18));
    }
}

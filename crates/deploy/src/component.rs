//! The on-chain components provisioned by the pipeline.

use serde::{Deserialize, Serialize};

/// A deployable component of the DMM ecosystem.
///
/// Variants are declared in dependency order, leaves first.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumIter,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum Component {
    InterestRateModel,
    CollateralValuator,
    UnderlyingTokenValuator,
    EtherFactory,
    TokenFactory,
    Blacklist,
    Controller,
}

impl Component {
    /// Every component whose address the controller takes as a constructor argument.
    pub const CONTROLLER_PREREQUISITES: [Component; 6] = [
        Component::InterestRateModel,
        Component::CollateralValuator,
        Component::UnderlyingTokenValuator,
        Component::EtherFactory,
        Component::TokenFactory,
        Component::Blacklist,
    ];

    /// Name of the compiled artifact backing this component.
    pub fn artifact_name(&self) -> &'static str {
        match self {
            Component::InterestRateModel => "InterestRateImplV1",
            Component::CollateralValuator => "ChainlinkCollateralValuator",
            Component::UnderlyingTokenValuator => "UnderlyingTokenValuatorImplV1",
            Component::EtherFactory => "DmmEtherFactory",
            Component::TokenFactory => "DmmTokenFactory",
            Component::Blacklist => "DmmBlacklistable",
            Component::Controller => "DmmController",
        }
    }

    /// Whether the artifact needs per-network address detection before deployment.
    pub fn requires_network_detection(&self) -> bool {
        matches!(
            self,
            Component::UnderlyingTokenValuator | Component::EtherFactory | Component::TokenFactory
        )
    }
}

//! Table rendering of an ecosystem state.

use comfy_table::{Table, presets::UTF8_FULL};
use dmm_deploy::{Component, EcosystemState};
use strum::IntoEnumIterator;

/// Render the deployed components and post-deployment facts of a state.
pub fn ecosystem_table(state: &EcosystemState) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_header(vec!["Component", "Artifact", "Address / Tx"]);

    for component in Component::iter() {
        let value = state
            .address(component)
            .map(|address| address.to_string())
            .unwrap_or_else(|| "-".to_string());
        table.add_row(vec![
            component.to_string(),
            component.artifact_name().to_string(),
            value,
        ]);
    }

    if let Some(tx_hash) = state.funding_transfer() {
        table.add_row(vec![
            "oracle-funding".to_string(),
            "transfer".to_string(),
            tx_hash.to_string(),
        ]);
    }
    if let Some(tx_hash) = state.oracle_request() {
        table.add_row(vec![
            "oracle-request".to_string(),
            "getCollateralValue".to_string(),
            tx_hash.to_string(),
        ]);
    }
    for market in state.markets() {
        table.add_row(vec![
            format!("market {}", market.symbol),
            "addMarket".to_string(),
            market.tx_hash.to_string(),
        ]);
    }

    table
}

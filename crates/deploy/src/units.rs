//! Fixed-point token amounts with 18 decimals.

use alloy_core::primitives::U256;

/// One whole token in base units.
pub const ONE: U256 = U256::from_limbs([1_000_000_000_000_000_000, 0, 0, 0]);

/// `n` whole tokens.
pub fn whole(n: u64) -> U256 {
    ONE * U256::from(n)
}

/// 0.1 tokens.
pub fn tenth() -> U256 {
    ONE / U256::from(10u64)
}

/// 0.5 tokens.
pub fn half() -> U256 {
    ONE / U256::from(2u64)
}

//! Fixed-point math for the pricing core.
//!
//! All prices are square roots of the asset-1/asset-0 ratio in Q64.96, all
//! fee growth accumulators are Q128.128, and every multiplication/division
//! that could lose precision routes through [`full_math`].
use alloy_primitives::U256;

pub mod full_math;
pub mod liquidity_math;
pub mod sqrt_price_math;
pub mod swap_math;
pub mod tick_math;

/// 2^96, the Q64.96 scaling factor.
pub const Q96: U256 = U256::from_limbs([0, 4294967296, 0, 0]);

/// 2^128, the Q128.128 scaling factor for fee growth accumulators.
pub const Q128: U256 = U256::from_limbs([0, 0, 1, 0]);

/// Number of fractional bits in a Q64.96 sqrt price.
pub const RESOLUTION: usize = 96;

/// Fee denominator: fees are expressed in hundredths of a basis point.
pub const FEE_PIPS_DENOMINATOR: u32 = 1_000_000;

//! Single step of the swap loop.
//!
//! Computes how far price can move toward a target before the remaining
//! specified amount is exhausted, and the input, output and fee amounts of
//! that movement. The caller has already clamped the target to the nearer
//! of the next active tick and the user's price limit.
use alloy_primitives::{I256, U256};

use crate::{
    errors::EngineError,
    maths::{
        full_math::{mul_div, mul_div_rounding_up},
        sqrt_price_math, FEE_PIPS_DENOMINATOR,
    },
    safe_math::safe_sub_u256,
};

/// One price-curve step.
///
/// `amount_remaining > 0` means exact input (fee taken from the input),
/// negative means exact output. Returns
/// `(sqrt_price_next, amount_in, amount_out, fee_amount)`.
///
/// With zero in-range liquidity the price jumps straight to the target and
/// no amounts or fees accrue; the gap costs the trader nothing.
pub fn compute_swap_step(
    sqrt_price_current: U256,
    sqrt_price_target: U256,
    liquidity: u128,
    amount_remaining: I256,
    fee_pips: u32,
) -> Result<(U256, U256, U256, U256), EngineError> {
    if liquidity == 0 {
        return Ok((sqrt_price_target, U256::ZERO, U256::ZERO, U256::ZERO));
    }

    let zero_for_one = sqrt_price_current >= sqrt_price_target;
    let exact_in = amount_remaining >= I256::ZERO;
    let sqrt_price_next;
    let mut amount_in = U256::ZERO;
    let mut amount_out = U256::ZERO;

    if exact_in {
        let amount_remaining_less_fee = mul_div(
            amount_remaining.into_raw(),
            U256::from(FEE_PIPS_DENOMINATOR - fee_pips),
            U256::from(FEE_PIPS_DENOMINATOR),
        )?;
        amount_in = if zero_for_one {
            sqrt_price_math::amount0_delta(sqrt_price_target, sqrt_price_current, liquidity, true)?
        } else {
            sqrt_price_math::amount1_delta(sqrt_price_current, sqrt_price_target, liquidity, true)?
        };
        sqrt_price_next = if amount_remaining_less_fee >= amount_in {
            sqrt_price_target
        } else {
            sqrt_price_math::next_sqrt_price_from_input(
                sqrt_price_current,
                liquidity,
                amount_remaining_less_fee,
                zero_for_one,
            )?
        };
    } else {
        amount_out = if zero_for_one {
            sqrt_price_math::amount1_delta(sqrt_price_target, sqrt_price_current, liquidity, false)?
        } else {
            sqrt_price_math::amount0_delta(sqrt_price_current, sqrt_price_target, liquidity, false)?
        };
        sqrt_price_next = if amount_remaining.unsigned_abs() > amount_out {
            sqrt_price_target
        } else {
            sqrt_price_math::next_sqrt_price_from_output(
                sqrt_price_current,
                liquidity,
                amount_remaining.unsigned_abs(),
                zero_for_one,
            )?
        };
    }

    let reached_target = sqrt_price_target == sqrt_price_next;

    if zero_for_one {
        if !(reached_target && exact_in) {
            amount_in = sqrt_price_math::amount0_delta(
                sqrt_price_next,
                sqrt_price_current,
                liquidity,
                true,
            )?;
        }
        if !(reached_target && !exact_in) {
            amount_out = sqrt_price_math::amount1_delta(
                sqrt_price_next,
                sqrt_price_current,
                liquidity,
                false,
            )?;
        }
    } else {
        if !(reached_target && exact_in) {
            amount_in = sqrt_price_math::amount1_delta(
                sqrt_price_current,
                sqrt_price_next,
                liquidity,
                true,
            )?;
        }
        if !(reached_target && !exact_in) {
            amount_out = sqrt_price_math::amount0_delta(
                sqrt_price_current,
                sqrt_price_next,
                liquidity,
                false,
            )?;
        }
    }

    // exact output never pays out more than requested, even if rounding
    // said otherwise
    if !exact_in && amount_out > amount_remaining.unsigned_abs() {
        amount_out = amount_remaining.unsigned_abs();
    }

    let fee_amount = if exact_in && sqrt_price_next != sqrt_price_target {
        // the step stopped short: everything left of the input is fee
        safe_sub_u256(amount_remaining.into_raw(), amount_in)?
    } else {
        mul_div_rounding_up(
            amount_in,
            U256::from(fee_pips),
            U256::from(FEE_PIPS_DENOMINATOR - fee_pips),
        )?
    };

    Ok((sqrt_price_next, amount_in, amount_out, fee_amount))
}

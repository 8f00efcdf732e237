//! Price/amount algebra on Q64.96 sqrt prices.
//!
//! Given a current price, available liquidity and a token amount these
//! functions compute the next price, and given a price interval and a
//! liquidity they compute the token amounts spanning it. Rounding is
//! always conservative for the pool: a swapper never receives more than
//! entitled, a liquidity provider never owes less than required.
use alloy_primitives::{I256, U256};

use crate::{
    errors::EngineError,
    maths::{
        full_math::{div_rounding_up, mul_div, mul_div_rounding_up},
        Q96, RESOLUTION,
    },
    safe_math::{safe_add_u256, safe_div_u256, safe_mul_u256, safe_sub_u256},
};

const U160_MAX: U256 = U256::from_limbs([u64::MAX, u64::MAX, 4294967295u64, 0]);

fn sort_prices(a: U256, b: U256) -> (U256, U256) {
    if a > b {
        (b, a)
    } else {
        (a, b)
    }
}

/// Next sqrt price after moving `amount` of asset 0 into (`add`) or out of
/// the pool. Rounds up so the price never overstates what the pool holds.
///
/// Solves `liquidity / price' = liquidity / price +- amount`.
pub fn next_sqrt_price_from_amount0_rounding_up(
    sqrt_price: U256,
    liquidity: u128,
    amount: U256,
    add: bool,
) -> Result<U256, EngineError> {
    if amount.is_zero() {
        return Ok(sqrt_price);
    }
    let numerator1 = U256::from(liquidity) << RESOLUTION;

    if add {
        let (product, _) = amount.overflowing_mul(sqrt_price);
        if product / amount == sqrt_price {
            let denominator = safe_add_u256(numerator1, product)?;
            if denominator >= numerator1 {
                return mul_div_rounding_up(numerator1, sqrt_price, denominator);
            }
        }
        // product overflowed; the algebraically equal fallback loses at
        // most one unit of precision in the pool's favor
        div_rounding_up(numerator1, safe_add_u256(safe_div_u256(numerator1, sqrt_price)?, amount)?)
    } else {
        let (product, _) = amount.overflowing_mul(sqrt_price);
        if product / amount != sqrt_price || numerator1 <= product {
            // the requested amount exceeds what the reserves can cover
            return Err(EngineError::ArithmeticOverflow);
        }
        let denominator = numerator1 - product;
        mul_div_rounding_up(numerator1, sqrt_price, denominator)
    }
}

/// Next sqrt price after moving `amount` of asset 1 into (`add`) or out of
/// the pool. Rounds down, the conservative direction for this dimension.
///
/// Solves `price' = price +- amount / liquidity`.
pub fn next_sqrt_price_from_amount1_rounding_down(
    sqrt_price: U256,
    liquidity: u128,
    amount: U256,
    add: bool,
) -> Result<U256, EngineError> {
    let liquidity = U256::from(liquidity);
    if add {
        let quotient = if amount <= U160_MAX {
            safe_div_u256(amount << RESOLUTION, liquidity)?
        } else {
            mul_div(amount, Q96, liquidity)?
        };
        safe_add_u256(sqrt_price, quotient)
    } else {
        let quotient = if amount <= U160_MAX {
            div_rounding_up(amount << RESOLUTION, liquidity)?
        } else {
            mul_div_rounding_up(amount, Q96, liquidity)?
        };
        if sqrt_price <= quotient {
            return Err(EngineError::ArithmeticOverflow);
        }
        Ok(sqrt_price - quotient)
    }
}

/// Dispatches to the correct single-asset solver for an exact input.
pub fn next_sqrt_price_from_input(
    sqrt_price: U256,
    liquidity: u128,
    amount_in: U256,
    zero_for_one: bool,
) -> Result<U256, EngineError> {
    if sqrt_price.is_zero() {
        return Err(EngineError::PriceOutOfRange(sqrt_price));
    }
    if liquidity == 0 {
        return Err(EngineError::InsufficientLiquidity);
    }
    if zero_for_one {
        next_sqrt_price_from_amount0_rounding_up(sqrt_price, liquidity, amount_in, true)
    } else {
        next_sqrt_price_from_amount1_rounding_down(sqrt_price, liquidity, amount_in, true)
    }
}

/// Dispatches to the correct single-asset solver for an exact output.
pub fn next_sqrt_price_from_output(
    sqrt_price: U256,
    liquidity: u128,
    amount_out: U256,
    zero_for_one: bool,
) -> Result<U256, EngineError> {
    if sqrt_price.is_zero() {
        return Err(EngineError::PriceOutOfRange(sqrt_price));
    }
    if liquidity == 0 {
        return Err(EngineError::InsufficientLiquidity);
    }
    if zero_for_one {
        next_sqrt_price_from_amount1_rounding_down(sqrt_price, liquidity, amount_out, false)
    } else {
        next_sqrt_price_from_amount0_rounding_up(sqrt_price, liquidity, amount_out, false)
    }
}

/// Amount of asset 0 backing `liquidity` over the price interval `[a, b]`.
///
/// `round_up` selects the pool-conservative ceiling (amounts owed by a
/// liquidity provider); the floor is for amounts owed to one.
pub fn amount0_delta(
    a: U256,
    b: U256,
    liquidity: u128,
    round_up: bool,
) -> Result<U256, EngineError> {
    if liquidity == 0 {
        return Err(EngineError::InsufficientLiquidity);
    }
    let (sqrt_lower, sqrt_upper) = sort_prices(a, b);
    if sqrt_lower.is_zero() {
        return Err(EngineError::PriceOutOfRange(sqrt_lower));
    }

    let numerator1 = U256::from(liquidity) << RESOLUTION;
    let numerator2 = sqrt_upper - sqrt_lower;

    if round_up {
        div_rounding_up(mul_div_rounding_up(numerator1, numerator2, sqrt_upper)?, sqrt_lower)
    } else {
        safe_div_u256(mul_div(numerator1, numerator2, sqrt_upper)?, sqrt_lower)
    }
}

/// Amount of asset 1 backing `liquidity` over the price interval `[a, b]`.
pub fn amount1_delta(
    a: U256,
    b: U256,
    liquidity: u128,
    round_up: bool,
) -> Result<U256, EngineError> {
    if liquidity == 0 {
        return Err(EngineError::InsufficientLiquidity);
    }
    let (sqrt_lower, sqrt_upper) = sort_prices(a, b);
    if sqrt_lower.is_zero() {
        return Err(EngineError::PriceOutOfRange(sqrt_lower));
    }

    if round_up {
        mul_div_rounding_up(U256::from(liquidity), sqrt_upper - sqrt_lower, Q96)
    } else {
        safe_div_u256(
            safe_mul_u256(U256::from(liquidity), safe_sub_u256(sqrt_upper, sqrt_lower)?)?,
            Q96,
        )
    }
}

/// Signed variant of [`amount0_delta`]: negative liquidity means the
/// amount is owed to the caller and is returned negated, rounded in the
/// caller's disfavor.
pub fn amount0_delta_signed(a: U256, b: U256, liquidity: i128) -> Result<I256, EngineError> {
    if liquidity < 0 {
        let amount = amount0_delta(a, b, liquidity.unsigned_abs(), false)?;
        Ok(-I256::from_raw(amount))
    } else {
        let amount = amount0_delta(a, b, liquidity as u128, true)?;
        Ok(I256::from_raw(amount))
    }
}

/// Signed variant of [`amount1_delta`]; see [`amount0_delta_signed`].
pub fn amount1_delta_signed(a: U256, b: U256, liquidity: i128) -> Result<I256, EngineError> {
    if liquidity < 0 {
        let amount = amount1_delta(a, b, liquidity.unsigned_abs(), false)?;
        Ok(-I256::from_raw(amount))
    } else {
        let amount = amount1_delta(a, b, liquidity as u128, true)?;
        Ok(I256::from_raw(amount))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::str::FromStr;

    use rstest::rstest;

    fn u256(s: &str) -> U256 {
        U256::from_str(s).unwrap()
    }

    #[test]
    fn test_sort_prices() {
        let a = u256("646922711029656030980122427077");
        let b = u256("78833030112140176575862854579");
        assert_eq!(sort_prices(a, b), (b, a));
        assert_eq!(sort_prices(b, a), (b, a));
    }

    #[rstest]
    #[case(
        "646922711029656030980122427077",
        "78833030112140176575862854579",
        1000000000000u128,
        true,
        "882542983628"
    )]
    #[case(
        "646922711029656030980122427077",
        "78833030112140176575862854579",
        1000000000000u128,
        false,
        "882542983627"
    )]
    #[case(
        "79224201403219477170569942574",
        "79394708140106462983274643745",
        10000000u128,
        true,
        "21477"
    )]
    #[case(
        "79224201403219477170569942574",
        "79394708140106462983274643745",
        10000000u128,
        false,
        "21476"
    )]
    fn test_amount0_delta(
        #[case] a: &str,
        #[case] b: &str,
        #[case] liquidity: u128,
        #[case] round_up: bool,
        #[case] expected: &str,
    ) {
        assert_eq!(
            amount0_delta(u256(a), u256(b), liquidity, round_up).unwrap(),
            u256(expected)
        );
    }

    #[rstest]
    #[case(
        "79224201403219477170569942574",
        "79394708140106462983274643745",
        10000000u128,
        true,
        "21521"
    )]
    #[case(
        "79224201403219477170569942574",
        "79394708140106462983274643745",
        10000000u128,
        false,
        "21520"
    )]
    #[case(
        "646922711029656030980122427077",
        "78833030112140176575862854579",
        1000000000000u128,
        true,
        "7170299838965"
    )]
    #[case(
        "646922711029656030980122427077",
        "78833030112140176575862854579",
        1000000000000u128,
        false,
        "7170299838964"
    )]
    fn test_amount1_delta(
        #[case] a: &str,
        #[case] b: &str,
        #[case] liquidity: u128,
        #[case] round_up: bool,
        #[case] expected: &str,
    ) {
        assert_eq!(
            amount1_delta(u256(a), u256(b), liquidity, round_up).unwrap(),
            u256(expected)
        );
    }

    #[test]
    fn test_amount_delta_zero_liquidity_rejected() {
        let a = u256("79224201403219477170569942574");
        let b = u256("79394708140106462983274643745");
        assert_eq!(amount0_delta(a, b, 0, true), Err(EngineError::InsufficientLiquidity));
        assert_eq!(amount1_delta(a, b, 0, true), Err(EngineError::InsufficientLiquidity));
    }

    #[test]
    fn test_amount_delta_zero_price_rejected() {
        let b = u256("79394708140106462983274643745");
        assert!(amount0_delta(U256::ZERO, b, 1, true).is_err());
        assert!(amount1_delta(U256::ZERO, b, 1, true).is_err());
    }

    #[rstest]
    #[case(
        "79224201403219477170569942574",
        1000000000000u128,
        "1000000",
        true,
        "79224122183058203155816882540"
    )]
    #[case(
        "79224201403219477170569942574",
        1000000000000u128,
        "1000000",
        false,
        "79224280631381991434907536117"
    )]
    fn test_next_sqrt_price_from_input(
        #[case] sqrt_price: &str,
        #[case] liquidity: u128,
        #[case] amount_in: &str,
        #[case] zero_for_one: bool,
        #[case] expected: &str,
    ) {
        assert_eq!(
            next_sqrt_price_from_input(u256(sqrt_price), liquidity, u256(amount_in), zero_for_one)
                .unwrap(),
            u256(expected)
        );
    }

    #[rstest]
    #[case(
        "79224201403219477170569942574",
        1000000000000u128,
        "1000000",
        true,
        "79224122175056962906232349030"
    )]
    #[case(
        "79224201403219477170569942574",
        1000000000000u128,
        "1000000",
        false,
        "79224280623539183744873644932"
    )]
    fn test_next_sqrt_price_from_output(
        #[case] sqrt_price: &str,
        #[case] liquidity: u128,
        #[case] amount_out: &str,
        #[case] zero_for_one: bool,
        #[case] expected: &str,
    ) {
        assert_eq!(
            next_sqrt_price_from_output(u256(sqrt_price), liquidity, u256(amount_out), zero_for_one)
                .unwrap(),
            u256(expected)
        );
    }

    #[test]
    fn test_next_sqrt_price_zero_amount_is_identity() {
        let price = u256("79224201403219477170569942574");
        assert_eq!(
            next_sqrt_price_from_amount0_rounding_up(price, 1_000_000, U256::ZERO, true).unwrap(),
            price
        );
    }

    #[test]
    fn test_next_sqrt_price_rejects_empty_pool() {
        let price = u256("79224201403219477170569942574");
        assert_eq!(
            next_sqrt_price_from_input(price, 0, U256::from(1u64), true),
            Err(EngineError::InsufficientLiquidity)
        );
        assert_eq!(
            next_sqrt_price_from_output(price, 0, U256::from(1u64), true),
            Err(EngineError::InsufficientLiquidity)
        );
    }

    #[test]
    fn test_next_sqrt_price_output_exceeding_reserves() {
        // asking for more asset 1 out than the curve holds below the price
        let price = u256("79224201403219477170569942574");
        let res = next_sqrt_price_from_amount1_rounding_down(price, 1, U256::MAX, false);
        assert!(res.is_err());
    }

    #[test]
    fn test_signed_deltas_flip_sign_and_rounding() {
        use alloy_primitives::I256;
        let a = u256("79224201403219477170569942574");
        let b = u256("79394708140106462983274643745");
        let owed_to_pool = amount0_delta_signed(a, b, 10000000).unwrap();
        let owed_to_caller = amount0_delta_signed(a, b, -10000000).unwrap();
        assert_eq!(owed_to_pool, I256::from_raw(u256("21477")));
        assert_eq!(owed_to_caller, -I256::from_raw(u256("21476")));
    }
}

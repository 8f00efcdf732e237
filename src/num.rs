//! Numeric conversions for the U256 type
//!
//! Quoting surfaces want native floats and arbitrary-precision integers;
//! the core never does. Everything here is read-only convenience on top of
//! the fixed-point state.
use std::cmp::max;

use alloy_primitives::U256;
use num_bigint::BigUint;

/// Converts a U256 integer into its closest floating point representation.
///
/// Rounds to "nearest even" if the number has to be truncated (number uses
/// more than 53 bits): the bit following the kept significand (round bit)
/// decides the direction, any set bit below it (sticky bits) forces a round
/// up, and an exact tie goes to the value with an even least significant
/// bit.
pub fn u256_to_f64(x: U256) -> f64 {
    if x.is_zero() {
        return 0.0;
    }

    let x_bits = x.bit_len();
    let n_shifts = 53i32 - x_bits as i32;
    let mut exponent = (1023 + 52 - n_shifts) as u64;

    let mut significand: u64 = if n_shifts >= 0 {
        // shift left if pos, no rounding needed
        (x << n_shifts as usize).to::<u64>()
    } else {
        // shift right if neg, dropping LSBs, round to nearest even
        let shift = n_shifts.unsigned_abs() as usize;
        let lsb = (x >> shift) & U256::from(1u64);
        let round_bit = (x >> (shift - 1)) & U256::from(1u64);
        // every bit strictly below the round bit participates in the sticky check
        let sticky_mask = (U256::from(1u64) << max(shift - 1, 0)) - U256::from(1u64);
        let sticky_bits = x & sticky_mask;

        let rounded_towards_zero = (x >> shift).to::<u64>();
        if round_bit == U256::from(1u64) {
            if sticky_bits.is_zero() {
                // tiebreaker: round up if lsb is 1 and down if lsb is 0
                if lsb.is_zero() {
                    rounded_towards_zero
                } else {
                    rounded_towards_zero + 1
                }
            } else {
                rounded_towards_zero + 1
            }
        } else {
            rounded_towards_zero
        }
    };

    // rounding may have grown the significand to 54 bits; renormalize
    if significand & (1 << 53) > 0 {
        significand >>= 1;
        exponent += 1;
    }

    let merged = (exponent << 52) | (significand & 0xFFFFFFFFFFFFFu64);
    f64::from_bits(merged)
}

/// Converts a U256 integer into a BigUint.
pub fn u256_to_biguint(value: U256) -> BigUint {
    BigUint::from_bytes_be(&value.to_be_bytes::<32>())
}

/// Converts a BigUint into a U256. Returns `None` for values wider than
/// 256 bits rather than truncating.
pub fn biguint_to_u256(value: &BigUint) -> Option<U256> {
    let bytes = value.to_bytes_be();
    if bytes.len() > 32 {
        return None;
    }
    Some(U256::from_be_slice(&bytes))
}

/// Low 128 bits of a U256. Used where the accounting type is u128 and
/// overflow is an accepted, documented bound rather than an error.
pub(crate) fn truncate_to_u128(x: U256) -> u128 {
    let limbs = x.as_limbs();
    ((limbs[1] as u128) << 64) | limbs[0] as u128
}

/// Converts a Q64.96 sqrt price into the approximate spot price as f64,
/// adjusted for the two assets' decimal scales.
pub fn sqrt_price_q96_to_f64(x: U256, asset_0_decimals: u32, asset_1_decimals: u32) -> f64 {
    let decimal_correction = 10f64.powi(asset_0_decimals as i32 - asset_1_decimals as i32);
    let price = u256_to_f64(x) / 2.0f64.powi(96);
    price.powi(2) * decimal_correction
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::str::FromStr;

    use approx::assert_ulps_eq;
    use rstest::rstest;

    #[rstest]
    #[case::one(U256::from(1u64), 1.0f64)]
    #[case::two(U256::from(2u64), 2.0f64)]
    #[case::large(U256::from(1023839303u64), 1023839303.0f64)]
    #[case::pow53(U256::from(9007199254740992u64), 9007199254740992.0f64)]
    #[case::rounds_to_even(U256::from(18446744073709551615u128), 18446744073709552000.0f64)]
    fn test_u256_to_f64(#[case] x: U256, #[case] expected: f64) {
        assert_eq!(u256_to_f64(x), expected);
    }

    #[test]
    fn test_u256_to_f64_zero() {
        assert_eq!(u256_to_f64(U256::ZERO), 0.0);
    }

    #[test]
    fn test_biguint_round_trip() {
        let x = U256::from_str("1461446703485210103287273052203988822378723970342").unwrap();
        let big = u256_to_biguint(x);
        assert_eq!(biguint_to_u256(&big).unwrap(), x);
    }

    #[rstest]
    #[case::unit_price(U256::from_str("79228162514264337593543950336").unwrap(), 18, 18, 1.0f64)]
    #[case::usdc_like(U256::from_str("2209221051636112667296733914466103").unwrap(), 6, 18, 0.0007775336231174711f64)]
    fn test_sqrt_price_q96_to_f64(
        #[case] sqrt_price: U256,
        #[case] d0: u32,
        #[case] d1: u32,
        #[case] expected: f64,
    ) {
        assert_ulps_eq!(
            sqrt_price_q96_to_f64(sqrt_price, d0, d1),
            expected,
            epsilon = f64::EPSILON
        );
    }
}

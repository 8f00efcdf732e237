//! Full-precision mul-div.
//!
//! `floor(a * b / denom)` and its ceiling, computed through a 512-bit
//! intermediate product so the result is exact whenever it fits in 256
//! bits. This is the sole source of precision-preserving multiplication and
//! division in the engine; every fee and amount computation routes through
//! it.
use alloy_primitives::{U256, U512};

use crate::{
    errors::EngineError,
    safe_math::{div_mod_u256, div_mod_u512, safe_add_u256, safe_mul_u512},
};

/// `floor(a * b / denom)`. Errors when `denom == 0` or the true result
/// exceeds 256 bits.
pub fn mul_div(a: U256, b: U256, denom: U256) -> Result<U256, EngineError> {
    let product = safe_mul_u512(U512::from(a), U512::from(b))?;
    let (result, _) = div_mod_u512(product, U512::from(denom))?;
    truncate_to_u256(result)
}

/// `ceil(a * b / denom)`. Errors when `denom == 0` or the true result
/// exceeds 256 bits.
pub fn mul_div_rounding_up(a: U256, b: U256, denom: U256) -> Result<U256, EngineError> {
    let product = safe_mul_u512(U512::from(a), U512::from(b))?;
    let (mut result, rest) = div_mod_u512(product, U512::from(denom))?;
    if rest > U512::ZERO {
        result += U512::from(1u64);
    }
    truncate_to_u256(result)
}

/// `ceil(a / b)`.
pub fn div_rounding_up(a: U256, b: U256) -> Result<U256, EngineError> {
    let (result, rest) = div_mod_u256(a, b)?;
    if rest > U256::ZERO {
        safe_add_u256(result, U256::from(1u64))
    } else {
        Ok(result)
    }
}

fn truncate_to_u256(value: U512) -> Result<U256, EngineError> {
    let limbs = value.as_limbs();
    if limbs[4] != 0 || limbs[5] != 0 || limbs[6] != 0 || limbs[7] != 0 {
        return Err(EngineError::ArithmeticOverflow);
    }
    Ok(U256::from_limbs([limbs[0], limbs[1], limbs[2], limbs[3]]))
}

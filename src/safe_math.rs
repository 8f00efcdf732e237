//! Safe Math
//!
//! Basic checked arithmetic over the alloy numeric types. Should an
//! operation overflow, a result carrying [`EngineError`] is returned
//! instead of panicking. Functions for the types U256, I256 and U512 are
//! available; everything fee- or amount-shaped in the crate routes through
//! these or through [`crate::maths::full_math`].
use alloy_primitives::{I256, U256, U512};

use crate::errors::EngineError;

pub fn safe_add_u256(a: U256, b: U256) -> Result<U256, EngineError> {
    a.checked_add(b).ok_or(EngineError::ArithmeticOverflow)
}

pub fn safe_sub_u256(a: U256, b: U256) -> Result<U256, EngineError> {
    a.checked_sub(b).ok_or(EngineError::ArithmeticOverflow)
}

pub fn safe_mul_u256(a: U256, b: U256) -> Result<U256, EngineError> {
    a.checked_mul(b).ok_or(EngineError::ArithmeticOverflow)
}

pub fn safe_div_u256(a: U256, b: U256) -> Result<U256, EngineError> {
    if b.is_zero() {
        return Err(EngineError::DivisionByZero);
    }
    Ok(a / b)
}

pub fn div_mod_u256(a: U256, b: U256) -> Result<(U256, U256), EngineError> {
    if b.is_zero() {
        return Err(EngineError::DivisionByZero);
    }
    Ok((a / b, a % b))
}

pub fn safe_mul_u512(a: U512, b: U512) -> Result<U512, EngineError> {
    a.checked_mul(b).ok_or(EngineError::ArithmeticOverflow)
}

pub fn div_mod_u512(a: U512, b: U512) -> Result<(U512, U512), EngineError> {
    if b.is_zero() {
        return Err(EngineError::DivisionByZero);
    }
    Ok((a / b, a % b))
}

pub fn safe_add_i256(a: I256, b: I256) -> Result<I256, EngineError> {
    a.checked_add(b).ok_or(EngineError::ArithmeticOverflow)
}

pub fn safe_sub_i256(a: I256, b: I256) -> Result<I256, EngineError> {
    a.checked_sub(b).ok_or(EngineError::ArithmeticOverflow)
}

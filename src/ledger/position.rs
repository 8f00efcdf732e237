//! Per-(owner, range) positions.
//!
//! A position tracks the liquidity an owner holds over `[lower, upper)`
//! plus the fees that range has earned since the position was last
//! touched. Fees accrue lazily: nothing is computed per swap, only when a
//! position is minted into, burned from, poked or collected.
use std::collections::HashMap;

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::{
    errors::EngineError,
    maths::{full_math::mul_div, liquidity_math, Q128},
    num::truncate_to_u128,
};

/// Identity of a position: owner plus the boundary ticks of its range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PositionKey {
    pub owner: Address,
    pub tick_lower: i32,
    pub tick_upper: i32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub liquidity: u128,
    pub fee_growth_inside0_last: U256,
    pub fee_growth_inside1_last: U256,
    pub tokens_owed0: u128,
    pub tokens_owed1: u128,
}

impl Position {
    /// Applies a liquidity delta and credits fees accrued since the last
    /// recorded fee-growth-inside snapshots.
    ///
    /// Liquidity change and fee accrual are a single atomic step. A
    /// zero-delta poke of an empty position is rejected as meaningless.
    /// Owed balances wrap on overflow: they are expected to be withdrawn
    /// long before reaching the accounting type's maximum.
    pub fn update(
        &mut self,
        liquidity_delta: i128,
        fee_growth_inside0: U256,
        fee_growth_inside1: U256,
    ) -> Result<(), EngineError> {
        let liquidity_next = if liquidity_delta == 0 {
            if self.liquidity == 0 {
                return Err(EngineError::EmptyPosition);
            }
            self.liquidity
        } else {
            liquidity_math::add_delta(self.liquidity, liquidity_delta)?
        };

        // floor rounding: the position may be underpaid by at most one
        // unit per touch
        let owed0 = mul_div(
            fee_growth_inside0.wrapping_sub(self.fee_growth_inside0_last),
            U256::from(self.liquidity),
            Q128,
        )?;
        let owed1 = mul_div(
            fee_growth_inside1.wrapping_sub(self.fee_growth_inside1_last),
            U256::from(self.liquidity),
            Q128,
        )?;

        self.liquidity = liquidity_next;
        self.fee_growth_inside0_last = fee_growth_inside0;
        self.fee_growth_inside1_last = fee_growth_inside1;
        if !owed0.is_zero() || !owed1.is_zero() {
            self.tokens_owed0 = self.tokens_owed0.wrapping_add(truncate_to_u128(owed0));
            self.tokens_owed1 = self.tokens_owed1.wrapping_add(truncate_to_u128(owed1));
        }
        Ok(())
    }
}

/// The position table; creates zero-valued entries on first access and
/// never fails a lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<(PositionKey, Position)>", into = "Vec<(PositionKey, Position)>")]
pub struct PositionLedger {
    positions: HashMap<PositionKey, Position>,
}

impl PositionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &PositionKey) -> Option<&Position> {
        self.positions.get(key)
    }

    /// The position for `key`, or a zero-valued default if none exists.
    pub fn get_or_default(&self, key: &PositionKey) -> Position {
        self.positions.get(key).copied().unwrap_or_default()
    }

    pub fn get_or_create(&mut self, key: PositionKey) -> &mut Position {
        self.positions.entry(key).or_default()
    }

    pub fn set(&mut self, key: PositionKey, position: Position) {
        self.positions.insert(key, position);
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

impl From<Vec<(PositionKey, Position)>> for PositionLedger {
    fn from(entries: Vec<(PositionKey, Position)>) -> Self {
        Self { positions: entries.into_iter().collect() }
    }
}

impl From<PositionLedger> for Vec<(PositionKey, Position)> {
    fn from(ledger: PositionLedger) -> Self {
        ledger.positions.into_iter().collect()
    }
}

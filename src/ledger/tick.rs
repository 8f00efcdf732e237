//! Sparse tick ledger.
//!
//! One record per active tick: gross liquidity referencing the tick as a
//! range boundary, the net signed delta applied when price crosses it
//! left-to-right, and the fee/oracle "outside" snapshots whose reference
//! frame flips on every crossing. Records are created on first reference
//! and deleted when gross liquidity returns to zero.
use std::collections::HashMap;

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};

use crate::{
    errors::EngineError,
    maths::{liquidity_math, tick_math::{MAX_TICK, MIN_TICK}},
};

/// Per-tick state.
///
/// The `*_outside` fields are only meaningful while `initialized` is true,
/// and only relative to the current tick: they track accumulation on the
/// side of this tick away from the current price, and every crossing
/// rebases them as `outside := global - outside`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickEntry {
    pub liquidity_gross: u128,
    pub liquidity_net: i128,
    pub fee_growth_outside0: U256,
    pub fee_growth_outside1: U256,
    pub seconds_per_liquidity_outside: U256,
    pub tick_cumulative_outside: i64,
    pub seconds_outside: u32,
    pub initialized: bool,
}

impl TickEntry {
    /// Applies a signed liquidity delta to this tick as a range boundary.
    ///
    /// On first activation the outside snapshots are seeded from the
    /// current globals when the tick sits at or below the current tick:
    /// by convention all prior accumulation is assumed to have happened
    /// below. Returns whether gross liquidity crossed zero in either
    /// direction, in which case the caller must flip the bitmap bit.
    #[allow(clippy::too_many_arguments)]
    pub fn update(
        &mut self,
        tick: i32,
        tick_current: i32,
        liquidity_delta: i128,
        fee_growth_global0: U256,
        fee_growth_global1: U256,
        seconds_per_liquidity_cumulative: U256,
        tick_cumulative: i64,
        time: u32,
        upper: bool,
        max_liquidity: u128,
    ) -> Result<bool, EngineError> {
        let liquidity_gross_before = self.liquidity_gross;
        let liquidity_gross_after =
            liquidity_math::add_delta(liquidity_gross_before, liquidity_delta)?;

        if liquidity_gross_after > max_liquidity {
            return Err(EngineError::TickLiquidityCap);
        }

        let liquidity_net_after = if upper {
            self.liquidity_net.checked_sub(liquidity_delta)
        } else {
            self.liquidity_net.checked_add(liquidity_delta)
        }
        .ok_or(EngineError::LiquidityOverflow)?;

        let flipped = (liquidity_gross_after == 0) != (liquidity_gross_before == 0);

        if liquidity_gross_before == 0 {
            if tick <= tick_current {
                self.fee_growth_outside0 = fee_growth_global0;
                self.fee_growth_outside1 = fee_growth_global1;
                self.seconds_per_liquidity_outside = seconds_per_liquidity_cumulative;
                self.tick_cumulative_outside = tick_cumulative;
                self.seconds_outside = time;
            }
            self.initialized = true;
        }

        self.liquidity_gross = liquidity_gross_after;
        self.liquidity_net = liquidity_net_after;

        Ok(flipped)
    }

    /// Rebases the outside reference frame as the price crosses this tick
    /// and returns the net liquidity delta to apply to the running total.
    pub fn cross(
        &mut self,
        fee_growth_global0: U256,
        fee_growth_global1: U256,
        seconds_per_liquidity_cumulative: U256,
        tick_cumulative: i64,
        time: u32,
    ) -> i128 {
        self.fee_growth_outside0 = fee_growth_global0.wrapping_sub(self.fee_growth_outside0);
        self.fee_growth_outside1 = fee_growth_global1.wrapping_sub(self.fee_growth_outside1);
        self.seconds_per_liquidity_outside =
            seconds_per_liquidity_cumulative.wrapping_sub(self.seconds_per_liquidity_outside);
        self.tick_cumulative_outside = tick_cumulative.wrapping_sub(self.tick_cumulative_outside);
        self.seconds_outside = time.wrapping_sub(self.seconds_outside);
        self.liquidity_net
    }
}

/// Fee growth accrued inside `[lower_tick, upper_tick)`, derived from the
/// boundary entries' outside snapshots and the global accumulators. All
/// arithmetic wraps: only differences between two readings are meaningful.
pub fn fee_growth_inside(
    lower: &TickEntry,
    upper: &TickEntry,
    lower_tick: i32,
    upper_tick: i32,
    tick_current: i32,
    fee_growth_global0: U256,
    fee_growth_global1: U256,
) -> (U256, U256) {
    let (below0, below1) = if tick_current >= lower_tick {
        (lower.fee_growth_outside0, lower.fee_growth_outside1)
    } else {
        (
            fee_growth_global0.wrapping_sub(lower.fee_growth_outside0),
            fee_growth_global1.wrapping_sub(lower.fee_growth_outside1),
        )
    };

    let (above0, above1) = if tick_current < upper_tick {
        (upper.fee_growth_outside0, upper.fee_growth_outside1)
    } else {
        (
            fee_growth_global0.wrapping_sub(upper.fee_growth_outside0),
            fee_growth_global1.wrapping_sub(upper.fee_growth_outside1),
        )
    };

    (
        fee_growth_global0.wrapping_sub(below0).wrapping_sub(above0),
        fee_growth_global1.wrapping_sub(below1).wrapping_sub(above1),
    )
}

/// The sparse tick table. Owns every [`TickEntry`] and is the only module
/// allowed to mutate them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickLedger {
    entries: HashMap<i32, TickEntry>,
}

impl TickLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, tick: i32) -> Option<&TickEntry> {
        self.entries.get(&tick)
    }

    /// The entry for `tick`, or a zero-valued default for ticks that were
    /// never referenced.
    pub fn get_or_default(&self, tick: i32) -> TickEntry {
        self.entries.get(&tick).copied().unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Writes back an entry computed outside the map (the pool stages all
    /// mutations before committing them).
    pub fn set(&mut self, tick: i32, entry: TickEntry) {
        self.entries.insert(tick, entry);
    }

    /// Applies a liquidity delta directly to the stored entry. See
    /// [`TickEntry::update`].
    #[allow(clippy::too_many_arguments)]
    pub fn update(
        &mut self,
        tick: i32,
        tick_current: i32,
        liquidity_delta: i128,
        fee_growth_global0: U256,
        fee_growth_global1: U256,
        seconds_per_liquidity_cumulative: U256,
        tick_cumulative: i64,
        time: u32,
        upper: bool,
        max_liquidity: u128,
    ) -> Result<bool, EngineError> {
        let mut entry = self.get_or_default(tick);
        let flipped = entry.update(
            tick,
            tick_current,
            liquidity_delta,
            fee_growth_global0,
            fee_growth_global1,
            seconds_per_liquidity_cumulative,
            tick_cumulative,
            time,
            upper,
            max_liquidity,
        )?;
        self.entries.insert(tick, entry);
        Ok(flipped)
    }

    /// Crosses `tick`, flipping its outside snapshots in place. Must be
    /// called exactly once per crossing per direction.
    pub fn cross(
        &mut self,
        tick: i32,
        fee_growth_global0: U256,
        fee_growth_global1: U256,
        seconds_per_liquidity_cumulative: U256,
        tick_cumulative: i64,
        time: u32,
    ) -> i128 {
        let entry = self.entries.entry(tick).or_default();
        entry.cross(
            fee_growth_global0,
            fee_growth_global1,
            seconds_per_liquidity_cumulative,
            tick_cumulative,
            time,
        )
    }

    /// See [`fee_growth_inside`].
    pub fn fee_growth_inside(
        &self,
        lower_tick: i32,
        upper_tick: i32,
        tick_current: i32,
        fee_growth_global0: U256,
        fee_growth_global1: U256,
    ) -> (U256, U256) {
        let lower = self.get_or_default(lower_tick);
        let upper = self.get_or_default(upper_tick);
        fee_growth_inside(
            &lower,
            &upper,
            lower_tick,
            upper_tick,
            tick_current,
            fee_growth_global0,
            fee_growth_global1,
        )
    }

    /// Deletes a tick record. Storage reclamation only; callers invoke it
    /// when gross liquidity returns to zero.
    pub fn clear(&mut self, tick: i32) {
        self.entries.remove(&tick);
    }
}

/// Ledger-wide cap on a single tick's gross liquidity, chosen so the sum
/// over every legal tick at the given spacing cannot overflow u128.
pub fn max_liquidity_per_tick(tick_spacing: i32) -> u128 {
    let min_tick = (MIN_TICK / tick_spacing) * tick_spacing;
    let max_tick = (MAX_TICK / tick_spacing) * tick_spacing;
    let num_ticks = ((max_tick - min_tick) / tick_spacing) as u128 + 1;
    u128::MAX / num_ticks
}

//! Time-weighted oracle ring buffer.
//!
//! A growable circular array of accumulator snapshots. Each write rolls
//! the previous entry forward by the elapsed time; reads interpolate
//! between the two entries bracketing the requested moment. Cumulative
//! fields wrap intentionally — only differences between two entries carry
//! meaning — and timestamps wrap mod 2^32, so all ordering comparisons go
//! through [`lte`].
use alloy_primitives::U256;
use serde::{Deserialize, Serialize};

use crate::errors::EngineError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    pub block_timestamp: u32,
    /// Integral of the current tick over time.
    pub tick_cumulative: i64,
    /// Integral of 1 / in-range liquidity over time, X128.
    pub seconds_per_liquidity_cumulative: U256,
    pub initialized: bool,
}

/// Timestamp ordering relative to a reference `time`, safe across the
/// 2^32 wrap: a timestamp "after" the reference is treated as belonging
/// to the previous epoch.
fn lte(time: u32, a: u32, b: u32) -> bool {
    if a <= time && b <= time {
        return a <= b;
    }
    let a_adjusted = if a > time { a as u64 } else { a as u64 + (1 << 32) };
    let b_adjusted = if b > time { b as u64 } else { b as u64 + (1 << 32) };
    a_adjusted <= b_adjusted
}

/// Rolls `last` forward to `time`, integrating the current tick and
/// in-range liquidity over the elapsed seconds.
fn transform(last: &Observation, time: u32, tick: i32, liquidity: u128) -> Observation {
    let delta = time.wrapping_sub(last.block_timestamp);
    Observation {
        block_timestamp: time,
        tick_cumulative: last.tick_cumulative.wrapping_add(tick as i64 * delta as i64),
        seconds_per_liquidity_cumulative: last.seconds_per_liquidity_cumulative.wrapping_add(
            (U256::from(delta) << 128) / U256::from(liquidity.max(1)),
        ),
        initialized: true,
    }
}

/// The observation ring. Index, cardinality and the reserved capacity
/// (`cardinality_next`) are owned by the pool's slot state and passed in,
/// so the ring itself stays a dumb store with the update rules attached.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Oracle {
    slots: Vec<Observation>,
}

impl Oracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, index: u16) -> Option<&Observation> {
        self.slots.get(index as usize)
    }

    /// Writes the first observation. Returns `(cardinality,
    /// cardinality_next)`, both 1.
    pub fn initialize(&mut self, time: u32) -> (u16, u16) {
        self.slots.clear();
        self.slots.push(Observation {
            block_timestamp: time,
            tick_cumulative: 0,
            seconds_per_liquidity_cumulative: U256::ZERO,
            initialized: true,
        });
        (1, 1)
    }

    /// Appends an observation, rolling the previous entry forward.
    ///
    /// At most one observation exists per timestamp: a write at the last
    /// entry's timestamp is a no-op. Reserved capacity is consumed (the
    /// cardinality grows by one) exactly when the ring is full and the
    /// index sits on the last live slot. Returns the updated
    /// `(index, cardinality)`.
    pub fn write(
        &mut self,
        index: u16,
        time: u32,
        tick: i32,
        liquidity: u128,
        cardinality: u16,
        cardinality_next: u16,
    ) -> (u16, u16) {
        let last = self.slots[index as usize];
        if last.block_timestamp == time {
            return (index, cardinality);
        }

        let cardinality_updated = if cardinality_next > cardinality && index == cardinality - 1 {
            cardinality_next
        } else {
            cardinality
        };

        let index_updated = (index + 1) % cardinality_updated;
        self.slots[index_updated as usize] = transform(&last, time, tick, liquidity);
        (index_updated, cardinality_updated)
    }

    /// Reserves ring capacity up to `next` slots. A no-op when `next`
    /// does not exceed `current`. Slots are pre-touched with a nonzero
    /// timestamp so the eventual first write into them is not a more
    /// expensive cold write. Returns the reserved capacity.
    pub fn grow(&mut self, current: u16, next: u16) -> Result<u16, EngineError> {
        if current == 0 {
            return Err(EngineError::OracleUninitialized);
        }
        if next <= current {
            return Ok(current);
        }
        for _ in self.slots.len()..next as usize {
            self.slots.push(Observation { block_timestamp: 1, ..Default::default() });
        }
        Ok(next)
    }

    /// Accumulator values as of `seconds_ago` before `time`.
    ///
    /// `seconds_ago == 0` returns the state of the latest entry rolled
    /// forward to `time`. Otherwise the two entries bracketing the target
    /// moment are located by binary search and linearly interpolated.
    /// Errors when the target predates the oldest retained entry; the
    /// value is never silently clamped.
    pub fn observe_single(
        &self,
        time: u32,
        seconds_ago: u32,
        tick: i32,
        index: u16,
        liquidity: u128,
        cardinality: u16,
    ) -> Result<(i64, U256), EngineError> {
        if cardinality == 0 {
            return Err(EngineError::OracleUninitialized);
        }
        if seconds_ago == 0 {
            let mut last = self.slots[index as usize];
            if last.block_timestamp != time {
                last = transform(&last, time, tick, liquidity);
            }
            return Ok((last.tick_cumulative, last.seconds_per_liquidity_cumulative));
        }

        let target = time.wrapping_sub(seconds_ago);
        let (before_or_at, at_or_after) =
            self.surrounding_observations(time, target, tick, index, liquidity, cardinality)?;

        if target == before_or_at.block_timestamp {
            Ok((before_or_at.tick_cumulative, before_or_at.seconds_per_liquidity_cumulative))
        } else if target == at_or_after.block_timestamp {
            Ok((at_or_after.tick_cumulative, at_or_after.seconds_per_liquidity_cumulative))
        } else {
            // linear interpolation between the bracketing entries
            let observation_delta =
                at_or_after.block_timestamp.wrapping_sub(before_or_at.block_timestamp);
            let target_delta = target.wrapping_sub(before_or_at.block_timestamp);
            let tick_cumulative = before_or_at.tick_cumulative.wrapping_add(
                at_or_after
                    .tick_cumulative
                    .wrapping_sub(before_or_at.tick_cumulative)
                    / observation_delta as i64
                    * target_delta as i64,
            );
            let seconds_per_liquidity_cumulative =
                before_or_at.seconds_per_liquidity_cumulative.wrapping_add(
                    at_or_after
                        .seconds_per_liquidity_cumulative
                        .wrapping_sub(before_or_at.seconds_per_liquidity_cumulative)
                        * U256::from(target_delta)
                        / U256::from(observation_delta),
                );
            Ok((tick_cumulative, seconds_per_liquidity_cumulative))
        }
    }

    /// Batched [`Self::observe_single`], one result per entry of
    /// `seconds_agos` in the same order.
    #[allow(clippy::too_many_arguments)]
    pub fn observe(
        &self,
        time: u32,
        seconds_agos: &[u32],
        tick: i32,
        index: u16,
        liquidity: u128,
        cardinality: u16,
    ) -> Result<(Vec<i64>, Vec<U256>), EngineError> {
        let mut tick_cumulatives = Vec::with_capacity(seconds_agos.len());
        let mut seconds_per_liquidity_cumulatives = Vec::with_capacity(seconds_agos.len());
        for &seconds_ago in seconds_agos {
            let (tick_cumulative, seconds_per_liquidity) =
                self.observe_single(time, seconds_ago, tick, index, liquidity, cardinality)?;
            tick_cumulatives.push(tick_cumulative);
            seconds_per_liquidity_cumulatives.push(seconds_per_liquidity);
        }
        Ok((tick_cumulatives, seconds_per_liquidity_cumulatives))
    }

    /// The entries bracketing `target`. The upper bracket may be a
    /// synthetic entry rolled forward to the target when the latest real
    /// entry is older than it.
    fn surrounding_observations(
        &self,
        time: u32,
        target: u32,
        tick: i32,
        index: u16,
        liquidity: u128,
        cardinality: u16,
    ) -> Result<(Observation, Observation), EngineError> {
        let mut before_or_at = self.slots[index as usize];

        if lte(time, before_or_at.block_timestamp, target) {
            if before_or_at.block_timestamp == target {
                return Ok((before_or_at, before_or_at));
            }
            // target is newer than every stored entry
            return Ok((before_or_at, transform(&before_or_at, target, tick, liquidity)));
        }

        // wind back to the oldest retained entry
        before_or_at = self.slots[((index + 1) % cardinality) as usize];
        if !before_or_at.initialized {
            before_or_at = self.slots[0];
        }

        if !lte(time, before_or_at.block_timestamp, target) {
            return Err(EngineError::ObservationTooOld);
        }

        self.binary_search(time, target, index, cardinality)
    }

    fn binary_search(
        &self,
        time: u32,
        target: u32,
        index: u16,
        cardinality: u16,
    ) -> Result<(Observation, Observation), EngineError> {
        let mut l = (index as u32 + 1) % cardinality as u32; // oldest
        let mut r = l + cardinality as u32 - 1; // newest

        loop {
            let i = (l + r) / 2;
            let before_or_at = self.slots[(i % cardinality as u32) as usize];

            // hit an unpopulated reserved slot; the live range is above
            if !before_or_at.initialized {
                l = i + 1;
                continue;
            }

            let at_or_after = self.slots[((i + 1) % cardinality as u32) as usize];
            let target_at_or_after = lte(time, before_or_at.block_timestamp, target);

            if target_at_or_after && lte(time, target, at_or_after.block_timestamp) {
                return Ok((before_or_at, at_or_after));
            }

            if !target_at_or_after {
                r = i - 1;
            } else {
                l = i + 1;
            }
        }
    }
}

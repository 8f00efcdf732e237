//! The pool state machine.
//!
//! Thin orchestration over the math and ledger modules: initialization,
//! the reentrancy lock, and the position-mutation entry points. Every
//! mutating operation validates, stages its changes into locals, performs
//! external settlement, and only then commits — a failure anywhere leaves
//! no partial state behind.
use alloy_primitives::{Address, I256, U256};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    errors::EngineError,
    ledger::{
        bitmap::TickBitmap,
        oracle::Oracle,
        position::{Position, PositionKey, PositionLedger},
        tick::{self, max_liquidity_per_tick, TickEntry, TickLedger},
    },
    maths::{
        full_math::{mul_div, mul_div_rounding_up},
        liquidity_math, sqrt_price_math,
        tick_math::{self, MAX_TICK, MIN_TICK},
        Q128,
    },
    num::{sqrt_price_q96_to_f64, truncate_to_u128},
    safe_math::safe_add_u256,
};

mod settlement;
mod swap;

pub use settlement::{AssetLedger, FlashRepayment, MintPayment, SwapPayment};

/// The hot slot of pool state: everything the swap path reads every time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    /// Current Q64.96 sqrt price; zero until the pool is initialized.
    pub sqrt_price: U256,
    /// Current tick. Consistent with `sqrt_price` except exactly on a
    /// boundary, where it is the last tick whose crossing was processed.
    pub tick: i32,
    pub observation_index: u16,
    pub observation_cardinality: u16,
    pub observation_cardinality_next: u16,
    /// Protocol fee denominators, asset 0 in the low nibble and asset 1
    /// in the high nibble; each is 0 (off) or within 4..=10.
    pub fee_protocol: u8,
    /// Reentrancy flag: false while a mutating entry point is in flight.
    pub unlocked: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolFees {
    pub asset0: u128,
    pub asset1: u128,
}

/// A concentrated-liquidity pool between two assets.
///
/// All state that must survive across operations lives here; nothing is
/// implicitly reset between calls. Timestamps come in from the caller on
/// every time-dependent operation — the pool owns no clock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pool {
    asset0: Address,
    asset1: Address,
    fee_pips: u32,
    tick_spacing: i32,
    max_liquidity_per_tick: u128,

    slot: Slot,
    /// In-range liquidity: the sum of net liquidity of all active ticks
    /// at or below the current tick.
    liquidity: u128,
    fee_growth_global0: U256,
    fee_growth_global1: U256,
    protocol_fees: ProtocolFees,

    ticks: TickLedger,
    bitmap: TickBitmap,
    positions: PositionLedger,
    oracle: Oracle,
}

/// A staged position mutation: every fallible computation is done, the
/// resulting records are ready to write, and committing cannot fail.
struct PositionChange {
    key: PositionKey,
    lower_entry: TickEntry,
    upper_entry: TickEntry,
    flipped_lower: bool,
    flipped_upper: bool,
    clear_lower: bool,
    clear_upper: bool,
    position: Position,
    /// New in-range liquidity, when the range straddles the current tick.
    liquidity_after: Option<u128>,
    amount0: I256,
    amount1: I256,
}

impl Pool {
    /// A new, unpriced pool. No operation other than
    /// [`initialize`](Self::initialize) succeeds until a starting price is
    /// set.
    pub fn new(
        asset0: Address,
        asset1: Address,
        fee_pips: u32,
        tick_spacing: i32,
    ) -> Result<Self, EngineError> {
        if tick_spacing <= 0 {
            return Err(EngineError::InvalidTickSpacing);
        }
        if fee_pips >= crate::maths::FEE_PIPS_DENOMINATOR {
            return Err(EngineError::InvalidFee);
        }
        Ok(Pool {
            asset0,
            asset1,
            fee_pips,
            tick_spacing,
            max_liquidity_per_tick: max_liquidity_per_tick(tick_spacing),
            slot: Slot::default(),
            liquidity: 0,
            fee_growth_global0: U256::ZERO,
            fee_growth_global1: U256::ZERO,
            protocol_fees: ProtocolFees::default(),
            ticks: TickLedger::new(),
            bitmap: TickBitmap::new(),
            positions: PositionLedger::new(),
            oracle: Oracle::new(),
        })
    }

    /// Sets the starting price and writes the first oracle observation.
    /// Returns the starting tick.
    pub fn initialize(&mut self, sqrt_price: U256, time: u32) -> Result<i32, EngineError> {
        if !self.slot.sqrt_price.is_zero() {
            return Err(EngineError::AlreadyInitialized);
        }
        let tick = tick_math::tick_at_sqrt_price(sqrt_price)?;
        let (cardinality, cardinality_next) = self.oracle.initialize(time);
        self.slot = Slot {
            sqrt_price,
            tick,
            observation_index: 0,
            observation_cardinality: cardinality,
            observation_cardinality_next: cardinality_next,
            fee_protocol: 0,
            unlocked: true,
        };
        debug!(?sqrt_price, tick, "pool initialized");
        Ok(tick)
    }

    // === position mutation entry points ===

    /// Adds `amount` liquidity over `[tick_lower, tick_upper)` for
    /// `recipient`. The payment callback must deliver the returned token
    /// amounts to the pool before returning; balances are verified after.
    #[allow(clippy::too_many_arguments)]
    pub fn mint(
        &mut self,
        recipient: Address,
        tick_lower: i32,
        tick_upper: i32,
        amount: u128,
        time: u32,
        ledger: &mut dyn AssetLedger,
        payment: &mut dyn MintPayment,
        data: &[u8],
    ) -> Result<(U256, U256), EngineError> {
        self.acquire_lock()?;
        let result =
            self.mint_inner(recipient, tick_lower, tick_upper, amount, time, ledger, payment, data);
        self.release_lock();
        result
    }

    #[allow(clippy::too_many_arguments)]
    fn mint_inner(
        &mut self,
        recipient: Address,
        tick_lower: i32,
        tick_upper: i32,
        amount: u128,
        time: u32,
        ledger: &mut dyn AssetLedger,
        payment: &mut dyn MintPayment,
        data: &[u8],
    ) -> Result<(U256, U256), EngineError> {
        if amount == 0 {
            return Err(EngineError::ZeroAmount);
        }
        let liquidity_delta =
            i128::try_from(amount).map_err(|_| EngineError::LiquidityOverflow)?;
        let change =
            self.stage_modify_position(recipient, tick_lower, tick_upper, liquidity_delta, time)?;
        let amount0 = change.amount0.into_raw();
        let amount1 = change.amount1.into_raw();

        let balance0_before =
            if amount0 > U256::ZERO { ledger.balance_of_pool(self.asset0)? } else { U256::ZERO };
        let balance1_before =
            if amount1 > U256::ZERO { ledger.balance_of_pool(self.asset1)? } else { U256::ZERO };

        payment.pay_for_mint(&*self, ledger, amount0, amount1, data)?;

        if amount0 > U256::ZERO {
            self.verify_balance_increase(ledger, self.asset0, balance0_before, amount0)?;
        }
        if amount1 > U256::ZERO {
            self.verify_balance_increase(ledger, self.asset1, balance1_before, amount1)?;
        }

        self.commit_position_change(&change, time)?;
        debug!(%recipient, tick_lower, tick_upper, amount, %amount0, %amount1, "mint");
        Ok((amount0, amount1))
    }

    /// Removes `amount` liquidity from the owner's position and credits
    /// the freed token amounts (plus any accrued fees) as owed balances.
    /// `amount == 0` is a fee poke: the position's owed balances are
    /// brought current and nothing else changes.
    pub fn burn(
        &mut self,
        owner: Address,
        tick_lower: i32,
        tick_upper: i32,
        amount: u128,
        time: u32,
    ) -> Result<(U256, U256), EngineError> {
        self.acquire_lock()?;
        let result = self.burn_inner(owner, tick_lower, tick_upper, amount, time);
        self.release_lock();
        result
    }

    fn burn_inner(
        &mut self,
        owner: Address,
        tick_lower: i32,
        tick_upper: i32,
        amount: u128,
        time: u32,
    ) -> Result<(U256, U256), EngineError> {
        let liquidity_delta =
            i128::try_from(amount).map_err(|_| EngineError::LiquidityOverflow)?;
        let mut change =
            self.stage_modify_position(owner, tick_lower, tick_upper, -liquidity_delta, time)?;

        let amount0 = (-change.amount0).into_raw();
        let amount1 = (-change.amount1).into_raw();
        if amount0 > U256::ZERO || amount1 > U256::ZERO {
            change.position.tokens_owed0 =
                change.position.tokens_owed0.wrapping_add(truncate_to_u128(amount0));
            change.position.tokens_owed1 =
                change.position.tokens_owed1.wrapping_add(truncate_to_u128(amount1));
        }

        self.commit_position_change(&change, time)?;
        debug!(%owner, tick_lower, tick_upper, amount, %amount0, %amount1, "burn");
        Ok((amount0, amount1))
    }

    /// Pays out owed balances of a position, clamped to what is owed.
    #[allow(clippy::too_many_arguments)]
    pub fn collect(
        &mut self,
        owner: Address,
        recipient: Address,
        tick_lower: i32,
        tick_upper: i32,
        amount0_requested: u128,
        amount1_requested: u128,
        ledger: &mut dyn AssetLedger,
    ) -> Result<(u128, u128), EngineError> {
        self.acquire_lock()?;
        let result = self.collect_inner(
            owner,
            recipient,
            tick_lower,
            tick_upper,
            amount0_requested,
            amount1_requested,
            ledger,
        );
        self.release_lock();
        result
    }

    #[allow(clippy::too_many_arguments)]
    fn collect_inner(
        &mut self,
        owner: Address,
        recipient: Address,
        tick_lower: i32,
        tick_upper: i32,
        amount0_requested: u128,
        amount1_requested: u128,
        ledger: &mut dyn AssetLedger,
    ) -> Result<(u128, u128), EngineError> {
        let key = PositionKey { owner, tick_lower, tick_upper };
        let mut position = match self.positions.get(&key) {
            Some(position) => *position,
            None => return Ok((0, 0)),
        };

        let amount0 = amount0_requested.min(position.tokens_owed0);
        let amount1 = amount1_requested.min(position.tokens_owed1);

        if amount0 > 0 {
            ledger.transfer(self.asset0, recipient, U256::from(amount0))?;
        }
        if amount1 > 0 {
            ledger.transfer(self.asset1, recipient, U256::from(amount1))?;
        }

        position.tokens_owed0 -= amount0;
        position.tokens_owed1 -= amount1;
        self.positions.set(key, position);
        debug!(%owner, tick_lower, tick_upper, amount0, amount1, "collect");
        Ok((amount0, amount1))
    }

    /// Lends out both assets within one settlement: the amounts leave the
    /// pool, the callback runs, and the balances must come back grown by
    /// the quoted fees. Paid fees accrue to in-range liquidity, minus the
    /// protocol skim. Returns what was actually paid on each side.
    #[allow(clippy::too_many_arguments)]
    pub fn flash(
        &mut self,
        recipient: Address,
        amount0: U256,
        amount1: U256,
        ledger: &mut dyn AssetLedger,
        repayment: &mut dyn FlashRepayment,
        data: &[u8],
    ) -> Result<(U256, U256), EngineError> {
        self.acquire_lock()?;
        let result = self.flash_inner(recipient, amount0, amount1, ledger, repayment, data);
        self.release_lock();
        result
    }

    fn flash_inner(
        &mut self,
        recipient: Address,
        amount0: U256,
        amount1: U256,
        ledger: &mut dyn AssetLedger,
        repayment: &mut dyn FlashRepayment,
        data: &[u8],
    ) -> Result<(U256, U256), EngineError> {
        if self.liquidity == 0 {
            return Err(EngineError::InsufficientLiquidity);
        }
        let fee0 = mul_div_rounding_up(
            amount0,
            U256::from(self.fee_pips),
            U256::from(crate::maths::FEE_PIPS_DENOMINATOR),
        )?;
        let fee1 = mul_div_rounding_up(
            amount1,
            U256::from(self.fee_pips),
            U256::from(crate::maths::FEE_PIPS_DENOMINATOR),
        )?;

        let balance0_before = ledger.balance_of_pool(self.asset0)?;
        let balance1_before = ledger.balance_of_pool(self.asset1)?;

        if amount0 > U256::ZERO {
            ledger.transfer(self.asset0, recipient, amount0)?;
        }
        if amount1 > U256::ZERO {
            ledger.transfer(self.asset1, recipient, amount1)?;
        }

        repayment.repay_flash(&*self, ledger, fee0, fee1, data)?;

        let balance0_after = ledger.balance_of_pool(self.asset0)?;
        let balance1_after = ledger.balance_of_pool(self.asset1)?;
        let expected0 = safe_add_u256(balance0_before, fee0)?;
        let expected1 = safe_add_u256(balance1_before, fee1)?;
        if balance0_after < expected0 {
            return Err(EngineError::SettlementShortfall {
                expected: expected0,
                actual: balance0_after,
            });
        }
        if balance1_after < expected1 {
            return Err(EngineError::SettlementShortfall {
                expected: expected1,
                actual: balance1_after,
            });
        }

        let paid0 = balance0_after - balance0_before;
        let paid1 = balance1_after - balance1_before;

        // all fallible accrual math happens before any state is written
        let fee_protocol0 = self.slot.fee_protocol % 16;
        let fee_protocol1 = self.slot.fee_protocol >> 4;
        let skim0 =
            if fee_protocol0 == 0 { U256::ZERO } else { paid0 / U256::from(fee_protocol0) };
        let skim1 =
            if fee_protocol1 == 0 { U256::ZERO } else { paid1 / U256::from(fee_protocol1) };
        let growth0 = if paid0 > U256::ZERO {
            mul_div(paid0 - skim0, Q128, U256::from(self.liquidity))?
        } else {
            U256::ZERO
        };
        let growth1 = if paid1 > U256::ZERO {
            mul_div(paid1 - skim1, Q128, U256::from(self.liquidity))?
        } else {
            U256::ZERO
        };

        self.protocol_fees.asset0 =
            self.protocol_fees.asset0.saturating_add(truncate_to_u128(skim0));
        self.protocol_fees.asset1 =
            self.protocol_fees.asset1.saturating_add(truncate_to_u128(skim1));
        self.fee_growth_global0 = self.fee_growth_global0.wrapping_add(growth0);
        self.fee_growth_global1 = self.fee_growth_global1.wrapping_add(growth1);

        debug!(%recipient, %amount0, %amount1, %paid0, %paid1, "flash");
        Ok((paid0, paid1))
    }

    // === protocol fee surface ===

    /// Sets the per-side protocol fee denominators. Each must be 0
    /// (disabled) or within 4..=10; validated here, at the boundary the
    /// core accepts the configuration.
    pub fn set_fee_protocol(&mut self, fee0: u8, fee1: u8) -> Result<(), EngineError> {
        self.acquire_lock()?;
        let valid = |f: u8| f == 0 || (4..=10).contains(&f);
        let result = if valid(fee0) && valid(fee1) {
            self.slot.fee_protocol = fee0 + (fee1 << 4);
            Ok(())
        } else {
            Err(EngineError::InvalidProtocolFee)
        };
        self.release_lock();
        result
    }

    /// Withdraws accrued protocol fees, clamped to what has accrued.
    pub fn collect_protocol(
        &mut self,
        recipient: Address,
        amount0_requested: u128,
        amount1_requested: u128,
        ledger: &mut dyn AssetLedger,
    ) -> Result<(u128, u128), EngineError> {
        self.acquire_lock()?;
        let result =
            self.collect_protocol_inner(recipient, amount0_requested, amount1_requested, ledger);
        self.release_lock();
        result
    }

    fn collect_protocol_inner(
        &mut self,
        recipient: Address,
        amount0_requested: u128,
        amount1_requested: u128,
        ledger: &mut dyn AssetLedger,
    ) -> Result<(u128, u128), EngineError> {
        let amount0 = amount0_requested.min(self.protocol_fees.asset0);
        let amount1 = amount1_requested.min(self.protocol_fees.asset1);

        if amount0 > 0 {
            ledger.transfer(self.asset0, recipient, U256::from(amount0))?;
        }
        if amount1 > 0 {
            ledger.transfer(self.asset1, recipient, U256::from(amount1))?;
        }
        self.protocol_fees.asset0 -= amount0;
        self.protocol_fees.asset1 -= amount1;
        Ok((amount0, amount1))
    }

    /// Reserves oracle ring capacity. Capacity only ever grows.
    pub fn grow_observation_capacity(&mut self, next: u16) -> Result<u16, EngineError> {
        self.acquire_lock()?;
        let result = self.oracle.grow(self.slot.observation_cardinality_next, next);
        if let Ok(grown) = &result {
            self.slot.observation_cardinality_next = *grown;
        }
        self.release_lock();
        result
    }

    // === read-only surface (never locked) ===

    pub fn assets(&self) -> (Address, Address) {
        (self.asset0, self.asset1)
    }

    pub fn fee_pips(&self) -> u32 {
        self.fee_pips
    }

    pub fn tick_spacing(&self) -> i32 {
        self.tick_spacing
    }

    pub fn max_liquidity_per_tick(&self) -> u128 {
        self.max_liquidity_per_tick
    }

    pub fn slot(&self) -> &Slot {
        &self.slot
    }

    pub fn sqrt_price(&self) -> U256 {
        self.slot.sqrt_price
    }

    pub fn current_tick(&self) -> i32 {
        self.slot.tick
    }

    pub fn liquidity(&self) -> u128 {
        self.liquidity
    }

    pub fn fee_growth_global(&self) -> (U256, U256) {
        (self.fee_growth_global0, self.fee_growth_global1)
    }

    pub fn protocol_fees(&self) -> (u128, u128) {
        (self.protocol_fees.asset0, self.protocol_fees.asset1)
    }

    pub fn tick_entry(&self, tick: i32) -> Option<&TickEntry> {
        self.ticks.get(tick)
    }

    pub fn position(&self, owner: Address, tick_lower: i32, tick_upper: i32) -> Option<&Position> {
        self.positions.get(&PositionKey { owner, tick_lower, tick_upper })
    }

    pub fn observation(&self, index: u16) -> Option<&crate::ledger::oracle::Observation> {
        self.oracle.get(index)
    }

    /// Approximate spot price (asset 1 per asset 0), adjusted for decimal
    /// scales. Quoting convenience only; the core never consumes it.
    pub fn spot_price(&self, asset0_decimals: u32, asset1_decimals: u32) -> f64 {
        sqrt_price_q96_to_f64(self.slot.sqrt_price, asset0_decimals, asset1_decimals)
    }

    /// Accumulator values as of each `seconds_ago` before `time`, newest
    /// state first when `seconds_ago` is 0. Fails — never clamps — when a
    /// target predates the oldest retained observation.
    pub fn observe(
        &self,
        time: u32,
        seconds_agos: &[u32],
    ) -> Result<(Vec<i64>, Vec<U256>), EngineError> {
        if self.slot.sqrt_price.is_zero() {
            return Err(EngineError::NotInitialized);
        }
        self.oracle.observe(
            time,
            seconds_agos,
            self.slot.tick,
            self.slot.observation_index,
            self.liquidity,
            self.slot.observation_cardinality,
        )
    }

    /// Cumulative tick-time, seconds-per-liquidity and raw seconds spent
    /// inside `[tick_lower, tick_upper)` over the pool's lifetime. Both
    /// boundary ticks must be active.
    pub fn snapshot_range(
        &self,
        tick_lower: i32,
        tick_upper: i32,
        time: u32,
    ) -> Result<(i64, U256, u32), EngineError> {
        self.check_tick_range(tick_lower, tick_upper)?;
        let lower = self.ticks.get(tick_lower).ok_or(EngineError::EmptyPosition)?;
        let upper = self.ticks.get(tick_upper).ok_or(EngineError::EmptyPosition)?;

        let tick = self.slot.tick;
        if tick < tick_lower {
            Ok((
                lower.tick_cumulative_outside.wrapping_sub(upper.tick_cumulative_outside),
                lower
                    .seconds_per_liquidity_outside
                    .wrapping_sub(upper.seconds_per_liquidity_outside),
                lower.seconds_outside.wrapping_sub(upper.seconds_outside),
            ))
        } else if tick < tick_upper {
            let (tick_cumulative, seconds_per_liquidity) = self.oracle.observe_single(
                time,
                0,
                tick,
                self.slot.observation_index,
                self.liquidity,
                self.slot.observation_cardinality,
            )?;
            Ok((
                tick_cumulative
                    .wrapping_sub(lower.tick_cumulative_outside)
                    .wrapping_sub(upper.tick_cumulative_outside),
                seconds_per_liquidity
                    .wrapping_sub(lower.seconds_per_liquidity_outside)
                    .wrapping_sub(upper.seconds_per_liquidity_outside),
                time.wrapping_sub(lower.seconds_outside).wrapping_sub(upper.seconds_outside),
            ))
        } else {
            Ok((
                upper.tick_cumulative_outside.wrapping_sub(lower.tick_cumulative_outside),
                upper
                    .seconds_per_liquidity_outside
                    .wrapping_sub(lower.seconds_per_liquidity_outside),
                upper.seconds_outside.wrapping_sub(lower.seconds_outside),
            ))
        }
    }

    // === internals shared by the entry points ===

    pub(crate) fn acquire_lock(&mut self) -> Result<(), EngineError> {
        if self.slot.sqrt_price.is_zero() {
            return Err(EngineError::NotInitialized);
        }
        if !self.slot.unlocked {
            return Err(EngineError::PoolLocked);
        }
        self.slot.unlocked = false;
        Ok(())
    }

    pub(crate) fn release_lock(&mut self) {
        self.slot.unlocked = true;
    }

    fn check_tick_range(&self, tick_lower: i32, tick_upper: i32) -> Result<(), EngineError> {
        if tick_lower >= tick_upper {
            return Err(EngineError::InvalidTickRange { lower: tick_lower, upper: tick_upper });
        }
        if tick_lower < MIN_TICK {
            return Err(EngineError::TickOutOfRange(tick_lower));
        }
        if tick_upper > MAX_TICK {
            return Err(EngineError::TickOutOfRange(tick_upper));
        }
        for tick in [tick_lower, tick_upper] {
            if tick % self.tick_spacing != 0 {
                return Err(EngineError::TickNotAligned { tick, spacing: self.tick_spacing });
            }
        }
        Ok(())
    }

    fn verify_balance_increase(
        &self,
        ledger: &dyn AssetLedger,
        asset: Address,
        balance_before: U256,
        owed: U256,
    ) -> Result<(), EngineError> {
        let expected = safe_add_u256(balance_before, owed)?;
        let actual = ledger.balance_of_pool(asset)?;
        if actual < expected {
            return Err(EngineError::SettlementShortfall { expected, actual });
        }
        Ok(())
    }

    /// Computes a full position mutation without touching shared state.
    fn stage_modify_position(
        &self,
        owner: Address,
        tick_lower: i32,
        tick_upper: i32,
        liquidity_delta: i128,
        time: u32,
    ) -> Result<PositionChange, EngineError> {
        self.check_tick_range(tick_lower, tick_upper)?;

        let slot = self.slot;
        let mut lower_entry = self.ticks.get_or_default(tick_lower);
        let mut upper_entry = self.ticks.get_or_default(tick_upper);
        let mut flipped_lower = false;
        let mut flipped_upper = false;

        if liquidity_delta != 0 {
            let (tick_cumulative, seconds_per_liquidity) = self.oracle.observe_single(
                time,
                0,
                slot.tick,
                slot.observation_index,
                self.liquidity,
                slot.observation_cardinality,
            )?;
            flipped_lower = lower_entry.update(
                tick_lower,
                slot.tick,
                liquidity_delta,
                self.fee_growth_global0,
                self.fee_growth_global1,
                seconds_per_liquidity,
                tick_cumulative,
                time,
                false,
                self.max_liquidity_per_tick,
            )?;
            flipped_upper = upper_entry.update(
                tick_upper,
                slot.tick,
                liquidity_delta,
                self.fee_growth_global0,
                self.fee_growth_global1,
                seconds_per_liquidity,
                tick_cumulative,
                time,
                true,
                self.max_liquidity_per_tick,
            )?;
        }

        let (inside0, inside1) = tick::fee_growth_inside(
            &lower_entry,
            &upper_entry,
            tick_lower,
            tick_upper,
            slot.tick,
            self.fee_growth_global0,
            self.fee_growth_global1,
        );

        let key = PositionKey { owner, tick_lower, tick_upper };
        let mut position = self.positions.get_or_default(&key);
        position.update(liquidity_delta, inside0, inside1)?;

        let mut amount0 = I256::ZERO;
        let mut amount1 = I256::ZERO;
        let mut liquidity_after = None;
        if liquidity_delta != 0 {
            if slot.tick < tick_lower {
                // entirely above the current price: backed by asset 0 only
                amount0 = sqrt_price_math::amount0_delta_signed(
                    tick_math::sqrt_price_at_tick(tick_lower)?,
                    tick_math::sqrt_price_at_tick(tick_upper)?,
                    liquidity_delta,
                )?;
            } else if slot.tick < tick_upper {
                amount0 = sqrt_price_math::amount0_delta_signed(
                    slot.sqrt_price,
                    tick_math::sqrt_price_at_tick(tick_upper)?,
                    liquidity_delta,
                )?;
                amount1 = sqrt_price_math::amount1_delta_signed(
                    tick_math::sqrt_price_at_tick(tick_lower)?,
                    slot.sqrt_price,
                    liquidity_delta,
                )?;
                liquidity_after = Some(liquidity_math::add_delta(self.liquidity, liquidity_delta)?);
            } else {
                // entirely below the current price: backed by asset 1 only
                amount1 = sqrt_price_math::amount1_delta_signed(
                    tick_math::sqrt_price_at_tick(tick_lower)?,
                    tick_math::sqrt_price_at_tick(tick_upper)?,
                    liquidity_delta,
                )?;
            }
        }

        Ok(PositionChange {
            key,
            lower_entry,
            upper_entry,
            flipped_lower,
            flipped_upper,
            clear_lower: liquidity_delta < 0 && flipped_lower,
            clear_upper: liquidity_delta < 0 && flipped_upper,
            position,
            liquidity_after,
            amount0,
            amount1,
        })
    }

    /// Writes a staged position mutation. Runs only after every failure
    /// condition, including settlement, has been checked.
    fn commit_position_change(
        &mut self,
        change: &PositionChange,
        time: u32,
    ) -> Result<(), EngineError> {
        let PositionChange { key, .. } = change;

        if change.clear_lower {
            self.ticks.clear(key.tick_lower);
        } else {
            self.ticks.set(key.tick_lower, change.lower_entry);
        }
        if change.clear_upper {
            self.ticks.clear(key.tick_upper);
        } else {
            self.ticks.set(key.tick_upper, change.upper_entry);
        }
        if change.flipped_lower {
            self.bitmap.flip(key.tick_lower, self.tick_spacing)?;
        }
        if change.flipped_upper {
            self.bitmap.flip(key.tick_upper, self.tick_spacing)?;
        }

        self.positions.set(*key, change.position);

        if let Some(liquidity_after) = change.liquidity_after {
            // the observation is stamped with the pre-change tick and
            // liquidity, then the in-range total moves
            let (index, cardinality) = self.oracle.write(
                self.slot.observation_index,
                time,
                self.slot.tick,
                self.liquidity,
                self.slot.observation_cardinality,
                self.slot.observation_cardinality_next,
            );
            self.slot.observation_index = index;
            self.slot.observation_cardinality = cardinality;
            self.liquidity = liquidity_after;
        }
        Ok(())
    }
}

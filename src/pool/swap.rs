//! The iterative swap engine.
//!
//! A trade walks the price curve step by step. Each iteration consumes at
//! most the liquidity available up to the nearer of the next active tick
//! in the trade direction, the user's price limit, or the remaining
//! specified amount. Crossing an active tick flips its outside snapshots
//! and folds its net liquidity into the running total.
//!
//! Nothing shared is written while the loop runs: crossings are recorded
//! with the accumulator values they observed, and the whole result
//! commits in one step after settlement has been verified.
use alloy_primitives::{Address, I256, U256};
use tracing::trace;

use crate::{
    errors::EngineError,
    maths::{
        full_math::mul_div,
        liquidity_math, swap_math,
        tick_math::{self, MAX_SQRT_PRICE, MAX_TICK, MIN_SQRT_PRICE, MIN_TICK},
        Q128,
    },
    num::truncate_to_u128,
    pool::{AssetLedger, Pool, SwapPayment},
    safe_math::{safe_add_i256, safe_add_u256, safe_sub_i256},
};

/// Values read once at entry and reused across iterations.
struct SwapCache {
    fee_protocol: u8,
    liquidity_start: u128,
    tick_cumulative: i64,
    seconds_per_liquidity_cumulative: U256,
    computed_latest_observation: bool,
}

/// The running state of the trade, local until commit.
struct SwapState {
    amount_specified_remaining: I256,
    amount_calculated: I256,
    sqrt_price: U256,
    tick: i32,
    fee_growth_global: U256,
    protocol_fee: u128,
    liquidity: u128,
}

#[derive(Default)]
struct StepComputation {
    sqrt_price_start: U256,
    tick_next: i32,
    initialized: bool,
    sqrt_price_next: U256,
    amount_in: U256,
    amount_out: U256,
    fee_amount: U256,
}

/// A tick crossing observed by the loop, carrying the accumulator values
/// current at the moment of the crossing. Applied to the ledger at commit
/// time; each tick is crossed at most once per swap, so the deferred
/// rebase is exact.
struct CrossedTick {
    tick: i32,
    fee_growth_global0: U256,
    fee_growth_global1: U256,
    seconds_per_liquidity_cumulative: U256,
    tick_cumulative: i64,
}

impl Pool {
    /// Swaps one asset for the other.
    ///
    /// `amount_specified > 0` trades an exact input, negative an exact
    /// output. `sqrt_price_limit` is a hard boundary the trade will not
    /// cross; it must sit strictly between the current price and the
    /// legal domain bound on the trade's side. Output is transferred to
    /// `recipient` before the payment callback runs; the input balance is
    /// verified after it returns. Returns the signed
    /// `(amount0, amount1)` deltas from the pool's perspective.
    #[allow(clippy::too_many_arguments)]
    pub fn swap(
        &mut self,
        recipient: Address,
        zero_for_one: bool,
        amount_specified: I256,
        sqrt_price_limit: U256,
        time: u32,
        ledger: &mut dyn AssetLedger,
        payment: &mut dyn SwapPayment,
        data: &[u8],
    ) -> Result<(I256, I256), EngineError> {
        self.acquire_lock()?;
        let result = self.swap_inner(
            recipient,
            zero_for_one,
            amount_specified,
            sqrt_price_limit,
            time,
            ledger,
            payment,
            data,
        );
        self.release_lock();
        result
    }

    #[allow(clippy::too_many_arguments)]
    fn swap_inner(
        &mut self,
        recipient: Address,
        zero_for_one: bool,
        amount_specified: I256,
        sqrt_price_limit: U256,
        time: u32,
        ledger: &mut dyn AssetLedger,
        payment: &mut dyn SwapPayment,
        data: &[u8],
    ) -> Result<(I256, I256), EngineError> {
        if amount_specified.is_zero() {
            return Err(EngineError::ZeroAmount);
        }

        let slot_start = self.slot;
        let limit_valid = if zero_for_one {
            sqrt_price_limit < slot_start.sqrt_price && sqrt_price_limit > MIN_SQRT_PRICE
        } else {
            sqrt_price_limit > slot_start.sqrt_price && sqrt_price_limit < MAX_SQRT_PRICE
        };
        if !limit_valid {
            return Err(EngineError::InvalidPriceLimit);
        }

        let mut cache = SwapCache {
            fee_protocol: if zero_for_one {
                slot_start.fee_protocol % 16
            } else {
                slot_start.fee_protocol >> 4
            },
            liquidity_start: self.liquidity,
            tick_cumulative: 0,
            seconds_per_liquidity_cumulative: U256::ZERO,
            computed_latest_observation: false,
        };

        let exact_input = amount_specified > I256::ZERO;

        let mut state = SwapState {
            amount_specified_remaining: amount_specified,
            amount_calculated: I256::ZERO,
            sqrt_price: slot_start.sqrt_price,
            tick: slot_start.tick,
            fee_growth_global: if zero_for_one {
                self.fee_growth_global0
            } else {
                self.fee_growth_global1
            },
            protocol_fee: 0,
            liquidity: cache.liquidity_start,
        };
        let mut crossed: Vec<CrossedTick> = Vec::new();

        while !state.amount_specified_remaining.is_zero() && state.sqrt_price != sqrt_price_limit {
            let mut step = StepComputation {
                sqrt_price_start: state.sqrt_price,
                ..Default::default()
            };

            (step.tick_next, step.initialized) = self.bitmap.next_initialized_within_one_word(
                state.tick,
                self.tick_spacing,
                zero_for_one,
            );

            // the bitmap is unaware of the tick domain bounds
            step.tick_next = step.tick_next.clamp(MIN_TICK, MAX_TICK);
            step.sqrt_price_next = tick_math::sqrt_price_at_tick(step.tick_next)?;

            let target = if (zero_for_one && step.sqrt_price_next < sqrt_price_limit)
                || (!zero_for_one && step.sqrt_price_next > sqrt_price_limit)
            {
                sqrt_price_limit
            } else {
                step.sqrt_price_next
            };

            let (sqrt_price, amount_in, amount_out, fee_amount) = swap_math::compute_swap_step(
                state.sqrt_price,
                target,
                state.liquidity,
                state.amount_specified_remaining,
                self.fee_pips,
            )?;
            state.sqrt_price = sqrt_price;
            step.amount_in = amount_in;
            step.amount_out = amount_out;
            step.fee_amount = fee_amount;

            let step_in_total = i256_from(safe_add_u256(step.amount_in, step.fee_amount)?)?;
            let step_out = i256_from(step.amount_out)?;
            if exact_input {
                state.amount_specified_remaining =
                    safe_sub_i256(state.amount_specified_remaining, step_in_total)?;
                state.amount_calculated = safe_sub_i256(state.amount_calculated, step_out)?;
            } else {
                state.amount_specified_remaining =
                    safe_add_i256(state.amount_specified_remaining, step_out)?;
                state.amount_calculated = safe_add_i256(state.amount_calculated, step_in_total)?;
            }

            // protocol fee is skimmed from the raw fee charged, never
            // from the share attributed to in-range liquidity
            if cache.fee_protocol > 0 {
                let skim = step.fee_amount / U256::from(cache.fee_protocol);
                step.fee_amount -= skim;
                state.protocol_fee = state.protocol_fee.saturating_add(truncate_to_u128(skim));
            }

            if state.liquidity > 0 {
                state.fee_growth_global = state.fee_growth_global.wrapping_add(mul_div(
                    step.fee_amount,
                    Q128,
                    U256::from(state.liquidity),
                )?);
            }

            if state.sqrt_price == step.sqrt_price_next {
                // landed exactly on the boundary: cross it if active
                if step.initialized {
                    if !cache.computed_latest_observation {
                        let (tick_cumulative, seconds_per_liquidity) =
                            self.oracle.observe_single(
                                time,
                                0,
                                slot_start.tick,
                                slot_start.observation_index,
                                cache.liquidity_start,
                                slot_start.observation_cardinality,
                            )?;
                        cache.tick_cumulative = tick_cumulative;
                        cache.seconds_per_liquidity_cumulative = seconds_per_liquidity;
                        cache.computed_latest_observation = true;
                    }

                    let (fee_growth_global0, fee_growth_global1) = if zero_for_one {
                        (state.fee_growth_global, self.fee_growth_global1)
                    } else {
                        (self.fee_growth_global0, state.fee_growth_global)
                    };
                    crossed.push(CrossedTick {
                        tick: step.tick_next,
                        fee_growth_global0,
                        fee_growth_global1,
                        seconds_per_liquidity_cumulative: cache
                            .seconds_per_liquidity_cumulative,
                        tick_cumulative: cache.tick_cumulative,
                    });

                    let mut liquidity_net =
                        self.ticks.get_or_default(step.tick_next).liquidity_net;
                    if zero_for_one {
                        liquidity_net =
                            liquidity_net.checked_neg().ok_or(EngineError::LiquidityOverflow)?;
                    }
                    state.liquidity = liquidity_math::add_delta(state.liquidity, liquidity_net)?;
                }

                state.tick = if zero_for_one { step.tick_next - 1 } else { step.tick_next };
            } else if state.sqrt_price != step.sqrt_price_start {
                // stopped between boundaries; recompute the tick
                state.tick = tick_math::tick_at_sqrt_price(state.sqrt_price)?;
            }
        }

        let (amount0, amount1) = if zero_for_one == exact_input {
            (
                safe_sub_i256(amount_specified, state.amount_specified_remaining)?,
                state.amount_calculated,
            )
        } else {
            (
                state.amount_calculated,
                safe_sub_i256(amount_specified, state.amount_specified_remaining)?,
            )
        };

        // settle: the outgoing side leaves first, then the incoming side
        // is demanded and verified — only the deficient-inflow direction
        // can remain outstanding if this fails
        if zero_for_one {
            if amount1 < I256::ZERO {
                ledger.transfer(self.asset1, recipient, (-amount1).into_raw())?;
            }
            let balance_before = ledger.balance_of_pool(self.asset0)?;
            payment.pay_for_swap(&*self, ledger, amount0, amount1, data)?;
            let expected = safe_add_u256(balance_before, amount0.into_raw())?;
            let actual = ledger.balance_of_pool(self.asset0)?;
            if actual < expected {
                return Err(EngineError::SettlementShortfall { expected, actual });
            }
        } else {
            if amount0 < I256::ZERO {
                ledger.transfer(self.asset0, recipient, (-amount0).into_raw())?;
            }
            let balance_before = ledger.balance_of_pool(self.asset1)?;
            payment.pay_for_swap(&*self, ledger, amount0, amount1, data)?;
            let expected = safe_add_u256(balance_before, amount1.into_raw())?;
            let actual = ledger.balance_of_pool(self.asset1)?;
            if actual < expected {
                return Err(EngineError::SettlementShortfall { expected, actual });
            }
        }

        // commit: crossings, slot, liquidity, fee accumulators, oracle
        for crossing in &crossed {
            self.ticks.cross(
                crossing.tick,
                crossing.fee_growth_global0,
                crossing.fee_growth_global1,
                crossing.seconds_per_liquidity_cumulative,
                crossing.tick_cumulative,
                time,
            );
        }

        if state.tick != slot_start.tick {
            let (observation_index, observation_cardinality) = self.oracle.write(
                slot_start.observation_index,
                time,
                slot_start.tick,
                cache.liquidity_start,
                slot_start.observation_cardinality,
                slot_start.observation_cardinality_next,
            );
            self.slot.observation_index = observation_index;
            self.slot.observation_cardinality = observation_cardinality;
            self.slot.tick = state.tick;
        }
        self.slot.sqrt_price = state.sqrt_price;

        if cache.liquidity_start != state.liquidity {
            self.liquidity = state.liquidity;
        }

        if zero_for_one {
            self.fee_growth_global0 = state.fee_growth_global;
            if state.protocol_fee > 0 {
                self.protocol_fees.asset0 =
                    self.protocol_fees.asset0.saturating_add(state.protocol_fee);
            }
        } else {
            self.fee_growth_global1 = state.fee_growth_global;
            if state.protocol_fee > 0 {
                self.protocol_fees.asset1 =
                    self.protocol_fees.asset1.saturating_add(state.protocol_fee);
            }
        }

        trace!(
            %recipient,
            zero_for_one,
            %amount_specified,
            %amount0,
            %amount1,
            tick = state.tick,
            crossings = crossed.len(),
            "swap"
        );
        Ok((amount0, amount1))
    }
}

fn i256_from(value: U256) -> Result<I256, EngineError> {
    I256::try_from(value).map_err(|_| EngineError::ArithmeticOverflow)
}

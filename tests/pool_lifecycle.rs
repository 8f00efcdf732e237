//! End-to-end pool scenarios: mint/swap/burn lifecycles, settlement
//! verification, oracle behavior and state persistence.
use std::{cell::RefCell, collections::HashMap, rc::Rc, str::FromStr};

use alloy_primitives::{Address, I256, U256};

use clamm_engine::{
    errors::EngineError,
    maths::tick_math::{MAX_SQRT_PRICE, MIN_SQRT_PRICE},
    pool::{AssetLedger, FlashRepayment, MintPayment, Pool, SwapPayment},
};

const FEE_MEDIUM: u32 = 3000;
const SPACING_MEDIUM: i32 = 60;

fn asset0() -> Address {
    Address::repeat_byte(0x01)
}

fn asset1() -> Address {
    Address::repeat_byte(0x02)
}

fn lp() -> Address {
    Address::repeat_byte(0xaa)
}

fn trader() -> Address {
    Address::repeat_byte(0xbb)
}

/// sqrt price at tick 0: 2^96.
fn price_one() -> U256 {
    U256::from_str("79228162514264337593543950336").unwrap()
}

#[derive(Default)]
struct Assets {
    pool: HashMap<Address, U256>,
    received: HashMap<(Address, Address), U256>,
}

/// In-memory stand-in for the external asset ledger. Cloned handles share
/// one store, so settlement handlers can credit the pool while the engine
/// holds its own handle.
#[derive(Clone, Default)]
struct SharedAssets(Rc<RefCell<Assets>>);

impl SharedAssets {
    fn credit_pool(&self, asset: Address, amount: U256) {
        let mut assets = self.0.borrow_mut();
        let balance = assets.pool.entry(asset).or_default();
        *balance += amount;
    }

    fn pool_balance(&self, asset: Address) -> U256 {
        self.0.borrow().pool.get(&asset).copied().unwrap_or_default()
    }

    fn received_by(&self, asset: Address, who: Address) -> U256 {
        self.0.borrow().received.get(&(asset, who)).copied().unwrap_or_default()
    }
}

impl AssetLedger for SharedAssets {
    fn balance_of_pool(&self, asset: Address) -> Result<U256, EngineError> {
        Ok(self.pool_balance(asset))
    }

    fn transfer(&mut self, asset: Address, to: Address, amount: U256) -> Result<(), EngineError> {
        let mut assets = self.0.borrow_mut();
        let balance = assets.pool.entry(asset).or_default();
        if *balance < amount {
            return Err(EngineError::TransferFailed("insufficient pool balance".into()));
        }
        *balance -= amount;
        *assets.received.entry((asset, to)).or_default() += amount;
        Ok(())
    }
}

/// Pays exactly what is owed, short by a configurable amount for
/// settlement-failure tests.
struct Payer {
    assets: SharedAssets,
    short0: U256,
    short1: U256,
}

impl Payer {
    fn full(assets: &SharedAssets) -> Self {
        Payer { assets: assets.clone(), short0: U256::ZERO, short1: U256::ZERO }
    }
}

impl MintPayment for Payer {
    fn pay_for_mint(
        &mut self,
        pool: &Pool,
        _ledger: &mut dyn AssetLedger,
        amount0_owed: U256,
        amount1_owed: U256,
        _data: &[u8],
    ) -> Result<(), EngineError> {
        let (asset0, asset1) = pool.assets();
        self.assets.credit_pool(asset0, amount0_owed.saturating_sub(self.short0));
        self.assets.credit_pool(asset1, amount1_owed.saturating_sub(self.short1));
        Ok(())
    }
}

impl SwapPayment for Payer {
    fn pay_for_swap(
        &mut self,
        pool: &Pool,
        _ledger: &mut dyn AssetLedger,
        amount0: I256,
        amount1: I256,
        _data: &[u8],
    ) -> Result<(), EngineError> {
        let (asset0, asset1) = pool.assets();
        if amount0 > I256::ZERO {
            self.assets.credit_pool(asset0, amount0.into_raw().saturating_sub(self.short0));
        }
        if amount1 > I256::ZERO {
            self.assets.credit_pool(asset1, amount1.into_raw().saturating_sub(self.short1));
        }
        Ok(())
    }
}

/// Returns the borrowed principal plus the quoted fee.
struct FlashBorrower {
    assets: SharedAssets,
    principal0: U256,
    principal1: U256,
    skip_fee: bool,
}

impl FlashRepayment for FlashBorrower {
    fn repay_flash(
        &mut self,
        pool: &Pool,
        _ledger: &mut dyn AssetLedger,
        fee0: U256,
        fee1: U256,
        _data: &[u8],
    ) -> Result<(), EngineError> {
        let (asset0, asset1) = pool.assets();
        let (fee0, fee1) = if self.skip_fee { (U256::ZERO, U256::ZERO) } else { (fee0, fee1) };
        self.assets.credit_pool(asset0, self.principal0 + fee0);
        self.assets.credit_pool(asset1, self.principal1 + fee1);
        Ok(())
    }
}

struct Harness {
    pool: Pool,
    assets: SharedAssets,
}

impl Harness {
    /// A pool at price 1.0 (tick 0) with the medium fee tier.
    fn new() -> Self {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
        let mut pool = Pool::new(asset0(), asset1(), FEE_MEDIUM, SPACING_MEDIUM).unwrap();
        pool.initialize(price_one(), 1_000).unwrap();
        Harness { pool, assets: SharedAssets::default() }
    }

    fn mint(&mut self, lower: i32, upper: i32, amount: u128, time: u32) -> (U256, U256) {
        let mut ledger = self.assets.clone();
        let mut payer = Payer::full(&self.assets);
        self.pool
            .mint(lp(), lower, upper, amount, time, &mut ledger, &mut payer, &[])
            .unwrap()
    }

    fn swap(
        &mut self,
        zero_for_one: bool,
        amount: I256,
        limit: Option<U256>,
        time: u32,
    ) -> Result<(I256, I256), EngineError> {
        let limit = limit.unwrap_or(if zero_for_one {
            MIN_SQRT_PRICE + U256::from(1u64)
        } else {
            MAX_SQRT_PRICE - U256::from(1u64)
        });
        let mut ledger = self.assets.clone();
        let mut payer = Payer::full(&self.assets);
        self.pool.swap(trader(), zero_for_one, amount, limit, time, &mut ledger, &mut payer, &[])
    }
}

#[test]
fn mint_takes_both_assets_around_current_price() {
    let mut harness = Harness::new();
    let (amount0, amount1) = harness.mint(-600, 600, 1_000_000, 1_000);

    assert!(amount0 > U256::ZERO);
    assert!(amount1 > U256::ZERO);
    assert_eq!(harness.assets.pool_balance(asset0()), amount0);
    assert_eq!(harness.assets.pool_balance(asset1()), amount1);
    assert_eq!(harness.pool.liquidity(), 1_000_000);

    let position = harness.pool.position(lp(), -600, 600).unwrap();
    assert_eq!(position.liquidity, 1_000_000);
    assert!(harness.pool.tick_entry(-600).unwrap().initialized);
    assert!(harness.pool.tick_entry(600).unwrap().initialized);
}

#[test]
fn mint_above_range_takes_only_asset0() {
    let mut harness = Harness::new();
    let (amount0, amount1) = harness.mint(60, 120, 500_000, 1_000);
    assert!(amount0 > U256::ZERO);
    assert_eq!(amount1, U256::ZERO);
    // out-of-range liquidity earns nothing yet
    assert_eq!(harness.pool.liquidity(), 0);
}

#[test]
fn exact_input_swap_moves_tick_down_and_charges_fee() {
    let mut harness = Harness::new();
    harness.mint(-600, 600, 1_000_000, 1_000);

    let (amount0, amount1) = harness.swap(true, I256::from_raw(U256::from(1000u64)), None, 1_010).unwrap();

    // the pool took exactly the input and paid out strictly less than it
    assert_eq!(amount0, I256::from_raw(U256::from(1000u64)));
    assert!(amount1 < I256::ZERO);
    assert!(-amount1 < I256::from_raw(U256::from(1000u64)));

    // price dropped below tick 0 but stayed inside the position's range
    assert!(harness.pool.current_tick() < 0);
    assert!(harness.pool.current_tick() >= -600);
    assert_eq!(harness.pool.liquidity(), 1_000_000);

    // the fee landed in the global accumulator for asset 0
    let (fee_growth0, fee_growth1) = harness.pool.fee_growth_global();
    assert!(fee_growth0 > U256::ZERO);
    assert_eq!(fee_growth1, U256::ZERO);

    // output actually left the pool
    assert_eq!(harness.assets.received_by(asset1(), trader()), (-amount1).into_raw());
}

#[test]
fn inverse_trade_returns_price_to_origin() {
    let mut harness = Harness::new();
    harness.mint(-600, 600, 10_000_000, 1_000);
    let origin = harness.pool.sqrt_price();

    harness.swap(true, I256::from_raw(U256::from(50_000u64)), None, 1_010).unwrap();
    assert!(harness.pool.sqrt_price() < origin);

    // trade back with the origin price as the hard limit; the loop stops
    // exactly there
    harness
        .swap(false, I256::from_raw(U256::from(10_000_000u64)), Some(origin), 1_020)
        .unwrap();
    assert_eq!(harness.pool.sqrt_price(), origin);

    // both legs paid fees
    let (fee_growth0, fee_growth1) = harness.pool.fee_growth_global();
    assert!(fee_growth0 > U256::ZERO);
    assert!(fee_growth1 > U256::ZERO);
}

#[test]
fn swap_crossing_a_boundary_sheds_liquidity() {
    let mut harness = Harness::new();
    harness.mint(-600, 600, 1_000_000, 1_000);
    harness.mint(-60, 60, 4_000_000, 1_000);
    assert_eq!(harness.pool.liquidity(), 5_000_000);

    // push price below -60: the narrow position drops out
    harness.swap(true, I256::from_raw(U256::from(40_000u64)), None, 1_010).unwrap();
    assert!(harness.pool.current_tick() < -60);
    assert_eq!(harness.pool.liquidity(), 1_000_000);
}

#[test]
fn zero_amount_swap_rejected() {
    let mut harness = Harness::new();
    harness.mint(-600, 600, 1_000_000, 1_000);
    assert_eq!(harness.swap(true, I256::ZERO, None, 1_010), Err(EngineError::ZeroAmount));
}

#[test]
fn price_limit_on_wrong_side_rejected() {
    let mut harness = Harness::new();
    harness.mint(-600, 600, 1_000_000, 1_000);
    // selling asset 0 moves price down; a limit above spot is invalid
    let above = harness.pool.sqrt_price() + U256::from(1u64);
    assert_eq!(
        harness.swap(true, I256::from_raw(U256::from(1000u64)), Some(above), 1_010),
        Err(EngineError::InvalidPriceLimit)
    );
    // and outside the domain entirely
    assert_eq!(
        harness.swap(true, I256::from_raw(U256::from(1000u64)), Some(MIN_SQRT_PRICE), 1_010),
        Err(EngineError::InvalidPriceLimit)
    );
}

#[test]
fn settlement_shortfall_fails_swap_and_leaves_state_untouched() {
    let mut harness = Harness::new();
    harness.mint(-600, 600, 1_000_000, 1_000);
    let slot_before = *harness.pool.slot();
    let growth_before = harness.pool.fee_growth_global();

    let mut ledger = harness.assets.clone();
    let mut payer = Payer {
        assets: harness.assets.clone(),
        short0: U256::from(1u64),
        short1: U256::ZERO,
    };
    let result = harness.pool.swap(
        trader(),
        true,
        I256::from_raw(U256::from(1000u64)),
        MIN_SQRT_PRICE + U256::from(1u64),
        1_010,
        &mut ledger,
        &mut payer,
        &[],
    );
    assert!(matches!(result, Err(EngineError::SettlementShortfall { .. })));

    // no partial mutation: price, tick and accumulators are as before
    assert_eq!(*harness.pool.slot(), slot_before);
    assert_eq!(harness.pool.fee_growth_global(), growth_before);
    assert_eq!(harness.pool.liquidity(), 1_000_000);

    // the lock was released on the failure path
    assert!(harness.swap(true, I256::from_raw(U256::from(1000u64)), None, 1_020).is_ok());
}

#[test]
fn mint_shortfall_rejected_before_any_state_change() {
    let mut harness = Harness::new();
    let mut ledger = harness.assets.clone();
    let mut payer =
        Payer { assets: harness.assets.clone(), short0: U256::ZERO, short1: U256::from(1u64) };
    let result = harness.pool.mint(
        lp(),
        -600,
        600,
        1_000_000,
        1_000,
        &mut ledger,
        &mut payer,
        &[],
    );
    assert!(matches!(result, Err(EngineError::SettlementShortfall { .. })));
    assert_eq!(harness.pool.liquidity(), 0);
    assert!(harness.pool.position(lp(), -600, 600).is_none());
    assert!(harness.pool.tick_entry(-600).is_none());
}

#[test]
fn burn_zero_is_a_fee_poke_and_is_idempotent() {
    let mut harness = Harness::new();
    harness.mint(-600, 600, 1_000_000, 1_000);
    harness.swap(true, I256::from_raw(U256::from(100_000u64)), None, 1_010).unwrap();

    harness.pool.burn(lp(), -600, 600, 0, 1_020).unwrap();
    let after_first = *harness.pool.position(lp(), -600, 600).unwrap();
    assert_eq!(after_first.liquidity, 1_000_000);
    assert!(after_first.tokens_owed0 > 0, "poke must credit swap fees");

    // no accrual between pokes: the second changes nothing
    harness.pool.burn(lp(), -600, 600, 0, 1_030).unwrap();
    let after_second = *harness.pool.position(lp(), -600, 600).unwrap();
    assert_eq!(after_first, after_second);
}

#[test]
fn poke_of_absent_position_rejected() {
    let mut harness = Harness::new();
    harness.mint(-600, 600, 1_000_000, 1_000);
    assert_eq!(
        harness.pool.burn(trader(), -600, 600, 0, 1_010),
        Err(EngineError::EmptyPosition)
    );
}

#[test]
fn two_mints_then_full_burn_zeroes_liquidity_and_keeps_fees() {
    let mut harness = Harness::new();
    let (first0, first1) = harness.mint(-600, 600, 600_000, 1_000);
    harness.swap(true, I256::from_raw(U256::from(50_000u64)), None, 1_010).unwrap();
    let (second0, second1) = harness.mint(-600, 600, 400_000, 1_020);
    harness.swap(false, I256::from_raw(U256::from(50_000u64)), None, 1_030).unwrap();

    let (burn0, burn1) = harness.pool.burn(lp(), -600, 600, 1_000_000, 1_040).unwrap();

    let position = harness.pool.position(lp(), -600, 600).unwrap();
    assert_eq!(position.liquidity, 0);
    assert_eq!(harness.pool.liquidity(), 0);

    // owed balances carry principal from the burn plus fees from both
    // swap intervals
    let principal0: u128 = burn0.to::<u128>();
    let principal1: u128 = burn1.to::<u128>();
    assert!(position.tokens_owed0 > principal0);
    assert!(position.tokens_owed1 > principal1);

    // the pool held enough to honor a full collect
    let minted0 = (first0 + second0).to::<u128>();
    let minted1 = (first1 + second1).to::<u128>();
    assert!(position.tokens_owed0 <= minted0 + 50_000);
    assert!(position.tokens_owed1 <= minted1 + 50_000);

    // boundary ticks were deactivated and cleared
    assert!(harness.pool.tick_entry(-600).is_none());
    assert!(harness.pool.tick_entry(600).is_none());
}

#[test]
fn collect_clamps_to_owed_and_pays_out() {
    let mut harness = Harness::new();
    harness.mint(-600, 600, 1_000_000, 1_000);
    harness.swap(true, I256::from_raw(U256::from(100_000u64)), None, 1_010).unwrap();
    harness.pool.burn(lp(), -600, 600, 0, 1_020).unwrap();

    let owed0 = harness.pool.position(lp(), -600, 600).unwrap().tokens_owed0;
    assert!(owed0 > 0);

    let mut ledger = harness.assets.clone();
    let (collected0, collected1) = harness
        .pool
        .collect(lp(), lp(), -600, 600, u128::MAX, u128::MAX, &mut ledger)
        .unwrap();
    assert_eq!(collected0, owed0);
    assert_eq!(collected1, 0);
    assert_eq!(harness.assets.received_by(asset0(), lp()), U256::from(owed0));

    let position = harness.pool.position(lp(), -600, 600).unwrap();
    assert_eq!(position.tokens_owed0, 0);
}

#[test]
fn full_range_position_sees_global_fee_growth() {
    let mut harness = Harness::new();
    // a full-width range: every fee the pool earns is inside it
    let lower = -887_220; // widest spacing-aligned range
    let upper = 887_220;
    harness.mint(lower, upper, 1_000_000, 1_000);
    harness.swap(true, I256::from_raw(U256::from(100_000u64)), None, 1_010).unwrap();

    harness.pool.burn(lp(), lower, upper, 0, 1_020).unwrap();
    let position = harness.pool.position(lp(), lower, upper).unwrap();
    let (fee_growth0, _) = harness.pool.fee_growth_global();
    assert_eq!(position.fee_growth_inside0_last, fee_growth0);
}

#[test]
fn protocol_fee_skim_accrues_and_collects() {
    let mut harness = Harness::new();
    harness.pool.set_fee_protocol(4, 4).unwrap();
    harness.mint(-600, 600, 1_000_000, 1_000);
    harness.swap(true, I256::from_raw(U256::from(100_000u64)), None, 1_010).unwrap();

    let (protocol0, protocol1) = harness.pool.protocol_fees();
    assert!(protocol0 > 0);
    assert_eq!(protocol1, 0);

    let mut ledger = harness.assets.clone();
    let owner = Address::repeat_byte(0xcc);
    let (collected0, _) = harness
        .pool
        .collect_protocol(owner, u128::MAX, u128::MAX, &mut ledger)
        .unwrap();
    assert_eq!(collected0, protocol0);
    assert_eq!(harness.pool.protocol_fees().0, 0);
    assert_eq!(harness.assets.received_by(asset0(), owner), U256::from(protocol0));
}

#[test]
fn invalid_protocol_fee_rejected() {
    let mut harness = Harness::new();
    assert_eq!(harness.pool.set_fee_protocol(3, 0), Err(EngineError::InvalidProtocolFee));
    assert_eq!(harness.pool.set_fee_protocol(0, 11), Err(EngineError::InvalidProtocolFee));
    assert!(harness.pool.set_fee_protocol(0, 0).is_ok());
}

#[test]
fn flash_loan_charges_fee_and_grows_accumulators() {
    let mut harness = Harness::new();
    harness.mint(-600, 600, 1_000_000, 1_000);
    let growth_before = harness.pool.fee_growth_global();

    let principal0 = U256::from(10_000u64);
    let mut ledger = harness.assets.clone();
    let mut borrower = FlashBorrower {
        assets: harness.assets.clone(),
        principal0,
        principal1: U256::ZERO,
        skip_fee: false,
    };
    let (paid0, paid1) = harness
        .pool
        .flash(trader(), principal0, U256::ZERO, &mut ledger, &mut borrower, &[])
        .unwrap();
    assert!(paid0 > U256::ZERO);
    assert_eq!(paid1, U256::ZERO);
    assert!(harness.pool.fee_growth_global().0 > growth_before.0);
}

#[test]
fn flash_without_repaying_fee_fails() {
    let mut harness = Harness::new();
    harness.mint(-600, 600, 1_000_000, 1_000);

    let principal0 = U256::from(10_000u64);
    let mut ledger = harness.assets.clone();
    let mut borrower = FlashBorrower {
        assets: harness.assets.clone(),
        principal0,
        principal1: U256::ZERO,
        skip_fee: true,
    };
    let result =
        harness.pool.flash(trader(), principal0, U256::ZERO, &mut ledger, &mut borrower, &[]);
    assert!(matches!(result, Err(EngineError::SettlementShortfall { .. })));
}

#[test]
fn flash_requires_in_range_liquidity() {
    let mut harness = Harness::new();
    let mut ledger = harness.assets.clone();
    let mut borrower = FlashBorrower {
        assets: harness.assets.clone(),
        principal0: U256::ZERO,
        principal1: U256::ZERO,
        skip_fee: false,
    };
    assert_eq!(
        harness.pool.flash(trader(), U256::ZERO, U256::ZERO, &mut ledger, &mut borrower, &[]),
        Err(EngineError::InsufficientLiquidity)
    );
}

#[test]
fn oracle_rejects_targets_older_than_history() {
    let mut harness = Harness::new(); // initialized at t = 1_000
    harness.pool.grow_observation_capacity(4).unwrap();
    harness.mint(-600, 600, 1_000_000, 1_000);
    harness.swap(true, I256::from_raw(U256::from(1_000u64)), None, 1_100).unwrap();

    // the pool's history starts at t = 1_000; t = 900 must fail
    assert_eq!(
        harness.pool.observe(1_100, &[200]).unwrap_err(),
        EngineError::ObservationTooOld
    );
    assert!(harness.pool.observe(1_100, &[100]).is_ok());
}

#[test]
fn oracle_twap_reflects_tick_history() {
    let mut harness = Harness::new();
    harness.pool.grow_observation_capacity(8).unwrap();
    harness.mint(-600, 600, 1_000_000, 1_000);

    // move the tick, then let time pass at the new tick
    harness.swap(true, I256::from_raw(U256::from(100_000u64)), None, 1_100).unwrap();
    let tick_after = harness.pool.current_tick();
    assert!(tick_after < 0);

    let (tick_cumulatives, _) = harness.pool.observe(1_200, &[100, 0]).unwrap();
    let twap = (tick_cumulatives[1] - tick_cumulatives[0]) / 100;
    // the whole window sat at the post-swap tick
    assert_eq!(twap, tick_after as i64);
}

#[test]
fn snapshot_range_tracks_seconds_inside() {
    let mut harness = Harness::new();
    harness.mint(-600, 600, 1_000_000, 1_000);

    let (_, _, seconds_a) = harness.pool.snapshot_range(-600, 600, 1_250).unwrap();
    let (_, _, seconds_b) = harness.pool.snapshot_range(-600, 600, 1_500).unwrap();
    // price stayed inside the range the whole time
    assert_eq!(seconds_b - seconds_a, 250);
}

#[test]
fn snapshot_range_requires_active_boundaries() {
    let mut harness = Harness::new();
    harness.mint(-600, 600, 1_000_000, 1_000);
    assert_eq!(
        harness.pool.snapshot_range(-1200, 600, 1_100),
        Err(EngineError::EmptyPosition)
    );
}

#[test]
fn operations_require_initialization() {
    let mut pool = Pool::new(asset0(), asset1(), FEE_MEDIUM, SPACING_MEDIUM).unwrap();
    let assets = SharedAssets::default();
    let mut ledger = assets.clone();
    let mut payer = Payer::full(&assets);
    assert_eq!(
        pool.mint(lp(), -600, 600, 1, 1_000, &mut ledger, &mut payer, &[]),
        Err(EngineError::NotInitialized)
    );
    assert_eq!(pool.observe(1_000, &[0]), Err(EngineError::NotInitialized));
}

#[test]
fn spot_price_tracks_sqrt_price() {
    let mut harness = Harness::new();
    assert!((harness.pool.spot_price(18, 18) - 1.0).abs() < 1e-12);

    harness.mint(-600, 600, 1_000_000, 1_000);
    harness.swap(true, I256::from_raw(U256::from(1_000u64)), None, 1_010).unwrap();
    assert!(harness.pool.spot_price(18, 18) < 1.0);
}

#[test]
fn initialize_twice_rejected() {
    let mut harness = Harness::new();
    assert_eq!(
        harness.pool.initialize(price_one(), 2_000),
        Err(EngineError::AlreadyInitialized)
    );
}

#[test]
fn misaligned_and_inverted_ranges_rejected() {
    let mut harness = Harness::new();
    let mut ledger = harness.assets.clone();
    let mut payer = Payer::full(&harness.assets);
    assert_eq!(
        harness.pool.mint(lp(), -601, 600, 1, 1_000, &mut ledger, &mut payer, &[]),
        Err(EngineError::TickNotAligned { tick: -601, spacing: 60 })
    );
    assert_eq!(
        harness.pool.mint(lp(), 600, -600, 1, 1_000, &mut ledger, &mut payer, &[]),
        Err(EngineError::InvalidTickRange { lower: 600, upper: -600 })
    );
    assert_eq!(
        harness.pool.mint(lp(), -887_280, 600, 1, 1_000, &mut ledger, &mut payer, &[]),
        Err(EngineError::TickOutOfRange(-887_280))
    );
}

#[test]
fn pool_state_survives_serde_round_trip() {
    let mut harness = Harness::new();
    harness.mint(-600, 600, 1_000_000, 1_000);
    harness.swap(true, I256::from_raw(U256::from(100_000u64)), None, 1_010).unwrap();

    let encoded = serde_json::to_string(&harness.pool).unwrap();
    let mut restored: Pool = serde_json::from_str(&encoded).unwrap();
    assert_eq!(restored, harness.pool);

    // the restored pool keeps trading from where it left off
    let mut ledger = harness.assets.clone();
    let mut payer = Payer::full(&harness.assets);
    let result = restored.swap(
        trader(),
        false,
        I256::from_raw(U256::from(1_000u64)),
        MAX_SQRT_PRICE - U256::from(1u64),
        1_020,
        &mut ledger,
        &mut payer,
        &[],
    );
    assert!(result.is_ok());
}

//! Engine errors
use thiserror::Error;

use alloy_primitives::U256;

/// Errors reported by the pricing and accounting core.
///
/// Every failure is reported synchronously to the caller of the violating
/// operation; nothing is retried internally and nothing is downgraded to a
/// default value. Mutating entry points stage their work and commit only
/// after all failure conditions have been checked, so an `Err` means no
/// shared state was touched.
///
/// Variants fall into the groups below:
/// - domain violations: rejected before any computation touches state
/// - capacity violations: a liquidity accumulator or per-tick cap would
///   over/underflow
/// - settlement violations: the caller's callback did not deliver enough
///   balance, or the asset ledger refused a transfer
/// - reentrancy: a mutating entry point was invoked while another one holds
///   the pool lock
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("pool is already initialized")]
    AlreadyInitialized,
    #[error("pool is not initialized")]
    NotInitialized,
    #[error("reentrant call rejected: pool is locked")]
    PoolLocked,

    #[error("tick {0} outside the legal tick domain")]
    TickOutOfRange(i32),
    #[error("tick {tick} is not a multiple of the pool tick spacing {spacing}")]
    TickNotAligned { tick: i32, spacing: i32 },
    #[error("tick range inverted or empty: lower {lower} >= upper {upper}")]
    InvalidTickRange { lower: i32, upper: i32 },
    #[error("sqrt price {0} outside the legal price domain")]
    PriceOutOfRange(U256),
    #[error("price limit is outside the domain or on the wrong side of the current price")]
    InvalidPriceLimit,
    #[error("amount must be nonzero")]
    ZeroAmount,
    #[error("no position with liquidity at the given key")]
    EmptyPosition,
    #[error("protocol fee denominator must be 0 or within 4..=10")]
    InvalidProtocolFee,
    #[error("tick spacing must be a positive integer")]
    InvalidTickSpacing,
    #[error("swap fee must be below the pips denominator")]
    InvalidFee,

    #[error("per-tick gross liquidity cap exceeded")]
    TickLiquidityCap,
    #[error("liquidity accumulator over/underflow")]
    LiquidityOverflow,
    #[error("arithmetic overflow")]
    ArithmeticOverflow,
    #[error("division by zero")]
    DivisionByZero,

    #[error("in-range liquidity is zero")]
    InsufficientLiquidity,
    #[error("settlement shortfall: expected balance of at least {expected}, found {actual}")]
    SettlementShortfall { expected: U256, actual: U256 },
    #[error("asset transfer failed: {0}")]
    TransferFailed(String),
    #[error("settlement callback failed: {0}")]
    CallbackFailed(String),

    #[error("observation target predates the oldest retained entry")]
    ObservationTooOld,
    #[error("oracle has no initialized observations")]
    OracleUninitialized,
}

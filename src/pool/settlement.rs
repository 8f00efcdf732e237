//! Settlement interfaces between the engine and its host environment.
//!
//! The engine never moves assets itself. It reads balances and orders
//! transfers through an [`AssetLedger`], and asks the caller to deliver
//! owed funds through a per-operation callback injected at call time.
//! After a callback returns, the engine re-reads balances and fails the
//! whole operation if the increase is insufficient — the callback is
//! trusted to move funds, never to report them.
//!
//! Callbacks receive a shared reference to the pool, so the read-only
//! query surface is available from inside a settlement while the mutating
//! surface stays out of reach.
use alloy_primitives::{Address, I256, U256};

use crate::{errors::EngineError, pool::Pool};

/// The external asset ledger collaborator.
///
/// Exactly two operations are needed: read the pool's own balance and
/// transfer an amount out to a recipient. Both are fallible and checked;
/// an implementation bridging a boolean-return transfer contract should
/// map `false` to [`EngineError::TransferFailed`].
pub trait AssetLedger {
    fn balance_of_pool(&self, asset: Address) -> Result<U256, EngineError>;
    fn transfer(&mut self, asset: Address, to: Address, amount: U256)
        -> Result<(), EngineError>;
}

/// Caller-side settlement for [`Pool::mint`]: deliver the owed amounts of
/// both assets to the pool before returning.
pub trait MintPayment {
    fn pay_for_mint(
        &mut self,
        pool: &Pool,
        ledger: &mut dyn AssetLedger,
        amount0_owed: U256,
        amount1_owed: U256,
        data: &[u8],
    ) -> Result<(), EngineError>;
}

/// Caller-side settlement for [`Pool::swap`]: the positive amount is owed
/// to the pool, the negative one has already been sent to the recipient.
pub trait SwapPayment {
    fn pay_for_swap(
        &mut self,
        pool: &Pool,
        ledger: &mut dyn AssetLedger,
        amount0: I256,
        amount1: I256,
        data: &[u8],
    ) -> Result<(), EngineError>;
}

/// Caller-side settlement for [`Pool::flash`]: return the borrowed
/// principal plus the quoted fees before returning.
pub trait FlashRepayment {
    fn repay_flash(
        &mut self,
        pool: &Pool,
        ledger: &mut dyn AssetLedger,
        fee0: U256,
        fee1: U256,
        data: &[u8],
    ) -> Result<(), EngineError>;
}

//! Stateful ledgers of the pool: the sparse tick table, the activation
//! bitmap that mirrors it, per-range positions and the time-weighted
//! oracle ring.
//!
//! Each ledger owns its backing table and is manipulated only through its
//! methods; nothing outside these modules writes a record ad hoc.
pub mod bitmap;
pub mod oracle;
pub mod position;
pub mod tick;

//! Background jobs
//!
//! Interval-driven repairs that run beside the request path: 4h price
//! reconciliation and disabling trades of de-whitelisted miners.

mod reconcile;
mod whitelist_sweep;

pub use reconcile::{PriceReconciler, ReconcileConfig, ReconcileReport};
pub use whitelist_sweep::WhitelistSweeper;

//! 4h price reconciliation
//!
//! Trades get their `price_4h` inline only when a close follows quickly.
//! Everything else is picked up here once four hours have passed.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::error::StoreError;
use crate::oracle::PriceOracle;
use crate::persistence::{ScanCursor, TradeStore};
use crate::types::Trade;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileConfig {
    pub interval: Duration,
    /// Offset from trade timestamp to the reference price
    pub horizon_secs: i64,
    /// Trades read per page; a tick keeps paging until the scan is done
    pub batch_limit: i64,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            horizon_secs: 4 * 60 * 60,
            batch_limit: 1000,
        }
    }
}

/// Outcome of one reconciliation pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub scanned: usize,
    pub updated: usize,
    pub failed: usize,
}

pub struct PriceReconciler {
    trades: Arc<dyn TradeStore>,
    oracle: Arc<dyn PriceOracle>,
    clock: Arc<dyn Clock>,
    config: ReconcileConfig,
}

impl PriceReconciler {
    pub fn new(
        trades: Arc<dyn TradeStore>,
        oracle: Arc<dyn PriceOracle>,
        clock: Arc<dyn Clock>,
        config: ReconcileConfig,
    ) -> Self {
        Self {
            trades,
            oracle,
            clock,
            config,
        }
    }

    /// One pass over every trade whose horizon has elapsed, read in pages
    /// of `batch_limit`. A failing trade is logged and left for the next
    /// pass; it never holds back the trades behind it.
    pub async fn run_once(&self) -> Result<ReconcileReport, StoreError> {
        let cutoff = self.clock.unix() - self.config.horizon_secs;
        let page_size = self.config.batch_limit.max(1);
        let mut report = ReconcileReport::default();
        let mut cursor: Option<ScanCursor> = None;

        loop {
            let page = self
                .trades
                .trades_missing_price_4h(cutoff, cursor.as_ref(), page_size)
                .await?;
            let Some(last) = page.last() else {
                break;
            };
            cursor = Some(ScanCursor::of(last));
            let full = page.len() as i64 == page_size;

            report.scanned += page.len();
            for trade in &page {
                if self.reconcile(trade).await {
                    report.updated += 1;
                } else {
                    report.failed += 1;
                }
            }

            if !full {
                break;
            }
        }

        Ok(report)
    }

    async fn reconcile(&self, trade: &Trade) -> bool {
        let at = trade.timestamp + self.config.horizon_secs;
        let price = match self.oracle.price_at(&trade.token, at).await {
            Ok(p) => p,
            Err(e) => {
                warn!(
                    miner = %trade.miner_id,
                    token = %trade.token,
                    nonce = trade.nonce,
                    error = %e,
                    "No 4h price yet"
                );
                return false;
            }
        };

        match self.trades.update_price_4h(&trade.key(), price).await {
            Ok(_) => {
                debug!(
                    miner = %trade.miner_id,
                    token = %trade.token,
                    nonce = trade.nonce,
                    %price,
                    "4h price reconciled"
                );
                true
            }
            Err(e) => {
                warn!(
                    miner = %trade.miner_id,
                    nonce = trade.nonce,
                    error = %e,
                    "Failed to store 4h price"
                );
                false
            }
        }
    }

    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                "⏱️ Price reconciler started (every {:?})",
                self.config.interval
            );
            let mut interval = tokio::time::interval(self.config.interval);
            loop {
                interval.tick().await;
                match self.run_once().await {
                    Ok(report) if report.scanned > 0 => info!(
                        scanned = report.scanned,
                        updated = report.updated,
                        failed = report.failed,
                        "Reconciliation pass"
                    ),
                    Ok(_) => {}
                    Err(e) => error!(error = %e, "Reconciliation scan failed"),
                }
            }
        })
    }
}

//! Disables trades of miners dropped from the whitelist

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::error::StoreError;
use crate::persistence::TradeStore;

pub struct WhitelistSweeper {
    trades: Arc<dyn TradeStore>,
    interval: Duration,
}

impl WhitelistSweeper {
    pub fn new(trades: Arc<dyn TradeStore>, interval: Duration) -> Self {
        Self { trades, interval }
    }

    pub async fn run_once(&self) -> Result<u64, StoreError> {
        self.trades.disable_trades_of_inactive_miners().await
    }

    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("🧹 Whitelist sweeper started (every {:?})", self.interval);
            let mut interval = tokio::time::interval(self.interval);
            loop {
                interval.tick().await;
                match self.run_once().await {
                    Ok(0) => {}
                    Ok(disabled) => info!(disabled, "Disabled trades of inactive miners"),
                    Err(e) => error!(error = %e, "Whitelist sweep failed"),
                }
            }
        })
    }
}

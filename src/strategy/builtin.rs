//! Built-in remediation strategies.
//!
//! 内置修复策略。

use super::{Strategy, StrategyContext, StrategyOutcome};
use crate::{
    error::Result,
    operation::{ClearServices, Disconnect},
    transaction::Transaction,
};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info};

/// Holds the result back for a fixed delay before it is delivered.
/// 在交付结果之前将其延迟固定时间。
#[derive(Debug, Clone)]
pub struct DelayedDelivery {
    delay: Duration,
}

impl DelayedDelivery {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl Strategy for DelayedDelivery {
    fn name(&self) -> &'static str {
        "DelayedDelivery"
    }

    async fn apply(&self, ctx: StrategyContext) -> Result<StrategyOutcome> {
        debug!(
            device = ?ctx.device,
            delay = ?self.delay,
            "Delaying result delivery"
        );
        tokio::time::sleep(self.delay).await;
        Ok(StrategyOutcome::unchanged())
    }
}

/// Releases the native handle with a forced disconnect queued ahead of pending work.
///
/// The connection rests in `Disconnected`; the caller has to connect again.
///
/// 通过排在待处理工作之前的强制断开来释放原生句柄。连接停留在 `Disconnected`。
#[derive(Debug, Clone, Copy)]
pub struct ForceDisconnect {
    timeout: Duration,
}

impl ForceDisconnect {
    /// `timeout` bounds the corrective disconnect; a vanished device often never
    /// answers it.
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl Strategy for ForceDisconnect {
    fn name(&self) -> &'static str {
        "ForceDisconnect"
    }

    async fn apply(&self, ctx: StrategyContext) -> Result<StrategyOutcome> {
        info!(
            device = ?ctx.device,
            situation = ?ctx.situation,
            state = %ctx.state,
            "Forcing disconnect"
        );
        Ok(StrategyOutcome::unchanged()
            .then(Transaction::new(Disconnect::new().force()).with_timeout(self.timeout)))
    }
}

/// Wipes every service from the local server so later registrations start clean.
/// 清除本地服务器上的所有服务，使后续注册从干净状态开始。
#[derive(Debug, Clone, Copy, Default)]
pub struct ClearServerServices;

#[async_trait]
impl Strategy for ClearServerServices {
    fn name(&self) -> &'static str {
        "ClearServerServices"
    }

    async fn apply(&self, ctx: StrategyContext) -> Result<StrategyOutcome> {
        info!(service = ?ctx.result.service(), "Clearing server services");
        Ok(StrategyOutcome::unchanged().then(Transaction::new(ClearServices::new())))
    }
}

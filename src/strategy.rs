//! 修复策略 - 针对设备/平台特有异常的可插拔修复逻辑
//! Remediation strategies - Pluggable corrective behavior for device/platform quirks
//!
//! Operations and the connection actor classify anomalies into a [`Situation`].
//! The [`StrategyProvider`] maps `(device profile, situation)` to a
//! [`Strategy`], which runs on its own task while the connection slot is held
//! and returns a [`StrategyOutcome`] describing how to finish the transaction.

mod builtin;
mod provider;

pub use builtin::{ClearServerServices, DelayedDelivery, ForceDisconnect};
pub use provider::StrategyProvider;

use crate::{
    error::Result,
    state::GattState,
    transaction::{Transaction, TransactionResult},
    transport::DeviceId,
};
use async_trait::async_trait;
use std::fmt;

/// A classified anomaly observed while a transaction executed.
/// 事务执行期间观察到的已分类异常。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Situation {
    /// The link dropped while a non-link operation was in flight.
    /// 在非链路操作进行期间链路断开。
    RemoteVanishedDuringOperation,
    /// The platform may deliver notifications before a subscription settles.
    /// 平台可能在订阅稳定之前就交付通知。
    NotificationSubscriptionRace,
    /// A connect failed with the generic stack error, which usually means the
    /// native handle is stale.
    /// 连接因通用协议栈错误而失败，这通常意味着原生句柄已失效。
    StaleConnectionStatus,
    /// Adding a service to the local server failed.
    /// 向本地服务器添加服务失败。
    ServerServicesCorrupted,
}

/// The platform and hardware a connection runs on.
/// 连接运行所在的平台和硬件。
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeviceProfile {
    pub manufacturer: String,
    pub model: String,
    pub platform_version: u32,
}

impl DeviceProfile {
    pub fn new(manufacturer: impl Into<String>, model: impl Into<String>, platform_version: u32) -> Self {
        Self {
            manufacturer: manufacturer.into(),
            model: model.into(),
            platform_version,
        }
    }
}

/// A set of device profiles a strategy is registered for.
///
/// Unset constraints match everything; names compare case-insensitively.
///
/// 策略所注册的设备配置集合。未设置的约束匹配所有内容；名称比较不区分大小写。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceClass {
    manufacturer: Option<String>,
    model: Option<String>,
    min_version: Option<u32>,
    max_version: Option<u32>,
}

impl DeviceClass {
    pub fn any() -> Self {
        Self::default()
    }

    pub fn manufacturer(mut self, manufacturer: impl Into<String>) -> Self {
        self.manufacturer = Some(manufacturer.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn from_version(mut self, version: u32) -> Self {
        self.min_version = Some(version);
        self
    }

    pub fn up_to_version(mut self, version: u32) -> Self {
        self.max_version = Some(version);
        self
    }

    pub fn matches(&self, profile: &DeviceProfile) -> bool {
        let name_matches = |wanted: &Option<String>, actual: &str| {
            wanted
                .as_deref()
                .is_none_or(|wanted| wanted.eq_ignore_ascii_case(actual))
        };
        name_matches(&self.manufacturer, &profile.manufacturer)
            && name_matches(&self.model, &profile.model)
            && self.min_version.is_none_or(|min| profile.platform_version >= min)
            && self.max_version.is_none_or(|max| profile.platform_version <= max)
    }

    /// The number of constraints set. More specific classes win lookups.
    pub(crate) fn specificity(&self) -> usize {
        [
            self.manufacturer.is_some(),
            self.model.is_some(),
            self.min_version.is_some(),
            self.max_version.is_some(),
        ]
        .into_iter()
        .filter(|set| *set)
        .count()
    }
}

/// Everything a strategy may look at.
/// 策略可以查看的所有内容。
#[derive(Debug, Clone)]
pub struct StrategyContext {
    pub situation: Situation,
    /// `None` for strategies acting on the local server as a whole.
    pub device: Option<DeviceId>,
    pub profile: DeviceProfile,
    /// The terminal state the transaction reached.
    pub state: GattState,
    /// The result that will be delivered unless the strategy replaces it.
    pub result: TransactionResult,
}

/// How a strategy wants the remediated transaction finished.
///
/// 策略希望如何结束被修复的事务。
#[derive(Debug, Default)]
pub struct StrategyOutcome {
    pub(crate) result: Option<TransactionResult>,
    pub(crate) rest_state: Option<GattState>,
    pub(crate) follow_up: Vec<Transaction>,
}

impl StrategyOutcome {
    /// Delivers the original result and rest state.
    pub fn unchanged() -> Self {
        Self::default()
    }

    /// Delivers `result` instead of the original.
    pub fn replace_result(mut self, result: TransactionResult) -> Self {
        self.result = Some(result);
        self
    }

    /// Leaves the connection in `state` after delivery. Use this for a
    /// documented non-idle state when remediation could not complete.
    ///
    /// 交付后将连接保留在 `state`。
    pub fn rest_in(mut self, state: GattState) -> Self {
        self.rest_state = Some(state);
        self
    }

    /// Runs `transaction` right after delivery, ahead of anything queued.
    /// 在交付后立即运行 `transaction`，先于任何排队的事务。
    pub fn then(mut self, transaction: Transaction) -> Self {
        self.follow_up.push(transaction);
        self
    }
}

/// Pluggable remediation logic.
///
/// `apply` runs off the connection's execution context, so it may sleep or
/// await. It must not submit to its own connection and wait for the answer:
/// the slot is held until it returns. Corrective work goes into
/// [`StrategyOutcome::then`] instead.
///
/// 可插拔的修复逻辑。`apply` 在连接的执行上下文之外运行，因此可以睡眠或等待。
#[async_trait]
pub trait Strategy: Send + Sync + fmt::Debug + 'static {
    fn name(&self) -> &'static str;

    async fn apply(&self, ctx: StrategyContext) -> Result<StrategyOutcome>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_class_matching() {
        let pixel = DeviceProfile::new("Google", "Pixel 2", 27);

        assert!(DeviceClass::any().matches(&pixel));
        assert!(DeviceClass::any().manufacturer("google").matches(&pixel));
        assert!(!DeviceClass::any().manufacturer("samsung").matches(&pixel));
        assert!(DeviceClass::any().from_version(26).up_to_version(27).matches(&pixel));
        assert!(!DeviceClass::any().up_to_version(26).matches(&pixel));
        assert!(!DeviceClass::any().model("Pixel 3").matches(&pixel));
    }

    #[test]
    fn specificity_counts_constraints() {
        assert_eq!(DeviceClass::any().specificity(), 0);
        assert_eq!(
            DeviceClass::any().manufacturer("x").up_to_version(3).specificity(),
            2
        );
    }
}

//! The `(device class × situation) → strategy` lookup table.
//!
//! （设备类别 × 情况）→ 策略 查找表。

use super::{
    ClearServerServices, DelayedDelivery, DeviceClass, DeviceProfile, ForceDisconnect, Situation,
    Strategy,
};
use crate::config::Config;
use std::{collections::HashMap, fmt, sync::Arc};
use tracing::trace;

struct Registration {
    class: DeviceClass,
    strategy: Arc<dyn Strategy>,
}

/// Resolves the strategy registered for a device profile and situation.
///
/// The table is filled once at session setup and then shared read-only by
/// every connection.
///
/// 解析为设备配置和情况注册的策略。该表在会话建立时填充一次，然后由所有连接只读共享。
#[derive(Default)]
pub struct StrategyProvider {
    table: HashMap<Situation, Vec<Registration>>,
}

impl StrategyProvider {
    /// Creates an empty provider: every lookup yields no remediation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a provider with the built-in quirk table.
    /// 使用内置的异常处理表创建提供者。
    pub fn with_defaults(config: &Config) -> Self {
        let force_disconnect = ForceDisconnect::new(config.strategy.remediation_timeout);
        let mut provider = Self::new();
        provider
            .register(
                DeviceClass::any(),
                Situation::RemoteVanishedDuringOperation,
                force_disconnect,
            )
            .register(
                DeviceClass::any(),
                Situation::StaleConnectionStatus,
                force_disconnect,
            )
            // Older platforms report the CCCD write before the controller
            // actually routes notifications.
            .register(
                DeviceClass::any().up_to_version(27),
                Situation::NotificationSubscriptionRace,
                DelayedDelivery::new(config.strategy.subscription_delay),
            )
            .register(
                DeviceClass::any(),
                Situation::ServerServicesCorrupted,
                ClearServerServices,
            );
        provider
    }

    pub fn register(
        &mut self,
        class: DeviceClass,
        situation: Situation,
        strategy: impl Strategy,
    ) -> &mut Self {
        self.register_shared(class, situation, Arc::new(strategy))
    }

    pub fn register_shared(
        &mut self,
        class: DeviceClass,
        situation: Situation,
        strategy: Arc<dyn Strategy>,
    ) -> &mut Self {
        self.table
            .entry(situation)
            .or_default()
            .push(Registration { class, strategy });
        self
    }

    /// Looks up the strategy for `profile` in `situation`.
    ///
    /// The most specific matching class wins; among equally specific classes
    /// the earliest registration wins.
    ///
    /// 查找 `profile` 在 `situation` 下的策略。最具体的匹配类别优先；同等具体时最早注册的优先。
    pub fn resolve(&self, profile: &DeviceProfile, situation: Situation) -> Option<Arc<dyn Strategy>> {
        let registrations = self.table.get(&situation)?;
        let mut best: Option<&Registration> = None;
        for registration in registrations.iter().filter(|r| r.class.matches(profile)) {
            if best.is_none_or(|b| registration.class.specificity() > b.class.specificity()) {
                best = Some(registration);
            }
        }
        let strategy = best.map(|r| r.strategy.clone());
        trace!(
            ?situation,
            manufacturer = %profile.manufacturer,
            model = %profile.model,
            strategy = strategy.as_ref().map(|s| s.name()),
            "Strategy lookup"
        );
        strategy
    }

    /// The number of registrations across all situations.
    pub fn len(&self) -> usize {
        self.table.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for StrategyProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StrategyProvider")
            .field("registrations", &self.len())
            .finish()
    }
}

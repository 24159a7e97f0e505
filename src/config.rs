//! 定义了事务引擎的可配置参数。
//! Defines configurable parameters for the transaction engine.

use std::time::Duration;

/// A structure containing all configurable parameters for a session.
///
/// 包含会话所有可配置参数的结构体。
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Transaction timing and queueing parameters.
    /// 事务计时和排队参数。
    pub transaction: TransactionConfig,

    /// Remediation strategy parameters.
    /// 修复策略参数。
    pub strategy: StrategyConfig,

    /// Per-connection plumbing parameters.
    /// 每个连接的管道参数。
    pub connection: ConnectionConfig,
}

/// Transaction timing and queueing parameters.
///
/// 事务计时和排队参数。
#[derive(Debug, Clone)]
pub struct TransactionConfig {
    /// The timeout armed for a transaction that does not override it.
    /// 未覆盖超时的事务所使用的超时时间。
    pub default_timeout: Duration,
    /// The timeout for link-establishing transactions. Connecting usually takes
    /// longer than a single attribute operation.
    /// 建立链路事务的超时时间。
    pub connect_timeout: Duration,
    /// The maximum number of transactions waiting behind the executing one.
    /// Submissions beyond this are rejected.
    /// 在执行中事务之后等待的最大事务数。超出的提交将被拒绝。
    pub max_queue_len: usize,
}

/// Remediation strategy parameters.
///
/// 修复策略参数。
#[derive(Debug, Clone)]
pub struct StrategyConfig {
    /// How long a subscription result is held back on platforms that race the
    /// descriptor write against the first notification.
    /// 在描述符写入与首个通知存在竞争的平台上，订阅结果被延迟的时间。
    pub subscription_delay: Duration,
    /// The budget for a single strategy run. A strategy exceeding it is abandoned
    /// and the original result is delivered.
    /// 单次策略运行的时间预算。
    pub remediation_timeout: Duration,
}

/// Per-connection plumbing parameters.
///
/// 每个连接的管道参数。
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Capacity of the broadcast channel carrying connection events. Slow
    /// subscribers lag and miss the oldest events.
    /// 承载连接事件的广播通道容量。
    pub event_capacity: usize,
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(30),
            max_queue_len: 256,
        }
    }
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            subscription_delay: Duration::from_millis(250),
            remediation_timeout: Duration::from_secs(5),
        }
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self { event_capacity: 64 }
    }
}

//! 定义了库中所有可能的错误类型。
//! Defines all possible error types in the library.
//!
//! Transaction outcomes (failure, timeout, rejection) are never errors: they are
//! delivered as a [`TransactionResult`](crate::transaction::TransactionResult).
//! This type only covers the facade, the registry and the strategy boundary.

use crate::{session::ConnectionKey, strategy::Situation};
use thiserror::Error;

/// The primary error type for the GATT transaction engine.
/// GATT 事务引擎的主要错误类型。
#[derive(Debug, Error)]
pub enum Error {
    /// A connection is already registered under this key.
    /// 该键下已注册了一个连接。
    #[error("connection {0} is already open")]
    ConnectionExists(ConnectionKey),

    /// No connection is registered under this key.
    /// 该键下没有注册连接。
    #[error("connection {0} not found")]
    ConnectionNotFound(ConnectionKey),

    /// The connection actor has stopped and can no longer accept commands.
    /// 连接 actor 已停止，无法再接收命令。
    #[error("Internal channel is broken")]
    ChannelClosed,

    /// A strategy reported that it could not remediate the situation.
    /// 策略报告它无法修复该情况。
    #[error("strategy {strategy} failed for {situation:?}: {reason}")]
    StrategyFailed {
        strategy: &'static str,
        situation: Situation,
        reason: String,
    },

    /// A strategy did not finish within the configured remediation budget.
    /// 策略未能在配置的修复时间内完成。
    #[error("strategy {strategy} did not finish in time")]
    RemediationTimeout { strategy: &'static str },
}

/// A specialized `Result` type for this library.
/// 本库专用的 `Result` 类型。
pub type Result<T> = std::result::Result<T, Error>;

//! Commands consumed by the connection actor.

use crate::{
    error::Result,
    strategy::StrategyOutcome,
    transaction::{Transaction, TransactionId},
    transport::GattEvent,
};
use tokio::sync::oneshot;

/// Commands sent to the `ConnectionActor`.
///
/// Everything that touches connection state arrives here, so the actor is the
/// single serialized execution context of its connection.
///
/// 发送到 `ConnectionActor` 的命令。所有涉及连接状态的内容都经由这里到达，
/// 因此 actor 是其连接唯一的串行执行上下文。
#[derive(Debug)]
pub(crate) enum ConnectionCommand {
    /// A caller submitted a transaction.
    /// 调用者提交了一个事务。
    Submit(Transaction),
    /// The transport answered the request issued by transaction `token`.
    /// 传输应答了由事务 `token` 发出的请求。
    Response { token: TransactionId, event: GattEvent },
    /// The transport reported an event no request asked for.
    /// 传输报告了一个没有请求所要求的事件。
    Unsolicited(GattEvent),
    /// A strategy run for transaction `token` finished.
    /// 为事务 `token` 运行的策略已完成。
    RemediationFinished {
        token: TransactionId,
        outcome: Result<StrategyOutcome>,
    },
    /// Stop the actor, rejecting everything still pending.
    /// 停止 actor，拒绝所有仍在等待的内容。
    Shutdown { done: Option<oneshot::Sender<()>> },
}

//! The polymorphic operation interface every transaction drives.
//!
//! An operation is a small state machine run by the connection actor:
//! [`begin`](GattOperation::begin) issues the native request,
//! [`on_event`](GattOperation::on_event) recognizes the terminal callback and
//! [`on_timeout`](GattOperation::on_timeout) gets a chance to clean up when no
//! callback arrived in time.
//!
//! 每个事务驱动的多态操作接口。操作是由连接 actor 运行的小型状态机。

use super::{
    TransactionId,
    result::{ResultStatus, TransactionResultBuilder},
};
use crate::{
    config::TransactionConfig,
    connection::{Role, command::ConnectionCommand},
    state::GattState,
    strategy::Situation,
    transport::{DeviceId, GattCommand, GattEvent, GattRequest, GattTransport, Responder, TransportRefusal},
};
use std::{fmt, time::Duration};
use tokio::sync::mpsc;

/// What happened when an operation began.
/// 操作开始时发生的情况。
#[derive(Debug)]
pub enum Begin {
    /// The native request is pending; a callback or the timeout will finish it.
    /// 原生请求挂起中；回调或超时将结束它。
    Pending,
    /// The transport refused the request synchronously.
    /// 传输同步拒绝了请求。
    Refused(TransportRefusal),
    /// The operation finished without a native round trip.
    /// 操作无需原生往返即已完成。
    Done(Outcome),
}

/// The terminal outcome of an operation.
/// 操作的最终结果。
#[derive(Debug)]
pub struct Outcome {
    pub(crate) state: GattState,
    pub(crate) result: TransactionResultBuilder,
    pub(crate) situation: Option<Situation>,
}

impl Outcome {
    /// Creates an outcome that moves the connection to the terminal `state`.
    /// 创建一个将连接移至最终状态 `state` 的结果。
    pub fn new(state: GattState, result: TransactionResultBuilder) -> Self {
        Self {
            state,
            result,
            situation: None,
        }
    }

    /// Marks the outcome as an anomaly a strategy may remediate.
    /// 将结果标记为可由策略修复的异常。
    pub fn with_situation(mut self, situation: Situation) -> Self {
        self.situation = Some(situation);
        self
    }

    /// Adds operation-specific fields to the result.
    pub fn map_result(
        mut self,
        f: impl FnOnce(TransactionResultBuilder) -> TransactionResultBuilder,
    ) -> Self {
        self.result = f(self.result);
        self
    }

    pub fn status(&self) -> ResultStatus {
        self.result.status()
    }

    pub fn state(&self) -> GattState {
        self.state
    }

    pub fn situation(&self) -> Option<Situation> {
        self.situation
    }
}

/// The view of the connection an operation gets while it executes.
///
/// Requests issued through the context carry the executing transaction's
/// token, so late answers are recognized as stale.
///
/// 操作执行期间获得的连接视图。通过上下文发出的请求携带执行中事务的令牌。
pub struct OperationContext<'a> {
    device: &'a DeviceId,
    state: GattState,
    transport: &'a dyn GattTransport,
    token: TransactionId,
    reply_tx: &'a mpsc::UnboundedSender<ConnectionCommand>,
}

impl<'a> OperationContext<'a> {
    pub(crate) fn new(
        device: &'a DeviceId,
        state: GattState,
        transport: &'a dyn GattTransport,
        token: TransactionId,
        reply_tx: &'a mpsc::UnboundedSender<ConnectionCommand>,
    ) -> Self {
        Self {
            device,
            state,
            transport,
            token,
            reply_tx,
        }
    }

    pub fn device(&self) -> &DeviceId {
        self.device
    }

    /// The connection state when the context was created.
    pub fn current_state(&self) -> GattState {
        self.state
    }

    pub fn token(&self) -> TransactionId {
        self.token
    }

    /// Hands a request to the transport.
    /// 将请求交给传输。
    pub fn issue(&self, command: GattCommand) -> Result<(), TransportRefusal> {
        self.transport.issue(GattRequest {
            device: self.device.clone(),
            command,
            responder: Responder::new(self.token, self.reply_tx.clone()),
        })
    }
}

/// An asynchronous GATT operation.
///
/// 异步 GATT 操作。
pub trait GattOperation: Send + fmt::Debug + 'static {
    /// The name recorded in the result.
    fn name(&self) -> &'static str;

    /// The connection role this operation runs on.
    fn role(&self) -> Role {
        Role::Client
    }

    /// The state the connection holds while the operation executes.
    /// 操作执行期间连接所处的状态。
    fn in_progress_state(&self) -> GattState;

    /// The terminal state used when the operation is refused or times out.
    /// 操作被拒绝或超时时使用的最终状态。
    fn failure_state(&self) -> GattState;

    /// Whether the operation may start from `state`.
    /// 操作是否可以从 `state` 开始。
    fn admits(&self, state: GattState) -> bool {
        state.is_link_ready()
    }

    /// The timeout used unless the transaction overrides it.
    fn timeout(&self, config: &TransactionConfig) -> Duration {
        config.default_timeout
    }

    /// Issues the native request.
    fn begin(&mut self, ctx: &OperationContext<'_>) -> Begin;

    /// Recognizes the terminal callback. Returns `None` for events that do not
    /// answer this operation.
    ///
    /// 识别最终回调。对于不应答此操作的事件返回 `None`。
    fn on_event(&mut self, event: &GattEvent) -> Option<Outcome>;

    /// Runs when no callback arrived in time, before the timeout result is
    /// delivered. May issue a corrective request; its answer is discarded.
    ///
    /// 在超时时间内没有回调时运行，在交付超时结果之前。可以发出纠正请求；其应答会被丢弃。
    fn on_timeout(&mut self, _ctx: &OperationContext<'_>) {}

    /// The state the connection rests in after the result is delivered.
    /// 结果交付后连接停留的状态。
    fn rest_state(&self, _status: ResultStatus) -> GattState {
        GattState::Idle
    }

    /// Whether this operation establishes or tears down the link. A link loss
    /// during such an operation is its own answer, not an anomaly.
    ///
    /// 该操作是否建立或拆除链路。
    fn changes_link(&self) -> bool {
        false
    }
}

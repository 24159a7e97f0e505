//! 事务 - 绑定到单个连接的异步工作单元
//! Transaction - A unit of asynchronous work bound to one connection

pub mod operation;
pub mod result;

pub use operation::{Begin, GattOperation, OperationContext, Outcome};
pub use result::{FailureKind, ResultStatus, TransactionResult, TransactionResultBuilder};

use crate::state::GattState;
use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};
use tracing::{trace, warn};

static NEXT_TRANSACTION_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies one transaction. Transport answers are correlated by it.
/// 标识一个事务。传输应答通过它进行关联。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(u64);

impl TransactionId {
    fn next() -> Self {
        Self(NEXT_TRANSACTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tx#{}", self.0)
    }
}

/// The lifecycle of a single transaction.
/// 单个事务的生命周期。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionPhase {
    Created,
    Executing,
    Completed,
    TimedOut,
    Rejected,
}

impl TransactionPhase {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TransactionPhase::Completed | TransactionPhase::TimedOut | TransactionPhase::Rejected
        )
    }

    fn can_advance_to(self, next: TransactionPhase) -> bool {
        use TransactionPhase::*;
        matches!(
            (self, next),
            (Created, Executing)
                | (Created, Rejected)
                | (Executing, Completed)
                | (Executing, TimedOut)
                | (Executing, Rejected)
        )
    }
}

/// The single-use consumer of a transaction's result.
pub type CompletionCallback = Box<dyn FnOnce(TransactionResult) + Send + 'static>;

/// One asynchronous operation submitted against a connection.
///
/// The completion callback is taken on first delivery, so a second delivery is
/// structurally impossible. A transaction dropped before delivering reports a
/// `Rejected` failure so its caller is never left waiting.
///
/// 针对连接提交的一个异步操作。完成回调在首次交付时被取走，因此第二次交付在结构上是不可能的。
pub struct Transaction {
    id: TransactionId,
    operation: Box<dyn GattOperation>,
    timeout: Option<Duration>,
    phase: TransactionPhase,
    callback: Option<CompletionCallback>,
}

impl Transaction {
    pub fn new(operation: impl GattOperation) -> Self {
        Self::from_boxed(Box::new(operation))
    }

    pub fn from_boxed(operation: Box<dyn GattOperation>) -> Self {
        Self {
            id: TransactionId::next(),
            operation,
            timeout: None,
            phase: TransactionPhase::Created,
            callback: None,
        }
    }

    /// Overrides the operation's default timeout for this instance.
    /// 为该实例覆盖操作的默认超时。
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.operation.name()
    }

    pub fn phase(&self) -> TransactionPhase {
        self.phase
    }

    pub fn timeout_override(&self) -> Option<Duration> {
        self.timeout
    }

    pub(crate) fn operation(&self) -> &dyn GattOperation {
        self.operation.as_ref()
    }

    pub(crate) fn operation_mut(&mut self) -> &mut dyn GattOperation {
        self.operation.as_mut()
    }

    pub(crate) fn set_callback(&mut self, callback: CompletionCallback) {
        self.callback = Some(callback);
    }

    /// Moves to `next` if the lifecycle allows it.
    /// 如果生命周期允许，则移至 `next`。
    pub(crate) fn advance(&mut self, next: TransactionPhase) -> bool {
        if self.phase.can_advance_to(next) {
            trace!(tx = %self.id, from = ?self.phase, to = ?next, "Transaction phase");
            self.phase = next;
            true
        } else {
            warn!(
                tx = %self.id,
                current = ?self.phase,
                attempted = ?next,
                "Invalid transaction phase transition attempted"
            );
            false
        }
    }

    /// Hands the result to the caller. Returns false if it was already delivered.
    /// 将结果交给调用者。如果已交付过，则返回 false。
    pub(crate) fn deliver(&mut self, result: TransactionResult) -> bool {
        match self.callback.take() {
            Some(callback) => {
                callback(result);
                true
            }
            None => {
                trace!(tx = %self.id, "No caller waiting for result");
                false
            }
        }
    }

    /// Fails the transaction without executing (the rest of) it.
    /// 在不执行（剩余部分）的情况下使事务失败。
    pub(crate) fn reject(mut self, kind: FailureKind, state: GattState) {
        if !self.phase.is_terminal() {
            self.advance(TransactionPhase::Rejected);
        }
        let result = TransactionResult::builder(self.name(), ResultStatus::Failure)
            .transaction_id(self.id)
            .failure(kind)
            .gatt_state(state)
            .build();
        self.deliver(result);
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("operation", &self.operation)
            .field("timeout", &self.timeout)
            .field("phase", &self.phase)
            .field("has_callback", &self.callback.is_some())
            .finish()
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if let Some(callback) = self.callback.take() {
            warn!(tx = %self.id, "Transaction dropped before delivering a result");
            callback(
                TransactionResult::builder(self.operation.name(), ResultStatus::Failure)
                    .transaction_id(self.id)
                    .failure(FailureKind::Rejected)
                    .build(),
            );
        }
    }
}

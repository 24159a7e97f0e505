//! The immutable outcome of a transaction and its builder.
//!
//! 事务的不可变结果及其构建器。

use super::TransactionId;
use crate::state::GattState;
use bytes::Bytes;
use uuid::Uuid;

/// The coarse outcome of a transaction.
/// 事务的粗粒度结果。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultStatus {
    Success,
    Failure,
    Timeout,
}

/// Why a transaction did not succeed.
/// 事务未成功的原因。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// The transport could not even begin the operation.
    /// 传输甚至无法开始该操作。
    ResourceUnavailable,
    /// The transport answered with a negative status.
    /// 传输以否定状态应答。
    OperationFailure,
    /// No answer arrived within the timeout.
    /// 在超时时间内没有应答。
    Timeout,
    /// A queue-level precondition was not met.
    /// 队列级别的前置条件不满足。
    Rejected,
}

/// The outcome of one transaction, delivered exactly once.
///
/// Fields that do not apply to the originating operation are `None`.
///
/// 单个事务的结果，恰好交付一次。不适用于原始操作的字段为 `None`。
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionResult {
    transaction_id: Option<TransactionId>,
    transaction_name: &'static str,
    status: ResultStatus,
    failure: Option<FailureKind>,
    gatt_state: Option<GattState>,
    response_code: Option<i32>,
    payload: Option<Bytes>,
    rssi: Option<i16>,
    mtu: Option<u16>,
    offset: Option<u16>,
    request_id: Option<u32>,
    service: Option<Uuid>,
    characteristic: Option<Uuid>,
    descriptor: Option<Uuid>,
    services: Vec<Uuid>,
}

impl TransactionResult {
    pub fn builder(transaction_name: &'static str, status: ResultStatus) -> TransactionResultBuilder {
        TransactionResultBuilder::new(transaction_name, status)
    }

    /// Starts a builder pre-filled with this result's fields.
    /// 以该结果的字段预填充一个构建器。
    pub fn to_builder(&self) -> TransactionResultBuilder {
        TransactionResultBuilder {
            inner: self.clone(),
        }
    }

    pub fn transaction_id(&self) -> Option<TransactionId> {
        self.transaction_id
    }

    pub fn transaction_name(&self) -> &'static str {
        self.transaction_name
    }

    pub fn status(&self) -> ResultStatus {
        self.status
    }

    pub fn is_success(&self) -> bool {
        self.status == ResultStatus::Success
    }

    pub fn failure(&self) -> Option<FailureKind> {
        self.failure
    }

    pub fn gatt_state(&self) -> Option<GattState> {
        self.gatt_state
    }

    pub fn response_code(&self) -> Option<i32> {
        self.response_code
    }

    pub fn payload(&self) -> Option<&Bytes> {
        self.payload.as_ref()
    }

    pub fn rssi(&self) -> Option<i16> {
        self.rssi
    }

    pub fn mtu(&self) -> Option<u16> {
        self.mtu
    }

    pub fn offset(&self) -> Option<u16> {
        self.offset
    }

    pub fn request_id(&self) -> Option<u32> {
        self.request_id
    }

    pub fn service(&self) -> Option<Uuid> {
        self.service
    }

    pub fn characteristic(&self) -> Option<Uuid> {
        self.characteristic
    }

    pub fn descriptor(&self) -> Option<Uuid> {
        self.descriptor
    }

    /// Services reported by a discovery.
    pub fn services(&self) -> &[Uuid] {
        &self.services
    }
}

/// Accumulates optional fields of a [`TransactionResult`].
/// 累积 [`TransactionResult`] 的可选字段。
#[derive(Debug, Clone)]
pub struct TransactionResultBuilder {
    inner: TransactionResult,
}

impl TransactionResultBuilder {
    pub fn new(transaction_name: &'static str, status: ResultStatus) -> Self {
        Self {
            inner: TransactionResult {
                transaction_id: None,
                transaction_name,
                status,
                failure: None,
                gatt_state: None,
                response_code: None,
                payload: None,
                rssi: None,
                mtu: None,
                offset: None,
                request_id: None,
                service: None,
                characteristic: None,
                descriptor: None,
                services: Vec::new(),
            },
        }
    }

    pub fn status(&self) -> ResultStatus {
        self.inner.status
    }

    pub fn transaction_id(mut self, id: TransactionId) -> Self {
        self.inner.transaction_id = Some(id);
        self
    }

    pub fn failure(mut self, kind: FailureKind) -> Self {
        self.inner.failure = Some(kind);
        self
    }

    pub fn gatt_state(mut self, state: GattState) -> Self {
        self.inner.gatt_state = Some(state);
        self
    }

    pub fn response_code(mut self, code: i32) -> Self {
        self.inner.response_code = Some(code);
        self
    }

    pub fn payload(mut self, payload: Bytes) -> Self {
        self.inner.payload = Some(payload);
        self
    }

    pub fn rssi(mut self, rssi: i16) -> Self {
        self.inner.rssi = Some(rssi);
        self
    }

    pub fn mtu(mut self, mtu: u16) -> Self {
        self.inner.mtu = Some(mtu);
        self
    }

    pub fn offset(mut self, offset: u16) -> Self {
        self.inner.offset = Some(offset);
        self
    }

    pub fn request_id(mut self, request_id: u32) -> Self {
        self.inner.request_id = Some(request_id);
        self
    }

    pub fn service(mut self, service: Uuid) -> Self {
        self.inner.service = Some(service);
        self
    }

    pub fn characteristic(mut self, characteristic: Uuid) -> Self {
        self.inner.characteristic = Some(characteristic);
        self
    }

    pub fn descriptor(mut self, descriptor: Uuid) -> Self {
        self.inner.descriptor = Some(descriptor);
        self
    }

    pub fn services(mut self, services: Vec<Uuid>) -> Self {
        self.inner.services = services;
        self
    }

    /// Freezes the record.
    ///
    /// The failure kind is normalized against the status: a success never
    /// carries one, a timeout always reports `Timeout`, and an unspecified
    /// failure is an `OperationFailure`.
    ///
    /// 冻结记录。失败类型会根据状态进行规范化。
    pub fn build(mut self) -> TransactionResult {
        self.inner.failure = match (self.inner.status, self.inner.failure) {
            (ResultStatus::Success, _) => None,
            (ResultStatus::Timeout, _) => Some(FailureKind::Timeout),
            (ResultStatus::Failure, None) => Some(FailureKind::OperationFailure),
            (ResultStatus::Failure, kind) => kind,
        };
        self.inner
    }
}

//! Abstractions over the native GATT transport.
//!
//! The native stack accepts one request at a time and answers it later through
//! a callback. A request is handed to the transport together with a single-use
//! [`Responder`]; unsolicited events (link loss, incoming notifications, server
//! requests) enter through a [`CallbackSink`].
//!
//! 对原生 GATT 传输的抽象。
//!
//! 原生协议栈一次只接受一个请求，并在稍后通过回调应答。请求与一次性的 [`Responder`]
//! 一起交给传输；非请求事件（链路丢失、传入通知、服务器请求）通过 [`CallbackSink`] 进入。

use crate::{connection::command::ConnectionCommand, transaction::TransactionId};
use bytes::Bytes;
use std::{fmt, sync::Arc};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

/// Native response codes, as reported by the platform GATT stack.
/// 平台 GATT 协议栈报告的原生响应码。
pub mod status {
    pub const SUCCESS: i32 = 0x00;
    pub const INVALID_HANDLE: i32 = 0x01;
    pub const READ_NOT_PERMITTED: i32 = 0x02;
    pub const WRITE_NOT_PERMITTED: i32 = 0x03;
    pub const INSUFFICIENT_AUTHENTICATION: i32 = 0x05;
    pub const REQUEST_NOT_SUPPORTED: i32 = 0x06;
    /// The link supervision timeout expired.
    pub const CONNECTION_TIMEOUT: i32 = 0x08;
    pub const INSUFFICIENT_ENCRYPTION: i32 = 0x0f;
    /// The remote device terminated the link.
    pub const CONNECTION_TERMINATED_BY_PEER: i32 = 0x13;
    pub const CONNECTION_TERMINATED_LOCALLY: i32 = 0x16;
    /// The generic stack error some platforms report for nearly everything.
    pub const GATT_ERROR: i32 = 0x85;
    pub const FAILURE: i32 = 0x101;
}

/// A stable identifier of a remote device or of the local server session.
/// 远端设备或本地服务器会话的稳定标识符。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(Arc<str>);

impl DeviceId {
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(Arc::from(id.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single native request.
/// 单个原生请求。
#[derive(Debug, Clone, PartialEq)]
pub enum GattCommand {
    Connect { auto_connect: bool },
    Disconnect,
    DiscoverServices,
    ReadCharacteristic { service: Uuid, characteristic: Uuid },
    WriteCharacteristic {
        service: Uuid,
        characteristic: Uuid,
        value: Bytes,
        with_response: bool,
    },
    ReadDescriptor {
        service: Uuid,
        characteristic: Uuid,
        descriptor: Uuid,
    },
    WriteDescriptor {
        service: Uuid,
        characteristic: Uuid,
        descriptor: Uuid,
        value: Bytes,
    },
    SetNotification {
        service: Uuid,
        characteristic: Uuid,
        enable: bool,
    },
    ReadRssi,
    RequestMtu { mtu: u16 },

    // Server role.
    AddService { service: Uuid, characteristics: Vec<Uuid> },
    RemoveService { service: Uuid },
    ClearServices,
    NotifyCharacteristic {
        target: DeviceId,
        service: Uuid,
        characteristic: Uuid,
        value: Bytes,
        confirm: bool,
    },
    SendResponse {
        target: DeviceId,
        request_id: u32,
        status: i32,
        offset: u16,
        value: Bytes,
    },
}

/// A callback from the native transport.
///
/// Every variant except the unsolicited ones at the bottom answers exactly one
/// [`GattCommand`] family.
///
/// 来自原生传输的回调。除底部的非请求变体外，每个变体恰好应答一个 [`GattCommand`] 族。
#[derive(Debug, Clone, PartialEq)]
pub enum GattEvent {
    ConnectionStateChanged { status: i32, connected: bool },
    ServicesDiscovered { status: i32, services: Vec<Uuid> },
    CharacteristicRead {
        status: i32,
        characteristic: Uuid,
        value: Bytes,
    },
    CharacteristicWritten { status: i32, characteristic: Uuid },
    DescriptorRead {
        status: i32,
        descriptor: Uuid,
        value: Bytes,
    },
    DescriptorWritten { status: i32, descriptor: Uuid },
    NotificationStateChanged {
        status: i32,
        characteristic: Uuid,
        enabled: bool,
    },
    RssiRead { status: i32, rssi: i16 },
    MtuChanged { status: i32, mtu: u16 },
    ServiceAdded { status: i32, service: Uuid },
    ServiceRemoved { status: i32, service: Uuid },
    ServicesCleared { status: i32 },
    NotificationSent { status: i32, target: DeviceId },
    ResponseSent { status: i32, request_id: u32 },

    // Unsolicited.
    /// The remote device notified or indicated a characteristic value.
    CharacteristicChanged { characteristic: Uuid, value: Bytes },
    /// A remote client asks the local server for a value.
    ReadRequest {
        source: DeviceId,
        request_id: u32,
        characteristic: Uuid,
        offset: u16,
    },
    /// A remote client writes to the local server.
    WriteRequest {
        source: DeviceId,
        request_id: u32,
        characteristic: Uuid,
        offset: u16,
        value: Bytes,
        response_needed: bool,
    },
}

impl GattEvent {
    /// The native status code carried by the event, if any.
    /// 事件携带的原生状态码（如果有）。
    pub fn status(&self) -> Option<i32> {
        match self {
            GattEvent::ConnectionStateChanged { status, .. }
            | GattEvent::ServicesDiscovered { status, .. }
            | GattEvent::CharacteristicRead { status, .. }
            | GattEvent::CharacteristicWritten { status, .. }
            | GattEvent::DescriptorRead { status, .. }
            | GattEvent::DescriptorWritten { status, .. }
            | GattEvent::NotificationStateChanged { status, .. }
            | GattEvent::RssiRead { status, .. }
            | GattEvent::MtuChanged { status, .. }
            | GattEvent::ServiceAdded { status, .. }
            | GattEvent::ServiceRemoved { status, .. }
            | GattEvent::ServicesCleared { status }
            | GattEvent::NotificationSent { status, .. }
            | GattEvent::ResponseSent { status, .. } => Some(*status),
            GattEvent::CharacteristicChanged { .. }
            | GattEvent::ReadRequest { .. }
            | GattEvent::WriteRequest { .. } => None,
        }
    }

    /// Returns true if this event reports that the link went down.
    /// 如果该事件报告链路断开，则返回 true。
    pub fn is_link_loss(&self) -> bool {
        matches!(
            self,
            GattEvent::ConnectionStateChanged {
                connected: false,
                ..
            }
        )
    }
}

/// Why the transport refused to start a request.
/// 传输拒绝启动请求的原因。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportRefusal {
    #[error("no native resources available")]
    NoResources,
    #[error("the native handle is closed")]
    HandleClosed,
    #[error("the native stack is busy")]
    Busy,
}

/// A request handed to the transport.
/// 交给传输的请求。
#[derive(Debug)]
pub struct GattRequest {
    pub device: DeviceId,
    pub command: GattCommand,
    pub responder: Responder,
}

/// The native GATT transport of one connection.
///
/// `issue` must return quickly: it either hands the request to the native
/// stack and answers later through the request's [`Responder`], or refuses it
/// synchronously.
///
/// 一个连接的原生 GATT 传输。`issue` 必须快速返回：要么将请求交给原生协议栈并稍后
/// 通过请求的 [`Responder`] 应答，要么同步拒绝它。
pub trait GattTransport: Send + Sync + 'static {
    fn issue(&self, request: GattRequest) -> Result<(), TransportRefusal>;
}

/// The single-use reply path of one request.
///
/// Consuming `respond` makes a second answer impossible. The token identifies
/// the owning transaction so that answers arriving after a timeout are dropped.
///
/// 单个请求的一次性应答路径。消耗性的 `respond` 使第二次应答成为不可能。
pub struct Responder {
    token: TransactionId,
    tx: mpsc::UnboundedSender<ConnectionCommand>,
}

impl Responder {
    pub(crate) fn new(token: TransactionId, tx: mpsc::UnboundedSender<ConnectionCommand>) -> Self {
        Self { token, tx }
    }

    /// The transaction this responder answers.
    pub fn token(&self) -> TransactionId {
        self.token
    }

    /// Delivers the native answer. Returns false if the connection is gone.
    /// 交付原生应答。如果连接已不存在，则返回 false。
    pub fn respond(self, event: GattEvent) -> bool {
        self.tx
            .send(ConnectionCommand::Response {
                token: self.token,
                event,
            })
            .is_ok()
    }
}

impl fmt::Debug for Responder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Responder").field("token", &self.token).finish()
    }
}

/// Entry point for events no request is waiting for.
/// 没有请求在等待的事件的入口。
#[derive(Clone)]
pub struct CallbackSink {
    device: DeviceId,
    tx: mpsc::UnboundedSender<ConnectionCommand>,
}

impl CallbackSink {
    pub(crate) fn new(device: DeviceId, tx: mpsc::UnboundedSender<ConnectionCommand>) -> Self {
        Self { device, tx }
    }

    pub fn on_event(&self, event: GattEvent) {
        if self.tx.send(ConnectionCommand::Unsolicited(event)).is_err() {
            debug!(device = %self.device, "Dropping transport event for closed connection");
        }
    }
}

impl fmt::Debug for CallbackSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackSink")
            .field("device", &self.device)
            .finish()
    }
}

//! 连接状态 - GATT 连接的状态枚举及其唯一的变更原语
//! Connection state - The GATT connection state enumeration and its sole mutation primitive
//!
//! The transition table is a convention kept by the operations running on the
//! connection actor; [`StateCell::set`] itself assigns unconditionally.

use crate::{connection::ConnectionEvent, transport::DeviceId};
use std::fmt;
use tokio::sync::{broadcast, watch};
use tracing::trace;

/// The coarse classification of a [`GattState`].
/// [`GattState`] 的粗粒度分类。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateKind {
    /// A rest state in which the connection can accept a new transaction.
    /// 连接可以接受新事务的静止状态。
    Steady,
    /// An operation is executing on the connection.
    /// 连接上正在执行操作。
    InProgress,
    /// The last operation finished successfully; the result is being delivered.
    /// 上一个操作成功完成；结果正在交付。
    Success,
    /// The last operation failed; the result is being delivered.
    /// 上一个操作失败；结果正在交付。
    Failure,
}

/// The operational state of a GATT connection.
/// GATT 连接的运行状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GattState {
    // --- Steady states ---
    /// Link is up and no transaction is executing.
    Idle,
    Connected,
    Disconnected,

    // --- Link ---
    Connecting,
    Disconnecting,
    DisconnectFailure,

    // --- Client operations ---
    Discovering,
    DiscoverySuccess,
    DiscoveryFailure,
    ReadingCharacteristic,
    ReadCharacteristicSuccess,
    ReadCharacteristicFailure,
    WritingCharacteristic,
    WriteCharacteristicSuccess,
    WriteCharacteristicFailure,
    ReadingDescriptor,
    ReadDescriptorSuccess,
    ReadDescriptorFailure,
    WritingDescriptor,
    WriteDescriptorSuccess,
    WriteDescriptorFailure,
    EnablingCharacteristicNotification,
    EnableCharacteristicNotificationSuccess,
    EnableCharacteristicNotificationFailure,
    DisablingCharacteristicNotification,
    DisableCharacteristicNotificationSuccess,
    DisableCharacteristicNotificationFailure,
    ReadingRssi,
    ReadRssiSuccess,
    ReadRssiFailure,
    RequestingMtu,
    RequestMtuSuccess,
    RequestMtuFailure,

    // --- Server operations ---
    AddingService,
    AddServiceSuccess,
    AddServiceFailure,
    RemovingService,
    RemoveServiceSuccess,
    RemoveServiceFailure,
    ClearingServices,
    ClearServicesSuccess,
    ClearServicesFailure,
    NotifyingCharacteristic,
    NotifyCharacteristicSuccess,
    NotifyCharacteristicFailure,
    SendingServerResponse,
    SendServerResponseSuccess,
    SendServerResponseFailure,
}

impl GattState {
    /// Classifies this state.
    /// 对该状态进行分类。
    pub fn kind(self) -> StateKind {
        use GattState::*;
        match self {
            Idle | Connected | Disconnected => StateKind::Steady,
            Connecting | Disconnecting | Discovering | ReadingCharacteristic
            | WritingCharacteristic | ReadingDescriptor | WritingDescriptor
            | EnablingCharacteristicNotification | DisablingCharacteristicNotification
            | ReadingRssi | RequestingMtu | AddingService | RemovingService
            | ClearingServices | NotifyingCharacteristic | SendingServerResponse => {
                StateKind::InProgress
            }
            DiscoverySuccess | ReadCharacteristicSuccess | WriteCharacteristicSuccess
            | ReadDescriptorSuccess | WriteDescriptorSuccess
            | EnableCharacteristicNotificationSuccess
            | DisableCharacteristicNotificationSuccess | ReadRssiSuccess
            | RequestMtuSuccess | AddServiceSuccess | RemoveServiceSuccess
            | ClearServicesSuccess | NotifyCharacteristicSuccess
            | SendServerResponseSuccess => StateKind::Success,
            DisconnectFailure | DiscoveryFailure | ReadCharacteristicFailure
            | WriteCharacteristicFailure | ReadDescriptorFailure | WriteDescriptorFailure
            | EnableCharacteristicNotificationFailure
            | DisableCharacteristicNotificationFailure | ReadRssiFailure
            | RequestMtuFailure | AddServiceFailure | RemoveServiceFailure
            | ClearServicesFailure | NotifyCharacteristicFailure
            | SendServerResponseFailure => StateKind::Failure,
        }
    }

    /// Returns true for `Idle`, `Connected` and `Disconnected`.
    /// 对于 `Idle`、`Connected` 和 `Disconnected` 返回 true。
    pub fn is_steady(self) -> bool {
        self.kind() == StateKind::Steady
    }

    /// Returns true while an operation is executing.
    /// 在操作执行期间返回 true。
    pub fn is_in_progress(self) -> bool {
        self.kind() == StateKind::InProgress
    }

    /// Returns true for the steady states in which the link is usable.
    /// 对链路可用的静止状态返回 true。
    pub fn is_link_ready(self) -> bool {
        matches!(self, GattState::Idle | GattState::Connected)
    }
}

impl fmt::Display for GattState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// The connection's state value.
///
/// Only the connection actor holds a `StateCell`; everyone else observes it
/// through a [`StateObserver`].
///
/// 连接的状态值。只有连接 actor 持有 `StateCell`；其他方通过 [`StateObserver`] 观察。
pub(crate) struct StateCell {
    device: DeviceId,
    current: watch::Sender<GattState>,
    events: broadcast::Sender<ConnectionEvent>,
}

impl StateCell {
    pub(crate) fn new(
        device: DeviceId,
        initial: GattState,
        events: broadcast::Sender<ConnectionEvent>,
    ) -> (Self, StateObserver) {
        let (current, observer) = watch::channel(initial);
        (
            Self {
                device,
                current,
                events,
            },
            StateObserver(observer),
        )
    }

    pub(crate) fn get(&self) -> GattState {
        *self.current.borrow()
    }

    /// 设置新状态（无条件赋值）
    /// Sets a new state (unconditional assignment)
    pub(crate) fn set(&self, new_state: GattState) {
        let old_state = self.current.send_replace(new_state);
        if old_state == new_state {
            return;
        }
        trace!(
            device = %self.device,
            %old_state,
            %new_state,
            "State transition"
        );
        // No subscribers is fine.
        let _ = self.events.send(ConnectionEvent::StateChanged {
            from: old_state,
            to: new_state,
        });
    }
}

/// A read-only view of a connection's state, usable from any thread.
/// 连接状态的只读视图，可从任何线程使用。
#[derive(Debug, Clone)]
pub struct StateObserver(watch::Receiver<GattState>);

impl StateObserver {
    /// Gets the current state.
    /// 获取当前状态。
    pub fn current(&self) -> GattState {
        *self.0.borrow()
    }

    /// Waits until the state satisfies `predicate` and returns that state.
    /// Returns `None` if the connection actor has stopped.
    ///
    /// 等待状态满足 `predicate` 并返回该状态。如果连接 actor 已停止，则返回 `None`。
    pub async fn wait_for(&mut self, predicate: impl FnMut(&GattState) -> bool) -> Option<GattState> {
        self.0.wait_for(predicate).await.ok().map(|state| *state)
    }
}

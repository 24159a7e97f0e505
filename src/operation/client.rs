//! Client-role attribute operations.
//!
//! 客户端角色的属性操作。

use super::outcome_for;
use crate::{
    state::GattState,
    strategy::Situation,
    transaction::{Begin, GattOperation, OperationContext, Outcome, ResultStatus},
    transport::{GattCommand, GattEvent},
};
use bytes::Bytes;
use uuid::Uuid;

fn issue(ctx: &OperationContext<'_>, command: GattCommand) -> Begin {
    match ctx.issue(command) {
        Ok(()) => Begin::Pending,
        Err(refusal) => Begin::Refused(refusal),
    }
}

/// Discovers the remote attribute tree.
/// 发现远端属性树。
#[derive(Debug, Clone, Default)]
pub struct DiscoverServices;

impl DiscoverServices {
    pub fn new() -> Self {
        Self
    }
}

impl GattOperation for DiscoverServices {
    fn name(&self) -> &'static str {
        "DiscoverServices"
    }

    fn in_progress_state(&self) -> GattState {
        GattState::Discovering
    }

    fn failure_state(&self) -> GattState {
        GattState::DiscoveryFailure
    }

    fn begin(&mut self, ctx: &OperationContext<'_>) -> Begin {
        issue(ctx, GattCommand::DiscoverServices)
    }

    fn on_event(&mut self, event: &GattEvent) -> Option<Outcome> {
        match event {
            GattEvent::ServicesDiscovered {
                status: code,
                services,
            } => Some(
                outcome_for(
                    self.name(),
                    *code,
                    GattState::DiscoverySuccess,
                    GattState::DiscoveryFailure,
                )
                .map_result(|r| r.services(services.clone())),
            ),
            _ => None,
        }
    }
}

/// Reads a characteristic value.
/// 读取特征值。
#[derive(Debug, Clone)]
pub struct ReadCharacteristic {
    service: Uuid,
    characteristic: Uuid,
}

impl ReadCharacteristic {
    pub fn new(service: Uuid, characteristic: Uuid) -> Self {
        Self {
            service,
            characteristic,
        }
    }
}

impl GattOperation for ReadCharacteristic {
    fn name(&self) -> &'static str {
        "ReadCharacteristic"
    }

    fn in_progress_state(&self) -> GattState {
        GattState::ReadingCharacteristic
    }

    fn failure_state(&self) -> GattState {
        GattState::ReadCharacteristicFailure
    }

    fn begin(&mut self, ctx: &OperationContext<'_>) -> Begin {
        issue(
            ctx,
            GattCommand::ReadCharacteristic {
                service: self.service,
                characteristic: self.characteristic,
            },
        )
    }

    fn on_event(&mut self, event: &GattEvent) -> Option<Outcome> {
        match event {
            GattEvent::CharacteristicRead {
                status: code,
                characteristic,
                value,
            } if *characteristic == self.characteristic => Some(
                outcome_for(
                    self.name(),
                    *code,
                    GattState::ReadCharacteristicSuccess,
                    GattState::ReadCharacteristicFailure,
                )
                .map_result(|r| {
                    r.service(self.service)
                        .characteristic(self.characteristic)
                        .payload(value.clone())
                }),
            ),
            _ => None,
        }
    }
}

/// Writes a characteristic value.
/// 写入特征值。
#[derive(Debug, Clone)]
pub struct WriteCharacteristic {
    service: Uuid,
    characteristic: Uuid,
    value: Bytes,
    with_response: bool,
}

impl WriteCharacteristic {
    pub fn new(service: Uuid, characteristic: Uuid, value: impl Into<Bytes>) -> Self {
        Self {
            service,
            characteristic,
            value: value.into(),
            with_response: true,
        }
    }

    /// Writes without waiting for an ATT response. The native stack still
    /// reports when the write left its queue.
    pub fn without_response(mut self) -> Self {
        self.with_response = false;
        self
    }
}

impl GattOperation for WriteCharacteristic {
    fn name(&self) -> &'static str {
        "WriteCharacteristic"
    }

    fn in_progress_state(&self) -> GattState {
        GattState::WritingCharacteristic
    }

    fn failure_state(&self) -> GattState {
        GattState::WriteCharacteristicFailure
    }

    fn begin(&mut self, ctx: &OperationContext<'_>) -> Begin {
        issue(
            ctx,
            GattCommand::WriteCharacteristic {
                service: self.service,
                characteristic: self.characteristic,
                value: self.value.clone(),
                with_response: self.with_response,
            },
        )
    }

    fn on_event(&mut self, event: &GattEvent) -> Option<Outcome> {
        match event {
            GattEvent::CharacteristicWritten {
                status: code,
                characteristic,
            } if *characteristic == self.characteristic => Some(
                outcome_for(
                    self.name(),
                    *code,
                    GattState::WriteCharacteristicSuccess,
                    GattState::WriteCharacteristicFailure,
                )
                .map_result(|r| {
                    r.service(self.service)
                        .characteristic(self.characteristic)
                        .payload(self.value.clone())
                }),
            ),
            _ => None,
        }
    }
}

/// Reads a descriptor value.
/// 读取描述符值。
#[derive(Debug, Clone)]
pub struct ReadDescriptor {
    service: Uuid,
    characteristic: Uuid,
    descriptor: Uuid,
}

impl ReadDescriptor {
    pub fn new(service: Uuid, characteristic: Uuid, descriptor: Uuid) -> Self {
        Self {
            service,
            characteristic,
            descriptor,
        }
    }
}

impl GattOperation for ReadDescriptor {
    fn name(&self) -> &'static str {
        "ReadDescriptor"
    }

    fn in_progress_state(&self) -> GattState {
        GattState::ReadingDescriptor
    }

    fn failure_state(&self) -> GattState {
        GattState::ReadDescriptorFailure
    }

    fn begin(&mut self, ctx: &OperationContext<'_>) -> Begin {
        issue(
            ctx,
            GattCommand::ReadDescriptor {
                service: self.service,
                characteristic: self.characteristic,
                descriptor: self.descriptor,
            },
        )
    }

    fn on_event(&mut self, event: &GattEvent) -> Option<Outcome> {
        match event {
            GattEvent::DescriptorRead {
                status: code,
                descriptor,
                value,
            } if *descriptor == self.descriptor => Some(
                outcome_for(
                    self.name(),
                    *code,
                    GattState::ReadDescriptorSuccess,
                    GattState::ReadDescriptorFailure,
                )
                .map_result(|r| {
                    r.service(self.service)
                        .characteristic(self.characteristic)
                        .descriptor(self.descriptor)
                        .payload(value.clone())
                }),
            ),
            _ => None,
        }
    }
}

/// Writes a descriptor value.
/// 写入描述符值。
#[derive(Debug, Clone)]
pub struct WriteDescriptor {
    service: Uuid,
    characteristic: Uuid,
    descriptor: Uuid,
    value: Bytes,
}

impl WriteDescriptor {
    pub fn new(service: Uuid, characteristic: Uuid, descriptor: Uuid, value: impl Into<Bytes>) -> Self {
        Self {
            service,
            characteristic,
            descriptor,
            value: value.into(),
        }
    }
}

impl GattOperation for WriteDescriptor {
    fn name(&self) -> &'static str {
        "WriteDescriptor"
    }

    fn in_progress_state(&self) -> GattState {
        GattState::WritingDescriptor
    }

    fn failure_state(&self) -> GattState {
        GattState::WriteDescriptorFailure
    }

    fn begin(&mut self, ctx: &OperationContext<'_>) -> Begin {
        issue(
            ctx,
            GattCommand::WriteDescriptor {
                service: self.service,
                characteristic: self.characteristic,
                descriptor: self.descriptor,
                value: self.value.clone(),
            },
        )
    }

    fn on_event(&mut self, event: &GattEvent) -> Option<Outcome> {
        match event {
            GattEvent::DescriptorWritten {
                status: code,
                descriptor,
            } if *descriptor == self.descriptor => Some(
                outcome_for(
                    self.name(),
                    *code,
                    GattState::WriteDescriptorSuccess,
                    GattState::WriteDescriptorFailure,
                )
                .map_result(|r| {
                    r.service(self.service)
                        .characteristic(self.characteristic)
                        .descriptor(self.descriptor)
                }),
            ),
            _ => None,
        }
    }
}

/// Enables or disables notifications for a characteristic.
///
/// A successful enable is reported as a [`Situation::NotificationSubscriptionRace`]
/// so platforms that deliver the first notification before the subscription is
/// really active can hold the result back.
///
/// 启用或禁用特征的通知。
#[derive(Debug, Clone)]
pub struct SubscribeNotifications {
    service: Uuid,
    characteristic: Uuid,
    enable: bool,
}

impl SubscribeNotifications {
    pub fn enable(service: Uuid, characteristic: Uuid) -> Self {
        Self {
            service,
            characteristic,
            enable: true,
        }
    }

    pub fn disable(service: Uuid, characteristic: Uuid) -> Self {
        Self {
            service,
            characteristic,
            enable: false,
        }
    }

    fn states(&self) -> (GattState, GattState, GattState) {
        if self.enable {
            (
                GattState::EnablingCharacteristicNotification,
                GattState::EnableCharacteristicNotificationSuccess,
                GattState::EnableCharacteristicNotificationFailure,
            )
        } else {
            (
                GattState::DisablingCharacteristicNotification,
                GattState::DisableCharacteristicNotificationSuccess,
                GattState::DisableCharacteristicNotificationFailure,
            )
        }
    }
}

impl GattOperation for SubscribeNotifications {
    fn name(&self) -> &'static str {
        if self.enable {
            "SubscribeNotifications"
        } else {
            "UnsubscribeNotifications"
        }
    }

    fn in_progress_state(&self) -> GattState {
        self.states().0
    }

    fn failure_state(&self) -> GattState {
        self.states().2
    }

    fn begin(&mut self, ctx: &OperationContext<'_>) -> Begin {
        issue(
            ctx,
            GattCommand::SetNotification {
                service: self.service,
                characteristic: self.characteristic,
                enable: self.enable,
            },
        )
    }

    fn on_event(&mut self, event: &GattEvent) -> Option<Outcome> {
        match event {
            GattEvent::NotificationStateChanged {
                status: code,
                characteristic,
                enabled,
            } if *characteristic == self.characteristic && *enabled == self.enable => {
                let (_, success, failure) = self.states();
                let outcome = outcome_for(self.name(), *code, success, failure).map_result(|r| {
                    r.service(self.service).characteristic(self.characteristic)
                });
                Some(if self.enable && outcome.status() == ResultStatus::Success {
                    outcome.with_situation(Situation::NotificationSubscriptionRace)
                } else {
                    outcome
                })
            }
            _ => None,
        }
    }
}

/// Reads the signal strength of the link.
/// 读取链路的信号强度。
#[derive(Debug, Clone, Default)]
pub struct ReadRssi;

impl ReadRssi {
    pub fn new() -> Self {
        Self
    }
}

impl GattOperation for ReadRssi {
    fn name(&self) -> &'static str {
        "ReadRssi"
    }

    fn in_progress_state(&self) -> GattState {
        GattState::ReadingRssi
    }

    fn failure_state(&self) -> GattState {
        GattState::ReadRssiFailure
    }

    fn begin(&mut self, ctx: &OperationContext<'_>) -> Begin {
        issue(ctx, GattCommand::ReadRssi)
    }

    fn on_event(&mut self, event: &GattEvent) -> Option<Outcome> {
        match *event {
            GattEvent::RssiRead { status: code, rssi } => Some(
                outcome_for(
                    self.name(),
                    code,
                    GattState::ReadRssiSuccess,
                    GattState::ReadRssiFailure,
                )
                .map_result(|r| r.rssi(rssi)),
            ),
            _ => None,
        }
    }
}

/// Negotiates a larger ATT MTU.
/// 协商更大的 ATT MTU。
#[derive(Debug, Clone)]
pub struct RequestMtu {
    mtu: u16,
}

impl RequestMtu {
    pub fn new(mtu: u16) -> Self {
        Self { mtu }
    }
}

impl GattOperation for RequestMtu {
    fn name(&self) -> &'static str {
        "RequestMtu"
    }

    fn in_progress_state(&self) -> GattState {
        GattState::RequestingMtu
    }

    fn failure_state(&self) -> GattState {
        GattState::RequestMtuFailure
    }

    fn begin(&mut self, ctx: &OperationContext<'_>) -> Begin {
        issue(ctx, GattCommand::RequestMtu { mtu: self.mtu })
    }

    fn on_event(&mut self, event: &GattEvent) -> Option<Outcome> {
        match *event {
            // The negotiated value may be lower than requested.
            GattEvent::MtuChanged { status: code, mtu } => Some(
                outcome_for(
                    self.name(),
                    code,
                    GattState::RequestMtuSuccess,
                    GattState::RequestMtuFailure,
                )
                .map_result(|r| r.mtu(mtu)),
            ),
            _ => None,
        }
    }
}

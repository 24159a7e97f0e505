//! Server-role operations, run on the local GATT server connection.
//!
//! 服务器角色的操作，运行在本地 GATT 服务器连接上。

use super::outcome_for;
use crate::{
    connection::Role,
    state::GattState,
    strategy::Situation,
    transaction::{Begin, GattOperation, OperationContext, Outcome, ResultStatus},
    transport::{DeviceId, GattCommand, GattEvent},
};
use bytes::Bytes;
use uuid::Uuid;

fn issue(ctx: &OperationContext<'_>, command: GattCommand) -> Begin {
    match ctx.issue(command) {
        Ok(()) => Begin::Pending,
        Err(refusal) => Begin::Refused(refusal),
    }
}

/// Publishes a service on the local server.
///
/// A failure is reported as [`Situation::ServerServicesCorrupted`]: some
/// stacks keep half-registered services around and refuse every later add.
///
/// 在本地服务器上发布服务。
#[derive(Debug, Clone)]
pub struct AddService {
    service: Uuid,
    characteristics: Vec<Uuid>,
}

impl AddService {
    pub fn new(service: Uuid, characteristics: Vec<Uuid>) -> Self {
        Self {
            service,
            characteristics,
        }
    }
}

impl GattOperation for AddService {
    fn name(&self) -> &'static str {
        "AddService"
    }

    fn role(&self) -> Role {
        Role::Server
    }

    fn in_progress_state(&self) -> GattState {
        GattState::AddingService
    }

    fn failure_state(&self) -> GattState {
        GattState::AddServiceFailure
    }

    fn begin(&mut self, ctx: &OperationContext<'_>) -> Begin {
        issue(
            ctx,
            GattCommand::AddService {
                service: self.service,
                characteristics: self.characteristics.clone(),
            },
        )
    }

    fn on_event(&mut self, event: &GattEvent) -> Option<Outcome> {
        match *event {
            GattEvent::ServiceAdded {
                status: code,
                service,
            } if service == self.service => {
                let outcome = outcome_for(
                    self.name(),
                    code,
                    GattState::AddServiceSuccess,
                    GattState::AddServiceFailure,
                )
                .map_result(|r| r.service(service));
                Some(if outcome.status() == ResultStatus::Failure {
                    outcome.with_situation(Situation::ServerServicesCorrupted)
                } else {
                    outcome
                })
            }
            _ => None,
        }
    }
}

/// Withdraws a service from the local server.
/// 从本地服务器撤回服务。
#[derive(Debug, Clone)]
pub struct RemoveService {
    service: Uuid,
}

impl RemoveService {
    pub fn new(service: Uuid) -> Self {
        Self { service }
    }
}

impl GattOperation for RemoveService {
    fn name(&self) -> &'static str {
        "RemoveService"
    }

    fn role(&self) -> Role {
        Role::Server
    }

    fn in_progress_state(&self) -> GattState {
        GattState::RemovingService
    }

    fn failure_state(&self) -> GattState {
        GattState::RemoveServiceFailure
    }

    fn begin(&mut self, ctx: &OperationContext<'_>) -> Begin {
        issue(
            ctx,
            GattCommand::RemoveService {
                service: self.service,
            },
        )
    }

    fn on_event(&mut self, event: &GattEvent) -> Option<Outcome> {
        match *event {
            GattEvent::ServiceRemoved {
                status: code,
                service,
            } if service == self.service => Some(
                outcome_for(
                    self.name(),
                    code,
                    GattState::RemoveServiceSuccess,
                    GattState::RemoveServiceFailure,
                )
                .map_result(|r| r.service(service)),
            ),
            _ => None,
        }
    }
}

/// Withdraws every service from the local server.
/// 从本地服务器撤回所有服务。
#[derive(Debug, Clone, Default)]
pub struct ClearServices;

impl ClearServices {
    pub fn new() -> Self {
        Self
    }
}

impl GattOperation for ClearServices {
    fn name(&self) -> &'static str {
        "ClearServices"
    }

    fn role(&self) -> Role {
        Role::Server
    }

    fn in_progress_state(&self) -> GattState {
        GattState::ClearingServices
    }

    fn failure_state(&self) -> GattState {
        GattState::ClearServicesFailure
    }

    fn begin(&mut self, ctx: &OperationContext<'_>) -> Begin {
        issue(ctx, GattCommand::ClearServices)
    }

    fn on_event(&mut self, event: &GattEvent) -> Option<Outcome> {
        match *event {
            GattEvent::ServicesCleared { status: code } => Some(outcome_for(
                self.name(),
                code,
                GattState::ClearServicesSuccess,
                GattState::ClearServicesFailure,
            )),
            _ => None,
        }
    }
}

/// Notifies (or indicates) a characteristic value to a subscribed client.
/// 向已订阅的客户端通知（或指示）特征值。
#[derive(Debug, Clone)]
pub struct NotifyCharacteristic {
    target: DeviceId,
    service: Uuid,
    characteristic: Uuid,
    value: Bytes,
    confirm: bool,
}

impl NotifyCharacteristic {
    pub fn new(target: DeviceId, service: Uuid, characteristic: Uuid, value: impl Into<Bytes>) -> Self {
        Self {
            target,
            service,
            characteristic,
            value: value.into(),
            confirm: false,
        }
    }

    /// Sends an indication, which the client must confirm.
    pub fn indicate(mut self) -> Self {
        self.confirm = true;
        self
    }
}

impl GattOperation for NotifyCharacteristic {
    fn name(&self) -> &'static str {
        "NotifyCharacteristic"
    }

    fn role(&self) -> Role {
        Role::Server
    }

    fn in_progress_state(&self) -> GattState {
        GattState::NotifyingCharacteristic
    }

    fn failure_state(&self) -> GattState {
        GattState::NotifyCharacteristicFailure
    }

    fn begin(&mut self, ctx: &OperationContext<'_>) -> Begin {
        issue(
            ctx,
            GattCommand::NotifyCharacteristic {
                target: self.target.clone(),
                service: self.service,
                characteristic: self.characteristic,
                value: self.value.clone(),
                confirm: self.confirm,
            },
        )
    }

    fn on_event(&mut self, event: &GattEvent) -> Option<Outcome> {
        match event {
            GattEvent::NotificationSent {
                status: code,
                target,
            } if *target == self.target => Some(
                outcome_for(
                    self.name(),
                    *code,
                    GattState::NotifyCharacteristicSuccess,
                    GattState::NotifyCharacteristicFailure,
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

/// Answers a read or write request a remote client made to the local server.
/// 应答远端客户端对本地服务器发出的读或写请求。
#[derive(Debug, Clone)]
pub struct SendResponse {
    target: DeviceId,
    request_id: u32,
    response_status: i32,
    offset: u16,
    value: Bytes,
}

impl SendResponse {
    pub fn new(target: DeviceId, request_id: u32, response_status: i32, value: impl Into<Bytes>) -> Self {
        Self {
            target,
            request_id,
            response_status,
            offset: 0,
            value: value.into(),
        }
    }

    pub fn offset(mut self, offset: u16) -> Self {
        self.offset = offset;
        self
    }
}

impl GattOperation for SendResponse {
    fn name(&self) -> &'static str {
        "SendResponse"
    }

    fn role(&self) -> Role {
        Role::Server
    }

    fn in_progress_state(&self) -> GattState {
        GattState::SendingServerResponse
    }

    fn failure_state(&self) -> GattState {
        GattState::SendServerResponseFailure
    }

    fn begin(&mut self, ctx: &OperationContext<'_>) -> Begin {
        issue(
            ctx,
            GattCommand::SendResponse {
                target: self.target.clone(),
                request_id: self.request_id,
                status: self.response_status,
                offset: self.offset,
                value: self.value.clone(),
            },
        )
    }

    fn on_event(&mut self, event: &GattEvent) -> Option<Outcome> {
        match *event {
            GattEvent::ResponseSent {
                status: code,
                request_id,
            } if request_id == self.request_id => Some(
                outcome_for(
                    self.name(),
                    code,
                    GattState::SendServerResponseSuccess,
                    GattState::SendServerResponseFailure,
                )
                .map_result(|r| r.request_id(request_id).offset(self.offset)),
            ),
            _ => None,
        }
    }
}

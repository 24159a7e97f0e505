//! 测试辅助工具模块
//! Test utilities module

#![cfg(test)]

use crate::transport::{
    DeviceId, GattCommand, GattEvent, GattRequest, GattTransport, TransportRefusal, status,
};
use bytes::Bytes;
use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, Once,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};
use uuid::Uuid;

/// Initializes tracing for tests, ensuring it's only done once.
pub fn init_tracing() {
    static TRACING_INIT: Once = Once::new();
    TRACING_INIT.call_once(|| {
        let filter =
            std::env::var("RUST_LOG").unwrap_or_else(|_| "gatt_engine=debug".to_string());
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

pub const SERVICE: Uuid = Uuid::from_u128(0x0000180d_0000_1000_8000_00805f9b34fb);
pub const CHARACTERISTIC: Uuid = Uuid::from_u128(0x00002a37_0000_1000_8000_00805f9b34fb);
pub const DESCRIPTOR: Uuid = Uuid::from_u128(0x00002902_0000_1000_8000_00805f9b34fb);

/// Characteristic `n` of [`SERVICE`], for tests that need several distinct ones.
pub fn characteristic(n: u128) -> Uuid {
    Uuid::from_u128(0x0000_2a00_0000_1000_8000_00805f9b34fb + (n << 96))
}

#[derive(Debug, Default)]
struct Script {
    delay: Duration,
    delays: HashMap<Uuid, Duration>,
    fail_with: Option<i32>,
    refuse: Option<TransportRefusal>,
    silent: bool,
    hold: bool,
}

#[derive(Debug, Default)]
struct Inner {
    script: Mutex<Script>,
    issued: Mutex<Vec<GattCommand>>,
    held: Mutex<Vec<GattRequest>>,
    outstanding: AtomicUsize,
    max_outstanding: AtomicUsize,
}

/// A simulated native stack.
///
/// Every accepted request is answered from a spawned task after the configured
/// delay, so the connection sees the same asynchrony as with a real stack.
#[derive(Debug, Clone, Default)]
pub struct FakeTransport {
    inner: Arc<Inner>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared(&self) -> Arc<dyn GattTransport> {
        Arc::new(self.clone())
    }

    pub fn with_delay(self, delay: Duration) -> Self {
        self.script().delay = delay;
        self
    }

    /// Answers requests for `characteristic` after `delay` instead.
    pub fn with_delay_for(self, characteristic: Uuid, delay: Duration) -> Self {
        self.script().delays.insert(characteristic, delay);
        self
    }

    /// Answers every request with a negative `code`.
    pub fn failing_with(self, code: i32) -> Self {
        self.set_failing(Some(code));
        self
    }

    pub fn set_failing(&self, code: Option<i32>) {
        self.script().fail_with = code;
    }

    pub fn set_refusing(&self, refusal: Option<TransportRefusal>) {
        self.script().refuse = refusal;
    }

    /// Accepts requests but never answers them.
    pub fn set_silent(&self, silent: bool) {
        self.script().silent = silent;
    }

    /// Accepts requests and keeps them so the test can answer by hand.
    pub fn set_holding(&self, hold: bool) {
        self.script().hold = hold;
    }

    /// Takes the requests kept since holding was switched on.
    pub fn take_held(&self) -> Vec<GattRequest> {
        std::mem::take(&mut *self.inner.held.lock().unwrap())
    }

    pub fn issued(&self) -> Vec<GattCommand> {
        self.inner.issued.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// The highest number of requests that were awaiting an answer at once.
    pub fn max_outstanding(&self) -> usize {
        self.inner.max_outstanding.load(Ordering::SeqCst)
    }

    fn script(&self) -> std::sync::MutexGuard<'_, Script> {
        self.inner.script.lock().unwrap()
    }
}

impl GattTransport for FakeTransport {
    fn issue(&self, request: GattRequest) -> Result<(), TransportRefusal> {
        let GattRequest {
            device,
            command,
            responder,
        } = request;
        self.inner.issued.lock().unwrap().push(command.clone());

        let (delay, fail_with, silent, hold) = {
            let script = self.script();
            if let Some(refusal) = script.refuse.clone() {
                return Err(refusal);
            }
            let delay = target_characteristic(&command)
                .and_then(|c| script.delays.get(&c).copied())
                .unwrap_or(script.delay);
            (delay, script.fail_with, script.silent, script.hold)
        };
        if silent {
            return Ok(());
        }
        if hold {
            self.inner.held.lock().unwrap().push(GattRequest {
                device,
                command,
                responder,
            });
            return Ok(());
        }

        let event = answer(&command, fail_with);
        tracing::trace!(%device, ?event, ?delay, "Fake transport answering");
        let now = self.inner.outstanding.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.max_outstanding.fetch_max(now, Ordering::SeqCst);

        let inner = self.inner.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            inner.outstanding.fetch_sub(1, Ordering::SeqCst);
            responder.respond(event);
        });
        Ok(())
    }
}

fn target_characteristic(command: &GattCommand) -> Option<Uuid> {
    match command {
        GattCommand::ReadCharacteristic { characteristic, .. }
        | GattCommand::WriteCharacteristic { characteristic, .. }
        | GattCommand::SetNotification { characteristic, .. } => Some(*characteristic),
        _ => None,
    }
}

/// Builds the callback a well-behaved stack would send for `command`.
fn answer(command: &GattCommand, fail_with: Option<i32>) -> GattEvent {
    let code = fail_with.unwrap_or(status::SUCCESS);
    match command {
        GattCommand::Connect { .. } => GattEvent::ConnectionStateChanged {
            status: code,
            connected: fail_with.is_none(),
        },
        GattCommand::Disconnect => GattEvent::ConnectionStateChanged {
            status: status::SUCCESS,
            connected: false,
        },
        GattCommand::DiscoverServices => GattEvent::ServicesDiscovered {
            status: code,
            services: vec![SERVICE],
        },
        GattCommand::ReadCharacteristic { characteristic, .. } => GattEvent::CharacteristicRead {
            status: code,
            characteristic: *characteristic,
            value: Bytes::copy_from_slice(characteristic.as_bytes()),
        },
        GattCommand::WriteCharacteristic { characteristic, .. } => {
            GattEvent::CharacteristicWritten {
                status: code,
                characteristic: *characteristic,
            }
        }
        GattCommand::ReadDescriptor { descriptor, .. } => GattEvent::DescriptorRead {
            status: code,
            descriptor: *descriptor,
            value: Bytes::from_static(&[0x01, 0x00]),
        },
        GattCommand::WriteDescriptor { descriptor, .. } => GattEvent::DescriptorWritten {
            status: code,
            descriptor: *descriptor,
        },
        GattCommand::SetNotification {
            characteristic,
            enable,
            ..
        } => GattEvent::NotificationStateChanged {
            status: code,
            characteristic: *characteristic,
            enabled: *enable,
        },
        GattCommand::ReadRssi => GattEvent::RssiRead {
            status: code,
            rssi: -58,
        },
        GattCommand::RequestMtu { mtu } => GattEvent::MtuChanged {
            status: code,
            mtu: *mtu,
        },
        GattCommand::AddService { service, .. } => GattEvent::ServiceAdded {
            status: code,
            service: *service,
        },
        GattCommand::RemoveService { service } => GattEvent::ServiceRemoved {
            status: code,
            service: *service,
        },
        GattCommand::ClearServices => GattEvent::ServicesCleared { status: code },
        GattCommand::NotifyCharacteristic { target, .. } => GattEvent::NotificationSent {
            status: code,
            target: target.clone(),
        },
        GattCommand::SendResponse { request_id, .. } => GattEvent::ResponseSent {
            status: code,
            request_id: *request_id,
        },
    }
}

//! Single-transaction lifecycles: success, failure, timeout, refusal and admission.
//! 单事务生命周期：成功、失败、超时、拒绝和准入。

use super::{DEVICE, client, connect, recorder, transitions};
use crate::{
    connection::{Connection, ConnectionEvent, Role},
    operation::{
        AddService, Connect, DiscoverServices, ReadCharacteristic, ReadRssi, RequestMtu,
        SubscribeNotifications,
    },
    state::GattState,
    testing::{CHARACTERISTIC, FakeTransport, SERVICE, init_tracing},
    transaction::{FailureKind, ResultStatus, Transaction},
    transport::{DeviceId, GattCommand, GattEvent, TransportRefusal, status},
};
use bytes::Bytes;
use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};
use tokio::{sync::oneshot, time::Instant};

#[tokio::test(start_paused = true)]
async fn connect_walks_connecting_connected_idle() {
    let fake = FakeTransport::new().with_delay(Duration::from_millis(1500));
    let connection = client(&fake);
    let mut events = connection.subscribe();
    assert_eq!(connection.current_state(), GattState::Disconnected);

    let start = Instant::now();
    let result = connection.execute(Transaction::new(Connect::new())).await;

    assert!(start.elapsed() >= Duration::from_millis(1500));
    assert_eq!(result.status(), ResultStatus::Success);
    assert_eq!(result.response_code(), Some(status::SUCCESS));
    assert_eq!(result.gatt_state(), Some(GattState::Connected));
    assert_eq!(result.transaction_name(), "Connect");
    assert_eq!(connection.current_state(), GattState::Idle);
    assert_eq!(
        transitions(&mut events),
        vec![
            (GattState::Disconnected, GattState::Connecting),
            (GattState::Connecting, GattState::Connected),
            (GattState::Connected, GattState::Idle),
        ]
    );
    assert_eq!(fake.issued(), vec![GattCommand::Connect { auto_connect: false }]);
}

#[tokio::test(start_paused = true)]
async fn failed_connect_rests_disconnected() {
    let fake = FakeTransport::new()
        .with_delay(Duration::from_millis(1500))
        .failing_with(status::CONNECTION_TIMEOUT);
    let connection = client(&fake);
    let mut events = connection.subscribe();

    let result = connection.execute(Transaction::new(Connect::new())).await;

    assert_eq!(result.status(), ResultStatus::Failure);
    assert_eq!(result.failure(), Some(FailureKind::OperationFailure));
    assert_eq!(result.response_code(), Some(status::CONNECTION_TIMEOUT));
    assert_eq!(result.gatt_state(), Some(GattState::Disconnected));
    assert_eq!(connection.current_state(), GattState::Disconnected);
    assert_eq!(
        transitions(&mut events),
        vec![
            (GattState::Disconnected, GattState::Connecting),
            (GattState::Connecting, GattState::Disconnected),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn timeout_delivers_once_and_discards_late_answer() {
    let fake = FakeTransport::new().with_delay(Duration::from_millis(1500));
    let connection = client(&fake);
    let calls = Arc::new(AtomicUsize::new(0));
    let (result_tx, result_rx) = oneshot::channel();

    let start = Instant::now();
    let counter = calls.clone();
    connection.submit(
        Transaction::new(Connect::new()).with_timeout(Duration::from_millis(500)),
        move |result| {
            counter.fetch_add(1, Ordering::SeqCst);
            let _ = result_tx.send(result);
        },
    );
    let result = result_rx.await.unwrap();

    assert!(start.elapsed() >= Duration::from_millis(500));
    assert!(start.elapsed() < Duration::from_millis(1500));
    assert_eq!(result.status(), ResultStatus::Timeout);
    assert_eq!(result.failure(), Some(FailureKind::Timeout));
    assert_eq!(result.gatt_state(), Some(GattState::Disconnected));

    // Let the connect answer and the cancelling disconnect's answer arrive.
    tokio::time::sleep(Duration::from_secs(3)).await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(connection.current_state(), GattState::Disconnected);
    assert_eq!(
        fake.issued(),
        vec![GattCommand::Connect { auto_connect: false }, GattCommand::Disconnect]
    );
}

#[tokio::test(start_paused = true)]
async fn answer_arriving_at_the_deadline_wins() {
    let fake = FakeTransport::new().with_delay(Duration::from_millis(10));
    let connection = client(&fake);
    connect(&connection).await;

    fake.set_holding(true);
    let (results, callback) = recorder();
    connection.submit(
        Transaction::new(ReadRssi::new()).with_timeout(Duration::from_secs(1)),
        callback,
    );
    let request = loop {
        if let Some(request) = fake.take_held().pop() {
            break request;
        }
        tokio::task::yield_now().await;
    };

    // The actor next wakes with both the answer and the expired deadline ready.
    request.responder.respond(GattEvent::RssiRead {
        status: status::SUCCESS,
        rssi: -40,
    });
    tokio::time::advance(Duration::from_secs(1)).await;
    tokio::time::sleep(Duration::from_secs(5)).await;

    let results = results.lock().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].status(), ResultStatus::Success);
    assert_eq!(results[0].rssi(), Some(-40));
    assert_eq!(connection.current_state(), GattState::Idle);
}

#[tokio::test(start_paused = true)]
async fn read_timeout_recovers_to_idle() {
    let fake = FakeTransport::new().with_delay(Duration::from_millis(10));
    let connection = client(&fake);
    connect(&connection).await;

    fake.set_silent(true);
    let result = connection
        .execute(
            Transaction::new(ReadCharacteristic::new(SERVICE, CHARACTERISTIC))
                .with_timeout(Duration::from_secs(2)),
        )
        .await;
    assert_eq!(result.status(), ResultStatus::Timeout);
    assert_eq!(result.gatt_state(), Some(GattState::ReadCharacteristicFailure));
    assert_eq!(connection.current_state(), GattState::Idle);

    fake.set_silent(false);
    let rssi = connection.execute(Transaction::new(ReadRssi::new())).await;
    assert_eq!(rssi.rssi(), Some(-58));
}

#[tokio::test(start_paused = true)]
async fn missing_handle_fails_before_submit_returns() {
    init_tracing();
    let connection = Connection::builder(DeviceId::new(DEVICE), Role::Client).spawn();
    let (results, callback) = recorder();

    connection.submit(Transaction::new(Connect::new()), callback);

    let results = results.lock().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].status(), ResultStatus::Failure);
    assert_eq!(results[0].failure(), Some(FailureKind::ResourceUnavailable));
    assert_eq!(connection.current_state(), GattState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn invalidated_handle_fails_later_submissions() {
    let fake = FakeTransport::new().with_delay(Duration::from_millis(10));
    let connection = client(&fake);
    connect(&connection).await;

    connection.replace_transport(None);
    assert!(!connection.has_transport());
    let (results, callback) = recorder();
    connection.submit(Transaction::new(ReadRssi::new()), callback);

    assert_eq!(
        results.lock().unwrap()[0].failure(),
        Some(FailureKind::ResourceUnavailable)
    );
    assert_eq!(fake.issued().len(), 1);

    connection.replace_transport(Some(fake.shared()));
    let rssi = connection.execute(Transaction::new(ReadRssi::new())).await;
    assert!(rssi.is_success());
}

#[tokio::test(start_paused = true)]
async fn transport_refusal_fails_without_timer() {
    let fake = FakeTransport::new();
    fake.set_refusing(Some(TransportRefusal::NoResources));
    let connection = client(&fake);

    let start = Instant::now();
    let result = connection.execute(Transaction::new(Connect::new())).await;

    assert_eq!(start.elapsed(), Duration::ZERO);
    assert_eq!(result.status(), ResultStatus::Failure);
    assert_eq!(result.failure(), Some(FailureKind::ResourceUnavailable));
    assert_eq!(result.gatt_state(), Some(GattState::Disconnected));
    assert_eq!(connection.current_state(), GattState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn operations_need_a_ready_link_and_matching_role() {
    let fake = FakeTransport::new().with_delay(Duration::from_millis(10));
    let connection = client(&fake);

    let read = connection
        .execute(Transaction::new(ReadCharacteristic::new(SERVICE, CHARACTERISTIC)))
        .await;
    assert_eq!(read.failure(), Some(FailureKind::Rejected));

    connect(&connection).await;
    let add = connection
        .execute(Transaction::new(AddService::new(SERVICE, vec![CHARACTERISTIC])))
        .await;
    assert_eq!(add.failure(), Some(FailureKind::Rejected));

    assert_eq!(fake.issued(), vec![GattCommand::Connect { auto_connect: false }]);
    assert_eq!(connection.current_state(), GattState::Idle);
}

#[tokio::test(start_paused = true)]
async fn connect_when_already_connected_needs_no_round_trip() {
    let fake = FakeTransport::new().with_delay(Duration::from_millis(10));
    let connection = client(&fake);
    connect(&connection).await;

    let again = connection.execute(Transaction::new(Connect::new())).await;

    assert!(again.is_success());
    assert_eq!(fake.issued().len(), 1);
    assert_eq!(connection.current_state(), GattState::Idle);
}

#[tokio::test(start_paused = true)]
async fn client_operations_fill_their_result_fields() {
    let fake = FakeTransport::new().with_delay(Duration::from_millis(20));
    let connection = client(&fake);
    connect(&connection).await;

    let discovery = connection.execute(Transaction::new(DiscoverServices::new())).await;
    assert_eq!(discovery.services(), &[SERVICE]);
    assert_eq!(discovery.gatt_state(), Some(GattState::DiscoverySuccess));

    let read = connection
        .execute(Transaction::new(ReadCharacteristic::new(SERVICE, CHARACTERISTIC)))
        .await;
    assert_eq!(read.characteristic(), Some(CHARACTERISTIC));
    assert_eq!(
        read.payload(),
        Some(&Bytes::copy_from_slice(CHARACTERISTIC.as_bytes()))
    );

    let mtu = connection.execute(Transaction::new(RequestMtu::new(247))).await;
    assert_eq!(mtu.mtu(), Some(247));

    let subscribe = connection
        .execute(Transaction::new(SubscribeNotifications::enable(
            SERVICE,
            CHARACTERISTIC,
        )))
        .await;
    assert!(subscribe.is_success());
    assert_eq!(connection.current_state(), GattState::Idle);
}

#[tokio::test(start_paused = true)]
async fn failed_discovery_reports_discovery_failure() {
    let fake = FakeTransport::new().with_delay(Duration::from_millis(10));
    let connection = client(&fake);
    connect(&connection).await;

    fake.set_failing(Some(status::GATT_ERROR));
    let result = connection.execute(Transaction::new(DiscoverServices::new())).await;

    assert_eq!(result.status(), ResultStatus::Failure);
    assert_eq!(result.gatt_state(), Some(GattState::DiscoveryFailure));
    assert_eq!(result.response_code(), Some(status::GATT_ERROR));
    assert_eq!(connection.current_state(), GattState::Idle);
}

#[tokio::test(start_paused = true)]
async fn unsolicited_events_are_broadcast() {
    let fake = FakeTransport::new().with_delay(Duration::from_millis(10));
    let connection = client(&fake);
    connect(&connection).await;
    let mut events = connection.subscribe();

    let notification = GattEvent::CharacteristicChanged {
        characteristic: CHARACTERISTIC,
        value: Bytes::from_static(&[0x06, 0x48]),
    };
    connection.callback_sink().on_event(notification.clone());

    match events.recv().await.unwrap() {
        ConnectionEvent::Transport(event) => assert_eq!(event, notification),
        other => panic!("unexpected event {other:?}"),
    }
    assert_eq!(connection.current_state(), GattState::Idle);
}

#[tokio::test(start_paused = true)]
async fn link_loss_while_idle_disconnects() {
    let fake = FakeTransport::new().with_delay(Duration::from_millis(10));
    let connection = client(&fake);
    connect(&connection).await;
    let mut observer = connection.state_observer();

    connection
        .callback_sink()
        .on_event(GattEvent::ConnectionStateChanged {
            status: status::CONNECTION_TERMINATED_BY_PEER,
            connected: false,
        });

    let state = observer
        .wait_for(|state| *state == GattState::Disconnected)
        .await;
    assert_eq!(state, Some(GattState::Disconnected));
}

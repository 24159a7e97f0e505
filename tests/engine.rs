//! End-to-end tests of the transaction engine through a `GattSession`, with the
//! test playing the native stack.
//! 通过 `GattSession` 对事务引擎进行端到端测试，由测试扮演原生协议栈。

pub mod common;

use bytes::Bytes;
use common::harness::{Stack, connected, init_tracing, plain_session};
use futures::future::join_all;
use gatt_engine::{
    config::Config,
    connection::ConnectionEvent,
    operation::{Connect, NotifyCharacteristic, ReadCharacteristic, SendResponse},
    session::{ConnectionKey, GattSession},
    state::GattState,
    strategy::DeviceProfile,
    transaction::{FailureKind, ResultStatus, Transaction},
    transport::{DeviceId, GattCommand, GattEvent, status},
};
use std::time::Duration;
use tokio::sync::oneshot;
use uuid::Uuid;

const SERVICE: Uuid = Uuid::from_u128(0x0000180f_0000_1000_8000_00805f9b34fb);
const BATTERY_LEVEL: Uuid = Uuid::from_u128(0x00002a19_0000_1000_8000_00805f9b34fb);

#[tokio::test(start_paused = true)]
async fn connections_progress_independently() {
    let session = plain_session();
    let (transport_a, mut stack_a) = Stack::new();
    let (transport_b, mut stack_b) = Stack::new();
    let a = session
        .open_client(DeviceId::new("dev-a"), DeviceProfile::default(), Some(transport_a))
        .unwrap();
    let b = session
        .open_client(DeviceId::new("dev-b"), DeviceProfile::default(), Some(transport_b))
        .unwrap();

    let connects = join_all([
        a.execute(Transaction::new(Connect::new())),
        b.execute(Transaction::new(Connect::new())),
    ]);
    let answer = async {
        stack_a.accept_connect().await;
        stack_b.accept_connect().await;
    };
    let (results, ()) = tokio::join!(connects, answer);
    assert!(results.iter().all(|r| r.is_success()));

    // A's read stays unanswered while B's completes.
    let (a_tx, a_rx) = oneshot::channel();
    a.submit(
        Transaction::new(ReadCharacteristic::new(SERVICE, BATTERY_LEVEL)),
        move |result| {
            let _ = a_tx.send(result);
        },
    );
    let a_request = stack_a.next().await;

    let b_read = b.execute(Transaction::new(ReadCharacteristic::new(SERVICE, BATTERY_LEVEL)));
    let b_answer = async {
        let request = stack_b.next().await;
        request.responder.respond(GattEvent::CharacteristicRead {
            status: status::SUCCESS,
            characteristic: BATTERY_LEVEL,
            value: Bytes::from_static(&[87]),
        });
    };
    let (b_result, ()) = tokio::join!(b_read, b_answer);
    assert_eq!(b_result.payload(), Some(&Bytes::from_static(&[87])));
    assert_eq!(a.current_state(), GattState::ReadingCharacteristic);

    a_request.responder.respond(GattEvent::CharacteristicRead {
        status: status::SUCCESS,
        characteristic: BATTERY_LEVEL,
        value: Bytes::from_static(&[12]),
    });
    let a_result = a_rx.await.unwrap();
    assert_eq!(a_result.payload(), Some(&Bytes::from_static(&[12])));
    assert_eq!(a.current_state(), GattState::Idle);

    session.close_all().await;
    assert!(session.is_empty());
}

#[tokio::test(start_paused = true)]
async fn answer_after_timeout_does_not_complete_the_next_transaction() {
    let session = plain_session();
    let (transport, mut stack) = Stack::new();
    let device = DeviceId::new("dev-late");
    let connection = session
        .open_client(device.clone(), DeviceProfile::default(), Some(transport))
        .unwrap();

    let connect = connection.execute(Transaction::new(Connect::new()));
    let (result, ()) = tokio::join!(connect, stack.accept_connect());
    assert!(result.is_success());

    let first = connection.execute(
        Transaction::new(ReadCharacteristic::new(SERVICE, BATTERY_LEVEL))
            .with_timeout(Duration::from_secs(1)),
    );
    let (first, late) = tokio::join!(first, stack.next());
    assert_eq!(first.status(), ResultStatus::Timeout);

    let (second_tx, second_rx) = oneshot::channel();
    connection.submit(
        Transaction::new(ReadCharacteristic::new(SERVICE, BATTERY_LEVEL)),
        move |result| {
            let _ = second_tx.send(result);
        },
    );
    let current = stack.next().await;
    assert_ne!(late.responder.token(), current.responder.token());

    // The stale answer carries the same characteristic but the old token.
    late.responder.respond(GattEvent::CharacteristicRead {
        status: status::SUCCESS,
        characteristic: BATTERY_LEVEL,
        value: Bytes::from_static(b"stale"),
    });
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(connection.current_state(), GattState::ReadingCharacteristic);

    current.responder.respond(GattEvent::CharacteristicRead {
        status: status::SUCCESS,
        characteristic: BATTERY_LEVEL,
        value: Bytes::from_static(b"fresh"),
    });
    let second = second_rx.await.unwrap();
    assert_eq!(second.payload(), Some(&Bytes::from_static(b"fresh")));
    assert!(stack.is_quiet());
}

#[tokio::test(start_paused = true)]
async fn server_answers_incoming_requests() {
    init_tracing();
    let session = GattSession::new(Config::default());
    let (transport, mut stack) = Stack::new();
    let server = session
        .open_server(DeviceProfile::default(), Some(transport))
        .unwrap();
    assert!(matches!(
        session.open_server(DeviceProfile::default(), None),
        Err(gatt_engine::error::Error::ConnectionExists(ConnectionKey::Server))
    ));
    let mut events = server.subscribe();
    let remote = DeviceId::new("central-1");

    server.callback_sink().on_event(GattEvent::ReadRequest {
        source: remote.clone(),
        request_id: 7,
        characteristic: BATTERY_LEVEL,
        offset: 0,
    });
    let request_id = loop {
        if let ConnectionEvent::Transport(GattEvent::ReadRequest { request_id, .. }) =
            events.recv().await.unwrap()
        {
            break request_id;
        }
    };

    let respond = server.execute(Transaction::new(SendResponse::new(
        remote.clone(),
        request_id,
        status::SUCCESS,
        Bytes::from_static(&[64]),
    )));
    let answer = async {
        let request = stack.next().await;
        assert!(matches!(
            request.command,
            GattCommand::SendResponse { request_id: 7, .. }
        ));
        request.responder.respond(GattEvent::ResponseSent {
            status: status::SUCCESS,
            request_id: 7,
        });
    };
    let (result, ()) = tokio::join!(respond, answer);
    assert!(result.is_success());
    assert_eq!(result.request_id(), Some(7));

    let notify = server.execute(
        Transaction::new(NotifyCharacteristic::new(
            remote.clone(),
            SERVICE,
            BATTERY_LEVEL,
            Bytes::from_static(&[63]),
        ))
        .with_timeout(Duration::from_secs(2)),
    );
    let (result, _unanswered) = tokio::join!(notify, stack.next());
    assert_eq!(result.failure(), Some(FailureKind::Timeout));
    assert_eq!(server.current_state(), GattState::Idle);

    session.close(&ConnectionKey::Server).await.unwrap();
    assert!(session.server().is_none());
}

#[tokio::test(start_paused = true)]
async fn client_without_handle_fails_until_one_is_installed() {
    let session = plain_session();
    let device = DeviceId::new("dev-nohandle");
    let connection = session
        .open_client(device.clone(), DeviceProfile::default(), None)
        .unwrap();

    let result = connection.execute(Transaction::new(Connect::new())).await;
    assert_eq!(result.failure(), Some(FailureKind::ResourceUnavailable));

    let (transport, mut stack) = Stack::new();
    session.client(&device).unwrap().replace_transport(Some(transport));
    let connect = connection.execute(Transaction::new(Connect::new()));
    let answer = async {
        let request = stack.next().await;
        request.responder.respond(connected());
    };
    let (result, ()) = tokio::join!(connect, answer);
    assert!(result.is_success());
    assert_eq!(connection.current_state(), GattState::Idle);
}

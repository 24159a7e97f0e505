//! Queue discipline: FIFO completion, one request on the wire, bounded queue.
//! 队列规则：FIFO 完成、同一时刻只有一个请求、有界队列。

use super::{client, client_with, connect, recorder};
use crate::{
    config::Config,
    operation::{ReadCharacteristic, ReadRssi},
    strategy::{DeviceProfile, StrategyProvider},
    testing::{FakeTransport, SERVICE, characteristic},
    transaction::{FailureKind, ResultStatus, Transaction},
};
use futures::future::join_all;
use std::{
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::sync::oneshot;

#[tokio::test(start_paused = true)]
async fn results_arrive_in_submission_order() {
    const N: u128 = 6;
    let mut fake = FakeTransport::new().with_delay(Duration::from_millis(10));
    // Earlier reads answer slower than later ones.
    for i in 0..N {
        fake = fake.with_delay_for(characteristic(i), Duration::from_millis(((N - i) * 100) as u64));
    }
    let connection = client(&fake);
    connect(&connection).await;

    let order = Arc::new(Mutex::new(Vec::new()));
    let mut pending = Vec::new();
    for i in 0..N {
        let (done_tx, done_rx) = oneshot::channel();
        let order = order.clone();
        connection.submit(
            Transaction::new(ReadCharacteristic::new(SERVICE, characteristic(i))),
            move |result| {
                order.lock().unwrap().push(result.characteristic());
                let _ = done_tx.send(result.status());
            },
        );
        pending.push(done_rx);
    }

    let statuses = join_all(pending).await;
    assert!(statuses.into_iter().all(|s| matches!(s, Ok(ResultStatus::Success))));

    let expected: Vec<_> = (0..N).map(|i| Some(characteristic(i))).collect();
    assert_eq!(*order.lock().unwrap(), expected);
    assert_eq!(fake.max_outstanding(), 1);
}

#[tokio::test(start_paused = true)]
async fn concurrent_submitters_never_overlap_on_the_wire() {
    let fake = FakeTransport::new().with_delay(Duration::from_millis(25));
    let connection = client(&fake);
    connect(&connection).await;

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let connection = connection.clone();
            tokio::spawn(async move { connection.execute(Transaction::new(ReadRssi::new())).await })
        })
        .collect();

    for result in join_all(tasks).await {
        assert!(result.unwrap().is_success());
    }
    assert_eq!(fake.max_outstanding(), 1);
    assert_eq!(fake.issued().len(), 9);
}

#[tokio::test(start_paused = true)]
async fn full_queue_rejects_new_submissions() {
    let fake = FakeTransport::new().with_delay(Duration::from_millis(100));
    let mut config = Config::default();
    config.transaction.max_queue_len = 2;
    let connection = client_with(&fake, config, StrategyProvider::new(), DeviceProfile::default());
    connect(&connection).await;

    let mut pending = Vec::new();
    for _ in 0..4 {
        let (done_tx, done_rx) = oneshot::channel();
        connection.submit(Transaction::new(ReadRssi::new()), move |result| {
            let _ = done_tx.send(result);
        });
        pending.push(done_rx);
    }
    let results: Vec<_> = join_all(pending)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    // One executing, two waiting, the fourth turned away.
    assert!(results[..3].iter().all(|r| r.is_success()));
    assert_eq!(results[3].failure(), Some(FailureKind::Rejected));
}

#[tokio::test(start_paused = true)]
async fn callbacks_may_submit_more_work() {
    let fake = FakeTransport::new().with_delay(Duration::from_millis(10));
    let connection = client(&fake);
    connect(&connection).await;

    let (results, record) = recorder();
    let (done_tx, done_rx) = oneshot::channel();
    let chained = connection.clone();
    connection.submit(Transaction::new(ReadRssi::new()), move |first| {
        record(first);
        chained.submit(Transaction::new(ReadRssi::new()), move |second| {
            let _ = done_tx.send(second);
        });
    });

    let second = done_rx.await.unwrap();
    assert!(second.is_success());
    assert_eq!(results.lock().unwrap().len(), 1);
    assert!(second.transaction_id() > results.lock().unwrap()[0].transaction_id());
}

//! tests/common/harness.rs
use gatt_engine::{
    config::Config,
    session::GattSession,
    strategy::StrategyProvider,
    transport::{GattEvent, GattRequest, GattTransport, TransportRefusal, status},
};
use std::{
    sync::{Arc, Once},
    time::Duration,
};
use tokio::sync::mpsc;

/// Initializes tracing for tests, ensuring it's only done once.
pub fn init_tracing() {
    static TRACING_INIT: Once = Once::new();
    TRACING_INIT.call_once(|| {
        let filter = std::env::var("RUST_LOG")
            .unwrap_or_else(|_| "gatt_engine=debug,engine=info".to_string());
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .init();
    });
}

/// A native stack driven by the test: every issued request is handed over
/// and the test decides when and how to answer it.
pub struct ScriptedTransport {
    requests: mpsc::UnboundedSender<GattRequest>,
}

impl GattTransport for ScriptedTransport {
    fn issue(&self, request: GattRequest) -> Result<(), TransportRefusal> {
        self.requests
            .send(request)
            .map_err(|_| TransportRefusal::HandleClosed)
    }
}

/// The test's side of a [`ScriptedTransport`].
pub struct Stack {
    requests: mpsc::UnboundedReceiver<GattRequest>,
}

impl Stack {
    pub fn new() -> (Arc<dyn GattTransport>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Arc::new(ScriptedTransport { requests: tx }),
            Self { requests: rx },
        )
    }

    /// Waits for the next request the connection issues.
    pub async fn next(&mut self) -> GattRequest {
        tokio::time::timeout(Duration::from_secs(600), self.requests.recv())
            .await
            .expect("no request issued")
            .expect("transport dropped")
    }

    /// Returns true if no request is waiting.
    pub fn is_quiet(&mut self) -> bool {
        self.requests.try_recv().is_err()
    }

    /// Answers the next request, which must be a connect, with success.
    pub async fn accept_connect(&mut self) {
        let request = self.next().await;
        assert!(matches!(
            request.command,
            gatt_engine::transport::GattCommand::Connect { .. }
        ));
        request.responder.respond(connected());
    }
}

pub fn connected() -> GattEvent {
    GattEvent::ConnectionStateChanged {
        status: status::SUCCESS,
        connected: true,
    }
}

/// A session with an empty strategy table.
pub fn plain_session() -> GattSession {
    init_tracing();
    GattSession::with_strategies(Config::default(), StrategyProvider::new())
}

//! The user-facing connection handle.
//!
//! A [`Connection`] owns one actor task that serializes every transaction
//! submitted against it. Handles are cheap to clone; all clones talk to the
//! same actor.
//!
//! 面向用户的连接句柄。每个 [`Connection`] 拥有一个串行化所有提交事务的 actor 任务。

mod actor;
pub(crate) mod command;


use self::{actor::ConnectionActor, command::ConnectionCommand};
use crate::{
    config::Config,
    error::{Error, Result},
    state::{GattState, StateCell, StateObserver},
    strategy::{DeviceProfile, StrategyProvider},
    transaction::{FailureKind, ResultStatus, Transaction, TransactionId, TransactionResult},
    transport::{CallbackSink, DeviceId, GattEvent, GattTransport},
};
use std::{collections::VecDeque, fmt, sync::Arc};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::{debug, info};

/// Which side of the GATT link a connection drives.
/// 连接驱动 GATT 链路的哪一侧。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Client,
    Server,
}

impl Role {
    /// A client starts without a link; a registered server is ready at once.
    pub fn initial_state(self) -> GattState {
        match self {
            Role::Client => GattState::Disconnected,
            Role::Server => GattState::Idle,
        }
    }
}

/// Something observable happened on a connection.
/// 连接上发生了可观察的事情。
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    /// The connection state changed.
    StateChanged { from: GattState, to: GattState },
    /// The transport reported an unsolicited event.
    Transport(GattEvent),
    /// A transaction delivered its result.
    TransactionFinished {
        id: TransactionId,
        name: &'static str,
        status: ResultStatus,
    },
}

type TransportSlot = Option<Arc<dyn GattTransport>>;

struct Shared {
    device: DeviceId,
    role: Role,
    command_tx: mpsc::UnboundedSender<ConnectionCommand>,
    transport: watch::Sender<TransportSlot>,
    events: broadcast::Sender<ConnectionEvent>,
    state: StateObserver,
}

/// A handle to one GATT connection (client or server role).
///
/// 一个 GATT 连接（客户端或服务器角色）的句柄。
#[derive(Clone)]
pub struct Connection {
    shared: Arc<Shared>,
}

impl Connection {
    /// Starts building a connection for `device`.
    pub fn builder(device: DeviceId, role: Role) -> ConnectionBuilder {
        ConnectionBuilder {
            device,
            role,
            profile: DeviceProfile::default(),
            transport: None,
            config: Arc::new(Config::default()),
            strategies: Arc::new(StrategyProvider::new()),
        }
    }

    pub fn device(&self) -> &DeviceId {
        &self.shared.device
    }

    pub fn role(&self) -> Role {
        self.shared.role
    }

    /// The current connection state, as last set by the actor.
    /// 当前连接状态。
    pub fn current_state(&self) -> GattState {
        self.shared.state.current()
    }

    pub fn state_observer(&self) -> StateObserver {
        self.shared.state.clone()
    }

    /// Subscribes to state changes, unsolicited transport events and finished
    /// transactions.
    /// 订阅状态变化、非请求传输事件和已完成的事务。
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.shared.events.subscribe()
    }

    /// The entry point for transport events no request is waiting for.
    pub fn callback_sink(&self) -> CallbackSink {
        CallbackSink::new(self.shared.device.clone(), self.shared.command_tx.clone())
    }

    pub fn has_transport(&self) -> bool {
        self.shared.transport.borrow().is_some()
    }

    /// Swaps the native handle, e.g. after the platform rebuilt it. `None`
    /// marks the handle invalid; later submissions fail immediately.
    ///
    /// 替换原生句柄。`None` 表示句柄无效；之后的提交会立即失败。
    pub fn replace_transport(&self, transport: Option<Arc<dyn GattTransport>>) {
        info!(
            device = %self.shared.device,
            present = transport.is_some(),
            "Replacing transport handle"
        );
        self.shared.transport.send_replace(transport);
    }

    /// Submits a transaction. `callback` receives its result exactly once.
    ///
    /// The caller is never blocked. Without a transport handle the transaction
    /// fails with `ResourceUnavailable` before this call returns.
    ///
    /// 提交一个事务。`callback` 恰好接收一次结果。调用者永远不会被阻塞。
    pub fn submit<F>(&self, mut transaction: Transaction, callback: F)
    where
        F: FnOnce(TransactionResult) + Send + 'static,
    {
        transaction.set_callback(Box::new(callback));

        if !self.has_transport() {
            debug!(
                device = %self.shared.device,
                tx = %transaction.id(),
                "No transport handle, failing transaction immediately"
            );
            self.reject_now(transaction, FailureKind::ResourceUnavailable);
            return;
        }

        if let Err(mpsc::error::SendError(ConnectionCommand::Submit(transaction))) =
            self.shared.command_tx.send(ConnectionCommand::Submit(transaction))
        {
            debug!(device = %self.shared.device, "Connection closed, rejecting transaction");
            self.reject_now(transaction, FailureKind::Rejected);
        }
    }

    /// Submits a transaction and waits for its result.
    /// 提交一个事务并等待其结果。
    pub async fn execute(&self, transaction: Transaction) -> TransactionResult {
        let id = transaction.id();
        let name = transaction.name();
        let (result_tx, result_rx) = oneshot::channel();
        self.submit(transaction, move |result| {
            let _ = result_tx.send(result);
        });
        result_rx.await.unwrap_or_else(|_| {
            TransactionResult::builder(name, ResultStatus::Failure)
                .transaction_id(id)
                .failure(FailureKind::Rejected)
                .build()
        })
    }

    /// Stops the actor. Queued and executing transactions are rejected.
    ///
    /// Fails with [`Error::ChannelClosed`] if the actor had already stopped.
    ///
    /// 停止 actor。排队中和执行中的事务将被拒绝。
    pub async fn close(&self) -> Result<()> {
        let (done_tx, done_rx) = oneshot::channel();
        self.shared
            .command_tx
            .send(ConnectionCommand::Shutdown { done: Some(done_tx) })
            .map_err(|_| Error::ChannelClosed)?;
        done_rx.await.map_err(|_| Error::ChannelClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.shared.command_tx.is_closed()
    }

    fn reject_now(&self, transaction: Transaction, kind: FailureKind) {
        let (id, name) = (transaction.id(), transaction.name());
        transaction.reject(kind, self.current_state());
        let _ = self.shared.events.send(ConnectionEvent::TransactionFinished {
            id,
            name,
            status: ResultStatus::Failure,
        });
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("device", &self.shared.device)
            .field("role", &self.shared.role)
            .field("state", &self.current_state())
            .finish()
    }
}

/// Configures and spawns a [`Connection`].
/// 配置并启动一个 [`Connection`]。
pub struct ConnectionBuilder {
    device: DeviceId,
    role: Role,
    profile: DeviceProfile,
    transport: TransportSlot,
    config: Arc<Config>,
    strategies: Arc<StrategyProvider>,
}

impl ConnectionBuilder {
    pub fn profile(mut self, profile: DeviceProfile) -> Self {
        self.profile = profile;
        self
    }

    pub fn transport(mut self, transport: Arc<dyn GattTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn config(mut self, config: Arc<Config>) -> Self {
        self.config = config;
        self
    }

    pub fn strategies(mut self, strategies: Arc<StrategyProvider>) -> Self {
        self.strategies = strategies;
        self
    }

    /// Spawns the connection actor on the current tokio runtime.
    /// 在当前 tokio 运行时上启动连接 actor。
    pub fn spawn(self) -> Connection {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(self.config.connection.event_capacity.max(1));
        let (transport_tx, transport_rx) = watch::channel(self.transport);
        let (state, observer) =
            StateCell::new(self.device.clone(), self.role.initial_state(), events.clone());

        let actor = ConnectionActor {
            device: self.device.clone(),
            role: self.role,
            profile: self.profile,
            config: self.config,
            strategies: self.strategies,
            state,
            transport: transport_rx,
            events: events.clone(),
            queue: VecDeque::new(),
            in_flight: None,
            command_rx,
            reply_tx: command_tx.downgrade(),
        };

        let device = self.device.clone();
        tokio::spawn(async move {
            info!(device = %device, "Spawning connection actor");
            actor.run().await;
        });

        Connection {
            shared: Arc::new(Shared {
                device: self.device,
                role: self.role,
                command_tx,
                transport: transport_tx,
                events,
                state: observer,
            }),
        }
    }
}

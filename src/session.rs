//! 会话 - 进程级的连接注册表
//! Session - The process-wide registry of connections
//!
//! One [`GattSession`] owns every client connection (keyed by remote device)
//! and at most one local server connection. The strategy table and the
//! configuration are shared read-only by all of them.

use crate::{
    config::Config,
    connection::{Connection, Role},
    error::{Error, Result},
    strategy::{DeviceProfile, StrategyProvider},
    transport::{DeviceId, GattTransport},
};
use dashmap::{DashMap, mapref::entry::Entry};
use std::{fmt, sync::Arc};
use tracing::{info, warn};

/// The device id under which the local server connection runs.
pub const LOCAL_SERVER_ID: &str = "local-gatt-server";

/// Identifies a connection in a [`GattSession`].
/// 标识 [`GattSession`] 中的一个连接。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ConnectionKey {
    /// A client connection to a remote device.
    Client(DeviceId),
    /// The local GATT server.
    Server,
}

impl fmt::Display for ConnectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionKey::Client(device) => write!(f, "client:{device}"),
            ConnectionKey::Server => f.write_str("server"),
        }
    }
}

/// Registry of the connections of one process.
///
/// Connections are independent: each has its own actor, queue and timer, so
/// they run concurrently with no ordering between them.
///
/// 一个进程的连接注册表。各连接相互独立：每个连接都有自己的 actor、队列和计时器，
/// 因此它们并发运行，彼此之间没有顺序关系。
pub struct GattSession {
    config: Arc<Config>,
    strategies: Arc<StrategyProvider>,
    connections: DashMap<ConnectionKey, Connection>,
}

impl GattSession {
    /// Creates a session with the built-in strategy table.
    /// 使用内置策略表创建会话。
    pub fn new(config: Config) -> Self {
        let strategies = StrategyProvider::with_defaults(&config);
        Self::with_strategies(config, strategies)
    }

    pub fn with_strategies(config: Config, strategies: StrategyProvider) -> Self {
        Self {
            config: Arc::new(config),
            strategies: Arc::new(strategies),
            connections: DashMap::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn strategies(&self) -> &StrategyProvider {
        &self.strategies
    }

    /// Opens a client connection to `device`.
    ///
    /// A connection without a transport handle accepts submissions but fails
    /// each of them with `ResourceUnavailable` until a handle is installed.
    ///
    /// 打开到 `device` 的客户端连接。
    pub fn open_client(
        &self,
        device: DeviceId,
        profile: DeviceProfile,
        transport: Option<Arc<dyn GattTransport>>,
    ) -> Result<Connection> {
        self.open(ConnectionKey::Client(device.clone()), device, Role::Client, profile, transport)
    }

    /// Opens the local server connection.
    /// 打开本地服务器连接。
    pub fn open_server(
        &self,
        profile: DeviceProfile,
        transport: Option<Arc<dyn GattTransport>>,
    ) -> Result<Connection> {
        self.open(
            ConnectionKey::Server,
            DeviceId::new(LOCAL_SERVER_ID),
            Role::Server,
            profile,
            transport,
        )
    }

    fn open(
        &self,
        key: ConnectionKey,
        device: DeviceId,
        role: Role,
        profile: DeviceProfile,
        transport: Option<Arc<dyn GattTransport>>,
    ) -> Result<Connection> {
        match self.connections.entry(key) {
            Entry::Occupied(entry) => {
                warn!(key = %entry.key(), "Connection already open");
                Err(Error::ConnectionExists(entry.key().clone()))
            }
            Entry::Vacant(entry) => {
                let mut builder = Connection::builder(device, role)
                    .profile(profile)
                    .config(self.config.clone())
                    .strategies(self.strategies.clone());
                if let Some(transport) = transport {
                    builder = builder.transport(transport);
                }
                let connection = builder.spawn();
                info!(key = %entry.key(), "Connection opened");
                entry.insert(connection.clone());
                Ok(connection)
            }
        }
    }

    pub fn client(&self, device: &DeviceId) -> Option<Connection> {
        self.get(&ConnectionKey::Client(device.clone()))
    }

    pub fn server(&self) -> Option<Connection> {
        self.get(&ConnectionKey::Server)
    }

    pub fn get(&self, key: &ConnectionKey) -> Option<Connection> {
        self.connections.get(key).map(|entry| entry.value().clone())
    }

    /// Removes the connection and stops its actor, rejecting its pending work.
    /// 移除连接并停止其 actor，拒绝其待处理的工作。
    pub async fn close(&self, key: &ConnectionKey) -> Result<()> {
        let (key, connection) = self
            .connections
            .remove(key)
            .ok_or_else(|| Error::ConnectionNotFound(key.clone()))?;
        info!(%key, "Closing connection");
        connection.close().await
    }

    /// Closes every connection.
    pub async fn close_all(&self) {
        let keys: Vec<ConnectionKey> = self.connections.iter().map(|e| e.key().clone()).collect();
        for key in keys {
            if let Err(e) = self.close(&key).await {
                warn!(%key, error = %e, "Failed to close connection");
            }
        }
    }

    pub fn keys(&self) -> Vec<ConnectionKey> {
        self.connections.iter().map(|e| e.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

impl Default for GattSession {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl fmt::Debug for GattSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GattSession")
            .field("connections", &self.connections.len())
            .field("strategies", &self.strategies)
            .finish()
    }
}

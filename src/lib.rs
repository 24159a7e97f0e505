#![deny(clippy::expect_used, clippy::unwrap_used)]

//! The root of the GATT transaction engine.
//! GATT 事务引擎的根。
//!
//! Every BLE GATT connection gets one serialized executor: transactions are
//! queued in submission order, at most one is on the wire at a time, each is
//! bounded by a timeout and each delivers exactly one result. Known
//! device/platform anomalies are routed to pluggable remediation strategies.
//!
//! 每个 BLE GATT 连接拥有一个串行执行器：事务按提交顺序排队，同一时刻最多只有一个在执行，
//! 每个事务都有超时限制并恰好交付一个结果。已知的设备/平台异常会被路由到可插拔的修复策略。

pub mod config;
pub mod connection;
pub mod error;
pub mod operation;
pub mod session;
pub mod state;
pub mod strategy;
pub mod transaction;
pub mod transport;

mod testing;

//! Concrete GATT operations submitted as transactions.
//!
//! 作为事务提交的具体 GATT 操作。

mod client;
mod link;
mod server;

pub use client::{
    DiscoverServices, ReadCharacteristic, ReadDescriptor, ReadRssi, RequestMtu,
    SubscribeNotifications, WriteCharacteristic, WriteDescriptor,
};
pub use link::{Connect, Disconnect};
pub use server::{AddService, ClearServices, NotifyCharacteristic, RemoveService, SendResponse};

use crate::{
    state::GattState,
    transaction::{Outcome, ResultStatus, TransactionResult},
    transport::status,
};

/// Maps a native status code onto the matching terminal state.
/// 将原生状态码映射到相应的最终状态。
pub(crate) fn outcome_for(
    name: &'static str,
    code: i32,
    success: GattState,
    failure: GattState,
) -> Outcome {
    let (result_status, state) = if code == status::SUCCESS {
        (ResultStatus::Success, success)
    } else {
        (ResultStatus::Failure, failure)
    };
    Outcome::new(
        state,
        TransactionResult::builder(name, result_status).response_code(code),
    )
}

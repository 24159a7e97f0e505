//! Link-establishing and link-tearing operations.
//!
//! For these the terminal link state (`Connected` / `Disconnected`) is itself
//! meaningful; a failed connect rests in `Disconnected`.
//!
//! 建立和拆除链路的操作。

use crate::{
    config::TransactionConfig,
    state::GattState,
    strategy::Situation,
    transaction::{Begin, GattOperation, OperationContext, Outcome, ResultStatus, TransactionResult},
    transport::{GattCommand, GattEvent, status},
};
use std::time::Duration;
use tracing::debug;

/// Establishes the link to the remote device.
/// 建立到远端设备的链路。
#[derive(Debug, Clone, Default)]
pub struct Connect {
    auto_connect: bool,
}

impl Connect {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lets the native stack connect whenever the device becomes available.
    pub fn auto_connect(mut self, auto_connect: bool) -> Self {
        self.auto_connect = auto_connect;
        self
    }
}

impl GattOperation for Connect {
    fn name(&self) -> &'static str {
        "Connect"
    }

    fn in_progress_state(&self) -> GattState {
        GattState::Connecting
    }

    fn failure_state(&self) -> GattState {
        GattState::Disconnected
    }

    fn admits(&self, state: GattState) -> bool {
        state.is_steady()
    }

    fn timeout(&self, config: &TransactionConfig) -> Duration {
        config.connect_timeout
    }

    fn begin(&mut self, ctx: &OperationContext<'_>) -> Begin {
        if ctx.current_state().is_link_ready() {
            debug!(device = %ctx.device(), "Already connected");
            return Begin::Done(Outcome::new(
                GattState::Connected,
                TransactionResult::builder(self.name(), ResultStatus::Success)
                    .response_code(status::SUCCESS),
            ));
        }
        match ctx.issue(GattCommand::Connect {
            auto_connect: self.auto_connect,
        }) {
            Ok(()) => Begin::Pending,
            Err(refusal) => Begin::Refused(refusal),
        }
    }

    fn on_event(&mut self, event: &GattEvent) -> Option<Outcome> {
        let GattEvent::ConnectionStateChanged { status: code, connected } = *event else {
            return None;
        };
        if connected && code == status::SUCCESS {
            return Some(Outcome::new(
                GattState::Connected,
                TransactionResult::builder(self.name(), ResultStatus::Success).response_code(code),
            ));
        }
        // A "connected" callback with an error status still leaves an unusable link.
        let outcome = Outcome::new(
            GattState::Disconnected,
            TransactionResult::builder(self.name(), ResultStatus::Failure).response_code(code),
        );
        Some(if code == status::GATT_ERROR {
            outcome.with_situation(Situation::StaleConnectionStatus)
        } else {
            outcome
        })
    }

    fn on_timeout(&mut self, ctx: &OperationContext<'_>) {
        // A connect that never answers keeps the native queue wedged until the
        // attempt is cancelled.
        if let Err(refusal) = ctx.issue(GattCommand::Disconnect) {
            debug!(device = %ctx.device(), %refusal, "Could not cancel timed out connect");
        }
    }

    fn rest_state(&self, status: ResultStatus) -> GattState {
        match status {
            ResultStatus::Success => GattState::Idle,
            ResultStatus::Failure | ResultStatus::Timeout => GattState::Disconnected,
        }
    }

    fn changes_link(&self) -> bool {
        true
    }
}

/// Tears the link down.
/// 拆除链路。
#[derive(Debug, Clone, Default)]
pub struct Disconnect {
    force: bool,
}

impl Disconnect {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issues the native disconnect even if the connection already looks
    /// disconnected, so the native handle is released.
    pub fn force(mut self) -> Self {
        self.force = true;
        self
    }
}

impl GattOperation for Disconnect {
    fn name(&self) -> &'static str {
        "Disconnect"
    }

    fn in_progress_state(&self) -> GattState {
        GattState::Disconnecting
    }

    fn failure_state(&self) -> GattState {
        GattState::DisconnectFailure
    }

    fn admits(&self, state: GattState) -> bool {
        state.is_steady()
    }

    fn begin(&mut self, ctx: &OperationContext<'_>) -> Begin {
        if !self.force && ctx.current_state() == GattState::Disconnected {
            return Begin::Done(Outcome::new(
                GattState::Disconnected,
                TransactionResult::builder(self.name(), ResultStatus::Success)
                    .response_code(status::SUCCESS),
            ));
        }
        match ctx.issue(GattCommand::Disconnect) {
            Ok(()) => Begin::Pending,
            Err(refusal) => Begin::Refused(refusal),
        }
    }

    fn on_event(&mut self, event: &GattEvent) -> Option<Outcome> {
        let GattEvent::ConnectionStateChanged { status: code, connected } = *event else {
            return None;
        };
        Some(if connected {
            Outcome::new(
                GattState::DisconnectFailure,
                TransactionResult::builder(self.name(), ResultStatus::Failure).response_code(code),
            )
        } else {
            // Any "disconnected" report means the link is gone, whatever the status.
            Outcome::new(
                GattState::Disconnected,
                TransactionResult::builder(self.name(), ResultStatus::Success).response_code(code),
            )
        })
    }

    fn rest_state(&self, status: ResultStatus) -> GattState {
        match status {
            ResultStatus::Failure => GattState::Idle,
            ResultStatus::Success | ResultStatus::Timeout => GattState::Disconnected,
        }
    }

    fn changes_link(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_maps_callbacks_to_link_states() {
        let mut connect = Connect::new();

        let ok = connect
            .on_event(&GattEvent::ConnectionStateChanged {
                status: status::SUCCESS,
                connected: true,
            })
            .unwrap();
        assert_eq!(ok.state(), GattState::Connected);
        assert_eq!(ok.status(), ResultStatus::Success);

        let timed_out = connect
            .on_event(&GattEvent::ConnectionStateChanged {
                status: status::CONNECTION_TIMEOUT,
                connected: false,
            })
            .unwrap();
        assert_eq!(timed_out.state(), GattState::Disconnected);
        assert_eq!(timed_out.status(), ResultStatus::Failure);
        assert_eq!(timed_out.situation(), None);

        let stale = connect
            .on_event(&GattEvent::ConnectionStateChanged {
                status: status::GATT_ERROR,
                connected: false,
            })
            .unwrap();
        assert_eq!(stale.situation(), Some(Situation::StaleConnectionStatus));

        assert!(connect.on_event(&GattEvent::RssiRead { status: 0, rssi: -50 }).is_none());
    }

    #[test]
    fn link_operations_rest_in_link_states() {
        assert_eq!(Connect::new().rest_state(ResultStatus::Success), GattState::Idle);
        assert_eq!(Connect::new().rest_state(ResultStatus::Timeout), GattState::Disconnected);
        assert_eq!(Disconnect::new().rest_state(ResultStatus::Success), GattState::Disconnected);
        assert_eq!(Disconnect::new().rest_state(ResultStatus::Failure), GattState::Idle);
    }
}

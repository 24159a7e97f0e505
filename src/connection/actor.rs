//! The implementation of the per-connection `ConnectionActor`.
//!
//! 每个连接的 `ConnectionActor` 实现。

use super::{ConnectionEvent, Role, TransportSlot, command::ConnectionCommand};
use crate::{
    config::Config,
    error::{Error, Result},
    state::{GattState, StateCell},
    strategy::{DeviceProfile, Situation, Strategy, StrategyContext, StrategyOutcome, StrategyProvider},
    transaction::{
        Begin, FailureKind, OperationContext, Outcome, ResultStatus, Transaction, TransactionId,
        TransactionPhase, TransactionResult,
    },
    transport::{DeviceId, GattEvent, status},
};
use std::{collections::VecDeque, sync::Arc};
use tokio::{
    sync::{broadcast, mpsc, watch},
    time::Instant,
};
use tracing::{debug, info, trace, warn};

/// What the transaction holding the slot is waiting for.
pub(crate) enum SlotPhase {
    /// The native request is pending until `deadline`.
    Executing { deadline: Instant },
    /// A strategy is running; the result is delivered when it finishes.
    /// `link_lost` is set when the link drops meanwhile; the connection then
    /// rests in `Disconnected` whatever the strategy asks for.
    Remediating {
        result: TransactionResult,
        rest: GattState,
        link_lost: bool,
    },
}

pub(crate) struct InFlight {
    transaction: Transaction,
    phase: SlotPhase,
}

/// The actor that owns one connection's queue and state.
///
/// It runs in a dedicated task. Submissions, transport answers, unsolicited
/// events, strategy completions and the in-flight timeout are all handled
/// here, one at a time.
///
/// 拥有一个连接的队列和状态的 actor。它在专用任务中运行，所有提交、传输应答、
/// 非请求事件、策略完成和执行中事务的超时都在这里逐个处理。
pub(crate) struct ConnectionActor {
    pub(crate) device: DeviceId,
    pub(crate) role: Role,
    pub(crate) profile: DeviceProfile,
    pub(crate) config: Arc<Config>,
    pub(crate) strategies: Arc<StrategyProvider>,
    pub(crate) state: StateCell,
    pub(crate) transport: watch::Receiver<TransportSlot>,
    pub(crate) events: broadcast::Sender<ConnectionEvent>,
    pub(crate) queue: VecDeque<Transaction>,
    pub(crate) in_flight: Option<InFlight>,
    pub(crate) command_rx: mpsc::UnboundedReceiver<ConnectionCommand>,
    /// Handed to responders and strategy tasks. Weak so the actor stops once
    /// every handle and pending answer is gone.
    pub(crate) reply_tx: mpsc::WeakUnboundedSender<ConnectionCommand>,
}

impl ConnectionActor {
    /// Runs the actor's main event loop.
    ///
    /// 运行 actor 的主事件循环。
    pub(crate) async fn run(mut self) {
        debug!(device = %self.device, role = ?self.role, "Connection actor started");
        let done = loop {
            let deadline = self.deadline();
            tokio::select! {
                biased;

                // 1. Commands first, so an answer that races its deadline wins.
                // 1. 优先处理命令，因此与截止时间竞争的应答获胜。
                command = self.command_rx.recv() => match command {
                    Some(ConnectionCommand::Shutdown { done }) => {
                        self.shutdown();
                        break done;
                    }
                    Some(command) => self.handle_command(command),
                    None => {
                        self.shutdown();
                        break None;
                    }
                },

                // 2. The in-flight transaction ran out of time.
                // 2. 执行中的事务超时。
                _ = sleep_until(deadline), if deadline.is_some() => {
                    self.handle_timeout();
                }
            }
            self.pump();
        };

        debug!(device = %self.device, "Connection actor stopped");
        // Close the command channel before acknowledging the shutdown.
        drop(self);
        if let Some(done) = done {
            let _ = done.send(());
        }
    }

    fn deadline(&self) -> Option<Instant> {
        match self.in_flight.as_ref().map(|f| &f.phase) {
            Some(SlotPhase::Executing { deadline }) => Some(*deadline),
            _ => None,
        }
    }

    fn handle_command(&mut self, command: ConnectionCommand) {
        match command {
            ConnectionCommand::Submit(transaction) => self.enqueue(transaction),
            ConnectionCommand::Response { token, event } => self.handle_response(token, event),
            ConnectionCommand::Unsolicited(event) => self.handle_unsolicited(event),
            ConnectionCommand::RemediationFinished { token, outcome } => {
                self.finish_remediation(token, outcome)
            }
            // Handled by the run loop.
            ConnectionCommand::Shutdown { .. } => {}
        }
    }

    fn enqueue(&mut self, transaction: Transaction) {
        if self.queue.len() >= self.config.transaction.max_queue_len {
            warn!(
                device = %self.device,
                tx = %transaction.id(),
                queued = self.queue.len(),
                "Transaction queue full, rejecting"
            );
            self.reject(transaction, FailureKind::Rejected);
            return;
        }
        trace!(
            device = %self.device,
            tx = %transaction.id(),
            name = transaction.name(),
            queued = self.queue.len(),
            "Transaction queued"
        );
        self.queue.push_back(transaction);
    }

    /// Admits queued transactions until one holds the slot or the queue is empty.
    /// 准入排队的事务，直到有一个占用槽位或队列为空。
    fn pump(&mut self) {
        while self.in_flight.is_none() {
            let Some(transaction) = self.queue.pop_front() else {
                break;
            };
            self.admit(transaction);
        }
    }

    fn admit(&mut self, mut transaction: Transaction) {
        let Some(transport) = self.transport.borrow().clone() else {
            debug!(device = %self.device, tx = %transaction.id(), "Transport handle gone");
            self.reject(transaction, FailureKind::ResourceUnavailable);
            return;
        };

        let state = self.state.get();
        let operation = transaction.operation();
        if operation.role() != self.role {
            warn!(
                device = %self.device,
                tx = %transaction.id(),
                name = transaction.name(),
                role = ?self.role,
                "Operation does not run on this connection role"
            );
            self.reject(transaction, FailureKind::Rejected);
            return;
        }
        if !operation.admits(state) {
            debug!(
                device = %self.device,
                tx = %transaction.id(),
                name = transaction.name(),
                %state,
                "Operation cannot start from current state"
            );
            self.reject(transaction, FailureKind::Rejected);
            return;
        }
        let timeout = transaction
            .timeout_override()
            .unwrap_or_else(|| operation.timeout(&self.config.transaction));
        let in_progress = operation.in_progress_state();

        let Some(reply_tx) = self.reply_tx.upgrade() else {
            self.reject(transaction, FailureKind::Rejected);
            return;
        };

        transaction.advance(TransactionPhase::Executing);
        self.state.set(in_progress);
        let id = transaction.id();
        let begin = {
            let ctx = OperationContext::new(&self.device, state, transport.as_ref(), id, &reply_tx);
            transaction.operation_mut().begin(&ctx)
        };

        match begin {
            Begin::Pending => {
                debug!(
                    device = %self.device,
                    tx = %id,
                    name = transaction.name(),
                    ?timeout,
                    "Transaction executing"
                );
                self.in_flight = Some(InFlight {
                    transaction,
                    phase: SlotPhase::Executing {
                        deadline: Instant::now() + timeout,
                    },
                });
            }
            Begin::Refused(refusal) => {
                warn!(
                    device = %self.device,
                    tx = %id,
                    name = transaction.name(),
                    %refusal,
                    "Transport refused request"
                );
                let failure_state = transaction.operation().failure_state();
                self.state.set(failure_state);
                transaction.advance(TransactionPhase::Rejected);
                let result = TransactionResult::builder(transaction.name(), ResultStatus::Failure)
                    .transaction_id(id)
                    .failure(FailureKind::ResourceUnavailable)
                    .gatt_state(failure_state)
                    .build();
                let rest = transaction.operation().rest_state(ResultStatus::Failure);
                self.deliver(transaction, result, rest);
            }
            Begin::Done(outcome) => self.complete(transaction, outcome),
        }
    }

    fn handle_response(&mut self, token: TransactionId, event: GattEvent) {
        let executing = matches!(
            &self.in_flight,
            Some(InFlight { transaction, phase: SlotPhase::Executing { .. } })
                if transaction.id() == token
        );
        if !executing {
            debug!(
                device = %self.device,
                tx = %token,
                ?event,
                "Discarding stale transport callback"
            );
            return;
        }
        self.offer(event);
    }

    /// Hands `event` to the executing operation and completes it if the event
    /// answers it.
    fn offer(&mut self, event: GattEvent) {
        let Some(mut in_flight) = self.in_flight.take() else {
            return;
        };
        match in_flight.transaction.operation_mut().on_event(&event) {
            Some(outcome) => self.complete(in_flight.transaction, outcome),
            None => {
                trace!(
                    device = %self.device,
                    tx = %in_flight.transaction.id(),
                    ?event,
                    "Event does not answer the executing operation"
                );
                self.in_flight = Some(in_flight);
            }
        }
    }

    fn handle_unsolicited(&mut self, event: GattEvent) {
        let _ = self.events.send(ConnectionEvent::Transport(event.clone()));
        if event.is_link_loss() {
            self.handle_link_loss(event);
        }
    }

    fn handle_link_loss(&mut self, event: GattEvent) {
        let Some(in_flight) = self.in_flight.as_mut() else {
            match self.role {
                // The local server outlives any one remote client.
                Role::Server => debug!(device = %self.device, "Remote client disconnected"),
                Role::Client if self.state.get().is_link_ready() => {
                    info!(device = %self.device, "Link lost while idle");
                    self.state.set(GattState::Disconnected);
                }
                Role::Client => {}
            }
            return;
        };

        if let SlotPhase::Remediating {
            rest, link_lost, ..
        } = &mut in_flight.phase
        {
            if self.role == Role::Client {
                *rest = GattState::Disconnected;
                *link_lost = true;
            }
            return;
        }
        if in_flight.transaction.operation().changes_link() {
            self.offer(event);
            return;
        }

        let Some(InFlight { mut transaction, .. }) = self.in_flight.take() else {
            return;
        };
        warn!(
            device = %self.device,
            tx = %transaction.id(),
            name = transaction.name(),
            "Remote device vanished during operation"
        );
        let failure_state = transaction.operation().failure_state();
        let code = event
            .status()
            .unwrap_or(status::CONNECTION_TERMINATED_BY_PEER);
        transaction.advance(TransactionPhase::Completed);
        self.state.set(failure_state);
        let result = TransactionResult::builder(transaction.name(), ResultStatus::Failure)
            .transaction_id(transaction.id())
            .response_code(code)
            .gatt_state(failure_state)
            .build();
        match self.role {
            Role::Client => self.finish(
                transaction,
                result,
                GattState::Disconnected,
                Some(Situation::RemoteVanishedDuringOperation),
            ),
            Role::Server => self.deliver(transaction, result, GattState::Idle),
        }
    }

    fn handle_timeout(&mut self) {
        let Some(InFlight { mut transaction, .. }) = self.in_flight.take() else {
            return;
        };
        let id = transaction.id();
        warn!(
            device = %self.device,
            tx = %id,
            name = transaction.name(),
            "Transaction timed out"
        );

        let transport = self.transport.borrow().clone();
        if let (Some(transport), Some(reply_tx)) = (transport, self.reply_tx.upgrade()) {
            let ctx = OperationContext::new(
                &self.device,
                self.state.get(),
                transport.as_ref(),
                id,
                &reply_tx,
            );
            transaction.operation_mut().on_timeout(&ctx);
        }

        transaction.advance(TransactionPhase::TimedOut);
        let failure_state = transaction.operation().failure_state();
        self.state.set(failure_state);
        let result = TransactionResult::builder(transaction.name(), ResultStatus::Timeout)
            .transaction_id(id)
            .gatt_state(failure_state)
            .build();
        let rest = transaction.operation().rest_state(ResultStatus::Timeout);
        self.deliver(transaction, result, rest);
    }

    fn complete(&mut self, mut transaction: Transaction, outcome: Outcome) {
        transaction.advance(TransactionPhase::Completed);
        let Outcome {
            state,
            result,
            situation,
        } = outcome;
        let rest = transaction.operation().rest_state(result.status());
        self.state.set(state);
        let result = result.transaction_id(transaction.id()).gatt_state(state).build();
        self.finish(transaction, result, rest, situation);
    }

    /// Delivers `result`, or first runs the strategy registered for `situation`.
    fn finish(
        &mut self,
        transaction: Transaction,
        result: TransactionResult,
        rest: GattState,
        situation: Option<Situation>,
    ) {
        if let Some(situation) = situation {
            match self.strategies.resolve(&self.profile, situation) {
                Some(strategy) => {
                    self.remediate(transaction, result, rest, situation, strategy);
                    return;
                }
                None => trace!(
                    device = %self.device,
                    ?situation,
                    "No strategy registered for situation"
                ),
            }
        }
        self.deliver(transaction, result, rest);
    }

    /// Runs `strategy` on its own task while `transaction` keeps the slot.
    ///
    /// The strategy's failure, panic or overrun degrades to delivering the
    /// original result.
    ///
    /// 在 `transaction` 保持槽位的同时，在独立任务上运行 `strategy`。
    fn remediate(
        &mut self,
        transaction: Transaction,
        result: TransactionResult,
        rest: GattState,
        situation: Situation,
        strategy: Arc<dyn Strategy>,
    ) {
        let Some(reply_tx) = self.reply_tx.upgrade() else {
            self.deliver(transaction, result, rest);
            return;
        };

        let token = transaction.id();
        let name = strategy.name();
        let budget = self.config.strategy.remediation_timeout;
        let ctx = StrategyContext {
            situation,
            device: (self.role == Role::Client).then(|| self.device.clone()),
            profile: self.profile.clone(),
            state: self.state.get(),
            result: result.clone(),
        };
        info!(
            device = %self.device,
            tx = %token,
            strategy = name,
            ?situation,
            "Applying strategy"
        );

        tokio::spawn(async move {
            let mut run = tokio::spawn(async move { strategy.apply(ctx).await });
            let outcome = match tokio::time::timeout(budget, &mut run).await {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(join_error)) => Err(Error::StrategyFailed {
                    strategy: name,
                    situation,
                    reason: join_error.to_string(),
                }),
                Err(_) => {
                    run.abort();
                    Err(Error::RemediationTimeout { strategy: name })
                }
            };
            let _ = reply_tx.send(ConnectionCommand::RemediationFinished { token, outcome });
        });

        self.in_flight = Some(InFlight {
            transaction,
            phase: SlotPhase::Remediating {
                result,
                rest,
                link_lost: false,
            },
        });
    }

    fn finish_remediation(&mut self, token: TransactionId, outcome: Result<StrategyOutcome>) {
        let remediating = matches!(
            &self.in_flight,
            Some(InFlight { transaction, phase: SlotPhase::Remediating { .. } })
                if transaction.id() == token
        );
        if !remediating {
            debug!(device = %self.device, tx = %token, "Discarding stale strategy outcome");
            return;
        }
        let Some(InFlight {
            transaction,
            phase:
                SlotPhase::Remediating {
                    result,
                    rest,
                    link_lost,
                },
        }) = self.in_flight.take()
        else {
            return;
        };

        match outcome {
            Ok(StrategyOutcome {
                result: replaced,
                rest_state,
                follow_up,
            }) => {
                let rest = if link_lost {
                    GattState::Disconnected
                } else {
                    rest_state.unwrap_or(rest)
                };
                self.deliver(transaction, replaced.unwrap_or(result), rest);
                // Ahead of everything queued, in the order the strategy gave.
                for follow in follow_up.into_iter().rev() {
                    debug!(
                        device = %self.device,
                        tx = %follow.id(),
                        name = follow.name(),
                        "Queueing corrective transaction"
                    );
                    self.queue.push_front(follow);
                }
            }
            Err(e) => {
                warn!(
                    device = %self.device,
                    tx = %token,
                    error = %e,
                    "Strategy failed, delivering original result"
                );
                self.deliver(transaction, result, rest);
            }
        }
    }

    /// Hands `result` to the caller, then moves the connection to `rest`.
    /// 将 `result` 交给调用者，然后将连接移至 `rest`。
    fn deliver(&mut self, mut transaction: Transaction, result: TransactionResult, rest: GattState) {
        let id = transaction.id();
        let name = transaction.name();
        let status = result.status();
        debug!(device = %self.device, tx = %id, name, ?status, "Delivering result");
        transaction.deliver(result);
        self.state.set(rest);
        let _ = self
            .events
            .send(ConnectionEvent::TransactionFinished { id, name, status });
    }

    fn reject(&self, transaction: Transaction, kind: FailureKind) {
        let id = transaction.id();
        let name = transaction.name();
        transaction.reject(kind, self.state.get());
        let _ = self.events.send(ConnectionEvent::TransactionFinished {
            id,
            name,
            status: ResultStatus::Failure,
        });
    }

    fn shutdown(&mut self) {
        info!(
            device = %self.device,
            queued = self.queue.len(),
            in_flight = self.in_flight.is_some(),
            "Connection shutting down"
        );
        if let Some(InFlight { transaction, phase }) = self.in_flight.take() {
            match phase {
                SlotPhase::Remediating { result, rest, .. } => {
                    self.deliver(transaction, result, rest)
                }
                SlotPhase::Executing { .. } => self.reject(transaction, FailureKind::Rejected),
            }
        }
        while let Some(transaction) = self.queue.pop_front() {
            self.reject(transaction, FailureKind::Rejected);
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

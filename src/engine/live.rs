//! Live engine
//!
//! One tokio task owns the [`TradingCore`] and serializes every mutation.
//! Each market gets a worker task that owns its price history and talks to
//! the core over a channel. Order submission runs in spawned tasks whose
//! outcomes come back to the core as fill events.

use super::{CoreSnapshot, EngineError, FillApplied, TradingCore};
use crate::config::{Config, HistoryConfig};
use crate::execution::{
    BalanceProvider, CloseEvent, ExecutionOutcome, FillEvent, IntentId, OrderExecutor,
    TradeIntent,
};
use crate::history::{PriceHistory, PriceSample};
use crate::position::{ClosedPosition, PositionId};
use crate::risk::{RejectReason, SuspensionFlag};
use crate::signal::{Signal, StrategySet};
use crate::telemetry::{self, CounterMetric, LatencyMetric};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

const CORE_BUFFER: usize = 1024;
const WORKER_BUFFER: usize = 256;
const RETRY_POLL: Duration = Duration::from_millis(500);

/// Requests handled by the core task
pub enum CoreCommand {
    Propose {
        signal: Signal,
        balance: Option<Decimal>,
        reply: oneshot::Sender<Option<Result<TradeIntent, RejectReason>>>,
    },
    Mark {
        market_id: String,
        price: Decimal,
        now: DateTime<Utc>,
        reply: oneshot::Sender<Vec<TradeIntent>>,
    },
    Fill {
        event: FillEvent,
        now: DateTime<Utc>,
        reply: oneshot::Sender<Result<FillApplied, EngineError>>,
    },
    Close {
        event: CloseEvent,
        reply: oneshot::Sender<Result<ClosedPosition, EngineError>>,
    },
    Withdraw {
        intent_id: IntentId,
        reply: oneshot::Sender<Result<TradeIntent, EngineError>>,
    },
    DueRetries {
        now: DateTime<Utc>,
        reply: oneshot::Sender<Vec<TradeIntent>>,
    },
    ConfirmSettlement {
        position_id: PositionId,
        reply: oneshot::Sender<bool>,
    },
    SweepSettlements {
        now: DateTime<Utc>,
        reply: oneshot::Sender<Vec<PositionId>>,
    },
    Reset {
        note: String,
        reply: oneshot::Sender<()>,
    },
    Snapshot {
        reply: oneshot::Sender<CoreSnapshot>,
    },
}

fn apply(core: &mut TradingCore, command: CoreCommand) {
    // A dropped reply only means the requester went away
    match command {
        CoreCommand::Propose {
            signal,
            balance,
            reply,
        } => {
            let _ = reply.send(core.propose(&signal, signal.timestamp, balance));
        }
        CoreCommand::Mark {
            market_id,
            price,
            now,
            reply,
        } => {
            let _ = reply.send(core.mark(&market_id, price, now));
        }
        CoreCommand::Fill { event, now, reply } => {
            let _ = reply.send(core.on_fill(event, now));
        }
        CoreCommand::Close { event, reply } => {
            let _ = reply.send(core.on_close(event));
        }
        CoreCommand::Withdraw { intent_id, reply } => {
            let _ = reply.send(core.withdraw(intent_id));
        }
        CoreCommand::DueRetries { now, reply } => {
            let _ = reply.send(core.due_retries(now));
        }
        CoreCommand::ConfirmSettlement { position_id, reply } => {
            let _ = reply.send(core.confirm_settlement(position_id));
        }
        CoreCommand::SweepSettlements { now, reply } => {
            let _ = reply.send(core.sweep_settlements(now));
        }
        CoreCommand::Reset { note, reply } => {
            core.reset(&note);
            let _ = reply.send(());
        }
        CoreCommand::Snapshot { reply } => {
            let _ = reply.send(core.snapshot());
        }
    }
}

/// Move the core into its own task
///
/// The task ends, returning the core, once every handle is dropped.
pub fn spawn_core(mut core: TradingCore) -> (CoreHandle, JoinHandle<TradingCore>) {
    let (tx, mut rx) = mpsc::channel(CORE_BUFFER);
    let flag = core.flag();

    let task = tokio::spawn(async move {
        while let Some(command) = rx.recv().await {
            apply(&mut core, command);
        }
        tracing::info!("Core task stopped");
        core
    });

    (CoreHandle { tx, flag }, task)
}

/// Cloneable sender side of the core task
#[derive(Clone)]
pub struct CoreHandle {
    tx: mpsc::Sender<CoreCommand>,
    flag: SuspensionFlag,
}

impl CoreHandle {
    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> CoreCommand,
    ) -> Result<T, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .await
            .map_err(|_| EngineError::CoreUnavailable)?;
        rx.await.map_err(|_| EngineError::CoreUnavailable)
    }

    pub fn is_suspended(&self) -> bool {
        self.flag.is_suspended()
    }

    pub async fn propose(
        &self,
        signal: Signal,
        balance: Option<Decimal>,
    ) -> Result<Option<Result<TradeIntent, RejectReason>>, EngineError> {
        self.request(|reply| CoreCommand::Propose {
            signal,
            balance,
            reply,
        })
        .await
    }

    pub async fn mark(
        &self,
        market_id: &str,
        price: Decimal,
        now: DateTime<Utc>,
    ) -> Result<Vec<TradeIntent>, EngineError> {
        self.request(|reply| CoreCommand::Mark {
            market_id: market_id.to_string(),
            price,
            now,
            reply,
        })
        .await
    }

    pub async fn fill(
        &self,
        event: FillEvent,
        now: DateTime<Utc>,
    ) -> Result<FillApplied, EngineError> {
        self.request(|reply| CoreCommand::Fill { event, now, reply })
            .await?
    }

    pub async fn close(&self, event: CloseEvent) -> Result<ClosedPosition, EngineError> {
        self.request(|reply| CoreCommand::Close { event, reply })
            .await?
    }

    pub async fn withdraw(&self, intent_id: IntentId) -> Result<TradeIntent, EngineError> {
        self.request(|reply| CoreCommand::Withdraw { intent_id, reply })
            .await?
    }

    pub async fn due_retries(&self, now: DateTime<Utc>) -> Result<Vec<TradeIntent>, EngineError> {
        self.request(|reply| CoreCommand::DueRetries { now, reply })
            .await
    }

    pub async fn confirm_settlement(&self, position_id: PositionId) -> Result<bool, EngineError> {
        self.request(|reply| CoreCommand::ConfirmSettlement { position_id, reply })
            .await
    }

    pub async fn sweep_settlements(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<PositionId>, EngineError> {
        self.request(|reply| CoreCommand::SweepSettlements { now, reply })
            .await
    }

    pub async fn reset(&self, note: &str) -> Result<(), EngineError> {
        self.request(|reply| CoreCommand::Reset {
            note: note.to_string(),
            reply,
        })
        .await
    }

    pub async fn snapshot(&self) -> Result<CoreSnapshot, EngineError> {
        self.request(|reply| CoreCommand::Snapshot { reply }).await
    }
}

/// Submits accepted intents and reports outcomes back to the core
#[derive(Clone)]
struct OrderDispatcher {
    core: CoreHandle,
    executor: Arc<dyn OrderExecutor>,
    timeout: Duration,
}

impl OrderDispatcher {
    fn dispatch(&self, intent: TradeIntent) {
        let core = self.core.clone();
        let executor = Arc::clone(&self.executor);
        let timeout = self.timeout;

        tokio::spawn(async move {
            let started = Instant::now();
            let outcome = match tokio::time::timeout(timeout, executor.submit(&intent)).await {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(e)) => ExecutionOutcome::Rejected {
                    reason: e.to_string(),
                },
                Err(_) => ExecutionOutcome::TimedOut,
            };
            telemetry::record_latency(LatencyMetric::OrderSubmission, started.elapsed());

            let event = FillEvent {
                intent_id: intent.id,
                outcome,
            };
            match core.fill(event, Utc::now()).await {
                Ok(applied) => tracing::debug!(intent_id = intent.id, ?applied, "Order resolved"),
                Err(EngineError::UnknownIntent(id)) => {
                    tracing::info!(intent_id = id, "Outcome for withdrawn intent ignored");
                }
                Err(e) => {
                    tracing::warn!(intent_id = intent.id, error = %e, "Failed to apply order outcome");
                }
            }
        });
    }
}

/// Decision loop for one market
struct MarketWorker {
    market_id: String,
    history: PriceHistory,
    strategies: StrategySet,
    core: CoreHandle,
    dispatcher: OrderDispatcher,
    balance: Option<Arc<dyn BalanceProvider>>,
}

impl MarketWorker {
    async fn run(mut self, mut rx: mpsc::Receiver<PriceSample>) {
        while let Some(sample) = rx.recv().await {
            if let Err(e) = self.on_sample(sample).await {
                tracing::error!(market = %self.market_id, error = %e, "Market worker stopping");
                break;
            }
        }
        tracing::debug!(market = %self.market_id, "Market worker stopped");
    }

    async fn on_sample(&mut self, sample: PriceSample) -> Result<(), EngineError> {
        let started = Instant::now();
        let price = sample.price;
        let now = sample.timestamp;

        if let Err(e) = self.history.record(sample) {
            tracing::warn!(error = %e, "Dropping price sample");
            telemetry::increment(CounterMetric::OutOfOrderSamples);
            return Ok(());
        }

        for exit in self.core.mark(&self.market_id, price, now).await? {
            self.dispatcher.dispatch(exit);
        }

        if self.core.is_suspended() {
            return Ok(());
        }
        let Some(signal) = self.strategies.evaluate(&self.market_id, &self.history) else {
            return Ok(());
        };
        telemetry::increment(CounterMetric::Signals);

        let balance = match &self.balance {
            Some(provider) => match provider.available_balance().await {
                Ok(balance) => Some(balance),
                Err(e) => {
                    tracing::warn!(error = %e, "Balance unavailable, skipping balance check");
                    None
                }
            },
            None => None,
        };

        if let Some(Ok(intent)) = self.core.propose(signal, balance).await? {
            self.dispatcher.dispatch(intent);
        }
        telemetry::record_latency(LatencyMetric::Decision, started.elapsed());
        Ok(())
    }
}

struct WorkerHandle {
    tx: mpsc::Sender<PriceSample>,
    task: JoinHandle<()>,
}

/// Async engine for live or paper trading
pub struct LiveEngine {
    core: CoreHandle,
    core_task: JoinHandle<TradingCore>,
    retry_task: JoinHandle<()>,
    retry_stop: oneshot::Sender<()>,
    workers: HashMap<String, WorkerHandle>,
    history: HistoryConfig,
    strategies: StrategySet,
    dispatcher: OrderDispatcher,
    balance: Option<Arc<dyn BalanceProvider>>,
}

impl LiveEngine {
    /// Spawn the core and retry tasks; requires a tokio runtime
    pub fn start(
        config: &Config,
        executor: Arc<dyn OrderExecutor>,
        balance: Option<Arc<dyn BalanceProvider>>,
    ) -> Self {
        let (core, core_task) = spawn_core(TradingCore::new(config));
        let dispatcher = OrderDispatcher {
            core: core.clone(),
            executor,
            timeout: Duration::from_secs(config.execution.order_timeout_seconds),
        };

        let (retry_stop, mut stop_rx) = oneshot::channel();
        let retries = dispatcher.clone();
        let retry_task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(RETRY_POLL);
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = interval.tick() => {
                        let now = Utc::now();
                        match retries.core.due_retries(now).await {
                            Ok(due) => {
                                for intent in due {
                                    tracing::info!(intent_id = intent.id, "Resubmitting order");
                                    retries.dispatch(intent);
                                }
                            }
                            Err(_) => break,
                        }
                        // Quiet markets get no marks, so deadlines are also swept here
                        if retries.core.sweep_settlements(now).await.is_err() {
                            break;
                        }
                    }
                }
            }
        });

        tracing::info!(
            strategies = ?config.signal.strategies,
            order_timeout_secs = config.execution.order_timeout_seconds,
            "Live engine started"
        );

        Self {
            core,
            core_task,
            retry_task,
            retry_stop,
            workers: HashMap::new(),
            history: config.history.clone(),
            strategies: StrategySet::from_config(&config.signal),
            dispatcher,
            balance,
        }
    }

    pub fn handle(&self) -> CoreHandle {
        self.core.clone()
    }

    /// Route a sample to its market's worker, starting one if needed
    pub async fn submit_price_sample(&mut self, sample: PriceSample) -> Result<(), EngineError> {
        let market_id = sample.market_id.clone();
        let worker = self
            .workers
            .entry(market_id.clone())
            .or_insert_with(|| {
                let (tx, rx) = mpsc::channel(WORKER_BUFFER);
                let worker = MarketWorker {
                    market_id: market_id.clone(),
                    history: PriceHistory::from_config(&self.history),
                    strategies: self.strategies.clone(),
                    core: self.core.clone(),
                    dispatcher: self.dispatcher.clone(),
                    balance: self.balance.clone(),
                };
                tracing::info!(market = %market_id, "Market worker started");
                WorkerHandle {
                    tx,
                    task: tokio::spawn(worker.run(rx)),
                }
            });

        worker
            .tx
            .send(sample)
            .await
            .map_err(|_| EngineError::WorkerStopped(market_id))
    }

    pub async fn close_position(&self, event: CloseEvent) -> Result<ClosedPosition, EngineError> {
        self.core.close(event).await
    }

    pub async fn withdraw(&self, intent_id: IntentId) -> Result<TradeIntent, EngineError> {
        self.core.withdraw(intent_id).await
    }

    pub async fn confirm_settlement(&self, position_id: PositionId) -> Result<bool, EngineError> {
        self.core.confirm_settlement(position_id).await
    }

    /// Administrative risk reset
    pub async fn reset(&self, note: &str) -> Result<(), EngineError> {
        self.core.reset(note).await
    }

    pub async fn snapshot(&self) -> Result<CoreSnapshot, EngineError> {
        self.core.snapshot().await
    }

    /// Drain workers and in-flight orders, then hand back the core
    pub async fn shutdown(self) -> Result<TradingCore, EngineError> {
        let LiveEngine {
            core,
            core_task,
            retry_task,
            retry_stop,
            workers,
            dispatcher,
            ..
        } = self;

        let _ = retry_stop.send(());
        if let Err(e) = retry_task.await {
            tracing::warn!(error = %e, "Retry task failed");
        }

        for (market, worker) in workers {
            drop(worker.tx);
            if let Err(e) = worker.task.await {
                tracing::warn!(market = %market, error = %e, "Market worker failed");
            }
        }

        drop(dispatcher);
        drop(core);
        core_task.await.map_err(|_| EngineError::CoreUnavailable)
    }
}

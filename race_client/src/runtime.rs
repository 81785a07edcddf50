//! Drives a [`RoundMachine`] against a [`RoundService`].
//!
//! A single task owns the machine. Everything that can change round state is
//! turned into an [`Input`] on one channel; the resulting [`Effect`]s become
//! spawned RPC calls and one-shot timers, and a fresh [`RoundState`] is
//! published after every input.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use race_core::{Effect, EngineConfig, Input, RoundMachine, RoundState, TimerCommand, TimerKind};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::service::RoundService;

/// Wall-clock milliseconds, advanced by the tokio clock so paused-time tests
/// stay deterministic.
#[derive(Debug, Clone, Copy)]
pub struct EngineClock {
    base_ms: u64,
    origin: Instant,
}

impl EngineClock {
    pub fn system() -> Self {
        let base_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as u64)
            .unwrap_or(0);
        Self::starting_at(base_ms)
    }

    pub fn starting_at(base_ms: u64) -> Self {
        Self {
            base_ms,
            origin: Instant::now(),
        }
    }

    pub fn now_ms(&self) -> u64 {
        self.base_ms + self.origin.elapsed().as_millis() as u64
    }
}

/// Aborts the sleeping task when dropped or replaced.
struct TimerHandle(JoinHandle<()>);

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.0.abort();
    }
}

pub struct EngineHandle {
    inputs: UnboundedSender<Input>,
    state: watch::Receiver<Arc<RoundState>>,
    task: JoinHandle<()>,
}

impl EngineHandle {
    pub fn inputs(&self) -> UnboundedSender<Input> {
        self.inputs.clone()
    }

    pub fn state(&self) -> watch::Receiver<Arc<RoundState>> {
        self.state.clone()
    }

    /// Returns false once the engine has stopped.
    pub fn send(&self, input: Input) -> bool {
        self.inputs.send(input).is_ok()
    }

    pub fn shutdown(self) {
        self.task.abort();
    }
}

/// Spawn the engine task on the current tokio runtime.
pub fn spawn_engine<S: RoundService>(
    config: Arc<EngineConfig>,
    service: Arc<S>,
    clock: EngineClock,
) -> EngineHandle {
    let (inputs, receiver) = unbounded_channel();
    let (state_tx, state) = watch::channel(Arc::new(RoundState::default()));
    let engine = Engine {
        machine: RoundMachine::new(config),
        service,
        clock,
        inputs: inputs.clone(),
        timers: BTreeMap::new(),
        state_tx,
    };
    let task = tokio::spawn(engine.run(receiver));
    EngineHandle {
        inputs,
        state,
        task,
    }
}

struct Engine<S> {
    machine: RoundMachine,
    service: Arc<S>,
    clock: EngineClock,
    inputs: UnboundedSender<Input>,
    timers: BTreeMap<TimerKind, TimerHandle>,
    state_tx: watch::Sender<Arc<RoundState>>,
}

impl<S: RoundService> Engine<S> {
    async fn run(mut self, mut receiver: UnboundedReceiver<Input>) {
        let effects = self.machine.start();
        self.apply(effects);
        self.publish();

        while let Some(input) = receiver.recv().await {
            let effects = self.machine.handle(input, self.clock.now_ms());
            self.apply(effects);
            self.publish();
        }
        debug!(target: "race::transport", "engine.stopped");
    }

    fn publish(&self) {
        self.state_tx
            .send_replace(Arc::new(self.machine.state().clone()));
    }

    fn apply(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            trace!(target: "race::transport", ?effect, "effect.apply");
            match effect {
                Effect::FetchActiveRound(ticket) => {
                    let service = Arc::clone(&self.service);
                    let inputs = self.inputs.clone();
                    tokio::spawn(async move {
                        let result = service.active_round().await.map_err(|err| err.to_string());
                        let _ = inputs.send(Input::ActiveRoundLoaded { ticket, result });
                    });
                }
                Effect::FetchMyWagers { round_id, ticket } => {
                    let service = Arc::clone(&self.service);
                    let inputs = self.inputs.clone();
                    tokio::spawn(async move {
                        let result = service
                            .my_wagers(round_id)
                            .await
                            .map_err(|err| err.to_string());
                        let _ = inputs.send(Input::MyWagersLoaded {
                            ticket,
                            round_id,
                            result,
                        });
                    });
                }
                Effect::SubmitWager(request) => {
                    let service = Arc::clone(&self.service);
                    let inputs = self.inputs.clone();
                    tokio::spawn(async move {
                        let result = service.wager(request).await.map_err(|err| err.to_string());
                        let _ = inputs.send(Input::WagerCompleted { request, result });
                    });
                }
                Effect::Timer(TimerCommand::Arm { token, after }) => {
                    let inputs = self.inputs.clone();
                    let handle = tokio::spawn(async move {
                        tokio::time::sleep(after).await;
                        let _ = inputs.send(Input::TimerFired(token));
                    });
                    self.timers.insert(token.kind, TimerHandle(handle));
                }
                Effect::Timer(TimerCommand::Cancel(kind)) => {
                    self.timers.remove(&kind);
                }
            }
        }
    }
}


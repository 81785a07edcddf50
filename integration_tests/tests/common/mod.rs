#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, Once};

use race_client::{RoundService, TransportError};
use race_core::{
    Effect, EngineConfig, FetchTicket, Input, RoundMachine, TimerCommand, TimerKind, TimerToken,
    WagerRequest, ENGINE_CONFIG_ENV,
};
use race_proto::{
    decode_active_round_json, decode_event_json, ActiveRound, CarId, Lane, LaneAssignment,
    PushEvent, Round, RoundId, RoundStatus, Terrain, Wager, WagerAck, WagerAction, WagerCounts,
    WagerRejection,
};

pub const T0: u64 = 1_000_000;

static INIT: Once = Once::new();

pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

pub fn ensure_test_config() {
    INIT.call_once(|| {
        let config_path = fixture_path("test_engine_config.json");

        debug_assert!(
            config_path.exists(),
            "missing test engine config at {}",
            config_path.display()
        );

        std::env::set_var(ENGINE_CONFIG_ENV, &config_path);
    });
}

/// The three-car round from `fixtures/round_started.json`, closing at `T0 + 15s`.
pub fn fixture_round() -> Round {
    let text = std::fs::read_to_string(fixture_path("round_started.json"))
        .expect("round fixture readable");
    match decode_event_json(&text).expect("round fixture parses") {
        PushEvent::RoundStarted { round } => round,
        other => panic!("fixture holds {} instead of round.started", other.name()),
    }
}

/// The same round mid-race, as `activeRound` reports it after a reconnect.
pub fn fixture_active_round() -> ActiveRound {
    let text = std::fs::read_to_string(fixture_path("active_round.json"))
        .expect("active round fixture readable");
    decode_active_round_json(&text).expect("active round fixture parses")
}

pub fn round(id: u64, status: RoundStatus, close_ms: u64) -> Round {
    Round {
        id: RoundId(id),
        number: id,
        status,
        predictions_close_ms: close_ms,
        cars: Vec::new(),
        assignments: (1..=3)
            .map(|n| LaneAssignment {
                car_id: CarId(n),
                lane: n as u8,
            })
            .collect(),
        lanes: (1..=3)
            .map(|n| Lane {
                number: n,
                segments: vec![Terrain::Regular, Terrain::TerrainA, Terrain::TerrainB],
            })
            .collect(),
        total_pot: 0,
        winner: None,
    }
}

pub fn with_status(mut round: Round, status: RoundStatus) -> Round {
    round.status = status;
    round
}

pub fn loaded(round: Round) -> Result<Option<ActiveRound>, String> {
    Ok(Some(ActiveRound {
        round,
        wager_counts: WagerCounts::new(),
    }))
}

/// Drives a [`RoundMachine`] by hand, remembering the latest token per timer
/// kind and the latest ticket per fetch.
pub struct Driver {
    pub machine: RoundMachine,
    pub effects: Vec<Effect>,
    pending: BTreeMap<TimerKind, TimerToken>,
    round_ticket: Option<FetchTicket>,
    wagers_ticket: Option<FetchTicket>,
}

impl Driver {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let mut machine = RoundMachine::new(Arc::new(config));
        let effects = machine.start();
        let mut driver = Self {
            machine,
            effects: Vec::new(),
            pending: BTreeMap::new(),
            round_ticket: None,
            wagers_ticket: None,
        };
        driver.record(effects);
        driver
    }

    pub fn feed(&mut self, input: Input, now_ms: u64) -> &[Effect] {
        let effects = self.machine.handle(input, now_ms);
        self.record(effects);
        &self.effects
    }

    fn record(&mut self, effects: Vec<Effect>) {
        for effect in &effects {
            match effect {
                Effect::Timer(TimerCommand::Arm { token, .. }) => {
                    self.pending.insert(token.kind, *token);
                }
                Effect::Timer(TimerCommand::Cancel(kind)) => {
                    self.pending.remove(kind);
                }
                Effect::FetchActiveRound(ticket) => self.round_ticket = Some(*ticket),
                Effect::FetchMyWagers { ticket, .. } => self.wagers_ticket = Some(*ticket),
                Effect::SubmitWager(_) => {}
            }
        }
        self.effects = effects;
    }

    /// Answer the latest active-round fetch.
    pub fn load(&mut self, result: Result<Option<ActiveRound>, String>, now_ms: u64) -> &[Effect] {
        let ticket = self.round_ticket.expect("no active-round fetch issued");
        self.feed(Input::ActiveRoundLoaded { ticket, result }, now_ms)
    }

    /// Answer the latest wager fetch.
    pub fn load_wagers(
        &mut self,
        round_id: RoundId,
        wagers: Vec<Wager>,
        now_ms: u64,
    ) -> &[Effect] {
        let ticket = self.wagers_ticket.expect("no wager fetch issued");
        self.feed(
            Input::MyWagersLoaded {
                ticket,
                round_id,
                result: Ok(wagers),
            },
            now_ms,
        )
    }

    pub fn push(&mut self, event: PushEvent, now_ms: u64) -> &[Effect] {
        self.feed(Input::Push(event), now_ms)
    }

    pub fn fire(&mut self, kind: TimerKind, now_ms: u64) -> &[Effect] {
        let token = self
            .pending
            .remove(&kind)
            .unwrap_or_else(|| panic!("{kind:?} is not armed"));
        self.feed(Input::TimerFired(token), now_ms)
    }

    pub fn is_pending(&self, kind: TimerKind) -> bool {
        self.pending.contains_key(&kind)
    }

    pub fn fetched_round(&self) -> bool {
        self.effects.iter().any(Effect::is_round_fetch)
    }

    pub fn fetched_wagers(&self, round_id: RoundId) -> bool {
        self.effects
            .iter()
            .any(|effect| effect.wager_fetch_for() == Some(round_id))
    }

    pub fn submitted(&self) -> Option<WagerRequest> {
        self.effects.iter().find_map(|effect| match effect {
            Effect::SubmitWager(request) => Some(*request),
            _ => None,
        })
    }
}

#[derive(Default)]
struct ServiceState {
    active: Option<ActiveRound>,
    wagers: Vec<Wager>,
    requests: Vec<WagerRequest>,
    failures: u32,
    next_wager_id: u64,
}

/// A server stand-in that applies wagers to its own round state.
#[derive(Default)]
pub struct InMemoryService {
    inner: Mutex<ServiceState>,
}

impl InMemoryService {
    pub fn set_active(&self, round: Option<Round>) {
        let mut inner = self.inner.lock().unwrap();
        inner.active = round.map(|round| ActiveRound {
            round,
            wager_counts: WagerCounts::new(),
        });
    }

    /// Fail the next `count` active-round calls.
    pub fn fail_next(&self, count: u32) {
        self.inner.lock().unwrap().failures = count;
    }

    /// Settle every wager on the round: `payout` for the winner, nothing otherwise.
    pub fn settle(&self, round_id: RoundId, winner: CarId, payout: u64) {
        let mut inner = self.inner.lock().unwrap();
        for wager in inner.wagers.iter_mut().filter(|w| w.round_id == round_id) {
            wager.payout = Some(if wager.car_id == winner { payout } else { 0 });
        }
    }

    pub fn requests(&self) -> Vec<WagerRequest> {
        self.inner.lock().unwrap().requests.clone()
    }

    pub fn counts(&self) -> WagerCounts {
        self.inner
            .lock()
            .unwrap()
            .active
            .as_ref()
            .map(|active| active.wager_counts.clone())
            .unwrap_or_default()
    }
}

impl RoundService for InMemoryService {
    async fn active_round(&self) -> Result<Option<ActiveRound>, TransportError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.failures > 0 {
            inner.failures -= 1;
            return Err(TransportError::Server("unavailable".into()));
        }
        Ok(inner.active.clone())
    }

    async fn my_wagers(&self, round_id: RoundId) -> Result<Vec<Wager>, TransportError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .wagers
            .iter()
            .filter(|wager| wager.round_id == round_id)
            .cloned()
            .collect())
    }

    async fn wager(&self, request: WagerRequest) -> Result<WagerAck, TransportError> {
        let mut inner = self.inner.lock().unwrap();
        inner.requests.push(request);
        let open = inner.active.as_ref().is_some_and(|active| {
            active.round.id == request.round_id && active.round.status == RoundStatus::Predictions
        });
        if !open {
            return Ok(WagerAck::Rejected(WagerRejection::PhaseClosed));
        }
        match request.action {
            WagerAction::Add => {
                let held = inner
                    .wagers
                    .iter()
                    .find(|wager| wager.round_id == request.round_id)
                    .map(|wager| wager.car_id);
                if let Some(held) = held.filter(|held| *held != request.car_id) {
                    return Ok(WagerAck::Rejected(WagerRejection::MultiCarConflict { held }));
                }
                inner.next_wager_id += 1;
                let id = inner.next_wager_id;
                inner.wagers.push(Wager {
                    id,
                    round_id: request.round_id,
                    car_id: request.car_id,
                    amount: 100,
                    payout: None,
                });
                if let Some(active) = inner.active.as_mut() {
                    *active.wager_counts.entry(request.car_id).or_default() += 1;
                }
            }
            WagerAction::Remove => {
                let position = inner.wagers.iter().position(|wager| {
                    wager.round_id == request.round_id && wager.car_id == request.car_id
                });
                let Some(position) = position else {
                    return Ok(WagerAck::Rejected(WagerRejection::NoWagerOnCar));
                };
                inner.wagers.remove(position);
                if let Some(count) = inner
                    .active
                    .as_mut()
                    .and_then(|active| active.wager_counts.get_mut(&request.car_id))
                {
                    *count = count.saturating_sub(1);
                }
            }
        }
        Ok(WagerAck::Accepted)
    }
}

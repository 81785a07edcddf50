//! Round lifecycle controller.
//!
//! Every inbound event (push, RPC completion, timer firing, player command)
//! goes through [`RoundMachine::handle`], which mutates the single
//! [`RoundState`] and returns the side effects the runtime must perform.
//! Within one round the phase only moves forward:
//! `Predictions -> Locked -> Racing -> Reveal0 -> Reveal1`, then `Waiting`
//! until the next round is adopted.

use std::sync::Arc;
use std::time::Duration;

use race_proto::{
    ActiveRound, CarId, ProgressSnapshot, PushEvent, RevealTiming, Round, RoundId, RoundResults,
    RoundStatus, Wager, WagerAck, WagerAction, WagerCounts,
};
use tracing::{debug, info, trace, warn};

use crate::config::EngineConfig;
use crate::error::{ClientError, Disposition};
use crate::pool::{PayoutEstimate, PoolSummary, Settlement};
use crate::progress::{CarView, ProgressMapper};
use crate::protocol::{PredictionProtocol, WagerRequest};
use crate::resync::{check_round, reconcile, Reconcile, ResyncPolicy};
use crate::timers::{TimerCommand, TimerKind, TimerSet, TimerToken};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Phase {
    #[default]
    Waiting,
    Predictions,
    Locked,
    Racing,
    /// Player's own wager summary.
    Reveal0,
    /// Winner and net result.
    Reveal1,
}

impl Phase {
    pub fn rank(self) -> u8 {
        match self {
            Phase::Waiting => 0,
            Phase::Predictions => 1,
            Phase::Locked => 2,
            Phase::Racing => 3,
            Phase::Reveal0 => 4,
            Phase::Reveal1 => 5,
        }
    }

    pub fn from_status(status: RoundStatus) -> Self {
        match status {
            RoundStatus::Predictions => Phase::Predictions,
            RoundStatus::Locked => Phase::Locked,
            RoundStatus::Racing => Phase::Racing,
            RoundStatus::Finished => Phase::Reveal0,
        }
    }

    /// Fog of war applies only while wagers can still be placed.
    pub fn conceals_terrain(self) -> bool {
        self == Phase::Predictions
    }

    pub fn is_reveal(self) -> bool {
        matches!(self, Phase::Reveal0 | Phase::Reveal1)
    }

    pub fn label(self) -> &'static str {
        match self {
            Phase::Waiting => "waiting",
            Phase::Predictions => "predictions",
            Phase::Locked => "locked",
            Phase::Racing => "racing",
            Phase::Reveal0 => "reveal.summary",
            Phase::Reveal1 => "reveal.winner",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    Push(PushEvent),
    ActiveRoundLoaded {
        ticket: FetchTicket,
        result: Result<Option<ActiveRound>, String>,
    },
    MyWagersLoaded {
        ticket: FetchTicket,
        round_id: RoundId,
        result: Result<Vec<Wager>, String>,
    },
    WagerCompleted {
        request: WagerRequest,
        result: Result<WagerAck, String>,
    },
    TimerFired(TimerToken),
    PlaceWager(CarId),
    RemoveWager(CarId),
    /// The push channel (re)connected; events may have been missed.
    ChannelReconnected,
    ForceResync,
}

/// Stamp carried by a fetch and echoed by its reply. Tickets only grow, so a
/// reply can be ordered against everything the machine has seen since.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FetchTicket(pub u64);

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    FetchActiveRound(FetchTicket),
    FetchMyWagers {
        round_id: RoundId,
        ticket: FetchTicket,
    },
    SubmitWager(WagerRequest),
    Timer(TimerCommand),
}

impl Effect {
    pub fn is_round_fetch(&self) -> bool {
        matches!(self, Effect::FetchActiveRound(_))
    }

    pub fn wager_fetch_for(&self) -> Option<RoundId> {
        match self {
            Effect::FetchMyWagers { round_id, .. } => Some(*round_id),
            _ => None,
        }
    }
}

/// The one piece of shared round state. Only [`RoundMachine`] writes it.
#[derive(Debug, Clone, Default)]
pub struct RoundState {
    pub phase: Phase,
    pub round: Option<Round>,
    /// Seconds left for predictions, as estimated locally.
    pub countdown_secs: u32,
    pub locked_countdown_secs: u32,
    pub counts: WagerCounts,
    pub progress: Option<ProgressSnapshot>,
    pub wagers: PredictionProtocol,
    pub results: Option<RoundResults>,
    pub reveal: RevealTiming,
    /// Transient connectivity banner, cleared by the next successful load.
    pub banner: Option<String>,
    /// Last message for the player about a rejected action.
    pub notice: Option<String>,
    pub last_revealed: Option<RoundId>,
    pub queued_round: Option<Round>,
}

impl RoundState {
    pub fn round_id(&self) -> Option<RoundId> {
        self.round.as_ref().map(|round| round.id)
    }

    pub fn pool(&self, config: &EngineConfig) -> PoolSummary {
        PoolSummary::from_counts(&self.counts, config)
    }

    /// Payout preview, only offered while predictions are open.
    pub fn estimate(&self, config: &EngineConfig) -> Option<PayoutEstimate> {
        if self.phase != Phase::Predictions {
            return None;
        }
        self.pool(config).estimated_payout(self.wagers.count())
    }

    pub fn winner(&self) -> Option<CarId> {
        self.results
            .as_ref()
            .map(|results| results.winner)
            .or_else(|| self.round.as_ref().and_then(|round| round.winner))
    }

    pub fn settlement(&self) -> Option<Settlement> {
        self.results
            .as_ref()
            .map(|results| Settlement::from_wagers(&results.settled))
    }

    pub fn can_wager(&self) -> bool {
        self.phase == Phase::Predictions && self.countdown_secs > 0
    }

    pub fn car_views(&self, mapper: &ProgressMapper) -> Vec<CarView> {
        match &self.round {
            Some(round) => mapper.map_round(round, self.progress.as_ref(), self.phase),
            None => Vec::new(),
        }
    }
}

pub struct RoundMachine {
    config: Arc<EngineConfig>,
    policy: ResyncPolicy,
    state: RoundState,
    timers: TimerSet,
    effects: Vec<Effect>,
    recheck_attempts: u32,
    wagers_retry: Option<RoundId>,
    next_ticket: u64,
    /// Round replies for fetches issued before the last phase change are stale.
    round_floor: u64,
    round_applied: Option<FetchTicket>,
    /// Wager replies for fetches issued before the wager list was last reset are stale.
    wagers_floor: u64,
    wagers_applied: Option<FetchTicket>,
}

impl RoundMachine {
    pub fn new(config: Arc<EngineConfig>) -> Self {
        let policy = ResyncPolicy::from_config(&config);
        let state = RoundState {
            reveal: config.reveal.timing(),
            ..RoundState::default()
        };
        Self {
            config,
            policy,
            state,
            timers: TimerSet::default(),
            effects: Vec::new(),
            recheck_attempts: 0,
            wagers_retry: None,
            next_ticket: 0,
            round_floor: 0,
            round_applied: None,
            wagers_floor: 0,
            wagers_applied: None,
        }
    }

    pub fn config(&self) -> &Arc<EngineConfig> {
        &self.config
    }

    pub fn state(&self) -> &RoundState {
        &self.state
    }

    pub fn timers(&self) -> &TimerSet {
        &self.timers
    }

    /// Effects to run when the client boots.
    pub fn start(&mut self) -> Vec<Effect> {
        self.fetch_round();
        std::mem::take(&mut self.effects)
    }

    pub fn handle(&mut self, input: Input, now_ms: u64) -> Vec<Effect> {
        match input {
            Input::Push(event) => self.on_push(event, now_ms),
            Input::ActiveRoundLoaded { ticket, result } => {
                self.on_active_round(ticket, result, now_ms)
            }
            Input::MyWagersLoaded {
                ticket,
                round_id,
                result,
            } => self.on_my_wagers(ticket, round_id, result),
            Input::WagerCompleted { request, result } => self.on_wager_completed(request, result),
            Input::TimerFired(token) => self.on_timer(token, now_ms),
            Input::PlaceWager(car) => self.on_wager_command(car, WagerAction::Add),
            Input::RemoveWager(car) => self.on_wager_command(car, WagerAction::Remove),
            Input::ChannelReconnected | Input::ForceResync => {
                debug!(target: "race::resync", phase = self.state.phase.label(), "resync.requested");
                self.fetch_round();
            }
        }
        std::mem::take(&mut self.effects)
    }

    // --- push events -------------------------------------------------------

    fn on_push(&mut self, event: PushEvent, now_ms: u64) {
        trace!(target: "race::phase", event = event.name(), round = %event.round_id(), "push.received");
        match event {
            PushEvent::RoundStarted { round } => self.on_round_started(round, now_ms),
            PushEvent::PredictionsLocked {
                round_id,
                final_counts,
            } => {
                if !self.accept_round(round_id) {
                    return;
                }
                if self.state.phase.rank() < Phase::Locked.rank() {
                    self.state.counts = final_counts;
                    self.enter_locked();
                } else if self.state.phase == Phase::Locked {
                    self.state.counts = final_counts;
                }
            }
            PushEvent::RaceStarted { round_id, lanes } => {
                if !self.accept_round(round_id) {
                    return;
                }
                if self.state.phase.rank() <= Phase::Racing.rank() {
                    if let Some(round) = self.state.round.as_mut() {
                        if !lanes.is_empty() {
                            round.lanes = lanes;
                        }
                    }
                    if self.state.phase != Phase::Racing {
                        self.enter_racing();
                    }
                }
            }
            PushEvent::RaceProgress(snapshot) => {
                if !self.accept_round(snapshot.round_id) {
                    return;
                }
                match self.state.phase {
                    Phase::Predictions | Phase::Locked => {
                        // race.started never arrived; progress proves the race is on.
                        self.enter_racing();
                    }
                    Phase::Racing => {}
                    _ => return,
                }
                self.state.progress = Some(snapshot);
                let after = self.policy.race_stall();
                self.arm(TimerKind::RaceStall, after);
            }
            PushEvent::RoundFinished {
                round,
                results,
                reveal,
            } => {
                if self.state.round_id() != Some(round.id) {
                    debug!(
                        target: "race::phase",
                        round = %round.id,
                        tracked = ?self.state.round_id(),
                        "round_finished.untracked"
                    );
                    return;
                }
                if self.state.phase.rank() < Phase::Reveal0.rank() {
                    let round_id = round.id;
                    let settled = !results.settled.is_empty();
                    self.enter_reveal(round, Some(results), reveal);
                    // The broadcast does not know who we are; ask for our own settled wagers.
                    if !settled {
                        self.fetch_wagers(round_id);
                    }
                }
            }
            PushEvent::WagerCountsUpdated { round_id, counts } => {
                if !self.accept_round(round_id) {
                    return;
                }
                if matches!(self.state.phase, Phase::Predictions | Phase::Locked) {
                    self.state.counts = counts;
                }
            }
        }
    }

    fn on_round_started(&mut self, round: Round, now_ms: u64) {
        if self.state.phase.is_reveal() {
            debug!(target: "race::phase", round = %round.id, "round_started.queued");
            self.state.queued_round = Some(round);
            return;
        }
        let decision = reconcile(self.tracked(), self.state.last_revealed, &round);
        match decision {
            Reconcile::NewRound => self.adopt_new(round, WagerCounts::new(), now_ms),
            Reconcile::Advance => self.advance_to(round, now_ms),
            Reconcile::Refresh => self.refresh(round, None, now_ms),
            Reconcile::Regress | Reconcile::NothingLive => {
                debug!(target: "race::phase", round = %round.id, ?decision, "round_started.ignored");
            }
        }
    }

    /// Gate for round-scoped events. Stale rounds are dropped silently; an
    /// event while nothing is tracked means we missed the round start.
    fn accept_round(&mut self, received: RoundId) -> bool {
        match check_round(self.state.round_id(), received) {
            Ok(()) => true,
            Err(ClientError::MissingRound) => {
                if self.state.phase == Phase::Waiting {
                    debug!(target: "race::resync", round = %received, "event_without_round.refetch");
                    self.fetch_round();
                }
                false
            }
            Err(err) => {
                trace!(target: "race::resync", error = %err, "snapshot.stale_dropped");
                self.notify(err);
                false
            }
        }
    }

    // --- loads -------------------------------------------------------------

    fn on_active_round(
        &mut self,
        ticket: FetchTicket,
        result: Result<Option<ActiveRound>, String>,
        now_ms: u64,
    ) {
        let stale =
            ticket.0 < self.round_floor || self.round_applied.is_some_and(|seen| ticket <= seen);
        if stale {
            trace!(target: "race::resync", ticket = ticket.0, "active_round.stale_reply");
            return;
        }
        let loaded = match result {
            Ok(loaded) => loaded,
            Err(message) => {
                warn!(target: "race::resync", error = %message, "active_round.load_failed");
                self.notify(ClientError::NetworkFailure(message));
                if !self.state.phase.is_reveal() {
                    let after = self.policy.retry_backoff();
                    self.arm(TimerKind::RetryLoad, after);
                }
                return;
            }
        };
        self.round_applied = Some(ticket);
        self.state.banner = None;

        if self.state.phase.is_reveal() {
            trace!(target: "race::resync", "active_round.ignored_during_reveal");
            return;
        }

        let Some(active) = loaded else {
            self.enter_waiting();
            return;
        };

        let decision = reconcile(self.tracked(), self.state.last_revealed, &active.round);
        match decision {
            Reconcile::NewRound => self.adopt_new(active.round, active.wager_counts, now_ms),
            Reconcile::Advance => {
                if Phase::from_status(active.round.status).rank() <= Phase::Locked.rank() {
                    self.state.counts = active.wager_counts;
                }
                self.advance_to(active.round, now_ms);
            }
            Reconcile::Refresh => self.refresh(active.round, Some(active.wager_counts), now_ms),
            Reconcile::Regress => {
                debug!(
                    target: "race::resync",
                    round = %active.round.id,
                    phase = self.state.phase.label(),
                    "active_round.behind_local_state"
                );
            }
            Reconcile::NothingLive => {
                if self.state.phase == Phase::Waiting {
                    self.enter_waiting();
                }
            }
        }
    }

    fn on_my_wagers(
        &mut self,
        ticket: FetchTicket,
        round_id: RoundId,
        result: Result<Vec<Wager>, String>,
    ) {
        let stale = ticket.0 < self.wagers_floor
            || self.wagers_applied.is_some_and(|seen| ticket <= seen);
        if stale {
            trace!(
                target: "race::wager",
                round = %round_id,
                ticket = ticket.0,
                "my_wagers.stale_reply"
            );
            return;
        }
        let wagers = match result {
            Ok(wagers) => wagers,
            Err(message) => {
                warn!(target: "race::resync", round = %round_id, error = %message, "my_wagers.load_failed");
                self.notify(ClientError::NetworkFailure(message));
                if self.state.round_id() == Some(round_id) {
                    self.wagers_retry = Some(round_id);
                    let after = self.policy.retry_backoff();
                    self.arm(TimerKind::RetryWagers, after);
                }
                return;
            }
        };
        self.wagers_applied = Some(ticket);
        self.state.banner = None;

        if self.state.phase.is_reveal() {
            if self.state.round_id() == Some(round_id) {
                if let Some(results) = self.state.results.as_mut() {
                    if results.settled.is_empty() {
                        results.settled = wagers;
                    }
                }
            }
            return;
        }

        if !self.state.wagers.replace(round_id, wagers) {
            trace!(target: "race::wager", round = %round_id, "my_wagers.stale_dropped");
        }
    }

    fn on_wager_completed(&mut self, request: WagerRequest, result: Result<WagerAck, String>) {
        let accepted = matches!(result, Ok(WagerAck::Accepted));
        let (tracked, error) = self.state.wagers.acknowledge(request, result);
        info!(
            target: "race::wager",
            round = %request.round_id,
            car = %request.car_id,
            action = %request.action,
            accepted,
            "wager.completed"
        );
        if let Some(err) = error {
            self.notify(err);
        } else {
            self.state.notice = None;
        }
        if tracked && self.state.round_id() == Some(request.round_id) {
            self.fetch_wagers(request.round_id);
            self.fetch_round();
        }
    }

    fn on_wager_command(&mut self, car: CarId, action: WagerAction) {
        let result = self.state.wagers.request(
            self.state.phase,
            self.state.countdown_secs,
            self.state.round.as_ref(),
            car,
            action,
        );
        match result {
            Ok(request) => {
                self.state.notice = None;
                self.effects.push(Effect::SubmitWager(request));
            }
            Err(err) => {
                debug!(target: "race::wager", car = %car, %action, error = %err, "wager.rejected_locally");
                self.notify(err);
            }
        }
    }

    // --- timers ------------------------------------------------------------

    fn on_timer(&mut self, token: TimerToken, now_ms: u64) {
        if !self.timers.accept(token) {
            trace!(target: "race::phase", kind = ?token.kind, "timer.stale");
            return;
        }
        match token.kind {
            TimerKind::CountdownTick => {
                if self.state.phase != Phase::Predictions {
                    return;
                }
                self.state.countdown_secs = self.state.countdown_secs.saturating_sub(1);
                if self.state.countdown_secs > 0 {
                    self.arm(TimerKind::CountdownTick, Duration::from_secs(1));
                } else {
                    info!(target: "race::resync", round = ?self.state.round_id(), "countdown.expired_without_lock");
                    self.arm_recheck();
                }
            }
            TimerKind::CountdownRecheck => {
                self.recheck_attempts += 1;
                self.fetch_round();
            }
            TimerKind::CountsPoll => {
                if self.state.phase == Phase::Predictions {
                    self.fetch_round();
                    let after = self.policy.counts_poll();
                    self.arm(TimerKind::CountsPoll, after);
                }
            }
            TimerKind::LockedTick => {
                if self.state.phase != Phase::Locked {
                    return;
                }
                self.state.locked_countdown_secs = self.state.locked_countdown_secs.saturating_sub(1);
                if self.state.locked_countdown_secs > 0 {
                    self.arm(TimerKind::LockedTick, Duration::from_secs(1));
                } else {
                    debug!(target: "race::phase", "locked_countdown.elapsed_assume_racing");
                    self.enter_racing();
                }
            }
            TimerKind::RaceStall => {
                if self.state.phase == Phase::Racing {
                    info!(target: "race::resync", round = ?self.state.round_id(), "race.stalled_refetch");
                    self.fetch_round();
                    let after = self.policy.race_stall();
                    self.arm(TimerKind::RaceStall, after);
                }
            }
            TimerKind::RevealAdvance => match self.state.phase {
                Phase::Reveal0 => {
                    self.transition(Phase::Reveal1);
                    let after = Duration::from_millis(self.state.reveal.winner_ms);
                    self.arm(TimerKind::RevealAdvance, after);
                }
                Phase::Reveal1 => self.finish_reveal(now_ms),
                _ => {}
            },
            TimerKind::IdlePoll | TimerKind::RetryLoad => {
                self.fetch_round();
            }
            TimerKind::RetryWagers => {
                if let Some(round_id) = self.wagers_retry.take() {
                    if self.state.round_id() == Some(round_id) {
                        self.fetch_wagers(round_id);
                    }
                }
            }
        }
    }

    // --- transitions -------------------------------------------------------

    fn tracked(&self) -> Option<(&Round, Phase)> {
        self.state.round.as_ref().map(|round| (round, self.state.phase))
    }

    /// Every phase change cancels all pending timers; the new phase arms its own.
    fn transition(&mut self, next: Phase) {
        let previous = self.state.phase;
        for command in self.timers.cancel_all() {
            self.effects.push(Effect::Timer(command));
        }
        self.state.phase = next;
        self.round_floor = self.next_ticket;
        info!(
            target: "race::phase",
            round = ?self.state.round_id(),
            from = previous.label(),
            to = next.label(),
            "phase.enter"
        );
    }

    fn issue_ticket(&mut self) -> FetchTicket {
        let ticket = FetchTicket(self.next_ticket);
        self.next_ticket += 1;
        ticket
    }

    fn fetch_round(&mut self) {
        let ticket = self.issue_ticket();
        self.effects.push(Effect::FetchActiveRound(ticket));
    }

    fn fetch_wagers(&mut self, round_id: RoundId) {
        let ticket = self.issue_ticket();
        self.effects.push(Effect::FetchMyWagers { round_id, ticket });
    }

    /// Local wager list restarts; in-flight wager fetches describe the old list.
    fn reset_wagers(&mut self, round_id: Option<RoundId>) {
        self.state.wagers.reset(round_id);
        self.wagers_floor = self.next_ticket;
    }

    fn arm(&mut self, kind: TimerKind, after: Duration) {
        let command = self.timers.arm(kind, after);
        self.effects.push(Effect::Timer(command));
    }

    fn arm_recheck(&mut self) {
        let after = self.policy.countdown_recheck(self.recheck_attempts);
        self.arm(TimerKind::CountdownRecheck, after);
    }

    fn remaining_secs(&self, now_ms: u64) -> u32 {
        let close = self
            .state
            .round
            .as_ref()
            .map(|round| round.predictions_close_ms)
            .unwrap_or(0);
        let remaining_ms = close.saturating_sub(now_ms);
        remaining_ms.div_ceil(1_000).min(u64::from(u32::MAX)) as u32
    }

    fn adopt_new(&mut self, round: Round, counts: WagerCounts, now_ms: u64) {
        let round_id = round.id;
        let phase = Phase::from_status(round.status);
        self.reset_wagers(Some(round_id));
        self.state.progress = None;
        self.state.results = None;
        self.state.counts = counts;
        self.state.countdown_secs = 0;
        self.state.locked_countdown_secs = 0;
        self.state.reveal = self.config.reveal.timing();
        self.state.round = Some(round);
        self.recheck_attempts = 0;
        self.wagers_retry = None;
        info!(target: "race::phase", round = %round_id, status = phase.label(), "round.adopted");

        match phase {
            Phase::Locked => self.enter_locked(),
            Phase::Racing => self.enter_racing(),
            _ => self.enter_predictions(now_ms),
        }
        self.fetch_wagers(round_id);
    }

    /// Same round, server already further along.
    fn advance_to(&mut self, round: Round, now_ms: u64) {
        match Phase::from_status(round.status) {
            Phase::Locked => {
                self.absorb_details(round);
                self.enter_locked();
            }
            Phase::Racing => {
                self.absorb_details(round);
                self.enter_racing();
            }
            Phase::Reveal0 => {
                let round_id = round.id;
                let results = round.winner.map(|winner| RoundResults {
                    winner,
                    settled: Vec::new(),
                });
                let reveal = self.config.reveal.timing();
                self.enter_reveal(round, results, reveal);
                self.fetch_wagers(round_id);
            }
            _ => self.refresh(round, None, now_ms),
        }
    }

    /// Same round, same phase: take the server's latest details.
    fn refresh(&mut self, round: Round, counts: Option<WagerCounts>, now_ms: u64) {
        self.absorb_details(round);
        if let Some(counts) = counts {
            if matches!(self.state.phase, Phase::Predictions | Phase::Locked) {
                self.state.counts = counts;
            }
        }
        if self.state.phase == Phase::Predictions {
            self.state.countdown_secs = self.remaining_secs(now_ms);
            if self.state.countdown_secs > 0 {
                if !self.timers.is_armed(TimerKind::CountdownTick) {
                    self.arm(TimerKind::CountdownTick, Duration::from_secs(1));
                }
            } else if !self.timers.is_armed(TimerKind::CountdownRecheck) {
                self.arm_recheck();
            }
        }
    }

    fn absorb_details(&mut self, fresh: Round) {
        match self.state.round.as_mut() {
            Some(current) if current.id == fresh.id => {
                current.status = fresh.status;
                current.predictions_close_ms = fresh.predictions_close_ms;
                current.total_pot = fresh.total_pot;
                if !fresh.lanes.is_empty() {
                    current.lanes = fresh.lanes;
                }
                if !fresh.cars.is_empty() {
                    current.cars = fresh.cars;
                    current.assignments = fresh.assignments;
                }
                if fresh.winner.is_some() {
                    current.winner = fresh.winner;
                }
            }
            _ => self.state.round = Some(fresh),
        }
    }

    fn enter_waiting(&mut self) {
        if self.state.phase != Phase::Waiting {
            self.transition(Phase::Waiting);
            self.state.round = None;
            self.state.progress = None;
            self.state.results = None;
            self.state.counts.clear();
            self.state.countdown_secs = 0;
            self.state.locked_countdown_secs = 0;
            self.reset_wagers(None);
        }
        let after = self.policy.idle_poll();
        self.arm(TimerKind::IdlePoll, after);
    }

    fn enter_predictions(&mut self, now_ms: u64) {
        self.transition(Phase::Predictions);
        self.state.countdown_secs = self.remaining_secs(now_ms);
        if self.state.countdown_secs > 0 {
            self.arm(TimerKind::CountdownTick, Duration::from_secs(1));
        } else {
            self.arm_recheck();
        }
        let after = self.policy.counts_poll();
        self.arm(TimerKind::CountsPoll, after);
    }

    fn enter_locked(&mut self) {
        self.transition(Phase::Locked);
        self.state.countdown_secs = 0;
        self.state.locked_countdown_secs = self.config.locked_countdown_secs;
        if self.state.locked_countdown_secs > 0 {
            self.arm(TimerKind::LockedTick, Duration::from_secs(1));
        } else {
            self.enter_racing();
        }
    }

    fn enter_racing(&mut self) {
        self.transition(Phase::Racing);
        self.state.countdown_secs = 0;
        self.state.locked_countdown_secs = 0;
        let after = self.policy.race_stall();
        self.arm(TimerKind::RaceStall, after);
    }

    fn enter_reveal(&mut self, round: Round, results: Option<RoundResults>, reveal: RevealTiming) {
        let round_id = round.id;
        self.transition(Phase::Reveal0);
        self.absorb_details(round);
        self.state.results = results;
        self.state.reveal = reveal;
        self.state.last_revealed = Some(round_id);
        self.state.countdown_secs = 0;
        self.state.locked_countdown_secs = 0;
        // Wagers are settled: the live list no longer applies.
        self.reset_wagers(None);
        self.arm(
            TimerKind::RevealAdvance,
            Duration::from_millis(reveal.summary_ms),
        );
    }

    fn finish_reveal(&mut self, now_ms: u64) {
        self.transition(Phase::Waiting);
        self.state.round = None;
        self.state.progress = None;
        self.state.results = None;
        self.state.counts.clear();
        if let Some(next) = self.state.queued_round.take() {
            if next.status != RoundStatus::Finished && self.state.last_revealed != Some(next.id) {
                self.adopt_new(next, WagerCounts::new(), now_ms);
            }
        }
        // Confirms the queued round (or finds one) and brings counts up to date.
        self.fetch_round();
    }

    fn notify(&mut self, err: ClientError) {
        match err.disposition() {
            Disposition::NotifyUser => self.state.notice = Some(err.to_string()),
            Disposition::TransientBanner => self.state.banner = Some(err.to_string()),
            Disposition::Silent | Disposition::Repoll => {}
        }
    }
}

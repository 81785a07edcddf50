//! Wire contracts shared between the race server and its clients.
//!
//! Push events and RPC messages travel as length-prefixed bincode frames
//! (see [`frame`]); the JSON helpers exist for fixtures and debugging.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

pub mod frame;

pub use frame::{
    decode_frame, decode_payload, encode_frame, frame_len, FrameError, MAX_FRAME_LEN,
};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct RoundId(pub u64);

impl fmt::Display for RoundId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct CarId(pub u32);

impl fmt::Display for CarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Surface of one lane segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Terrain {
    #[default]
    Regular,
    /// Soft surface with a light cosmetic particle stream.
    TerrainA,
    /// Soft surface with a heavy particle stream.
    TerrainB,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SpeedRatings {
    pub regular: u8,
    pub terrain_a: u8,
    pub terrain_b: u8,
}

/// A racing participant. Immutable for the lifetime of a round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Car {
    pub id: CarId,
    pub name: String,
    pub image: String,
    pub image_alt: String,
    pub speed: SpeedRatings,
}

impl Car {
    pub fn speed_on(&self, terrain: Terrain) -> u8 {
        match terrain {
            Terrain::Regular => self.speed.regular,
            Terrain::TerrainA => self.speed.terrain_a,
            Terrain::TerrainB => self.speed.terrain_b,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaneAssignment {
    pub car_id: CarId,
    pub lane: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lane {
    pub number: u8,
    pub segments: Vec<Terrain>,
}

impl Lane {
    pub fn segment(&self, index: usize) -> Option<Terrain> {
        self.segments.get(index).copied()
    }
}

/// Server-side lifecycle status of a live round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoundStatus {
    Predictions,
    Locked,
    Racing,
    Finished,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Round {
    pub id: RoundId,
    pub number: u64,
    pub status: RoundStatus,
    /// Unix milliseconds at which wagering closes.
    pub predictions_close_ms: u64,
    pub cars: Vec<Car>,
    pub assignments: Vec<LaneAssignment>,
    pub lanes: Vec<Lane>,
    pub total_pot: u64,
    /// Only set once the round is finished.
    pub winner: Option<CarId>,
}

impl Round {
    pub fn car(&self, id: CarId) -> Option<&Car> {
        self.cars.iter().find(|car| car.id == id)
    }

    pub fn lane_for(&self, car_id: CarId) -> Option<&Lane> {
        let assignment = self.assignments.iter().find(|a| a.car_id == car_id)?;
        self.lanes
            .iter()
            .find(|lane| lane.number == assignment.lane)
    }

    pub fn has_car(&self, id: CarId) -> bool {
        self.assignments.iter().any(|a| a.car_id == id)
    }
}

/// Aggregate wager count per car across all players.
pub type WagerCounts = BTreeMap<CarId, u32>;

/// One fixed-size stake held by the current player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wager {
    pub id: u64,
    pub round_id: RoundId,
    pub car_id: CarId,
    pub amount: u64,
    /// Settled payout, present only after the round finishes.
    pub payout: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CarProgress {
    pub progress: f32,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub round_id: RoundId,
    pub positions: BTreeMap<CarId, CarProgress>,
}

impl ProgressSnapshot {
    pub fn progress_of(&self, car: CarId) -> Option<f32> {
        self.positions.get(&car).map(|p| p.progress)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevealTiming {
    pub summary_ms: u64,
    pub winner_ms: u64,
}

impl Default for RevealTiming {
    fn default() -> Self {
        Self {
            summary_ms: 3_000,
            winner_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundResults {
    pub winner: CarId,
    /// The current player's wagers with their settled payouts.
    pub settled: Vec<Wager>,
}

/// Events delivered over the push channel, each scoped to a round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PushEvent {
    RoundStarted {
        round: Round,
    },
    PredictionsLocked {
        round_id: RoundId,
        final_counts: WagerCounts,
    },
    RaceStarted {
        round_id: RoundId,
        lanes: Vec<Lane>,
    },
    RaceProgress(ProgressSnapshot),
    RoundFinished {
        round: Round,
        results: RoundResults,
        reveal: RevealTiming,
    },
    WagerCountsUpdated {
        round_id: RoundId,
        counts: WagerCounts,
    },
}

impl PushEvent {
    pub fn round_id(&self) -> RoundId {
        match self {
            PushEvent::RoundStarted { round } | PushEvent::RoundFinished { round, .. } => round.id,
            PushEvent::PredictionsLocked { round_id, .. }
            | PushEvent::RaceStarted { round_id, .. }
            | PushEvent::WagerCountsUpdated { round_id, .. } => *round_id,
            PushEvent::RaceProgress(snapshot) => snapshot.round_id,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PushEvent::RoundStarted { .. } => "round.started",
            PushEvent::PredictionsLocked { .. } => "predictions.locked",
            PushEvent::RaceStarted { .. } => "race.started",
            PushEvent::RaceProgress(_) => "race.progress",
            PushEvent::RoundFinished { .. } => "round.finished",
            PushEvent::WagerCountsUpdated { .. } => "wagerCounts.updated",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveRound {
    pub round: Round,
    pub wager_counts: WagerCounts,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WagerAction {
    Add,
    Remove,
}

impl fmt::Display for WagerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WagerAction::Add => write!(f, "add"),
            WagerAction::Remove => write!(f, "remove"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RpcRequest {
    ActiveRound,
    MyWagers {
        round_id: RoundId,
    },
    Wager {
        round_id: RoundId,
        car_id: CarId,
        action: WagerAction,
    },
}

/// Request plus the identity of the calling player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcEnvelope {
    pub player: String,
    pub request: RpcRequest,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WagerRejection {
    PhaseClosed,
    MultiCarConflict { held: CarId },
    NoWagerOnCar,
    RateLimited,
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WagerAck {
    Accepted,
    Rejected(WagerRejection),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RpcResponse {
    ActiveRound(Option<ActiveRound>),
    MyWagers(Vec<Wager>),
    Wager(WagerAck),
    Error { message: String },
}

pub fn encode_event_json(event: &PushEvent) -> serde_json::Result<String> {
    serde_json::to_string(event)
}

pub fn decode_event_json(data: &str) -> serde_json::Result<PushEvent> {
    serde_json::from_str(data)
}

pub fn decode_active_round_json(data: &str) -> serde_json::Result<ActiveRound> {
    serde_json::from_str(data)
}

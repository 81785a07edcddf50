//! Client-side round engine for the lane racing prediction game.
//!
//! Owns the round lifecycle ([`RoundMachine`]), wager validation, pool math
//! and the mapping from race progress onto lanes and terrain. Nothing here
//! performs I/O: transports and timers live in the client crate and talk to
//! the engine through [`Input`] and [`Effect`].

pub mod config;
mod error;
pub mod particles;
mod phase;
mod pool;
pub mod progress;
mod protocol;
pub mod resync;
pub mod terrain;
pub mod timers;

pub use config::{
    load_engine_config, load_engine_config_from_env, EngineConfig, EngineConfigError,
    RevealConfig, ENGINE_CONFIG_ENV,
};
pub use error::{ClientError, Disposition};
pub use particles::{Particle, ParticleField, ParticleKind};
pub use phase::{Effect, FetchTicket, Input, Phase, RoundMachine, RoundState};
pub use pool::{PayoutEstimate, PoolSummary, Settlement};
pub use progress::{render_strip, CarView, FogOfWar, ProgressMapper, TerrainSight};
pub use protocol::{PredictionProtocol, WagerRequest};
pub use resync::{Reconcile, ResyncPolicy};
pub use terrain::{terrain_definition, TerrainDefinition, TrackGeometry};
pub use timers::{TimerCommand, TimerKind, TimerSet, TimerToken};

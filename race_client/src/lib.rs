//! Async runtime for the race client: RPC and push transports plus the task
//! that drives the round engine.

pub mod push;
pub mod runtime;
pub mod service;

pub use push::{pump_events, run_push_channel, RECONNECT_DELAY};
pub use runtime::{spawn_engine, EngineClock, EngineHandle};
pub use service::{RoundService, TcpRoundService, TransportError};

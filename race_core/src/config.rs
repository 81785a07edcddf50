//! Engine tuning: stake economics, track geometry and resync cadence.
//!
//! Loaded from `engine_config.json` with support for an environment override.

use std::{
    env, fs, io,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use race_proto::RevealTiming;
use serde::Deserialize;
use thiserror::Error;

pub const BUILTIN_ENGINE_CONFIG: &str = include_str!("data/engine_config.json");

pub const ENGINE_CONFIG_ENV: &str = "RACE_ENGINE_CONFIG_PATH";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Currency units per wager.
    pub stake_unit: u64,
    pub fee_rate: f64,
    pub track_length: f32,
    pub segments_per_lane: usize,
    /// Share of the track hidden while predictions are open.
    pub fog_fraction: f32,
    pub locked_countdown_secs: u32,
    pub countdown_recheck_ms: u64,
    pub idle_poll_ms: u64,
    pub retry_backoff_ms: u64,
    pub counts_poll_ms: u64,
    pub race_stall_ms: u64,
    pub reveal: RevealConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            stake_unit: 100,
            fee_rate: 0.05,
            track_length: 300.0,
            segments_per_lane: 3,
            fog_fraction: 0.7,
            locked_countdown_secs: 5,
            countdown_recheck_ms: 1_000,
            idle_poll_ms: 500,
            retry_backoff_ms: 3_000,
            counts_poll_ms: 2_000,
            race_stall_ms: 10_000,
            reveal: RevealConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn builtin() -> Arc<Self> {
        Arc::new(
            serde_json::from_str(BUILTIN_ENGINE_CONFIG)
                .expect("builtin engine config should parse"),
        )
    }

    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn from_file(path: &Path) -> Result<Self, EngineConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| EngineConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = EngineConfig::from_json_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), EngineConfigError> {
        if !(0.0..1.0).contains(&self.fee_rate) {
            return Err(EngineConfigError::Invalid(format!(
                "fee_rate {} must lie in [0, 1)",
                self.fee_rate
            )));
        }
        if self.segments_per_lane == 0 {
            return Err(EngineConfigError::Invalid(
                "segments_per_lane must be positive".into(),
            ));
        }
        if self.track_length.is_nan() || self.track_length <= 0.0 {
            return Err(EngineConfigError::Invalid(
                "track_length must be positive".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.fog_fraction) {
            return Err(EngineConfigError::Invalid(format!(
                "fog_fraction {} must lie in [0, 1]",
                self.fog_fraction
            )));
        }
        Ok(())
    }

    /// Fee expressed in basis points so pool arithmetic stays integral.
    pub fn fee_basis_points(&self) -> u64 {
        (self.fee_rate * 10_000.0).round() as u64
    }

    pub fn segment_length(&self) -> f32 {
        self.track_length / self.segments_per_lane as f32
    }

    pub fn countdown_recheck(&self) -> Duration {
        Duration::from_millis(self.countdown_recheck_ms)
    }

    pub fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn counts_poll(&self) -> Duration {
        Duration::from_millis(self.counts_poll_ms)
    }

    pub fn race_stall(&self) -> Duration {
        Duration::from_millis(self.race_stall_ms)
    }
}

/// Fallback reveal durations used when the server does not supply them.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct RevealConfig {
    pub summary_ms: u64,
    pub winner_ms: u64,
}

impl Default for RevealConfig {
    fn default() -> Self {
        let timing = RevealTiming::default();
        Self {
            summary_ms: timing.summary_ms,
            winner_ms: timing.winner_ms,
        }
    }
}

impl RevealConfig {
    pub fn timing(&self) -> RevealTiming {
        RevealTiming {
            summary_ms: self.summary_ms,
            winner_ms: self.winner_ms,
        }
    }
}

#[derive(Debug, Error)]
pub enum EngineConfigError {
    #[error("failed to parse engine config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to read engine config from {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid engine config: {0}")]
    Invalid(String),
}

/// Resolve the engine config from an explicit path, `RACE_ENGINE_CONFIG_PATH`,
/// or the builtin document, in that order.
pub fn load_engine_config(explicit: Option<&Path>) -> (Arc<EngineConfig>, Option<PathBuf>) {
    let path = explicit
        .map(Path::to_path_buf)
        .or_else(|| env::var(ENGINE_CONFIG_ENV).ok().map(PathBuf::from));

    if let Some(path) = path {
        match EngineConfig::from_file(&path) {
            Ok(config) => {
                tracing::info!(
                    target: "race::config",
                    path = %path.display(),
                    "engine_config.loaded=file"
                );
                return (Arc::new(config), Some(path));
            }
            Err(err) => {
                tracing::warn!(
                    target: "race::config",
                    path = %path.display(),
                    error = %err,
                    "engine_config.load_failed"
                );
            }
        }
    }

    tracing::info!(target: "race::config", "engine_config.loaded=builtin");
    (EngineConfig::builtin(), None)
}

pub fn load_engine_config_from_env() -> (Arc<EngineConfig>, Option<PathBuf>) {
    load_engine_config(None)
}

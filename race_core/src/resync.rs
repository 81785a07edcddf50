//! Recovery rules that keep the client converging on server state after
//! missed push events, stale traffic or failed loads.

use std::time::Duration;

use race_proto::{Round, RoundId, RoundStatus};

use crate::config::EngineConfig;
use crate::error::ClientError;
use crate::phase::Phase;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResyncPolicy {
    idle_poll: Duration,
    retry_backoff: Duration,
    countdown_recheck: Duration,
    race_stall: Duration,
    counts_poll: Duration,
}

impl Default for ResyncPolicy {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

impl ResyncPolicy {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            idle_poll: config.idle_poll(),
            retry_backoff: config.retry_backoff(),
            countdown_recheck: config.countdown_recheck(),
            race_stall: config.race_stall(),
            counts_poll: config.counts_poll(),
        }
    }

    /// Delay before asking again when no round is live.
    pub fn idle_poll(&self) -> Duration {
        self.idle_poll
    }

    /// Delay before retrying a failed load. Retries never give up.
    pub fn retry_backoff(&self) -> Duration {
        self.retry_backoff
    }

    /// Delay before re-fetching once the local predictions countdown hits zero.
    /// The first check is quick; later ones fall back to the retry cadence.
    pub fn countdown_recheck(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            self.countdown_recheck
        } else {
            self.retry_backoff
        }
    }

    pub fn race_stall(&self) -> Duration {
        self.race_stall
    }

    pub fn counts_poll(&self) -> Duration {
        self.counts_poll
    }
}

/// Reject snapshots that belong to a round other than the tracked one.
pub fn check_round(tracked: Option<RoundId>, received: RoundId) -> Result<(), ClientError> {
    match tracked {
        Some(tracked) if tracked == received => Ok(()),
        Some(tracked) => Err(ClientError::StaleSnapshot { tracked, received }),
        None => Err(ClientError::MissingRound),
    }
}

/// How a freshly fetched round relates to what the client is tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconcile {
    /// A different, newer round: replace local state.
    NewRound,
    /// Same round, server is ahead: jump forward.
    Advance,
    /// Same round, same phase: refresh details only.
    Refresh,
    /// Older round or earlier phase: ignore.
    Regress,
    /// A finished round the client is not going to reveal.
    NothingLive,
}

pub fn reconcile(
    tracked: Option<(&Round, Phase)>,
    last_revealed: Option<RoundId>,
    fetched: &Round,
) -> Reconcile {
    let fetched_phase = Phase::from_status(fetched.status);
    match tracked {
        Some((current, phase)) if current.id == fetched.id => {
            if fetched.status == RoundStatus::Finished && last_revealed == Some(fetched.id) {
                return Reconcile::NothingLive;
            }
            if fetched_phase.rank() > phase.rank() {
                Reconcile::Advance
            } else if fetched_phase == phase {
                Reconcile::Refresh
            } else {
                Reconcile::Regress
            }
        }
        Some((current, _)) if fetched.number < current.number => Reconcile::Regress,
        _ => {
            if fetched.status == RoundStatus::Finished {
                Reconcile::NothingLive
            } else {
                Reconcile::NewRound
            }
        }
    }
}

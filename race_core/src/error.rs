use race_proto::{CarId, RoundId, WagerRejection};
use thiserror::Error;

/// How a failure should reach the player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Shown once; no retry.
    NotifyUser,
    /// Shown as a banner while the engine retries in the background.
    TransientBanner,
    /// Dropped without telling the player.
    Silent,
    /// Not a failure: keep polling until state appears.
    Repoll,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    #[error("predictions are closed for this round")]
    PhaseClosed,
    #[error("already backing car {held}; cannot also back car {requested}")]
    MultiEntityConflict { held: CarId, requested: CarId },
    #[error("no wager on car {0} to remove")]
    NoWagerOnCar(CarId),
    #[error("car {0} is not running in this round")]
    UnknownCar(CarId),
    #[error("a wager request is already in flight")]
    RequestInFlight,
    #[error("network failure: {0}")]
    NetworkFailure(String),
    #[error("snapshot for round {received} ignored while tracking round {tracked}")]
    StaleSnapshot { tracked: RoundId, received: RoundId },
    #[error("no active round")]
    MissingRound,
}

impl ClientError {
    pub fn disposition(&self) -> Disposition {
        match self {
            ClientError::PhaseClosed
            | ClientError::MultiEntityConflict { .. }
            | ClientError::NoWagerOnCar(_)
            | ClientError::UnknownCar(_)
            | ClientError::RequestInFlight => Disposition::NotifyUser,
            ClientError::NetworkFailure(_) => Disposition::TransientBanner,
            ClientError::StaleSnapshot { .. } => Disposition::Silent,
            ClientError::MissingRound => Disposition::Repoll,
        }
    }

    /// Map a server-side rejection onto the local taxonomy. `requested` is the
    /// car the rejected request targeted.
    pub fn from_rejection(rejection: &WagerRejection, requested: CarId) -> Self {
        match rejection {
            WagerRejection::PhaseClosed => ClientError::PhaseClosed,
            WagerRejection::MultiCarConflict { held } => ClientError::MultiEntityConflict {
                held: *held,
                requested,
            },
            WagerRejection::NoWagerOnCar => ClientError::NoWagerOnCar(requested),
            WagerRejection::RateLimited => {
                ClientError::NetworkFailure("wager request rate limited".into())
            }
            WagerRejection::Other(message) => ClientError::NetworkFailure(message.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispositions_follow_taxonomy() {
        assert_eq!(
            ClientError::PhaseClosed.disposition(),
            Disposition::NotifyUser
        );
        assert_eq!(
            ClientError::NetworkFailure("timeout".into()).disposition(),
            Disposition::TransientBanner
        );
        assert_eq!(
            ClientError::StaleSnapshot {
                tracked: RoundId(2),
                received: RoundId(1)
            }
            .disposition(),
            Disposition::Silent
        );
        assert_eq!(ClientError::MissingRound.disposition(), Disposition::Repoll);
    }

    #[test]
    fn server_conflict_maps_to_local_conflict() {
        let err = ClientError::from_rejection(
            &WagerRejection::MultiCarConflict { held: CarId(4) },
            CarId(2),
        );
        assert_eq!(
            err,
            ClientError::MultiEntityConflict {
                held: CarId(4),
                requested: CarId(2)
            }
        );
    }
}

//! Wager placement and removal for the current player.
//!
//! A player may hold several wagers in a round but all on one car. Local
//! validation mirrors the server so most mistakes never leave the client;
//! the server's answer still wins. Local wager state is only ever replaced
//! by a fresh `myWagers` fetch, never edited optimistically.

use std::collections::BTreeSet;

use race_proto::{CarId, Round, RoundId, Wager, WagerAck, WagerAction};
use tracing::{debug, warn};

use crate::error::ClientError;
use crate::phase::Phase;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WagerRequest {
    pub round_id: RoundId,
    pub car_id: CarId,
    pub action: WagerAction,
}

#[derive(Debug, Clone, Default)]
pub struct PredictionProtocol {
    round_id: Option<RoundId>,
    wagers: Vec<Wager>,
    in_flight: Option<WagerRequest>,
}

impl PredictionProtocol {
    /// Forget all wagers, e.g. when a new round starts or the round finishes.
    pub fn reset(&mut self, round_id: Option<RoundId>) {
        self.round_id = round_id;
        self.wagers.clear();
        self.in_flight = None;
    }

    pub fn round_id(&self) -> Option<RoundId> {
        self.round_id
    }

    pub fn wagers(&self) -> &[Wager] {
        &self.wagers
    }

    pub fn in_flight(&self) -> Option<&WagerRequest> {
        self.in_flight.as_ref()
    }

    /// The car this player currently backs, if any.
    pub fn backed_car(&self) -> Option<CarId> {
        self.wagers.first().map(|wager| wager.car_id)
    }

    pub fn count(&self) -> u32 {
        self.wagers.len() as u32
    }

    pub fn count_on(&self, car: CarId) -> u32 {
        self.wagers.iter().filter(|w| w.car_id == car).count() as u32
    }

    pub fn distinct_cars(&self) -> BTreeSet<CarId> {
        self.wagers.iter().map(|w| w.car_id).collect()
    }

    pub fn total_staked(&self) -> u64 {
        self.wagers.iter().map(|w| w.amount).sum()
    }

    /// Validate an add/remove and mark it in flight.
    pub fn request(
        &mut self,
        phase: Phase,
        countdown_secs: u32,
        round: Option<&Round>,
        car_id: CarId,
        action: WagerAction,
    ) -> Result<WagerRequest, ClientError> {
        let round = match round {
            Some(round) if phase == Phase::Predictions && countdown_secs > 0 => round,
            _ => return Err(ClientError::PhaseClosed),
        };
        if self.in_flight.is_some() {
            return Err(ClientError::RequestInFlight);
        }
        if !round.has_car(car_id) {
            return Err(ClientError::UnknownCar(car_id));
        }
        match action {
            WagerAction::Add => {
                if let Some(held) = self.backed_car() {
                    if held != car_id {
                        return Err(ClientError::MultiEntityConflict {
                            held,
                            requested: car_id,
                        });
                    }
                }
            }
            WagerAction::Remove => {
                if self.count_on(car_id) == 0 {
                    return Err(ClientError::NoWagerOnCar(car_id));
                }
            }
        }

        let request = WagerRequest {
            round_id: round.id,
            car_id,
            action,
        };
        self.in_flight = Some(request);
        debug!(
            target: "race::wager",
            round = %round.id,
            car = %car_id,
            %action,
            "wager.requested"
        );
        Ok(request)
    }

    /// Settle the in-flight request. Returns the request that completed (if it
    /// was still tracked) and the error to surface, if any.
    pub fn acknowledge(
        &mut self,
        request: WagerRequest,
        result: Result<WagerAck, String>,
    ) -> (bool, Option<ClientError>) {
        let tracked = self.in_flight == Some(request);
        if tracked {
            self.in_flight = None;
        }
        let error = match result {
            Ok(WagerAck::Accepted) => None,
            Ok(WagerAck::Rejected(rejection)) => {
                Some(ClientError::from_rejection(&rejection, request.car_id))
            }
            Err(message) => Some(ClientError::NetworkFailure(message)),
        };
        (tracked, error)
    }

    /// Replace local wagers with the server's list. Lists for another round are ignored.
    pub fn replace(&mut self, round_id: RoundId, wagers: Vec<Wager>) -> bool {
        if self.round_id != Some(round_id) {
            return false;
        }
        let wagers: Vec<Wager> = wagers
            .into_iter()
            .filter(|w| w.round_id == round_id)
            .collect();
        let cars: BTreeSet<CarId> = wagers.iter().map(|w| w.car_id).collect();
        if cars.len() > 1 {
            warn!(
                target: "race::wager",
                round = %round_id,
                cars = ?cars,
                "wager.server_list_spans_multiple_cars"
            );
        }
        self.wagers = wagers;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use race_proto::{LaneAssignment, RoundStatus, WagerRejection};

    fn round() -> Round {
        Round {
            id: RoundId(3),
            number: 3,
            status: RoundStatus::Predictions,
            predictions_close_ms: 0,
            cars: Vec::new(),
            assignments: vec![
                LaneAssignment {
                    car_id: CarId(1),
                    lane: 1,
                },
                LaneAssignment {
                    car_id: CarId(2),
                    lane: 2,
                },
            ],
            lanes: Vec::new(),
            total_pot: 0,
            winner: None,
        }
    }

    fn wager(id: u64, car: u32) -> Wager {
        Wager {
            id,
            round_id: RoundId(3),
            car_id: CarId(car),
            amount: 100,
            payout: None,
        }
    }

    fn protocol_with(wagers: Vec<Wager>) -> PredictionProtocol {
        let mut protocol = PredictionProtocol::default();
        protocol.reset(Some(RoundId(3)));
        assert!(protocol.replace(RoundId(3), wagers));
        protocol
    }

    #[test]
    fn closed_phase_rejects_both_actions() {
        let round = round();
        let mut protocol = protocol_with(vec![wager(1, 1)]);
        for (phase, countdown) in [
            (Phase::Locked, 5),
            (Phase::Racing, 0),
            (Phase::Predictions, 0),
        ] {
            for action in [WagerAction::Add, WagerAction::Remove] {
                assert_eq!(
                    protocol.request(phase, countdown, Some(&round), CarId(1), action),
                    Err(ClientError::PhaseClosed)
                );
            }
        }
        assert_eq!(
            protocol.request(Phase::Predictions, 10, None, CarId(1), WagerAction::Add),
            Err(ClientError::PhaseClosed)
        );
    }

    #[test]
    fn second_car_conflicts() {
        let round = round();
        let mut protocol = protocol_with(vec![wager(1, 1), wager(2, 1)]);
        assert_eq!(
            protocol.request(Phase::Predictions, 10, Some(&round), CarId(2), WagerAction::Add),
            Err(ClientError::MultiEntityConflict {
                held: CarId(1),
                requested: CarId(2)
            })
        );
        assert!(protocol
            .request(Phase::Predictions, 10, Some(&round), CarId(1), WagerAction::Add)
            .is_ok());
    }

    #[test]
    fn only_one_request_in_flight() {
        let round = round();
        let mut protocol = protocol_with(Vec::new());
        let request = protocol
            .request(Phase::Predictions, 10, Some(&round), CarId(2), WagerAction::Add)
            .unwrap();
        assert_eq!(
            protocol.request(Phase::Predictions, 10, Some(&round), CarId(2), WagerAction::Add),
            Err(ClientError::RequestInFlight)
        );
        let (tracked, error) = protocol.acknowledge(request, Ok(WagerAck::Accepted));
        assert!(tracked);
        assert!(error.is_none());
        assert!(protocol.in_flight().is_none());
        // Acknowledgement alone never edits the local list.
        assert_eq!(protocol.count(), 0);
    }

    #[test]
    fn remove_requires_a_wager_on_that_car() {
        let round = round();
        let mut protocol = protocol_with(vec![wager(1, 1)]);
        assert_eq!(
            protocol.request(Phase::Predictions, 4, Some(&round), CarId(2), WagerAction::Remove),
            Err(ClientError::NoWagerOnCar(CarId(2)))
        );
        assert_eq!(
            protocol.request(Phase::Predictions, 4, Some(&round), CarId(9), WagerAction::Add),
            Err(ClientError::UnknownCar(CarId(9)))
        );
    }

    #[test]
    fn server_rejection_surfaces_locally() {
        let round = round();
        let mut protocol = protocol_with(Vec::new());
        let request = protocol
            .request(Phase::Predictions, 4, Some(&round), CarId(2), WagerAction::Add)
            .unwrap();
        let (_, error) = protocol.acknowledge(
            request,
            Ok(WagerAck::Rejected(WagerRejection::MultiCarConflict {
                held: CarId(1),
            })),
        );
        assert_eq!(
            error,
            Some(ClientError::MultiEntityConflict {
                held: CarId(1),
                requested: CarId(2)
            })
        );
    }

    #[test]
    fn wager_lists_for_other_rounds_are_ignored() {
        let mut protocol = protocol_with(vec![wager(1, 1)]);
        assert!(!protocol.replace(RoundId(99), Vec::new()));
        assert_eq!(protocol.count(), 1);
        assert_eq!(protocol.total_staked(), 100);
        assert_eq!(protocol.distinct_cars().len(), 1);
    }
}

mod common;

use std::collections::BTreeMap;

use common::{fixture_active_round, fixture_round, loaded, with_status, Driver, T0};
use race_core::{EngineConfig, Phase, PoolSummary, ProgressMapper, TerrainSight, TimerKind};
use race_proto::{
    CarId, CarProgress, ProgressSnapshot, PushEvent, RevealTiming, RoundId, RoundResults,
    RoundStatus, Terrain, Wager,
};

fn settled(id: u64, car: u32, payout: Option<u64>) -> Wager {
    Wager {
        id,
        round_id: RoundId(41),
        car_id: CarId(car),
        amount: 100,
        payout,
    }
}

#[test]
fn round_runs_from_predictions_to_next_wait() {
    let mut driver = Driver::new();
    let mut ranks = Vec::new();

    driver.push(
        PushEvent::RoundStarted {
            round: fixture_round(),
        },
        T0,
    );
    ranks.push(driver.machine.state().phase.rank());
    assert_eq!(driver.machine.state().phase, Phase::Predictions);
    assert_eq!(driver.machine.state().countdown_secs, 15);

    let counts = BTreeMap::from([(CarId(1), 3), (CarId(2), 1), (CarId(3), 0)]);
    driver.push(
        PushEvent::WagerCountsUpdated {
            round_id: RoundId(41),
            counts: counts.clone(),
        },
        T0 + 500,
    );
    let config = EngineConfig::default();
    let pool = driver.machine.state().pool(&config);
    assert_eq!(
        pool,
        PoolSummary {
            total_wagers: 4,
            total_pot: 400,
            platform_fee: 20,
            distributable_pool: 380,
        }
    );

    driver.push(
        PushEvent::PredictionsLocked {
            round_id: RoundId(41),
            final_counts: counts,
        },
        T0 + 15_000,
    );
    ranks.push(driver.machine.state().phase.rank());

    driver.push(
        PushEvent::RaceStarted {
            round_id: RoundId(41),
            lanes: Vec::new(),
        },
        T0 + 20_000,
    );
    ranks.push(driver.machine.state().phase.rank());

    driver.push(
        PushEvent::RaceProgress(ProgressSnapshot {
            round_id: RoundId(41),
            positions: BTreeMap::from([
                (CarId(1), CarProgress { progress: 40.0 }),
                (CarId(2), CarProgress { progress: 55.0 }),
                (CarId(3), CarProgress { progress: 90.0 }),
            ]),
        }),
        T0 + 21_000,
    );
    let mapper = ProgressMapper::from_config(&config);
    let views = driver.machine.state().car_views(&mapper);
    assert_eq!(views.len(), 3);
    let skiff = views.iter().find(|view| view.car_id == CarId(3)).unwrap();
    assert!((skiff.distance - 270.0).abs() < 1e-3);
    assert_eq!(skiff.sight, TerrainSight::Known(Terrain::TerrainA));
    assert_eq!(skiff.speed, Some(5));

    let mut finished = with_status(fixture_round(), RoundStatus::Finished);
    finished.winner = Some(CarId(2));
    driver.push(
        PushEvent::RoundFinished {
            round: finished,
            results: RoundResults {
                winner: CarId(2),
                settled: vec![settled(1, 2, Some(190)), settled(2, 2, Some(190))],
            },
            reveal: RevealTiming {
                summary_ms: 2_000,
                winner_ms: 4_000,
            },
        },
        T0 + 40_000,
    );
    ranks.push(driver.machine.state().phase.rank());
    let settlement = driver.machine.state().settlement().unwrap();
    assert_eq!(settlement.staked, 200);
    assert_eq!(settlement.net(), 180);
    assert_eq!(driver.machine.state().wagers.count(), 0);

    driver.fire(TimerKind::RevealAdvance, T0 + 42_000);
    ranks.push(driver.machine.state().phase.rank());
    assert_eq!(driver.machine.state().winner(), Some(CarId(2)));

    driver.fire(TimerKind::RevealAdvance, T0 + 46_000);
    assert_eq!(driver.machine.state().phase, Phase::Waiting);
    assert!(driver.fetched_round());

    assert!(ranks.windows(2).all(|pair| pair[0] < pair[1]), "{ranks:?}");
    assert_eq!(ranks, vec![1, 2, 3, 4, 5]);
}

#[test]
fn missed_finish_reveals_with_default_timing() {
    let mut driver = Driver::new();
    driver.load(loaded(with_status(fixture_round(), RoundStatus::Racing)), T0);
    assert_eq!(driver.machine.state().phase, Phase::Racing);

    // No progress for the stall window: the watchdog re-fetches.
    driver.fire(TimerKind::RaceStall, T0 + 10_000);
    assert!(driver.fetched_round());

    let mut finished = with_status(fixture_round(), RoundStatus::Finished);
    finished.winner = Some(CarId(1));
    let effects = driver.load(loaded(finished), T0 + 10_100).to_vec();
    assert_eq!(driver.machine.state().phase, Phase::Reveal0);
    assert_eq!(driver.machine.state().winner(), Some(CarId(1)));
    assert_eq!(driver.machine.state().reveal, RevealTiming::default());
    assert!(effects.iter().any(|effect| effect.wager_fetch_for() == Some(RoundId(41))));

    driver.load_wagers(RoundId(41), vec![settled(5, 3, Some(0))], T0 + 10_200);
    assert_eq!(driver.machine.state().settlement().unwrap().net(), -100);

    // The same finished round showing up again is not revealed twice.
    driver.fire(TimerKind::RevealAdvance, T0 + 13_100);
    driver.fire(TimerKind::RevealAdvance, T0 + 18_100);
    let mut again = with_status(fixture_round(), RoundStatus::Finished);
    again.winner = Some(CarId(1));
    driver.load(loaded(again), T0 + 18_200);
    assert_eq!(driver.machine.state().phase, Phase::Waiting);
    assert!(driver.is_pending(TimerKind::IdlePoll));
}

#[test]
fn reconnect_mid_race_adopts_the_server_round() {
    let mut driver = Driver::new();
    let active = fixture_active_round();
    assert_eq!(active.wager_counts.get(&CarId(1)), Some(&3));

    driver.load(Ok(Some(active)), T0 + 30_000);
    let state = driver.machine.state();
    assert_eq!(state.phase, Phase::Racing);
    assert_eq!(state.round_id(), Some(RoundId(41)));
    assert_eq!(state.round.as_ref().map(|round| round.cars.len()), Some(3));
    assert!(driver.fetched_wagers(RoundId(41)));
    assert!(driver.is_pending(TimerKind::RaceStall));

    let pool = state.pool(&EngineConfig::default());
    assert_eq!(pool.total_wagers, 4);
    assert_eq!(pool.distributable_pool, 380);
}

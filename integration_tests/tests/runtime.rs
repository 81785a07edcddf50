mod common;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use common::{round, InMemoryService, T0};
use race_client::{spawn_engine, EngineClock};
use race_core::{EngineConfig, Input, Phase, RoundState};
use race_proto::{
    CarId, CarProgress, ProgressSnapshot, PushEvent, RevealTiming, RoundId, RoundResults,
    RoundStatus,
};
use tokio::sync::watch;

async fn wait_for(
    state: &mut watch::Receiver<Arc<RoundState>>,
    what: &str,
    predicate: impl FnMut(&Arc<RoundState>) -> bool,
) -> Result<Arc<RoundState>> {
    let seen = tokio::time::timeout(Duration::from_secs(60), state.wait_for(predicate))
        .await
        .with_context(|| format!("timed out waiting for {what}"))?
        .context("engine stopped")?;
    Ok(Arc::clone(&seen))
}

#[tokio::test(start_paused = true)]
async fn engine_follows_a_round_end_to_end() -> Result<()> {
    let service = Arc::new(InMemoryService::default());
    service.set_active(Some(round(1, RoundStatus::Predictions, T0 + 10_000)));
    let engine = spawn_engine(
        Arc::new(EngineConfig::default()),
        Arc::clone(&service),
        EngineClock::starting_at(T0),
    );
    let mut state = engine.state();

    let seen = wait_for(&mut state, "predictions", |s| s.phase == Phase::Predictions).await?;
    assert_eq!(seen.round_id(), Some(RoundId(1)));
    assert_eq!(seen.countdown_secs, 10);

    tokio::time::sleep(Duration::from_millis(3_500)).await;
    assert_eq!(state.borrow().countdown_secs, 7);

    assert!(engine.send(Input::PlaceWager(CarId(2))));
    let seen = wait_for(&mut state, "wager refetch", |s| s.wagers.count() == 1).await?;
    assert_eq!(seen.wagers.backed_car(), Some(CarId(2)));
    assert_eq!(service.requests().len(), 1);
    let seen = wait_for(&mut state, "counts refresh", |s| !s.counts.is_empty()).await?;
    assert_eq!(seen.counts, service.counts());

    engine.send(Input::Push(PushEvent::PredictionsLocked {
        round_id: RoundId(1),
        final_counts: service.counts(),
    }));
    wait_for(&mut state, "locked", |s| s.phase == Phase::Locked).await?;

    service.set_active(Some(round(1, RoundStatus::Racing, T0 + 10_000)));
    engine.send(Input::Push(PushEvent::RaceStarted {
        round_id: RoundId(1),
        lanes: Vec::new(),
    }));
    wait_for(&mut state, "racing", |s| s.phase == Phase::Racing).await?;

    engine.send(Input::Push(PushEvent::RaceProgress(ProgressSnapshot {
        round_id: RoundId(1),
        positions: BTreeMap::from([(CarId(2), CarProgress { progress: 50.0 })]),
    })));
    wait_for(&mut state, "progress", |s| s.progress.is_some()).await?;

    service.set_active(None);
    service.settle(RoundId(1), CarId(2), 190);
    let mut finished = round(1, RoundStatus::Finished, T0 + 10_000);
    finished.winner = Some(CarId(2));
    engine.send(Input::Push(PushEvent::RoundFinished {
        round: finished,
        results: RoundResults {
            winner: CarId(2),
            settled: Vec::new(),
        },
        reveal: RevealTiming {
            summary_ms: 1_000,
            winner_ms: 1_000,
        },
    }));
    // The broadcast carries no per-player wagers; the engine fetches them.
    let seen = wait_for(&mut state, "settled reveal", |s| {
        s.phase == Phase::Reveal0 && s.settlement().is_some_and(|settled| settled.staked > 0)
    })
    .await?;
    let settlement = seen.settlement().context("settlement shown")?;
    assert_eq!(settlement.staked, 100);
    assert_eq!(settlement.net(), 90);
    wait_for(&mut state, "winner", |s| s.phase == Phase::Reveal1).await?;
    let seen = wait_for(&mut state, "waiting", |s| s.phase == Phase::Waiting).await?;
    assert!(seen.round.is_none());
    assert_eq!(seen.last_revealed, Some(RoundId(1)));

    engine.shutdown();
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn failed_loads_retry_until_the_server_answers() -> Result<()> {
    let service = Arc::new(InMemoryService::default());
    service.fail_next(2);
    service.set_active(Some(round(3, RoundStatus::Racing, T0)));
    let engine = spawn_engine(
        Arc::new(EngineConfig::default()),
        Arc::clone(&service),
        EngineClock::starting_at(T0),
    );
    let mut state = engine.state();

    let seen = wait_for(&mut state, "banner", |s| s.banner.is_some()).await?;
    assert_eq!(seen.phase, Phase::Waiting);

    let seen = wait_for(&mut state, "racing", |s| s.phase == Phase::Racing).await?;
    assert_eq!(seen.banner, None);
    assert_eq!(seen.round_id(), Some(RoundId(3)));

    engine.shutdown();
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn reconnect_triggers_a_full_refetch() -> Result<()> {
    let service = Arc::new(InMemoryService::default());
    let engine = spawn_engine(
        Arc::new(EngineConfig::default()),
        Arc::clone(&service),
        EngineClock::starting_at(T0),
    );
    let mut state = engine.state();
    wait_for(&mut state, "idle", |s| s.phase == Phase::Waiting).await?;

    service.set_active(Some(round(5, RoundStatus::Locked, T0)));
    engine.send(Input::ChannelReconnected);
    let seen = wait_for(&mut state, "locked", |s| s.phase == Phase::Locked).await?;
    assert_eq!(seen.locked_countdown_secs, 5);

    engine.shutdown();
    Ok(())
}

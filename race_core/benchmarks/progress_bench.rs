use std::collections::BTreeMap;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use race_core::{ParticleField, Phase, ProgressMapper};
use race_proto::{
    CarId, CarProgress, Lane, LaneAssignment, ProgressSnapshot, Round, RoundId, RoundStatus,
    Terrain,
};

const TERRAINS: [Terrain; 3] = [Terrain::Regular, Terrain::TerrainA, Terrain::TerrainB];

fn round_with(cars: u32) -> Round {
    Round {
        id: RoundId(1),
        number: 1,
        status: RoundStatus::Racing,
        predictions_close_ms: 0,
        cars: Vec::new(),
        assignments: (1..=cars)
            .map(|n| LaneAssignment {
                car_id: CarId(n),
                lane: n as u8,
            })
            .collect(),
        lanes: (1..=cars)
            .map(|n| Lane {
                number: n as u8,
                segments: (0..3).map(|s| TERRAINS[((n + s) % 3) as usize]).collect(),
            })
            .collect(),
        total_pot: 0,
        winner: None,
    }
}

fn snapshot_for(cars: u32, step: f32) -> ProgressSnapshot {
    ProgressSnapshot {
        round_id: RoundId(1),
        positions: (1..=cars)
            .map(|n| {
                (
                    CarId(n),
                    CarProgress {
                        progress: (step * n as f32) % 100.0,
                    },
                )
            })
            .collect::<BTreeMap<_, _>>(),
    }
}

fn bench_progress(c: &mut Criterion) {
    let mut group = c.benchmark_group("progress");
    let mapper = ProgressMapper::default();

    for cars in [3u32, 8, 16] {
        let round = round_with(cars);
        let snapshot = snapshot_for(cars, 7.5);
        group.bench_with_input(BenchmarkId::new("map_round", cars), &cars, |b, _| {
            b.iter(|| mapper.map_round(&round, Some(&snapshot), Phase::Racing))
        });
        group.bench_with_input(BenchmarkId::new("map_and_emit", cars), &cars, |b, _| {
            let mut field = ParticleField::new(7);
            b.iter(|| {
                let views = mapper.map_round(&round, Some(&snapshot), Phase::Racing);
                mapper.emit_particles(&views, Phase::Racing, &mut field);
                field.tick(1.0 / 30.0);
            })
        });
    }

    group.finish();
}

criterion_group!(progress_benches, bench_progress);
criterion_main!(progress_benches);

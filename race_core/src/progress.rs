//! Maps per-car progress scalars onto track distance, segments and terrain.
//!
//! While predictions are open the mapper hides most of the track: a segment
//! is concealed when it starts inside the far `fog_fraction` of the track,
//! except the final (finish) segment, which is always shown.

use std::fmt::Write as _;

use race_proto::{CarId, Lane, ProgressSnapshot, Round, Terrain};

use crate::config::EngineConfig;
use crate::particles::ParticleField;
use crate::phase::Phase;
use crate::terrain::{terrain_definition, TrackGeometry};

/// What the player is allowed to know about a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerrainSight {
    Known(Terrain),
    Unknown,
}

impl TerrainSight {
    pub fn glyph(self) -> char {
        match self {
            TerrainSight::Known(terrain) => terrain_definition(terrain).glyph,
            TerrainSight::Unknown => '?',
        }
    }

    pub fn terrain(self) -> Option<Terrain> {
        match self {
            TerrainSight::Known(terrain) => Some(terrain),
            TerrainSight::Unknown => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FogOfWar {
    geometry: TrackGeometry,
    fog_fraction: f32,
}

impl FogOfWar {
    pub fn new(geometry: TrackGeometry, fog_fraction: f32) -> Self {
        Self {
            geometry,
            fog_fraction: fog_fraction.clamp(0.0, 1.0),
        }
    }

    /// Distance from the start line where the fog begins.
    pub fn fog_start(&self) -> f32 {
        (1.0 - self.fog_fraction) * self.geometry.track_length
    }

    pub fn is_segment_hidden(&self, index: usize) -> bool {
        if index + 1 >= self.geometry.segments {
            return false;
        }
        let (start, _) = self.geometry.segment_bounds(index);
        start >= self.fog_start()
    }
}

/// Renderable state of one car for the current tick.
#[derive(Debug, Clone, PartialEq)]
pub struct CarView {
    pub car_id: CarId,
    pub name: String,
    pub lane_number: u8,
    /// Row of the car's lane in `Round::lanes`.
    pub row: usize,
    pub progress: f32,
    pub distance: f32,
    pub segment: usize,
    pub sight: TerrainSight,
    /// Speed rating on the current terrain, when the terrain is visible.
    pub speed: Option<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressMapper {
    geometry: TrackGeometry,
    fog: FogOfWar,
}

impl Default for ProgressMapper {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

impl ProgressMapper {
    pub fn from_config(config: &EngineConfig) -> Self {
        let geometry = TrackGeometry::from_config(config);
        Self {
            geometry,
            fog: FogOfWar::new(geometry, config.fog_fraction),
        }
    }

    pub fn geometry(&self) -> &TrackGeometry {
        &self.geometry
    }

    pub fn fog(&self) -> &FogOfWar {
        &self.fog
    }

    pub fn segment_index(&self, progress: f32) -> usize {
        self.geometry.segment_index(progress)
    }

    pub fn segment_sight(&self, lane: &Lane, index: usize, phase: Phase) -> TerrainSight {
        if phase.conceals_terrain() && self.fog.is_segment_hidden(index) {
            return TerrainSight::Unknown;
        }
        TerrainSight::Known(lane.segment(index).unwrap_or_default())
    }

    /// Terrain under a car at `progress`, subject to fog.
    pub fn sight_at(&self, lane: &Lane, progress: f32, phase: Phase) -> TerrainSight {
        self.segment_sight(lane, self.segment_index(progress), phase)
    }

    /// Visible composition of a whole lane.
    pub fn lane_strip(&self, lane: &Lane, phase: Phase) -> Vec<TerrainSight> {
        (0..self.geometry.segments)
            .map(|index| self.segment_sight(lane, index, phase))
            .collect()
    }

    /// Map every assigned car of `round`. Cars missing from `snapshot` sit on
    /// the start line.
    pub fn map_round(
        &self,
        round: &Round,
        snapshot: Option<&ProgressSnapshot>,
        phase: Phase,
    ) -> Vec<CarView> {
        round
            .assignments
            .iter()
            .filter_map(|assignment| {
                let row = round
                    .lanes
                    .iter()
                    .position(|lane| lane.number == assignment.lane)?;
                let lane = &round.lanes[row];
                let progress = snapshot
                    .and_then(|s| s.progress_of(assignment.car_id))
                    .unwrap_or(0.0)
                    .clamp(0.0, 100.0);
                let sight = self.sight_at(lane, progress, phase);
                let car = round.car(assignment.car_id);
                Some(CarView {
                    car_id: assignment.car_id,
                    name: car
                        .map(|c| c.name.clone())
                        .unwrap_or_else(|| format!("car {}", assignment.car_id)),
                    lane_number: assignment.lane,
                    row,
                    progress,
                    distance: self.geometry.distance(progress),
                    segment: self.segment_index(progress),
                    sight,
                    speed: sight
                        .terrain()
                        .and_then(|terrain| car.map(|c| c.speed_on(terrain))),
                })
            })
            .collect()
    }

    /// Roll particle emission for every mapped car. Only the race emits.
    pub fn emit_particles(&self, views: &[CarView], phase: Phase, field: &mut ParticleField) {
        if phase != Phase::Racing {
            return;
        }
        for view in views {
            if let TerrainSight::Known(terrain) = view.sight {
                field.emit(view.row, view.distance, view.progress, terrain);
            }
        }
    }
}

/// Compact text form of a lane strip, e.g. `[=][?][b]`.
pub fn render_strip(strip: &[TerrainSight]) -> String {
    let mut out = String::with_capacity(strip.len() * 3);
    for sight in strip {
        let _ = write!(out, "[{}]", sight.glyph());
    }
    out
}

use race_proto::{Lane, Terrain};

use crate::config::EngineConfig;
use crate::particles::ParticleKind;

/// Cosmetic particle output of a surface while a car drives over it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmissionProfile {
    /// Per-tick spawn probability at full race progress.
    pub base_rate: f32,
    /// Particles spawned when an emission roll succeeds.
    pub burst: u8,
    pub kind: Option<ParticleKind>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TerrainDefinition {
    pub terrain: Terrain,
    pub label: &'static str,
    pub glyph: char,
    pub emission: EmissionProfile,
}

fn em(base_rate: f32, burst: u8, kind: Option<ParticleKind>) -> EmissionProfile {
    EmissionProfile {
        base_rate,
        burst,
        kind,
    }
}

pub fn terrain_definition(terrain: Terrain) -> TerrainDefinition {
    match terrain {
        Terrain::Regular => TerrainDefinition {
            terrain,
            label: "regular",
            glyph: '=',
            emission: em(0.0, 0, None),
        },
        Terrain::TerrainA => TerrainDefinition {
            terrain,
            label: "soft (A)",
            glyph: 'a',
            emission: em(0.3, 1, Some(ParticleKind::Dust)),
        },
        Terrain::TerrainB => TerrainDefinition {
            terrain,
            label: "soft (B)",
            glyph: 'b',
            emission: em(0.8, 3, Some(ParticleKind::Splash)),
        },
    }
}

/// Fixed track layout: `segments` equal-length sections spanning `track_length` units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackGeometry {
    pub track_length: f32,
    pub segments: usize,
}

impl Default for TrackGeometry {
    fn default() -> Self {
        Self {
            track_length: 300.0,
            segments: 3,
        }
    }
}

impl TrackGeometry {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            track_length: config.track_length,
            segments: config.segments_per_lane.max(1),
        }
    }

    pub fn segment_length(&self) -> f32 {
        self.track_length / self.segments as f32
    }

    /// Distance from the start line for a 0-100 progress value.
    pub fn distance(&self, progress: f32) -> f32 {
        let clamped = if progress.is_finite() {
            progress.clamp(0.0, 100.0)
        } else {
            0.0
        };
        clamped / 100.0 * self.track_length
    }

    /// Segment under a car at `progress`; the finish line belongs to the last segment.
    pub fn segment_index(&self, progress: f32) -> usize {
        let index = (self.distance(progress) / self.segment_length()).floor() as usize;
        index.min(self.segments - 1)
    }

    /// Start and end distance of segment `index`.
    pub fn segment_bounds(&self, index: usize) -> (f32, f32) {
        let length = self.segment_length();
        let start = length * index as f32;
        (start, start + length)
    }

    pub fn terrain_at(&self, lane: &Lane, progress: f32) -> Terrain {
        lane.segment(self.segment_index(progress))
            .unwrap_or_default()
    }
}

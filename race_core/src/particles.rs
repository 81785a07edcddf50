//! Cosmetic particles thrown up by cars on soft terrain during the race.
//!
//! Particles live only on the render side: they are spawned from the latest
//! mapped positions each frame and never feed back into round state.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use race_proto::Terrain;

use crate::terrain::terrain_definition;

const MAX_PARTICLES: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParticleKind {
    Dust,
    Splash,
}

impl ParticleKind {
    /// Life lost per second of simulation.
    fn decay_rate(self) -> f32 {
        match self {
            ParticleKind::Dust => 1.5,
            ParticleKind::Splash => 2.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Particle {
    pub kind: ParticleKind,
    pub lane: usize,
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub life: f32,
}

#[derive(Debug, Clone)]
pub struct ParticleField {
    particles: Vec<Particle>,
    rng: SmallRng,
}

impl Default for ParticleField {
    fn default() -> Self {
        Self::new(0x5eed_cafe)
    }
}

impl ParticleField {
    pub fn new(seed: u64) -> Self {
        Self {
            particles: Vec::new(),
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    /// Roll emission for one car. Chance scales with race progress and the
    /// surface under the car; cars on the start or finish line stay clean.
    pub fn emit(&mut self, lane: usize, distance: f32, progress: f32, terrain: Terrain) -> usize {
        if !(progress > 0.0 && progress < 100.0) {
            return 0;
        }
        let emission = terrain_definition(terrain).emission;
        let Some(kind) = emission.kind else {
            return 0;
        };
        let chance = emission.base_rate * (progress / 100.0);
        if self.rng.gen::<f32>() >= chance {
            return 0;
        }

        let mut spawned = 0;
        for _ in 0..emission.burst {
            if self.particles.len() >= MAX_PARTICLES {
                break;
            }
            let particle = Particle {
                kind,
                lane,
                x: distance,
                y: self.rng.gen_range(-0.3..0.3),
                vx: -self.rng.gen_range(5.0f32..20.0),
                vy: self.rng.gen_range(-1.0..1.0),
                life: 1.0,
            };
            self.particles.push(particle);
            spawned += 1;
        }
        spawned
    }

    /// Advance every particle by `dt` seconds and drop the expired ones.
    pub fn tick(&mut self, dt: f32) {
        for particle in &mut self.particles {
            particle.x += particle.vx * dt;
            particle.y += particle.vy * dt;
            particle.life -= particle.kind.decay_rate() * dt;
        }
        self.particles.retain(|particle| particle.life > 0.0);
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    pub fn len(&self) -> usize {
        self.particles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    pub fn clear(&mut self) {
        self.particles.clear();
    }
}

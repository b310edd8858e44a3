// argus_sim/src/simulation/core/mod.rs

use bevy::prelude::*;

pub mod app_state;
pub mod prng;
pub mod simulation_setup;
pub mod spawn_requests;
pub mod transforms;

/// Counts fixed-update ticks and marks episode boundaries.
#[derive(Resource, Debug, Default, Clone)]
pub struct SimulationClock {
    pub ticks: u64,
    pub max_ticks: Option<u64>,
    pub episode_ticks: Option<u64>,
    pub episode: u64,
}

impl SimulationClock {
    /// Advances one tick. Returns `true` when a new episode should start.
    pub fn advance(&mut self) -> bool {
        self.ticks += 1;
        match self.episode_ticks {
            Some(every) if every > 0 && self.ticks % every == 0 => {
                self.episode += 1;
                true
            }
            _ => false,
        }
    }

    pub fn finished(&self) -> bool {
        self.max_ticks.is_some_and(|max| self.ticks >= max)
    }
}

/// Sent when every perceiver should start a fresh episode.
#[derive(Event, Debug, Clone, Copy)]
pub struct EpisodeBoundary {
    pub episode: u64,
}

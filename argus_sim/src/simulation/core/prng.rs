// argus_sim/src/simulation/core/prng.rs

use bevy::prelude::Resource;
use rand::rngs::OsRng;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// A newtype wrapper around `ChaCha8Rng` to make it a Bevy Resource.
/// This is the central, deterministic pseudo-random number generator for the simulation.
#[derive(Resource)]
pub struct SimulationRng(pub ChaCha8Rng);

impl SimulationRng {
    /// Seeds from `seed`, or from the OS when none is given.
    /// Returns the seed actually used so it can be logged and replayed.
    pub fn from_optional_seed(seed: Option<u64>) -> (Self, u64) {
        let seed = seed.unwrap_or_else(|| OsRng.next_u64());
        (Self(ChaCha8Rng::seed_from_u64(seed)), seed)
    }
}

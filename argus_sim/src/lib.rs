// argus_sim/src/lib.rs

use bevy::prelude::*;

use crate::simulation::config::ConfigPlugin;
use crate::simulation::core::app_state::AppState;
use crate::simulation::core::simulation_setup::SimulationSetupPlugin;
use crate::simulation::plugins::perception::PerceptionPlugin;
use crate::simulation::plugins::world::spawner::WorldSpawnerPlugin;

// This prelude is for convenience for other files WITHIN the argus_sim crate.
pub mod prelude;

pub mod cli;
pub mod simulation;

/// The main plugin that brings together all the simulation parts.
/// Insert a `ScenarioConfig` resource before adding it.
pub struct ArgusSimulationPlugin;

impl Plugin for ArgusSimulationPlugin {
    fn build(&self, app: &mut App) {
        app.init_state::<AppState>().add_plugins((
            // Summarizes the scenario and starts scene building.
            ConfigPlugin,
            // Core setup (RNG, fixed timestep, spawn pipeline, agents).
            SimulationSetupPlugin,
            // Static and scattered obstacles.
            WorldSpawnerPlugin,
            // Sensors, the coordinator tick, observations.
            PerceptionPlugin,
        ));
    }
}

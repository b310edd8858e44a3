// argus_sim/src/prelude.rs

// Re-export the entire Bevy prelude for convenience.
pub use bevy::prelude::*;

// Re-export common simulation-specific types for easy access in other plugins.
pub use crate::simulation::config::structs::{AgentConfig, ObstacleConfig, ScenarioConfig};
pub use crate::simulation::core::app_state::{AppState, SceneBuildSet, SimulationSet};
pub use crate::simulation::core::spawn_requests::SpawnAgentConfigRequest;
pub use crate::simulation::plugins::perception::{
    Coordinator, DetectionTags, Observation, PerceptionSensor,
};

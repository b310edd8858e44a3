// argus_sim/src/simulation/core/spawn_requests.rs
use crate::prelude::AgentConfig;
use bevy::prelude::Component;

/// Temporary marker carrying an agent's config through the scene-building
/// passes. Removed in `SceneBuildSet::Cleanup`.
#[derive(Component, Clone)]
pub struct SpawnAgentConfigRequest(pub AgentConfig);

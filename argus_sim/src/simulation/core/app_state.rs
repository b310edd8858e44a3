// argus_sim/src/simulation/core/app_state.rs

use bevy::{ecs::schedule::SystemSet, prelude::States};

/// Defines the major phases of the application's lifecycle.
#[derive(States, Debug, Clone, Eq, PartialEq, Hash, Default)]
pub enum AppState {
    /// The initial state. The scenario is read and summarized here.
    #[default]
    AssetLoading,

    /// Building the scene by spawning entities from the config.
    SceneBuilding,

    /// The scene is built. The main simulation loop is now running.
    Running,
}

/// System sets to control the order of execution during the SceneBuilding state.
#[derive(SystemSet, Debug, Clone, PartialEq, Eq, Hash)]
pub enum SceneBuildSet {
    /// Pass 1: Create agent shells and attach the main request component.
    CreateRequests,

    /// Pass 2: Spawn static and scattered obstacles.
    World,

    /// Pass 3: Attach perception sensors and register them with the coordinator.
    ProcessSensors,

    /// Pass 4: Attach all physical bodies (RigidBody, Collider).
    Physics,

    /// Pass 5: Remove all temporary request components.
    Cleanup,
}

// =========================================================================
// == Main Simulation Sets (The "Data Flow Graph") ==
// =========================================================================

#[derive(SystemSet, Debug, Clone, PartialEq, Eq, Hash)]
pub enum SimulationSet {
    /// Copies physics state (poses, velocities) into perception inputs.
    Precomputation,

    /// The coordinator tick: budgets, provider sweeps, deferred casts.
    Perception,

    /// Consumers of the freshly encoded observations.
    Publish,

    /// Episode bookkeeping and run-length checks. Runs last.
    Validation,
}

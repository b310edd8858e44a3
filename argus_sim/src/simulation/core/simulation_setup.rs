// argus_sim/src/simulation/core/simulation_setup.rs

use std::time::Duration;

use avian3d::prelude::{AngularVelocity, Collider, CollisionLayers, LinearVelocity, RigidBody};

use crate::prelude::*;
use crate::simulation::core::prng::SimulationRng;
use crate::simulation::core::{EpisodeBoundary, SimulationClock};
use crate::simulation::plugins::perception::DetectionTags;

pub struct SimulationSetupPlugin;

impl Plugin for SimulationSetupPlugin {
    fn build(&self, app: &mut App) {
        // This plugin's job is to read the config and add resources and startup systems.
        let config = app
            .world()
            .get_resource::<ScenarioConfig>()
            .cloned()
            .unwrap_or_default();

        // --- 1. Add the Deterministic PRNG Resource ---
        let (rng, seed) = SimulationRng::from_optional_seed(config.simulation.seed);
        info!("Simulation RNG seeded with {seed}");
        app.insert_resource(rng);

        // --- 2. Clock & Events ---
        app.insert_resource(SimulationClock {
            max_ticks: config.simulation.max_ticks,
            episode_ticks: config.simulation.episode_ticks,
            ..default()
        })
        .add_event::<EpisodeBoundary>();

        let tick_rate = if config.simulation.tick_rate_hz > 0.0 {
            config.simulation.tick_rate_hz
        } else {
            60.0
        };
        app.insert_resource(Time::<Fixed>::from_duration(Duration::from_secs_f64(
            1.0 / tick_rate,
        )));

        // --- CONFIGURE THE SPAWNING PIPELINE ---
        // This chain of SystemSets guarantees the correct spawning order.
        app.configure_sets(
            OnEnter(AppState::SceneBuilding),
            (
                SceneBuildSet::CreateRequests,
                SceneBuildSet::World,
                SceneBuildSet::ProcessSensors,
                SceneBuildSet::Physics,
                SceneBuildSet::Cleanup,
            )
                .chain(),
        );

        app.add_systems(
            OnEnter(AppState::SceneBuilding),
            (
                spawn_agent_shells.in_set(SceneBuildSet::CreateRequests),
                attach_agent_bodies.in_set(SceneBuildSet::Physics),
                cleanup_spawn_requests.in_set(SceneBuildSet::Cleanup),
                transition_to_running
                    .in_set(SceneBuildSet::Cleanup)
                    .after(cleanup_spawn_requests),
            ),
        );

        // Physics steps in FixedPostUpdate, so perception always reads the
        // poses the previous step produced.
        app.configure_sets(
            FixedUpdate,
            (
                SimulationSet::Precomputation,
                SimulationSet::Perception,
                SimulationSet::Publish,
                SimulationSet::Validation,
            )
                .chain()
                .run_if(in_state(AppState::Running)),
        );

        app.add_systems(
            FixedUpdate,
            advance_clock.in_set(SimulationSet::Validation),
        );
    }
}

fn spawn_agent_shells(mut commands: Commands, config: Res<ScenarioConfig>) {
    for agent_config in &config.agents {
        info!(
            "[SPAWN] Posting spawn request for agent: {}",
            &agent_config.name
        );

        commands.spawn((
            Name::new(agent_config.name.clone()),
            agent_config.starting_pose.to_bevy_transform(),
            // Later passes (sensors, physics) read the request, so it is
            // cloned into the component rather than looked up again.
            SpawnAgentConfigRequest(agent_config.clone()),
        ));
    }
}

/// Agents are kinematic: they follow their configured velocities and are
/// visible to other agents' perception, but are not pushed around.
fn attach_agent_bodies(mut commands: Commands, query: Query<(Entity, &SpawnAgentConfigRequest)>) {
    for (entity, request) in &query {
        let agent = &request.0;
        commands.entity(entity).insert((
            RigidBody::Kinematic,
            Collider::sphere(agent.body_radius.max(0.01)),
            CollisionLayers::from_bits(1, u32::MAX),
            LinearVelocity(Vec3::from_array(agent.velocity)),
            AngularVelocity(Vec3::new(0.0, agent.yaw_rate.to_radians(), 0.0)),
            DetectionTags {
                tags: agent.tags.clone(),
                label: Some(agent.name.clone()),
                velocity: Vec3::from_array(agent.velocity),
            },
        ));
    }
}

fn cleanup_spawn_requests(
    mut commands: Commands,
    query: Query<Entity, With<SpawnAgentConfigRequest>>,
) {
    info!("[CLEANUP] Removing spawn request components.");
    for entity in &query {
        commands.entity(entity).remove::<SpawnAgentConfigRequest>();
    }
}

/// This simple system runs once at the end of the `OnEnter(SceneBuilding)` chain.
/// Its only job is to move the app into the main `Running` state.
fn transition_to_running(mut next_state: ResMut<NextState<AppState>>) {
    info!("Scene building complete. Transitioning to Running state.");
    next_state.set(AppState::Running);
}

fn advance_clock(
    mut clock: ResMut<SimulationClock>,
    mut episodes: EventWriter<EpisodeBoundary>,
    mut exit: EventWriter<AppExit>,
) {
    if clock.advance() {
        info!("Episode {} begins at tick {}", clock.episode, clock.ticks);
        episodes.write(EpisodeBoundary {
            episode: clock.episode,
        });
    }
    if clock.finished() {
        info!("Reached {} ticks, exiting.", clock.ticks);
        exit.write(AppExit::Success);
    }
}

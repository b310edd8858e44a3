// argus_sim/src/simulation/plugins/perception/mod.rs

//! Bevy glue for the perception engine.
//!
//! Each agent entity carries one `PerceptionSensor` wrapping a core
//! `PerceptionProvider` whose id is the entity's bits. A single
//! `Coordinator` resource owns the cast budget and ticks every sensor once
//! per fixed update against [`AvianQueryBackend`].

pub mod avian_backend;
pub mod diagnostics;

use argus_core::prelude::{
    ClassifiableObject, FrameInput, ObjectHandle, PerceptionCoordinator, PerceptionProvider, Pos3,
    ProviderId, ProviderSet, TickReport, Vec3 as CoreVec3,
};
use avian3d::prelude::LinearVelocity;

use crate::prelude::*;
use crate::simulation::core::transforms::{bevy_transform_to_pose, bevy_vector_to_vec3};
use crate::simulation::core::EpisodeBoundary;
pub use avian_backend::AvianQueryBackend;
use diagnostics::{log_perception_telemetry, TelemetryTimer};

// =========================================================================
// == Components & Resources ==
// =========================================================================

/// The shared cast budget and provider registry.
#[derive(Resource, Default)]
pub struct Coordinator(pub PerceptionCoordinator);

/// The point LOD distances are measured to.
#[derive(Resource, Default, Clone, Copy)]
pub struct ReferencePoint(pub Option<Pos3>);

/// The report from the most recent coordinator tick.
#[derive(Resource, Default)]
pub struct LastTickReport(pub TickReport);

#[derive(Component)]
pub struct PerceptionSensor {
    pub provider: PerceptionProvider,
}

/// The latest encoded observation, refreshed every fixed update.
#[derive(Component, Default, Debug, Clone)]
pub struct Observation(pub Vec<f32>);

/// What perception sees when one of its casts lands on this entity.
#[derive(Component, Default, Debug, Clone)]
pub struct DetectionTags {
    pub tags: Vec<String>,
    pub label: Option<String>,
    pub velocity: Vec3,
}

impl ClassifiableObject for DetectionTags {
    fn class_tags(&self) -> &[String] {
        &self.tags
    }

    fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    fn velocity(&self) -> CoreVec3 {
        bevy_vector_to_vec3(&self.velocity)
    }
}

/// Resolves provider ids to the sensors stored on their entities.
pub struct SensorSet<'a, 'w, 's, 'q> {
    query: &'a mut Query<'w, 's, &'q mut PerceptionSensor>,
}

impl<'a, 'w, 's, 'q> SensorSet<'a, 'w, 's, 'q> {
    pub fn new(query: &'a mut Query<'w, 's, &'q mut PerceptionSensor>) -> Self {
        Self { query }
    }
}

impl ProviderSet for SensorSet<'_, '_, '_, '_> {
    fn provider_mut(&mut self, id: ProviderId) -> Option<&mut PerceptionProvider> {
        let entity = id.to_entity()?;
        let sensor = self.query.get_mut(entity).ok()?;
        Some(&mut sensor.into_inner().provider)
    }
}

// =========================================================================
// == Plugin ==
// =========================================================================

pub struct PerceptionPlugin;

impl Plugin for PerceptionPlugin {
    fn build(&self, app: &mut App) {
        let config = app
            .world()
            .get_resource::<ScenarioConfig>()
            .cloned()
            .unwrap_or_default();

        let coordinator = PerceptionCoordinator::new(config.coordinator.clone()).unwrap_or_else(|e| {
            error!("Invalid coordinator config ({e}); using defaults.");
            PerceptionCoordinator::default()
        });

        app.insert_resource(Coordinator(coordinator))
            .insert_resource(ReferencePoint(
                config.simulation.reference_point.map(Pos3::from),
            ))
            .insert_resource(TelemetryTimer::from_secs(config.simulation.telemetry_interval))
            .init_resource::<LastTickReport>()
            .add_observer(destroy_removed_sensor)
            .add_systems(
                OnEnter(AppState::SceneBuilding),
                spawn_perception_sensors.in_set(SceneBuildSet::ProcessSensors),
            )
            .add_systems(
                FixedUpdate,
                (
                    (sync_sensor_poses, sync_detection_velocities)
                        .in_set(SimulationSet::Precomputation),
                    start_new_episodes
                        .in_set(SimulationSet::Precomputation)
                        .after(sync_sensor_poses),
                    perception_tick_system.in_set(SimulationSet::Perception),
                    publish_observations.in_set(SimulationSet::Publish),
                ),
            )
            .add_systems(
                Update,
                (record_frame_time, log_perception_telemetry).run_if(in_state(AppState::Running)),
            );
    }
}

// =========================================================================
// == Spawning System ==
// =========================================================================

fn spawn_perception_sensors(
    mut commands: Commands,
    mut coordinator: ResMut<Coordinator>,
    reference: Res<ReferencePoint>,
    request_query: Query<(Entity, &Name, &Transform, &SpawnAgentConfigRequest)>,
) {
    for (agent_entity, agent_name, transform, request) in &request_query {
        let id = ProviderId::from_entity(agent_entity);
        let provider = PerceptionProvider::new(id, request.0.perception.clone())
            .map(|provider| {
                provider
                    .with_owner(ObjectHandle::from_entity(agent_entity))
                    .with_pose(bevy_transform_to_pose(transform))
            })
            .and_then(|mut provider| {
                provider.initialize(&mut coordinator.0)?;
                provider.begin_episode(reference.0)?;
                Ok(provider)
            });

        let provider = match provider {
            Ok(provider) => provider,
            Err(e) => {
                error!(
                    "  -> Skipping perception for agent '{}': {}",
                    agent_name.as_str(),
                    e
                );
                continue;
            }
        };

        info!(
            "  -> Spawning perception for agent '{}': {} rays, observation size {}",
            agent_name.as_str(),
            provider.rays().len(),
            provider.observation_size()
        );
        let observation = Observation(vec![0.0; provider.observation_size()]);
        commands
            .entity(agent_entity)
            .insert((PerceptionSensor { provider }, observation));
    }
}

fn destroy_removed_sensor(
    trigger: Trigger<OnRemove, PerceptionSensor>,
    mut sensors: Query<&mut PerceptionSensor>,
    mut coordinator: ResMut<Coordinator>,
) {
    if let Ok(mut sensor) = sensors.get_mut(trigger.target()) {
        if let Err(e) = sensor.provider.destroy(&mut coordinator.0) {
            debug!("Sensor already destroyed: {e}");
        }
    }
}

// =========================================================================
// == Runtime Systems ==
// =========================================================================

fn sync_sensor_poses(mut sensors: Query<(&Transform, &mut PerceptionSensor)>) {
    for (transform, mut sensor) in &mut sensors {
        sensor.provider.set_pose(bevy_transform_to_pose(transform));
    }
}

fn sync_detection_velocities(mut tagged: Query<(&LinearVelocity, &mut DetectionTags)>) {
    for (velocity, mut tags) in &mut tagged {
        tags.velocity = velocity.0;
    }
}

fn start_new_episodes(
    mut boundaries: EventReader<EpisodeBoundary>,
    reference: Res<ReferencePoint>,
    mut sensors: Query<(&Name, &mut PerceptionSensor)>,
) {
    // Several boundaries in one frame still start a single episode.
    if boundaries.read().last().is_none() {
        return;
    }
    for (name, mut sensor) in &mut sensors {
        if let Err(e) = sensor.provider.begin_episode(reference.0) {
            warn!("Could not restart perception for '{}': {}", name.as_str(), e);
        }
    }
}

/// Feeds auto-tuning one sample per rendered frame. The fixed tick may run
/// zero or several times per frame, so it does not record frame times itself.
fn record_frame_time(real_time: Res<Time<Real>>, mut coordinator: ResMut<Coordinator>) {
    coordinator.0.record_frame_time(real_time.delta_secs() * 1_000.0);
}

fn perception_tick_system(
    time: Res<Time>,
    reference: Res<ReferencePoint>,
    mut coordinator: ResMut<Coordinator>,
    mut report: ResMut<LastTickReport>,
    backend: AvianQueryBackend,
    mut sensors: Query<&mut PerceptionSensor>,
) {
    let frame = FrameInput {
        now: time.elapsed_secs_f64(),
        frame_time_ms: None,
        reference_point: reference.0,
    };
    report.0 = coordinator
        .0
        .tick(&mut SensorSet::new(&mut sensors), &backend, frame);
}

fn publish_observations(mut sensors: Query<(&Name, &PerceptionSensor, &mut Observation)>) {
    for (name, sensor, mut observation) in &mut sensors {
        if let Err(e) = sensor.provider.write_observation(&mut observation.0) {
            debug!("No observation for '{}': {}", name.as_str(), e);
        }
    }
}

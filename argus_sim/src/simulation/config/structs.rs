// argus_sim/src/simulation/config/structs.rs

use argus_core::prelude::{CoordinatorConfig, PerceptionConfig, PerceptionError};
use bevy::prelude::{Quat, Resource, Transform, Vec3};
use serde::Deserialize;

// =========================================================================
// == Top-Level Configuration Resource ==
// =========================================================================

/// # ScenarioConfig
/// The primary Bevy resource holding all configuration for a simulation run.
/// This struct is the root of the data parsed from a `scenario.toml` file.
#[derive(Resource, Debug, Deserialize, Default, Clone)]
#[serde(deny_unknown_fields)] // Fail if the TOML has fields not in our struct
pub struct ScenarioConfig {
    #[serde(default)] // Use default if the [simulation] section is missing
    pub simulation: Simulation,

    /// The shared raycast budget and its auto-tuning targets.
    #[serde(default)]
    pub coordinator: CoordinatorConfig,

    // The TOML has `[[agents]]`, which becomes a Vec of AgentConfig structs.
    #[serde(default)]
    pub agents: Vec<AgentConfig>,

    #[serde(default)]
    pub obstacles: Vec<ObstacleConfig>,

    /// Optional randomly placed obstacles, drawn from the seeded RNG.
    #[serde(default)]
    pub scatter: Option<ScatterConfig>,
}

impl ScenarioConfig {
    /// Checks what must be valid before the app is built. Per-agent
    /// perception configs are checked when their sensors spawn, so a bad
    /// agent is skipped instead of aborting the run.
    pub fn validate(&self) -> Result<(), PerceptionError> {
        self.coordinator.validate()?;
        if !(self.simulation.tick_rate_hz > 0.0) {
            return Err(PerceptionError::InvalidConfig {
                field: "simulation.tick_rate_hz",
                reason: format!("must be positive, got {}", self.simulation.tick_rate_hz),
            });
        }
        Ok(())
    }
}

// =========================================================================
// == Configuration Sub-Structs ==
// =========================================================================

#[derive(Debug, Deserialize, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct Simulation {
    /// Optional seed for the pseudo-random number generator for determinism.
    pub seed: Option<u64>,
    /// Fixed update rate in Hz. Perception ticks once per fixed update.
    pub tick_rate_hz: f64,
    /// Stop after this many fixed ticks. Runs forever when absent.
    pub max_ticks: Option<u64>,
    /// Start a new perception episode every N ticks.
    pub episode_ticks: Option<u64>,
    /// Seconds between telemetry log lines.
    pub telemetry_interval: f32,
    /// The point LOD distances are measured to (e.g. a viewer).
    pub reference_point: Option<[f32; 3]>,
}

impl Default for Simulation {
    fn default() -> Self {
        Self {
            seed: None,
            tick_rate_hz: 60.0,
            max_ticks: None,
            episode_ticks: None,
            telemetry_interval: 1.0,
            reference_point: None,
        }
    }
}

fn default_body_radius() -> f32 {
    0.5
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    pub name: String,
    #[serde(default)]
    pub starting_pose: Pose,
    /// Constant linear velocity in m/s.
    #[serde(default)]
    pub velocity: [f32; 3],
    /// Constant yaw rate in deg/s.
    #[serde(default)]
    pub yaw_rate: f32,
    #[serde(default = "default_body_radius")]
    pub body_radius: f32,
    /// Tags other agents can classify this agent by.
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub perception: PerceptionConfig,
}

// =========================================================================
// == Helper Structs for Nested Configuration ==
// =========================================================================

#[derive(Deserialize, Debug, Clone, Copy, Default, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Pose {
    pub translation: [f32; 3],
    /// Heading about +Y in degrees. Zero faces Bevy's forward (-Z).
    pub yaw: f32,
}

impl Pose {
    pub fn to_bevy_transform(&self) -> Transform {
        let [x, y, z] = self.translation;
        Transform::from_xyz(x, y, z).with_rotation(Quat::from_rotation_y(self.yaw.to_radians()))
    }
}

fn default_layers() -> u32 {
    1
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
#[serde(tag = "type")] // This tells serde to use the "type" field to decide which enum variant to parse
#[serde(rename_all = "PascalCase")]
pub enum ObstacleShape {
    Sphere { radius: f32 },
    Cuboid { half_extents: [f32; 3] },
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct ObstacleConfig {
    #[serde(default)]
    pub name: Option<String>,
    pub shape: ObstacleShape,
    pub position: [f32; 3],
    #[serde(default)]
    pub velocity: [f32; 3],
    /// Detection tags matched against each agent's detection classes.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Reported when no detection class matches.
    #[serde(default)]
    pub label: Option<String>,
    /// Collision layer membership bits.
    #[serde(default = "default_layers")]
    pub layers: u32,
}

impl ObstacleConfig {
    pub fn position(&self) -> Vec3 {
        Vec3::from_array(self.position)
    }

    pub fn velocity(&self) -> Vec3 {
        Vec3::from_array(self.velocity)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct ScatterConfig {
    pub count: usize,
    /// Obstacles are placed uniformly in a disc of this radius around the origin.
    pub area_radius: f32,
    pub min_radius: f32,
    pub max_radius: f32,
    /// Height of every scattered obstacle's centre.
    pub height: f32,
    /// Each obstacle gets one tag, chosen uniformly from this list.
    pub tags: Vec<String>,
    pub max_speed: f32,
}

impl Default for ScatterConfig {
    fn default() -> Self {
        Self {
            count: 0,
            area_radius: 30.0,
            min_radius: 0.3,
            max_radius: 1.5,
            height: 0.5,
            tags: Vec::new(),
            max_speed: 0.0,
        }
    }
}

// argus_sim/src/simulation/plugins/world/spawner.rs

use std::f32::consts::TAU;

use avian3d::prelude::*;
use rand::seq::SliceRandom;
use rand::Rng;

use crate::prelude::*;
use crate::simulation::config::structs::{ObstacleShape, ScatterConfig};
use crate::simulation::core::prng::SimulationRng;
use crate::simulation::plugins::perception::DetectionTags;

pub struct WorldSpawnerPlugin;

impl Plugin for WorldSpawnerPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(
            OnEnter(AppState::SceneBuilding),
            spawn_obstacles.in_set(SceneBuildSet::World),
        );
    }
}

/// Spawns the configured obstacles, then the scattered ones.
fn spawn_obstacles(
    mut commands: Commands,
    config: Res<ScenarioConfig>,
    mut rng: ResMut<SimulationRng>,
) {
    let scattered = config
        .scatter
        .as_ref()
        .map(|scatter| scatter_obstacles(scatter, &mut rng.0))
        .unwrap_or_default();

    info!(
        "[WORLD] Spawning {} configured and {} scattered obstacle(s).",
        config.obstacles.len(),
        scattered.len()
    );

    for (index, obstacle) in config.obstacles.iter().chain(&scattered).enumerate() {
        let name = obstacle
            .name
            .clone()
            .unwrap_or_else(|| format!("obstacle_{index}"));
        let collider = match obstacle.shape {
            ObstacleShape::Sphere { radius } => Collider::sphere(radius),
            ObstacleShape::Cuboid { half_extents: [x, y, z] } => {
                Collider::cuboid(2.0 * x, 2.0 * y, 2.0 * z)
            }
        };
        commands.spawn((
            Name::new(name),
            Transform::from_translation(obstacle.position()),
            RigidBody::Kinematic,
            collider,
            CollisionLayers::from_bits(obstacle.layers, u32::MAX),
            LinearVelocity(obstacle.velocity()),
            DetectionTags {
                tags: obstacle.tags.clone(),
                label: obstacle.label.clone(),
                velocity: obstacle.velocity(),
            },
        ));
    }
}

/// Draws `scatter.count` spherical obstacles, uniformly over a disc.
pub fn scatter_obstacles<R: Rng>(scatter: &ScatterConfig, rng: &mut R) -> Vec<ObstacleConfig> {
    let min_radius = scatter.min_radius.max(0.01);
    let max_radius = scatter.max_radius.max(min_radius);

    (0..scatter.count)
        .map(|i| {
            // sqrt keeps the density uniform over the disc's area
            let r = scatter.area_radius * rng.gen::<f32>().sqrt();
            let theta = rng.gen_range(0.0..TAU);
            let radius = rng.gen_range(min_radius..=max_radius);
            let speed = if scatter.max_speed > 0.0 {
                rng.gen_range(0.0..=scatter.max_speed)
            } else {
                0.0
            };
            let heading = rng.gen_range(0.0..TAU);
            let tag = scatter.tags.choose(rng).cloned();

            ObstacleConfig {
                name: Some(format!("scatter_{i}")),
                shape: ObstacleShape::Sphere { radius },
                position: [r * theta.cos(), scatter.height, r * theta.sin()],
                velocity: [speed * heading.cos(), 0.0, speed * heading.sin()],
                label: tag.clone(),
                tags: tag.into_iter().collect(),
                layers: 1,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn scatter() -> ScatterConfig {
        ScatterConfig {
            count: 20,
            area_radius: 10.0,
            tags: vec!["Target".into(), "Wall".into()],
            max_speed: 2.0,
            ..Default::default()
        }
    }

    #[test]
    fn scatter_is_deterministic_per_seed() {
        let a = scatter_obstacles(&scatter(), &mut ChaCha8Rng::seed_from_u64(9));
        let b = scatter_obstacles(&scatter(), &mut ChaCha8Rng::seed_from_u64(9));
        let positions = |v: &[ObstacleConfig]| v.iter().map(|o| o.position).collect::<Vec<_>>();
        assert_eq!(positions(&a), positions(&b));
    }

    #[test]
    fn scatter_respects_bounds() {
        let config = scatter();
        let obstacles = scatter_obstacles(&config, &mut ChaCha8Rng::seed_from_u64(1));
        assert_eq!(obstacles.len(), 20);
        for obstacle in &obstacles {
            let [x, y, z] = obstacle.position;
            assert!((x * x + z * z).sqrt() <= config.area_radius + 1e-4);
            assert_eq!(y, config.height);
            assert!(obstacle.velocity().length() <= config.max_speed + 1e-4);
            let ObstacleShape::Sphere { radius } = obstacle.shape else {
                panic!("scatter only makes spheres");
            };
            assert!((config.min_radius..=config.max_radius).contains(&radius));
            assert_eq!(obstacle.tags.len(), 1);
        }
    }

    #[test]
    fn untagged_scatter_has_no_tags() {
        let config = ScatterConfig {
            count: 3,
            ..Default::default()
        };
        let obstacles = scatter_obstacles(&config, &mut ChaCha8Rng::seed_from_u64(2));
        assert!(obstacles.iter().all(|o| o.tags.is_empty() && o.label.is_none()));
    }
}

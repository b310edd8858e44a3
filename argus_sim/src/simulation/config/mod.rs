// argus_sim/src/simulation/config/mod.rs

//! Loads the scenario file and applies command-line overrides.

pub mod structs;

use std::path::Path;

use bevy::prelude::*;
use figment::{
    providers::{Format, Toml},
    Figment,
};

use crate::cli::Cli;
use crate::prelude::AppState;
pub use structs::{AgentConfig, ObstacleConfig, ObstacleShape, ScatterConfig, ScenarioConfig};

/// Reads and deserializes a scenario TOML file.
pub fn load_scenario(path: &Path) -> Result<ScenarioConfig, figment::Error> {
    Figment::new().merge(Toml::file_exact(path)).extract()
}

/// Loads the scenario named by `cli` and applies its overrides.
pub fn load_from_cli(cli: &Cli) -> Result<ScenarioConfig, figment::Error> {
    let mut config = load_scenario(&cli.scenario)?;
    if let Some(seed) = cli.seed {
        config.simulation.seed = Some(seed);
    }
    if let Some(ticks) = cli.ticks {
        config.simulation.max_ticks = Some(ticks);
    }
    Ok(config)
}

pub struct ConfigPlugin;

impl Plugin for ConfigPlugin {
    fn build(&self, app: &mut App) {
        app
            // The scenario is normally inserted by the binary before the
            // plugin is added; fall back to an empty one.
            .init_resource::<ScenarioConfig>()
            .add_systems(
                OnEnter(AppState::AssetLoading),
                (log_scenario_summary, transition_to_scene_building).chain(),
            );
    }
}

fn log_scenario_summary(config: Res<ScenarioConfig>) {
    info!(
        "Scenario: {} agent(s), {} obstacle(s), {} scattered, ceiling {} casts/tick",
        config.agents.len(),
        config.obstacles.len(),
        config.scatter.as_ref().map_or(0, |s| s.count),
        config.coordinator.max_concurrent_raycasts
    );
}

fn transition_to_scene_building(mut next_state: ResMut<NextState<AppState>>) {
    info!("Configuration loaded. Transitioning to SceneBuilding state.");
    next_state.set(AppState::SceneBuilding);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn figment_reads_inline_toml() {
        let config: ScenarioConfig = Figment::new()
            .merge(Toml::string("[simulation]\nseed = 3\n[[agents]]\nname = \"a\"\n"))
            .extract()
            .unwrap();
        assert_eq!(config.simulation.seed, Some(3));
        assert_eq!(config.agents[0].perception.ray_count, 16);
    }

    #[test]
    fn shipped_scenario_loads_and_validates() {
        use argus_core::prelude::{PerceptionProvider, ProviderId};

        let path = Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("../assets/scenarios/perception_showcase.toml");
        let config = load_scenario(&path).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.agents.len(), 3);
        for (i, agent) in config.agents.iter().enumerate() {
            assert!(
                PerceptionProvider::new(ProviderId(i as u64), agent.perception.clone()).is_ok(),
                "agent {} has an invalid perception config",
                agent.name
            );
        }
    }

    #[test]
    fn cli_overrides_win() {
        let cli = Cli {
            scenario: Path::new(env!("CARGO_MANIFEST_DIR"))
                .join("../assets/scenarios/perception_showcase.toml"),
            seed: Some(1),
            ticks: Some(5),
        };
        let config = load_from_cli(&cli).unwrap();
        assert_eq!(config.simulation.seed, Some(1));
        assert_eq!(config.simulation.max_ticks, Some(5));
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(load_scenario(Path::new("does/not/exist.toml")).is_err());
    }
}

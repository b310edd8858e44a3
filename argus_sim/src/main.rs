// argus_sim/src/main.rs

use argus_sim::cli::Cli;
use argus_sim::simulation::config::load_from_cli;
use argus_sim::ArgusSimulationPlugin;
use avian3d::prelude::*;
use bevy::{log::LogPlugin, prelude::*, state::app::StatesPlugin};
use clap::Parser;

fn main() -> AppExit {
    let cli = Cli::parse();

    // Set up the Bevy App. Headless: no window, no renderer.
    let mut app = App::new();
    app.add_plugins((
        MinimalPlugins,
        LogPlugin {
            level: bevy::log::Level::INFO,
            // Per-sensor telemetry is logged at debug; raise argus_sim to see it.
            filter: "info,argus_sim=info,argus_core=info".to_string(),
            ..Default::default()
        },
        TransformPlugin,
        StatesPlugin,
        AssetPlugin::default(),
        bevy::scene::ScenePlugin,
        bevy::render::mesh::MeshPlugin,
        PhysicsPlugins::default(),
    ))
    // No gravity: agents and obstacles are kinematic.
    .insert_resource(Gravity(Vec3::ZERO));

    // --- Load Configuration ---
    let scenario = match load_from_cli(&cli) {
        Ok(scenario) => scenario,
        Err(e) => {
            error!("Failed to load scenario '{}': {e}", cli.scenario.display());
            return AppExit::error();
        }
    };
    if let Err(e) = scenario.validate() {
        error!("Invalid scenario '{}': {e}", cli.scenario.display());
        return AppExit::error();
    }
    info!("Loaded scenario from '{}'", cli.scenario.display());

    // The scenario must exist before the simulation plugins read it.
    app.insert_resource(scenario)
        .insert_resource(cli)
        .add_plugins(ArgusSimulationPlugin)
        .run()
}

// argus_sim/src/cli.rs

use bevy::prelude::Resource;
use clap::Parser;
use std::path::PathBuf;

/// Argus: a headless multi-agent perception sandbox.
///
/// Runs a scenario of agents sweeping ray fans over a physics world under a
/// shared raycast budget.
#[derive(Parser, Debug, Resource, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// The path to the scenario TOML file to run.
    #[arg(
        short,
        long,
        default_value = "assets/scenarios/perception_showcase.toml"
    )]
    pub scenario: PathBuf,

    /// Override the scenario's RNG seed.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Stop after this many fixed ticks.
    #[arg(long)]
    pub ticks: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_parse() {
        let cli = Cli::parse_from(["argus", "-s", "a.toml", "--seed", "5", "--ticks", "10"]);
        assert_eq!(cli.scenario, PathBuf::from("a.toml"));
        assert_eq!(cli.seed, Some(5));
        assert_eq!(cli.ticks, Some(10));
    }
}

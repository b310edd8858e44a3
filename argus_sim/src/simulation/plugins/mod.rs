// argus_sim/src/simulation/plugins/mod.rs

pub mod perception;
pub mod world;

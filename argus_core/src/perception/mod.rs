// argus_core/src/perception/mod.rs

//! The multi-ray perception engine.
//!
//! Leaves first: `ray_fan` generates directions, `backend` is the scene-query
//! seam, `classifier` tags hits, `encoder` turns a hit buffer into a
//! fixed-length vector, `lod` and `scheduler` decide how much work a provider
//! does per tick, `provider` ties those together for one perceiver, and
//! `coordinator` shares a cast budget across all of them.

pub mod backend;
pub mod classifier;
pub mod coordinator;
pub mod encoder;
pub mod hit;
pub mod lod;
pub mod provider;
pub mod ray_fan;
pub mod scene;
pub mod scheduler;
pub mod spatial_grid;
pub mod telemetry;

// argus_sim/src/simulation/core/transforms.rs

//! Conversions between Bevy transforms and the engine's nalgebra poses.
//!
//! World axes are shared: both use +Y up, so positions and velocities pass
//! through unchanged. Only the body frame differs. A perceiver looks down its
//! local +Z while a Bevy entity faces its local -Z, so every body rotation is
//! composed with a half turn about +Y on the way in and out.

use argus_core::prelude::{Pos3, Pose, Vec3};
use bevy::prelude::{GlobalTransform, Quat as BevyQuat, Transform as BevyTransform, Vec3 as BevyVec3};
use nalgebra::{Quaternion, Translation3, UnitQuaternion};
use std::f32::consts::PI;

/// Rotation from the sensor body frame (+Z forward) to the Bevy body frame
/// (-Z forward).
pub fn sensor_frame_offset() -> UnitQuaternion<f32> {
    UnitQuaternion::from_axis_angle(&Vec3::y_axis(), PI)
}

pub fn bevy_vector_to_vec3(v: &BevyVec3) -> Vec3 {
    Vec3::new(v.x, v.y, v.z)
}

pub fn vec3_to_bevy_vector(v: &Vec3) -> BevyVec3 {
    BevyVec3::new(v.x, v.y, v.z)
}

pub fn bevy_point_to_pos3(p: &BevyVec3) -> Pos3 {
    Pos3::new(p.x, p.y, p.z)
}

pub fn pos3_to_bevy_point(p: &Pos3) -> BevyVec3 {
    BevyVec3::new(p.x, p.y, p.z)
}

pub fn bevy_quat_to_nalgebra(q: &BevyQuat) -> UnitQuaternion<f32> {
    // nalgebra's Quaternion::new is (w, x, y, z)
    UnitQuaternion::from_quaternion(Quaternion::new(q.w, q.x, q.y, q.z))
}

pub fn nalgebra_quat_to_bevy(q: &UnitQuaternion<f32>) -> BevyQuat {
    BevyQuat::from_xyzw(q.coords.x, q.coords.y, q.coords.z, q.coords.w)
}

/// Converts an entity's transform into the pose of a sensor mounted on it.
pub fn bevy_transform_to_pose(transform: &BevyTransform) -> Pose {
    let rotation = bevy_quat_to_nalgebra(&transform.rotation) * sensor_frame_offset();
    Pose::from_parts(
        Translation3::from(bevy_vector_to_vec3(&transform.translation)),
        rotation,
    )
}

pub fn bevy_global_transform_to_pose(transform: &GlobalTransform) -> Pose {
    bevy_transform_to_pose(&transform.compute_transform())
}

/// Inverse of [`bevy_transform_to_pose`]. Scale is reset to one.
pub fn pose_to_bevy_transform(pose: &Pose) -> BevyTransform {
    let rotation = pose.rotation * sensor_frame_offset().inverse();
    BevyTransform {
        translation: vec3_to_bevy_vector(&pose.translation.vector),
        rotation: nalgebra_quat_to_bevy(&rotation),
        scale: BevyVec3::ONE,
    }
}

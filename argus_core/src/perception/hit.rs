// argus_core/src/perception/hit.rs

use std::sync::Arc;

use crate::types::{ObjectHandle, Pos3, Vec3};

/// The stored result of one ray for one sweep.
///
/// `distance` is normalized to `[0, 1]` when the owning provider normalizes,
/// raw otherwise. A miss always has the miss distance and zero importance.
#[derive(Debug, Clone, PartialEq)]
pub struct HitResult {
    pub has_hit: bool,
    pub distance: f32,
    /// Signed horizontal angle of the ray, in degrees.
    pub angle: f32,
    /// The configured class this hit matched, as an index into the
    /// provider's class list.
    pub class_index: Option<usize>,
    pub class_label: Option<Arc<str>>,
    pub hit_point: Pos3,
    pub hit_normal: Vec3,
    pub object: Option<ObjectHandle>,
    pub importance: f32,
    pub velocity: Vec3,
}

impl HitResult {
    pub fn miss(distance: f32, angle: f32) -> Self {
        Self {
            has_hit: false,
            distance,
            angle,
            class_index: None,
            class_label: None,
            hit_point: Pos3::origin(),
            hit_normal: Vec3::zeros(),
            object: None,
            importance: 0.0,
            velocity: Vec3::zeros(),
        }
    }

    /// The class label, or an empty string when unclassified.
    pub fn label(&self) -> &str {
        self.class_label.as_deref().unwrap_or("")
    }

    /// Turns this slot back into a miss, keeping its allocation.
    pub fn reset_to_miss(&mut self, distance: f32, angle: f32) {
        *self = Self::miss(distance, angle);
    }
}

// argus_core/src/perception/encoder.rs

//! Serializes a provider's hit buffer into a fixed-length observation.
//!
//! Layout, in order:
//! 1. per ray slot (every slot of every layer, active or not):
//!    `[distance] [angle / 180] [material]` as enabled by `ObservationFlags`;
//! 2. per detection class, in configuration order:
//!    `[distance] [angle / 180] [vx vy vz]` as enabled by the class.
//!
//! The length depends only on configuration, never on which rays ran.

use crate::config::{DetectionClass, ObservationFlags};
use crate::perception::hit::HitResult;

/// Number of floats produced for `ray_slots` rays and `classes`.
pub fn observation_size(ray_slots: usize, flags: &ObservationFlags, classes: &[DetectionClass]) -> usize {
    ray_slots * flags.per_ray_width()
        + classes.iter().map(DetectionClass::observation_width).sum::<usize>()
}

/// The closest hit tagged with `class_index`, within `max_tracking_distance`
/// (raw units). Ties go to the lowest ray index.
pub fn closest_of_class<'a>(
    hits: &'a [HitResult],
    class_index: usize,
    max_tracking_distance: f32,
    to_raw: impl Fn(f32) -> f32,
) -> Option<(usize, &'a HitResult)> {
    let mut best: Option<(usize, &HitResult)> = None;
    for (i, hit) in hits.iter().enumerate() {
        if !hit.has_hit || hit.class_index != Some(class_index) {
            continue;
        }
        if to_raw(hit.distance) > max_tracking_distance {
            continue;
        }
        match best {
            Some((_, current)) if current.distance <= hit.distance => {}
            _ => best = Some((i, hit)),
        }
    }
    best
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObservationEncoder {
    pub flags: ObservationFlags,
    pub normalize: bool,
    pub max_distance: f32,
}

impl ObservationEncoder {
    pub fn new(flags: ObservationFlags, normalize: bool, max_distance: f32) -> Self {
        Self {
            flags,
            normalize,
            max_distance,
        }
    }

    /// The distance every miss reports.
    pub fn miss_distance(&self) -> f32 {
        if self.normalize {
            1.0
        } else {
            self.max_distance
        }
    }

    /// Converts a raw world distance into the stored representation.
    pub fn store_distance(&self, raw: f32) -> f32 {
        if self.normalize {
            (raw / self.max_distance).clamp(0.0, 1.0)
        } else {
            raw
        }
    }

    /// Converts a stored distance back into world units.
    pub fn raw_distance(&self, stored: f32) -> f32 {
        if self.normalize {
            stored * self.max_distance
        } else {
            stored
        }
    }

    pub fn size(&self, ray_slots: usize, classes: &[DetectionClass]) -> usize {
        observation_size(ray_slots, &self.flags, classes)
    }

    pub fn encode(&self, hits: &[HitResult], classes: &[DetectionClass]) -> Vec<f32> {
        let mut out = vec![0.0; self.size(hits.len(), classes)];
        self.encode_into(hits, classes, &mut out);
        out
    }

    /// Writes the observation into `out`, which must be exactly
    /// `self.size(hits.len(), classes)` long.
    pub fn encode_into(&self, hits: &[HitResult], classes: &[DetectionClass], out: &mut [f32]) {
        debug_assert_eq!(out.len(), self.size(hits.len(), classes));
        let class_count = classes.len() as f32;
        let mut cursor = 0;
        let mut push = |value: f32| {
            out[cursor] = value;
            cursor += 1;
        };

        for hit in hits {
            if self.flags.distance {
                push(hit.distance);
            }
            if self.flags.angle {
                push(hit.angle / 180.0);
            }
            if self.flags.material {
                push(match hit.class_index {
                    Some(index) if hit.has_hit => (index + 1) as f32 / class_count,
                    _ => 0.0,
                });
            }
        }

        for (index, class) in classes.iter().enumerate() {
            let closest = closest_of_class(hits, index, class.max_tracking_distance, |d| {
                self.raw_distance(d)
            })
            .map(|(_, hit)| hit);
            if class.track_distance {
                push(closest.map_or(self.miss_distance(), |hit| hit.distance));
            }
            if class.track_angle {
                push(closest.map_or(0.0, |hit| hit.angle / 180.0));
            }
            if class.track_velocity {
                let velocity = closest.map(|hit| hit.velocity).unwrap_or_default();
                push(velocity.x);
                push(velocity.y);
                push(velocity.z);
            }
        }
    }

    /// The shape-preserving output of a disabled or inactive provider.
    pub fn zeros(&self, ray_slots: usize, classes: &[DetectionClass]) -> Vec<f32> {
        vec![0.0; self.size(ray_slots, classes)]
    }
}

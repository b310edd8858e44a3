// argus_core/src/perception/ray_fan.rs

//! Ray fan geometry.
//!
//! Directions live in the perceiver's local frame: `+Z` forward, `+Y` up,
//! positive horizontal angles turn toward `+X`.

use nalgebra::Unit;

use crate::config::PerceptionConfig;
use crate::types::Vec3;

/// One cast direction of a fan.
#[derive(Debug, Clone, PartialEq)]
pub struct RayDescriptor {
    pub direction: Unit<Vec3>,
    /// Signed horizontal angle in degrees.
    pub horizontal_angle: f32,
    /// Signed vertical angle in degrees.
    pub vertical_angle: f32,
    /// False when the current LOD level leaves this ray out.
    pub active: bool,
}

/// The parameters that fully determine a fan. Two equal parameter sets always
/// produce the same rays, so this doubles as the cache key.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayFanParams {
    pub ray_count: u32,
    pub fov_degrees: f32,
    pub angle_offset: f32,
    pub vertical_layers: u32,
    pub vertical_min: f32,
    pub vertical_max: f32,
}

impl From<&PerceptionConfig> for RayFanParams {
    fn from(cfg: &PerceptionConfig) -> Self {
        Self {
            ray_count: cfg.ray_count,
            fov_degrees: cfg.fov_degrees,
            angle_offset: cfg.angle_offset,
            vertical_layers: cfg.vertical_layers,
            vertical_min: cfg.vertical_min,
            vertical_max: cfg.vertical_max,
        }
    }
}

/// Unit direction for a pair of angles in degrees.
pub fn direction_from_angles(horizontal_deg: f32, vertical_deg: f32) -> Unit<Vec3> {
    let (h, v) = (horizontal_deg.to_radians(), vertical_deg.to_radians());
    Unit::new_normalize(Vec3::new(h.sin() * v.cos(), v.sin(), h.cos() * v.cos()))
}

/// Horizontal angle of ray `i` in a fan of `ray_count` rays.
///
/// A single ray points along the offset.
pub fn horizontal_angle(i: u32, ray_count: u32, fov_degrees: f32, angle_offset: f32) -> f32 {
    if ray_count <= 1 {
        return angle_offset;
    }
    (fov_degrees / ray_count as f32) * i as f32 - fov_degrees / 2.0 + angle_offset
}

/// Vertical angle of layer `v` out of `layers`.
pub fn vertical_angle(v: u32, layers: u32, vertical_min: f32, vertical_max: f32) -> f32 {
    if layers <= 1 {
        return vertical_min;
    }
    let t = v as f32 / (layers - 1) as f32;
    vertical_min + (vertical_max - vertical_min) * t
}

/// Generates the fan, ordered layer-major and ray-minor: ray `i` of layer `v`
/// sits at index `v * ray_count + i`. All rays start active.
pub fn generate(params: &RayFanParams) -> Vec<RayDescriptor> {
    let layers = params.vertical_layers.max(1);
    let mut rays = Vec::with_capacity(params.ray_count as usize * layers as usize);
    for v in 0..layers {
        let vertical = vertical_angle(v, layers, params.vertical_min, params.vertical_max);
        for i in 0..params.ray_count {
            let horizontal =
                horizontal_angle(i, params.ray_count, params.fov_degrees, params.angle_offset);
            rays.push(RayDescriptor {
                direction: direction_from_angles(horizontal, vertical),
                horizontal_angle: horizontal,
                vertical_angle: vertical,
                active: true,
            });
        }
    }
    rays
}

/// Picks `active` evenly strided ray positions out of `per_layer`.
fn strided(per_layer: usize, active: usize) -> impl Iterator<Item = usize> {
    (0..active).map(move |j| j * per_layer / active)
}

/// A generated fan plus the LOD slice currently in use.
///
/// The descriptor list is only rebuilt when the fan parameters change; LOD
/// transitions just flip `active` flags.
#[derive(Debug, Clone)]
pub struct RayFan {
    params: RayFanParams,
    rays: Vec<RayDescriptor>,
    active_per_layer: usize,
    active_indices: Vec<usize>,
}

impl RayFan {
    pub fn new(params: RayFanParams) -> Self {
        let rays = generate(&params);
        let per_layer = params.ray_count as usize;
        let mut fan = Self {
            params,
            rays,
            active_per_layer: per_layer,
            active_indices: Vec::new(),
        };
        fan.reslice(per_layer);
        fan
    }

    /// Regenerates when `params` differ from the cached ones. Returns true
    /// when the rays were rebuilt.
    pub fn ensure(&mut self, params: RayFanParams) -> bool {
        if params == self.params {
            return false;
        }
        let active = self.active_per_layer.min(params.ray_count as usize);
        self.params = params;
        self.rays = generate(&params);
        self.reslice(active);
        true
    }

    /// Marks `active_per_layer` rays of every layer as active.
    pub fn reslice(&mut self, active_per_layer: usize) {
        let per_layer = self.params.ray_count as usize;
        let active = active_per_layer.clamp(1, per_layer.max(1));
        self.active_per_layer = active;

        for ray in &mut self.rays {
            ray.active = false;
        }
        self.active_indices.clear();
        for layer in 0..self.params.vertical_layers.max(1) as usize {
            for i in strided(per_layer, active) {
                let index = layer * per_layer + i;
                self.rays[index].active = true;
                self.active_indices.push(index);
            }
        }
    }

    pub fn params(&self) -> &RayFanParams {
        &self.params
    }

    pub fn rays(&self) -> &[RayDescriptor] {
        &self.rays
    }

    pub fn len(&self) -> usize {
        self.rays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rays.is_empty()
    }

    /// Active horizontal rays per layer.
    pub fn active_per_layer(&self) -> usize {
        self.active_per_layer
    }

    /// Ascending indices of active rays across all layers.
    pub fn active_indices(&self) -> &[usize] {
        &self.active_indices
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn flat(ray_count: u32, fov: f32, offset: f32) -> RayFanParams {
        RayFanParams {
            ray_count,
            fov_degrees: fov,
            angle_offset: offset,
            vertical_layers: 1,
            vertical_min: 0.0,
            vertical_max: 0.0,
        }
    }

    #[test]
    fn single_ray_points_along_offset() {
        let rays = generate(&flat(1, 90.0, 30.0));
        assert_eq!(rays.len(), 1);
        assert_abs_diff_eq!(rays[0].horizontal_angle, 30.0);
        let expected = direction_from_angles(30.0, 0.0);
        assert_abs_diff_eq!(rays[0].direction.x, expected.x, epsilon = 1e-6);
        assert_abs_diff_eq!(rays[0].direction.z, expected.z, epsilon = 1e-6);
    }

    #[test]
    fn full_circle_is_evenly_spaced_and_balanced() {
        let rays = generate(&flat(8, 360.0, 0.0));
        for pair in rays.windows(2) {
            assert_abs_diff_eq!(pair[1].horizontal_angle - pair[0].horizontal_angle, 45.0, epsilon = 1e-4);
        }
        let sum: Vec3 = rays.iter().map(|r| r.direction.into_inner()).sum();
        assert!(sum.norm() < 1e-4, "sum of directions was {sum:?}");
    }

    #[test]
    fn odd_full_circle_is_balanced() {
        let rays = generate(&flat(5, 360.0, 17.0));
        let sum: Vec3 = rays.iter().map(|r| r.direction.into_inner()).sum();
        assert!(sum.norm() < 1e-4);
    }

    #[test]
    fn half_fan_contains_forward_ray() {
        let rays = generate(&flat(16, 180.0, 0.0));
        assert_abs_diff_eq!(rays[0].horizontal_angle, -90.0);
        assert_abs_diff_eq!(rays[8].horizontal_angle, 0.0);
        assert_abs_diff_eq!(rays[8].direction.z, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn directions_are_unit_length() {
        let params = RayFanParams {
            vertical_layers: 3,
            vertical_min: -20.0,
            vertical_max: 40.0,
            ..flat(7, 200.0, -15.0)
        };
        for ray in generate(&params) {
            assert_abs_diff_eq!(ray.direction.norm(), 1.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn layers_are_layer_major() {
        let params = RayFanParams {
            vertical_layers: 3,
            vertical_min: -10.0,
            vertical_max: 10.0,
            ..flat(4, 90.0, 0.0)
        };
        let rays = generate(&params);
        assert_eq!(rays.len(), 12);
        assert_abs_diff_eq!(rays[0].vertical_angle, -10.0);
        assert_abs_diff_eq!(rays[4].vertical_angle, 0.0);
        assert_abs_diff_eq!(rays[11].vertical_angle, 10.0);
        assert_abs_diff_eq!(rays[5].horizontal_angle, rays[1].horizontal_angle);
    }

    #[test]
    fn reslice_keeps_indices_and_spreads_over_fov() {
        let mut fan = RayFan::new(flat(16, 180.0, 0.0));
        let before = fan.rays().to_vec();
        fan.reslice(4);
        assert_eq!(fan.len(), 16);
        assert_eq!(fan.active_indices(), &[0, 4, 8, 12]);
        for (old, new) in before.iter().zip(fan.rays()) {
            assert_eq!(old.direction, new.direction);
        }
        assert_eq!(fan.rays().iter().filter(|r| r.active).count(), 4);
    }

    #[test]
    fn reslice_applies_per_layer() {
        let params = RayFanParams {
            vertical_layers: 2,
            vertical_min: 0.0,
            vertical_max: 10.0,
            ..flat(6, 120.0, 0.0)
        };
        let mut fan = RayFan::new(params);
        fan.reslice(3);
        assert_eq!(fan.active_indices(), &[0, 2, 4, 6, 8, 10]);
    }

    #[test]
    fn ensure_only_regenerates_on_change() {
        let mut fan = RayFan::new(flat(8, 90.0, 0.0));
        assert!(!fan.ensure(flat(8, 90.0, 0.0)));
        assert!(fan.ensure(flat(8, 120.0, 0.0)));
        assert_abs_diff_eq!(fan.rays()[0].horizontal_angle, -60.0);
    }
}

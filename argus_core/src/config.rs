// argus_core/src/config.rs

//! Declarative configuration records for perceivers and the coordinator.
//!
//! Records are loaded once (a provider's at construction, the coordinator's at
//! startup) and then checked with `validate`, which either returns a corrected
//! copy (logging a warning per correction) or rejects values that cannot be
//! repaired safely.

use serde::Deserialize;
use tracing::warn;

use crate::error::PerceptionError;
use crate::types::{LayerMask, ProviderId};

// =========================================================================
// == Cast Modes ==
// =========================================================================

/// The geometric primitive used for one scene query.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Default)]
#[serde(tag = "type")] // `type = "Sphere"` selects the variant
#[serde(rename_all = "PascalCase")]
pub enum CastMode {
    #[default]
    Ray,
    Sphere {
        radius: f32,
    },
    Capsule {
        radius: f32,
        half_height: f32,
    },
    Box {
        half_extents: [f32; 3],
    },
    /// Stationary query: ignores the ray direction and reports the nearest
    /// object within `max_distance` of the origin.
    Overlap,
}

impl CastMode {
    pub fn name(&self) -> &'static str {
        match self {
            CastMode::Ray => "Ray",
            CastMode::Sphere { .. } => "Sphere",
            CastMode::Capsule { .. } => "Capsule",
            CastMode::Box { .. } => "Box",
            CastMode::Overlap => "Overlap",
        }
    }
}

// =========================================================================
// == Detection Classes ==
// =========================================================================

fn default_importance() -> f32 {
    1.0
}

fn default_true() -> bool {
    true
}

fn unlimited() -> f32 {
    f32::INFINITY
}

/// One class of objects a perceiver tracks, matched against object tags.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DetectionClass {
    pub name: String,
    #[serde(default = "default_importance")]
    pub importance: f32,
    #[serde(default = "default_true")]
    pub track_distance: bool,
    #[serde(default = "default_true")]
    pub track_angle: bool,
    #[serde(default)]
    pub track_velocity: bool,
    /// Hits farther than this never feed the per-class observation.
    #[serde(default = "unlimited")]
    pub max_tracking_distance: f32,
}

impl DetectionClass {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            importance: default_importance(),
            track_distance: true,
            track_angle: true,
            track_velocity: false,
            max_tracking_distance: unlimited(),
        }
    }

    pub fn with_importance(mut self, importance: f32) -> Self {
        self.importance = importance;
        self
    }

    pub fn with_velocity(mut self) -> Self {
        self.track_velocity = true;
        self
    }

    /// Number of floats this class contributes to the observation vector.
    pub fn observation_width(&self) -> usize {
        usize::from(self.track_distance) + usize::from(self.track_angle) + 3 * usize::from(self.track_velocity)
    }
}

// =========================================================================
// == LOD Table ==
// =========================================================================

fn one() -> f32 {
    1.0
}

/// A distance-indexed tier controlling ray density and refresh rate.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LodLevel {
    pub name: String,
    pub min_distance: f32,
    pub max_distance: f32,
    #[serde(default = "one")]
    pub ray_count_multiplier: f32,
    #[serde(default = "one")]
    pub update_frequency_multiplier: f32,
    /// Overrides the provider's cast mode while this level is active.
    #[serde(default)]
    pub cast_mode: Option<CastMode>,
}

impl LodLevel {
    pub fn new(name: impl Into<String>, min_distance: f32, max_distance: f32) -> Self {
        Self {
            name: name.into(),
            min_distance,
            max_distance,
            ray_count_multiplier: 1.0,
            update_frequency_multiplier: 1.0,
            cast_mode: None,
        }
    }

    pub fn with_multipliers(mut self, rays: f32, interval: f32) -> Self {
        self.ray_count_multiplier = rays;
        self.update_frequency_multiplier = interval;
        self
    }

    pub fn contains(&self, distance: f32) -> bool {
        distance >= self.min_distance && distance < self.max_distance
    }
}

// =========================================================================
// == Provider Configuration ==
// =========================================================================

/// Which per-ray features the encoder emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ObservationFlags {
    pub distance: bool,
    pub angle: bool,
    pub material: bool,
}

impl Default for ObservationFlags {
    fn default() -> Self {
        Self {
            distance: true,
            angle: false,
            material: false,
        }
    }
}

impl ObservationFlags {
    pub fn per_ray_width(&self) -> usize {
        usize::from(self.distance) + usize::from(self.angle) + usize::from(self.material)
    }
}

/// How a provider spreads its sweep over ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(tag = "type")]
#[serde(rename_all = "PascalCase")]
pub enum ScheduleMode {
    /// Every active ray is cast on every due tick.
    #[default]
    Synchronous,
    /// A rotating window of `rays_per_tick` rays is cast on every due tick.
    Asynchronous { rays_per_tick: u32 },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PerceptionConfig {
    /// Horizontal rays per vertical layer.
    pub ray_count: u32,
    pub fov_degrees: f32,
    pub angle_offset: f32,
    pub vertical_layers: u32,
    pub vertical_min: f32,
    pub vertical_max: f32,
    pub max_distance: f32,
    pub cast_mode: CastMode,
    pub layer_mask: LayerMask,
    /// Normalize distances into `[0, 1]` by `max_distance`.
    pub normalize: bool,
    pub observe: ObservationFlags,
    /// Order matters: classification is first-match.
    pub classes: Vec<DetectionClass>,
    pub lod_levels: Vec<LodLevel>,
    pub lod_hysteresis: f32,
    pub lod_evaluation_interval: f32,
    /// Seconds between sweeps (before LOD scaling).
    pub update_interval: f32,
    /// Skip a sweep while the origin moved less than this. `0` disables caching.
    pub cache_radius: f32,
    pub cache_max_age: f32,
    pub schedule: ScheduleMode,
}

impl Default for PerceptionConfig {
    fn default() -> Self {
        Self {
            ray_count: 16,
            fov_degrees: 120.0,
            angle_offset: 0.0,
            vertical_layers: 1,
            vertical_min: 0.0,
            vertical_max: 0.0,
            max_distance: 20.0,
            cast_mode: CastMode::Ray,
            layer_mask: LayerMask::ALL,
            normalize: true,
            observe: ObservationFlags::default(),
            classes: Vec::new(),
            lod_levels: Vec::new(),
            lod_hysteresis: 0.5,
            lod_evaluation_interval: 0.5,
            update_interval: 0.0,
            cache_radius: 0.0,
            cache_max_age: 1.0,
            schedule: ScheduleMode::Synchronous,
        }
    }
}

impl PerceptionConfig {
    /// Total number of ray slots (all layers at full density).
    pub fn max_rays(&self) -> usize {
        self.ray_count as usize * self.vertical_layers.max(1) as usize
    }

    /// Checks the record and returns a corrected copy.
    ///
    /// Hard failures: zero ray count, non-positive or non-finite max distance,
    /// non-finite angles, inverted or overlapping LOD ranges.
    pub fn validate(&self, id: ProviderId) -> Result<PerceptionConfig, PerceptionError> {
        let mut cfg = self.clone();

        if cfg.ray_count == 0 {
            return Err(PerceptionError::config("ray_count", "must be positive"));
        }
        if !cfg.max_distance.is_finite() || cfg.max_distance <= 0.0 {
            return Err(PerceptionError::config(
                "max_distance",
                format!("must be positive and finite, got {}", cfg.max_distance),
            ));
        }
        for (field, value) in [
            ("fov_degrees", cfg.fov_degrees),
            ("angle_offset", cfg.angle_offset),
            ("vertical_min", cfg.vertical_min),
            ("vertical_max", cfg.vertical_max),
        ] {
            if !value.is_finite() {
                return Err(PerceptionError::config(field, "must be finite"));
            }
        }

        if !(0.0..=360.0).contains(&cfg.fov_degrees) {
            let clamped = cfg.fov_degrees.clamp(0.0, 360.0);
            warn!(%id, fov = cfg.fov_degrees, clamped, "fov out of [0, 360], clamping");
            cfg.fov_degrees = clamped;
        }
        if !(-180.0..=180.0).contains(&cfg.angle_offset) {
            let wrapped = wrap_degrees(cfg.angle_offset);
            warn!(%id, offset = cfg.angle_offset, wrapped, "angle offset out of [-180, 180], wrapping");
            cfg.angle_offset = wrapped;
        }
        if cfg.vertical_layers == 0 {
            warn!(%id, "vertical_layers is 0, using a single layer");
            cfg.vertical_layers = 1;
        }
        if cfg.vertical_min > cfg.vertical_max {
            warn!(%id, min = cfg.vertical_min, max = cfg.vertical_max, "vertical bounds inverted, swapping");
            std::mem::swap(&mut cfg.vertical_min, &mut cfg.vertical_max);
        }
        if cfg.update_interval < 0.0 || !cfg.update_interval.is_finite() {
            warn!(%id, interval = cfg.update_interval, "invalid update interval, using 0");
            cfg.update_interval = 0.0;
        }
        if cfg.cache_radius < 0.0 {
            warn!(%id, radius = cfg.cache_radius, "negative cache radius, disabling cache");
            cfg.cache_radius = 0.0;
        }
        if cfg.lod_hysteresis < 0.0 {
            warn!(%id, hysteresis = cfg.lod_hysteresis, "negative LOD hysteresis, using 0");
            cfg.lod_hysteresis = 0.0;
        }
        if let ScheduleMode::Asynchronous { rays_per_tick: 0 } = cfg.schedule {
            warn!(%id, "rays_per_tick is 0, using 1");
            cfg.schedule = ScheduleMode::Asynchronous { rays_per_tick: 1 };
        }

        // Detection classes are unique by name; keep the first occurrence.
        let mut seen = std::collections::HashSet::new();
        cfg.classes.retain(|class| {
            let fresh = seen.insert(class.name.clone());
            if !fresh {
                warn!(%id, class = %class.name, "duplicate detection class dropped");
            }
            fresh
        });

        cfg.lod_levels = validate_lod_levels(&cfg.lod_levels, id)?;
        Ok(cfg)
    }
}

fn validate_lod_levels(levels: &[LodLevel], id: ProviderId) -> Result<Vec<LodLevel>, PerceptionError> {
    let mut levels = levels.to_vec();
    for level in &mut levels {
        if !(level.min_distance < level.max_distance) {
            return Err(PerceptionError::config(
                "lod_levels",
                format!(
                    "level '{}' has inverted range [{}, {})",
                    level.name, level.min_distance, level.max_distance
                ),
            ));
        }
        if !(level.ray_count_multiplier > 0.0 && level.ray_count_multiplier <= 1.0) {
            let clamped = if level.ray_count_multiplier.is_finite() {
                level.ray_count_multiplier.clamp(f32::EPSILON, 1.0)
            } else {
                1.0
            };
            warn!(%id, level = %level.name, multiplier = level.ray_count_multiplier, clamped,
                "ray count multiplier outside (0, 1], clamping");
            level.ray_count_multiplier = clamped;
        }
        if !(level.update_frequency_multiplier > 0.0) || !level.update_frequency_multiplier.is_finite() {
            warn!(%id, level = %level.name, multiplier = level.update_frequency_multiplier,
                "update multiplier must be positive, using 1");
            level.update_frequency_multiplier = 1.0;
        }
    }

    let sorted = levels
        .windows(2)
        .all(|pair| pair[0].min_distance <= pair[1].min_distance);
    if !sorted {
        warn!(%id, "LOD levels not sorted by min_distance, sorting");
        levels.sort_by(|a, b| a.min_distance.total_cmp(&b.min_distance));
    }

    for pair in levels.windows(2) {
        if pair[1].min_distance < pair[0].max_distance {
            return Err(PerceptionError::config(
                "lod_levels",
                format!("levels '{}' and '{}' overlap", pair[0].name, pair[1].name),
            ));
        }
        if pair[1].min_distance > pair[0].max_distance {
            warn!(%id, lower = %pair[0].name, upper = %pair[1].name,
                "gap between LOD levels; the previous level is kept inside it");
        }
    }
    Ok(levels)
}

/// Wraps an angle in degrees into `[-180, 180]`.
pub fn wrap_degrees(angle: f32) -> f32 {
    let wrapped = (angle + 180.0).rem_euclid(360.0) - 180.0;
    if wrapped == -180.0 && angle > 0.0 {
        180.0
    } else {
        wrapped
    }
}

// =========================================================================
// == Coordinator Configuration ==
// =========================================================================

/// What to do when the deferred-cast queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
pub enum DropPolicy {
    #[default]
    DropOldest,
    DropNewest,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CoordinatorConfig {
    pub max_concurrent_raycasts: u32,
    /// Floor for auto-tuning.
    pub min_concurrent_raycasts: u32,
    pub ceiling_step: u32,
    /// Starting (and lowest) global minimum seconds between provider sweeps.
    pub base_update_interval: f32,
    pub max_update_interval: f32,
    pub target_frame_time_ms: f32,
    /// Seconds between auto-tuning evaluations.
    pub performance_update_interval: f32,
    /// Healthy evaluations in a row before the budget is relaxed.
    pub relax_after: u32,
    /// Number of frame-time samples in the rolling average.
    pub frame_window: usize,
    pub deferred_capacity: usize,
    pub drop_policy: DropPolicy,
    pub spatial_cell_size: f32,
    pub auto_tune: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_raycasts: 256,
            min_concurrent_raycasts: 16,
            ceiling_step: 16,
            base_update_interval: 0.02,
            max_update_interval: 0.25,
            target_frame_time_ms: 16.67,
            performance_update_interval: 1.0,
            relax_after: 3,
            frame_window: 60,
            deferred_capacity: 4096,
            drop_policy: DropPolicy::DropOldest,
            spatial_cell_size: 10.0,
            auto_tune: true,
        }
    }
}

impl CoordinatorConfig {
    pub fn validate(&self) -> Result<CoordinatorConfig, PerceptionError> {
        let mut cfg = self.clone();
        if cfg.max_concurrent_raycasts == 0 {
            return Err(PerceptionError::config("max_concurrent_raycasts", "must be positive"));
        }
        if !(cfg.target_frame_time_ms > 0.0) {
            return Err(PerceptionError::config(
                "target_frame_time_ms",
                format!("must be positive, got {}", cfg.target_frame_time_ms),
            ));
        }
        if cfg.min_concurrent_raycasts == 0 || cfg.min_concurrent_raycasts > cfg.max_concurrent_raycasts {
            let fixed = cfg.min_concurrent_raycasts.clamp(1, cfg.max_concurrent_raycasts);
            warn!(min = cfg.min_concurrent_raycasts, fixed, "min_concurrent_raycasts out of range");
            cfg.min_concurrent_raycasts = fixed;
        }
        if cfg.ceiling_step == 0 {
            warn!("ceiling_step is 0, using 1");
            cfg.ceiling_step = 1;
        }
        if !(cfg.base_update_interval >= 0.0) {
            warn!(interval = cfg.base_update_interval, "invalid base_update_interval, using 0");
            cfg.base_update_interval = 0.0;
        }
        if cfg.max_update_interval < cfg.base_update_interval {
            warn!(max = cfg.max_update_interval, base = cfg.base_update_interval,
                "max_update_interval below base, raising it");
            cfg.max_update_interval = cfg.base_update_interval;
        }
        if cfg.frame_window == 0 {
            cfg.frame_window = 1;
        }
        if cfg.deferred_capacity == 0 {
            warn!("deferred_capacity is 0, using 1");
            cfg.deferred_capacity = 1;
        }
        if !(cfg.spatial_cell_size > 0.0) {
            warn!(cell = cfg.spatial_cell_size, "spatial cell size must be positive, using 10");
            cfg.spatial_cell_size = 10.0;
        }
        Ok(cfg)
    }
}

// argus_core/src/perception/provider.rs

//! One perceiver: configuration, cached ray fan, last-results buffer, LOD and
//! cache state, and the observation it produces.
//!
//! Lifecycle: `new` (Uninitialized) -> `initialize` (Initialized, registered
//! with the coordinator) -> `begin_episode` (Active) -> `destroy` (Destroyed).
//! Every operation that needs buffers fails with `NotInitialized` before
//! `initialize` and with `Destroyed` afterwards.

use std::time::Instant;

use tracing::{debug, info, warn};

use crate::config::{wrap_degrees, DetectionClass, LodLevel, PerceptionConfig};
use crate::error::PerceptionError;
use crate::perception::backend::{CastAdapter, CastQuery, QueryBackend};
use crate::perception::classifier::HitClassifier;
use crate::perception::coordinator::{CastBudget, DeferredCast, PerceptionCoordinator, TickContext};
use crate::perception::encoder::{closest_of_class, ObservationEncoder};
use crate::perception::hit::HitResult;
use crate::perception::lod::{LodChange, LodController};
use crate::perception::ray_fan::{RayDescriptor, RayFan, RayFanParams};
use crate::perception::scheduler::FrameBudgetScheduler;
use crate::perception::telemetry::Telemetry;
use crate::types::{ObjectHandle, Pos3, Pose, ProviderId};

/// Slack when comparing elapsed time against an update interval, so a fixed
/// timestep that lands exactly on the interval is never skipped.
const INTERVAL_EPSILON: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderState {
    Uninitialized,
    Initialized,
    Active,
    Destroyed,
}

/// Why `update` issued no casts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Disabled,
    /// Initialized, but no episode has begun.
    Inactive,
    NotDue,
    /// The origin has barely moved since a sweep that is still fresh.
    Cached,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Skipped(SkipReason),
    Swept { cast: usize, deferred: usize },
}

#[derive(Debug, Clone, Default)]
struct ProviderStats {
    raycasts: u64,
    cast_nanos: u128,
    backend_errors: u64,
    skipped_ticks: u64,
}

#[derive(Debug, Clone)]
pub struct PerceptionProvider {
    id: ProviderId,
    config: PerceptionConfig,
    state: ProviderState,
    enabled: bool,
    owner: Option<ObjectHandle>,
    pose: Pose,
    fan: Option<RayFan>,
    hits: Vec<HitResult>,
    classifier: HitClassifier,
    encoder: ObservationEncoder,
    lod: LodController,
    scheduler: FrameBudgetScheduler,
    episode: u64,
    last_update: Option<f64>,
    last_origin: Option<Pos3>,
    warned_backend: bool,
    batch: Vec<usize>,
    stats: ProviderStats,
}

impl PerceptionProvider {
    /// Validates `config` and builds an uninitialized provider.
    pub fn new(id: ProviderId, config: PerceptionConfig) -> Result<Self, PerceptionError> {
        let config = config.validate(id)?;
        Ok(Self {
            id,
            classifier: HitClassifier::new(config.classes.clone()),
            encoder: ObservationEncoder::new(config.observe, config.normalize, config.max_distance),
            lod: LodController::new(
                config.lod_levels.clone(),
                config.lod_hysteresis,
                config.lod_evaluation_interval,
                config.ray_count as usize,
                config.update_interval,
            ),
            scheduler: FrameBudgetScheduler::new(config.schedule),
            config,
            state: ProviderState::Uninitialized,
            enabled: true,
            owner: None,
            pose: Pose::identity(),
            fan: None,
            hits: Vec::new(),
            episode: 0,
            last_update: None,
            last_origin: None,
            warned_backend: false,
            batch: Vec::new(),
            stats: ProviderStats::default(),
        })
    }

    /// The scene object carrying this perceiver; casts never report it.
    pub fn with_owner(mut self, owner: ObjectHandle) -> Self {
        self.owner = Some(owner);
        self
    }

    pub fn with_pose(mut self, pose: Pose) -> Self {
        self.pose = pose;
        self
    }

    // --- Lifecycle ---

    /// Allocates the ray fan and hit buffer and registers with `coordinator`.
    /// Calling it again on a live provider is a no-op.
    pub fn initialize(&mut self, coordinator: &mut PerceptionCoordinator) -> Result<(), PerceptionError> {
        match self.state {
            ProviderState::Destroyed => return Err(PerceptionError::Destroyed(self.id)),
            ProviderState::Initialized | ProviderState::Active => return Ok(()),
            ProviderState::Uninitialized => {}
        }

        let fan = RayFan::new(RayFanParams::from(&self.config));
        let miss = self.encoder.miss_distance();
        self.hits = fan
            .rays()
            .iter()
            .map(|ray| HitResult::miss(miss, ray.horizontal_angle))
            .collect();
        self.fan = Some(fan);
        self.state = ProviderState::Initialized;
        coordinator.register(self.id, self.origin());

        info!(
            id = %self.id,
            rays = self.hits.len(),
            observation = self.observation_size(),
            "perception provider initialized"
        );
        Ok(())
    }

    /// Starts an episode: clears results to misses, resets timers and the
    /// async cursor, and re-evaluates LOD against `reference_point`.
    /// Deferred casts queued in an earlier episode are discarded.
    pub fn begin_episode(&mut self, reference_point: Option<Pos3>) -> Result<(), PerceptionError> {
        self.ensure_live()?;
        self.episode += 1;
        self.warned_backend = false;
        self.last_update = None;
        self.last_origin = None;
        self.scheduler.reset();
        self.lod.reset_timer();
        self.reset_hits();

        if let Some(reference) = reference_point {
            let distance = (reference - self.origin()).norm();
            if let Some(change) = self.lod.evaluate_now(distance) {
                self.apply_lod(change);
            }
        }
        self.state = ProviderState::Active;
        debug!(id = %self.id, episode = self.episode, "episode started");
        Ok(())
    }

    /// Releases buffers and deregisters. Destroying twice is an error.
    pub fn destroy(&mut self, coordinator: &mut PerceptionCoordinator) -> Result<(), PerceptionError> {
        if self.state == ProviderState::Destroyed {
            return Err(PerceptionError::Destroyed(self.id));
        }
        coordinator.unregister(self.id);
        self.fan = None;
        self.hits = Vec::new();
        self.batch = Vec::new();
        self.state = ProviderState::Destroyed;
        info!(id = %self.id, "perception provider destroyed");
        Ok(())
    }

    fn ensure_live(&self) -> Result<(), PerceptionError> {
        match self.state {
            ProviderState::Uninitialized => Err(PerceptionError::NotInitialized(self.id)),
            ProviderState::Destroyed => Err(PerceptionError::Destroyed(self.id)),
            ProviderState::Initialized | ProviderState::Active => Ok(()),
        }
    }

    fn reset_hits(&mut self) {
        let miss = self.encoder.miss_distance();
        if let Some(fan) = &self.fan {
            for (hit, ray) in self.hits.iter_mut().zip(fan.rays()) {
                hit.reset_to_miss(miss, ray.horizontal_angle);
            }
        }
    }

    fn apply_lod(&mut self, change: LodChange) {
        if let Some(fan) = &mut self.fan {
            fan.reslice(change.active_rays);
        }
        debug!(
            id = %self.id,
            level = change.to,
            active_rays = change.active_rays,
            interval = change.update_interval,
            "applied LOD level"
        );
    }

    // --- Per-tick work ---

    /// Runs one tick: LOD, the interval and cache pre-checks, then casts the
    /// scheduled rays in ascending index order. Rays refused by `budget` are
    /// deferred, not dropped.
    pub fn update(
        &mut self,
        ctx: &TickContext,
        budget: &mut CastBudget,
        backend: &dyn QueryBackend,
    ) -> Result<UpdateOutcome, PerceptionError> {
        self.ensure_live()?;
        if !self.enabled {
            return Ok(UpdateOutcome::Skipped(SkipReason::Disabled));
        }
        if self.state != ProviderState::Active {
            return Ok(UpdateOutcome::Skipped(SkipReason::Inactive));
        }

        let origin = self.origin();
        if let Some(reference) = ctx.reference_point {
            if let Some(change) = self.lod.evaluate(ctx.now, (reference - origin).norm()) {
                self.apply_lod(change);
            }
        }

        if let Some(skip) = self.pre_check(ctx, &origin) {
            self.stats.skipped_ticks += 1;
            return Ok(UpdateOutcome::Skipped(skip));
        }

        let Some(fan) = &self.fan else {
            return Err(PerceptionError::NotInitialized(self.id));
        };
        self.scheduler.select(fan.active_indices(), &mut self.batch);

        let batch = std::mem::take(&mut self.batch);
        let (mut cast, mut deferred) = (0, 0);
        for &index in &batch {
            if budget.try_acquire() {
                self.cast_ray(index, backend);
                cast += 1;
            } else {
                budget.defer(self.id, index, self.episode);
                deferred += 1;
            }
        }
        self.batch = batch;

        self.last_update = Some(ctx.now);
        self.last_origin = Some(origin);
        Ok(UpdateOutcome::Swept { cast, deferred })
    }

    fn pre_check(&self, ctx: &TickContext, origin: &Pos3) -> Option<SkipReason> {
        let last = self.last_update?;
        let elapsed = ctx.now - last;
        let interval = self.effective_interval(ctx.min_update_interval);
        if elapsed + INTERVAL_EPSILON < f64::from(interval) {
            return Some(SkipReason::NotDue);
        }
        if self.config.cache_radius > 0.0 && elapsed < f64::from(self.config.cache_max_age) {
            let moved = self.last_origin.map_or(f32::INFINITY, |p| (origin - p).norm());
            if moved < self.config.cache_radius {
                return Some(SkipReason::Cached);
            }
        }
        None
    }

    /// Seconds between sweeps: the LOD-scaled interval, never below the
    /// coordinator's global floor.
    pub fn effective_interval(&self, global_floor: f32) -> f32 {
        self.lod.update_interval().max(global_floor)
    }

    /// Executes a cast the budget deferred on an earlier tick. Returns false
    /// when the cast is stale (new episode, inactive, or destroyed provider).
    pub fn execute_deferred(&mut self, cast: &DeferredCast, backend: &dyn QueryBackend) -> bool {
        let runnable = self.state == ProviderState::Active
            && self.enabled
            && cast.provider == self.id
            && cast.epoch == self.episode
            && cast.ray < self.hits.len();
        if runnable {
            self.cast_ray(cast.ray, backend);
        }
        runnable
    }

    fn cast_ray(&mut self, index: usize, backend: &dyn QueryBackend) {
        let origin = self.origin();
        let Some(ray) = self.fan.as_ref().and_then(|fan| fan.rays().get(index)) else {
            return;
        };
        let query = CastQuery {
            mode: self.lod.cast_mode_override().unwrap_or(self.config.cast_mode),
            origin,
            direction: self.pose.rotation * ray.direction,
            max_distance: self.config.max_distance,
            layer_mask: self.config.layer_mask,
            ignore: self.owner,
        };

        let started = Instant::now();
        let outcome = CastAdapter::new(backend).cast(&query, ray);
        self.stats.cast_nanos += started.elapsed().as_nanos();
        self.stats.raycasts += 1;

        if let Some(error) = outcome.error {
            self.stats.backend_errors += 1;
            if !self.warned_backend {
                warn!(id = %self.id, ray = index, mode = query.mode.name(), %error,
                    "cast failed, recording a miss");
                self.warned_backend = true;
            }
        }

        let mut hit = outcome.hit;
        hit.distance = self.encoder.store_distance(hit.distance);
        self.classifier.apply(&mut hit, backend);
        self.hits[index] = hit;
    }

    // --- Observation ---

    /// Length of the observation vector. Depends only on configuration.
    pub fn observation_size(&self) -> usize {
        self.encoder.size(self.config.max_rays(), self.classifier.classes())
    }

    /// Fills `out` with the encoded observation, resizing it to
    /// `observation_size`. Disabled or inactive providers write zeros.
    pub fn write_observation(&self, out: &mut Vec<f32>) -> Result<(), PerceptionError> {
        self.ensure_live()?;
        out.clear();
        out.resize(self.observation_size(), 0.0);
        if self.enabled && self.state == ProviderState::Active {
            self.encoder.encode_into(&self.hits, self.classifier.classes(), out);
        }
        Ok(())
    }

    pub fn observation(&self) -> Result<Vec<f32>, PerceptionError> {
        let mut out = Vec::new();
        self.write_observation(&mut out)?;
        Ok(out)
    }

    // --- Queries ---

    fn class_index(&self, name: &str) -> Result<usize, PerceptionError> {
        self.classifier
            .index_of(name)
            .ok_or_else(|| PerceptionError::UnknownClass(name.to_string()))
    }

    fn closest_of(&self, name: &str) -> Result<Option<&HitResult>, PerceptionError> {
        let index = self.class_index(name)?;
        let class = &self.classifier.classes()[index];
        Ok(closest_of_class(&self.hits, index, class.max_tracking_distance, |d| {
            self.encoder.raw_distance(d)
        })
        .map(|(_, hit)| hit))
    }

    /// World-space distance to the closest visible object of class `name`.
    pub fn distance_to_class(&self, name: &str) -> Result<Option<f32>, PerceptionError> {
        Ok(self
            .closest_of(name)?
            .map(|hit| self.encoder.raw_distance(hit.distance)))
    }

    /// Horizontal angle in degrees of the ray seeing the closest object of
    /// class `name`.
    pub fn angle_to_class(&self, name: &str) -> Result<Option<f32>, PerceptionError> {
        Ok(self.closest_of(name)?.map(|hit| hit.angle))
    }

    pub fn is_class_visible(&self, name: &str) -> Result<bool, PerceptionError> {
        Ok(self.closest_of(name)?.is_some())
    }

    pub fn class_importance(&self, name: &str) -> Result<f32, PerceptionError> {
        let index = self.class_index(name)?;
        Ok(self.classifier.classes()[index].importance)
    }

    /// The nearest hit of any kind; ties go to the lowest ray index.
    pub fn closest_hit(&self) -> Option<&HitResult> {
        self.hits
            .iter()
            .filter(|hit| hit.has_hit)
            .fold(None, |best: Option<&HitResult>, hit| match best {
                Some(current) if current.distance <= hit.distance => Some(current),
                _ => Some(hit),
            })
    }

    pub fn hit_count(&self) -> usize {
        self.hits.iter().filter(|hit| hit.has_hit).count()
    }

    // --- Runtime reconfiguration ---

    /// Appends a detection class; the observation grows by its width.
    pub fn add_class(&mut self, class: DetectionClass) -> Result<(), PerceptionError> {
        self.classifier.add(class.clone())?;
        info!(id = %self.id, class = %class.name, observation = self.observation_size(),
            "detection class added");
        self.config.classes.push(class);
        Ok(())
    }

    /// Removes a detection class. Hits of that class become unclassified.
    pub fn remove_class(&mut self, name: &str) -> Result<DetectionClass, PerceptionError> {
        let index = self.class_index(name)?;
        let removed = self.classifier.remove(name)?;
        self.config.classes.remove(index);
        for hit in &mut self.hits {
            match hit.class_index {
                Some(i) if i == index => {
                    hit.class_index = None;
                    hit.class_label = None;
                    hit.importance = 1.0;
                }
                Some(i) if i > index => hit.class_index = Some(i - 1),
                _ => {}
            }
        }
        info!(id = %self.id, class = %name, "detection class removed");
        Ok(removed)
    }

    /// Re-aims the fan. The descriptors are regenerated and every slot
    /// resets to a miss at its new angle.
    pub fn set_angle_offset(&mut self, degrees: f32) {
        self.config.angle_offset = wrap_degrees(degrees);
        let params = RayFanParams::from(&self.config);
        let rebuilt = self.fan.as_mut().is_some_and(|fan| fan.ensure(params));
        if rebuilt {
            self.reset_hits();
        }
    }

    // --- Accessors ---

    pub fn id(&self) -> ProviderId {
        self.id
    }

    pub fn state(&self) -> ProviderState {
        self.state
    }

    pub fn config(&self) -> &PerceptionConfig {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn owner(&self) -> Option<ObjectHandle> {
        self.owner
    }

    pub fn set_owner(&mut self, owner: Option<ObjectHandle>) {
        self.owner = owner;
    }

    pub fn pose(&self) -> &Pose {
        &self.pose
    }

    pub fn set_pose(&mut self, pose: Pose) {
        self.pose = pose;
    }

    pub fn origin(&self) -> Pos3 {
        Pos3::from(self.pose.translation.vector)
    }

    pub fn episode(&self) -> u64 {
        self.episode
    }

    pub fn classes(&self) -> &[DetectionClass] {
        self.classifier.classes()
    }

    pub fn hits(&self) -> &[HitResult] {
        &self.hits
    }

    pub fn rays(&self) -> &[RayDescriptor] {
        self.fan.as_ref().map_or(&[], |fan| fan.rays())
    }

    pub fn active_ray_count(&self) -> usize {
        self.fan.as_ref().map_or(0, |fan| fan.active_indices().len())
    }

    pub fn lod_level(&self) -> Option<&LodLevel> {
        self.lod.current_level()
    }

    pub fn scheduler(&self) -> &FrameBudgetScheduler {
        &self.scheduler
    }

    pub fn raycasts_performed(&self) -> u64 {
        self.stats.raycasts
    }

    pub fn backend_errors(&self) -> u64 {
        self.stats.backend_errors
    }

    pub fn telemetry(&self) -> Telemetry {
        let avg_micros = if self.stats.raycasts == 0 {
            0.0
        } else {
            (self.stats.cast_nanos as f64 / self.stats.raycasts as f64 / 1_000.0) as f32
        };
        Telemetry::new()
            .with("raycasts_performed", self.stats.raycasts as f32)
            .with("avg_cast_micros", avg_micros)
            .with("hit_count", self.hit_count() as f32)
            .with("lod_level", self.lod.current().map_or(-1.0, |i| i as f32))
            .with("active_rays", self.active_ray_count() as f32)
            .with("backend_errors", self.stats.backend_errors as f32)
            .with("skipped_ticks", self.stats.skipped_ticks as f32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CastMode, CoordinatorConfig, DropPolicy, ObservationFlags, ScheduleMode};
    use crate::perception::backend::{BackendError, BackendHit, ClassifiableObject};
    use crate::perception::scene::{PrimitiveScene, SceneObject, Sphere};
    use crate::types::Vec3;
    use approx::assert_abs_diff_eq;
    use std::cell::RefCell;

    const ID: ProviderId = ProviderId(1);

    fn coordinator() -> PerceptionCoordinator {
        PerceptionCoordinator::new(CoordinatorConfig {
            auto_tune: false,
            base_update_interval: 0.0,
            ..Default::default()
        })
        .unwrap()
    }

    fn fan_config() -> PerceptionConfig {
        PerceptionConfig {
            ray_count: 16,
            fov_degrees: 180.0,
            max_distance: 10.0,
            classes: vec![DetectionClass::new("Target")],
            ..Default::default()
        }
    }

    /// A "Target" sphere whose near surface is `distance` ahead along +Z.
    fn target_scene(distance: f32) -> PrimitiveScene {
        let mut scene = PrimitiveScene::new();
        scene.insert(
            SceneObject::new(Sphere::new(Pos3::new(0.0, 0.0, distance + 0.5), 0.5))
                .with_tags(["Target"]),
        );
        scene
    }

    fn active(config: PerceptionConfig) -> (PerceptionProvider, PerceptionCoordinator) {
        let mut coordinator = coordinator();
        let mut provider = PerceptionProvider::new(ID, config).unwrap();
        provider.initialize(&mut coordinator).unwrap();
        provider.begin_episode(None).unwrap();
        (provider, coordinator)
    }

    fn sweep(provider: &mut PerceptionProvider, backend: &dyn QueryBackend, now: f64) -> UpdateOutcome {
        provider
            .update(&TickContext::at(now), &mut CastBudget::unlimited(), backend)
            .unwrap()
    }

    #[test]
    fn target_straight_ahead_is_encoded() {
        let (mut provider, _coordinator) = active(fan_config());
        let scene = target_scene(4.0);
        assert_eq!(sweep(&mut provider, &scene, 0.0), UpdateOutcome::Swept { cast: 16, deferred: 0 });

        let ahead = &provider.hits()[8];
        assert_abs_diff_eq!(ahead.angle, 0.0, epsilon = 1e-4);
        assert!(ahead.has_hit);
        assert_abs_diff_eq!(ahead.distance, 0.4, epsilon = 1e-4);
        assert_eq!(ahead.label(), "Target");
        assert_eq!(provider.hit_count(), 1);

        let obs = provider.observation().unwrap();
        assert_eq!(obs.len(), 16 + 2);
        assert_abs_diff_eq!(obs[8], 0.4, epsilon = 1e-4);
        assert_abs_diff_eq!(obs[16], 0.4, epsilon = 1e-4);
        assert_abs_diff_eq!(obs[17], 0.0, epsilon = 1e-4);

        assert_abs_diff_eq!(provider.distance_to_class("Target").unwrap().unwrap(), 4.0, epsilon = 1e-3);
        assert_abs_diff_eq!(provider.angle_to_class("Target").unwrap().unwrap(), 0.0, epsilon = 1e-4);
        assert!(provider.is_class_visible("Target").unwrap());
        assert_eq!(provider.class_importance("Target").unwrap(), 1.0);
        assert_eq!(provider.closest_hit().map(|hit| hit.angle), Some(ahead.angle));
    }

    #[test]
    fn all_miss_tick_encodes_miss_values() {
        let (mut provider, _coordinator) = active(fan_config());
        sweep(&mut provider, &PrimitiveScene::new(), 0.0);

        let obs = provider.observation().unwrap();
        assert!(obs[..16].iter().all(|&d| d == 1.0));
        assert_eq!(obs[16], 1.0);
        assert_eq!(obs[17], 0.0);
        assert!(provider.hits().iter().all(|hit| hit.importance == 0.0 && !hit.has_hit));
        assert_eq!(provider.distance_to_class("Target").unwrap(), None);
        assert!(provider.closest_hit().is_none());
    }

    #[test]
    fn raw_distances_when_not_normalized() {
        let config = PerceptionConfig {
            normalize: false,
            ..fan_config()
        };
        let (mut provider, _coordinator) = active(config);
        sweep(&mut provider, &target_scene(4.0), 0.0);
        assert_abs_diff_eq!(provider.hits()[8].distance, 4.0, epsilon = 1e-4);
        assert_eq!(provider.hits()[0].distance, 10.0);
    }

    #[test]
    fn lifecycle_misuse_fails_fast() {
        let mut coordinator = coordinator();
        let scene = PrimitiveScene::new();
        let mut budget = CastBudget::unlimited();
        let ctx = TickContext::at(0.0);
        let mut provider = PerceptionProvider::new(ID, fan_config()).unwrap();

        assert_eq!(provider.update(&ctx, &mut budget, &scene), Err(PerceptionError::NotInitialized(ID)));
        assert_eq!(provider.observation(), Err(PerceptionError::NotInitialized(ID)));
        assert_eq!(provider.begin_episode(None), Err(PerceptionError::NotInitialized(ID)));

        provider.initialize(&mut coordinator).unwrap();
        assert!(coordinator.is_registered(ID));
        assert_eq!(
            provider.update(&ctx, &mut budget, &scene),
            Ok(UpdateOutcome::Skipped(SkipReason::Inactive))
        );
        assert_eq!(provider.observation().unwrap(), vec![0.0; 18]);

        provider.destroy(&mut coordinator).unwrap();
        assert!(!coordinator.is_registered(ID));
        assert_eq!(provider.update(&ctx, &mut budget, &scene), Err(PerceptionError::Destroyed(ID)));
        assert_eq!(provider.destroy(&mut coordinator), Err(PerceptionError::Destroyed(ID)));
        assert_eq!(provider.initialize(&mut coordinator), Err(PerceptionError::Destroyed(ID)));
        assert!(provider.hits().is_empty());
    }

    #[test]
    fn disabled_provider_emits_zeros_of_the_same_length() {
        let (mut provider, _coordinator) = active(fan_config());
        sweep(&mut provider, &target_scene(4.0), 0.0);
        let len = provider.observation().unwrap().len();

        provider.set_enabled(false);
        assert_eq!(
            sweep(&mut provider, &target_scene(4.0), 1.0),
            UpdateOutcome::Skipped(SkipReason::Disabled)
        );
        let obs = provider.observation().unwrap();
        assert_eq!(obs.len(), len);
        assert!(obs.iter().all(|&v| v == 0.0));
    }

    /// Fails every cast pointing more than 30 degrees to the right.
    struct Flaky(PrimitiveScene);

    impl QueryBackend for Flaky {
        fn cast(&self, query: &CastQuery) -> Result<Option<BackendHit>, BackendError> {
            if query.direction.x > 0.5 {
                return Err(BackendError::Unavailable("flaky".into()));
            }
            self.0.cast(query)
        }

        fn classifiable(&self, object: ObjectHandle) -> Option<&dyn ClassifiableObject> {
            self.0.classifiable(object)
        }
    }

    #[test]
    fn one_bad_ray_never_zeroes_the_sweep() {
        let (mut provider, _coordinator) = active(fan_config());
        let backend = Flaky(target_scene(4.0));
        sweep(&mut provider, &backend, 0.0);

        assert_eq!(provider.backend_errors(), 5);
        assert!(provider.hits()[8].has_hit);
        for i in 11..16 {
            let hit = &provider.hits()[i];
            assert!(!hit.has_hit);
            assert_eq!(hit.distance, 1.0);
            assert_abs_diff_eq!(hit.angle, provider.rays()[i].horizontal_angle);
        }
        assert_eq!(provider.telemetry().get("backend_errors"), Some(5.0));
    }

    #[test]
    fn update_interval_gates_sweeps() {
        let config = PerceptionConfig {
            update_interval: 0.5,
            ..fan_config()
        };
        let (mut provider, _coordinator) = active(config);
        let scene = PrimitiveScene::new();
        assert!(matches!(sweep(&mut provider, &scene, 0.0), UpdateOutcome::Swept { .. }));
        assert_eq!(sweep(&mut provider, &scene, 0.25), UpdateOutcome::Skipped(SkipReason::NotDue));
        assert!(matches!(sweep(&mut provider, &scene, 0.5), UpdateOutcome::Swept { .. }));

        // The coordinator's global interval acts as a floor.
        let ctx = TickContext {
            min_update_interval: 2.0,
            ..TickContext::at(1.0)
        };
        assert_eq!(
            provider.update(&ctx, &mut CastBudget::unlimited(), &scene),
            Ok(UpdateOutcome::Skipped(SkipReason::NotDue))
        );
        assert_eq!(provider.telemetry().get("skipped_ticks"), Some(2.0));
    }

    #[test]
    fn spatial_cache_skips_until_moved_or_stale() {
        let config = PerceptionConfig {
            cache_radius: 1.0,
            cache_max_age: 1.0,
            ..fan_config()
        };
        let (mut provider, _coordinator) = active(config);
        let scene = PrimitiveScene::new();

        assert!(matches!(sweep(&mut provider, &scene, 0.0), UpdateOutcome::Swept { .. }));
        assert_eq!(sweep(&mut provider, &scene, 0.1), UpdateOutcome::Skipped(SkipReason::Cached));

        provider.set_pose(Pose::translation(2.0, 0.0, 0.0));
        assert!(matches!(sweep(&mut provider, &scene, 0.2), UpdateOutcome::Swept { .. }));
        assert_eq!(sweep(&mut provider, &scene, 0.3), UpdateOutcome::Skipped(SkipReason::Cached));

        // Stationary, but the cached sweep has expired.
        assert!(matches!(sweep(&mut provider, &scene, 1.5), UpdateOutcome::Swept { .. }));
    }

    #[test]
    fn lod_reslices_without_reallocating() {
        let config = PerceptionConfig {
            lod_levels: vec![
                LodLevel::new("near", 0.0, 10.0),
                LodLevel::new("far", 10.0, 1000.0).with_multipliers(0.25, 2.0),
            ],
            lod_evaluation_interval: 0.0,
            ..fan_config()
        };
        let mut coordinator = coordinator();
        let mut provider = PerceptionProvider::new(ID, config).unwrap();
        provider.initialize(&mut coordinator).unwrap();
        provider.begin_episode(Some(Pos3::new(0.0, 0.0, 5.0))).unwrap();
        assert_eq!(provider.lod_level().map(|l| l.name.as_str()), Some("near"));
        assert_eq!(provider.active_ray_count(), 16);
        let len = provider.observation_size();

        let ctx = TickContext {
            reference_point: Some(Pos3::new(0.0, 0.0, 50.0)),
            ..TickContext::at(1.0)
        };
        let outcome = provider.update(&ctx, &mut CastBudget::unlimited(), &PrimitiveScene::new());
        assert_eq!(outcome, Ok(UpdateOutcome::Swept { cast: 4, deferred: 0 }));
        assert_eq!(provider.lod_level().map(|l| l.name.as_str()), Some("far"));
        assert_eq!(provider.active_ray_count(), 4);
        assert_eq!(provider.hits().len(), 16);
        assert_eq!(provider.observation().unwrap().len(), len);
        assert_eq!(provider.telemetry().get("lod_level"), Some(1.0));
    }

    /// Records the cast mode of every query and always misses.
    #[derive(Default)]
    struct ModeLog(RefCell<Vec<CastMode>>);

    impl QueryBackend for ModeLog {
        fn cast(&self, query: &CastQuery) -> Result<Option<BackendHit>, BackendError> {
            self.0.borrow_mut().push(query.mode);
            Ok(None)
        }

        fn classifiable(&self, _object: ObjectHandle) -> Option<&dyn ClassifiableObject> {
            None
        }
    }

    #[test]
    fn lod_level_cast_mode_overrides_the_configured_mode() {
        let boxed = CastMode::Box {
            half_extents: [0.25, 0.25, 0.25],
        };
        let mut far = LodLevel::new("far", 10.0, 1000.0);
        far.cast_mode = Some(boxed);
        let config = PerceptionConfig {
            ray_count: 4,
            cast_mode: CastMode::Capsule {
                radius: 0.2,
                half_height: 0.4,
            },
            lod_levels: vec![LodLevel::new("near", 0.0, 10.0), far],
            lod_evaluation_interval: 0.0,
            ..fan_config()
        };
        let mut coordinator = coordinator();
        let mut provider = PerceptionProvider::new(ID, config).unwrap();
        provider.initialize(&mut coordinator).unwrap();
        provider.begin_episode(Some(Pos3::new(0.0, 0.0, 5.0))).unwrap();
        let backend = ModeLog::default();

        let near = TickContext {
            reference_point: Some(Pos3::new(0.0, 0.0, 5.0)),
            ..TickContext::at(0.0)
        };
        provider.update(&near, &mut CastBudget::unlimited(), &backend).unwrap();
        let far = TickContext {
            reference_point: Some(Pos3::new(0.0, 0.0, 50.0)),
            ..TickContext::at(1.0)
        };
        provider.update(&far, &mut CastBudget::unlimited(), &backend).unwrap();

        let modes = backend.0.borrow();
        assert_eq!(modes.len(), 8);
        assert!(modes[..4].iter().all(|mode| matches!(mode, CastMode::Capsule { .. })));
        assert!(modes[4..].iter().all(|mode| *mode == boxed));
    }

    /// Records every cast direction and always misses.
    #[derive(Default)]
    struct Recording(RefCell<Vec<Vec3>>);

    impl QueryBackend for Recording {
        fn cast(&self, query: &CastQuery) -> Result<Option<BackendHit>, BackendError> {
            self.0.borrow_mut().push(query.direction.into_inner());
            Ok(None)
        }

        fn classifiable(&self, _object: ObjectHandle) -> Option<&dyn ClassifiableObject> {
            None
        }
    }

    #[test]
    fn async_sweep_covers_every_ray_in_four_ticks() {
        let config = PerceptionConfig {
            schedule: ScheduleMode::Asynchronous { rays_per_tick: 4 },
            ..fan_config()
        };
        let (mut provider, _coordinator) = active(config);
        let backend = Recording::default();

        for tick in 0..4 {
            let outcome = sweep(&mut provider, &backend, tick as f64 * 0.1);
            assert_eq!(outcome, UpdateOutcome::Swept { cast: 4, deferred: 0 });
        }
        assert_eq!(provider.scheduler().wraps(), 1);
        assert_eq!(provider.scheduler().cursor(), 0);

        let cast = backend.0.borrow();
        assert_eq!(cast.len(), 16);
        for ray in provider.rays() {
            assert!(cast.iter().any(|d| (d - ray.direction.into_inner()).norm() < 1e-5));
        }
    }

    #[test]
    fn owner_is_never_reported() {
        let mut scene = target_scene(4.0);
        let body = scene.insert(SceneObject::new(Sphere::new(Pos3::origin(), 0.3)));

        let (mut provider, _coordinator) = active(fan_config());
        sweep(&mut provider, &scene, 0.0);
        assert_eq!(provider.hits()[8].distance, 0.0);

        provider.set_owner(Some(body));
        sweep(&mut provider, &scene, 1.0);
        assert_abs_diff_eq!(provider.hits()[8].distance, 0.4, epsilon = 1e-4);
    }

    #[test]
    fn casts_follow_the_pose() {
        let mut scene = PrimitiveScene::new();
        scene.insert(SceneObject::new(Sphere::new(Pos3::new(4.5, 0.0, 0.0), 0.5)).with_tags(["Target"]));

        let (mut provider, _coordinator) = active(fan_config());
        provider.set_pose(Pose::new(Vec3::zeros(), Vec3::y() * std::f32::consts::FRAC_PI_2));
        sweep(&mut provider, &scene, 0.0);
        assert!(provider.hits()[8].has_hit);
        assert_abs_diff_eq!(provider.hits()[8].distance, 0.4, epsilon = 1e-4);
    }

    #[test]
    fn stale_deferred_casts_are_discarded() {
        let (mut provider, _coordinator) = active(fan_config());
        let scene = target_scene(4.0);
        let mut budget = CastBudget::new(0, 64, DropPolicy::DropOldest);
        let outcome = provider.update(&TickContext::at(0.0), &mut budget, &scene);
        assert_eq!(outcome, Ok(UpdateOutcome::Swept { cast: 0, deferred: 16 }));

        let queued: Vec<DeferredCast> = budget.deferred().copied().collect();
        assert_eq!(queued.iter().map(|c| c.ray).collect::<Vec<_>>(), (0..16).collect::<Vec<_>>());
        assert!(provider.execute_deferred(&queued[8], &scene));
        assert!(provider.hits()[8].has_hit);

        provider.begin_episode(None).unwrap();
        assert!(!provider.execute_deferred(&queued[9], &scene));
    }

    #[test]
    fn classes_can_change_at_runtime() {
        let (mut provider, _coordinator) = active(fan_config());
        sweep(&mut provider, &target_scene(4.0), 0.0);
        assert_eq!(provider.observation_size(), 18);

        provider.add_class(DetectionClass::new("Wall").with_velocity()).unwrap();
        assert_eq!(provider.observation_size(), 18 + 5);
        assert_eq!(
            provider.add_class(DetectionClass::new("Wall")),
            Err(PerceptionError::DuplicateClass("Wall".into()))
        );

        provider.remove_class("Target").unwrap();
        assert_eq!(provider.hits()[8].class_index, None);
        assert!(provider.hits()[8].has_hit);
        assert_eq!(provider.classes().len(), 1);
        assert_eq!(provider.observation().unwrap().len(), 16 + 5);
        assert_eq!(
            provider.distance_to_class("Target"),
            Err(PerceptionError::UnknownClass("Target".into()))
        );
    }

    #[test]
    fn velocity_and_material_channels() {
        let mut scene = PrimitiveScene::new();
        scene.insert(
            SceneObject::new(Sphere::new(Pos3::new(0.0, 0.0, 4.5), 0.5))
                .with_tags(["Target"])
                .with_velocity(Vec3::new(1.0, 0.0, -2.0)),
        );
        let config = PerceptionConfig {
            observe: ObservationFlags {
                distance: true,
                angle: true,
                material: true,
            },
            classes: vec![DetectionClass::new("Wall"), DetectionClass::new("Target").with_velocity()],
            ..fan_config()
        };
        let (mut provider, _coordinator) = active(config);
        sweep(&mut provider, &scene, 0.0);

        let obs = provider.observation().unwrap();
        assert_eq!(obs.len(), 16 * 3 + 2 + 5);
        assert_abs_diff_eq!(obs[8 * 3 + 2], 1.0);
        assert_eq!(obs[2], 0.0);
        let target = 16 * 3 + 2;
        assert_abs_diff_eq!(obs[target], 0.4, epsilon = 1e-4);
        assert_abs_diff_eq!(obs[target + 2], 1.0);
        assert_abs_diff_eq!(obs[target + 4], -2.0);
    }

    #[test]
    fn reaiming_regenerates_the_fan() {
        let (mut provider, _coordinator) = active(fan_config());
        sweep(&mut provider, &target_scene(4.0), 0.0);
        provider.set_angle_offset(450.0);
        assert_eq!(provider.config().angle_offset, 90.0);
        assert_abs_diff_eq!(provider.rays()[8].horizontal_angle, 90.0, epsilon = 1e-4);
        assert_eq!(provider.hit_count(), 0);
        assert_abs_diff_eq!(provider.hits()[8].angle, 90.0, epsilon = 1e-4);
    }
}

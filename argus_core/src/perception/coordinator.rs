// argus_core/src/perception/coordinator.rs

//! Arbitrates one raycast budget across every registered provider.
//!
//! The coordinator is an explicit object owned by the host, not a global. It
//! keeps the registry (in registration order), the per-tick cast counters, a
//! bounded FIFO of deferred casts, a coarse spatial index of provider origins,
//! and the auto-tuning loop that trades refresh rate for frame time.
//!
//! It does not own providers. Hosts keep them wherever they like and expose
//! them through `ProviderSet` for the duration of a tick.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::hash::BuildHasher;

use tracing::{debug, warn};

use crate::config::{CoordinatorConfig, DropPolicy};
use crate::error::PerceptionError;
use crate::perception::backend::QueryBackend;
use crate::perception::provider::{PerceptionProvider, UpdateOutcome};
use crate::perception::spatial_grid::SpatialGrid;
use crate::perception::telemetry::Telemetry;
use crate::types::{Pos3, ProviderId};

/// Lookup from id to provider, used while the coordinator ticks.
pub trait ProviderSet {
    fn provider_mut(&mut self, id: ProviderId) -> Option<&mut PerceptionProvider>;
}

impl ProviderSet for [PerceptionProvider] {
    fn provider_mut(&mut self, id: ProviderId) -> Option<&mut PerceptionProvider> {
        self.iter_mut().find(|provider| provider.id() == id)
    }
}

impl ProviderSet for Vec<PerceptionProvider> {
    fn provider_mut(&mut self, id: ProviderId) -> Option<&mut PerceptionProvider> {
        self.as_mut_slice().provider_mut(id)
    }
}

impl ProviderSet for BTreeMap<ProviderId, PerceptionProvider> {
    fn provider_mut(&mut self, id: ProviderId) -> Option<&mut PerceptionProvider> {
        self.get_mut(&id)
    }
}

impl<S: BuildHasher> ProviderSet for HashMap<ProviderId, PerceptionProvider, S> {
    fn provider_mut(&mut self, id: ProviderId) -> Option<&mut PerceptionProvider> {
        self.get_mut(&id)
    }
}

/// What a provider needs to know about the current tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickContext {
    /// Simulation time in seconds.
    pub now: f64,
    /// The point LOD distances are measured to, e.g. the primary viewer.
    pub reference_point: Option<Pos3>,
    /// Global floor on the seconds between a provider's sweeps.
    pub min_update_interval: f32,
}

impl TickContext {
    pub fn at(now: f64) -> Self {
        Self {
            now,
            reference_point: None,
            min_update_interval: 0.0,
        }
    }
}

/// Per-frame input to `PerceptionCoordinator::tick`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameInput {
    pub now: f64,
    /// Measured wall-clock duration of the last frame. `None` when the host
    /// records frame times itself through `record_frame_time`, e.g. because
    /// it ticks at a fixed rate decoupled from rendered frames.
    pub frame_time_ms: Option<f32>,
    pub reference_point: Option<Pos3>,
}

/// A ray refused by the budget, waiting for a later tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeferredCast {
    pub provider: ProviderId,
    pub ray: usize,
    /// The provider's episode when the cast was queued.
    pub epoch: u64,
    pub enqueued_tick: u64,
}

/// The per-tick cast ceiling plus the deferred queue behind it.
#[derive(Debug, Clone)]
pub struct CastBudget {
    ceiling: u32,
    used: u32,
    tick: u64,
    queue: VecDeque<DeferredCast>,
    capacity: usize,
    policy: DropPolicy,
    dropped: u64,
}

impl CastBudget {
    pub fn new(ceiling: u32, capacity: usize, policy: DropPolicy) -> Self {
        Self {
            ceiling,
            used: 0,
            tick: 0,
            queue: VecDeque::new(),
            capacity: capacity.max(1),
            policy,
            dropped: 0,
        }
    }

    /// A budget that never refuses, for providers driven without a
    /// coordinator.
    pub fn unlimited() -> Self {
        Self::new(u32::MAX, 1, DropPolicy::DropNewest)
    }

    pub fn begin_tick(&mut self) {
        self.tick += 1;
        self.used = 0;
    }

    pub fn can_perform_cast(&self) -> bool {
        self.used < self.ceiling
    }

    /// Claims one cast from this tick's allowance.
    pub fn try_acquire(&mut self) -> bool {
        if !self.can_perform_cast() {
            return false;
        }
        self.used += 1;
        true
    }

    /// Queues a refused cast, applying the drop policy when full.
    pub fn defer(&mut self, provider: ProviderId, ray: usize, epoch: u64) {
        let cast = DeferredCast {
            provider,
            ray,
            epoch,
            enqueued_tick: self.tick,
        };
        if self.queue.len() < self.capacity {
            self.queue.push_back(cast);
            return;
        }
        self.dropped += 1;
        match self.policy {
            DropPolicy::DropOldest => {
                self.queue.pop_front();
                self.queue.push_back(cast);
            }
            DropPolicy::DropNewest => {}
        }
        debug!(%provider, ray, dropped = self.dropped, "deferred queue full, dropped a cast");
    }

    /// Pops the oldest cast queued before the current tick.
    fn pop_due(&mut self) -> Option<DeferredCast> {
        match self.queue.front() {
            Some(cast) if cast.enqueued_tick < self.tick => self.queue.pop_front(),
            _ => None,
        }
    }

    pub fn ceiling(&self) -> u32 {
        self.ceiling
    }

    fn set_ceiling(&mut self, ceiling: u32) {
        self.ceiling = ceiling;
    }

    pub fn raycasts_this_tick(&self) -> u32 {
        self.used
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn deferred_len(&self) -> usize {
        self.queue.len()
    }

    pub fn deferred(&self) -> impl Iterator<Item = &DeferredCast> {
        self.queue.iter()
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

/// What happened during one coordinator tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    pub tick: u64,
    pub synchronous_casts: usize,
    pub newly_deferred: usize,
    pub deferred_executed: usize,
    /// Deferred casts discarded because their provider is gone or moved on.
    pub deferred_skipped: usize,
    pub errors: Vec<(ProviderId, PerceptionError)>,
}

#[derive(Debug, Clone)]
pub struct PerceptionCoordinator {
    config: CoordinatorConfig,
    registry: Vec<ProviderId>,
    budget: CastBudget,
    grid: SpatialGrid,
    global_update_interval: f32,
    frame_times: VecDeque<f32>,
    last_tune: Option<f64>,
    healthy_streak: u32,
}

impl PerceptionCoordinator {
    pub fn new(config: CoordinatorConfig) -> Result<Self, PerceptionError> {
        Ok(Self::from_validated(config.validate()?))
    }

    fn from_validated(config: CoordinatorConfig) -> Self {
        Self {
            budget: CastBudget::new(
                config.max_concurrent_raycasts,
                config.deferred_capacity,
                config.drop_policy,
            ),
            grid: SpatialGrid::new(config.spatial_cell_size),
            global_update_interval: config.base_update_interval,
            frame_times: VecDeque::with_capacity(config.frame_window),
            registry: Vec::new(),
            last_tune: None,
            healthy_streak: 0,
            config,
        }
    }

    // --- Registry ---

    /// Adds a provider. Returns false if it was already registered.
    pub fn register(&mut self, id: ProviderId, origin: Pos3) -> bool {
        self.grid.update(id, origin);
        if self.registry.contains(&id) {
            return false;
        }
        self.registry.push(id);
        true
    }

    /// Removes a provider. Its queued casts are discarded when they come up.
    pub fn unregister(&mut self, id: ProviderId) -> bool {
        self.grid.remove(id);
        let before = self.registry.len();
        self.registry.retain(|member| *member != id);
        self.registry.len() != before
    }

    pub fn is_registered(&self, id: ProviderId) -> bool {
        self.registry.contains(&id)
    }

    /// Registered providers, in registration order.
    pub fn providers(&self) -> &[ProviderId] {
        &self.registry
    }

    pub fn providers_in_area(&self, center: &Pos3, radius: f32) -> Vec<ProviderId> {
        self.grid.providers_in_area(center, radius)
    }

    // --- Budget ---

    pub fn can_perform_cast(&self) -> bool {
        self.budget.can_perform_cast()
    }

    pub fn budget(&self) -> &CastBudget {
        &self.budget
    }

    pub fn max_concurrent_raycasts(&self) -> u32 {
        self.budget.ceiling()
    }

    pub fn global_update_interval(&self) -> f32 {
        self.global_update_interval
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    // --- Tick ---

    /// Runs one simulation tick: resets the counters, lets every registered
    /// provider update in registration order, then drains casts deferred on
    /// earlier ticks up to `max(1, ceiling - used)`.
    pub fn tick<S>(&mut self, providers: &mut S, backend: &dyn QueryBackend, frame: FrameInput) -> TickReport
    where
        S: ProviderSet + ?Sized,
    {
        if let Some(frame_time_ms) = frame.frame_time_ms {
            self.record_frame_time(frame_time_ms);
        }
        self.maybe_tune(frame.now);
        self.budget.begin_tick();

        let mut report = TickReport {
            tick: self.budget.tick(),
            ..Default::default()
        };
        let ctx = TickContext {
            now: frame.now,
            reference_point: frame.reference_point,
            min_update_interval: self.global_update_interval,
        };

        for &id in &self.registry {
            let Some(provider) = providers.provider_mut(id) else {
                continue;
            };
            self.grid.update(id, provider.origin());
            match provider.update(&ctx, &mut self.budget, backend) {
                Ok(UpdateOutcome::Swept { cast, deferred }) => {
                    report.synchronous_casts += cast;
                    report.newly_deferred += deferred;
                }
                Ok(UpdateOutcome::Skipped(_)) => {}
                Err(error) => {
                    warn!(%id, %error, "provider update failed");
                    report.errors.push((id, error));
                }
            }
        }

        let allowance = self
            .budget
            .ceiling()
            .saturating_sub(self.budget.raycasts_this_tick())
            .max(1) as usize;
        while report.deferred_executed < allowance {
            let Some(cast) = self.budget.pop_due() else {
                break;
            };
            let ran = self.registry.contains(&cast.provider)
                && providers
                    .provider_mut(cast.provider)
                    .is_some_and(|provider| provider.execute_deferred(&cast, backend));
            if ran {
                report.deferred_executed += 1;
            } else {
                report.deferred_skipped += 1;
            }
        }
        report
    }

    // --- Auto-tuning ---

    pub fn record_frame_time(&mut self, frame_time_ms: f32) {
        if !frame_time_ms.is_finite() || frame_time_ms < 0.0 {
            return;
        }
        if self.frame_times.len() == self.config.frame_window {
            self.frame_times.pop_front();
        }
        self.frame_times.push_back(frame_time_ms);
    }

    /// Rolling average over the last `frame_window` frames.
    pub fn average_frame_time_ms(&self) -> f32 {
        if self.frame_times.is_empty() {
            return 0.0;
        }
        self.frame_times.iter().sum::<f32>() / self.frame_times.len() as f32
    }

    fn maybe_tune(&mut self, now: f64) {
        if !self.config.auto_tune {
            return;
        }
        match self.last_tune {
            None => self.last_tune = Some(now),
            Some(last) if now - last >= f64::from(self.config.performance_update_interval) => {
                self.last_tune = Some(now);
                self.auto_tune();
            }
            Some(_) => {}
        }
    }

    /// One evaluation of the control loop. Heavy overload tightens by 20% and
    /// a full step, mild overload by 10% and half a step. After
    /// `relax_after` healthy evaluations in a row the budget loosens again.
    pub fn auto_tune(&mut self) {
        if self.frame_times.is_empty() {
            return;
        }
        let ratio = self.average_frame_time_ms() / self.config.target_frame_time_ms;
        let step = self.config.ceiling_step;
        let half_step = (step / 2).max(1);

        if ratio > 1.5 {
            self.tighten(1.2, step);
            self.healthy_streak = 0;
        } else if ratio > 1.2 {
            self.tighten(1.1, half_step);
            self.healthy_streak = 0;
        } else if ratio <= 1.0 {
            self.healthy_streak += 1;
            if self.healthy_streak >= self.config.relax_after {
                self.relax(half_step);
                self.healthy_streak = 0;
            }
        } else {
            self.healthy_streak = 0;
        }
    }

    fn tighten(&mut self, interval_factor: f32, step: u32) {
        let interval = (self.global_update_interval * interval_factor)
            .max(self.config.base_update_interval)
            .min(self.config.max_update_interval);
        let ceiling = self
            .budget
            .ceiling()
            .saturating_sub(step)
            .max(self.config.min_concurrent_raycasts);
        if interval == self.global_update_interval && ceiling == self.budget.ceiling() {
            return;
        }
        debug!(
            avg_frame_ms = self.average_frame_time_ms(),
            interval,
            ceiling,
            "perception budget tightened"
        );
        self.global_update_interval = interval;
        self.budget.set_ceiling(ceiling);
    }

    fn relax(&mut self, step: u32) {
        let interval = (self.global_update_interval / 1.1).max(self.config.base_update_interval);
        let ceiling = self
            .budget
            .ceiling()
            .saturating_add(step)
            .min(self.config.max_concurrent_raycasts);
        if interval == self.global_update_interval && ceiling == self.budget.ceiling() {
            return;
        }
        debug!(
            avg_frame_ms = self.average_frame_time_ms(),
            interval,
            ceiling,
            "perception budget relaxed"
        );
        self.global_update_interval = interval;
        self.budget.set_ceiling(ceiling);
    }

    pub fn telemetry(&self) -> Telemetry {
        Telemetry::new()
            .with("raycasts_this_tick", self.budget.raycasts_this_tick() as f32)
            .with("deferred_len", self.budget.deferred_len() as f32)
            .with("dropped_deferred", self.budget.dropped() as f32)
            .with("avg_frame_ms", self.average_frame_time_ms())
            .with("max_concurrent_raycasts", self.budget.ceiling() as f32)
            .with("global_update_interval", self.global_update_interval)
            .with("providers", self.registry.len() as f32)
    }
}

impl Default for PerceptionCoordinator {
    fn default() -> Self {
        Self::from_validated(CoordinatorConfig::default())
    }
}

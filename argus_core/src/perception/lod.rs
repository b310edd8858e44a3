// argus_core/src/perception/lod.rs

use tracing::debug;

use crate::config::{CastMode, LodLevel};

/// What changed when the controller switched levels.
#[derive(Debug, Clone, PartialEq)]
pub struct LodChange {
    pub from: Option<usize>,
    pub to: usize,
    pub active_rays: usize,
    pub update_interval: f32,
    pub cast_mode: Option<CastMode>,
}

/// Distance-driven level-of-detail selection with a hysteresis band.
///
/// Levels are sorted ascending and non-overlapping (see
/// `PerceptionConfig::validate`). The first level whose `[min, max)` holds the
/// distance wins; while a level is active it is kept until the distance leaves
/// `[min - hysteresis, max + hysteresis)`. When no level matches, the previous
/// one stays in force.
#[derive(Debug, Clone)]
pub struct LodController {
    levels: Vec<LodLevel>,
    hysteresis: f32,
    evaluation_interval: f32,
    base_ray_count: usize,
    base_interval: f32,
    current: Option<usize>,
    last_evaluation: Option<f64>,
}

impl LodController {
    pub fn new(
        levels: Vec<LodLevel>,
        hysteresis: f32,
        evaluation_interval: f32,
        base_ray_count: usize,
        base_interval: f32,
    ) -> Self {
        Self {
            levels,
            hysteresis,
            evaluation_interval,
            base_ray_count,
            base_interval,
            current: None,
            last_evaluation: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.levels.is_empty()
    }

    pub fn levels(&self) -> &[LodLevel] {
        &self.levels
    }

    pub fn current(&self) -> Option<usize> {
        self.current
    }

    pub fn current_level(&self) -> Option<&LodLevel> {
        self.current.map(|i| &self.levels[i])
    }

    /// Horizontal rays per layer under the current level.
    pub fn active_ray_count(&self) -> usize {
        match self.current_level() {
            Some(level) => scaled_ray_count(self.base_ray_count, level.ray_count_multiplier),
            None => self.base_ray_count,
        }
    }

    /// Seconds between sweeps under the current level.
    pub fn update_interval(&self) -> f32 {
        match self.current_level() {
            Some(level) => self.base_interval * level.update_frequency_multiplier,
            None => self.base_interval,
        }
    }

    pub fn cast_mode_override(&self) -> Option<CastMode> {
        self.current_level().and_then(|level| level.cast_mode)
    }

    /// Forgets the evaluation timer so the next `evaluate` runs immediately.
    pub fn reset_timer(&mut self) {
        self.last_evaluation = None;
    }

    /// Re-evaluates the level if the evaluation interval has elapsed.
    pub fn evaluate(&mut self, now: f64, distance: f32) -> Option<LodChange> {
        if !self.is_enabled() {
            return None;
        }
        if let Some(last) = self.last_evaluation {
            if now - last < f64::from(self.evaluation_interval) {
                return None;
            }
        }
        self.last_evaluation = Some(now);
        self.evaluate_now(distance)
    }

    /// Re-evaluates the level regardless of the timer.
    pub fn evaluate_now(&mut self, distance: f32) -> Option<LodChange> {
        let next = self.select(distance)?;
        if Some(next) == self.current {
            return None;
        }
        let from = self.current.replace(next);
        let change = LodChange {
            from,
            to: next,
            active_rays: self.active_ray_count(),
            update_interval: self.update_interval(),
            cast_mode: self.cast_mode_override(),
        };
        debug!(
            level = %self.levels[next].name,
            distance,
            active_rays = change.active_rays,
            "LOD level changed"
        );
        Some(change)
    }

    fn select(&self, distance: f32) -> Option<usize> {
        if let Some(current) = self.current {
            let level = &self.levels[current];
            if distance >= level.min_distance - self.hysteresis
                && distance < level.max_distance + self.hysteresis
            {
                return Some(current);
            }
        }
        self.levels
            .iter()
            .position(|level| level.contains(distance))
            .or(self.current)
    }
}

/// `round(base * multiplier)`, never below one ray.
pub fn scaled_ray_count(base: usize, multiplier: f32) -> usize {
    ((base as f32 * multiplier).round() as usize).clamp(1, base.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller(hysteresis: f32) -> LodController {
        LodController::new(
            vec![
                LodLevel::new("near", 0.0, 10.0),
                LodLevel::new("mid", 10.0, 30.0).with_multipliers(0.5, 2.0),
                LodLevel::new("far", 30.0, 100.0).with_multipliers(0.25, 4.0),
            ],
            hysteresis,
            0.5,
            16,
            0.1,
        )
    }

    #[test]
    fn first_matching_level_is_chosen() {
        let mut lod = controller(0.0);
        let change = lod.evaluate_now(12.0).unwrap();
        assert_eq!(change.to, 1);
        assert_eq!(change.active_rays, 8);
        assert!((change.update_interval - 0.2).abs() < 1e-6);
    }

    #[test]
    fn crossing_a_boundary_changes_once() {
        let mut lod = controller(1.0);
        lod.evaluate_now(5.0);
        let mut changes = Vec::new();
        for step in 0..40 {
            let distance = 5.0 + step as f32 * 0.25;
            if let Some(change) = lod.evaluate_now(distance) {
                changes.push(change);
            }
        }
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].active_rays, scaled_ray_count(16, 0.5));
    }

    #[test]
    fn hysteresis_holds_level_near_boundary() {
        let mut lod = controller(1.0);
        lod.evaluate_now(9.0);
        assert_eq!(lod.evaluate_now(10.5), None);
        assert_eq!(lod.current(), Some(0));
        assert_eq!(lod.evaluate_now(11.5).map(|c| c.to), Some(1));
        assert_eq!(lod.evaluate_now(9.5), None);
    }

    #[test]
    fn no_match_keeps_previous_level() {
        let mut lod = controller(0.0);
        lod.evaluate_now(50.0);
        assert_eq!(lod.evaluate_now(500.0), None);
        assert_eq!(lod.current(), Some(2));
        assert_eq!(lod.active_ray_count(), 4);
    }

    #[test]
    fn evaluation_respects_interval() {
        let mut lod = controller(0.0);
        assert!(lod.evaluate(0.0, 5.0).is_some());
        assert!(lod.evaluate(0.2, 50.0).is_none());
        assert!(lod.evaluate(0.6, 50.0).is_some());
    }

    #[test]
    fn disabled_controller_uses_base_values() {
        let mut lod = LodController::new(Vec::new(), 0.0, 0.5, 12, 0.05);
        assert!(lod.evaluate(0.0, 3.0).is_none());
        assert_eq!(lod.active_ray_count(), 12);
        assert_eq!(lod.update_interval(), 0.05);
    }
}

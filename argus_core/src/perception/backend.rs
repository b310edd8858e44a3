// argus_core/src/perception/backend.rs

//! The scene-query seam.
//!
//! `QueryBackend` is the only contract a physics or scene engine has to
//! implement. Everything above `CastAdapter` consumes `HitResult`s and never
//! sees engine types.

use nalgebra::Unit;
use thiserror::Error;

use crate::config::CastMode;
use crate::perception::hit::HitResult;
use crate::perception::ray_fan::RayDescriptor;
use crate::types::{LayerMask, ObjectHandle, Pos3, Vec3};

/// A single scene query, expressed in world coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct CastQuery {
    pub mode: CastMode,
    pub origin: Pos3,
    pub direction: Unit<Vec3>,
    pub max_distance: f32,
    pub layer_mask: LayerMask,
    /// The perceiver's own object, which must never be reported.
    pub ignore: Option<ObjectHandle>,
}

/// What a backend reports for a successful query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackendHit {
    pub distance: f32,
    pub point: Pos3,
    pub normal: Vec3,
    pub object: Option<ObjectHandle>,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    #[error("invalid cast shape for {mode}: {reason}")]
    InvalidShape { mode: &'static str, reason: String },

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

/// An object the classifier can ask for its class tags.
pub trait ClassifiableObject {
    /// Tags matched against detection class names.
    fn class_tags(&self) -> &[String];

    /// The object's own label, used when no configured class matches.
    fn label(&self) -> Option<&str> {
        None
    }

    /// World-space velocity, if the backend tracks one.
    fn velocity(&self) -> Vec3 {
        Vec3::zeros()
    }
}

/// The contract for any scene engine that can answer perception queries.
pub trait QueryBackend {
    /// Executes one query. `Ok(None)` is a miss.
    fn cast(&self, query: &CastQuery) -> Result<Option<BackendHit>, BackendError>;

    /// Resolves a hit object to its classification capability.
    fn classifiable(&self, object: ObjectHandle) -> Option<&dyn ClassifiableObject>;
}

/// The result of one adapted cast: always a `HitResult`, plus the backend
/// error that was swallowed, if any.
#[derive(Debug, Clone)]
pub struct CastOutcome {
    pub hit: HitResult,
    pub error: Option<BackendError>,
}

/// Wraps a backend so every cast yields a well-formed `HitResult`.
///
/// Distances are raw here; the provider normalizes and classifies.
pub struct CastAdapter<'a> {
    backend: &'a dyn QueryBackend,
}

impl<'a> CastAdapter<'a> {
    pub fn new(backend: &'a dyn QueryBackend) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &'a dyn QueryBackend {
        self.backend
    }

    pub fn cast(&self, query: &CastQuery, ray: &RayDescriptor) -> CastOutcome {
        let miss = || HitResult::miss(query.max_distance, ray.horizontal_angle);

        if let Err(error) = check_query(query) {
            return CastOutcome {
                hit: miss(),
                error: Some(error),
            };
        }

        match self.backend.cast(query) {
            Ok(Some(found)) if found.distance.is_finite() && found.distance <= query.max_distance => {
                let mut hit = miss();
                hit.has_hit = true;
                hit.distance = found.distance.max(0.0);
                hit.hit_point = found.point;
                hit.hit_normal = found.normal;
                hit.object = found.object;
                CastOutcome { hit, error: None }
            }
            Ok(Some(found)) => CastOutcome {
                hit: miss(),
                error: Some(BackendError::InvalidQuery(format!(
                    "hit distance {} outside [0, {}]",
                    found.distance, query.max_distance
                ))),
            },
            Ok(None) => CastOutcome {
                hit: miss(),
                error: None,
            },
            Err(error) => CastOutcome {
                hit: miss(),
                error: Some(error),
            },
        }
    }
}

/// Rejects queries no backend could answer meaningfully.
fn check_query(query: &CastQuery) -> Result<(), BackendError> {
    if !(query.max_distance > 0.0) || !query.max_distance.is_finite() {
        return Err(BackendError::InvalidQuery(format!(
            "max distance {}",
            query.max_distance
        )));
    }
    let positive = |value: f32| value > 0.0 && value.is_finite();
    let shape_ok = match query.mode {
        CastMode::Ray | CastMode::Overlap => true,
        CastMode::Sphere { radius } => positive(radius),
        CastMode::Capsule { radius, half_height } => positive(radius) && half_height >= 0.0,
        CastMode::Box { half_extents } => half_extents.iter().all(|&e| positive(e)),
    };
    if shape_ok {
        Ok(())
    } else {
        Err(BackendError::InvalidShape {
            mode: query.mode.name(),
            reason: format!("{:?}", query.mode),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::perception::ray_fan::direction_from_angles;
    use std::cell::Cell;

    struct Scripted {
        answer: Result<Option<BackendHit>, BackendError>,
        calls: Cell<usize>,
    }

    impl QueryBackend for Scripted {
        fn cast(&self, _query: &CastQuery) -> Result<Option<BackendHit>, BackendError> {
            self.calls.set(self.calls.get() + 1);
            self.answer.clone()
        }

        fn classifiable(&self, _object: ObjectHandle) -> Option<&dyn ClassifiableObject> {
            None
        }
    }

    fn ray(angle: f32) -> RayDescriptor {
        RayDescriptor {
            direction: direction_from_angles(angle, 0.0),
            horizontal_angle: angle,
            vertical_angle: 0.0,
            active: true,
        }
    }

    fn query(mode: CastMode) -> CastQuery {
        CastQuery {
            mode,
            origin: Pos3::origin(),
            direction: direction_from_angles(0.0, 0.0),
            max_distance: 10.0,
            layer_mask: LayerMask::ALL,
            ignore: None,
        }
    }

    #[test]
    fn miss_keeps_angle_and_max_distance() {
        let backend = Scripted {
            answer: Ok(None),
            calls: Cell::new(0),
        };
        let outcome = CastAdapter::new(&backend).cast(&query(CastMode::Ray), &ray(-30.0));
        assert!(!outcome.hit.has_hit);
        assert_eq!(outcome.hit.distance, 10.0);
        assert_eq!(outcome.hit.angle, -30.0);
        assert_eq!(outcome.hit.importance, 0.0);
        assert!(outcome.error.is_none());
    }

    #[test]
    fn backend_error_degrades_to_miss() {
        let backend = Scripted {
            answer: Err(BackendError::Unavailable("pipeline not built".into())),
            calls: Cell::new(0),
        };
        let outcome = CastAdapter::new(&backend).cast(&query(CastMode::Ray), &ray(12.0));
        assert!(!outcome.hit.has_hit);
        assert_eq!(outcome.hit.distance, 10.0);
        assert!(matches!(outcome.error, Some(BackendError::Unavailable(_))));
    }

    #[test]
    fn zero_radius_sphere_never_reaches_backend() {
        let backend = Scripted {
            answer: Ok(None),
            calls: Cell::new(0),
        };
        let outcome =
            CastAdapter::new(&backend).cast(&query(CastMode::Sphere { radius: 0.0 }), &ray(0.0));
        assert!(!outcome.hit.has_hit);
        assert!(matches!(outcome.error, Some(BackendError::InvalidShape { .. })));
        assert_eq!(backend.calls.get(), 0);
    }

    #[test]
    fn invalid_capsule_and_box_shapes_never_reach_backend() {
        let backend = Scripted {
            answer: Ok(Some(BackendHit {
                distance: 1.0,
                point: Pos3::new(0.0, 0.0, 1.0),
                normal: -Vec3::z(),
                object: None,
            })),
            calls: Cell::new(0),
        };
        let adapter = CastAdapter::new(&backend);
        let invalid = [
            CastMode::Capsule {
                radius: 0.0,
                half_height: 1.0,
            },
            CastMode::Capsule {
                radius: 0.5,
                half_height: -0.1,
            },
            CastMode::Box {
                half_extents: [0.5, 0.0, 0.5],
            },
            CastMode::Box {
                half_extents: [0.5, 0.5, -1.0],
            },
        ];
        for mode in invalid {
            let outcome = adapter.cast(&query(mode), &ray(5.0));
            assert!(!outcome.hit.has_hit, "{mode:?} should miss");
            assert_eq!(outcome.hit.distance, 10.0);
            assert!(matches!(outcome.error, Some(BackendError::InvalidShape { .. })));
        }
        assert_eq!(backend.calls.get(), 0);

        // A flat capsule (half_height 0) is still a valid sphere-like shape.
        let outcome = adapter.cast(
            &query(CastMode::Capsule {
                radius: 0.5,
                half_height: 0.0,
            }),
            &ray(0.0),
        );
        assert!(outcome.hit.has_hit);
        assert_eq!(backend.calls.get(), 1);
    }

    #[test]
    fn out_of_range_hit_is_a_miss() {
        let backend = Scripted {
            answer: Ok(Some(BackendHit {
                distance: 25.0,
                point: Pos3::new(0.0, 0.0, 25.0),
                normal: -Vec3::z(),
                object: None,
            })),
            calls: Cell::new(0),
        };
        let outcome = CastAdapter::new(&backend).cast(&query(CastMode::Ray), &ray(0.0));
        assert!(!outcome.hit.has_hit);
        assert!(outcome.error.is_some());
    }

    #[test]
    fn hit_is_forwarded() {
        let backend = Scripted {
            answer: Ok(Some(BackendHit {
                distance: 4.0,
                point: Pos3::new(0.0, 0.0, 4.0),
                normal: -Vec3::z(),
                object: Some(ObjectHandle(3)),
            })),
            calls: Cell::new(0),
        };
        let outcome = CastAdapter::new(&backend).cast(&query(CastMode::Ray), &ray(0.0));
        assert!(outcome.hit.has_hit);
        assert_eq!(outcome.hit.distance, 4.0);
        assert_eq!(outcome.hit.object, Some(ObjectHandle(3)));
    }
}

// argus_sim/src/simulation/plugins/perception/avian_backend.rs

//! Answers perception queries with avian's spatial query pipeline.

use argus_core::prelude::{
    BackendError, BackendHit, CastMode, CastQuery, ClassifiableObject, ObjectHandle, QueryBackend,
};
use avian3d::prelude::{Collider, ShapeCastConfig, SpatialQuery, SpatialQueryFilter};
use bevy::ecs::system::SystemParam;
use bevy::prelude::*;

use super::DetectionTags;
use crate::simulation::core::transforms::{
    bevy_point_to_pos3, bevy_vector_to_vec3, nalgebra_quat_to_bevy, pos3_to_bevy_point,
    vec3_to_bevy_vector,
};
use nalgebra::UnitQuaternion;

/// A `QueryBackend` over the physics world.
///
/// Collider entities are the object handles. Tags come from the
/// `DetectionTags` component on the hit entity; untagged colliders are still
/// hit but never classified.
#[derive(SystemParam)]
pub struct AvianQueryBackend<'w, 's> {
    spatial: SpatialQuery<'w, 's>,
    tags: Query<'w, 's, &'static DetectionTags>,
}

impl AvianQueryBackend<'_, '_> {
    fn filter(query: &CastQuery) -> SpatialQueryFilter {
        let filter = SpatialQueryFilter::from_mask(query.layer_mask.0);
        match query.ignore.and_then(ObjectHandle::to_entity) {
            Some(owner) => filter.with_excluded_entities([owner]),
            None => filter,
        }
    }

    fn collider_for(mode: CastMode) -> Option<Collider> {
        match mode {
            CastMode::Ray | CastMode::Overlap => None,
            CastMode::Sphere { radius } => Some(Collider::sphere(radius)),
            CastMode::Capsule { radius, half_height } => {
                Some(Collider::capsule(radius, 2.0 * half_height))
            }
            CastMode::Box { half_extents } => {
                let [x, y, z] = half_extents;
                Some(Collider::cuboid(2.0 * x, 2.0 * y, 2.0 * z))
            }
        }
    }
}

impl QueryBackend for AvianQueryBackend<'_, '_> {
    fn cast(&self, query: &CastQuery) -> Result<Option<BackendHit>, BackendError> {
        let origin = pos3_to_bevy_point(&query.origin);
        let filter = Self::filter(query);

        if query.mode == CastMode::Overlap {
            // Point projection reports the closest surface point of the
            // nearest collider, which is the overlap query's nearest object.
            let Some(projection) = self.spatial.project_point(origin, true, &filter) else {
                return Ok(None);
            };
            let offset = projection.point - origin;
            let distance = if projection.is_inside { 0.0 } else { offset.length() };
            if distance > query.max_distance {
                return Ok(None);
            }
            let normal = offset.try_normalize().map_or(Vec3::ZERO, |n| -n);
            return Ok(Some(BackendHit {
                distance,
                point: bevy_point_to_pos3(&projection.point),
                normal: bevy_vector_to_vec3(&normal),
                object: Some(ObjectHandle::from_entity(projection.entity)),
            }));
        }

        let direction = Dir3::new(vec3_to_bevy_vector(query.direction.as_ref()))
            .map_err(|e| BackendError::InvalidQuery(format!("ray direction: {e:?}")))?;

        match Self::collider_for(query.mode) {
            None => Ok(self
                .spatial
                .cast_ray(origin, direction, query.max_distance, true, &filter)
                .map(|hit| BackendHit {
                    distance: hit.distance,
                    point: bevy_point_to_pos3(&(origin + *direction * hit.distance)),
                    normal: bevy_vector_to_vec3(&hit.normal),
                    object: Some(ObjectHandle::from_entity(hit.entity)),
                })),
            Some(shape) => {
                // Shapes are swept axis-aligned with the ray.
                let rotation = nalgebra_quat_to_bevy(&UnitQuaternion::rotation_between(
                    &argus_core::prelude::Vec3::z(),
                    query.direction.as_ref(),
                )
                .unwrap_or_else(UnitQuaternion::identity));
                let config = ShapeCastConfig::from_max_distance(query.max_distance);
                Ok(self
                    .spatial
                    .cast_shape(&shape, origin, rotation, direction, &config, &filter)
                    .map(|hit| BackendHit {
                        distance: hit.distance,
                        point: bevy_point_to_pos3(&hit.point1),
                        normal: bevy_vector_to_vec3(&hit.normal1),
                        object: Some(ObjectHandle::from_entity(hit.entity)),
                    }))
            }
        }
    }

    fn classifiable(&self, object: ObjectHandle) -> Option<&dyn ClassifiableObject> {
        let entity = object.to_entity()?;
        self.tags
            .get(entity)
            .ok()
            .map(|tags| tags as &dyn ClassifiableObject)
    }
}

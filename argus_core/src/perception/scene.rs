// argus_core/src/perception/scene.rs

//! An in-memory analytic scene that implements `QueryBackend`.
//!
//! Shapes are boxed trait objects so hosts can add their own primitives; the
//! scene stays `Clone` through `dyn-clone`. Swept casts (sphere, capsule,
//! box) are answered by inflating each target by the cast shape's bounding radius,
//! which is exact for spheres and conservative for boxes.

use dyn_clone::DynClone;
use nalgebra::Unit;
use std::fmt::Debug;

use crate::config::CastMode;
use crate::perception::backend::{BackendHit, CastQuery, ClassifiableObject, QueryBackend, BackendError};
use crate::types::{ObjectHandle, Pos3, Vec3};

/// A solid primitive the scene can intersect.
pub trait SceneShape: Debug + DynClone + Send + Sync {
    /// Entry distance and surface normal of a ray against this shape grown by
    /// `inflate`. An origin inside the shape hits at distance zero.
    fn ray_hit(&self, origin: &Pos3, direction: &Unit<Vec3>, max_distance: f32, inflate: f32)
        -> Option<(f32, Vec3)>;

    /// The point of the shape closest to `point` (the point itself if inside).
    fn closest_point(&self, point: &Pos3) -> Pos3;

    fn translate(&mut self, delta: &Vec3);
}

dyn_clone::clone_trait_object!(SceneShape);

#[derive(Debug, Clone, PartialEq)]
pub struct Sphere {
    pub center: Pos3,
    pub radius: f32,
}

impl Sphere {
    pub fn new(center: Pos3, radius: f32) -> Self {
        Self { center, radius }
    }
}

impl SceneShape for Sphere {
    fn ray_hit(&self, origin: &Pos3, direction: &Unit<Vec3>, max_distance: f32, inflate: f32)
        -> Option<(f32, Vec3)> {
        let radius = self.radius + inflate;
        let oc = origin - self.center;
        let c = oc.norm_squared() - radius * radius;
        if c <= 0.0 {
            return Some((0.0, -direction.into_inner()));
        }
        let b = oc.dot(direction);
        if b > 0.0 {
            return None; // Outside and pointing away.
        }
        let discriminant = b * b - c;
        if discriminant < 0.0 {
            return None;
        }
        let t = -b - discriminant.sqrt();
        if t > max_distance {
            return None;
        }
        let point = origin + direction.into_inner() * t;
        Some((t, (point - self.center) / radius))
    }

    fn closest_point(&self, point: &Pos3) -> Pos3 {
        let offset = point - self.center;
        let length = offset.norm();
        if length <= self.radius {
            return *point;
        }
        self.center + offset * (self.radius / length)
    }

    fn translate(&mut self, delta: &Vec3) {
        self.center += delta;
    }
}

/// An axis-aligned box.
#[derive(Debug, Clone, PartialEq)]
pub struct Cuboid {
    pub min: Pos3,
    pub max: Pos3,
}

impl Cuboid {
    pub fn new(center: Pos3, half_extents: Vec3) -> Self {
        Self {
            min: center - half_extents,
            max: center + half_extents,
        }
    }
}

impl SceneShape for Cuboid {
    fn ray_hit(&self, origin: &Pos3, direction: &Unit<Vec3>, max_distance: f32, inflate: f32)
        -> Option<(f32, Vec3)> {
        let grow = Vec3::repeat(inflate);
        let (min, max) = (self.min - grow, self.max + grow);

        let mut t_enter = f32::NEG_INFINITY;
        let mut t_exit = f32::INFINITY;
        let mut normal = Vec3::zeros();
        for axis in 0..3 {
            let o = origin[axis];
            let d = direction[axis];
            if d.abs() < f32::EPSILON {
                if o < min[axis] || o > max[axis] {
                    return None;
                }
                continue;
            }
            let (mut t0, mut t1) = ((min[axis] - o) / d, (max[axis] - o) / d);
            let mut sign = -1.0;
            if t0 > t1 {
                std::mem::swap(&mut t0, &mut t1);
                sign = 1.0;
            }
            if t0 > t_enter {
                t_enter = t0;
                normal = Vec3::zeros();
                normal[axis] = sign;
            }
            t_exit = t_exit.min(t1);
            if t_enter > t_exit {
                return None;
            }
        }
        if t_exit < 0.0 {
            return None;
        }
        if t_enter <= 0.0 {
            return Some((0.0, -direction.into_inner()));
        }
        (t_enter <= max_distance).then_some((t_enter, normal))
    }

    fn closest_point(&self, point: &Pos3) -> Pos3 {
        Pos3::new(
            point.x.clamp(self.min.x, self.max.x),
            point.y.clamp(self.min.y, self.max.y),
            point.z.clamp(self.min.z, self.max.z),
        )
    }

    fn translate(&mut self, delta: &Vec3) {
        self.min += delta;
        self.max += delta;
    }
}

/// One object in the scene: a shape plus what the classifier needs.
#[derive(Debug, Clone)]
pub struct SceneObject {
    pub shape: Box<dyn SceneShape>,
    pub tags: Vec<String>,
    pub label: Option<String>,
    /// Bitmask of layers this object lives on.
    pub layers: u32,
    pub velocity: Vec3,
}

impl SceneObject {
    pub fn new(shape: impl SceneShape + 'static) -> Self {
        Self {
            shape: Box::new(shape),
            tags: Vec::new(),
            label: None,
            layers: 1,
            velocity: Vec3::zeros(),
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_layers(mut self, layers: u32) -> Self {
        self.layers = layers;
        self
    }

    pub fn with_velocity(mut self, velocity: Vec3) -> Self {
        self.velocity = velocity;
        self
    }
}

impl ClassifiableObject for SceneObject {
    fn class_tags(&self) -> &[String] {
        &self.tags
    }

    fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    fn velocity(&self) -> Vec3 {
        self.velocity
    }
}

#[derive(Debug, Clone, Default)]
pub struct PrimitiveScene {
    objects: Vec<(ObjectHandle, SceneObject)>,
    next_handle: u64,
}

impl PrimitiveScene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, object: SceneObject) -> ObjectHandle {
        self.next_handle += 1;
        let handle = ObjectHandle(self.next_handle);
        self.objects.push((handle, object));
        handle
    }

    pub fn remove(&mut self, handle: ObjectHandle) -> Option<SceneObject> {
        let index = self.objects.iter().position(|(h, _)| *h == handle)?;
        Some(self.objects.remove(index).1)
    }

    pub fn get(&self, handle: ObjectHandle) -> Option<&SceneObject> {
        self.objects.iter().find(|(h, _)| *h == handle).map(|(_, o)| o)
    }

    pub fn get_mut(&mut self, handle: ObjectHandle) -> Option<&mut SceneObject> {
        self.objects.iter_mut().find(|(h, _)| *h == handle).map(|(_, o)| o)
    }

    /// Moves every object by `velocity * dt`.
    pub fn step(&mut self, dt: f32) {
        for (_, object) in &mut self.objects {
            let delta = object.velocity * dt;
            object.shape.translate(&delta);
        }
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    fn candidates<'a>(&'a self, query: &'a CastQuery) -> impl Iterator<Item = &'a (ObjectHandle, SceneObject)> {
        self.objects.iter().filter(move |(handle, object)| {
            query.layer_mask.intersects(object.layers) && Some(*handle) != query.ignore
        })
    }

    fn sweep(&self, query: &CastQuery, inflate: f32) -> Option<BackendHit> {
        let mut best: Option<BackendHit> = None;
        for (handle, object) in self.candidates(query) {
            let limit = best.map_or(query.max_distance, |b| b.distance);
            if let Some((distance, normal)) =
                object.shape.ray_hit(&query.origin, &query.direction, limit, inflate)
            {
                if best.map_or(true, |b| distance < b.distance) {
                    best = Some(BackendHit {
                        distance,
                        point: query.origin + query.direction.into_inner() * distance,
                        normal,
                        object: Some(*handle),
                    });
                }
            }
        }
        best
    }

    fn overlap(&self, query: &CastQuery) -> Option<BackendHit> {
        let mut best: Option<BackendHit> = None;
        for (handle, object) in self.candidates(query) {
            let point = object.shape.closest_point(&query.origin);
            let offset = query.origin - point;
            let distance = offset.norm();
            if distance > query.max_distance || best.is_some_and(|b| distance >= b.distance) {
                continue;
            }
            let normal = if distance > f32::EPSILON { offset / distance } else { Vec3::zeros() };
            best = Some(BackendHit {
                distance,
                point,
                normal,
                object: Some(*handle),
            });
        }
        best
    }
}

impl QueryBackend for PrimitiveScene {
    fn cast(&self, query: &CastQuery) -> Result<Option<BackendHit>, BackendError> {
        let hit = match query.mode {
            CastMode::Ray => self.sweep(query, 0.0),
            CastMode::Sphere { radius } => self.sweep(query, radius),
            CastMode::Capsule { radius, half_height } => self.sweep(query, radius + half_height),
            CastMode::Box { half_extents } => {
                self.sweep(query, Vec3::from(half_extents).norm())
            }
            CastMode::Overlap => self.overlap(query),
        };
        Ok(hit)
    }

    fn classifiable(&self, object: ObjectHandle) -> Option<&dyn ClassifiableObject> {
        self.get(object).map(|o| o as &dyn ClassifiableObject)
    }
}

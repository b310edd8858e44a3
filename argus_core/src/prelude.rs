// argus_core/src/prelude.rs

// --- Core Abstractions (The main contracts of the library) ---
pub use crate::perception::backend::{
    BackendError, BackendHit, CastQuery, ClassifiableObject, QueryBackend,
};
pub use crate::perception::coordinator::ProviderSet;

// --- Core Data Structures (The "nouns" of the library) ---
pub use crate::perception::hit::HitResult;
pub use crate::perception::ray_fan::RayDescriptor;
pub use crate::perception::telemetry::Telemetry;
pub use crate::types::{LayerMask, ObjectHandle, Pos3, Pose, ProviderId, Vec3};

// --- Configuration & Errors ---
pub use crate::config::{
    CastMode, CoordinatorConfig, DetectionClass, DropPolicy, LodLevel, ObservationFlags,
    PerceptionConfig, ScheduleMode,
};
pub use crate::error::PerceptionError;

// --- Engine ---
pub use crate::perception::coordinator::{FrameInput, PerceptionCoordinator, TickContext, TickReport};
pub use crate::perception::provider::{PerceptionProvider, ProviderState, SkipReason, UpdateOutcome};

// --- Backends ---
pub use crate::perception::scene::{Cuboid, PrimitiveScene, SceneObject, SceneShape, Sphere};

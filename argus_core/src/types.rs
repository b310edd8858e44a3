// argus_core/src/types.rs

use nalgebra::{Isometry3, Point3, Vector3};
use std::fmt;

// --- Core Type Aliases ---
pub type Vec3 = Vector3<f32>;
pub type Pos3 = Point3<f32>;
pub type Pose = Isometry3<f32>;

// --- Core Identifiers ---

/// A framework-agnostic handle to an object living in the scene backend.
/// In the Bevy sim this is the bits of the collider's `Entity`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ObjectHandle(pub u64);

impl ObjectHandle {
    // A convenience method for use in the Bevy adapter crate.
    #[cfg(feature = "bevy")] // This will only compile if the "bevy" feature is enabled
    pub fn from_entity(entity: bevy_ecs::prelude::Entity) -> Self {
        Self(entity.to_bits())
    }

    #[cfg(feature = "bevy")]
    pub fn to_entity(self) -> Option<bevy_ecs::prelude::Entity> {
        bevy_ecs::prelude::Entity::try_from_bits(self.0).ok()
    }
}

/// Identity of one `PerceptionProvider` inside a `PerceptionCoordinator`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ProviderId(pub u64);

impl ProviderId {
    #[cfg(feature = "bevy")]
    pub fn from_entity(entity: bevy_ecs::prelude::Entity) -> Self {
        Self(entity.to_bits())
    }

    #[cfg(feature = "bevy")]
    pub fn to_entity(self) -> Option<bevy_ecs::prelude::Entity> {
        bevy_ecs::prelude::Entity::try_from_bits(self.0).ok()
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "provider#{}", self.0)
    }
}

/// A bitmask selecting which scene layers a cast may hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Deserialize)]
#[serde(transparent)]
pub struct LayerMask(pub u32);

impl LayerMask {
    pub const ALL: Self = Self(u32::MAX);
    pub const NONE: Self = Self(0);

    /// True when any bit of `layers` is also set in this mask.
    pub fn intersects(self, layers: u32) -> bool {
        self.0 & layers != 0
    }
}

impl Default for LayerMask {
    fn default() -> Self {
        Self::ALL
    }
}

//! Cinder ECS -- archetype-pooled entity/component storage with a scene graph.
//!
//! Entities are generational handles. Each distinct set of component kinds
//! (an [`Archetype`](archetype::Archetype)) gets one
//! [`ComponentPool`](pool::ComponentPool): a packed byte buffer of fixed-size
//! slots whose layout is computed from the kinds' sizes. Adding or removing
//! components migrates the entity's bytes to the pool of its new archetype.
//! Entities also form a parent/child forest with cached world transforms.
//!
//! # Quick Start
//!
//! ```
//! use cinder_ecs::prelude::*;
//!
//! #[repr(C)]
//! #[derive(Debug, Clone, Copy, Default, PartialEq, bytemuck_derive::Pod, bytemuck_derive::Zeroable)]
//! struct Velocity { x: f32, y: f32, z: f32 }
//!
//! let mut kinds = KindTable::new();
//! let velocity = kinds.register::<Velocity>("velocity");
//! let mut scene = Scene::new(kinds);
//!
//! let entity = scene.entity_new(ComponentKind::TRANSFORM | velocity);
//! scene.component_get_mut::<Velocity>(entity).x = 2.0;
//!
//! let moving: Vec<Entity> = scene.query(Archetype::of(velocity)).map(|row| row.entity()).collect();
//! assert_eq!(moving, vec![entity]);
//! assert_eq!(scene.component_get::<Velocity>(entity), &Velocity { x: 2.0, y: 0.0, z: 0.0 });
//! ```

#![deny(unsafe_code)]

pub mod archetype;
pub mod component;
pub mod config;
pub mod entity;
pub mod handle;
pub mod hierarchy;
pub mod pool;
pub mod query;
#[allow(unsafe_code)]
pub mod resource;
pub mod scene;
pub mod system;
#[allow(unsafe_code)]
pub mod transform;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors returned by the checked accessors and by configuration loading.
///
/// Misuse of the core operations (stale handles, missing components) panics
/// instead; see the `# Panics` sections of [`Scene`](scene::Scene).
#[derive(Debug, thiserror::Error)]
pub enum SceneError {
    /// The entity was removed (or its index reused by a newer entity).
    #[error("entity {entity:?} does not exist (stale or never allocated)")]
    StaleEntity { entity: entity::Entity },

    /// The entity is alive but its archetype lacks the component.
    #[error("entity {entity:?} has no '{component}' component")]
    MissingComponent {
        entity: entity::Entity,
        component: String,
    },

    /// A component type was referenced that has not been registered.
    #[error("component type '{name}' not registered. Registered components: [{registered}]")]
    UnknownComponent { name: String, registered: String },

    #[error("invalid scene config: {0}")]
    InvalidConfig(String),

    #[error("failed to parse scene config: {0}")]
    ConfigParse(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::archetype::{Archetype, SlotLayout, SLOT_ALIGN};
    pub use crate::component::{Component, ComponentKind, KindTable};
    pub use crate::config::SceneConfig;
    pub use crate::entity::Entity;
    pub use crate::handle::{Handle, HandlePool};
    pub use crate::hierarchy::{clear_dirty_system, update_dirty_system};
    pub use crate::pool::{ComponentPool, PoolId};
    pub use crate::query::{QueryCursor, QueryRow, QueryRowMut};
    pub use crate::resource::{CountedResource, RefCounts, ResourceCounter, ResourceId};
    pub use crate::scene::{Scene, SceneStats};
    pub use crate::system::{FrameContext, FrameDiagnostics, SystemFlow};
    pub use crate::transform::Transform;
    pub use crate::SceneError;
}

// ---------------------------------------------------------------------------
// Integration Tests
// ---------------------------------------------------------------------------

//! Component kind registration and metadata.
//!
//! Every component type stored in a [`Scene`](crate::scene::Scene) is
//! registered once in a [`KindTable`] before the scene is built. Registration
//! assigns the type a [`ComponentKind`], a bit position in an
//! [`Archetype`](crate::archetype::Archetype) mask. The table is closed after
//! that: a scene owns its table and it never changes for the scene's lifetime.
//!
//! Component types are plain-old-data ([`bytemuck::Pod`]) because pools store
//! them as raw bytes and migrate them between archetypes with a byte copy.

use std::any::{type_name, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use bytemuck::Pod;
use serde::{Deserialize, Serialize};

use crate::archetype::{Archetype, SLOT_ALIGN};
use crate::resource::{CountedResource, ResourceCounter, ResourceId};
use crate::transform::Transform;

/// Upper bound on registered component kinds (one bit each in an archetype).
pub const MAX_KINDS: usize = 64;

// ---------------------------------------------------------------------------
// Component
// ---------------------------------------------------------------------------

/// Marker for types that can live in a component pool.
///
/// Blanket-implemented for every `Pod + Default` type. `Default` supplies the
/// byte image a freshly allocated slot starts with.
pub trait Component: Pod + Default + 'static {}

impl<T: Pod + Default + 'static> Component for T {}

// ---------------------------------------------------------------------------
// ComponentKind
// ---------------------------------------------------------------------------

/// Bit position of a registered component type.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ComponentKind(pub(crate) u8);

impl ComponentKind {
    /// Kind 0 is always [`Transform`]; [`KindTable::new`] registers it.
    pub const TRANSFORM: ComponentKind = ComponentKind(0);

    /// Build a kind from its bit index.
    ///
    /// # Panics
    ///
    /// Panics if `index >= MAX_KINDS`.
    pub fn from_index(index: usize) -> Self {
        assert!(index < MAX_KINDS, "component kind {index} out of range");
        Self(index as u8)
    }

    /// The bit index.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// The single-bit mask for this kind.
    #[inline]
    pub fn bit(self) -> u64 {
        1u64 << self.0
    }
}

impl fmt::Debug for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ComponentKind({})", self.0)
    }
}

// ---------------------------------------------------------------------------
// KindInfo
// ---------------------------------------------------------------------------

/// Type-erased teardown for kinds that hold a counted resource reference.
type ReleaseFn = Box<dyn Fn(&[u8])>;

/// Metadata about a registered component kind.
pub struct KindInfo {
    /// Bit assigned at registration time.
    pub kind: ComponentKind,
    /// Human-readable name (supplied by the caller).
    pub name: String,
    /// `std::mem::size_of::<T>()`
    pub size: usize,
    /// `std::mem::align_of::<T>()`
    pub align: usize,
    /// Rust `TypeId` for runtime type checking.
    pub type_id: TypeId,
    /// Bytes of `T::default()`, copied into every new slot.
    pub(crate) default_bytes: Vec<u8>,
    release: Option<ReleaseFn>,
}

impl KindInfo {
    /// Whether removing a slot of this kind must release a resource reference.
    pub fn owns_resource(&self) -> bool {
        self.release.is_some()
    }
}

impl fmt::Debug for KindInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KindInfo")
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("size", &self.size)
            .field("align", &self.align)
            .field("owns_resource", &self.owns_resource())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// KindTable
// ---------------------------------------------------------------------------

/// Registry mapping Rust types to [`ComponentKind`]s and their metadata.
///
/// A type can only be registered once; registering it again returns the
/// existing kind and ignores the new name.
#[derive(Debug)]
pub struct KindTable {
    /// TypeId -> kind for dedup.
    by_type: HashMap<TypeId, ComponentKind>,
    /// Name -> kind for lookup by string name.
    by_name: HashMap<String, ComponentKind>,
    /// Indexed by kind bit.
    infos: Vec<KindInfo>,
}

impl KindTable {
    /// Create a table with [`Transform`] pre-registered as
    /// [`ComponentKind::TRANSFORM`].
    pub fn new() -> Self {
        let mut table = Self {
            by_type: HashMap::new(),
            by_name: HashMap::new(),
            infos: Vec::new(),
        };
        let transform = table.register::<Transform>("transform");
        debug_assert_eq!(transform, ComponentKind::TRANSFORM);
        table
    }

    /// Register a component type under `name`.
    ///
    /// # Panics
    ///
    /// - If [`MAX_KINDS`] kinds are already registered.
    /// - If `name` is already taken by a different type.
    /// - If `T` needs alignment above the slot boundary.
    pub fn register<T: Component>(&mut self, name: &str) -> ComponentKind {
        if let Some(&existing) = self.by_type.get(&TypeId::of::<T>()) {
            return existing;
        }
        assert!(
            self.infos.len() < MAX_KINDS,
            "cannot register '{name}': all {MAX_KINDS} component kinds are taken"
        );
        assert!(
            !self.by_name.contains_key(name),
            "component name '{name}' is already registered for a different type"
        );
        assert!(
            std::mem::align_of::<T>() <= SLOT_ALIGN,
            "component '{name}' ({}) needs alignment {} but slots align to {SLOT_ALIGN}",
            type_name::<T>(),
            std::mem::align_of::<T>()
        );

        let kind = ComponentKind(self.infos.len() as u8);
        self.infos.push(KindInfo {
            kind,
            name: name.to_owned(),
            size: std::mem::size_of::<T>(),
            align: std::mem::align_of::<T>(),
            type_id: TypeId::of::<T>(),
            default_bytes: bytemuck::bytes_of(&T::default()).to_vec(),
            release: None,
        });
        self.by_type.insert(TypeId::of::<T>(), kind);
        self.by_name.insert(name.to_owned(), kind);
        kind
    }

    /// Register a component type whose values reference a counted resource.
    ///
    /// Removing a slot holding this kind calls `counter.release` with the
    /// value's [`ResourceId`]. Values whose id is [`ResourceId::NONE`] are
    /// skipped.
    pub fn register_counted<T, R>(&mut self, name: &str, counter: Rc<R>) -> ComponentKind
    where
        T: Component + CountedResource,
        R: ResourceCounter + 'static,
    {
        let kind = self.register::<T>(name);
        let info = &mut self.infos[kind.index()];
        if info.release.is_some() {
            tracing::warn!(component = %info.name, "replacing existing release hook");
        }
        info.release = Some(Box::new(move |bytes: &[u8]| {
            let value: &T = bytemuck::from_bytes(bytes);
            let id = value.resource();
            if id != ResourceId::NONE {
                counter.release(id);
            }
        }));
        kind
    }

    /// Look up the kind for a Rust type.
    pub fn lookup<T: 'static>(&self) -> Option<ComponentKind> {
        self.by_type.get(&TypeId::of::<T>()).copied()
    }

    /// The kind for a Rust type.
    ///
    /// # Panics
    ///
    /// Panics if `T` was never registered.
    pub fn kind<T: 'static>(&self) -> ComponentKind {
        match self.lookup::<T>() {
            Some(kind) => kind,
            None => panic!(
                "component type {} not registered. Registered components: [{}]",
                type_name::<T>(),
                self.registered_names().join(", ")
            ),
        }
    }

    /// Look up a kind by its registered name.
    pub fn lookup_by_name(&self, name: &str) -> Option<ComponentKind> {
        self.by_name.get(name).copied()
    }

    /// Metadata for a registered kind.
    ///
    /// # Panics
    ///
    /// Panics if `kind` is not registered in this table.
    pub fn info(&self, kind: ComponentKind) -> &KindInfo {
        self.infos
            .get(kind.index())
            .unwrap_or_else(|| panic!("{kind:?} is not registered"))
    }

    /// Whether `kind` is registered in this table.
    pub fn contains(&self, kind: ComponentKind) -> bool {
        kind.index() < self.infos.len()
    }

    /// Mask of every registered kind.
    pub fn all(&self) -> Archetype {
        self.infos.iter().map(|info| info.kind).collect()
    }

    /// Number of registered kinds.
    pub fn len(&self) -> usize {
        self.infos.len()
    }

    /// Whether no kinds are registered. Never true for a table built with
    /// [`KindTable::new`].
    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }

    /// Names of all registered kinds, sorted.
    pub fn registered_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.by_name.keys().map(|s| s.as_str()).collect();
        names.sort();
        names
    }

    /// Names of the kinds in `archetype`, in bit order.
    pub fn names_of(&self, archetype: Archetype) -> Vec<&str> {
        archetype
            .kinds()
            .map(|kind| self.info(kind).name.as_str())
            .collect()
    }

    /// Run the release hook for `kind`, if it has one, on one value's bytes.
    pub(crate) fn release(&self, kind: ComponentKind, bytes: &[u8]) {
        if let Some(release) = &self.info(kind).release {
            release(bytes);
        }
    }
}

impl Default for KindTable {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

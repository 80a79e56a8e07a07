//! Component type registration and metadata.
//!
//! Every component type used with an [`crate::engine::Engine`] must be
//! registered in a [`ComponentRegistry`], either by implementing
//! [`Component`] (stable, identifier-backed) or via
//! [`ComponentRegistry::register_anonymous`] (ephemeral, local-only).
//! Registration produces a dense [`ComponentId`] used as the key for table
//! column lookups.

use crate::identifier::Identifier;
use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;

// ---------------------------------------------------------------------------
// ComponentId
// ---------------------------------------------------------------------------

/// Opaque, lightweight identifier for a registered component type, dense and
/// process-local.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentId(pub(crate) u32);

impl fmt::Debug for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ComponentId({})", self.0)
    }
}

impl crate::sparse_set::SparseIndex for ComponentId {
    const SENTINEL: Self = ComponentId(u32::MAX);

    #[inline]
    fn to_usize(self) -> usize {
        self.0 as usize
    }

    #[inline]
    fn from_usize(value: usize) -> Self {
        ComponentId(value as u32)
    }
}

// ---------------------------------------------------------------------------
// Component
// ---------------------------------------------------------------------------

/// Declares a Rust type as a component type.
///
/// `IDENTIFIER` is this type's stable, cross-process identity; `NAME`
/// defaults to the Rust type name but may be overridden for a more stable
/// debug label.
pub trait Component: Send + Sync + 'static {
    const IDENTIFIER: Identifier;
    const NAME: &'static str = std::any::type_name::<Self>();
}

#[allow(unsafe_code)]
unsafe fn drop_glue<T>(ptr: *mut u8) {
    // SAFETY: callers guarantee `ptr` points at a live, properly aligned `T`
    // owned by a column about to discard that row.
    unsafe {
        std::ptr::drop_in_place(ptr as *mut T);
    }
}

// ---------------------------------------------------------------------------
// ComponentInfo
// ---------------------------------------------------------------------------

/// Metadata about a registered component type.
#[derive(Clone)]
pub struct ComponentInfo {
    pub id: ComponentId,
    /// `None` for anonymously-registered components.
    pub identifier: Option<Identifier>,
    pub name: String,
    pub size: usize,
    pub align: usize,
    /// `None` for types with no drop glue (`!std::mem::needs_drop::<T>()`).
    #[allow(unsafe_code)]
    pub destructor: Option<unsafe fn(*mut u8)>,
    pub(crate) type_id: Option<TypeId>,
}

impl fmt::Debug for ComponentInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentInfo")
            .field("id", &self.id)
            .field("identifier", &self.identifier)
            .field("name", &self.name)
            .field("size", &self.size)
            .field("align", &self.align)
            .field("has_destructor", &self.destructor.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// ComponentRegistry
// ---------------------------------------------------------------------------

/// Assigns dense [`ComponentId`]s to component types and records their
/// metadata. Id assignment is monotonic and ids are never reused.
#[derive(Debug, Default)]
pub struct ComponentRegistry {
    by_type: HashMap<TypeId, ComponentId>,
    by_identifier: HashMap<Identifier, ComponentId>,
    infos: Vec<ComponentInfo>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or look up) `T` by its [`Component::IDENTIFIER`].
    ///
    /// Re-registering the same type is idempotent. Registering a *different*
    /// type under an identifier already bound to a different debug name is
    /// fatal -- that is a programming error, not a recoverable condition.
    pub fn register<T: Component>(&mut self) -> ComponentId {
        if let Some(&existing) = self.by_type.get(&TypeId::of::<T>()) {
            return existing;
        }

        if let Some(&existing) = self.by_identifier.get(&T::IDENTIFIER) {
            let info = &self.infos[existing.0 as usize];
            if info.name != T::NAME {
                tracing::error!(
                    identifier = %T::IDENTIFIER,
                    existing_name = %info.name,
                    new_name = %T::NAME,
                    "component identifier collision with a different debug name"
                );
                panic!(
                    "component identifier {} is already registered as '{}', cannot re-register as '{}'",
                    T::IDENTIFIER,
                    info.name,
                    T::NAME
                );
            }
            self.by_type.insert(TypeId::of::<T>(), existing);
            return existing;
        }

        let id = self.push_info_for::<T>(Some(T::IDENTIFIER), T::NAME.to_owned(), Some(TypeId::of::<T>()));
        self.by_identifier.insert(T::IDENTIFIER, id);
        self.by_type.insert(TypeId::of::<T>(), id);
        id
    }

    /// Register an ephemeral component with no stable identifier.
    ///
    /// Each call allocates a fresh id, even for a repeated `(T, name)` pair
    /// -- anonymous components are only addressable through the returned
    /// [`ComponentId`], never by type or by identifier.
    pub fn register_anonymous<T: Send + Sync + 'static>(&mut self, name: &str) -> ComponentId {
        tracing::trace!(name, "registering anonymous component");
        self.push_info_for::<T>(None, name.to_owned(), None)
    }

    fn push_info_for<T: 'static>(
        &mut self,
        identifier: Option<Identifier>,
        name: String,
        type_id: Option<TypeId>,
    ) -> ComponentId {
        let id = ComponentId(self.infos.len() as u32);
        let destructor = std::mem::needs_drop::<T>().then_some(drop_glue::<T> as unsafe fn(*mut u8));
        self.infos.push(ComponentInfo {
            id,
            identifier,
            name,
            size: std::mem::size_of::<T>(),
            align: std::mem::align_of::<T>(),
            destructor,
            type_id,
        });
        id
    }

    /// Look up a component by its stable identifier.
    pub fn lookup_identifier(&self, identifier: Identifier) -> Option<ComponentId> {
        self.by_identifier.get(&identifier).copied()
    }

    /// Look up a component previously registered via [`ComponentRegistry::register`]
    /// by its Rust type. Anonymous components are never found this way.
    pub fn lookup<T: 'static>(&self) -> Option<ComponentId> {
        self.by_type.get(&TypeId::of::<T>()).copied()
    }

    /// Metadata for `id`. Panics if `id` was never issued by this registry --
    /// callers are expected to only ever hold ids this registry produced.
    pub fn info(&self, id: ComponentId) -> &ComponentInfo {
        &self.infos[id.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.infos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }

    /// Debug names of every registered component, in registration order.
    pub fn registered_names(&self) -> Vec<&str> {
        self.infos.iter().map(|info| info.name.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Pos {
        x: f32,
        y: f32,
    }
    impl Component for Pos {
        const IDENTIFIER: Identifier = Identifier::from_u128(1);
        const NAME: &'static str = "position";
    }

    struct Vel {
        dx: f32,
        dy: f32,
    }
    impl Component for Vel {
        const IDENTIFIER: Identifier = Identifier::from_u128(2);
        const NAME: &'static str = "velocity";
    }

    #[test]
    fn register_and_lookup() {
        let mut reg = ComponentRegistry::new();
        let id = reg.register::<Pos>();
        assert_eq!(reg.lookup::<Pos>(), Some(id));
        assert_eq!(reg.lookup_identifier(Pos::IDENTIFIER), Some(id));
    }

    #[test]
    fn same_type_same_id() {
        let mut reg = ComponentRegistry::new();
        let id1 = reg.register::<Pos>();
        let id2 = reg.register::<Pos>();
        assert_eq!(id1, id2);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn different_types_different_ids() {
        let mut reg = ComponentRegistry::new();
        let p = reg.register::<Pos>();
        let v = reg.register::<Vel>();
        assert_ne!(p, v);
    }

    #[test]
    fn info_correctness() {
        let mut reg = ComponentRegistry::new();
        let id = reg.register::<Pos>();
        let info = reg.info(id);
        assert_eq!(info.name, "position");
        assert_eq!(info.size, std::mem::size_of::<Pos>());
        assert_eq!(info.align, std::mem::align_of::<Pos>());
        assert_eq!(info.identifier, Some(Pos::IDENTIFIER));
    }

    #[test]
    #[should_panic(expected = "cannot re-register")]
    fn identifier_collision_with_different_name_is_fatal() {
        struct OtherPos {
            x: f32,
        }
        impl Component for OtherPos {
            const IDENTIFIER: Identifier = Pos::IDENTIFIER;
            const NAME: &'static str = "not-position";
        }
        let mut reg = ComponentRegistry::new();
        reg.register::<Pos>();
        reg.register::<OtherPos>();
    }

    #[test]
    fn anonymous_components_get_distinct_ids_and_are_not_discoverable_by_type() {
        let mut reg = ComponentRegistry::new();
        let a = reg.register_anonymous::<i32>("scratch");
        let b = reg.register_anonymous::<i32>("scratch");
        assert_ne!(a, b, "each anonymous registration is independent");
        assert_eq!(reg.lookup::<i32>(), None);
    }

    #[test]
    fn destructor_present_only_when_needed() {
        let mut reg = ComponentRegistry::new();
        let id = reg.register::<Pos>();
        assert!(
            reg.info(id).destructor.is_none(),
            "Pos has no drop glue to run"
        );

        struct Owned {
            #[allow(dead_code)]
            data: String,
        }
        impl Component for Owned {
            const IDENTIFIER: Identifier = Identifier::from_u128(3);
        }
        let id = reg.register::<Owned>();
        assert!(reg.info(id).destructor.is_some());
    }
}

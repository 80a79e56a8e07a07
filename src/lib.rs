//! Archetype-based Entity Component System core.
//!
//! Entities are stored in tables (one per unique set of component types)
//! using a Structure-of-Arrays (SoA) layout for cache-friendly iteration.
//! Generational entity ids enable immediate stale-reference detection.
//!
//! # Quick Start
//!
//! ```
//! use nomai_ecs::prelude::*;
//!
//! struct Position { x: f32, y: f32 }
//! impl Component for Position {
//!     const IDENTIFIER: Identifier = Identifier::from_u128(1);
//! }
//!
//! struct Velocity { dx: f32, dy: f32 }
//! impl Component for Velocity {
//!     const IDENTIFIER: Identifier = Identifier::from_u128(2);
//! }
//!
//! let mut engine = Engine::new();
//! engine.register::<Position>();
//! engine.register::<Velocity>();
//!
//! let mut bundle = ComponentBundle::new();
//! bundle.add(engine.registry(), Position { x: 0.0, y: 0.0 }).unwrap();
//! bundle.add(engine.registry(), Velocity { dx: 1.0, dy: 0.0 }).unwrap();
//! let entity = engine.spawn(bundle).entity();
//!
//! assert_eq!(engine.get_component::<Position>(entity).map(|p| p.x), Some(0.0));
//! ```

#![deny(unsafe_code)]

#[allow(unsafe_code)]
pub mod archetype;
pub mod component;
#[allow(unsafe_code)]
pub mod engine;
#[allow(unsafe_code)]
pub mod entity;
pub mod identifier;
pub mod sparse_set;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by ECS operations.
#[derive(Debug, thiserror::Error)]
pub enum EcsError {
    /// The entity does not exist (stale generation or never allocated).
    #[error("entity {entity:?} does not exist (stale or never allocated)")]
    StaleEntity { entity: entity::Entity },

    /// A component type was referenced that has not been registered.
    #[error("component type '{name}' not registered")]
    UnknownComponent { name: String },
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::archetype::{Table, TableId};
    pub use crate::component::{Component, ComponentId, ComponentInfo, ComponentRegistry};
    pub use crate::engine::{ComponentBundle, Engine, EntityHandle};
    pub use crate::entity::{Entity, EntityAllocator, EntityLocation};
    pub use crate::identifier::{Case, Identifier, Layout};
    pub use crate::EcsError;
}

// ---------------------------------------------------------------------------
// Integration tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use crate::prelude::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Position {
        x: f32,
        y: f32,
    }
    impl Component for Position {
        const IDENTIFIER: Identifier = Identifier::from_u128(1001);
    }

    #[derive(Debug, Clone, PartialEq)]
    struct Velocity {
        dx: f32,
        dy: f32,
    }
    impl Component for Velocity {
        const IDENTIFIER: Identifier = Identifier::from_u128(1002);
    }

    #[derive(Debug, Clone, PartialEq)]
    struct Health(u32);
    impl Component for Health {
        const IDENTIFIER: Identifier = Identifier::from_u128(1003);
    }

    fn setup_engine() -> Engine {
        let mut engine = Engine::new();
        engine.register::<Position>();
        engine.register::<Velocity>();
        engine.register::<Health>();
        engine
    }

    fn position_bundle(registry: &ComponentRegistry, x: f32, y: f32) -> ComponentBundle {
        let mut b = ComponentBundle::new();
        b.add(registry, Position { x, y }).unwrap();
        b
    }

    // -- spawn / despawn integration ----------------------------------------

    #[test]
    fn spawn_entities_with_components_and_read_back() {
        let mut engine = setup_engine();

        let mut b = ComponentBundle::new();
        b.add(engine.registry(), Position { x: 1.0, y: 2.0 }).unwrap();
        b.add(engine.registry(), Velocity { dx: 3.0, dy: 4.0 }).unwrap();
        let e = engine.spawn(b).entity();

        assert_eq!(
            engine.get_component::<Position>(e),
            Some(&Position { x: 1.0, y: 2.0 })
        );
        assert_eq!(
            engine.get_component::<Velocity>(e),
            Some(&Velocity { dx: 3.0, dy: 4.0 })
        );
    }

    #[test]
    fn despawn_entity_verify_gone() {
        let mut engine = setup_engine();
        let bundle = position_bundle(engine.registry(), 0.0, 0.0);
        let e = engine.spawn(bundle).entity();
        engine.despawn(e).unwrap();
        assert!(!engine.is_alive(e));
        assert_eq!(engine.get_component::<Position>(e), None);
        assert_eq!(engine.entity_count(), 0);
    }

    #[test]
    fn despawn_via_entity_handle() {
        let mut engine = setup_engine();
        let bundle = position_bundle(engine.registry(), 0.0, 0.0);
        let handle = engine.spawn(bundle);
        let e = handle.entity();
        handle.despawn().unwrap();
        assert!(!engine.is_alive(e));
    }

    #[test]
    fn insert_component_triggers_migration() {
        let mut engine = setup_engine();
        let bundle = position_bundle(engine.registry(), 1.0, 2.0);
        let e = engine.spawn(bundle).entity();
        let table_count_before = engine.table_count();

        engine
            .insert_component(e, Velocity { dx: 5.0, dy: 6.0 })
            .unwrap();

        assert!(engine.has_component::<Velocity>(e));
        assert_eq!(
            engine.get_component::<Position>(e),
            Some(&Position { x: 1.0, y: 2.0 })
        );
        // A new table was created for {Position, Velocity}.
        assert!(engine.table_count() > table_count_before);
    }

    #[test]
    fn remove_component_triggers_migration() {
        let mut engine = setup_engine();
        let mut b = ComponentBundle::new();
        b.add(engine.registry(), Position { x: 1.0, y: 2.0 }).unwrap();
        b.add(engine.registry(), Velocity { dx: 3.0, dy: 4.0 }).unwrap();
        let e = engine.spawn(b).entity();

        engine.remove_component::<Velocity>(e).unwrap();

        assert!(!engine.has_component::<Velocity>(e));
        assert_eq!(
            engine.get_component::<Position>(e),
            Some(&Position { x: 1.0, y: 2.0 })
        );
    }

    #[test]
    fn get_set_components() {
        let mut engine = setup_engine();
        let bundle = position_bundle(engine.registry(), 0.0, 0.0);
        let e = engine.spawn(bundle).entity();
        if let Some(pos) = engine.get_component_mut::<Position>(e) {
            pos.x = 42.0;
            pos.y = 99.0;
        }
        assert_eq!(
            engine.get_component::<Position>(e),
            Some(&Position { x: 42.0, y: 99.0 })
        );
    }

    // -- scale test -----------------------------------------------------------

    #[test]
    fn scale_10k_entities() {
        let mut engine = setup_engine();

        let mut entities = Vec::with_capacity(10_000);
        for i in 0..10_000u32 {
            let mut b = ComponentBundle::new();
            b.add(
                engine.registry(),
                Position {
                    x: i as f32,
                    y: i as f32 * 2.0,
                },
            ).unwrap();
            b.add(engine.registry(), Velocity { dx: 1.0, dy: -1.0 }).unwrap();
            let e = engine.spawn(b).entity();
            entities.push(e);
        }

        assert_eq!(engine.entity_count(), 10_000);

        for &e in entities.iter() {
            if let Some(vel) = engine.get_component_mut::<Velocity>(e) {
                vel.dx *= 2.0;
                vel.dy *= 2.0;
            }
        }

        let vel = engine.get_component::<Velocity>(entities[0]).unwrap();
        assert_eq!(vel.dx, 2.0);
        assert_eq!(vel.dy, -2.0);

        for e in entities.iter().take(5_000) {
            engine.despawn(*e).unwrap();
        }

        assert_eq!(engine.entity_count(), 5_000);
    }

    // -- stale entity tests -----------------------------------------------------

    #[test]
    fn stale_entity_despawn_returns_error() {
        let mut engine = setup_engine();
        let bundle = position_bundle(engine.registry(), 0.0, 0.0);
        let e = engine.spawn(bundle).entity();
        engine.despawn(e).unwrap();
        assert!(engine.despawn(e).is_err());
    }

    #[test]
    fn insert_on_stale_entity_returns_error() {
        let mut engine = setup_engine();
        let bundle = position_bundle(engine.registry(), 0.0, 0.0);
        let e = engine.spawn(bundle).entity();
        engine.despawn(e).unwrap();
        let result = engine.insert_component(e, Velocity { dx: 1.0, dy: 1.0 });
        assert!(result.is_err());
    }

    // -- multiple entities in same table --------------------------------------

    #[test]
    fn multiple_entities_same_table() {
        let mut engine = setup_engine();
        let b1 = position_bundle(engine.registry(), 1.0, 1.0);
        let e1 = engine.spawn(b1).entity();
        let b2 = position_bundle(engine.registry(), 2.0, 2.0);
        let e2 = engine.spawn(b2).entity();
        let b3 = position_bundle(engine.registry(), 3.0, 3.0);
        let e3 = engine.spawn(b3).entity();

        assert_eq!(
            engine.get_component::<Position>(e1),
            Some(&Position { x: 1.0, y: 1.0 })
        );
        assert_eq!(
            engine.get_component::<Position>(e2),
            Some(&Position { x: 2.0, y: 2.0 })
        );
        assert_eq!(
            engine.get_component::<Position>(e3),
            Some(&Position { x: 3.0, y: 3.0 })
        );

        // Despawn middle entity, check remaining are correct.
        engine.despawn(e2).unwrap();
        assert_eq!(engine.entity_count(), 2);
        assert_eq!(
            engine.get_component::<Position>(e1),
            Some(&Position { x: 1.0, y: 1.0 })
        );
        assert_eq!(
            engine.get_component::<Position>(e3),
            Some(&Position { x: 3.0, y: 3.0 })
        );
    }

    #[test]
    fn insert_component_overwrite() {
        let mut engine = setup_engine();
        let bundle = position_bundle(engine.registry(), 1.0, 2.0);
        let e = engine.spawn(bundle).entity();
        // Insert same component type again -- should overwrite, not migrate.
        let table_count_before = engine.table_count();
        engine
            .insert_component(e, Position { x: 99.0, y: 100.0 })
            .unwrap();
        assert_eq!(
            engine.get_component::<Position>(e),
            Some(&Position { x: 99.0, y: 100.0 })
        );
        assert_eq!(engine.table_count(), table_count_before);
    }

    #[test]
    fn spawn_batch_creates_distinct_entities() {
        let mut engine = setup_engine();
        let entities = engine.spawn_batch(100, |i, registry| {
            position_bundle(registry, i as f32, 0.0)
        });
        assert_eq!(entities.len(), 100);
        for (i, &e) in entities.iter().enumerate() {
            assert_eq!(
                engine.get_component::<Position>(e),
                Some(&Position { x: i as f32, y: 0.0 })
            );
        }
    }

    #[test]
    fn bundle_order_does_not_affect_table_identity() {
        let mut engine = setup_engine();

        let mut a = ComponentBundle::new();
        a.add(engine.registry(), Position { x: 1.0, y: 1.0 }).unwrap();
        a.add(engine.registry(), Velocity { dx: 2.0, dy: 2.0 }).unwrap();
        let e_a = engine.spawn(a).entity();

        let mut b = ComponentBundle::new();
        b.add(engine.registry(), Velocity { dx: 3.0, dy: 3.0 }).unwrap();
        b.add(engine.registry(), Position { x: 4.0, y: 4.0 }).unwrap();
        let e_b = engine.spawn(b).entity();

        // Same archetype regardless of the order components were added in
        // the bundle -- both entities land in the same table.
        assert_eq!(engine.table_count(), 1);
        assert_eq!(
            engine.get_component::<Position>(e_a),
            Some(&Position { x: 1.0, y: 1.0 })
        );
        assert_eq!(
            engine.get_component::<Position>(e_b),
            Some(&Position { x: 4.0, y: 4.0 })
        );
    }

    #[test]
    fn owned_component_dropped_on_despawn() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        struct Counted(Arc<AtomicUsize>);
        impl Drop for Counted {
            fn drop(&mut self) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }
        impl Component for Counted {
            const IDENTIFIER: Identifier = Identifier::from_u128(1004);
        }

        let counter = Arc::new(AtomicUsize::new(0));
        let mut engine = Engine::new();
        engine.register::<Counted>();

        let mut b = ComponentBundle::new();
        b.add(engine.registry(), Counted(counter.clone())).unwrap();
        let e = engine.spawn(b).entity();
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        engine.despawn(e).unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}

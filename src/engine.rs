//! The [`Engine`] is the top-level ECS container: it owns the entity
//! allocator, the component registry, and every table.

use std::collections::HashMap;

use crate::archetype::{ExtractedComponent, Table, TableId};
use crate::component::{Component, ComponentId, ComponentRegistry};
use crate::entity::{Entity, EntityAllocator, EntityLocation};
use crate::EcsError;

// ---------------------------------------------------------------------------
// ComponentBundle
// ---------------------------------------------------------------------------

/// A set of component values to spawn an entity with, built up one type at
/// a time and consumed by [`Engine::spawn`].
///
/// ```ignore
/// let mut bundle = ComponentBundle::new();
/// bundle.add(engine.registry(), Position { x: 0.0, y: 0.0 }).unwrap();
/// bundle.add(engine.registry(), Velocity { dx: 1.0, dy: 0.0 }).unwrap();
/// let entity = engine.spawn(bundle);
/// ```
pub struct ComponentBundle {
    entries: Vec<(ComponentId, ExtractedComponent)>,
}

impl ComponentBundle {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Add a component to the bundle. `T` must already be registered; if it
    /// is not, this returns `EcsError::UnknownComponent` rather than
    /// panicking, matching the recoverable-absence treatment the rest of
    /// the component-mutation surface gives an unregistered type.
    ///
    /// # Panics
    ///
    /// Panics if this bundle already holds a component of type `T` --
    /// a duplicate field in one bundle is a programmer error, not an
    /// absence.
    pub fn add<T: Component>(&mut self, registry: &ComponentRegistry, value: T) -> Result<(), EcsError> {
        let id = registry.lookup::<T>().ok_or_else(|| EcsError::UnknownComponent {
            name: std::any::type_name::<T>().to_owned(),
        })?;
        if self.entries.iter().any(|(existing, _)| *existing == id) {
            panic!("duplicate component type {id:?} in ComponentBundle");
        }
        let destructor = registry.info(id).destructor;
        self.entries.push((id, ExtractedComponent::from_value(value, destructor)));
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn sorted_ids(&self) -> Vec<ComponentId> {
        let mut ids: Vec<_> = self.entries.iter().map(|(id, _)| *id).collect();
        ids.sort();
        ids
    }
}

impl Default for ComponentBundle {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// The top-level ECS container: owns entity identity, component metadata,
/// and every table of component storage.
///
/// Field order matches the teardown order this engine must observe (tables,
/// then the archetype-to-table index, then the registry, then the entity
/// allocator): Rust drops struct fields top-to-bottom, so declaring `tables`
/// first ensures component destructors run before the registry and
/// allocator they might otherwise be assumed to outlive.
pub struct Engine {
    tables: Vec<Table>,
    table_index: HashMap<Vec<ComponentId>, TableId>,
    registry: ComponentRegistry,
    allocator: EntityAllocator,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("entity_count", &self.allocator.alive_count())
            .field("table_count", &self.tables.len())
            .finish()
    }
}

impl Engine {
    pub fn new() -> Self {
        Self {
            tables: Vec::new(),
            table_index: HashMap::new(),
            registry: ComponentRegistry::new(),
            allocator: EntityAllocator::new(),
        }
    }

    /// Read-only access to the component registry.
    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    /// Register a component type, returning its [`ComponentId`]. Idempotent.
    pub fn register<T: Component>(&mut self) -> ComponentId {
        self.registry.register::<T>()
    }

    // -- table management -------------------------------------------------

    fn table_for(&mut self, ids: &[ComponentId]) -> TableId {
        if let Some(&id) = self.table_index.get(ids) {
            return id;
        }
        let id = TableId(self.tables.len() as u32);
        let infos: Vec<_> = ids.iter().map(|cid| self.registry.info(*cid).clone()).collect();
        let table = Table::new(id, ids.to_vec(), &infos);
        self.tables.push(table);
        self.table_index.insert(ids.to_vec(), id);
        id
    }

    /// Total number of tables currently allocated.
    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    // -- entity lifecycle ---------------------------------------------------

    /// Spawn a new entity from a [`ComponentBundle`], returning a borrowing
    /// handle for immediate follow-up access. Call
    /// [`EntityHandle::entity`] to get the plain [`Entity`] back out for
    /// storage past this borrow.
    pub fn spawn(&mut self, bundle: ComponentBundle) -> EntityHandle<'_> {
        let entity = self.spawn_entity(bundle);
        EntityHandle {
            engine: self,
            entity,
        }
    }

    fn spawn_entity(&mut self, bundle: ComponentBundle) -> Entity {
        let entity = self.allocator.allocate_one();
        self.insert_bundle(entity, bundle);
        entity
    }

    /// Spawn `n` entities, each built by `make_bundle(index)`. Internally
    /// reserves the whole batch up front and flushes it in one step, then
    /// writes each entity's row -- this exercises the same reserve/flush
    /// path available to concurrent callers, just from a single thread.
    pub fn spawn_batch<F>(&mut self, n: u32, mut make_bundle: F) -> Vec<Entity>
    where
        F: FnMut(usize, &ComponentRegistry) -> ComponentBundle,
    {
        self.allocator.reserve_many(n);
        let entities = self.allocator.flush();
        for (i, &entity) in entities.iter().enumerate() {
            let bundle = make_bundle(i, &self.registry);
            self.insert_bundle(entity, bundle);
        }
        entities
    }

    fn insert_bundle(&mut self, entity: Entity, bundle: ComponentBundle) {
        let ids = bundle.sorted_ids();
        let table_id = self.table_for(&ids);
        let mut entries = bundle.entries;
        entries.sort_by_key(|(id, _)| *id);

        let table = &mut self.tables[table_id.0 as usize];
        table.ensure_unused(1);
        let row = table.add_row(entity);
        for (id, buf) in &entries {
            unsafe { table.write_component(*id, buf.as_ptr()) };
        }
        drop(entries);

        *self
            .allocator
            .location_mut(entity)
            .expect("entity was just allocated") = Some(EntityLocation {
            table: table_id.0,
            row,
        });
    }

    /// Despawn `entity`, freeing its row and recycling its id.
    pub fn despawn(&mut self, entity: Entity) -> Result<(), EcsError> {
        let loc = self
            .allocator
            .location(entity)
            .ok_or(EcsError::StaleEntity { entity })?;

        let table = &mut self.tables[loc.table as usize];
        let moved = table.remove(loc.row);
        if let Some(moved_entity) = moved {
            if let Some(slot) = self.allocator.location_mut(moved_entity) {
                *slot = Some(EntityLocation {
                    table: loc.table,
                    row: loc.row,
                });
            }
        }

        tracing::trace!(?entity, table = loc.table, row = loc.row, "entity despawned");
        self.allocator.deallocate(entity)
    }

    /// Whether `entity` currently exists in the engine (has been spawned and
    /// not yet despawned).
    pub fn is_alive(&self, entity: Entity) -> bool {
        self.allocator.location(entity).is_some()
    }

    /// Total number of currently alive entities.
    pub fn entity_count(&self) -> usize {
        self.allocator.alive_count()
    }

    // -- component access ---------------------------------------------------

    pub fn get_component<T: Component>(&self, entity: Entity) -> Option<&T> {
        let loc = self.allocator.location(entity)?;
        let id = self.registry.lookup::<T>()?;
        let table = &self.tables[loc.table as usize];
        let ptr = table.get_component_raw(loc.row, id)?;
        Some(unsafe { &*(ptr as *const T) })
    }

    pub fn get_component_mut<T: Component>(&mut self, entity: Entity) -> Option<&mut T> {
        let loc = self.allocator.location(entity)?;
        let id = self.registry.lookup::<T>()?;
        let table = &mut self.tables[loc.table as usize];
        let ptr = table.get_component_raw_mut(loc.row, id)?;
        Some(unsafe { &mut *(ptr as *mut T) })
    }

    /// By-id component access for callers with no static Rust type for the
    /// component (e.g. a scripting or hot-reload layer working off
    /// [`ComponentId`] alone). The returned pointer is valid only until the
    /// next mutating call touching this entity's table; casting it to the
    /// wrong type is the caller's responsibility.
    ///
    /// # Safety
    /// The caller must not read through the returned pointer as any type
    /// other than the one `component` was registered for.
    pub unsafe fn get_component_by_id(&self, entity: Entity, component: ComponentId) -> Option<*const u8> {
        let loc = self.allocator.location(entity)?;
        let table = &self.tables[loc.table as usize];
        table.get_component_raw(loc.row, component)
    }

    /// Mutable counterpart to [`Engine::get_component_by_id`].
    ///
    /// # Safety
    /// Same requirement as [`Engine::get_component_by_id`].
    pub unsafe fn get_component_by_id_mut(&mut self, entity: Entity, component: ComponentId) -> Option<*mut u8> {
        let loc = self.allocator.location(entity)?;
        let table = &mut self.tables[loc.table as usize];
        table.get_component_raw_mut(loc.row, component)
    }

    pub fn has_component<T: Component>(&self, entity: Entity) -> bool {
        let Some(loc) = self.allocator.location(entity) else {
            return false;
        };
        let Some(id) = self.registry.lookup::<T>() else {
            return false;
        };
        self.tables[loc.table as usize].has_component(id)
    }

    /// Insert a component on `entity`. Overwrites in place if the entity
    /// already has this component type; otherwise migrates it to a table
    /// that includes the new type. `T` must already be registered (via
    /// [`Engine::register`]); an unregistered type is a recoverable
    /// `EcsError::UnknownComponent`, matching [`Engine::remove_component`].
    pub fn insert_component<T: Component>(&mut self, entity: Entity, value: T) -> Result<(), EcsError> {
        let id = self.registry.lookup::<T>().ok_or_else(|| EcsError::UnknownComponent {
            name: std::any::type_name::<T>().to_owned(),
        })?;
        let loc = self
            .allocator
            .location(entity)
            .ok_or(EcsError::StaleEntity { entity })?;

        let table = &mut self.tables[loc.table as usize];
        if table.has_component(id) {
            let ptr = table
                .get_component_raw_mut(loc.row, id)
                .expect("has_component just confirmed this column holds a value for this row");
            unsafe { *(ptr as *mut T) = value };
            return Ok(());
        }

        let mut new_ids = table.component_ids().to_vec();
        new_ids.push(id);
        new_ids.sort();

        let (mut extracted, moved) = table.extract_row(loc.row);
        if let Some(moved_entity) = moved {
            if let Some(slot) = self.allocator.location_mut(moved_entity) {
                *slot = Some(EntityLocation {
                    table: loc.table,
                    row: loc.row,
                });
            }
        }
        let destructor = self.registry.info(id).destructor;
        extracted.push((id, ExtractedComponent::from_value(value, destructor)));

        let new_table_id = self.table_for(&new_ids);
        let new_row = self.write_extracted(new_table_id, entity, extracted);
        tracing::trace!(?entity, from = loc.table, to = new_table_id.0, "entity migrated on insert_component");

        *self
            .allocator
            .location_mut(entity)
            .expect("entity still alive")
            .as_mut()
            .expect("entity had a location before migration") = EntityLocation {
            table: new_table_id.0,
            row: new_row,
        };
        Ok(())
    }

    /// Remove a component type from `entity`. A no-op if the entity does not
    /// have it. Otherwise migrates the entity to a table without that type.
    pub fn remove_component<T: Component>(&mut self, entity: Entity) -> Result<(), EcsError> {
        let id = self
            .registry
            .lookup::<T>()
            .ok_or_else(|| EcsError::UnknownComponent {
                name: std::any::type_name::<T>().to_owned(),
            })?;
        let loc = self
            .allocator
            .location(entity)
            .ok_or(EcsError::StaleEntity { entity })?;

        let table = &mut self.tables[loc.table as usize];
        if !table.has_component(id) {
            return Ok(());
        }

        let new_ids: Vec<ComponentId> = table
            .component_ids()
            .iter()
            .copied()
            .filter(|cid| *cid != id)
            .collect();

        let (extracted, moved) = table.extract_row(loc.row);
        if let Some(moved_entity) = moved {
            if let Some(slot) = self.allocator.location_mut(moved_entity) {
                *slot = Some(EntityLocation {
                    table: loc.table,
                    row: loc.row,
                });
            }
        }

        let mut kept = Vec::with_capacity(extracted.len().saturating_sub(1));
        for (cid, mut value) in extracted {
            if cid == id {
                value.drop_value();
            } else {
                kept.push((cid, value));
            }
        }

        let new_table_id = self.table_for(&new_ids);
        let new_row = self.write_extracted(new_table_id, entity, kept);
        tracing::trace!(?entity, from = loc.table, to = new_table_id.0, "entity migrated on remove_component");

        *self
            .allocator
            .location_mut(entity)
            .expect("entity still alive")
            .as_mut()
            .expect("entity had a location before migration") = EntityLocation {
            table: new_table_id.0,
            row: new_row,
        };
        Ok(())
    }

    fn write_extracted(
        &mut self,
        table_id: TableId,
        entity: Entity,
        mut components: Vec<(ComponentId, ExtractedComponent)>,
    ) -> u32 {
        components.sort_by_key(|(id, _)| *id);
        let table = &mut self.tables[table_id.0 as usize];
        table.ensure_unused(1);
        let row = table.add_row(entity);
        for (id, value) in &components {
            unsafe { table.write_component(*id, value.as_ptr()) };
        }
        row
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// EntityHandle
// ---------------------------------------------------------------------------

/// A short-lived handle to a just-spawned entity, borrowing the [`Engine`]
/// that owns it. Exists so callers can chain component access right after
/// [`Engine::spawn`] without a second lookup; call [`EntityHandle::entity`]
/// to get the plain [`Entity`] out for storage beyond this borrow.
pub struct EntityHandle<'e> {
    engine: &'e mut Engine,
    entity: Entity,
}

impl<'e> EntityHandle<'e> {
    #[inline]
    pub fn entity(&self) -> Entity {
        self.entity
    }

    pub fn get<T: Component>(&self) -> Option<&T> {
        self.engine.get_component::<T>(self.entity)
    }

    pub fn get_mut<T: Component>(&mut self) -> Option<&mut T> {
        self.engine.get_component_mut::<T>(self.entity)
    }

    /// By-id counterpart to [`EntityHandle::get`], for callers without a
    /// static Rust type for the component.
    ///
    /// # Safety
    /// Same requirement as [`Engine::get_component_by_id`].
    pub unsafe fn get_by_id(&self, component: ComponentId) -> Option<*const u8> {
        unsafe { self.engine.get_component_by_id(self.entity, component) }
    }

    /// By-id counterpart to [`EntityHandle::get_mut`].
    ///
    /// # Safety
    /// Same requirement as [`Engine::get_component_by_id`].
    pub unsafe fn get_by_id_mut(&mut self, component: ComponentId) -> Option<*mut u8> {
        unsafe { self.engine.get_component_by_id_mut(self.entity, component) }
    }

    /// Despawn the entity this handle refers to.
    pub fn despawn(self) -> Result<(), EcsError> {
        self.engine.despawn(self.entity)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

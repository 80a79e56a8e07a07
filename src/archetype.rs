//! Column-major table storage.
//!
//! A [`Table`] stores every entity that shares the same archetype (the same
//! sorted set of [`ComponentId`]s). Components are laid out Structure-of-
//! Arrays style: one [`Column`] per component type, plus a parallel
//! `Vec<Entity>` mapping row index to entity.
//!
//! # Safety
//!
//! This module contains `unsafe` code in [`Column`] because component data is
//! stored as type-erased byte buffers. The safety invariants are maintained
//! by the higher-level [`Table`] and [`crate::engine::Engine`] code, which
//! guarantees that every column access uses the [`ComponentId`] the column
//! was actually created for.
// Note: unsafe_code is allowed on this module via #[allow(unsafe_code)] in lib.rs.

use crate::component::{ComponentId, ComponentInfo};
use crate::entity::Entity;
use crate::sparse_set::SparseSet;

use std::alloc::{self, Layout};
use std::ptr;

// ---------------------------------------------------------------------------
// TableId
// ---------------------------------------------------------------------------

/// Identifies a table within an [`crate::engine::Engine`]. Indices into
/// `Engine::tables`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TableId(pub(crate) u32);

impl TableId {
    #[inline]
    pub fn index(self) -> u32 {
        self.0
    }
}

// ---------------------------------------------------------------------------
// Column -- type-erased component storage
// ---------------------------------------------------------------------------

/// A type-erased, densely packed array of component values of a single type.
///
/// Internally this is a manually managed byte buffer whose layout matches
/// the stored component type. Growth is driven entirely by
/// [`Column::ensure_capacity`]; `push_raw` never grows on its own (callers
/// must reserve capacity up front via [`Table::ensure_unused`]).
pub struct Column {
    /// Pointer to the heap allocation (may be null when capacity == 0).
    data: *mut u8,
    len: usize,
    capacity: usize,
    item_size: usize,
    item_align: usize,
}

// Column only stores raw bytes; the higher-level code guarantees that the
// concrete component type is Send + Sync.
unsafe impl Send for Column {}
unsafe impl Sync for Column {}

impl Column {
    /// Create a new, empty column for a component described by `info`.
    pub fn new(info: &ComponentInfo) -> Self {
        Self {
            data: ptr::null_mut(),
            len: 0,
            capacity: 0,
            item_size: info.size,
            item_align: info.align,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn layout_for_capacity(&self, cap: usize) -> Option<Layout> {
        if self.item_size == 0 || cap == 0 {
            return None;
        }
        Layout::from_size_align(self.item_size * cap, self.item_align).ok()
    }

    /// Grow so at least `min_capacity` elements fit, copying only the
    /// `len` live elements -- never the stale tail of the old allocation.
    pub fn ensure_capacity(&mut self, min_capacity: usize) {
        if min_capacity <= self.capacity {
            return;
        }
        if self.item_size == 0 {
            // ZST: no allocation needed, only the logical capacity changes.
            self.capacity = min_capacity;
            return;
        }
        let new_layout = self
            .layout_for_capacity(min_capacity)
            .expect("column layout overflow");
        let new_data = unsafe { alloc::alloc(new_layout) };
        assert!(!new_data.is_null(), "column allocation failed");
        if self.len > 0 {
            unsafe {
                ptr::copy_nonoverlapping(self.data, new_data, self.len * self.item_size);
            }
        }
        if self.capacity > 0 {
            let old_layout = self
                .layout_for_capacity(self.capacity)
                .expect("old layout must be valid");
            unsafe {
                alloc::dealloc(self.data, old_layout);
            }
        }
        self.data = new_data;
        self.capacity = min_capacity;
    }

    #[inline]
    fn ptr_at(&self, index: usize) -> *mut u8 {
        debug_assert!(index < self.len);
        if self.item_size == 0 {
            return self.item_align as *mut u8;
        }
        unsafe { self.data.add(index * self.item_size) }
    }

    /// Append a value to the end of the column.
    ///
    /// # Safety
    ///
    /// `value_ptr` must point to a valid, initialized instance of this
    /// column's component type; ownership moves into the column (the caller
    /// must not drop the source). The column must have spare capacity --
    /// callers reserve it via [`Column::ensure_capacity`] beforehand.
    pub unsafe fn push_raw(&mut self, value_ptr: *const u8) {
        debug_assert!(
            self.len < self.capacity || self.item_size == 0,
            "push_raw called without reserved capacity"
        );
        if self.item_size > 0 {
            let dst = unsafe { self.data.add(self.len * self.item_size) };
            unsafe { ptr::copy_nonoverlapping(value_ptr, dst, self.item_size) };
        }
        self.len += 1;
    }

    /// # Safety
    /// `index` must be less than `self.len`.
    #[inline]
    pub unsafe fn get_raw(&self, index: usize) -> *const u8 {
        self.ptr_at(index)
    }

    /// # Safety
    /// `index` must be less than `self.len`.
    #[inline]
    pub unsafe fn get_raw_mut(&mut self, index: usize) -> *mut u8 {
        self.ptr_at(index)
    }

    /// Swap-remove the element at `index`, running `destructor` on it (if
    /// any) and moving the last element into its place.
    ///
    /// # Safety
    /// `index` must be less than `self.len`; `destructor`, if present, must
    /// be valid for this column's component type.
    pub unsafe fn swap_remove(&mut self, index: usize, destructor: Option<unsafe fn(*mut u8)>) {
        debug_assert!(index < self.len);
        let last = self.len - 1;
        if self.item_size > 0 {
            if let Some(drop_fn) = destructor {
                unsafe { drop_fn(self.ptr_at(index)) };
            }
            if index != last {
                let src = self.ptr_at(last);
                let dst = unsafe { self.data.add(index * self.item_size) };
                unsafe { ptr::copy_nonoverlapping(src, dst, self.item_size) };
            }
        }
        self.len -= 1;
    }

    /// Swap-remove the element at `index`, copying its bytes (without
    /// dropping them) into `out_ptr` and moving the last element into the
    /// vacated slot. Used when an entity migrates to a different table and
    /// its components need to survive the move.
    ///
    /// # Safety
    /// `index` must be less than `self.len`; `out_ptr` must be valid for
    /// writes of `self.item_size` bytes with this column's alignment.
    pub unsafe fn swap_remove_and_move(&mut self, index: usize, out_ptr: *mut u8) {
        debug_assert!(index < self.len);
        let last = self.len - 1;
        if self.item_size > 0 {
            let src = self.ptr_at(index);
            unsafe { ptr::copy_nonoverlapping(src, out_ptr, self.item_size) };
            if index != last {
                let moved_src = self.ptr_at(last);
                let dst = unsafe { self.data.add(index * self.item_size) };
                unsafe { ptr::copy_nonoverlapping(moved_src, dst, self.item_size) };
            }
        }
        self.len -= 1;
    }

    /// Drop all remaining elements using `destructor`, then free the
    /// backing allocation.
    ///
    /// # Safety
    /// `destructor`, if present, must be valid for this column's component
    /// type.
    pub unsafe fn drop_all(&mut self, destructor: Option<unsafe fn(*mut u8)>) {
        if let Some(drop_fn) = destructor {
            for i in 0..self.len {
                if self.item_size > 0 {
                    unsafe { drop_fn(self.ptr_at(i)) };
                }
            }
        }
        if self.item_size > 0 && self.capacity > 0 {
            let layout = self
                .layout_for_capacity(self.capacity)
                .expect("layout must be valid");
            unsafe { alloc::dealloc(self.data, layout) };
        }
        self.data = ptr::null_mut();
        self.len = 0;
        self.capacity = 0;
    }
}

impl std::fmt::Debug for Column {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Column")
            .field("len", &self.len)
            .field("capacity", &self.capacity)
            .field("item_size", &self.item_size)
            .field("item_align", &self.item_align)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Table
// ---------------------------------------------------------------------------

struct ColumnEntry {
    column: Column,
    destructor: Option<unsafe fn(*mut u8)>,
}

impl std::fmt::Debug for ColumnEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ColumnEntry")
            .field("column", &self.column)
            .field("has_destructor", &self.destructor.is_some())
            .finish()
    }
}

/// Column-major storage for every entity sharing one archetype.
///
/// Columns are kept in a [`SparseSet`] keyed by [`ComponentId`], giving O(1)
/// lookup by id while `component_ids()` preserves the archetype's sorted
/// order for callers that need a canonical key.
#[derive(Debug)]
pub struct Table {
    id: TableId,
    component_ids: Vec<ComponentId>,
    columns: SparseSet<ColumnEntry, ComponentId>,
    entities: Vec<Entity>,
    capacity: usize,
}

impl Table {
    /// Create a new, empty table for the given sorted archetype key.
    /// `infos` must correspond 1:1 with `component_ids`.
    pub fn new(id: TableId, component_ids: Vec<ComponentId>, infos: &[ComponentInfo]) -> Self {
        let mut columns = SparseSet::new();
        for (cid, info) in component_ids.iter().zip(infos) {
            columns.insert_unique(
                *cid,
                ColumnEntry {
                    column: Column::new(info),
                    destructor: info.destructor,
                },
            );
        }
        Self {
            id,
            component_ids,
            columns,
            entities: Vec::new(),
            capacity: 0,
        }
    }

    #[inline]
    pub fn id(&self) -> TableId {
        self.id
    }

    #[inline]
    pub fn component_ids(&self) -> &[ComponentId] {
        &self.component_ids
    }

    #[inline]
    pub fn has_component(&self, id: ComponentId) -> bool {
        self.columns.contains(id)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    #[inline]
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    /// Grow every column (and the row bookkeeping) so at least `n` more rows
    /// fit without further allocation. Grows by at least `max(cap*2, len+n)`.
    pub fn ensure_unused(&mut self, n: usize) {
        let needed = self.entities.len() + n;
        if needed <= self.capacity {
            return;
        }
        let new_cap = needed.max(self.capacity * 2).max(4);
        tracing::trace!(table = self.id.0, from = self.capacity, to = new_cap, "table growing");
        for (_, entry) in self.columns.iter_mut() {
            entry.column.ensure_capacity(new_cap);
        }
        self.entities.reserve(new_cap - self.entities.len());
        self.capacity = new_cap;
    }

    /// Append a new row for `entity`. Requires spare capacity (see
    /// [`Table::ensure_unused`]); the caller must then write a value into
    /// every column via [`Table::write_component`].
    pub fn add_row(&mut self, entity: Entity) -> u32 {
        debug_assert!(
            self.entities.len() < self.capacity,
            "add_row called without ensure_unused"
        );
        let row = self.entities.len() as u32;
        self.entities.push(entity);
        row
    }

    /// Write a component value into the most recently added row.
    ///
    /// # Safety
    /// `value_ptr` must point to a valid, initialized value of the type
    /// registered for `component`; ownership moves into the table.
    pub unsafe fn write_component(&mut self, component: ComponentId, value_ptr: *const u8) {
        let entry = self
            .columns
            .get_mut(component)
            .expect("component not present in this table");
        unsafe { entry.column.push_raw(value_ptr) };
    }

    /// Swap-remove `row`. Returns the entity that was moved into `row` (the
    /// table's previous last row), or `None` if `row` was already last.
    pub fn remove(&mut self, row: u32) -> Option<Entity> {
        let row = row as usize;
        let last = self.entities.len() - 1;
        self.entities.swap_remove(row);
        for (_, entry) in self.columns.iter_mut() {
            unsafe { entry.column.swap_remove(row, entry.destructor) };
        }
        if row < last {
            Some(self.entities[row])
        } else {
            None
        }
    }

    /// Raw pointer to the component value at `row` for `component`.
    pub fn get_component_raw(&self, row: u32, component: ComponentId) -> Option<*const u8> {
        let entry = self.columns.get(component)?;
        if (row as usize) >= entry.column.len() {
            return None;
        }
        Some(unsafe { entry.column.get_raw(row as usize) })
    }

    /// Mutable raw pointer to the component value at `row` for `component`.
    pub fn get_component_raw_mut(&mut self, row: u32, component: ComponentId) -> Option<*mut u8> {
        let entry = self.columns.get_mut(component)?;
        if (row as usize) >= entry.column.len() {
            return None;
        }
        Some(unsafe { entry.column.get_raw_mut(row as usize) })
    }

    /// Swap-remove `row`, handing every component's value back as an
    /// [`ExtractedComponent`] instead of dropping it. Used when an entity
    /// migrates to a table with a different component set.
    ///
    /// Returns `(extracted components in this table's column order, entity
    /// moved into `row`)`.
    pub fn extract_row(&mut self, row: u32) -> (Vec<(ComponentId, ExtractedComponent)>, Option<Entity>) {
        let row = row as usize;
        let last = self.entities.len() - 1;
        self.entities.swap_remove(row);

        let mut extracted = Vec::with_capacity(self.columns.len());
        for (cid, entry) in self.columns.iter_mut() {
            let layout = Layout::from_size_align(entry.column.item_size, entry.column.item_align)
                .expect("column layout already validated at construction");
            let out_ptr = if layout.size() > 0 {
                let p = unsafe { alloc::alloc(layout) };
                assert!(!p.is_null(), "component extraction allocation failed");
                p
            } else {
                ptr::null_mut()
            };
            unsafe { entry.column.swap_remove_and_move(row, out_ptr) };
            extracted.push((
                cid,
                ExtractedComponent {
                    ptr: out_ptr,
                    layout,
                    destructor: entry.destructor,
                },
            ));
        }

        let moved = if row < last {
            Some(self.entities[row])
        } else {
            None
        };
        (extracted, moved)
    }
}

/// An owned component value extracted out of a table row during migration.
///
/// Dropping this only frees the backing allocation -- it does **not** run
/// the component's destructor, since the usual reason to hold one of these
/// is to copy its bytes into a different table's column, which takes over
/// logical ownership of the value. Call [`ExtractedComponent::drop_value`]
/// first if the value itself (not just its buffer) needs to go away.
pub struct ExtractedComponent {
    ptr: *mut u8,
    layout: Layout,
    destructor: Option<unsafe fn(*mut u8)>,
}

impl ExtractedComponent {
    /// Build one directly from an owned value, e.g. a freshly supplied
    /// component being added during a table migration.
    pub fn from_value<T>(value: T, destructor: Option<unsafe fn(*mut u8)>) -> Self {
        let layout = Layout::new::<T>();
        if layout.size() == 0 {
            std::mem::forget(value);
            return Self {
                ptr: ptr::null_mut(),
                layout,
                destructor,
            };
        }
        let out_ptr = unsafe {
            let p = alloc::alloc(layout);
            assert!(!p.is_null(), "component allocation failed");
            ptr::copy_nonoverlapping(&value as *const T as *const u8, p, layout.size());
            p
        };
        std::mem::forget(value);
        Self {
            ptr: out_ptr,
            layout,
            destructor,
        }
    }

    pub fn as_ptr(&self) -> *const u8 {
        if self.layout.size() > 0 {
            self.ptr
        } else {
            self.layout.align() as *const u8
        }
    }

    /// Run the component's destructor now. After calling this, dropping the
    /// `ExtractedComponent` only frees the buffer.
    pub fn drop_value(&mut self) {
        if self.layout.size() > 0 {
            if let Some(drop_fn) = self.destructor.take() {
                unsafe { drop_fn(self.ptr) };
            }
        }
    }
}

impl Drop for ExtractedComponent {
    fn drop(&mut self) {
        if self.layout.size() > 0 && !self.ptr.is_null() {
            unsafe { alloc::dealloc(self.ptr, self.layout) };
        }
    }
}

impl Drop for Table {
    fn drop(&mut self) {
        for (_, entry) in self.columns.iter_mut() {
            unsafe { entry.column.drop_all(entry.destructor) };
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Entity identifiers and allocation.
//!
//! An [`Entity`] is a 64-bit handle that packs a *generation* counter in the
//! high 32 bits and a *slot index* in the low 32 bits. The generation is
//! bumped every time a slot is recycled, which allows immediate stale-handle
//! detection.
//!
//! [`EntityAllocator`] offers two surfaces: an *exclusive* one
//! (`allocate_one`/`allocate_many`/`deallocate`/`location`/`location_mut`)
//! that requires unique access, and a *shared* one
//! (`reserve_one`/`reserve_many`/`contains`) that is lock-free and may be
//! called concurrently from any thread. Reservations are materialized into
//! real slots later by [`EntityAllocator::flush`], which requires unique
//! access again.

use crate::EcsError;
use std::sync::atomic::{AtomicU32, Ordering};

// ---------------------------------------------------------------------------
// Entity
// ---------------------------------------------------------------------------

/// A generational entity handle.
///
/// Layout: `[generation: u32 | slot_index: u32]`
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Entity(u64);

impl Entity {
    /// A sentinel value never issued by any allocator.
    pub const NULL: Entity = Entity(u64::MAX);

    #[inline]
    pub(crate) fn new(slot_index: u32, generation: u32) -> Self {
        Self((generation as u64) << 32 | slot_index as u64)
    }

    /// The slot-index portion (low 32 bits).
    #[inline]
    pub fn slot_index(self) -> u32 {
        self.0 as u32
    }

    /// The generation portion (high 32 bits).
    #[inline]
    pub fn generation(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// Whether this is the [`Entity::NULL`] sentinel.
    #[inline]
    pub fn is_null(self) -> bool {
        self == Self::NULL
    }

    /// Pack into a raw `u64`, e.g. for embedding into other data.
    #[inline]
    pub fn to_bits(self) -> u64 {
        self.0
    }

    /// Reconstruct from a raw `u64` previously produced by [`Entity::to_bits`].
    #[inline]
    pub fn from_bits(bits: u64) -> Self {
        Self(bits)
    }
}

impl std::fmt::Debug for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Entity({}v{})", self.slot_index(), self.generation())
    }
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}v{}", self.slot_index(), self.generation())
    }
}

// ---------------------------------------------------------------------------
// EntityLocation
// ---------------------------------------------------------------------------

/// Identifies a table and a row within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityLocation {
    pub table: u32,
    pub row: u32,
}

// ---------------------------------------------------------------------------
// Slot
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
struct Slot {
    generation: u32,
    alive: bool,
    location: Option<EntityLocation>,
}

// ---------------------------------------------------------------------------
// EntityAllocator
// ---------------------------------------------------------------------------

/// Allocates and recycles [`Entity`] handles with generational tracking.
///
/// The free list is a LIFO stack: both exclusive allocation and concurrent
/// reservation reuse the *most recently freed* slot first. This is required
/// so that the order in which [`EntityAllocator::reserve_many`] hands out
/// entities matches the order [`EntityAllocator::flush`] will later
/// materialize them in.
#[derive(Debug)]
pub struct EntityAllocator {
    slots: Vec<Slot>,
    free_list: Vec<u32>,
    /// Count of reservations made since the last `flush`. Shared-mode
    /// readers only ever `fetch_add` this counter; only `flush` resets it,
    /// and `flush` requires exclusive access.
    reserved: AtomicU32,
}

impl EntityAllocator {
    /// Create a new, empty allocator.
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_list: Vec::new(),
            reserved: AtomicU32::new(0),
        }
    }

    // --- exclusive surface ---------------------------------------------

    /// Allocate a fresh [`Entity`], reusing the most recently freed slot if
    /// one is available.
    pub fn allocate_one(&mut self) -> Entity {
        self.assert_no_pending_reservations("allocate_one");
        if let Some(idx) = self.free_list.pop() {
            let slot = &mut self.slots[idx as usize];
            slot.alive = true;
            slot.location = None;
            Entity::new(idx, slot.generation)
        } else {
            let idx = self.push_fresh_slot();
            Entity::new(idx, 0)
        }
    }

    /// Allocate `n` fresh entities.
    pub fn allocate_many(&mut self, n: u32) -> Vec<Entity> {
        self.assert_no_pending_reservations("allocate_many");
        (0..n).map(|_| self.allocate_one()).collect()
    }

    /// Deallocate `entity`, bumping the generation of its slot so stale
    /// handles are rejected. Returns an error if `entity` was not alive.
    pub fn deallocate(&mut self, entity: Entity) -> Result<(), EcsError> {
        self.assert_no_pending_reservations("deallocate");
        let idx = entity.slot_index() as usize;
        let Some(slot) = self.slots.get_mut(idx) else {
            return Err(EcsError::StaleEntity { entity });
        };
        if !slot.alive || slot.generation != entity.generation() {
            return Err(EcsError::StaleEntity { entity });
        }
        slot.alive = false;
        slot.location = None;
        slot.generation = match slot.generation.checked_add(1) {
            Some(g) => g,
            None => {
                tracing::error!(?entity, "entity slot generation overflowed");
                panic!("entity slot generation overflowed for slot {idx}");
            }
        };
        self.free_list.push(idx as u32);
        Ok(())
    }

    /// The recorded table/row for `entity`, if it is currently alive.
    pub fn location(&self, entity: Entity) -> Option<EntityLocation> {
        let idx = entity.slot_index() as usize;
        let slot = self.slots.get(idx)?;
        if slot.alive && slot.generation == entity.generation() {
            slot.location
        } else {
            None
        }
    }

    /// A mutable handle to the recorded location for `entity`, for the
    /// engine to fill in or fix up after a table append or swap-remove.
    pub fn location_mut(&mut self, entity: Entity) -> Option<&mut Option<EntityLocation>> {
        let idx = entity.slot_index() as usize;
        let slot = self.slots.get_mut(idx)?;
        if slot.alive && slot.generation == entity.generation() {
            Some(&mut slot.location)
        } else {
            None
        }
    }

    /// Promote all pending reservations into real slots, in the same order
    /// reservers observed them. Returns an empty vector if nothing is
    /// pending.
    pub fn flush(&mut self) -> Vec<Entity> {
        let reserved = *self.reserved.get_mut();
        if reserved == 0 {
            return Vec::new();
        }
        let reused = reserved.min(self.free_list.len() as u32) as usize;
        let mut out = Vec::with_capacity(reserved as usize);
        for _ in 0..reused {
            let idx = self
                .free_list
                .pop()
                .expect("reused count bounded by free_list length");
            let slot = &mut self.slots[idx as usize];
            slot.alive = true;
            slot.location = None;
            out.push(Entity::new(idx, slot.generation));
        }
        let fresh = reserved as usize - reused;
        for _ in 0..fresh {
            let idx = self.push_fresh_slot();
            out.push(Entity::new(idx, 0));
        }
        *self.reserved.get_mut() = 0;
        out
    }

    /// Whether there are reservations waiting for [`EntityAllocator::flush`].
    pub fn needs_flush(&self) -> bool {
        self.reserved.load(Ordering::Relaxed) > 0
    }

    /// Total number of currently alive entities.
    pub fn alive_count(&self) -> usize {
        self.slots.iter().filter(|s| s.alive).count()
    }

    fn push_fresh_slot(&mut self) -> u32 {
        if self.slots.len() >= u32::MAX as usize {
            tracing::error!(count = self.slots.len(), "entity slot index space exhausted");
            panic!("entity slot index space exhausted");
        }
        let idx = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            alive: true,
            location: None,
        });
        idx
    }

    fn assert_no_pending_reservations(&self, op: &str) {
        debug_assert!(
            self.reserved.load(Ordering::Relaxed) == 0,
            "EntityAllocator::{op} called with pending reservations; call flush() first"
        );
    }

    // --- shared surface --------------------------------------------------

    /// Reserve a single entity without blocking. May be called concurrently
    /// with other `reserve_one`/`reserve_many` calls from any thread, but
    /// never concurrently with an exclusive-surface method.
    pub fn reserve_one(&self) -> Entity {
        self.reserve_many(1)
            .into_iter()
            .next()
            .expect("reserve_many(1) always yields one entity")
    }

    /// Reserve `n` entities without blocking. The atomic `reserved` counter
    /// partitions a disjoint index range to each caller; see the module
    /// docs for the LIFO free-list-reuse contract.
    pub fn reserve_many(&self, n: u32) -> Vec<Entity> {
        if n == 0 {
            return Vec::new();
        }
        let pre = self.reserved.fetch_add(n, Ordering::Relaxed);
        let free_len = self.free_list.len();
        let mut out = Vec::with_capacity(n as usize);
        for i in 0..n {
            let global_i = (pre + i) as usize;
            if global_i < free_len {
                let slot_idx = self.free_list[free_len - 1 - global_i];
                let generation = self.slots[slot_idx as usize].generation;
                out.push(Entity::new(slot_idx, generation));
            } else {
                let virtual_idx = self.slots.len() + (global_i - free_len);
                out.push(Entity::new(virtual_idx as u32, 0));
            }
        }
        out
    }

    /// Thread-safe liveness check, including entities that have been
    /// reserved but not yet flushed.
    pub fn contains(&self, entity: Entity) -> bool {
        let idx = entity.slot_index() as usize;
        let reserved = self.reserved.load(Ordering::Relaxed) as usize;
        let free_len = self.free_list.len();
        let reused = reserved.min(free_len);

        if idx < self.slots.len() {
            let slot = &self.slots[idx];
            if slot.generation != entity.generation() {
                return false;
            }
            if slot.alive {
                return true;
            }
            // Not alive by the slot's own bookkeeping yet -- it may be one
            // of the top `reused` free-list entries, reserved but not
            // flushed.
            reused > 0 && self.free_list[free_len - reused..].contains(&(idx as u32))
        } else {
            entity.generation() == 0 && idx < self.slots.len() + (reserved - reused)
        }
    }
}

impl Default for EntityAllocator {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

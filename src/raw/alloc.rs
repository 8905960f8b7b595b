use std::{mem, ptr};
use std::sync::atomic::{AtomicPtr, AtomicU8, Ordering};

use seize::Collector;

// The state of a slot.
pub mod state {
    /// The slot has never been used. This marks the end of a probe chain.
    pub const EMPTY: u8 = 0;

    /// The slot holds a live key and value.
    pub const OCCUPIED: u8 = 1;

    /// The slot was deleted but retains its key.
    ///
    /// A tombstone never ends a probe chain and may only be re-occupied by
    /// the key it retains.
    pub const TOMBSTONE: u8 = 2;
}

// A single position in the table.
pub struct Slot<K, V> {
    // The publish signal for the key and value.
    pub state: AtomicU8,

    // The key, written exactly once when the slot is claimed.
    pub key: AtomicPtr<K>,

    // The value, null if the slot is not occupied.
    pub value: AtomicPtr<V>,
}

impl<K, V> Slot<K, V> {
    fn empty() -> Slot<K, V> {
        Slot {
            state: AtomicU8::new(state::EMPTY),
            key: AtomicPtr::new(ptr::null_mut()),
            value: AtomicPtr::new(ptr::null_mut()),
        }
    }

    // Publish a key and value into an empty slot.
    //
    // The key and value are written before the state, so a reader that observes
    // `OCCUPIED` with `Acquire` always sees both.
    //
    // # Safety
    //
    // The slot must be empty and the caller must be the only writer.
    #[inline]
    pub unsafe fn publish(&self, key: *mut K, value: *mut V) {
        debug_assert_eq!(self.state.load(Ordering::Relaxed), state::EMPTY);

        self.key.store(key, Ordering::Relaxed);
        self.value.store(value, Ordering::Relaxed);
        self.state.store(state::OCCUPIED, Ordering::Release);
    }
}

// A fixed-length array of slots.
pub struct Table<K, V> {
    slots: Box<[Slot<K, V>]>,
}

impl<K, V> Table<K, V> {
    // Allocate a table with the provided length, returning an owned pointer.
    pub fn alloc(len: usize) -> *mut Table<K, V> {
        assert!(len > 0, "table capacity must be non-zero");

        let slots = (0..len).map(|_| Slot::empty()).collect();
        Box::into_raw(Box::new(Table { slots }))
    }

    // Returns the length of the table.
    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    // Returns the slot at the given index.
    #[inline]
    pub fn slot(&self, i: usize) -> &Slot<K, V> {
        debug_assert!(i < self.len());
        &self.slots[i]
    }

    // Returns an iterator over all slots.
    #[inline]
    pub fn slots(&self) -> impl Iterator<Item = &Slot<K, V>> {
        self.slots.iter()
    }

    // Reclaim a table that was replaced by a grow.
    //
    // Keys and values of occupied slots were moved to the next table and are
    // owned by it. The retired table only owns the keys of its tombstones.
    //
    // # Safety
    //
    // The table must have been unlinked from the map and must not be mutated
    // after it was retired.
    pub unsafe fn reclaim_retired(table: *mut Table<K, V>, _collector: &Collector) {
        let table = unsafe { Box::from_raw(table) };

        for slot in table.slots() {
            if slot.state.load(Ordering::Relaxed) == state::TOMBSTONE {
                unsafe { drop(Box::from_raw(slot.key.load(Ordering::Relaxed))) };
            }
        }
    }

    // Drop a table along with every key and value it holds.
    //
    // # Safety
    //
    // The caller must have unique access to the table.
    pub unsafe fn drop_all(table: *mut Table<K, V>) {
        let mut table = unsafe { Box::from_raw(table) };

        for slot in table.slots.iter_mut() {
            let key = *slot.key.get_mut();
            if !key.is_null() {
                unsafe { drop(Box::from_raw(key)) };
            }

            let value = *slot.value.get_mut();
            if !value.is_null() {
                unsafe { drop(Box::from_raw(value)) };
            }
        }
    }
}

// A table that has not yet been published to readers.
//
// The keys and values it points to are owned by the current table until the
// new table is published, so dropping it only frees the slots.
pub struct Unpublished<K, V>(*mut Table<K, V>);

impl<K, V> Unpublished<K, V> {
    pub fn alloc(len: usize) -> Unpublished<K, V> {
        Unpublished(Table::alloc(len))
    }

    #[inline]
    pub fn as_ptr(&self) -> *mut Table<K, V> {
        self.0
    }

    // Release ownership of the table to be published.
    #[inline]
    pub fn into_raw(self) -> *mut Table<K, V> {
        let table = self.0;
        mem::forget(self);
        table
    }
}

impl<K, V> Drop for Unpublished<K, V> {
    fn drop(&mut self) {
        // Safety: The table was never shared, and `Table` does not drop the keys
        // and values its slots point to.
        unsafe { drop(Box::from_raw(self.0)) };
    }
}

// Reclaim a boxed key or value.
pub unsafe fn reclaim_boxed<T>(ptr: *mut T, _collector: &Collector) {
    unsafe { drop(Box::from_raw(ptr)) };
}

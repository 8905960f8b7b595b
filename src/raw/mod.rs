mod alloc;
mod probe;
mod utils;

use std::borrow::Borrow;
use std::hash::{BuildHasher, Hash};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::{hint, ptr};

use self::alloc::{reclaim_boxed, state, Table, Unpublished};
use self::probe::Probe;
use self::utils::trace;
use crate::map::{FullError, ResizeMode};

use seize::{Collector, Guard, LocalGuard, OwnedGuard};

/// An open-addressed hash-table with lock-free reads.
///
/// Readers never block. Writers serialize on an internal lock that readers
/// never touch.
pub struct HashMap<K, V, S> {
    /// A pointer to the current table.
    table: AtomicPtr<Table<K, V>>,

    /// The length of the current table.
    ///
    /// This is the single word readers use to detect a grow. It is always
    /// stored after the new table has been fully populated and published.
    capacity: AtomicUsize,

    /// The number of live entries.
    count: AtomicUsize,

    /// Serializes writers against each other.
    writer: Mutex<()>,

    /// Collector for memory reclamation.
    collector: Collector,

    /// The growth policy.
    resize: ResizeMode,

    /// Hasher for keys.
    hasher: S,

    _kv: PhantomData<*const (K, V)>,
}

// Safety: Keys and values are only ever accessed through shared references,
// and may be dropped by any thread through the collector.
unsafe impl<K: Send, V: Send, S: Send> Send for HashMap<K, V, S> {}
unsafe impl<K: Send + Sync, V: Send + Sync, S: Sync> Sync for HashMap<K, V, S> {}

// The result of a write to the table.
enum InsertStatus {
    /// A new entry was claimed.
    Inserted,

    /// The value of an existing entry was replaced.
    Replaced,
}

impl<K, V, S> HashMap<K, V, S> {
    /// Creates new hash-table with the given options.
    #[inline]
    pub fn new(
        capacity: usize,
        hasher: S,
        collector: Collector,
        resize: ResizeMode,
    ) -> HashMap<K, V, S> {
        HashMap {
            table: AtomicPtr::new(Table::alloc(capacity)),
            capacity: AtomicUsize::new(capacity),
            count: AtomicUsize::new(0),
            writer: Mutex::new(()),
            collector,
            resize,
            hasher,
            _kv: PhantomData,
        }
    }

    /// Returns a guard for this collector.
    #[inline]
    pub fn guard(&self) -> LocalGuard<'_> {
        self.collector.enter()
    }

    /// Returns an owned guard for this collector.
    #[inline]
    pub fn owned_guard(&self) -> OwnedGuard<'_> {
        self.collector.enter_owned()
    }

    /// Verify a guard is valid to use with this map.
    #[inline]
    pub fn verify(&self, guard: &impl Guard) {
        assert_eq!(
            *guard.collector(),
            self.collector,
            "Attempted to access map with incorrect guard"
        );
    }

    /// Returns the current capacity of the table.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity.load(Ordering::Acquire)
    }

    /// Returns the number of live entries in the table.
    #[inline]
    pub fn len(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    /// Returns the growth policy of the table.
    #[inline]
    pub fn resize_mode(&self) -> ResizeMode {
        self.resize
    }

    // Returns a reference to the current table.
    //
    // Only writers may call this. Readers must load the table through a guard.
    #[inline]
    fn current(&self) -> &Table<K, V> {
        // Safety: The table is only replaced by a writer holding the lock, so it
        // cannot be retired while we hold the lock ourselves.
        unsafe { &*self.table.load(Ordering::Acquire) }
    }
}

impl<K, V, S> HashMap<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    /// Returns a reference to the value corresponding to the key.
    ///
    /// If a grow is observed at any point during the scan, the lookup restarts
    /// against the new table. The lookup may therefore retry indefinitely under
    /// continuous concurrent growth.
    #[inline]
    pub fn get<'g, Q>(&self, key: &Q, guard: &'g impl Guard) -> Option<&'g V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = self.hasher.hash_one(key);

        'retry: loop {
            // Snapshot the capacity before loading the table.
            let capacity = self.capacity.load(Ordering::Acquire);

            // Safety: The table pointer is always valid, and we performed a
            // protected load, so it cannot be reclaimed while we hold the guard.
            let table = unsafe { &*guard.protect(&self.table, Ordering::Acquire) };

            // A grow published the new table but has not yet updated the capacity.
            if table.len() != capacity {
                trace!("table/capacity mismatch ({} != {capacity}), retrying", table.len());
                hint::spin_loop();
                continue 'retry;
            }

            let mut probe = Probe::start(hash, capacity);

            'probe: while probe.remaining() {
                let slot = table.slot(probe.i);

                match slot.state.load(Ordering::Acquire) {
                    // The end of the probe chain.
                    state::EMPTY => break 'probe,

                    // Tombstones retain their key, so a matching tombstone means
                    // the key is not in this table.
                    state::TOMBSTONE => {
                        // Safety: The key is published before the state and is never
                        // freed while the table is reachable through our guard.
                        let entry_key = unsafe { &*guard.protect(&slot.key, Ordering::Acquire) };

                        if equivalent(key, entry_key) {
                            break 'probe;
                        }
                    }

                    _ => {
                        let entry_key = guard.protect(&slot.key, Ordering::Acquire);
                        let value = guard.protect(&slot.value, Ordering::Acquire);

                        // The table was replaced while we were reading, the entry may be stale.
                        if self.capacity.load(Ordering::Acquire) != capacity {
                            trace!("capacity changed during lookup, retrying");
                            continue 'retry;
                        }

                        // Safety: See above.
                        if equivalent(key, unsafe { &*entry_key }) {
                            // The entry was deleted concurrently.
                            if value.is_null() {
                                break 'probe;
                            }

                            // Safety: We performed a protected load of a non-null value,
                            // which is valid for reads as long as we hold the guard.
                            return Some(unsafe { &*value });
                        }
                    }
                }

                probe.next();
            }

            // Absence is only conclusive if the table was not replaced during the scan.
            if self.capacity.load(Ordering::Acquire) != capacity {
                trace!("capacity changed before miss was confirmed, retrying");
                continue 'retry;
            }

            return None;
        }
    }

    /// Inserts a key-value pair into the table, replacing the value of an
    /// existing entry.
    ///
    /// Returns the key and value back if the table is full.
    pub fn insert(&self, key: K, value: V, guard: &impl Guard) -> Result<(), FullError<K, V>> {
        let hash = self.hasher.hash_one(&key);
        let _writer = utils::lock(&self.writer);

        let (mut key, mut value) = (key, value);
        loop {
            // Safety: We hold the writer lock.
            match unsafe { self.insert_locked(hash, key, value, guard) } {
                Ok(status) => {
                    if let (InsertStatus::Inserted, ResizeMode::Double) = (status, self.resize) {
                        let capacity = self.current().len();

                        // Grow to twice the capacity once the table is half full.
                        if self.count.load(Ordering::Relaxed) * 2 >= capacity {
                            // Safety: We hold the writer lock.
                            unsafe { self.grow_locked(double(capacity), guard) };
                        }
                    }

                    return Ok(());
                }

                Err(full) => {
                    trace!("table of capacity {} is full", self.current().len());

                    if self.resize == ResizeMode::Manual {
                        return Err(full);
                    }

                    let capacity = grow_target(
                        self.current().len(),
                        self.count.load(Ordering::Relaxed),
                    );

                    // Safety: We hold the writer lock.
                    unsafe { self.grow_locked(capacity, guard) };
                    (key, value) = (full.key, full.value);
                }
            }
        }
    }

    // Inserts a key-value pair into the current table.
    //
    // # Safety
    //
    // The caller must hold the writer lock.
    unsafe fn insert_locked(
        &self,
        hash: u64,
        key: K,
        value: V,
        guard: &impl Guard,
    ) -> Result<InsertStatus, FullError<K, V>> {
        let table = self.current();
        let mut probe = Probe::start(hash, table.len());

        while probe.remaining() {
            let slot = table.slot(probe.i);

            // We are the only writer, any previous writes happen-before the lock was acquired.
            let status = slot.state.load(Ordering::Relaxed);

            // Claim the empty slot.
            if status == state::EMPTY {
                let key = Box::into_raw(Box::new(key));
                let value = Box::into_raw(Box::new(value));

                // Safety: The slot is empty and we hold the writer lock.
                unsafe { slot.publish(key, value) };

                self.count.fetch_add(1, Ordering::Release);
                return Ok(InsertStatus::Inserted);
            }

            // Safety: Any non-empty slot has a published key that is owned by this table.
            let entry_key = unsafe { &*slot.key.load(Ordering::Relaxed) };

            if *entry_key != key {
                probe.next();
                continue;
            }

            let new_value = Box::into_raw(Box::new(value));

            // Overwrite the value in place.
            if status == state::OCCUPIED {
                let old = slot.value.swap(new_value, Ordering::AcqRel);

                // Safety: The old value was unlinked from the table above and readers
                // only access it through a guard.
                unsafe { guard.defer_retire(old, reclaim_boxed::<V>) };
                return Ok(InsertStatus::Replaced);
            }

            // Revive the tombstone that retains this key. The value is
            // published before the state.
            slot.value.store(new_value, Ordering::Release);
            slot.state.store(state::OCCUPIED, Ordering::Release);

            self.count.fetch_add(1, Ordering::Release);
            return Ok(InsertStatus::Inserted);
        }

        Err(FullError { key, value })
    }

    /// Removes a key from the table, returning `true` if it was present.
    ///
    /// The slot becomes a tombstone that keeps its key, so probe chains that
    /// pass through it remain intact.
    pub fn remove<Q>(&self, key: &Q, guard: &impl Guard) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = self.hasher.hash_one(key);
        let _writer = utils::lock(&self.writer);

        let table = self.current();
        let mut probe = Probe::start(hash, table.len());

        while probe.remaining() {
            let slot = table.slot(probe.i);
            let status = slot.state.load(Ordering::Relaxed);

            // The end of the probe chain.
            if status == state::EMPTY {
                return false;
            }

            // Safety: Any non-empty slot has a published key that is owned by this table.
            let entry_key = unsafe { &*slot.key.load(Ordering::Relaxed) };

            if equivalent(key, entry_key) {
                // Already deleted.
                if status == state::TOMBSTONE {
                    return false;
                }

                slot.state.store(state::TOMBSTONE, Ordering::Release);
                let old = slot.value.swap(ptr::null_mut(), Ordering::AcqRel);

                // Safety: The value was unlinked from the table above and readers
                // only access it through a guard.
                unsafe { guard.defer_retire(old, reclaim_boxed::<V>) };

                self.count.fetch_sub(1, Ordering::Release);
                return true;
            }

            probe.next();
        }

        false
    }

    /// Replaces the table with one of the given capacity.
    ///
    /// This is a no-op if the capacity is not larger than the current capacity.
    pub fn grow(&self, capacity: usize, guard: &impl Guard) {
        let _writer = utils::lock(&self.writer);

        // Safety: We hold the writer lock.
        unsafe { self.grow_locked(capacity, guard) }
    }

    // Move every live entry into a new table and publish it.
    //
    // # Safety
    //
    // The caller must hold the writer lock.
    unsafe fn grow_locked(&self, capacity: usize, guard: &impl Guard) {
        let old = self.table.load(Ordering::Acquire);

        // Safety: The table is only replaced by writers, and we hold the writer lock.
        let old_table = unsafe { &*old };

        if capacity <= old_table.len() {
            return;
        }

        trace!(
            "growing table from {} to {capacity} ({} live entries)",
            old_table.len(),
            self.count.load(Ordering::Relaxed)
        );

        // Freed if hashing a key panics before the table is published.
        let new = Unpublished::<K, V>::alloc(capacity);

        // Safety: The new table is not shared until it is published below.
        let new_table = unsafe { &*new.as_ptr() };

        for slot in old_table.slots() {
            if slot.state.load(Ordering::Relaxed) != state::OCCUPIED {
                continue;
            }

            let key = slot.key.load(Ordering::Relaxed);
            let value = slot.value.load(Ordering::Relaxed);

            // Safety: Occupied slots hold a valid key.
            let hash = self.hasher.hash_one(unsafe { &*key });

            // Live keys are unique, so the first empty slot in the chain is the
            // slot an insert would claim.
            let mut probe = Probe::start(hash, capacity);
            while new_table.slot(probe.i).state.load(Ordering::Relaxed) != state::EMPTY {
                probe.next();
                debug_assert!(probe.remaining(), "grow target cannot hold every live entry");
            }

            // Safety: The slot is empty and the table is not yet shared. Ownership of
            // the key and value moves to the new table.
            unsafe { new_table.slot(probe.i).publish(key, value) };
        }

        // Publish the fully populated table, then the capacity. A reader that
        // observes the new capacity is guaranteed to load the new table.
        self.table.store(new.into_raw(), Ordering::Release);
        self.capacity.store(capacity, Ordering::Release);

        // Safety: The old table is unreachable from the map and is never mutated
        // again. Readers still scanning it hold a guard.
        unsafe { guard.defer_retire(old, Table::<K, V>::reclaim_retired) };

        trace!("grow to {capacity} complete");
    }
}

impl<K, V, S> Drop for HashMap<K, V, S> {
    fn drop(&mut self) {
        // Make sure all retired values and tables are reclaimed before the
        // collector is dropped.
        //
        // Safety: We have a unique reference to the collector.
        unsafe { self.collector.reclaim_all() };

        // Safety: We have unique access to the current table, which owns every
        // live key and value as well as the keys of its tombstones.
        unsafe { Table::drop_all(*self.table.get_mut()) };
    }
}

// Compare a lookup key against a stored key.
#[inline]
fn equivalent<K, Q>(key: &Q, entry_key: &K) -> bool
where
    K: Borrow<Q>,
    Q: Eq + ?Sized,
{
    key == entry_key.borrow()
}

// Returns twice the given capacity.
#[inline]
fn double(capacity: usize) -> usize {
    capacity.checked_mul(2).expect("capacity overflow")
}

// The capacity to grow a full table to.
//
// A table that filled up with tombstones while under half load is compacted
// into a table one slot larger. The capacity must still increase, as readers
// use it to detect a new table.
#[inline]
fn grow_target(capacity: usize, live: usize) -> usize {
    if live * 2 >= capacity {
        return double(capacity);
    }

    capacity.checked_add(1).expect("capacity overflow")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grow_target_compacts_tombstones() {
        // Mostly tombstones.
        assert_eq!(grow_target(64, 0), 65);
        assert_eq!(grow_target(64, 31), 65);

        // Mostly live entries.
        assert_eq!(grow_target(64, 32), 128);
        assert_eq!(grow_target(1, 1), 2);
    }
}

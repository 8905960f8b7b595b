use crate::raw;
use seize::{Collector, Guard, LocalGuard, OwnedGuard};

use std::borrow::Borrow;
use std::collections::hash_map::RandomState;
use std::error::Error;
use std::fmt;
use std::hash::{BuildHasher, Hash};

/// The capacity of a map created with [`HashMap::new`].
pub const DEFAULT_CAPACITY: usize = 32;

/// A concurrent hash table with lock-free reads.
///
/// Most hash table operations require a [`Guard`](crate::Guard), which can be acquired through
/// [`HashMap::guard`] or using the [`HashMap::pin`] API. See the [crate-level
/// documentation](crate) for more details.
pub struct HashMap<K, V, S = RandomState> {
    raw: raw::HashMap<K, V, S>,
}

/// A builder for a [`HashMap`].
///
/// # Examples
///
/// ```rust
/// use probemap::{HashMap, ResizeMode};
/// use std::collections::hash_map::RandomState;
///
/// let map: HashMap<i32, i32> = HashMap::builder()
///     // Set the initial capacity.
///     .capacity(2048)
///     // Set the hasher.
///     .hasher(RandomState::new())
///     // Grow automatically once the table is half full.
///     .resize_mode(ResizeMode::Double)
///     // Construct the hash map.
///     .build();
/// ```
pub struct HashMapBuilder<K, V, S = RandomState> {
    hasher: S,
    capacity: usize,
    collector: Collector,
    resize_mode: ResizeMode,
    _kv: std::marker::PhantomData<(K, V)>,
}

impl<K, V> HashMapBuilder<K, V> {
    /// Set the hash builder used to hash keys.
    ///
    /// Warning: `hash_builder` is normally randomly generated, and is designed
    /// to allow HashMaps to be resistant to attacks that cause many collisions
    /// and very poor performance. Setting it manually using this function can
    /// expose a DoS attack vector.
    pub fn hasher<S>(self, hasher: S) -> HashMapBuilder<K, V, S> {
        HashMapBuilder {
            hasher,
            capacity: self.capacity,
            collector: self.collector,
            resize_mode: self.resize_mode,
            _kv: std::marker::PhantomData,
        }
    }
}

impl<K, V, S> HashMapBuilder<K, V, S> {
    /// Set the initial capacity of the map.
    ///
    /// The capacity is the exact number of slots in the table and must be non-zero.
    pub fn capacity(self, capacity: usize) -> HashMapBuilder<K, V, S> {
        HashMapBuilder {
            capacity,
            hasher: self.hasher,
            collector: self.collector,
            resize_mode: self.resize_mode,
            _kv: std::marker::PhantomData,
        }
    }

    /// Set the growth policy of the map.
    ///
    /// See [`ResizeMode`] for details.
    pub fn resize_mode(self, resize_mode: ResizeMode) -> Self {
        HashMapBuilder {
            resize_mode,
            hasher: self.hasher,
            capacity: self.capacity,
            collector: self.collector,
            _kv: std::marker::PhantomData,
        }
    }

    /// Set the [`seize::Collector`] used for memory reclamation.
    ///
    /// This method may be useful when you want more control over memory reclamation.
    /// See [`seize::Collector`] for details.
    pub fn collector(self, collector: Collector) -> Self {
        HashMapBuilder {
            collector,
            hasher: self.hasher,
            capacity: self.capacity,
            resize_mode: self.resize_mode,
            _kv: std::marker::PhantomData,
        }
    }

    /// Construct a [`HashMap`] from the builder, using the configured options.
    ///
    /// # Panics
    ///
    /// Panics if the configured capacity is zero.
    pub fn build(self) -> HashMap<K, V, S> {
        HashMap {
            raw: raw::HashMap::new(self.capacity, self.hasher, self.collector, self.resize_mode),
        }
    }
}

impl<K, V, S> fmt::Debug for HashMapBuilder<K, V, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HashMapBuilder")
            .field("capacity", &self.capacity)
            .field("collector", &self.collector)
            .field("resize_mode", &self.resize_mode)
            .finish()
    }
}

/// The growth policy of a [`HashMap`].
///
/// The table never grows in place. A grow always allocates a new table, moves
/// every live entry into it, and atomically publishes it. Readers that were
/// scanning the old table detect the change and retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResizeMode {
    /// The table only grows through [`HashMap::grow`].
    ///
    /// Inserting into a full table returns a [`FullError`]. This is the default
    /// resize mode.
    #[default]
    Manual,

    /// The table doubles its capacity once an insert brings the number of live
    /// entries to half of the capacity.
    ///
    /// Removed entries leave tombstones that do not count towards the load but
    /// occupy their slot until the next grow. If tombstones fill the table while
    /// fewer than half of the slots are live, the live entries are instead moved
    /// into a table one slot larger, dropping every tombstone. Workloads that
    /// repeatedly insert and remove distinct keys therefore pay for a periodic
    /// copy of the live entries, and capacity grows slowly.
    ///
    /// Inserts never fail in this mode.
    Double,
}

/// The error returned by [`HashMap::insert`] when the table is full.
///
/// Contains the key and value that were not inserted.
#[derive(Debug, PartialEq, Eq)]
pub struct FullError<K, V> {
    /// The key that was not inserted.
    pub key: K,
    /// The value that was not inserted.
    pub value: V,
}

impl<K, V> fmt::Display for FullError<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("hash table is full")
    }
}

impl<K: fmt::Debug, V: fmt::Debug> Error for FullError<K, V> {}

impl<K, V> Default for HashMap<K, V> {
    fn default() -> Self {
        HashMap::new()
    }
}

impl<K, V> HashMap<K, V> {
    /// Creates an empty `HashMap` with a capacity of [`DEFAULT_CAPACITY`].
    ///
    /// # Examples
    ///
    /// ```
    /// use probemap::HashMap;
    /// let map: HashMap<&str, i32> = HashMap::new();
    /// assert_eq!(map.capacity(), 32);
    /// ```
    pub fn new() -> HashMap<K, V> {
        HashMap::with_capacity_and_hasher(DEFAULT_CAPACITY, RandomState::new())
    }

    /// Creates an empty `HashMap` with exactly `capacity` slots.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    ///
    /// # Examples
    ///
    /// ```
    /// use probemap::HashMap;
    /// let map: HashMap<&str, i32> = HashMap::with_capacity(5);
    /// assert_eq!(map.capacity(), 5);
    /// ```
    pub fn with_capacity(capacity: usize) -> HashMap<K, V> {
        HashMap::with_capacity_and_hasher(capacity, RandomState::new())
    }

    /// Returns a builder for a `HashMap`.
    pub fn builder() -> HashMapBuilder<K, V> {
        HashMapBuilder {
            capacity: DEFAULT_CAPACITY,
            hasher: RandomState::default(),
            collector: Collector::new(),
            resize_mode: ResizeMode::default(),
            _kv: std::marker::PhantomData,
        }
    }
}

impl<K, V, S> HashMap<K, V, S> {
    /// Creates an empty `HashMap` which will use the given hash builder to hash
    /// keys.
    pub fn with_hasher(hash_builder: S) -> HashMap<K, V, S> {
        HashMap::with_capacity_and_hasher(DEFAULT_CAPACITY, hash_builder)
    }

    /// Creates an empty `HashMap` with exactly `capacity` slots, using `hash_builder`
    /// to hash the keys.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn with_capacity_and_hasher(capacity: usize, hash_builder: S) -> HashMap<K, V, S> {
        HashMap {
            raw: raw::HashMap::new(
                capacity,
                hash_builder,
                Collector::new(),
                ResizeMode::default(),
            ),
        }
    }

    /// Returns a pinned reference to the map.
    ///
    /// The returned reference manages a guard internally, preventing garbage collection
    /// for as long as it is held. See the [crate-level documentation](crate#usage) for details.
    #[inline]
    pub fn pin(&self) -> HashMapRef<'_, K, V, S, LocalGuard<'_>> {
        HashMapRef {
            guard: self.raw.guard(),
            map: self,
        }
    }

    /// Returns a pinned reference to the map.
    ///
    /// Unlike [`HashMap::pin`], the returned reference implements `Send` and `Sync`,
    /// allowing it to be held across `.await` points in work-stealing schedulers.
    #[inline]
    pub fn pin_owned(&self) -> HashMapRef<'_, K, V, S, OwnedGuard<'_>> {
        HashMapRef {
            guard: self.raw.owned_guard(),
            map: self,
        }
    }

    /// Returns a guard for use with this map.
    ///
    /// Note that holding on to a guard prevents garbage collection.
    /// See the [crate-level documentation](crate#usage) for details.
    #[inline]
    pub fn guard(&self) -> LocalGuard<'_> {
        self.raw.guard()
    }

    /// Returns an owned guard for use with this map.
    #[inline]
    pub fn owned_guard(&self) -> OwnedGuard<'_> {
        self.raw.owned_guard()
    }

    /// Returns the number of slots in the table.
    ///
    /// This is a snapshot, the capacity only ever increases.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.raw.capacity()
    }

    /// Returns the number of live entries in the map.
    ///
    /// Overwriting the value of an existing key does not change the length.
    ///
    /// # Examples
    ///
    /// ```
    /// use probemap::HashMap;
    ///
    /// let map = HashMap::new();
    ///
    /// map.pin().insert(1, "a").unwrap();
    /// map.pin().insert(2, "b").unwrap();
    /// map.pin().insert(2, "c").unwrap();
    /// assert!(map.len() == 2);
    /// ```
    #[inline]
    pub fn len(&self) -> usize {
        self.raw.len()
    }

    /// Returns `true` if the map is empty. Otherwise returns `false`.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the growth policy of the map.
    #[inline]
    pub fn resize_mode(&self) -> ResizeMode {
        self.raw.resize_mode()
    }
}

impl<K, V, S> HashMap<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    /// Returns `true` if the map contains a value for the specified key.
    ///
    /// The key may be any borrowed form of the map's key type, but
    /// [`Hash`] and [`Eq`] on the borrowed form *must* match those for
    /// the key type.
    #[inline]
    pub fn contains_key<Q>(&self, key: &Q, guard: &impl Guard) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.get(key, guard).is_some()
    }

    /// Returns a reference to the value corresponding to the key.
    ///
    /// Never blocks. If the table is replaced during the lookup, the lookup
    /// transparently restarts against the new table.
    ///
    /// # Examples
    ///
    /// ```
    /// use probemap::HashMap;
    ///
    /// let map = HashMap::new();
    /// let m = map.pin();
    /// m.insert(2, "hi").unwrap();
    /// assert_eq!(m.get(&1), None);
    /// assert_eq!(m.get(&2), Some(&"hi"));
    /// ```
    #[inline]
    pub fn get<'g, Q>(&self, key: &Q, guard: &'g impl Guard) -> Option<&'g V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.raw.verify(guard);
        self.raw.get(key, guard)
    }

    /// Inserts a key-value pair into the map.
    ///
    /// If the map already contains the key, its value is overwritten in place
    /// and the length is unchanged.
    ///
    /// Writers are serialized with each other, readers are never blocked.
    ///
    /// # Errors
    ///
    /// Returns a [`FullError`] containing the key and value if every slot is
    /// in use and the map is in [`ResizeMode::Manual`]. The map is unchanged.
    /// Call [`HashMap::grow`] and retry.
    ///
    /// # Examples
    ///
    /// ```
    /// use probemap::HashMap;
    ///
    /// let map = HashMap::with_capacity(1);
    /// assert!(map.pin().insert(37, "a").is_ok());
    ///
    /// let err = map.pin().insert(38, "b").unwrap_err();
    /// assert_eq!((err.key, err.value), (38, "b"));
    /// ```
    #[inline]
    pub fn insert(&self, key: K, value: V, guard: &impl Guard) -> Result<(), FullError<K, V>> {
        self.raw.verify(guard);
        self.raw.insert(key, value, guard)
    }

    /// Removes a key from the map, returning `true` if the key was previously
    /// in the map.
    ///
    /// The key may be any borrowed form of the map's key type, but
    /// [`Hash`] and [`Eq`] on the borrowed form *must* match those for
    /// the key type.
    ///
    /// # Examples
    ///
    /// ```
    /// use probemap::HashMap;
    /// let map = HashMap::new();
    /// map.pin().insert(1, "a").unwrap();
    /// assert_eq!(map.pin().remove(&1), true);
    /// assert_eq!(map.pin().remove(&1), false);
    /// ```
    #[inline]
    pub fn remove<Q>(&self, key: &Q, guard: &impl Guard) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.raw.verify(guard);
        self.raw.remove(key, guard)
    }

    /// Replaces the table with a table of `capacity` slots, moving every live
    /// entry into it.
    ///
    /// This is a no-op if `capacity` is not larger than the current capacity.
    ///
    /// # Examples
    ///
    /// ```
    /// use probemap::HashMap;
    ///
    /// let map = HashMap::with_capacity(4);
    /// map.pin().insert(1, "a").unwrap();
    /// map.pin().grow(8);
    /// assert_eq!(map.capacity(), 8);
    /// assert_eq!(map.pin().get(&1), Some(&"a"));
    /// ```
    #[inline]
    pub fn grow(&self, capacity: usize, guard: &impl Guard) {
        self.raw.verify(guard);
        self.raw.grow(capacity, guard)
    }
}

impl<K, V, S> fmt::Debug for HashMap<K, V, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HashMap")
            .field("capacity", &self.capacity())
            .field("len", &self.len())
            .field("resize_mode", &self.resize_mode())
            .finish()
    }
}

/// A pinned reference to a [`HashMap`].
///
/// This type is created with [`HashMap::pin`] and can be used to easily access a [`HashMap`]
/// without explicitly managing a guard. See the [crate-level documentation](crate#usage) for details.
pub struct HashMapRef<'map, K, V, S, G> {
    guard: G,
    map: &'map HashMap<K, V, S>,
}

impl<'map, K, V, S, G> HashMapRef<'map, K, V, S, G>
where
    K: Hash + Eq,
    S: BuildHasher,
    G: Guard,
{
    /// Returns a reference to the inner [`HashMap`].
    #[inline]
    pub fn map(&self) -> &'map HashMap<K, V, S> {
        self.map
    }

    /// Returns the number of slots in the table.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.map.capacity()
    }

    /// Returns the number of live entries in the map.
    #[inline]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns `true` if the map is empty. Otherwise returns `false`.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` if the map contains a value for the specified key.
    #[inline]
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.get(key).is_some()
    }

    /// Returns a reference to the value corresponding to the key.
    #[inline]
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.map.raw.get(key, &self.guard)
    }

    /// Inserts a key-value pair into the map.
    ///
    /// See [`HashMap::insert`] for details.
    #[inline]
    pub fn insert(&self, key: K, value: V) -> Result<(), FullError<K, V>> {
        self.map.raw.insert(key, value, &self.guard)
    }

    /// Removes a key from the map, returning `true` if the key was previously
    /// in the map.
    #[inline]
    pub fn remove<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.map.raw.remove(key, &self.guard)
    }

    /// Replaces the table with a table of `capacity` slots.
    ///
    /// See [`HashMap::grow`] for details.
    #[inline]
    pub fn grow(&self, capacity: usize) {
        self.map.raw.grow(capacity, &self.guard)
    }
}

impl<K, V, S, G> fmt::Debug for HashMapRef<'_, K, V, S, G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.map, f)
    }
}

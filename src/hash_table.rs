use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt::Debug;

use crate::Error;
use crate::builder::Builder;
use crate::hasher::DefaultHasher;
use crate::hasher::KeyedHasher;
use crate::hasher::SecretKey;
use crate::meta::MAX_PSL;
use crate::meta::Meta;
use crate::meta::truncate_hash;
use crate::slots::KEY_SIZE;
use crate::slots::SlotArray;
use crate::slots::SlotLayout;
use crate::slots::decode_key;
use crate::slots::encode_key;
use crate::slots::read_meta;
use crate::slots::write_meta;

/// Smallest capacity exponent; a table never has fewer than 16 slots.
pub const MIN_CAPACITY_EXPONENT: u32 = 4;

/// Largest capacity exponent; a table never has more than 2^20 slots.
pub const MAX_CAPACITY_EXPONENT: u32 = 20;

/// Callback run on the item of every entry that survives until the table is
/// dropped.
pub type Disposer = Box<dyn FnMut(&mut [u8]) + Send>;

/// Scratch slot staging the entry being placed.
const CARRY: usize = 0;
/// Scratch slot used to swap out a displaced entry.
const SPARE: usize = 1;
const SCRATCH_SLOTS: usize = 2;

/// Load factor of 0.9 that triggers growth before an insert.
#[inline(always)]
fn is_crowded(occupied: u32, exponent: u32) -> bool {
    occupied as u64 * 10 >= (1u64 << exponent) * 9
}

/// Load factor of 0.4 that triggers shrinking after a removal.
#[inline(always)]
fn is_sparse(occupied: u32, exponent: u32) -> bool {
    occupied as u64 * 10 <= (1u64 << exponent) * 4
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placement {
    Inserted,
    Replaced,
}

/// Places the entry staged in the `CARRY` scratch slot, starting the walk at
/// `index` with the probe sequence length recorded in its metadata.
///
/// Richer entries met on the way are displaced into `CARRY` and carried
/// further. On `Err` some entries may already have been displaced; callers
/// either probe with [`HashTable::probe_fits`] first or discard `slots`.
fn place(
    slots: &mut SlotArray,
    scratch: &mut SlotArray,
    layout: SlotLayout,
    mut index: usize,
) -> Result<Placement, Error> {
    let mask = slots.len() - 1;
    let mut psl = read_meta(scratch.slot(CARRY)).psl();

    loop {
        let current = slots.meta(index);
        let carried = read_meta(scratch.slot(CARRY));

        if !current.is_taken() {
            slots.slot_mut(index).copy_from_slice(scratch.slot(CARRY));
            slots.set_meta(index, Meta::occupied(psl, carried.hash()));
            return Ok(Placement::Inserted);
        }

        if current.hash() == carried.hash()
            && layout.key(slots.slot(index)) == layout.key(scratch.slot(CARRY))
        {
            layout
                .item_mut(slots.slot_mut(index))
                .copy_from_slice(layout.item(scratch.slot(CARRY)));
            slots.set_meta(index, current.with_psl(psl));
            return Ok(Placement::Replaced);
        }

        if psl > current.psl() {
            scratch.slot_mut(SPARE).copy_from_slice(slots.slot(index));
            slots.slot_mut(index).copy_from_slice(scratch.slot(CARRY));
            slots.set_meta(index, Meta::occupied(psl, carried.hash()));
            scratch.copy_slot(SPARE, CARRY);
            psl = current.psl();
        }

        if psl >= MAX_PSL {
            return Err(Error::ProbeLimit);
        }
        psl += 1;
        index = (index + 1) & mask;
    }
}

/// A hash table of fixed-size byte items keyed by short byte strings.
///
/// Entries live inline in one contiguous slot array: a 32-bit metadata word,
/// a 20 byte key buffer and `item_size` bytes of item, padded to pointer
/// alignment. Collisions are resolved with Robin Hood linear probing, and
/// removal shifts the following entries back instead of leaving tombstones.
///
/// The slot count is always a power of two between `2^4` and `2^20`. The
/// table grows by one step before an insert that would start at a load
/// factor of 0.9 or more, and shrinks, possibly several steps at once, after
/// a removal that leaves it at 0.4 or less.
///
/// Keys are hashed with a secret drawn per table, so two tables never
/// influence each other.
///
/// # Examples
///
/// ```rust
/// # use rh_table::HashTable;
/// #
/// let mut table = HashTable::new(4).unwrap();
/// table.insert("answer", &42u32.to_le_bytes()).unwrap();
///
/// assert_eq!(table.get("answer"), Some(&42u32.to_le_bytes()[..]));
/// assert_eq!(table.len(), 1);
/// ```
pub struct HashTable<H = DefaultHasher> {
    pub(crate) slots: SlotArray,
    scratch: SlotArray,
    pub(crate) layout: SlotLayout,
    pub(crate) exponent: u32,
    pub(crate) occupied: u32,
    secret: SecretKey,
    hasher: H,
    disposer: Option<Disposer>,
}

impl<H> Debug for HashTable<H> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        use alloc::format;
        use alloc::string::ToString;

        let metadata: Vec<String> = if self.occupied == 0 {
            Vec::new()
        } else {
            (0..self.slots.len())
                .map(|index| {
                    let meta = self.slots.meta(index);
                    if meta.is_taken() {
                        format!("{:04}:{:05x}", meta.psl(), meta.hash())
                    } else {
                        "..........".to_string()
                    }
                })
                .collect()
        };

        f.debug_struct("HashTable")
            .field("metadata", &metadata)
            .field("occupied", &self.occupied)
            .field("capacity", &self.capacity())
            .field("item_size", &self.layout.item_size())
            .field("slot_size", &self.layout.slot_size())
            .finish()
    }
}

impl<H> Drop for HashTable<H> {
    fn drop(&mut self) {
        let Some(disposer) = self.disposer.as_mut() else {
            return;
        };

        let layout = self.layout;
        for index in 0..self.slots.len() {
            if self.slots.meta(index).is_taken() {
                disposer(layout.item_mut(self.slots.slot_mut(index)));
            }
        }
    }
}

impl HashTable<DefaultHasher> {
    /// Creates an empty table with 16 slots for items of `item_size` bytes.
    ///
    /// Fails if the item size does not fit a 32-bit slot, if memory is
    /// exhausted or if no secret key can be drawn. Use [`Builder`] for the
    /// other construction parameters.
    pub fn new(item_size: usize) -> Result<Self, Error> {
        Builder::new(item_size).build()
    }

    /// Creates an empty table that holds `elements` entries in its initial
    /// slot array.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use rh_table::Error;
    /// # use rh_table::HashTable;
    /// #
    /// let table = HashTable::with_elements(16, 500).unwrap();
    /// assert_eq!(table.capacity_exponent(), 9);
    ///
    /// let too_large = HashTable::with_elements(16, 1_050_000);
    /// assert_eq!(too_large.err(), Some(Error::TooManyElements(1_050_000)));
    /// ```
    pub fn with_elements(item_size: usize, elements: usize) -> Result<Self, Error> {
        Builder::new(item_size).elements(elements).build()
    }
}

impl<H> HashTable<H> {
    pub(crate) fn from_parts(
        layout: SlotLayout,
        exponent: u32,
        secret: SecretKey,
        hasher: H,
        disposer: Option<Disposer>,
    ) -> Result<Self, Error> {
        let slots = SlotArray::new(1 << exponent, layout.slot_size())?;
        let scratch = SlotArray::new(SCRATCH_SLOTS, layout.slot_size())?;

        Ok(Self {
            slots,
            scratch,
            layout,
            exponent,
            occupied: 0,
            secret,
            hasher,
            disposer,
        })
    }

    /// Returns the number of stored entries.
    pub fn len(&self) -> u32 {
        self.occupied
    }

    /// Returns `true` if the table stores no entries.
    pub fn is_empty(&self) -> bool {
        self.occupied == 0
    }

    /// Returns the current slot count, `2^capacity_exponent`.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Returns the exponent of the current slot count.
    pub fn capacity_exponent(&self) -> u32 {
        self.exponent
    }

    /// Returns the item size fixed at construction.
    pub fn item_size(&self) -> usize {
        self.layout.item_size()
    }

    /// Returns the size of one slot in bytes, metadata and key included.
    pub fn slot_size(&self) -> usize {
        self.layout.slot_size()
    }

    /// Returns `len / capacity`.
    pub fn load_factor(&self) -> f64 {
        self.occupied as f64 / self.capacity() as f64
    }

    /// Returns an iterator over the `(key, item)` pairs in slot order.
    ///
    /// Slot order follows the hash of the keys, not the insertion order.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            slots: &self.slots,
            layout: self.layout,
            index: 0,
        }
    }

    /// Calls `visit` with each key and a mutable view of its item, in slot
    /// order, until it returns `false`.
    ///
    /// Returns `true` if every entry was visited. Changes made to the items
    /// are kept.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use rh_table::HashTable;
    /// #
    /// let mut table = HashTable::new(1).unwrap();
    /// table.insert("a", &[1]).unwrap();
    /// table.insert("b", &[2]).unwrap();
    ///
    /// assert!(table.iterate(|_, item| {
    ///     item[0] *= 10;
    ///     true
    /// }));
    /// assert_eq!(table.get("b"), Some(&[20][..]));
    ///
    /// assert!(!table.iterate(|_, _| false));
    /// ```
    pub fn iterate(&mut self, mut visit: impl FnMut(&[u8], &mut [u8]) -> bool) -> bool {
        let layout = self.layout;
        for index in 0..self.slots.len() {
            if !self.slots.meta(index).is_taken() {
                continue;
            }

            let (key, item) = layout.key_and_item_mut(self.slots.slot_mut(index));
            if !visit(decode_key(key), item) {
                return false;
            }
        }

        true
    }

    #[inline(always)]
    fn mask(&self) -> usize {
        self.slots.len() - 1
    }

    /// Moves every entry into a fresh array of `2^exponent` slots.
    ///
    /// The stored truncated hashes are reused, so keys are not rehashed. On
    /// failure the current array stays authoritative.
    fn resize(&mut self, exponent: u32) -> Result<(), Error> {
        debug_assert!((MIN_CAPACITY_EXPONENT..=MAX_CAPACITY_EXPONENT).contains(&exponent));

        let stride = self.layout.slot_size();
        let mut slots = SlotArray::new(1 << exponent, stride)?;
        // Kept apart from `self.scratch`, which may hold the item handed out
        // by `remove`.
        let mut scratch = SlotArray::new(SCRATCH_SLOTS, stride)?;
        let mask = slots.len() - 1;

        for index in self.slots.taken() {
            let meta = self.slots.meta(index);
            let carry = scratch.slot_mut(CARRY);
            carry.copy_from_slice(self.slots.slot(index));
            write_meta(carry, meta.with_psl(0));

            if let Err(err) = place(
                &mut slots,
                &mut scratch,
                self.layout,
                meta.hash() as usize & mask,
            ) {
                tracing::warn!(
                    from = self.exponent,
                    to = exponent,
                    "maximal probe sequence length reached, unable to resize"
                );
                return Err(err);
            }
        }

        tracing::debug!(
            from = self.exponent,
            to = exponent,
            occupied = self.occupied,
            "resized hash table"
        );
        self.slots = slots;
        self.exponent = exponent;
        Ok(())
    }

    fn maybe_shrink(&mut self) {
        if self.exponent <= MIN_CAPACITY_EXPONENT || !is_sparse(self.occupied, self.exponent) {
            return;
        }

        let mut exponent = self.exponent - 1;
        while exponent > MIN_CAPACITY_EXPONENT && is_sparse(self.occupied, exponent) {
            exponent -= 1;
        }

        if let Err(err) = self.resize(exponent) {
            tracing::warn!(%err, "resize down failed");
        }
    }
}

impl<H: KeyedHasher> HashTable<H> {
    #[inline]
    fn truncated_hash(&self, key: &[u8]) -> u32 {
        truncate_hash(self.hasher.hash(key, &self.secret))
    }

    /// Returns the slot index holding `key`.
    fn find(&self, key: &[u8]) -> Option<usize> {
        let stored = encode_key(key).ok()?;
        let hash = self.truncated_hash(key);
        let mask = self.mask();
        let mut index = hash as usize & mask;
        let mut psl = 0;

        loop {
            let meta = self.slots.meta(index);
            // Robin Hood ordering: past a richer entry `key` cannot follow.
            if !meta.is_taken() || meta.psl() < psl {
                return None;
            }
            if meta.hash() == hash && self.layout.key(self.slots.slot(index)) == stored {
                return Some(index);
            }
            psl += 1;
            index = (index + 1) & mask;
        }
    }

    /// Replays the insertion walk of `place` without writing anything.
    fn probe_fits(&self, mut index: usize, hash: u32, stored: &[u8; KEY_SIZE]) -> Result<(), Error> {
        let mask = self.mask();
        let mut psl = 0;
        let mut displaced = false;

        loop {
            let current = self.slots.meta(index);
            if !current.is_taken() {
                return Ok(());
            }
            if !displaced
                && current.hash() == hash
                && self.layout.key(self.slots.slot(index)) == stored
            {
                return Ok(());
            }
            if psl > current.psl() {
                psl = current.psl();
                displaced = true;
            }
            if psl >= MAX_PSL {
                tracing::warn!(
                    exponent = self.exponent,
                    occupied = self.occupied,
                    "maximal probe sequence length reached, unable to insert"
                );
                return Err(Error::ProbeLimit);
            }
            psl += 1;
            index = (index + 1) & mask;
        }
    }

    /// Stores a copy of `item` under `key`, replacing the item of an existing
    /// entry with the same key.
    ///
    /// Keys hold at most 19 bytes and may not contain NUL bytes; `item` must
    /// be exactly [`item_size`](Self::item_size) bytes long. A failed insert
    /// leaves every stored entry in place, although the table may have grown
    /// before the failure was detected.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use rh_table::Error;
    /// # use rh_table::HashTable;
    /// #
    /// let mut table = HashTable::new(2).unwrap();
    /// table.insert("key", &[1, 2]).unwrap();
    /// table.insert("key", &[3, 4]).unwrap();
    /// assert_eq!(table.len(), 1);
    /// assert_eq!(table.get("key"), Some(&[3, 4][..]));
    ///
    /// assert_eq!(
    ///     table.insert("twenty_one_bytes_key_", &[0, 0]),
    ///     Err(Error::KeyTooLong(21))
    /// );
    /// ```
    pub fn insert(&mut self, key: impl AsRef<[u8]>, item: &[u8]) -> Result<(), Error> {
        let key = key.as_ref();
        let stored = encode_key(key)?;
        if item.len() != self.layout.item_size() {
            return Err(Error::ItemSizeMismatch {
                expected: self.layout.item_size(),
                found: item.len(),
            });
        }

        if is_crowded(self.occupied, self.exponent) {
            if self.exponent == MAX_CAPACITY_EXPONENT {
                tracing::warn!(
                    occupied = self.occupied,
                    "hash table capacity cannot be increased anymore"
                );
                return Err(Error::CapacityExhausted);
            }
            self.resize(self.exponent + 1)?;
        }

        let hash = self.truncated_hash(key);
        let home = hash as usize & self.mask();
        self.probe_fits(home, hash, &stored)?;

        let layout = self.layout;
        let carry = self.scratch.slot_mut(CARRY);
        write_meta(carry, Meta::occupied(0, hash));
        layout.key_mut(carry).copy_from_slice(&stored);
        layout.item_mut(carry).copy_from_slice(item);

        if place(&mut self.slots, &mut self.scratch, layout, home)? == Placement::Inserted {
            self.occupied += 1;
        }
        Ok(())
    }

    /// Returns the item stored under `key`.
    ///
    /// Keys that could never be stored, such as keys longer than 19 bytes,
    /// are simply not found.
    pub fn get(&self, key: impl AsRef<[u8]>) -> Option<&[u8]> {
        let index = self.find(key.as_ref())?;
        Some(self.layout.item(self.slots.slot(index)))
    }

    /// Returns a mutable view of the item stored under `key`.
    pub fn get_mut(&mut self, key: impl AsRef<[u8]>) -> Option<&mut [u8]> {
        let index = self.find(key.as_ref())?;
        let layout = self.layout;
        Some(layout.item_mut(self.slots.slot_mut(index)))
    }

    /// Returns `true` if an entry is stored under `key`.
    pub fn contains_key(&self, key: impl AsRef<[u8]>) -> bool {
        self.find(key.as_ref()).is_some()
    }

    /// Removes the entry stored under `key` and returns its item.
    ///
    /// The returned bytes live in the table's scratch space and stay
    /// borrowed until the next call on the table. The disposer is not run
    /// for removed entries.
    ///
    /// Removing may shrink the table. A failed shrink is logged and the
    /// removal still succeeds.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use rh_table::HashTable;
    /// #
    /// let mut table = HashTable::new(1).unwrap();
    /// table.insert("gone", &[9]).unwrap();
    ///
    /// assert_eq!(table.remove("gone"), Some(&[9][..]));
    /// assert_eq!(table.remove("gone"), None);
    /// assert!(table.is_empty());
    /// ```
    pub fn remove(&mut self, key: impl AsRef<[u8]>) -> Option<&[u8]> {
        let mut index = self.find(key.as_ref())?;
        self.scratch
            .slot_mut(CARRY)
            .copy_from_slice(self.slots.slot(index));
        self.occupied -= 1;

        let mask = self.mask();
        loop {
            let next = (index + 1) & mask;
            let meta = self.slots.meta(next);
            if !meta.is_taken() || meta.psl() == 0 {
                self.slots.set_meta(index, Meta::EMPTY);
                break;
            }

            self.slots.copy_slot(next, index);
            self.slots.set_meta(index, meta.with_psl(meta.psl() - 1));
            index = next;
        }

        self.maybe_shrink();
        Some(self.layout.item(self.scratch.slot(CARRY)))
    }
}

/// An iterator over the `(key, item)` pairs of a [`HashTable`].
///
/// Created by [`HashTable::iter`].
pub struct Iter<'a> {
    slots: &'a SlotArray,
    layout: SlotLayout,
    index: usize,
}

impl<'a> Iterator for Iter<'a> {
    type Item = (&'a [u8], &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        while self.index < self.slots.len() {
            let index = self.index;
            self.index += 1;

            if self.slots.meta(index).is_taken() {
                let slot = self.slots.slot(index);
                return Some((decode_key(self.layout.key(slot)), self.layout.item(slot)));
            }
        }

        None
    }
}

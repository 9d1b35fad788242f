//! Bit-packed per-slot metadata.
//!
//! Every slot starts with a 32-bit word laid out as follows, from the least
//! significant bit upwards:
//!
//! | bits    | field                      |
//! |---------|----------------------------|
//! | 0       | taken flag                 |
//! | 1..=11  | probe sequence length      |
//! | 12..=31 | truncated hash (low 20 bits of the keyed hash) |

use core::fmt::Debug;

const TAKEN_OFFSET: u32 = 0;
const TAKEN_MASK: u32 = 0x0000_0001;

const PSL_OFFSET: u32 = 1;
const PSL_MASK: u32 = 0x0000_0FFE;
const PSL_BITS: u32 = 11;

const HASH_OFFSET: u32 = 12;
const HASH_FIELD_MASK: u32 = 0xFFFF_F000;

/// Number of hash bits kept in the metadata word.
pub const HASH_BITS: u32 = 20;

/// Mask selecting the truncated hash out of a full 64-bit hash.
pub const HASH_MASK: u64 = (1 << HASH_BITS) - 1;

/// Largest probe sequence length the metadata word can represent.
pub const MAX_PSL: u32 = (1 << PSL_BITS) - 1;

/// Reads the field selected by `mask` out of `word`.
#[inline(always)]
pub const fn field_get(word: u32, offset: u32, mask: u32) -> u32 {
    (word & mask) >> offset
}

/// Replaces the field selected by `mask` in `word` with `value`.
///
/// Bits of `value` that do not fit the field are discarded rather than
/// spilling into the neighbouring fields.
#[inline(always)]
pub const fn field_set(word: u32, value: u32, offset: u32, mask: u32) -> u32 {
    (word & !mask) | ((value << offset) & mask)
}

/// Truncates a 64-bit keyed hash to the width stored in [`Meta`].
#[inline(always)]
pub const fn truncate_hash(hash: u64) -> u32 {
    (hash & HASH_MASK) as u32
}

/// Metadata word of a single slot.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
#[repr(transparent)]
pub struct Meta(u32);

impl Meta {
    /// Metadata of a free slot.
    pub const EMPTY: Meta = Meta(0);

    /// Metadata of a taken slot holding an entry `psl` slots away from its
    /// home index.
    #[inline(always)]
    pub const fn occupied(psl: u32, hash: u32) -> Self {
        Meta(TAKEN_MASK).with_psl(psl).with_hash(hash)
    }

    /// Wraps a raw metadata word.
    #[inline(always)]
    pub const fn from_raw(word: u32) -> Self {
        Meta(word)
    }

    /// The raw metadata word.
    #[inline(always)]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Whether the slot holds an entry.
    #[inline(always)]
    pub const fn is_taken(self) -> bool {
        field_get(self.0, TAKEN_OFFSET, TAKEN_MASK) == 1
    }

    /// Distance of the entry from its home slot.
    #[inline(always)]
    pub const fn psl(self) -> u32 {
        field_get(self.0, PSL_OFFSET, PSL_MASK)
    }

    /// Truncated hash of the entry's key.
    #[inline(always)]
    pub const fn hash(self) -> u32 {
        field_get(self.0, HASH_OFFSET, HASH_FIELD_MASK)
    }

    /// Returns a copy with the taken flag replaced.
    #[inline(always)]
    pub const fn with_taken(self, taken: bool) -> Self {
        Meta(field_set(self.0, taken as u32, TAKEN_OFFSET, TAKEN_MASK))
    }

    /// Returns a copy with the probe sequence length replaced.
    #[inline(always)]
    pub const fn with_psl(self, psl: u32) -> Self {
        debug_assert!(psl <= MAX_PSL);
        Meta(field_set(self.0, psl, PSL_OFFSET, PSL_MASK))
    }

    /// Returns a copy with the truncated hash replaced.
    #[inline(always)]
    pub const fn with_hash(self, hash: u32) -> Self {
        Meta(field_set(self.0, hash, HASH_OFFSET, HASH_FIELD_MASK))
    }
}

impl Debug for Meta {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        if !self.is_taken() {
            return f.write_str("Meta(free)");
        }
        f.debug_struct("Meta")
            .field("psl", &self.psl())
            .field("hash", &format_args!("{:05x}", self.hash()))
            .finish()
    }
}

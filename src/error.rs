use thiserror::Error;

/// Errors reported by table construction and mutation.
///
/// Lookups never fail loudly: an invalid key simply yields `None`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum Error {
    /// The capacity exponent lies outside `4..=20`.
    #[error("capacity exponent {0} is outside of 4..=20")]
    InvalidCapacityExponent(u32),
    /// More elements were requested than `2^20` slots can hold.
    #[error("{0} elements exceed the maximal capacity of 2^20 slots")]
    TooManyElements(usize),
    /// A slot holding an item of this size would not fit a 32-bit size.
    #[error("item size of {0} bytes does not fit a 32-bit slot size")]
    ItemSizeTooLarge(usize),
    /// The allocator refused a slot array.
    #[error("failed to allocate {bytes} bytes of slot storage")]
    AllocationFailed {
        /// Size of the refused request.
        bytes: usize,
    },
    /// Random bytes were requested for an empty or oversized buffer.
    #[error("cannot request {0} random bytes, the accepted range is 1..=256")]
    InvalidRandomLength(usize),
    /// The operating system entropy source failed.
    #[error("the operating system entropy source is unavailable")]
    EntropyUnavailable,
    /// The key does not fit the 19 usable key bytes.
    #[error("key of {0} bytes exceeds the 19 usable key bytes")]
    KeyTooLong(usize),
    /// The key contains the terminator byte.
    #[error("key contains a NUL byte")]
    KeyContainsNul,
    /// The item slice does not match the table's item size.
    #[error("item of {found} bytes given to a table storing {expected} byte items")]
    ItemSizeMismatch {
        /// Item size fixed at construction.
        expected: usize,
        /// Length of the rejected slice.
        found: usize,
    },
    /// The table is full and already at the maximal capacity exponent.
    #[error("table cannot grow past 2^20 slots")]
    CapacityExhausted,
    /// Placing an entry would exceed the maximal probe sequence length.
    #[error("maximal probe sequence length of 2047 reached")]
    ProbeLimit,
}

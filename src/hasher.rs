//! Keyed hashing of table keys.
//!
//! Every table owns a [`SecretKey`] generated once at construction and hashes
//! keys through a [`KeyedHasher`]. The default is SipHash-2-4, which resists
//! hash flooding as long as the key stays secret.

use core::fmt::Debug;
use core::hash::Hasher;

use rand::TryRngCore;
use rand::rngs::OsRng;
use siphasher::sip::SipHasher24;

use crate::Error;

/// Length of the secret key in bytes.
pub const SECRET_KEY_LEN: usize = 16;

/// Largest buffer [`fill_random`] accepts.
pub const MAX_RANDOM_LEN: usize = 256;

/// A hash function parameterized by a per-table secret.
///
/// Implementations must be deterministic: equal `bytes` and `secret` always
/// produce the same value. Only the low 20 bits are stored in slot metadata,
/// so they should be well distributed.
///
/// Any `Fn(&[u8], &SecretKey) -> u64` is a `KeyedHasher`, which is handy for
/// forcing collisions in tests:
///
/// ```rust
/// # use rh_table::Builder;
/// # use rh_table::hasher::SecretKey;
/// #
/// fn colliding(_key: &[u8], _secret: &SecretKey) -> u64 {
///     7
/// }
///
/// let mut table = Builder::new(1).hasher(colliding).build().unwrap();
/// table.insert("a", &[1]).unwrap();
/// table.insert("b", &[2]).unwrap();
/// assert_eq!(table.get("b"), Some(&[2][..]));
/// ```
pub trait KeyedHasher {
    /// Hashes `bytes` under `secret`.
    fn hash(&self, bytes: &[u8], secret: &SecretKey) -> u64;
}

impl<F> KeyedHasher for F
where
    F: Fn(&[u8], &SecretKey) -> u64,
{
    #[inline]
    fn hash(&self, bytes: &[u8], secret: &SecretKey) -> u64 {
        self(bytes, secret)
    }
}

/// SipHash-2-4 over the raw key bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SipHash;

impl KeyedHasher for SipHash {
    #[inline]
    fn hash(&self, bytes: &[u8], secret: &SecretKey) -> u64 {
        let mut hasher = SipHasher24::new_with_key(secret.as_bytes());
        hasher.write(bytes);
        hasher.finish()
    }
}

/// foldhash's quality hasher, seeded from the secret key.
///
/// Faster than [`SipHash`] but with weaker flooding guarantees.
#[cfg(feature = "foldhash")]
#[derive(Debug, Clone, Copy, Default)]
pub struct FoldHash;

#[cfg(feature = "foldhash")]
impl KeyedHasher for FoldHash {
    #[inline]
    fn hash(&self, bytes: &[u8], secret: &SecretKey) -> u64 {
        use core::hash::BuildHasher;

        let (k0, k1) = secret.halves();
        let state = foldhash::quality::FixedState::with_seed(k0 ^ k1.rotate_left(29));
        let mut hasher = state.build_hasher();
        hasher.write(bytes);
        hasher.finish()
    }
}

cfg_if::cfg_if! {
    if #[cfg(feature = "foldhash")] {
        /// Hasher used by tables built without an explicit one.
        pub type DefaultHasher = FoldHash;
    } else {
        /// Hasher used by tables built without an explicit one.
        pub type DefaultHasher = SipHash;
    }
}

/// The 16 secret bytes seeding a table's [`KeyedHasher`].
#[derive(Clone, PartialEq, Eq)]
pub struct SecretKey([u8; SECRET_KEY_LEN]);

impl SecretKey {
    /// Draws a fresh key from the operating system entropy source.
    pub fn random() -> Result<Self, Error> {
        let mut bytes = [0; SECRET_KEY_LEN];
        fill_random(&mut bytes)?;
        Ok(Self(bytes))
    }

    /// The all-zero key. Makes hashing reproducible across runs; do not use
    /// it for tables exposed to untrusted keys.
    pub const fn zeroed() -> Self {
        Self([0; SECRET_KEY_LEN])
    }

    /// Wraps caller-provided key material.
    pub const fn from_bytes(bytes: [u8; SECRET_KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Raw key material.
    pub const fn as_bytes(&self) -> &[u8; SECRET_KEY_LEN] {
        &self.0
    }

    #[cfg(feature = "foldhash")]
    fn halves(&self) -> (u64, u64) {
        let mut k0 = [0; 8];
        let mut k1 = [0; 8];
        k0.copy_from_slice(&self.0[..8]);
        k1.copy_from_slice(&self.0[8..]);
        (u64::from_le_bytes(k0), u64::from_le_bytes(k1))
    }
}

impl Debug for SecretKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("SecretKey(..)")
    }
}

/// Fills `buf` with cryptographically strong random bytes.
///
/// Fails for empty buffers, buffers longer than [`MAX_RANDOM_LEN`], and when
/// the operating system cannot provide entropy.
pub fn fill_random(buf: &mut [u8]) -> Result<(), Error> {
    let len = buf.len();
    if len == 0 || len > MAX_RANDOM_LEN {
        return Err(Error::InvalidRandomLength(len));
    }

    OsRng.try_fill_bytes(buf).map_err(|err| {
        tracing::error!(error = ?err, len, "failed to request random bytes");
        Error::EntropyUnavailable
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: SecretKey = SecretKey::from_bytes([
        0x0, 0x1, 0x2, 0x3, 0x4, 0x5, 0x6, 0x7, 0x8, 0x9, 0xa, 0xb, 0xc, 0xd, 0xe, 0xf,
    ]);

    const SINGLE_BYTE_HASHES: [u64; 32] = [
        0x21bd0cab435c8c79,
        0x6e50ede395d65a46,
        0x0572bf3ca9a47158,
        0xd2bcd5254fc978ad,
        0x8a1d0b1ea809514c,
        0x730387bdc4f327e3,
        0x2e31e526b451c719,
        0xe535adaadf4158b1,
        0xadef2948d21bc86c,
        0x408dae3f830a2888,
        0x18a2866298a494e2,
        0xeeb1303e324cc958,
        0xa6ceccf2e0a4f94e,
        0x9d2b038de36ea196,
        0xbd321b758a057a29,
        0x9872eb0c8b9a0a30,
        0x4ec57f76eb9f068f,
        0x3943c8fcfccf7ce0,
        0xe542b1b716b820dc,
        0x67d6d8c8413eba27,
        0x3b95f58bdab79630,
        0xdbd4a63992cdc07a,
        0xd5472de600064a92,
        0x18733d77b7f7e614,
        0x2d86b5bb6a3c0cf2,
        0xa57aebd4075acff5,
        0x2da625fdf6d7c4ca,
        0x4148ae80da82bd0e,
        0xb0f4d346d72da699,
        0xebb5b33bbdbad7a0,
        0x73be792ca75eae4d,
        0x714ddbefc9d4b97c,
    ];

    #[test]
    fn siphash_single_bytes() {
        for (i, expected) in SINGLE_BYTE_HASHES.iter().enumerate() {
            let byte = 0x20 + i as u8;
            assert_eq!(SipHash.hash(&[byte], &KEY), *expected, "byte {byte:#x}");
        }
    }

    #[test]
    fn siphash_strings() {
        assert_eq!(
            SipHash.hash(b"Hello, this is a siphash test!", &KEY),
            0xb4721902258a7432
        );
        assert_eq!(
            SipHash.hash(
                b"Hello, this is a very very very very very very long data for testing siphash!",
                &KEY
            ),
            0xcbf88d2deb16d829
        );
    }

    #[test]
    fn siphash_is_deterministic() {
        let first = SipHash.hash(b"hello", &KEY);
        SipHash.hash(b"temp", &KEY);
        assert_eq!(first, SipHash.hash(b"hello", &KEY));
    }

    #[test]
    fn siphash_depends_on_key() {
        let other = SecretKey::from_bytes([0xff; SECRET_KEY_LEN]);
        assert_ne!(SipHash.hash(b"hello", &KEY), SipHash.hash(b"hello", &other));
    }

    #[test]
    fn random_bytes() {
        let mut buf = [0u8; SECRET_KEY_LEN];
        assert_eq!(fill_random(&mut buf), Ok(()));
    }

    #[test]
    fn random_bytes_zero_length() {
        assert_eq!(fill_random(&mut []), Err(Error::InvalidRandomLength(0)));
    }

    #[test]
    fn random_bytes_max_length() {
        let mut buf = [0u8; MAX_RANDOM_LEN];
        assert_eq!(fill_random(&mut buf), Ok(()));
    }

    #[test]
    fn random_bytes_oversized() {
        let mut buf = [0u8; MAX_RANDOM_LEN + 1];
        assert_eq!(
            fill_random(&mut buf),
            Err(Error::InvalidRandomLength(MAX_RANDOM_LEN + 1))
        );
    }

    #[test]
    fn random_keys_differ() {
        let first = SecretKey::random().unwrap();
        let second = SecretKey::random().unwrap();
        assert_ne!(first, second);
        assert_ne!(first, SecretKey::zeroed());
    }

    #[test]
    fn secret_key_debug_is_redacted() {
        let rendered = alloc::format!("{:?}", KEY);
        assert_eq!(rendered, "SecretKey(..)");
    }

    #[test]
    fn closures_hash() {
        let constant = |_: &[u8], _: &SecretKey| 42u64;
        assert_eq!(constant.hash(b"anything", &KEY), 42);
    }

    #[cfg(feature = "foldhash")]
    #[test]
    fn foldhash_is_keyed() {
        let other = SecretKey::from_bytes([0xff; SECRET_KEY_LEN]);
        assert_eq!(FoldHash.hash(b"hello", &KEY), FoldHash.hash(b"hello", &KEY));
        assert_ne!(FoldHash.hash(b"hello", &KEY), FoldHash.hash(b"hello", &other));
    }
}

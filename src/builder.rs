use alloc::boxed::Box;
use core::fmt::Debug;

use crate::Error;
use crate::hash_table::Disposer;
use crate::hash_table::HashTable;
use crate::hash_table::MAX_CAPACITY_EXPONENT;
use crate::hash_table::MIN_CAPACITY_EXPONENT;
use crate::hasher::DefaultHasher;
use crate::hasher::KeyedHasher;
use crate::hasher::SecretKey;
use crate::slots::SlotLayout;

#[derive(Debug, Clone, Copy)]
enum Sizing {
    Exponent(u32),
    Elements(usize),
}

/// Construction parameters for a [`HashTable`].
///
/// Only the item size is mandatory. Unless configured otherwise, a table
/// starts with `2^4` slots, draws a fresh secret key from the operating
/// system and hashes with [`DefaultHasher`].
///
/// # Examples
///
/// ```rust
/// # use rh_table::Builder;
/// #
/// let table = Builder::new(8).elements(1000).build().unwrap();
/// assert_eq!(table.capacity(), 1024);
/// assert_eq!(table.item_size(), 8);
/// ```
pub struct Builder<H = DefaultHasher> {
    item_size: usize,
    sizing: Sizing,
    secret: Option<SecretKey>,
    hasher: H,
    disposer: Option<Disposer>,
}

impl Builder<DefaultHasher> {
    /// Starts configuring a table storing items of `item_size` bytes.
    pub fn new(item_size: usize) -> Self {
        Self {
            item_size,
            sizing: Sizing::Exponent(MIN_CAPACITY_EXPONENT),
            secret: None,
            hasher: DefaultHasher::default(),
            disposer: None,
        }
    }
}

impl<H> Builder<H> {
    /// Starts the table with `2^exponent` slots. Valid exponents are
    /// `4..=20`.
    pub fn capacity_exponent(mut self, exponent: u32) -> Self {
        self.sizing = Sizing::Exponent(exponent);
        self
    }

    /// Starts the table with the smallest power-of-two slot count that holds
    /// `elements`. At most `2^20` elements can be requested.
    pub fn elements(mut self, elements: usize) -> Self {
        self.sizing = Sizing::Elements(elements);
        self
    }

    /// Seeds the hasher with `secret` instead of fresh random bytes.
    pub fn secret_key(mut self, secret: SecretKey) -> Self {
        self.secret = Some(secret);
        self
    }

    /// Runs `disposer` on the item of every entry still stored when the table
    /// is dropped.
    ///
    /// Entries removed beforehand are never passed to it: the caller owns
    /// what [`HashTable::remove`] hands back.
    pub fn disposer(mut self, disposer: impl FnMut(&mut [u8]) + Send + 'static) -> Self {
        self.disposer = Some(Box::new(disposer));
        self
    }

    /// Replaces the keyed hash function.
    pub fn hasher<K>(self, hasher: K) -> Builder<K> {
        Builder {
            item_size: self.item_size,
            sizing: self.sizing,
            secret: self.secret,
            hasher,
            disposer: self.disposer,
        }
    }
}

impl<H: KeyedHasher> Builder<H> {
    /// Allocates the table.
    ///
    /// Nothing is leaked on failure; every resource acquired before the
    /// failing step is released.
    pub fn build(self) -> Result<HashTable<H>, Error> {
        let exponent = match self.sizing {
            Sizing::Exponent(exponent) => checked_exponent(exponent)?,
            Sizing::Elements(elements) => exponent_for(elements)?,
        };
        let layout = SlotLayout::new(self.item_size)?;
        let secret = match self.secret {
            Some(secret) => secret,
            None => SecretKey::random()?,
        };

        tracing::trace!(
            item_size = layout.item_size(),
            slot_size = layout.slot_size(),
            exponent,
            "building hash table"
        );
        HashTable::from_parts(layout, exponent, secret, self.hasher, self.disposer)
    }
}

impl<H: Debug> Debug for Builder<H> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Builder")
            .field("item_size", &self.item_size)
            .field("sizing", &self.sizing)
            .field("secret", &self.secret)
            .field("hasher", &self.hasher)
            .field("has_disposer", &self.disposer.is_some())
            .finish()
    }
}

fn checked_exponent(exponent: u32) -> Result<u32, Error> {
    if (MIN_CAPACITY_EXPONENT..=MAX_CAPACITY_EXPONENT).contains(&exponent) {
        Ok(exponent)
    } else {
        Err(Error::InvalidCapacityExponent(exponent))
    }
}

/// Smallest exponent whose slot count holds `elements`.
fn exponent_for(elements: usize) -> Result<u32, Error> {
    (MIN_CAPACITY_EXPONENT..=MAX_CAPACITY_EXPONENT)
        .find(|&exponent| elements <= 1 << exponent)
        .ok_or(Error::TooManyElements(elements))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hasher::SipHash;

    #[test]
    fn exponent_bounds() {
        assert_eq!(checked_exponent(3), Err(Error::InvalidCapacityExponent(3)));
        assert_eq!(checked_exponent(4), Ok(4));
        assert_eq!(checked_exponent(20), Ok(20));
        assert_eq!(
            checked_exponent(21),
            Err(Error::InvalidCapacityExponent(21))
        );
    }

    #[test]
    fn exponent_for_element_counts() {
        assert_eq!(exponent_for(0), Ok(4));
        assert_eq!(exponent_for(16), Ok(4));
        assert_eq!(exponent_for(17), Ok(5));
        assert_eq!(exponent_for(500), Ok(9));
        assert_eq!(exponent_for(1 << 20), Ok(20));
        assert_eq!(
            exponent_for((1 << 20) + 1),
            Err(Error::TooManyElements((1 << 20) + 1))
        );
        assert_eq!(
            exponent_for(1_050_000),
            Err(Error::TooManyElements(1_050_000))
        );
    }

    #[test]
    fn build_defaults() {
        let table = Builder::new(12).hasher(SipHash).build().unwrap();
        assert_eq!(table.capacity_exponent(), MIN_CAPACITY_EXPONENT);
        assert_eq!(table.len(), 0);
        assert_eq!(table.item_size(), 12);
    }

    #[test]
    fn build_rejects_bad_parameters() {
        assert_eq!(
            Builder::new(4).capacity_exponent(21).build().err(),
            Some(Error::InvalidCapacityExponent(21))
        );
        assert_eq!(
            Builder::new(4).elements(1_050_000).build().err(),
            Some(Error::TooManyElements(1_050_000))
        );

        let item_size = u32::MAX as usize + 1;
        assert_eq!(
            Builder::new(item_size).build().err(),
            Some(Error::ItemSizeTooLarge(item_size))
        );
    }

    #[test]
    fn debug_hides_secret() {
        let builder = Builder::new(4)
            .secret_key(SecretKey::from_bytes([0xAB; 16]))
            .hasher(SipHash);
        let rendered = alloc::format!("{builder:?}");
        assert!(rendered.contains("SecretKey(..)"));
        assert!(!rendered.contains("171"));
    }
}

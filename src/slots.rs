use alloc::alloc::alloc_zeroed;
use alloc::alloc::dealloc;
use core::alloc::Layout;
use core::fmt::Debug;
use core::ptr::NonNull;

use crate::Error;
use crate::meta::Meta;

pub(crate) const META_SIZE: usize = size_of::<u32>();

/// Stored key width, including the mandatory terminator byte.
pub(crate) const KEY_SIZE: usize = 20;

/// Longest key accepted by the table.
pub(crate) const MAX_KEY_LEN: usize = KEY_SIZE - 1;

const KEY_OFFSET: usize = META_SIZE;
const ITEM_OFFSET: usize = KEY_OFFSET + KEY_SIZE;

/// Slots are padded to pointer alignment.
const SLOT_ALIGN: usize = align_of::<usize>();

/// Byte layout of one slot: `meta | key | item | padding`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SlotLayout {
    item_size: usize,
    slot_size: usize,
}

impl SlotLayout {
    pub(crate) fn new(item_size: usize) -> Result<Self, Error> {
        let slot_size = item_size
            .checked_add(ITEM_OFFSET)
            .and_then(|raw| raw.checked_next_multiple_of(SLOT_ALIGN))
            .filter(|&size| size <= u32::MAX as usize)
            .ok_or(Error::ItemSizeTooLarge(item_size))?;

        Ok(Self {
            item_size,
            slot_size,
        })
    }

    #[inline(always)]
    pub(crate) fn item_size(self) -> usize {
        self.item_size
    }

    #[inline(always)]
    pub(crate) fn slot_size(self) -> usize {
        self.slot_size
    }

    #[inline(always)]
    pub(crate) fn key(self, slot: &[u8]) -> &[u8] {
        &slot[KEY_OFFSET..ITEM_OFFSET]
    }

    #[inline(always)]
    pub(crate) fn key_mut(self, slot: &mut [u8]) -> &mut [u8] {
        &mut slot[KEY_OFFSET..ITEM_OFFSET]
    }

    #[inline(always)]
    pub(crate) fn item(self, slot: &[u8]) -> &[u8] {
        &slot[ITEM_OFFSET..ITEM_OFFSET + self.item_size]
    }

    #[inline(always)]
    pub(crate) fn item_mut(self, slot: &mut [u8]) -> &mut [u8] {
        &mut slot[ITEM_OFFSET..ITEM_OFFSET + self.item_size]
    }

    /// Splits a slot into its stored key and a mutable view of its item.
    #[inline(always)]
    pub(crate) fn key_and_item_mut(self, slot: &mut [u8]) -> (&[u8], &mut [u8]) {
        let (head, tail) = slot.split_at_mut(ITEM_OFFSET);
        (&head[KEY_OFFSET..], &mut tail[..self.item_size])
    }
}

#[inline(always)]
pub(crate) fn read_meta(slot: &[u8]) -> Meta {
    let mut word = [0; META_SIZE];
    word.copy_from_slice(&slot[..META_SIZE]);
    Meta::from_raw(u32::from_ne_bytes(word))
}

#[inline(always)]
pub(crate) fn write_meta(slot: &mut [u8], meta: Meta) {
    slot[..META_SIZE].copy_from_slice(&meta.raw().to_ne_bytes());
}

/// Pads `key` to the stored key width.
pub(crate) fn encode_key(key: &[u8]) -> Result<[u8; KEY_SIZE], Error> {
    if key.len() > MAX_KEY_LEN {
        return Err(Error::KeyTooLong(key.len()));
    }
    if key.contains(&0) {
        return Err(Error::KeyContainsNul);
    }

    let mut stored = [0; KEY_SIZE];
    stored[..key.len()].copy_from_slice(key);
    Ok(stored)
}

/// Strips the terminator and padding from a stored key.
#[inline]
pub(crate) fn decode_key(stored: &[u8]) -> &[u8] {
    let len = stored.iter().position(|&b| b == 0).unwrap_or(stored.len());
    &stored[..len]
}

/// A zero-initialized, contiguous run of fixed-size slots.
///
/// A zeroed metadata word marks a free slot, so a fresh array is empty.
pub(crate) struct SlotArray {
    alloc: NonNull<u8>,
    layout: Layout,
    len: usize,
    stride: usize,
}

// SAFETY: `SlotArray` exclusively owns its allocation and only exposes it
// through borrows of `self`.
unsafe impl Send for SlotArray {}
// SAFETY: Shared access is read-only.
unsafe impl Sync for SlotArray {}

impl SlotArray {
    pub(crate) fn new(len: usize, stride: usize) -> Result<Self, Error> {
        debug_assert!(len > 0 && stride > 0);

        let bytes = len.checked_mul(stride).ok_or(Error::AllocationFailed {
            bytes: usize::MAX,
        })?;
        let layout = Layout::from_size_align(bytes, SLOT_ALIGN)
            .map_err(|_| Error::AllocationFailed { bytes })?;

        // SAFETY: `len` and `stride` are non-zero, so the layout is not
        // zero-sized.
        let raw = unsafe { alloc_zeroed(layout) };
        let alloc = NonNull::new(raw).ok_or(Error::AllocationFailed { bytes })?;

        Ok(Self {
            alloc,
            layout,
            len,
            stride,
        })
    }

    #[inline(always)]
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    #[cfg(any(test, feature = "stats"))]
    #[inline(always)]
    pub(crate) fn total_bytes(&self) -> usize {
        self.layout.size()
    }

    #[inline(always)]
    fn bytes(&self) -> &[u8] {
        // SAFETY: The allocation is live for the lifetime of `self`, spans
        // `layout.size()` bytes and was zero-initialized on creation.
        unsafe { core::slice::from_raw_parts(self.alloc.as_ptr(), self.layout.size()) }
    }

    #[inline(always)]
    fn bytes_mut(&mut self) -> &mut [u8] {
        // SAFETY: As in `bytes`; `&mut self` guarantees exclusive access.
        unsafe { core::slice::from_raw_parts_mut(self.alloc.as_ptr(), self.layout.size()) }
    }

    #[inline(always)]
    pub(crate) fn slot(&self, index: usize) -> &[u8] {
        let start = index * self.stride;
        &self.bytes()[start..start + self.stride]
    }

    #[inline(always)]
    pub(crate) fn slot_mut(&mut self, index: usize) -> &mut [u8] {
        let start = index * self.stride;
        let stride = self.stride;
        &mut self.bytes_mut()[start..start + stride]
    }

    #[inline(always)]
    pub(crate) fn meta(&self, index: usize) -> Meta {
        read_meta(self.slot(index))
    }

    #[inline(always)]
    pub(crate) fn set_meta(&mut self, index: usize, meta: Meta) {
        write_meta(self.slot_mut(index), meta);
    }

    /// Copies the whole slot at `src` over the slot at `dst`.
    #[inline]
    pub(crate) fn copy_slot(&mut self, src: usize, dst: usize) {
        let stride = self.stride;
        let start = src * stride;
        self.bytes_mut()
            .copy_within(start..start + stride, dst * stride);
    }

    /// Iterates over the occupied slot indexes in physical order.
    pub(crate) fn taken(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.len).filter(|&index| self.meta(index).is_taken())
    }
}

impl Drop for SlotArray {
    fn drop(&mut self) {
        // SAFETY: `alloc` was returned by `alloc_zeroed` with `layout` and is
        // released exactly once.
        unsafe { dealloc(self.alloc.as_ptr(), self.layout) }
    }
}

impl Debug for SlotArray {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SlotArray")
            .field("len", &self.len)
            .field("stride", &self.stride)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_size_is_pointer_aligned() {
        for item_size in [0, 1, 4, 7, 8, 9, 24, 100] {
            let layout = SlotLayout::new(item_size).unwrap();
            assert_eq!(layout.slot_size() % SLOT_ALIGN, 0);
            assert!(layout.slot_size() >= META_SIZE + KEY_SIZE + item_size);
            assert!(layout.slot_size() < META_SIZE + KEY_SIZE + item_size + SLOT_ALIGN);
        }
    }

    #[test]
    fn oversized_items_are_rejected() {
        let item_size = u32::MAX as usize;
        assert_eq!(
            SlotLayout::new(item_size),
            Err(Error::ItemSizeTooLarge(item_size))
        );
        assert_eq!(
            SlotLayout::new(usize::MAX),
            Err(Error::ItemSizeTooLarge(usize::MAX))
        );

        let largest = u32::MAX as usize - ITEM_OFFSET - SLOT_ALIGN;
        assert!(SlotLayout::new(largest).is_ok());
    }

    #[test]
    fn fresh_array_is_empty() {
        let layout = SlotLayout::new(12).unwrap();
        let slots = SlotArray::new(16, layout.slot_size()).unwrap();
        assert_eq!(slots.len(), 16);
        assert_eq!(slots.total_bytes(), 16 * layout.slot_size());
        assert_eq!(slots.taken().count(), 0);
    }

    #[test]
    fn slots_do_not_overlap() {
        let layout = SlotLayout::new(3).unwrap();
        let mut slots = SlotArray::new(4, layout.slot_size()).unwrap();

        slots.set_meta(1, Meta::occupied(2, 0x12345));
        layout.key_mut(slots.slot_mut(1))[..3].copy_from_slice(b"abc");
        layout.item_mut(slots.slot_mut(1)).copy_from_slice(&[7, 8, 9]);

        assert!(!slots.meta(0).is_taken());
        assert!(!slots.meta(2).is_taken());
        assert_eq!(slots.meta(1).psl(), 2);
        assert_eq!(decode_key(layout.key(slots.slot(1))), b"abc");
        assert_eq!(layout.item(slots.slot(1)), &[7, 8, 9]);
        assert_eq!(slots.taken().collect::<alloc::vec::Vec<_>>(), [1]);

        slots.copy_slot(1, 3);
        assert_eq!(slots.meta(3), slots.meta(1));
        assert_eq!(layout.item(slots.slot(3)), &[7, 8, 9]);
    }

    #[test]
    fn key_encoding() {
        let stored = encode_key(b"nineteen_bytes_key_").unwrap();
        assert_eq!(stored[MAX_KEY_LEN], 0);
        assert_eq!(decode_key(&stored), b"nineteen_bytes_key_");

        assert_eq!(
            encode_key(b"twenty_bytes_key____"),
            Err(Error::KeyTooLong(20))
        );
        assert_eq!(encode_key(b"a\0b"), Err(Error::KeyContainsNul));
        assert_eq!(decode_key(&encode_key(b"").unwrap()), b"");
    }

    #[test]
    fn split_key_and_item() {
        let layout = SlotLayout::new(2).unwrap();
        let mut slot = alloc::vec![0u8; layout.slot_size()];
        layout.key_mut(&mut slot)[0] = b'k';

        let (key, item) = layout.key_and_item_mut(&mut slot);
        assert_eq!(decode_key(key), b"k");
        item.copy_from_slice(&[1, 2]);
        assert_eq!(layout.item(&slot), &[1, 2]);
    }
}

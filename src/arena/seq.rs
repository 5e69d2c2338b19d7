//! Growable arena sequences.
//!
//! A sequence is a header (`count`, `capacity`, `items`) pointing at an array of
//! 32-bit arena references. Appending past capacity allocates a larger array
//! further along the arena and copies the old items across; the abandoned array
//! is reclaimed with everything else at the next reset.

use std::fmt;
use std::marker::PhantomData;
use std::mem::size_of;
use std::ptr;

use bytemuck::{Pod, Zeroable};

use super::{Arena, ArenaRef, NULL_REF};
use crate::error::{Result, RuntimeError};

/// Capacity of the first items array.
pub const SEQ_INITIAL_CAPACITY: u32 = 8;

const ITEM_SIZE: usize = size_of::<u32>();

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct SeqHeader {
    pub count: u32,
    pub capacity: u32,
    /// Offset of the items array, or null while capacity is 0.
    pub items: u32,
}

impl SeqHeader {
    pub const EMPTY: Self = Self {
        count: 0,
        capacity: 0,
        items: NULL_REF,
    };
}

/// Typed reference to a sequence of `ArenaRef<T>`.
#[repr(transparent)]
pub struct SeqRef<T> {
    header: ArenaRef<SeqHeader>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> SeqRef<T> {
    pub const NULL: Self = Self::from_header(ArenaRef::NULL);

    pub const fn from_header(header: ArenaRef<SeqHeader>) -> Self {
        Self {
            header,
            _marker: PhantomData,
        }
    }

    pub const fn header(self) -> ArenaRef<SeqHeader> {
        self.header
    }

    pub const fn offset(self) -> u32 {
        self.header.offset()
    }

    pub const fn is_null(self) -> bool {
        self.header.is_null()
    }
}

impl<T> Clone for SeqRef<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for SeqRef<T> {}

impl<T> PartialEq for SeqRef<T> {
    fn eq(&self, other: &Self) -> bool {
        self.header == other.header
    }
}

impl<T> Eq for SeqRef<T> {}

impl<T> fmt::Debug for SeqRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SeqRef({:?})", self.header)
    }
}

impl Arena {
    /// Empty sequence. Allocates only the header.
    pub fn new_seq<T>(&self) -> Result<SeqRef<T>> {
        Ok(SeqRef::from_header(self.alloc(SeqHeader::EMPTY)?))
    }

    /// Sequence pre-sized for `items` and filled with them. Capacity equals the
    /// item count, so the next push regrows.
    pub fn seq_from<T>(&self, items: &[ArenaRef<T>]) -> Result<SeqRef<T>> {
        if items.is_empty() {
            return self.new_seq();
        }
        let count = u32::try_from(items.len()).map_err(|_| self.exhausted(usize::MAX))?;
        let bytes = items
            .len()
            .checked_mul(ITEM_SIZE)
            .ok_or(self.exhausted(usize::MAX))?;
        let array = self.allocate(bytes, ITEM_SIZE)?;
        for (i, item) in (0..count).zip(items) {
            self.write(ArenaRef::<u32>::from_raw(item_offset(array, i)), item.offset())?;
        }
        let header = self.alloc(SeqHeader {
            count,
            capacity: count,
            items: array,
        })?;
        Ok(SeqRef::from_header(header))
    }

    /// Append one reference, growing geometrically.
    pub fn seq_push<T>(&self, seq: SeqRef<T>, item: ArenaRef<T>) -> Result<()> {
        let mut header = self.read(seq.header())?;

        if header.count == header.capacity {
            let capacity = if header.capacity == 0 {
                SEQ_INITIAL_CAPACITY
            } else {
                header.capacity.checked_mul(2).ok_or(self.exhausted(usize::MAX))?
            };
            let bytes = (capacity as usize)
                .checked_mul(ITEM_SIZE)
                .ok_or(self.exhausted(usize::MAX))?;
            let items = self.allocate(bytes, ITEM_SIZE)?;
            if header.count > 0 {
                self.check_items(header.items, header.count)?;
                // SAFETY: the old array was checked in bounds; the new one was
                // just reserved past it, so the two never overlap.
                unsafe {
                    ptr::copy_nonoverlapping(
                        self.core.ptr(header.items),
                        self.core.ptr(items),
                        header.count as usize * ITEM_SIZE,
                    );
                }
            }
            header.items = items;
            header.capacity = capacity;
        }

        let slot = item_offset(header.items, header.count);
        self.write(ArenaRef::<u32>::from_raw(slot), item.offset())?;
        header.count += 1;
        self.write(seq.header(), header)
    }

    pub fn seq_len<T>(&self, seq: SeqRef<T>) -> Result<u32> {
        Ok(self.read(seq.header())?.count)
    }

    pub fn seq_get<T>(&self, seq: SeqRef<T>, index: u32) -> Result<ArenaRef<T>> {
        let header = self.read(seq.header())?;
        if index >= header.count {
            return Err(RuntimeError::IndexOutOfRange {
                index,
                len: header.count,
            });
        }
        let raw = self.read(ArenaRef::<u32>::from_raw(item_offset(header.items, index)))?;
        Ok(ArenaRef::from_raw(raw))
    }

    /// All references in order.
    pub fn seq_items<T>(&self, seq: SeqRef<T>) -> Result<Vec<ArenaRef<T>>> {
        let header = self.read(seq.header())?;
        (0..header.count)
            .map(|i| {
                self.read(ArenaRef::<u32>::from_raw(item_offset(header.items, i)))
                    .map(ArenaRef::from_raw)
            })
            .collect()
    }

    fn check_items(&self, items: u32, count: u32) -> Result<()> {
        if self.core.contains(items, count as usize * ITEM_SIZE) {
            Ok(())
        } else {
            Err(RuntimeError::InvalidReference {
                offset: items,
                capacity: self.capacity(),
            })
        }
    }

    fn exhausted(&self, requested: usize) -> RuntimeError {
        RuntimeError::ArenaExhausted {
            requested,
            remaining: self.remaining(),
            capacity: self.capacity(),
        }
    }
}

fn item_offset(items: u32, index: u32) -> u32 {
    items.wrapping_add(index.wrapping_mul(ITEM_SIZE as u32))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_seq() {
        let arena = Arena::new(64);
        let seq = arena.new_seq::<u32>().unwrap();
        assert_eq!(arena.read(seq.header()).unwrap(), SeqHeader::EMPTY);
        assert_eq!(arena.seq_len(seq).unwrap(), 0);
        assert!(arena.seq_items(seq).unwrap().is_empty());
    }

    #[test]
    fn test_push_preserves_order_across_growth() {
        let arena = Arena::new(4096);
        let seq = arena.new_seq::<u32>().unwrap();
        let pushed: Vec<ArenaRef<u32>> = (0..20).map(|i| ArenaRef::from_raw(i * 4)).collect();
        for &item in &pushed {
            arena.seq_push(seq, item).unwrap();
        }

        let header = arena.read(seq.header()).unwrap();
        assert_eq!(header.count, 20);
        assert_eq!(header.capacity, 32);
        assert_eq!(arena.seq_items(seq).unwrap(), pushed);
        assert_eq!(arena.seq_get(seq, 13).unwrap(), pushed[13]);
    }

    #[test]
    fn test_seq_from_reserves_exactly() {
        let arena = Arena::new(256);
        let items: Vec<ArenaRef<u32>> = (0..3).map(|i| ArenaRef::from_raw(i * 4)).collect();
        let seq = arena.seq_from(&items).unwrap();
        // One 12-byte array and one 12-byte header, nothing else.
        assert_eq!(arena.used(), 24);

        let header = arena.read(seq.header()).unwrap();
        assert_eq!((header.count, header.capacity), (3, 3));
        assert_eq!(arena.seq_items(seq).unwrap(), items);

        arena.seq_push(seq, ArenaRef::from_raw(64)).unwrap();
        assert_eq!(arena.read(seq.header()).unwrap().capacity, 6);
        assert_eq!(arena.seq_get(seq, 3).unwrap(), ArenaRef::from_raw(64));
    }

    #[test]
    fn test_seq_from_empty_is_header_only() {
        let arena = Arena::new(64);
        let seq = arena.seq_from::<u32>(&[]).unwrap();
        assert_eq!(arena.read(seq.header()).unwrap(), SeqHeader::EMPTY);
        assert_eq!(arena.used(), 12);
    }

    #[test]
    fn test_get_out_of_range() {
        let arena = Arena::new(256);
        let seq = arena.seq_from::<u32>(&[ArenaRef::from_raw(0)]).unwrap();
        assert_eq!(
            arena.seq_get(seq, 1),
            Err(RuntimeError::IndexOutOfRange { index: 1, len: 1 })
        );
    }

    #[test]
    fn test_growth_exhaustion_keeps_header_intact() {
        // Header (12) + first items array (32) fit; the regrow to 64 bytes does not.
        let arena = Arena::new(64);
        let seq = arena.new_seq::<u32>().unwrap();
        for i in 0..SEQ_INITIAL_CAPACITY {
            arena.seq_push(seq, ArenaRef::from_raw(i)).unwrap();
        }
        let err = arena.seq_push(seq, ArenaRef::from_raw(99)).unwrap_err();
        assert!(matches!(err, RuntimeError::ArenaExhausted { requested: 64, .. }));
        assert_eq!(arena.seq_len(seq).unwrap(), SEQ_INITIAL_CAPACITY);
    }
}

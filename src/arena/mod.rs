//! Bump Arena - fixed-capacity linear allocation for one render cycle.
//!
//! Everything a render produces (element records, strings, child and attribute
//! sequences) is carved out of one pre-sized region by advancing a cursor. There
//! is no per-object free: [`Arena::reset`] rewinds the cursor and the next cycle
//! overwrites the bytes in place.
//!
//! ```text
//! base                        cursor                        capacity
//!  │ record │ "Add" │ seq │ items │ ...  │        free        │
//!  └────────────── used ─────────────────┴──── remaining ─────┘
//! ```
//!
//! References into the arena are 32-bit offsets from `base` ([`ArenaRef`]), so a
//! host that only knows the base address can follow them without knowing any Rust
//! type. `u32::MAX` is the null reference.
//!
//! Two arenas share the same core:
//! - [`Arena`] holds plain data (`bytemuck::Pod`) only, so every byte the host
//!   can see is initialized.
//! - [`EnvArena`] holds opaque handler closures and is never exposed as bytes.

use std::cell::{Cell, UnsafeCell};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::mem::{align_of, size_of};
use std::ptr;

use bytemuck::Pod;

use crate::error::{Result, RuntimeError};

mod env;
pub mod seq;

pub use env::EnvArena;
pub use seq::{SeqHeader, SeqRef, SEQ_INITIAL_CAPACITY};

// =============================================================================
// CONSTANTS
// =============================================================================

/// Largest alignment an allocation may request. The backing store is aligned to it.
pub const MAX_ALIGN: usize = 16;

/// Null arena reference.
pub const NULL_REF: u32 = u32::MAX;

// =============================================================================
// REFERENCES
// =============================================================================

/// Typed offset into an [`Arena`].
///
/// Carries no lifetime. It is only meaningful for the cycle that produced it;
/// the registry's generation tag is what catches stale use from the host side.
#[repr(transparent)]
pub struct ArenaRef<T: ?Sized> {
    offset: u32,
    _marker: PhantomData<fn() -> *const T>,
}

/// NUL-terminated UTF-8 string in the arena.
pub type StrRef = ArenaRef<str>;

impl<T: ?Sized> ArenaRef<T> {
    pub const NULL: Self = Self::from_raw(NULL_REF);

    pub const fn from_raw(offset: u32) -> Self {
        Self {
            offset,
            _marker: PhantomData,
        }
    }

    pub const fn offset(self) -> u32 {
        self.offset
    }

    pub const fn is_null(self) -> bool {
        self.offset == NULL_REF
    }

    /// `None` for the null reference.
    pub fn get(self) -> Option<Self> {
        (!self.is_null()).then_some(self)
    }
}

impl<T: ?Sized> Clone for ArenaRef<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: ?Sized> Copy for ArenaRef<T> {}

impl<T: ?Sized> PartialEq for ArenaRef<T> {
    fn eq(&self, other: &Self) -> bool {
        self.offset == other.offset
    }
}

impl<T: ?Sized> Eq for ArenaRef<T> {}

impl<T: ?Sized> Hash for ArenaRef<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.offset.hash(state);
    }
}

impl<T: ?Sized> fmt::Debug for ArenaRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "ArenaRef(null)")
        } else {
            write!(f, "ArenaRef({:#x})", self.offset)
        }
    }
}

// =============================================================================
// BUMP CORE
// =============================================================================

#[derive(Clone, Copy)]
#[repr(C, align(16))]
struct Block([u8; MAX_ALIGN]);

/// Shared cursor logic for [`Arena`] and [`EnvArena`].
pub(crate) struct Bump {
    storage: Box<[UnsafeCell<Block>]>,
    capacity: usize,
    cursor: Cell<usize>,
    peak: Cell<usize>,
}

impl Bump {
    pub(crate) fn new(capacity: u32) -> Self {
        let capacity = capacity as usize;
        let blocks = capacity.div_ceil(MAX_ALIGN);
        let storage = (0..blocks)
            .map(|_| UnsafeCell::new(Block([0; MAX_ALIGN])))
            .collect();
        Self {
            storage,
            capacity,
            cursor: Cell::new(0),
            peak: Cell::new(0),
        }
    }

    /// Reserve `size` bytes at the next `align` boundary.
    pub(crate) fn allocate(&self, size: usize, align: usize) -> Result<u32> {
        if !align.is_power_of_two() || align > MAX_ALIGN {
            return Err(RuntimeError::UnsupportedAlignment {
                align,
                max: MAX_ALIGN,
            });
        }

        let cursor = self.cursor.get();
        let start = cursor.next_multiple_of(align);
        let end = start
            .checked_add(size)
            .filter(|&end| end <= self.capacity)
            .ok_or(RuntimeError::ArenaExhausted {
                requested: size,
                remaining: self.capacity - cursor,
                capacity: self.capacity,
            })?;

        self.cursor.set(end);
        self.peak.set(self.peak.get().max(end));
        // Capacity is below u32::MAX (config validation), so start fits.
        Ok(start as u32)
    }

    /// Raw pointer to `offset`. Writing through it is allowed: the bytes live in
    /// `UnsafeCell`s.
    pub(crate) fn ptr(&self, offset: u32) -> *mut u8 {
        debug_assert!(offset as usize <= self.capacity);
        // UnsafeCell<Block> has the same layout as Block, so the slice is one
        // contiguous run of bytes.
        self.storage.as_ptr().cast::<u8>().cast_mut().wrapping_add(offset as usize)
    }

    /// True if `[offset, offset + size)` lies inside the region.
    pub(crate) fn contains(&self, offset: u32, size: usize) -> bool {
        offset != NULL_REF
            && (offset as usize)
                .checked_add(size)
                .is_some_and(|end| end <= self.capacity)
    }

    pub(crate) fn reset(&mut self) {
        self.cursor.set(0);
    }

    pub(crate) fn used(&self) -> usize {
        self.cursor.get()
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    pub(crate) fn peak(&self) -> usize {
        self.peak.get()
    }
}

// =============================================================================
// ARENA
// =============================================================================

/// Host-visible arena. Holds plain data only.
pub struct Arena {
    core: Bump,
}

impl Arena {
    pub fn new(capacity: u32) -> Self {
        Self {
            core: Bump::new(capacity),
        }
    }

    /// Reserve `size` bytes aligned to `align` and return their offset.
    ///
    /// Fails with `ArenaExhausted` when the region would pass capacity; the cursor
    /// is left where it was.
    pub fn allocate(&self, size: usize, align: usize) -> Result<u32> {
        self.core.allocate(size, align)
    }

    /// Allocate and initialize one value.
    pub fn alloc<T: Pod>(&self, value: T) -> Result<ArenaRef<T>> {
        let offset = self.core.allocate(size_of::<T>(), align_of::<T>())?;
        // SAFETY: freshly reserved, in bounds, aligned for T (align <= MAX_ALIGN
        // was checked and the store is MAX_ALIGN-aligned). No other reference
        // covers these bytes.
        unsafe { ptr::write(self.core.ptr(offset).cast::<T>(), value) };
        Ok(ArenaRef::from_raw(offset))
    }

    /// Copy a value out of the arena.
    pub fn read<T: Pod>(&self, r: ArenaRef<T>) -> Result<T> {
        self.check::<T>(r.offset())?;
        // SAFETY: bounds and alignment checked; the store is zero-initialized and
        // only ever receives Pod writes, so any bit pattern read is a valid T.
        Ok(unsafe { ptr::read(self.core.ptr(r.offset()).cast::<T>()) })
    }

    /// Overwrite a value in place.
    pub fn write<T: Pod>(&self, r: ArenaRef<T>, value: T) -> Result<()> {
        self.check::<T>(r.offset())?;
        // SAFETY: bounds and alignment checked. Values are only handed out by copy,
        // so no reference aliases the target.
        unsafe { ptr::write(self.core.ptr(r.offset()).cast::<T>(), value) };
        Ok(())
    }

    fn check<T>(&self, offset: u32) -> Result<()> {
        if self.core.contains(offset, size_of::<T>()) && offset as usize % align_of::<T>() == 0 {
            Ok(())
        } else {
            Err(RuntimeError::InvalidReference {
                offset,
                capacity: self.core.capacity(),
            })
        }
    }

    /// Duplicate a string into the arena with a NUL terminator.
    ///
    /// The host scans for the terminator, so an embedded NUL would silently
    /// truncate; it is rejected instead.
    pub fn strdup(&self, s: &str) -> Result<StrRef> {
        if let Some(position) = s.bytes().position(|b| b == 0) {
            return Err(RuntimeError::InteriorNul { position });
        }
        let offset = self.core.allocate(s.len() + 1, 1)?;
        let dst = self.core.ptr(offset);
        // SAFETY: `len + 1` bytes were just reserved at `dst`.
        unsafe {
            ptr::copy_nonoverlapping(s.as_ptr(), dst, s.len());
            dst.add(s.len()).write(0);
        }
        Ok(ArenaRef::from_raw(offset))
    }

    /// Format straight into the arena.
    pub fn format(&self, args: fmt::Arguments<'_>) -> Result<StrRef> {
        let mut counter = ByteCounter(0);
        fmt::write(&mut counter, args).map_err(|_| RuntimeError::Format)?;

        let len = counter.0;
        let offset = self.core.allocate(len + 1, 1)?;
        let mut writer = ArenaWriter {
            dst: self.core.ptr(offset),
            len,
            written: 0,
            nul: None,
        };
        let formatted = fmt::write(&mut writer, args);
        // A Display impl that changes length between passes leaves the tail short;
        // fail instead of publishing a half-written string.
        if formatted.is_err() || writer.written != len {
            return Err(RuntimeError::Format);
        }
        if let Some(position) = writer.nul {
            return Err(RuntimeError::InteriorNul { position });
        }
        // SAFETY: `len + 1` bytes were reserved; the terminator goes in the last.
        unsafe { writer.dst.add(len).write(0) };
        Ok(ArenaRef::from_raw(offset))
    }

    /// Borrow a string the arena holds.
    ///
    /// Only valid for references produced in the current cycle: the bytes stay
    /// put until [`Arena::reset`], which needs `&mut self` and so ends the borrow.
    pub(crate) fn str_at(&self, r: StrRef) -> Result<&str> {
        let len = self.nul_position(r.offset())?;
        // SAFETY: `nul_position` proved `len` readable bytes at the offset. Bump
        // allocation never hands those bytes out again before a reset.
        let bytes = unsafe { std::slice::from_raw_parts(self.core.ptr(r.offset()), len) };
        std::str::from_utf8(bytes).map_err(|_| RuntimeError::InvalidUtf8)
    }

    /// Owned copy of an arena string.
    pub fn read_string(&self, r: StrRef) -> Result<String> {
        let len = self.nul_position(r.offset())?;
        let mut bytes = vec![0u8; len];
        // SAFETY: `len` bytes at the offset are in bounds.
        unsafe { ptr::copy_nonoverlapping(self.core.ptr(r.offset()), bytes.as_mut_ptr(), len) };
        String::from_utf8(bytes).map_err(|_| RuntimeError::InvalidUtf8)
    }

    fn nul_position(&self, offset: u32) -> Result<usize> {
        let invalid = RuntimeError::InvalidReference {
            offset,
            capacity: self.core.capacity(),
        };
        if !self.core.contains(offset, 0) {
            return Err(invalid);
        }
        let start = self.core.ptr(offset);
        let limit = self.core.capacity() - offset as usize;
        (0..limit)
            // SAFETY: i < limit keeps every read inside the region.
            .find(|&i| unsafe { start.add(i).read() } == 0)
            .ok_or(invalid)
    }

    /// Rewind to empty. O(1); bytes are left as they are.
    pub fn reset(&mut self) {
        self.core.reset();
    }

    /// The whole backing region, for descriptor-driven decoding.
    pub fn bytes(&mut self) -> &[u8] {
        // SAFETY: exclusive borrow, so nothing can write while the slice lives.
        // The store is zero-initialized and only receives Pod data.
        unsafe { std::slice::from_raw_parts(self.core.ptr(0), self.core.capacity()) }
    }

    /// Base address the host adds to arena offsets.
    pub fn base_ptr(&self) -> *const u8 {
        self.core.ptr(0)
    }

    pub fn used(&self) -> usize {
        self.core.used()
    }

    pub fn remaining(&self) -> usize {
        self.core.capacity() - self.core.used()
    }

    pub fn capacity(&self) -> usize {
        self.core.capacity()
    }

    /// Highest cursor position ever reached, across resets.
    pub fn peak(&self) -> usize {
        self.core.peak()
    }
}

impl fmt::Debug for Arena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arena")
            .field("used", &self.used())
            .field("capacity", &self.capacity())
            .field("peak", &self.peak())
            .finish()
    }
}

struct ByteCounter(usize);

impl fmt::Write for ByteCounter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.0 += s.len();
        Ok(())
    }
}

struct ArenaWriter {
    dst: *mut u8,
    len: usize,
    written: usize,
    nul: Option<usize>,
}

impl fmt::Write for ArenaWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let end = self.written.checked_add(s.len()).ok_or(fmt::Error)?;
        if end > self.len {
            return Err(fmt::Error);
        }
        if self.nul.is_none() {
            self.nul = s.bytes().position(|b| b == 0).map(|p| self.written + p);
        }
        // SAFETY: end <= len, and `len` bytes were reserved at `dst`.
        unsafe { ptr::copy_nonoverlapping(s.as_ptr(), self.dst.add(self.written), s.len()) };
        self.written = end;
        Ok(())
    }
}

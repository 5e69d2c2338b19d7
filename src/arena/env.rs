//! Handler environment arena.
//!
//! Handlers are `Copy + 'static` closures. Their captured state is moved into
//! this region when a button or input is built and read back out when the host
//! dispatches an event. The bytes are opaque (closures may contain padding), so
//! unlike [`super::Arena`] this region is never exposed for reading.

use std::mem::{align_of, size_of};
use std::ptr;

use super::{Bump, MAX_ALIGN};
use crate::error::{Result, RuntimeError};

pub struct EnvArena {
    core: Bump,
}

impl EnvArena {
    pub fn new(capacity: u32) -> Self {
        Self {
            core: Bump::new(capacity),
        }
    }

    /// Move a value into the arena. Returns its offset.
    ///
    /// Zero-sized values take no room and report offset 0: the region base is
    /// `MAX_ALIGN`-aligned, so reads through it are valid whatever the cursor.
    pub(crate) fn store<F: Copy + 'static>(&self, value: F) -> Result<u32> {
        if size_of::<F>() == 0 {
            if align_of::<F>() > MAX_ALIGN {
                return Err(RuntimeError::UnsupportedAlignment {
                    align: align_of::<F>(),
                    max: MAX_ALIGN,
                });
            }
            return Ok(0);
        }
        let offset = self.core.allocate(size_of::<F>(), align_of::<F>())?;
        // SAFETY: freshly reserved, in bounds and aligned for F.
        unsafe { ptr::write(self.core.ptr(offset).cast::<F>(), value) };
        Ok(offset)
    }

    /// Address of a stored value, for the dispatch trampolines.
    pub(crate) fn env_ptr(&self, offset: u32) -> *const u8 {
        self.core.ptr(offset).cast_const()
    }

    pub fn reset(&mut self) {
        self.core.reset();
    }

    pub fn used(&self) -> usize {
        self.core.used()
    }

    pub fn capacity(&self) -> usize {
        self.core.capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_and_read_back() {
        let envs = EnvArena::new(64);
        let offset = envs.store((7u8, 1234u64)).unwrap();
        assert_eq!(offset % 8, 0);
        // SAFETY: offset holds a (u8, u64) written just above.
        let value = unsafe { envs.env_ptr(offset).cast::<(u8, u64)>().read() };
        assert_eq!(value, (7, 1234));
    }

    #[test]
    fn test_zero_sized_values_take_no_room() {
        let envs = EnvArena::new(0);
        let closure = || ();
        assert!(envs.store(closure).is_ok());
        assert_eq!(envs.used(), 0);
    }

    #[test]
    fn test_zero_sized_values_fit_a_full_arena() {
        let envs = EnvArena::new(2);
        envs.store(1u8).unwrap();
        envs.store(2u8).unwrap();
        // Aligning the cursor (2) up to 8 would pass capacity.
        assert_eq!(envs.store([0u64; 0]), Ok(0));
        assert_eq!(envs.used(), 2);
        assert!(matches!(envs.store(3u8), Err(RuntimeError::ArenaExhausted { .. })));
    }

    #[test]
    fn test_env_exhaustion() {
        let envs = EnvArena::new(8);
        envs.store(1u64).unwrap();
        assert!(matches!(
            envs.store(2u32),
            Err(RuntimeError::ArenaExhausted { requested: 4, .. })
        ));
    }
}

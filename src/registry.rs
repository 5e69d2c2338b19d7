//! Element Registry - positional index of every element built this cycle.
//!
//! The host only ever names elements by the integer position it read out of a
//! record's `index` field. The registry turns that position back into the record
//! and, for buttons and inputs, the handler bound to it.
//!
//! - Entry `i` is the `i`-th element constructed, so `record(i).index == i`.
//! - Entries don't own anything; records live in the arena.
//! - `reset` empties it (capacity kept) and bumps the generation, so handles
//!   kept across a render can be told apart from fresh ones.

use std::cell::RefCell;

use crate::arena::ArenaRef;
use crate::element::ElementRecord;
use crate::error::{Result, RuntimeError};

// =============================================================================
// HANDLES
// =============================================================================

/// Element position qualified by the render cycle it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle {
    pub index: u32,
    pub generation: u32,
}

impl Handle {
    pub const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }
}

// =============================================================================
// HANDLERS
// =============================================================================

pub(crate) type ClickFn<S> = unsafe fn(*const u8, &mut S);
pub(crate) type ChangeFn<S> = unsafe fn(*const u8, &mut S, &str);

/// Type-erased event handler.
///
/// `env` is the closure's offset in the handler arena and `call` the trampoline
/// monomorphized for that closure type.
pub(crate) enum Handler<S> {
    Click { env: u32, call: ClickFn<S> },
    Change { env: u32, call: ChangeFn<S> },
}

impl<S> Handler<S> {
    pub(crate) fn click<F>(env: u32) -> Self
    where
        F: Fn(&mut S) + Copy + 'static,
    {
        Self::Click {
            env,
            call: call_click::<S, F>,
        }
    }

    pub(crate) fn change<F>(env: u32) -> Self
    where
        F: Fn(&mut S, &str) + Copy + 'static,
    {
        Self::Change {
            env,
            call: call_change::<S, F>,
        }
    }
}

impl<S> Clone for Handler<S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S> Copy for Handler<S> {}

/// # Safety
/// `env` must point at an `F` stored by `EnvArena::store` in the current cycle.
unsafe fn call_click<S, F>(env: *const u8, state: &mut S)
where
    F: Fn(&mut S) + Copy,
{
    // Copy the closure out before running it.
    let handler = unsafe { env.cast::<F>().read() };
    handler(state);
}

/// # Safety
/// `env` must point at an `F` stored by `EnvArena::store` in the current cycle.
unsafe fn call_change<S, F>(env: *const u8, state: &mut S, text: &str)
where
    F: Fn(&mut S, &str) + Copy,
{
    let handler = unsafe { env.cast::<F>().read() };
    handler(state, text);
}

// =============================================================================
// REGISTRY
// =============================================================================

pub(crate) struct RegistryEntry<S> {
    pub(crate) record: ArenaRef<ElementRecord>,
    pub(crate) handler: Option<Handler<S>>,
}

impl<S> Clone for RegistryEntry<S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S> Copy for RegistryEntry<S> {}

pub struct Registry<S> {
    generation: u32,
    entries: RefCell<Vec<RegistryEntry<S>>>,
}

impl<S> Registry<S> {
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            generation: 0,
            entries: RefCell::new(Vec::with_capacity(capacity)),
        }
    }

    /// Empty the registry and start a new generation.
    pub fn reset(&mut self) {
        self.entries.get_mut().clear();
        self.generation = match self.generation.wrapping_add(1) {
            0 => 1,
            next => next,
        };
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Handle for `index` in the current generation.
    pub fn handle(&self, index: u32) -> Handle {
        Handle::new(index, self.generation)
    }

    /// Index the next registered element will get.
    pub(crate) fn next_index(&self) -> Result<u32> {
        u32::try_from(self.len())
            .ok()
            .filter(|&index| index != u32::MAX)
            .ok_or(RuntimeError::RegistryFull)
    }

    pub(crate) fn push(&self, entry: RegistryEntry<S>) {
        self.entries.borrow_mut().push(entry);
    }

    /// Look up a handle. Generation is checked before range.
    pub(crate) fn resolve(&self, handle: Handle) -> Result<RegistryEntry<S>> {
        if handle.generation != self.generation {
            return Err(RuntimeError::StaleHandle {
                handle: handle.generation,
                current: self.generation,
            });
        }
        let entries = self.entries.borrow();
        entries
            .get(handle.index as usize)
            .copied()
            .ok_or(RuntimeError::IndexOutOfRange {
                index: handle.index,
                len: entries.len() as u32,
            })
    }

    /// Record reference for a handle.
    pub fn record(&self, handle: Handle) -> Result<ArenaRef<ElementRecord>> {
        self.resolve(handle).map(|entry| entry.record)
    }
}

impl<S> Default for Registry<S> {
    fn default() -> Self {
        Self::new()
    }
}

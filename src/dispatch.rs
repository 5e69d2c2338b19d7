//! Event Dispatch Bridge.
//!
//! The host reports user events by registry index:
//!
//! ```text
//! invoke_on_click(i)         registry[i] ── Button + handler ──► handler(&mut component)
//! invoke_on_change(i, text)  stage text ── Input + handler  ──► handler(&mut component, text)
//! ```
//!
//! An index past the registry, or a handle from another generation, is a host
//! bug and fails. An element of the wrong kind, or a button without a handler,
//! is simply ignored: no callback, no render request.
//!
//! The `dispatch_*` methods never talk to the host. The `invoke_*` methods wrap
//! them and request a render after a handled event. The export layer uses the
//! former so it can drop its hold on the runtime before the host re-enters.

use crate::element::ElementKind;
use crate::error::{Result, RuntimeError};
use crate::host::Host;
use crate::registry::{Handle, Handler};
use crate::runtime::{Component, Runtime};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// A handler ran.
    Handled,
    /// The element can't take this event.
    Ignored,
}

impl Dispatch {
    pub fn is_handled(self) -> bool {
        self == Self::Handled
    }
}

// =============================================================================
// INPUT BUFFER
// =============================================================================

/// Fixed-size text staging.
///
/// The host writes outbound text into `scratch` (`get_input_buffer`), then the
/// bridge copies it into `staging` before the handler sees it. Text must fit
/// together with its NUL terminator; it is never truncated.
pub struct InputBuffer {
    scratch: Box<[u8]>,
    staging: Box<[u8]>,
    staged: usize,
}

impl InputBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            scratch: vec![0; capacity].into_boxed_slice(),
            staging: vec![0; capacity].into_boxed_slice(),
            staged: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.staging.len()
    }

    pub fn scratch_ptr(&mut self) -> *mut u8 {
        self.scratch.as_mut_ptr()
    }

    /// Copy `text` into the staging buffer and return it as UTF-8.
    pub fn stage(&mut self, text: &[u8]) -> Result<&str> {
        let capacity = self.capacity();
        if text.len() >= capacity {
            return Err(RuntimeError::InputTooLong {
                len: text.len(),
                capacity,
            });
        }
        if let Some(position) = text.iter().position(|&b| b == 0) {
            return Err(RuntimeError::InteriorNul { position });
        }
        std::str::from_utf8(text).map_err(|_| RuntimeError::InvalidUtf8)?;

        self.staging[..text.len()].copy_from_slice(text);
        self.staging[text.len()] = 0;
        self.staged = text.len();
        Ok(self.staged())
    }

    /// Most recently staged text.
    pub fn staged(&self) -> &str {
        std::str::from_utf8(&self.staging[..self.staged]).unwrap_or_default()
    }
}

/// Read NUL-terminated text the host left at `text`, scanning at most `capacity`
/// bytes.
///
/// # Safety
/// `text` must be null or readable up to its terminator or `capacity` bytes,
/// whichever comes first.
pub unsafe fn read_host_text(text: *const u8, capacity: usize) -> Result<Vec<u8>> {
    if text.is_null() {
        return Err(RuntimeError::NullPointer);
    }
    for len in 0..capacity {
        // SAFETY: caller guarantees the bytes up to the terminator are readable.
        if unsafe { text.add(len).read() } == 0 {
            // SAFETY: the `len` bytes before the terminator were just read.
            return Ok(unsafe { std::slice::from_raw_parts(text, len) }.to_vec());
        }
    }
    Err(RuntimeError::InputTooLong {
        len: capacity,
        capacity,
    })
}

// =============================================================================
// DISPATCH
// =============================================================================

impl<C: Component, H: Host> Runtime<C, H> {
    /// Run the click handler for `handle` without notifying the host.
    pub fn dispatch_click(&mut self, handle: Handle) -> Result<Dispatch> {
        let entry = self.registry.resolve(handle)?;
        let kind = self.arena.read(entry.record)?.kind()?;

        let outcome = match kind {
            ElementKind::Button => match entry.handler {
                Some(Handler::Click { env, call }) => {
                    let env = self.envs.env_ptr(env);
                    // SAFETY: the entry resolved in the current generation, so its
                    // env was stored this cycle by `Ui::button` with the closure type
                    // `call` was instantiated for. The arenas can't be reset while
                    // `self` is borrowed.
                    unsafe { call(env, &mut self.component) };
                    Dispatch::Handled
                }
                Some(Handler::Change { .. }) | None => Dispatch::Ignored,
            },
            ElementKind::Generic | ElementKind::Input | ElementKind::Canvas => Dispatch::Ignored,
        };

        self.record_dispatch(handle, kind, outcome);
        Ok(outcome)
    }

    /// Stage `text` and run the change handler for `handle` without notifying the
    /// host.
    ///
    /// Staging happens before the kind check, so over-long or malformed text is
    /// rejected even when aimed at the wrong element.
    pub fn dispatch_change(&mut self, handle: Handle, text: &[u8]) -> Result<Dispatch> {
        let entry = self.registry.resolve(handle)?;
        let kind = self.arena.read(entry.record)?.kind()?;
        let text = self.input.stage(text)?;

        let outcome = match kind {
            ElementKind::Input => match entry.handler {
                Some(Handler::Change { env, call }) => {
                    let env = self.envs.env_ptr(env);
                    // SAFETY: as for clicks; the env was stored by `Ui::input`.
                    unsafe { call(env, &mut self.component, text) };
                    Dispatch::Handled
                }
                Some(Handler::Click { .. }) | None => Dispatch::Ignored,
            },
            ElementKind::Generic | ElementKind::Button | ElementKind::Canvas => Dispatch::Ignored,
        };

        self.record_dispatch(handle, kind, outcome);
        Ok(outcome)
    }

    /// Click on the element at `index` in the current tree.
    pub fn invoke_on_click(&mut self, index: u32) -> Result<Dispatch> {
        self.invoke_on_click_checked(self.handle(index))
    }

    pub fn invoke_on_click_checked(&mut self, handle: Handle) -> Result<Dispatch> {
        let outcome = self.dispatch_click(handle)?;
        if outcome.is_handled() {
            self.request_render();
        }
        Ok(outcome)
    }

    /// Text changed in the element at `index` in the current tree.
    pub fn invoke_on_change(&mut self, index: u32, text: &[u8]) -> Result<Dispatch> {
        self.invoke_on_change_checked(self.handle(index), text)
    }

    pub fn invoke_on_change_checked(&mut self, handle: Handle, text: &[u8]) -> Result<Dispatch> {
        let outcome = self.dispatch_change(handle, text)?;
        if outcome.is_handled() {
            self.request_render();
        }
        Ok(outcome)
    }

    fn record_dispatch(&mut self, handle: Handle, kind: ElementKind, outcome: Dispatch) {
        match outcome {
            Dispatch::Handled => self.stats.dispatched += 1,
            Dispatch::Ignored => {
                self.stats.ignored += 1;
                tracing::debug!(index = handle.index, ?kind, "event ignored");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_copies_and_terminates() {
        let mut input = InputBuffer::new(8);
        assert_eq!(input.stage(b"milk").unwrap(), "milk");
        assert_eq!(input.staged(), "milk");
        assert_eq!(&input.staging[..5], b"milk\0");
    }

    #[test]
    fn test_stage_never_truncates() {
        let mut input = InputBuffer::new(8);
        input.stage(b"ok").unwrap();
        assert_eq!(
            input.stage(b"12345678"),
            Err(RuntimeError::InputTooLong { len: 8, capacity: 8 })
        );
        // The largest text that fits leaves room for the terminator.
        assert_eq!(input.stage(b"1234567").unwrap(), "1234567");
    }

    #[test]
    fn test_stage_rejects_bad_text() {
        let mut input = InputBuffer::new(16);
        assert_eq!(input.stage(&[0xff, 0xfe]), Err(RuntimeError::InvalidUtf8));
        assert_eq!(
            input.stage(b"a\0b"),
            Err(RuntimeError::InteriorNul { position: 1 })
        );
        assert_eq!(input.staged(), "");
    }

    #[test]
    fn test_read_host_text() {
        let text = b"hello\0garbage";
        let bytes = unsafe { read_host_text(text.as_ptr(), 16) }.unwrap();
        assert_eq!(bytes, b"hello");

        let unterminated = [b'x'; 8];
        assert_eq!(
            unsafe { read_host_text(unterminated.as_ptr(), 8) },
            Err(RuntimeError::InputTooLong { len: 8, capacity: 8 })
        );
        assert_eq!(
            unsafe { read_host_text(std::ptr::null(), 8) },
            Err(RuntimeError::NullPointer)
        );
    }

    #[test]
    fn test_scratch_region_is_capacity_sized() {
        let mut input = InputBuffer::new(32);
        let ptr = input.scratch_ptr();
        assert!(!ptr.is_null());
        assert_eq!(input.capacity(), 32);
    }
}

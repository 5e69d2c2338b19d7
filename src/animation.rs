//! Per-frame callbacks.
//!
//! A component can ask the host to call it back on every animation frame, e.g.
//! to redraw a canvas. Unlike element handlers these outlive render cycles, so
//! they are boxed closures kept in a slot table rather than arena data.
//!
//! Ids are `slot + 1`; zero is never issued. Slots freed by `clear` are reused.

use crate::error::{Result, RuntimeError};
use crate::host::{CanvasPixels, Host};

/// Id the host echoes back through `invoke_animation_frame_callback`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameCallbackId(u32);

impl FrameCallbackId {
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    fn slot(self) -> Option<usize> {
        (self.0 as usize).checked_sub(1)
    }
}

/// What a frame callback sees.
pub struct FrameContext<'a> {
    dt: f32,
    host: &'a dyn Host,
    render_requested: bool,
    cancelled: bool,
}

impl<'a> FrameContext<'a> {
    pub(crate) fn new(dt: f32, host: &'a dyn Host) -> Self {
        Self {
            dt,
            host,
            render_requested: false,
            cancelled: false,
        }
    }

    /// Seconds since the previous frame, as reported by the host.
    pub fn dt(&self) -> f32 {
        self.dt
    }

    pub fn host(&self) -> &dyn Host {
        self.host
    }

    pub fn draw_canvas(&self, canvas_id: &str, pixels: &CanvasPixels<'_>) {
        self.host.draw_canvas(canvas_id, pixels);
    }

    /// Re-render after this frame.
    pub fn request_render(&mut self) {
        self.render_requested = true;
    }

    /// Unregister this callback once it returns.
    pub fn cancel(&mut self) {
        self.cancelled = true;
    }
}

type FrameCallback<C> = Box<dyn FnMut(&mut C, &mut FrameContext<'_>)>;

/// Outcome of one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameOutcome {
    /// A callback was registered under the id and ran.
    pub ran: bool,
    pub render_requested: bool,
    pub cancelled: bool,
}

pub struct AnimationFrames<C> {
    slots: Vec<Option<FrameCallback<C>>>,
}

impl<C> AnimationFrames<C> {
    pub fn new() -> Self {
        Self { slots: Vec::new() }
    }

    /// Store a callback and return its id. The caller tells the host.
    pub fn register<F>(&mut self, callback: F) -> FrameCallbackId
    where
        F: FnMut(&mut C, &mut FrameContext<'_>) + 'static,
    {
        let callback: FrameCallback<C> = Box::new(callback);
        let slot = match self.slots.iter().position(Option::is_none) {
            Some(slot) => {
                self.slots[slot] = Some(callback);
                slot
            }
            None => {
                self.slots.push(Some(callback));
                self.slots.len() - 1
            }
        };
        FrameCallbackId(slot as u32 + 1)
    }

    /// Drop a callback. Returns false if it wasn't registered.
    pub fn clear(&mut self, id: FrameCallbackId) -> bool {
        id.slot()
            .and_then(|slot| self.slots.get_mut(slot))
            .and_then(Option::take)
            .is_some()
    }

    pub fn is_active(&self, id: FrameCallbackId) -> bool {
        id.slot()
            .and_then(|slot| self.slots.get(slot))
            .is_some_and(Option::is_some)
    }

    pub fn active(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// Run one frame for `id`.
    ///
    /// An id that was never issued is a host error. A cleared id is not: the host
    /// may already have queued the frame.
    pub(crate) fn invoke(
        &mut self,
        id: FrameCallbackId,
        component: &mut C,
        ctx: &mut FrameContext<'_>,
    ) -> Result<FrameOutcome> {
        let slot = id
            .slot()
            .and_then(|slot| self.slots.get_mut(slot))
            .ok_or(RuntimeError::UnknownFrameCallback(id.raw()))?;

        let Some(callback) = slot.as_mut() else {
            tracing::debug!(id = id.raw(), "frame for cleared callback");
            return Ok(FrameOutcome::default());
        };
        callback(component, ctx);
        if ctx.cancelled {
            *slot = None;
        }
        Ok(FrameOutcome {
            ran: true,
            render_requested: ctx.render_requested,
            cancelled: ctx.cancelled,
        })
    }
}

impl<C> Default for AnimationFrames<C> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingHost;

    #[derive(Default)]
    struct Clock {
        elapsed: f32,
        frames: u32,
    }

    #[test]
    fn test_ids_start_at_one_and_reuse_slots() {
        let mut frames = AnimationFrames::<Clock>::new();
        let a = frames.register(|_, _| {});
        let b = frames.register(|_, _| {});
        assert_eq!((a.raw(), b.raw()), (1, 2));

        assert!(frames.clear(a));
        assert!(!frames.clear(a));
        assert_eq!(frames.active(), 1);

        let c = frames.register(|_, _| {});
        assert_eq!(c, a);
        assert!(frames.is_active(c));
    }

    #[test]
    fn test_invoke_passes_dt_and_state() {
        let host = RecordingHost::new();
        let mut frames = AnimationFrames::<Clock>::new();
        let id = frames.register(|clock, ctx| {
            clock.elapsed += ctx.dt();
            clock.frames += 1;
            if clock.frames == 2 {
                ctx.request_render();
            }
        });

        let mut clock = Clock::default();
        let first = frames
            .invoke(id, &mut clock, &mut FrameContext::new(0.5, &host))
            .unwrap();
        assert!(first.ran && !first.render_requested);
        let second = frames
            .invoke(id, &mut clock, &mut FrameContext::new(0.25, &host))
            .unwrap();
        assert!(second.render_requested);
        assert_eq!(clock.frames, 2);
        assert_eq!(clock.elapsed, 0.75);
    }

    #[test]
    fn test_cancel_from_inside() {
        let host = RecordingHost::new();
        let mut frames = AnimationFrames::<Clock>::new();
        let id = frames.register(|_, ctx| ctx.cancel());
        let mut clock = Clock::default();
        let outcome = frames
            .invoke(id, &mut clock, &mut FrameContext::new(0.0, &host))
            .unwrap();
        assert!(outcome.cancelled);
        assert!(!frames.is_active(id));

        // Late frame after cancel is harmless.
        let late = frames
            .invoke(id, &mut clock, &mut FrameContext::new(0.0, &host))
            .unwrap();
        assert!(!late.ran);
    }

    #[test]
    fn test_unknown_id() {
        let host = RecordingHost::new();
        let mut frames = AnimationFrames::<Clock>::new();
        let mut clock = Clock::default();
        for raw in [0, 5] {
            let err = frames
                .invoke(FrameCallbackId::from_raw(raw), &mut clock, &mut FrameContext::new(0.0, &host))
                .unwrap_err();
            assert_eq!(err, RuntimeError::UnknownFrameCallback(raw));
        }
    }
}

//! Headless host for driving a [`crate::Runtime`] outside a browser.
//!
//! Records everything the runtime asks of its host so tests (and native
//! embedders) can assert on it.

use std::cell::{Cell, RefCell};

use crate::animation::FrameCallbackId;
use crate::host::{CanvasPixels, Host};

/// One `draw_canvas` call, with the pixels copied out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrawnCanvas {
    pub id: String,
    pub width: u32,
    pub height: u32,
    pub stride: u32,
    pub pixels: Vec<u32>,
}

#[derive(Debug, Default)]
pub struct RecordingHost {
    output: RefCell<Vec<u8>>,
    render_requests: Cell<u32>,
    frames: RefCell<Vec<FrameCallbackId>>,
    canvases: RefCell<Vec<DrawnCanvas>>,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn render_requests(&self) -> u32 {
        self.render_requests.get()
    }

    /// Everything written to the byte sink, lossily decoded.
    pub fn output(&self) -> String {
        String::from_utf8_lossy(&self.output.borrow()).into_owned()
    }

    /// Callbacks currently registered with the host, in registration order.
    pub fn active_frames(&self) -> Vec<FrameCallbackId> {
        self.frames.borrow().clone()
    }

    pub fn drawn_canvases(&self) -> Vec<DrawnCanvas> {
        self.canvases.borrow().clone()
    }
}

impl Host for RecordingHost {
    fn write(&self, bytes: &[u8]) {
        self.output.borrow_mut().extend_from_slice(bytes);
    }

    fn request_render(&self) {
        self.render_requests.set(self.render_requests.get() + 1);
    }

    fn on_animation_frame(&self, callback: FrameCallbackId) {
        self.frames.borrow_mut().push(callback);
    }

    fn clear_animation_frame(&self, callback: FrameCallbackId) {
        self.frames.borrow_mut().retain(|&id| id != callback);
    }

    fn draw_canvas(&self, canvas_id: &str, pixels: &CanvasPixels<'_>) {
        self.canvases.borrow_mut().push(DrawnCanvas {
            id: canvas_id.to_string(),
            width: pixels.width(),
            height: pixels.height(),
            stride: pixels.stride(),
            pixels: pixels.pixels().to_vec(),
        });
    }
}

//! Host imports.
//!
//! The host provides five functions. The module calls them and never expects
//! anything back:
//!
//! ```text
//! platform_write(ptr, len)            byte sink (logs, panic messages)
//! platform_rerender()                 "please call render_component again"
//! platform_on_animation_frame(id)     start calling invoke_animation_frame_callback(id, dt)
//! platform_clear_animation_frame(id)  stop doing that
//! platform_draw_canvas(id, canvas)    blit a pixel buffer into a canvas element
//! ```
//!
//! [`Host`] abstracts them so the runtime can be driven natively in tests
//! (see [`crate::testing::RecordingHost`]).

use crate::animation::FrameCallbackId;
use crate::error::{Result, RuntimeError};

pub trait Host {
    /// Raw bytes for the host's output sink.
    fn write(&self, bytes: &[u8]);

    /// Ask the host to run another render cycle.
    fn request_render(&self);

    fn on_animation_frame(&self, callback: FrameCallbackId);

    fn clear_animation_frame(&self, callback: FrameCallbackId);

    fn draw_canvas(&self, canvas_id: &str, pixels: &CanvasPixels<'_>);
}

// =============================================================================
// CANVAS HAND-OFF
// =============================================================================

/// 32-bit pixels laid out row by row, `stride` pixels apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanvasPixels<'a> {
    pixels: &'a [u32],
    width: u32,
    height: u32,
    stride: u32,
}

impl<'a> CanvasPixels<'a> {
    /// Tightly packed rows.
    pub fn new(pixels: &'a [u32], width: u32, height: u32) -> Result<Self> {
        Self::with_stride(pixels, width, height, width)
    }

    pub fn with_stride(pixels: &'a [u32], width: u32, height: u32, stride: u32) -> Result<Self> {
        let required = (stride as usize).saturating_mul(height as usize);
        if stride < width || pixels.len() < required {
            return Err(RuntimeError::InvalidCanvas {
                width,
                height,
                stride,
                required,
                len: pixels.len(),
            });
        }
        Ok(Self {
            pixels,
            width,
            height,
            stride,
        })
    }

    pub fn pixels(&self) -> &'a [u32] {
        self.pixels
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn stride(&self) -> u32 {
        self.stride
    }

    /// Record the host reads: four little-endian u32 words.
    pub fn to_raw(&self) -> RawCanvas {
        RawCanvas {
            pixels: self.pixels.as_ptr(),
            width: self.width,
            height: self.height,
            stride: self.stride,
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct RawCanvas {
    pub pixels: *const u32,
    pub width: u32,
    pub height: u32,
    pub stride: u32,
}

// =============================================================================
// PLATFORM HOST
// =============================================================================

/// The host the module was loaded into.
///
/// On wasm32 this calls the imported `platform_*` functions. Elsewhere output goes
/// to stderr and the other calls are dropped.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlatformHost;

#[cfg(target_arch = "wasm32")]
mod imports {
    use super::RawCanvas;

    unsafe extern "C" {
        pub fn platform_write(buffer: *const u8, len: usize);
        pub fn platform_rerender();
        pub fn platform_on_animation_frame(callback: u32);
        pub fn platform_clear_animation_frame(callback: u32);
        pub fn platform_draw_canvas(canvas_id: *const u8, canvas: *const RawCanvas);
    }
}

#[cfg(target_arch = "wasm32")]
impl Host for PlatformHost {
    fn write(&self, bytes: &[u8]) {
        // SAFETY: the host only reads `len` bytes from the pointer.
        unsafe { imports::platform_write(bytes.as_ptr(), bytes.len()) }
    }

    fn request_render(&self) {
        unsafe { imports::platform_rerender() }
    }

    fn on_animation_frame(&self, callback: FrameCallbackId) {
        unsafe { imports::platform_on_animation_frame(callback.raw()) }
    }

    fn clear_animation_frame(&self, callback: FrameCallbackId) {
        unsafe { imports::platform_clear_animation_frame(callback.raw()) }
    }

    fn draw_canvas(&self, canvas_id: &str, pixels: &CanvasPixels<'_>) {
        let Ok(id) = std::ffi::CString::new(canvas_id) else {
            tracing::warn!(canvas_id, "canvas id contains NUL, not drawn");
            return;
        };
        let raw = pixels.to_raw();
        // SAFETY: both pointers stay valid for the duration of the call; the host
        // copies the pixels out before returning.
        unsafe { imports::platform_draw_canvas(id.as_ptr().cast(), &raw) }
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl Host for PlatformHost {
    fn write(&self, bytes: &[u8]) {
        use std::io::Write;
        let _ = std::io::stderr().write_all(bytes);
    }

    fn request_render(&self) {}

    fn on_animation_frame(&self, _callback: FrameCallbackId) {}

    fn clear_animation_frame(&self, _callback: FrameCallbackId) {}

    fn draw_canvas(&self, _canvas_id: &str, _pixels: &CanvasPixels<'_>) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canvas_packed() {
        let pixels = vec![0u32; 12];
        let canvas = CanvasPixels::new(&pixels, 4, 3).unwrap();
        assert_eq!(canvas.stride(), 4);
        let raw = canvas.to_raw();
        assert_eq!(raw.pixels, pixels.as_ptr());
        assert_eq!((raw.width, raw.height, raw.stride), (4, 3, 4));
    }

    #[test]
    fn test_canvas_too_small() {
        let pixels = vec![0u32; 11];
        assert_eq!(
            CanvasPixels::new(&pixels, 4, 3),
            Err(RuntimeError::InvalidCanvas {
                width: 4,
                height: 3,
                stride: 4,
                required: 12,
                len: 11
            })
        );
    }

    #[test]
    fn test_canvas_stride_below_width() {
        let pixels = vec![0u32; 64];
        assert!(CanvasPixels::with_stride(&pixels, 8, 2, 4).is_err());
        assert!(CanvasPixels::with_stride(&pixels, 4, 2, 8).is_ok());
    }

    #[test]
    fn test_raw_canvas_layout() {
        // pointer, then three u32 words
        assert_eq!(std::mem::offset_of!(RawCanvas, width), size_of::<*const u32>());
        assert_eq!(
            std::mem::offset_of!(RawCanvas, stride),
            size_of::<*const u32>() + 8
        );
    }
}

//! Host-facing exports.
//!
//! An application crate builds as a `cdylib` and calls [`crate::export_component!`]
//! once with its component type. That expands to a `spark_exports` module holding
//! the `extern "C"` entry points below, each a thin call into this module.
//!
//! ```text
//! render_component() -> u32                      root offset
//! init_component()
//! invoke_on_click(index)
//! invoke_on_click_generation(index, generation)
//! invoke_on_change(index, text)
//! invoke_on_change_generation(index, generation, text)
//! invoke_animation_frame_callback(id, dt)
//! get_input_buffer() -> *mut u8
//! get_input_buffer_capacity() -> u32
//! get_element_layout() -> *const u32
//! get_layout_word_size() -> u32
//! get_layout_version() -> u32
//! get_arena_base() -> *const u8
//! get_render_generation() -> u32
//! ```
//!
//! The runtime lives in a thread-local `RefCell`, created on first use. Every
//! call borrows it for exactly as long as it needs it; requests to the host to
//! re-render go out only after the borrow is released, because a host may call
//! `render_component` from inside `platform_rerender`. Any error traps.

use std::cell::RefCell;
use std::thread::LocalKey;

use crate::animation::FrameCallbackId;
use crate::config::RuntimeConfig;
use crate::dispatch::read_host_text;
use crate::error::{Result, RuntimeError, trap};
use crate::host::{Host, PlatformHost};
use crate::layout::{ELEMENT_LAYOUT, LAYOUT_SCHEMA_VERSION, LAYOUT_WORD_SIZE};
use crate::logging;
use crate::registry::Handle;
use crate::runtime::{Component, Runtime};

/// Storage for the module's single runtime.
pub type RuntimeSlot<C> = RefCell<Option<Runtime<C>>>;

pub type ConfigFn = fn() -> RuntimeConfig;

fn boot<C: Component + Default>(config: RuntimeConfig) -> Result<Runtime<C>> {
    logging::install_panic_hook();
    logging::init(&config.log_filter)?;
    tracing::debug!(
        fields = ?ELEMENT_LAYOUT.fields(),
        version = LAYOUT_SCHEMA_VERSION,
        "element layout"
    );
    Runtime::new(C::default(), PlatformHost, config)
}

/// Borrow the runtime, creating it on first use. Errors and re-entrant calls trap.
pub fn with_runtime<C, R>(
    slot: &'static LocalKey<RuntimeSlot<C>>,
    config: ConfigFn,
    f: impl FnOnce(&mut Runtime<C>) -> Result<R>,
) -> R
where
    C: Component + Default,
{
    slot.with(|cell| {
        let Ok(mut guard) = cell.try_borrow_mut() else {
            trap(&RuntimeError::Reentrant)
        };
        let runtime = guard.get_or_insert_with(|| boot(config()).unwrap_or_else(|err| trap(&err)));
        f(runtime).unwrap_or_else(|err| trap(&err))
    })
}

/// Count the request, release the runtime, then tell the host.
fn signal_render<C: Component + Default>(slot: &'static LocalKey<RuntimeSlot<C>>, config: ConfigFn) {
    with_runtime(slot, config, |rt| {
        rt.stats.render_requests += 1;
        Ok(())
    });
    PlatformHost.request_render();
}

fn handle<C: Component>(rt: &Runtime<C>, index: u32, generation: Option<u32>) -> Handle {
    Handle::new(index, generation.unwrap_or_else(|| rt.generation()))
}

// =============================================================================
// RENDER
// =============================================================================

pub fn render_component<C: Component + Default>(slot: &'static LocalKey<RuntimeSlot<C>>, config: ConfigFn) -> u32 {
    with_runtime(slot, config, |rt| rt.render().map(|rendered| rendered.root.offset()))
}

pub fn init_component<C: Component + Default>(slot: &'static LocalKey<RuntimeSlot<C>>, config: ConfigFn) {
    with_runtime(slot, config, |rt| {
        rt.init();
        Ok(())
    });
}

// =============================================================================
// EVENTS
// =============================================================================

/// Click dispatch. `generation` of `None` means "the current tree".
pub fn invoke_on_click<C: Component + Default>(
    slot: &'static LocalKey<RuntimeSlot<C>>,
    config: ConfigFn,
    index: u32,
    generation: Option<u32>,
) {
    let outcome = with_runtime(slot, config, |rt| rt.dispatch_click(handle(rt, index, generation)));
    if outcome.is_handled() {
        signal_render(slot, config);
    }
}

/// Change dispatch.
///
/// # Safety
/// `text` must point at NUL-terminated bytes readable up to the terminator or
/// the input buffer capacity, whichever comes first.
pub unsafe fn invoke_on_change<C: Component + Default>(
    slot: &'static LocalKey<RuntimeSlot<C>>,
    config: ConfigFn,
    index: u32,
    generation: Option<u32>,
    text: *const u8,
) {
    let capacity = with_runtime(slot, config, |rt| Ok(rt.input().capacity()));
    // Copied out before the runtime is borrowed again; `text` usually points into
    // the runtime's own scratch region.
    let text = unsafe { read_host_text(text, capacity) }.unwrap_or_else(|err| trap(&err));
    let outcome = with_runtime(slot, config, |rt| rt.dispatch_change(handle(rt, index, generation), &text));
    if outcome.is_handled() {
        signal_render(slot, config);
    }
}

pub fn invoke_animation_frame_callback<C: Component + Default>(
    slot: &'static LocalKey<RuntimeSlot<C>>,
    config: ConfigFn,
    id: u32,
    dt: f32,
) {
    let outcome = with_runtime(slot, config, |rt| rt.animation_frame(FrameCallbackId::from_raw(id), dt));
    if outcome.render_requested {
        signal_render(slot, config);
    }
}

// =============================================================================
// MEMORY
// =============================================================================

pub fn input_buffer<C: Component + Default>(slot: &'static LocalKey<RuntimeSlot<C>>, config: ConfigFn) -> *mut u8 {
    with_runtime(slot, config, |rt| Ok(rt.input_buffer_ptr()))
}

pub fn input_buffer_capacity<C: Component + Default>(
    slot: &'static LocalKey<RuntimeSlot<C>>,
    config: ConfigFn,
) -> u32 {
    // Config validation keeps the capacity within u32.
    with_runtime(slot, config, |rt| Ok(rt.input().capacity() as u32))
}

pub fn arena_base<C: Component + Default>(slot: &'static LocalKey<RuntimeSlot<C>>, config: ConfigFn) -> *const u8 {
    with_runtime(slot, config, |rt| Ok(rt.arena_base()))
}

pub fn render_generation<C: Component + Default>(slot: &'static LocalKey<RuntimeSlot<C>>, config: ConfigFn) -> u32 {
    with_runtime(slot, config, |rt| Ok(rt.generation()))
}

pub fn element_layout() -> *const u32 {
    ELEMENT_LAYOUT.as_words().as_ptr()
}

pub fn layout_word_size() -> u32 {
    LAYOUT_WORD_SIZE
}

pub fn layout_version() -> u32 {
    LAYOUT_SCHEMA_VERSION
}

// =============================================================================
// MACRO
// =============================================================================

/// Export a [`Component`] as a wasm module.
///
/// ```ignore
/// #[derive(Default)]
/// struct TodoList { /* ... */ }
///
/// impl spark_wasm::Component for TodoList { /* ... */ }
///
/// spark_wasm::export_component!(TodoList);
/// // or, with a custom configuration:
/// spark_wasm::export_component!(TodoList, RuntimeConfig::default().with_arena_capacity(1 << 20));
/// ```
///
/// The component must implement `Default`; the runtime builds it on the first
/// host call. Invoke the macro once per crate.
#[macro_export]
macro_rules! export_component {
    ($component:ty) => {
        $crate::export_component!($component, $crate::RuntimeConfig::default());
    };
    ($component:ty, $config:expr) => {
        pub mod spark_exports {
            #[allow(unused_imports)]
            use super::*;

            ::std::thread_local! {
                static SPARK_RUNTIME: $crate::ffi::RuntimeSlot<$component> =
                    const { ::core::cell::RefCell::new(::core::option::Option::None) };
            }

            fn spark_config() -> $crate::RuntimeConfig {
                $config
            }

            /// Run one render cycle. Returns the root record's arena offset.
            #[unsafe(no_mangle)]
            pub extern "C" fn render_component() -> u32 {
                $crate::ffi::render_component(&SPARK_RUNTIME, spark_config)
            }

            /// Run one-time setup. Rendering does this implicitly.
            #[unsafe(no_mangle)]
            pub extern "C" fn init_component() {
                $crate::ffi::init_component(&SPARK_RUNTIME, spark_config)
            }

            #[unsafe(no_mangle)]
            pub extern "C" fn invoke_on_click(index: u32) {
                $crate::ffi::invoke_on_click(&SPARK_RUNTIME, spark_config, index, None)
            }

            #[unsafe(no_mangle)]
            pub extern "C" fn invoke_on_click_generation(index: u32, generation: u32) {
                $crate::ffi::invoke_on_click(&SPARK_RUNTIME, spark_config, index, Some(generation))
            }

            /// # Safety
            /// `text` must be NUL-terminated, typically inside `get_input_buffer()`.
            #[unsafe(no_mangle)]
            pub unsafe extern "C" fn invoke_on_change(index: u32, text: *const u8) {
                unsafe { $crate::ffi::invoke_on_change(&SPARK_RUNTIME, spark_config, index, None, text) }
            }

            /// # Safety
            /// `text` must be NUL-terminated, typically inside `get_input_buffer()`.
            #[unsafe(no_mangle)]
            pub unsafe extern "C" fn invoke_on_change_generation(index: u32, generation: u32, text: *const u8) {
                unsafe {
                    $crate::ffi::invoke_on_change(&SPARK_RUNTIME, spark_config, index, Some(generation), text)
                }
            }

            #[unsafe(no_mangle)]
            pub extern "C" fn invoke_animation_frame_callback(id: u32, dt: f32) {
                $crate::ffi::invoke_animation_frame_callback(&SPARK_RUNTIME, spark_config, id, dt)
            }

            #[unsafe(no_mangle)]
            pub extern "C" fn get_input_buffer() -> *mut u8 {
                $crate::ffi::input_buffer(&SPARK_RUNTIME, spark_config)
            }

            #[unsafe(no_mangle)]
            pub extern "C" fn get_input_buffer_capacity() -> u32 {
                $crate::ffi::input_buffer_capacity(&SPARK_RUNTIME, spark_config)
            }

            #[unsafe(no_mangle)]
            pub extern "C" fn get_element_layout() -> *const u32 {
                $crate::ffi::element_layout()
            }

            #[unsafe(no_mangle)]
            pub extern "C" fn get_layout_word_size() -> u32 {
                $crate::ffi::layout_word_size()
            }

            #[unsafe(no_mangle)]
            pub extern "C" fn get_layout_version() -> u32 {
                $crate::ffi::layout_version()
            }

            #[unsafe(no_mangle)]
            pub extern "C" fn get_arena_base() -> *const u8 {
                $crate::ffi::arena_base(&SPARK_RUNTIME, spark_config)
            }

            #[unsafe(no_mangle)]
            pub extern "C" fn get_render_generation() -> u32 {
                $crate::ffi::render_generation(&SPARK_RUNTIME, spark_config)
            }

            /// Run `f` against the live runtime. For native hosts and tests.
            pub fn with_runtime<R>(
                f: impl FnOnce(&mut $crate::Runtime<$component>) -> $crate::Result<R>,
            ) -> R {
                $crate::ffi::with_runtime(&SPARK_RUNTIME, spark_config, f)
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_exports() {
        let words = element_layout();
        // SAFETY: points at the static descriptor.
        let version = unsafe { words.read() };
        assert_eq!(version, LAYOUT_SCHEMA_VERSION);
        assert_eq!(layout_word_size(), 4);
        assert_eq!(layout_version(), LAYOUT_SCHEMA_VERSION);
    }
}

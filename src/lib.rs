//! # spark-wasm
//!
//! Component runtime for WebAssembly hosts.
//!
//! A component renders into a bump arena in the module's linear memory. The host
//! reads the finished tree straight out of that memory using a published table of
//! field offsets, and reports user events back by element index.
//!
//! ## Architecture
//!
//! ```text
//!                 ┌──────────── wasm linear memory ─────────────┐
//! render_component│  Arena: ElementRecord, strings, sequences   │◄── host decodes via
//!   ─────────────►│  EnvArena: handler closures                 │    get_element_layout()
//!                 │  Registry: index → record + handler         │
//!                 └─────────────────────────────────────────────┘
//! invoke_on_click(i) / invoke_on_change(i, text)
//!   ─────────────► Registry[i] ─► handler(&mut component) ─► platform_rerender()
//! ```
//!
//! Every render discards the previous tree wholesale: the arenas are reset, the
//! registry is emptied and its generation advances.
//!
//! ## Modules
//!
//! - [`arena`] - Bump arena, arena-relative references, growable sequences
//! - [`element`] - Element records and the [`Ui`] builder
//! - [`registry`] - Index-addressable element registry with handlers
//! - [`runtime`] - Render cycle controller and the [`Component`] trait
//! - [`dispatch`] - Event dispatch bridge and input staging
//! - [`layout`] - Published field-offset table and a reference decoder
//! - [`animation`] - Per-frame callbacks
//! - [`host`] - Imported host functions
//! - [`ffi`] - `extern "C"` exports via [`export_component!`]

pub mod animation;
pub mod arena;
pub mod config;
pub mod dispatch;
pub mod element;
pub mod error;
pub mod ffi;
pub mod host;
pub mod layout;
pub mod logging;
pub mod registry;
pub mod runtime;
pub mod testing;

pub use animation::{FrameCallbackId, FrameContext, FrameOutcome};
pub use arena::{Arena, ArenaRef, NULL_REF, SeqRef, StrRef};
pub use config::RuntimeConfig;
pub use dispatch::{Dispatch, InputBuffer};
pub use element::{AttributeRecord, ElementKind, ElementRecord, ElementRef, Payload, Ui};
pub use error::{ErrorClass, Result, RuntimeError};
pub use host::{CanvasPixels, Host, PlatformHost};
pub use layout::{
    DecodedElement, DecodedPayload, ELEMENT_LAYOUT, LAYOUT_SCHEMA_VERSION, LayoutDescriptor,
};
pub use registry::Handle;
pub use runtime::{Component, CycleState, InitContext, RenderStats, Rendered, Runtime, RuntimeFlags};

//! Render Cycle Controller.
//!
//! A [`Runtime`] owns everything one component needs across host calls: the two
//! arenas, the registry, the input buffer, frame callbacks, the host and the
//! component itself.
//!
//! ```text
//!            init (once)
//!   ┌──────────────────────┐
//!   ▼                      │
//! Idle ──render()──► Building ──ok──► Idle   (tree + registry published)
//!                        │
//!                        └──err──► Idle      (arena + registry discarded)
//! ```
//!
//! Entering `Building` resets the arenas and the registry together, so a record,
//! its registry entry and its handler environment always come from the same
//! cycle. Dispatch (see [`crate::dispatch`]) only runs while `Idle`, which the
//! `&mut self` receivers enforce.

use bitflags::bitflags;

use crate::animation::{AnimationFrames, FrameCallbackId, FrameContext, FrameOutcome};
use crate::arena::{Arena, ArenaRef, EnvArena};
use crate::config::RuntimeConfig;
use crate::dispatch::InputBuffer;
use crate::element::{ElementRecord, ElementRef, Ui};
use crate::error::Result;
use crate::host::{Host, PlatformHost};
use crate::layout::{DecodedElement, Decoder, ELEMENT_LAYOUT};
use crate::registry::{Handle, Registry};

// =============================================================================
// COMPONENT
// =============================================================================

/// Application state plus the function that turns it into a tree.
///
/// `render` runs once per cycle and must build the whole tree; nothing from a
/// previous cycle is available. Handlers bound in it receive `&mut Self` when
/// the host dispatches an event.
pub trait Component: Sized + 'static {
    /// One-time setup before the first render (e.g. register frame callbacks).
    fn init(&mut self, _ctx: &mut InitContext<'_, Self>) {}

    fn render<'r>(&self, ui: &Ui<'r, Self>) -> Result<ElementRef<'r>>;
}

/// Handed to [`Component::init`].
pub struct InitContext<'a, C> {
    frames: &'a mut AnimationFrames<C>,
    host: &'a dyn Host,
}

impl<C> InitContext<'_, C> {
    /// Ask the host to call `callback` every animation frame.
    pub fn on_animation_frame<F>(&mut self, callback: F) -> FrameCallbackId
    where
        F: FnMut(&mut C, &mut FrameContext<'_>) + 'static,
    {
        let id = self.frames.register(callback);
        self.host.on_animation_frame(id);
        id
    }

    pub fn clear_animation_frame(&mut self, id: FrameCallbackId) {
        if self.frames.clear(id) {
            self.host.clear_animation_frame(id);
        }
    }

    pub fn host(&self) -> &dyn Host {
        self.host
    }
}

// =============================================================================
// STATE
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    Building,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct RuntimeFlags: u8 {
        /// `Component::init` has run.
        const INITIALIZED = 1 << 0;
        /// The current registry holds a complete tree.
        const RENDERED = 1 << 1;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RenderStats {
    pub renders: u64,
    pub aborted: u64,
    pub dispatched: u64,
    pub ignored: u64,
    pub frames: u64,
    pub render_requests: u64,
}

/// Result of a completed cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rendered {
    pub root: ArenaRef<ElementRecord>,
    pub root_index: u32,
    pub generation: u32,
    pub element_count: u32,
    pub arena_used: usize,
}

// =============================================================================
// RUNTIME
// =============================================================================

pub struct Runtime<C: Component, H: Host = PlatformHost> {
    config: RuntimeConfig,
    pub(crate) arena: Arena,
    pub(crate) envs: EnvArena,
    pub(crate) registry: Registry<C>,
    pub(crate) input: InputBuffer,
    frames: AnimationFrames<C>,
    host: H,
    pub(crate) component: C,
    state: CycleState,
    flags: RuntimeFlags,
    pub(crate) stats: RenderStats,
    last: Option<Rendered>,
}

impl<C: Component, H: Host> Runtime<C, H> {
    pub fn new(component: C, host: H, config: RuntimeConfig) -> Result<Self> {
        config.validate()?;
        tracing::debug!(
            arena = config.arena_capacity,
            env = config.env_capacity,
            input = config.input_buffer_capacity,
            "runtime created"
        );
        Ok(Self {
            arena: Arena::new(config.arena_capacity),
            envs: EnvArena::new(config.env_capacity),
            registry: Registry::with_capacity(config.registry_capacity),
            input: InputBuffer::new(config.input_buffer_capacity),
            frames: AnimationFrames::new(),
            host,
            component,
            state: CycleState::Idle,
            flags: RuntimeFlags::empty(),
            stats: RenderStats::default(),
            last: None,
            config,
        })
    }

    /// Run `Component::init` if it hasn't run yet.
    pub fn init(&mut self) {
        if self.flags.contains(RuntimeFlags::INITIALIZED) {
            return;
        }
        self.flags.insert(RuntimeFlags::INITIALIZED);
        let mut ctx = InitContext {
            frames: &mut self.frames,
            host: &self.host,
        };
        self.component.init(&mut ctx);
        tracing::debug!(frames = self.frames.active(), "component initialized");
    }

    /// Build a fresh tree.
    ///
    /// Any error aborts the whole cycle: nothing built so far stays reachable and
    /// every index the host holds becomes invalid.
    pub fn render(&mut self) -> Result<Rendered> {
        self.init();
        self.begin_cycle();
        let _span = tracing::debug_span!("render", generation = self.registry.generation()).entered();

        let built = {
            let ui = Ui::new(&self.arena, &self.envs, &self.registry);
            self.component.render(&ui).and_then(|root| {
                ui.check(&root)?;
                Ok((root.record(), root.index(), ui.element_count()))
            })
        };
        self.state = CycleState::Idle;

        match built {
            Ok((root, root_index, element_count)) => {
                let rendered = Rendered {
                    root,
                    root_index,
                    generation: self.registry.generation(),
                    element_count: element_count as u32,
                    arena_used: self.arena.used(),
                };
                self.flags.insert(RuntimeFlags::RENDERED);
                self.stats.renders += 1;
                self.last = Some(rendered);
                tracing::debug!(
                    elements = rendered.element_count,
                    arena_used = rendered.arena_used,
                    env_used = self.envs.used(),
                    "render complete"
                );
                Ok(rendered)
            }
            Err(err) => {
                self.begin_cycle();
                self.state = CycleState::Idle;
                self.stats.aborted += 1;
                tracing::warn!(%err, "render aborted");
                Err(err)
            }
        }
    }

    fn begin_cycle(&mut self) {
        self.state = CycleState::Building;
        self.arena.reset();
        self.envs.reset();
        self.registry.reset();
        self.flags.remove(RuntimeFlags::RENDERED);
        self.last = None;
    }

    /// Tell the host another cycle is wanted.
    pub fn request_render(&mut self) {
        self.stats.render_requests += 1;
        self.host.request_render();
    }

    // =========================================================================
    // Animation frames
    // =========================================================================

    pub fn on_animation_frame<F>(&mut self, callback: F) -> FrameCallbackId
    where
        F: FnMut(&mut C, &mut FrameContext<'_>) + 'static,
    {
        let id = self.frames.register(callback);
        self.host.on_animation_frame(id);
        id
    }

    pub fn clear_animation_frame(&mut self, id: FrameCallbackId) {
        if self.frames.clear(id) {
            self.host.clear_animation_frame(id);
        }
    }

    /// Run one frame without signalling the host for a render.
    pub fn animation_frame(&mut self, id: FrameCallbackId, dt: f32) -> Result<FrameOutcome> {
        let mut ctx = FrameContext::new(dt, &self.host);
        let outcome = self.frames.invoke(id, &mut self.component, &mut ctx)?;
        if outcome.cancelled {
            self.host.clear_animation_frame(id);
        }
        if outcome.ran {
            self.stats.frames += 1;
        }
        Ok(outcome)
    }

    /// Run one frame and request a render if the callback asked for one.
    pub fn invoke_animation_frame(&mut self, id: FrameCallbackId, dt: f32) -> Result<FrameOutcome> {
        let outcome = self.animation_frame(id, dt)?;
        if outcome.render_requested {
            self.request_render();
        }
        Ok(outcome)
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    pub fn generation(&self) -> u32 {
        self.registry.generation()
    }

    pub fn handle(&self, index: u32) -> Handle {
        self.registry.handle(index)
    }

    pub fn element_count(&self) -> usize {
        self.registry.len()
    }

    /// Copy of the record at a registry index.
    pub fn record(&self, index: u32) -> Result<ElementRecord> {
        let record = self.registry.record(self.registry.handle(index))?;
        self.arena.read(record)
    }

    /// Decode a tree through the published layout, as the host would.
    pub fn decode(&mut self, root: ArenaRef<ElementRecord>) -> Result<DecodedElement> {
        Decoder::new(self.arena.bytes(), &ELEMENT_LAYOUT)?.element(root.offset())
    }

    pub fn last_render(&self) -> Option<Rendered> {
        self.last
    }

    pub fn memory(&mut self) -> &[u8] {
        self.arena.bytes()
    }

    pub fn arena(&self) -> &Arena {
        &self.arena
    }

    pub fn arena_base(&self) -> *const u8 {
        self.arena.base_ptr()
    }

    pub fn input(&self) -> &InputBuffer {
        &self.input
    }

    /// Scratch region the host writes outbound text into.
    pub fn input_buffer_ptr(&mut self) -> *mut u8 {
        self.input.scratch_ptr()
    }

    pub fn state(&self) -> CycleState {
        self.state
    }

    pub fn flags(&self) -> RuntimeFlags {
        self.flags
    }

    pub fn stats(&self) -> RenderStats {
        self.stats
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn component(&self) -> &C {
        &self.component
    }

    pub fn component_mut(&mut self) -> &mut C {
        &mut self.component
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RuntimeError;
    use crate::testing::RecordingHost;

    #[derive(Default)]
    struct Greeting {
        name: String,
        inits: u32,
        fail: bool,
    }

    impl Component for Greeting {
        fn init(&mut self, _ctx: &mut InitContext<'_, Self>) {
            self.inits += 1;
        }

        fn render<'r>(&self, ui: &Ui<'r, Self>) -> Result<ElementRef<'r>> {
            let title = ui.text_element("h1", "Hello")?;
            let name = ui.text_element("p", &self.name)?;
            if self.fail {
                ui.attributes(name, &["class"])?;
            }
            ui.element("div", &[title, name])
        }
    }

    fn create_test_runtime(component: Greeting) -> Runtime<Greeting, RecordingHost> {
        Runtime::new(component, RecordingHost::new(), RuntimeConfig::default().with_arena_capacity(4096))
            .unwrap()
    }

    #[test]
    fn test_render_returns_root_and_counts() {
        let mut rt = create_test_runtime(Greeting {
            name: "world".into(),
            ..Default::default()
        });
        let rendered = rt.render().unwrap();
        assert_eq!(rendered.root_index, 2);
        assert_eq!(rendered.element_count, 3);
        assert_eq!(rendered.generation, rt.generation());
        assert_eq!(rt.state(), CycleState::Idle);
        assert!(rt.flags().contains(RuntimeFlags::RENDERED));

        for i in 0..3 {
            assert_eq!(rt.record(i).unwrap().index, i);
        }
    }

    #[test]
    fn test_init_runs_once() {
        let mut rt = create_test_runtime(Greeting::default());
        rt.init();
        rt.render().unwrap();
        rt.render().unwrap();
        rt.init();
        assert_eq!(rt.component().inits, 1);
    }

    #[test]
    fn test_consecutive_renders_reuse_arena() {
        let mut rt = create_test_runtime(Greeting {
            name: "same".into(),
            ..Default::default()
        });
        let first = rt.render().unwrap();
        let second = rt.render().unwrap();
        assert_eq!(first.root, second.root);
        assert_eq!(first.arena_used, second.arena_used);
        assert_eq!(second.generation, first.generation + 1);
        assert_eq!(rt.arena().peak(), first.arena_used);
    }

    #[test]
    fn test_failed_render_discards_cycle() {
        let mut rt = create_test_runtime(Greeting::default());
        rt.render().unwrap();
        rt.component_mut().fail = true;

        let err = rt.render().unwrap_err();
        assert_eq!(err, RuntimeError::OddAttributeCount { count: 1 });
        assert_eq!(rt.element_count(), 0);
        assert_eq!(rt.arena().used(), 0);
        assert_eq!(rt.last_render(), None);
        assert!(!rt.flags().contains(RuntimeFlags::RENDERED));
        assert_eq!(rt.stats().aborted, 1);
        assert!(matches!(rt.record(0), Err(RuntimeError::IndexOutOfRange { .. })));
    }

    #[test]
    fn test_exhausted_arena_aborts() {
        let mut rt = Runtime::new(
            Greeting {
                name: "x".repeat(200),
                ..Default::default()
            },
            RecordingHost::new(),
            RuntimeConfig::default().with_arena_capacity(128),
        )
        .unwrap();
        assert!(matches!(rt.render(), Err(RuntimeError::ArenaExhausted { .. })));
        assert_eq!(rt.element_count(), 0);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = Runtime::new(
            Greeting::default(),
            RecordingHost::new(),
            RuntimeConfig::default().with_arena_capacity(0),
        );
        assert!(matches!(result, Err(RuntimeError::InvalidConfig(_))));
    }

    #[test]
    fn test_decode_matches_component() {
        let mut rt = create_test_runtime(Greeting {
            name: "decoder".into(),
            ..Default::default()
        });
        let rendered = rt.render().unwrap();
        let tree = rt.decode(rendered.root).unwrap();
        let children = tree.children.unwrap();
        assert_eq!(children.len(), 2);
        assert_eq!(children[1].text.as_deref(), Some("decoder"));
    }
}

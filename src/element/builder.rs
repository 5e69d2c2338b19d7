//! Render-scope builder.
//!
//! A [`Ui`] exists only while a render cycle is building. Every constructor
//! allocates its record in the arena, appends it to the registry, and hands back
//! an [`ElementRef`] tied to the builder's lifetime, so no Rust reference can
//! outlive the cycle that produced it.
//!
//! Constructors return `Result` so a tree composes with `?`:
//!
//! ```ignore
//! let add = ui.class(ui.button("Add", |app: &mut TodoList| app.add())?, "primary")?;
//! ui.element("div", &[ui.text_element("h1", "Todos")?, add])
//! ```

use std::fmt;
use std::marker::PhantomData;

use super::{AttributeRecord, ElementKind, ElementRecord, Payload};
use crate::arena::{Arena, ArenaRef, EnvArena, NULL_REF, SeqRef, StrRef};
use crate::error::{Result, RuntimeError};
use crate::registry::{Handle, Handler, Registry, RegistryEntry};

/// Element built in the current render scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementRef<'r> {
    record: ArenaRef<ElementRecord>,
    index: u32,
    generation: u32,
    _scope: PhantomData<&'r ()>,
}

impl ElementRef<'_> {
    pub fn record(&self) -> ArenaRef<ElementRecord> {
        self.record
    }

    /// Registry position, the integer the host uses for dispatch.
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn handle(&self) -> Handle {
        Handle::new(self.index, self.generation)
    }
}

pub struct Ui<'r, S> {
    arena: &'r Arena,
    envs: &'r EnvArena,
    registry: &'r Registry<S>,
}

impl<'r, S: 'static> Ui<'r, S> {
    pub(crate) fn new(arena: &'r Arena, envs: &'r EnvArena, registry: &'r Registry<S>) -> Self {
        Self {
            arena,
            envs,
            registry,
        }
    }

    pub fn generation(&self) -> u32 {
        self.registry.generation()
    }

    /// Elements constructed so far in this cycle.
    pub fn element_count(&self) -> usize {
        self.registry.len()
    }

    // =========================================================================
    // Constructors
    // =========================================================================

    /// Generic element with a (possibly empty) list of children.
    pub fn element(&self, tag: &str, children: &[ElementRef<'r>]) -> Result<ElementRef<'r>> {
        let tag = self.arena.strdup(tag)?;
        let children = self.children(children)?;
        self.register(Payload::Generic { tag }, StrRef::NULL, children, None)
    }

    /// Generic element carrying text and no children.
    pub fn text_element(&self, tag: &str, text: &str) -> Result<ElementRef<'r>> {
        let tag = self.arena.strdup(tag)?;
        let text = self.arena.strdup(text)?;
        self.register(Payload::Generic { tag }, text, SeqRef::NULL, None)
    }

    /// Button that runs `on_click` against the component state when clicked.
    ///
    /// The closure is copied into the handler arena; capture indices or small
    /// values, not references.
    pub fn button<F>(&self, text: &str, on_click: F) -> Result<ElementRef<'r>>
    where
        F: Fn(&mut S) + Copy + 'static,
    {
        let env = self.envs.store(on_click)?;
        let text = self.arena.strdup(text)?;
        let children = self.arena.new_seq()?;
        let payload = Payload::Button {
            on_click: true,
            captured: env,
        };
        self.register(payload, text, children, Some(Handler::click::<F>(env)))
    }

    /// Button without a handler. Clicks on it are ignored.
    pub fn static_button(&self, text: &str) -> Result<ElementRef<'r>> {
        let text = self.arena.strdup(text)?;
        let children = self.arena.new_seq()?;
        let payload = Payload::Button {
            on_click: false,
            captured: NULL_REF,
        };
        self.register(payload, text, children, None)
    }

    /// Text input. `on_change` receives the host's text after it has been staged.
    pub fn input<F>(&self, placeholder: &str, on_change: F) -> Result<ElementRef<'r>>
    where
        F: Fn(&mut S, &str) + Copy + 'static,
    {
        let env = self.envs.store(on_change)?;
        let placeholder = self.arena.strdup(placeholder)?;
        let payload = Payload::Input {
            placeholder,
            on_change: true,
        };
        self.register(payload, StrRef::NULL, SeqRef::NULL, Some(Handler::change::<F>(env)))
    }

    /// Canvas the host sizes and later receives pixels for.
    pub fn canvas(&self, id: &str, width: u32, height: u32) -> Result<ElementRef<'r>> {
        let id = self.arena.strdup(id)?;
        self.register(Payload::Canvas { id, width, height }, StrRef::NULL, SeqRef::NULL, None)
    }

    fn register(
        &self,
        payload: Payload,
        text: StrRef,
        children: SeqRef<ElementRecord>,
        handler: Option<Handler<S>>,
    ) -> Result<ElementRef<'r>> {
        let index = self.registry.next_index()?;
        let generation = self.registry.generation();
        let record = self.arena.alloc(ElementRecord {
            text: text.offset(),
            children: children.offset(),
            ..ElementRecord::new(index, generation, payload)
        })?;
        self.registry.push(RegistryEntry { record, handler });
        Ok(ElementRef {
            record,
            index,
            generation,
            _scope: PhantomData,
        })
    }

    // =========================================================================
    // Children
    // =========================================================================

    /// Arena sequence of child references.
    pub fn children(&self, items: &[ElementRef<'r>]) -> Result<SeqRef<ElementRecord>> {
        let seq = self.arena.new_seq()?;
        for item in items {
            self.check(item)?;
            self.arena.seq_push(seq, item.record)?;
        }
        Ok(seq)
    }

    /// Append children to an element, creating its list if it has none.
    pub fn add_children(&self, parent: ElementRef<'r>, items: &[ElementRef<'r>]) -> Result<ElementRef<'r>> {
        self.check(&parent)?;
        let mut record = self.arena.read(parent.record)?;
        let children = if record.children().is_null() {
            let seq = self.arena.new_seq()?;
            record.children = seq.offset();
            self.arena.write(parent.record, record)?;
            seq
        } else {
            record.children()
        };
        for item in items {
            self.check(item)?;
            self.arena.seq_push(children, item.record)?;
        }
        Ok(parent)
    }

    // =========================================================================
    // Attributes
    // =========================================================================

    /// Attach a flat `name, value, name, value, ...` list.
    ///
    /// An odd count is rejected before anything is attached.
    pub fn attributes(&self, element: ElementRef<'r>, args: &[&str]) -> Result<ElementRef<'r>> {
        if args.len() % 2 != 0 {
            return Err(RuntimeError::OddAttributeCount { count: args.len() });
        }
        let pairs: Vec<(&str, &str)> = args.chunks_exact(2).map(|pair| (pair[0], pair[1])).collect();
        self.attribute_pairs(element, &pairs)
    }

    pub fn attribute_pairs(&self, element: ElementRef<'r>, pairs: &[(&str, &str)]) -> Result<ElementRef<'r>> {
        self.check(&element)?;
        if pairs.is_empty() {
            return Ok(element);
        }
        let mut record = self.arena.read(element.record)?;
        let attributes = if record.attributes().is_null() {
            let seq = self.arena.new_seq()?;
            record.attributes = seq.offset();
            self.arena.write(element.record, record)?;
            seq
        } else {
            record.attributes()
        };
        for &(name, value) in pairs {
            let attribute = AttributeRecord {
                name: self.arena.strdup(name)?.offset(),
                value: self.arena.strdup(value)?.offset(),
            };
            let attribute = self.arena.alloc(attribute)?;
            self.arena.seq_push(attributes, attribute)?;
        }
        Ok(element)
    }

    pub fn attribute(&self, element: ElementRef<'r>, name: &str, value: &str) -> Result<ElementRef<'r>> {
        self.attribute_pairs(element, &[(name, value)])
    }

    pub fn class(&self, element: ElementRef<'r>, value: &str) -> Result<ElementRef<'r>> {
        self.attribute(element, "class", value)
    }

    // =========================================================================
    // Text
    // =========================================================================

    /// Replace an element's text. For inputs this is the current value.
    pub fn set_text(&self, element: ElementRef<'r>, text: &str) -> Result<ElementRef<'r>> {
        self.check(&element)?;
        let text = self.arena.strdup(text)?;
        let mut record = self.arena.read(element.record)?;
        record.text = text.offset();
        self.arena.write(element.record, record)?;
        Ok(element)
    }

    /// Format into the arena. The string lives until the end of the cycle.
    pub fn format(&self, args: fmt::Arguments<'_>) -> Result<&'r str> {
        let s = self.arena.format(args)?;
        self.arena.str_at(s)
    }

    /// Kind of an element built in this scope.
    pub fn kind(&self, element: ElementRef<'r>) -> Result<ElementKind> {
        self.arena.read(element.record)?.kind()
    }

    /// The element must be the one this registry holds at its index.
    pub(crate) fn check(&self, element: &ElementRef<'r>) -> Result<()> {
        let record = self.registry.record(element.handle())?;
        if record != element.record {
            return Err(RuntimeError::InvalidReference {
                offset: element.record.offset(),
                capacity: self.arena.capacity(),
            });
        }
        Ok(())
    }
}

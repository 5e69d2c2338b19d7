//! Element Model - the tagged records the host walks.
//!
//! Every element is one fixed-size `#[repr(C)]` record in the arena: a common
//! header followed by three payload words whose meaning depends on `kind`.
//!
//! ```text
//! offset  field        Generic   Button         Input           Canvas
//! 0       kind         0         1              2               3
//! 4       index        registry position (== creation order)
//! 8       generation   render cycle that built it
//! 12      text         StrRef | null
//! 16      children     SeqRef<ElementRecord> | null
//! 20      attributes   SeqRef<AttributeRecord> | null
//! 24      payload[0]   tag       on_click       placeholder     id
//! 28      payload[1]   -         on_click_args  on_change       width
//! 32      payload[2]   -         -              -               height
//! ```
//!
//! Rust code never reads the payload words directly; [`ElementRecord::payload`]
//! decodes them into the [`Payload`] sum type so each consumer has to match
//! every variant.

use bytemuck::{Pod, Zeroable};

use crate::arena::{ArenaRef, NULL_REF, SeqRef, StrRef};
use crate::error::{Result, RuntimeError};

mod builder;

pub use builder::{ElementRef, Ui};

// =============================================================================
// KIND
// =============================================================================

#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    Generic = 0,
    Button = 1,
    Input = 2,
    Canvas = 3,
}

impl TryFrom<u32> for ElementKind {
    type Error = RuntimeError;

    fn try_from(value: u32) -> Result<Self> {
        match value {
            0 => Ok(Self::Generic),
            1 => Ok(Self::Button),
            2 => Ok(Self::Input),
            3 => Ok(Self::Canvas),
            other => Err(RuntimeError::InvalidKind(other)),
        }
    }
}

// =============================================================================
// PAYLOAD
// =============================================================================

/// Number of 32-bit words reserved for the largest payload (canvas).
pub const PAYLOAD_WORDS: usize = 3;

/// Value stored in `on_click` / `on_change` when a handler is bound.
pub const HANDLER_BOUND: u32 = 1;

/// Word positions inside the payload, per kind.
pub mod slot {
    pub const GENERIC_TAG: usize = 0;

    pub const BUTTON_ON_CLICK: usize = 0;
    pub const BUTTON_ON_CLICK_ARGS: usize = 1;

    pub const INPUT_PLACEHOLDER: usize = 0;
    pub const INPUT_ON_CHANGE: usize = 1;

    pub const CANVAS_ID: usize = 0;
    pub const CANVAS_WIDTH: usize = 1;
    pub const CANVAS_HEIGHT: usize = 2;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Payload {
    Generic {
        tag: StrRef,
    },
    Button {
        on_click: bool,
        /// Offset of the captured closure in the handler arena, or null.
        captured: u32,
    },
    Input {
        placeholder: StrRef,
        on_change: bool,
    },
    Canvas {
        id: StrRef,
        width: u32,
        height: u32,
    },
}

impl Payload {
    pub fn kind(&self) -> ElementKind {
        match self {
            Self::Generic { .. } => ElementKind::Generic,
            Self::Button { .. } => ElementKind::Button,
            Self::Input { .. } => ElementKind::Input,
            Self::Canvas { .. } => ElementKind::Canvas,
        }
    }

    pub fn encode(&self) -> [u32; PAYLOAD_WORDS] {
        let mut words = [0u32; PAYLOAD_WORDS];
        match *self {
            Self::Generic { tag } => {
                words[slot::GENERIC_TAG] = tag.offset();
            }
            Self::Button { on_click, captured } => {
                words[slot::BUTTON_ON_CLICK] = bound_word(on_click);
                words[slot::BUTTON_ON_CLICK_ARGS] = captured;
            }
            Self::Input {
                placeholder,
                on_change,
            } => {
                words[slot::INPUT_PLACEHOLDER] = placeholder.offset();
                words[slot::INPUT_ON_CHANGE] = bound_word(on_change);
            }
            Self::Canvas { id, width, height } => {
                words[slot::CANVAS_ID] = id.offset();
                words[slot::CANVAS_WIDTH] = width;
                words[slot::CANVAS_HEIGHT] = height;
            }
        }
        words
    }

    pub fn decode(kind: ElementKind, words: [u32; PAYLOAD_WORDS]) -> Self {
        match kind {
            ElementKind::Generic => Self::Generic {
                tag: ArenaRef::from_raw(words[slot::GENERIC_TAG]),
            },
            ElementKind::Button => Self::Button {
                on_click: words[slot::BUTTON_ON_CLICK] == HANDLER_BOUND,
                captured: words[slot::BUTTON_ON_CLICK_ARGS],
            },
            ElementKind::Input => Self::Input {
                placeholder: ArenaRef::from_raw(words[slot::INPUT_PLACEHOLDER]),
                on_change: words[slot::INPUT_ON_CHANGE] == HANDLER_BOUND,
            },
            ElementKind::Canvas => Self::Canvas {
                id: ArenaRef::from_raw(words[slot::CANVAS_ID]),
                width: words[slot::CANVAS_WIDTH],
                height: words[slot::CANVAS_HEIGHT],
            },
        }
    }
}

fn bound_word(bound: bool) -> u32 {
    if bound { HANDLER_BOUND } else { 0 }
}

// =============================================================================
// RECORDS
// =============================================================================

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct ElementRecord {
    pub kind: u32,
    pub index: u32,
    pub generation: u32,
    pub text: u32,
    pub children: u32,
    pub attributes: u32,
    pub payload: [u32; PAYLOAD_WORDS],
}

const _: () = assert!(size_of::<ElementRecord>() == 36);
const _: () = assert!(align_of::<ElementRecord>() == 4);

impl ElementRecord {
    pub fn new(index: u32, generation: u32, payload: Payload) -> Self {
        Self {
            kind: payload.kind() as u32,
            index,
            generation,
            text: NULL_REF,
            children: NULL_REF,
            attributes: NULL_REF,
            payload: payload.encode(),
        }
    }

    pub fn kind(&self) -> Result<ElementKind> {
        ElementKind::try_from(self.kind)
    }

    pub fn payload(&self) -> Result<Payload> {
        Ok(Payload::decode(self.kind()?, self.payload))
    }

    pub fn text(&self) -> StrRef {
        ArenaRef::from_raw(self.text)
    }

    pub fn children(&self) -> SeqRef<ElementRecord> {
        SeqRef::from_header(ArenaRef::from_raw(self.children))
    }

    pub fn attributes(&self) -> SeqRef<AttributeRecord> {
        SeqRef::from_header(ArenaRef::from_raw(self.attributes))
    }
}

/// One name/value pair. Both strings live in the arena.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct AttributeRecord {
    pub name: u32,
    pub value: u32,
}

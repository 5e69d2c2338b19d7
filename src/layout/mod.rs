//! Layout Descriptor - the byte offsets a foreign host needs to walk the tree.
//!
//! The host has no view of Rust types. It asks for this table once at startup
//! (`get_element_layout`) and from then on reads records by adding offsets to
//! the arena base:
//!
//! ```text
//! word  field                  word  field
//! 0     schema_version         14    button_on_click_args  ┐
//! 1     word_size (4)          15    input_placeholder     │ relative to
//! 2     flags (SchemaFlags)    16    input_on_change       │ `payload`
//! 3     null_ref (u32::MAX)    17    canvas_id             │
//! 4     record_size            18    canvas_width          │
//! 5..11 kind .. payload        19    canvas_height         ┘
//! 12    generic_tag            20..23 seq header size/count/capacity/items
//! 13    button_on_click        24..26 attribute size/name/value
//! ```
//!
//! The table is computed from `offset_of!` at compile time, so it cannot drift
//! from the record definitions. Any change to the record shape must still bump
//! [`LAYOUT_SCHEMA_VERSION`] so hosts built against the old shape refuse to run.

use std::mem::offset_of;

use bitflags::bitflags;
use bytemuck::{Pod, Zeroable};

use crate::arena::{NULL_REF, SeqHeader};
use crate::element::{AttributeRecord, ElementRecord, slot};
use crate::error::{Result, RuntimeError};

mod decode;

pub use decode::{DecodedElement, DecodedPayload, Decoder, MAX_DEPTH};

// =============================================================================
// CONSTANTS
// =============================================================================

pub const LAYOUT_SCHEMA_VERSION: u32 = 1;

/// Every field the host reads is a 32-bit word.
pub const LAYOUT_WORD_SIZE: u32 = 4;

/// Number of words in [`LayoutDescriptor`].
pub const LAYOUT_WORDS: usize = 27;

bitflags! {
    /// Properties of the encoding the host can rely on.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SchemaFlags: u32 {
        /// References are offsets from the arena base, not absolute addresses.
        const ARENA_RELATIVE_REFS = 1 << 0;
        /// Strings end at the first NUL byte.
        const NUL_TERMINATED_TEXT = 1 << 1;
        /// Records carry the generation of the cycle that built them.
        const GENERATION_TAGGED = 1 << 2;
    }
}

impl SchemaFlags {
    pub const CURRENT: Self = Self::ARENA_RELATIVE_REFS
        .union(Self::NUL_TERMINATED_TEXT)
        .union(Self::GENERATION_TAGGED);
}

// =============================================================================
// DESCRIPTOR
// =============================================================================

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct LayoutDescriptor {
    pub schema_version: u32,
    pub word_size: u32,
    pub flags: u32,
    pub null_ref: u32,
    pub record_size: u32,

    // Common record fields, from the record start.
    pub kind: u32,
    pub index: u32,
    pub generation: u32,
    pub text: u32,
    pub children: u32,
    pub attributes: u32,
    pub payload: u32,

    // Payload fields, from the payload start.
    pub generic_tag: u32,
    pub button_on_click: u32,
    pub button_on_click_args: u32,
    pub input_placeholder: u32,
    pub input_on_change: u32,
    pub canvas_id: u32,
    pub canvas_width: u32,
    pub canvas_height: u32,

    // Sequence header.
    pub seq_header_size: u32,
    pub seq_count: u32,
    pub seq_capacity: u32,
    pub seq_items: u32,

    // Attribute record.
    pub attribute_size: u32,
    pub attribute_name: u32,
    pub attribute_value: u32,
}

const _: () = assert!(size_of::<LayoutDescriptor>() == LAYOUT_WORDS * 4);

/// Layout of this build's records.
pub static ELEMENT_LAYOUT: LayoutDescriptor = LayoutDescriptor::current();

const fn payload_word(slot: usize) -> u32 {
    (slot * LAYOUT_WORD_SIZE as usize) as u32
}

impl LayoutDescriptor {
    pub const fn current() -> Self {
        Self {
            schema_version: LAYOUT_SCHEMA_VERSION,
            word_size: LAYOUT_WORD_SIZE,
            flags: SchemaFlags::CURRENT.bits(),
            null_ref: NULL_REF,
            record_size: size_of::<ElementRecord>() as u32,

            kind: offset_of!(ElementRecord, kind) as u32,
            index: offset_of!(ElementRecord, index) as u32,
            generation: offset_of!(ElementRecord, generation) as u32,
            text: offset_of!(ElementRecord, text) as u32,
            children: offset_of!(ElementRecord, children) as u32,
            attributes: offset_of!(ElementRecord, attributes) as u32,
            payload: offset_of!(ElementRecord, payload) as u32,

            generic_tag: payload_word(slot::GENERIC_TAG),
            button_on_click: payload_word(slot::BUTTON_ON_CLICK),
            button_on_click_args: payload_word(slot::BUTTON_ON_CLICK_ARGS),
            input_placeholder: payload_word(slot::INPUT_PLACEHOLDER),
            input_on_change: payload_word(slot::INPUT_ON_CHANGE),
            canvas_id: payload_word(slot::CANVAS_ID),
            canvas_width: payload_word(slot::CANVAS_WIDTH),
            canvas_height: payload_word(slot::CANVAS_HEIGHT),

            seq_header_size: size_of::<SeqHeader>() as u32,
            seq_count: offset_of!(SeqHeader, count) as u32,
            seq_capacity: offset_of!(SeqHeader, capacity) as u32,
            seq_items: offset_of!(SeqHeader, items) as u32,

            attribute_size: size_of::<AttributeRecord>() as u32,
            attribute_name: offset_of!(AttributeRecord, name) as u32,
            attribute_value: offset_of!(AttributeRecord, value) as u32,
        }
    }

    pub fn flags(&self) -> SchemaFlags {
        SchemaFlags::from_bits_truncate(self.flags)
    }

    /// The table as the host sees it.
    pub fn as_words(&self) -> &[u32] {
        bytemuck::cast_slice(std::slice::from_ref(self))
    }

    /// Refuse a table from a different schema.
    pub fn check_compatible(&self) -> Result<()> {
        if self.schema_version == LAYOUT_SCHEMA_VERSION && self.word_size == LAYOUT_WORD_SIZE {
            Ok(())
        } else {
            Err(RuntimeError::SchemaMismatch {
                found: self.schema_version,
                word_size: self.word_size,
                expected: LAYOUT_SCHEMA_VERSION,
            })
        }
    }

    /// Named fields, in table order. Logged once at startup.
    pub fn fields(&self) -> [(&'static str, u32); LAYOUT_WORDS] {
        [
            ("schema_version", self.schema_version),
            ("word_size", self.word_size),
            ("flags", self.flags),
            ("null_ref", self.null_ref),
            ("record_size", self.record_size),
            ("kind", self.kind),
            ("index", self.index),
            ("generation", self.generation),
            ("text", self.text),
            ("children", self.children),
            ("attributes", self.attributes),
            ("payload", self.payload),
            ("generic_tag", self.generic_tag),
            ("button_on_click", self.button_on_click),
            ("button_on_click_args", self.button_on_click_args),
            ("input_placeholder", self.input_placeholder),
            ("input_on_change", self.input_on_change),
            ("canvas_id", self.canvas_id),
            ("canvas_width", self.canvas_width),
            ("canvas_height", self.canvas_height),
            ("seq_header_size", self.seq_header_size),
            ("seq_count", self.seq_count),
            ("seq_capacity", self.seq_capacity),
            ("seq_items", self.seq_items),
            ("attribute_size", self.attribute_size),
            ("attribute_name", self.attribute_name),
            ("attribute_value", self.attribute_value),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_common_offsets() {
        let layout = &ELEMENT_LAYOUT;
        assert_eq!(layout.kind, 0);
        assert_eq!(layout.index, 4);
        assert_eq!(layout.generation, 8);
        assert_eq!(layout.text, 12);
        assert_eq!(layout.children, 16);
        assert_eq!(layout.attributes, 20);
        assert_eq!(layout.payload, 24);
        assert_eq!(layout.record_size, 36);
    }

    #[test]
    fn test_payload_offsets_are_relative() {
        let layout = &ELEMENT_LAYOUT;
        assert_eq!(layout.generic_tag, 0);
        assert_eq!(layout.button_on_click, 0);
        assert_eq!(layout.button_on_click_args, 4);
        assert_eq!(layout.input_placeholder, 0);
        assert_eq!(layout.input_on_change, 4);
        assert_eq!((layout.canvas_id, layout.canvas_width, layout.canvas_height), (0, 4, 8));
    }

    #[test]
    fn test_seq_and_attribute_offsets() {
        let layout = &ELEMENT_LAYOUT;
        assert_eq!(layout.seq_header_size, 12);
        assert_eq!((layout.seq_count, layout.seq_capacity, layout.seq_items), (0, 4, 8));
        assert_eq!(layout.attribute_size, 8);
        assert_eq!((layout.attribute_name, layout.attribute_value), (0, 4));
    }

    #[test]
    fn test_words_match_fields() {
        let words = ELEMENT_LAYOUT.as_words();
        assert_eq!(words.len(), LAYOUT_WORDS);
        for (word, (_, value)) in words.iter().zip(ELEMENT_LAYOUT.fields()) {
            assert_eq!(*word, value);
        }
        assert_eq!(words[0], LAYOUT_SCHEMA_VERSION);
        assert_eq!(words[3], NULL_REF);
    }

    #[test]
    fn test_flags() {
        let flags = ELEMENT_LAYOUT.flags();
        assert!(flags.contains(SchemaFlags::ARENA_RELATIVE_REFS));
        assert!(flags.contains(SchemaFlags::NUL_TERMINATED_TEXT));
        assert!(flags.contains(SchemaFlags::GENERATION_TAGGED));
    }

    #[test]
    fn test_incompatible_schema_refused() {
        assert!(ELEMENT_LAYOUT.check_compatible().is_ok());

        let future = LayoutDescriptor {
            schema_version: LAYOUT_SCHEMA_VERSION + 1,
            ..LayoutDescriptor::current()
        };
        assert_eq!(
            future.check_compatible(),
            Err(RuntimeError::SchemaMismatch {
                found: LAYOUT_SCHEMA_VERSION + 1,
                word_size: 4,
                expected: LAYOUT_SCHEMA_VERSION
            })
        );

        let wide = LayoutDescriptor {
            word_size: 8,
            ..LayoutDescriptor::current()
        };
        assert!(wide.check_compatible().is_err());
    }
}

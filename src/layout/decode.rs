//! Reference decoder.
//!
//! Walks a tree the way a foreign host does: raw bytes, an offset table, nothing
//! else. It never touches the Rust record types, which is what makes it useful for
//! checking that the published table really describes what the encoder wrote.

use super::LayoutDescriptor;
use crate::element::ElementKind;
use crate::error::{Result, RuntimeError};

/// Nesting limit. Cyclic references in corrupt memory hit it instead of looping.
pub const MAX_DEPTH: usize = 4096;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedPayload {
    Generic {
        tag: String,
    },
    Button {
        bound: bool,
        captured: Option<u32>,
    },
    Input {
        placeholder: String,
        bound: bool,
    },
    Canvas {
        id: String,
        width: u32,
        height: u32,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedElement {
    pub kind: ElementKind,
    pub index: u32,
    pub generation: u32,
    pub text: Option<String>,
    pub children: Option<Vec<DecodedElement>>,
    pub attributes: Option<Vec<(String, String)>>,
    pub payload: DecodedPayload,
}

impl DecodedElement {
    /// Depth-first search by registry index.
    pub fn find(&self, index: u32) -> Option<&DecodedElement> {
        self.find_by(&|element: &DecodedElement| element.index == index)
    }

    /// Depth-first, pre-order search for the first element matching `predicate`.
    pub fn find_by(&self, predicate: &impl Fn(&DecodedElement) -> bool) -> Option<&DecodedElement> {
        let mut pending = vec![self];
        while let Some(element) = pending.pop() {
            if predicate(element) {
                return Some(element);
            }
            pending.extend(element.children.iter().flatten().rev());
        }
        None
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .flatten()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

/// An element whose children are still being decoded.
struct Frame {
    element: DecodedElement,
    pending: Vec<u32>,
}

pub struct Decoder<'m> {
    memory: &'m [u8],
    layout: &'m LayoutDescriptor,
}

impl<'m> Decoder<'m> {
    /// `memory` starts at the arena base.
    pub fn new(memory: &'m [u8], layout: &'m LayoutDescriptor) -> Result<Self> {
        layout.check_compatible()?;
        Ok(Self { memory, layout })
    }

    /// Decode the tree rooted at `offset`.
    ///
    /// The walk keeps its own stack, so nesting is bounded by [`MAX_DEPTH`] and
    /// not by the thread's stack.
    pub fn element(&self, offset: u32) -> Result<DecodedElement> {
        let mut stack = vec![self.open(offset)?];
        loop {
            let depth = stack.len();
            let Some(top) = stack.last_mut() else {
                return Err(self.invalid(offset));
            };
            match top.pending.pop() {
                Some(child) => {
                    if depth > MAX_DEPTH {
                        return Err(self.invalid(child));
                    }
                    let frame = self.open(child)?;
                    stack.push(frame);
                }
                None => {
                    let Some(done) = stack.pop() else {
                        return Err(self.invalid(offset));
                    };
                    match stack.last_mut().and_then(|parent| parent.element.children.as_mut()) {
                        Some(siblings) => siblings.push(done.element),
                        None => return Ok(done.element),
                    }
                }
            }
        }
    }

    /// Decode one record; its children come back as offsets still to visit.
    fn open(&self, offset: u32) -> Result<Frame> {
        let layout = self.layout;
        let kind = ElementKind::try_from(self.word(offset, layout.kind)?)?;
        let payload = self.word_addr(offset, layout.payload)?;

        let payload = match kind {
            ElementKind::Generic => DecodedPayload::Generic {
                tag: self.string(self.word(payload, layout.generic_tag)?)?,
            },
            ElementKind::Button => {
                let captured = self.word(payload, layout.button_on_click_args)?;
                DecodedPayload::Button {
                    bound: self.word(payload, layout.button_on_click)? != 0,
                    captured: (captured != layout.null_ref).then_some(captured),
                }
            }
            ElementKind::Input => DecodedPayload::Input {
                placeholder: self.string(self.word(payload, layout.input_placeholder)?)?,
                bound: self.word(payload, layout.input_on_change)? != 0,
            },
            ElementKind::Canvas => DecodedPayload::Canvas {
                id: self.string(self.word(payload, layout.canvas_id)?)?,
                width: self.word(payload, layout.canvas_width)?,
                height: self.word(payload, layout.canvas_height)?,
            },
        };

        let text = match self.word(offset, layout.text)? {
            r if r == layout.null_ref => None,
            r => Some(self.string(r)?),
        };

        let (children, mut pending) = match self.word(offset, layout.children)? {
            r if r == layout.null_ref => (None, Vec::new()),
            r => {
                let items = self.seq(r)?;
                (Some(Vec::with_capacity(items.len())), items)
            }
        };
        // Popped from the back, so reverse to visit children in order.
        pending.reverse();

        let attributes = match self.word(offset, layout.attributes)? {
            r if r == layout.null_ref => None,
            r => Some(
                self.seq(r)?
                    .into_iter()
                    .map(|attr| {
                        Ok((
                            self.string(self.word(attr, layout.attribute_name)?)?,
                            self.string(self.word(attr, layout.attribute_value)?)?,
                        ))
                    })
                    .collect::<Result<Vec<_>>>()?,
            ),
        };

        let element = DecodedElement {
            kind,
            index: self.word(offset, layout.index)?,
            generation: self.word(offset, layout.generation)?,
            text,
            children,
            attributes,
            payload,
        };
        Ok(Frame { element, pending })
    }

    fn seq(&self, header: u32) -> Result<Vec<u32>> {
        let count = self.word(header, self.layout.seq_count)?;
        let items = self.word(header, self.layout.seq_items)?;
        (0..count)
            .map(|i| {
                let field = i
                    .checked_mul(self.layout.word_size)
                    .ok_or(self.invalid(items))?;
                self.word(items, field)
            })
            .collect()
    }

    fn word_addr(&self, base: u32, field: u32) -> Result<u32> {
        base.checked_add(field).ok_or(self.invalid(base))
    }

    fn word(&self, base: u32, field: u32) -> Result<u32> {
        let at = self.word_addr(base, field)? as usize;
        let bytes = at
            .checked_add(4)
            .and_then(|end| self.memory.get(at..end))
            .ok_or(self.invalid(base))?;
        // In-process memory; wasm hosts read the same bytes little-endian.
        Ok(u32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn string(&self, offset: u32) -> Result<String> {
        let start = offset as usize;
        let tail = self.memory.get(start..).ok_or(self.invalid(offset))?;
        let len = tail
            .iter()
            .position(|&b| b == 0)
            .ok_or(self.invalid(offset))?;
        String::from_utf8(tail[..len].to_vec()).map_err(|_| RuntimeError::InvalidUtf8)
    }

    fn invalid(&self, offset: u32) -> RuntimeError {
        RuntimeError::InvalidReference {
            offset,
            capacity: self.memory.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{ELEMENT_LAYOUT, LAYOUT_SCHEMA_VERSION};

    fn put(memory: &mut [u8], at: usize, value: u32) {
        memory[at..at + 4].copy_from_slice(&value.to_ne_bytes());
    }

    fn put_str(memory: &mut [u8], at: usize, s: &str) {
        memory[at..at + s.len()].copy_from_slice(s.as_bytes());
        memory[at + s.len()] = 0;
    }

    /// Hand-encoded canvas record, independent of the Rust record type.
    fn create_test_memory() -> Vec<u8> {
        let mut memory = vec![0u8; 128];
        put(&mut memory, 0, 3); // kind = canvas
        put(&mut memory, 4, 0); // index
        put(&mut memory, 8, 7); // generation
        put(&mut memory, 12, u32::MAX); // text
        put(&mut memory, 16, u32::MAX); // children
        put(&mut memory, 20, u32::MAX); // attributes
        put(&mut memory, 24, 64); // canvas id
        put(&mut memory, 28, 320);
        put(&mut memory, 32, 200);
        put_str(&mut memory, 64, "game");
        memory
    }

    #[test]
    fn test_decode_hand_encoded_canvas() {
        let memory = create_test_memory();
        let decoder = Decoder::new(&memory, &ELEMENT_LAYOUT).unwrap();
        let element = decoder.element(0).unwrap();
        assert_eq!(element.kind, ElementKind::Canvas);
        assert_eq!(element.generation, 7);
        assert_eq!(element.text, None);
        assert_eq!(element.children, None);
        assert_eq!(
            element.payload,
            DecodedPayload::Canvas {
                id: "game".to_string(),
                width: 320,
                height: 200
            }
        );
    }

    #[test]
    fn test_refuses_other_schema() {
        let memory = create_test_memory();
        let layout = LayoutDescriptor {
            schema_version: LAYOUT_SCHEMA_VERSION + 1,
            ..LayoutDescriptor::current()
        };
        assert!(matches!(
            Decoder::new(&memory, &layout),
            Err(RuntimeError::SchemaMismatch { .. })
        ));
    }

    #[test]
    fn test_out_of_bounds_reference() {
        let mut memory = create_test_memory();
        put(&mut memory, 24, 4096);
        let decoder = Decoder::new(&memory, &ELEMENT_LAYOUT).unwrap();
        assert!(matches!(
            decoder.element(0),
            Err(RuntimeError::InvalidReference { offset: 4096, .. })
        ));
    }

    #[test]
    fn test_self_referencing_children_stop() {
        let mut memory = vec![0u8; 128];
        put(&mut memory, 0, 0); // generic
        put(&mut memory, 12, u32::MAX);
        put(&mut memory, 16, 48); // children header
        put(&mut memory, 20, u32::MAX);
        put(&mut memory, 24, 80); // tag
        put(&mut memory, 48, 1); // count
        put(&mut memory, 52, 1);
        put(&mut memory, 56, 64); // items
        put(&mut memory, 64, 0); // child 0 -> the root itself
        put_str(&mut memory, 80, "div");
        let decoder = Decoder::new(&memory, &ELEMENT_LAYOUT).unwrap();
        assert!(decoder.element(0).is_err());
    }
}

//! Runtime errors.
//!
//! Every failure the runtime can detect is a [`RuntimeError`]. Library calls
//! return them; the export layer turns them into a trap, since a wasm module has
//! no channel to hand a structured error back across the boundary.
//!
//! Requests that simply don't apply (a click on a non-button, a button without a
//! handler) are not errors. They surface as [`crate::Dispatch::Ignored`].

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T, E = RuntimeError> = core::result::Result<T, E>;

/// Which side of the contract a failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// A bounded region ran out of room (arena, staging buffer, registry).
    CapacityExhaustion,
    /// Host or application broke the boundary contract.
    ContractViolation,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    #[error("arena exhausted: requested {requested} bytes, {remaining} of {capacity} remaining")]
    ArenaExhausted {
        requested: usize,
        remaining: usize,
        capacity: usize,
    },

    #[error("unsupported alignment {align} (maximum {max})")]
    UnsupportedAlignment { align: usize, max: usize },

    #[error("string contains a NUL byte at position {position}")]
    InteriorNul { position: usize },

    #[error("formatting into the arena failed")]
    Format,

    #[error("arena reference {offset:#x} is not valid for a {capacity}-byte arena")]
    InvalidReference { offset: u32, capacity: usize },

    #[error("attributes take name/value pairs, got {count} arguments")]
    OddAttributeCount { count: usize },

    #[error("element index {index} out of range (registry holds {len})")]
    IndexOutOfRange { index: u32, len: u32 },

    #[error("stale handle from generation {handle}, current generation is {current}")]
    StaleHandle { handle: u32, current: u32 },

    #[error("input of {len} bytes does not fit the {capacity}-byte input buffer")]
    InputTooLong { len: usize, capacity: usize },

    #[error("input text is not valid UTF-8")]
    InvalidUtf8,

    #[error("host passed a null pointer")]
    NullPointer,

    #[error("unknown element kind discriminant {0}")]
    InvalidKind(u32),

    #[error("layout schema mismatch: found version {found} word size {word_size}, expected version {expected}")]
    SchemaMismatch {
        found: u32,
        word_size: u32,
        expected: u32,
    },

    #[error("element registry is full")]
    RegistryFull,

    #[error("runtime re-entered while a render or dispatch was in progress")]
    Reentrant,

    #[error("unknown animation frame callback {0}")]
    UnknownFrameCallback(u32),

    #[error("canvas of {width}x{height} (stride {stride}) needs {required} pixels, got {len}")]
    InvalidCanvas {
        width: u32,
        height: u32,
        stride: u32,
        required: usize,
        len: usize,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
}

impl RuntimeError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::ArenaExhausted { .. } | Self::InputTooLong { .. } | Self::RegistryFull => {
                ErrorClass::CapacityExhaustion
            }
            Self::UnsupportedAlignment { .. }
            | Self::InteriorNul { .. }
            | Self::Format
            | Self::InvalidReference { .. }
            | Self::OddAttributeCount { .. }
            | Self::IndexOutOfRange { .. }
            | Self::StaleHandle { .. }
            | Self::InvalidUtf8
            | Self::NullPointer
            | Self::InvalidKind(_)
            | Self::SchemaMismatch { .. }
            | Self::Reentrant
            | Self::UnknownFrameCallback(_)
            | Self::InvalidCanvas { .. }
            | Self::InvalidConfig(_) => ErrorClass::ContractViolation,
        }
    }
}

/// Abort the current host call.
///
/// Logs the error through `tracing` and panics. On wasm32 the panic lowers to an
/// `unreachable` trap, which is the only failure signal the host understands.
#[cold]
#[track_caller]
pub fn trap(err: &RuntimeError) -> ! {
    tracing::error!(class = ?err.class(), "{err}");
    panic!("spark-wasm: {err}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classes() {
        let exhausted = RuntimeError::ArenaExhausted {
            requested: 64,
            remaining: 8,
            capacity: 128,
        };
        assert_eq!(exhausted.class(), ErrorClass::CapacityExhaustion);
        assert_eq!(
            RuntimeError::InputTooLong { len: 5000, capacity: 4096 }.class(),
            ErrorClass::CapacityExhaustion
        );
        assert_eq!(
            RuntimeError::OddAttributeCount { count: 3 }.class(),
            ErrorClass::ContractViolation
        );
        assert_eq!(
            RuntimeError::IndexOutOfRange { index: 9, len: 2 }.class(),
            ErrorClass::ContractViolation
        );
    }

    #[test]
    fn test_error_messages() {
        let err = RuntimeError::IndexOutOfRange { index: 7, len: 3 };
        assert_eq!(err.to_string(), "element index 7 out of range (registry holds 3)");

        let err = RuntimeError::StaleHandle { handle: 1, current: 4 };
        assert!(err.to_string().contains("generation 1"));
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_trap_panics_with_message() {
        trap(&RuntimeError::IndexOutOfRange { index: 1, len: 0 });
    }
}

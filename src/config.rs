//! Runtime configuration.
//!
//! A wasm module has no environment or files to read, so configuration is a plain
//! value baked in by the application (see [`crate::export_component!`]).

use crate::error::{Result, RuntimeError};

// =============================================================================
// DEFAULTS
// =============================================================================

/// Element arena size (8 MiB).
pub const DEFAULT_ARENA_CAPACITY: u32 = 8 * 1024 * 1024;

/// Handler environment arena size (64 KiB).
pub const DEFAULT_ENV_CAPACITY: u32 = 64 * 1024;

/// Input staging buffer size, terminator included.
pub const DEFAULT_INPUT_BUFFER_CAPACITY: usize = 4096;

/// Registry slots reserved up front.
pub const DEFAULT_REGISTRY_CAPACITY: usize = 256;

/// `tracing` filter directive used when the application sets none.
pub const DEFAULT_LOG_FILTER: &str = "info";

// =============================================================================
// CONFIG
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Bytes available to element records, strings and sequences per cycle.
    pub arena_capacity: u32,
    /// Bytes available to captured handler closures per cycle.
    pub env_capacity: u32,
    /// Size of the host scratch region and the staging buffer.
    pub input_buffer_capacity: usize,
    /// Initial registry capacity. The registry grows past it if needed.
    pub registry_capacity: usize,
    /// `EnvFilter` directive for the log subscriber.
    pub log_filter: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            arena_capacity: DEFAULT_ARENA_CAPACITY,
            env_capacity: DEFAULT_ENV_CAPACITY,
            input_buffer_capacity: DEFAULT_INPUT_BUFFER_CAPACITY,
            registry_capacity: DEFAULT_REGISTRY_CAPACITY,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl RuntimeConfig {
    pub fn with_arena_capacity(mut self, capacity: u32) -> Self {
        self.arena_capacity = capacity;
        self
    }

    pub fn with_env_capacity(mut self, capacity: u32) -> Self {
        self.env_capacity = capacity;
        self
    }

    pub fn with_input_buffer_capacity(mut self, capacity: usize) -> Self {
        self.input_buffer_capacity = capacity;
        self
    }

    pub fn with_registry_capacity(mut self, capacity: usize) -> Self {
        self.registry_capacity = capacity;
        self
    }

    pub fn with_log_filter(mut self, filter: impl Into<String>) -> Self {
        self.log_filter = filter.into();
        self
    }

    /// Reject values the runtime cannot honor.
    ///
    /// `u32::MAX` is reserved as the null reference, so no arena may reach it.
    pub fn validate(&self) -> Result<()> {
        if self.arena_capacity == 0 || self.arena_capacity == u32::MAX {
            return Err(RuntimeError::InvalidConfig(
                "arena capacity must be between 1 and u32::MAX - 1",
            ));
        }
        if self.env_capacity == u32::MAX {
            return Err(RuntimeError::InvalidConfig(
                "env capacity must be below u32::MAX",
            ));
        }
        if self.input_buffer_capacity < 2 || self.input_buffer_capacity > u32::MAX as usize {
            return Err(RuntimeError::InvalidConfig(
                "input buffer needs room for at least one byte and a terminator",
            ));
        }
        if self.log_filter.trim().is_empty() {
            return Err(RuntimeError::InvalidConfig("log filter must not be empty"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = RuntimeConfig::default();
        assert_eq!(config.arena_capacity, DEFAULT_ARENA_CAPACITY);
        assert_eq!(config.input_buffer_capacity, 4096);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builders() {
        let config = RuntimeConfig::default()
            .with_arena_capacity(1024)
            .with_env_capacity(256)
            .with_input_buffer_capacity(32)
            .with_log_filter("spark_wasm=debug");
        assert_eq!(config.arena_capacity, 1024);
        assert_eq!(config.env_capacity, 256);
        assert_eq!(config.input_buffer_capacity, 32);
        assert_eq!(config.log_filter, "spark_wasm=debug");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let zero_arena = RuntimeConfig::default().with_arena_capacity(0);
        assert!(matches!(zero_arena.validate(), Err(RuntimeError::InvalidConfig(_))));

        let null_sized = RuntimeConfig::default().with_arena_capacity(u32::MAX);
        assert!(null_sized.validate().is_err());

        let tiny_input = RuntimeConfig::default().with_input_buffer_capacity(1);
        assert!(tiny_input.validate().is_err());

        let no_filter = RuntimeConfig::default().with_log_filter("  ");
        assert!(no_filter.validate().is_err());
    }
}

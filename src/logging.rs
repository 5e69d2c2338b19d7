//! Log output through the host byte sink.
//!
//! A wasm module has no stdout. `tracing` events are formatted by a plain
//! `tracing_subscriber::fmt` layer (no timestamps, no colour) and handed to
//! `platform_write` line by line. Panics take the same route so the host sees
//! why a call trapped.

use std::io;
use std::sync::Once;

use tracing_subscriber::EnvFilter;

use crate::error::{Result, RuntimeError};
use crate::host::{Host, PlatformHost};

/// `io::Write` adapter over [`PlatformHost::write`].
#[derive(Debug, Clone, Copy, Default)]
pub struct HostWriter;

impl io::Write for HostWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        PlatformHost.write(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Install the global subscriber.
///
/// Returns `Ok(false)` if a subscriber was already installed (by an earlier call
/// or by the embedding application).
pub fn init(filter: &str) -> Result<bool> {
    let filter = EnvFilter::try_new(filter)
        .map_err(|_| RuntimeError::InvalidConfig("log filter is not a valid directive"))?;
    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(|| HostWriter)
        .without_time()
        .with_ansi(false)
        .with_target(true)
        .try_init()
        .is_ok();
    Ok(installed)
}

/// Route panic messages to the host byte sink. Idempotent.
pub fn install_panic_hook() {
    static HOOK: Once = Once::new();
    HOOK.call_once(|| {
        std::panic::set_hook(Box::new(|info| {
            let message = format!("panic: {info}\n");
            PlatformHost.write(message.as_bytes());
        }));
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_invalid_filter() {
        assert!(matches!(init("spark_wasm=loud"), Err(RuntimeError::InvalidConfig(_))));
    }

    #[test]
    fn test_second_init_is_harmless() {
        let _ = init("warn");
        assert_eq!(init("warn"), Ok(false));
    }

    #[test]
    fn test_writer_reports_full_length() {
        let mut writer = HostWriter;
        assert_eq!(writer.write(b"").unwrap(), 0);
        assert!(writer.flush().is_ok());
    }
}

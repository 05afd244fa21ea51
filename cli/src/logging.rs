// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Terminal log formatting shared by every command

use anyhow::{Context, Result};
use tracing::Subscriber;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

/// `RUST_LOG` wins over the `--log-level` flag.
pub fn filter(level: &str) -> Result<EnvFilter> {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .context("Failed to create log filter")
}

pub fn subscriber<W>(filter: EnvFilter, writer: W) -> impl Subscriber + Send + Sync + 'static
where
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish()
}

/// Runs `f` with the terminal log format writing into a buffer.
#[cfg(test)]
pub(crate) fn capture<R>(level: &str, f: impl FnOnce() -> R) -> (R, String) {
    use std::io::Write;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Buffer(Arc<Mutex<Vec<u8>>>);

    impl Write for Buffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    let buffer = Buffer::default();
    let writer = buffer.clone();
    let subscriber = subscriber(EnvFilter::new(level), move || writer.clone());
    let result = tracing::subscriber::with_default(subscriber, f);

    let logged = String::from_utf8_lossy(&buffer.0.lock().unwrap()).into_owned();
    (result, logged)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_respects_level() {
        let ((), logged) = capture("info", || {
            tracing::info!("fleet is up");
            tracing::debug!("chatter");
        });
        assert!(logged.contains("fleet is up"));
        assert!(!logged.contains("chatter"));
    }
}

//! Log setup with scrubbing on the way out
//!
//! The fmt layer renders each event into a fresh writer; [`ScrubbedLine`]
//! buffers it and scrubs the whole line before it reaches the sink.

use bulwark_core::SecretSanitizer;
use std::io::{self, Write};
use std::sync::Arc;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber
///
/// `RUST_LOG` wins when set; otherwise `--verbose` selects DEBUG over INFO.
pub fn init(verbose: bool, sanitizer: SecretSanitizer) -> anyhow::Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(Scrubbing::new(io::stderr, sanitizer))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

/// `MakeWriter` that scrubs everything written through `inner`
pub struct Scrubbing<M> {
    inner: M,
    sanitizer: Arc<SecretSanitizer>,
}

impl<M> Scrubbing<M> {
    pub fn new(inner: M, sanitizer: SecretSanitizer) -> Self {
        Self {
            inner,
            sanitizer: Arc::new(sanitizer),
        }
    }
}

impl<'a, M: MakeWriter<'a>> MakeWriter<'a> for Scrubbing<M> {
    type Writer = ScrubbedLine<M::Writer>;

    fn make_writer(&'a self) -> Self::Writer {
        ScrubbedLine {
            inner: self.inner.make_writer(),
            sanitizer: Arc::clone(&self.sanitizer),
            buf: Vec::new(),
        }
    }
}

/// One buffered event, scrubbed on flush or drop
pub struct ScrubbedLine<W: Write> {
    inner: W,
    sanitizer: Arc<SecretSanitizer>,
    buf: Vec<u8>,
}

impl<W: Write> Write for ScrubbedLine<W> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if !self.buf.is_empty() {
            let scrubbed = self.sanitizer.scrub(&String::from_utf8_lossy(&self.buf));
            self.buf.clear();
            self.inner.write_all(scrubbed.as_bytes())?;
        }
        self.inner.flush()
    }
}

impl<W: Write> Drop for ScrubbedLine<W> {
    fn drop(&mut self) {
        // Nowhere to report a failed log write
        let _ = self.flush();
    }
}

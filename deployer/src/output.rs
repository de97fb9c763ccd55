//! Progress output sink
//!
//! Deployments stream human readable progress (waiting messages, remote job
//! log entries, the final endpoint) as they happen. This is kept apart from
//! `tracing` so that callers can redirect it, and tests can capture it.

use std::fmt::Display;
use std::io::Write;
use std::sync::{Arc, Mutex};

/// Shared, cloneable line-oriented writer
#[derive(Clone)]
pub struct Output {
    sink: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl Output {
    /// Write progress lines to stdout
    pub fn stdout() -> Self {
        Self::from_writer(std::io::stdout())
    }

    /// Write progress lines to an arbitrary writer
    pub fn from_writer(writer: impl Write + Send + 'static) -> Self {
        Self {
            sink: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    /// Create an in-memory output along with a handle for reading it back
    pub fn capture() -> (Self, CapturedOutput) {
        let buffer = CapturedOutput::default();
        (Self::from_writer(buffer.clone()), buffer)
    }

    /// Write one line
    pub fn line(&self, message: impl Display) {
        if let Ok(mut sink) = self.sink.lock() {
            // A closed stdout must not abort a deployment
            let _ = writeln!(sink, "{}", message);
            let _ = sink.flush();
        }
    }

    /// Write every line of a multi-line block
    pub fn lines(&self, block: &str) {
        for line in block.split('\n') {
            self.line(line);
        }
    }
}

impl Default for Output {
    fn default() -> Self {
        Self::stdout()
    }
}

impl std::fmt::Debug for Output {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Output")
    }
}

/// In-memory buffer backing [`Output::capture`]
#[derive(Clone, Default)]
pub struct CapturedOutput {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl CapturedOutput {
    /// Everything written so far
    pub fn contents(&self) -> String {
        self.buffer
            .lock()
            .map(|b| String::from_utf8_lossy(&b).into_owned())
            .unwrap_or_default()
    }
}

impl Write for CapturedOutput {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut buffer = self
            .buffer
            .lock()
            .map_err(|_| std::io::Error::other("output buffer poisoned"))?;
        buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

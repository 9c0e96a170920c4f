//! Execution context threaded through every evaluation call.
//!
//! The context carries the two pieces of ambient I/O the primitive library
//! needs: where `println` writes and where `read-line` reads. Output goes
//! through an enum-dispatched sink so tests can capture it in a buffer.

use parking_lot::Mutex;
use std::io::{BufRead, Write};
use std::sync::Arc;

/// Sink that captures output in memory.
#[derive(Default)]
pub struct BufferSink {
    buffer: Mutex<String>,
}

impl BufferSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write(&self, text: &str) {
        self.buffer.lock().push_str(text);
    }

    /// Everything written so far.
    pub fn contents(&self) -> String {
        self.buffer.lock().clone()
    }

    /// Return everything written so far and clear the buffer.
    pub fn take(&self) -> String {
        std::mem::take(&mut *self.buffer.lock())
    }
}

/// Where `println` output goes.
#[derive(Clone)]
pub enum OutputSink {
    /// Process standard output (default)
    Stdout,
    /// In-memory capture, shared with whoever created the context
    Buffer(Arc<BufferSink>),
    /// Discard everything
    Silent,
}

impl OutputSink {
    pub fn write(&self, text: &str) {
        match self {
            Self::Stdout => {
                if let Err(err) = write_flushed(&mut std::io::stdout().lock(), text) {
                    tracing::warn!(%err, "failed to write to stdout");
                }
            }
            Self::Buffer(sink) => sink.write(text),
            Self::Silent => {}
        }
    }
}

/// Produces one line of input per call, without its trailing newline handling
pub type LineReader = Arc<dyn Fn() -> String + Send + Sync>;

/// Output sink and line reader for one evaluation session.
///
/// Cloning is cheap; spawned `go` sequences receive a clone of their
/// spawner's context.
#[derive(Clone)]
pub struct Context {
    output: OutputSink,
    read_line: LineReader,
}

impl Context {
    pub fn new(output: OutputSink, read_line: LineReader) -> Self {
        Context { output, read_line }
    }

    /// Write to stdout, read from stdin.
    pub fn stdio() -> Self {
        Self::new(OutputSink::Stdout, Arc::new(read_stdin_line))
    }

    /// Capture output in a fresh buffer; `read-line` yields empty strings.
    pub fn buffered() -> (Self, Arc<BufferSink>) {
        let sink = Arc::new(BufferSink::new());
        let context = Self::new(OutputSink::Buffer(Arc::clone(&sink)), Arc::new(String::new));
        (context, sink)
    }

    /// Discard output; `read-line` yields empty strings.
    pub fn silent() -> Self {
        Self::new(OutputSink::Silent, Arc::new(String::new))
    }

    pub fn with_line_reader(mut self, read_line: impl Fn() -> String + Send + Sync + 'static) -> Self {
        self.read_line = Arc::new(read_line);
        self
    }

    pub fn write(&self, text: &str) {
        self.output.write(text);
    }

    pub fn read_line(&self) -> String {
        (self.read_line)()
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::stdio()
    }
}

fn write_flushed(out: &mut impl Write, text: &str) -> std::io::Result<()> {
    out.write_all(text.as_bytes())?;
    out.flush()
}

fn read_stdin_line() -> String {
    let mut line = String::new();
    if let Err(err) = std::io::stdin().lock().read_line(&mut line) {
        tracing::warn!(%err, "failed to read from stdin");
    }
    line
}

//! Output plumbing for the script-visible print functions.

use std::{
    cell::RefCell,
    io::{self, Write as _},
    rc::Rc,
};

/// Trait for handling output from `print_string` / `println_string` (and
/// the prelude's `print` / `puts` built on top of them).
///
/// Implement this to capture or redirect script output; the default
/// [`StdPrint`] writes to stdout.
pub trait PrintWriter {
    /// Writes a chunk without a trailing newline.
    fn write_str(&mut self, output: &str);

    /// Writes a chunk followed by a newline.
    fn write_line(&mut self, output: &str) {
        self.write_str(output);
        self.write_str("\n");
    }
}

/// Default writer: stdout, flushed per chunk so REPL output interleaves
/// correctly with prompts.
#[derive(Debug, Default)]
pub struct StdPrint;

impl PrintWriter for StdPrint {
    fn write_str(&mut self, output: &str) {
        let mut stdout = io::stdout();
        let _ = stdout.write_all(output.as_bytes());
        let _ = stdout.flush();
    }
}

/// Writer that discards everything.
#[derive(Debug, Default)]
pub struct NoPrint;

impl PrintWriter for NoPrint {
    fn write_str(&mut self, _output: &str) {}
}

/// Writer that collects output into a shared string, for tests and
/// embedders that surface script output themselves.
#[derive(Debug, Default)]
pub struct CollectStringPrint {
    buffer: Rc<RefCell<String>>,
}

impl CollectStringPrint {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A handle to the buffer that stays valid after the writer is handed
    /// to the engine.
    #[must_use]
    pub fn handle(&self) -> Rc<RefCell<String>> {
        Rc::clone(&self.buffer)
    }
}

impl PrintWriter for CollectStringPrint {
    fn write_str(&mut self, output: &str) {
        self.buffer.borrow_mut().push_str(output);
    }
}

//! A just-in-time compiler and runtime envelope for an eight-instruction
//! tape language.
//!
//! [`interpret`] scans source text into a condensed instruction list,
//! resolves loop branches to label handles, emits native x86/x86-64 machine
//! code for it into a writable-then-executable buffer, maps a guarded tape
//! for the program's working memory, and calls into the generated code
//! under a signal-handler-backed recovery point that turns tape boundary
//! violations and a configurable time budget into ordinary return values
//! instead of process termination.
#![warn(missing_docs)]
#![allow(clippy::module_name_repetitions)]

pub mod status;

mod arch;
mod buffer;
mod codegen;
mod emitter;
mod io;
mod program;
mod registers;
mod resolver;
mod runtime;
mod scanner;
mod tape;

pub use io::{
    clear_test_output, set_test_input, take_test_output, test_input, test_output, InputFn,
    OutputFn,
};
pub use status::{status_message, Status};

use std::time::Duration;

/// Compiles and runs `source`, a tape-language program.
///
/// `max_data_size` bounds the tape's user-visible region in bytes.
/// `time_limit`, when given, is a virtual (process-CPU) time budget after
/// which the run is aborted with [`Status::TimeExceeded`]. `input` and
/// `output` are the program's sole I/O surface: `input` is called for every
/// `,` and must return a byte (0–255) or the end-of-input sentinel (`-1`);
/// `output` is called for every `.` with the current cell's value.
///
/// At most one call to `interpret` may be in flight per process at a time;
/// see the crate's concurrency notes in `runtime` for why.
#[must_use]
pub fn interpret(
    source: &[u8],
    max_data_size: usize,
    time_limit: Option<Duration>,
    input: InputFn,
    output: OutputFn,
) -> Status {
    runtime::run(source, max_data_size, time_limit, input, output)
}

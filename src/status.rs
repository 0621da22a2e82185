//! Stable status codes returned by [`crate::interpret`].

use thiserror::Error;

/// Outcome of a single [`crate::interpret`] call.
///
/// Discriminants are part of the public contract: a caller that only has the
/// raw integer (say, across an FFI boundary) can recover the same value via
/// [`status_message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[repr(i32)]
pub enum Status {
    /// Normal completion.
    #[error("Okay.")]
    Ok = 0,
    /// Guard mapping failed, or computing the guard page counts overflowed.
    #[error("Error configuring guard pages.")]
    GuardError = 1,
    /// Failed to install a signal handler or an interval timer.
    #[error("Error configuring SIGSEGV handler.")]
    Handler = 2,
    /// An ordinary heap allocation failed.
    #[error("Error allocating memory.")]
    MallocError = 3,
    /// `mmap` of the code buffer or the tape failed.
    #[error("Error during mmap.")]
    MmapError = 4,
    /// `munmap` of the tape or code buffer failed.
    #[error("Error during munmap.")]
    MunmapError = 5,
    /// The lazily-mapped tape could not be backed by physical memory.
    #[error("Out of memory.")]
    NoMemory = 6,
    /// Querying the system page size failed.
    #[error("Error retrieving page size.")]
    PageSize = 7,
    /// The tape pointer crossed the forward guard.
    #[error("Tape limit exceeded.")]
    TapeExceeded = 8,
    /// The tape pointer crossed the reverse guard.
    #[error("Tape underflow.")]
    TapeUnderflow = 9,
    /// The configured virtual-time budget was exhausted.
    #[error("Time limit exceeded.")]
    TimeExceeded = 10,
    /// The source program has mismatched `[`/`]`.
    #[error("Unbalanced number of '[' and ']'.")]
    Unbalanced = 11,
}

impl Status {
    /// The stable integer code for this status.
    #[must_use]
    pub const fn code(self) -> i32 {
        self as i32
    }

    /// Recover a `Status` from one of the recovery-point longjmp codes.
    ///
    /// Only the runtime-fault/timeout codes are ever produced this way;
    /// panics on any other value, since it indicates a bug in `runtime`.
    pub(crate) fn from_longjmp_code(code: i32) -> Self {
        match code {
            6 => Status::NoMemory,
            8 => Status::TapeExceeded,
            9 => Status::TapeUnderflow,
            10 => Status::TimeExceeded,
            other => unreachable!("unexpected longjmp code {other}"),
        }
    }
}

/// Maps a raw status code to its stable, human-readable message.
///
/// Companion to [`Status`]'s [`Display`](std::fmt::Display) impl for callers
/// that only have the bare integer.
#[must_use]
pub fn status_message(code: i32) -> &'static str {
    match code {
        0 => "Okay.",
        1 => "Error configuring guard pages.",
        2 => "Error configuring SIGSEGV handler.",
        3 => "Error allocating memory.",
        4 => "Error during mmap.",
        5 => "Error during munmap.",
        6 => "Out of memory.",
        7 => "Error retrieving page size.",
        8 => "Tape limit exceeded.",
        9 => "Tape underflow.",
        10 => "Time limit exceeded.",
        11 => "Unbalanced number of '[' and ']'.",
        _ => "Unknown error.",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_round_trips_through_message() {
        for status in [
            Status::Ok,
            Status::GuardError,
            Status::Handler,
            Status::MallocError,
            Status::MmapError,
            Status::MunmapError,
            Status::NoMemory,
            Status::PageSize,
            Status::TapeExceeded,
            Status::TapeUnderflow,
            Status::TimeExceeded,
            Status::Unbalanced,
        ] {
            assert_eq!(status.to_string(), status_message(status.code()));
        }
    }

    #[test]
    fn unknown_code_has_fallback_message() {
        assert_eq!(status_message(99), "Unknown error.");
    }
}

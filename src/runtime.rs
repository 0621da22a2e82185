//! The runtime envelope: ties the scanner, resolver, code generator, and
//! tape together, then arms signal handlers and a recovery point around a
//! single call into generated code.
//!
//! Signal handlers cannot capture a closure's environment, so the state they
//! need to classify a fault — the tape's region boundaries and the
//! recovery-point buffer — lives in a process-global singleton. That in turn
//! is why only one run may be in flight per process at a time (see the
//! crate's concurrency notes).

use std::os::raw::{c_int, c_void};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::buffer::CodeBuffer;
use crate::codegen;
use crate::io::{InputFn, OutputFn};
use crate::program::Op;
use crate::resolver;
use crate::scanner;
use crate::status::Status;
use crate::tape::Tape;

/// Opaque buffer for the platform `jmp_buf`. Sized comfortably above
/// glibc's actual layout (under 200 bytes on both x86 targets this crate
/// supports); its contents are never inspected from Rust, only handed to
/// `setjmp`/`longjmp`.
#[repr(C, align(16))]
struct JmpBuf([u8; 256]);

impl JmpBuf {
    const fn new() -> Self {
        Self([0; 256])
    }
}

extern "C" {
    fn setjmp(env: *mut JmpBuf) -> c_int;
    fn longjmp(env: *mut JmpBuf, val: c_int) -> !;
}

/// Process-global state the signal handlers read. Every field is an atomic
/// so installing/reading it from a handler never races with the run loop
/// even though, by this crate's single-run-at-a-time discipline, they never
/// actually execute concurrently.
struct RunState {
    reverse_guard_start: AtomicUsize,
    user_start: AtomicUsize,
    user_end: AtomicUsize,
    mapping_end: AtomicUsize,
    /// Address of the `JmpBuf` to longjmp into; zero when no run is armed.
    env: AtomicUsize,
}

impl RunState {
    const fn new() -> Self {
        Self {
            reverse_guard_start: AtomicUsize::new(0),
            user_start: AtomicUsize::new(0),
            user_end: AtomicUsize::new(0),
            mapping_end: AtomicUsize::new(0),
            env: AtomicUsize::new(0),
        }
    }
}

static RUN_STATE: RunState = RunState::new();

fn arm(tape: &Tape, env: *mut JmpBuf) {
    RUN_STATE
        .reverse_guard_start
        .store(tape.reverse_guard_start(), Ordering::SeqCst);
    RUN_STATE.user_start.store(tape.user_start(), Ordering::SeqCst);
    RUN_STATE.user_end.store(tape.user_end(), Ordering::SeqCst);
    RUN_STATE.mapping_end.store(tape.mapping_end(), Ordering::SeqCst);
    RUN_STATE.env.store(env as usize, Ordering::SeqCst);
}

fn disarm() {
    RUN_STATE.env.store(0, Ordering::SeqCst);
}

/// Transfers control back to the armed recovery point with `code`, one of
/// the longjmp-eligible [`Status`] discriminants. Never returns.
fn transfer(code: i32) -> ! {
    let env = RUN_STATE.env.load(Ordering::SeqCst);
    debug_assert_ne!(env, 0, "signal fired with no run armed");
    // SAFETY: `env` was stored by `arm` and points at a `JmpBuf` that is
    // still live on the stack of the `run` invocation currently executing
    // generated code; this is the only path that ever unwinds it.
    unsafe { longjmp(env as *mut JmpBuf, code) }
}

extern "C" fn fault_handler(_sig: c_int, info: *mut libc::siginfo_t, _ctx: *mut c_void) {
    // SAFETY: the kernel supplies a valid `siginfo_t` for the handler's duration.
    let fault = unsafe { (*info).si_addr() } as usize;

    let reverse_guard_start = RUN_STATE.reverse_guard_start.load(Ordering::SeqCst);
    let user_start = RUN_STATE.user_start.load(Ordering::SeqCst);
    let user_end = RUN_STATE.user_end.load(Ordering::SeqCst);
    let mapping_end = RUN_STATE.mapping_end.load(Ordering::SeqCst);

    if fault < reverse_guard_start || fault >= mapping_end {
        // Outside the tape entirely: an unrelated bug, not a tape boundary
        // hit. Let it fault the way it would with no handler installed.
        // SAFETY: re-raising the signal this handler pre-empted.
        unsafe { libc::raise(libc::SIGSEGV) };
        return;
    }

    let code = if fault < user_start {
        Status::TapeUnderflow.code()
    } else if fault >= user_end {
        Status::TapeExceeded.code()
    } else {
        Status::NoMemory.code()
    };

    transfer(code);
}

extern "C" fn timer_handler(_sig: c_int, _info: *mut libc::siginfo_t, _ctx: *mut c_void) {
    transfer(Status::TimeExceeded.code());
}

fn install_handler(
    signum: c_int,
    handler: extern "C" fn(c_int, *mut libc::siginfo_t, *mut c_void),
) -> Result<libc::sigaction, Status> {
    // SAFETY: zero-initialization is a valid `sigaction` bit pattern before
    // the fields below are set explicitly.
    let mut act: libc::sigaction = unsafe { std::mem::zeroed() };
    act.sa_sigaction = handler as usize;
    act.sa_flags = libc::SA_SIGINFO;
    // SAFETY: `act.sa_mask` is a valid, just-zeroed `sigset_t`.
    unsafe { libc::sigemptyset(&mut act.sa_mask) };

    // SAFETY: zero-initialization is overwritten entirely by `sigaction` on success.
    let mut old: libc::sigaction = unsafe { std::mem::zeroed() };
    // SAFETY: `act` and `old` are both valid `sigaction` values.
    let ret = unsafe { libc::sigaction(signum, &act, &mut old) };
    if ret != 0 {
        return Err(Status::Handler);
    }
    Ok(old)
}

fn restore_handler(signum: c_int, old: libc::sigaction) {
    // SAFETY: `old` was populated by a prior successful `install_handler` call.
    unsafe { libc::sigaction(signum, &old, std::ptr::null_mut()) };
}

fn install_timer(time_limit: Duration) -> Result<(), Status> {
    let timer = libc::itimerval {
        it_interval: libc::timeval { tv_sec: 0, tv_usec: 0 },
        it_value: libc::timeval {
            tv_sec: time_limit.as_secs() as libc::time_t,
            tv_usec: libc::suseconds_t::from(time_limit.subsec_micros()),
        },
    };
    // SAFETY: `timer` is fully initialized and the old-value pointer is null.
    let ret = unsafe { libc::setitimer(libc::ITIMER_VIRTUAL, &timer, std::ptr::null_mut()) };
    if ret != 0 {
        return Err(Status::Handler);
    }
    Ok(())
}

/// Compiles and runs `source`, returning the status the public entry point
/// reports.
///
/// This is the `Setup → Armed → Running → Torn-down` state machine: `Setup`
/// covers everything up through code generation and can fail cleanly before
/// any handler is installed; `Armed`→`Running` is the call into generated
/// code; `Running`→`Torn-down` happens either when that call returns
/// normally or a signal transfers control back to the recovery point below.
pub(crate) fn run(
    source: &[u8],
    max_data_size: usize,
    time_limit: Option<Duration>,
    input: InputFn,
    output: OutputFn,
) -> Status {
    let scan_result = match scanner::scan(source) {
        Ok(result) => result,
        Err(status) => return status,
    };

    let max_left = scan_result
        .instructions
        .iter()
        .filter(|i| i.op == Op::Left)
        .map(|i| i.value as usize)
        .max()
        .unwrap_or(0);
    let max_right = scan_result
        .instructions
        .iter()
        .filter(|i| i.op == Op::Right)
        .map(|i| i.value as usize)
        .max()
        .unwrap_or(0);

    let tape = match Tape::new(max_data_size, max_left, max_right) {
        Ok(tape) => tape,
        Err(status) => return status,
    };

    let mut buffer = match CodeBuffer::new() {
        Ok(buffer) => buffer,
        Err(status) => return status,
    };

    let mut instructions = scan_result.instructions;
    let branches = resolver::resolve(&mut instructions, scan_result.loop_count, &mut buffer);

    codegen::generate(
        &mut buffer,
        &instructions,
        &branches,
        tape.user_start(),
        input as usize,
        output as usize,
    );

    let entry = match buffer.finalize() {
        Ok(entry) => entry,
        Err(status) => return status,
    };
    // SAFETY: `finalize` just flipped the region to read+exec, and
    // `codegen::generate` emitted a complete, self-contained
    // prologue/body/epilogue sequence callable with no arguments.
    let entry: extern "C" fn() = unsafe { std::mem::transmute(entry) };

    let mut env = JmpBuf::new();
    let mut old_sigsegv: Option<libc::sigaction> = None;
    let mut old_vtalrm: Option<libc::sigaction> = None;

    // SAFETY: called directly from this frame, which does not return until
    // after the matching `longjmp` (from a handler below) or the normal
    // fall-through after `entry()` returns — the one hard requirement
    // `longjmp` imposes on its target frame.
    let first_return = unsafe { setjmp(&mut env) };

    if first_return == 0 {
        match install_handler(libc::SIGSEGV, fault_handler) {
            Ok(old) => old_sigsegv = Some(old),
            Err(status) => {
                drop(buffer);
                drop(tape);
                return status;
            }
        }

        if let Some(limit) = time_limit {
            match install_handler(libc::SIGVTALRM, timer_handler) {
                Ok(old) => {
                    old_vtalrm = Some(old);
                    if let Err(status) = install_timer(limit) {
                        restore_handler(libc::SIGSEGV, old_sigsegv.take().unwrap());
                        restore_handler(libc::SIGVTALRM, old_vtalrm.take().unwrap());
                        drop(buffer);
                        drop(tape);
                        return status;
                    }
                }
                Err(status) => {
                    restore_handler(libc::SIGSEGV, old_sigsegv.take().unwrap());
                    drop(buffer);
                    drop(tape);
                    return status;
                }
            }
        }

        arm(&tape, &mut env);
        tracing::debug!("entering generated code");
        entry();
    }

    // Reached either by `entry()` returning normally above, or by a signal
    // handler's `longjmp` landing back at the `setjmp` call.
    disarm();
    if let Some(old) = old_sigsegv.take() {
        restore_handler(libc::SIGSEGV, old);
    }
    if let Some(old) = old_vtalrm.take() {
        restore_handler(libc::SIGVTALRM, old);
    }

    let status = if first_return == 0 {
        Status::Ok
    } else {
        Status::from_longjmp_code(first_return)
    };

    drop(buffer);
    drop(tape);
    status
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn install_and_restore_a_handler_round_trips() {
        extern "C" fn noop(_sig: c_int, _info: *mut libc::siginfo_t, _ctx: *mut c_void) {}

        let old = install_handler(libc::SIGUSR1, noop).unwrap();
        restore_handler(libc::SIGUSR1, old);
    }

    #[test]
    fn run_state_starts_disarmed() {
        assert_eq!(RUN_STATE.env.load(Ordering::SeqCst), 0);
    }
}

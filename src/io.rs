//! The I/O callable ABI baked into generated code.
//!
//! Both callables are bare C function pointers, with no captured
//! environment slot — exactly what the generated code can call through an
//! immediate. Test code that needs stateful I/O routes it through a
//! thread-local instead of a closure, mirroring how a single-threaded test
//! harness would wire up file-descriptor-backed callbacks in C.

use std::cell::RefCell;

/// Takes no argument, returns a byte (0–255) on success or the end-of-input
/// sentinel (`-1`) otherwise.
pub type InputFn = extern "C" fn() -> i32;

/// Takes an integer whose low byte is written out; returns the same value.
pub type OutputFn = extern "C" fn(i32) -> i32;

thread_local! {
    static TEST_INPUT: RefCell<std::collections::VecDeque<u8>> = RefCell::new(std::collections::VecDeque::new());
    static TEST_OUTPUT: RefCell<Vec<u8>> = RefCell::new(Vec::new());
}

/// Queues bytes for [`test_input`] to hand out, one per call, in order.
pub fn set_test_input(bytes: &[u8]) {
    TEST_INPUT.with(|queue| queue.borrow_mut().extend(bytes.iter().copied()));
}

/// An [`InputFn`] backed by [`set_test_input`]'s thread-local queue; returns
/// the end-of-input sentinel once the queue is drained.
pub extern "C" fn test_input() -> i32 {
    TEST_INPUT.with(|queue| queue.borrow_mut().pop_front().map_or(-1, i32::from))
}

/// Clears any output previously collected by [`test_output`] on this thread.
pub fn clear_test_output() {
    TEST_OUTPUT.with(|buf| buf.borrow_mut().clear());
}

/// Returns everything [`test_output`] has collected on this thread so far.
pub fn take_test_output() -> Vec<u8> {
    TEST_OUTPUT.with(|buf| std::mem::take(&mut buf.borrow_mut()))
}

/// An [`OutputFn`] that appends its low byte to a thread-local buffer,
/// readable back through [`take_test_output`].
pub extern "C" fn test_output(value: i32) -> i32 {
    TEST_OUTPUT.with(|buf| buf.borrow_mut().push((value & 0xFF) as u8));
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_drains_then_returns_sentinel() {
        set_test_input(&[1, 2]);
        assert_eq!(test_input(), 1);
        assert_eq!(test_input(), 2);
        assert_eq!(test_input(), -1);
    }

    #[test]
    fn output_collects_low_bytes() {
        clear_test_output();
        test_output(0x141); // low byte 0x41 = 'A'
        test_output(b'B' as i32);
        assert_eq!(take_test_output(), b"AB");
    }
}

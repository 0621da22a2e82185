//! End-to-end scenarios: source text in, status and output bytes out.

use tarpit_jit::{
    clear_test_output, interpret, set_test_input, take_test_output, test_input, test_output,
    Status,
};

/// Surfaces `tracing` spans/events on stderr so a failing test's run can be
/// inspected without attaching a debugger; harmless to call more than once.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn run(source: &[u8], max_data_size: usize) -> (Status, Vec<u8>) {
    init_tracing();
    clear_test_output();
    let status = interpret(source, max_data_size, None, test_input, test_output);
    (status, take_test_output())
}

#[test]
fn hello_world() {
    let source = b"++++++++++[>+++++++>++++++++++>+++>+<<<<-]>++.>+.+++++++..+++.>++.\
<<+++++++++++++++.>.+++.------.--------.>+.>.";
    let (status, output) = run(source, 4096);
    assert_eq!(status, Status::Ok);
    assert_eq!(output, b"Hello World!\n");
}

#[test]
fn get_then_put_echoes_incremented_byte() {
    set_test_input(&[0x00]);
    let (status, output) = run(b",+.", 4096);
    assert_eq!(status, Status::Ok);
    assert_eq!(output, [0x01]);
}

#[test]
fn get_then_several_increments() {
    set_test_input(&[0x00]);
    let (status, output) = run(b",++++.", 4096);
    assert_eq!(status, Status::Ok);
    assert_eq!(output, [0x04]);
}

#[test]
fn nested_loop_leaves_two_cells_visited() {
    let (status, output) = run(b"+++[>++<-].>.", 4096);
    assert_eq!(status, Status::Ok);
    assert_eq!(output, [0x00, 0x06]);
}

#[test]
fn loop_multiplies_into_a_single_byte() {
    let (status, output) = run(b"+++++[>++++++++<-]>.", 4096);
    assert_eq!(status, Status::Ok);
    assert_eq!(output, [40]);
}

#[test]
fn unbounded_right_growth_hits_the_tape_limit() {
    let (status, _) = run(b"+[>+]", 512 * 1024);
    assert_eq!(status, Status::TapeExceeded);
}

#[test]
fn unmatched_open_bracket_is_unbalanced() {
    let (status, _) = run(b"[", 4096);
    assert_eq!(status, Status::Unbalanced);
}

#[test]
fn unmatched_close_bracket_is_unbalanced() {
    let (status, _) = run(b"]", 4096);
    assert_eq!(status, Status::Unbalanced);

    let (status, _) = run(b"[]]", 4096);
    assert_eq!(status, Status::Unbalanced);
}

#[test]
fn subtract_then_add_wraps_back_to_zero() {
    let (status, output) = run(b"-+.", 4096);
    assert_eq!(status, Status::Ok);
    assert_eq!(output, [0x00]);
}

#[test]
fn moving_left_at_the_origin_clamps_instead_of_underflowing() {
    let (status, output) = run(b"<.", 4096);
    assert_eq!(status, Status::Ok);
    assert_eq!(output, [0x00]);
}

#[test]
fn a_program_that_never_moves_the_pointer_never_faults() {
    let (status, _) = run(b"++++++++++++++++++++++++++++++++++++++++++++++++.", 4096);
    assert_eq!(status, Status::Ok);
}

#[test]
fn running_the_same_program_twice_is_idempotent() {
    let (first_status, first_output) = run(b"+++.", 4096);
    let (second_status, second_output) = run(b"+++.", 4096);
    assert_eq!(first_status, second_status);
    assert_eq!(first_output, second_output);
}

#[test]
fn ignores_bytes_outside_the_eight_operators() {
    let (status, output) = run(b"start +++ comment . end", 4096);
    assert_eq!(status, Status::Ok);
    assert_eq!(output, [0x03]);
}

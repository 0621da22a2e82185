//! Walks the condensed instruction list and emits native code for it,
//! wrapped in the prologue/epilogue sequence generated code needs to be
//! callable as a plain `extern "C" fn()`.

use crate::arch::Arch;
use crate::buffer::CodeBuffer;
use crate::emitter;
use crate::program::{BranchRecord, Instruction, Op};
use crate::registers::{EAX, EBP, EBX, EDI, ESP};

/// End-of-input sentinel the input provider returns; matches the value
/// `-1` has always carried in this design.
const EOF_SENTINEL: u32 = u32::MAX;

/// Emits prologue, per-instruction bodies, and epilogue into `buffer`.
///
/// `tape_start` is the base address of the tape's user region; `input_fn`
/// and `output_fn` are the two I/O callables' addresses, baked in as
/// immediates. `branches` must have one entry per loop, in the order
/// [`crate::resolver::resolve`] created them, with each `Op::EndIf`'s
/// `branch` field indexing into it.
pub fn generate(
    buffer: &mut CodeBuffer,
    instructions: &[Instruction],
    branches: &[BranchRecord],
    tape_start: usize,
    input_fn: usize,
    output_fn: usize,
) {
    prologue(buffer, tape_start);

    // `Op::If` entries don't carry their own ordinal, only the matching
    // `Op::EndIf` does. The resolver allocates `branches` in the same
    // left-to-right order `If`s are encountered, so a plain counter recovers
    // it here without needing a stack.
    let mut next_if = 0usize;

    for instruction in instructions {
        match instruction.op {
            Op::Right => emit_right(buffer, instruction.value),
            Op::Left => emit_left(buffer, instruction.value, tape_start),
            Op::Modify => emit_modify(buffer, instruction.value),
            Op::Put => emit_put(buffer, output_fn),
            Op::Get => emit_get(buffer, input_fn),
            Op::If => {
                let record = &branches[next_if];
                next_if += 1;
                emitter::cmp_rm8_imm8(buffer, EBX, 0);
                emitter::je(buffer, record.end);
                buffer.bind_label(record.top);
            }
            Op::EndIf => {
                let record = &branches[instruction.branch];
                emitter::cmp_rm8_imm8(buffer, EBX, 0);
                emitter::jne(buffer, record.top);
                buffer.bind_label(record.end);
            }
        }
    }

    epilogue(buffer);
}

fn prologue(buffer: &mut CodeBuffer, tape_start: usize) {
    let word_size = Arch::host().word_size();
    let padding = 16 - 2 * word_size;

    emitter::push_r(buffer, EBP);
    emitter::mov_r_r(buffer, EBP, ESP);
    emitter::and_r_immz32(buffer, ESP, !15u32);
    emitter::push_r(buffer, EBX);
    emitter::push_r(buffer, EDI);
    if padding != 0 {
        emitter::sub_r_immz32(buffer, ESP, padding as u32);
    }
    emitter::mov_r_immptr(buffer, EBX, tape_start);
}

fn epilogue(buffer: &mut CodeBuffer) {
    let word_size = Arch::host().word_size();
    let padding = 16 - 2 * word_size;

    if padding != 0 {
        emitter::add_r_immz32(buffer, ESP, padding as u32);
    }
    emitter::pop_r(buffer, EDI);
    emitter::pop_r(buffer, EBX);
    emitter::xor_r_r(buffer, EAX, EAX);
    emitter::leave(buffer);
    emitter::ret(buffer);
}

fn emit_right(buffer: &mut CodeBuffer, n: i64) {
    if n == 0 {
        return;
    }
    emitter::add_r_immz32(buffer, EBX, n as u32);
}

fn emit_left(buffer: &mut CodeBuffer, n: i64, tape_start: usize) {
    if n == 0 {
        return;
    }

    let min = tape_start
        .checked_add(n as usize)
        .expect("tape guard sizing should preclude this overflow");

    if Arch::host().needs_rex_w() {
        emitter::mov_r_immptr(buffer, EDI, min);
        emitter::cmp_r_r(buffer, EBX, EDI);
    } else {
        emitter::cmp_r_immz32(buffer, EBX, min as u32);
    }

    let min_label = buffer.create_label();
    let fin_label = buffer.create_label();
    emitter::jle(buffer, min_label);
    emitter::sub_r_immz32(buffer, EBX, n as u32);
    emitter::jmp(buffer, fin_label);
    buffer.bind_label(min_label);
    emitter::mov_r_immptr(buffer, EBX, tape_start);
    buffer.bind_label(fin_label);
}

fn emit_modify(buffer: &mut CodeBuffer, v: i64) {
    let byte = (v & 0xFF) as u8;
    if byte == 0 {
        return;
    }
    emitter::add_rm8_imm8(buffer, EBX, byte);
}

fn emit_put(buffer: &mut CodeBuffer, output_fn: usize) {
    emitter::xor_r_r(buffer, EAX, EAX);
    emitter::mov_r8_rm8(buffer, EAX, EBX);
    if Arch::host().needs_rex_w() {
        emitter::mov_r_r(buffer, EDI, EAX);
    } else {
        emitter::mov_rm_rint(buffer, 0, EAX);
    }
    emitter::call_absolute(buffer, EAX, output_fn);
}

fn emit_get(buffer: &mut CodeBuffer, input_fn: usize) {
    emitter::call_absolute(buffer, EAX, input_fn);
    emitter::cmp_r32_immz32(buffer, EAX, EOF_SENTINEL);
    let skip_label = buffer.create_label();
    emitter::jne(buffer, skip_label);
    emitter::xor_r_r(buffer, EAX, EAX);
    buffer.bind_label(skip_label);
    emitter::mov_rm8_r8(buffer, EBX, EAX);
}

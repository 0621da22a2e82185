//! The x86 emission catalogue: one function per native operation the code
//! generator needs, each hiding the 32-/64-bit REX.W difference behind
//! [`crate::arch::Arch::host`].
//!
//! Every emitter takes the [`CodeBuffer`] to append to and the operands it
//! needs; none of them know anything about the Brainfuck-shaped instruction
//! stream above them. Register arguments are `debug_assert!`ed below 8
//! rather than type-enforced, matching how [`crate::registers::Register`]
//! itself is kept a thin newtype.

use crate::arch::Arch;
use crate::buffer::{CodeBuffer, LabelId};
use crate::registers::{Register, EAX, EBP, EDI, EDX, ESP};

fn modrm(mod_bits: u8, reg: Register, rm: Register) -> u8 {
    debug_assert!(reg.encoding() < Register::COUNT);
    debug_assert!(rm.encoding() < Register::COUNT);
    (mod_bits << 6) | (reg.encoding() << 3) | rm.encoding()
}

fn rex_w(buf: &mut CodeBuffer) {
    if Arch::host().needs_rex_w() {
        buf.append_u8(0x48);
    }
}

/// `add byte [rm], imm8`
pub fn add_rm8_imm8(buf: &mut CodeBuffer, rm: Register, imm: u8) {
    buf.append_u8(0x80);
    buf.append_u8(modrm(0b00, EAX, rm));
    buf.append_u8(imm);
}

/// `add r, imm32` (sign-extended to pointer width when REX.W applies)
pub fn add_r_immz32(buf: &mut CodeBuffer, r: Register, imm: u32) {
    rex_w(buf);
    if r == EAX {
        buf.append_u8(0x05);
    } else {
        buf.append_u8(0x81);
        buf.append_u8(modrm(0b11, EAX, r));
    }
    buf.append_u32(imm);
}

/// `and r, imm32`
pub fn and_r_immz32(buf: &mut CodeBuffer, r: Register, imm: u32) {
    rex_w(buf);
    buf.append_u8(0x81);
    buf.append_u8(modrm(0b11, ESP, r));
    buf.append_u32(imm);
}

/// `call` to an absolute pointer loaded into a scratch register first, since
/// a direct rel32 call can't reach an arbitrary host function from a
/// freshly-`mmap`'d buffer.
pub fn call_absolute(buf: &mut CodeBuffer, scratch: Register, target: usize) {
    mov_r_immptr(buf, scratch, target);
    buf.append_u8(0xff);
    buf.append_u8(modrm(0b11, EDX, scratch));
}

/// `cmp byte [rm], imm8`
pub fn cmp_rm8_imm8(buf: &mut CodeBuffer, rm: Register, imm: u8) {
    buf.append_u8(0x80);
    buf.append_u8(modrm(0b00, EDI, rm));
    buf.append_u8(imm);
}

/// `cmp r, imm32`, at pointer width (REX.W on the 64-bit variant). For
/// comparing an actual pointer-sized value, e.g. the tape pointer against a
/// clamp bound.
pub fn cmp_r_immz32(buf: &mut CodeBuffer, r: Register, imm: u32) {
    rex_w(buf);
    buf.append_u8(0x81);
    buf.append_u8(modrm(0b11, EDI, r));
    buf.append_u32(imm);
}

/// `cmp r, imm32`, always at 32-bit width regardless of `Arch::host()`. For
/// comparing a genuine 32-bit `int` value, e.g. a C-ABI call's return value
/// — REX.W here would compare against the callee-preserved register's full,
/// zero-extended pointer width, which a sign-extended 32-bit immediate like
/// `-1` can never equal.
pub fn cmp_r32_immz32(buf: &mut CodeBuffer, r: Register, imm: u32) {
    buf.append_u8(0x81);
    buf.append_u8(modrm(0b11, EDI, r));
    buf.append_u32(imm);
}

/// `cmp ra, rb`
pub fn cmp_r_r(buf: &mut CodeBuffer, ra: Register, rb: Register) {
    buf.append_u8(0x39);
    buf.append_u8(modrm(0b11, rb, ra));
}

/// `je label` (near, rel32)
pub fn je(buf: &mut CodeBuffer, label: LabelId) {
    buf.append_u8(0x0f);
    buf.append_u8(0x84);
    buf.append_label_ref(label);
}

/// `jne label` (near, rel32)
pub fn jne(buf: &mut CodeBuffer, label: LabelId) {
    buf.append_u8(0x0f);
    buf.append_u8(0x85);
    buf.append_label_ref(label);
}

/// `jmp label` (near, rel32)
pub fn jmp(buf: &mut CodeBuffer, label: LabelId) {
    buf.append_u8(0xe9);
    buf.append_label_ref(label);
}

/// `jle label` (near, rel32, signed less-or-equal)
pub fn jle(buf: &mut CodeBuffer, label: LabelId) {
    buf.append_u8(0x0f);
    buf.append_u8(0x8e);
    buf.append_label_ref(label);
}

/// `leave` (`mov esp, ebp` then `pop ebp`)
pub fn leave(buf: &mut CodeBuffer) {
    buf.append_u8(0xc9);
}

/// `movzx r8, byte [rm]` narrowed to an 8-bit destination register read.
pub fn mov_r8_rm8(buf: &mut CodeBuffer, r: Register, rm: Register) {
    buf.append_u8(0x0f);
    buf.append_u8(0xb6);
    buf.append_u8(modrm(0b00, r, rm));
}

/// `mov byte [rm], r8`
pub fn mov_rm8_r8(buf: &mut CodeBuffer, rm: Register, r: Register) {
    buf.append_u8(0x88);
    buf.append_u8(modrm(0b00, r, rm));
}

/// `mov rd, rs`
pub fn mov_r_r(buf: &mut CodeBuffer, rd: Register, rs: Register) {
    rex_w(buf);
    buf.append_u8(0x89);
    buf.append_u8(modrm(0b11, rs, rd));
}

/// `mov r, imm` where `imm` is a pointer-width absolute value.
pub fn mov_r_immptr(buf: &mut CodeBuffer, r: Register, imm: usize) {
    rex_w(buf);
    buf.append_u8(0xb8 + r.encoding());
    buf.append_ptr(imm);
}

/// Stores a 32-bit argument at `[esp + offset]`, the calling convention this
/// crate's generated code uses to pass arguments to `extern "C"` I/O
/// callbacks on the 32-bit target; unused on 64-bit, where arguments travel
/// in registers.
pub fn mov_rm_rint(buf: &mut CodeBuffer, offset: u8, r: Register) {
    buf.append_u8(0x89);
    buf.append_u8(modrm(0b01, r, ESP));
    buf.append_u8(0x24); // SIB: [esp]
    buf.append_u8(offset);
}

/// `pop r`
pub fn pop_r(buf: &mut CodeBuffer, r: Register) {
    buf.append_u8(0x58 + r.encoding());
}

/// `push r`
pub fn push_r(buf: &mut CodeBuffer, r: Register) {
    buf.append_u8(0x50 + r.encoding());
}

/// `ret`
pub fn ret(buf: &mut CodeBuffer) {
    buf.append_u8(0xc3);
}

/// `sub r, imm32`
pub fn sub_r_immz32(buf: &mut CodeBuffer, r: Register, imm: u32) {
    rex_w(buf);
    if r == EAX {
        buf.append_u8(0x2d);
    } else {
        buf.append_u8(0x81);
        buf.append_u8(modrm(0b11, EBP, r));
    }
    buf.append_u32(imm);
}

/// `xor ra, rb`
pub fn xor_r_r(buf: &mut CodeBuffer, ra: Register, rb: Register) {
    buf.append_u8(0x31);
    buf.append_u8(modrm(0b11, rb, ra));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registers::EBX;

    #[test]
    fn ret_emits_one_byte() {
        let mut buf = CodeBuffer::new().unwrap();
        let start = buf.offset();
        ret(&mut buf);
        assert_eq!(buf.offset() - start, 1);
    }

    #[test]
    fn push_and_pop_are_one_byte_each() {
        let mut buf = CodeBuffer::new().unwrap();
        let start = buf.offset();
        push_r(&mut buf, EBX);
        pop_r(&mut buf, EAX);
        assert_eq!(buf.offset() - start, 2);
    }

    #[test]
    fn mov_r_immptr_width_matches_arch() {
        let mut buf = CodeBuffer::new().unwrap();
        let start = buf.offset();
        mov_r_immptr(&mut buf, EAX, 0x1234);
        let expected = 1 + Arch::host().word_size() + usize::from(Arch::host().needs_rex_w());
        assert_eq!(buf.offset() - start, expected);
    }

    #[test]
    fn jmp_reserves_five_bytes_for_a_forward_label() {
        let mut buf = CodeBuffer::new().unwrap();
        let label = buf.create_label();
        let start = buf.offset();
        jmp(&mut buf, label);
        assert_eq!(buf.offset() - start, 5);
        buf.bind_label(label);
    }
}

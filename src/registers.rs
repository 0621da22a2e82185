/*!
x86 general-purpose register definitions.

Only the eight low-numbered registers are modeled — the ones reachable with a
plain 3-bit ModR/M/SIB field and no REX.R/REX.B extension. The code generator
never needs the extended register set, so emitters simply `debug_assert!`
that a register's encoding is below 8 rather than accepting it as a type
invariant.
*/

use core::fmt;

/// A single x86 general-purpose register, named by its 32-bit (`E`-prefixed)
/// form regardless of which [`crate::arch::Arch`] is active; on the 64-bit
/// variant the same encoding addresses the corresponding 64-bit (`R`-prefixed)
/// register once REX.W is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Register(u8);

/// Accumulator. Caller-clobbered; used as scratch and as the `get` return value.
pub const EAX: Register = Register(0);
/// Caller-clobbered general-purpose register.
pub const ECX: Register = Register(1);
/// Caller-clobbered general-purpose register.
pub const EDX: Register = Register(2);
/// Callee-preserved. Holds the tape pointer (*P*) throughout generated code.
pub const EBX: Register = Register(3);
/// Stack pointer.
pub const ESP: Register = Register(4);
/// Frame pointer.
pub const EBP: Register = Register(5);
/// Caller-clobbered general-purpose register.
pub const ESI: Register = Register(6);
/// Callee-preserved. Used as a scratch for 64-bit immediates that can't be
/// compared directly, and as the first-argument register on the 64-bit ABI.
pub const EDI: Register = Register(7);

impl Register {
    /// The number of low-numbered general-purpose registers this module models.
    pub const COUNT: u8 = 8;

    /// This register's 3-bit ModR/M/SIB encoding.
    #[must_use]
    pub const fn encoding(self) -> u8 {
        self.0
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self.0 {
            0 => "eax",
            1 => "ecx",
            2 => "edx",
            3 => "ebx",
            4 => "esp",
            5 => "ebp",
            6 => "esi",
            7 => "edi",
            other => return write!(f, "r{other}?"),
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodings_are_below_eight() {
        for reg in [EAX, ECX, EDX, EBX, ESP, EBP, ESI, EDI] {
            assert!(reg.encoding() < Register::COUNT);
        }
    }

    #[test]
    fn display_names_match_encoding() {
        assert_eq!(EAX.to_string(), "eax");
        assert_eq!(EBX.to_string(), "ebx");
        assert_eq!(EDI.to_string(), "edi");
    }
}

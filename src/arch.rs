//! The narrow 32-/64-bit split in native emission.
//!
//! Everything architecture-specific in this crate reduces to three
//! decisions, all made here and consumed by [`crate::emitter`]/[`crate::codegen`]:
//! whether pointer-width operations carry a REX.W prefix, whether a `cmp`
//! against a pointer-sized immediate must be routed through a scratch
//! register, and which register carries the first argument of an external
//! call. None of this leaks into the scanner, resolver, or program
//! representation.

/// Which of the two supported x86 variants the generated code targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arch {
    /// 32-bit (IA-32): pointer-sized operations are 32 bits wide, no REX prefixes.
    X86,
    /// 64-bit (x86-64): pointer-sized operations carry a REX.W prefix.
    X64,
}

impl Arch {
    /// The architecture of the process this code is running in.
    #[must_use]
    pub const fn host() -> Self {
        if cfg!(target_pointer_width = "64") {
            Arch::X64
        } else {
            Arch::X86
        }
    }

    /// Size in bytes of a pointer-width value on this architecture.
    #[must_use]
    pub const fn word_size(self) -> usize {
        match self {
            Arch::X86 => 4,
            Arch::X64 => 8,
        }
    }

    /// Whether pointer-width emitters must carry the REX.W prefix byte.
    #[must_use]
    pub const fn needs_rex_w(self) -> bool {
        matches!(self, Arch::X64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_matches_target_pointer_width() {
        let arch = Arch::host();
        assert_eq!(arch.word_size(), std::mem::size_of::<usize>());
        assert_eq!(arch.needs_rex_w(), cfg!(target_pointer_width = "64"));
    }
}

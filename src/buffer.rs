//! The executable-memory arena: append-only byte emission, label bookkeeping,
//! and the one-way writable-to-executable transition.

use std::ptr::NonNull;

use crate::status::Status;

/// One megabyte is ample for every program the rest of this crate can be
/// asked to compile; the buffer never grows.
const BUFFER_SIZE: usize = 1 << 20;

/// A pending or resolved jump target.
///
/// Unresolved labels carry the buffer offsets of every 32-bit displacement
/// slot that must be patched once the label is bound ("source sites" in the
/// design's vocabulary); resolved labels just carry the offset they were
/// bound at.
#[derive(Debug)]
enum LabelState {
    Unresolved(Vec<usize>),
    Resolved(usize),
}

/// Handle to a label created by a [`CodeBuffer`]. Opaque, cheap to copy,
/// meaningless outside the buffer that created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelId(usize);

/// An append-only, eventually-executable code buffer.
///
/// Backed by a single anonymous `mmap`'d region. Bytes are appended at a
/// monotonically increasing offset until [`CodeBuffer::finalize`] flips the
/// region from read+write to read+exec, after which the entry pointer it
/// returns may be called.
pub struct CodeBuffer {
    region: NonNull<u8>,
    size: usize,
    offset: usize,
    finalized: bool,
    labels: Vec<LabelState>,
}

impl CodeBuffer {
    /// Maps a fresh read+write region and returns an empty buffer over it.
    pub fn new() -> Result<Self, Status> {
        // SAFETY: a null-fd, anonymous, private mapping request; failure is
        // reported through the return value, not through errno inspection,
        // since MAP_FAILED is the only failure mode we need to distinguish.
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                BUFFER_SIZE,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(Status::MmapError);
        }

        tracing::trace!(bytes = BUFFER_SIZE, "mapped code buffer");
        Ok(Self {
            // SAFETY: mmap succeeded, so ptr is non-null.
            region: unsafe { NonNull::new_unchecked(ptr.cast::<u8>()) },
            size: BUFFER_SIZE,
            offset: 0,
            finalized: false,
            labels: Vec::new(),
        })
    }

    /// Current append offset, i.e. the number of bytes emitted so far.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }

    fn check_space(&self, additional: usize) {
        debug_assert!(
            self.offset + additional <= self.size,
            "code buffer exhausted: offset {} + {additional} > {}",
            self.offset,
            self.size
        );
    }

    fn byte_at(&mut self, offset: usize) -> *mut u8 {
        // SAFETY: callers only pass offsets already checked against `size`.
        unsafe { self.region.as_ptr().add(offset) }
    }

    /// Appends a single byte.
    pub fn append_u8(&mut self, value: u8) {
        self.check_space(1);
        // SAFETY: space was just checked, and the region is writable until finalized.
        unsafe { self.byte_at(self.offset).write(value) };
        self.offset += 1;
    }

    /// Appends a 32-bit little-endian word.
    pub fn append_u32(&mut self, value: u32) {
        self.check_space(4);
        let bytes = value.to_le_bytes();
        // SAFETY: 4 bytes fit, as checked above.
        unsafe { self.byte_at(self.offset).copy_from_nonoverlapping(bytes.as_ptr(), 4) };
        self.offset += 4;
    }

    /// Appends a pointer-sized little-endian word (4 or 8 bytes, matching `Arch::host()`).
    pub fn append_ptr(&mut self, value: usize) {
        let word_size = crate::arch::Arch::host().word_size();
        self.check_space(word_size);
        let bytes = value.to_le_bytes();
        // SAFETY: `word_size` bytes fit, as checked above; `bytes` is 8 bytes
        // wide regardless of host width, we only copy the low `word_size` of them.
        unsafe {
            self.byte_at(self.offset)
                .copy_from_nonoverlapping(bytes.as_ptr(), word_size);
        }
        self.offset += word_size;
    }

    /// Creates a new, unresolved label.
    pub fn create_label(&mut self) -> LabelId {
        let id = LabelId(self.labels.len());
        self.labels.push(LabelState::Unresolved(Vec::new()));
        id
    }

    /// Appends a 32-bit displacement referencing `label`: `target - (site + 4)`.
    ///
    /// If the label is already bound, the displacement is computed and
    /// written immediately; otherwise a pending source site is registered
    /// and patched in once [`CodeBuffer::bind_label`] resolves it.
    pub fn append_label_ref(&mut self, label: LabelId) {
        self.check_space(4);
        let site = self.offset;
        match &mut self.labels[label.0] {
            LabelState::Resolved(target) => {
                let displacement = (*target as i64) - (site as i64 + 4);
                self.append_u32(displacement as i32 as u32);
            }
            LabelState::Unresolved(sites) => {
                sites.push(site);
                self.append_u32(0);
            }
        }
    }

    /// Binds `label` at the current offset, patching every pending source site.
    pub fn bind_label(&mut self, label: LabelId) {
        let resolved_at = self.offset;
        let sites = match std::mem::replace(&mut self.labels[label.0], LabelState::Resolved(resolved_at)) {
            LabelState::Unresolved(sites) => sites,
            LabelState::Resolved(_) => panic!("label bound twice"),
        };

        for site in sites {
            let displacement = (resolved_at as i64) - (site as i64 + 4);
            let bytes = (displacement as i32).to_le_bytes();
            // SAFETY: `site` was recorded by `append_label_ref`, which always
            // reserved 4 writable bytes at that offset.
            unsafe { self.byte_at(site).copy_from_nonoverlapping(bytes.as_ptr(), 4) };
        }

        tracing::trace!(offset = resolved_at, "bound label");
    }

    /// Flips the region from read+write to read+exec and returns the entry
    /// pointer (the buffer's base address). Idempotent.
    pub fn finalize(&mut self) -> Result<*const (), Status> {
        if !self.finalized {
            // SAFETY: region/size describe the mapping created in `new`.
            let ret = unsafe {
                libc::mprotect(
                    self.region.as_ptr().cast(),
                    self.size,
                    libc::PROT_READ | libc::PROT_EXEC,
                )
            };
            if ret != 0 {
                return Err(Status::MmapError);
            }
            self.finalized = true;
            tracing::debug!(bytes = self.offset, "finalized code buffer");
        }
        Ok(self.region.as_ptr().cast_const().cast())
    }
}

impl Drop for CodeBuffer {
    fn drop(&mut self) {
        for label in &self.labels {
            debug_assert!(
                matches!(label, LabelState::Resolved(_)),
                "code buffer dropped with an unresolved label"
            );
        }

        // SAFETY: region/size describe the mapping created in `new`; this is
        // the only place it is ever unmapped.
        let ret = unsafe { libc::munmap(self.region.as_ptr().cast(), self.size) };
        debug_assert_eq!(ret, 0, "munmap of code buffer failed");
    }
}

//! The guarded data tape: a page-aligned read+write region flanked by
//! `PROT_NONE` guard pages that turn an out-of-bounds pointer move into a
//! page fault the runtime envelope can classify.

use crate::status::Status;

fn page_size() -> Result<usize, Status> {
    // SAFETY: `sysconf` with `_SC_PAGESIZE` has no preconditions.
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    usize::try_from(size).map_err(|_| Status::PageSize)
}

fn pages_for(byte_count: usize, page_size: usize) -> Result<usize, Status> {
    if byte_count == 0 {
        return Ok(0);
    }
    byte_count
        .checked_add(page_size - 1)
        .map(|rounded| rounded / page_size)
        .ok_or(Status::GuardError)
}

/// A mapped tape: `reverse_guard` pages of `PROT_NONE`, then the user
/// region (read+write, at least `max_data_size` bytes, rounded up to a
/// whole page), then `forward_guard` pages of `PROT_NONE`.
pub struct Tape {
    base: *mut u8,
    total_len: usize,
    /// Offset of the user region's first byte within the mapping.
    user_offset: usize,
    user_len: usize,
}

impl Tape {
    /// Maps a tape sized for `max_data_size` bytes of user-visible storage
    /// and guard pages wide enough to catch a pointer moving `max_left`
    /// cells backward or `max_right` cells forward from the origin.
    pub fn new(max_data_size: usize, max_left: usize, max_right: usize) -> Result<Self, Status> {
        let page_size = page_size()?;
        let reverse_guard = pages_for(max_left, page_size)?;
        let user_pages = pages_for(max_data_size.max(1), page_size)?;
        let forward_guard = pages_for(max_right, page_size)?;

        let user_len = user_pages * page_size;
        let reverse_len = reverse_guard * page_size;
        let forward_len = forward_guard * page_size;
        let total_len = reverse_len
            .checked_add(user_len)
            .and_then(|n| n.checked_add(forward_len))
            .ok_or(Status::GuardError)?;

        // SAFETY: anonymous, private, no-access mapping; PROT_NONE makes the
        // whole region initially inaccessible, narrowed below.
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                total_len,
                libc::PROT_NONE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(Status::MmapError);
        }
        let base = ptr.cast::<u8>();

        if user_len > 0 {
            // SAFETY: `base + reverse_len` through `+ user_len` lies within
            // the mapping just created, and is not yet aliased elsewhere.
            let ret = unsafe {
                libc::mprotect(
                    base.add(reverse_len).cast(),
                    user_len,
                    libc::PROT_READ | libc::PROT_WRITE,
                )
            };
            if ret != 0 {
                // SAFETY: undoes the mapping just created on this error path.
                unsafe { libc::munmap(ptr, total_len) };
                return Err(Status::MmapError);
            }
        }

        tracing::trace!(
            reverse_guard,
            user_pages,
            forward_guard,
            page_size,
            "mapped tape"
        );

        Ok(Self {
            base,
            total_len,
            user_offset: reverse_len,
            user_len,
        })
    }

    /// Base address of the user-writable region, i.e. cell 0.
    #[must_use]
    pub fn user_start(&self) -> usize {
        // SAFETY: pointer arithmetic only, no dereference.
        unsafe { self.base.add(self.user_offset) as usize }
    }

    /// Address one past the last byte of the user-writable region.
    #[must_use]
    pub fn user_end(&self) -> usize {
        self.user_start() + self.user_len
    }

    /// Address one past the last byte of the reverse guard, i.e. the first
    /// address a backward fault can land on.
    #[must_use]
    pub fn reverse_guard_start(&self) -> usize {
        self.base as usize
    }

    /// Address one past the last byte of the whole mapping, i.e. the first
    /// address past the forward guard.
    #[must_use]
    pub fn mapping_end(&self) -> usize {
        self.base as usize + self.total_len
    }
}

impl Drop for Tape {
    fn drop(&mut self) {
        // SAFETY: `base`/`total_len` describe the mapping created in `new`;
        // this is the only place it is ever unmapped.
        let ret = unsafe { libc::munmap(self.base.cast(), self.total_len) };
        debug_assert_eq!(ret, 0, "munmap of tape failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_region_is_writable_and_guards_are_not() {
        let tape = Tape::new(64, 1, 1).unwrap();
        assert!(tape.user_end() > tape.user_start());
        // SAFETY: user_start() is inside the just-mapped read+write region.
        unsafe { (tape.user_start() as *mut u8).write(42) };
        // SAFETY: immediate readback of the byte just written.
        let read_back = unsafe { (tape.user_start() as *const u8).read() };
        assert_eq!(read_back, 42);
    }

    #[test]
    fn zero_movement_still_allocates_a_user_page() {
        let tape = Tape::new(1, 0, 0).unwrap();
        assert_eq!(tape.reverse_guard_start(), tape.user_start());
        assert!(tape.user_end() < tape.mapping_end() || tape.user_end() == tape.mapping_end());
    }

    #[test]
    fn guard_regions_flank_the_user_region() {
        let tape = Tape::new(4096, 4096, 8192).unwrap();
        assert!(tape.reverse_guard_start() < tape.user_start());
        assert!(tape.user_end() < tape.mapping_end());
    }

    #[test]
    fn pages_for_rounds_up() {
        assert_eq!(pages_for(0, 4096).unwrap(), 0);
        assert_eq!(pages_for(1, 4096).unwrap(), 1);
        assert_eq!(pages_for(4096, 4096).unwrap(), 1);
        assert_eq!(pages_for(4097, 4096).unwrap(), 2);
    }

    #[test]
    fn pages_for_rejects_overflow() {
        assert_eq!(pages_for(usize::MAX, 4096).unwrap_err(), Status::GuardError);
    }
}

//! The interpreter's allocator.
//!
//! Small blocks (up to 64 bytes) come from four size-class free lists
//! {8, 16, 32, 64} backed by ~4 KB chunks carved off the system
//! allocator; anything larger falls through to `malloc` directly. A
//! free block stores the next free-list link in its own first word, so
//! there is no per-block overhead at all.
//!
//! The allocator keeps an approximate count of bytes in use and asks
//! the collector to run when the count crosses a limit; the limit is
//! recomputed after each collection (see `gc.rs`). The count is only
//! approximate because `free` does not know the size of the block it
//! is given and has to estimate.
//!
//! Chunks are never returned to the system until interpreter
//! shutdown (`drop_all_small_allocations`).

use crate::err::{set_error, Res};
use crate::interp::Interp;
use tracing::trace;

/// Largest block served from a free list.
pub const FLIST_LIMIT: usize = 64;

/// Payload of one chunk: 4 KB minus the link word.
const CHUNK_DATA: usize = 4096 - std::mem::size_of::<*mut Chunk>();

/// A chunk of memory in which to keep dense allocations of small
/// objects, linked so shutdown can free them all.
#[repr(C)]
struct Chunk {
    data: [u8; CHUNK_DATA],
    next: *mut Chunk,
}

/// Size class for a block of `z` bytes, `1 <= z <= FLIST_LIMIT`.
/// Classes are {8, 16, 32, 64}: class `floor((z-1)/8)` mapped through
/// the width table.
#[inline(always)]
pub fn flist_index(z: usize) -> usize {
    const WHICH_FLIST: [usize; 8] = [0, 1, 2, 2, 3, 3, 3, 3];
    debug_assert!(z >= 1 && z <= FLIST_LIMIT);
    WHICH_FLIST[(z - 1) >> 3]
}

/// Allocator state. Lives inside [`Interp`]; the entry points are
/// methods on `Interp` because an allocation may trigger a collection.
pub struct Alloc {
    /// Heads of the four fast free lists.
    flists: [*mut u8; 4],
    /// Next unused byte within the current chunk, per size class.
    chunk_next: [*mut u8; 4],
    /// End of the current chunk, per size class.
    chunk_limit: [*mut u8; 4],
    /// All chunks ever allocated, for shutdown.
    chunks: *mut Chunk,
    /// Number of chunks allocated.
    pub nchunks: usize,
    /// Approximate bytes currently allocated.
    pub mem: usize,
    /// Collection trigger: when `mem` exceeds this, collect.
    pub limit: usize,
    /// Count of outstanding `alloc` (unsized) blocks.
    n_allocs: usize,
    /// Estimated bytes outstanding through `alloc`.
    alloc_mem: usize,
}

impl Alloc {
    pub fn new(initial_limit: usize) -> Alloc {
        Alloc {
            flists: [std::ptr::null_mut(); 4],
            chunk_next: [std::ptr::null_mut(); 4],
            chunk_limit: [std::ptr::null_mut(); 4],
            chunks: std::ptr::null_mut(),
            nchunks: 0,
            mem: 0,
            limit: initial_limit,
            n_allocs: 0,
            alloc_mem: 0,
        }
    }

    /// Free every chunk. For interpreter shutdown only: every small
    /// block becomes invalid at once.
    pub unsafe fn drop_all_small_allocations(&mut self) {
        while !self.chunks.is_null() {
            let c = self.chunks;
            self.chunks = (*c).next;
            libc::free(c as *mut libc::c_void);
        }
        self.nchunks = 0;
        self.flists = [std::ptr::null_mut(); 4];
        self.chunk_next = [std::ptr::null_mut(); 4];
        self.chunk_limit = [std::ptr::null_mut(); 4];
    }
}

impl Interp {
    /// Allocate `z` bytes whose size the caller will remember: the
    /// same `z` must be passed to `nfree`. Small sizes come from the
    /// fast free lists. Returns with the error set on exhaustion.
    pub fn nalloc(&mut self, z: usize) -> Res<*mut u8> {
        self.heap.mem += z;
        if self.heap.mem > self.heap.limit {
            self.collect();
        }

        if !cfg!(feature = "all-malloc") && z >= 1 && z <= FLIST_LIMIT {
            let fi = flist_index(z);

            // Try the free list first.
            let head = self.heap.flists[fi];
            if !head.is_null() {
                unsafe {
                    self.heap.flists[fi] = *(head as *mut *mut u8);
                }
                return Ok(head);
            }

            // Free list empty: rip a bit more off the current chunk.
            let cz = 8usize << fi;
            unsafe {
                if !self.heap.chunk_next[fi].is_null()
                    && self.heap.chunk_next[fi].add(cz) <= self.heap.chunk_limit[fi]
                {
                    let r = self.heap.chunk_next[fi];
                    self.heap.chunk_next[fi] = r.add(cz);
                    return Ok(r);
                }
            }

            // Current chunk exhausted: allocate another.
            let mut c = unsafe { libc::malloc(std::mem::size_of::<Chunk>()) as *mut Chunk };
            if c.is_null() {
                self.collect();
                c = unsafe { libc::malloc(std::mem::size_of::<Chunk>()) as *mut Chunk };
                if c.is_null() {
                    return set_error("ran out of memory");
                }
            }
            self.heap.nchunks += 1;
            trace!(nchunks = self.heap.nchunks, class = cz, "new allocator chunk");
            unsafe {
                (*c).next = self.heap.chunks;
                self.heap.chunks = c;
                // Align the carve pointer so blocks stay cache-friendly.
                let base = (*c).data.as_mut_ptr();
                let aligned = ((base as usize + 0x3F) & !0x3F) as *mut u8;
                self.heap.chunk_next[fi] = aligned.add(cz);
                self.heap.chunk_limit[fi] = base.add(CHUNK_DATA);
                return Ok(aligned);
            }
        }

        self.malloc_with_retry(z)
    }

    /// Free a block from `nalloc`. `z` must be the size passed to the
    /// allocation call.
    pub fn nfree(&mut self, p: *mut u8, z: usize) {
        self.heap.mem = self.heap.mem.saturating_sub(z);
        if !cfg!(feature = "all-malloc") && z >= 1 && z <= FLIST_LIMIT {
            // Small block: push it onto its fast free list.
            let fi = flist_index(z);
            unsafe {
                *(p as *mut *mut u8) = self.heap.flists[fi];
            }
            self.heap.flists[fi] = p;
        } else {
            unsafe { libc::free(p as *mut libc::c_void) }
        }
    }

    /// Allocate a block whose size will not be known at free time.
    /// Prefer `nalloc`/`talloc`; this path cannot use the free lists
    /// and tracks memory by estimation.
    pub fn alloc(&mut self, z: usize) -> Res<*mut u8> {
        if cfg!(feature = "collect-always") {
            self.collect();
        } else {
            self.heap.mem += z;
            if self.heap.mem > self.heap.limit {
                self.collect();
            }
        }
        self.heap.n_allocs += 1;
        self.heap.alloc_mem += z;
        self.malloc_with_retry(z)
    }

    /// Free a block from `alloc`. The size of the block is unknown,
    /// so the usage counter is adjusted by the mean outstanding
    /// allocation size. Crude, but it only feeds the collect trigger.
    pub fn free(&mut self, p: *mut u8) {
        let mut z = if self.heap.n_allocs > 0 {
            self.heap.alloc_mem / self.heap.n_allocs
        } else {
            0
        };
        z = z.min(self.heap.mem).min(self.heap.alloc_mem);
        self.heap.mem -= z;
        self.heap.alloc_mem -= z;
        self.heap.n_allocs = self.heap.n_allocs.saturating_sub(1);
        unsafe { libc::free(p as *mut libc::c_void) }
    }

    /// Typed allocation: an uninitialised `T` on the sized path.
    pub fn talloc<T>(&mut self) -> Res<*mut T> {
        Ok(self.nalloc(std::mem::size_of::<T>())? as *mut T)
    }

    /// Free a `talloc`ed `T`.
    pub fn tfree<T>(&mut self, p: *mut T) {
        self.nfree(p as *mut u8, std::mem::size_of::<T>());
    }

    fn malloc_with_retry(&mut self, z: usize) -> Res<*mut u8> {
        let mut p = unsafe { libc::malloc(z.max(1)) as *mut u8 };
        if p.is_null() {
            self.collect();
            p = unsafe { libc::malloc(z.max(1)) as *mut u8 };
            if p.is_null() {
                return set_error("ran out of memory");
            }
        }
        Ok(p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_classes() {
        assert_eq!(flist_index(1), 0);
        assert_eq!(flist_index(8), 0);
        assert_eq!(flist_index(9), 1);
        assert_eq!(flist_index(16), 1);
        assert_eq!(flist_index(17), 2);
        assert_eq!(flist_index(32), 2);
        assert_eq!(flist_index(33), 3);
        assert_eq!(flist_index(64), 3);
    }

    #[test]
    fn test_chunk_is_a_page() {
        assert_eq!(std::mem::size_of::<Chunk>(), 4096);
    }
}

#[cfg(test)]
mod interp_tests {
    use crate::testutil::with_interp;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_small_blocks_recycle_through_the_free_list() {
        with_interp(|ip| {
            // A freed 64-byte block is the next 64-byte allocation.
            let p = ip.nalloc(64).unwrap();
            ip.nfree(p, 64);
            let q = ip.nalloc(64).unwrap();
            assert_eq!(p, q);
            ip.nfree(q, 64);
        });
    }

    #[test]
    #[serial]
    fn test_large_blocks_bypass_the_free_list() {
        with_interp(|ip| {
            let p = ip.nalloc(65).unwrap();
            assert!(!p.is_null());
            ip.nfree(p, 65);
            // 65 bytes never lands on a free list, so the accounting
            // alone distinguishes the paths; the boundary class is 64.
            let r = ip.nalloc(64).unwrap();
            ip.nfree(r, 64);
        });
    }

    #[test]
    #[serial]
    fn test_sized_classes_do_not_alias() {
        with_interp(|ip| {
            let a = ip.nalloc(8).unwrap();
            let b = ip.nalloc(16).unwrap();
            let c = ip.nalloc(32).unwrap();
            assert_ne!(a, b);
            assert_ne!(b, c);
            ip.nfree(a, 8);
            ip.nfree(b, 16);
            ip.nfree(c, 32);
        });
    }
}

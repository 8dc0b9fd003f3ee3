//! Physical frame allocator.
//!
//! A bounded pool of 4 KiB frames with a free list. The pool's backing
//! storage comes from the kernel heap at construction time; afterwards
//! allocation and release are O(1) and never touch the heap again.
//! `free_frames` exposes the current free count so teardown paths can
//! be checked for leaks.

use alloc::boxed::Box;
use alloc::vec::Vec;

use spin::Mutex;

use crate::config::PAGE_SIZE;
use crate::memory::PhysAddr;

#[repr(C, align(4096))]
struct Frame([u8; PAGE_SIZE]);

struct Pool {
    frames: Box<[Frame]>,
    free: Vec<u32>,
}

/// Fixed-capacity allocator of zero-filled 4 KiB frames.
pub struct FrameAllocator {
    pool: Mutex<Pool>,
}

impl FrameAllocator {
    /// Build an allocator owning `capacity` frames.
    pub fn new(capacity: usize) -> Self {
        let mut frames = Vec::with_capacity(capacity);
        frames.resize_with(capacity, || Frame([0; PAGE_SIZE]));
        let free = (0..capacity as u32).rev().collect();
        Self {
            pool: Mutex::new(Pool {
                frames: frames.into_boxed_slice(),
                free,
            }),
        }
    }

    /// Allocate one zero-filled frame, or `None` when the pool is
    /// exhausted.
    pub fn alloc(&self) -> Option<PhysAddr> {
        let mut pool = self.pool.lock();
        let index = pool.free.pop()?;
        let frame = &mut pool.frames[index as usize];
        frame.0.fill(0);
        Some(Self::frame_addr(frame))
    }

    /// Return `frame` to the pool.
    ///
    /// Panics if `frame` is misaligned or was not handed out by this
    /// allocator.
    pub fn free(&self, frame: PhysAddr) {
        assert!(frame.is_page_aligned(), "freeing unaligned frame");
        let mut pool = self.pool.lock();
        let base = pool.frames.as_ptr() as usize - crate::memory::PHYS_OFFSET;
        let offset = frame
            .as_usize()
            .checked_sub(base)
            .filter(|off| off / PAGE_SIZE < pool.frames.len())
            .expect("freeing a frame from a different allocator");
        pool.free.push((offset / PAGE_SIZE) as u32);
    }

    /// Number of frames currently available.
    pub fn free_frames(&self) -> usize {
        self.pool.lock().free.len()
    }

    fn frame_addr(frame: &Frame) -> PhysAddr {
        // Pool storage lives in the direct map, so the physical address
        // is the pointer minus the map offset.
        PhysAddr::new(frame as *const Frame as usize - crate::memory::PHYS_OFFSET)
    }
}

static GLOBAL: spin::Once<FrameAllocator> = spin::Once::new();

/// Hand the kernel its frame pool. Called once during boot, before any
/// process exists; later calls are ignored.
pub fn init_global(capacity: usize) {
    GLOBAL.call_once(|| FrameAllocator::new(capacity));
}

/// The boot-time frame pool.
pub fn global() -> &'static FrameAllocator {
    GLOBAL.get().expect("frame allocator used before init_global")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_free_round_trip() {
        let frames = FrameAllocator::new(4);
        assert_eq!(frames.free_frames(), 4);

        let a = frames.alloc().unwrap();
        let b = frames.alloc().unwrap();
        assert_ne!(a, b);
        assert!(a.is_page_aligned() && b.is_page_aligned());
        assert_eq!(frames.free_frames(), 2);

        frames.free(a);
        frames.free(b);
        assert_eq!(frames.free_frames(), 4);
    }

    #[test]
    fn exhaustion_returns_none() {
        let frames = FrameAllocator::new(2);
        let a = frames.alloc().unwrap();
        let _b = frames.alloc().unwrap();
        assert_eq!(frames.alloc(), None);
        frames.free(a);
        assert!(frames.alloc().is_some());
    }

    #[test]
    fn frames_come_back_zeroed() {
        let frames = FrameAllocator::new(1);
        let a = frames.alloc().unwrap();
        unsafe { a.as_ptr().write_bytes(0xAB, PAGE_SIZE) };
        frames.free(a);
        let again = frames.alloc().unwrap();
        let bytes = unsafe { core::slice::from_raw_parts(again.as_ptr(), PAGE_SIZE) };
        assert!(bytes.iter().all(|&b| b == 0));
    }
}

//! User address spaces: 4-level AArch64 translation tables.
//!
//! Descriptors are raw `u64`s in the ARMv8-A 4 KiB-granule format. The
//! tree is built from [`FrameAllocator`] frames and manipulated through
//! the kernel's direct map, so every operation here also runs (and is
//! tested) on a hosted build where the frames are plain heap memory.
//!
//! Failure handling follows one rule throughout: running out of frames
//! is an error the caller handles, while structural misuse (mapping
//! over a live entry, tearing down a malformed tree) is a panic.

use bitflags::bitflags;

use crate::config::{ENTRIES_PER_TABLE, LEVEL3_SPAN, PAGE_SIZE, USER_ADDRESS_TOP};
use crate::error::KernelError;
use crate::fs::SegmentSource;
use crate::memory::{page_round_up, FrameAllocator, PhysAddr, VirtAddr};

/// Bits 47:12 of a descriptor hold the output address.
const ADDR_MASK: u64 = 0x0000_FFFF_FFFF_F000;

bitflags! {
    /// Page-descriptor attribute bits (4 KiB granule).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PteFlags: u64 {
        const VALID        = 1 << 0;
        /// Table descriptor at levels 0-2; page descriptor at level 3.
        const TABLE        = 1 << 1;
        /// MAIR attribute index 1 (normal cacheable memory).
        const ATTR_NORMAL  = 1 << 2;
        /// AP[1]: accessible from EL0.
        const USER         = 1 << 6;
        /// AP[2]: write-protected.
        const READ_ONLY    = 1 << 7;
        /// SH = inner shareable.
        const INNER_SHARED = 3 << 8;
        /// Access flag; must be preset or the first access faults.
        const ACCESSED     = 1 << 10;
    }
}

/// One translation-table descriptor.
#[derive(Debug, Clone, Copy)]
struct Entry(u64);

impl Entry {
    fn page(frame: PhysAddr, perm: PteFlags) -> Self {
        let base = PteFlags::VALID
            | PteFlags::TABLE
            | PteFlags::ATTR_NORMAL
            | PteFlags::INNER_SHARED
            | PteFlags::ACCESSED;
        Self(frame.as_usize() as u64 & ADDR_MASK | (base | perm).bits())
    }

    fn table(frame: PhysAddr) -> Self {
        Self(frame.as_usize() as u64 & ADDR_MASK | (PteFlags::VALID | PteFlags::TABLE).bits())
    }

    fn is_valid(self) -> bool {
        self.0 & PteFlags::VALID.bits() != 0
    }

    fn is_table(self) -> bool {
        self.0 & PteFlags::TABLE.bits() != 0
    }

    fn addr(self) -> PhysAddr {
        PhysAddr::new((self.0 & ADDR_MASK) as usize)
    }

    /// The caller-controlled permission bits, for carrying mappings
    /// into a duplicated space.
    fn perm(self) -> PteFlags {
        PteFlags::from_bits_truncate(self.0) & (PteFlags::USER | PteFlags::READ_ONLY)
    }
}

/// Descriptor index for `va` at tree level `level` (0 = root).
fn index(va: usize, level: usize) -> usize {
    (va >> (39 - 9 * level)) & (ENTRIES_PER_TABLE - 1)
}

/// View a table frame as its 512 descriptors.
///
/// # Safety
///
/// `frame` must be a live table frame of this tree, and the caller must
/// not hold another reference into it.
unsafe fn entries<'a>(frame: PhysAddr) -> &'a mut [u64; ENTRIES_PER_TABLE] {
    unsafe { &mut *(frame.as_ptr() as *mut [u64; ENTRIES_PER_TABLE]) }
}

/// An owned user translation tree.
///
/// Holds only the root frame; the mapped size is tracked by the owning
/// process, and the grow/shrink operations take it explicitly.
#[derive(Debug, PartialEq)]
pub struct UserPageTable {
    root: PhysAddr,
}

impl UserPageTable {
    /// Allocate an empty tree (a single zeroed root table).
    pub fn new(alloc: &FrameAllocator) -> Result<Self, KernelError> {
        let root = alloc.alloc().ok_or(KernelError::OutOfMemory)?;
        Ok(Self { root })
    }

    /// Physical address of the root table.
    pub fn root(&self) -> PhysAddr {
        self.root
    }

    /// Make this tree the active user address space on the current
    /// core.
    pub fn install(&self) {
        unsafe { crate::arch::install_ttbr0(self.root) };
    }

    /// Walk to the level-3 descriptor for `va`.
    ///
    /// With `create` set, absent intermediate tables are allocated
    /// (zeroed); without it, an absent table yields `Ok(None)`.
    fn entry_ptr(
        &self,
        va: VirtAddr,
        create: Option<&FrameAllocator>,
    ) -> Result<Option<*mut u64>, KernelError> {
        debug_assert!(va.as_usize() < USER_ADDRESS_TOP);
        let mut table = self.root;
        for level in 0..3 {
            let slot = &mut unsafe { entries(table) }[index(va.as_usize(), level)];
            let entry = Entry(*slot);
            table = if entry.is_valid() {
                assert!(entry.is_table(), "unexpected block entry in walk");
                entry.addr()
            } else {
                let Some(alloc) = create else {
                    return Ok(None);
                };
                let frame = alloc.alloc().ok_or(KernelError::OutOfMemory)?;
                *slot = Entry::table(frame).0;
                frame
            };
        }
        let slot = &mut unsafe { entries(table) }[index(va.as_usize(), 3)];
        Ok(Some(slot))
    }

    /// Map `size` bytes starting at `va` to the physical range starting
    /// at `pa`, rounding outward to page boundaries.
    ///
    /// Panics if any page in the range is already mapped.
    pub fn map_region(
        &mut self,
        alloc: &FrameAllocator,
        va: VirtAddr,
        size: usize,
        pa: PhysAddr,
        perm: PteFlags,
    ) -> Result<(), KernelError> {
        assert!(size > 0);
        let mut page = va.align_down().as_usize();
        let last = VirtAddr::new(va.as_usize() + size - 1).align_down().as_usize();
        let mut frame = pa.as_usize();
        loop {
            let slot = self
                .entry_ptr(VirtAddr::new(page), Some(alloc))?
                .expect("walk with create cannot miss");
            let existing = Entry(unsafe { *slot });
            assert!(!existing.is_valid(), "remap at {page:#x}");
            unsafe { *slot = Entry::page(PhysAddr::new(frame), perm).0 };
            if page == last {
                break;
            }
            page += PAGE_SIZE;
            frame += PAGE_SIZE;
        }
        Ok(())
    }

    /// Extend the space from `old_size` to `new_size` bytes with fresh
    /// zeroed, user-accessible pages.
    ///
    /// On any mid-way failure every page added so far is released again
    /// before the error is returned. Returns the new size.
    pub fn grow(
        &mut self,
        alloc: &FrameAllocator,
        old_size: usize,
        new_size: usize,
    ) -> Result<usize, KernelError> {
        if new_size >= USER_ADDRESS_TOP {
            return Err(KernelError::AddressOverflow);
        }
        if new_size <= old_size {
            return Ok(old_size);
        }
        let mut va = page_round_up(old_size);
        while va < new_size {
            let grown = match alloc.alloc() {
                Some(frame) => self
                    .map_region(alloc, VirtAddr::new(va), PAGE_SIZE, frame, PteFlags::USER)
                    .map_err(|e| {
                        alloc.free(frame);
                        e
                    }),
                None => Err(KernelError::OutOfMemory),
            };
            if let Err(e) = grown {
                log::warn!("grow to {new_size:#x} failed at {va:#x}, rolling back");
                self.shrink(alloc, va, old_size);
                return Err(e);
            }
            va += PAGE_SIZE;
        }
        Ok(new_size)
    }

    /// Release the pages above `new_size`, returning the new size.
    ///
    /// Absent intermediate tables are skipped a 2 MiB block at a time;
    /// already-unmapped pages inside a present table are ignored. A
    /// `new_size >= old_size` request is a no-op.
    pub fn shrink(&mut self, alloc: &FrameAllocator, old_size: usize, new_size: usize) -> usize {
        if new_size >= old_size {
            return old_size;
        }
        let mut va = page_round_up(new_size);
        while va < old_size {
            match self.entry_ptr(VirtAddr::new(va), None) {
                Err(_) => unreachable!("walk without create does not allocate"),
                Ok(None) => {
                    // Whole level-3 table absent; nothing below the next
                    // 2 MiB boundary can be mapped.
                    va = (va & !(LEVEL3_SPAN - 1)) + LEVEL3_SPAN;
                }
                Ok(Some(slot)) => {
                    let entry = Entry(unsafe { *slot });
                    if entry.is_valid() {
                        alloc.free(entry.addr());
                        unsafe { *slot = 0 };
                    }
                    va += PAGE_SIZE;
                }
            }
        }
        new_size
    }

    /// Clone the first `size` bytes of this space into a brand-new tree
    /// with disjoint frames and identical contents and permissions.
    ///
    /// Panics if a page below `size` is unmapped; `size` is trusted
    /// process bookkeeping, and a hole below it means the bookkeeping
    /// is corrupt.
    pub fn duplicate(
        &self,
        alloc: &FrameAllocator,
        size: usize,
    ) -> Result<UserPageTable, KernelError> {
        let mut clone = UserPageTable::new(alloc)?;
        let mut va = 0;
        while va < size {
            if let Err(e) = self.duplicate_page(alloc, &mut clone, va) {
                // Teardown frees the copied data frames too.
                clone.destroy(alloc);
                return Err(e);
            }
            va += PAGE_SIZE;
        }
        Ok(clone)
    }

    fn duplicate_page(
        &self,
        alloc: &FrameAllocator,
        clone: &mut UserPageTable,
        va: usize,
    ) -> Result<(), KernelError> {
        let slot = self
            .entry_ptr(VirtAddr::new(va), None)
            .map_err(|_| KernelError::BadAddress)?
            .expect("duplicate: page table absent below size");
        let entry = Entry(unsafe { *slot });
        assert!(entry.is_valid(), "duplicate: page absent below size");
        let frame = alloc.alloc().ok_or(KernelError::OutOfMemory)?;
        unsafe {
            core::ptr::copy_nonoverlapping(entry.addr().as_ptr(), frame.as_ptr(), PAGE_SIZE);
        }
        match clone.map_region(alloc, VirtAddr::new(va), PAGE_SIZE, frame, entry.perm()) {
            Ok(()) => Ok(()),
            Err(e) => {
                alloc.free(frame);
                Err(e)
            }
        }
    }

    /// Resolve a user virtual address to a kernel pointer to its page.
    ///
    /// Refuses addresses that are unmapped or not EL0-accessible. This
    /// is the only sanctioned way to touch another address space.
    pub fn translate_to_kernel(&self, va: VirtAddr) -> Option<*mut u8> {
        let slot = self.entry_ptr(va.align_down(), None).ok()??;
        let entry = Entry(unsafe { *slot });
        if !entry.is_valid() || !entry.perm().contains(PteFlags::USER) {
            return None;
        }
        Some(entry.addr().as_ptr())
    }

    /// Copy `bytes` into this space at `dst`, page by page.
    pub fn copy_out(&mut self, dst: VirtAddr, bytes: &[u8]) -> Result<(), KernelError> {
        let mut va = dst.as_usize();
        let mut copied = 0;
        while copied < bytes.len() {
            let page = VirtAddr::new(va).align_down();
            let kernel = self
                .translate_to_kernel(page)
                .ok_or(KernelError::BadAddress)?;
            let offset = va - page.as_usize();
            let chunk = usize::min(PAGE_SIZE - offset, bytes.len() - copied);
            unsafe {
                core::ptr::copy_nonoverlapping(
                    bytes[copied..].as_ptr(),
                    kernel.add(offset),
                    chunk,
                );
            }
            copied += chunk;
            va += chunk;
        }
        Ok(())
    }

    /// Fill `[va, va + len)` from `source` starting at `offset`.
    ///
    /// The range must already be grown and mapped. `va` must be page
    /// aligned (panic otherwise); a short read or an unmapped page in
    /// the range is an error.
    pub fn load_segment(
        &mut self,
        va: VirtAddr,
        source: &(impl SegmentSource + ?Sized),
        offset: usize,
        len: usize,
    ) -> Result<(), KernelError> {
        assert!(va.page_offset() == 0, "load_segment: unaligned address");
        let mut done = 0;
        while done < len {
            let slot = self
                .entry_ptr(VirtAddr::new(va.as_usize() + done), None)
                .map_err(|_| KernelError::BadAddress)?
                .ok_or(KernelError::BadAddress)?;
            let entry = Entry(unsafe { *slot });
            if !entry.is_valid() {
                return Err(KernelError::BadAddress);
            }
            let chunk = usize::min(PAGE_SIZE, len - done);
            let page =
                unsafe { core::slice::from_raw_parts_mut(entry.addr().as_ptr(), chunk) };
            let read = source.read_at(offset + done, page)?;
            if read != chunk {
                return Err(KernelError::ShortRead);
            }
            done += chunk;
        }
        Ok(())
    }

    /// Build the bootstrap mapping: one user page at address zero
    /// holding `image`.
    ///
    /// Panics if `image` does not fit in a page; the embedded bootstrap
    /// code is a build-time artifact, not runtime input.
    pub fn init_code(&mut self, alloc: &FrameAllocator, image: &[u8]) -> Result<(), KernelError> {
        assert!(
            image.len() <= PAGE_SIZE,
            "init_code: image larger than a page"
        );
        let frame = alloc.alloc().ok_or(KernelError::OutOfMemory)?;
        unsafe {
            core::ptr::copy_nonoverlapping(image.as_ptr(), frame.as_ptr(), image.len());
        }
        self.map_region(alloc, VirtAddr::new(0), PAGE_SIZE, frame, PteFlags::USER)
            .map_err(|e| {
                alloc.free(frame);
                e
            })
    }

    /// Revoke EL0 access to the page at `va`, turning it into a guard
    /// page. Panics if nothing is mapped there.
    pub fn clear_user_access(&mut self, va: VirtAddr) {
        let slot = self
            .entry_ptr(va.align_down(), None)
            .ok()
            .flatten()
            .expect("clear_user_access: no mapping");
        let entry = Entry(unsafe { *slot });
        assert!(entry.is_valid(), "clear_user_access: no mapping");
        unsafe { *slot &= !PteFlags::USER.bits() };
    }

    /// Tear the whole tree down, returning every table frame and every
    /// still-mapped data frame to the allocator.
    pub fn destroy(self, alloc: &FrameAllocator) {
        free_tree(alloc, self.root, 0);
    }
}

fn free_tree(alloc: &FrameAllocator, table: PhysAddr, level: usize) {
    let slots = unsafe { entries(table) };
    for slot in slots.iter() {
        let entry = Entry(*slot);
        if !entry.is_valid() {
            continue;
        }
        assert!(entry.is_table(), "destroy: unexpected block entry");
        if level < 3 {
            free_tree(alloc, entry.addr(), level + 1);
        } else {
            alloc.free(entry.addr());
        }
    }
    alloc.free(table);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn space(capacity: usize) -> (FrameAllocator, UserPageTable) {
        let alloc = FrameAllocator::new(capacity);
        let table = UserPageTable::new(&alloc).unwrap();
        (alloc, table)
    }

    fn write_user(table: &UserPageTable, va: usize, byte: u8) {
        let p = table
            .translate_to_kernel(VirtAddr::new(va))
            .expect("page should be mapped");
        unsafe { *p.add(va % PAGE_SIZE) = byte };
    }

    fn read_user(table: &UserPageTable, va: usize) -> u8 {
        let p = table
            .translate_to_kernel(VirtAddr::new(va))
            .expect("page should be mapped");
        unsafe { *p.add(va % PAGE_SIZE) }
    }

    #[test]
    fn grow_maps_zeroed_user_pages() {
        let (alloc, mut table) = space(16);
        let size = table.grow(&alloc, 0, 3 * PAGE_SIZE).unwrap();
        assert_eq!(size, 3 * PAGE_SIZE);
        for page in 0..3 {
            assert_eq!(read_user(&table, page * PAGE_SIZE), 0);
        }
        assert!(table
            .translate_to_kernel(VirtAddr::new(3 * PAGE_SIZE))
            .is_none());
        table.destroy(&alloc);
    }

    #[test]
    fn grow_rejects_address_ceiling() {
        let (alloc, mut table) = space(8);
        assert_eq!(
            table.grow(&alloc, 0, USER_ADDRESS_TOP),
            Err(KernelError::AddressOverflow)
        );
        table.destroy(&alloc);
    }

    #[test]
    fn grow_failure_unwinds_fully() {
        // Capacity for the root, the three intermediate tables, and two
        // data pages; the third data page must fail and roll back.
        let alloc = FrameAllocator::new(6);
        let mut table = UserPageTable::new(&alloc).unwrap();
        let before = alloc.free_frames();
        assert_eq!(
            table.grow(&alloc, 0, 3 * PAGE_SIZE),
            Err(KernelError::OutOfMemory)
        );
        // Data frames are rolled back; intermediate tables may remain.
        table.destroy(&alloc);
        assert_eq!(alloc.free_frames(), before + 1);
    }

    #[test]
    fn shrink_then_destroy_leaks_nothing() {
        let (alloc, mut table) = space(32);
        let total = alloc.free_frames();
        let size = table.grow(&alloc, 0, 5 * PAGE_SIZE).unwrap();
        let size = table.shrink(&alloc, size, 2 * PAGE_SIZE);
        assert_eq!(size, 2 * PAGE_SIZE);
        assert!(table
            .translate_to_kernel(VirtAddr::new(2 * PAGE_SIZE))
            .is_none());
        assert!(table
            .translate_to_kernel(VirtAddr::new(PAGE_SIZE))
            .is_some());
        table.destroy(&alloc);
        assert_eq!(alloc.free_frames(), total + 1);
    }

    #[test]
    fn shrink_at_or_above_current_size_is_a_noop() {
        let (alloc, mut table) = space(16);
        let size = table.grow(&alloc, 0, 2 * PAGE_SIZE).unwrap();
        assert_eq!(table.shrink(&alloc, size, size), size);
        assert_eq!(table.shrink(&alloc, size, size + PAGE_SIZE), size);
        assert!(table.translate_to_kernel(VirtAddr::new(PAGE_SIZE)).is_some());
        table.destroy(&alloc);
    }

    #[test]
    fn shrink_skips_unmapped_blocks() {
        // Nothing mapped at all: shrink must terminate by skipping
        // absent level-3 tables in 2 MiB strides, including when the
        // cursor starts block-aligned.
        let (alloc, mut table) = space(4);
        assert_eq!(table.shrink(&alloc, 4 * LEVEL3_SPAN, 0), 0);
        table.destroy(&alloc);
    }

    #[test]
    #[should_panic(expected = "remap")]
    fn mapping_over_a_live_page_panics() {
        let (alloc, mut table) = space(16);
        let frame = alloc.alloc().unwrap();
        table
            .map_region(&alloc, VirtAddr::new(0), PAGE_SIZE, frame, PteFlags::USER)
            .unwrap();
        let other = alloc.alloc().unwrap();
        let _ = table.map_region(&alloc, VirtAddr::new(0), PAGE_SIZE, other, PteFlags::USER);
    }

    #[test]
    fn duplicate_copies_content_into_disjoint_frames() {
        let (alloc, mut table) = space(32);
        let size = table.grow(&alloc, 0, 2 * PAGE_SIZE).unwrap();
        write_user(&table, 100, 0x5A);
        write_user(&table, PAGE_SIZE + 9, 0xC3);

        let clone = table.duplicate(&alloc, size).unwrap();
        assert_eq!(read_user(&clone, 100), 0x5A);
        assert_eq!(read_user(&clone, PAGE_SIZE + 9), 0xC3);

        // Mutating one space must not show through in the other.
        write_user(&table, 100, 0x11);
        assert_eq!(read_user(&clone, 100), 0x5A);
        write_user(&clone, PAGE_SIZE + 9, 0x22);
        assert_eq!(read_user(&table, PAGE_SIZE + 9), 0xC3);

        clone.destroy(&alloc);
        table.destroy(&alloc);
    }

    #[test]
    fn duplicate_failure_frees_the_partial_clone() {
        let alloc = FrameAllocator::new(32);
        let mut table = UserPageTable::new(&alloc).unwrap();
        let size = table.grow(&alloc, 0, 4 * PAGE_SIZE).unwrap();
        // Drain the pool so the clone cannot finish.
        let mut hoard = alloc::vec::Vec::new();
        while alloc.free_frames() > 6 {
            hoard.push(alloc.alloc().unwrap());
        }
        let before = alloc.free_frames();
        assert_eq!(table.duplicate(&alloc, size), Err(KernelError::OutOfMemory));
        assert_eq!(alloc.free_frames(), before);
        for f in hoard {
            alloc.free(f);
        }
        table.destroy(&alloc);
    }

    #[test]
    fn translate_refuses_kernel_only_pages() {
        let (alloc, mut table) = space(16);
        let frame = alloc.alloc().unwrap();
        table
            .map_region(
                &alloc,
                VirtAddr::new(0),
                PAGE_SIZE,
                frame,
                PteFlags::empty(),
            )
            .unwrap();
        assert!(table.translate_to_kernel(VirtAddr::new(0)).is_none());
        table.destroy(&alloc);
    }

    #[test]
    fn clear_user_access_makes_a_guard_page() {
        let (alloc, mut table) = space(16);
        table.grow(&alloc, 0, 2 * PAGE_SIZE).unwrap();
        table.clear_user_access(VirtAddr::new(0));
        assert!(table.translate_to_kernel(VirtAddr::new(0)).is_none());
        assert!(table.translate_to_kernel(VirtAddr::new(PAGE_SIZE)).is_some());
        table.destroy(&alloc);
    }

    #[test]
    #[should_panic(expected = "clear_user_access")]
    fn clear_user_access_on_absent_page_panics() {
        let (alloc, mut table) = space(16);
        table.clear_user_access(VirtAddr::new(7 * PAGE_SIZE));
        table.destroy(&alloc);
    }

    #[test]
    fn copy_out_crosses_page_boundaries() {
        let (alloc, mut table) = space(16);
        table.grow(&alloc, 0, 2 * PAGE_SIZE).unwrap();
        let bytes: alloc::vec::Vec<u8> = (0..64).collect();
        table
            .copy_out(VirtAddr::new(PAGE_SIZE - 32), &bytes)
            .unwrap();
        assert_eq!(read_user(&table, PAGE_SIZE - 32), 0);
        assert_eq!(read_user(&table, PAGE_SIZE - 1), 31);
        assert_eq!(read_user(&table, PAGE_SIZE), 32);
        assert_eq!(read_user(&table, PAGE_SIZE + 31), 63);
        table.destroy(&alloc);
    }

    #[test]
    fn copy_out_to_unmapped_address_fails() {
        let (alloc, mut table) = space(16);
        table.grow(&alloc, 0, PAGE_SIZE).unwrap();
        let r = table.copy_out(VirtAddr::new(PAGE_SIZE - 8), &[0u8; 64]);
        assert_eq!(r, Err(KernelError::BadAddress));
        table.destroy(&alloc);
    }

    #[test]
    fn load_segment_fills_a_grown_range() {
        let (alloc, mut table) = space(16);
        table.grow(&alloc, 0, 2 * PAGE_SIZE).unwrap();
        let image: alloc::vec::Vec<u8> = (0..PAGE_SIZE + 100).map(|i| (i % 251) as u8).collect();
        table
            .load_segment(VirtAddr::new(0), &image[..], 0, image.len())
            .unwrap();
        assert_eq!(read_user(&table, 0), 0);
        assert_eq!(read_user(&table, PAGE_SIZE + 99), ((PAGE_SIZE + 99) % 251) as u8);
        table.destroy(&alloc);
    }

    #[test]
    fn load_segment_reports_short_reads_and_holes() {
        let (alloc, mut table) = space(16);
        table.grow(&alloc, 0, PAGE_SIZE).unwrap();
        let image = [7u8; 128];
        // Source runs out before the requested length.
        assert_eq!(
            table.load_segment(VirtAddr::new(0), &image[..], 0, 256),
            Err(KernelError::ShortRead)
        );
        // Target page past the grown range.
        assert_eq!(
            table.load_segment(VirtAddr::new(PAGE_SIZE), &image[..], 0, 64),
            Err(KernelError::BadAddress)
        );
        table.destroy(&alloc);
    }

    #[test]
    #[should_panic(expected = "unaligned")]
    fn load_segment_rejects_unaligned_target() {
        let (alloc, mut table) = space(16);
        table.grow(&alloc, 0, PAGE_SIZE).unwrap();
        let _ = table.load_segment(VirtAddr::new(8), &[0u8; 8][..], 0, 8);
    }

    #[test]
    fn init_code_builds_the_bootstrap_page() {
        let (alloc, mut table) = space(16);
        let image = [0xDE, 0xAD, 0xBE, 0xEF];
        table.init_code(&alloc, &image).unwrap();
        assert_eq!(read_user(&table, 0), 0xDE);
        assert_eq!(read_user(&table, 3), 0xEF);
        assert_eq!(read_user(&table, 4), 0);
        table.destroy(&alloc);
    }

    #[test]
    #[should_panic(expected = "larger than a page")]
    fn init_code_rejects_oversized_images() {
        let (alloc, mut table) = space(16);
        let image = alloc::vec![0u8; PAGE_SIZE + 1];
        let _ = table.init_code(&alloc, &image);
    }
}

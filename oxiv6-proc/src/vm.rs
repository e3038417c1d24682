use crate::kalloc::{Kmem, OutOfMemory, PAGE_SIZE, PGROUNDDOWN, PGROUNDUP};
use bitfield::{bitfield, BitRange, BitRangeMut};
use bitflags::bitflags;

/// One beyond the highest possible virtual address.
/// `MAX_VA` is actually one bit less than the max allowed by
/// Sv39, to avoid having to sign-extend virtual addresses
/// that have the high bit set.
pub const MAX_VA: usize = 1 << (9 + 9 + 9 + 12 - 1);
/// Shared user/kernel boundary-crossing code, at the top of every
/// address space
pub const TRAMPOLINE: usize = MAX_VA - PAGE_SIZE;
/// Per-process trap frame, just below the trampoline
pub const TRAPFRAME: usize = TRAMPOLINE - PAGE_SIZE;
/// Entries in one page-table page
pub const PTE_COUNT: usize = PAGE_SIZE / core::mem::size_of::<u64>();

/// Kernel stack of process slot `slot`, each followed by an invalid
/// guard page.
#[allow(non_snake_case)]
#[must_use]
pub const fn KSTACK(slot: usize) -> usize {
    TRAMPOLINE - (slot + 1) * 2 * PAGE_SIZE
}

/// Index into the page-table page at `level` selected by `va`
#[inline]
const fn px(level: usize, va: usize) -> usize {
    (va >> (12 + 9 * level)) & 0x1FF
}

bitflags! {
    /// Permission bits of a [`PageTableEntry`]
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PteFlags: u64 {
        const V = 1 << 0;
        const R = 1 << 1;
        const W = 1 << 2;
        const X = 1 << 3;
        const U = 1 << 4;
    }
}

bitfield! {
    /// A wrapper around a Sv39 Page Table Entry
    #[derive(PartialEq, Eq, Copy, Clone)]
    #[repr(transparent)]
    pub struct PageTableEntry(u64);
    impl Debug;
    /// Find if the referenced page is valid
    pub valid, set_valid: 0;
    /// Can this page be read?
    pub readable, _: 1;
    /// Can this page be written to?
    pub writeable, _: 2;
    /// Can memory in this page be executed?
    pub executable, _: 3;
    /// Can user code access this page?
    pub user_accessible, _: 4;
    /// Physical Page to map to
    pub u64, ppn, set_ppn: 53, 10;
}

impl PageTableEntry {
    pub const INVALID: Self = Self(0);

    /// The physical address this PTE points to
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn pa(&self) -> usize {
        (self.ppn() << 12) as usize
    }

    /// Set the physical address this PTE points to
    pub fn set_mapping(&mut self, physical_address: usize) {
        self.set_ppn(physical_address as u64 >> 12);
    }

    /// Get the flag bits in this PTE
    #[must_use]
    pub fn flags(&self) -> PteFlags {
        PteFlags::from_bits_truncate(self.bit_range(7, 0))
    }

    pub fn set_flags(&mut self, flags: PteFlags) {
        self.set_bit_range(7, 0, flags.bits());
    }

    /// A valid entry with no R/W/X bits points at the next level table
    #[must_use]
    pub fn is_table(&self) -> bool {
        self.valid() && !self.flags().intersects(PteFlags::R | PteFlags::W | PteFlags::X)
    }
}

impl From<PageTableEntry> for u64 {
    fn from(value: PageTableEntry) -> Self {
        value.0
    }
}

impl From<u64> for PageTableEntry {
    fn from(value: u64) -> Self {
        PageTableEntry(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageTableWalkError {
    PageTableUnallocated,
    UnableToAllocate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmError {
    OutOfMemory,
    /// No valid mapping for the address
    NotMapped,
    /// Address or level outside what Sv39 can express
    BadAddress,
    /// Mapped, but not with the permissions the access needs
    PermissionDenied,
}

impl From<PageTableWalkError> for VmError {
    fn from(value: PageTableWalkError) -> Self {
        match value {
            PageTableWalkError::PageTableUnallocated => Self::NotMapped,
            PageTableWalkError::UnableToAllocate => Self::OutOfMemory,
        }
    }
}

impl From<OutOfMemory> for VmError {
    fn from(_: OutOfMemory) -> Self {
        Self::OutOfMemory
    }
}

/// A three-level Sv39 page table living in physical memory.
///
/// The handle owns the table pages; [`PageTable::free`] gives them back.
#[derive(Debug, PartialEq, Eq)]
pub struct PageTable {
    root: usize,
}

impl PageTable {
    /// Creates an empty page table
    ///
    /// # Errors
    /// Fails if no page is left for the root.
    pub fn create(kmem: &Kmem) -> Result<Self, OutOfMemory> {
        Ok(Self {
            root: kmem.alloc_zeroed()?,
        })
    }

    /// Physical address of the root table page
    #[must_use]
    pub fn root(&self) -> usize {
        self.root
    }

    /// Sv39 `satp` value selecting this table
    #[must_use]
    pub fn satp(&self) -> u64 {
        (8 << 60) | (self.root as u64 >> 12)
    }

    fn entry(kmem: &Kmem, table: usize, index: usize) -> PageTableEntry {
        PageTableEntry::from(kmem.read_word(table + index * 8))
    }

    fn set_entry(kmem: &Kmem, table: usize, index: usize, entry: PageTableEntry) {
        kmem.write_word(table + index * 8, entry.into());
    }

    /// Physical address of the leaf PTE for `va`, creating the interior
    /// tables on the way down if `should_allocate`.
    fn walk(
        &self,
        kmem: &Kmem,
        va: usize,
        should_allocate: bool,
    ) -> Result<usize, PageTableWalkError> {
        assert!(va < MAX_VA, "walk");

        let mut table = self.root;
        for level in (1..=2).rev() {
            let entry = Self::entry(kmem, table, px(level, va));
            if entry.valid() {
                table = entry.pa();
            } else if !should_allocate {
                return Err(PageTableWalkError::PageTableUnallocated);
            } else {
                let page = kmem
                    .alloc_zeroed()
                    .map_err(|_| PageTableWalkError::UnableToAllocate)?;
                let mut entry = PageTableEntry::INVALID;
                entry.set_mapping(page);
                entry.set_valid(true);
                Self::set_entry(kmem, table, px(level, va), entry);
                table = page;
            }
        }
        Ok(table + px(0, va) * 8)
    }

    pub fn walk_mut<T>(
        &mut self,
        kmem: &Kmem,
        va: usize,
        should_allocate: bool,
        pte_edit: impl FnOnce(&mut PageTableEntry) -> T,
    ) -> Result<T, PageTableWalkError> {
        let pte_address = self.walk(kmem, va, should_allocate)?;
        let mut entry = PageTableEntry::from(kmem.read_word(pte_address));
        let result = pte_edit(&mut entry);
        kmem.write_word(pte_address, entry.into());
        Ok(result)
    }

    pub fn walk_const<T>(
        &self,
        kmem: &Kmem,
        va: usize,
        pte_lookup: impl FnOnce(&PageTableEntry) -> T,
    ) -> Result<T, PageTableWalkError> {
        let pte_address = self.walk(kmem, va, false)?;
        Ok(pte_lookup(&PageTableEntry::from(
            kmem.read_word(pte_address),
        )))
    }

    /// Look up a virtual address, return the physical address.
    /// Can only be used to look up user pages.
    ///
    /// # Errors
    /// Fails unless `va` is mapped with the U bit.
    pub fn walkaddr(&self, kmem: &Kmem, va: usize) -> Result<usize, VmError> {
        if va >= MAX_VA {
            return Err(VmError::BadAddress);
        }
        let entry = self.walk_const(kmem, va, |pte| *pte)?;
        if !entry.valid() {
            return Err(VmError::NotMapped);
        }
        if !entry.user_accessible() {
            return Err(VmError::PermissionDenied);
        }
        Ok(entry.pa())
    }

    /// Create PTEs for virtual addresses starting at `va` that refer to
    /// physical addresses starting at `pa`.
    /// `va` and `size` need not be page-aligned.
    ///
    /// # Errors
    /// Fails if a needed page-table page couldn't be allocated, leaving the
    /// pages mapped so far in place.
    pub fn map_pages(
        &mut self,
        kmem: &Kmem,
        va: usize,
        size: usize,
        pa: usize,
        permissions: PteFlags,
    ) -> Result<(), VmError> {
        assert!(size != 0, "map_pages: size");

        let first = PGROUNDDOWN!(va);
        let last = PGROUNDDOWN!(va + size - 1);
        let mut physical = pa;
        for virtual_addr in (first..=last).step_by(PAGE_SIZE) {
            self.walk_mut(kmem, virtual_addr, true, |pte| {
                assert!(!pte.valid(), "map_pages: remap");
                pte.set_mapping(physical);
                pte.set_flags(permissions | PteFlags::V);
            })?;
            physical += PAGE_SIZE;
        }
        Ok(())
    }

    /// Remove `npages` of mappings starting from `va`, which must be
    /// page-aligned. The mappings must exist.
    /// Optionally free the physical memory.
    pub fn unmap(&mut self, kmem: &Kmem, va: usize, npages: usize, do_free: bool) {
        assert!(va % PAGE_SIZE == 0, "uvmunmap: not aligned");

        for a in (va..va + npages * PAGE_SIZE).step_by(PAGE_SIZE) {
            let pte_address = match self.walk(kmem, a, false) {
                Ok(pte_address) => pte_address,
                Err(_) => panic!("uvmunmap: walk"),
            };
            let entry = PageTableEntry::from(kmem.read_word(pte_address));
            assert!(entry.valid(), "uvmunmap: not mapped");
            assert!(entry.flags() != PteFlags::V, "uvmunmap: not a leaf");
            if do_free {
                kmem.free(entry.pa());
            }
            kmem.write_word(pte_address, PageTableEntry::INVALID.into());
        }
    }

    /// Load the user initcode into address 0 of this table,
    /// for the very first process.
    ///
    /// # Errors
    /// Fails if memory runs out.
    pub fn uvmfirst(&mut self, kmem: &Kmem, src: &[u8]) -> Result<(), VmError> {
        assert!(src.len() < PAGE_SIZE, "uvmfirst: more than a page");

        let mem = kmem.alloc_zeroed()?;
        if let Err(error) = self.map_pages(
            kmem,
            0,
            PAGE_SIZE,
            mem,
            PteFlags::W | PteFlags::R | PteFlags::X | PteFlags::U,
        ) {
            kmem.free(mem);
            return Err(error);
        }
        kmem.write_bytes(mem, src);
        Ok(())
    }

    /// Allocate PTEs and physical memory to grow process from `oldsz` to
    /// `newsz`, which need not be page aligned. Returns new size.
    ///
    /// # Errors
    /// On failure everything allocated by this call is released again.
    pub fn uvmalloc(
        &mut self,
        kmem: &Kmem,
        oldsz: usize,
        newsz: usize,
        xperm: PteFlags,
    ) -> Result<usize, VmError> {
        if newsz < oldsz {
            return Ok(oldsz);
        }

        for a in (PGROUNDUP!(oldsz)..newsz).step_by(PAGE_SIZE) {
            let mem = match kmem.alloc_zeroed() {
                Ok(mem) => mem,
                Err(error) => {
                    self.uvmdealloc(kmem, a, oldsz);
                    return Err(error.into());
                }
            };
            if let Err(error) = self.map_pages(
                kmem,
                a,
                PAGE_SIZE,
                mem,
                PteFlags::R | PteFlags::U | xperm,
            ) {
                kmem.free(mem);
                self.uvmdealloc(kmem, a, oldsz);
                return Err(error);
            }
        }
        Ok(newsz)
    }

    /// Deallocate user pages to bring the process size from `oldsz` to
    /// `newsz`. `oldsz` can be larger than the actual process size.
    /// Returns the new process size.
    pub fn uvmdealloc(&mut self, kmem: &Kmem, oldsz: usize, newsz: usize) -> usize {
        if newsz >= oldsz {
            return oldsz;
        }

        if PGROUNDUP!(newsz) < PGROUNDUP!(oldsz) {
            let npages = (PGROUNDUP!(oldsz) - PGROUNDUP!(newsz)) / PAGE_SIZE;
            self.unmap(kmem, PGROUNDUP!(newsz), npages, true);
        }
        newsz
    }

    /// Given a parent process's page table, copy its memory into a child's
    /// page table. Copies both the page table and the physical memory.
    ///
    /// # Errors
    /// Frees any pages it allocated before running out of memory.
    pub fn uvmcopy(&self, kmem: &Kmem, new: &mut PageTable, sz: usize) -> Result<(), VmError> {
        for va in (0..sz).step_by(PAGE_SIZE) {
            let entry = match self.walk_const(kmem, va, |pte| *pte) {
                Ok(entry) => entry,
                Err(_) => panic!("uvmcopy: pte should exist"),
            };
            assert!(entry.valid(), "uvmcopy: page not present");

            let copied = kmem.alloc().map_err(VmError::from).and_then(|mem| {
                kmem.copy_page(mem, entry.pa());
                new.map_pages(kmem, va, PAGE_SIZE, mem, entry.flags())
                    .inspect_err(|_| kmem.free(mem))
            });
            if let Err(error) = copied {
                new.unmap(kmem, 0, va / PAGE_SIZE, true);
                return Err(error);
            }
        }
        Ok(())
    }

    /// Recursively free page-table pages.
    /// All leaf mappings must already have been removed.
    fn freewalk(kmem: &Kmem, table: usize) {
        for index in 0..PTE_COUNT {
            let entry = Self::entry(kmem, table, index);
            if entry.is_table() {
                Self::freewalk(kmem, entry.pa());
                Self::set_entry(kmem, table, index, PageTableEntry::INVALID);
            } else if entry.valid() {
                panic!("freewalk: leaf");
            }
        }
        kmem.free(table);
    }

    /// Free user memory pages, then free page-table pages.
    pub fn free(mut self, kmem: &Kmem, sz: usize) {
        if sz > 0 {
            self.unmap(kmem, 0, PGROUNDUP!(sz) / PAGE_SIZE, true);
        }
        Self::freewalk(kmem, self.root);
    }

    /// Copy from kernel to user.
    /// Copy `src` to virtual address `dstva` in this page table.
    ///
    /// # Errors
    /// Fails if any destination page is not user-writable.
    pub fn copyout(&self, kmem: &Kmem, mut dstva: usize, mut src: &[u8]) -> Result<(), VmError> {
        while !src.is_empty() {
            let va0 = PGROUNDDOWN!(dstva);
            if va0 >= MAX_VA {
                return Err(VmError::BadAddress);
            }
            let entry = self.walk_const(kmem, va0, |pte| *pte)?;
            if !entry.valid() {
                return Err(VmError::NotMapped);
            }
            if !entry.user_accessible() || !entry.writeable() {
                return Err(VmError::PermissionDenied);
            }
            let n = core::cmp::min(PAGE_SIZE - (dstva - va0), src.len());
            kmem.write_bytes(entry.pa() + (dstva - va0), &src[..n]);

            src = &src[n..];
            dstva = va0 + PAGE_SIZE;
        }
        Ok(())
    }

    /// Copy from user to kernel.
    /// Copy `dst.len()` bytes to `dst` from virtual address `srcva`.
    ///
    /// # Errors
    /// Fails if any source page is not mapped for the user.
    pub fn copyin(&self, kmem: &Kmem, dst: &mut [u8], mut srcva: usize) -> Result<(), VmError> {
        let mut copied = 0;
        while copied < dst.len() {
            let va0 = PGROUNDDOWN!(srcva);
            let pa0 = self.walkaddr(kmem, va0)?;
            let n = core::cmp::min(PAGE_SIZE - (srcva - va0), dst.len() - copied);
            kmem.read_bytes(pa0 + (srcva - va0), &mut dst[copied..copied + n]);

            copied += n;
            srcva = va0 + PAGE_SIZE;
        }
        Ok(())
    }

    /// The table page at `level` on the path to `va`: 2 is the root, 0 the
    /// table holding leaf entries.
    ///
    /// # Errors
    /// Fails for levels above 2, addresses beyond [`MAX_VA`], and when an
    /// entry on the way down is not a valid table pointer.
    pub fn table_at(
        &self,
        kmem: &Kmem,
        level: usize,
        va: usize,
    ) -> Result<[PageTableEntry; PTE_COUNT], VmError> {
        if level > 2 || va >= MAX_VA {
            return Err(VmError::BadAddress);
        }

        let mut table = self.root;
        for above in (level + 1..=2).rev() {
            let entry = Self::entry(kmem, table, px(above, va));
            if !entry.is_table() {
                return Err(VmError::NotMapped);
            }
            table = entry.pa();
        }
        Ok(core::array::from_fn(|index| Self::entry(kmem, table, index)))
    }
}

/// Make the kernel page table: the trampoline plus a kernel stack for every
/// process slot.
///
/// # Errors
/// Fails if physical memory can't hold the table and stacks.
pub fn kvmmake(kmem: &Kmem, trampoline: usize, slots: usize) -> Result<PageTable, VmError> {
    let mut page_table = PageTable::create(kmem)?;

    // map the trampoline for trap entry/exit to
    // the highest virtual address in the kernel.
    page_table.map_pages(
        kmem,
        TRAMPOLINE,
        PAGE_SIZE,
        trampoline,
        PteFlags::R | PteFlags::X,
    )?;

    proc_mapstacks(kmem, &mut page_table, slots)?;
    Ok(page_table)
}

/// Allocate a page for each process's kernel stack.
/// Map it high in memory, followed by an invalid
/// guard page.
fn proc_mapstacks(kmem: &Kmem, page_table: &mut PageTable, slots: usize) -> Result<(), VmError> {
    for slot in 0..slots {
        let pa = kmem.alloc()?;
        page_table.map_pages(kmem, KSTACK(slot), PAGE_SIZE, pa, PteFlags::R | PteFlags::W)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_rw() -> PteFlags {
        PteFlags::R | PteFlags::W | PteFlags::U
    }

    #[test]
    fn pte_round_trips_address_and_flags() {
        let mut pte = PageTableEntry::INVALID;
        pte.set_mapping(0x8020_3000);
        pte.set_flags(PteFlags::V | PteFlags::R | PteFlags::U);
        assert_eq!(pte.pa(), 0x8020_3000);
        assert!(pte.valid() && pte.readable() && pte.user_accessible());
        assert!(!pte.writeable() && !pte.executable());
        assert!(!pte.is_table());
    }

    #[test]
    fn map_then_walkaddr() {
        let kmem = Kmem::new(16);
        let mut pt = PageTable::create(&kmem).unwrap();
        let page = kmem.alloc().unwrap();
        pt.map_pages(&kmem, 0x5000, PAGE_SIZE, page, user_rw()).unwrap();
        assert_eq!(pt.walkaddr(&kmem, 0x5000), Ok(page));
        assert_eq!(pt.walkaddr(&kmem, 0x6000), Err(VmError::NotMapped));
        assert_eq!(pt.walkaddr(&kmem, MAX_VA), Err(VmError::BadAddress));
    }

    #[test]
    fn walkaddr_refuses_kernel_pages() {
        let kmem = Kmem::new(16);
        let mut pt = PageTable::create(&kmem).unwrap();
        let page = kmem.alloc().unwrap();
        pt.map_pages(&kmem, TRAPFRAME, PAGE_SIZE, page, PteFlags::R | PteFlags::W)
            .unwrap();
        assert_eq!(pt.walkaddr(&kmem, TRAPFRAME), Err(VmError::PermissionDenied));
    }

    #[test]
    #[should_panic(expected = "map_pages: remap")]
    fn remapping_is_fatal() {
        let kmem = Kmem::new(16);
        let mut pt = PageTable::create(&kmem).unwrap();
        let page = kmem.alloc().unwrap();
        pt.map_pages(&kmem, 0, PAGE_SIZE, page, user_rw()).unwrap();
        pt.map_pages(&kmem, 0, PAGE_SIZE, page, user_rw()).unwrap();
    }

    #[test]
    fn copyout_and_copyin_cross_pages() {
        let kmem = Kmem::new(16);
        let mut pt = PageTable::create(&kmem).unwrap();
        let sz = pt.uvmalloc(&kmem, 0, 2 * PAGE_SIZE, PteFlags::W).unwrap();
        assert_eq!(sz, 2 * PAGE_SIZE);

        let data: alloc::vec::Vec<u8> = (0..200u8).collect();
        pt.copyout(&kmem, PAGE_SIZE - 100, &data).unwrap();
        let mut back = [0u8; 200];
        pt.copyin(&kmem, &mut back, PAGE_SIZE - 100).unwrap();
        assert_eq!(&back[..], &data[..]);

        assert_eq!(
            pt.copyout(&kmem, 2 * PAGE_SIZE - 1, &[1, 2]),
            Err(VmError::NotMapped)
        );
    }

    #[test]
    fn copyout_needs_write_permission() {
        let kmem = Kmem::new(16);
        let mut pt = PageTable::create(&kmem).unwrap();
        pt.uvmalloc(&kmem, 0, PAGE_SIZE, PteFlags::empty()).unwrap();
        assert_eq!(pt.copyout(&kmem, 0, &[1]), Err(VmError::PermissionDenied));
        let mut byte = [0u8];
        assert_eq!(pt.copyin(&kmem, &mut byte, 0), Ok(()));
    }

    #[test]
    fn free_returns_every_page() {
        let kmem = Kmem::new(32);
        let before = kmem.free_pages();
        let mut pt = PageTable::create(&kmem).unwrap();
        pt.uvmalloc(&kmem, 0, 3 * PAGE_SIZE, PteFlags::W).unwrap();
        let mut copy = PageTable::create(&kmem).unwrap();
        pt.uvmcopy(&kmem, &mut copy, 3 * PAGE_SIZE).unwrap();
        pt.free(&kmem, 3 * PAGE_SIZE);
        copy.free(&kmem, 3 * PAGE_SIZE);
        assert_eq!(kmem.free_pages(), before);
    }

    #[test]
    fn uvmcopy_duplicates_contents() {
        let kmem = Kmem::new(32);
        let mut pt = PageTable::create(&kmem).unwrap();
        pt.uvmalloc(&kmem, 0, PAGE_SIZE, PteFlags::W).unwrap();
        pt.copyout(&kmem, 16, b"parent").unwrap();

        let mut child = PageTable::create(&kmem).unwrap();
        pt.uvmcopy(&kmem, &mut child, PAGE_SIZE).unwrap();
        pt.copyout(&kmem, 16, b"PARENT").unwrap();

        let mut back = [0u8; 6];
        child.copyin(&kmem, &mut back, 16).unwrap();
        assert_eq!(&back, b"parent");
        assert_ne!(pt.walkaddr(&kmem, 0), child.walkaddr(&kmem, 0));
    }

    #[test]
    fn uvmalloc_unwinds_when_memory_runs_out() {
        let kmem = Kmem::new(6);
        let mut pt = PageTable::create(&kmem).unwrap();
        let before = kmem.free_pages();
        assert_eq!(
            pt.uvmalloc(&kmem, 0, 16 * PAGE_SIZE, PteFlags::W),
            Err(VmError::OutOfMemory)
        );
        // interior tables stay, the data pages come back
        assert_eq!(kmem.free_pages(), before - 2);
    }

    #[test]
    fn uvmdealloc_shrinks_to_page_boundary() {
        let kmem = Kmem::new(16);
        let mut pt = PageTable::create(&kmem).unwrap();
        pt.uvmalloc(&kmem, 0, 3 * PAGE_SIZE, PteFlags::W).unwrap();
        assert_eq!(pt.uvmdealloc(&kmem, 3 * PAGE_SIZE, PAGE_SIZE + 1), PAGE_SIZE + 1);
        assert!(pt.walkaddr(&kmem, PAGE_SIZE).is_ok());
        assert_eq!(pt.walkaddr(&kmem, 2 * PAGE_SIZE), Err(VmError::NotMapped));
    }

    #[test]
    fn table_at_follows_the_address() {
        let kmem = Kmem::new(16);
        let mut pt = PageTable::create(&kmem).unwrap();
        pt.uvmalloc(&kmem, 0, PAGE_SIZE, PteFlags::W).unwrap();

        let root = pt.table_at(&kmem, 2, 0).unwrap();
        assert_eq!(root.iter().filter(|pte| pte.valid()).count(), 1);
        let leaf = pt.table_at(&kmem, 0, 0).unwrap();
        assert!(leaf[0].valid() && leaf[0].user_accessible());
        assert_eq!(leaf.iter().filter(|pte| pte.valid()).count(), 1);

        assert_eq!(pt.table_at(&kmem, 3, 0), Err(VmError::BadAddress));
        assert_eq!(pt.table_at(&kmem, 0, MAX_VA), Err(VmError::BadAddress));
        assert_eq!(pt.table_at(&kmem, 0, TRAPFRAME), Err(VmError::NotMapped));
    }

    #[test]
    fn kernel_stacks_are_distinct_and_guarded() {
        let kmem = Kmem::new(16);
        let trampoline = kmem.alloc_zeroed().unwrap();
        let kpt = kvmmake(&kmem, trampoline, 4).unwrap();
        for slot in 0..4 {
            assert!(kpt
                .walk_const(&kmem, KSTACK(slot), |pte| pte.valid())
                .unwrap());
            assert!(!kpt
                .walk_const(&kmem, KSTACK(slot) + PAGE_SIZE, |pte| pte.valid())
                .unwrap());
        }
    }
}

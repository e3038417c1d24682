//! Physical memory and the page allocator that hands it out.
//!
//! RAM is modelled as an array of 64-bit words starting at [`KERNBASE`], so
//! page tables, trap frames and user pages all live at physical addresses
//! the same way they would on the board. Bytes are little-endian within a
//! word.

use alloc::boxed::Box;
use core::sync::atomic::{AtomicU64, Ordering};
use log::debug;
use spin::mutex::Mutex;

pub const PAGE_SIZE: usize = 4096;
/// Physical address of the first byte of RAM
pub const KERNBASE: usize = 0x8000_0000;

const WORD: usize = core::mem::size_of::<u64>();
const WORDS_PER_PAGE: usize = PAGE_SIZE / WORD;

macro_rules! PGROUNDUP {
    ($e:expr) => {
        ($e as usize + $crate::kalloc::PAGE_SIZE - 1) & !($crate::kalloc::PAGE_SIZE - 1)
    };
}

macro_rules! PGROUNDDOWN {
    ($e:expr) => {
        $e as usize & !($crate::kalloc::PAGE_SIZE - 1)
    };
}

pub(crate) use PGROUNDDOWN;
pub(crate) use PGROUNDUP;

/// No free page was left
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutOfMemory;

pub struct Kmem {
    words: Box<[AtomicU64]>,
    /// Physical address of the first free page. Each free page stores the
    /// address of the next one in its first word, 0 ending the list.
    freelist: Mutex<Option<usize>>,
}

impl Kmem {
    /// Creates `page_count` pages of RAM, all of them free
    #[must_use]
    pub fn new(page_count: usize) -> Self {
        let kmem = Self {
            words: (0..page_count * WORDS_PER_PAGE)
                .map(|_| AtomicU64::new(0))
                .collect(),
            freelist: Mutex::new(None),
        };
        debug!(
            "Initializing allocator, {page_count} pages at {KERNBASE:#x}..{:#x}",
            kmem.phystop()
        );
        // free from the top so the lowest pages are handed out first
        for page in (0..page_count).rev() {
            kmem.free(KERNBASE + page * PAGE_SIZE);
        }
        kmem
    }

    /// One past the last physical address
    #[must_use]
    pub fn phystop(&self) -> usize {
        KERNBASE + self.words.len() * WORD
    }

    #[must_use]
    pub fn total_pages(&self) -> usize {
        self.words.len() / WORDS_PER_PAGE
    }

    /// Allocate one 4096-byte page of physical memory.
    /// The page is filled with junk.
    ///
    /// # Errors
    /// Fails when every page is in use.
    pub fn alloc(&self) -> Result<usize, OutOfMemory> {
        let mut freelist = self.freelist.lock();
        let page = freelist.ok_or(OutOfMemory)?;
        let next = self.read_word(page);
        *freelist = if next == 0 {
            None
        } else {
            Some(Self::to_address(next))
        };
        core::mem::drop(freelist);

        self.fill(page, 5);
        Ok(page)
    }

    /// Allocate a page and clear it
    ///
    /// # Errors
    /// Fails when every page is in use.
    pub fn alloc_zeroed(&self) -> Result<usize, OutOfMemory> {
        let page = self.alloc()?;
        self.fill(page, 0);
        Ok(page)
    }

    /// Free the page of physical memory at `pa`, which normally should have
    /// been returned by a call to [`Kmem::alloc`].
    ///
    /// # Panics
    /// Panics if `pa` is not a page of this memory.
    pub fn free(&self, pa: usize) {
        if pa % PAGE_SIZE != 0 || pa < KERNBASE || pa >= self.phystop() {
            panic!("KPA_dealloc: Out of bounds");
        }

        // Fill with junk to catch dangling refs.
        self.fill(pa, 1);

        let mut freelist = self.freelist.lock();
        self.write_word(pa, freelist.map_or(0, |next| next as u64));
        *freelist = Some(pa);
    }

    /// Number of pages on the free list
    #[must_use]
    pub fn free_pages(&self) -> usize {
        let freelist = self.freelist.lock();
        let mut count = 0;
        let mut page = *freelist;
        while let Some(pa) = page {
            count += 1;
            page = match self.read_word(pa) {
                0 => None,
                next => Some(Self::to_address(next)),
            };
        }
        count
    }

    /// Reads the aligned word at `pa`
    #[must_use]
    pub fn read_word(&self, pa: usize) -> u64 {
        self.word(pa).load(Ordering::Relaxed)
    }

    /// Writes the aligned word at `pa`
    pub fn write_word(&self, pa: usize, value: u64) {
        self.word(pa).store(value, Ordering::Relaxed);
    }

    pub fn read_bytes(&self, pa: usize, buffer: &mut [u8]) {
        for (address, byte) in (pa..).zip(buffer.iter_mut()) {
            let shift = (address % WORD) * 8;
            *byte = (self.read_word(address - address % WORD) >> shift) as u8;
        }
    }

    pub fn write_bytes(&self, pa: usize, data: &[u8]) {
        for (address, &byte) in (pa..).zip(data) {
            let shift = (address % WORD) * 8;
            let word = self.word(address - address % WORD);
            word.fetch_and(!(0xFF << shift), Ordering::Relaxed);
            word.fetch_or(u64::from(byte) << shift, Ordering::Relaxed);
        }
    }

    /// Fills the page at `pa` with `byte`
    pub fn fill(&self, pa: usize, byte: u8) {
        let value = u64::from_le_bytes([byte; WORD]);
        for offset in (0..PAGE_SIZE).step_by(WORD) {
            self.write_word(pa + offset, value);
        }
    }

    pub fn copy_page(&self, dst: usize, src: usize) {
        for offset in (0..PAGE_SIZE).step_by(WORD) {
            self.write_word(dst + offset, self.read_word(src + offset));
        }
    }

    fn word(&self, pa: usize) -> &AtomicU64 {
        assert!(
            pa % WORD == 0 && pa >= KERNBASE && pa < self.phystop(),
            "bad physical address {pa:#x}"
        );
        &self.words[(pa - KERNBASE) / WORD]
    }

    #[allow(clippy::cast_possible_truncation)]
    fn to_address(word: u64) -> usize {
        word as usize
    }
}

impl core::fmt::Debug for Kmem {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Kmem")
            .field("total_pages", &self.total_pages())
            .field("free_pages", &self.free_pages())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocates_every_page_once() {
        let kmem = Kmem::new(4);
        let mut pages: alloc::vec::Vec<usize> = (0..4).map(|_| kmem.alloc().unwrap()).collect();
        assert_eq!(kmem.alloc(), Err(OutOfMemory));
        pages.sort_unstable();
        pages.dedup();
        assert_eq!(pages.len(), 4);
        assert!(pages.iter().all(|&pa| pa % PAGE_SIZE == 0 && pa >= KERNBASE));
    }

    #[test]
    fn free_returns_page_to_pool() {
        let kmem = Kmem::new(2);
        let page = kmem.alloc().unwrap();
        assert_eq!(kmem.free_pages(), 1);
        kmem.free(page);
        assert_eq!(kmem.free_pages(), 2);
    }

    #[test]
    fn allocated_pages_are_junk_filled() {
        let kmem = Kmem::new(1);
        let page = kmem.alloc().unwrap();
        assert_eq!(kmem.read_word(page + 64), 0x0505_0505_0505_0505);
        kmem.free(page);
        let page = kmem.alloc_zeroed().unwrap();
        assert_eq!(kmem.read_word(page), 0);
    }

    #[test]
    fn bytes_are_little_endian_within_words() {
        let kmem = Kmem::new(1);
        let page = kmem.alloc_zeroed().unwrap();
        kmem.write_bytes(page + 3, &[0xAB, 0xCD, 0xEF, 0x01, 0x23, 0x45, 0x67]);
        assert_eq!(kmem.read_word(page), 0x2301_EFCD_AB00_0000);
        assert_eq!(kmem.read_word(page + 8), 0x6745);
        let mut back = [0u8; 7];
        kmem.read_bytes(page + 3, &mut back);
        assert_eq!(back, [0xAB, 0xCD, 0xEF, 0x01, 0x23, 0x45, 0x67]);
    }

    #[test]
    #[should_panic(expected = "KPA_dealloc: Out of bounds")]
    fn freeing_unaligned_address_is_fatal() {
        let kmem = Kmem::new(1);
        kmem.free(KERNBASE + 8);
    }
}

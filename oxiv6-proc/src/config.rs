use crate::param::{MAX_HART_COUNT, MAX_NPROC};
use core::fmt;

/// Description of the machine the kernel boots on.
///
/// Plays the part of the values oxiv6 reads from the device tree: how many
/// harts there are and how much physical memory backs them. The process
/// table capacity is fixed here too and never changes after boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MachineSpec {
    /// Harts running a scheduler loop
    pub cpu_count: usize,
    /// Capacity of the process table
    pub process_slots: usize,
    /// Pages of physical memory handed to the page allocator
    pub physical_pages: usize,
}

impl MachineSpec {
    /// Pages the kernel itself needs before any process exists:
    /// the trampoline, the kernel page table, and one stack per slot.
    #[must_use]
    pub const fn reserved_pages(&self) -> usize {
        // trampoline + kernel page table root, two interior tables and the
        // kernel stacks
        4 + self.process_slots
    }

    /// Checks that the description is one the kernel can boot on.
    ///
    /// # Errors
    /// Returns the first limit the description breaks.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cpu_count == 0 || self.cpu_count > MAX_HART_COUNT {
            return Err(ConfigError::CpuCount(self.cpu_count));
        }
        if self.process_slots == 0 || self.process_slots > MAX_NPROC {
            return Err(ConfigError::ProcessSlots(self.process_slots));
        }
        // init needs a trapframe, a user page and five page-table pages
        if self.physical_pages < self.reserved_pages() + 7 {
            return Err(ConfigError::PhysicalMemory(self.physical_pages));
        }
        Ok(())
    }
}

impl Default for MachineSpec {
    fn default() -> Self {
        Self {
            cpu_count: 2,
            process_slots: 16,
            physical_pages: 1024,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    CpuCount(usize),
    ProcessSlots(usize),
    PhysicalMemory(usize),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CpuCount(count) => {
                write!(f, "cpu count {count} outside 1..={MAX_HART_COUNT}")
            }
            Self::ProcessSlots(slots) => {
                write!(f, "process slots {slots} outside 1..={MAX_NPROC}")
            }
            Self::PhysicalMemory(pages) => {
                write!(f, "{pages} physical pages is too little memory to boot")
            }
        }
    }
}

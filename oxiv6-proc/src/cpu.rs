use crate::param::scheduler_stack_top;
use crate::platform::{Context, Platform};
use alloc::{boxed::Box, sync::Arc};
use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

const NO_PROC: usize = usize::MAX;

/// Per-CPU state
///
/// Only the hart a `Cpu` describes touches it, and only with interrupts
/// disabled, so relaxed atomics are enough to keep it coherent.
#[derive(Debug)]
pub struct Cpu {
    /// Slot of the process running on this cpu, or `NO_PROC`
    proc: AtomicUsize,
    /// switch() here to enter scheduler()
    context: UnsafeCell<Context>,
    /// Depth of push_off() nesting
    noff: AtomicUsize,
    /// Were interrupts enabled before push_off()?
    intena: AtomicBool,
}

// `context` is only written by the switch primitive on this hart
unsafe impl Sync for Cpu {}

impl Cpu {
    fn new(hartid: usize) -> Self {
        Self {
            proc: AtomicUsize::new(NO_PROC),
            context: UnsafeCell::new(Context {
                sp: scheduler_stack_top(hartid),
                ..Context::new()
            }),
            noff: AtomicUsize::new(0),
            intena: AtomicBool::new(false),
        }
    }

    /// Slot index of the process this hart is running
    #[must_use]
    pub fn proc(&self) -> Option<usize> {
        match self.proc.load(Ordering::Relaxed) {
            NO_PROC => None,
            slot => Some(slot),
        }
    }

    pub(crate) fn set_proc(&self, slot: Option<usize>) {
        self.proc.store(slot.unwrap_or(NO_PROC), Ordering::Relaxed);
    }

    pub(crate) fn context(&self) -> *mut Context {
        self.context.get()
    }

    #[must_use]
    pub fn noff(&self) -> usize {
        self.noff.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn intena(&self) -> bool {
        self.intena.load(Ordering::Relaxed)
    }

    pub(crate) fn set_intena(&self, intena: bool) {
        self.intena.store(intena, Ordering::Relaxed);
    }
}

/// Table of CPUs, plus the platform that says which one is "this" one
pub struct CpuTable {
    cpus: Box<[Cpu]>,
    platform: Arc<dyn Platform>,
}

impl CpuTable {
    #[must_use]
    pub fn new(count: usize, platform: Arc<dyn Platform>) -> Self {
        Self {
            cpus: (0..count).map(Cpu::new).collect(),
            platform,
        }
    }

    #[must_use]
    pub fn platform(&self) -> &dyn Platform {
        &*self.platform
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cpus.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cpus.is_empty()
    }

    /// Must be called with interrupts disabled,
    /// to prevent race with process being moved
    /// to a different CPU.
    #[must_use]
    pub fn current_id(&self) -> usize {
        self.platform.hart_id()
    }

    /// Return this CPU's cpu struct.
    /// Interrupts must be disabled.
    #[must_use]
    pub fn current(&self) -> &Cpu {
        &self.cpus[self.current_id()]
    }

    /// Disables interrupts, remembering whether they were on for the
    /// outermost call. Nests; every push needs a matching pop.
    pub fn push_off(&self) -> InterruptsOff<'_> {
        let old = self.platform.interrupts_enabled();
        self.platform.disable_interrupts();
        let cpu = self.current();
        if cpu.noff.load(Ordering::Relaxed) == 0 {
            cpu.intena.store(old, Ordering::Relaxed);
        }
        cpu.noff.fetch_add(1, Ordering::Relaxed);
        InterruptsOff { cpus: self }
    }

    pub(crate) fn pop_off(&self) {
        let cpu = self.current();
        assert!(
            !self.platform.interrupts_enabled(),
            "pop_off - interruptible"
        );
        let noff = cpu.noff.load(Ordering::Relaxed);
        assert!(noff >= 1, "pop_off");
        cpu.noff.store(noff - 1, Ordering::Relaxed);
        if noff == 1 && cpu.intena.load(Ordering::Relaxed) {
            self.platform.enable_interrupts();
        }
    }
}

/// Interrupts stay off for as long as this lives.
///
/// Dropping it pops the nesting level of whichever hart the dropping kernel
/// thread is on, which is not necessarily the hart that pushed it.
#[derive(Debug)]
pub struct InterruptsOff<'a> {
    cpus: &'a CpuTable,
}

impl Drop for InterruptsOff<'_> {
    fn drop(&mut self) {
        self.cpus.pop_off();
    }
}

impl core::fmt::Debug for CpuTable {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CpuTable").field("cpus", &self.cpus).finish()
    }
}

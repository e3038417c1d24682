use crate::config::{ConfigError, MachineSpec};
use crate::cpu::CpuTable;
use crate::file::FileSystem;
use crate::kalloc::{Kmem, OutOfMemory};
use crate::platform::Platform;
use crate::proc::{ProcRef, ProcTable};
use crate::vm::{self, PageTable, VmError};
use alloc::sync::Arc;
use core::fmt;
use core::sync::atomic::{AtomicBool, Ordering};
use log::info;
use spin::once::Once;

/// Everything the process core shares between harts
pub struct Kernel {
    spec: MachineSpec,
    pub(crate) platform: Arc<dyn Platform>,
    pub(crate) cpus: Arc<CpuTable>,
    pub(crate) kmem: Kmem,
    pub(crate) procs: ProcTable,
    pub(crate) initproc: Once<ProcRef>,
    /// Physical page holding the trap entry/exit code
    pub(crate) trampoline: usize,
    pub(crate) kernel_pagetable: PageTable,
    pub(crate) fs: Arc<dyn FileSystem>,
    pub(crate) fs_started: Once<()>,
    started: AtomicBool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootError {
    Config(ConfigError),
    Memory(VmError),
}

impl From<ConfigError> for BootError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<VmError> for BootError {
    fn from(value: VmError) -> Self {
        Self::Memory(value)
    }
}

impl From<OutOfMemory> for BootError {
    fn from(value: OutOfMemory) -> Self {
        Self::Memory(value.into())
    }
}

impl fmt::Display for BootError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(error) => write!(f, "bad machine description: {error}"),
            Self::Memory(error) => write!(f, "kernel memory setup failed: {error:?}"),
        }
    }
}

impl Kernel {
    /// Sets up physical memory, the kernel page table and an empty process
    /// table, and points fresh kernel threads at `forkret`. No hart runs
    /// until each calls [`Kernel::main`].
    ///
    /// # Errors
    /// Fails if `spec` is not bootable.
    pub fn new(
        spec: MachineSpec,
        platform: Arc<dyn Platform>,
        fs: Arc<dyn FileSystem>,
    ) -> Result<Arc<Self>, BootError> {
        spec.validate()?;

        let cpus = Arc::new(CpuTable::new(spec.cpu_count, Arc::clone(&platform)));
        let kmem = Kmem::new(spec.physical_pages);
        let trampoline = kmem.alloc_zeroed()?;
        let kernel_pagetable = vm::kvmmake(&kmem, trampoline, spec.process_slots)?;
        let procs = ProcTable::new(spec.process_slots, &cpus);

        let kernel = Arc::new(Self {
            spec,
            platform: Arc::clone(&platform),
            cpus,
            kmem,
            procs,
            initproc: Once::new(),
            trampoline,
            kernel_pagetable,
            fs,
            fs_started: Once::new(),
            started: AtomicBool::new(false),
        });

        let weak = Arc::downgrade(&kernel);
        platform.install_thread_entry(Arc::new(move || {
            if let Some(kernel) = weak.upgrade() {
                kernel.forkret();
            }
        }));

        info!(
            "kernel ready: {} harts, {} process slots, {} free pages",
            spec.cpu_count,
            spec.process_slots,
            kernel.kmem.free_pages()
        );
        Ok(kernel)
    }

    /// Every hart enters here. Hart 0 creates the first process, then all
    /// of them run their scheduler.
    pub fn main(&self) -> ! {
        let hartid = {
            let _interrupts = self.cpus.push_off();
            self.cpus.current_id()
        };

        if hartid == 0 {
            info!("oxiv6 process core booting");
            if let Err(error) = self.userinit() {
                panic!("userinit: {error:?}");
            }
            self.started.store(true, Ordering::Release);
        } else {
            while !self.started.load(Ordering::Acquire) {
                core::hint::spin_loop();
            }
            info!("hart {hartid} starting");
        }

        self.scheduler()
    }

    #[must_use]
    pub fn spec(&self) -> &MachineSpec {
        &self.spec
    }

    #[must_use]
    pub fn cpus(&self) -> &Arc<CpuTable> {
        &self.cpus
    }

    #[must_use]
    pub fn kmem(&self) -> &Kmem {
        &self.kmem
    }

    #[must_use]
    pub fn procs(&self) -> &ProcTable {
        &self.procs
    }

    #[must_use]
    pub fn kernel_pagetable(&self) -> &PageTable {
        &self.kernel_pagetable
    }
}

impl fmt::Debug for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Kernel")
            .field("spec", &self.spec)
            .field("kmem", &self.kmem)
            .finish_non_exhaustive()
    }
}

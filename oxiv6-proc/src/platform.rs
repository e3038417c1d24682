use crate::kernel::Kernel;
use alloc::sync::Arc;

/// The first code a new kernel thread runs, `forkret` in practice
pub type ThreadEntry = Arc<dyn Fn() + Send + Sync>;

/// Architecture services the process core is built on.
///
/// A RISC-V port backs these with `tp`, `sstatus.SIE`, `wfi`, the timer and
/// `swtch.S`; the `hosted` module backs them with native threads.
pub trait Platform: Send + Sync {
    /// Id of the hart executing the caller. Only stable while interrupts are
    /// disabled, since the calling kernel thread may otherwise migrate.
    fn hart_id(&self) -> usize;

    fn interrupts_enabled(&self) -> bool;

    fn enable_interrupts(&self);

    fn disable_interrupts(&self);

    /// Idle the hart until something may have become runnable
    fn wait_for_interrupt(&self);

    /// Ticks since boot
    fn uptime(&self) -> u64;

    /// Saves the current kernel thread into `old` and resumes `new` on this
    /// hart. Returns when some hart switches back to `old`.
    ///
    /// A context primed by [`Context::thread_entry`] starts at the installed
    /// [`ThreadEntry`] on its stack instead of returning from a switch.
    ///
    /// # Safety
    /// Both pointers must stay valid until the switch back to `old`, `new`
    /// must not be running anywhere, and the caller must hold the lock that
    /// serializes switches involving these two contexts.
    unsafe fn switch(&self, old: *mut Context, new: *const Context);

    /// Registers where freshly primed contexts begin executing
    fn install_thread_entry(&self, entry: ThreadEntry);

    /// `context` belonged to a process that has been reaped and will never
    /// be switched to again
    fn retire(&self, _context: &Context) {}

    /// Leaves the kernel for user mode in the current process.
    /// Control comes back only through a trap into [`Kernel::usertrap`].
    fn return_to_user(&self, kernel: &Kernel) -> !;
}

/// Saved registers for kernel context switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(C)]
pub struct Context {
    pub ra: usize,
    pub sp: usize,

    // callee-saved
    pub s: [usize; 12],
}

impl Context {
    /// `ra` of a context that has never run
    pub const THREAD_ENTRY: usize = 0;

    #[must_use]
    pub const fn new() -> Self {
        Self {
            ra: 0,
            sp: 0,
            s: [0; 12],
        }
    }

    /// A context that starts at the installed thread entry on the stack
    /// ending at `stack_top`.
    #[must_use]
    pub const fn thread_entry(stack_top: usize) -> Self {
        Self {
            ra: Self::THREAD_ENTRY,
            sp: stack_top,
            s: [0; 12],
        }
    }

    #[must_use]
    pub const fn is_fresh(&self) -> bool {
        self.ra == Self::THREAD_ENTRY
    }
}

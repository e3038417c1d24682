use crate::kalloc::PAGE_SIZE;
use crate::kernel::Kernel;
use crate::proc::Proc;
use crate::trapframe::Register;

/// Why user code entered the kernel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrapCause {
    /// `ecall`, with the call number in a7
    Syscall,
    /// Timer interrupt
    Timer,
}

impl Kernel {
    /// handle an interrupt, exception, or system call from user space.
    pub fn usertrap(&self, cause: TrapCause) {
        let p = self.curproc();

        if cause == TrapCause::Syscall {
            // system call

            if self.killed(p) {
                self.exit(-1);
            }

            // epc points to the ecall instruction,
            // but we want to return to the next instruction.
            let trapframe = self.trapframe_of(p);
            trapframe.write(Register::Epc, trapframe.read(Register::Epc) + 4);

            // an interrupt will change sepc, scause, and sstatus,
            // so enable only now that we're done with those registers.
            self.platform.enable_interrupts();

            self.syscall(p);
        }

        if self.killed(p) {
            self.exit(-1);
        }

        // give up the CPU if this is a timer interrupt.
        if cause == TrapCause::Timer {
            self.yield_now();
        }

        self.usertrapret(p);
    }

    /// Gets the trap frame ready for the return to user space
    fn usertrapret(&self, p: &Proc) {
        // we're about to switch the destination of traps from
        // kerneltrap() to usertrap(), so turn off interrupts until
        // we're back in user space, where usertrap() is correct.
        self.platform.disable_interrupts();

        // set up trapframe values that the trampoline will need when
        // the process next traps into the kernel.
        let trapframe = self.trapframe_of(p);
        trapframe.write(Register::KernelSatp, self.kernel_pagetable.satp() as usize);
        trapframe.write(Register::KernelSp, p.kstack() + PAGE_SIZE);
        trapframe.write(Register::KernelHartid, self.cpus.current_id());
    }

    /// A fork child's very first scheduling by scheduler()
    /// will switch to forkret.
    pub(crate) fn forkret(&self) -> ! {
        let p = self.curproc();

        // Still holding p->lock from scheduler.
        unsafe { p.inner.force_unlock() };

        // File system initialization must be run in the context of a
        // regular process (e.g., because it calls sleep), and thus cannot
        // be run from main().
        self.fs_started.call_once(|| self.fs.init());

        self.usertrapret(p);
        self.platform.return_to_user(self)
    }
}

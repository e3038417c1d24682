use super::{park_forever, HostedMachine, IDLE};
use crate::file::{File, OpenFile};
use crate::kalloc::PAGE_SIZE;
use crate::kernel::Kernel;
use crate::platform::Platform;
use crate::proc::Pid;
use crate::syscall::Syscall;
use crate::trap::TrapCause;
use crate::trapframe::Register;
use crate::vm::VmError;
use std::sync::Arc;
use std::thread;

/// Code a process runs in user mode
pub type Program = Arc<dyn Fn(&User<'_>) + Send + Sync>;

/// Top of the user stack page, left free for call results such as the
/// status `wait` reports
pub const SCRATCH: usize = PAGE_SIZE - 256;

/// What a user program can do: trap into the kernel, and load and store its
/// own memory.
pub struct User<'k> {
    kernel: &'k Kernel,
    machine: &'k HostedMachine,
}

impl<'k> User<'k> {
    pub(super) fn new(kernel: &'k Kernel, machine: &'k HostedMachine) -> Self {
        Self { kernel, machine }
    }

    #[must_use]
    pub fn kernel(&self) -> &'k Kernel {
        self.kernel
    }

    #[must_use]
    pub fn machine(&self) -> &'k HostedMachine {
        self.machine
    }

    /// Enter the kernel. Returns once the process is back in user mode.
    fn trap(&self, cause: TrapCause) {
        if self.machine.halted() {
            park_forever();
        }
        // the trap clears sstatus.SIE
        self.machine.disable_interrupts();
        self.kernel.usertrap(cause);
        self.machine.enable_interrupts();
    }

    /// `ecall` with `args` in a0 onwards. Returns a0.
    #[allow(clippy::cast_possible_wrap)]
    pub fn syscall(&self, call: Syscall, args: &[usize]) -> i64 {
        let trapframe = self.kernel.trapframe();
        for (&register, &arg) in Register::ARGS.iter().zip(args) {
            trapframe.write(register, arg);
        }
        trapframe.write(Register::A7, call.into());
        self.trap(TrapCause::Syscall);
        self.kernel.trapframe().read(Register::A0) as i64
    }

    /// A timer interrupt: gives up the hart for a round
    pub fn pause(&self) {
        thread::sleep(IDLE);
        self.trap(TrapCause::Timer);
    }

    /// Starts a child running `program`
    pub fn fork(&self, program: impl Fn(&User<'_>) + Send + Sync + 'static) -> Option<Pid> {
        let epc = self.machine.register(Arc::new(program));
        // usertrap() steps past the ecall
        self.kernel.trapframe().write(Register::Epc, epc - 4);
        let pid = self.syscall(Syscall::Fork, &[]);
        match u32::try_from(pid) {
            Ok(pid) => Some(Pid::new(pid)),
            Err(_) => {
                self.machine.unregister(epc);
                None
            }
        }
    }

    pub fn exit(&self, status: i32) -> ! {
        self.syscall(Syscall::Exit, &[arg(status)]);
        unreachable!("exit returned");
    }

    /// Reaps a child, returning its pid and exit status
    pub fn wait(&self) -> Option<(Pid, i32)> {
        let pid = self.syscall(Syscall::Wait, &[SCRATCH]);
        let pid = u32::try_from(pid).ok()?;
        let mut status = [0u8; 4];
        self.load(SCRATCH, &mut status).ok()?;
        Some((Pid::new(pid), i32::from_le_bytes(status)))
    }

    pub fn kill(&self, pid: Pid) -> bool {
        self.syscall(Syscall::Kill, &[pid.get() as usize]) == 0
    }

    #[must_use]
    pub fn getpid(&self) -> Pid {
        Pid::new(u32::try_from(self.syscall(Syscall::Getpid, &[])).unwrap_or(0))
    }

    /// Grows memory by `n` bytes, returning the start of the new region
    pub fn sbrk(&self, n: i32) -> Option<usize> {
        usize::try_from(self.syscall(Syscall::Sbrk, &[arg(n)])).ok()
    }

    /// Installs `file` in the lowest free descriptor
    pub fn open(&self, file: Arc<dyn File>) -> Option<i32> {
        let fd = self.kernel.fdalloc(OpenFile::new(file)).ok()?;
        i32::try_from(fd).ok()
    }

    pub fn read(&self, fd: i32, addr: usize, n: usize) -> i64 {
        self.syscall(Syscall::Read, &[arg(fd), addr, n])
    }

    pub fn write(&self, fd: i32, addr: usize, n: usize) -> i64 {
        self.syscall(Syscall::Write, &[arg(fd), addr, n])
    }

    pub fn close(&self, fd: i32) -> bool {
        self.syscall(Syscall::Close, &[arg(fd)]) == 0
    }

    /// A store to this process's memory
    ///
    /// # Errors
    /// Fails if `addr` is not writable user memory.
    pub fn store(&self, addr: usize, bytes: &[u8]) -> Result<(), VmError> {
        self.kernel.copy_to_user(addr, bytes)
    }

    /// A load from this process's memory
    ///
    /// # Errors
    /// Fails if `addr` is not user memory.
    pub fn load(&self, addr: usize, bytes: &mut [u8]) -> Result<(), VmError> {
        self.kernel.copy_from_user(bytes, addr)
    }
}

/// Sign-extends an int argument into a register
#[allow(clippy::cast_sign_loss)]
fn arg(value: i32) -> usize {
    value as isize as usize
}

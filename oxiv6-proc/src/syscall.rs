use crate::kernel::Kernel;
use crate::proc::{Pid, Proc};
use crate::ps::PsError;
use crate::trapframe::{Register, TrapFrame};
use log::warn;
use num_enum::{IntoPrimitive, TryFromPrimitive};

/// System call numbers
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
pub enum Syscall {
    Fork = 1,
    Exit = 2,
    Wait = 3,
    Read = 5,
    Kill = 6,
    Dup = 10,
    Getpid = 11,
    Sbrk = 12,
    Uptime = 14,
    Write = 16,
    Close = 21,
    PsList = 23,
    PsInfo = 24,
    PsPt0 = 25,
    PsPt1 = 26,
    PsPt2 = 27,
    PsCopy = 28,
    PsSleepWrite = 29,
}

impl Syscall {
    /// The call a saved a7 names, if any
    #[must_use]
    pub fn decode(number: usize) -> Option<Self> {
        u32::try_from(number)
            .ok()
            .and_then(|number| Self::try_from(number).ok())
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Fork => "fork",
            Self::Exit => "exit",
            Self::Wait => "wait",
            Self::Read => "read",
            Self::Kill => "kill",
            Self::Dup => "dup",
            Self::Getpid => "getpid",
            Self::Sbrk => "sbrk",
            Self::Uptime => "uptime",
            Self::Write => "write",
            Self::Close => "close",
            Self::PsList => "ps_list",
            Self::PsInfo => "ps_info",
            Self::PsPt0 => "ps_pt0",
            Self::PsPt1 => "ps_pt1",
            Self::PsPt2 => "ps_pt2",
            Self::PsCopy => "ps_copy",
            Self::PsSleepWrite => "ps_sleep_write",
        }
    }
}

impl From<Syscall> for usize {
    fn from(value: Syscall) -> Self {
        u32::from(value) as usize
    }
}

/// Fetch the nth 32-bit system call argument.
#[allow(clippy::cast_possible_truncation)]
fn argint(trapframe: &TrapFrame<'_>, n: usize) -> i32 {
    trapframe.read(Register::ARGS[n]) as i32
}

/// Retrieve an argument as a pointer.
/// Doesn't check for legality, since
/// copyin/copyout will do that.
fn argaddr(trapframe: &TrapFrame<'_>, n: usize) -> usize {
    trapframe.read(Register::ARGS[n])
}

fn ps_result(result: Result<usize, PsError>) -> i64 {
    match result {
        Ok(value) => value as i64,
        Err(error) => i64::from(i32::from(error)),
    }
}

impl Kernel {
    pub(crate) fn syscall(&self, p: &Proc) {
        let trapframe = self.trapframe_of(p);
        let number = trapframe.read(Register::A7);

        let ret = match Syscall::decode(number) {
            Some(call) => self.dispatch(call, &trapframe),
            None => {
                let inner = p.lock();
                warn!("{} {}: unknown sys call {}", inner.pid, inner.name(), number);
                -1
            }
        };
        trapframe.write(Register::A0, ret as usize);
    }

    fn dispatch(&self, call: Syscall, trapframe: &TrapFrame<'_>) -> i64 {
        match call {
            Syscall::Fork => self
                .fork()
                .map_or(-1, |pid| i64::from(pid.get())),
            Syscall::Exit => self.exit(argint(trapframe, 0)),
            Syscall::Wait => {
                let addr = argaddr(trapframe, 0);
                self.wait((addr != 0).then_some(addr))
                    .map_or(-1, |pid| i64::from(pid.get()))
            }
            Syscall::Read | Syscall::Write => {
                let (fd, addr, n) = (
                    argint(trapframe, 0),
                    argaddr(trapframe, 1),
                    argint(trapframe, 2),
                );
                let (Some(file), Ok(n)) = (self.fd_file(fd), usize::try_from(n)) else {
                    return -1;
                };
                let result = if call == Syscall::Read {
                    file.file().read(self, addr, n)
                } else {
                    file.file().write(self, addr, n)
                };
                result.map_or(-1, |count| count as i64)
            }
            Syscall::Kill => u32::try_from(argint(trapframe, 0))
                .ok()
                .and_then(|pid| self.kill(Pid::new(pid)).ok())
                .map_or(-1, |()| 0),
            Syscall::Dup => match self.fd_file(argint(trapframe, 0)) {
                Some(file) => self.fdalloc(file.dup()).map_or(-1, |fd| fd as i64),
                None => -1,
            },
            Syscall::Getpid => i64::from(self.curproc().lock().pid.get()),
            Syscall::Sbrk => {
                let n = argint(trapframe, 0);
                let addr = self.curproc().lock().sz;
                match self.growproc(n as isize) {
                    Ok(()) => addr as i64,
                    Err(_) => -1,
                }
            }
            Syscall::Uptime => self.platform.uptime() as i64,
            Syscall::Close => self.fd_close(argint(trapframe, 0)).map_or(-1, |()| 0),
            Syscall::PsList => ps_result(self.ps_list(argint(trapframe, 0), argaddr(trapframe, 1))),
            Syscall::PsInfo => ps_result(
                self.ps_info(argint(trapframe, 0), argaddr(trapframe, 1))
                    .map(|()| 0),
            ),
            Syscall::PsPt0 | Syscall::PsPt1 | Syscall::PsPt2 => {
                let level = match call {
                    Syscall::PsPt0 => 0,
                    Syscall::PsPt1 => 1,
                    _ => 2,
                };
                ps_result(
                    self.ps_pagetable(
                        argint(trapframe, 0),
                        level,
                        argaddr(trapframe, 1),
                        argaddr(trapframe, 2),
                    )
                    .map(|()| 0),
                )
            }
            Syscall::PsCopy => ps_result(
                self.ps_copy(
                    argint(trapframe, 0),
                    argaddr(trapframe, 1),
                    argint(trapframe, 2),
                    argaddr(trapframe, 3),
                )
                .map(|()| 0),
            ),
            Syscall::PsSleepWrite => {
                ps_result(self.ps_sleep_write(argint(trapframe, 0), argaddr(trapframe, 1)))
            }
        }
    }
}

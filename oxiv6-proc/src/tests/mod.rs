//! Whole-kernel scenarios: boot on a hosted machine, run user programs as
//! init and its descendants, and look at what they observed.

mod introspection;
mod lifecycle;

use crate::config::MachineSpec;
use crate::hosted::{Gate, HostConsole, HostFs, HostedMachine, User};
use crate::kernel::Kernel;
use crate::proc::{Pid, ProcState};
use crate::ps::ProcessInfo;
use crate::syscall::Syscall;
use std::sync::{mpsc, Arc};
use std::time::Duration;

/// How long init gets before the scenario counts as hung
const TIMEOUT: Duration = Duration::from_secs(30);
/// Timer ticks a poll gives up after
const POLLS: usize = 20_000;

/// User addresses in the first page, clear of initcode and the stack
pub(crate) const INFO_BUF: usize = 0x100;
pub(crate) const DATA_BUF: usize = 0x200;
pub(crate) const LIST_BUF: usize = 0x300;

pub(crate) struct Booted {
    pub(crate) machine: Arc<HostedMachine>,
    pub(crate) kernel: Arc<Kernel>,
    pub(crate) fs: Arc<HostFs>,
}

impl Drop for Booted {
    fn drop(&mut self) {
        self.machine.power_off();
    }
}

pub(crate) fn spec(cpu_count: usize) -> MachineSpec {
    MachineSpec {
        cpu_count,
        process_slots: 8,
        physical_pages: 512,
    }
}

/// Boots a kernel whose init runs `program`, and hands back what it
/// returned. Init keeps reaping orphans afterwards until the machine is
/// powered off.
pub(crate) fn run<T, F>(spec: MachineSpec, program: F) -> (Booted, T)
where
    T: Send + 'static,
    F: Fn(&User<'_>) -> T + Send + Sync + 'static,
{
    HostConsole::install(log::LevelFilter::Warn);

    let machine = HostedMachine::new(spec.cpu_count);
    let fs = HostFs::new();
    let kernel = Kernel::new(spec, machine.clone(), fs.clone()).unwrap();

    let (tx, rx) = mpsc::sync_channel(1);
    machine
        .boot(
            &kernel,
            Arc::new(move |user: &User<'_>| {
                let _ = tx.send(program(user));
            }),
        )
        .unwrap();

    let booted = Booted {
        machine,
        kernel,
        fs,
    };
    let result = rx
        .recv_timeout(TIMEOUT)
        .expect("init program did not finish");
    (booted, result)
}

pub(crate) fn ps_info(user: &User<'_>, pid: Pid) -> Result<ProcessInfo, i64> {
    let ret = user.syscall(Syscall::PsInfo, &[pid.get() as usize, INFO_BUF]);
    if ret != 0 {
        return Err(ret);
    }
    let mut bytes = [0u8; ProcessInfo::SIZE];
    user.load(INFO_BUF, &mut bytes).unwrap();
    Ok(ProcessInfo::from_bytes(&bytes))
}

pub(crate) fn wait_until_sleeping(user: &User<'_>, pid: Pid) {
    for _ in 0..POLLS {
        if ps_info(user, pid).is_ok_and(|info| info.state() == ProcState::Sleeping.label()) {
            return;
        }
        user.pause();
    }
    panic!("pid {pid} never went to sleep");
}

/// Opens a fresh gate in the calling process
pub(crate) fn open_gate(user: &User<'_>) -> (Arc<Gate>, i32) {
    let gate = Arc::new(Gate::new(user.kernel()));
    let fd = user.open(gate.clone()).unwrap();
    (gate, fd)
}

/// Child program that stores `data` and writes it to `fd`, exiting with
/// what write returned
pub(crate) fn writer(fd: i32, data: &'static [u8]) -> impl Fn(&User<'_>) + Send + Sync + 'static {
    move |user: &User<'_>| {
        user.store(DATA_BUF, data).unwrap();
        let n = user.write(fd, DATA_BUF, data.len());
        user.exit(i32::try_from(n).unwrap_or(i32::MIN));
    }
}

/// Child program that idles until it is killed
pub(crate) fn spinner(user: &User<'_>) {
    loop {
        user.pause();
    }
}

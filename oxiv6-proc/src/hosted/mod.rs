//! Runs the process core on native threads.
//!
//! Each kernel thread (every process, plus one scheduler per hart) is a host
//! thread. A hart is a baton: the thread holding hart `n` is the one running
//! on it, and [`Platform::switch`] hands the baton to the thread behind the
//! target context before parking the caller on its own baton.
//!
//! User mode is ordinary Rust code given a [`User`] handle. A program is
//! found by the `epc` its process enters user space with: init starts at 0,
//! and [`User::fork`] plants the child's program at a fresh address.
//!
//! A process that exits never resumes, so its host thread stays parked
//! inside `switch` for the life of the test binary. Reaping the process
//! retires its baton; only the parked thread itself is left behind.

mod console;
mod fs;
mod gate;
mod user;

pub use console::HostConsole;
pub use fs::HostFs;
pub use gate::Gate;
pub use user::{Program, User, SCRATCH};

use crate::kernel::Kernel;
use crate::platform::{Context, Platform, ThreadEntry};
use crate::trapframe::Register;
use std::cell::Cell;
use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};
use std::thread;
use std::time::{Duration, Instant};

/// `ra` recorded for a context whose thread is parked in `switch`
const SAVED: usize = usize::MAX;
const NO_HART: usize = usize::MAX;
/// Where the program registry starts handing out entry points
const FIRST_PROGRAM: usize = 0x1000;
/// How long an idle hart naps before scanning again
const IDLE: Duration = Duration::from_micros(200);

thread_local! {
    static HART: Cell<usize> = const { Cell::new(NO_HART) };
    static THREAD: Cell<usize> = const { Cell::new(0) };
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // a panicking hart already failed the run; keep the rest observable
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Parks the calling thread for good
fn park_forever() -> ! {
    loop {
        thread::park();
    }
}

/// The hart a parked kernel thread resumes on, once someone switches to it
#[derive(Default)]
struct Baton {
    hart: Mutex<Option<usize>>,
    ready: Condvar,
}

impl Baton {
    fn pass(&self, hart: usize) {
        *lock(&self.hart) = Some(hart);
        self.ready.notify_one();
    }

    fn take(&self) -> usize {
        let mut hart = lock(&self.hart);
        loop {
            if let Some(hart) = hart.take() {
                return hart;
            }
            hart = self
                .ready
                .wait(hart)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

/// A simulated multi-hart machine.
pub struct HostedMachine {
    me: Weak<HostedMachine>,
    /// Interrupt enable bit of each hart
    interrupts: Box<[AtomicBool]>,
    batons: Mutex<HashMap<usize, Arc<Baton>>>,
    next_thread: AtomicUsize,
    entry: Mutex<Option<ThreadEntry>>,
    programs: Mutex<HashMap<usize, Program>>,
    next_program: AtomicUsize,
    booted: Instant,
    halted: AtomicBool,
}

impl HostedMachine {
    #[must_use]
    pub fn new(harts: usize) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            interrupts: (0..harts).map(|_| AtomicBool::new(false)).collect(),
            batons: Mutex::new(HashMap::new()),
            next_thread: AtomicUsize::new(1),
            entry: Mutex::new(None),
            programs: Mutex::new(HashMap::new()),
            next_program: AtomicUsize::new(FIRST_PROGRAM),
            booted: Instant::now(),
            halted: AtomicBool::new(false),
        })
    }

    /// Harts this machine has
    #[must_use]
    pub fn harts(&self) -> usize {
        self.interrupts.len()
    }

    /// Makes the calling thread the one running on `hart`.
    ///
    /// # Panics
    /// If the machine has no such hart.
    pub fn adopt_current_thread(&self, hart: usize) {
        assert!(hart < self.harts(), "no hart {hart}");
        HART.with(|current| current.set(hart));
        self.register_thread();
    }

    /// Gives the calling thread a baton other harts can switch to
    fn register_thread(&self) -> usize {
        let thread = self.next_thread.fetch_add(1, Ordering::Relaxed);
        lock(&self.batons).insert(thread, Arc::new(Baton::default()));
        THREAD.with(|current| current.set(thread));
        thread
    }

    /// Kernel threads that can still be switched to: one per hart plus
    /// one per process that has run and not yet been reaped
    #[must_use]
    pub fn kernel_threads(&self) -> usize {
        lock(&self.batons).len()
    }

    fn baton(&self, thread: usize) -> Arc<Baton> {
        match lock(&self.batons).get(&thread) {
            Some(baton) => Arc::clone(baton),
            None => panic!("switch: no kernel thread {thread}"),
        }
    }

    /// Brings up one host thread per hart, each entering [`Kernel::main`].
    /// `init` becomes the first process's program; once it returns, init
    /// goes on reaping orphans.
    ///
    /// # Errors
    /// Fails if `kernel` was built for a different hart count or a hart
    /// thread cannot be spawned.
    pub fn boot(self: &Arc<Self>, kernel: &Arc<Kernel>, init: Program) -> io::Result<()> {
        if kernel.cpus().len() != self.harts() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "kernel wants {} harts, machine has {}",
                    kernel.cpus().len(),
                    self.harts()
                ),
            ));
        }

        lock(&self.programs).insert(
            0,
            Arc::new(move |user: &User<'_>| {
                init(user);
                loop {
                    if user.wait().is_none() {
                        user.pause();
                    }
                }
            }),
        );

        for hart in 0..self.harts() {
            let machine = Arc::clone(self);
            let kernel = Arc::clone(kernel);
            thread::Builder::new()
                .name(format!("hart{hart}"))
                .spawn(move || {
                    machine.adopt_current_thread(hart);
                    kernel.main()
                })?;
        }
        Ok(())
    }

    /// Stops the machine. Harts park when they next idle and processes park
    /// when they next trap, so nothing runs afterwards.
    pub fn power_off(&self) {
        self.halted.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn halted(&self) -> bool {
        self.halted.load(Ordering::Acquire)
    }

    /// Files `program` under a fresh entry point
    fn register(&self, program: Program) -> usize {
        let epc = self.next_program.fetch_add(4, Ordering::Relaxed);
        lock(&self.programs).insert(epc, program);
        epc
    }

    fn unregister(&self, epc: usize) {
        lock(&self.programs).remove(&epc);
    }

    fn hart(&self) -> usize {
        match HART.with(Cell::get) {
            NO_HART => panic!("thread {:?} is not running on a hart", thread::current().name()),
            hart => hart,
        }
    }

    /// Starts a thread for a context that has never run, already holding
    /// `hart`
    fn spawn_thread(&self, hart: usize) {
        let Some(entry) = lock(&self.entry).clone() else {
            panic!("switch: no thread entry installed");
        };
        let Some(machine) = self.me.upgrade() else {
            panic!("switch: machine is gone");
        };
        let spawned = thread::Builder::new()
            .name(String::from("kthread"))
            .spawn(move || {
                HART.with(|current| current.set(hart));
                machine.register_thread();
                entry();
            });
        if let Err(error) = spawned {
            panic!("switch: cannot start kernel thread: {error}");
        }
    }
}

impl Platform for HostedMachine {
    fn hart_id(&self) -> usize {
        self.hart()
    }

    fn interrupts_enabled(&self) -> bool {
        self.interrupts[self.hart()].load(Ordering::Relaxed)
    }

    fn enable_interrupts(&self) {
        self.interrupts[self.hart()].store(true, Ordering::Relaxed);
    }

    fn disable_interrupts(&self) {
        self.interrupts[self.hart()].store(false, Ordering::Relaxed);
    }

    fn wait_for_interrupt(&self) {
        if self.halted() {
            park_forever();
        }
        thread::sleep(IDLE);
    }

    fn uptime(&self) -> u64 {
        u64::try_from(self.booted.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    unsafe fn switch(&self, old: *mut Context, new: *const Context) {
        let hart = self.hart();
        let me = THREAD.with(Cell::get);
        // fetched up front: once the hart is passed on, an exiting thread's
        // baton may be retired before it parks
        let mine = self.baton(me);

        // s0 carries the thread behind a saved context
        let target = unsafe {
            (*old).ra = SAVED;
            (*old).s[0] = me;
            *new
        };

        if target.is_fresh() {
            self.spawn_thread(hart);
        } else {
            self.baton(target.s[0]).pass(hart);
        }

        let hart = mine.take();
        HART.with(|current| current.set(hart));
    }

    fn install_thread_entry(&self, entry: ThreadEntry) {
        *lock(&self.entry) = Some(entry);
    }

    fn retire(&self, context: &Context) {
        if context.ra == SAVED {
            lock(&self.batons).remove(&context.s[0]);
        }
    }

    fn return_to_user(&self, kernel: &Kernel) -> ! {
        let epc = kernel.trapframe().read(Register::Epc);
        let Some(program) = lock(&self.programs).remove(&epc) else {
            panic!("return_to_user: nothing to run at epc {epc:#x}");
        };

        // sret turns interrupts back on
        self.enable_interrupts();
        let user = User::new(kernel, self);
        program(&user);
        user.exit(0)
    }
}

impl std::fmt::Debug for HostedMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostedMachine")
            .field("harts", &self.harts())
            .field("halted", &self.halted())
            .finish_non_exhaustive()
    }
}

use crate::cpu::CpuTable;
use crate::file::{Inode, OpenFile};
use crate::kalloc::{OutOfMemory, PAGE_SIZE};
use crate::kernel::Kernel;
use crate::param::{NAME_SIZE, NOFILE};
use crate::platform::Context;
use crate::println::println;
use crate::spinlock::{SpinLock, SpinLockGuard};
use crate::trapframe::{Register, TrapFrame};
use crate::vm::{PageTable, PteFlags, VmError, KSTACK, TRAMPOLINE, TRAPFRAME};
use alloc::{boxed::Box, sync::Arc};
use core::cell::UnsafeCell;
use core::fmt;
use core::ops::Deref;
use core::sync::atomic::{AtomicU64, Ordering};
use log::{debug, info, warn};
use num_enum::{IntoPrimitive, TryFromPrimitive};

/// The first user program: `exec("/init")`, then `exit()` if that fails.
pub static INITCODE: [u8; 52] = [
    0x17, 0x05, 0x00, 0x00, 0x13, 0x05, 0x45, 0x02, 0x97, 0x05, 0x00, 0x00, 0x93, 0x85, 0x35, 0x02,
    0x93, 0x08, 0x70, 0x00, 0x73, 0x00, 0x00, 0x00, 0x93, 0x08, 0x20, 0x00, 0x73, 0x00, 0x00, 0x00,
    0xef, 0xf0, 0x9f, 0xff, 0x2f, 0x69, 0x6e, 0x69, 0x74, 0x00, 0x00, 0x24, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00,
];

/// Process identifier. Zero is never handed out and stands for "no process".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Pid(u32);

impl Pid {
    pub const NONE: Pid = Pid(0);

    #[must_use]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }

    #[must_use]
    pub const fn is_none(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, IntoPrimitive, TryFromPrimitive)]
pub enum ProcState {
    #[default]
    Unused,
    Used,
    Sleeping,
    Runnable,
    Running,
    Zombie,
}

impl ProcState {
    const LABELS: [&'static str; 6] = ["unused", "used", "sleep ", "runble", "run   ", "zombie"];

    /// Label used by procdump and `ps_info`, at most six characters
    #[must_use]
    pub fn label(self) -> &'static str {
        Self::LABELS[usize::from(u8::from(self))]
    }
}

/// What a sleeping process is waiting for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Something about the process in this slot, its children exiting in
    /// practice
    Proc(usize),
    /// Any other kernel object, identified by [`Channel::resource`]
    Resource(u64),
}

impl Channel {
    /// A channel no other object shares
    pub fn resource() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self::Resource(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcError {
    /// Every slot of the process table is in use
    NoFreeProc,
    OutOfMemory,
    /// `wait` with nothing to wait for
    NoChildren,
    /// The caller was killed while blocked
    Killed,
    NotFound,
    BadAddress,
    InvalidArgument,
    NoFreeDescriptor,
}

impl From<OutOfMemory> for ProcError {
    fn from(_: OutOfMemory) -> Self {
        Self::OutOfMemory
    }
}

impl From<VmError> for ProcError {
    fn from(value: VmError) -> Self {
        match value {
            VmError::OutOfMemory => Self::OutOfMemory,
            VmError::NotMapped | VmError::BadAddress | VmError::PermissionDenied => {
                Self::BadAddress
            }
        }
    }
}

/// A process by slot and pid, so a recycled slot is told apart from the
/// process it used to hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcRef {
    pub slot: usize,
    pub pid: Pid,
}

/// Per-process state guarded by the process lock
#[derive(Debug)]
pub struct ProcInner {
    pub state: ProcState,
    /// If some, sleeping on chan
    pub chan: Option<Channel>,
    /// If true, have been killed
    pub killed: bool,
    /// Exit status to be returned to parent's wait
    pub xstate: i32,
    pub pid: Pid,
    /// Size of process memory (bytes)
    pub sz: usize,
    /// Process name (debugging)
    pub name: [u8; NAME_SIZE],
    /// Open files
    pub ofile: [Option<OpenFile>; NOFILE],
    /// Uptime when the process was allocated
    pub init_ticks: u64,
    /// Ticks spent running, counted when the process sleeps or exits
    pub run_time: u64,
    /// Uptime of the last dispatch
    pub last_run_start: u64,
    pub context_switches: u64,
}

impl ProcInner {
    fn new() -> Self {
        Self {
            state: ProcState::Unused,
            chan: None,
            killed: false,
            xstate: 0,
            pid: Pid::NONE,
            sz: 0,
            name: [0; NAME_SIZE],
            ofile: Default::default(),
            init_ticks: 0,
            run_time: 0,
            last_run_start: 0,
            context_switches: 0,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        let len = self
            .name
            .iter()
            .position(|&byte| byte == 0)
            .unwrap_or(NAME_SIZE);
        core::str::from_utf8(&self.name[..len]).unwrap_or("")
    }

    /// Copies `name`, truncated so a NUL always fits
    pub fn set_name(&mut self, name: &str) {
        let len = core::cmp::min(name.len(), NAME_SIZE - 1);
        self.name = [0; NAME_SIZE];
        self.name[..len].copy_from_slice(&name.as_bytes()[..len]);
    }

    #[must_use]
    pub fn file_count(&self) -> usize {
        self.ofile.iter().flatten().count()
    }
}

/// Per-process state the process itself owns
#[derive(Default)]
pub struct ProcData {
    /// Physical address of the trap frame page
    pub trapframe: Option<usize>,
    /// User page table
    pub pagetable: Option<PageTable>,
    /// Current directory
    pub cwd: Option<Arc<dyn Inode>>,
}

impl ProcData {
    /// # Panics
    /// Panics if the slot has no address space.
    #[must_use]
    pub fn pagetable(&self) -> &PageTable {
        match &self.pagetable {
            Some(pagetable) => pagetable,
            None => panic!("proc has no page table"),
        }
    }

    /// # Panics
    /// Panics if the slot has no address space.
    pub fn pagetable_mut(&mut self) -> &mut PageTable {
        match &mut self.pagetable {
            Some(pagetable) => pagetable,
            None => panic!("proc has no page table"),
        }
    }
}

/// Per-process state
pub struct Proc {
    index: usize,
    /// Virtual address of kernel stack
    kstack: usize,
    /// switch() here to run process
    context: UnsafeCell<Context>,
    pub(crate) inner: SpinLock<ProcInner>,
    data: UnsafeCell<ProcData>,
}

// `context` and `data` follow the access rules on `Proc::data_mut`
unsafe impl Sync for Proc {}

impl Proc {
    fn new(index: usize, cpus: &Arc<CpuTable>) -> Self {
        Self {
            index,
            kstack: KSTACK(index),
            context: UnsafeCell::new(Context::new()),
            inner: SpinLock::new(ProcInner::new(), "proc", cpus),
            data: UnsafeCell::new(ProcData::default()),
        }
    }

    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    #[must_use]
    pub fn kstack(&self) -> usize {
        self.kstack
    }

    pub fn lock(&self) -> SpinLockGuard<'_, ProcInner> {
        self.inner.lock()
    }

    pub(crate) fn context(&self) -> *mut Context {
        self.context.get()
    }

    /// # Safety
    /// Either the caller holds this process's lock, or the caller is this
    /// process, and only reads. No `data_mut` borrow may be live.
    pub(crate) unsafe fn data(&self) -> &ProcData {
        unsafe { &*self.data.get() }
    }

    /// # Safety
    /// Either the caller holds this process's lock while the process is not
    /// running, or the caller is this process itself and holds its lock if
    /// it touches the page table. No other borrow of the data may be live.
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn data_mut(&self) -> &mut ProcData {
        unsafe { &mut *self.data.get() }
    }
}

impl fmt::Debug for Proc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Proc")
            .field("index", &self.index)
            .field("kstack", &format_args!("{:#x}", self.kstack))
            .finish_non_exhaustive()
    }
}

/// The fixed pool of process slots plus the two global locks
pub struct ProcTable {
    procs: Box<[Proc]>,
    /// Parent of each slot. The lock doubles as `wait_lock`: it helps ensure
    /// that wakeups of wait()ing parents are not lost, and must be acquired
    /// before any p->lock.
    pub(crate) parents: SpinLock<Box<[Option<ProcRef>]>>,
    next_pid: SpinLock<u32>,
}

impl ProcTable {
    #[must_use]
    pub fn new(slots: usize, cpus: &Arc<CpuTable>) -> Self {
        Self {
            procs: (0..slots).map(|index| Proc::new(index, cpus)).collect(),
            parents: SpinLock::new(alloc::vec![None; slots].into_boxed_slice(), "wait_lock", cpus),
            next_pid: SpinLock::new(1, "nextpid", cpus),
        }
    }
}

impl Deref for ProcTable {
    type Target = [Proc];

    fn deref(&self) -> &[Proc] {
        &self.procs
    }
}

impl Kernel {
    /// Return the current struct proc, or none.
    pub fn myproc(&self) -> Option<&Proc> {
        let _interrupts = self.cpus.push_off();
        self.cpus
            .current()
            .proc()
            .map(|slot| &self.procs[slot])
    }

    /// The current process, for paths that only run in one
    pub(crate) fn curproc(&self) -> &Proc {
        match self.myproc() {
            Some(p) => p,
            None => panic!("myproc: no process on hart {}", self.cpus.current_id()),
        }
    }

    pub(crate) fn proc_ref(&self, p: &Proc) -> ProcRef {
        ProcRef {
            slot: p.index,
            pid: p.lock().pid,
        }
    }

    /// Trap frame of `p`, which must be allocated
    pub(crate) fn trapframe_of(&self, p: &Proc) -> TrapFrame<'_> {
        match unsafe { p.data() }.trapframe {
            Some(pa) => TrapFrame::new(&self.kmem, pa),
            None => panic!("proc {} has no trapframe", p.index),
        }
    }

    /// Trap frame of the current process
    pub fn trapframe(&self) -> TrapFrame<'_> {
        self.trapframe_of(self.curproc())
    }

    fn allocpid(&self) -> Pid {
        let mut next_pid = self.procs.next_pid.lock();
        let pid = Pid(*next_pid);
        *next_pid += 1;
        pid
    }

    /// Look in the process table for an UNUSED proc.
    /// If found, initialize state required to run in the kernel,
    /// and return with its lock held.
    ///
    /// # Errors
    /// Fails with no slot free or no memory, leaving every slot as it was.
    pub(crate) fn allocproc(&self) -> Result<(&Proc, SpinLockGuard<'_, ProcInner>), ProcError> {
        let mut found = None;
        for p in self.procs.iter() {
            let inner = p.lock();
            if inner.state == ProcState::Unused {
                found = Some((p, inner));
                break;
            }
        }
        let Some((p, mut inner)) = found else {
            warn!("allocproc: process table full");
            return Err(ProcError::NoFreeProc);
        };

        inner.pid = self.allocpid();
        inner.state = ProcState::Used;
        inner.init_ticks = self.platform.uptime();

        // Allocate a trapframe page.
        let trapframe = match self.kmem.alloc_zeroed() {
            Ok(trapframe) => trapframe,
            Err(error) => {
                warn!("allocproc: no memory for trapframe");
                self.freeproc(p, &mut inner);
                return Err(error.into());
            }
        };
        unsafe { p.data_mut() }.trapframe = Some(trapframe);

        // An empty user page table.
        match self.proc_pagetable(trapframe) {
            Ok(pagetable) => unsafe { p.data_mut() }.pagetable = Some(pagetable),
            Err(error) => {
                warn!("allocproc: no memory for page table");
                self.freeproc(p, &mut inner);
                return Err(error.into());
            }
        }

        // Set up new context to start executing at forkret,
        // which returns to user space.
        unsafe { *p.context() = Context::thread_entry(p.kstack + PAGE_SIZE) };

        debug!("allocproc: pid {} in slot {}", inner.pid, p.index);
        Ok((p, inner))
    }

    /// free a proc structure and the data hanging from it,
    /// including user pages.
    /// p->lock must be held.
    pub(crate) fn freeproc(&self, p: &Proc, inner: &mut SpinLockGuard<'_, ProcInner>) {
        let data = unsafe { p.data_mut() };
        if let Some(trapframe) = data.trapframe.take() {
            self.kmem.free(trapframe);
        }
        if let Some(pagetable) = data.pagetable.take() {
            self.proc_freepagetable(pagetable, inner.sz);
        }
        data.cwd = None;
        let context = unsafe { &mut *p.context() };
        self.platform.retire(context);
        *context = Context::new();
        **inner = ProcInner::new();
    }

    /// Create a user page table for a given process, with no user memory,
    /// but with trampoline and trapframe pages.
    fn proc_pagetable(&self, trapframe: usize) -> Result<PageTable, VmError> {
        let mut pagetable = PageTable::create(&self.kmem)?;

        // map the trampoline code (for system call return)
        // at the highest user virtual address.
        // only the supervisor uses it, on the way
        // to/from user space, so not PTE_U.
        if let Err(error) = pagetable.map_pages(
            &self.kmem,
            TRAMPOLINE,
            PAGE_SIZE,
            self.trampoline,
            PteFlags::R | PteFlags::X,
        ) {
            pagetable.free(&self.kmem, 0);
            return Err(error);
        }

        // map the trapframe page just below the trampoline page
        if let Err(error) = pagetable.map_pages(
            &self.kmem,
            TRAPFRAME,
            PAGE_SIZE,
            trapframe,
            PteFlags::R | PteFlags::W,
        ) {
            pagetable.unmap(&self.kmem, TRAMPOLINE, 1, false);
            pagetable.free(&self.kmem, 0);
            return Err(error);
        }

        Ok(pagetable)
    }

    /// Free a process's page table, and free the
    /// physical memory it refers to.
    fn proc_freepagetable(&self, mut pagetable: PageTable, sz: usize) {
        pagetable.unmap(&self.kmem, TRAMPOLINE, 1, false);
        pagetable.unmap(&self.kmem, TRAPFRAME, 1, false);
        pagetable.free(&self.kmem, sz);
    }

    /// Set up first user process.
    pub(crate) fn userinit(&self) -> Result<(), ProcError> {
        let (p, mut inner) = self.allocproc()?;

        // allocate one user page and copy initcode's instructions
        // and data into it.
        let loaded = unsafe { p.data_mut() }
            .pagetable_mut()
            .uvmfirst(&self.kmem, &INITCODE);
        if let Err(error) = loaded {
            self.freeproc(p, &mut inner);
            return Err(error.into());
        }
        inner.sz = PAGE_SIZE;

        // prepare for the very first "return" from kernel to user.
        let trapframe = self.trapframe_of(p);
        trapframe.write(Register::Epc, 0); // user program counter
        trapframe.write(Register::Sp, PAGE_SIZE); // user stack pointer

        inner.set_name("initcode");
        unsafe { p.data_mut() }.cwd = Some(self.fs.root());
        self.initproc.call_once(|| ProcRef {
            slot: p.index,
            pid: inner.pid,
        });

        inner.state = ProcState::Runnable;
        info!("userinit: init is pid {}", inner.pid);
        Ok(())
    }

    /// The designated init process
    #[must_use]
    pub fn initproc(&self) -> Option<ProcRef> {
        self.initproc.get().copied()
    }

    /// Grow or shrink user memory by n bytes.
    ///
    /// # Errors
    /// Fails if memory runs out or the size would leave the user range.
    pub fn growproc(&self, n: isize) -> Result<(), ProcError> {
        let p = self.curproc();
        // held so that introspection never sees a half-built table
        let mut inner = p.lock();
        let pagetable = unsafe { p.data_mut() }.pagetable_mut();

        let sz = inner.sz;
        let new_sz = if n > 0 {
            let target = sz
                .checked_add(n.unsigned_abs())
                .filter(|&target| target <= TRAPFRAME)
                .ok_or(ProcError::InvalidArgument)?;
            pagetable.uvmalloc(&self.kmem, sz, target, PteFlags::W)?
        } else if n < 0 {
            let target = sz
                .checked_sub(n.unsigned_abs())
                .ok_or(ProcError::InvalidArgument)?;
            pagetable.uvmdealloc(&self.kmem, sz, target)
        } else {
            sz
        };
        inner.sz = new_sz;
        Ok(())
    }

    /// Create a new process, copying the parent.
    /// Sets up child kernel stack to return as if from fork() system call.
    ///
    /// # Errors
    /// Fails if no slot or not enough memory is free; the partial child is
    /// released again.
    pub fn fork(&self) -> Result<Pid, ProcError> {
        let p = self.curproc();
        let (parent, sz, name, files) = {
            let inner = p.lock();
            (
                ProcRef {
                    slot: p.index,
                    pid: inner.pid,
                },
                inner.sz,
                inner.name,
                // increment reference counts on open file descriptors.
                inner.ofile.clone(),
            )
        };

        // Allocate process.
        let (np, mut child) = self.allocproc()?;

        // Copy user memory from parent to child.
        let copied = unsafe { p.data() }.pagetable().uvmcopy(
            &self.kmem,
            unsafe { np.data_mut() }.pagetable_mut(),
            sz,
        );
        if let Err(error) = copied {
            warn!("fork: pid {} could not copy {} bytes", parent.pid, sz);
            self.freeproc(np, &mut child);
            return Err(error.into());
        }
        child.sz = sz;

        // copy saved user registers.
        let trapframe = self.trapframe_of(np);
        trapframe.copy_from(&self.trapframe_of(p));
        // Cause fork to return 0 in the child.
        trapframe.write(Register::A0, 0);

        child.ofile = files;
        unsafe { np.data_mut() }.cwd = unsafe { p.data() }.cwd.clone();
        child.name = name;

        let pid = child.pid;
        drop(child);

        self.procs.parents.lock()[np.index] = Some(parent);

        np.lock().state = ProcState::Runnable;

        debug!("fork: pid {} created pid {}", parent.pid, pid);
        Ok(pid)
    }

    /// Pass p's abandoned children to init.
    /// Caller must hold the wait lock.
    fn reparent(&self, parent: ProcRef, parents: &mut [Option<ProcRef>]) {
        let Some(init) = self.initproc() else {
            panic!("reparent: no init process");
        };
        for link in parents.iter_mut().filter(|link| **link == Some(parent)) {
            *link = Some(init);
            self.wakeup(Channel::Proc(init.slot));
        }
    }

    /// Exit the current process. Does not return.
    /// An exited process remains in the zombie state
    /// until its parent calls wait().
    pub fn exit(&self, status: i32) -> ! {
        let p = self.curproc();
        let me = self.proc_ref(p);
        assert!(
            self.initproc().map(|init| init.slot) != Some(p.index),
            "init exiting"
        );

        // Close all open files.
        let files = core::mem::take(&mut p.lock().ofile);
        for file in files.into_iter().flatten() {
            file.close();
        }
        unsafe { p.data_mut() }.cwd = None;

        let mut parents = self.procs.parents.lock();

        // Give any children to init.
        self.reparent(me, &mut parents);

        // Parent might be sleeping in wait().
        if let Some(parent) = parents[p.index] {
            self.wakeup(Channel::Proc(parent.slot));
        }

        let mut inner = p.lock();
        inner.xstate = status;
        inner.state = ProcState::Zombie;

        drop(parents);
        debug!("exit: pid {} status {}", me.pid, status);

        // Jump into the scheduler, never to return.
        let _inner = self.sched(p, inner);
        panic!("zombie exit");
    }

    /// Wait for a child process to exit and return its pid.
    /// The exit status is copied to `addr` when one is given.
    ///
    /// # Errors
    /// Fails if this process has no children, was killed while waiting, or
    /// `addr` is not writable.
    pub fn wait(&self, addr: Option<usize>) -> Result<Pid, ProcError> {
        let p = self.curproc();
        let me = self.proc_ref(p);

        let mut parents = self.procs.parents.lock();
        loop {
            // Scan through table looking for exited children.
            let mut havekids = false;
            for child in self.procs.iter() {
                if parents[child.index] != Some(me) {
                    continue;
                }
                // make sure the child isn't still in exit() or switch().
                let mut inner = child.lock();
                havekids = true;
                if inner.state == ProcState::Zombie {
                    // Found one.
                    let pid = inner.pid;
                    if let Some(addr) = addr {
                        self.copy_to_user(addr, &inner.xstate.to_le_bytes())?;
                    }
                    self.freeproc(child, &mut inner);
                    parents[child.index] = None;
                    debug!("wait: pid {} reaped pid {}", me.pid, pid);
                    return Ok(pid);
                }
            }

            // No point waiting if we don't have any children.
            if !havekids {
                return Err(ProcError::NoChildren);
            }
            if self.killed(p) {
                return Err(ProcError::Killed);
            }

            // Wait for a child to exit.
            parents = self.sleep(Channel::Proc(p.index), parents);
        }
    }

    /// Kill the process with the given pid.
    /// The victim won't exit until it tries to return
    /// to user space (see usertrap()).
    ///
    /// # Errors
    /// Fails if no live process has `pid`.
    pub fn kill(&self, pid: Pid) -> Result<(), ProcError> {
        for p in self.procs.iter() {
            let mut inner = p.lock();
            if inner.state != ProcState::Unused && inner.pid == pid {
                inner.killed = true;
                if inner.state == ProcState::Sleeping {
                    // Wake process from sleep().
                    inner.state = ProcState::Runnable;
                }
                debug!("kill: pid {pid}");
                return Ok(());
            }
        }
        Err(ProcError::NotFound)
    }

    pub fn setkilled(&self, p: &Proc) {
        p.lock().killed = true;
    }

    #[must_use]
    pub fn killed(&self, p: &Proc) -> bool {
        p.lock().killed
    }

    /// Copy to the current process's memory
    ///
    /// # Errors
    /// Fails if the destination is not writable user memory.
    pub fn copy_to_user(&self, dst: usize, src: &[u8]) -> Result<(), VmError> {
        let p = self.curproc();
        unsafe { p.data() }
            .pagetable()
            .copyout(&self.kmem, dst, src)
    }

    /// Copy from the current process's memory
    ///
    /// # Errors
    /// Fails if the source is not user memory.
    pub fn copy_from_user(&self, dst: &mut [u8], src: usize) -> Result<(), VmError> {
        let p = self.curproc();
        unsafe { p.data() }
            .pagetable()
            .copyin(&self.kmem, dst, src)
    }

    /// Allocate a file descriptor for the given file.
    /// Takes over file reference from caller on success.
    ///
    /// # Errors
    /// Fails when the descriptor table is full, dropping `file`.
    pub fn fdalloc(&self, file: OpenFile) -> Result<usize, ProcError> {
        let p = self.curproc();
        let mut inner = p.lock();
        let (fd, slot) = inner
            .ofile
            .iter_mut()
            .enumerate()
            .find(|(_, slot)| slot.is_none())
            .ok_or(ProcError::NoFreeDescriptor)?;
        *slot = Some(file);
        Ok(fd)
    }

    /// A new reference to the file open at `fd` in the current process
    #[must_use]
    pub fn fd_file(&self, fd: i32) -> Option<OpenFile> {
        let fd = usize::try_from(fd).ok()?;
        self.curproc().lock().ofile.get(fd)?.clone()
    }

    /// # Errors
    /// Fails if `fd` is not open.
    pub fn fd_close(&self, fd: i32) -> Result<(), ProcError> {
        let fd = usize::try_from(fd).map_err(|_| ProcError::InvalidArgument)?;
        let file = self
            .curproc()
            .lock()
            .ofile
            .get_mut(fd)
            .and_then(Option::take)
            .ok_or(ProcError::InvalidArgument)?;
        file.close();
        Ok(())
    }

    /// Print a process listing to console. For debugging.
    /// Skips slots whose lock is busy, to avoid wedging a stuck machine
    /// further.
    pub fn procdump(&self) {
        println!();
        for p in self.procs.iter() {
            let Some(inner) = p.inner.try_lock() else {
                continue;
            };
            if inner.state == ProcState::Unused {
                continue;
            }
            println!("{} {} {}", inner.pid, inner.state.label(), inner.name());
        }
    }
}

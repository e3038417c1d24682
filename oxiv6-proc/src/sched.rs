use crate::kernel::Kernel;
use crate::proc::{Channel, Proc, ProcInner, ProcState};
use crate::spinlock::{SpinLock, SpinLockGuard};
use log::trace;

impl Kernel {
    /// Per-CPU process scheduler.
    /// Each CPU calls scheduler() after setting itself up.
    /// Scheduler never returns. It loops, doing:
    ///  - choose a process to run.
    ///  - switch to start running that process.
    ///  - eventually that process transfers control
    ///    via switch back to the scheduler.
    pub(crate) fn scheduler(&self) -> ! {
        let cpu = self.cpus.current();
        cpu.set_proc(None);

        loop {
            // The most recent process to run may have had interrupts
            // turned off; enable them to avoid a deadlock if all
            // processes are waiting.
            self.platform.enable_interrupts();

            let mut found = false;
            for p in self.procs.iter() {
                let mut inner = p.lock();
                if inner.state == ProcState::Runnable {
                    // Switch to chosen process. It is the process's job
                    // to release its lock and then reacquire it
                    // before jumping back to us.
                    inner.state = ProcState::Running;
                    inner.last_run_start = self.platform.uptime();
                    cpu.set_proc(Some(p.index()));
                    trace!("hart {} runs pid {}", self.cpus.current_id(), inner.pid);
                    unsafe { self.platform.switch(cpu.context(), p.context()) };

                    // Process is done running for now.
                    // It should have changed its state before coming back.
                    inner.context_switches += 1;
                    cpu.set_proc(None);
                    found = true;
                }
            }

            if !found {
                // nothing to run; stop running on this core until an interrupt.
                self.platform.wait_for_interrupt();
            }
        }
    }

    /// Switch to scheduler. Must hold only p->lock
    /// and have changed proc->state. Saves and restores
    /// intena because intena is a property of this
    /// kernel thread, not this CPU. It should
    /// be proc->intena and proc->noff, but that would
    /// break in the few places where a lock is held but
    /// there's no process.
    pub(crate) fn sched<'a>(
        &self,
        p: &'a Proc,
        mut inner: SpinLockGuard<'a, ProcInner>,
    ) -> SpinLockGuard<'a, ProcInner> {
        let cpu = self.cpus.current();

        assert!(p.inner.holding(), "sched p->lock");
        assert!(cpu.noff() == 1, "sched locks");
        assert!(inner.state != ProcState::Running, "sched running");
        assert!(
            !self.platform.interrupts_enabled(),
            "sched interruptible"
        );

        if matches!(inner.state, ProcState::Sleeping | ProcState::Zombie) {
            let now = self.platform.uptime();
            inner.run_time += now.saturating_sub(inner.last_run_start);
        }

        let intena = cpu.intena();
        unsafe { self.platform.switch(p.context(), cpu.context()) };
        // possibly resumed by a different hart
        self.cpus.current().set_intena(intena);
        inner
    }

    /// Give up the CPU for one scheduling round.
    pub fn yield_now(&self) {
        let p = self.curproc();
        let mut inner = p.lock();
        inner.state = ProcState::Runnable;
        let _inner = self.sched(p, inner);
    }

    /// Atomically release lock and sleep on chan.
    /// Reacquires lock when awakened.
    pub fn sleep<'a, T>(&self, chan: Channel, guard: SpinLockGuard<'a, T>) -> SpinLockGuard<'a, T> {
        let p = self.curproc();

        // Must acquire p->lock in order to
        // change p->state and then call sched.
        // Once we hold p->lock, we can be
        // guaranteed that we won't miss any wakeup
        // (wakeup locks p->lock),
        // so it's okay to release lk.
        let mut inner = p.lock();
        let lock = SpinLock::unlock(guard);

        // Go to sleep.
        inner.chan = Some(chan);
        inner.state = ProcState::Sleeping;
        trace!("pid {} sleeps on {:?}", inner.pid, chan);

        let mut inner = self.sched(p, inner);

        // Tidy up.
        inner.chan = None;

        // Reacquire original lock.
        drop(inner);
        lock.lock()
    }

    /// Wake up all processes sleeping on chan.
    /// Must be called without any p->lock.
    pub fn wakeup(&self, chan: Channel) {
        let me = self.myproc().map(Proc::index);
        for p in self.procs.iter() {
            if Some(p.index()) == me {
                continue;
            }
            let mut inner = p.lock();
            if inner.state == ProcState::Sleeping && inner.chan == Some(chan) {
                inner.state = ProcState::Runnable;
                trace!("wakeup {:?}: pid {}", chan, inner.pid);
            }
        }
    }
}

use crate::cpu::{CpuTable, InterruptsOff};
use alloc::sync::Arc;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicUsize, Ordering};
use spin::mutex::{Mutex, MutexGuard};

const NO_HART: usize = usize::MAX;

/// Mutual exclusion lock that also keeps interrupts off on the holding hart.
///
/// A `SpinLock` may be acquired in one kernel thread and released in
/// another: the scheduler acquires a process's lock and the process releases
/// it, and vice versa. What is checked is that the releasing *hart* holds it.
pub struct SpinLock<T> {
    name: &'static str,
    cpus: Arc<CpuTable>,
    holder: AtomicUsize,
    data: Mutex<T>,
}

pub struct SpinLockGuard<'a, T> {
    lock: &'a SpinLock<T>,
    // field order matters: the mutex is released before interrupts come back
    guard: MutexGuard<'a, T>,
    _interrupts: InterruptsOff<'a>,
}

impl<T> SpinLock<T> {
    pub fn new(value: T, name: &'static str, cpus: &Arc<CpuTable>) -> Self {
        Self {
            name,
            cpus: Arc::clone(cpus),
            holder: AtomicUsize::new(NO_HART),
            data: Mutex::new(value),
        }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Acquires the lock, spinning until it is free.
    ///
    /// # Panics
    /// Panics if this hart already holds the lock, which would deadlock.
    pub fn lock(&self) -> SpinLockGuard<'_, T> {
        // disable interrupts to avoid deadlock with an interrupt handler
        let interrupts = self.cpus.push_off();
        assert!(!self.holding(), "acquire {}", self.name);

        let guard = self.data.lock();
        self.holder
            .store(self.cpus.current_id(), Ordering::Relaxed);
        SpinLockGuard {
            lock: self,
            guard,
            _interrupts: interrupts,
        }
    }

    /// Acquires the lock only if nobody holds it.
    pub fn try_lock(&self) -> Option<SpinLockGuard<'_, T>> {
        let interrupts = self.cpus.push_off();
        let guard = self.data.try_lock()?;
        self.holder
            .store(self.cpus.current_id(), Ordering::Relaxed);
        Some(SpinLockGuard {
            lock: self,
            guard,
            _interrupts: interrupts,
        })
    }

    /// Check whether this hart is holding the lock.
    /// Interrupts must be off.
    #[must_use]
    pub fn holding(&self) -> bool {
        self.data.is_locked() && self.holder.load(Ordering::Relaxed) == self.cpus.current_id()
    }

    /// Releases a guard and hands back the lock so it can be re-acquired.
    pub fn unlock(guard: SpinLockGuard<'_, T>) -> &SpinLock<T> {
        let lock = guard.lock;
        drop(guard);
        lock
    }

    /// Releases a lock whose guard lives in another kernel thread.
    ///
    /// # Safety
    /// This hart must hold the lock on behalf of the caller, and the guard
    /// that acquired it must not be used to touch the data again before the
    /// lock is re-acquired.
    pub unsafe fn force_unlock(&self) {
        assert!(self.holding(), "release {}", self.name);
        self.holder.store(NO_HART, Ordering::Relaxed);
        unsafe { self.data.force_unlock() };
        self.cpus.pop_off();
    }
}

impl<T> Drop for SpinLockGuard<'_, T> {
    fn drop(&mut self) {
        assert!(self.lock.holding(), "release {}", self.lock.name);
        self.lock.holder.store(NO_HART, Ordering::Relaxed);
    }
}

impl<T> Deref for SpinLockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for SpinLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

impl<T> core::fmt::Debug for SpinLock<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SpinLock")
            .field("name", &self.name)
            .field("locked", &self.data.is_locked())
            .finish_non_exhaustive()
    }
}

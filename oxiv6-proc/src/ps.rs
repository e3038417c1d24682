//! Read-only process introspection behind the `ps` tool.
//!
//! Every call finds its target with the target's lock held and releases it
//! on every path out. Results are written into the caller's memory with the
//! same copy primitive the rest of the kernel uses.

use crate::kalloc::PAGE_SIZE;
use crate::kernel::Kernel;
use crate::param::{NAME_SIZE, SLEEP_WRITE_LIMIT, STATE_SIZE};
use crate::proc::{Proc, ProcInner, ProcState};
use crate::spinlock::SpinLockGuard;
use crate::syscall::Syscall;
use crate::trapframe::Register;
use crate::vm::VmError;
use num_enum::IntoPrimitive;

/// Introspection failures, with the codes user space sees
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive)]
pub enum PsError {
    /// Bad argument, unmapped target address, or the copy to the caller
    /// failed
    CopyFailed = -1,
    NotFound = -2,
    /// The pid names a slot that is currently free
    Unused = -3,
}

impl From<VmError> for PsError {
    fn from(_: VmError) -> Self {
        Self::CopyFailed
    }
}

/// Snapshot of one process, as `ps_info` lays it out for user space
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessInfo {
    pub state: [u8; STATE_SIZE],
    pub parent_pid: i32,
    pub mem_size: i32,
    pub file_count: i32,
    pub name: [u8; NAME_SIZE],
    pub proc_ticks: u32,
    pub run_time: u32,
    pub context_switches: u32,
}

impl ProcessInfo {
    /// Bytes in the packed user-space record
    pub const SIZE: usize = STATE_SIZE + 3 * 4 + NAME_SIZE + 3 * 4;

    #[must_use]
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        let mut at = 0;
        let mut put = |field: &[u8]| {
            bytes[at..at + field.len()].copy_from_slice(field);
            at += field.len();
        };
        put(&self.state);
        put(&self.parent_pid.to_le_bytes());
        put(&self.mem_size.to_le_bytes());
        put(&self.file_count.to_le_bytes());
        put(&self.name);
        put(&self.proc_ticks.to_le_bytes());
        put(&self.run_time.to_le_bytes());
        put(&self.context_switches.to_le_bytes());
        bytes
    }

    #[must_use]
    pub fn from_bytes(bytes: &[u8; Self::SIZE]) -> Self {
        let mut at = 0;
        Self {
            state: field(bytes, &mut at),
            parent_pid: i32::from_le_bytes(field(bytes, &mut at)),
            mem_size: i32::from_le_bytes(field(bytes, &mut at)),
            file_count: i32::from_le_bytes(field(bytes, &mut at)),
            name: field(bytes, &mut at),
            proc_ticks: u32::from_le_bytes(field(bytes, &mut at)),
            run_time: u32::from_le_bytes(field(bytes, &mut at)),
            context_switches: u32::from_le_bytes(field(bytes, &mut at)),
        }
    }

    #[must_use]
    pub fn state(&self) -> &str {
        c_str(&self.state)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        c_str(&self.name)
    }
}

/// The next `N` bytes at `at`
fn field<const N: usize>(bytes: &[u8], at: &mut usize) -> [u8; N] {
    let mut field = [0u8; N];
    field.copy_from_slice(&bytes[*at..*at + N]);
    *at += N;
    field
}

fn c_str(bytes: &[u8]) -> &str {
    let len = bytes.iter().position(|&byte| byte == 0).unwrap_or(bytes.len());
    core::str::from_utf8(&bytes[..len]).unwrap_or("")
}

#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
fn as_i32(value: usize) -> i32 {
    value as i32
}

#[allow(clippy::cast_possible_truncation)]
fn as_u32(value: u64) -> u32 {
    value as u32
}

impl Kernel {
    /// find process by its pid
    /// returns it with its lock held.
    ///
    /// Free slots all carry pid 0, so pid 0 is `Unused` whether or not the
    /// table has a free slot right now.
    fn locate(&self, pid: i32) -> Result<(&Proc, SpinLockGuard<'_, ProcInner>), PsError> {
        let pid = u32::try_from(pid).map_err(|_| PsError::NotFound)?;
        if pid == 0 {
            return Err(PsError::Unused);
        }
        for p in self.procs.iter() {
            let inner = p.lock();
            if inner.pid.get() == pid {
                if inner.state == ProcState::Unused {
                    return Err(PsError::Unused);
                }
                return Ok((p, inner));
            }
        }
        Err(PsError::NotFound)
    }

    /// Number of live processes
    #[must_use]
    pub fn ps_count(&self) -> usize {
        self.procs
            .iter()
            .filter(|p| p.lock().state != ProcState::Unused)
            .count()
    }

    /// Copies the pids of live processes to the int array at `addr`, the
    /// n-th one only while n is below `limit`. A limit of -1 only counts.
    /// Returns the number of live processes either way.
    ///
    /// # Errors
    /// Fails if the caller's array is not writable.
    pub fn ps_list(&self, limit: i32, addr: usize) -> Result<usize, PsError> {
        if limit == -1 {
            return Ok(self.ps_count());
        }

        let mut count = 0;
        for p in self.procs.iter() {
            let inner = p.lock();
            if inner.state != ProcState::Unused {
                count += 1;
                if usize::try_from(limit).is_ok_and(|limit| count < limit) {
                    let pid = inner.pid.get().to_le_bytes();
                    self.copy_to_user(addr + (count - 1) * pid.len(), &pid)?;
                }
            }
        }
        Ok(count)
    }

    /// Snapshot of the process with `pid`
    ///
    /// # Errors
    /// `NotFound` when no slot holds `pid`, `Unused` when it names a free
    /// slot.
    pub fn snapshot(&self, pid: i32) -> Result<ProcessInfo, PsError> {
        // wait_lock comes before any process lock
        let parents = self.procs.parents.lock();
        let (p, inner) = self.locate(pid)?;

        let parent_pid = parents[p.index()].map_or(0, |parent| parent.pid.get());
        drop(parents);

        let mut state = [0u8; STATE_SIZE];
        let label = inner.state.label().as_bytes();
        state[..label.len()].copy_from_slice(label);

        Ok(ProcessInfo {
            state,
            parent_pid: i32::try_from(parent_pid).unwrap_or(0),
            mem_size: as_i32(inner.sz),
            file_count: as_i32(inner.file_count()),
            name: inner.name,
            proc_ticks: as_u32(self.platform.uptime().saturating_sub(inner.init_ticks)),
            run_time: as_u32(inner.run_time),
            context_switches: as_u32(inner.context_switches),
        })
    }

    /// Writes the [`ProcessInfo`] of `pid` to `addr`
    ///
    /// # Errors
    /// As [`Kernel::snapshot`], plus `CopyFailed` if `addr` is not writable.
    pub fn ps_info(&self, pid: i32, addr: usize) -> Result<(), PsError> {
        let info = self.snapshot(pid)?;
        self.copy_to_user(addr, &info.to_bytes())?;
        Ok(())
    }

    /// Copies the 512 entries of one of `pid`'s page-table pages to `addr`:
    /// the root for level 2, otherwise the table reached by following `va`
    /// down from the root.
    ///
    /// # Errors
    /// `CopyFailed` for an unknown or free pid, a level above 2, `va` past
    /// the top of the address space, or an invalid entry on the way down.
    pub fn ps_pagetable(&self, pid: i32, level: usize, addr: usize, va: usize) -> Result<(), PsError> {
        let (p, inner) = self.locate(pid).map_err(|_| PsError::CopyFailed)?;

        let table = unsafe { p.data() }
            .pagetable()
            .table_at(&self.kmem, level, va)?;

        let mut bytes = [0u8; PAGE_SIZE];
        for (chunk, entry) in bytes.chunks_exact_mut(8).zip(table) {
            chunk.copy_from_slice(&u64::from(entry).to_le_bytes());
        }
        self.copy_to_user(addr, &bytes)?;
        drop(inner);
        Ok(())
    }

    /// Copies `size` bytes of `pid`'s memory at `va` to `addr`
    ///
    /// # Errors
    /// `CopyFailed` for an unknown or free pid, a negative size, any part of
    /// the range not mapped for the target's user mode, or an unwritable
    /// destination.
    pub fn ps_copy(&self, pid: i32, va: usize, size: i32, addr: usize) -> Result<(), PsError> {
        let size = usize::try_from(size).map_err(|_| PsError::CopyFailed)?;
        let (p, inner) = self.locate(pid).map_err(|_| PsError::CopyFailed)?;
        let pagetable = unsafe { p.data() }.pagetable();

        let mut chunk = [0u8; PAGE_SIZE];
        let mut done = 0;
        while done < size {
            let n = core::cmp::min(PAGE_SIZE - (va + done) % PAGE_SIZE, size - done);
            pagetable.copyin(&self.kmem, &mut chunk[..n], va + done)?;
            self.copy_to_user(addr + done, &chunk[..n])?;
            done += n;
        }
        drop(inner);
        Ok(())
    }

    /// Reports which system call `pid` is blocked in: 0 if it isn't
    /// sleeping, else the call number. For `write` the descriptor, the
    /// length (capped at [`SLEEP_WRITE_LIMIT`]) and the bytes being written
    /// are copied to `addr` as `[fd:i32][len:i32][data]`.
    ///
    /// # Errors
    /// `NotFound` and `Unused` as for [`Kernel::snapshot`]; `CopyFailed` for
    /// a bad descriptor, an unreadable buffer, or an unwritable destination.
    pub fn ps_sleep_write(&self, pid: i32, addr: usize) -> Result<usize, PsError> {
        // held throughout, so the target stays asleep until we are done
        let (p, inner) = self.locate(pid)?;
        if inner.state != ProcState::Sleeping {
            return Ok(0);
        }

        let trapframe = self.trapframe_of(p);
        let number = trapframe.read(Register::A7);
        if Syscall::decode(number) == Some(Syscall::Write) {
            // file descriptor
            #[allow(clippy::cast_possible_truncation)]
            let fd = trapframe.read(Register::A0) as i32;
            self.copy_to_user(addr, &fd.to_le_bytes())?;

            let open = usize::try_from(fd)
                .ok()
                .and_then(|fd| inner.ofile.get(fd))
                .is_some_and(Option::is_some);
            if !open {
                return Err(PsError::CopyFailed);
            }

            // buffer size
            #[allow(clippy::cast_possible_truncation)]
            let requested = trapframe.read(Register::A2) as i32;
            let len = usize::try_from(requested)
                .unwrap_or(0)
                .min(SLEEP_WRITE_LIMIT);
            self.copy_to_user(addr + 4, &as_i32(len).to_le_bytes())?;

            // the buffer itself, from the sleeper's memory
            let mut data = [0u8; SLEEP_WRITE_LIMIT];
            unsafe { p.data() }.pagetable().copyin(
                &self.kmem,
                &mut data[..len],
                trapframe.read(Register::A1),
            )?;
            self.copy_to_user(addr + 8, &data[..len])?;
        }

        drop(inner);
        Ok(number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_are_distinct() {
        assert_eq!(i32::from(PsError::CopyFailed), -1);
        assert_eq!(i32::from(PsError::NotFound), -2);
        assert_eq!(i32::from(PsError::Unused), -3);
    }

    #[test]
    fn info_layout_is_packed_in_field_order() {
        let mut name = [0u8; NAME_SIZE];
        name[..4].copy_from_slice(b"init");
        let info = ProcessInfo {
            state: *b"sleep \0",
            parent_pid: 1,
            mem_size: 4096,
            file_count: 3,
            name,
            proc_ticks: 10,
            run_time: 2,
            context_switches: 7,
        };
        let bytes = info.to_bytes();
        assert_eq!(bytes.len(), 47);
        assert_eq!(&bytes[..7], b"sleep \0");
        assert_eq!(&bytes[7..11], &1i32.to_le_bytes());
        assert_eq!(&bytes[15..19], &3i32.to_le_bytes());
        assert_eq!(&bytes[19..23], b"init");
        assert_eq!(&bytes[43..47], &7u32.to_le_bytes());

        let back = ProcessInfo::from_bytes(&bytes);
        assert_eq!(back, info);
        assert_eq!(back.state(), "sleep ");
        assert_eq!(back.name(), "init");
    }
}

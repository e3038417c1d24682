/// Most harts the kernel will bring up
pub const MAX_HART_COUNT: usize = 8;
/// Upper bound on process table slots
pub const MAX_NPROC: usize = 64;
/// Open files per process
pub const NOFILE: usize = 16;
/// Bytes in a process name, including the terminating NUL
pub const NAME_SIZE: usize = 16;
/// Bytes in a `ps_info` state label, including the terminating NUL
pub const STATE_SIZE: usize = 7;
/// Largest write buffer `ps_sleep_write` will copy out
pub const SLEEP_WRITE_LIMIT: usize = 1024;
/// Bytes of kernel stack reserved per hart for the scheduler loop
pub const STACK_SIZE: usize = 8192;
/// Base of the per-hart scheduler stacks
pub const STACK_0: usize = 0x8001_0000;

/// Top of the scheduler stack for `hartid`
#[inline]
#[must_use]
pub const fn scheduler_stack_top(hartid: usize) -> usize {
    STACK_0 + STACK_SIZE * (hartid + 1)
}

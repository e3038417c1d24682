use super::{ps_info, run, spec, spinner};
use crate::hosted::{HostFs, HostedMachine};
use crate::kalloc::PAGE_SIZE;
use crate::kernel::Kernel;
use crate::proc::{Pid, ProcError, ProcState};
use crate::syscall::Syscall;
use proptest::prelude::*;
use std::collections::HashSet;

#[test]
fn wait_returns_the_child_pid_and_status() {
    let (_booted, (child, reaped)) = run(spec(2), |user| {
        let child = user.fork(|user| user.exit(42)).unwrap();
        (child, user.wait())
    });
    assert_eq!(reaped, Some((child, 42)));
}

#[test]
fn negative_exit_status_survives_the_round_trip() {
    let (_booted, reaped) = run(spec(1), |user| {
        let child = user.fork(|user| user.exit(-7)).unwrap();
        (child, user.wait())
    });
    let (child, reaped) = reaped;
    assert_eq!(reaped, Some((child, -7)));
}

#[test]
fn wait_without_children_fails() {
    let (_booted, (wrapped, raw)) = run(spec(1), |user| {
        (user.wait(), user.syscall(Syscall::Wait, &[0]))
    });
    assert_eq!(wrapped, None);
    assert_eq!(raw, -1);
}

#[test]
fn every_child_is_reaped_once() {
    let (_booted, (mut children, mut reaped, extra)) = run(spec(3), |user| {
        let children: Vec<Pid> = (0..5)
            .map(|status| user.fork(move |user| user.exit(status)).unwrap())
            .collect();
        let reaped: Vec<(Pid, i32)> = (0..5).filter_map(|_| user.wait()).collect();
        (children, reaped, user.wait())
    });
    assert_eq!(extra, None);
    children.sort();
    reaped.sort();
    assert_eq!(reaped.iter().map(|&(pid, _)| pid).collect::<Vec<_>>(), children);
    for (index, &(_, status)) in reaped.iter().enumerate() {
        assert_eq!(status, i32::try_from(index).unwrap());
    }
}

#[test]
fn orphans_are_reparented_to_init() {
    let (_booted, (init, parent, reaped, grandchild)) = run(spec(2), |user| {
        let init = user.getpid();
        // the middle process exits with its own child's pid
        let middle = user
            .fork(|user| {
                let orphan = user.fork(spinner).unwrap();
                user.exit(i32::try_from(orphan.get()).unwrap());
            })
            .unwrap();
        let (pid, orphan) = user.wait().unwrap();
        assert_eq!(pid, middle);
        let orphan = Pid::new(u32::try_from(orphan).unwrap());

        let parent = ps_info(user, orphan).unwrap().parent_pid;
        assert!(user.kill(orphan));
        (init, parent, user.wait(), orphan)
    });
    assert_eq!(i32::try_from(init.get()).unwrap(), parent);
    assert_eq!(reaped, Some((grandchild, -1)));
}

#[test]
fn fork_exit_wait_gives_back_every_page() {
    let (_booted, (before, after)) = run(spec(2), |user| {
        let kmem = user.kernel().kmem();
        let before = kmem.free_pages();
        for status in 0..4 {
            let child = user
                .fork(move |user| {
                    user.sbrk(i32::try_from(2 * PAGE_SIZE).unwrap()).unwrap();
                    user.exit(status);
                })
                .unwrap();
            assert_eq!(user.wait(), Some((child, status)));
        }
        (before, kmem.free_pages())
    });
    assert_eq!(before, after);
}

#[test]
fn reaping_retires_the_exited_kernel_thread() {
    let (_booted, (before, after)) = run(spec(1), |user| {
        let machine = user.machine();
        let before = machine.kernel_threads();
        for status in 0..4 {
            let child = user.fork(move |user| user.exit(status)).unwrap();
            assert_eq!(user.wait(), Some((child, status)));
        }
        (before, machine.kernel_threads())
    });
    assert_eq!(before, after);
}

#[test]
fn sbrk_grows_and_shrinks_memory() {
    let (_booted, (first, second, shrunk, info)) = run(spec(1), |user| {
        let first = user.sbrk(i32::try_from(PAGE_SIZE).unwrap()).unwrap();
        user.store(first, b"fresh page").unwrap();
        let second = user.sbrk(-i32::try_from(PAGE_SIZE).unwrap()).unwrap();
        let shrunk = user.store(first, b"gone").is_err();
        (first, second, shrunk, ps_info(user, user.getpid()).unwrap())
    });
    assert_eq!(first, PAGE_SIZE);
    assert_eq!(second, 2 * PAGE_SIZE);
    assert!(shrunk);
    assert_eq!(info.mem_size, i32::try_from(PAGE_SIZE).unwrap());
}

#[test]
fn file_system_starts_once_in_the_first_process() {
    let (booted, forked) = run(spec(2), |user| {
        for _ in 0..3 {
            let child = user.fork(|user| user.exit(0)).unwrap();
            assert_eq!(user.wait(), Some((child, 0)));
        }
        true
    });
    assert!(forked);
    assert_eq!(booted.fs.init_count(), 1);
    assert_eq!(booted.kernel.initproc().map(|init| init.pid), Some(Pid::new(1)));
}

#[test]
fn fork_fails_cleanly_when_the_table_is_full() {
    let (booted, (children, failed, free_before, free_after)) = run(spec(2), |user| {
        let kmem = user.kernel().kmem();
        let free_before = kmem.free_pages();
        let children: Vec<Pid> = (0..7).map(|_| user.fork(spinner).unwrap()).collect();
        let failed = user.fork(spinner).is_none();
        for &child in &children {
            user.kill(child);
        }
        for _ in &children {
            user.wait().unwrap();
        }
        (children, failed, free_before, kmem.free_pages())
    });
    assert_eq!(children.len(), booted.kernel.spec().process_slots - 1);
    assert!(failed);
    assert_eq!(free_before, free_after);
}

#[test]
fn killing_an_unknown_pid_fails() {
    let (_booted, killed) = run(spec(1), |user| user.kill(Pid::new(4242)));
    assert!(!killed);
}

/// A kernel that never boots, for driving the slot allocator directly
/// from the test thread
fn idle_kernel(slots: usize) -> (std::sync::Arc<HostedMachine>, std::sync::Arc<Kernel>) {
    let machine = HostedMachine::new(1);
    machine.adopt_current_thread(0);
    let kernel = Kernel::new(
        crate::config::MachineSpec {
            cpu_count: 1,
            process_slots: slots,
            physical_pages: 256,
        },
        machine.clone(),
        HostFs::new(),
    )
    .unwrap();
    (machine, kernel)
}

#[test]
fn allocproc_reports_a_full_table() {
    let (_machine, kernel) = idle_kernel(2);
    let first = kernel.allocproc().map(|(p, inner)| (p.index(), inner.pid)).unwrap();
    let second = kernel.allocproc().map(|(p, inner)| (p.index(), inner.pid)).unwrap();
    assert_eq!(first, (0, Pid::new(1)));
    assert_eq!(second, (1, Pid::new(2)));
    assert_eq!(kernel.allocproc().err(), Some(ProcError::NoFreeProc));
}

proptest! {
    #[test]
    fn live_slots_stay_bounded_with_unique_pids(ops in prop::collection::vec(any::<bool>(), 1..80)) {
        const SLOTS: usize = 6;
        let (_machine, kernel) = idle_kernel(SLOTS);
        let baseline = kernel.kmem().free_pages();
        let mut live: Vec<usize> = Vec::new();

        for allocate in ops {
            if allocate {
                match kernel.allocproc() {
                    Ok((p, _inner)) => live.push(p.index()),
                    Err(error) => {
                        prop_assert_eq!(error, ProcError::NoFreeProc);
                        prop_assert_eq!(live.len(), SLOTS);
                    }
                }
            } else if let Some(slot) = live.pop() {
                let p = &kernel.procs()[slot];
                let mut inner = p.lock();
                kernel.freeproc(p, &mut inner);
            }

            let mut pids = HashSet::new();
            let mut used = 0;
            for p in kernel.procs().iter() {
                let inner = p.lock();
                if inner.state != ProcState::Unused {
                    used += 1;
                    prop_assert!(pids.insert(inner.pid));
                }
            }
            prop_assert!(used <= SLOTS);
            prop_assert_eq!(used, live.len());
        }

        for slot in live.drain(..) {
            let p = &kernel.procs()[slot];
            let mut inner = p.lock();
            kernel.freeproc(p, &mut inner);
        }
        prop_assert_eq!(kernel.kmem().free_pages(), baseline);
    }
}

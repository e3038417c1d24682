use super::{
    open_gate, ps_info, run, spec, spinner, wait_until_sleeping, writer, DATA_BUF, INFO_BUF,
    LIST_BUF,
};
use crate::hosted::SCRATCH;
use crate::kalloc::PAGE_SIZE;
use crate::proc::{Pid, ProcState};
use crate::ps::PsError;
use crate::syscall::Syscall;
use crate::vm::{MAX_VA, PTE_COUNT, TRAPFRAME};

const PATTERN_LEN: usize = 512;

fn pattern() -> Vec<u8> {
    (0..PATTERN_LEN)
        .map(|i| u8::try_from(i * 7 % 251).unwrap())
        .collect()
}

fn code(error: PsError) -> i64 {
    i64::from(i32::from(error))
}

#[test]
fn ps_list_counts_everything_but_fills_below_the_limit() {
    let (_booted, (children, total, counted, listed)) = run(spec(2), |user| {
        let children: Vec<Pid> = (0..3).map(|_| user.fork(spinner).unwrap()).collect();

        user.store(LIST_BUF, &[0xff; 16]).unwrap();
        let total = user.syscall(Syscall::PsList, &[3, LIST_BUF]);
        let counted = user.kernel().ps_count();
        let mut listed = [0u8; 16];
        user.load(LIST_BUF, &mut listed).unwrap();

        for &child in &children {
            user.kill(child);
        }
        for _ in &children {
            user.wait().unwrap();
        }
        (children, total, counted, listed)
    });

    assert_eq!(total, 4);
    assert_eq!(counted, 4);
    let listed: Vec<i32> = listed
        .chunks_exact(4)
        .map(|chunk| i32::from_le_bytes(chunk.try_into().unwrap()))
        .collect();
    // init sits in slot 0, its first child in slot 1
    assert_eq!(listed[0], 1);
    assert_eq!(listed[1], i32::try_from(children[0].get()).unwrap());
    assert_eq!(&listed[2..], &[-1, -1]);
}

#[test]
fn ps_list_with_minus_one_only_counts() {
    let (_booted, (count, untouched)) = run(spec(1), |user| {
        user.store(LIST_BUF, &[0xab; 4]).unwrap();
        let count = user.syscall(Syscall::PsList, &[usize::MAX, LIST_BUF]);
        let mut untouched = [0u8; 4];
        user.load(LIST_BUF, &mut untouched).unwrap();
        (count, untouched)
    });
    assert_eq!(count, 1);
    assert_eq!(untouched, [0xab; 4]);
}

#[test]
fn ps_info_describes_a_live_process() {
    let (_booted, (init, child, info)) = run(spec(2), |user| {
        let (_gate, fd) = open_gate(user);
        let child = user.fork(writer(fd, b"x")).unwrap();
        wait_until_sleeping(user, child);
        let info = ps_info(user, child).unwrap();
        user.kill(child);
        user.wait().unwrap();
        (user.getpid(), child, info)
    });
    assert_eq!(info.state(), ProcState::Sleeping.label());
    assert_eq!(info.parent_pid, i32::try_from(init.get()).unwrap());
    assert_eq!(info.mem_size, i32::try_from(PAGE_SIZE).unwrap());
    assert_eq!(info.file_count, 1);
    assert_eq!(info.name(), "initcode");
    assert!(info.context_switches >= 1);
    assert_ne!(child, init);
}

#[test]
fn ps_info_tells_unused_apart_from_missing() {
    let (_booted, (unused, missing, init)) = run(spec(1), |user| {
        (
            ps_info(user, Pid::NONE).err(),
            ps_info(user, Pid::new(9999)).err(),
            ps_info(user, user.getpid()).unwrap(),
        )
    });
    assert_eq!(unused, Some(code(PsError::Unused)));
    assert_eq!(missing, Some(code(PsError::NotFound)));
    assert_eq!(init.state(), ProcState::Running.label());
    assert_eq!(init.parent_pid, 0);
}

#[test]
fn pid_zero_is_unused_even_with_a_full_table() {
    let (booted, (children, unused, sleep_write)) = run(spec(2), |user| {
        let children: Vec<Pid> = (0..7).map(|_| user.fork(spinner).unwrap()).collect();
        let unused = ps_info(user, Pid::NONE).err();
        let sleep_write = user.syscall(Syscall::PsSleepWrite, &[0, INFO_BUF]);

        for &child in &children {
            user.kill(child);
        }
        for _ in &children {
            user.wait().unwrap();
        }
        (children, unused, sleep_write)
    });
    assert_eq!(children.len(), booted.kernel.spec().process_slots - 1);
    assert_eq!(unused, Some(code(PsError::Unused)));
    assert_eq!(sleep_write, code(PsError::Unused));
}

#[test]
fn ps_info_to_a_bad_buffer_fails_generically() {
    let (_booted, ret) = run(spec(1), |user| {
        user.syscall(Syscall::PsInfo, &[1, MAX_VA])
    });
    assert_eq!(ret, code(PsError::CopyFailed));
}

fn entries(page: &[u8]) -> Vec<u64> {
    page.chunks_exact(8)
        .map(|chunk| u64::from_le_bytes(chunk.try_into().unwrap()))
        .collect()
}

fn valid_indices(entries: &[u64]) -> Vec<usize> {
    entries
        .iter()
        .enumerate()
        .filter(|(_, &entry)| entry & 1 != 0)
        .map(|(index, _)| index)
        .collect()
}

#[test]
fn page_table_dumps_of_a_fresh_process() {
    let (_booted, (low_leaf, high_leaf, root, too_deep, too_high)) = run(spec(2), |user| {
        let child = user.fork(spinner).unwrap();
        let buf = user.sbrk(i32::try_from(PAGE_SIZE).unwrap()).unwrap();
        let pid = child.get() as usize;

        let dump = |call: Syscall, va: usize| {
            assert_eq!(user.syscall(call, &[pid, buf, va]), 0);
            let mut page = vec![0u8; PAGE_SIZE];
            user.load(buf, &mut page).unwrap();
            entries(&page)
        };
        let low_leaf = dump(Syscall::PsPt0, 0);
        let high_leaf = dump(Syscall::PsPt0, TRAPFRAME);
        let root = dump(Syscall::PsPt2, 0);

        let too_deep = user.kernel().ps_pagetable(i32::try_from(child.get()).unwrap(), 3, buf, 0);
        let too_high = user.syscall(Syscall::PsPt0, &[pid, buf, MAX_VA]);

        user.kill(child);
        user.wait().unwrap();
        (low_leaf, high_leaf, root, too_deep, too_high)
    });

    assert_eq!(low_leaf.len(), PTE_COUNT);
    // one page of user memory, readable, writable and user-accessible
    assert_eq!(valid_indices(&low_leaf), vec![0]);
    assert_eq!(low_leaf[0] & 0b1_0110, 0b1_0110);
    // trapframe and trampoline
    assert_eq!(valid_indices(&high_leaf), vec![510, 511]);
    assert_eq!(high_leaf[510] & 0b1_0000, 0);
    assert_eq!(valid_indices(&root), vec![0, 255]);

    assert_eq!(too_deep, Err(PsError::CopyFailed));
    assert_eq!(too_high, code(PsError::CopyFailed));
}

#[test]
fn page_table_dump_of_a_free_pid_fails() {
    let (_booted, ret) = run(spec(1), |user| {
        let buf = user.sbrk(i32::try_from(PAGE_SIZE).unwrap()).unwrap();
        user.syscall(Syscall::PsPt1, &[0, buf, 0])
    });
    assert_eq!(ret, code(PsError::CopyFailed));
}

#[test]
fn ps_copy_reads_back_what_the_target_wrote() {
    let (_booted, (copied, expected, negative, unmapped)) = run(spec(2), |user| {
        let (_gate, fd) = open_gate(user);
        let child = user
            .fork(move |user| {
                user.sbrk(i32::try_from(PAGE_SIZE).unwrap()).unwrap();
                // straddles the first two pages
                user.store(SCRATCH, &pattern()).unwrap();
                user.store(DATA_BUF, b"!").unwrap();
                user.write(fd, DATA_BUF, 1);
            })
            .unwrap();
        wait_until_sleeping(user, child);

        let buf = user.sbrk(i32::try_from(PAGE_SIZE).unwrap()).unwrap();
        let pid = child.get() as usize;
        assert_eq!(
            user.syscall(Syscall::PsCopy, &[pid, SCRATCH, PATTERN_LEN, buf]),
            0
        );
        let mut copied = vec![0u8; PATTERN_LEN];
        user.load(buf, &mut copied).unwrap();

        let negative = user.syscall(Syscall::PsCopy, &[pid, SCRATCH, usize::MAX, buf]);
        let unmapped = user.syscall(Syscall::PsCopy, &[pid, 16 * PAGE_SIZE, 8, buf]);

        user.kill(child);
        user.wait().unwrap();
        (copied, pattern(), negative, unmapped)
    });
    assert_eq!(copied, expected);
    assert_eq!(negative, code(PsError::CopyFailed));
    assert_eq!(unmapped, code(PsError::CopyFailed));
}

#[test]
fn ps_sleep_write_shows_the_blocked_write() {
    const MESSAGE: &[u8] = b"blocked on gate!";

    let (_booted, (call, fd, report, not_asleep, unused, missing, reaped, child)) =
        run(spec(2), |user| {
            let (_gate, fd) = open_gate(user);
            let child = user.fork(writer(fd, MESSAGE)).unwrap();
            wait_until_sleeping(user, child);

            let pid = child.get() as usize;
            let call = user.syscall(Syscall::PsSleepWrite, &[pid, INFO_BUF]);
            let mut report = vec![0u8; 8 + MESSAGE.len()];
            user.load(INFO_BUF, &mut report).unwrap();

            let me = user.getpid().get() as usize;
            let not_asleep = user.syscall(Syscall::PsSleepWrite, &[me, INFO_BUF]);
            let unused = user.syscall(Syscall::PsSleepWrite, &[0, INFO_BUF]);
            let missing = user.syscall(Syscall::PsSleepWrite, &[9999, INFO_BUF]);

            user.read(fd, DATA_BUF, 0);
            let reaped = user.wait();
            (call, fd, report, not_asleep, unused, missing, reaped, child)
        });

    assert_eq!(call, i64::from(u32::from(Syscall::Write)));
    assert_eq!(&report[..4], &fd.to_le_bytes());
    assert_eq!(&report[4..8], &16i32.to_le_bytes());
    assert_eq!(&report[8..], MESSAGE);
    assert_eq!(not_asleep, 0);
    assert_eq!(unused, code(PsError::Unused));
    assert_eq!(missing, code(PsError::NotFound));
    assert_eq!(reaped, Some((child, 16)));
}

#[test]
fn ps_sleep_write_reports_other_calls_without_details() {
    let (_booted, (call, untouched)) = run(spec(2), |user| {
        let middle = user
            .fork(|user| {
                user.fork(spinner).unwrap();
                user.wait();
            })
            .unwrap();
        wait_until_sleeping(user, middle);

        user.store(INFO_BUF, &[0x5a; 8]).unwrap();
        let call = user.syscall(Syscall::PsSleepWrite, &[middle.get() as usize, INFO_BUF]);
        let mut untouched = [0u8; 8];
        user.load(INFO_BUF, &mut untouched).unwrap();
        (call, untouched)
    });
    assert_eq!(call, i64::from(u32::from(Syscall::Wait)));
    assert_eq!(untouched, [0x5a; 8]);
}

//! Process creation, exit and reaping

use std::sync::Arc;
use std::time::Duration;

use kernel::ipc::fd::Fid;
use kernel::process::{ProcInfo, NOPROC};
use kernel::task::host::{boot, boot_with, HostScheduler};
use kernel::{Kernel, KernelConfig, KernelError, ProcessId, ProcessState};

fn wait_until_zombie(k: &Kernel, pid: ProcessId) {
    while k.process_state(pid) != ProcessState::Zombie {
        std::thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn exec_without_task_takes_a_slot_and_runs_nothing() {
    let kernel = Kernel::new(Arc::new(HostScheduler::new()), KernelConfig::default()).unwrap();
    assert_eq!(kernel.exec(None, b""), Ok(ProcessId::IDLE));
    assert_eq!(kernel.exec(None, b"args"), Ok(ProcessId::INIT));
    assert_eq!(kernel.process_count(), 2);
    assert_eq!(kernel.process_state(ProcessId::INIT), ProcessState::Alive);
    assert_eq!(kernel.process_state(ProcessId::new(2)), ProcessState::Free);
}

fn returns_forty_two(_: &Kernel, _: &[u8]) -> i32 {
    42
}

#[test]
fn boot_returns_init_exit_status() {
    assert_eq!(boot(returns_forty_two, b""), 42);
}

fn echo_first_arg(k: &Kernel, args: &[u8]) -> i32 {
    assert_eq!(k.get_ppid(), Some(ProcessId::INIT));
    assert_eq!(k.sys_get_ppid(), 1);
    args[0] as i32
}

fn exec_and_wait(k: &Kernel, _: &[u8]) -> i32 {
    assert_eq!(k.get_pid(), Some(ProcessId::INIT));
    assert_eq!(k.get_ppid(), None);
    assert_eq!(k.sys_get_ppid(), NOPROC);

    let child = k.exec(Some(echo_first_arg), &[9, 1, 1]).unwrap();
    assert_eq!(child, ProcessId::new(2));
    assert_eq!(k.wait_child(Some(child)), Ok((child, 9)));
    assert_eq!(k.process_state(child), ProcessState::Free);

    let mut status = 0;
    let again = k.sys_exec(Some(echo_first_arg), &[17]);
    assert_eq!(k.sys_wait_child(again, Some(&mut status)), again);
    assert_eq!(status, 17);
    0
}

#[test]
fn parent_reaps_specific_child_with_status() {
    assert_eq!(boot(exec_and_wait, b""), 0);
}

fn childless_wait(k: &Kernel, _: &[u8]) -> i32 {
    assert_eq!(k.wait_child(None), Err(KernelError::NotFound));
    assert_eq!(k.sys_wait_child(NOPROC, None), NOPROC);
    0
}

#[test]
fn wait_any_without_children_fails_at_once() {
    assert_eq!(boot(childless_wait, b""), 0);
}

fn exit_with_arg(_: &Kernel, args: &[u8]) -> i32 {
    args[0] as i32
}

fn reap_in_exit_order(k: &Kernel, _: &[u8]) -> i32 {
    let first = k.exec(Some(exit_with_arg), &[1]).unwrap();
    wait_until_zombie(k, first);
    let second = k.exec(Some(exit_with_arg), &[2]).unwrap();
    wait_until_zombie(k, second);
    let third = k.exec(Some(exit_with_arg), &[3]).unwrap();
    wait_until_zombie(k, third);

    assert_eq!(k.wait_child(None), Ok((first, 1)));
    assert_eq!(k.wait_child(None), Ok((second, 2)));
    assert_eq!(k.wait_child(None), Ok((third, 3)));
    assert_eq!(k.wait_child(None), Err(KernelError::NotFound));
    0
}

#[test]
fn wait_any_reaps_zombies_in_exit_order() {
    assert_eq!(boot(reap_in_exit_order, b""), 0);
}

fn bad_wait_targets(k: &Kernel, _: &[u8]) -> i32 {
    assert_eq!(k.wait_child(Some(ProcessId::IDLE)), Err(KernelError::InvalidHandle));
    assert_eq!(k.wait_child(Some(ProcessId::new(1 << 20))), Err(KernelError::InvalidHandle));
    // Not a child: init's own slot and a free slot
    assert_eq!(k.wait_child(Some(ProcessId::INIT)), Err(KernelError::NotFound));
    assert_eq!(k.wait_child(Some(ProcessId::new(5))), Err(KernelError::NotFound));
    assert_eq!(k.sys_wait_child(-7, None), NOPROC);
    0
}

#[test]
fn wait_rejects_non_children_and_bad_pids() {
    assert_eq!(boot(bad_wait_targets, b""), 0);
}

fn grandchild(k: &Kernel, args: &[u8]) -> i32 {
    let mut byte = [0u8; 1];
    assert_eq!(k.read(args[0] as Fid, &mut byte), Ok(1));
    k.sys_get_ppid()
}

fn middle(k: &Kernel, args: &[u8]) -> i32 {
    let gc = k.exec(Some(grandchild), args).unwrap();
    gc.as_pid()
}

fn orphans_move_to_init(k: &Kernel, _: &[u8]) -> i32 {
    let p = k.pipe().unwrap();
    let mid = k.exec(Some(middle), &[p.read as u8]).unwrap();
    let (_, gc) = k.wait_child(Some(mid)).unwrap();
    let gc = ProcessId::from_pid(gc).unwrap();

    k.write(p.write, b"!").unwrap();
    assert_eq!(k.wait_child(Some(gc)), Ok((gc, 1)));
    0
}

#[test]
fn orphaned_grandchild_is_reaped_by_init() {
    assert_eq!(boot(orphans_move_to_init, b""), 0);
}

fn sleepy_child(_: &Kernel, _: &[u8]) -> i32 {
    std::thread::sleep(Duration::from_millis(30));
    5
}

fn init_leaves_children_behind(k: &Kernel, _: &[u8]) -> i32 {
    for _ in 0..3 {
        k.exec(Some(sleepy_child), b"").unwrap();
    }
    // Returning runs exit, which reaps all three before init ends.
    11
}

#[test]
fn init_reaps_remaining_children_before_halting() {
    assert_eq!(boot(init_leaves_children_behind, b""), 11);
}

fn write_greeting(k: &Kernel, args: &[u8]) -> i32 {
    k.write(args[0] as Fid, b"hi").unwrap() as i32
}

fn children_share_streams(k: &Kernel, _: &[u8]) -> i32 {
    let p = k.pipe().unwrap();
    let child = k.exec(Some(write_greeting), &[p.write as u8]).unwrap();
    assert_eq!(k.wait_child(Some(child)), Ok((child, 2)));

    let mut buf = [0u8; 4];
    assert_eq!(k.read(p.read, &mut buf), Ok(2));
    assert_eq!(&buf[..2], b"hi");
    0
}

#[test]
fn children_inherit_open_descriptors() {
    assert_eq!(boot(children_share_streams, b""), 0);
}

fn blocked_on_pipe(k: &Kernel, args: &[u8]) -> i32 {
    let mut byte = [0u8; 1];
    k.read(args[0] as Fid, &mut byte).unwrap() as i32
}

fn info_lists_live_processes(k: &Kernel, _: &[u8]) -> i32 {
    let p = k.pipe().unwrap();
    let child = k.exec(Some(blocked_on_pipe), &[p.read as u8, b'a', b'b']).unwrap();

    let info = k.open_info().unwrap();
    let mut buf = [0u8; ProcInfo::RECORD_SIZE];
    assert_eq!(k.read(info, &mut buf), Ok(ProcInfo::RECORD_SIZE));
    let init = ProcInfo::from_bytes(&buf).unwrap();
    assert_eq!((init.pid, init.ppid, init.alive), (1, NOPROC, true));
    assert_eq!(init.thread_count, 1);
    assert_eq!(init.main_task, info_lists_live_processes as usize as u64);

    assert_eq!(k.read(info, &mut buf), Ok(ProcInfo::RECORD_SIZE));
    let rec = ProcInfo::from_bytes(&buf).unwrap();
    assert_eq!((rec.pid, rec.ppid, rec.alive), (child.as_pid(), 1, true));
    assert_eq!(rec.argl, 3);
    assert_eq!(&rec.arg_bytes()[1..], b"ab");
    assert_eq!(rec.main_task, blocked_on_pipe as usize as u64);

    assert_eq!(k.read(info, &mut buf), Ok(0));
    assert_eq!(k.read(info, &mut buf[..10]), Err(KernelError::InvalidArgument));
    assert!(k.write(info, b"x").is_err());
    k.close(info).unwrap();

    k.write(p.write, b"!").unwrap();
    assert_eq!(k.wait_child(Some(child)), Ok((child, 1)));
    0
}

#[test]
fn process_info_walks_the_table() {
    assert_eq!(boot(info_lists_live_processes, b""), 0);
}

fn fill_the_table(k: &Kernel, _: &[u8]) -> i32 {
    let a = k.exec(Some(sleepy_child), b"").unwrap();
    let b = k.exec(Some(sleepy_child), b"").unwrap();
    assert_eq!(k.exec(Some(sleepy_child), b""), Err(KernelError::ResourceExhausted));
    assert_eq!(k.sys_exec(Some(sleepy_child), b""), NOPROC);

    // Reaped slots come back most recent first.
    k.wait_child(Some(a)).unwrap();
    k.wait_child(Some(b)).unwrap();
    assert_eq!(k.exec(Some(exit_with_arg), &[0]), Ok(b));
    assert_eq!(k.exec(Some(exit_with_arg), &[0]), Ok(a));
    0
}

#[test]
fn exec_fails_when_the_table_is_full() {
    let config = KernelConfig::default().with_max_proc(4);
    assert_eq!(boot_with(config, fill_the_table, b""), 0);
}

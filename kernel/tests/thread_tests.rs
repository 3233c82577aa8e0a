//! Thread creation, join, detach and exit

use std::time::Duration;

use kernel::ipc::fd::Fid;
use kernel::task::host::boot;
use kernel::task::thread::NOTHREAD;
use kernel::{Kernel, KernelError};

fn double_arg(_: &Kernel, args: &[u8]) -> i32 {
    args[0] as i32 * 2
}

fn create_and_join(k: &Kernel, _: &[u8]) -> i32 {
    let a = k.create_thread(Some(double_arg), &[4]).unwrap();
    let b = k.create_thread(Some(double_arg), &[10]).unwrap();
    assert_ne!(a, b);
    assert_eq!(k.thread_join(b), Ok(20));
    assert_eq!(k.thread_join(a), Ok(8));
    // The last joiner reclaimed the record.
    assert_eq!(k.thread_join(a), Err(KernelError::NotFound));

    let mut exitval = 0;
    let c = k.sys_create_thread(Some(double_arg), &[21]);
    assert_ne!(c, NOTHREAD);
    assert_eq!(k.sys_thread_join(c, Some(&mut exitval)), 0);
    assert_eq!(exitval, 42);
    0
}

#[test]
fn join_collects_exit_values() {
    assert_eq!(boot(create_and_join, b""), 0);
}

fn bad_joins(k: &Kernel, _: &[u8]) -> i32 {
    let me = k.thread_self().unwrap();
    assert_eq!(k.sys_thread_self(), me.as_u64());
    assert_eq!(k.thread_join(me), Err(KernelError::InvalidState));
    assert_eq!(k.sys_thread_join(NOTHREAD, None), -1);
    assert_eq!(k.sys_thread_join(9_999, None), -1);
    assert_eq!(k.sys_thread_detach(9_999), -1);
    assert_eq!(k.create_thread(None, b""), Err(KernelError::InvalidArgument));
    assert_eq!(k.sys_create_thread(None, b""), NOTHREAD);
    0
}

#[test]
fn join_rejects_self_and_unknown_threads() {
    assert_eq!(boot(bad_joins, b""), 0);
}

fn wait_for_byte(k: &Kernel, args: &[u8]) -> i32 {
    let mut byte = [0u8; 1];
    k.read(args[0] as Fid, &mut byte).unwrap() as i32
}

fn detached_cannot_be_joined(k: &Kernel, _: &[u8]) -> i32 {
    let p = k.pipe().unwrap();
    let t = k.create_thread(Some(wait_for_byte), &[p.read as u8]).unwrap();
    assert_eq!(k.thread_detach(t), Ok(()));
    assert_eq!(k.thread_join(t), Err(KernelError::InvalidState));
    // Detaching twice is allowed while the thread still runs.
    assert_eq!(k.sys_thread_detach(t.as_u64()), 0);
    k.write(p.write, b"!").unwrap();
    0
}

#[test]
fn join_of_detached_thread_fails() {
    assert_eq!(boot(detached_cannot_be_joined, b""), 0);
}

fn join_expecting_failure(k: &Kernel, args: &[u8]) -> i32 {
    let target = u64::from_le_bytes(args[..8].try_into().unwrap());
    match k.sys_thread_join(target, None) {
        -1 => 1,
        _ => 0,
    }
}

fn detach_wakes_joiner(k: &Kernel, _: &[u8]) -> i32 {
    let p = k.pipe().unwrap();
    let sleeper = k.create_thread(Some(wait_for_byte), &[p.read as u8]).unwrap();
    let joiner = k
        .create_thread(Some(join_expecting_failure), &sleeper.as_u64().to_le_bytes())
        .unwrap();

    std::thread::sleep(Duration::from_millis(30));
    k.thread_detach(sleeper).unwrap();
    assert_eq!(k.thread_join(joiner), Ok(1));

    k.write(p.write, b"!").unwrap();
    0
}

#[test]
fn detaching_wakes_a_sleeping_joiner_to_failure() {
    assert_eq!(boot(detach_wakes_joiner, b""), 0);
}

fn late_writer(k: &Kernel, args: &[u8]) -> i32 {
    std::thread::sleep(Duration::from_millis(30));
    k.write(args[0] as Fid, b"x").unwrap() as i32
}

fn main_returns_early(k: &Kernel, args: &[u8]) -> i32 {
    k.create_thread(Some(late_writer), args).unwrap();
    5
}

fn process_outlives_its_main_thread(k: &Kernel, _: &[u8]) -> i32 {
    let p = k.pipe().unwrap();
    let child = k.exec(Some(main_returns_early), &[p.write as u8]).unwrap();
    assert_eq!(k.wait_child(Some(child)), Ok((child, 5)));

    // The helper wrote before the process became a zombie.
    let mut buf = [0u8; 2];
    assert_eq!(k.read(p.read, &mut buf), Ok(1));
    assert_eq!(buf[0], b'x');
    0
}

#[test]
fn last_thread_decides_when_a_process_ends() {
    assert_eq!(boot(process_outlives_its_main_thread, b""), 0);
}

fn exit_through_thread_exit(k: &Kernel, _: &[u8]) -> i32 {
    k.thread_exit(3)
}

fn explicit_thread_exit(k: &Kernel, _: &[u8]) -> i32 {
    let t = k.create_thread(Some(exit_through_thread_exit), b"").unwrap();
    assert_eq!(k.thread_join(t), Ok(3));
    k.exit(0)
}

#[test]
fn thread_exit_and_exit_never_return() {
    assert_eq!(boot(explicit_thread_exit, b""), 0);
}

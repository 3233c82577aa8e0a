//! Listener/peer sockets on a booted kernel

use std::time::{Duration, Instant};

use kernel::ipc::fd::{Fid, NOFILE};
use kernel::socket::ShutdownMode;
use kernel::task::host::boot;
use kernel::{Kernel, KernelError};

const PORT: u16 = 100;

fn read_exact(k: &Kernel, fid: Fid, buf: &mut [u8]) {
    let mut got = 0;
    while got < buf.len() {
        let n = k.read(fid, &mut buf[got..]).unwrap();
        assert_ne!(n, 0, "stream ended early");
        got += n;
    }
}

fn listener(k: &Kernel, port: u16) -> Fid {
    let fid = k.socket(port).unwrap();
    k.listen(fid).unwrap();
    fid
}

fn one_listener_per_port(k: &Kernel, _: &[u8]) -> i32 {
    let first = listener(k, PORT);
    let second = k.socket(PORT).unwrap();
    assert_eq!(k.listen(second), Err(KernelError::InvalidState));
    assert_eq!(k.sys_listen(second), -1);

    k.close(first).unwrap();
    assert_eq!(k.sys_listen(second), 0);
    // Listening twice on the same socket is refused too.
    assert_eq!(k.listen(second), Err(KernelError::InvalidState));
    0
}

#[test]
fn a_port_has_at_most_one_listener() {
    assert_eq!(boot(one_listener_per_port, b""), 0);
}

fn connect_without_listener(k: &Kernel, _: &[u8]) -> i32 {
    let client = k.socket(0).unwrap();
    assert_eq!(k.connect(client, PORT, 0), Err(KernelError::NotFound));
    assert_eq!(k.sys_connect(client, PORT as i32, 50), -1);
    assert_eq!(k.sys_connect(client, -3, 50), -1);
    assert_eq!(k.connect(client, 5_000, 0), Err(KernelError::InvalidArgument));
    0
}

#[test]
fn connect_needs_a_listener() {
    assert_eq!(boot(connect_without_listener, b""), 0);
}

fn pong_server(k: &Kernel, args: &[u8]) -> i32 {
    let peer = k.accept(args[0] as Fid).unwrap();
    let mut msg = [0u8; 4];
    read_exact(k, peer, &mut msg);
    assert_eq!(&msg, b"ping");
    k.write(peer, b"pong").unwrap();
    k.close(peer).unwrap();
    0
}

fn ping_pong(k: &Kernel, _: &[u8]) -> i32 {
    let lfid = listener(k, PORT);
    let server = k.create_thread(Some(pong_server), &[lfid as u8]).unwrap();

    let client = k.socket(0).unwrap();
    assert_eq!(k.sys_connect(client, PORT as i32, 1_000), 0);
    assert_eq!(k.write(client, b"ping"), Ok(4));

    let mut reply = [0u8; 4];
    read_exact(k, client, &mut reply);
    assert_eq!(&reply, b"pong");
    // The server closed its end.
    assert_eq!(k.read(client, &mut reply), Ok(0));

    assert_eq!(k.thread_join(server), Ok(0));
    // A connected socket cannot connect again or listen.
    assert_eq!(k.connect(client, PORT, 0), Err(KernelError::InvalidState));
    assert_eq!(k.listen(client), Err(KernelError::InvalidState));
    0
}

#[test]
fn ping_pong_through_a_listener() {
    assert_eq!(boot(ping_pong, b""), 0);
}

fn echo_after_eof(k: &Kernel, args: &[u8]) -> i32 {
    let peer = k.accept(args[0] as Fid).unwrap();
    let mut buf = [0u8; 8];
    assert_eq!(k.read(peer, &mut buf), Ok(0));
    k.write(peer, b"bye").unwrap();
    0
}

fn half_close(k: &Kernel, _: &[u8]) -> i32 {
    let lfid = listener(k, PORT);
    let server = k.create_thread(Some(echo_after_eof), &[lfid as u8]).unwrap();

    let client = k.socket(0).unwrap();
    k.connect(client, PORT, 1_000).unwrap();
    assert_eq!(k.shutdown(client, ShutdownMode::Write), Ok(()));
    assert_eq!(k.sys_write(client, b"late"), -1);

    let mut buf = [0u8; 3];
    read_exact(k, client, &mut buf);
    assert_eq!(&buf, b"bye");

    assert_eq!(k.sys_shutdown(client, ShutdownMode::Read as i32), 0);
    assert_eq!(k.sys_read(client, &mut buf), -1);
    assert_eq!(k.sys_shutdown(client, 7), -1);
    assert_eq!(k.thread_join(server), Ok(0));
    0
}

#[test]
fn shutdown_write_leaves_the_other_direction_open() {
    assert_eq!(boot(half_close, b""), 0);
}

fn accept_once(k: &Kernel, args: &[u8]) -> i32 {
    match k.accept(args[0] as Fid) {
        Ok(peer) => peer,
        Err(_) => -1,
    }
}

fn timeout_then_success(k: &Kernel, _: &[u8]) -> i32 {
    let lfid = listener(k, PORT);
    let client = k.socket(0).unwrap();
    assert_eq!(k.connect(client, PORT, 20), Err(KernelError::Timeout));

    // The withdrawn request must not be admitted by a later accept.
    let server = k.create_thread(Some(accept_once), &[lfid as u8]).unwrap();
    std::thread::sleep(Duration::from_millis(20));
    assert_eq!(k.connect(client, PORT, 2_000), Ok(()));
    let peer = k.thread_join(server).unwrap();
    assert_ne!(peer, NOFILE);

    assert_eq!(k.write(peer, b"hi"), Ok(2));
    let mut buf = [0u8; 2];
    read_exact(k, client, &mut buf);
    assert_eq!(&buf, b"hi");
    0
}

#[test]
fn connect_times_out_without_accept() {
    assert_eq!(boot(timeout_then_success, b""), 0);
}

fn misuse(k: &Kernel, _: &[u8]) -> i32 {
    let unbound = k.socket(PORT).unwrap();
    assert_eq!(k.accept(unbound), Err(KernelError::InvalidState));
    assert_eq!(k.sys_accept(unbound), NOFILE);

    let wildcard = k.socket(0).unwrap();
    assert_eq!(k.listen(wildcard), Err(KernelError::InvalidArgument));

    assert_eq!(k.sys_socket(5_000), NOFILE);
    assert_eq!(k.sys_socket(-1), NOFILE);

    let p = k.pipe().unwrap();
    assert_eq!(k.listen(p.read), Err(KernelError::InvalidHandle));
    assert_eq!(k.sys_accept(NOFILE), NOFILE);

    let lfid = listener(k, PORT);
    let mut buf = [0u8; 1];
    assert_eq!(k.read(lfid, &mut buf), Err(KernelError::InvalidState));
    assert_eq!(k.shutdown(lfid, ShutdownMode::Both), Err(KernelError::InvalidState));
    0
}

#[test]
fn socket_calls_reject_the_wrong_kind_of_descriptor() {
    assert_eq!(boot(misuse, b""), 0);
}

fn closing_listener_unblocks_accept(k: &Kernel, _: &[u8]) -> i32 {
    let lfid = listener(k, PORT);
    let server = k.create_thread(Some(accept_once), &[lfid as u8]).unwrap();
    std::thread::sleep(Duration::from_millis(30));

    k.close(lfid).unwrap();
    assert_eq!(k.thread_join(server), Ok(-1));

    // The port is free again.
    let again = k.socket(PORT).unwrap();
    assert_eq!(k.sys_listen(again), 0);
    0
}

#[test]
fn closing_a_listener_fails_pending_accepts() {
    assert_eq!(boot(closing_listener_unblocks_accept, b""), 0);
}

fn connect_and_time(k: &Kernel, _: &[u8]) -> i32 {
    let client = k.socket(0).unwrap();
    let started = Instant::now();
    let result = k.connect(client, PORT, 3_000);
    assert!(started.elapsed() < Duration::from_millis(2_000), "connect outlived its listener");
    match result {
        Err(KernelError::NotFound) => 1,
        other => panic!("connect returned {:?}", other),
    }
}

fn closing_listener_unblocks_connect(k: &Kernel, _: &[u8]) -> i32 {
    let lfid = listener(k, PORT);
    let client = k.create_thread(Some(connect_and_time), b"").unwrap();
    std::thread::sleep(Duration::from_millis(50));

    k.close(lfid).unwrap();
    assert_eq!(k.thread_join(client), Ok(1));
    0
}

#[test]
fn closing_a_listener_fails_pending_connects() {
    assert_eq!(boot(closing_listener_unblocks_connect, b""), 0);
}

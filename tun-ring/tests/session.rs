//! Session lifecycle, registration, and wait behaviour.

use std::io;
use std::thread;
use std::time::{Duration, Instant};
use tun_ring::ring::MIN_RING_CAPACITY;
use tun_ring::{Session, WaitOutcome};
use tuntest::DriverPeer;

fn start() -> (DriverPeer, Session) {
    let _ = env_logger::try_init();
    let peer = DriverPeer::new();
    let session = Session::start(&peer, MIN_RING_CAPACITY).expect("session start");
    (peer, session)
}

#[test]
fn start_registers_rings() {
    let peer = DriverPeer::new();
    assert!(!peer.is_registered());
    let session = Session::start(&peer, MIN_RING_CAPACITY).unwrap();
    assert!(peer.is_registered());
    assert_eq!(session.capacity(), MIN_RING_CAPACITY);
    session.end();
}

#[test]
fn start_rejects_invalid_capacity() {
    let peer = DriverPeer::new();
    for capacity in [0, 12, MIN_RING_CAPACITY - 4, MIN_RING_CAPACITY * 3] {
        let err = Session::start(&peer, capacity)
            .err()
            .expect("capacity must be rejected");
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }
    assert!(!peer.is_registered());
}

#[test]
fn failed_registration_returns_no_session() {
    let (peer, _session) = start();
    // the peer refuses a second registration; start must surface it
    let err = Session::start(&peer, MIN_RING_CAPACITY)
        .err()
        .expect("second registration must fail");
    assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
}

#[test]
fn wait_times_out_when_idle() {
    let (_peer, session) = start();
    let begin = Instant::now();
    let outcome = session.wait(Some(Duration::from_millis(50))).unwrap();
    assert_eq!(outcome, WaitOutcome::TimedOut);
    assert!(begin.elapsed() >= Duration::from_millis(40));
}

#[test]
fn wait_returns_immediately_when_data_is_buffered() {
    let (peer, session) = start();
    peer.inject(b"already here").unwrap();
    let outcome = session.wait(Some(Duration::ZERO)).unwrap();
    assert_eq!(outcome, WaitOutcome::Signaled);
}

#[test]
fn wait_wakes_on_new_data() {
    let (peer, session) = start();
    thread::scope(|s| {
        let waiter = s.spawn(|| session.wait(Some(Duration::from_secs(5))).unwrap());
        thread::sleep(Duration::from_millis(50));
        peer.inject(b"wake up").unwrap();
        assert_eq!(waiter.join().unwrap(), WaitOutcome::Signaled);
    });
    assert_eq!(session.receive().unwrap().data(), b"wake up");
}

#[test]
fn wait_wakes_on_shutdown() {
    let (peer, session) = start();
    thread::scope(|s| {
        let waiter = s.spawn(|| session.wait(Some(Duration::from_secs(5))).unwrap());
        thread::sleep(Duration::from_millis(50));
        peer.shutdown().unwrap();
        assert_eq!(waiter.join().unwrap(), WaitOutcome::Signaled);
    });
    assert!(session.receive().is_err());
}

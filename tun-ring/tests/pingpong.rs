//! Data-path tests driving both ends of a ring pair in-process: the session
//! on one side, the driver peer on the other.

use tun_ring::ring::{MIN_RING_CAPACITY, RING_ALIGNMENT};
use tun_ring::{RingError, Session};
use tuntest::DriverPeer;

fn start() -> (DriverPeer, Session) {
    let _ = env_logger::try_init();
    let peer = DriverPeer::new();
    let session = Session::start(&peer, MIN_RING_CAPACITY).expect("session start");
    (peer, session)
}

fn pattern(len: usize, seed: u32) -> Vec<u8> {
    (0..len as u32)
        .map(|i| (i.wrapping_mul(31).wrapping_add(seed) % 251) as u8)
        .collect()
}

#[test]
fn receive_on_empty_ring_returns_no_data() {
    let (_peer, session) = start();
    assert!(!session.is_data_available());
    assert!(matches!(session.receive(), Err(RingError::NoData)));
}

#[test]
fn inbound_round_trip() {
    let (peer, session) = start();
    let payload = pattern(1400, 7);
    peer.inject(&payload).unwrap();
    assert!(session.is_data_available());

    let pkt = session.receive().unwrap();
    assert_eq!(pkt.data(), &payload[..]);
    let footprint = (4 + pkt.len() as u32 + 3) & !3;
    session.release_received(pkt);
    assert_eq!(peer.inbound_head().unwrap(), footprint);
}

#[test]
fn outbound_round_trip() {
    let (peer, session) = start();
    let payload = pattern(900, 3);

    let mut pkt = session.allocate_send(payload.len() as u32).unwrap();
    pkt.data_mut().copy_from_slice(&payload);
    session.commit_send(pkt);

    assert_eq!(peer.extract().unwrap().unwrap(), payload);
    assert_eq!(peer.extract().unwrap(), None);
}

#[test]
fn zero_length_packets_are_valid() {
    let (peer, session) = start();
    peer.inject(b"").unwrap();
    let pkt = session.receive().unwrap();
    assert!(pkt.is_empty());
    session.release_received(pkt);

    let pkt = session.allocate_send(0).unwrap();
    assert!(pkt.is_empty());
    session.commit_send(pkt);
    assert_eq!(peer.extract().unwrap().unwrap(), Vec::<u8>::new());
}

#[test]
fn exact_fill_then_buffer_full() {
    let (peer, session) = start();
    // header-only packets fill the usable space exactly: one alignment
    // quantum stays reserved so a full ring is distinguishable from empty
    let expected = (MIN_RING_CAPACITY - RING_ALIGNMENT) / 4;
    for _ in 0..expected {
        let pkt = session.allocate_send(0).expect("fits");
        session.commit_send(pkt);
    }
    assert!(matches!(
        session.allocate_send(0),
        Err(RingError::BufferFull)
    ));

    // draining a single packet frees exactly one more slot
    assert_eq!(peer.extract().unwrap(), Some(Vec::new()));
    let pkt = session.allocate_send(0).expect("space released");
    session.commit_send(pkt);
    assert!(matches!(
        session.allocate_send(0),
        Err(RingError::BufferFull)
    ));
}

#[test]
fn backpressure_with_sized_packets() {
    let (_peer, session) = start();
    let footprint = 128u32;
    let payload = vec![0u8; footprint as usize - 4];
    let mut sent = 0u32;
    loop {
        match session.allocate_send(payload.len() as u32) {
            Ok(mut pkt) => {
                pkt.data_mut().copy_from_slice(&payload);
                session.commit_send(pkt);
                sent += 1;
            }
            Err(RingError::BufferFull) => break,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(sent, (MIN_RING_CAPACITY - RING_ALIGNMENT) / footprint);
}

#[test]
fn inbound_wraparound_round_trip() {
    let (peer, session) = start();
    // march the cursors close to the end of the ring
    let laps = (MIN_RING_CAPACITY - RING_ALIGNMENT) / 128;
    for i in 0..laps {
        peer.inject(&pattern(124, i)).unwrap();
        let pkt = session.receive().unwrap();
        assert_eq!(pkt.len(), 124);
        session.release_received(pkt);
    }
    // this packet's footprint straddles the wrap point
    let payload = pattern(200, 0xdead);
    peer.inject(&payload).unwrap();
    let pkt = session.receive().unwrap();
    assert_eq!(pkt.data(), &payload[..]);
    session.release_received(pkt);
    assert_eq!(peer.inbound_head().unwrap(), (laps * 128 + 204) % MIN_RING_CAPACITY);

    // and traffic keeps flowing after the wrap
    let payload = pattern(64, 0xbeef);
    peer.inject(&payload).unwrap();
    let pkt = session.receive().unwrap();
    assert_eq!(pkt.data(), &payload[..]);
    session.release_received(pkt);
}

#[test]
fn outbound_wraparound_round_trip() {
    let (peer, session) = start();
    let laps = (MIN_RING_CAPACITY - RING_ALIGNMENT) / 128;
    for i in 0..laps {
        let payload = pattern(124, i);
        let mut pkt = session.allocate_send(124).unwrap();
        pkt.data_mut().copy_from_slice(&payload);
        session.commit_send(pkt);
        assert_eq!(peer.extract().unwrap().unwrap(), payload);
    }
    let payload = pattern(200, 0xfeed);
    let mut pkt = session.allocate_send(200).unwrap();
    pkt.data_mut().copy_from_slice(&payload);
    session.commit_send(pkt);
    assert_eq!(peer.extract().unwrap().unwrap(), payload);
    assert_eq!(peer.outbound_tail().unwrap(), (laps * 128 + 204) % MIN_RING_CAPACITY);
}

#[test]
fn oversized_allocation_is_rejected() {
    let (_peer, session) = start();
    assert!(matches!(
        session.allocate_send(0x1_0000),
        Err(RingError::InvalidLength)
    ));
}

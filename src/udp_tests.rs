//! Tests for the UDP endpoint table, demux, ephemeral ports, and the
//! blocking receive path.

use std::time::Duration;

use crate::checksum;
use crate::testdev::{self, TestDriver};
use crate::types::{Endpoint, EtherType, IpProtocol, Ipv4Addr, NetError, Port};
use crate::udp;

const PEER_IP: Ipv4Addr = Ipv4Addr([192, 0, 2, 1]);
const OUR_IP: Ipv4Addr = Ipv4Addr([192, 0, 2, 2]);

fn setup() -> (crate::stack::NetStack, testdev::TxLog, std::sync::Arc<crate::netdev::NetDevice>) {
    testdev::build_stack(TestDriver::plain(), OUR_IP, Ipv4Addr([255, 255, 255, 0]))
}

/// Craft a UDP datagram (header + payload) with a valid checksum.
fn build_udp(src: Endpoint, dst: Endpoint, payload: &[u8]) -> Vec<u8> {
    let total = (udp::HEADER_LEN + payload.len()) as u16;
    let mut datagram = Vec::new();
    datagram.extend_from_slice(&src.port.to_be_bytes());
    datagram.extend_from_slice(&dst.port.to_be_bytes());
    datagram.extend_from_slice(&total.to_be_bytes());
    datagram.extend_from_slice(&[0, 0]);
    datagram.extend_from_slice(payload);
    let pseudo = checksum::pseudo_sum(src.addr, dst.addr, IpProtocol::Udp, total);
    let sum = checksum::checksum(&datagram, pseudo);
    datagram[6..8].copy_from_slice(&sum.to_be_bytes());
    datagram
}

fn inject(stack: &crate::stack::NetStack, src: Endpoint, dst: Endpoint, payload: &[u8]) {
    let datagram = build_udp(src, dst, payload);
    let iface = stack
        .device(crate::types::DevIndex(0))
        .unwrap()
        .interface()
        .unwrap();
    udp::input(stack.inner(), &datagram, src.addr, dst.addr, &iface);
}

#[test]
fn bind_rejects_duplicate_pair() {
    let (stack, _log, _dev) = setup();
    let a = stack.udp_open().unwrap();
    let b = stack.udp_open().unwrap();
    let local = Endpoint::new(OUR_IP, Port(7));
    stack.udp_bind(a, local).unwrap();
    assert_eq!(stack.udp_bind(b, local), Err(NetError::AddressInUse));
    // A different port is fine.
    stack.udp_bind(b, Endpoint::new(OUR_IP, Port(8))).unwrap();
}

#[test]
fn pool_exhaustion_reports_no_buffer_space() {
    let (stack, _log, _dev) = setup();
    let mut ids = Vec::new();
    loop {
        match stack.udp_open() {
            Ok(id) => ids.push(id),
            Err(err) => {
                assert_eq!(err, NetError::NoBufferSpace);
                break;
            }
        }
    }
    assert_eq!(ids.len(), 16);
    // Closing one slot makes it allocatable again.
    stack.udp_close(ids[3]).unwrap();
    assert_eq!(stack.udp_open().unwrap(), ids[3]);
}

#[test]
fn delivery_to_exact_and_wildcard_binding() {
    let (stack, _log, _dev) = setup();
    let sock = stack.udp_open().unwrap();
    stack
        .udp_bind(sock, Endpoint::new(Ipv4Addr::UNSPECIFIED, Port(7)))
        .unwrap();

    let peer = Endpoint::new(PEER_IP, Port(12345));
    inject(&stack, peer, Endpoint::new(OUR_IP, Port(7)), b"hello");

    let mut buf = [0u8; 64];
    let (n, from) = stack.udp_recvfrom(sock, &mut buf).unwrap();
    assert_eq!(&buf[..n], b"hello");
    assert_eq!(from, peer, "sender endpoint travels with the datagram");
}

#[test]
fn datagram_for_unbound_port_is_dropped() {
    let (stack, _log, _dev) = setup();
    let sock = stack.udp_open().unwrap();
    stack.udp_bind(sock, Endpoint::new(OUR_IP, Port(7))).unwrap();

    let peer = Endpoint::new(PEER_IP, Port(12345));
    // Wrong port first; the matching one second.  FIFO order would
    // surface the wrong payload if the first were accepted.
    inject(&stack, peer, Endpoint::new(OUR_IP, Port(9)), b"wrong");
    inject(&stack, peer, Endpoint::new(OUR_IP, Port(7)), b"right");

    let mut buf = [0u8; 64];
    let (n, _) = stack.udp_recvfrom(sock, &mut buf).unwrap();
    assert_eq!(&buf[..n], b"right");
}

#[test]
fn corrupt_checksum_and_bad_length_are_dropped() {
    let (stack, _log, _dev) = setup();
    let sock = stack.udp_open().unwrap();
    stack.udp_bind(sock, Endpoint::new(OUR_IP, Port(7))).unwrap();
    let peer = Endpoint::new(PEER_IP, Port(12345));
    let dst = Endpoint::new(OUR_IP, Port(7));
    let iface = stack
        .device(crate::types::DevIndex(0))
        .unwrap()
        .interface()
        .unwrap();

    let mut corrupt = build_udp(peer, dst, b"bad-checksum");
    corrupt[6] ^= 0xff;
    udp::input(stack.inner(), &corrupt, peer.addr, dst.addr, &iface);

    let mut short = build_udp(peer, dst, b"bad-length");
    short[4..6].copy_from_slice(&3u16.to_be_bytes());
    udp::input(stack.inner(), &short, peer.addr, dst.addr, &iface);

    inject(&stack, peer, dst, b"good");
    let mut buf = [0u8; 64];
    let (n, _) = stack.udp_recvfrom(sock, &mut buf).unwrap();
    assert_eq!(&buf[..n], b"good");
}

#[test]
fn recvfrom_truncates_to_caller_buffer() {
    let (stack, _log, _dev) = setup();
    let sock = stack.udp_open().unwrap();
    stack.udp_bind(sock, Endpoint::new(OUR_IP, Port(7))).unwrap();
    let peer = Endpoint::new(PEER_IP, Port(12345));
    inject(&stack, peer, Endpoint::new(OUR_IP, Port(7)), b"0123456789");

    let mut buf = [0u8; 4];
    let (n, _) = stack.udp_recvfrom(sock, &mut buf).unwrap();
    assert_eq!(n, 4);
    assert_eq!(&buf, b"0123");
}

#[test]
fn sendto_picks_smallest_free_ephemeral_port_and_reuses_it() {
    let (stack, log, _dev) = setup();

    // Occupy the first ephemeral port with an explicit binding.
    let squatter = stack.udp_open().unwrap();
    stack
        .udp_bind(squatter, Endpoint::new(OUR_IP, Port(49152)))
        .unwrap();

    let sock = stack.udp_open().unwrap();
    let remote = Endpoint::new(PEER_IP, Port(9));
    stack.udp_sendto(sock, b"ping", remote).unwrap();
    stack.udp_sendto(sock, b"ping", remote).unwrap();

    let frames = testdev::frames_of(&log, EtherType::Ipv4.as_u16());
    assert_eq!(frames.len(), 2);
    for (datagram, _) in &frames {
        let udp = &datagram[crate::ipv4::HEADER_LEN..];
        let sport = u16::from_be_bytes([udp[0], udp[1]]);
        assert_eq!(sport, 49153, "first unused ephemeral port, then reuse");
        assert_eq!(&datagram[12..16], &OUR_IP.0, "source from the route");
    }
}

#[test]
fn sendto_emits_valid_pseudo_header_checksum() {
    let (stack, log, _dev) = setup();
    let sock = stack.udp_open().unwrap();
    stack.udp_sendto(sock, b"check me", Endpoint::new(PEER_IP, Port(9))).unwrap();

    let frames = testdev::frames_of(&log, EtherType::Ipv4.as_u16());
    let datagram = &frames[0].0;
    let udp = &datagram[crate::ipv4::HEADER_LEN..];
    let pseudo = checksum::pseudo_sum(OUR_IP, PEER_IP, IpProtocol::Udp, udp.len() as u16);
    assert_eq!(checksum::checksum(udp, pseudo), 0);
}

#[test]
fn close_aborts_blocked_receiver_and_frees_slot() {
    let (stack, _log, _dev) = setup();
    let sock = stack.udp_open().unwrap();
    stack.udp_bind(sock, Endpoint::new(OUR_IP, Port(7))).unwrap();

    let blocked = {
        let stack = stack.clone();
        std::thread::spawn(move || {
            let mut buf = [0u8; 16];
            stack.udp_recvfrom(sock, &mut buf)
        })
    };
    std::thread::sleep(Duration::from_millis(100));
    stack.udp_close(sock).unwrap();
    assert_eq!(blocked.join().unwrap(), Err(NetError::ConnectionAborted));

    // The last waiter released the slot; it can be reallocated.
    assert_eq!(stack.udp_open().unwrap(), sock);
}

#[test]
fn cancellation_event_interrupts_blocked_receiver() {
    let (stack, _log, _dev) = setup();
    let sock = stack.udp_open().unwrap();
    stack.udp_bind(sock, Endpoint::new(OUR_IP, Port(7))).unwrap();

    let blocked = {
        let stack = stack.clone();
        std::thread::spawn(move || {
            let mut buf = [0u8; 16];
            stack.udp_recvfrom(sock, &mut buf)
        })
    };
    std::thread::sleep(Duration::from_millis(100));
    stack.inner().udp.interrupt_all();
    assert_eq!(blocked.join().unwrap(), Err(NetError::Interrupted));
}

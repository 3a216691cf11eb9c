//! Tests for IPv4 ingress validation and egress construction.

use crate::checksum;
use crate::icmp;
use crate::ipv4::{self, HEADER_LEN};
use crate::testdev::{self, TestDriver};
use crate::types::{EtherType, IpProtocol, Ipv4Addr, MacAddr, NetError};

const PEER_MAC: MacAddr = MacAddr([0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]);
const PEER_IP: Ipv4Addr = Ipv4Addr([192, 0, 2, 1]);
const OUR_IP: Ipv4Addr = Ipv4Addr([192, 0, 2, 2]);

fn setup() -> (crate::stack::NetStack, testdev::TxLog, std::sync::Arc<crate::netdev::NetDevice>) {
    let (stack, log, dev) =
        testdev::build_stack(TestDriver::new(), OUR_IP, Ipv4Addr([255, 255, 255, 0]));
    // Static neighbor entry so unicast egress does not stall in ARP.
    stack.arp_static(PEER_IP, PEER_MAC);
    (stack, log, dev)
}

/// An ICMP echo request is the canonical "elicits a response" payload.
fn echo_payload() -> Vec<u8> {
    let mut message = vec![icmp::TYPE_ECHO, 0, 0, 0, 0x12, 0x34, 0x00, 0x01];
    message.extend_from_slice(b"abcd");
    let sum = checksum::checksum(&message, 0);
    message[2..4].copy_from_slice(&sum.to_be_bytes());
    message
}

fn ip_replies(log: &testdev::TxLog) -> Vec<(Vec<u8>, Vec<u8>)> {
    testdev::frames_of(log, EtherType::Ipv4.as_u16())
}

#[test]
fn valid_datagram_is_dispatched() {
    let (stack, log, dev) = setup();
    let datagram = testdev::build_ipv4(IpProtocol::Icmp, PEER_IP, OUR_IP, &echo_payload());
    ipv4::input(stack.inner(), &datagram, &dev);
    assert_eq!(ip_replies(&log).len(), 1, "echo reply proves dispatch");
}

#[test]
fn fragments_are_dropped_without_response() {
    let (stack, log, dev) = setup();

    // MF set.
    let mut datagram = testdev::build_ipv4(IpProtocol::Icmp, PEER_IP, OUR_IP, &echo_payload());
    datagram[6] = 0x20;
    datagram[10..12].copy_from_slice(&[0, 0]);
    let sum = checksum::checksum(&datagram[..HEADER_LEN], 0);
    datagram[10..12].copy_from_slice(&sum.to_be_bytes());
    ipv4::input(stack.inner(), &datagram, &dev);
    assert!(ip_replies(&log).is_empty(), "MF=1 must be dropped");

    // Nonzero fragment offset.
    let mut datagram = testdev::build_ipv4(IpProtocol::Icmp, PEER_IP, OUR_IP, &echo_payload());
    datagram[7] = 0x08;
    datagram[10..12].copy_from_slice(&[0, 0]);
    let sum = checksum::checksum(&datagram[..HEADER_LEN], 0);
    datagram[10..12].copy_from_slice(&sum.to_be_bytes());
    ipv4::input(stack.inner(), &datagram, &dev);
    assert!(ip_replies(&log).is_empty(), "offset != 0 must be dropped");
}

#[test]
fn validation_ladder_drops_bad_headers() {
    let (stack, log, dev) = setup();
    let good = testdev::build_ipv4(IpProtocol::Icmp, PEER_IP, OUR_IP, &echo_payload());

    // Truncated.
    ipv4::input(stack.inner(), &good[..HEADER_LEN - 1], &dev);

    // Wrong version.
    let mut bad = good.clone();
    bad[0] = 0x65;
    ipv4::input(stack.inner(), &bad, &dev);

    // Corrupted checksum.
    let mut bad = good.clone();
    bad[10] ^= 0xff;
    ipv4::input(stack.inner(), &bad, &dev);

    // Total length beyond the received bytes.
    let mut bad = good.clone();
    bad[2..4].copy_from_slice(&((good.len() + 8) as u16).to_be_bytes());
    bad[10..12].copy_from_slice(&[0, 0]);
    let sum = checksum::checksum(&bad[..HEADER_LEN], 0);
    bad[10..12].copy_from_slice(&sum.to_be_bytes());
    ipv4::input(stack.inner(), &bad, &dev);

    assert!(ip_replies(&log).is_empty());
}

#[test]
fn foreign_destination_is_dropped_silently() {
    let (stack, log, dev) = setup();
    let datagram = testdev::build_ipv4(
        IpProtocol::Icmp,
        PEER_IP,
        Ipv4Addr([192, 0, 2, 77]),
        &echo_payload(),
    );
    ipv4::input(stack.inner(), &datagram, &dev);
    assert!(ip_replies(&log).is_empty());
}

#[test]
fn subnet_broadcast_is_accepted() {
    let (stack, log, dev) = setup();
    let datagram = testdev::build_ipv4(
        IpProtocol::Icmp,
        PEER_IP,
        Ipv4Addr([192, 0, 2, 255]),
        &echo_payload(),
    );
    ipv4::input(stack.inner(), &datagram, &dev);
    // The echo reply goes back out (sourced from our unicast).
    assert_eq!(ip_replies(&log).len(), 1);
}

#[test]
fn output_header_layout() {
    let (stack, log, _dev) = setup();
    ipv4::output(stack.inner(), IpProtocol::Udp, b"payload", Ipv4Addr::UNSPECIFIED, PEER_IP)
        .unwrap();
    let frames = ip_replies(&log);
    assert_eq!(frames.len(), 1);
    let (datagram, dst_hw) = &frames[0];
    assert_eq!(dst_hw.as_slice(), &PEER_MAC.0, "resolved via the static entry");
    assert_eq!(datagram[0], 0x45, "version 4, 20-byte header");
    assert_eq!(datagram[1], 0, "TOS 0");
    assert_eq!(
        u16::from_be_bytes([datagram[2], datagram[3]]) as usize,
        HEADER_LEN + 7
    );
    assert_eq!(u16::from_be_bytes([datagram[6], datagram[7]]), 0, "no fragmentation");
    assert_eq!(datagram[8], 255, "TTL 255");
    assert_eq!(datagram[9], IpProtocol::Udp.as_u8());
    assert_eq!(&datagram[12..16], &OUR_IP.0, "source filled from the interface");
    assert_eq!(&datagram[16..20], &PEER_IP.0);
    assert_eq!(
        checksum::checksum(&datagram[..HEADER_LEN], 0),
        0,
        "header checksum folds to zero"
    );
}

#[test]
fn output_ids_increase_from_initial_value() {
    let (stack, log, _dev) = setup();
    ipv4::output(stack.inner(), IpProtocol::Udp, b"a", Ipv4Addr::UNSPECIFIED, PEER_IP).unwrap();
    ipv4::output(stack.inner(), IpProtocol::Udp, b"b", Ipv4Addr::UNSPECIFIED, PEER_IP).unwrap();
    let frames = ip_replies(&log);
    let id0 = u16::from_be_bytes([frames[0].0[4], frames[0].0[5]]);
    let id1 = u16::from_be_bytes([frames[1].0[4], frames[1].0[5]]);
    assert_eq!(id0, 128, "counter starts at 128");
    assert_eq!(id1, 129);
}

#[test]
fn output_rejects_foreign_source() {
    let (stack, _log, _dev) = setup();
    let err = ipv4::output(
        stack.inner(),
        IpProtocol::Udp,
        b"x",
        Ipv4Addr([10, 9, 8, 7]),
        PEER_IP,
    )
    .unwrap_err();
    assert_eq!(err, NetError::AddressNotAvailable);
}

#[test]
fn output_without_route_is_unreachable() {
    let (stack, _log, _dev) = setup();
    let err = ipv4::output(
        stack.inner(),
        IpProtocol::Udp,
        b"x",
        Ipv4Addr::UNSPECIFIED,
        Ipv4Addr([8, 8, 8, 8]),
    )
    .unwrap_err();
    assert_eq!(err, NetError::NetworkUnreachable);
}

#[test]
fn output_rejects_oversized_datagrams() {
    let (stack, _log, _dev) = testdev::build_stack(
        TestDriver::plain().with_mtu(100),
        OUR_IP,
        Ipv4Addr([255, 255, 255, 0]),
    );
    let err = ipv4::output(
        stack.inner(),
        IpProtocol::Udp,
        &[0u8; 200],
        Ipv4Addr::UNSPECIFIED,
        PEER_IP,
    )
    .unwrap_err();
    assert_eq!(err, NetError::MessageTooLong);
}

#[test]
fn output_unresolved_nexthop_reports_incomplete() {
    let (stack, log, _dev) = testdev::build_stack(
        TestDriver::new(),
        OUR_IP,
        Ipv4Addr([255, 255, 255, 0]),
    );
    let err = ipv4::output(
        stack.inner(),
        IpProtocol::Udp,
        b"x",
        Ipv4Addr::UNSPECIFIED,
        PEER_IP,
    )
    .unwrap_err();
    assert_eq!(err, NetError::Incomplete);
    // The resolver broadcast a request instead of the datagram.
    assert_eq!(
        testdev::frames_of(&log, EtherType::Arp.as_u16()).len(),
        1
    );
    assert!(ip_replies(&log).is_empty());
}

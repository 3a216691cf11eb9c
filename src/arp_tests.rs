//! Tests for ARP input processing, the resolver, and cache aging.

use std::time::{Duration, Instant};

use crate::arp::{self, Resolution};
use crate::testdev::{self, TestDriver};
use crate::types::{EtherType, Ipv4Addr, MacAddr, NetError};

const PEER_MAC: MacAddr = MacAddr([0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]);
const PEER_IP: Ipv4Addr = Ipv4Addr([192, 0, 2, 1]);
const OUR_IP: Ipv4Addr = Ipv4Addr([192, 0, 2, 2]);

fn setup() -> (crate::stack::NetStack, testdev::TxLog, std::sync::Arc<crate::netdev::NetDevice>) {
    testdev::build_stack(TestDriver::new(), OUR_IP, Ipv4Addr([255, 255, 255, 0]))
}

fn message(op: u16, sha: MacAddr, spa: Ipv4Addr, tha: MacAddr, tpa: Ipv4Addr) -> Vec<u8> {
    let mut msg = vec![0u8; arp::MESSAGE_LEN];
    msg[0..2].copy_from_slice(&arp::HTYPE_ETHERNET.to_be_bytes());
    msg[2..4].copy_from_slice(&arp::PTYPE_IPV4.to_be_bytes());
    msg[4] = arp::HLEN_ETHERNET;
    msg[5] = arp::PLEN_IPV4;
    msg[6..8].copy_from_slice(&op.to_be_bytes());
    msg[8..14].copy_from_slice(&sha.0);
    msg[14..18].copy_from_slice(&spa.0);
    msg[18..24].copy_from_slice(&tha.0);
    msg[24..28].copy_from_slice(&tpa.0);
    msg
}

#[test]
fn request_for_our_address_gets_a_reply_and_caches_sender() {
    let (stack, log, dev) = setup();
    let request = message(arp::OP_REQUEST, PEER_MAC, PEER_IP, MacAddr::ZERO, OUR_IP);
    arp::input(stack.inner(), &request, &dev);

    let frames = testdev::frames_of(&log, EtherType::Arp.as_u16());
    assert_eq!(frames.len(), 1, "exactly one reply");
    let (reply, dst) = &frames[0];
    assert_eq!(dst.as_slice(), &PEER_MAC.0, "reply is unicast to the sender");
    assert_eq!(u16::from_be_bytes([reply[6], reply[7]]), arp::OP_REPLY);
    assert_eq!(&reply[8..14], &dev.hwaddr.0, "sha is the device MAC");
    assert_eq!(&reply[14..18], &OUR_IP.0, "spa is our unicast");
    assert_eq!(&reply[18..24], &PEER_MAC.0, "tha echoes the requester");
    assert_eq!(&reply[24..28], &PEER_IP.0, "tpa echoes the requester");

    // The cache learned the sender: resolution completes immediately.
    let iface = dev.interface().unwrap();
    assert_eq!(
        arp::resolve(stack.inner(), &iface, PEER_IP).unwrap(),
        Resolution::Found(PEER_MAC)
    );
}

#[test]
fn request_for_other_address_is_ignored() {
    let (stack, log, dev) = setup();
    let request = message(
        arp::OP_REQUEST,
        PEER_MAC,
        PEER_IP,
        MacAddr::ZERO,
        Ipv4Addr([192, 0, 2, 99]),
    );
    arp::input(stack.inner(), &request, &dev);
    assert!(testdev::frames_of(&log, EtherType::Arp.as_u16()).is_empty());
}

#[test]
fn malformed_messages_are_dropped() {
    let (stack, log, dev) = setup();
    // Too short.
    arp::input(stack.inner(), &[0u8; 10], &dev);
    // Wrong hardware type.
    let mut bad = message(arp::OP_REQUEST, PEER_MAC, PEER_IP, MacAddr::ZERO, OUR_IP);
    bad[0..2].copy_from_slice(&7u16.to_be_bytes());
    arp::input(stack.inner(), &bad, &dev);
    assert!(testdev::frames_of(&log, EtherType::Arp.as_u16()).is_empty());
}

#[test]
fn resolve_unknown_sends_request_then_reply_completes_it() {
    let (stack, log, dev) = setup();
    let iface = dev.interface().unwrap();

    // First resolve: INCOMPLETE, with a broadcast REQUEST on the wire.
    assert_eq!(
        arp::resolve(stack.inner(), &iface, PEER_IP).unwrap(),
        Resolution::Incomplete
    );
    let frames = testdev::frames_of(&log, EtherType::Arp.as_u16());
    assert_eq!(frames.len(), 1);
    let (request, dst) = &frames[0];
    assert_eq!(dst.as_slice(), &MacAddr::BROADCAST.0);
    assert_eq!(u16::from_be_bytes([request[6], request[7]]), arp::OP_REQUEST);
    assert_eq!(&request[24..28], &PEER_IP.0);

    // A second resolve while INCOMPLETE re-transmits the request.
    testdev::clear(&log);
    assert_eq!(
        arp::resolve(stack.inner(), &iface, PEER_IP).unwrap(),
        Resolution::Incomplete
    );
    assert_eq!(testdev::frames_of(&log, EtherType::Arp.as_u16()).len(), 1);

    // The matching REPLY arrives: the entry becomes RESOLVED and the next
    // resolve returns FOUND immediately.
    let reply = message(arp::OP_REPLY, PEER_MAC, PEER_IP, dev.hwaddr, OUR_IP);
    arp::input(stack.inner(), &reply, &dev);
    assert_eq!(
        arp::resolve(stack.inner(), &iface, PEER_IP).unwrap(),
        Resolution::Found(PEER_MAC)
    );
}

#[test]
fn resolved_entries_expire_after_timeout() {
    let (stack, _log, dev) = setup();
    let iface = dev.interface().unwrap();

    let reply = message(arp::OP_REPLY, PEER_MAC, PEER_IP, dev.hwaddr, OUR_IP);
    arp::input(stack.inner(), &reply, &dev);
    assert_eq!(
        arp::resolve(stack.inner(), &iface, PEER_IP).unwrap(),
        Resolution::Found(PEER_MAC)
    );

    // A sweep before the deadline keeps the entry.
    stack.inner().arp.sweep(Instant::now());
    assert_eq!(
        arp::resolve(stack.inner(), &iface, PEER_IP).unwrap(),
        Resolution::Found(PEER_MAC)
    );

    // A sweep past the 30-second deadline frees it.
    stack
        .inner()
        .arp
        .sweep(Instant::now() + arp::CACHE_TIMEOUT + Duration::from_secs(1));
    assert_eq!(
        arp::resolve(stack.inner(), &iface, PEER_IP).unwrap(),
        Resolution::Incomplete
    );
}

#[test]
fn static_entries_survive_the_sweep() {
    let (stack, _log, dev) = setup();
    let iface = dev.interface().unwrap();
    stack.arp_static(PEER_IP, PEER_MAC);
    stack
        .inner()
        .arp
        .sweep(Instant::now() + arp::CACHE_TIMEOUT * 10);
    assert_eq!(
        arp::resolve(stack.inner(), &iface, PEER_IP).unwrap(),
        Resolution::Found(PEER_MAC)
    );
}

#[test]
fn resolve_rejects_non_ethernet_devices() {
    let mut builder = crate::stack::NetStack::builder();
    let lo = builder
        .device(Box::new(crate::drivers::loopback::LoopbackDriver::new()))
        .unwrap();
    builder
        .interface(lo, Ipv4Addr::LOCALHOST, Ipv4Addr([255, 0, 0, 0]))
        .unwrap();
    let stack = builder.build().unwrap();
    let iface = stack.device(lo).unwrap().interface().unwrap();
    assert_eq!(
        arp::resolve(stack.inner(), &iface, Ipv4Addr([127, 0, 0, 9])),
        Err(NetError::AddressFamilyNotSupported)
    );
}

//! IPv4: datagram validation and delivery on ingress, routing and header
//! construction on egress.
//!
//! # Ingress
//!
//! [`input`] is the protocol handler for EtherType `0x0800`, run from the
//! soft-IRQ drain.  The validation ladder (length, version, header length,
//! total length, checksum, fragmentation) drops silently with a debug log;
//! a datagram addressed to neither the receiving interface's unicast, its
//! subnet broadcast, nor `255.255.255.255` is dropped without error.
//! Surviving datagrams dispatch by protocol number.
//!
//! # Egress
//!
//! [`output`] routes the destination, validates the caller's source
//! address against the chosen interface, builds the fixed 20-byte header,
//! and hands the datagram to the device — through the ARP resolver first
//! when the device needs it.  An in-progress resolution is reported to the
//! caller as [`NetError::Incomplete`]; the datagram was not delivered.

use std::sync::{Arc, Mutex};

use crate::arp::{self, Resolution};
use crate::checksum;
use crate::iface::Interface;
use crate::netdev::{DeviceFlags, NetDevice};
use crate::route::RouteTable;
use crate::stack::StackInner;
use crate::sync;
use crate::types::{EtherType, IpProtocol, Ipv4Addr, NetError};

/// Fixed header length; options are never emitted and never accepted.
pub const HEADER_LEN: usize = 20;
/// IP version tag.
pub const VERSION: u8 = 4;
/// Emitted time-to-live.
const TTL: u8 = 255;
/// Initial datagram identification value.
const ID_INITIAL: u16 = 128;

/// Upper-protocol handler: `(stack, payload, src, dst, iface)`.
pub type ProtocolHandler = fn(&Arc<StackInner>, &[u8], Ipv4Addr, Ipv4Addr, &Arc<Interface>);

struct ProtocolEntry {
    proto: u8,
    name: &'static str,
    handler: ProtocolHandler,
}

/// Layer-3 state: the route table, the upper-protocol registry, and the
/// datagram identification counter.
pub struct IpLayer {
    pub routes: RouteTable,
    protocols: Mutex<Vec<ProtocolEntry>>,
    id: Mutex<u16>,
}

impl IpLayer {
    pub fn new() -> Self {
        Self {
            routes: RouteTable::new(),
            protocols: Mutex::new(Vec::new()),
            id: Mutex::new(ID_INITIAL),
        }
    }

    /// Register an upper-protocol handler.  Startup only; duplicate
    /// protocol numbers are rejected.
    pub fn register_protocol(
        &self,
        proto: IpProtocol,
        name: &'static str,
        handler: ProtocolHandler,
    ) -> Result<(), NetError> {
        let mut protocols = sync::lock(&self.protocols);
        if protocols.iter().any(|e| e.proto == proto.as_u8()) {
            return Err(NetError::AlreadyExists);
        }
        protocols.push(ProtocolEntry {
            proto: proto.as_u8(),
            name,
            handler,
        });
        Ok(())
    }

    fn protocol_for(&self, proto: u8) -> Option<(&'static str, ProtocolHandler)> {
        let protocols = sync::lock(&self.protocols);
        protocols
            .iter()
            .find(|e| e.proto == proto)
            .map(|e| (e.name, e.handler))
    }

    /// Next datagram identification value, drawn from the monotonically
    /// increasing counter.
    fn next_id(&self) -> u16 {
        let mut id = sync::lock(&self.id);
        let value = *id;
        *id = id.wrapping_add(1);
        value
    }
}

impl Default for IpLayer {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Ingress
// =============================================================================

/// Protocol handler for EtherType `0x0800`.
pub fn input(stack: &Arc<StackInner>, data: &[u8], dev: &Arc<NetDevice>) {
    if data.len() < HEADER_LEN {
        log::debug!("{}: ip datagram too short ({} bytes)", dev.name, data.len());
        return;
    }
    let version = data[0] >> 4;
    if version != VERSION {
        log::debug!("{}: bad ip version {}", dev.name, version);
        return;
    }
    let hlen = ((data[0] & 0x0f) as usize) * 4;
    if hlen < HEADER_LEN || data.len() < hlen {
        log::debug!("{}: bad ip header length {}", dev.name, hlen);
        return;
    }
    let total = u16::from_be_bytes([data[2], data[3]]) as usize;
    if total < hlen || data.len() < total {
        log::debug!(
            "{}: ip total length {} exceeds received {}",
            dev.name,
            total,
            data.len()
        );
        return;
    }
    if checksum::checksum(&data[..hlen], 0) != 0 {
        log::debug!("{}: bad ip header checksum", dev.name);
        return;
    }
    // More-fragments bit or a nonzero fragment offset: reassembly is not
    // supported, drop.
    let frag = u16::from_be_bytes([data[6], data[7]]);
    if frag & 0x3fff != 0 {
        log::debug!("{}: fragmented datagram (0x{:04x}), dropping", dev.name, frag);
        return;
    }

    let src = Ipv4Addr([data[12], data[13], data[14], data[15]]);
    let dst = Ipv4Addr([data[16], data[17], data[18], data[19]]);

    let Some(iface) = dev.interface() else {
        return;
    };
    // Not addressed to us: drop without error.
    if dst != iface.unicast && dst != iface.broadcast && !dst.is_broadcast() {
        return;
    }

    let proto = data[9];
    let payload = &data[hlen..total];
    match stack.ip.protocol_for(proto) {
        Some((name, handler)) => {
            log::trace!(
                "{}: ip {} {} -> {}, {} bytes",
                dev.name,
                name,
                src,
                dst,
                payload.len()
            );
            handler(stack, payload, src, dst, &iface);
        }
        None => {
            log::debug!("{}: unsupported ip protocol {}", dev.name, proto);
        }
    }
}

// =============================================================================
// Egress
// =============================================================================

/// Build and send a datagram carrying `payload` as `proto`.
///
/// A zero `src` selects the outgoing interface's unicast address; a
/// nonzero `src` must equal it.  Returns [`NetError::Incomplete`] when the
/// nexthop's hardware address is still being resolved.
pub fn output(
    stack: &Arc<StackInner>,
    proto: IpProtocol,
    payload: &[u8],
    src: Ipv4Addr,
    dst: Ipv4Addr,
) -> Result<(), NetError> {
    if src.is_unspecified() && dst.is_broadcast() {
        log::debug!("ip: source address required for broadcast");
        return Err(NetError::InvalidArgument);
    }
    let Some(route) = stack.ip.routes.lookup(dst) else {
        log::debug!("ip: no route to {}", dst);
        return Err(NetError::NetworkUnreachable);
    };
    let iface = route.iface.clone();
    if !src.is_unspecified() && src != iface.unicast {
        log::debug!("ip: source {} not reachable via {}", src, iface.unicast);
        return Err(NetError::AddressNotAvailable);
    }
    let nexthop = route.next_hop(dst);

    let dev = iface.device().ok_or(NetError::DeviceDown)?;
    if HEADER_LEN + payload.len() > dev.mtu {
        log::debug!(
            "ip: datagram too long for {} ({} > {})",
            dev.name,
            HEADER_LEN + payload.len(),
            dev.mtu
        );
        return Err(NetError::MessageTooLong);
    }

    let datagram = build(
        stack.ip.next_id(),
        proto,
        payload,
        iface.unicast,
        dst,
    );
    log::trace!(
        "ip: {} {} -> {} via {}, {} bytes",
        proto,
        iface.unicast,
        dst,
        nexthop,
        datagram.len()
    );
    transmit(stack, &dev, &iface, &datagram, nexthop)
}

/// Fixed-header construction: TOS 0, TTL 255, no fragmentation, checksum
/// computed with the field pre-zeroed.
fn build(id: u16, proto: IpProtocol, payload: &[u8], src: Ipv4Addr, dst: Ipv4Addr) -> Vec<u8> {
    let total = (HEADER_LEN + payload.len()) as u16;
    let mut datagram = Vec::with_capacity(total as usize);
    datagram.push((VERSION << 4) | ((HEADER_LEN / 4) as u8));
    datagram.push(0); // TOS
    datagram.extend_from_slice(&total.to_be_bytes());
    datagram.extend_from_slice(&id.to_be_bytes());
    datagram.extend_from_slice(&0u16.to_be_bytes()); // flags + fragment offset
    datagram.push(TTL);
    datagram.push(proto.as_u8());
    datagram.extend_from_slice(&0u16.to_be_bytes()); // checksum placeholder
    datagram.extend_from_slice(&src.0);
    datagram.extend_from_slice(&dst.0);
    let sum = checksum::checksum(&datagram[..HEADER_LEN], 0);
    datagram[10..12].copy_from_slice(&sum.to_be_bytes());
    datagram.extend_from_slice(payload);
    datagram
}

/// Hand a finished datagram to the device, resolving the nexthop's
/// hardware address first when the device requires it.
fn transmit(
    stack: &Arc<StackInner>,
    dev: &Arc<NetDevice>,
    iface: &Arc<Interface>,
    datagram: &[u8],
    nexthop: Ipv4Addr,
) -> Result<(), NetError> {
    let broadcast = nexthop.is_broadcast() || nexthop == iface.broadcast;
    if dev.flags().contains(DeviceFlags::NEED_ARP) && !broadcast {
        match arp::resolve(stack, iface, nexthop)? {
            Resolution::Found(ha) => dev.transmit(EtherType::Ipv4.as_u16(), datagram, &ha.0),
            Resolution::Incomplete => Err(NetError::Incomplete),
        }
    } else if broadcast {
        dev.transmit(EtherType::Ipv4.as_u16(), datagram, &dev.broadcast.0)
    } else {
        dev.transmit(EtherType::Ipv4.as_u16(), datagram, &[])
    }
}

//! ICMP: echo reply generation.
//!
//! Only ECHO handling is implemented; every other message type is logged
//! and ignored.

use std::sync::Arc;

use crate::checksum;
use crate::iface::Interface;
use crate::ipv4;
use crate::stack::StackInner;
use crate::types::{IpProtocol, Ipv4Addr, NetError};

/// Type, code, checksum, 4-byte message-specific field.
pub const HEADER_LEN: usize = 8;

pub const TYPE_ECHOREPLY: u8 = 0;
pub const TYPE_ECHO: u8 = 8;

/// IP protocol handler for ICMP.
///
/// A valid ECHO arriving at a local interface produces an ECHOREPLY that
/// carries the original identifier, sequence number, and payload, with
/// the source set to the receiving interface's unicast and the
/// destination set to the original sender.
pub fn input(stack: &Arc<StackInner>, data: &[u8], src: Ipv4Addr, _dst: Ipv4Addr, iface: &Arc<Interface>) {
    if data.len() < HEADER_LEN {
        log::debug!("icmp: message too short ({} bytes)", data.len());
        return;
    }
    if checksum::checksum(data, 0) != 0 {
        log::debug!("icmp: bad checksum");
        return;
    }
    let ty = data[0];
    let code = data[1];
    let values = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
    match ty {
        TYPE_ECHO => {
            log::debug!(
                "icmp: echo from {}, id={} seq={}",
                src,
                values >> 16,
                values & 0xffff
            );
            if let Err(err) = output(
                stack,
                TYPE_ECHOREPLY,
                code,
                values,
                &data[HEADER_LEN..],
                iface.unicast,
                src,
            ) {
                log::warn!("icmp: echo reply to {} failed: {}", src, err);
            }
        }
        other => {
            log::debug!("icmp: type {} from {} ignored", other, src);
        }
    }
}

/// Build and send an ICMP message.
pub fn output(
    stack: &Arc<StackInner>,
    ty: u8,
    code: u8,
    values: u32,
    payload: &[u8],
    src: Ipv4Addr,
    dst: Ipv4Addr,
) -> Result<(), NetError> {
    let mut message = Vec::with_capacity(HEADER_LEN + payload.len());
    message.push(ty);
    message.push(code);
    message.extend_from_slice(&0u16.to_be_bytes()); // checksum placeholder
    message.extend_from_slice(&values.to_be_bytes());
    message.extend_from_slice(payload);
    let sum = checksum::checksum(&message, 0);
    message[2..4].copy_from_slice(&sum.to_be_bytes());
    ipv4::output(stack, IpProtocol::Icmp, &message, src, dst)
}

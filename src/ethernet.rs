//! Ethernet II framing: header construction, receive filtering, and
//! hand-off to the protocol ingress queues.
//!
//! Drivers for Ethernet-type devices call [`encode`] on the egress path and
//! [`input_helper`] on the ingress path; the latter applies the destination
//! MAC filter before anything reaches an upper protocol.

use std::sync::Arc;

use crate::netdev::NetDevice;
use crate::stack::StackInner;
use crate::types::MacAddr;

/// Hardware address length.
pub const ADDR_LEN: usize = 6;
/// Header: destination, source, EtherType.
pub const HEADER_LEN: usize = 14;
/// Minimum payload; shorter payloads are zero-padded.
pub const PAYLOAD_MIN: usize = 46;
/// Maximum payload (the Ethernet MTU).
pub const PAYLOAD_MAX: usize = 1500;
/// Maximum frame size without FCS (the driver handles the FCS).
pub const FRAME_MAX: usize = HEADER_LEN + PAYLOAD_MAX;

/// A parsed Ethernet header plus payload view.
pub struct Frame<'a> {
    pub dst: MacAddr,
    pub src: MacAddr,
    pub kind: u16,
    pub payload: &'a [u8],
}

/// Build a wire frame: 14-byte header followed by the payload padded to
/// the 46-byte minimum.
pub fn encode(src: MacAddr, dst: MacAddr, kind: u16, payload: &[u8]) -> Vec<u8> {
    let body_len = payload.len().max(PAYLOAD_MIN);
    let mut frame = Vec::with_capacity(HEADER_LEN + body_len);
    frame.extend_from_slice(&dst.0);
    frame.extend_from_slice(&src.0);
    frame.extend_from_slice(&kind.to_be_bytes());
    frame.extend_from_slice(payload);
    frame.resize(HEADER_LEN + body_len, 0);
    frame
}

/// Parse a received frame.  Returns `None` when shorter than the header.
pub fn decode(frame: &[u8]) -> Option<Frame<'_>> {
    if frame.len() < HEADER_LEN {
        return None;
    }
    let mut dst = [0u8; ADDR_LEN];
    let mut src = [0u8; ADDR_LEN];
    dst.copy_from_slice(&frame[0..6]);
    src.copy_from_slice(&frame[6..12]);
    Some(Frame {
        dst: MacAddr(dst),
        src: MacAddr(src),
        kind: u16::from_be_bytes([frame[12], frame[13]]),
        payload: &frame[HEADER_LEN..],
    })
}

/// Ingress path for Ethernet drivers: parse, filter by destination MAC,
/// and hand the payload to the protocol ingress queues keyed by EtherType.
///
/// Frames addressed to neither the device MAC nor the Ethernet broadcast
/// are dropped without error.
pub fn input_helper(stack: &Arc<StackInner>, dev: &Arc<NetDevice>, frame: &[u8]) {
    let Some(parsed) = decode(frame) else {
        log::debug!("{}: frame too short ({} bytes)", dev.name, frame.len());
        return;
    };
    if parsed.dst != dev.hwaddr && !parsed.dst.is_broadcast() {
        dev.stats.count_rx_dropped();
        return;
    }
    log::trace!(
        "{}: rx {} -> {}, type 0x{:04x}, {} bytes",
        dev.name,
        parsed.src,
        parsed.dst,
        parsed.kind,
        parsed.payload.len()
    );
    dev.stats.count_rx(frame.len());
    stack.input(parsed.kind, parsed.payload, dev);
}

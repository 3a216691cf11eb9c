//! UDP: a fixed pool of endpoints with blocking receive semantics.
//!
//! Endpoints live in a 16-slot table guarded by one mutex; the slot index
//! is the application's socket handle.  Ingress selects an endpoint by
//! destination port with wildcard-address matching, queues the datagram
//! together with the sender endpoint, and broadcast-wakes the endpoint's
//! scheduler context.  `recvfrom` sleeps on that context; a close while
//! waiters are present marks the slot CLOSING and the last waiter out
//! performs the release.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::checksum;
use crate::iface::Interface;
use crate::ipv4;
use crate::sched::SchedCtx;
use crate::stack::StackInner;
use crate::sync;
use crate::types::{Endpoint, IpProtocol, Ipv4Addr, NetError, Port};

/// Source port, destination port, length, checksum.
pub const HEADER_LEN: usize = 8;

/// Endpoint pool capacity.
const PCB_COUNT: usize = 16;

/// Per-endpoint receive queue bound.
const QUEUE_LIMIT: usize = 64;

/// IANA ephemeral port range scanned by `sendto` for unbound endpoints.
const EPHEMERAL_MIN: u16 = 49152;
const EPHEMERAL_MAX: u16 = 65535;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PcbState {
    Free,
    Open,
    Closing,
}

struct QueueEntry {
    remote: Endpoint,
    data: Vec<u8>,
}

struct UdpPcb {
    state: PcbState,
    local: Endpoint,
    queue: VecDeque<QueueEntry>,
}

impl UdpPcb {
    fn new() -> Self {
        Self {
            state: PcbState::Free,
            local: Endpoint::ANY,
            queue: VecDeque::new(),
        }
    }
}

/// The UDP endpoint table plus one scheduler context per slot.
pub struct UdpLayer {
    pcbs: Mutex<[UdpPcb; PCB_COUNT]>,
    ctx: [SchedCtx; PCB_COUNT],
}

impl UdpLayer {
    pub fn new() -> Self {
        Self {
            pcbs: Mutex::new(std::array::from_fn(|_| UdpPcb::new())),
            ctx: std::array::from_fn(|_| SchedCtx::new()),
        }
    }

    /// Interrupt every in-use endpoint's context.  Event handler for the
    /// process-wide cancellation broadcast.
    pub fn interrupt_all(&self) {
        let pcbs = sync::lock(&self.pcbs);
        for (pcb, ctx) in pcbs.iter().zip(self.ctx.iter()) {
            if pcb.state != PcbState::Free {
                ctx.interrupt();
            }
        }
    }
}

impl Default for UdpLayer {
    fn default() -> Self {
        Self::new()
    }
}

fn release_slot(pcb: &mut UdpPcb, ctx: &SchedCtx) {
    pcb.state = PcbState::Free;
    pcb.local = Endpoint::ANY;
    pcb.queue.clear();
    ctx.clear();
}

// =============================================================================
// Ingress
// =============================================================================

/// IP protocol handler for UDP.
pub fn input(stack: &Arc<StackInner>, data: &[u8], src: Ipv4Addr, dst: Ipv4Addr, iface: &Arc<Interface>) {
    if data.len() < HEADER_LEN {
        log::debug!("udp: datagram too short ({} bytes)", data.len());
        return;
    }
    let declared = u16::from_be_bytes([data[4], data[5]]) as usize;
    if declared != data.len() {
        log::debug!("udp: length mismatch ({} != {})", declared, data.len());
        return;
    }
    let pseudo = checksum::pseudo_sum(src, dst, IpProtocol::Udp, declared as u16);
    if checksum::checksum(data, pseudo) != 0 {
        log::debug!("udp: bad checksum from {}", src);
        return;
    }
    let src_port = Port::from_be_bytes([data[0], data[1]]);
    let dst_port = Port::from_be_bytes([data[2], data[3]]);

    let mut pcbs = sync::lock(&stack.udp.pcbs);
    let selected = pcbs.iter_mut().zip(stack.udp.ctx.iter()).find(|(pcb, _)| {
        pcb.state == PcbState::Open
            && pcb.local.port == dst_port
            && (pcb.local.addr == dst
                || pcb.local.addr.is_unspecified()
                || dst.is_broadcast()
                || dst == iface.broadcast)
    });
    let Some((pcb, ctx)) = selected else {
        log::debug!("udp: no endpoint for {}:{}", dst, dst_port);
        return;
    };
    if pcb.queue.len() >= QUEUE_LIMIT {
        log::warn!("udp: receive queue full on {}:{}", dst, dst_port);
        return;
    }
    log::trace!(
        "udp: {}:{} -> {}:{}, {} bytes",
        src,
        src_port,
        dst,
        dst_port,
        declared - HEADER_LEN
    );
    pcb.queue.push_back(QueueEntry {
        remote: Endpoint::new(src, src_port),
        data: data[HEADER_LEN..].to_vec(),
    });
    ctx.wakeup();
}

// =============================================================================
// Egress
// =============================================================================

/// Build a datagram from `local` to `remote` and hand it to IP.
fn output(
    stack: &Arc<StackInner>,
    local: Endpoint,
    remote: Endpoint,
    data: &[u8],
) -> Result<(), NetError> {
    let total = HEADER_LEN + data.len();
    if total > u16::MAX as usize {
        return Err(NetError::MessageTooLong);
    }
    let mut datagram = Vec::with_capacity(total);
    datagram.extend_from_slice(&local.port.to_be_bytes());
    datagram.extend_from_slice(&remote.port.to_be_bytes());
    datagram.extend_from_slice(&(total as u16).to_be_bytes());
    datagram.extend_from_slice(&0u16.to_be_bytes()); // checksum placeholder
    datagram.extend_from_slice(data);
    let pseudo = checksum::pseudo_sum(local.addr, remote.addr, IpProtocol::Udp, total as u16);
    let sum = checksum::checksum(&datagram, pseudo);
    datagram[6..8].copy_from_slice(&sum.to_be_bytes());
    log::trace!("udp: {} -> {}, {} bytes", local, remote, data.len());
    ipv4::output(stack, IpProtocol::Udp, &datagram, local.addr, remote.addr)
}

// =============================================================================
// Application API
// =============================================================================

fn pcb_guard<'a>(
    stack: &'a Arc<StackInner>,
    id: usize,
) -> Result<MutexGuard<'a, [UdpPcb; PCB_COUNT]>, NetError> {
    if id >= PCB_COUNT {
        return Err(NetError::InvalidHandle);
    }
    Ok(sync::lock(&stack.udp.pcbs))
}

/// Allocate an endpoint.  The returned identifier is the pool index.
pub(crate) fn open(stack: &Arc<StackInner>) -> Result<usize, NetError> {
    let mut pcbs = sync::lock(&stack.udp.pcbs);
    for (id, pcb) in pcbs.iter_mut().enumerate() {
        if pcb.state == PcbState::Free {
            pcb.state = PcbState::Open;
            pcb.local = Endpoint::ANY;
            pcb.queue.clear();
            stack.udp.ctx[id].clear();
            return Ok(id);
        }
    }
    Err(NetError::NoBufferSpace)
}

/// Bind a local endpoint.  Rejects a pair already bound elsewhere.
pub(crate) fn bind(stack: &Arc<StackInner>, id: usize, local: Endpoint) -> Result<(), NetError> {
    let mut pcbs = pcb_guard(stack, id)?;
    if pcbs[id].state != PcbState::Open {
        return Err(NetError::InvalidHandle);
    }
    let taken = pcbs
        .iter()
        .enumerate()
        .any(|(i, pcb)| i != id && pcb.state != PcbState::Free && pcb.local == local);
    if taken {
        log::debug!("udp: {} already bound", local);
        return Err(NetError::AddressInUse);
    }
    pcbs[id].local = local;
    log::debug!("udp: socket {} bound to {}", id, local);
    Ok(())
}

/// `true` if binding `(addr, port)` would clash with an in-use endpoint
/// other than `id`.
fn port_taken(pcbs: &[UdpPcb; PCB_COUNT], id: usize, addr: Ipv4Addr, port: Port) -> bool {
    pcbs.iter().enumerate().any(|(i, pcb)| {
        i != id
            && pcb.state != PcbState::Free
            && pcb.local.port == port
            && (pcb.local.addr == addr
                || pcb.local.addr.is_unspecified()
                || addr.is_unspecified())
    })
}

/// Send `data` to `remote`, picking a source address and an ephemeral
/// port when the endpoint is unbound.
pub(crate) fn sendto(
    stack: &Arc<StackInner>,
    id: usize,
    data: &[u8],
    remote: Endpoint,
) -> Result<usize, NetError> {
    let local = {
        let mut pcbs = pcb_guard(stack, id)?;
        if pcbs[id].state != PcbState::Open {
            return Err(NetError::InvalidHandle);
        }
        let mut local = pcbs[id].local;
        if local.addr.is_unspecified() {
            // Source address follows the route for the destination.
            let route = stack
                .ip
                .routes
                .lookup(remote.addr)
                .ok_or(NetError::NetworkUnreachable)?;
            local.addr = route.iface.unicast;
        }
        if local.port.is_any() {
            let picked = (EPHEMERAL_MIN..=EPHEMERAL_MAX)
                .map(Port)
                .find(|&p| !port_taken(&pcbs, id, local.addr, p))
                .ok_or(NetError::AddressInUse)?;
            // Reserve the port on the endpoint; the address stays as bound.
            pcbs[id].local.port = picked;
            local.port = picked;
            log::debug!("udp: socket {} using ephemeral port {}", id, picked);
        }
        local
    };
    output(stack, local, remote, data)?;
    Ok(data.len())
}

/// Blocking receive.  Delivery truncates to the caller's buffer and
/// reports the byte count actually copied plus the sender endpoint.
pub(crate) fn recvfrom(
    stack: &Arc<StackInner>,
    id: usize,
    buf: &mut [u8],
) -> Result<(usize, Endpoint), NetError> {
    let mut pcbs = pcb_guard(stack, id)?;
    loop {
        match pcbs[id].state {
            PcbState::Free => return Err(NetError::InvalidHandle),
            PcbState::Closing => {
                let ctx = &stack.udp.ctx[id];
                if ctx.waiters() == 0 {
                    release_slot(&mut pcbs[id], ctx);
                }
                return Err(NetError::ConnectionAborted);
            }
            PcbState::Open => {}
        }
        if let Some(entry) = pcbs[id].queue.pop_front() {
            let n = entry.data.len().min(buf.len());
            buf[..n].copy_from_slice(&entry.data[..n]);
            return Ok((n, entry.remote));
        }
        let (guard, interrupted) = stack.udp.ctx[id].sleep(pcbs);
        pcbs = guard;
        if pcbs[id].state == PcbState::Closing {
            continue;
        }
        if interrupted {
            return Err(NetError::Interrupted);
        }
    }
}

/// Release the endpoint, deferring to the last waiter when the context is
/// occupied.
pub(crate) fn close(stack: &Arc<StackInner>, id: usize) -> Result<(), NetError> {
    let mut pcbs = pcb_guard(stack, id)?;
    if pcbs[id].state == PcbState::Free {
        return Err(NetError::InvalidHandle);
    }
    let ctx = &stack.udp.ctx[id];
    if ctx.waiters() > 0 {
        pcbs[id].state = PcbState::Closing;
        ctx.wakeup();
    } else {
        release_slot(&mut pcbs[id], ctx);
    }
    Ok(())
}

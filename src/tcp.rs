//! TCP: RFC 793 passive open and data transfer over a fixed endpoint pool.
//!
//! The connection table is a 16-slot array guarded by one mutex; the slot
//! index is the application's socket handle.  Segment ingress runs the
//! RFC 793 "segment arrives" steps for the implemented subset: no-match /
//! CLOSED reset generation, the LISTEN → SYN_RECEIVED → ESTABLISHED
//! handshake, the acceptability test, ACK processing with the send-window
//! update rule, and in-order in-window delivery into the 65535-byte
//! receive buffer.  Active open, retransmission, and congestion control
//! are not implemented; `close` sends RST and releases the slot.
//!
//! Blocking calls (`open_rfc793`, `send`, `receive`) sleep on the slot's
//! scheduler context under the table mutex and are woken by segment
//! processing or interrupted by the cancellation event.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::checksum;
use crate::iface::Interface;
use crate::ipv4;
use crate::sched::SchedCtx;
use crate::stack::StackInner;
use crate::sync;
use crate::types::{Endpoint, IpProtocol, Ipv4Addr, NetError, Port};

/// Fixed header length; options are never emitted.
pub const HEADER_LEN: usize = 20;

/// Endpoint pool capacity.
const PCB_COUNT: usize = 16;

/// Receive buffer size, also the initial receive window.
const BUF_SIZE: usize = 65535;

// Control flag bits.
pub const FLG_FIN: u8 = 0x01;
pub const FLG_SYN: u8 = 0x02;
pub const FLG_RST: u8 = 0x04;
pub const FLG_PSH: u8 = 0x08;
pub const FLG_ACK: u8 = 0x10;
pub const FLG_URG: u8 = 0x20;

// =============================================================================
// Sequence number arithmetic (RFC 793 §3.3)
// =============================================================================

/// `a` is before `b` in sequence space (wrapping comparison).
#[inline]
fn seq_lt(a: u32, b: u32) -> bool {
    (a.wrapping_sub(b) as i32) < 0
}

#[inline]
fn seq_le(a: u32, b: u32) -> bool {
    (a.wrapping_sub(b) as i32) <= 0
}

// =============================================================================
// Connection state
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TcpState {
    Free,
    Closed,
    Listen,
    SynSent,
    SynReceived,
    Established,
    FinWait1,
    FinWait2,
    Closing,
    TimeWait,
    CloseWait,
    LastAck,
}

impl TcpState {
    const fn name(self) -> &'static str {
        match self {
            Self::Free => "FREE",
            Self::Closed => "CLOSED",
            Self::Listen => "LISTEN",
            Self::SynSent => "SYN_SENT",
            Self::SynReceived => "SYN_RECEIVED",
            Self::Established => "ESTABLISHED",
            Self::FinWait1 => "FIN_WAIT1",
            Self::FinWait2 => "FIN_WAIT2",
            Self::Closing => "CLOSING",
            Self::TimeWait => "TIME_WAIT",
            Self::CloseWait => "CLOSE_WAIT",
            Self::LastAck => "LAST_ACK",
        }
    }
}

/// Send sequence variables (RFC 793 §3.2).
#[derive(Clone, Copy, Default)]
struct SendVars {
    /// Send unacknowledged.
    una: u32,
    /// Send next.
    nxt: u32,
    /// Send window.
    wnd: u16,
    /// Segment sequence number used for the last window update.
    wl1: u32,
    /// Segment acknowledgment number used for the last window update.
    wl2: u32,
}

/// Receive sequence variables.
#[derive(Clone, Copy, Default)]
struct RecvVars {
    /// Receive next.
    nxt: u32,
    /// Receive window.
    wnd: u16,
}

struct TcpPcb {
    state: TcpState,
    local: Endpoint,
    foreign: Endpoint,
    snd: SendVars,
    /// Initial send sequence number.
    iss: u32,
    rcv: RecvVars,
    /// Initial receive sequence number.
    irs: u32,
    /// Maximum segment size, derived from the interface MTU on SYN.
    mss: u16,
    buf: Box<[u8]>,
}

impl TcpPcb {
    fn new() -> Self {
        Self {
            state: TcpState::Free,
            local: Endpoint::ANY,
            foreign: Endpoint::ANY,
            snd: SendVars::default(),
            iss: 0,
            rcv: RecvVars::default(),
            irs: 0,
            mss: 0,
            buf: vec![0u8; BUF_SIZE].into_boxed_slice(),
        }
    }

    fn reset(&mut self) {
        self.state = TcpState::Free;
        self.local = Endpoint::ANY;
        self.foreign = Endpoint::ANY;
        self.snd = SendVars::default();
        self.iss = 0;
        self.rcv = RecvVars::default();
        self.irs = 0;
        self.mss = 0;
    }
}

/// The TCP endpoint table plus one scheduler context per slot.
pub struct TcpLayer {
    pcbs: Mutex<Vec<TcpPcb>>,
    ctx: [SchedCtx; PCB_COUNT],
}

impl TcpLayer {
    pub fn new() -> Self {
        Self {
            pcbs: Mutex::new((0..PCB_COUNT).map(|_| TcpPcb::new()).collect()),
            ctx: std::array::from_fn(|_| SchedCtx::new()),
        }
    }

    /// Interrupt every in-use endpoint's context.  Event handler for the
    /// process-wide cancellation broadcast.
    pub fn interrupt_all(&self) {
        let pcbs = sync::lock(&self.pcbs);
        for (pcb, ctx) in pcbs.iter().zip(self.ctx.iter()) {
            if pcb.state != TcpState::Free {
                ctx.interrupt();
            }
        }
    }
}

impl Default for TcpLayer {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Wire format
// =============================================================================

struct TcpHeader {
    src_port: Port,
    dst_port: Port,
    seq: u32,
    ack: u32,
    data_offset: usize,
    flags: u8,
    wnd: u16,
    up: u16,
}

fn parse_header(data: &[u8]) -> Option<TcpHeader> {
    if data.len() < HEADER_LEN {
        return None;
    }
    let data_offset = (((data[12] >> 4) & 0x0f) as usize) * 4;
    if data_offset < HEADER_LEN || data.len() < data_offset {
        return None;
    }
    Some(TcpHeader {
        src_port: Port::from_be_bytes([data[0], data[1]]),
        dst_port: Port::from_be_bytes([data[2], data[3]]),
        seq: u32::from_be_bytes([data[4], data[5], data[6], data[7]]),
        ack: u32::from_be_bytes([data[8], data[9], data[10], data[11]]),
        data_offset,
        flags: data[13] & 0x3f,
        wnd: u16::from_be_bytes([data[14], data[15]]),
        up: u16::from_be_bytes([data[18], data[19]]),
    })
}

/// Normalized segment record used by state processing.
struct Segment {
    seq: u32,
    ack: u32,
    /// Payload length plus one per SYN and one per FIN.
    len: u32,
    wnd: u16,
    #[allow(dead_code)]
    up: u16,
}

/// Build and send one segment.
fn output_raw(
    stack: &Arc<StackInner>,
    local: Endpoint,
    foreign: Endpoint,
    seq: u32,
    ack: u32,
    flags: u8,
    wnd: u16,
    payload: &[u8],
) -> Result<(), NetError> {
    let total = HEADER_LEN + payload.len();
    let mut segment = Vec::with_capacity(total);
    segment.extend_from_slice(&local.port.to_be_bytes());
    segment.extend_from_slice(&foreign.port.to_be_bytes());
    segment.extend_from_slice(&seq.to_be_bytes());
    segment.extend_from_slice(&ack.to_be_bytes());
    segment.push(((HEADER_LEN / 4) as u8) << 4);
    segment.push(flags & 0x3f);
    segment.extend_from_slice(&wnd.to_be_bytes());
    segment.extend_from_slice(&0u16.to_be_bytes()); // checksum placeholder
    segment.extend_from_slice(&0u16.to_be_bytes()); // urgent pointer
    segment.extend_from_slice(payload);
    let pseudo = checksum::pseudo_sum(local.addr, foreign.addr, IpProtocol::Tcp, total as u16);
    let sum = checksum::checksum(&segment, pseudo);
    segment[16..18].copy_from_slice(&sum.to_be_bytes());
    log::trace!(
        "tcp: {} -> {} seq={} ack={} flags=0x{:02x} len={}",
        local,
        foreign,
        seq,
        ack,
        flags,
        payload.len()
    );
    ipv4::output(stack, IpProtocol::Tcp, &segment, local.addr, foreign.addr)
}

/// Send a segment from a connection's current variables.  A SYN uses the
/// initial send sequence number; an ACK carries `rcv.nxt`.
fn output(stack: &Arc<StackInner>, pcb: &TcpPcb, flags: u8, payload: &[u8]) -> Result<(), NetError> {
    let seq = if flags & FLG_SYN != 0 {
        pcb.iss
    } else {
        pcb.snd.nxt
    };
    let ack = if flags & FLG_ACK != 0 { pcb.rcv.nxt } else { 0 };
    output_raw(
        stack,
        pcb.local,
        pcb.foreign,
        seq,
        ack,
        flags,
        pcb.rcv.wnd,
        payload,
    )
}

// =============================================================================
// Ingress
// =============================================================================

/// IP protocol handler for TCP.
pub fn input(stack: &Arc<StackInner>, data: &[u8], src: Ipv4Addr, dst: Ipv4Addr, iface: &Arc<Interface>) {
    if data.len() < HEADER_LEN {
        log::debug!("tcp: segment too short ({} bytes)", data.len());
        return;
    }
    if src.is_broadcast() || dst.is_broadcast() {
        log::debug!("tcp: broadcast endpoint, dropping");
        return;
    }
    let pseudo = checksum::pseudo_sum(src, dst, IpProtocol::Tcp, data.len() as u16);
    if checksum::checksum(data, pseudo) != 0 {
        log::debug!("tcp: bad checksum from {}", src);
        return;
    }
    let Some(hdr) = parse_header(data) else {
        log::debug!("tcp: bad data offset from {}", src);
        return;
    };
    let payload = &data[hdr.data_offset..];

    let local = Endpoint::new(dst, hdr.dst_port);
    let foreign = Endpoint::new(src, hdr.src_port);
    let mut len = payload.len() as u32;
    if hdr.flags & FLG_SYN != 0 {
        len += 1;
    }
    if hdr.flags & FLG_FIN != 0 {
        len += 1;
    }
    let seg = Segment {
        seq: hdr.seq,
        ack: hdr.ack,
        len,
        wnd: hdr.wnd,
        up: hdr.up,
    };
    let mss = iface
        .device()
        .map(|dev| dev.mtu.saturating_sub(ipv4::HEADER_LEN + HEADER_LEN) as u16)
        .unwrap_or(0);

    let pcbs = sync::lock(&stack.tcp.pcbs);
    segment_arrives(stack, pcbs, hdr.flags, &seg, payload, local, foreign, mss);
}

/// Find the endpoint for an incoming segment.
///
/// An exact connection (or a LISTEN endpoint whose foreign endpoint was
/// pinned at open) wins; a LISTEN endpoint with a wildcard foreign acts
/// as the fallback.
fn select_pcb(pcbs: &[TcpPcb], local: Endpoint, foreign: Endpoint) -> Option<usize> {
    let mut fallback = None;
    for (i, pcb) in pcbs.iter().enumerate() {
        if pcb.state == TcpState::Free || pcb.state == TcpState::Closed {
            continue;
        }
        if pcb.local.port != local.port {
            continue;
        }
        if !(pcb.local.addr == local.addr || pcb.local.addr.is_unspecified()) {
            continue;
        }
        if pcb.state == TcpState::Listen {
            if pcb.foreign == Endpoint::ANY {
                fallback = Some(i);
                continue;
            }
            if pcb.foreign == foreign {
                return Some(i);
            }
        } else if pcb.foreign == foreign {
            return Some(i);
        }
    }
    fallback
}

/// RFC 793 "segment arrives" for the implemented subset.
#[allow(clippy::too_many_arguments)]
fn segment_arrives(
    stack: &Arc<StackInner>,
    mut pcbs: MutexGuard<'_, Vec<TcpPcb>>,
    flags: u8,
    seg: &Segment,
    payload: &[u8],
    local: Endpoint,
    foreign: Endpoint,
    mss: u16,
) {
    let Some(idx) = select_pcb(&pcbs, local, foreign) else {
        // No connection exists: generate a reset unless the incoming
        // segment already is one.
        drop(pcbs);
        if flags & FLG_RST != 0 {
            return;
        }
        let result = if flags & FLG_ACK == 0 {
            output_raw(
                stack,
                local,
                foreign,
                0,
                seg.seq.wrapping_add(seg.len),
                FLG_RST | FLG_ACK,
                0,
                &[],
            )
        } else {
            output_raw(stack, local, foreign, seg.ack, 0, FLG_RST, 0, &[])
        };
        if let Err(err) = result {
            log::debug!("tcp: reset to {} failed: {}", foreign, err);
        }
        return;
    };

    let ctx = &stack.tcp.ctx[idx];
    let pcb = &mut pcbs[idx];

    match pcb.state {
        TcpState::Listen => {
            if flags & FLG_RST != 0 {
                return;
            }
            if flags & FLG_ACK != 0 {
                let _ = output_raw(stack, local, foreign, seg.ack, 0, FLG_RST, 0, &[]);
                return;
            }
            if flags & FLG_SYN == 0 {
                return;
            }
            // Passive open: capture the peer, initialize receive
            // variables, answer SYN+ACK.
            pcb.local = local;
            pcb.foreign = foreign;
            pcb.rcv.wnd = BUF_SIZE as u16;
            pcb.rcv.nxt = seg.seq.wrapping_add(1);
            pcb.irs = seg.seq;
            pcb.mss = mss;
            pcb.iss = rand::random();
            if let Err(err) = output(stack, pcb, FLG_SYN | FLG_ACK, &[]) {
                log::warn!("tcp: syn+ack to {} failed: {}", foreign, err);
                return;
            }
            pcb.snd.una = pcb.iss;
            pcb.snd.nxt = pcb.iss.wrapping_add(1);
            pcb.state = TcpState::SynReceived;
            log::debug!("tcp: {} LISTEN -> SYN_RECEIVED ({})", pcb.local, foreign);
        }
        TcpState::SynSent => {
            // Active open is not implemented.
        }
        _ => {
            otherwise(stack, pcb, ctx, flags, seg, payload);
        }
    }
}

/// Steps 1-5 of "otherwise" processing for synchronized states.
fn otherwise(
    stack: &Arc<StackInner>,
    pcb: &mut TcpPcb,
    ctx: &SchedCtx,
    flags: u8,
    seg: &Segment,
    payload: &[u8],
) {
    // First check: sequence-number acceptability against the receive
    // window.  Zero-length segments and a zero window get the special
    // cases from the RFC.
    let rcv_nxt = pcb.rcv.nxt;
    let rcv_end = rcv_nxt.wrapping_add(pcb.rcv.wnd as u32);
    let in_window = |seq: u32| seq_le(rcv_nxt, seq) && seq_lt(seq, rcv_end);
    let acceptable = match (seg.len == 0, pcb.rcv.wnd == 0) {
        (true, true) => seg.seq == rcv_nxt,
        (true, false) => in_window(seg.seq),
        (false, true) => false,
        (false, false) => {
            in_window(seg.seq) || in_window(seg.seq.wrapping_add(seg.len).wrapping_sub(1))
        }
    };
    if !acceptable {
        if flags & FLG_RST == 0 {
            let _ = output(stack, pcb, FLG_ACK, &[]);
        }
        log::debug!(
            "tcp: {} unacceptable seq={} len={} (rcv.nxt={} wnd={})",
            pcb.state.name(),
            seg.seq,
            seg.len,
            rcv_nxt,
            pcb.rcv.wnd
        );
        return;
    }
    // Second/third/fourth checks (RST, security, SYN): not implemented.

    // Fifth check: ACK is required from here on.
    if flags & FLG_ACK == 0 {
        return;
    }
    match pcb.state {
        TcpState::SynReceived => {
            if seq_lt(pcb.snd.una, seg.ack) && seq_le(seg.ack, pcb.snd.nxt) {
                pcb.snd.una = seg.ack;
                pcb.snd.wnd = seg.wnd;
                pcb.snd.wl1 = seg.seq;
                pcb.snd.wl2 = seg.ack;
                pcb.state = TcpState::Established;
                log::debug!("tcp: {} SYN_RECEIVED -> ESTABLISHED", pcb.local);
                ctx.wakeup();
            } else {
                let _ = output_raw(
                    stack,
                    pcb.local,
                    pcb.foreign,
                    seg.ack,
                    0,
                    FLG_RST,
                    0,
                    &[],
                );
                return;
            }
        }
        TcpState::Established => {
            if seq_lt(pcb.snd.una, seg.ack) && seq_le(seg.ack, pcb.snd.nxt) {
                pcb.snd.una = seg.ack;
                if seq_lt(pcb.snd.wl1, seg.seq)
                    || (pcb.snd.wl1 == seg.seq && seq_le(pcb.snd.wl2, seg.ack))
                {
                    pcb.snd.wnd = seg.wnd;
                    pcb.snd.wl1 = seg.seq;
                    pcb.snd.wl2 = seg.ack;
                }
                // Senders may be waiting on acknowledged data or a wider
                // window.
                ctx.wakeup();
            } else if seq_lt(pcb.snd.nxt, seg.ack) {
                // Acknowledgment of data not yet sent.
                let _ = output(stack, pcb, FLG_ACK, &[]);
                return;
            }
            // ACKs for already-acknowledged data are ignored.
        }
        _ => return,
    }

    // Seventh check: segment text.
    if !payload.is_empty() && pcb.state == TcpState::Established {
        if seg.seq == pcb.rcv.nxt && payload.len() <= pcb.rcv.wnd as usize {
            let offset = BUF_SIZE - pcb.rcv.wnd as usize;
            pcb.buf[offset..offset + payload.len()].copy_from_slice(payload);
            pcb.rcv.nxt = seg.seq.wrapping_add(seg.len);
            pcb.rcv.wnd -= payload.len() as u16;
            let _ = output(stack, pcb, FLG_ACK, &[]);
            ctx.wakeup();
        } else {
            // In-window but out of order: acknowledge what we expect.
            let _ = output(stack, pcb, FLG_ACK, &[]);
        }
    }
}

// =============================================================================
// Application API
// =============================================================================

fn pcb_guard<'a>(
    stack: &'a Arc<StackInner>,
    id: usize,
) -> Result<MutexGuard<'a, Vec<TcpPcb>>, NetError> {
    if id >= PCB_COUNT {
        return Err(NetError::InvalidHandle);
    }
    Ok(sync::lock(&stack.tcp.pcbs))
}

/// Release the slot, deferring to the last waiter when the context is
/// occupied.
fn release(pcbs: &mut [TcpPcb], id: usize, ctx: &SchedCtx) {
    if ctx.waiters() > 0 {
        pcbs[id].state = TcpState::Closed;
        ctx.wakeup();
    } else {
        pcbs[id].reset();
        ctx.clear();
    }
}

/// RFC 793 OPEN, passive only.
///
/// Allocates an endpoint in LISTEN and blocks until the handshake
/// completes.  Returns the endpoint identifier once ESTABLISHED.
pub(crate) fn open_rfc793(
    stack: &Arc<StackInner>,
    local: Endpoint,
    foreign: Option<Endpoint>,
    active: bool,
) -> Result<usize, NetError> {
    if active {
        log::warn!("tcp: active open is not implemented");
        return Err(NetError::NotSupported);
    }
    let mut pcbs = sync::lock(&stack.tcp.pcbs);
    if pcbs
        .iter()
        .any(|pcb| pcb.state != TcpState::Free && pcb.local == local)
    {
        return Err(NetError::AddressInUse);
    }
    let Some(id) = pcbs.iter().position(|pcb| pcb.state == TcpState::Free) else {
        return Err(NetError::NoBufferSpace);
    };
    let ctx = &stack.tcp.ctx[id];
    ctx.clear();
    pcbs[id].reset();
    pcbs[id].state = TcpState::Listen;
    pcbs[id].local = local;
    pcbs[id].foreign = foreign.unwrap_or(Endpoint::ANY);
    log::debug!("tcp: socket {} listening on {}", id, local);

    loop {
        match pcbs[id].state {
            TcpState::Established => return Ok(id),
            // Handshake pending: sleep until segment processing moves the
            // state along.
            TcpState::SynReceived | TcpState::Listen => {
                let (guard, interrupted) = ctx.sleep(pcbs);
                pcbs = guard;
                if interrupted {
                    release(&mut pcbs, id, ctx);
                    return Err(NetError::Interrupted);
                }
            }
            _ => {
                release(&mut pcbs, id, ctx);
                return Err(NetError::NotConnected);
            }
        }
    }
}

/// Blocking send, paced against the peer's advertised window.
///
/// Data goes out in MSS-sized ACK|PSH segments; when the window is
/// exhausted the caller sleeps until new acknowledgments arrive.  Partial
/// progress is reported when interrupted after at least one byte was
/// sent.
pub(crate) fn send(stack: &Arc<StackInner>, id: usize, data: &[u8]) -> Result<usize, NetError> {
    let mut pcbs = pcb_guard(stack, id)?;
    let ctx = &stack.tcp.ctx[id];
    let mut sent = 0usize;
    loop {
        match pcbs[id].state {
            TcpState::Free => return Err(NetError::InvalidHandle),
            TcpState::Established => {}
            TcpState::Closed => {
                if ctx.waiters() == 0 {
                    pcbs[id].reset();
                    ctx.clear();
                }
                return partial(sent, NetError::NotConnected);
            }
            _ => return partial(sent, NetError::NotConnected),
        }
        if sent == data.len() {
            return Ok(sent);
        }
        let pcb = &pcbs[id];
        if pcb.mss == 0 {
            // The outgoing interface's MTU does not leave room for a
            // segment.
            return partial(sent, NetError::InvalidArgument);
        }
        let in_flight = pcb.snd.nxt.wrapping_sub(pcb.snd.una);
        let cap = (pcb.snd.wnd as u32).saturating_sub(in_flight);
        if cap == 0 {
            let (guard, interrupted) = ctx.sleep(pcbs);
            pcbs = guard;
            if interrupted {
                return partial(sent, NetError::Interrupted);
            }
            continue;
        }
        let chunk = (pcb.mss as usize).min(data.len() - sent).min(cap as usize);
        if let Err(err) = output(stack, pcb, FLG_ACK | FLG_PSH, &data[sent..sent + chunk]) {
            return partial(sent, err);
        }
        let pcb = &mut pcbs[id];
        pcb.snd.nxt = pcb.snd.nxt.wrapping_add(chunk as u32);
        sent += chunk;
    }
}

fn partial(sent: usize, err: NetError) -> Result<usize, NetError> {
    if sent > 0 {
        Ok(sent)
    } else {
        Err(err)
    }
}

/// Blocking receive from the in-order buffer.
///
/// Copies up to `buf.len()` bytes, shifts the remainder down, and widens
/// the receive window by the delivered count.
pub(crate) fn receive(stack: &Arc<StackInner>, id: usize, buf: &mut [u8]) -> Result<usize, NetError> {
    let mut pcbs = pcb_guard(stack, id)?;
    let ctx = &stack.tcp.ctx[id];
    loop {
        match pcbs[id].state {
            TcpState::Free => return Err(NetError::InvalidHandle),
            TcpState::Established => {}
            TcpState::Closed => {
                if ctx.waiters() == 0 {
                    pcbs[id].reset();
                    ctx.clear();
                }
                return Err(NetError::NotConnected);
            }
            _ => return Err(NetError::NotConnected),
        }
        let pcb = &mut pcbs[id];
        let buffered = BUF_SIZE - pcb.rcv.wnd as usize;
        if buffered > 0 {
            let n = buf.len().min(buffered);
            buf[..n].copy_from_slice(&pcb.buf[..n]);
            pcb.buf.copy_within(n..buffered, 0);
            pcb.rcv.wnd += n as u16;
            return Ok(n);
        }
        let (guard, interrupted) = ctx.sleep(pcbs);
        pcbs = guard;
        if interrupted {
            return Err(NetError::Interrupted);
        }
    }
}

/// Close the endpoint.
///
/// Interim semantics until graceful close is added: a connection in any
/// synchronized state is reset, and the slot is released (deferred to the
/// last waiter when the context is occupied).
pub(crate) fn close(stack: &Arc<StackInner>, id: usize) -> Result<(), NetError> {
    let mut pcbs = pcb_guard(stack, id)?;
    let ctx = &stack.tcp.ctx[id];
    match pcbs[id].state {
        TcpState::Free => return Err(NetError::InvalidHandle),
        TcpState::Listen | TcpState::Closed => {}
        _ => {
            if let Err(err) = output(stack, &pcbs[id], FLG_RST, &[]) {
                log::debug!("tcp: reset on close failed: {}", err);
            }
        }
    }
    log::debug!("tcp: socket {} closed from {}", id, pcbs[id].state.name());
    release(&mut pcbs, id, ctx);
    Ok(())
}

//! ARP for Ethernet/IPv4: request/reply processing and the neighbor cache.
//!
//! Incoming messages follow the RFC 826 merge-then-reply algorithm split
//! into validation, cache mutation, and reply emission.  The cache is a
//! fixed array of 32 entries with a FREE → INCOMPLETE → RESOLVED lifecycle
//! (STATIC entries are administratively pinned) and timestamp-driven aging:
//! a 1-second sweep frees RESOLVED entries that have not been refreshed for
//! 30 seconds.
//!
//! # Concurrency
//!
//! All cache state sits behind one mutex.  Methods decide under the lock
//! and perform transmission after releasing it, so the cache lock is never
//! held across driver I/O.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::iface::Interface;
use crate::netdev::{DeviceKind, NetDevice};
use crate::stack::StackInner;
use crate::sync;
use crate::types::{EtherType, Ipv4Addr, MacAddr, NetError};

// =============================================================================
// Message format
// =============================================================================

/// Hardware type: Ethernet.
pub const HTYPE_ETHERNET: u16 = 1;
/// Protocol type: IPv4 (the IPv4 EtherType).
pub const PTYPE_IPV4: u16 = EtherType::Ipv4 as u16;
/// Hardware address length for Ethernet.
pub const HLEN_ETHERNET: u8 = 6;
/// Protocol address length for IPv4.
pub const PLEN_IPV4: u8 = 4;
/// Operation codes.
pub const OP_REQUEST: u16 = 1;
pub const OP_REPLY: u16 = 2;
/// Total message length for the Ethernet/IPv4 pair.
pub const MESSAGE_LEN: usize = 28;

/// Fields of a validated Ethernet/IPv4 ARP message.
struct Message {
    op: u16,
    sha: MacAddr,
    spa: Ipv4Addr,
    tpa: Ipv4Addr,
}

fn parse(data: &[u8]) -> Option<Message> {
    if data.len() < MESSAGE_LEN {
        return None;
    }
    let htype = u16::from_be_bytes([data[0], data[1]]);
    let ptype = u16::from_be_bytes([data[2], data[3]]);
    if htype != HTYPE_ETHERNET || data[4] != HLEN_ETHERNET {
        return None;
    }
    if ptype != PTYPE_IPV4 || data[5] != PLEN_IPV4 {
        return None;
    }
    let mut sha = [0u8; 6];
    sha.copy_from_slice(&data[8..14]);
    let mut spa = [0u8; 4];
    spa.copy_from_slice(&data[14..18]);
    let mut tpa = [0u8; 4];
    tpa.copy_from_slice(&data[24..28]);
    Some(Message {
        op: u16::from_be_bytes([data[6], data[7]]),
        sha: MacAddr(sha),
        spa: Ipv4Addr(spa),
        tpa: Ipv4Addr(tpa),
    })
}

fn build(op: u16, sha: MacAddr, spa: Ipv4Addr, tha: MacAddr, tpa: Ipv4Addr) -> [u8; MESSAGE_LEN] {
    let mut msg = [0u8; MESSAGE_LEN];
    msg[0..2].copy_from_slice(&HTYPE_ETHERNET.to_be_bytes());
    msg[2..4].copy_from_slice(&PTYPE_IPV4.to_be_bytes());
    msg[4] = HLEN_ETHERNET;
    msg[5] = PLEN_IPV4;
    msg[6..8].copy_from_slice(&op.to_be_bytes());
    msg[8..14].copy_from_slice(&sha.0);
    msg[14..18].copy_from_slice(&spa.0);
    msg[18..24].copy_from_slice(&tha.0);
    msg[24..28].copy_from_slice(&tpa.0);
    msg
}

// =============================================================================
// Neighbor cache
// =============================================================================

/// Number of cache entries.
const CACHE_SIZE: usize = 32;

/// A RESOLVED entry untouched this long is freed by the sweep.
pub const CACHE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ArpState {
    Free,
    Incomplete,
    Resolved,
    Static,
}

struct ArpEntry {
    state: ArpState,
    pa: Ipv4Addr,
    ha: MacAddr,
    timestamp: Instant,
}

impl ArpEntry {
    fn clear(&mut self) {
        self.state = ArpState::Free;
        self.pa = Ipv4Addr::UNSPECIFIED;
        self.ha = MacAddr::ZERO;
    }
}

/// Outcome of [`resolve`]: the ERROR case is the `Err` side of the result.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resolution {
    /// Hardware address known; copied out for the caller.
    Found(MacAddr),
    /// Resolution in progress; a request was (re)broadcast.
    Incomplete,
}

/// Fixed-capacity ARP cache.
pub struct ArpCache {
    entries: Mutex<[ArpEntry; CACHE_SIZE]>,
}

impl ArpCache {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            entries: Mutex::new(std::array::from_fn(|_| ArpEntry {
                state: ArpState::Free,
                pa: Ipv4Addr::UNSPECIFIED,
                ha: MacAddr::ZERO,
                timestamp: now,
            })),
        }
    }

    /// Merge step: refresh an existing entry for `pa`.
    ///
    /// Returns `true` when an entry was updated (the RFC 826 merge flag).
    /// An INCOMPLETE entry becomes RESOLVED; RESOLVED and STATIC entries
    /// get the new hardware address and a fresh timestamp.
    fn update(&self, pa: Ipv4Addr, ha: MacAddr) -> bool {
        let mut entries = sync::lock(&self.entries);
        let Some(entry) = entries
            .iter_mut()
            .find(|e| e.state != ArpState::Free && e.pa == pa)
        else {
            return false;
        };
        if entry.state == ArpState::Incomplete {
            entry.state = ArpState::Resolved;
        }
        entry.ha = ha;
        entry.timestamp = Instant::now();
        log::debug!("arp: updated {} -> {}", pa, ha);
        true
    }

    /// Insert an entry in the given state, evicting the entry with the
    /// oldest timestamp when no slot is FREE.
    fn insert(&self, state: ArpState, pa: Ipv4Addr, ha: MacAddr) {
        let mut entries = sync::lock(&self.entries);
        let mut index = 0;
        for (i, entry) in entries.iter().enumerate() {
            if entry.state == ArpState::Free {
                index = i;
                break;
            }
            if entry.timestamp < entries[index].timestamp {
                index = i;
            }
        }
        let slot = &mut entries[index];
        if slot.state != ArpState::Free {
            log::debug!("arp: cache full, evicting {}", slot.pa);
        }
        slot.state = state;
        slot.pa = pa;
        slot.ha = ha;
        slot.timestamp = Instant::now();
        log::debug!("arp: inserted {} -> {} ({:?})", pa, ha, state);
    }

    /// Insert a STATIC entry, exempt from aging.
    pub fn insert_static(&self, pa: Ipv4Addr, ha: MacAddr) {
        self.insert(ArpState::Static, pa, ha);
    }

    /// Snapshot the state and hardware address recorded for `pa`.
    fn lookup(&self, pa: Ipv4Addr) -> Option<(ArpState, MacAddr)> {
        let entries = sync::lock(&self.entries);
        entries
            .iter()
            .find(|e| e.state != ArpState::Free && e.pa == pa)
            .map(|e| (e.state, e.ha))
    }

    /// Periodic sweep: free RESOLVED entries whose timestamp is older than
    /// [`CACHE_TIMEOUT`] relative to `now`.  STATIC entries are exempt.
    pub fn sweep(&self, now: Instant) {
        let mut entries = sync::lock(&self.entries);
        for entry in entries.iter_mut() {
            if entry.state == ArpState::Resolved
                && now.duration_since(entry.timestamp) >= CACHE_TIMEOUT
            {
                log::debug!("arp: timed out {} -> {}", entry.pa, entry.ha);
                entry.clear();
            }
        }
    }
}

impl Default for ArpCache {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Input processing
// =============================================================================

/// Protocol handler for EtherType 0x0806, run from the soft-IRQ drain.
///
/// RFC 826 order: merge an existing entry for the sender first; if we are
/// the target and no merge happened, learn the sender; finally answer
/// requests directed at our unicast address.
pub fn input(stack: &Arc<StackInner>, data: &[u8], dev: &Arc<NetDevice>) {
    let Some(msg) = parse(data) else {
        log::debug!("{}: malformed arp message ({} bytes)", dev.name, data.len());
        return;
    };
    let merge = stack.arp.update(msg.spa, msg.sha);

    let Some(iface) = dev.interface() else {
        return;
    };
    if iface.unicast != msg.tpa {
        return;
    }
    if !merge {
        stack.arp.insert(ArpState::Resolved, msg.spa, msg.sha);
    }
    if msg.op == OP_REQUEST {
        log::debug!("{}: arp request for {} from {}", dev.name, msg.tpa, msg.spa);
        reply(dev, &iface, msg.sha, msg.spa);
    }
}

/// Emit a REPLY carrying our hardware/protocol pair, directed at the
/// original sender.
fn reply(dev: &Arc<NetDevice>, iface: &Interface, tha: MacAddr, tpa: Ipv4Addr) {
    let msg = build(OP_REPLY, dev.hwaddr, iface.unicast, tha, tpa);
    if let Err(err) = dev.transmit(EtherType::Arp.as_u16(), &msg, &tha.0) {
        log::warn!("{}: arp reply failed: {}", dev.name, err);
    }
}

/// Broadcast a REQUEST for `tpa` out of `iface`'s device.
fn request(dev: &Arc<NetDevice>, iface: &Interface, tpa: Ipv4Addr) {
    let msg = build(OP_REQUEST, dev.hwaddr, iface.unicast, MacAddr::ZERO, tpa);
    if let Err(err) = dev.transmit(EtherType::Arp.as_u16(), &msg, &dev.broadcast.0) {
        log::warn!("{}: arp request failed: {}", dev.name, err);
    }
}

// =============================================================================
// Resolve
// =============================================================================

/// Resolve `pa` to a hardware address through `iface`.
///
/// `Found` copies the address to the caller.  `Incomplete` means a REQUEST
/// was broadcast (again, if an INCOMPLETE entry already existed) and the
/// caller should report the datagram as undelivered.  `Err` is returned
/// when the interface/device pair is not Ethernet over IP.
pub fn resolve(
    stack: &Arc<StackInner>,
    iface: &Arc<Interface>,
    pa: Ipv4Addr,
) -> Result<Resolution, NetError> {
    let dev = iface.device().ok_or(NetError::AddressFamilyNotSupported)?;
    if dev.kind != DeviceKind::Ethernet {
        return Err(NetError::AddressFamilyNotSupported);
    }

    match stack.arp.lookup(pa) {
        Some((ArpState::Resolved, ha)) | Some((ArpState::Static, ha)) => {
            Ok(Resolution::Found(ha))
        }
        Some((ArpState::Incomplete, _)) => {
            // Re-transmit in case the first request was lost.
            request(&dev, iface, pa);
            Ok(Resolution::Incomplete)
        }
        _ => {
            stack.arp.insert(ArpState::Incomplete, pa, MacAddr::ZERO);
            request(&dev, iface, pa);
            Ok(Resolution::Incomplete)
        }
    }
}

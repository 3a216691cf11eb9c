//! Capture/inject device driver for tests.
//!
//! `transmit` records `(kind, payload, dst)` tuples into a shared log the
//! test inspects; ingress is injected by calling the protocol handlers
//! directly, so no interrupt thread is required.

use std::sync::{Arc, Mutex};

use crate::netdev::{DeviceConfig, DeviceDriver, DeviceFlags, DeviceKind, NetDevice};
use crate::sync;
use crate::types::{MacAddr, NetError};

/// Shared transmit log: `(kind, payload, dst)` per frame.
pub type TxLog = Arc<Mutex<Vec<(u16, Vec<u8>, Vec<u8>)>>>;

pub struct TestDriver {
    log: TxLog,
    mtu: usize,
    flags: DeviceFlags,
    hwaddr: MacAddr,
}

impl TestDriver {
    /// Ethernet-like device: MTU 1500, BROADCAST | NEED_ARP.
    pub fn new() -> Self {
        Self {
            log: Arc::new(Mutex::new(Vec::new())),
            mtu: crate::ethernet::PAYLOAD_MAX,
            flags: DeviceFlags::BROADCAST | DeviceFlags::NEED_ARP,
            hwaddr: MacAddr([0x02, 0x00, 0x5e, 0x00, 0x00, 0x01]),
        }
    }

    /// Ethernet-like device that skips ARP resolution.
    pub fn plain() -> Self {
        let mut driver = Self::new();
        driver.flags = DeviceFlags::BROADCAST;
        driver
    }

    pub fn with_mtu(mut self, mtu: usize) -> Self {
        self.mtu = mtu;
        self
    }

    pub fn log(&self) -> TxLog {
        Arc::clone(&self.log)
    }
}

impl DeviceDriver for TestDriver {
    fn config(&self) -> DeviceConfig {
        DeviceConfig {
            kind: DeviceKind::Ethernet,
            mtu: self.mtu,
            header_len: crate::ethernet::HEADER_LEN,
            addr_len: crate::ethernet::ADDR_LEN,
            flags: self.flags,
            hwaddr: self.hwaddr,
            broadcast: MacAddr::BROADCAST,
        }
    }

    fn transmit(
        &self,
        _dev: &NetDevice,
        kind: u16,
        payload: &[u8],
        dst: &[u8],
    ) -> Result<(), NetError> {
        sync::lock(&self.log).push((kind, payload.to_vec(), dst.to_vec()));
        Ok(())
    }
}

/// Assemble a single-device stack around `driver` with the given
/// interface address.  Returns the stack handle, the driver's transmit
/// log, and the device.
pub fn build_stack(
    driver: TestDriver,
    unicast: crate::types::Ipv4Addr,
    netmask: crate::types::Ipv4Addr,
) -> (crate::stack::NetStack, TxLog, Arc<NetDevice>) {
    let log = driver.log();
    let mut builder = crate::stack::NetStack::builder();
    let index = builder.device(Box::new(driver)).unwrap();
    builder.interface(index, unicast, netmask).unwrap();
    let stack = builder.build().unwrap();
    let dev = stack.device(index).unwrap();
    // Devices stay closed until run(); tests drive ingress directly, so
    // bring the device up by hand.
    dev.open().unwrap();
    (stack, log, dev)
}

/// Craft a valid IPv4 datagram around `payload` (no options, no
/// fragmentation).
pub fn build_ipv4(
    proto: crate::types::IpProtocol,
    src: crate::types::Ipv4Addr,
    dst: crate::types::Ipv4Addr,
    payload: &[u8],
) -> Vec<u8> {
    let total = (crate::ipv4::HEADER_LEN + payload.len()) as u16;
    let mut datagram = vec![
        0x45, 0x00, 0x00, 0x00, // version/IHL, TOS, total length
        0x00, 0x2a, 0x00, 0x00, // id, flags/offset
        0x40, 0x00, 0x00, 0x00, // TTL, protocol, checksum
    ];
    datagram[2..4].copy_from_slice(&total.to_be_bytes());
    datagram[9] = proto.as_u8();
    datagram.extend_from_slice(&src.0);
    datagram.extend_from_slice(&dst.0);
    let sum = crate::checksum::checksum(&datagram, 0);
    datagram[10..12].copy_from_slice(&sum.to_be_bytes());
    datagram.extend_from_slice(payload);
    datagram
}

/// Pop every captured frame of the given kind.
pub fn frames_of(log: &TxLog, kind: u16) -> Vec<(Vec<u8>, Vec<u8>)> {
    sync::lock(log)
        .iter()
        .filter(|(k, _, _)| *k == kind)
        .map(|(_, payload, dst)| (payload.clone(), dst.clone()))
        .collect()
}

/// Clear the capture log.
pub fn clear(log: &TxLog) {
    sync::lock(log).clear();
}

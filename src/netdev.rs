//! Network device abstraction: driver trait, device records, and flags.
//!
//! This module establishes the boundary between drivers (which move bytes)
//! and the protocol stack (which understands protocols).  A driver
//! implements [`DeviceDriver`]; registration wraps it in a [`NetDevice`]
//! carrying the stack-visible identity (index, `net<index>` name, MTU,
//! flags, hardware addresses) and the assigned interrupt line.
//!
//! # Concurrency
//!
//! All driver trait methods take `&self`; implementations use interior
//! mutability for their private state.  `transmit` may be called from any
//! application thread; `isr` runs only on the interrupt thread.  The UP
//! flag is guarded by the device's flag mutex.

use std::fmt;
use std::sync::{Arc, Mutex};

use bitflags::bitflags;

use crate::iface::Interface;
use crate::irq::IrqController;
use crate::stack::StackInner;
use crate::sync;
use crate::types::{DevIndex, MacAddr, NetError};

bitflags! {
    /// Device flag bits.
    ///
    /// `UP` is the only flag toggled at runtime (by open/close); the rest
    /// describe static driver properties.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct DeviceFlags: u16 {
        /// Device is open and may transmit.
        const UP        = 1 << 0;
        /// In-process loopback; frames never leave the host.
        const LOOPBACK  = 1 << 1;
        /// Supports link-level broadcast.
        const BROADCAST = 1 << 2;
        /// Point-to-point link.
        const P2P       = 1 << 3;
        /// Unicast transmission requires ARP resolution.
        const NEED_ARP  = 1 << 4;
    }
}

/// Device type tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceKind {
    Loopback,
    Ethernet,
}

/// Static device identity supplied by the driver at registration.
#[derive(Clone, Copy, Debug)]
pub struct DeviceConfig {
    pub kind: DeviceKind,
    /// Payload bytes per transmission, excluding the link header.
    pub mtu: usize,
    /// Link header length in bytes.
    pub header_len: usize,
    /// Hardware address length in bytes.
    pub addr_len: usize,
    pub flags: DeviceFlags,
    pub hwaddr: MacAddr,
    pub broadcast: MacAddr,
}

/// Per-device transmit/receive counters.
#[derive(Default)]
pub struct DeviceStats {
    tx_packets: std::sync::atomic::AtomicU64,
    tx_bytes: std::sync::atomic::AtomicU64,
    rx_packets: std::sync::atomic::AtomicU64,
    rx_bytes: std::sync::atomic::AtomicU64,
    rx_dropped: std::sync::atomic::AtomicU64,
}

impl DeviceStats {
    pub fn count_tx(&self, bytes: usize) {
        use std::sync::atomic::Ordering::Relaxed;
        self.tx_packets.fetch_add(1, Relaxed);
        self.tx_bytes.fetch_add(bytes as u64, Relaxed);
    }

    pub fn count_rx(&self, bytes: usize) {
        use std::sync::atomic::Ordering::Relaxed;
        self.rx_packets.fetch_add(1, Relaxed);
        self.rx_bytes.fetch_add(bytes as u64, Relaxed);
    }

    pub fn count_rx_dropped(&self) {
        use std::sync::atomic::Ordering::Relaxed;
        self.rx_dropped.fetch_add(1, Relaxed);
    }
}

impl fmt::Display for DeviceStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use std::sync::atomic::Ordering::Relaxed;
        write!(
            f,
            "tx: {} pkts/{} bytes, rx: {} pkts/{} bytes, drop: {}",
            self.tx_packets.load(Relaxed),
            self.tx_bytes.load(Relaxed),
            self.rx_packets.load(Relaxed),
            self.rx_bytes.load(Relaxed),
            self.rx_dropped.load(Relaxed),
        )
    }
}

/// Capability set implemented by every network driver.
pub trait DeviceDriver: Send + Sync {
    /// Static identity used to build the [`NetDevice`] record.
    fn config(&self) -> DeviceConfig;

    /// Bring the device up.  Called by [`NetDevice::open`].
    fn open(&self, _dev: &Arc<NetDevice>) -> Result<(), NetError> {
        Ok(())
    }

    /// Bring the device down.  Called by [`NetDevice::close`].
    fn close(&self, _dev: &Arc<NetDevice>) -> Result<(), NetError> {
        Ok(())
    }

    /// Transmit one frame payload.
    ///
    /// `kind` is the upper-protocol key (EtherType for Ethernet devices),
    /// `dst` the destination hardware address (`addr_len` bytes; empty for
    /// headerless devices).
    fn transmit(
        &self,
        dev: &NetDevice,
        kind: u16,
        payload: &[u8],
        dst: &[u8],
    ) -> Result<(), NetError>;

    /// Interrupt service routine, invoked from the interrupt thread when
    /// the device's line fires.  Drains pending receive work and feeds it
    /// to [`StackInner::input`].
    fn isr(&self, _dev: &Arc<NetDevice>, _stack: &Arc<StackInner>) {}
}

/// A registered network device.
pub struct NetDevice {
    pub index: DevIndex,
    /// `net<index>`, assigned at registration.
    pub name: String,
    pub kind: DeviceKind,
    pub mtu: usize,
    pub header_len: usize,
    pub addr_len: usize,
    pub hwaddr: MacAddr,
    pub broadcast: MacAddr,
    flags: Mutex<DeviceFlags>,
    driver: Box<dyn DeviceDriver>,
    /// Interrupt line assigned at registration.
    pub(crate) irq: u8,
    pub(crate) intr: Arc<IrqController>,
    iface: Mutex<Option<Arc<Interface>>>,
    pub stats: DeviceStats,
}

impl NetDevice {
    pub(crate) fn new(
        index: DevIndex,
        driver: Box<dyn DeviceDriver>,
        irq: u8,
        intr: Arc<IrqController>,
    ) -> Self {
        let config = driver.config();
        Self {
            index,
            name: format!("net{}", index.0),
            kind: config.kind,
            mtu: config.mtu,
            header_len: config.header_len,
            addr_len: config.addr_len,
            hwaddr: config.hwaddr,
            broadcast: config.broadcast,
            flags: Mutex::new(config.flags - DeviceFlags::UP),
            driver,
            irq,
            intr,
            iface: Mutex::new(None),
            stats: DeviceStats::default(),
        }
    }

    pub fn flags(&self) -> DeviceFlags {
        *sync::lock(&self.flags)
    }

    pub fn is_up(&self) -> bool {
        self.flags().contains(DeviceFlags::UP)
    }

    /// Open the device: driver `open`, then set UP.  Rejects re-open.
    pub fn open(self: &Arc<Self>) -> Result<(), NetError> {
        let mut flags = sync::lock(&self.flags);
        if flags.contains(DeviceFlags::UP) {
            return Err(NetError::AlreadyExists);
        }
        self.driver.open(self)?;
        flags.insert(DeviceFlags::UP);
        log::info!("{}: up, {}, mtu {}", self.name, self.hwaddr, self.mtu);
        Ok(())
    }

    /// Close the device: driver `close`, then clear UP.  Rejects
    /// close-when-down.
    pub fn close(self: &Arc<Self>) -> Result<(), NetError> {
        let mut flags = sync::lock(&self.flags);
        if !flags.contains(DeviceFlags::UP) {
            return Err(NetError::DeviceDown);
        }
        self.driver.close(self)?;
        flags.remove(DeviceFlags::UP);
        log::info!("{}: down", self.name);
        Ok(())
    }

    /// Transmit `payload` as upper-protocol `kind` to hardware address
    /// `dst`.  Rejects when the device is down or the payload exceeds the
    /// MTU.
    pub fn transmit(&self, kind: u16, payload: &[u8], dst: &[u8]) -> Result<(), NetError> {
        if !self.is_up() {
            log::debug!("{}: transmit while down", self.name);
            return Err(NetError::DeviceDown);
        }
        if payload.len() > self.mtu {
            log::debug!(
                "{}: payload too long ({} > mtu {})",
                self.name,
                payload.len(),
                self.mtu
            );
            return Err(NetError::MessageTooLong);
        }
        self.driver.transmit(self, kind, payload, dst)?;
        self.stats.count_tx(payload.len());
        Ok(())
    }

    /// Raise this device's interrupt line.  Callable from any thread.
    pub fn raise_irq(&self) {
        self.intr.raise(self.irq);
    }

    pub(crate) fn isr(self: &Arc<Self>, stack: &Arc<StackInner>) {
        self.driver.isr(self, stack);
    }

    /// Attach an IP interface.  Rejects a second interface of the same
    /// family.
    pub fn attach(self: &Arc<Self>, iface: Arc<Interface>) -> Result<(), NetError> {
        let mut slot = sync::lock(&self.iface);
        if slot.is_some() {
            return Err(NetError::AlreadyExists);
        }
        iface.bind_device(self);
        log::info!(
            "{}: interface {}/{}",
            self.name,
            iface.unicast,
            iface.netmask.prefix_len()
        );
        *slot = Some(iface);
        Ok(())
    }

    /// The attached IP interface, if any.
    pub fn interface(&self) -> Option<Arc<Interface>> {
        sync::lock(&self.iface).clone()
    }
}

impl fmt::Debug for NetDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({:?}, {}, mtu {}, {:?})",
            self.name,
            self.kind,
            self.hwaddr,
            self.mtu,
            self.flags()
        )
    }
}

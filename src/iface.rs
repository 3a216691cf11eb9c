//! IP interface: the layer-3 identity attached to a device.

use std::fmt;
use std::sync::{Arc, OnceLock, Weak};

use crate::netdev::NetDevice;
use crate::types::Ipv4Addr;

/// An IPv4 interface.  Owns a unicast address, a netmask, and the derived
/// subnet broadcast (`unicast | !netmask`).
pub struct Interface {
    pub unicast: Ipv4Addr,
    pub netmask: Ipv4Addr,
    pub broadcast: Ipv4Addr,
    dev: OnceLock<Weak<NetDevice>>,
}

impl Interface {
    pub fn new(unicast: Ipv4Addr, netmask: Ipv4Addr) -> Arc<Self> {
        let broadcast = Ipv4Addr::from_u32_be(unicast.to_u32_be() | !netmask.to_u32_be());
        Arc::new(Self {
            unicast,
            netmask,
            broadcast,
            dev: OnceLock::new(),
        })
    }

    /// `true` if `addr` is on this interface's subnet.
    #[inline]
    pub fn is_local(&self, addr: Ipv4Addr) -> bool {
        let mask = self.netmask.to_u32_be();
        (addr.to_u32_be() & mask) == (self.unicast.to_u32_be() & mask)
    }

    /// The device this interface is attached to.
    ///
    /// Interfaces are attached during startup and devices live for the
    /// stack's lifetime, so an attached interface always resolves.
    pub fn device(&self) -> Option<Arc<NetDevice>> {
        self.dev.get().and_then(Weak::upgrade)
    }

    pub(crate) fn bind_device(&self, dev: &Arc<NetDevice>) {
        let _ = self.dev.set(Arc::downgrade(dev));
    }
}

impl fmt::Debug for Interface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} brd {}",
            self.unicast,
            self.netmask.prefix_len(),
            self.broadcast
        )
    }
}

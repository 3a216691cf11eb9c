//! Stack assembly and lifecycle: the protocol registry, the soft-IRQ
//! ingress drain, and the interrupt thread.
//!
//! A stack is assembled with [`StackBuilder`] during startup — devices,
//! interfaces, routes, and protocol registrations are all startup-only —
//! and frozen into a [`NetStack`] handle.  [`NetStack::run`] opens every
//! device and starts two threads:
//!
//! - the **interrupt thread** blocks on the in-process signal set and
//!   dispatches raised lines in ascending order: soft-IRQ drain, event
//!   broadcast, timer tick, then device service routines;
//! - the **ticker thread** raises the timer line every
//!   [`TICK_INTERVAL`](crate::irq::TICK_INTERVAL).
//!
//! Hardware-level ingress enters through [`StackInner::input`], which
//! copies the payload onto the matching protocol's queue and raises the
//! soft-IRQ; the drain then invokes each protocol handler once per entry,
//! single-threaded, preserving per-protocol arrival order.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::arp::{self, ArpCache};
use crate::event::EventHub;
use crate::icmp;
use crate::iface::Interface;
use crate::ipv4::{self, IpLayer};
use crate::irq::{self, IrqController};
use crate::netdev::{DeviceDriver, NetDevice};
use crate::route::Route;
use crate::sync;
use crate::tcp::{self, TcpLayer};
use crate::timer::TimerList;
use crate::types::{DevIndex, Endpoint, IpProtocol, Ipv4Addr, MacAddr, NetError};
use crate::udp::{self, UdpLayer};

/// Sweep interval for the ARP cache timer.
const ARP_TIMER_INTERVAL: Duration = Duration::from_secs(1);

/// Per-protocol ingress queue bound.
const INGRESS_QUEUE_LIMIT: usize = 256;

/// Layer-2 protocol handler: `(stack, payload, device)`.
pub type ProtocolHandler = fn(&Arc<StackInner>, &[u8], &Arc<NetDevice>);

struct IngressEntry {
    dev: Arc<NetDevice>,
    data: Vec<u8>,
}

struct ProtocolEntry {
    kind: u16,
    name: &'static str,
    queue: Mutex<VecDeque<IngressEntry>>,
    handler: ProtocolHandler,
}

/// Shared stack state.  Owned by [`NetStack`] and by the threads spawned
/// in [`run`](NetStack::run).
pub struct StackInner {
    devices: Vec<Arc<NetDevice>>,
    protocols: Vec<ProtocolEntry>,
    pub(crate) intr: Arc<IrqController>,
    pub(crate) timers: TimerList,
    pub(crate) events: EventHub,
    pub(crate) ip: IpLayer,
    pub(crate) arp: ArpCache,
    pub(crate) udp: UdpLayer,
    pub(crate) tcp: TcpLayer,
    running: AtomicBool,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl StackInner {
    /// Hardware-level ingress entry point, callable from any driver
    /// context.
    ///
    /// Copies the payload and device reference onto the queue registered
    /// for `kind` and raises the soft-IRQ.  Unknown types are silently
    /// dropped.
    pub fn input(&self, kind: u16, data: &[u8], dev: &Arc<NetDevice>) {
        let Some(entry) = self.protocols.iter().find(|p| p.kind == kind) else {
            log::trace!("{}: no protocol for type 0x{:04x}", dev.name, kind);
            return;
        };
        {
            let mut queue = sync::lock(&entry.queue);
            if queue.len() >= INGRESS_QUEUE_LIMIT {
                log::warn!("{}: {} ingress queue full", dev.name, entry.name);
                return;
            }
            queue.push_back(IngressEntry {
                dev: Arc::clone(dev),
                data: data.to_vec(),
            });
        }
        self.intr.raise(irq::IRQ_SOFT);
    }

    /// Soft-IRQ: drain every protocol queue in FIFO order.
    ///
    /// Runs only on the interrupt thread; at most one drain is in flight
    /// at any time.
    pub(crate) fn softirq(self: &Arc<Self>) {
        for entry in &self.protocols {
            loop {
                let item = sync::lock(&entry.queue).pop_front();
                let Some(item) = item else {
                    break;
                };
                (entry.handler)(self, &item.data, &item.dev);
            }
        }
    }

    /// A registered device by index.
    pub fn device(&self, index: DevIndex) -> Option<Arc<NetDevice>> {
        self.devices.get(index.0).cloned()
    }

    fn dispatch(self: &Arc<Self>, mask: u64) {
        for line in 0..irq::IRQ_LINES {
            if mask & (1u64 << line) == 0 {
                continue;
            }
            match line {
                irq::IRQ_SHUTDOWN => {}
                irq::IRQ_SOFT => self.softirq(),
                irq::IRQ_EVENT => self.events.dispatch(self),
                irq::IRQ_TIMER => self.timers.tick(self),
                _ => {
                    let index = (line - irq::IRQ_BASE) as usize;
                    if let Some(dev) = self.devices.get(index) {
                        dev.isr(self);
                    }
                }
            }
        }
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Startup-phase stack assembly.
///
/// Registration order is dispatch order for protocols and interrupt-line
/// order for devices.
pub struct StackBuilder {
    intr: Arc<IrqController>,
    devices: Vec<Arc<NetDevice>>,
    protocols: Vec<ProtocolEntry>,
    ip: IpLayer,
}

impl StackBuilder {
    pub fn new() -> Self {
        Self {
            intr: Arc::new(IrqController::new()),
            devices: Vec::new(),
            protocols: Vec::new(),
            ip: IpLayer::new(),
        }
    }

    /// Register a device, assigning the next index, the `net<index>`
    /// name, and an interrupt line.
    pub fn device(&mut self, driver: Box<dyn DeviceDriver>) -> Result<DevIndex, NetError> {
        if self.devices.len() >= (irq::IRQ_LINES - irq::IRQ_BASE) as usize {
            return Err(NetError::NoBufferSpace);
        }
        let index = DevIndex(self.devices.len());
        let line = irq::IRQ_BASE + index.0 as u8;
        let dev = Arc::new(NetDevice::new(index, driver, line, Arc::clone(&self.intr)));
        log::info!("registered {:?}, irq {}", dev, line);
        self.devices.push(dev);
        Ok(index)
    }

    /// Attach an IP interface to a device and install its connected
    /// route.
    pub fn interface(
        &mut self,
        index: DevIndex,
        unicast: Ipv4Addr,
        netmask: Ipv4Addr,
    ) -> Result<(), NetError> {
        let dev = self
            .devices
            .get(index.0)
            .cloned()
            .ok_or(NetError::InvalidHandle)?;
        let iface = Interface::new(unicast, netmask);
        dev.attach(Arc::clone(&iface))?;
        self.ip.routes.add(Route {
            network: Ipv4Addr::from_u32_be(unicast.to_u32_be() & netmask.to_u32_be()),
            netmask,
            nexthop: Ipv4Addr::UNSPECIFIED,
            iface,
        });
        Ok(())
    }

    /// Install a route through `index`'s interface.
    pub fn route(
        &mut self,
        network: Ipv4Addr,
        netmask: Ipv4Addr,
        nexthop: Ipv4Addr,
        index: DevIndex,
    ) -> Result<(), NetError> {
        let dev = self.devices.get(index.0).ok_or(NetError::InvalidHandle)?;
        let iface = dev.interface().ok_or(NetError::AddressNotAvailable)?;
        self.ip.routes.add(Route {
            network,
            netmask,
            nexthop,
            iface,
        });
        Ok(())
    }

    /// Install the default route through `gateway`.
    pub fn default_gateway(&mut self, gateway: Ipv4Addr, index: DevIndex) -> Result<(), NetError> {
        self.route(
            Ipv4Addr::UNSPECIFIED,
            Ipv4Addr::UNSPECIFIED,
            gateway,
            index,
        )
    }

    /// Register a layer-2 protocol with its own ingress queue.  Duplicate
    /// EtherType keys are rejected.
    pub fn protocol(
        &mut self,
        kind: u16,
        name: &'static str,
        handler: ProtocolHandler,
    ) -> Result<(), NetError> {
        if self.protocols.iter().any(|p| p.kind == kind) {
            return Err(NetError::AlreadyExists);
        }
        self.protocols.push(ProtocolEntry {
            kind,
            name,
            queue: Mutex::new(VecDeque::new()),
            handler,
        });
        Ok(())
    }

    /// Freeze the configuration and wire up the standard protocol suite:
    /// ARP and IPv4 at layer 2, ICMP/UDP/TCP above IP, the ARP cache
    /// sweep timer, and the cancellation event handlers for both
    /// transport layers.
    pub fn build(mut self) -> Result<NetStack, NetError> {
        self.protocol(crate::types::EtherType::Arp.as_u16(), "arp", arp::input)?;
        self.protocol(crate::types::EtherType::Ipv4.as_u16(), "ip", ipv4::input)?;
        self.ip.register_protocol(IpProtocol::Icmp, "icmp", icmp::input)?;
        self.ip.register_protocol(IpProtocol::Udp, "udp", udp::input)?;
        self.ip.register_protocol(IpProtocol::Tcp, "tcp", tcp::input)?;

        let timers = TimerList::new();
        timers.register(
            ARP_TIMER_INTERVAL,
            Box::new(|stack: &Arc<StackInner>| stack.arp.sweep(Instant::now())),
        );

        let events = EventHub::new();
        events.subscribe(Box::new(|stack: &Arc<StackInner>| {
            stack.udp.interrupt_all();
        }));
        events.subscribe(Box::new(|stack: &Arc<StackInner>| {
            stack.tcp.interrupt_all();
        }));

        Ok(NetStack {
            inner: Arc::new(StackInner {
                devices: self.devices,
                protocols: self.protocols,
                intr: self.intr,
                timers,
                events,
                ip: self.ip,
                arp: ArpCache::new(),
                udp: UdpLayer::new(),
                tcp: TcpLayer::new(),
                running: AtomicBool::new(false),
                threads: Mutex::new(Vec::new()),
            }),
        })
    }
}

impl Default for StackBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// NetStack
// =============================================================================

/// Handle to a running (or runnable) stack.  Clones share the same stack.
#[derive(Clone)]
pub struct NetStack {
    inner: Arc<StackInner>,
}

impl NetStack {
    pub fn builder() -> StackBuilder {
        StackBuilder::new()
    }

    pub(crate) fn inner(&self) -> &Arc<StackInner> {
        &self.inner
    }

    /// Open every device and start the interrupt machinery.
    pub fn run(&self) -> Result<(), NetError> {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            return Err(NetError::AlreadyExists);
        }
        for dev in &self.inner.devices {
            dev.open()?;
        }

        let intr_stack = Arc::clone(&self.inner);
        let intr_thread = std::thread::Builder::new()
            .name("tapstack-intr".into())
            .spawn(move || {
                log::debug!("interrupt thread running");
                loop {
                    let mask = intr_stack.intr.wait();
                    // Service everything that was raised together with a
                    // shutdown (the cancellation event in particular)
                    // before exiting.
                    intr_stack.dispatch(mask);
                    if mask & (1u64 << irq::IRQ_SHUTDOWN) != 0 {
                        break;
                    }
                }
                log::debug!("interrupt thread terminated");
            })
            .map_err(|_| NetError::Io)?;

        let tick_stack = Arc::clone(&self.inner);
        let ticker = std::thread::Builder::new()
            .name("tapstack-tick".into())
            .spawn(move || {
                while tick_stack.running.load(Ordering::SeqCst) {
                    std::thread::sleep(irq::TICK_INTERVAL);
                    tick_stack.intr.raise(irq::IRQ_TIMER);
                }
            })
            .map_err(|_| NetError::Io)?;

        let mut threads = sync::lock(&self.inner.threads);
        threads.push(intr_thread);
        threads.push(ticker);
        log::info!("stack running, {} devices", self.inner.devices.len());
        Ok(())
    }

    /// Broadcast the process-wide event, interrupting every blocking
    /// socket call.
    pub fn interrupt(&self) {
        self.inner.intr.raise(irq::IRQ_EVENT);
    }

    /// Stop the stack: interrupt blockers, terminate the interrupt
    /// thread, join both threads, and close every device.
    pub fn shutdown(&self) {
        if !self.inner.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.inner.intr.raise(irq::IRQ_EVENT);
        self.inner.intr.raise(irq::IRQ_SHUTDOWN);
        let threads: Vec<_> = sync::lock(&self.inner.threads).drain(..).collect();
        for handle in threads {
            let _ = handle.join();
        }
        for dev in &self.inner.devices {
            if dev.is_up() {
                if let Err(err) = dev.close() {
                    log::warn!("{}: close failed: {}", dev.name, err);
                }
            }
        }
        log::info!("stack stopped");
    }

    /// A registered device by index.
    pub fn device(&self, index: DevIndex) -> Option<Arc<NetDevice>> {
        self.inner.device(index)
    }

    /// Install a static ARP entry, exempt from cache aging.
    pub fn arp_static(&self, pa: Ipv4Addr, ha: MacAddr) {
        self.inner.arp.insert_static(pa, ha);
    }

    // --- UDP -----------------------------------------------------------------

    /// Allocate a UDP endpoint and return its handle.
    pub fn udp_open(&self) -> Result<usize, NetError> {
        udp::open(&self.inner)
    }

    /// Bind a UDP endpoint to a local address and port.
    pub fn udp_bind(&self, id: usize, local: Endpoint) -> Result<(), NetError> {
        udp::bind(&self.inner, id, local)
    }

    /// Send a datagram; picks a source address and ephemeral port for
    /// unbound endpoints.  Returns the payload length on success.
    pub fn udp_sendto(&self, id: usize, data: &[u8], remote: Endpoint) -> Result<usize, NetError> {
        udp::sendto(&self.inner, id, data, remote)
    }

    /// Blocking receive; returns the byte count copied and the sender.
    pub fn udp_recvfrom(&self, id: usize, buf: &mut [u8]) -> Result<(usize, Endpoint), NetError> {
        udp::recvfrom(&self.inner, id, buf)
    }

    /// Release a UDP endpoint.
    pub fn udp_close(&self, id: usize) -> Result<(), NetError> {
        udp::close(&self.inner, id)
    }

    // --- TCP -----------------------------------------------------------------

    /// RFC 793 OPEN (passive only): listen on `local` and block until a
    /// connection is established.
    pub fn tcp_open_rfc793(
        &self,
        local: Endpoint,
        foreign: Option<Endpoint>,
        active: bool,
    ) -> Result<usize, NetError> {
        tcp::open_rfc793(&self.inner, local, foreign, active)
    }

    /// Blocking send paced against the peer's window.
    pub fn tcp_send(&self, id: usize, data: &[u8]) -> Result<usize, NetError> {
        tcp::send(&self.inner, id, data)
    }

    /// Blocking receive from the connection's in-order buffer.
    pub fn tcp_receive(&self, id: usize, buf: &mut [u8]) -> Result<usize, NetError> {
        tcp::receive(&self.inner, id, buf)
    }

    /// Close a TCP endpoint (reset semantics).
    pub fn tcp_close(&self, id: usize) -> Result<(), NetError> {
        tcp::close(&self.inner, id)
    }
}

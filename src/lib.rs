//! A user-space TCP/IP protocol stack.
//!
//! Frames terminate at layer 2 (Ethernet), IPv4 datagrams are routed and
//! delivered locally, ARP is answered and cached, ICMP echo gets replies,
//! and UDP/TCP expose socket-like blocking APIs to application threads in
//! the same process.  Links are a kernel TAP device and an in-process
//! loopback.
//!
//! A stack is assembled during startup and then run:
//!
//! ```no_run
//! use tapstack::drivers::loopback::LoopbackDriver;
//! use tapstack::stack::NetStack;
//! use tapstack::types::Ipv4Addr;
//!
//! # fn main() -> Result<(), tapstack::types::NetError> {
//! let mut builder = NetStack::builder();
//! let lo = builder.device(Box::new(LoopbackDriver::new()))?;
//! builder.interface(lo, Ipv4Addr::LOCALHOST, Ipv4Addr([255, 0, 0, 0]))?;
//! let stack = builder.build()?;
//! stack.run()?;
//!
//! let sock = stack.udp_open()?;
//! stack.udp_bind(sock, "127.0.0.1:7".parse()?)?;
//! let mut buf = [0u8; 2048];
//! let (len, peer) = stack.udp_recvfrom(sock, &mut buf)?;
//! stack.udp_sendto(sock, &buf[..len], peer)?;
//!
//! stack.shutdown();
//! # Ok(())
//! # }
//! ```

pub mod arp;
pub mod checksum;
pub mod drivers;
pub mod ethernet;
pub mod event;
pub mod icmp;
pub mod iface;
pub mod ipv4;
pub mod irq;
pub mod netdev;
pub mod route;
pub mod sched;
pub mod stack;
mod sync;
pub mod tcp;
pub mod timer;
pub mod types;
pub mod udp;

#[cfg(test)]
mod testdev;

#[cfg(test)]
mod arp_tests;
#[cfg(test)]
mod ipv4_tests;
#[cfg(test)]
mod route_tests;
#[cfg(test)]
mod udp_tests;

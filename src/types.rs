//! Type-safe network primitives shared by every layer of the stack.
//!
//! Newtype wrappers eliminate whole classes of bugs at compile time:
//! byte-order mixups, address/port confusion, and raw numeric comparisons
//! for protocol fields.  All wrappers are `#[repr(transparent)]` over their
//! wire representation.

use std::fmt;
use std::str::FromStr;

// =============================================================================
// Addresses
// =============================================================================

/// IPv4 address stored in **network byte order** (`[u8; 4]`).
///
/// The inner representation is always big-endian, matching the wire format.
/// Conversion to/from host-order `u32` is explicit via [`from_u32_be`] /
/// [`to_u32_be`].
///
/// [`from_u32_be`]: Ipv4Addr::from_u32_be
/// [`to_u32_be`]: Ipv4Addr::to_u32_be
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ipv4Addr(pub [u8; 4]);

impl Ipv4Addr {
    /// `0.0.0.0` — the unspecified (wildcard) address.
    pub const UNSPECIFIED: Self = Self([0, 0, 0, 0]);
    /// `255.255.255.255` — the limited broadcast address.
    pub const BROADCAST: Self = Self([255, 255, 255, 255]);
    /// `127.0.0.1` — the loopback address.
    pub const LOCALHOST: Self = Self([127, 0, 0, 1]);

    /// Construct from a big-endian `u32`.
    #[inline]
    pub const fn from_u32_be(val: u32) -> Self {
        Self(val.to_be_bytes())
    }

    /// Return the address as a big-endian `u32`.
    #[inline]
    pub const fn to_u32_be(self) -> u32 {
        u32::from_be_bytes(self.0)
    }

    /// `true` if the address is `255.255.255.255`.
    #[inline]
    pub const fn is_broadcast(&self) -> bool {
        self.to_u32_be() == u32::MAX
    }

    /// `true` if the address is `0.0.0.0`.
    #[inline]
    pub const fn is_unspecified(&self) -> bool {
        self.to_u32_be() == 0
    }

    /// `true` if the address is in the `127.0.0.0/8` loopback range.
    #[inline]
    pub const fn is_loopback(&self) -> bool {
        self.0[0] == 127
    }

    /// Number of leading 1-bits when the address is used as a netmask.
    #[inline]
    pub const fn prefix_len(&self) -> u32 {
        self.to_u32_be().leading_ones()
    }
}

impl fmt::Debug for Ipv4Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for Ipv4Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}.{}", self.0[0], self.0[1], self.0[2], self.0[3])
    }
}

impl FromStr for Ipv4Addr {
    type Err = NetError;

    /// Parse a dotted-quad address (`"192.0.2.1"`).
    fn from_str(s: &str) -> Result<Self, NetError> {
        let mut octets = [0u8; 4];
        let mut parts = s.split('.');
        for octet in octets.iter_mut() {
            let part = parts.next().ok_or(NetError::InvalidArgument)?;
            *octet = part.parse().map_err(|_| NetError::InvalidArgument)?;
        }
        if parts.next().is_some() {
            return Err(NetError::InvalidArgument);
        }
        Ok(Self(octets))
    }
}

/// Ethernet MAC address (6 bytes).
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    /// `ff:ff:ff:ff:ff:ff` — the broadcast address.
    pub const BROADCAST: Self = Self([0xff; 6]);
    /// `00:00:00:00:00:00` — the zero / unset address.
    pub const ZERO: Self = Self([0; 6]);

    /// `true` if the address is `ff:ff:ff:ff:ff:ff`.
    #[inline]
    pub fn is_broadcast(&self) -> bool {
        self.0 == [0xff; 6]
    }

    /// `true` if the address is all zeros.
    #[inline]
    pub fn is_zero(&self) -> bool {
        self.0 == [0; 6]
    }
}

impl fmt::Debug for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

impl FromStr for MacAddr {
    type Err = NetError;

    /// Parse a colon-hex sextet (`"aa:bb:cc:dd:ee:ff"`).
    fn from_str(s: &str) -> Result<Self, NetError> {
        let mut bytes = [0u8; 6];
        let mut parts = s.split(':');
        for byte in bytes.iter_mut() {
            let part = parts.next().ok_or(NetError::InvalidArgument)?;
            *byte = u8::from_str_radix(part, 16).map_err(|_| NetError::InvalidArgument)?;
        }
        if parts.next().is_some() {
            return Err(NetError::InvalidArgument);
        }
        Ok(Self(bytes))
    }
}

// =============================================================================
// Ports and endpoints
// =============================================================================

/// Port number in **host byte order**.
///
/// Conversion to/from the big-endian wire representation is explicit,
/// preventing host-order values from leaking onto the wire.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Port(pub u16);

impl Port {
    /// Port 0 — "any port" in bind/sendto contexts.
    pub const ANY: Self = Self(0);

    /// Serialize to big-endian bytes for the wire.
    #[inline]
    pub const fn to_be_bytes(self) -> [u8; 2] {
        self.0.to_be_bytes()
    }

    /// Deserialize from big-endian wire bytes.
    #[inline]
    pub const fn from_be_bytes(bytes: [u8; 2]) -> Self {
        Self(u16::from_be_bytes(bytes))
    }

    /// `true` if the port is 0.
    #[inline]
    pub const fn is_any(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Transport endpoint: an [`Ipv4Addr`] plus a [`Port`].
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub addr: Ipv4Addr,
    pub port: Port,
}

impl Endpoint {
    /// `0.0.0.0:0` — the fully wildcard endpoint.
    pub const ANY: Self = Self {
        addr: Ipv4Addr::UNSPECIFIED,
        port: Port::ANY,
    };

    #[inline]
    pub const fn new(addr: Ipv4Addr, port: Port) -> Self {
        Self { addr, port }
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.addr, self.port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.addr, self.port)
    }
}

impl FromStr for Endpoint {
    type Err = NetError;

    /// Parse an `address:port` pair (`"192.0.2.2:7"`).
    fn from_str(s: &str) -> Result<Self, NetError> {
        let (addr, port) = s.split_once(':').ok_or(NetError::InvalidArgument)?;
        Ok(Self {
            addr: addr.parse()?,
            port: Port(port.parse().map_err(|_| NetError::InvalidArgument)?),
        })
    }
}

// =============================================================================
// Device index
// =============================================================================

/// Index of a registered network device.
///
/// Cannot be confused with a socket handle or other `usize`.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct DevIndex(pub usize);

impl fmt::Debug for DevIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DevIndex({})", self.0)
    }
}

impl fmt::Display for DevIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Protocol discriminants
// =============================================================================

/// Ethernet frame type field values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum EtherType {
    /// IPv4 (`0x0800`).
    Ipv4 = 0x0800,
    /// ARP (`0x0806`).
    Arp = 0x0806,
}

impl EtherType {
    /// Return the raw `u16` value.
    #[inline]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }
}

impl fmt::Display for EtherType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ipv4 => write!(f, "IPv4"),
            Self::Arp => write!(f, "ARP"),
        }
    }
}

/// IP protocol number field values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum IpProtocol {
    /// ICMP (`1`).
    Icmp = 1,
    /// TCP (`6`).
    Tcp = 6,
    /// UDP (`17`).
    Udp = 17,
}

impl IpProtocol {
    /// Return the raw `u8` value.
    #[inline]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for IpProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Icmp => write!(f, "ICMP"),
            Self::Tcp => write!(f, "TCP"),
            Self::Udp => write!(f, "UDP"),
        }
    }
}

// =============================================================================
// NetError
// =============================================================================

/// Crate-wide network error type.
///
/// Internal code uses `NetError` exclusively.  Conversion to a POSIX errno
/// happens at the application boundary via [`to_errno`](Self::to_errno).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NetError {
    /// Invalid argument (EINVAL).
    InvalidArgument,
    /// Identifier out of range or pointing at a free slot (EBADF).
    InvalidHandle,
    /// Address or port already in use (EADDRINUSE).
    AddressInUse,
    /// Requested source address not reachable through the chosen
    /// interface (EADDRNOTAVAIL).
    AddressNotAvailable,
    /// No route to the destination (ENETUNREACH).
    NetworkUnreachable,
    /// Datagram exceeds the outgoing interface MTU (EMSGSIZE).
    MessageTooLong,
    /// Pool exhausted or queue full (ENOBUFS).
    NoBufferSpace,
    /// Endpoint is not in a connected state (ENOTCONN).
    NotConnected,
    /// Endpoint was released while a caller was blocked on it (ECONNABORTED).
    ConnectionAborted,
    /// Hardware/protocol family pair not supported by the resolver
    /// (EAFNOSUPPORT).
    AddressFamilyNotSupported,
    /// Address resolution in progress; the datagram was not delivered
    /// (EAGAIN).
    Incomplete,
    /// Device is not up (ENETDOWN).
    DeviceDown,
    /// Duplicate registration (EEXIST).
    AlreadyExists,
    /// Operation not implemented for this endpoint (EOPNOTSUPP).
    NotSupported,
    /// Blocking call woken by the cancellation event (EINTR).
    Interrupted,
    /// Driver-level I/O failure (EIO).
    Io,
}

impl NetError {
    /// Convert to a negative POSIX errno value for the application boundary.
    pub const fn to_errno(&self) -> i32 {
        match self {
            Self::InvalidArgument => -22,            // EINVAL
            Self::InvalidHandle => -9,               // EBADF
            Self::AddressInUse => -98,               // EADDRINUSE
            Self::AddressNotAvailable => -99,        // EADDRNOTAVAIL
            Self::NetworkUnreachable => -101,        // ENETUNREACH
            Self::MessageTooLong => -90,             // EMSGSIZE
            Self::NoBufferSpace => -105,             // ENOBUFS
            Self::NotConnected => -107,              // ENOTCONN
            Self::ConnectionAborted => -103,         // ECONNABORTED
            Self::AddressFamilyNotSupported => -97,  // EAFNOSUPPORT
            Self::Incomplete => -11,                 // EAGAIN
            Self::DeviceDown => -100,                // ENETDOWN
            Self::AlreadyExists => -17,              // EEXIST
            Self::NotSupported => -95,               // EOPNOTSUPP
            Self::Interrupted => -4,                 // EINTR
            Self::Io => -5,                          // EIO
        }
    }
}

impl fmt::Display for NetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArgument => write!(f, "invalid argument"),
            Self::InvalidHandle => write!(f, "invalid handle"),
            Self::AddressInUse => write!(f, "address already in use"),
            Self::AddressNotAvailable => write!(f, "address not available"),
            Self::NetworkUnreachable => write!(f, "network unreachable"),
            Self::MessageTooLong => write!(f, "message too long"),
            Self::NoBufferSpace => write!(f, "no buffer space available"),
            Self::NotConnected => write!(f, "endpoint not connected"),
            Self::ConnectionAborted => write!(f, "connection aborted"),
            Self::AddressFamilyNotSupported => write!(f, "address family not supported"),
            Self::Incomplete => write!(f, "address resolution in progress"),
            Self::DeviceDown => write!(f, "device is down"),
            Self::AlreadyExists => write!(f, "already registered"),
            Self::NotSupported => write!(f, "operation not supported"),
            Self::Interrupted => write!(f, "interrupted"),
            Self::Io => write!(f, "driver I/O error"),
        }
    }
}

impl std::error::Error for NetError {}

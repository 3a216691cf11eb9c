//! IPv4 routing table with longest-prefix-match lookup.
//!
//! Routes are kept in insertion order; lookup scans the whole table and
//! keeps the entry with the longest matching netmask, preferring the most
//! recently inserted route on equal prefix lengths.  The table is mutated
//! only during startup (builder phase); runtime access is read-only under
//! the table mutex.

use std::fmt;
use std::sync::{Arc, Mutex};

use crate::iface::Interface;
use crate::sync;
use crate::types::Ipv4Addr;

/// A routing table entry.
///
/// A nexthop of `0.0.0.0` means "directly connected — use the destination
/// itself as the next hop".  A route with zero network and netmask is the
/// default route and matches everything.
#[derive(Clone)]
pub struct Route {
    pub network: Ipv4Addr,
    pub netmask: Ipv4Addr,
    pub nexthop: Ipv4Addr,
    pub iface: Arc<Interface>,
}

impl Route {
    /// `true` if `dst` falls under this route's network/netmask.
    #[inline]
    pub fn matches(&self, dst: Ipv4Addr) -> bool {
        (dst.to_u32_be() & self.netmask.to_u32_be()) == self.network.to_u32_be()
    }

    /// The next hop for `dst` through this route.
    #[inline]
    pub fn next_hop(&self, dst: Ipv4Addr) -> Ipv4Addr {
        if self.nexthop.is_unspecified() {
            dst
        } else {
            self.nexthop
        }
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.nexthop.is_unspecified() {
            write!(
                f,
                "{}/{} dev {}",
                self.network,
                self.netmask.prefix_len(),
                self.iface.unicast
            )
        } else {
            write!(
                f,
                "{}/{} via {} dev {}",
                self.network,
                self.netmask.prefix_len(),
                self.nexthop,
                self.iface.unicast
            )
        }
    }
}

/// Insertion-ordered route list.
pub struct RouteTable {
    routes: Mutex<Vec<Route>>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self {
            routes: Mutex::new(Vec::new()),
        }
    }

    /// Append a route.  Startup only.
    pub fn add(&self, route: Route) {
        log::info!("route: added {:?}", route);
        sync::lock(&self.routes).push(route);
    }

    /// Longest-prefix-match lookup.
    ///
    /// Among all matching routes the one with the most netmask bits wins;
    /// equal prefix lengths are broken in favor of the later insertion.
    pub fn lookup(&self, dst: Ipv4Addr) -> Option<Route> {
        let routes = sync::lock(&self.routes);
        let mut best: Option<&Route> = None;
        for route in routes.iter() {
            if !route.matches(dst) {
                continue;
            }
            match best {
                Some(candidate)
                    if route.netmask.prefix_len() < candidate.netmask.prefix_len() => {}
                _ => best = Some(route),
            }
        }
        best.cloned()
    }

    /// Number of installed routes.
    pub fn len(&self) -> usize {
        sync::lock(&self.routes).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::new()
    }
}

//! Tests for longest-prefix-match route lookup.

use std::sync::Arc;

use crate::iface::Interface;
use crate::route::{Route, RouteTable};
use crate::types::Ipv4Addr;

fn iface(unicast: [u8; 4], netmask: [u8; 4]) -> Arc<Interface> {
    Interface::new(Ipv4Addr(unicast), Ipv4Addr(netmask))
}

fn route(network: [u8; 4], netmask: [u8; 4], nexthop: [u8; 4], iface: &Arc<Interface>) -> Route {
    Route {
        network: Ipv4Addr(network),
        netmask: Ipv4Addr(netmask),
        nexthop: Ipv4Addr(nexthop),
        iface: Arc::clone(iface),
    }
}

#[test]
fn empty_table_has_no_route() {
    let table = RouteTable::new();
    assert!(table.lookup(Ipv4Addr([192, 0, 2, 1])).is_none());
    assert!(table.is_empty());
}

#[test]
fn longest_prefix_wins() {
    // Routes {0.0.0.0/0 via 192.0.2.1, 192.0.2.0/24 direct}: the /24 takes
    // subnet traffic, the default route everything else.
    let table = RouteTable::new();
    let eth = iface([192, 0, 2, 2], [255, 255, 255, 0]);
    table.add(route([0, 0, 0, 0], [0, 0, 0, 0], [192, 0, 2, 1], &eth));
    table.add(route([192, 0, 2, 0], [255, 255, 255, 0], [0, 0, 0, 0], &eth));

    let local = table.lookup(Ipv4Addr([192, 0, 2, 42])).unwrap();
    assert_eq!(local.netmask.prefix_len(), 24);
    // Direct route: next hop is the destination itself.
    assert_eq!(local.next_hop(Ipv4Addr([192, 0, 2, 42])).0, [192, 0, 2, 42]);

    let remote = table.lookup(Ipv4Addr([8, 8, 8, 8])).unwrap();
    assert_eq!(remote.netmask.prefix_len(), 0);
    assert_eq!(remote.next_hop(Ipv4Addr([8, 8, 8, 8])).0, [192, 0, 2, 1]);
}

#[test]
fn lookup_is_idempotent() {
    let table = RouteTable::new();
    let eth = iface([10, 0, 0, 1], [255, 255, 255, 0]);
    table.add(route([10, 0, 0, 0], [255, 255, 255, 0], [0, 0, 0, 0], &eth));
    let first = table.lookup(Ipv4Addr([10, 0, 0, 9])).unwrap();
    let second = table.lookup(Ipv4Addr([10, 0, 0, 9])).unwrap();
    assert_eq!(first.network, second.network);
    assert_eq!(first.netmask, second.netmask);
    assert_eq!(first.nexthop, second.nexthop);
}

#[test]
fn equal_prefix_ties_break_to_last_inserted() {
    let table = RouteTable::new();
    let a = iface([10, 0, 0, 1], [255, 255, 255, 0]);
    let b = iface([10, 0, 0, 2], [255, 255, 255, 0]);
    table.add(route([10, 0, 0, 0], [255, 255, 255, 0], [0, 0, 0, 0], &a));
    table.add(route([10, 0, 0, 0], [255, 255, 255, 0], [0, 0, 0, 0], &b));

    let hit = table.lookup(Ipv4Addr([10, 0, 0, 9])).unwrap();
    assert!(Arc::ptr_eq(&hit.iface, &b), "later insertion should win ties");
}

#[test]
fn host_route_beats_subnet_route() {
    let table = RouteTable::new();
    let eth = iface([10, 0, 0, 1], [255, 255, 255, 0]);
    table.add(route([10, 0, 0, 0], [255, 255, 255, 0], [0, 0, 0, 0], &eth));
    table.add(route([10, 0, 0, 42], [255, 255, 255, 255], [10, 0, 0, 7], &eth));

    let hit = table.lookup(Ipv4Addr([10, 0, 0, 42])).unwrap();
    assert_eq!(hit.netmask.prefix_len(), 32);
    assert_eq!(hit.next_hop(Ipv4Addr([10, 0, 0, 42])).0, [10, 0, 0, 7]);

    let other = table.lookup(Ipv4Addr([10, 0, 0, 43])).unwrap();
    assert_eq!(other.netmask.prefix_len(), 24);
}

#[test]
fn no_default_route_means_unreachable() {
    let table = RouteTable::new();
    let eth = iface([192, 0, 2, 2], [255, 255, 255, 0]);
    table.add(route([192, 0, 2, 0], [255, 255, 255, 0], [0, 0, 0, 0], &eth));
    assert!(table.lookup(Ipv4Addr([8, 8, 8, 8])).is_none());
}

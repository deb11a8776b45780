// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;
use std::net::Ipv4Addr;

use netlink_packet_route::route::{
    RouteAddress, RouteAttribute, RouteMessage, RouteProtocol,
};
use netlink_packet_route::AddressFamily;
use serde::{Deserialize, Serialize};

const IPV4_DEFAULT_ROUTE: &str = "0.0.0.0/0";

/// Statically configured IPv4 route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[non_exhaustive]
pub struct RouteEntry {
    pub destination: String,
    pub next_hop_addr: Ipv4Addr,
    pub next_hop_iface: String,
}

/// Convert one entry of the IPv4 route dump into a capturable entry.
/// Only static routes with a gateway and a resolvable egress interface
/// can be replayed, everything else yields `None`.
pub(crate) fn static_route_entry(
    route: &RouteMessage,
    name_by_index: &HashMap<u32, String>,
) -> Option<RouteEntry> {
    if route.header.address_family != AddressFamily::Inet {
        return None;
    }
    if route.header.protocol != RouteProtocol::Static {
        return None;
    }
    let destination = match route_dst_v4(route) {
        Some(dst) => {
            format!("{}/{}", dst, route.header.destination_prefix_length)
        }
        // the kernel encodes the default route with no destination
        None => IPV4_DEFAULT_ROUTE.to_string(),
    };
    let next_hop_addr = match route_gateway_v4(route) {
        Some(gateway) => gateway,
        None => {
            log::debug!("Skipping static route {destination}: no gateway");
            return None;
        }
    };
    let oif = match route_oif(route) {
        Some(index) => index,
        None => {
            log::debug!(
                "Skipping static route {destination}: no egress interface"
            );
            return None;
        }
    };
    let next_hop_iface = match name_by_index.get(&oif) {
        Some(name) => name.to_string(),
        None => {
            log::warn!(
                "Skipping static route {destination}: egress index {oif} \
                 does not resolve"
            );
            return None;
        }
    };
    Some(RouteEntry {
        destination,
        next_hop_addr,
        next_hop_iface,
    })
}

fn route_dst_v4(route: &RouteMessage) -> Option<Ipv4Addr> {
    route.attributes.iter().find_map(|attr| {
        if let RouteAttribute::Destination(RouteAddress::Inet(ip)) = attr {
            Some(*ip)
        } else {
            None
        }
    })
}

fn route_gateway_v4(route: &RouteMessage) -> Option<Ipv4Addr> {
    route.attributes.iter().find_map(|attr| {
        if let RouteAttribute::Gateway(RouteAddress::Inet(ip)) = attr {
            Some(*ip)
        } else {
            None
        }
    })
}

fn route_oif(route: &RouteMessage) -> Option<u32> {
    route.attributes.iter().find_map(|attr| {
        if let RouteAttribute::Oif(index) = attr {
            Some(*index)
        } else {
            None
        }
    })
}

#[cfg(test)]
mod unit_tests {
    use super::*;

    fn iface_names() -> HashMap<u32, String> {
        let mut names = HashMap::new();
        names.insert(3u32, "eth1".to_string());
        names
    }

    fn new_route(gateway: Ipv4Addr, oif: u32) -> RouteMessage {
        let mut route = RouteMessage::default();
        route.header.address_family = AddressFamily::Inet;
        route.header.protocol = RouteProtocol::Static;
        route
            .attributes
            .push(RouteAttribute::Gateway(RouteAddress::Inet(gateway)));
        route.attributes.push(RouteAttribute::Oif(oif));
        route
    }

    #[test]
    fn test_route_static_entry_resolved() {
        let mut route = new_route(Ipv4Addr::new(192, 168, 10, 1), 3);
        route.header.destination_prefix_length = 24;
        route
            .attributes
            .push(RouteAttribute::Destination(RouteAddress::Inet(
                Ipv4Addr::new(10, 20, 30, 0),
            )));
        assert_eq!(
            static_route_entry(&route, &iface_names()),
            Some(RouteEntry {
                destination: "10.20.30.0/24".to_string(),
                next_hop_addr: Ipv4Addr::new(192, 168, 10, 1),
                next_hop_iface: "eth1".to_string(),
            })
        );
    }

    #[test]
    fn test_route_default_route_destination() {
        let route = new_route(Ipv4Addr::new(192, 168, 10, 1), 3);
        let entry = static_route_entry(&route, &iface_names()).unwrap();
        assert_eq!(entry.destination, "0.0.0.0/0");
    }

    #[test]
    fn test_route_non_static_dropped() {
        let mut route = new_route(Ipv4Addr::new(192, 168, 10, 1), 3);
        route.header.protocol = RouteProtocol::Kernel;
        assert!(static_route_entry(&route, &iface_names()).is_none());
    }

    #[test]
    fn test_route_non_ipv4_dropped() {
        let mut route = new_route(Ipv4Addr::new(192, 168, 10, 1), 3);
        route.header.address_family = AddressFamily::Inet6;
        assert!(static_route_entry(&route, &iface_names()).is_none());
    }

    #[test]
    fn test_route_without_gateway_dropped() {
        let mut route = RouteMessage::default();
        route.header.address_family = AddressFamily::Inet;
        route.header.protocol = RouteProtocol::Static;
        route.attributes.push(RouteAttribute::Oif(3));
        assert!(static_route_entry(&route, &iface_names()).is_none());
    }

    #[test]
    fn test_route_unresolvable_egress_dropped() {
        let route = new_route(Ipv4Addr::new(192, 168, 10, 1), 99);
        assert!(static_route_entry(&route, &iface_names()).is_none());
    }
}

// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;
use std::net::IpAddr;

use netlink_packet_route::address::{AddressAttribute, AddressMessage};
use netlink_packet_route::AddressFamily;

/// Group the IPv4 addresses of an address dump by owning interface index,
/// formatted as `address/prefix` strings. The kernel reports the local
/// address separately from the peer address on point-to-point links, so the
/// local one wins when both are present.
pub(crate) fn ipv4_addresses_by_iface(
    addrs: &[AddressMessage],
) -> HashMap<u32, Vec<String>> {
    let mut ret: HashMap<u32, Vec<String>> = HashMap::new();
    for addr in addrs {
        if addr.header.family != AddressFamily::Inet {
            continue;
        }
        let ip = local_v4(addr).or_else(|| peer_v4(addr));
        match ip {
            Some(ip) => ret
                .entry(addr.header.index)
                .or_default()
                .push(format!("{ip}/{}", addr.header.prefix_len)),
            None => log::debug!(
                "Ignoring IPv4 address entry without address payload \
                 on interface index {}",
                addr.header.index
            ),
        }
    }
    ret
}

fn local_v4(addr: &AddressMessage) -> Option<std::net::Ipv4Addr> {
    addr.attributes.iter().find_map(|attr| {
        if let AddressAttribute::Local(IpAddr::V4(ip)) = attr {
            Some(*ip)
        } else {
            None
        }
    })
}

fn peer_v4(addr: &AddressMessage) -> Option<std::net::Ipv4Addr> {
    addr.attributes.iter().find_map(|attr| {
        if let AddressAttribute::Address(IpAddr::V4(ip)) = attr {
            Some(*ip)
        } else {
            None
        }
    })
}

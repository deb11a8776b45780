// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;
use std::net::Ipv4Addr;

use netlink_packet_route::neighbour::{
    NeighbourAddress, NeighbourAttribute, NeighbourMessage, NeighbourState,
};
use netlink_packet_route::AddressFamily;
use serde::{Deserialize, Serialize};

use crate::link::format_mac;

const NUD_PERMANENT: u16 = 0x80;

/// Permanent IPv4 ARP entry of one interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[non_exhaustive]
pub struct NeighborEntry {
    pub ip: Ipv4Addr,
    pub mac: String,
}

/// Permanent bridge FDB entry of one interface. `remote` carries the
/// tunnel endpoint when the owning link is a VXLAN device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[non_exhaustive]
pub struct FdbEntry {
    pub mac: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote: Option<Ipv4Addr>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum NeighFact {
    Arp(NeighborEntry),
    Fdb(FdbEntry),
}

/// Convert one entry of the merged neighbor dump into a capturable
/// fact. The snapshot holds IPv4 ARP entries and bridge FDB entries in
/// the same list; the family decides which fact an entry becomes.
/// Entries outside the capture contract yield `None`:
/// non-permanent state, unsupported family, VLAN 1 noise, multicast or
/// all-zero MACs, the owning bridge's own MAC, and VXLAN entries without
/// a remote endpoint.
pub(crate) fn neigh_fact(
    neigh: &NeighbourMessage,
    owner_is_vxlan: bool,
    mac_by_index: &HashMap<u32, String>,
) -> Option<NeighFact> {
    if !is_permanent(&neigh.header.state) {
        return None;
    }
    match neigh.header.family {
        AddressFamily::Inet => arp_fact(neigh),
        AddressFamily::Bridge => {
            fdb_fact(neigh, owner_is_vxlan, mac_by_index)
        }
        _ => None,
    }
}

// The kernel reports combined state bits for entries like static FDB
// records (NUD_NOARP | NUD_PERMANENT), hence the bitwise check.
fn is_permanent(state: &NeighbourState) -> bool {
    match state {
        NeighbourState::Permanent => true,
        NeighbourState::Other(value) => (value & NUD_PERMANENT) > 0,
        _ => false,
    }
}

fn arp_fact(neigh: &NeighbourMessage) -> Option<NeighFact> {
    let ip = destination_v4(neigh)?;
    let mac = format_mac(&raw_lladdr(neigh)?[..6]);
    Some(NeighFact::Arp(NeighborEntry { ip, mac }))
}

fn fdb_fact(
    neigh: &NeighbourMessage,
    owner_is_vxlan: bool,
    mac_by_index: &HashMap<u32, String>,
) -> Option<NeighFact> {
    let raw = raw_lladdr(neigh)?;
    if raw[0] & 0x01 == 1 {
        // multicast
        return None;
    }
    if raw[..6].iter().all(|b| *b == 0) {
        return None;
    }
    // FDB comes with VLAN 1 as well
    if vlan_id(neigh) == Some(1) {
        return None;
    }
    let mac = format_mac(&raw[..6]);
    if let Some(controller) = controller_index(neigh) {
        match mac_by_index.get(&controller) {
            Some(bridge_mac) => {
                if bridge_mac == &mac {
                    // same as the bridge's own MAC
                    return None;
                }
            }
            None => {
                log::warn!(
                    "Dropping FDB entry {mac}: owning bridge index \
                     {controller} does not resolve"
                );
                return None;
            }
        }
    }
    if owner_is_vxlan {
        // Only remote-endpoint entries make sense on a VXLAN device
        if controller_index(neigh).is_some() {
            return None;
        }
        let remote = destination_v4(neigh)?;
        Some(NeighFact::Fdb(FdbEntry {
            mac,
            remote: Some(remote),
        }))
    } else {
        Some(NeighFact::Fdb(FdbEntry { mac, remote: None }))
    }
}

fn destination_v4(neigh: &NeighbourMessage) -> Option<Ipv4Addr> {
    neigh.attributes.iter().find_map(|attr| match attr {
        NeighbourAttribute::Destination(NeighbourAddress::Inet(ip)) => {
            Some(*ip)
        }
        // Bridge-family dumps carry the endpoint as raw bytes
        NeighbourAttribute::Destination(NeighbourAddress::Other(raw))
            if raw.len() == 4 =>
        {
            Some(Ipv4Addr::new(raw[0], raw[1], raw[2], raw[3]))
        }
        _ => None,
    })
}

fn raw_lladdr(neigh: &NeighbourMessage) -> Option<&[u8]> {
    neigh.attributes.iter().find_map(|attr| {
        if let NeighbourAttribute::LinkLocalAddress(raw) = attr {
            if raw.len() >= 6 {
                Some(raw.as_slice())
            } else {
                None
            }
        } else {
            None
        }
    })
}

fn vlan_id(neigh: &NeighbourMessage) -> Option<u16> {
    neigh.attributes.iter().find_map(|attr| {
        if let NeighbourAttribute::Vlan(vid) = attr {
            Some(*vid)
        } else {
            None
        }
    })
}

fn controller_index(neigh: &NeighbourMessage) -> Option<u32> {
    neigh.attributes.iter().find_map(|attr| {
        if let NeighbourAttribute::Controller(index) = attr {
            Some(*index)
        } else {
            None
        }
    })
}

#[cfg(test)]
mod unit_tests {
    use super::*;

    const MAC: [u8; 6] = [0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff];

    fn new_arp(ip: Ipv4Addr, mac: &[u8]) -> NeighbourMessage {
        let mut neigh = NeighbourMessage::default();
        neigh.header.family = AddressFamily::Inet;
        neigh.header.state = NeighbourState::Permanent;
        neigh
            .attributes
            .push(NeighbourAttribute::Destination(NeighbourAddress::Inet(
                ip,
            )));
        neigh
            .attributes
            .push(NeighbourAttribute::LinkLocalAddress(mac.to_vec()));
        neigh
    }

    fn new_fdb(mac: &[u8]) -> NeighbourMessage {
        let mut neigh = NeighbourMessage::default();
        neigh.header.family = AddressFamily::Bridge;
        neigh.header.state = NeighbourState::Permanent;
        neigh
            .attributes
            .push(NeighbourAttribute::LinkLocalAddress(mac.to_vec()));
        neigh
    }

    #[test]
    fn test_neigh_permanent_arp_kept() {
        let neigh = new_arp(Ipv4Addr::new(10, 1, 1, 2), &MAC);
        let fact = neigh_fact(&neigh, false, &HashMap::new()).unwrap();
        assert_eq!(
            fact,
            NeighFact::Arp(NeighborEntry {
                ip: Ipv4Addr::new(10, 1, 1, 2),
                mac: "aa:bb:cc:dd:ee:ff".to_string(),
            })
        );
    }

    #[test]
    fn test_neigh_non_permanent_dropped() {
        let mut neigh = new_arp(Ipv4Addr::new(10, 1, 1, 2), &MAC);
        neigh.header.state = NeighbourState::Reachable;
        assert!(neigh_fact(&neigh, false, &HashMap::new()).is_none());
    }

    #[test]
    fn test_neigh_combined_state_bits_kept() {
        // NUD_NOARP | NUD_PERMANENT, as static FDB entries report
        let mut neigh = new_fdb(&MAC);
        neigh.header.state = NeighbourState::Other(0xc0);
        assert!(neigh_fact(&neigh, false, &HashMap::new()).is_some());
    }

    #[test]
    fn test_neigh_unsupported_family_dropped() {
        let mut neigh = new_arp(Ipv4Addr::new(10, 1, 1, 2), &MAC);
        neigh.header.family = AddressFamily::Inet6;
        assert!(neigh_fact(&neigh, false, &HashMap::new()).is_none());
    }

    #[test]
    fn test_neigh_short_lladdr_dropped() {
        let neigh = new_arp(Ipv4Addr::new(10, 1, 1, 2), &[0xaa, 0xbb]);
        assert!(neigh_fact(&neigh, false, &HashMap::new()).is_none());
    }

    #[test]
    fn test_fdb_plain_entry_kept() {
        let neigh = new_fdb(&MAC);
        let fact = neigh_fact(&neigh, false, &HashMap::new()).unwrap();
        assert_eq!(
            fact,
            NeighFact::Fdb(FdbEntry {
                mac: "aa:bb:cc:dd:ee:ff".to_string(),
                remote: None,
            })
        );
    }

    #[test]
    fn test_fdb_multicast_mac_dropped() {
        let neigh = new_fdb(&[0x01, 0x00, 0x5e, 0x00, 0x00, 0x01]);
        assert!(neigh_fact(&neigh, false, &HashMap::new()).is_none());
    }

    #[test]
    fn test_fdb_zero_mac_dropped() {
        let neigh = new_fdb(&[0; 6]);
        assert!(neigh_fact(&neigh, false, &HashMap::new()).is_none());
    }

    #[test]
    fn test_fdb_vlan1_dropped() {
        let mut neigh = new_fdb(&MAC);
        neigh.attributes.push(NeighbourAttribute::Vlan(1));
        assert!(neigh_fact(&neigh, false, &HashMap::new()).is_none());

        let mut neigh = new_fdb(&MAC);
        neigh.attributes.push(NeighbourAttribute::Vlan(100));
        assert!(neigh_fact(&neigh, false, &HashMap::new()).is_some());
    }

    #[test]
    fn test_fdb_bridge_own_mac_dropped() {
        let mut mac_by_index = HashMap::new();
        mac_by_index.insert(5u32, "aa:bb:cc:dd:ee:ff".to_string());

        let mut neigh = new_fdb(&MAC);
        neigh.attributes.push(NeighbourAttribute::Controller(5));
        assert!(neigh_fact(&neigh, false, &mac_by_index).is_none());

        // a different MAC on the same bridge stays
        let mut neigh = new_fdb(&[0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0x01]);
        neigh.attributes.push(NeighbourAttribute::Controller(5));
        assert!(neigh_fact(&neigh, false, &mac_by_index).is_some());
    }

    #[test]
    fn test_fdb_unresolvable_controller_dropped() {
        let mut neigh = new_fdb(&MAC);
        neigh.attributes.push(NeighbourAttribute::Controller(77));
        assert!(neigh_fact(&neigh, false, &HashMap::new()).is_none());
    }

    #[test]
    fn test_fdb_vxlan_requires_remote() {
        let neigh = new_fdb(&MAC);
        assert!(neigh_fact(&neigh, true, &HashMap::new()).is_none());

        let mut neigh = new_fdb(&MAC);
        neigh
            .attributes
            .push(NeighbourAttribute::Destination(NeighbourAddress::Inet(
                Ipv4Addr::new(2, 2, 2, 2),
            )));
        let fact = neigh_fact(&neigh, true, &HashMap::new()).unwrap();
        assert_eq!(
            fact,
            NeighFact::Fdb(FdbEntry {
                mac: "aa:bb:cc:dd:ee:ff".to_string(),
                remote: Some(Ipv4Addr::new(2, 2, 2, 2)),
            })
        );
    }

    #[test]
    fn test_fdb_vxlan_raw_destination_bytes() {
        let mut neigh = new_fdb(&MAC);
        neigh
            .attributes
            .push(NeighbourAttribute::Destination(NeighbourAddress::Other(
                vec![8, 8, 4, 4],
            )));
        let fact = neigh_fact(&neigh, true, &HashMap::new()).unwrap();
        assert_eq!(
            fact,
            NeighFact::Fdb(FdbEntry {
                mac: "aa:bb:cc:dd:ee:ff".to_string(),
                remote: Some(Ipv4Addr::new(8, 8, 4, 4)),
            })
        );
    }

    #[test]
    fn test_fdb_vxlan_enslaved_entry_dropped() {
        let mut mac_by_index = HashMap::new();
        mac_by_index.insert(5u32, "00:00:00:00:00:05".to_string());

        let mut neigh = new_fdb(&MAC);
        neigh
            .attributes
            .push(NeighbourAttribute::Destination(NeighbourAddress::Inet(
                Ipv4Addr::new(2, 2, 2, 2),
            )));
        neigh.attributes.push(NeighbourAttribute::Controller(5));
        assert!(neigh_fact(&neigh, true, &mac_by_index).is_none());
    }
}

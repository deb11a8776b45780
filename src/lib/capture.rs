// SPDX-License-Identifier: Apache-2.0

//! Turns raw kernel dumps into the capturable topology: which interfaces
//! exist, how they relate, and which facts have to be replayed on each.

use std::collections::HashMap;

use netlink_packet_route::link::LinkMessage;
use netlink_packet_route::neighbour::NeighbourMessage;
use serde::{Deserialize, Serialize};

use crate::ip::ipv4_addresses_by_iface;
use crate::link::{
    classify_link, link_controller_index, link_mac, link_mtu, link_name,
    link_oper_up, DEFAULT_MTU,
};
use crate::neigh::{neigh_fact, NeighFact};
use crate::query::NetSnapshot;
use crate::route::static_route_entry;
use crate::{FdbEntry, LinkKind, NeighborEntry, RouteEntry};

const LOOPBACK_IFACE: &str = "lo";

/// Link this interface is enslaved to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[non_exhaustive]
pub struct Controller {
    pub name: String,
    pub kind: String,
}

/// One captured interface with every fact needed to recreate it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[non_exhaustive]
pub struct Iface {
    pub name: String,
    pub index: u32,
    pub kind: LinkKind,
    pub up: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mtu: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mac: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub controller: Option<Controller>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub addresses: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub neighbors: Vec<NeighborEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fdbs: Vec<FdbEntry>,
}

/// Captured network topology. `ifaces` is ordered for replay: bridges
/// first, then bonds, then everything else, each group by ascending
/// kernel interface index so base devices come before the sub-interfaces
/// named after them.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct NetTopology {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ifaces: Vec<Iface>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub routes: Vec<RouteEntry>,
}

/// Build the topology from a snapshot. Pure function over the dumps:
/// links which cannot be captured are skipped with a warning, never an
/// error.
pub fn build_topology(snapshot: &NetSnapshot) -> NetTopology {
    let mut index = DumpIndex::new(snapshot);

    let mut bridges = Vec::new();
    let mut bonds = Vec::new();
    let mut others = Vec::new();
    for entry in index.classify(snapshot) {
        match &entry.kind {
            LinkKind::Bridge => bridges.push(entry),
            LinkKind::Bond(_) => bonds.push(entry),
            _ => others.push(entry),
        }
    }

    let ifaces = bridges
        .into_iter()
        .chain(bonds)
        .chain(others)
        .map(|entry| index.iface(entry))
        .collect();

    let routes = snapshot
        .routes
        .iter()
        .filter_map(|route| static_route_entry(route, &index.name_by_index))
        .collect();

    NetTopology { ifaces, routes }
}

struct ClassifiedLink<'a> {
    index: u32,
    name: String,
    link: &'a LinkMessage,
    kind: LinkKind,
}

/// Lookup tables built once from the whole snapshot.
struct DumpIndex<'a> {
    name_by_index: HashMap<u32, String>,
    mac_by_index: HashMap<u32, String>,
    kind_by_index: HashMap<u32, &'static str>,
    addrs_by_index: HashMap<u32, Vec<String>>,
    neighs_by_index: HashMap<u32, Vec<&'a NeighbourMessage>>,
}

impl<'a> DumpIndex<'a> {
    fn new(snapshot: &'a NetSnapshot) -> Self {
        let mut name_by_index = HashMap::new();
        let mut mac_by_index = HashMap::new();
        for link in &snapshot.links {
            if let Some(name) = link_name(link) {
                name_by_index.insert(link.header.index, name);
            }
            if let Some(mac) = link_mac(link) {
                mac_by_index.insert(link.header.index, mac);
            }
        }
        let mut neighs_by_index: HashMap<u32, Vec<&NeighbourMessage>> =
            HashMap::new();
        for neigh in &snapshot.neighs {
            neighs_by_index
                .entry(neigh.header.ifindex)
                .or_default()
                .push(neigh);
        }
        Self {
            name_by_index,
            mac_by_index,
            kind_by_index: HashMap::new(),
            addrs_by_index: ipv4_addresses_by_iface(&snapshot.addrs),
            neighs_by_index,
        }
    }

    /// Classify every link of the dump, sorted by kernel index. The
    /// loopback device and links without a name are not captured.
    fn classify(
        &mut self,
        snapshot: &'a NetSnapshot,
    ) -> Vec<ClassifiedLink<'a>> {
        let mut classified = Vec::new();
        for link in &snapshot.links {
            let index = link.header.index;
            let name = match self.name_by_index.get(&index) {
                Some(name) => name.clone(),
                None => {
                    log::warn!(
                        "Skipping link index {index}: no interface name"
                    );
                    continue;
                }
            };
            if name == LOOPBACK_IFACE {
                continue;
            }
            match classify_link(link, &name, &self.name_by_index) {
                Ok(kind) => classified.push(ClassifiedLink {
                    index,
                    name,
                    link,
                    kind,
                }),
                Err(e) => log::warn!("Skipping link {name}: {e}"),
            }
        }
        classified.sort_by_key(|entry| entry.index);
        self.kind_by_index = classified
            .iter()
            .map(|entry| (entry.index, entry.kind.kind_str()))
            .collect();
        classified
    }

    fn iface(&self, entry: ClassifiedLink<'_>) -> Iface {
        let ClassifiedLink {
            index,
            name,
            link,
            kind,
        } = entry;
        // MTU is only replayed on bonds and physical NICs, and only when
        // it differs from the default
        let mtu = match &kind {
            LinkKind::Bond(_) | LinkKind::Physical => {
                link_mtu(link).filter(|mtu| *mtu != DEFAULT_MTU)
            }
            _ => None,
        };
        let owner_is_vxlan = matches!(kind, LinkKind::Vxlan(_));
        let mut neighbors = Vec::new();
        let mut fdbs = Vec::new();
        if let Some(entries) = self.neighs_by_index.get(&index) {
            for neigh in entries {
                match neigh_fact(neigh, owner_is_vxlan, &self.mac_by_index)
                {
                    Some(NeighFact::Arp(entry)) => neighbors.push(entry),
                    Some(NeighFact::Fdb(entry)) => fdbs.push(entry),
                    None => (),
                }
            }
        }
        Iface {
            up: link_oper_up(link),
            mtu,
            mac: link_mac(link),
            controller: self.controller_of(link, &name),
            addresses: self
                .addrs_by_index
                .get(&index)
                .cloned()
                .unwrap_or_default(),
            neighbors,
            fdbs,
            name,
            index,
            kind,
        }
    }

    fn controller_of(
        &self,
        link: &LinkMessage,
        name: &str,
    ) -> Option<Controller> {
        let index = link_controller_index(link)?;
        match (
            self.name_by_index.get(&index),
            self.kind_by_index.get(&index),
        ) {
            (Some(ctrl_name), Some(kind)) => Some(Controller {
                name: ctrl_name.to_string(),
                kind: (*kind).to_string(),
            }),
            _ => {
                log::warn!(
                    "Dropping controller facts of {name}: controller \
                     index {index} does not resolve"
                );
                None
            }
        }
    }
}

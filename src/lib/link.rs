// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;
use std::net::Ipv4Addr;

use netlink_packet_route::link::{
    InfoBond, InfoData, InfoKind, InfoVxlan, LinkAttribute, LinkInfo,
    LinkMessage, State,
};
use serde::{Deserialize, Serialize};

use crate::{ErrorKind, NetsnapError};

pub const DEFAULT_MTU: u32 = 1500;
pub const VXLAN_DEFAULT_PORT: u16 = 4789;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[non_exhaustive]
pub struct BondConfig {
    pub mode: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[non_exhaustive]
pub struct VlanConfig {
    pub base_iface: String,
    pub id: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[non_exhaustive]
pub struct VxlanConfig {
    pub id: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local: Option<Ipv4Addr>,
    pub base_iface: String,
    pub dst_port: u16,
}

/// Kind of a captured link, carrying the kind-specific settings needed to
/// recreate it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[non_exhaustive]
pub enum LinkKind {
    Bridge,
    Bond(BondConfig),
    Vlan(VlanConfig),
    Vxlan(VxlanConfig),
    Physical,
}

impl LinkKind {
    /// Tag stored in the per-interface `type` file.
    pub fn kind_str(&self) -> &'static str {
        match self {
            Self::Bridge => "bridge",
            Self::Bond(_) => "bond",
            Self::Vlan(_) => "subintf",
            Self::Vxlan(_) => "vxlan",
            Self::Physical => "phy",
        }
    }
}

impl std::fmt::Display for LinkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.kind_str())
    }
}

pub(crate) fn format_mac(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<String>>()
        .join(":")
}

pub(crate) fn link_name(link: &LinkMessage) -> Option<String> {
    link.attributes.iter().find_map(|attr| {
        if let LinkAttribute::IfName(name) = attr {
            Some(name.to_string())
        } else {
            None
        }
    })
}

pub(crate) fn link_mac(link: &LinkMessage) -> Option<String> {
    link.attributes.iter().find_map(|attr| {
        if let LinkAttribute::Address(addr) = attr {
            if addr.len() >= 6 {
                Some(format_mac(&addr[..6]))
            } else {
                None
            }
        } else {
            None
        }
    })
}

pub(crate) fn link_mtu(link: &LinkMessage) -> Option<u32> {
    link.attributes.iter().find_map(|attr| {
        if let LinkAttribute::Mtu(mtu) = attr {
            Some(*mtu)
        } else {
            None
        }
    })
}

pub(crate) fn link_oper_up(link: &LinkMessage) -> bool {
    link.attributes
        .iter()
        .any(|attr| attr == &LinkAttribute::OperState(State::Up))
}

pub(crate) fn link_controller_index(link: &LinkMessage) -> Option<u32> {
    link.attributes.iter().find_map(|attr| {
        if let LinkAttribute::Controller(index) = attr {
            Some(*index)
        } else {
            None
        }
    })
}

fn link_info_kind(link: &LinkMessage) -> Option<&InfoKind> {
    link.attributes.iter().find_map(|attr| {
        if let LinkAttribute::LinkInfo(infos) = attr {
            infos.iter().find_map(|info| {
                if let LinkInfo::Kind(kind) = info {
                    Some(kind)
                } else {
                    None
                }
            })
        } else {
            None
        }
    })
}

fn link_info_data(link: &LinkMessage) -> Option<&InfoData> {
    link.attributes.iter().find_map(|attr| {
        if let LinkAttribute::LinkInfo(infos) = attr {
            infos.iter().find_map(|info| {
                if let LinkInfo::Data(data) = info {
                    Some(data)
                } else {
                    None
                }
            })
        } else {
            None
        }
    })
}

fn parse_vlan_name(name: &str) -> Option<(&str, u16)> {
    let (parent, id) = name.rsplit_once('.')?;
    let id = id.parse::<u16>().ok()?;
    if parent.is_empty() {
        None
    } else {
        Some((parent, id))
    }
}

/// Classify a kernel link into the closed set of kinds this tool can
/// capture and recreate. `name_by_index` is the pre-built index map of the
/// whole link dump, used to resolve the VXLAN underlay device.
pub(crate) fn classify_link(
    link: &LinkMessage,
    name: &str,
    name_by_index: &HashMap<u32, String>,
) -> Result<LinkKind, NetsnapError> {
    let info_kind = match link_info_kind(link) {
        Some(k) => k,
        None => return Ok(LinkKind::Physical),
    };
    match info_kind {
        InfoKind::Bridge => Ok(LinkKind::Bridge),
        InfoKind::Bond => {
            let mut mode = 0;
            if let Some(InfoData::Bond(infos)) = link_info_data(link) {
                for info in infos {
                    if let InfoBond::Mode(m) = info {
                        mode = *m;
                    }
                }
            }
            Ok(LinkKind::Bond(BondConfig { mode }))
        }
        InfoKind::Vlan => match parse_vlan_name(name) {
            Some((parent, id)) => Ok(LinkKind::Vlan(VlanConfig {
                base_iface: parent.to_string(),
                id,
            })),
            None => {
                log::warn!(
                    "VLAN link {name} is not named <parent>.<vlan_id>, \
                     treating as physical"
                );
                Ok(LinkKind::Physical)
            }
        },
        InfoKind::Vxlan => {
            let mut id = 0;
            let mut local = None;
            let mut underlay_index = None;
            let mut dst_port = VXLAN_DEFAULT_PORT;
            if let Some(InfoData::Vxlan(infos)) = link_info_data(link) {
                for info in infos {
                    match info {
                        InfoVxlan::Id(v) => id = *v,
                        // the local endpoint arrives as raw bytes
                        InfoVxlan::Local(bytes) => {
                            if let Ok(raw) =
                                <[u8; 4]>::try_from(bytes.as_slice())
                            {
                                local = Some(Ipv4Addr::from(raw));
                            }
                        }
                        InfoVxlan::Link(index) => {
                            underlay_index = Some(*index)
                        }
                        InfoVxlan::Port(port) => dst_port = *port,
                        _ => (),
                    }
                }
            }
            let underlay_index = underlay_index.ok_or_else(|| {
                NetsnapError::new(
                    ErrorKind::InvalidArgument,
                    format!("VXLAN {name} carries no underlay device index"),
                )
            })?;
            let base_iface = name_by_index
                .get(&underlay_index)
                .cloned()
                .ok_or_else(|| {
                    NetsnapError::new(
                        ErrorKind::InvalidArgument,
                        format!(
                            "VXLAN {name} refers to unknown underlay \
                             index {underlay_index}"
                        ),
                    )
                })?;
            Ok(LinkKind::Vxlan(VxlanConfig {
                id,
                local,
                base_iface,
                dst_port,
            }))
        }
        _ => Ok(LinkKind::Physical),
    }
}

#[cfg(test)]
mod unit_tests {
    use super::*;

    fn new_link(index: u32, name: &str) -> LinkMessage {
        let mut link = LinkMessage::default();
        link.header.index = index;
        link.attributes
            .push(LinkAttribute::IfName(name.to_string()));
        link
    }

    #[test]
    fn test_classify_physical_without_link_info() {
        let link = new_link(2, "eth0");
        let kind =
            classify_link(&link, "eth0", &HashMap::new()).unwrap();
        assert_eq!(kind, LinkKind::Physical);
    }

    #[test]
    fn test_classify_bridge() {
        let mut link = new_link(3, "br0");
        link.attributes.push(LinkAttribute::LinkInfo(vec![
            LinkInfo::Kind(InfoKind::Bridge),
        ]));
        let kind = classify_link(&link, "br0", &HashMap::new()).unwrap();
        assert_eq!(kind, LinkKind::Bridge);
        assert_eq!(kind.kind_str(), "bridge");
    }

    #[test]
    fn test_classify_bond_mode() {
        let mut link = new_link(4, "bond0");
        link.attributes.push(LinkAttribute::LinkInfo(vec![
            LinkInfo::Kind(InfoKind::Bond),
            LinkInfo::Data(InfoData::Bond(vec![InfoBond::Mode(4)])),
        ]));
        let kind = classify_link(&link, "bond0", &HashMap::new()).unwrap();
        assert_eq!(kind, LinkKind::Bond(BondConfig { mode: 4 }));
        assert_eq!(kind.kind_str(), "bond");
    }

    #[test]
    fn test_classify_vlan_from_name() {
        let mut link = new_link(9, "eth0.100");
        link.attributes.push(LinkAttribute::LinkInfo(vec![
            LinkInfo::Kind(InfoKind::Vlan),
        ]));
        let kind =
            classify_link(&link, "eth0.100", &HashMap::new()).unwrap();
        assert_eq!(
            kind,
            LinkKind::Vlan(VlanConfig {
                base_iface: "eth0".to_string(),
                id: 100
            })
        );
        assert_eq!(kind.kind_str(), "subintf");
    }

    #[test]
    fn test_classify_vlan_bad_id_degrades_to_physical() {
        let mut link = new_link(9, "eth0.abc");
        link.attributes.push(LinkAttribute::LinkInfo(vec![
            LinkInfo::Kind(InfoKind::Vlan),
        ]));
        let kind =
            classify_link(&link, "eth0.abc", &HashMap::new()).unwrap();
        assert_eq!(kind, LinkKind::Physical);
    }

    #[test]
    fn test_classify_vxlan() {
        let mut name_by_index = HashMap::new();
        name_by_index.insert(2u32, "eth1".to_string());
        let mut link = new_link(10, "vx0");
        link.attributes.push(LinkAttribute::LinkInfo(vec![
            LinkInfo::Kind(InfoKind::Vxlan),
            LinkInfo::Data(InfoData::Vxlan(vec![
                InfoVxlan::Id(50),
                InfoVxlan::Local(vec![1, 1, 1, 1]),
                InfoVxlan::Link(2),
                InfoVxlan::Port(4789),
            ])),
        ]));
        let kind = classify_link(&link, "vx0", &name_by_index).unwrap();
        assert_eq!(
            kind,
            LinkKind::Vxlan(VxlanConfig {
                id: 50,
                local: Some(Ipv4Addr::new(1, 1, 1, 1)),
                base_iface: "eth1".to_string(),
                dst_port: 4789,
            })
        );
    }

    #[test]
    fn test_classify_vxlan_malformed_local_ignored() {
        let mut name_by_index = HashMap::new();
        name_by_index.insert(2u32, "eth1".to_string());
        let mut link = new_link(10, "vx0");
        link.attributes.push(LinkAttribute::LinkInfo(vec![
            LinkInfo::Kind(InfoKind::Vxlan),
            LinkInfo::Data(InfoData::Vxlan(vec![
                InfoVxlan::Id(50),
                InfoVxlan::Local(vec![1, 1, 1]),
                InfoVxlan::Link(2),
            ])),
        ]));
        let kind = classify_link(&link, "vx0", &name_by_index).unwrap();
        assert_eq!(
            kind,
            LinkKind::Vxlan(VxlanConfig {
                id: 50,
                local: None,
                base_iface: "eth1".to_string(),
                dst_port: VXLAN_DEFAULT_PORT,
            })
        );
    }

    #[test]
    fn test_classify_vxlan_unknown_underlay_is_error() {
        let mut link = new_link(10, "vx0");
        link.attributes.push(LinkAttribute::LinkInfo(vec![
            LinkInfo::Kind(InfoKind::Vxlan),
            LinkInfo::Data(InfoData::Vxlan(vec![
                InfoVxlan::Id(50),
                InfoVxlan::Link(99),
            ])),
        ]));
        let result = classify_link(&link, "vx0", &HashMap::new());
        assert!(result.is_err());
        assert_eq!(
            result.unwrap_err().kind(),
            ErrorKind::InvalidArgument
        );
    }

    #[test]
    fn test_format_mac_lowercase() {
        assert_eq!(
            format_mac(&[0xAA, 0xBB, 0x0C, 0x1D, 0xEE, 0xFF]),
            "aa:bb:0c:1d:ee:ff"
        );
    }

    #[test]
    fn test_link_attribute_helpers() {
        let mut link = new_link(7, "eth3");
        link.attributes.push(LinkAttribute::Mtu(9000));
        link.attributes.push(LinkAttribute::Address(vec![
            0, 0x11, 0x22, 0x33, 0x44, 0x55,
        ]));
        link.attributes.push(LinkAttribute::OperState(State::Up));
        link.attributes.push(LinkAttribute::Controller(12));

        assert_eq!(link_name(&link).as_deref(), Some("eth3"));
        assert_eq!(link_mtu(&link), Some(9000));
        assert_eq!(link_mac(&link).as_deref(), Some("00:11:22:33:44:55"));
        assert!(link_oper_up(&link));
        assert_eq!(link_controller_index(&link), Some(12));
    }
}

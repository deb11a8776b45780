// SPDX-License-Identifier: Apache-2.0

use futures::stream::{StreamExt, TryStreamExt};
use netlink_packet_core::{
    NetlinkMessage, NetlinkPayload, NLM_F_DUMP, NLM_F_REQUEST,
};
use netlink_packet_route::address::AddressMessage;
use netlink_packet_route::link::LinkMessage;
use netlink_packet_route::neighbour::NeighbourMessage;
use netlink_packet_route::route::RouteMessage;
use netlink_packet_route::{AddressFamily, RouteNetlinkMessage};
use rtnetlink::{Handle, IpVersion};

use crate::{ErrorKind, NetsnapError};

/// Raw rtnetlink dumps of the running network configuration.
#[derive(Debug, Default)]
#[non_exhaustive]
pub struct NetSnapshot {
    pub links: Vec<LinkMessage>,
    pub addrs: Vec<AddressMessage>,
    pub neighs: Vec<NeighbourMessage>,
    pub routes: Vec<RouteMessage>,
}

/// Dump links, IPv4 addresses, neighbors, FDB entries and IPv4 routes
/// from the kernel. Only opening the netlink socket is fatal; a failing
/// dump logs a warning and leaves its section of the snapshot empty.
pub async fn retrieve_snapshot() -> Result<NetSnapshot, NetsnapError> {
    let (connection, handle, _) = match rtnetlink::new_connection() {
        Ok(conn) => conn,
        Err(e) => {
            return Err(NetsnapError::new(
                ErrorKind::NetlinkFailure,
                format!("Failed to start rtnetlink connection: {e}"),
            ));
        }
    };
    tokio::spawn(connection);

    let mut neighs = dump_neighbours(&handle).await;
    // FDB entries live in their own family, the ARP dump does not
    // include them
    neighs.extend(dump_fdb_entries(&handle).await);

    Ok(NetSnapshot {
        links: dump_links(&handle).await,
        addrs: dump_addresses(&handle).await,
        neighs,
        routes: dump_routes(&handle).await,
    })
}

async fn dump_links(handle: &Handle) -> Vec<LinkMessage> {
    let mut links = Vec::new();
    let mut dump = handle.link().get().execute();
    loop {
        match dump.try_next().await {
            Ok(Some(link)) => links.push(link),
            Ok(None) => return links,
            Err(e) => {
                log::warn!("Failed to dump links: {e}");
                return Vec::new();
            }
        }
    }
}

async fn dump_addresses(handle: &Handle) -> Vec<AddressMessage> {
    let mut addrs = Vec::new();
    let mut dump = handle.address().get().execute();
    loop {
        match dump.try_next().await {
            Ok(Some(addr)) => addrs.push(addr),
            Ok(None) => return addrs,
            Err(e) => {
                log::warn!("Failed to dump addresses: {e}");
                return Vec::new();
            }
        }
    }
}

async fn dump_neighbours(handle: &Handle) -> Vec<NeighbourMessage> {
    let mut neighs = Vec::new();
    let mut dump =
        handle.neighbours().get().set_family(IpVersion::V4).execute();
    loop {
        match dump.try_next().await {
            Ok(Some(neigh)) => neighs.push(neigh),
            Ok(None) => return neighs,
            Err(e) => {
                log::warn!("Failed to dump IPv4 neighbors: {e}");
                return Vec::new();
            }
        }
    }
}

// The neighbour API only dumps IPv4 and IPv6; the AF_BRIDGE request
// that returns FDB entries has to be built by hand.
async fn dump_fdb_entries(handle: &Handle) -> Vec<NeighbourMessage> {
    let mut message = NeighbourMessage::default();
    message.header.family = AddressFamily::Bridge;
    let mut req =
        NetlinkMessage::from(RouteNetlinkMessage::GetNeighbour(message));
    req.header.flags = NLM_F_REQUEST | NLM_F_DUMP;

    let mut handle = handle.clone();
    let mut dump = match handle.request(req) {
        Ok(response) => response,
        Err(e) => {
            log::warn!("Failed to dump FDB entries: {e}");
            return Vec::new();
        }
    };
    let mut neighs = Vec::new();
    while let Some(msg) = dump.next().await {
        match msg.payload {
            NetlinkPayload::InnerMessage(
                RouteNetlinkMessage::NewNeighbour(neigh),
            ) => neighs.push(neigh),
            NetlinkPayload::Error(e) => {
                log::warn!("Failed to dump FDB entries: {e}");
                return Vec::new();
            }
            _ => (),
        }
    }
    neighs
}

async fn dump_routes(handle: &Handle) -> Vec<RouteMessage> {
    let mut routes = Vec::new();
    let mut dump = handle.route().get(IpVersion::V4).execute();
    loop {
        match dump.try_next().await {
            Ok(Some(route)) => routes.push(route),
            Ok(None) => return routes,
            Err(e) => {
                log::warn!("Failed to dump IPv4 routes: {e}");
                return Vec::new();
            }
        }
    }
}

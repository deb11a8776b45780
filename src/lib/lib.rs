// SPDX-License-Identifier: Apache-2.0

mod apply;
mod capture;
mod error;
mod ip;
mod link;
mod neigh;
mod query;
mod route;
mod store;

pub use self::apply::{
    apply_interface, apply_interface_routes, apply_script, interface_plan,
    route_plan, script_plan,
};
pub use self::capture::{build_topology, Controller, Iface, NetTopology};
pub use self::error::{ErrorKind, NetsnapError};
pub use self::link::{
    BondConfig, LinkKind, VlanConfig, VxlanConfig, DEFAULT_MTU,
    VXLAN_DEFAULT_PORT,
};
pub use self::neigh::{FdbEntry, NeighborEntry};
pub use self::query::{retrieve_snapshot, NetSnapshot};
pub use self::route::RouteEntry;
pub use self::store::{ConfigStore, DEFAULT_STORE_DIR};

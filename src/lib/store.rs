// SPDX-License-Identifier: Apache-2.0

//! On-disk persistence of a captured topology: a timestamped command
//! script replayable top to bottom, and a per-interface directory tree
//! consumed by the per-interface replay state machines.

use std::fs;
use std::io::Write;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use chrono::Local;

use crate::{ErrorKind, Iface, LinkKind, NetTopology, NetsnapError, RouteEntry};

pub const DEFAULT_STORE_DIR: &str = "/etc/netsnap";

pub(crate) const CONFIG_DIR_NAME: &str = "ipconfig";
pub(crate) const BACKUP_DIR_NAME: &str = "ipconfig.bk";

pub(crate) const TYPE_FILE: &str = "type";
pub(crate) const MTU_FILE: &str = "mtu";
pub(crate) const MODE_FILE: &str = "mode";
pub(crate) const INFO_FILE: &str = "info";
pub(crate) const REAL_FILE: &str = "real";
pub(crate) const MASTER_FILE: &str = "master";
pub(crate) const SUBINTF_FILE: &str = "subintf";
pub(crate) const MEMBERS_FILE: &str = "members";
pub(crate) const ADDR_FILE: &str = "ipv4addr";
pub(crate) const NEIGH_FILE: &str = "ipv4neigh";
pub(crate) const L2FDB_FILE: &str = "l2fdbs";
pub(crate) const VXFDB_FILE: &str = "vxfdbs";
pub(crate) const ROUTE_FILE: &str = "ipv4route";

/// Persists captured topologies below a base directory.
///
/// Each save produces a fresh `ipconfig_<timestamp>.txt` command script
/// in the base directory and rewrites the `ipconfig/` interface tree,
/// rotating the previous tree to `ipconfig.bk` first.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    base: PathBuf,
}

impl ConfigStore {
    pub fn new(base: &Path) -> Self {
        Self {
            base: base.to_path_buf(),
        }
    }

    /// Root of the per-interface tree below this store.
    pub fn config_dir(&self) -> PathBuf {
        self.base.join(CONFIG_DIR_NAME)
    }

    /// Persist `topo` into both representations. Returns the path of the
    /// command script. Failing to set up the script file or rotate the
    /// tree is fatal; a failed write of an individual attribute file is
    /// logged and the walk continues.
    pub fn save(&self, topo: &NetTopology) -> Result<PathBuf, NetsnapError> {
        let mut session = CaptureSession::open(&self.base)?;
        for iface in &topo.ifaces {
            session.write_iface(iface);
        }
        for route in &topo.routes {
            session.write_route(route);
        }
        Ok(session.script_path)
    }
}

/// One capture run: open script handle plus the freshly rotated tree
/// root, fed in step while walking the topology once.
struct CaptureSession {
    script: fs::File,
    script_path: PathBuf,
    config_dir: PathBuf,
}

impl CaptureSession {
    fn open(base: &Path) -> Result<Self, NetsnapError> {
        fs::create_dir_all(base).map_err(|e| {
            NetsnapError::new(
                ErrorKind::StoreFailure,
                format!(
                    "Failed to create store directory {}: {e}",
                    base.display()
                ),
            )
        })?;
        let config_dir = rotate_config_dir(base)?;
        let script_path = base.join(format!(
            "ipconfig_{}.txt",
            Local::now().format("%Y-%m-%d_%H:%M:%S")
        ));
        let script = fs::File::create(&script_path).map_err(|e| {
            NetsnapError::new(
                ErrorKind::StoreFailure,
                format!(
                    "Failed to create command script {}: {e}",
                    script_path.display()
                ),
            )
        })?;
        Ok(Self {
            script,
            script_path,
            config_dir,
        })
    }

    fn write_iface(&mut self, iface: &Iface) {
        let name = &iface.name;
        let dir = self.config_dir.join(name);
        write_scalar(&dir, TYPE_FILE, iface.kind.kind_str());

        match &iface.kind {
            LinkKind::Bridge => {
                self.script_line(&format!("ip link add {name} type bridge"));
            }
            LinkKind::Bond(conf) => {
                self.script_line(&format!("ip link add {name} type bond"));
                self.script_line(&format!(
                    "ip link set {name} type bond mode {}",
                    conf.mode
                ));
                write_scalar(&dir, MODE_FILE, &conf.mode.to_string());
            }
            LinkKind::Vlan(conf) => {
                self.script_line(&format!(
                    "ip link add {name} link {} type vlan id {}",
                    conf.base_iface, conf.id
                ));
                if iface.up {
                    self.script_line(&format!(
                        "ip link set {} up",
                        conf.base_iface
                    ));
                }
                write_scalar(
                    &dir,
                    REAL_FILE,
                    &format!("{}|{}", conf.base_iface, conf.id),
                );
                // the parent's replay machine recreates its tagged
                // sub-interfaces
                append_line(
                    &self.config_dir.join(&conf.base_iface),
                    SUBINTF_FILE,
                    &format!("{name}|{}|{}", conf.base_iface, conf.id),
                );
            }
            LinkKind::Vxlan(conf) => {
                let local = conf.local.unwrap_or(Ipv4Addr::UNSPECIFIED);
                self.script_line(&format!(
                    "ip link add {name} type vxlan id {} local {local} \
                     dev {} dstport {}",
                    conf.id, conf.base_iface, conf.dst_port
                ));
                write_scalar(
                    &dir,
                    INFO_FILE,
                    &format!("{}|{local}|{}", conf.id, conf.base_iface),
                );
            }
            LinkKind::Physical => (),
        }

        if let Some(mtu) = iface.mtu {
            self.script_line(&format!("ip link set {name} mtu {mtu}"));
            write_scalar(&dir, MTU_FILE, &mtu.to_string());
        }
        if iface.up {
            self.script_line(&format!("ip link set {name} up"));
        }
        if let Some(controller) = &iface.controller {
            self.script_line(&format!(
                "ip link set {name} master {}",
                controller.name
            ));
            write_scalar(
                &dir,
                MASTER_FILE,
                &format!("{}|{}", controller.name, controller.kind),
            );
            append_line(
                &self.config_dir.join(&controller.name),
                MEMBERS_FILE,
                name,
            );
        }
        for fdb in &iface.fdbs {
            match fdb.remote {
                Some(remote) => {
                    self.script_line(&format!(
                        "bridge fdb append {} dst {remote} dev {name}",
                        fdb.mac
                    ));
                    append_line(
                        &dir,
                        VXFDB_FILE,
                        &format!("{} dst {remote}", fdb.mac),
                    );
                }
                None => {
                    self.script_line(&format!(
                        "bridge fdb add {} dev {name}",
                        fdb.mac
                    ));
                    append_line(&dir, L2FDB_FILE, &fdb.mac);
                }
            }
        }
        for cidr in &iface.addresses {
            self.script_line(&format!("ip addr add {cidr} dev {name}"));
            append_line(&dir, ADDR_FILE, cidr);
        }
        for neigh in &iface.neighbors {
            self.script_line(&format!(
                "ip neigh add {} lladdr {} dev {name}",
                neigh.ip, neigh.mac
            ));
            append_line(
                &dir,
                NEIGH_FILE,
                &format!("{} lladdr {}", neigh.ip, neigh.mac),
            );
        }
    }

    fn write_route(&mut self, route: &RouteEntry) {
        self.script_line(&format!(
            "ip route add {} via {} proto static",
            route.destination, route.next_hop_addr
        ));
        append_line(
            &self.config_dir.join(&route.next_hop_iface),
            ROUTE_FILE,
            &format!("{} via {}", route.destination, route.next_hop_addr),
        );
    }

    fn script_line(&mut self, line: &str) {
        if let Err(e) = self.script.write_all(format!("{line}\n").as_bytes())
        {
            log::warn!(
                "Failed to write to {}: {e}",
                self.script_path.display()
            );
        }
    }
}

/// Move an existing tree aside and start a fresh one. The rotated copy
/// is the recovery point if this capture goes wrong.
fn rotate_config_dir(base: &Path) -> Result<PathBuf, NetsnapError> {
    let config_dir = base.join(CONFIG_DIR_NAME);
    let backup_dir = base.join(BACKUP_DIR_NAME);
    if config_dir.exists() {
        if backup_dir.exists() {
            fs::remove_dir_all(&backup_dir).map_err(|e| {
                NetsnapError::new(
                    ErrorKind::StoreFailure,
                    format!(
                        "Failed to remove stale backup {}: {e}",
                        backup_dir.display()
                    ),
                )
            })?;
        }
        fs::rename(&config_dir, &backup_dir).map_err(|e| {
            NetsnapError::new(
                ErrorKind::StoreFailure,
                format!(
                    "Failed to rotate {} to {}: {e}",
                    config_dir.display(),
                    backup_dir.display()
                ),
            )
        })?;
    }
    fs::create_dir_all(&config_dir).map_err(|e| {
        NetsnapError::new(
            ErrorKind::StoreFailure,
            format!(
                "Failed to create config tree {}: {e}",
                config_dir.display()
            ),
        )
    })?;
    Ok(config_dir)
}

fn write_scalar(dir: &Path, file: &str, value: &str) {
    if let Err(e) = try_write_scalar(dir, file, value) {
        log::warn!("Failed to write {}: {e}", dir.join(file).display());
    }
}

fn try_write_scalar(dir: &Path, file: &str, value: &str) -> std::io::Result<()> {
    fs::create_dir_all(dir)?;
    fs::write(dir.join(file), format!("{value}\n"))
}

fn append_line(dir: &Path, file: &str, line: &str) {
    if let Err(e) = try_append_line(dir, file, line) {
        log::warn!("Failed to append to {}: {e}", dir.join(file).display());
    }
}

fn try_append_line(dir: &Path, file: &str, line: &str) -> std::io::Result<()> {
    fs::create_dir_all(dir)?;
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join(file))?;
    file.write_all(format!("{line}\n").as_bytes())
}

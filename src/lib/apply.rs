// SPDX-License-Identifier: Apache-2.0

//! Replays a persisted capture: either a command script top to bottom,
//! or one interface's directory through a per-kind state machine.
//! Planning and execution are split so callers can print a plan without
//! touching the system.

use std::fs;
use std::path::Path;
use std::process::Command;

use crate::link::VXLAN_DEFAULT_PORT;
use crate::store::{
    ADDR_FILE, INFO_FILE, L2FDB_FILE, MASTER_FILE, MODE_FILE, MTU_FILE,
    NEIGH_FILE, ROUTE_FILE, SUBINTF_FILE, TYPE_FILE, VXFDB_FILE,
};
use crate::{ErrorKind, NetsnapError};

/// Read a command script into its replayable lines. Blank lines are
/// dropped, everything else is kept verbatim.
pub fn script_plan(path: &Path) -> Result<Vec<String>, NetsnapError> {
    let content = fs::read_to_string(path).map_err(|e| {
        NetsnapError::new(
            ErrorKind::ApplyFailure,
            format!("Failed to read command script {}: {e}", path.display()),
        )
    })?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect())
}

/// Replay a command script, command by command.
pub fn apply_script(path: &Path) -> Result<(), NetsnapError> {
    run_plan(&script_plan(path)?);
    Ok(())
}

/// Build the ordered command list recreating one interface from its
/// directory below `base`. The `type` file decides the state machine;
/// a missing or unknown type is an error, every other file is optional.
pub fn interface_plan(
    base: &Path,
    iface: &str,
) -> Result<Vec<String>, NetsnapError> {
    let dir = base.join(iface);
    let kind = match read_scalar(&dir.join(TYPE_FILE)) {
        Some(kind) => kind,
        None => {
            return Err(NetsnapError::new(
                ErrorKind::InvalidArgument,
                format!("Unable to read interface type of {iface}"),
            ));
        }
    };
    let mut plan = Vec::new();
    match kind.as_str() {
        "phy" | "bond" => {
            set_dev(&mut plan, iface);
            mtu_cmds(&mut plan, &dir, iface);
            addr_cmds(&mut plan, &dir, iface);
            l2_fdb_cmds(&mut plan, &dir, iface);
            neigh_cmds(&mut plan, &dir, iface);
            route_cmds(&mut plan, &dir);
            subintf_cmds(&mut plan, &dir);
            master_cmds(&mut plan, base, &dir, iface);
        }
        "subintf" => {
            set_dev(&mut plan, iface);
            addr_cmds(&mut plan, &dir, iface);
            neigh_cmds(&mut plan, &dir, iface);
            route_cmds(&mut plan, &dir);
            subintf_cmds(&mut plan, &dir);
            master_cmds(&mut plan, base, &dir, iface);
        }
        "bridge" => {
            set_dev(&mut plan, iface);
            addr_cmds(&mut plan, &dir, iface);
            neigh_cmds(&mut plan, &dir, iface);
            route_cmds(&mut plan, &dir);
            master_cmds(&mut plan, base, &dir, iface);
        }
        "vxlan" => {
            set_dev(&mut plan, iface);
            addr_cmds(&mut plan, &dir, iface);
            vx_fdb_cmds(&mut plan, &dir, iface);
            neigh_cmds(&mut plan, &dir, iface);
            route_cmds(&mut plan, &dir);
            master_cmds(&mut plan, base, &dir, iface);
        }
        other => {
            return Err(NetsnapError::new(
                ErrorKind::InvalidArgument,
                format!("Unknown interface type {other} of {iface}"),
            ));
        }
    }
    Ok(plan)
}

/// Replay one interface from its directory below `base`.
pub fn apply_interface(base: &Path, iface: &str) -> Result<(), NetsnapError> {
    run_plan(&interface_plan(base, iface)?);
    Ok(())
}

/// Build the command list replaying only the static routes leaving
/// through `iface`. An interface without an `ipv4route` file yields an
/// empty plan.
pub fn route_plan(
    base: &Path,
    iface: &str,
) -> Result<Vec<String>, NetsnapError> {
    let mut plan = Vec::new();
    route_cmds(&mut plan, &base.join(iface));
    Ok(plan)
}

/// Replay only the static routes of one interface.
pub fn apply_interface_routes(
    base: &Path,
    iface: &str,
) -> Result<(), NetsnapError> {
    run_plan(&route_plan(base, iface)?);
    Ok(())
}

fn set_dev(plan: &mut Vec<String>, iface: &str) {
    plan.push(format!("ip link set {iface} up"));
}

fn mtu_cmds(plan: &mut Vec<String>, dir: &Path, iface: &str) {
    if let Some(mtu) = read_scalar(&dir.join(MTU_FILE)) {
        plan.push(format!("ip link set dev {iface} mtu {mtu}"));
    }
}

fn addr_cmds(plan: &mut Vec<String>, dir: &Path, iface: &str) {
    for line in read_lines(&dir.join(ADDR_FILE)) {
        plan.push(format!("ip addr add {line} dev {iface}"));
    }
}

fn l2_fdb_cmds(plan: &mut Vec<String>, dir: &Path, iface: &str) {
    for line in read_lines(&dir.join(L2FDB_FILE)) {
        plan.push(format!("bridge fdb add {line} dev {iface} permanent"));
    }
}

fn vx_fdb_cmds(plan: &mut Vec<String>, dir: &Path, iface: &str) {
    for line in read_lines(&dir.join(VXFDB_FILE)) {
        plan.push(format!("bridge fdb append {line} dev {iface} permanent"));
    }
}

// replace keeps re-application error-free, `ip neigh add` refuses
// duplicates
fn neigh_cmds(plan: &mut Vec<String>, dir: &Path, iface: &str) {
    for line in read_lines(&dir.join(NEIGH_FILE)) {
        plan.push(format!("ip neigh replace {line} dev {iface}"));
    }
}

fn route_cmds(plan: &mut Vec<String>, dir: &Path) {
    for line in read_lines(&dir.join(ROUTE_FILE)) {
        plan.push(format!("ip route replace {line} proto static"));
    }
}

fn subintf_cmds(plan: &mut Vec<String>, dir: &Path) {
    for line in read_lines(&dir.join(SUBINTF_FILE)) {
        let fields: Vec<&str> = line.split('|').collect();
        if fields.len() != 3 {
            log::warn!("Malformed sub-interface entry {line:?}");
            continue;
        }
        plan.push(format!(
            "ip link add {} link {} type vlan id {}",
            fields[0], fields[1], fields[2]
        ));
        plan.push(format!("ip link set {} up", fields[0]));
    }
}

/// Recreate the controller named by the `master` file, then enslave the
/// interface to it. A VXLAN controller is rebuilt from its own `info`
/// file and never enslaves its member.
fn master_cmds(
    plan: &mut Vec<String>,
    base: &Path,
    dir: &Path,
    iface: &str,
) {
    let master_line = match read_scalar(&dir.join(MASTER_FILE)) {
        Some(line) => line,
        None => return,
    };
    let (master, kind) = match master_line.split_once('|') {
        Some(parts) => parts,
        None => {
            log::warn!("Malformed master entry {master_line:?} of {iface}");
            return;
        }
    };
    match kind {
        "bridge" => {
            plan.push(format!("ip link add {master} type bridge"));
            plan.push(format!("ip link set {master} up"));
            enslave(plan, iface, master);
        }
        "bond" => {
            plan.push(format!("ip link add {master} type bond"));
            if let Some(mode) =
                read_scalar(&base.join(master).join(MODE_FILE))
            {
                plan.push(format!(
                    "ip link set {master} type bond mode {mode}"
                ));
            }
            plan.push(format!("ip link set {master} up"));
            enslave(plan, iface, master);
        }
        "vxlan" => {
            let info = match read_scalar(&base.join(master).join(INFO_FILE))
            {
                Some(info) => info,
                None => {
                    log::warn!(
                        "Unable to read VXLAN settings of {master}, \
                         skipping controller of {iface}"
                    );
                    return;
                }
            };
            let fields: Vec<&str> = info.split('|').collect();
            if fields.len() != 3 {
                log::warn!("Malformed VXLAN settings {info:?} of {master}");
                return;
            }
            plan.push(format!(
                "ip link add {master} type vxlan id {} local {} dev {} \
                 dstport {VXLAN_DEFAULT_PORT}",
                fields[0], fields[1], fields[2]
            ));
            plan.push(format!("ip link set {master} up"));
        }
        other => {
            log::warn!("Unknown controller kind {other} of {iface}");
        }
    }
}

fn enslave(plan: &mut Vec<String>, iface: &str, master: &str) {
    plan.push(format!("ip link set {iface} down"));
    plan.push(format!("ip link set {iface} master {master}"));
    plan.push(format!("ip link set {iface} up"));
}

fn run_plan(plan: &[String]) {
    for cmd in plan {
        run_command(cmd);
    }
}

fn run_command(cmd: &str) {
    log::info!("Running: {cmd}");
    match Command::new("bash").arg("-c").arg(cmd).output() {
        Ok(output) => {
            if !output.status.success() {
                log::warn!(
                    "Command failed ({}): {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                );
            }
        }
        Err(e) => log::warn!("Failed to run {cmd}: {e}"),
    }
}

fn read_lines(path: &Path) -> Vec<String> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Vec::new();
        }
        Err(e) => {
            log::warn!("Failed to read {}: {e}", path.display());
            return Vec::new();
        }
    };
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect()
}

fn read_scalar(path: &Path) -> Option<String> {
    read_lines(path).into_iter().next()
}

// SPDX-License-Identifier: Apache-2.0

use std::path::Path;

use netsnap::{
    apply_interface, apply_interface_routes, apply_script, interface_plan,
    route_plan, script_plan, ConfigStore, DEFAULT_STORE_DIR,
};

use super::CliError;

pub(crate) struct CommandApply;

impl CommandApply {
    pub(crate) const CMD: &str = "apply";

    pub(crate) fn new_cmd() -> clap::Command {
        clap::Command::new("apply")
            .alias("a")
            .about("Replay a captured network topology")
            .arg(
                clap::Arg::new("FILE")
                    .long("file")
                    .short('f')
                    .num_args(1)
                    .help("Command script to replay"),
            )
            .arg(
                clap::Arg::new("INTF")
                    .long("per-intf")
                    .short('i')
                    .num_args(1)
                    .help("Interface to replay from the config tree"),
            )
            .arg(
                clap::Arg::new("ROUTE_ONLY")
                    .long("route-only")
                    .short('r')
                    .action(clap::ArgAction::SetTrue)
                    .requires("INTF")
                    .help("Replay only the static routes of the interface"),
            )
            .arg(
                clap::Arg::new("CONFIG_PATH")
                    .long("config-path")
                    .short('c')
                    .num_args(1)
                    .default_value(DEFAULT_STORE_DIR)
                    .help("Base directory of the captured configuration"),
            )
            .arg(
                clap::Arg::new("DRY_RUN")
                    .long("dry-run")
                    .short('d')
                    .action(clap::ArgAction::SetTrue)
                    .help("Print the replay commands without running them"),
            )
            .group(
                clap::ArgGroup::new("SOURCE")
                    .args(["FILE", "INTF"])
                    .required(true),
            )
    }

    pub(crate) async fn handle(
        matches: &clap::ArgMatches,
    ) -> Result<(), CliError> {
        let dry_run = matches.get_flag("DRY_RUN");

        if let Some(file) = matches.get_one::<String>("FILE") {
            let path = Path::new(file);
            if dry_run {
                print_plan(&script_plan(path)?);
            } else {
                apply_script(path)?;
                println!("Configuration applied - {}", path.display());
            }
            return Ok(());
        }

        let iface = match matches.get_one::<String>("INTF") {
            Some(iface) => iface,
            None => {
                return Err(CliError::from(
                    "No command script or interface given",
                ));
            }
        };
        let base = match matches.get_one::<String>("CONFIG_PATH") {
            Some(path) => path.to_string(),
            None => DEFAULT_STORE_DIR.to_string(),
        };
        let tree = ConfigStore::new(Path::new(&base)).config_dir();

        if matches.get_flag("ROUTE_ONLY") {
            if dry_run {
                print_plan(&route_plan(&tree, iface)?);
            } else {
                apply_interface_routes(&tree, iface)?;
                println!("Route configuration applied for - {iface}");
            }
        } else if dry_run {
            print_plan(&interface_plan(&tree, iface)?);
        } else {
            apply_interface(&tree, iface)?;
            println!("Configuration applied for - {iface}");
        }
        Ok(())
    }
}

fn print_plan(plan: &[String]) {
    for cmd in plan {
        println!("{cmd}");
    }
}

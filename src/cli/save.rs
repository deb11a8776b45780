// SPDX-License-Identifier: Apache-2.0

use std::path::Path;

use netsnap::{
    build_topology, retrieve_snapshot, ConfigStore, DEFAULT_STORE_DIR,
};

use super::CliError;

pub(crate) struct CommandSave;

impl CommandSave {
    pub(crate) const CMD: &str = "save";

    pub(crate) fn new_cmd() -> clap::Command {
        clap::Command::new("save")
            .about("Capture the running network topology")
            .arg(
                clap::Arg::new("CONFIG_PATH")
                    .long("config-path")
                    .short('c')
                    .num_args(1)
                    .default_value(DEFAULT_STORE_DIR)
                    .help("Base directory for the captured configuration"),
            )
    }

    pub(crate) async fn handle(
        matches: &clap::ArgMatches,
    ) -> Result<(), CliError> {
        let base = match matches.get_one::<String>("CONFIG_PATH") {
            Some(path) => path.to_string(),
            None => DEFAULT_STORE_DIR.to_string(),
        };
        let snapshot = retrieve_snapshot().await?;
        let topo = build_topology(&snapshot);
        let store = ConfigStore::new(Path::new(&base));
        let script_path = store.save(&topo)?;
        println!("IP configuration saved in {}", script_path.display());
        Ok(())
    }
}

// SPDX-License-Identifier: Apache-2.0

use netsnap::{build_topology, retrieve_snapshot};

use super::CliError;

pub(crate) struct CommandShow;

impl CommandShow {
    pub(crate) const CMD: &str = "show";

    pub(crate) fn new_cmd() -> clap::Command {
        clap::Command::new("show")
            .alias("s")
            .about("Query the running network topology")
    }

    pub(crate) async fn handle(
        _matches: &clap::ArgMatches,
    ) -> Result<(), CliError> {
        let snapshot = retrieve_snapshot().await?;
        let topo = build_topology(&snapshot);
        println!("{}", serde_yaml::to_string(&topo)?);
        Ok(())
    }
}

use std::sync::Arc;

use anyhow::{anyhow, Result};
use chrono::Utc;
use clap::Args;
use colored::*;
use mgn_client::{ListFilter, MgnApi};
use mgn_types::{ServerFilter, ServerRecord, ServerStatus};

use crate::config::HelperConfig;
use crate::output::{server_header, server_row};

#[derive(Clone, Debug, Args)]
pub struct ListCommand {
    /// Only servers in this status, by label ("Ready for Test") or
    /// lifecycle name (READY_FOR_TEST). Repeatable.
    #[clap(long = "status")]
    pub statuses: Vec<String>,
    /// Case-insensitive match on name or id
    #[clap(long, short)]
    pub search: Option<String>,
    /// Only servers that currently have a test instance
    #[clap(long)]
    pub has_test_instance: bool,
    /// Print the reconciled records as JSON
    #[clap(long)]
    pub json: bool,
}

/// Resolve status arguments, accepting labels and lifecycle names
pub fn parse_statuses(raw: &[String]) -> Result<Vec<ServerStatus>> {
    let mut statuses = Vec::new();
    for value in raw {
        let mut matched = ServerStatus::from_label(value);
        if matched.is_empty() {
            let status = ServerStatus::from_lifecycle(&value.trim().to_uppercase());
            if status != ServerStatus::Unknown {
                matched.push(status);
            }
        }
        if matched.is_empty() {
            return Err(anyhow!("Unrecognized status: {value}"));
        }
        for status in matched {
            if !statuses.contains(&status) {
                statuses.push(status);
            }
        }
    }
    Ok(statuses)
}

impl ListCommand {
    pub fn filter(&self) -> Result<ServerFilter> {
        let mut filter = ServerFilter::default();
        let statuses = parse_statuses(&self.statuses)?;
        if !statuses.is_empty() {
            filter = filter.with_statuses(statuses);
        }
        if let Some(term) = &self.search {
            filter = filter.with_search(term.clone());
        }
        if self.has_test_instance {
            filter = filter.with_test_instance(true);
        }
        Ok(filter)
    }

    pub async fn handle(&self, config: &HelperConfig, api: Arc<dyn MgnApi>) -> Result<()> {
        let filter = self.filter()?;
        // UNKNOWN also covers states the service reports under other names
        let remote_filter = filter
            .statuses
            .as_deref()
            .filter(|statuses| !statuses.contains(&ServerStatus::Unknown))
            .map(ListFilter::statuses);

        let inventory = config.inventory(api);
        let servers = inventory.list_servers(remote_filter.as_ref()).await?;
        let selected: Vec<&ServerRecord> = filter.apply(&servers);

        if self.json {
            println!("{}", serde_json::to_string_pretty(&selected)?);
            return Ok(());
        }

        println!(
            "{} {} of {} source servers in {}",
            "Showing".bold(),
            selected.len().to_string().bright_cyan(),
            servers.len(),
            config.region.bright_yellow()
        );
        println!("{}", server_header());
        let now = Utc::now();
        for server in selected {
            println!("{}", server_row(server, now));
        }
        Ok(())
    }
}

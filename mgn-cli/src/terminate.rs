use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use mgn_client::MgnApi;
use mgn_types::{OperationOutcome, ServerRecord};

use crate::bulk::{follow, prepare, select_ids};
use crate::config::HelperConfig;

#[derive(Clone, Debug, Args)]
pub struct TerminateTestCommand {
    /// Source server ids, comma separated
    #[clap(long, short, value_delimiter = ',')]
    pub ids: Vec<String>,
    /// Every server that currently has a test instance
    #[clap(long, conflicts_with = "ids")]
    pub all_with_test_instance: bool,
}

impl TerminateTestCommand {
    pub async fn handle(&self, config: &HelperConfig, api: Arc<dyn MgnApi>) -> Result<OperationOutcome> {
        let (coordinator, servers) = prepare(config, api).await?;
        let auto: Option<fn(&ServerRecord) -> bool> = if self.all_with_test_instance {
            Some(ServerRecord::has_test_instance)
        } else {
            None
        };
        let ids = select_ids(&self.ids, &servers, auto)?;

        let progress = follow(coordinator.terminate_test(ids)).await?;
        Ok(progress.outcome())
    }
}

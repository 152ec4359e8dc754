use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use mgn_client::MgnApi;
use mgn_types::{LaunchTestOptions, OperationOutcome, ServerRecord};

use crate::bulk::{follow, prepare, print_job_statuses, select_ids};
use crate::config::HelperConfig;

#[derive(Clone, Debug, Args)]
pub struct LaunchTestCommand {
    /// Source server ids, comma separated
    #[clap(long, short, value_delimiter = ',')]
    pub ids: Vec<String>,
    /// Every server that is ready for testing
    #[clap(long, conflicts_with = "ids")]
    pub all_ready: bool,
    /// Pin this instance type instead of the recommended one
    #[clap(long)]
    pub instance_type: Option<String>,
    /// Launch into this subnet ("subnet-123" or "subnet-123 (label)")
    #[clap(long)]
    pub subnet: Option<String>,
    /// Describe the launched jobs once the operation finishes
    #[clap(long)]
    pub poll: bool,
}

impl LaunchTestCommand {
    pub fn options(&self) -> LaunchTestOptions {
        LaunchTestOptions {
            instance_type: self.instance_type.clone(),
            subnet_id: self.subnet.clone(),
        }
    }

    pub async fn handle(&self, config: &HelperConfig, api: Arc<dyn MgnApi>) -> Result<OperationOutcome> {
        let (coordinator, servers) = prepare(config, api.clone()).await?;
        let auto: Option<fn(&ServerRecord) -> bool> = if self.all_ready {
            Some(|s: &ServerRecord| s.status.is_ready_for_test())
        } else {
            None
        };
        let ids = select_ids(&self.ids, &servers, auto)?;

        let progress = follow(coordinator.launch_test(ids, self.options())).await?;
        if self.poll {
            print_job_statuses(&coordinator, api, &progress).await;
        }
        Ok(progress.outcome())
    }
}

use std::sync::Arc;

use anyhow::{anyhow, Result};
use clap::Args;
use mgn_client::MgnApi;

use crate::output::job_line;

#[derive(Clone, Debug, Args)]
pub struct JobCommand {
    /// Job id returned by a launch or terminate call
    pub job_id: String,
}

impl JobCommand {
    pub async fn handle(&self, api: Arc<dyn MgnApi>) -> Result<()> {
        let job = api
            .describe_job(&self.job_id)
            .await?
            .ok_or_else(|| anyhow!("Job {} not found", self.job_id))?;
        println!("{}", job_line(&self.job_id, Some(&job)));
        if let Some(end_time) = &job.end_time {
            println!("  finished at {end_time}");
        }
        Ok(())
    }
}

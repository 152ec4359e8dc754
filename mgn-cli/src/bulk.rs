use std::sync::Arc;

use anyhow::{anyhow, Result};
use colored::*;
use log::warn;
use mgn_bulk::{poll_job_statuses, BulkOperationCoordinator, BulkOperationHandle};
use mgn_client::MgnApi;
use mgn_types::{BulkOperationProgress, ServerRecord};

use crate::config::HelperConfig;
use crate::output::{job_line, progress_line, summary};

/// Ids to operate on: the explicit list when one was given, otherwise
/// every listed server matching `auto`
pub fn select_ids(explicit: &[String], servers: &[ServerRecord], auto: Option<fn(&ServerRecord) -> bool>) -> Result<Vec<String>> {
    let ids: Vec<String> = if !explicit.is_empty() {
        let mut ids = Vec::with_capacity(explicit.len());
        for id in explicit.iter().map(|id| id.trim()).filter(|id| !id.is_empty()) {
            if !ids.iter().any(|seen: &String| seen == id) {
                ids.push(id.to_string());
            }
        }
        ids
    } else if let Some(predicate) = auto {
        servers.iter().filter(|s| predicate(s)).map(|s| s.id.clone()).collect()
    } else {
        return Err(anyhow!("No servers selected; pass --ids or a selection flag"));
    };

    if ids.is_empty() {
        return Err(anyhow!("No servers matched the selection"));
    }
    Ok(ids)
}

/// Shared setup for launch and terminate: list servers for names and
/// selection, build the coordinator
pub async fn prepare(config: &HelperConfig, api: Arc<dyn MgnApi>) -> Result<(BulkOperationCoordinator, Vec<ServerRecord>)> {
    let inventory = config.inventory(api.clone());
    let servers = inventory.list_servers(None).await?;
    let mut coordinator = BulkOperationCoordinator::new(api, &config.bulk_config());
    coordinator.update_server_list(&servers);
    Ok((coordinator, servers))
}

/// Print snapshots as they arrive until the operation ends. Ctrl-C stops
/// new units from starting.
pub async fn follow(mut handle: BulkOperationHandle) -> Result<BulkOperationProgress> {
    let operation_type = handle.operation_type();
    println!(
        "{} ({})",
        operation_type.title().bold().bright_cyan(),
        handle.operation_id().to_string().dimmed()
    );

    let cancel = handle.cancel_token();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            println!("{}", "Cancelling: servers already started will finish".bright_yellow());
            cancel.cancel();
        }
    });

    while let Some(snapshot) = handle.next_snapshot().await {
        println!("{}", progress_line(&snapshot));
    }
    interrupt.abort();

    let progress = handle.wait().await?;
    println!("\n{}", summary(operation_type, &progress));
    Ok(progress)
}

pub async fn print_job_statuses(coordinator: &BulkOperationCoordinator, api: Arc<dyn MgnApi>, progress: &BulkOperationProgress) {
    let statuses = poll_job_statuses(api, coordinator.executor(), progress.results()).await;
    if statuses.is_empty() {
        warn!("No jobs to poll");
        return;
    }
    println!("\n{}", "Job status".bold());
    for (server_id, job) in statuses {
        println!("  {}", job_line(&coordinator.directory().name_for(&server_id), job.as_ref()));
    }
}

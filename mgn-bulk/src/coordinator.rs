//! Bulk launch/terminate of test instances.
//!
//! Every unit runs on the [`ConcurrentExecutor`] and reports `Started` and
//! `Finished` events over a channel. A single aggregator task owns the
//! [`BulkOperationProgress`], folds each event into it and publishes a
//! snapshot after every finished unit, so the counters only ever change
//! in one place.

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use log::{debug, error, info, warn};
use mgn_client::{ClientError, JobHandle, LaunchConfigurationUpdate, MgnApi};
use mgn_types::{
    fallback_server_name, BulkOperationProgress, BulkOperationResult, BulkOperationState, JobDescription,
    LaunchTestOptions, OperationType, ServerRecord,
};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::BulkConfig;
use crate::errors::BulkError;
use crate::executor::{panic_message, ConcurrentExecutor};

/// Display names for server ids, taken from the last listing
#[derive(Clone, Debug, Default)]
pub struct ServerDirectory {
    names: HashMap<String, String>,
}

impl ServerDirectory {
    pub fn from_servers(servers: &[ServerRecord]) -> Self {
        Self {
            names: servers
                .iter()
                .map(|s| (s.id.clone(), s.name.clone()))
                .collect(),
        }
    }

    pub fn name_for(&self, server_id: &str) -> String {
        self.names
            .get(server_id)
            .cloned()
            .unwrap_or_else(|| fallback_server_name(server_id))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

enum UnitEvent {
    Started,
    Finished(BulkOperationResult),
}

/// A running bulk operation.
///
/// Snapshots arrive in completion order: one for the initial state, then
/// one after each finished unit. The stream ends when the operation does.
pub struct BulkOperationHandle {
    operation_id: Uuid,
    operation_type: OperationType,
    snapshots: UnboundedReceiverStream<BulkOperationProgress>,
    state: watch::Receiver<BulkOperationState>,
    cancel: CancellationToken,
    task: JoinHandle<BulkOperationProgress>,
}

impl BulkOperationHandle {
    pub fn operation_id(&self) -> Uuid {
        self.operation_id
    }

    pub fn operation_type(&self) -> OperationType {
        self.operation_type
    }

    pub fn state(&self) -> BulkOperationState {
        *self.state.borrow()
    }

    /// Stop starting new units. Calls already in flight still finish.
    pub fn cancel(&self) {
        info!("Cancelling bulk operation {}", self.operation_id);
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Token that cancels this operation, for use from another task
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn snapshots(&mut self) -> &mut UnboundedReceiverStream<BulkOperationProgress> {
        &mut self.snapshots
    }

    pub async fn next_snapshot(&mut self) -> Option<BulkOperationProgress> {
        self.snapshots.next().await
    }

    /// Drain the remaining snapshots and return the final progress
    pub async fn wait(mut self) -> Result<BulkOperationProgress, BulkError> {
        while self.snapshots.next().await.is_some() {}
        self.task
            .await
            .map_err(|e| BulkError::Aggregator(e.to_string()))
    }
}

/// Drives launch-test and terminate-test over sets of server ids
#[derive(Clone)]
pub struct BulkOperationCoordinator {
    api: Arc<dyn MgnApi>,
    executor: ConcurrentExecutor,
    directory: Arc<ServerDirectory>,
}

impl BulkOperationCoordinator {
    pub fn new(api: Arc<dyn MgnApi>, config: &BulkConfig) -> Self {
        Self {
            api,
            executor: ConcurrentExecutor::from_config(&config.clone().normalized()),
            directory: Arc::new(ServerDirectory::default()),
        }
    }

    pub fn with_executor(api: Arc<dyn MgnApi>, executor: ConcurrentExecutor) -> Self {
        Self {
            api,
            executor,
            directory: Arc::new(ServerDirectory::default()),
        }
    }

    /// Remember the names of the servers from the latest listing
    pub fn update_server_list(&mut self, servers: &[ServerRecord]) {
        self.directory = Arc::new(ServerDirectory::from_servers(servers));
    }

    pub fn directory(&self) -> &ServerDirectory {
        &self.directory
    }

    pub fn executor(&self) -> &ConcurrentExecutor {
        &self.executor
    }

    /// Launch test instances, applying `options` to each server's launch
    /// configuration first when they ask for a change
    pub fn launch_test(&self, server_ids: Vec<String>, options: LaunchTestOptions) -> BulkOperationHandle {
        let update = LaunchConfigurationUpdate::from_options(&options).map(Arc::new);
        self.run_with(OperationType::LaunchTest, server_ids, move |api, server_id| {
            let update = update.clone();
            async move {
                if let Some(update) = update {
                    api.update_launch_configuration(&server_id, &update).await?;
                }
                api.start_test(&[server_id]).await
            }
        })
    }

    pub fn terminate_test(&self, server_ids: Vec<String>) -> BulkOperationHandle {
        self.run_with(OperationType::TerminateTest, server_ids, |api, server_id| async move {
            api.stop_test(&[server_id]).await
        })
    }

    /// Run `invoke` once per server id and track the outcomes.
    ///
    /// Any error from `invoke` becomes a failed result carrying the remote
    /// message; nothing here fails the operation as a whole.
    pub fn run_with<F, Fut>(&self, operation_type: OperationType, server_ids: Vec<String>, invoke: F) -> BulkOperationHandle
    where
        F: Fn(Arc<dyn MgnApi>, String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<JobHandle, ClientError>> + Send + 'static,
    {
        let operation_id = Uuid::new_v4();
        let total = server_ids.len();
        let cancel = CancellationToken::new();
        let (snapshot_tx, snapshot_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(BulkOperationState::Created);

        let aggregator = tokio::spawn(aggregate(total, event_rx, snapshot_tx, state_tx));

        let api = self.api.clone();
        let directory = self.directory.clone();
        let executor = self.executor.clone();
        let invoke = Arc::new(invoke);
        let run_cancel = cancel.clone();

        let task = tokio::spawn(async move {
            info!(
                "Starting {operation_type} operation {operation_id} on {total} servers ({} concurrent)",
                executor.max_concurrent()
            );
            let started_at = Instant::now();

            executor
                .run_cancellable(
                    server_ids,
                    move |server_id: String| {
                        let api = api.clone();
                        let invoke = invoke.clone();
                        let events = event_tx.clone();
                        let server_name = directory.name_for(&server_id);
                        async move {
                            report(&events, operation_id, UnitEvent::Started);
                            let call = AssertUnwindSafe(async { invoke(api, server_id.clone()).await })
                                .catch_unwind()
                                .await;
                            let result = match call {
                                Ok(outcome) => classify(operation_type, server_id, server_name, outcome),
                                Err(panic) => {
                                    let message = panic_message(panic);
                                    error!("{operation_type} panicked for {server_name} ({server_id}): {message}");
                                    BulkOperationResult::failed(server_id, server_name, operation_type, message)
                                }
                            };
                            report(&events, operation_id, UnitEvent::Finished(result));
                            Ok::<_, ClientError>(())
                        }
                    },
                    |_, _| {},
                    run_cancel,
                )
                .await;

            let progress = match aggregator.await {
                Ok(progress) => progress,
                Err(e) => {
                    error!("Progress aggregator for {operation_id} failed: {e}");
                    BulkOperationProgress::new(total)
                }
            };

            info!(
                "{} operation {operation_id} finished in {:.2}s: {} succeeded, {} failed, {} not started",
                operation_type.title(),
                started_at.elapsed().as_secs_f64(),
                progress.successful(),
                progress.failed(),
                total - progress.completed()
            );
            progress
        });

        BulkOperationHandle {
            operation_id,
            operation_type,
            snapshots: UnboundedReceiverStream::new(snapshot_rx),
            state: state_rx,
            cancel,
            task,
        }
    }
}

fn report(events: &mpsc::UnboundedSender<UnitEvent>, operation_id: Uuid, event: UnitEvent) {
    if events.send(event).is_err() {
        error!("Progress aggregator for {operation_id} is gone, dropping unit event");
    }
}

fn classify(
    operation_type: OperationType,
    server_id: String,
    server_name: String,
    outcome: Result<JobHandle, ClientError>,
) -> BulkOperationResult {
    match outcome {
        Ok(handle) => {
            info!("{operation_type} succeeded for {server_name} ({server_id})");
            BulkOperationResult::succeeded(server_id, server_name, operation_type, handle.job_id)
        }
        Err(e) => {
            error!("{operation_type} failed for {server_name} ({server_id}): {e}");
            BulkOperationResult::failed(server_id, server_name, operation_type, e.remote_message())
        }
    }
}

/// Sole owner of the progress for one operation
async fn aggregate(
    total: usize,
    mut events: mpsc::UnboundedReceiver<UnitEvent>,
    snapshots: mpsc::UnboundedSender<BulkOperationProgress>,
    state: watch::Sender<BulkOperationState>,
) -> BulkOperationProgress {
    let mut progress = BulkOperationProgress::new(total);
    publish(&snapshots, &progress);
    if state.send(BulkOperationState::Running).is_err() {
        debug!("Nobody is watching the operation state");
    }

    while let Some(event) = events.recv().await {
        match event {
            UnitEvent::Started => progress.begin_unit(),
            UnitEvent::Finished(result) => {
                progress.record(result);
                publish(&snapshots, &progress);
            }
        }
    }

    if state.send(BulkOperationState::Completed).is_err() {
        debug!("Nobody is watching the operation state");
    }
    progress
}

fn publish(snapshots: &mpsc::UnboundedSender<BulkOperationProgress>, progress: &BulkOperationProgress) {
    if snapshots.send(progress.clone()).is_err() {
        debug!(
            "Snapshot stream closed at {}/{} completed",
            progress.completed(),
            progress.total_servers()
        );
    }
}

/// Describe the job behind every successful result, through the same
/// executor and rate limit as the operation itself. A job that cannot be
/// described comes back as `None`.
pub async fn poll_job_statuses(
    api: Arc<dyn MgnApi>,
    executor: &ConcurrentExecutor,
    results: &[BulkOperationResult],
) -> Vec<(String, Option<JobDescription>)> {
    let jobs: Vec<(String, String)> = results
        .iter()
        .filter(|r| r.success())
        .filter_map(|r| Some((r.server_id().to_string(), r.job_id()?.to_string())))
        .collect();
    let server_ids: Vec<String> = jobs.iter().map(|(server_id, _)| server_id.clone()).collect();

    let outputs = executor
        .run(
            jobs,
            move |(_, job_id): (String, String)| {
                let api = api.clone();
                async move { api.describe_job(&job_id).await }
            },
            |_, _| {},
        )
        .await;

    server_ids
        .into_iter()
        .zip(outputs)
        .map(|(server_id, output)| match output {
            Ok(description) => (server_id, description),
            Err(e) => {
                warn!("Could not describe job for {server_id}: {e}");
                (server_id, None)
            }
        })
        .collect()
}

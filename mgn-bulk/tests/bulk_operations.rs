use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use mgn_bulk::{poll_job_statuses, BulkConfig, BulkOperationCoordinator, ConcurrentExecutor, RateLimiter};
use mgn_client::{ClientError, JobHandle, LaunchConfigurationUpdate, ListFilter, MgnApi};
use mgn_types::{
    BulkOperationState, JobDescription, LaunchTestOptions, OperationOutcome, OperationType, ReplicationStatus,
    ServerRecord, ServerStatus,
};
use serde_json::Value;

/// Answers each call from a per-server script and records what it saw
#[derive(Default)]
struct ScriptedApi {
    outcomes: HashMap<String, Result<String, String>>,
    delays: HashMap<String, Duration>,
    updates: Mutex<Vec<(String, LaunchConfigurationUpdate)>>,
    failing_updates: Vec<String>,
    jobs: HashMap<String, JobDescription>,
}

impl ScriptedApi {
    async fn answer(&self, server_ids: &[String]) -> Result<JobHandle, ClientError> {
        let id = &server_ids[0];
        if let Some(delay) = self.delays.get(id) {
            tokio::time::sleep(*delay).await;
        }
        match self.outcomes.get(id) {
            Some(Ok(job_id)) => Ok(JobHandle {
                job_id: Some(job_id.clone()),
            }),
            Some(Err(message)) => Err(ClientError::api("ThrottlingException", message.clone())),
            None => Err(ClientError::api("UninitializedAccountException", "unknown server")),
        }
    }
}

#[async_trait]
impl MgnApi for ScriptedApi {
    async fn list_source_servers(&self, _filter: Option<&ListFilter>) -> Result<Vec<Value>, ClientError> {
        Ok(Vec::new())
    }

    async fn start_test(&self, server_ids: &[String]) -> Result<JobHandle, ClientError> {
        if server_ids[0] == "s-panics" {
            panic!("client blew up");
        }
        self.answer(server_ids).await
    }

    async fn stop_test(&self, server_ids: &[String]) -> Result<JobHandle, ClientError> {
        self.answer(server_ids).await
    }

    async fn describe_job(&self, job_id: &str) -> Result<Option<JobDescription>, ClientError> {
        if job_id == "job-broken" {
            return Err(ClientError::Connection("reset by peer".to_string()));
        }
        Ok(self.jobs.get(job_id).cloned())
    }

    async fn update_launch_configuration(
        &self,
        server_id: &str,
        update: &LaunchConfigurationUpdate,
    ) -> Result<(), ClientError> {
        if self.failing_updates.iter().any(|id| id == server_id) {
            return Err(ClientError::api("ValidationException", "invalid subnet"));
        }
        self.updates
            .lock()
            .unwrap()
            .push((server_id.to_string(), update.clone()));
        Ok(())
    }
}

fn ids(n: usize) -> Vec<String> {
    (1..=n).map(|i| format!("s-{i:010}")).collect()
}

fn server(id: &str, name: &str) -> ServerRecord {
    ServerRecord {
        id: id.to_string(),
        name: name.to_string(),
        status: ServerStatus::ReadyForTest,
        replication_status: ReplicationStatus::Continuous,
        region: "us-east-1".to_string(),
        last_seen: None,
        test_instance_id: None,
        test_instance_state: None,
        target_instance_type: None,
        tags: HashMap::new(),
        description: None,
    }
}

fn fast_config(max_concurrent: usize) -> BulkConfig {
    BulkConfig::new(max_concurrent, 1000, Duration::from_secs(1))
}

#[tokio::test]
async fn test_seven_succeed_three_throttled() {
    let server_ids = ids(10);
    let mut api = ScriptedApi::default();
    for (i, id) in server_ids.iter().enumerate() {
        let outcome = if i < 7 {
            Ok(format!("job-{}", i + 1))
        } else {
            Err("throttled".to_string())
        };
        api.outcomes.insert(id.clone(), outcome);
    }

    let coordinator = BulkOperationCoordinator::new(Arc::new(api), &fast_config(4));
    let mut handle = coordinator.launch_test(server_ids, LaunchTestOptions::default());
    assert_eq!(handle.operation_type(), OperationType::LaunchTest);

    let mut snapshots = Vec::new();
    while let Some(snapshot) = handle.next_snapshot().await {
        assert_eq!(snapshot.completed(), snapshot.successful() + snapshot.failed());
        assert!(snapshot.completed() <= snapshot.total_servers());
        snapshots.push(snapshot);
    }
    let progress = handle.wait().await.unwrap();

    // initial snapshot plus one per completion
    assert_eq!(snapshots.len(), 11);
    assert_eq!(snapshots[0].completed(), 0);
    for (i, snapshot) in snapshots.iter().enumerate() {
        assert_eq!(snapshot.completed(), i);
    }

    assert_eq!(progress.completed(), 10);
    assert_eq!(progress.successful(), 7);
    assert_eq!(progress.failed(), 3);
    assert_eq!(progress.in_progress(), 0);
    assert!(progress.is_complete());
    assert_eq!(progress.progress_percentage(), 100.0);
    assert_eq!(progress.outcome(), OperationOutcome::Mixed);
    assert_eq!(&progress, snapshots.last().unwrap());

    let throttled: Vec<_> = progress
        .results()
        .iter()
        .filter(|r| r.error_message() == Some("throttled"))
        .collect();
    assert_eq!(throttled.len(), 3);
    assert!(throttled.iter().all(|r| !r.success() && r.job_id().is_none()));

    let mut job_ids: Vec<_> = progress.results().iter().filter_map(|r| r.job_id()).collect();
    job_ids.sort();
    assert_eq!(job_ids, vec!["job-1", "job-2", "job-3", "job-4", "job-5", "job-6", "job-7"]);
}

#[tokio::test]
async fn test_empty_operation_is_complete_immediately() {
    let coordinator = BulkOperationCoordinator::new(Arc::new(ScriptedApi::default()), &BulkConfig::default());
    let mut handle = coordinator.terminate_test(Vec::new());

    let first = handle.next_snapshot().await.unwrap();
    assert!(first.is_complete());
    assert_eq!(first.progress_percentage(), 0.0);
    assert!(handle.next_snapshot().await.is_none());

    let progress = handle.wait().await.unwrap();
    assert_eq!(progress.completed(), 0);
    assert_eq!(progress.outcome(), OperationOutcome::AllSucceeded);
}

#[tokio::test]
async fn test_names_come_from_last_listing() {
    let server_ids = vec!["s-aaaaaaaaaaaa".to_string(), "s-bbbbbbbbbbbb".to_string()];
    let mut api = ScriptedApi::default();
    for id in &server_ids {
        api.outcomes.insert(id.clone(), Ok("job-x".to_string()));
    }

    let mut coordinator = BulkOperationCoordinator::new(Arc::new(api), &fast_config(2));
    coordinator.update_server_list(&[server("s-aaaaaaaaaaaa", "web01")]);

    let progress = coordinator.terminate_test(server_ids).wait().await.unwrap();
    let mut names: Vec<_> = progress.results().iter().map(|r| r.server_name().to_string()).collect();
    names.sort();
    assert_eq!(names, vec!["Server-s-bbbbbb", "web01"]);
    assert!(progress
        .results()
        .iter()
        .all(|r| r.operation_type() == OperationType::TerminateTest));
}

#[tokio::test]
async fn test_launch_options_update_configuration_first() {
    let server_ids = ids(3);
    let mut api = ScriptedApi::default();
    for id in &server_ids {
        api.outcomes.insert(id.clone(), Ok("job-1".to_string()));
    }
    api.failing_updates.push(server_ids[1].clone());
    let api = Arc::new(api);

    let coordinator = BulkOperationCoordinator::new(api.clone(), &fast_config(1));
    let options = LaunchTestOptions {
        instance_type: Some("c5.xlarge".to_string()),
        subnet_id: Some("subnet-0abc (private)".to_string()),
    };
    let progress = coordinator.launch_test(server_ids.clone(), options).wait().await.unwrap();

    assert_eq!(progress.successful(), 2);
    assert_eq!(progress.failed(), 1);
    let failed = progress.results().iter().find(|r| !r.success()).unwrap();
    assert_eq!(failed.server_id(), server_ids[1]);
    assert_eq!(failed.error_message(), Some("invalid subnet"));

    let updates = api.updates.lock().unwrap().clone();
    assert_eq!(updates.len(), 2);
    let (_, update) = &updates[0];
    assert_eq!(update.target_instance_type.as_deref(), Some("c5.xlarge"));
    assert_eq!(update.subnet_id.as_deref(), Some("subnet-0abc"));
    assert_eq!(update.launch_disposition.as_deref(), Some("STOPPED"));
}

#[tokio::test]
async fn test_panicking_call_is_a_failed_result() {
    let mut api = ScriptedApi::default();
    api.outcomes.insert("s-fine".to_string(), Ok("job-1".to_string()));

    let coordinator = BulkOperationCoordinator::new(Arc::new(api), &fast_config(2));
    let progress = coordinator
        .launch_test(vec!["s-fine".to_string(), "s-panics".to_string()], LaunchTestOptions::default())
        .wait()
        .await
        .unwrap();

    assert_eq!(progress.completed(), 2);
    assert_eq!(progress.failed(), 1);
    let failed = progress.results().iter().find(|r| !r.success()).unwrap();
    assert_eq!(failed.server_id(), "s-panics");
    assert_eq!(failed.error_message(), Some("client blew up"));
}

#[tokio::test(start_paused = true)]
async fn test_panic_is_reported_while_other_units_run() {
    let mut api = ScriptedApi::default();
    api.outcomes.insert("s-slow".to_string(), Ok("job-1".to_string()));
    api.delays.insert("s-slow".to_string(), Duration::from_secs(30));

    let coordinator = BulkOperationCoordinator::new(Arc::new(api), &fast_config(2));
    let start = tokio::time::Instant::now();
    let mut handle =
        coordinator.launch_test(vec!["s-slow".to_string(), "s-panics".to_string()], LaunchTestOptions::default());

    let initial = handle.next_snapshot().await.unwrap();
    assert_eq!(initial.completed(), 0);

    let after_panic = handle.next_snapshot().await.unwrap();
    assert!(start.elapsed() < Duration::from_secs(30));
    assert_eq!(after_panic.completed(), 1);
    assert_eq!(after_panic.failed(), 1);
    assert_eq!(after_panic.successful(), 0);
    assert!(after_panic.in_progress() <= 1);
    assert_eq!(after_panic.results()[0].server_id(), "s-panics");
    assert_eq!(after_panic.results()[0].error_message(), Some("client blew up"));

    let last = handle.next_snapshot().await.unwrap();
    assert!(start.elapsed() >= Duration::from_secs(30));
    assert_eq!(last.completed(), 2);
    assert_eq!(last.successful(), 1);
    assert_eq!(last.in_progress(), 0);
    assert!(handle.next_snapshot().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_cancel_stops_unstarted_units() {
    let server_ids = ids(6);
    let mut api = ScriptedApi::default();
    for id in &server_ids {
        api.outcomes.insert(id.clone(), Ok("job-1".to_string()));
        api.delays.insert(id.clone(), Duration::from_secs(5));
    }

    let coordinator = BulkOperationCoordinator::new(Arc::new(api), &fast_config(2));
    let mut handle = coordinator.terminate_test(server_ids);

    let initial = handle.next_snapshot().await.unwrap();
    assert_eq!(initial.completed(), 0);
    // let the first two units get admitted and start their calls
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(handle.state(), BulkOperationState::Running);
    handle.cancel();
    assert!(handle.is_cancelled());

    let progress = handle.wait().await.unwrap();
    assert_eq!(progress.completed(), 2);
    assert_eq!(progress.successful(), 2);
    assert!(!progress.is_complete());
    assert_eq!(progress.outcome(), OperationOutcome::Pending);
}

#[tokio::test]
async fn test_poll_job_statuses() {
    let mut api = ScriptedApi::default();
    api.outcomes.insert("s-1".to_string(), Ok("job-done".to_string()));
    api.outcomes.insert("s-2".to_string(), Ok("job-broken".to_string()));
    api.outcomes.insert("s-3".to_string(), Err("throttled".to_string()));
    api.jobs.insert(
        "job-done".to_string(),
        JobDescription {
            job_id: "job-done".to_string(),
            status: Some("COMPLETED".to_string()),
            progress_percentage: 100.0,
            end_time: None,
        },
    );
    let api: Arc<dyn MgnApi> = Arc::new(api);

    let coordinator = BulkOperationCoordinator::new(api.clone(), &fast_config(3));
    let progress = coordinator
        .launch_test(
            vec!["s-1".to_string(), "s-2".to_string(), "s-3".to_string()],
            LaunchTestOptions::default(),
        )
        .wait()
        .await
        .unwrap();

    let executor = ConcurrentExecutor::new(2, Arc::new(RateLimiter::new(10, Duration::from_secs(1))));
    let mut statuses = poll_job_statuses(api, &executor, progress.results()).await;
    statuses.sort_by(|a, b| a.0.cmp(&b.0));

    assert_eq!(statuses.len(), 2);
    assert_eq!(statuses[0].0, "s-1");
    assert!(statuses[0].1.as_ref().unwrap().is_finished());
    assert_eq!(statuses[1], ("s-2".to_string(), None));
}

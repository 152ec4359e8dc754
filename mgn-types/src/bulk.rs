use chrono::{DateTime, Utc};
use derive_more::Display;
use serde::{Deserialize, Serialize};

/// The logical action a bulk operation applies to each server
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Display)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    #[display(fmt = "launch_test")]
    LaunchTest,
    #[display(fmt = "terminate_test")]
    TerminateTest,
}

impl OperationType {
    pub fn title(&self) -> &'static str {
        match self {
            OperationType::LaunchTest => "Launching Test Instances",
            OperationType::TerminateTest => "Terminating Test Instances",
        }
    }
}

/// Outcome of one remote call made on behalf of one server
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct BulkOperationResult {
    server_id: String,
    server_name: String,
    success: bool,
    operation_type: OperationType,
    timestamp: DateTime<Utc>,
    error_message: Option<String>,
    job_id: Option<String>,
}

impl BulkOperationResult {
    pub fn succeeded(
        server_id: String,
        server_name: String,
        operation_type: OperationType,
        job_id: Option<String>,
    ) -> Self {
        Self {
            server_id,
            server_name,
            success: true,
            operation_type,
            timestamp: Utc::now(),
            error_message: None,
            job_id,
        }
    }

    pub fn failed(
        server_id: String,
        server_name: String,
        operation_type: OperationType,
        error_message: String,
    ) -> Self {
        Self {
            server_id,
            server_name,
            success: false,
            operation_type,
            timestamp: Utc::now(),
            error_message: Some(error_message),
            job_id: None,
        }
    }

    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    pub fn success(&self) -> bool {
        self.success
    }

    pub fn operation_type(&self) -> OperationType {
        self.operation_type
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn job_id(&self) -> Option<&str> {
        self.job_id.as_deref()
    }
}

/// Lifecycle of a bulk operation. There is no cancelled state: a
/// cancelled operation still finishes the units it had started and ends
/// as `Completed`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum BulkOperationState {
    Created,
    Running,
    Completed,
}

/// Summary of a finished operation
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum OperationOutcome {
    Pending,
    AllSucceeded,
    AllFailed,
    Mixed,
}

/// Aggregate progress of one bulk operation.
///
/// `completed == successful + failed` holds after every call to
/// [`BulkOperationProgress::record`], which is the only way the counters
/// advance.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct BulkOperationProgress {
    total_servers: usize,
    completed: usize,
    successful: usize,
    failed: usize,
    in_progress: usize,
    results: Vec<BulkOperationResult>,
}

impl BulkOperationProgress {
    pub fn new(total_servers: usize) -> Self {
        Self {
            total_servers,
            completed: 0,
            successful: 0,
            failed: 0,
            in_progress: 0,
            results: Vec::with_capacity(total_servers),
        }
    }

    /// Note that a unit has started its remote call
    pub fn begin_unit(&mut self) {
        self.in_progress += 1;
    }

    /// Fold one finished unit into the aggregate
    pub fn record(&mut self, result: BulkOperationResult) {
        self.in_progress = self.in_progress.saturating_sub(1);
        if result.success {
            self.successful += 1;
        } else {
            self.failed += 1;
        }
        self.completed += 1;
        self.results.push(result);
    }

    pub fn total_servers(&self) -> usize {
        self.total_servers
    }

    pub fn completed(&self) -> usize {
        self.completed
    }

    pub fn successful(&self) -> usize {
        self.successful
    }

    pub fn failed(&self) -> usize {
        self.failed
    }

    pub fn in_progress(&self) -> usize {
        self.in_progress
    }

    pub fn results(&self) -> &[BulkOperationResult] {
        &self.results
    }

    pub fn progress_percentage(&self) -> f64 {
        if self.total_servers == 0 {
            return 0.0;
        }
        (self.completed as f64 / self.total_servers as f64) * 100.0
    }

    pub fn is_complete(&self) -> bool {
        self.completed >= self.total_servers
    }

    pub fn outcome(&self) -> OperationOutcome {
        if !self.is_complete() {
            OperationOutcome::Pending
        } else if self.failed == 0 {
            OperationOutcome::AllSucceeded
        } else if self.successful == 0 {
            OperationOutcome::AllFailed
        } else {
            OperationOutcome::Mixed
        }
    }
}

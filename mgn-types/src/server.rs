use std::collections::HashMap;
use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Canonical lifecycle state of a source server
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerStatus {
    Unknown,
    NotReady,
    ReadyForTest,
    ReadyForTesting,
    ReadyForCutover,
    CutoverInProgress,
    CutoverComplete,
    CutoverCompleted,
    CutoverFailed,
    TestInProgress,
    TestComplete,
    TestCompleted,
    TestFailed,
    Stalled,
    Disconnected,
    Error,
    Stopped,
}

/// Lifecycle strings the remote service reports, and what they mean to us.
/// Anything not listed here resolves to `ServerStatus::Unknown`.
const LIFECYCLE_TABLE: &[(&str, ServerStatus)] = &[
    ("READY_FOR_TEST", ServerStatus::ReadyForTest),
    ("READY_FOR_TESTING", ServerStatus::ReadyForTesting),
    ("READY_FOR_CUTOVER", ServerStatus::ReadyForCutover),
    ("CUTOVER_IN_PROGRESS", ServerStatus::CutoverInProgress),
    ("CUTOVER_COMPLETE", ServerStatus::CutoverComplete),
    ("CUTOVER_COMPLETED", ServerStatus::CutoverCompleted),
    ("STOPPED", ServerStatus::Stopped),
    ("STALLED", ServerStatus::Stalled),
    ("ERROR", ServerStatus::Error),
    ("DISCONNECTED", ServerStatus::Disconnected),
    ("NOT_READY", ServerStatus::NotReady),
    ("TEST_IN_PROGRESS", ServerStatus::TestInProgress),
    ("TEST_COMPLETE", ServerStatus::TestComplete),
    ("TEST_COMPLETED", ServerStatus::TestCompleted),
    ("TEST_FAILED", ServerStatus::TestFailed),
];

/// Coarse grouping of lifecycle states, used for display and selection
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum StatusCategory {
    Ready,
    InProgress,
    Succeeded,
    Failed,
    Inactive,
    Unknown,
}

impl ServerStatus {
    pub const ALL: [ServerStatus; 17] = [
        ServerStatus::Unknown,
        ServerStatus::NotReady,
        ServerStatus::ReadyForTest,
        ServerStatus::ReadyForTesting,
        ServerStatus::ReadyForCutover,
        ServerStatus::CutoverInProgress,
        ServerStatus::CutoverComplete,
        ServerStatus::CutoverCompleted,
        ServerStatus::CutoverFailed,
        ServerStatus::TestInProgress,
        ServerStatus::TestComplete,
        ServerStatus::TestCompleted,
        ServerStatus::TestFailed,
        ServerStatus::Stalled,
        ServerStatus::Disconnected,
        ServerStatus::Error,
        ServerStatus::Stopped,
    ];

    /// Map a raw lifecycle state string. Never fails.
    pub fn from_lifecycle(raw: &str) -> Self {
        LIFECYCLE_TABLE
            .iter()
            .find(|(name, _)| *name == raw)
            .map(|(_, status)| *status)
            .unwrap_or(ServerStatus::Unknown)
    }

    pub fn label(&self) -> &'static str {
        match self {
            ServerStatus::Unknown => "Unknown",
            ServerStatus::NotReady => "Not Ready",
            ServerStatus::ReadyForTest => "Ready for Test",
            ServerStatus::ReadyForTesting => "Ready for Testing",
            ServerStatus::ReadyForCutover => "Ready for Cutover",
            ServerStatus::CutoverInProgress => "Cutover in Progress",
            ServerStatus::CutoverComplete => "Cutover Complete",
            ServerStatus::CutoverCompleted => "Cutover Completed",
            ServerStatus::CutoverFailed => "Cutover Failed",
            ServerStatus::TestInProgress => "Test in Progress",
            ServerStatus::TestComplete => "Test Complete",
            ServerStatus::TestCompleted => "Test Completed",
            ServerStatus::TestFailed => "Test Failed",
            ServerStatus::Stalled => "Stalled",
            ServerStatus::Disconnected => "Disconnected",
            ServerStatus::Error => "Error",
            ServerStatus::Stopped => "Stopped",
        }
    }

    /// Resolve an operator-facing label to the statuses it selects.
    ///
    /// "Test Completed" and "Cutover Completed" cover both spellings the
    /// remote service uses. Matching ignores case.
    pub fn from_label(label: &str) -> Vec<ServerStatus> {
        let wanted = label.trim().to_lowercase();
        match wanted.as_str() {
            "test completed" => vec![ServerStatus::TestComplete, ServerStatus::TestCompleted],
            "cutover completed" => vec![ServerStatus::CutoverComplete, ServerStatus::CutoverCompleted],
            _ => Self::ALL
                .iter()
                .filter(|s| s.label().to_lowercase() == wanted)
                .copied()
                .collect(),
        }
    }

    pub fn category(&self) -> StatusCategory {
        match self {
            ServerStatus::ReadyForTest
            | ServerStatus::ReadyForTesting
            | ServerStatus::ReadyForCutover => StatusCategory::Ready,
            ServerStatus::TestInProgress | ServerStatus::CutoverInProgress => StatusCategory::InProgress,
            ServerStatus::TestComplete
            | ServerStatus::TestCompleted
            | ServerStatus::CutoverComplete
            | ServerStatus::CutoverCompleted => StatusCategory::Succeeded,
            ServerStatus::TestFailed
            | ServerStatus::CutoverFailed
            | ServerStatus::Stalled
            | ServerStatus::Error => StatusCategory::Failed,
            ServerStatus::NotReady | ServerStatus::Disconnected | ServerStatus::Stopped => StatusCategory::Inactive,
            ServerStatus::Unknown => StatusCategory::Unknown,
        }
    }

    pub fn is_ready_for_test(&self) -> bool {
        matches!(self, ServerStatus::ReadyForTest | ServerStatus::ReadyForTesting)
    }
}

impl Display for ServerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Canonical replication state of a source server
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReplicationStatus {
    Unknown,
    Replicating,
    Replicated,
    Failed,
    Stopped,
    InitialSync,
    Backlog,
    Continuous,
}

impl ReplicationStatus {
    /// Map an explicit replication state string.
    ///
    /// Returns `None` for anything outside the known table so the caller
    /// can fall through to weaker signals.
    pub fn from_state(raw: &str) -> Option<Self> {
        match raw {
            "STOPPED" => Some(ReplicationStatus::Stopped),
            "FAILED" => Some(ReplicationStatus::Failed),
            "INITIAL_SYNC" => Some(ReplicationStatus::InitialSync),
            "INITIAL_SYNC_COMPLETE" => Some(ReplicationStatus::Replicated),
            "BACKLOG" => Some(ReplicationStatus::Backlog),
            "CONTINUOUS" => Some(ReplicationStatus::Continuous),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ReplicationStatus::Unknown => "Unknown",
            ReplicationStatus::Replicating => "Replicating",
            ReplicationStatus::Replicated => "Replicated",
            ReplicationStatus::Failed => "Failed",
            ReplicationStatus::Stopped => "Stopped",
            ReplicationStatus::InitialSync => "Initial Sync",
            ReplicationStatus::Backlog => "Backlog",
            ReplicationStatus::Continuous => "Continuous",
        }
    }
}

impl Display for ReplicationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Display name used when a server carries no better hint.
pub fn fallback_server_name(server_id: &str) -> String {
    let prefix: String = server_id.chars().take(8).collect();
    format!("Server-{prefix}")
}

/// A source server after reconciliation
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerRecord {
    pub id: String,
    pub name: String,
    pub status: ServerStatus,
    pub replication_status: ReplicationStatus,
    pub region: String,
    pub last_seen: Option<DateTime<Utc>>,
    pub test_instance_id: Option<String>,
    pub test_instance_state: Option<String>,
    pub target_instance_type: Option<String>,
    #[serde(default)]
    pub tags: HashMap<String, String>,
    pub description: Option<String>,
}

impl ServerRecord {
    pub fn has_test_instance(&self) -> bool {
        self.test_instance_id.is_some()
    }

    /// Human readable age of `last_seen` relative to `now`
    pub fn last_seen_ago(&self, now: DateTime<Utc>) -> String {
        let Some(last_seen) = self.last_seen else {
            return "Unknown".to_string();
        };

        let diff = now.signed_duration_since(last_seen);
        if diff.num_days() > 0 {
            format!("{} day(s) ago", diff.num_days())
        } else if diff.num_seconds() > 3600 {
            format!("{} hour(s) ago", diff.num_hours())
        } else if diff.num_seconds() > 60 {
            format!("{} min ago", diff.num_minutes())
        } else {
            "Just now".to_string()
        }
    }
}

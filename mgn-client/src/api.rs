use async_trait::async_trait;
use mgn_types::{JobDescription, LaunchTestOptions, ServerStatus};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::ClientError;

/// Filter forwarded to the remote listing call
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ListFilter {
    pub lifecycle_states: Vec<String>,
}

impl ListFilter {
    pub fn lifecycle(status: &str) -> Self {
        Self {
            lifecycle_states: vec![status.to_string()],
        }
    }

    pub fn statuses(statuses: &[ServerStatus]) -> Self {
        Self {
            lifecycle_states: statuses
                .iter()
                .filter_map(|s| serde_json::to_value(s).ok())
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lifecycle_states.is_empty()
    }
}

/// Handle returned for an action the service runs asynchronously
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobHandle {
    pub job_id: Option<String>,
}

/// Launch configuration change applied before a test launch
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LaunchConfigurationUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_instance_type_right_sizing_method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_instance_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub launch_disposition: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subnet_id: Option<String>,
}

impl LaunchConfigurationUpdate {
    /// Build the update a set of launch options asks for, or `None` when
    /// the current configuration can be used as is.
    pub fn from_options(options: &LaunchTestOptions) -> Option<Self> {
        if !options.requires_update() {
            return None;
        }

        let mut update = LaunchConfigurationUpdate::default();
        if let Some(instance_type) = options.pinned_instance_type() {
            update.target_instance_type_right_sizing_method = Some("NONE".to_string());
            update.target_instance_type = Some(instance_type.to_string());
        }
        if let Some(subnet) = options.subnet() {
            // the service only accepts a subnet override for stopped launches
            update.launch_disposition = Some("STOPPED".to_string());
            update.subnet_id = Some(subnet.to_string());
        }
        Some(update)
    }
}

/// The migration service as the rest of the system sees it.
///
/// Action calls are id-scoped; callers pass one id per logical call even
/// though implementations may forward batches.
#[async_trait]
pub trait MgnApi: Send + Sync {
    /// Every raw source server record, across all pages
    async fn list_source_servers(&self, filter: Option<&ListFilter>) -> Result<Vec<Value>, ClientError>;

    async fn start_test(&self, server_ids: &[String]) -> Result<JobHandle, ClientError>;

    async fn stop_test(&self, server_ids: &[String]) -> Result<JobHandle, ClientError>;

    async fn describe_job(&self, job_id: &str) -> Result<Option<JobDescription>, ClientError>;

    async fn update_launch_configuration(
        &self,
        server_id: &str,
        update: &LaunchConfigurationUpdate,
    ) -> Result<(), ClientError>;
}

/// Best-effort lookup of a compute instance's state. `None` is an
/// expected answer, not a failure.
#[async_trait]
pub trait InstanceDescriber: Send + Sync {
    async fn describe_instance_state(&self, instance_id: &str) -> Option<String>;
}

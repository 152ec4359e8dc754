use serde::{Deserialize, Serialize};

/// What the remote service reports about an asynchronous job
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct JobDescription {
    pub job_id: String,
    pub status: Option<String>,
    #[serde(default)]
    pub progress_percentage: f64,
    pub end_time: Option<String>,
}

impl JobDescription {
    pub fn is_finished(&self) -> bool {
        matches!(self.status.as_deref(), Some("COMPLETED"))
    }
}

/// Parameters applied to a server's launch configuration before a test
/// launch
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LaunchTestOptions {
    pub instance_type: Option<String>,
    pub subnet_id: Option<String>,
}

/// Placeholder an operator surface uses for "keep the recommended type"
pub const USE_RECOMMENDED_INSTANCE_TYPE: &str = "Use recommended";

impl LaunchTestOptions {
    /// The explicit instance type to pin, if any
    pub fn pinned_instance_type(&self) -> Option<&str> {
        self.instance_type
            .as_deref()
            .filter(|t| !t.is_empty() && *t != USE_RECOMMENDED_INSTANCE_TYPE)
    }

    /// Subnet id, tolerating a "subnet-123 (description)" display form
    pub fn subnet(&self) -> Option<&str> {
        self.subnet_id
            .as_deref()
            .and_then(|s| s.split_whitespace().next())
    }

    pub fn requires_update(&self) -> bool {
        self.pinned_instance_type().is_some() || self.subnet().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recommended_type_is_not_pinned() {
        let options = LaunchTestOptions {
            instance_type: Some(USE_RECOMMENDED_INSTANCE_TYPE.to_string()),
            subnet_id: None,
        };
        assert_eq!(options.pinned_instance_type(), None);
        assert!(!options.requires_update());
    }

    #[test]
    fn test_subnet_display_form() {
        let options = LaunchTestOptions {
            instance_type: Some("t3.medium".to_string()),
            subnet_id: Some("subnet-0abc (private-a)".to_string()),
        };
        assert_eq!(options.pinned_instance_type(), Some("t3.medium"));
        assert_eq!(options.subnet(), Some("subnet-0abc"));
        assert!(options.requires_update());
    }

    #[test]
    fn test_job_finished() {
        let job = JobDescription {
            job_id: "mgnjob-1".to_string(),
            status: Some("COMPLETED".to_string()),
            progress_percentage: 100.0,
            end_time: None,
        };
        assert!(job.is_finished());
        assert!(!LaunchTestOptions::default().requires_update());
    }
}

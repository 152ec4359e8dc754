use std::sync::Arc;

use log::{error, info};
use mgn_types::ServerRecord;

use crate::api::{InstanceDescriber, ListFilter, MgnApi};
use crate::errors::ClientError;
use crate::reconcile::StatusReconciler;

/// Lists source servers and hands back reconciled records.
///
/// Either the whole list comes back or a single error does; records that
/// fail reconciliation are dropped from the list, they never fail it.
#[derive(Clone)]
pub struct ServerInventory {
    api: Arc<dyn MgnApi>,
    reconciler: StatusReconciler,
    describer: Option<Arc<dyn InstanceDescriber>>,
}

impl ServerInventory {
    pub fn new(api: Arc<dyn MgnApi>, region: impl Into<String>) -> Self {
        Self {
            api,
            reconciler: StatusReconciler::new(region),
            describer: None,
        }
    }

    /// Attach a lookup used to fill in test instance states the records
    /// did not carry
    pub fn with_instance_describer(mut self, describer: Arc<dyn InstanceDescriber>) -> Self {
        self.describer = Some(describer);
        self
    }

    pub fn reconciler(&self) -> &StatusReconciler {
        &self.reconciler
    }

    pub async fn list_servers(&self, filter: Option<&ListFilter>) -> Result<Vec<ServerRecord>, ClientError> {
        info!("Fetching source servers from migration service...");
        let raws = self.api.list_source_servers(filter).await.map_err(|e| {
            error!("Failed to fetch source servers: {e}");
            e
        })?;
        info!("Found {} source servers in response", raws.len());

        let mut servers = self.reconciler.reconcile_all(&raws);
        if let Some(describer) = &self.describer {
            self.reconciler.resolve_instance_states(&mut servers, describer.as_ref()).await;
        }

        info!("Successfully parsed {} source servers", servers.len());
        Ok(servers)
    }

    /// Cheap reachability probe
    pub async fn test_connection(&self) -> bool {
        match self.api.list_source_servers(None).await {
            Ok(_) => true,
            Err(e) => {
                error!("Migration service connection test failed: {e}");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{JobHandle, LaunchConfigurationUpdate};
    use async_trait::async_trait;
    use mgn_types::JobDescription;
    use serde_json::{json, Value};

    struct StaticApi {
        listing: Result<Vec<Value>, String>,
    }

    #[async_trait]
    impl MgnApi for StaticApi {
        async fn list_source_servers(&self, _filter: Option<&ListFilter>) -> Result<Vec<Value>, ClientError> {
            self.listing.clone().map_err(ClientError::Connection)
        }

        async fn start_test(&self, _server_ids: &[String]) -> Result<JobHandle, ClientError> {
            unimplemented!()
        }

        async fn stop_test(&self, _server_ids: &[String]) -> Result<JobHandle, ClientError> {
            unimplemented!()
        }

        async fn describe_job(&self, _job_id: &str) -> Result<Option<JobDescription>, ClientError> {
            Ok(None)
        }

        async fn update_launch_configuration(
            &self,
            _server_id: &str,
            _update: &LaunchConfigurationUpdate,
        ) -> Result<(), ClientError> {
            Ok(())
        }
    }

    struct Pending;

    #[async_trait]
    impl InstanceDescriber for Pending {
        async fn describe_instance_state(&self, _instance_id: &str) -> Option<String> {
            Some("pending".to_string())
        }
    }

    #[tokio::test]
    async fn test_listing_skips_malformed_records() {
        let api = StaticApi {
            listing: Ok(vec![
                json!({"sourceServerID": "s-aaa", "tags": [{"key": "Name", "value": "web01"}]}),
                json!({"tags": {"Name": "orphan"}}),
                json!({"sourceServerID": "s-bbb", "launchedInstance": {"ec2InstanceID": "i-0aaaaaaaaaaaaaaaa"}}),
            ]),
        };
        let inventory = ServerInventory::new(Arc::new(api), "eu-west-1")
            .with_instance_describer(Arc::new(Pending));

        let servers = inventory.list_servers(None).await.unwrap();
        assert_eq!(servers.len(), 2);
        assert_eq!(servers[0].name, "web01");
        assert_eq!(servers[0].region, "eu-west-1");
        assert_eq!(servers[1].test_instance_state.as_deref(), Some("pending"));
    }

    #[tokio::test]
    async fn test_listing_failure_is_a_single_error() {
        let api = StaticApi {
            listing: Err("connection refused".to_string()),
        };
        let inventory = ServerInventory::new(Arc::new(api), "us-east-1");
        let err = inventory.list_servers(None).await.unwrap_err();
        assert!(matches!(err, ClientError::Connection(_)));
        assert!(!inventory.test_connection().await);
    }
}

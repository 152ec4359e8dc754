use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use mgn_types::JobDescription;
use reqwest::{Client, Response};
use serde::Serialize;
use serde_json::{json, Value};

use crate::api::{InstanceDescriber, JobHandle, LaunchConfigurationUpdate, ListFilter, MgnApi};
use crate::errors::ClientError;

const DEFAULT_PAGE_SIZE: usize = 100;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
/// Guards against a service that keeps handing back the same token
const MAX_PAGES: usize = 1000;

/// [`MgnApi`] over the service's JSON-over-HTTP interface.
///
/// Request signing is expected to happen in front of `endpoint` (a local
/// signing proxy or a service emulator); this client only speaks the
/// operation protocol.
#[derive(Clone, Debug)]
pub struct HttpMgnClient {
    client: Client,
    endpoint: String,
    page_size: usize,
}

impl HttpMgnClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self::with_timeout(endpoint, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: build_client(timeout),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn call<T: Serialize>(&self, operation: &str, body: &T) -> Result<Value, ClientError> {
        post_operation(&self.client, &self.endpoint, operation, body).await
    }
}

/// Best-effort instance state lookup against the compute service's
/// DescribeInstances operation. Any failure reads as "state unknown".
#[derive(Clone, Debug)]
pub struct HttpInstanceDescriber {
    client: Client,
    endpoint: String,
}

impl HttpInstanceDescriber {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self::with_timeout(endpoint, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: build_client(timeout),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl InstanceDescriber for HttpInstanceDescriber {
    async fn describe_instance_state(&self, instance_id: &str) -> Option<String> {
        let body = json!({ "InstanceIds": [instance_id] });
        match post_operation(&self.client, &self.endpoint, "DescribeInstances", &body).await {
            Ok(response) => {
                let state = instance_state(&response);
                debug!("Instance {instance_id} state: {state:?}");
                state
            }
            Err(e) => {
                debug!("Could not get instance state for {instance_id}: {e}");
                None
            }
        }
    }
}

/// `State.Name` of the first instance in the first reservation
fn instance_state(response: &Value) -> Option<String> {
    response
        .get("Reservations")?
        .get(0)?
        .get("Instances")?
        .get(0)?
        .get("State")?
        .get("Name")?
        .as_str()
        .map(str::to_string)
}

fn build_client(timeout: Duration) -> Client {
    Client::builder().timeout(timeout).build().unwrap_or_default()
}

async fn post_operation<T: Serialize>(
    client: &Client,
    endpoint: &str,
    operation: &str,
    body: &T,
) -> Result<Value, ClientError> {
    let url = format!("{endpoint}/{operation}");
    debug!("POST {url}");

    let response = client.post(&url).json(body).send().await.map_err(|e| {
        if e.is_connect() || e.is_timeout() {
            ClientError::Connection(e.to_string())
        } else {
            ClientError::Http(e)
        }
    })?;

    if !response.status().is_success() {
        return Err(api_error(response).await);
    }

    let text = response.text().await?;
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_str(&text)?)
}

/// Turn a non-2xx response into `ClientError::Api`, taking the code from
/// the error-type header or body and the message verbatim from the body.
async fn api_error(response: Response) -> ClientError {
    let status = response.status();
    let header_code = response
        .headers()
        .get("x-amzn-errortype")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(':').next().unwrap_or(v).to_string());

    let body: Value = response.json().await.unwrap_or(Value::Null);
    let body_code = body
        .get("__type")
        .or_else(|| body.get("code"))
        .and_then(Value::as_str)
        .map(|c| c.rsplit('#').next().unwrap_or(c).to_string());
    let message = body
        .get("message")
        .or_else(|| body.get("Message"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| status.to_string());

    ClientError::Api {
        code: header_code.or(body_code).unwrap_or_else(|| status.as_u16().to_string()),
        message,
    }
}

/// Items and continuation token of one listing page. Accepts either an
/// `{items: [...]}` envelope or a bare array.
pub fn split_page(response: Value) -> Result<(Vec<Value>, Option<String>), ClientError> {
    match response {
        Value::Array(items) => Ok((items, None)),
        Value::Object(mut map) => {
            let token = map
                .get("nextToken")
                .and_then(Value::as_str)
                .filter(|t| !t.is_empty())
                .map(str::to_string);
            match map.remove("items") {
                Some(Value::Array(items)) => Ok((items, token)),
                None | Some(Value::Null) => Ok((Vec::new(), token)),
                Some(other) => Err(ClientError::UnexpectedResponse(format!("items is not a list: {other}"))),
            }
        }
        other => Err(ClientError::UnexpectedResponse(format!("unexpected listing response: {other}"))),
    }
}

fn job_handle(response: &Value) -> JobHandle {
    JobHandle {
        job_id: response
            .get("job")
            .and_then(|job| job.get("jobID"))
            .and_then(Value::as_str)
            .map(str::to_string),
    }
}

fn job_description(job: &Value) -> Option<JobDescription> {
    Some(JobDescription {
        job_id: job.get("jobID")?.as_str()?.to_string(),
        status: job.get("status").and_then(Value::as_str).map(str::to_string),
        progress_percentage: job.get("progressPercentage").and_then(Value::as_f64).unwrap_or(0.0),
        end_time: job
            .get("endDateTime")
            .or_else(|| job.get("endTime"))
            .and_then(Value::as_str)
            .map(str::to_string),
    })
}

#[async_trait]
impl MgnApi for HttpMgnClient {
    async fn list_source_servers(&self, filter: Option<&ListFilter>) -> Result<Vec<Value>, ClientError> {
        let mut items = Vec::new();
        let mut next_token: Option<String> = None;

        for _ in 0..MAX_PAGES {
            let mut body = json!({ "maxResults": self.page_size });
            if let Some(filter) = filter.filter(|f| !f.is_empty()) {
                body["filters"] = json!({ "lifeCycleStates": filter.lifecycle_states });
            }
            if let Some(token) = &next_token {
                body["nextToken"] = json!(token);
            }

            let (page, token) = split_page(self.call("DescribeSourceServers", &body).await?)?;
            debug!("Received page of {} source servers", page.len());
            items.extend(page);

            match token {
                Some(token) => next_token = Some(token),
                None => return Ok(items),
            }
        }

        Err(ClientError::UnexpectedResponse(format!(
            "listing did not finish after {MAX_PAGES} pages"
        )))
    }

    async fn start_test(&self, server_ids: &[String]) -> Result<JobHandle, ClientError> {
        let response = self
            .call("StartTest", &json!({ "sourceServerIDs": server_ids }))
            .await?;
        Ok(job_handle(&response))
    }

    async fn stop_test(&self, server_ids: &[String]) -> Result<JobHandle, ClientError> {
        let response = self
            .call("TerminateTargetInstances", &json!({ "sourceServerIDs": server_ids }))
            .await?;
        Ok(job_handle(&response))
    }

    async fn describe_job(&self, job_id: &str) -> Result<Option<JobDescription>, ClientError> {
        let response = self
            .call("DescribeJobs", &json!({ "filters": { "jobIDs": [job_id] } }))
            .await?;
        let (items, _) = split_page(response)?;
        Ok(items.first().and_then(job_description))
    }

    async fn update_launch_configuration(
        &self,
        server_id: &str,
        update: &LaunchConfigurationUpdate,
    ) -> Result<(), ClientError> {
        let mut body = serde_json::to_value(update)?;
        body["sourceServerID"] = json!(server_id);
        self.call("UpdateLaunchConfiguration", &body).await?;
        Ok(())
    }
}

//! Normalization of raw source server records.
//!
//! The remote service returns records whose nesting depends on the
//! server's history: fields appear, disappear and move between sub-objects.
//! Every derived field is resolved by an ordered table of extractors. Each
//! extractor looks at one shape and returns `Some` when it recognizes it;
//! the first match wins. A malformed record is reported as a
//! [`ReconcileError`] and never affects other records in the batch.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use log::{debug, warn};
use mgn_types::{fallback_server_name, ReplicationStatus, ServerRecord, ServerStatus};
use serde_json::{Map, Value};

use crate::api::InstanceDescriber;
use crate::errors::ReconcileError;

type Record = Map<String, Value>;

/// One entry in an extractor chain
struct Rule<T> {
    name: &'static str,
    extract: fn(&Record) -> Option<T>,
}

/// Instance id found on a record, with the state if the record carried one
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TestInstanceHint {
    pub instance_id: String,
    pub state: Option<String>,
}

/// State assumed for an instance whose id came from a field without state
const ASSUMED_INSTANCE_STATE: &str = "running";
/// State recorded when an instance lookup could not say anything
const UNKNOWN_INSTANCE_STATE: &str = "unknown";

/// Lag values the service uses to say "not lagging"
const ZERO_LAG_DURATIONS: &[&str] = &["P0D", "PT0S"];

const INSTANCE_ID_PREFIX: &str = "i-";
const INSTANCE_ID_MIN_LEN: usize = 11;

const NAME_RULES: &[Rule<String>] = &[
    Rule { name: "name_tag", extract: name_from_tags },
    Rule { name: "description", extract: name_from_description },
    Rule { name: "hostname", extract: name_from_hostname },
];

const REPLICATION_RULES: &[Rule<ReplicationStatus>] = &[
    Rule { name: "replication_state", extract: replication_from_state },
    Rule { name: "lag_duration", extract: replication_from_lag },
    Rule { name: "last_snapshot", extract: replication_from_snapshot },
];

const TEST_INSTANCE_RULES: &[Rule<TestInstanceHint>] = &[
    Rule { name: "launched_instance", extract: instance_from_launched },
    Rule { name: "test_instance_field", extract: instance_from_test_field },
    // low confidence: any unrelated field shaped like an instance id matches
    Rule { name: "instance_id_scan", extract: instance_from_field_scan },
];

const LAST_SEEN_RULES: &[Rule<DateTime<Utc>>] = &[
    Rule { name: "last_launch_time", extract: last_seen_from_launch },
    Rule { name: "last_seen_by_service", extract: last_seen_from_lifecycle },
];

fn first_match<T>(rules: &[Rule<T>], record: &Record, server_id: &str, field: &str) -> Option<T> {
    for rule in rules {
        if let Some(value) = (rule.extract)(record) {
            debug!("Server {server_id} {field} resolved by {}", rule.name);
            return Some(value);
        }
    }
    None
}

fn object<'a>(record: &'a Record, key: &str) -> Option<&'a Record> {
    record.get(key).and_then(Value::as_object)
}

fn non_empty_str<'a>(record: &'a Record, key: &str) -> Option<&'a str> {
    record.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn name_from_tags(record: &Record) -> Option<String> {
    match record.get("tags")? {
        Value::Object(map) => map.get("Name").and_then(scalar_to_string),
        Value::Array(list) => list
            .iter()
            .filter_map(Value::as_object)
            .find(|tag| {
                tag.get("key")
                    .and_then(Value::as_str)
                    .map(|k| k.eq_ignore_ascii_case("name"))
                    .unwrap_or(false)
            })
            .map(|tag| {
                tag.get("value")
                    .and_then(scalar_to_string)
                    .unwrap_or_else(|| "Unknown".to_string())
            }),
        _ => None,
    }
}

fn name_from_description(record: &Record) -> Option<String> {
    non_empty_str(record, "description").map(str::to_string)
}

fn name_from_hostname(record: &Record) -> Option<String> {
    // archived servers keep stale identification hints
    if record.get("isArchived").and_then(Value::as_bool) != Some(false) {
        return None;
    }
    let hints = object(object(record, "sourceProperties")?, "identificationHints")?;
    non_empty_str(hints, "hostname").map(str::to_string)
}

fn replication_from_state(record: &Record) -> Option<ReplicationStatus> {
    let info = object(record, "dataReplicationInfo")?;
    ReplicationStatus::from_state(info.get("dataReplicationState")?.as_str()?)
}

fn replication_from_lag(record: &Record) -> Option<ReplicationStatus> {
    let lag = non_empty_str(object(record, "dataReplicationInfo")?, "lagDuration")?;
    if ZERO_LAG_DURATIONS.contains(&lag) {
        return None;
    }
    Some(ReplicationStatus::Replicating)
}

fn replication_from_snapshot(record: &Record) -> Option<ReplicationStatus> {
    non_empty_str(object(record, "dataReplicationInfo")?, "lastSnapshotDateTime")?;
    Some(ReplicationStatus::Replicated)
}

fn instance_from_launched(record: &Record) -> Option<TestInstanceHint> {
    let launched = object(record, "launchedInstance")?;
    let instance_id = non_empty_str(launched, "ec2InstanceID")?;
    Some(TestInstanceHint {
        instance_id: instance_id.to_string(),
        state: non_empty_str(launched, "state").map(str::to_string),
    })
}

fn instance_from_test_field(record: &Record) -> Option<TestInstanceHint> {
    let instance_id = non_empty_str(record, "testInstanceID")?;
    Some(TestInstanceHint {
        instance_id: instance_id.to_string(),
        state: Some(ASSUMED_INSTANCE_STATE.to_string()),
    })
}

/// Whether a value has the shape of a compute instance id
pub fn looks_like_instance_id(value: &str) -> bool {
    value.starts_with(INSTANCE_ID_PREFIX) && value.len() >= INSTANCE_ID_MIN_LEN
}

fn instance_from_field_scan(record: &Record) -> Option<TestInstanceHint> {
    record.iter().find_map(|(key, value)| {
        let candidate = value.as_str().filter(|s| looks_like_instance_id(s))?;
        debug!("Found instance id shaped value in field {key}: {candidate}");
        Some(TestInstanceHint {
            instance_id: candidate.to_string(),
            state: Some(ASSUMED_INSTANCE_STATE.to_string()),
        })
    })
}

fn last_seen_from_launch(record: &Record) -> Option<DateTime<Utc>> {
    parse_timestamp(non_empty_str(object(record, "lastLaunchResult")?, "lastLaunchTime")?)
}

fn last_seen_from_lifecycle(record: &Record) -> Option<DateTime<Utc>> {
    parse_timestamp(non_empty_str(object(record, "lifeCycle")?, "lastSeenByServiceDateTime")?)
}

/// Parse an ISO-8601 timestamp. A `Z` suffix or explicit offset is
/// honoured; a timestamp without either is taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }
    warn!("Could not parse timestamp: {raw}");
    None
}

/// Tags arrive either as a map or as a list of `{key, value}` pairs
pub fn extract_tags(value: Option<&Value>) -> HashMap<String, String> {
    let mut tags = HashMap::new();
    match value {
        Some(Value::Object(map)) => {
            for (key, value) in map {
                if let Some(value) = scalar_to_string(value) {
                    tags.insert(key.clone(), value);
                }
            }
        }
        Some(Value::Array(list)) => {
            for tag in list.iter().filter_map(Value::as_object) {
                let key = tag.get("key").and_then(Value::as_str);
                let value = tag.get("value").and_then(scalar_to_string);
                if let (Some(key), Some(value)) = (key, value) {
                    tags.insert(key.to_string(), value);
                }
            }
        }
        _ => {}
    }
    tags
}

/// Id of a raw record for log lines, whether or not it reconciles
pub fn raw_record_id(raw: &Value, index: usize) -> String {
    raw.get("sourceServerID")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("unknown-{index}"))
}

/// Converts raw remote records into [`ServerRecord`]s
#[derive(Clone, Debug)]
pub struct StatusReconciler {
    region: String,
}

impl StatusReconciler {
    pub fn new(region: impl Into<String>) -> Self {
        Self { region: region.into() }
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// Reconcile one record. Pure: the same input always yields an equal
    /// output.
    pub fn reconcile(&self, raw: &Value) -> Result<ServerRecord, ReconcileError> {
        let record = raw.as_object().ok_or(ReconcileError::NotAnObject)?;
        let id = non_empty_str(record, "sourceServerID").ok_or(ReconcileError::MissingId)?;

        let name = first_match(NAME_RULES, record, id, "name").unwrap_or_else(|| fallback_server_name(id));

        let status = object(record, "lifeCycle")
            .and_then(|lc| lc.get("state"))
            .and_then(Value::as_str)
            .map(ServerStatus::from_lifecycle)
            .unwrap_or(ServerStatus::Unknown);
        debug!("Server {id} status: {status:?}");

        let replication_status = first_match(REPLICATION_RULES, record, id, "replication")
            .unwrap_or(ReplicationStatus::Unknown);

        let last_seen = first_match(LAST_SEEN_RULES, record, id, "last_seen");

        let test_instance = first_match(TEST_INSTANCE_RULES, record, id, "test_instance");

        let target_instance_type = object(record, "sourceProperties")
            .and_then(|props| non_empty_str(props, "recommendedInstanceType"))
            .map(str::to_string);

        let tags = extract_tags(record.get("tags"));

        Ok(ServerRecord {
            id: id.to_string(),
            name,
            status,
            replication_status,
            region: self.region.clone(),
            last_seen,
            test_instance_id: test_instance.as_ref().map(|t| t.instance_id.clone()),
            test_instance_state: test_instance.and_then(|t| t.state),
            target_instance_type,
            tags,
            description: name_from_description(record),
        })
    }

    /// Reconcile a batch, skipping (and logging) records that fail
    pub fn reconcile_all(&self, raws: &[Value]) -> Vec<ServerRecord> {
        let mut servers = Vec::with_capacity(raws.len());
        for (index, raw) in raws.iter().enumerate() {
            match self.reconcile(raw) {
                Ok(server) => servers.push(server),
                Err(e) => {
                    warn!("Failed to parse source server {}: {e}", raw_record_id(raw, index));
                }
            }
        }
        servers
    }

    /// Fill in instance states the records themselves did not carry.
    /// Lookup misses leave the state as "unknown".
    pub async fn resolve_instance_states(&self, servers: &mut [ServerRecord], describer: &dyn InstanceDescriber) {
        for server in servers.iter_mut() {
            let Some(instance_id) = server.test_instance_id.as_deref() else {
                continue;
            };
            if server.test_instance_state.is_some() {
                continue;
            }
            let state = describer.describe_instance_state(instance_id).await;
            if state.is_none() {
                debug!("Could not get instance state for {instance_id}");
            }
            server.test_instance_state = Some(state.unwrap_or_else(|| UNKNOWN_INSTANCE_STATE.to_string()));
        }
    }
}

use serde::{Deserialize, Serialize};

use crate::server::{ServerRecord, ServerStatus};

/// Selection criteria over reconciled servers. Every criterion that is
/// set must hold for a server to match.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerFilter {
    pub statuses: Option<Vec<ServerStatus>>,
    pub region: Option<String>,
    pub search_term: Option<String>,
    pub has_test_instance: Option<bool>,
}

impl ServerFilter {
    pub fn with_statuses(mut self, statuses: Vec<ServerStatus>) -> Self {
        self.statuses = Some(statuses);
        self
    }

    pub fn with_search(mut self, term: impl Into<String>) -> Self {
        self.search_term = Some(term.into());
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn with_test_instance(mut self, has_test_instance: bool) -> Self {
        self.has_test_instance = Some(has_test_instance);
        self
    }

    pub fn matches(&self, server: &ServerRecord) -> bool {
        if let Some(statuses) = &self.statuses {
            if !statuses.contains(&server.status) {
                return false;
            }
        }

        if let Some(region) = &self.region {
            if &server.region != region {
                return false;
            }
        }

        if let Some(term) = &self.search_term {
            let term = term.to_lowercase();
            if !term.is_empty()
                && !server.name.to_lowercase().contains(&term)
                && !server.id.to_lowercase().contains(&term)
            {
                return false;
            }
        }

        if let Some(wanted) = self.has_test_instance {
            if server.has_test_instance() != wanted {
                return false;
            }
        }

        true
    }

    pub fn apply<'a>(&self, servers: &'a [ServerRecord]) -> Vec<&'a ServerRecord> {
        servers.iter().filter(|s| self.matches(s)).collect()
    }
}

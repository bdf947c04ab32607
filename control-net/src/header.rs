//! Network-wide metadata.

use chrono::{SecondsFormat, Utc};

/// Descriptive metadata carried by every network.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NetworkHeader {
    pub network_id: String,
    pub target_name: String,
    pub description: String,
    pub user_name: String,
    /// ISO-8601 creation timestamp
    pub created: String,
    /// ISO-8601 timestamp of the last modification
    pub last_modified: String,
}

impl NetworkHeader {
    /// Create a header stamped with the current UTC time.
    pub fn new(network_id: impl Into<String>, target_name: impl Into<String>) -> Self {
        let now = timestamp_now();
        Self {
            network_id: network_id.into(),
            target_name: target_name.into(),
            description: String::new(),
            user_name: String::new(),
            created: now.clone(),
            last_modified: now,
        }
    }

    /// Mark the network as modified now.
    pub fn touch(&mut self) {
        self.last_modified = timestamp_now();
    }
}

/// Current UTC time as an ISO-8601 string with second precision.
pub fn timestamp_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

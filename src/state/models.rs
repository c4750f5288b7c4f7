use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cloud::ResourceKind;

// ─── Resource-Level State ───────────────────────────────────────────────────

/// Lifecycle of a recorded resource.
///
/// Transitions only move forward: `CREATED → DELETED` or
/// `CREATED → FAILED_DELETE → DELETED`. `PREEXISTING` never changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceStatus {
    Created,
    Preexisting,
    Deleted,
    FailedDelete,
}

impl ResourceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceStatus::Created => "CREATED",
            ResourceStatus::Preexisting => "PREEXISTING",
            ResourceStatus::Deleted => "DELETED",
            ResourceStatus::FailedDelete => "FAILED_DELETE",
        }
    }

    pub fn can_become(&self, next: ResourceStatus) -> bool {
        use ResourceStatus::*;
        matches!(
            (self, next),
            (Created, Deleted) | (Created, FailedDelete) | (FailedDelete, Deleted) | (FailedDelete, FailedDelete)
        )
    }

    /// Cleanup only touches what this tool created.
    pub fn is_deletable(&self) -> bool {
        matches!(self, ResourceStatus::Created | ResourceStatus::FailedDelete)
    }
}

impl fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One created or adopted cloud resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRecord {
    pub kind: ResourceKind,
    pub id: String,
    pub status: ResourceStatus,
    pub name: String,
    pub compartment_id: String,
    /// Order in which the resource was recorded.
    pub seq: u64,
    /// Address of the resource this one lives inside (load balancer, zone).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    /// ip, uuid, export path and similar facts.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
    pub updated_at: DateTime<Utc>,
}

// ─── Document ───────────────────────────────────────────────────────────────

pub const DOCUMENT_VERSION: u32 = 1;

/// The persisted resource-state document, keyed by address
/// (`subnet.midtier`, `instance.wls.1`, …).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateDocument {
    pub version: u32,
    pub compartment_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub resources: BTreeMap<String, ResourceRecord>,
}

impl StateDocument {
    pub fn new(compartment_id: &str) -> Self {
        let now = Utc::now();
        Self {
            version: DOCUMENT_VERSION,
            compartment_id: compartment_id.to_string(),
            created_at: now,
            updated_at: now,
            resources: BTreeMap::new(),
        }
    }

    pub fn next_seq(&self) -> u64 {
        self.resources.values().map(|r| r.seq).max().map_or(1, |s| s + 1)
    }

    /// Records of `kind`, most recently recorded first.
    pub fn of_kind(&self, kind: ResourceKind) -> Vec<(&String, &ResourceRecord)> {
        let mut items: Vec<_> = self.resources.iter().filter(|(_, r)| r.kind == kind).collect();
        items.sort_by(|a, b| b.1.seq.cmp(&a.1.seq));
        items
    }

    /// Addresses whose `parent` is `address`.
    pub fn children_of(&self, address: &str) -> Vec<String> {
        self.resources
            .iter()
            .filter(|(_, r)| r.parent.as_deref() == Some(address))
            .map(|(a, _)| a.clone())
            .collect()
    }
}

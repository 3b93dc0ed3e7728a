//! Resource listing types
//!
//! A group's resources are uploaded files (object store) and registered
//! documents (relational store) presented as one sorted list.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use uuid::Uuid;

/// Where a resource lives. Declaration order is the tie-break order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    File,
    Doc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub kind: ResourceKind,
    /// Object key for files, document id for docs
    pub key: String,
    /// Name shown to users
    pub name: String,
    /// Expiring download link, files only
    pub url: Option<String>,
    /// Size in bytes, files only
    pub size: Option<u64>,
    pub last_modified: Option<DateTime<Utc>>,
}

impl Resource {
    /// Case-insensitive name, then kind, then key
    pub fn display_order(&self, other: &Self) -> Ordering {
        self.name
            .to_lowercase()
            .cmp(&other.name.to_lowercase())
            .then(self.kind.cmp(&other.kind))
            .then_with(|| self.key.cmp(&other.key))
    }
}

/// Sort resources in display order
pub fn sort_resources(resources: &mut [Resource]) {
    resources.sort_by(|a, b| a.display_order(b));
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceListing {
    pub group_id: Uuid,
    pub resources: Vec<Resource>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct GroupUsage {
    pub file_count: u64,
    pub total_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResponse {
    pub key: String,
    pub name: String,
    pub size: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resource(kind: ResourceKind, key: &str, name: &str) -> Resource {
        Resource {
            kind,
            key: key.to_string(),
            name: name.to_string(),
            url: None,
            size: None,
            last_modified: None,
        }
    }

    #[test]
    fn test_sort_is_case_insensitive() {
        let mut list = vec![
            resource(ResourceKind::Doc, "2", "beta"),
            resource(ResourceKind::File, "1", "Alpha"),
            resource(ResourceKind::File, "3", "alpha2"),
        ];
        sort_resources(&mut list);
        let names: Vec<_> = list.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Alpha", "alpha2", "beta"]);
    }

    #[test]
    fn test_ties_break_on_kind_then_key() {
        let mut list = vec![
            resource(ResourceKind::Doc, "a", "notes"),
            resource(ResourceKind::File, "z", "Notes"),
            resource(ResourceKind::File, "b", "notes"),
        ];
        sort_resources(&mut list);
        let keys: Vec<_> = list.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["b", "z", "a"]);
    }
}

//! Table registries and the group catalog of a routing snapshot.

use std::collections::HashMap;

use serde::Serialize;
use tracing::warn;

use crate::types::{KeyType, VdbId};

/// A sharded table entry as read from the shard map, before its vdb is resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSpec {
    pub schema: String,
    pub name: String,
    pub primary_key: String,
    pub vdb_id: VdbId,
}

/// A sharded table linked to its vdb.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableDescriptor {
    pub schema: String,
    pub name: String,
    pub primary_key: String,
    pub vdb_id: VdbId,
    pub shard_key_type: KeyType,
    #[serde(skip)]
    pub(crate) vdb_index: usize,
}

impl TableDescriptor {
    pub(crate) fn link(spec: TableSpec, vdb_index: usize, shard_key_type: KeyType) -> Self {
        Self {
            schema: spec.schema,
            name: spec.name,
            primary_key: spec.primary_key,
            vdb_id: spec.vdb_id,
            shard_key_type,
            vdb_index,
        }
    }
}

/// A table pinned to one group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SingleTableDescriptor {
    pub schema: String,
    pub name: String,
    pub group: String,
}

/// Sharded tables keyed by exact `(schema, table)`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableRegistry {
    by_schema: HashMap<String, HashMap<String, TableDescriptor>>,
    len: usize,
}

impl TableRegistry {
    pub fn insert(&mut self, table: TableDescriptor) {
        let tables = self.by_schema.entry(table.schema.clone()).or_default();
        if let Some(prev) = tables.insert(table.name.clone(), table) {
            warn!(
                "table {}.{} listed more than once, keeping the last entry",
                prev.schema, prev.name
            );
        } else {
            self.len += 1;
        }
    }

    /// Case-sensitive lookup.
    pub fn get(&self, schema: &str, table: &str) -> Option<&TableDescriptor> {
        self.by_schema.get(schema)?.get(table)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TableDescriptor> {
        self.by_schema.values().flat_map(|tables| tables.values())
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Unsharded tables, matched ignoring ASCII case.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SingleTableRegistry {
    tables: Vec<SingleTableDescriptor>,
}

impl SingleTableRegistry {
    pub fn new(tables: Vec<SingleTableDescriptor>) -> Self {
        Self { tables }
    }

    pub fn get(&self, schema: &str, table: &str) -> Option<&SingleTableDescriptor> {
        self.tables
            .iter()
            .find(|t| t.name.eq_ignore_ascii_case(table) && t.schema.eq_ignore_ascii_case(schema))
    }

    pub fn iter(&self) -> impl Iterator<Item = &SingleTableDescriptor> {
        self.tables.iter()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// Distinct group names in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupCatalog {
    groups: Vec<String>,
}

impl GroupCatalog {
    pub fn insert(&mut self, group: &str) {
        if !self.contains(group) {
            self.groups.push(group.to_string());
        }
    }

    pub fn contains(&self, group: &str) -> bool {
        self.groups.iter().any(|g| g == group)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.groups
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// `groups[fixture % len]`, or `None` for an empty catalog.
    pub fn fixed(&self, fixture: u32) -> Option<&str> {
        if self.groups.is_empty() {
            return None;
        }
        let idx = fixture as usize % self.groups.len();
        self.groups.get(idx).map(String::as_str)
    }

    /// `"all"` or `"*"` (any case) selects every group; anything else must
    /// match one group name exactly.
    pub fn find(&self, pattern: &str) -> Vec<&str> {
        if pattern.eq_ignore_ascii_case("all") || pattern == "*" {
            return self.groups.iter().map(String::as_str).collect();
        }
        self.groups
            .iter()
            .find(|g| g.as_str() == pattern)
            .map(|g| vec![g.as_str()])
            .unwrap_or_default()
    }
}

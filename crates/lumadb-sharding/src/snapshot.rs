//! One immutable, fully validated routing configuration.

use rand::Rng;

use crate::partition::Partition;
use crate::registry::{
    GroupCatalog, SingleTableDescriptor, SingleTableRegistry, TableDescriptor, TableRegistry,
};
use crate::types::{KeyValue, VdbId};
use crate::vdb::VirtualDatabase;

/// Vdbs, tables, single tables and groups that were validated together.
///
/// Tables refer to their vdb by position in `vdbs`, so a snapshot never
/// points into another snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoutingSnapshot {
    generation: u64,
    vdbs: Vec<VirtualDatabase>,
    tables: TableRegistry,
    single_tables: SingleTableRegistry,
    groups: GroupCatalog,
}

impl RoutingSnapshot {
    pub(crate) fn new(
        vdbs: Vec<VirtualDatabase>,
        tables: TableRegistry,
        single_tables: SingleTableRegistry,
        groups: GroupCatalog,
    ) -> Self {
        Self {
            generation: 0,
            vdbs,
            tables,
            single_tables,
            groups,
        }
    }

    /// An empty snapshot, in place before the first load.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Number of committed reloads that led to this snapshot. 0 = never loaded.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn with_generation(mut self, generation: u64) -> Self {
        self.generation = generation;
        self
    }

    pub fn vdbs(&self) -> &[VirtualDatabase] {
        &self.vdbs
    }

    pub fn vdb(&self, id: VdbId) -> Option<&VirtualDatabase> {
        self.vdbs.iter().find(|vdb| vdb.id() == id)
    }

    pub fn tables(&self) -> &TableRegistry {
        &self.tables
    }

    pub fn single_tables(&self) -> &SingleTableRegistry {
        &self.single_tables
    }

    pub fn is_sharded(&self, schema: &str, table: &str) -> bool {
        self.tables.get(schema, table).is_some()
    }

    pub fn is_single_table(&self, schema: &str, table: &str) -> bool {
        self.single_tables.get(schema, table).is_some()
    }

    pub fn table_info(&self, schema: &str, table: &str) -> Option<&TableDescriptor> {
        self.tables.get(schema, table)
    }

    pub fn vdb_for_table(&self, schema: &str, table: &str) -> Option<&VirtualDatabase> {
        let info = self.tables.get(schema, table)?;
        self.vdbs.get(info.vdb_index)
    }

    /// Distinct groups holding the table, in partition order.
    pub fn groups_for_table(&self, schema: &str, table: &str) -> Option<Vec<&str>> {
        let vdb = self.vdb_for_table(schema, table)?;
        let mut groups: Vec<&str> = Vec::new();
        for group in vdb.groups() {
            if !groups.contains(&group) {
                groups.push(group);
            }
        }
        Some(groups)
    }

    /// All partitions of the table's vdb. A group may appear more than once.
    pub fn partitions_for_table(&self, schema: &str, table: &str) -> Option<&[Partition]> {
        self.vdb_for_table(schema, table).map(VirtualDatabase::partitions)
    }

    /// Group of one partition of the table, picked uniformly at random.
    pub fn any_group_for_table<R: Rng + ?Sized>(
        &self,
        schema: &str,
        table: &str,
        rng: &mut R,
    ) -> Option<&str> {
        let partitions = self.partitions_for_table(schema, table)?;
        if partitions.is_empty() {
            return None;
        }
        let idx = rng.gen_range(0..partitions.len());
        partitions.get(idx).map(Partition::group)
    }

    pub fn fixed_group(&self, fixture: u32) -> Option<&str> {
        self.groups.fixed(fixture)
    }

    pub fn single_table_group(&self, schema: &str, table: &str) -> Option<&str> {
        self.single_tables
            .get(schema, table)
            .map(|t| t.group.as_str())
    }

    pub fn single_table(&self, schema: &str, table: &str) -> Option<&SingleTableDescriptor> {
        self.single_tables.get(schema, table)
    }

    /// Append the single table's group to `groups` unless it is already there.
    pub fn single_table_distinct_groups(&self, groups: &mut Vec<String>, schema: &str, table: &str) {
        if let Some(group) = self.single_table_group(schema, table) {
            if !groups.iter().any(|g| g == group) {
                groups.push(group.to_string());
            }
        }
    }

    pub fn all_groups(&self) -> &[String] {
        self.groups.as_slice()
    }

    pub fn group_catalog(&self) -> &GroupCatalog {
        &self.groups
    }

    pub fn find_groups(&self, pattern: &str) -> Vec<&str> {
        self.groups.find(pattern)
    }

    /// Group owning a hash bucket of a hash-sharded table.
    pub fn route_bucket(&self, schema: &str, table: &str, bucket: u32) -> Option<&str> {
        self.vdb_for_table(schema, table)?
            .bucket_lookup(bucket)
            .map(Partition::group)
    }

    /// Group owning a key of a range-sharded table.
    pub fn route_key(&self, schema: &str, table: &str, key: &KeyValue) -> Option<&str> {
        self.vdb_for_table(schema, table)?
            .range_lookup(key)
            .map(Partition::group)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::ConfigBuilder;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use serde_json::json;

    fn snapshot() -> RoutingSnapshot {
        let root = json!({
            "vdb": [
                {"id": 1, "type": "INT", "method": "hash", "num": 4,
                 "partitions": {"g0": [0, 1], "g1": [2], "g2": [3]}},
                {"id": 2, "type": "INT", "method": "range", "num": 0,
                 "partitions": {"g0": 100, "g1": 200, "g2": null}}
            ],
            "table": [
                {"db": "shop", "table": "orders", "pkey": "id", "vdb": 1},
                {"db": "shop", "table": "events", "pkey": "ts", "vdb": 2}
            ],
            "single_tables": [{"db": "shop", "table": "config", "group": "g0"}]
        });
        ConfigBuilder::new().build(&root, 3).unwrap().0
    }

    #[test]
    fn test_table_queries() {
        let snap = snapshot();
        assert!(snap.is_sharded("shop", "orders"));
        assert!(!snap.is_sharded("shop", "config"));
        assert!(snap.is_single_table("shop", "CONFIG"));
        assert_eq!(snap.single_table_group("shop", "config"), Some("g0"));
        assert_eq!(snap.table_info("shop", "orders").map(|t| t.vdb_id), Some(1));
        assert!(snap.table_info("shop", "missing").is_none());
    }

    #[test]
    fn test_groups_and_partitions() {
        let snap = snapshot();
        assert_eq!(snap.groups_for_table("shop", "orders"), Some(vec!["g0", "g1", "g2"]));
        assert_eq!(snap.partitions_for_table("shop", "events").map(<[_]>::len), Some(3));
        assert_eq!(snap.groups_for_table("shop", "missing"), None);
        assert_eq!(snap.all_groups(), ["g0", "g1", "g2"]);
    }

    #[test]
    fn test_routing() {
        let snap = snapshot();
        assert_eq!(snap.route_bucket("shop", "orders", 2), Some("g1"));
        assert_eq!(snap.route_bucket("shop", "orders", 9), None);
        assert_eq!(snap.route_key("shop", "events", &KeyValue::Int(150)), Some("g1"));
        assert_eq!(snap.route_key("shop", "orders", &KeyValue::Int(150)), None);
    }

    #[test]
    fn test_any_group_is_seeded() {
        let snap = snapshot();
        let mut a = StdRng::seed_from_u64(7);
        let mut b = StdRng::seed_from_u64(7);
        for _ in 0..16 {
            let ga = snap.any_group_for_table("shop", "orders", &mut a);
            let gb = snap.any_group_for_table("shop", "orders", &mut b);
            assert_eq!(ga, gb);
            assert!(ga.is_some());
        }
        assert_eq!(snap.any_group_for_table("shop", "nope", &mut a), None);
    }

    #[test]
    fn test_single_table_distinct_groups() {
        let snap = snapshot();
        let mut groups = vec!["g1".to_string()];
        snap.single_table_distinct_groups(&mut groups, "shop", "config");
        snap.single_table_distinct_groups(&mut groups, "shop", "config");
        snap.single_table_distinct_groups(&mut groups, "shop", "absent");
        assert_eq!(groups, vec!["g1", "g0"]);
    }

    #[test]
    fn test_empty_snapshot() {
        let snap = RoutingSnapshot::empty();
        assert_eq!(snap.generation(), 0);
        assert_eq!(snap.fixed_group(3), None);
        assert!(snap.find_groups("all").is_empty());
    }
}

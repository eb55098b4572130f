//! Process-wide sharding index with atomic reload.
//!
//! Readers load the current [`RoutingSnapshot`] without locking. A reload
//! builds a complete candidate off to the side and publishes it with a
//! single pointer swap, so a reader sees either the old map or the new one.
//! Old snapshots are freed when the last reader drops its `Arc`.

use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use rand::Rng;
use serde_json::Value;
use tracing::{error, info};

use crate::builder::{ConfigBuilder, LoadReport};
use crate::error::Result;
use crate::partition::Partition;
use crate::registry::TableDescriptor;
use crate::snapshot::RoutingSnapshot;
use crate::types::KeyValue;

pub struct ShardingIndex {
    current: ArcSwap<RoutingSnapshot>,
    reload_lock: Mutex<()>,
    builder: ConfigBuilder,
}

impl Default for ShardingIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl ShardingIndex {
    pub fn new() -> Self {
        Self::with_builder(ConfigBuilder::new())
    }

    pub fn with_builder(builder: ConfigBuilder) -> Self {
        Self {
            current: ArcSwap::from_pointee(RoutingSnapshot::empty()),
            reload_lock: Mutex::new(()),
            builder,
        }
    }

    /// The committed snapshot. Hold on to it to run several queries against
    /// the same configuration.
    pub fn snapshot(&self) -> Arc<RoutingSnapshot> {
        self.current.load_full()
    }

    pub fn generation(&self) -> u64 {
        self.current.load().generation()
    }

    /// Build, validate and commit a new shard map. On failure the committed
    /// snapshot is left untouched.
    pub fn reload(&self, root: &Value, num_groups: usize) -> Result<LoadReport> {
        let _guard = self.reload_lock.lock();
        let built = self.builder.build(root, num_groups);
        self.commit(built)
    }

    /// [`reload`](Self::reload) from shard map text.
    pub fn reload_str(&self, text: &str, num_groups: usize) -> Result<LoadReport> {
        let _guard = self.reload_lock.lock();
        let built = self.builder.build_str(text, num_groups);
        self.commit(built)
    }

    fn commit(&self, built: Result<(RoutingSnapshot, LoadReport)>) -> Result<LoadReport> {
        let (snapshot, report) = match built {
            Ok(built) => built,
            Err(e) => {
                error!("shard map rejected, keeping generation {}: {}", self.generation(), e);
                metrics::counter!("lumadb_sharding_reloads_total", "outcome" => "rejected")
                    .increment(1);
                return Err(e);
            }
        };

        let generation = self.generation() + 1;
        let snapshot = snapshot.with_generation(generation);
        let groups = snapshot.all_groups().len();
        info!(
            "shard map committed: generation {}, {} vdbs, {} tables, {} groups, {} entries skipped",
            generation,
            snapshot.vdbs().len(),
            snapshot.tables().len(),
            groups,
            report.skipped.len()
        );
        self.current.store(Arc::new(snapshot));

        metrics::counter!("lumadb_sharding_reloads_total", "outcome" => "committed").increment(1);
        metrics::gauge!("lumadb_sharding_groups").set(groups as f64);
        Ok(report)
    }

    pub fn is_sharded(&self, schema: &str, table: &str) -> bool {
        self.current.load().is_sharded(schema, table)
    }

    pub fn is_single_table(&self, schema: &str, table: &str) -> bool {
        self.current.load().is_single_table(schema, table)
    }

    pub fn table_info(&self, schema: &str, table: &str) -> Option<TableDescriptor> {
        self.current.load().table_info(schema, table).cloned()
    }

    pub fn groups_for_table(&self, schema: &str, table: &str) -> Option<Vec<String>> {
        let snapshot = self.current.load();
        snapshot
            .groups_for_table(schema, table)
            .map(|groups| groups.into_iter().map(str::to_string).collect())
    }

    pub fn partitions_for_table(&self, schema: &str, table: &str) -> Option<Vec<Partition>> {
        let snapshot = self.current.load();
        snapshot
            .partitions_for_table(schema, table)
            .map(<[Partition]>::to_vec)
    }

    pub fn any_group_for_table<R: Rng + ?Sized>(
        &self,
        schema: &str,
        table: &str,
        rng: &mut R,
    ) -> Option<String> {
        let snapshot = self.current.load();
        snapshot
            .any_group_for_table(schema, table, rng)
            .map(str::to_string)
    }

    pub fn fixed_group(&self, fixture: u32) -> Option<String> {
        self.current.load().fixed_group(fixture).map(str::to_string)
    }

    pub fn single_table_group(&self, schema: &str, table: &str) -> Option<String> {
        let snapshot = self.current.load();
        snapshot
            .single_table_group(schema, table)
            .map(str::to_string)
    }

    pub fn single_table_distinct_groups(&self, groups: &mut Vec<String>, schema: &str, table: &str) {
        self.current
            .load()
            .single_table_distinct_groups(groups, schema, table);
    }

    pub fn all_groups(&self) -> Vec<String> {
        self.current.load().all_groups().to_vec()
    }

    pub fn find_groups(&self, pattern: &str) -> Vec<String> {
        let snapshot = self.current.load();
        snapshot
            .find_groups(pattern)
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    pub fn route_bucket(&self, schema: &str, table: &str, bucket: u32) -> Option<String> {
        let snapshot = self.current.load();
        snapshot
            .route_bucket(schema, table, bucket)
            .map(str::to_string)
    }

    pub fn route_key(&self, schema: &str, table: &str, key: &KeyValue) -> Option<String> {
        let snapshot = self.current.load();
        snapshot.route_key(schema, table, key).map(str::to_string)
    }
}

impl std::fmt::Debug for ShardingIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShardingIndex")
            .field("generation", &self.generation())
            .finish_non_exhaustive()
    }
}

//! Virtual databases: one sharding scheme and its partitions.

use std::cmp::Ordering;

use roaring::RoaringBitmap;
use tracing::{debug, warn};

use crate::error::{Result, ShardingError};
use crate::partition::{Partition, PartitionPayload};
use crate::types::{KeyType, KeyValue, ShardMethod, VdbId, MAX_HASH_VALUE_COUNT};

#[derive(Debug, Clone, PartialEq)]
pub struct VirtualDatabase {
    id: VdbId,
    method: ShardMethod,
    key_type: KeyType,
    logic_shard_num: i64,
    partitions: Vec<Partition>,
}

impl VirtualDatabase {
    pub fn new(id: VdbId, method: ShardMethod, key_type: KeyType, logic_shard_num: i64) -> Self {
        Self {
            id,
            method,
            key_type,
            logic_shard_num,
            partitions: Vec::new(),
        }
    }

    pub fn id(&self) -> VdbId {
        self.id
    }

    pub fn method(&self) -> ShardMethod {
        self.method
    }

    pub fn key_type(&self) -> KeyType {
        self.key_type
    }

    pub fn logic_shard_num(&self) -> i64 {
        self.logic_shard_num
    }

    /// Bucket count usable for bucket sets, clamped to the supported range.
    pub fn bucket_capacity(&self) -> u32 {
        self.logic_shard_num.clamp(0, i64::from(MAX_HASH_VALUE_COUNT)) as u32
    }

    pub fn partitions(&self) -> &[Partition] {
        &self.partitions
    }

    pub fn push_partition(&mut self, partition: Partition) {
        self.partitions.push(partition);
    }

    /// Group names in partition order, duplicates included.
    pub fn groups(&self) -> impl Iterator<Item = &str> {
        self.partitions.iter().map(Partition::group)
    }

    /// Sort range partitions by upper bound (unbounded last) and give each
    /// one the previous partition's upper bound as its lower bound. Only the
    /// first unbounded partition owns the open tail; later ones are emptied.
    /// Hash vdbs are left untouched.
    pub fn sort_and_bound(&mut self) {
        if self.method != ShardMethod::Range {
            return;
        }
        self.partitions.sort_by(|a, b| {
            let high = |p: &Partition| p.bound().and_then(|r| r.high.clone());
            match (high(a), high(b)) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Greater,
                (Some(_), None) => Ordering::Less,
                (Some(x), Some(y)) => x.compare(&y).unwrap_or(Ordering::Equal),
            }
        });

        let id = self.id;
        let mut prev: Option<KeyValue> = None;
        let mut open_tail: Option<String> = None;
        for partition in &mut self.partitions {
            let group = partition.group().to_string();
            let Some(bound) = partition.bound_mut() else {
                continue;
            };
            if bound.high.is_some() {
                bound.low = prev.take();
                prev = bound.high.clone();
                continue;
            }
            if let Some(owner) = open_tail.as_deref() {
                warn!(
                    "vdb {}: group {} has no upper bound but {} owns the tail, range left empty",
                    id, group, owner
                );
                bound.close();
                continue;
            }
            bound.low = prev.take();
            open_tail = Some(group);
        }
    }

    /// Check internal consistency and fit with the number of live groups.
    pub fn is_valid(&self, num_groups: usize) -> Result<()> {
        match self.method {
            ShardMethod::Hash => self.validate_hash(num_groups),
            ShardMethod::Range => self.validate_range(),
            ShardMethod::Unknown => Err(ShardingError::validation(
                self.id,
                "unknown sharding method",
            )),
        }
    }

    fn validate_hash(&self, num_groups: usize) -> Result<()> {
        if self.logic_shard_num <= 0 || self.logic_shard_num > i64::from(MAX_HASH_VALUE_COUNT) {
            return Err(ShardingError::validation(
                self.id,
                format!(
                    "num {} outside [1, {}]",
                    self.logic_shard_num, MAX_HASH_VALUE_COUNT
                ),
            ));
        }
        if self.partitions.len() != num_groups {
            return Err(ShardingError::validation(
                self.id,
                format!(
                    "partition count {} not equal to number of groups {}",
                    self.partitions.len(),
                    num_groups
                ),
            ));
        }

        let mut covered = RoaringBitmap::new();
        for partition in &self.partitions {
            let Some(set) = partition.buckets() else {
                return Err(ShardingError::validation(
                    self.id,
                    format!("group {} has no bucket list", partition.group()),
                ));
            };
            if !(&covered & set.bitmap()).is_empty() {
                warn!(
                    "vdb {}: group {} claims buckets already owned by another group",
                    self.id,
                    partition.group()
                );
            }
            covered |= set.bitmap();
        }

        let num = self.bucket_capacity();
        if let Some(missing) = (0..num).find(|b| !covered.contains(*b)) {
            return Err(ShardingError::validation(
                self.id,
                format!("hash bucket {} is not assigned to any group", missing),
            ));
        }
        Ok(())
    }

    fn validate_range(&self) -> Result<()> {
        for partition in &self.partitions {
            if let PartitionPayload::Hash(_) = partition.payload() {
                return Err(ShardingError::validation(
                    self.id,
                    format!("group {} has a bucket list in a range vdb", partition.group()),
                ));
            }
        }
        Ok(())
    }

    /// Partition whose `[low, high)` holds `key`. Expects sorted partitions.
    pub fn range_lookup(&self, key: &KeyValue) -> Option<&Partition> {
        if self.method != ShardMethod::Range {
            return None;
        }
        let idx = self.partitions.partition_point(|p| {
            match p.bound().and_then(|b| b.high.as_ref()) {
                Some(high) => matches!(
                    high.compare(key),
                    Some(Ordering::Less) | Some(Ordering::Equal)
                ),
                None => false,
            }
        });
        let found = self.partitions.get(idx).filter(|p| p.contains_key(key));
        if found.is_none() {
            debug!("vdb {}: no range partition holds key {}", self.id, key);
        }
        found
    }

    /// First partition (in stored order) claiming `bucket`.
    pub fn bucket_lookup(&self, bucket: u32) -> Option<&Partition> {
        if self.method != ShardMethod::Hash {
            return None;
        }
        self.partitions.iter().find(|p| p.contains_bucket(bucket))
    }
}

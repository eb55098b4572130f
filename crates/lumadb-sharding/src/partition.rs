//! Partitions: the smallest routing unit of a vdb.
//!
//! A partition is owned by exactly one group and carries either a set of hash
//! buckets or a half-open key range `[low, high)`.

use std::cmp::Ordering;
use std::fmt;

use roaring::RoaringBitmap;

use crate::types::{KeyValue, VdbId};

/// Hash buckets claimed by one partition, bounded by the vdb's `num`.
#[derive(Debug, Clone, PartialEq)]
pub struct BucketSet {
    bits: RoaringBitmap,
    logic_shard_num: u32,
}

impl BucketSet {
    pub fn new(logic_shard_num: u32) -> Self {
        Self {
            bits: RoaringBitmap::new(),
            logic_shard_num,
        }
    }

    /// Claim a bucket. Returns `false` when the index is outside `[0, num)`.
    pub fn set(&mut self, bucket: i64) -> bool {
        if bucket < 0 || bucket >= i64::from(self.logic_shard_num) {
            return false;
        }
        self.bits.insert(bucket as u32);
        true
    }

    /// Buckets at or beyond `num` never match.
    pub fn contains(&self, bucket: u32) -> bool {
        bucket < self.logic_shard_num && self.bits.contains(bucket)
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.bits.iter()
    }

    pub fn len(&self) -> u64 {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    pub(crate) fn bitmap(&self) -> &RoaringBitmap {
        &self.bits
    }
}

/// Half-open key range. `None` on either side means unbounded. An empty
/// range holds no key at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeBound {
    pub low: Option<KeyValue>,
    pub high: Option<KeyValue>,
    empty: bool,
}

impl RangeBound {
    /// A range whose upper bound is the configured value; `low` is assigned
    /// once the vdb's partitions are sorted.
    pub fn upper(high: Option<KeyValue>) -> Self {
        Self {
            low: None,
            high,
            empty: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.empty
    }

    pub(crate) fn close(&mut self) {
        self.low = None;
        self.high = None;
        self.empty = true;
    }

    pub fn contains(&self, key: &KeyValue) -> bool {
        if self.empty {
            return false;
        }
        let above_low = match &self.low {
            None => true,
            Some(low) => matches!(
                low.compare(key),
                Some(Ordering::Less) | Some(Ordering::Equal)
            ),
        };
        let below_high = match &self.high {
            None => true,
            Some(high) => key.compare(high) == Some(Ordering::Less),
        };
        above_low && below_high
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PartitionPayload {
    Hash(BucketSet),
    Range(RangeBound),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Partition {
    group: String,
    vdb_id: VdbId,
    payload: PartitionPayload,
}

impl Partition {
    pub fn hash(vdb_id: VdbId, group: impl Into<String>, buckets: BucketSet) -> Self {
        Self {
            group: group.into(),
            vdb_id,
            payload: PartitionPayload::Hash(buckets),
        }
    }

    pub fn range(vdb_id: VdbId, group: impl Into<String>, high: Option<KeyValue>) -> Self {
        Self {
            group: group.into(),
            vdb_id,
            payload: PartitionPayload::Range(RangeBound::upper(high)),
        }
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    /// Id of the owning vdb.
    pub fn vdb_id(&self) -> VdbId {
        self.vdb_id
    }

    pub fn payload(&self) -> &PartitionPayload {
        &self.payload
    }

    pub fn buckets(&self) -> Option<&BucketSet> {
        match &self.payload {
            PartitionPayload::Hash(set) => Some(set),
            PartitionPayload::Range(_) => None,
        }
    }

    pub fn bound(&self) -> Option<&RangeBound> {
        match &self.payload {
            PartitionPayload::Range(bound) => Some(bound),
            PartitionPayload::Hash(_) => None,
        }
    }

    pub(crate) fn bound_mut(&mut self) -> Option<&mut RangeBound> {
        match &mut self.payload {
            PartitionPayload::Range(bound) => Some(bound),
            PartitionPayload::Hash(_) => None,
        }
    }

    /// Hash membership test; range partitions never match a bucket.
    pub fn contains_bucket(&self, bucket: u32) -> bool {
        self.buckets().is_some_and(|set| set.contains(bucket))
    }

    pub fn contains_key(&self, key: &KeyValue) -> bool {
        self.bound().is_some_and(|bound| bound.contains(key))
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.payload {
            PartitionPayload::Hash(set) => {
                let buckets: Vec<String> = set.iter().map(|b| b.to_string()).collect();
                write!(f, "{} hash [{}]", self.group, buckets.join(","))
            }
            PartitionPayload::Range(bound) if bound.is_empty() => {
                write!(f, "{} range empty", self.group)
            }
            PartitionPayload::Range(bound) => {
                let low = bound.low.as_ref().map_or("-inf".to_string(), |v| v.to_string());
                let high = bound.high.as_ref().map_or("+inf".to_string(), |v| v.to_string());
                write!(f, "{} range [{}, {})", self.group, low, high)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_set_bounds() {
        let mut set = BucketSet::new(4);
        assert!(set.set(0));
        assert!(set.set(3));
        assert!(!set.set(4));
        assert!(!set.set(-1));
        assert!(set.contains(3));
        assert!(!set.contains(1));
        assert!(!set.contains(4));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_contains_bucket_out_of_range_is_false() {
        let mut set = BucketSet::new(2);
        set.set(1);
        let part = Partition::hash(1, "g0", set);
        assert!(part.contains_bucket(1));
        assert!(!part.contains_bucket(1024));
        assert!(!part.contains_key(&KeyValue::Int(1)));
    }

    #[test]
    fn test_range_bound_is_half_open() {
        let bound = RangeBound {
            low: Some(KeyValue::Int(100)),
            high: Some(KeyValue::Int(200)),
            empty: false,
        };
        assert!(bound.contains(&KeyValue::Int(100)));
        assert!(bound.contains(&KeyValue::Int(199)));
        assert!(!bound.contains(&KeyValue::Int(200)));
        assert!(!bound.contains(&KeyValue::Int(99)));
        assert!(!bound.contains(&KeyValue::Str("150".into())));
    }

    #[test]
    fn test_unbounded_sides() {
        let open = RangeBound::upper(None);
        assert!(open.contains(&KeyValue::Int(i64::MIN)));
        assert!(open.contains(&KeyValue::Str(String::new())));

        let tail = RangeBound {
            low: Some(KeyValue::Str("m".into())),
            high: None,
            empty: false,
        };
        assert!(tail.contains(&KeyValue::Str("zzz".into())));
        assert!(!tail.contains(&KeyValue::Str(String::new())));

        let mut closed = RangeBound::upper(None);
        closed.close();
        assert!(closed.is_empty());
        assert!(!closed.contains(&KeyValue::Int(0)));
    }

    #[test]
    fn test_display() {
        let mut set = BucketSet::new(4);
        set.set(2);
        set.set(0);
        assert_eq!(Partition::hash(1, "g0", set).to_string(), "g0 hash [0,2]");
        let part = Partition::range(2, "g1", Some(KeyValue::Int(200)));
        assert_eq!(part.to_string(), "g1 range [-inf, 200)");
        let mut part = Partition::range(2, "g2", None);
        if let Some(bound) = part.bound_mut() {
            bound.close();
        }
        assert_eq!(part.to_string(), "g2 range empty");
    }
}

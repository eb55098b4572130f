//! Shard map builder.
//!
//! Turns the parsed shard map document into a validated [`RoutingSnapshot`].
//! A load goes `Parsing -> Validating -> {Committed | Rejected}`: malformed
//! entries are skipped while parsing, while any validation or reference
//! failure rejects the whole candidate.
//!
//! ```json
//! {
//!   "vdb": [{"id": 1, "type": "INT", "method": "hash", "num": 4,
//!            "partitions": {"g0": [0, 1], "g1": [2, 3]}}],
//!   "table": [{"db": "shop", "table": "orders", "pkey": "id", "vdb": 1}],
//!   "single_tables": [{"db": "shop", "table": "config", "group": "g0"}]
//! }
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, error, warn};

use crate::epoch::{ChronoEpochParser, EpochParser};
use crate::error::{Result, ShardingError};
use crate::partition::{BucketSet, Partition};
use crate::registry::{
    GroupCatalog, SingleTableDescriptor, SingleTableRegistry, TableDescriptor, TableRegistry,
    TableSpec,
};
use crate::snapshot::RoutingSnapshot;
use crate::types::{
    json_int, sharding_method, sharding_type, KeyType, KeyValue, RawValue, VdbId,
};
use crate::vdb::VirtualDatabase;

/// Entries skipped during a successful load.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub skipped: Vec<ShardingError>,
}

impl LoadReport {
    fn skip(&mut self, err: ShardingError) {
        warn!("{}, entry skipped", err);
        self.skipped.push(err);
    }

    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty()
    }
}

#[derive(Clone)]
pub struct ConfigBuilder {
    epoch: Arc<dyn EpochParser>,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ConfigBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigBuilder").finish_non_exhaustive()
    }
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            epoch: Arc::new(ChronoEpochParser),
        }
    }

    /// Use a different date literal parser for DATE/DATETIME vdbs.
    pub fn with_epoch_parser(epoch: Arc<dyn EpochParser>) -> Self {
        Self { epoch }
    }

    pub fn epoch_parser(&self) -> &dyn EpochParser {
        self.epoch.as_ref()
    }

    /// Parse shard map text, then [`build`](Self::build) it.
    pub fn build_str(&self, text: &str, num_groups: usize) -> Result<(RoutingSnapshot, LoadReport)> {
        let root: Value = serde_json::from_str(text).map_err(|e| {
            error!("shard map is not valid JSON: {}", e);
            ShardingError::Structural(format!("shard map is not valid JSON: {}", e))
        })?;
        self.build(&root, num_groups)
    }

    /// Build and validate a snapshot from a parsed shard map.
    pub fn build(&self, root: &Value, num_groups: usize) -> Result<(RoutingSnapshot, LoadReport)> {
        let mut report = LoadReport::default();

        let root = root
            .as_object()
            .ok_or_else(|| structural("shard map root is not an object"))?;
        let vdb_list = required_list(root, "vdb")?;
        let table_list = required_list(root, "table")?;
        let single_list = match root.get("single_tables") {
            None | Some(Value::Null) => &[][..],
            Some(Value::Array(items)) => items.as_slice(),
            Some(_) => return Err(structural("`single_tables` is not a list")),
        };

        let mut vdbs = self.parse_vdbs(vdb_list, &mut report);
        let tables = parse_tables(table_list, &mut report);
        let single_tables = parse_single_tables(single_list, &mut report);
        if vdbs.is_empty() || tables.is_empty() {
            return Err(structural("empty vdb/table list"));
        }

        for vdb in &mut vdbs {
            vdb.sort_and_bound();
        }
        validate(&vdbs, num_groups)?;
        let (table_registry, groups) = link(&vdbs, tables)?;

        debug!(
            "shard map built: {} vdbs, {} tables, {} single tables, {} groups",
            vdbs.len(),
            table_registry.len(),
            single_tables.len(),
            groups.len()
        );
        let snapshot = RoutingSnapshot::new(
            vdbs,
            table_registry,
            SingleTableRegistry::new(single_tables),
            groups,
        );
        Ok((snapshot, report))
    }

    pub fn parse_vdbs(&self, list: &[Value], report: &mut LoadReport) -> Vec<VirtualDatabase> {
        let mut vdbs = Vec::with_capacity(list.len());
        for entry in list {
            match self.parse_vdb(entry, report) {
                Ok(vdb) => vdbs.push(vdb),
                Err(e) => report.skip(e),
            }
        }
        vdbs
    }

    fn parse_vdb(&self, entry: &Value, report: &mut LoadReport) -> Result<VirtualDatabase> {
        let obj = entry
            .as_object()
            .ok_or_else(|| parse_err("vdb entry is not an object"))?;
        let field = |name: &str| {
            obj.get(name)
                .filter(|v| !v.is_null())
                .ok_or_else(|| parse_err(format!("vdb entry is missing `{}`", name)))
        };

        let id = vdb_id(field("id")?)
            .ok_or_else(|| parse_err("vdb id is neither a number nor a string"))?;
        let type_name = field("type")?.as_str().unwrap_or_default();
        let key_type = sharding_type(type_name)
            .ok_or_else(|| parse_err(format!("vdb {}: wrong key type `{}`", id, type_name)))?;
        let method_name = field("method")?
            .as_str()
            .ok_or_else(|| parse_err(format!("vdb {}: method is not a string", id)))?;
        let method = sharding_method(method_name);
        let num_node = field("num")?;
        let num = json_int(num_node).unwrap_or_else(|| {
            warn!("vdb {}: num {} is not a number", id, num_node);
            0
        });
        let raw_partitions = field("partitions")?
            .as_object()
            .ok_or_else(|| parse_err(format!("vdb {}: partitions is not an object", id)))?;

        let mut vdb = VirtualDatabase::new(id, method, key_type, num);
        for partition in self.parse_partitions(&vdb, raw_partitions, report)? {
            vdb.push_partition(partition);
        }
        Ok(vdb)
    }

    /// One partition per group entry, except string lists which yield one
    /// range partition per element. Values and buckets that carry no
    /// partition meaning are dropped and recorded in `report`.
    pub fn parse_partitions(
        &self,
        vdb: &VirtualDatabase,
        raw: &Map<String, Value>,
        report: &mut LoadReport,
    ) -> Result<Vec<Partition>> {
        let id = vdb.id();
        let mut partitions = Vec::with_capacity(raw.len());
        for (group, value) in raw {
            let mut rejected = Vec::new();
            let parsed = RawValue::from_json(value, &mut rejected);
            for item in rejected {
                report.skip(parse_err(format!(
                    "vdb {}: group {} list has mixed element {}",
                    id, group, item
                )));
            }
            let Some(raw_value) = parsed else {
                report.skip(parse_err(format!(
                    "vdb {}: group {} has unsupported value {}",
                    id, group, value
                )));
                continue;
            };
            match raw_value {
                RawValue::Null => partitions.push(Partition::range(id, group, None)),
                RawValue::Number(n) => {
                    let bound = number_bound(vdb.key_type(), n);
                    partitions.push(Partition::range(id, group, Some(bound)));
                }
                RawValue::Text(s) => {
                    let bound = self.text_bound(vdb, &s)?;
                    partitions.push(Partition::range(id, group, Some(bound)));
                }
                RawValue::NumberArray(buckets) => {
                    let mut set = BucketSet::new(vdb.bucket_capacity());
                    for bucket in buckets {
                        if !set.set(bucket) {
                            report.skip(parse_err(format!(
                                "vdb {}: group {} bucket {} outside [0, {})",
                                id,
                                group,
                                bucket,
                                vdb.logic_shard_num()
                            )));
                        }
                    }
                    partitions.push(Partition::hash(id, group, set));
                }
                RawValue::TextArray(items) => {
                    for s in items {
                        let bound = self.text_bound(vdb, &s)?;
                        partitions.push(Partition::range(id, group, Some(bound)));
                    }
                }
            }
        }
        Ok(partitions)
    }

    fn text_bound(&self, vdb: &VirtualDatabase, literal: &str) -> Result<KeyValue> {
        let key_type = vdb.key_type();
        key_type
            .parse_key(literal, self.epoch.as_ref())
            .ok_or_else(|| {
                parse_err(format!(
                    "vdb {}: wrong {} boundary `{}`",
                    vdb.id(),
                    key_type,
                    literal
                ))
            })
    }
}

fn number_bound(key_type: KeyType, n: i64) -> KeyValue {
    match key_type {
        KeyType::Str => KeyValue::Str(n.to_string()),
        KeyType::Int | KeyType::Date | KeyType::DateTime => KeyValue::Int(n),
    }
}

pub fn parse_tables(list: &[Value], report: &mut LoadReport) -> Vec<TableSpec> {
    let mut tables = Vec::with_capacity(list.len());
    for entry in list {
        let spec = str_field(entry, "db").and_then(|schema| {
            Some(TableSpec {
                schema,
                name: str_field(entry, "table")?,
                primary_key: str_field(entry, "pkey")?,
                vdb_id: entry.get("vdb").and_then(vdb_id)?,
            })
        });
        match spec {
            Some(spec) => tables.push(spec),
            None => report.skip(parse_err(format!(
                "table entry needs db, table, pkey and vdb: {}",
                entry
            ))),
        }
    }
    tables
}

pub fn parse_single_tables(list: &[Value], report: &mut LoadReport) -> Vec<SingleTableDescriptor> {
    let mut tables = Vec::with_capacity(list.len());
    for entry in list {
        let table = str_field(entry, "db").and_then(|schema| {
            Some(SingleTableDescriptor {
                schema,
                name: str_field(entry, "table")?,
                group: str_field(entry, "group")?,
            })
        });
        match table {
            Some(table) => tables.push(table),
            None => report.skip(parse_err(format!(
                "single table entry needs db, table and group: {}",
                entry
            ))),
        }
    }
    tables
}

/// Every vdb must be valid and carry a unique id.
fn validate(vdbs: &[VirtualDatabase], num_groups: usize) -> Result<()> {
    let mut seen = HashSet::with_capacity(vdbs.len());
    for vdb in vdbs {
        if !seen.insert(vdb.id()) {
            error!("vdb id {} is defined more than once", vdb.id());
            return Err(ShardingError::validation(vdb.id(), "duplicate vdb id"));
        }
        if let Err(e) = vdb.is_valid(num_groups) {
            error!("invalid vdb config: {}", e);
            return Err(e);
        }
    }
    Ok(())
}

/// Resolve each table's vdb and derive the group catalog from every vdb's
/// partitions. An unknown vdb id rejects the load.
pub fn link(
    vdbs: &[VirtualDatabase],
    tables: Vec<TableSpec>,
) -> Result<(TableRegistry, GroupCatalog)> {
    let by_id: HashMap<VdbId, usize> = vdbs
        .iter()
        .enumerate()
        .map(|(idx, vdb)| (vdb.id(), idx))
        .collect();

    let mut registry = TableRegistry::default();
    for spec in tables {
        let Some(&idx) = by_id.get(&spec.vdb_id) else {
            error!(
                "table {}.{}: vdb id {} cannot be found",
                spec.schema, spec.name, spec.vdb_id
            );
            return Err(ShardingError::Reference {
                schema: spec.schema,
                table: spec.name,
                vdb_id: spec.vdb_id,
            });
        };
        let key_type = vdbs[idx].key_type();
        registry.insert(TableDescriptor::link(spec, idx, key_type));
    }

    let mut groups = GroupCatalog::default();
    for group in vdbs.iter().flat_map(VirtualDatabase::groups) {
        groups.insert(group);
    }
    Ok((registry, groups))
}

fn required_list<'a>(root: &'a Map<String, Value>, key: &str) -> Result<&'a [Value]> {
    match root.get(key) {
        Some(Value::Array(items)) => Ok(items.as_slice()),
        Some(_) => Err(structural(format!("`{}` is not a list", key))),
        None => Err(structural(format!("`{}` is missing", key))),
    }
}

/// Numbers are taken as is. Strings are read like C `atoi`: leading
/// whitespace, an optional sign, then digits; no digits reads as 0.
fn vdb_id(value: &Value) -> Option<VdbId> {
    match value {
        Value::Number(_) => json_int(value),
        Value::String(s) => Some(leading_int(s)),
        _ => None,
    }
}

fn leading_int(text: &str) -> i64 {
    let text = text.trim_start();
    let (negative, digits) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };
    let magnitude = digits
        .bytes()
        .take_while(u8::is_ascii_digit)
        .fold(0i64, |acc, d| {
            acc.saturating_mul(10).saturating_add(i64::from(d - b'0'))
        });
    if negative {
        -magnitude
    } else {
        magnitude
    }
}

fn str_field(entry: &Value, key: &str) -> Option<String> {
    entry.get(key)?.as_str().map(str::to_string)
}

fn parse_err(msg: impl Into<String>) -> ShardingError {
    ShardingError::Parse(msg.into())
}

fn structural(msg: impl Into<String>) -> ShardingError {
    let err = ShardingError::Structural(msg.into());
    error!("{}", err);
    err
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vdb_entry(partitions: Value) -> Value {
        json!({"id": 1, "type": "INT", "method": "range", "num": 0, "partitions": partitions})
    }

    #[test]
    fn test_parse_partitions_shapes() {
        let builder = ConfigBuilder::new();
        let vdb = VirtualDatabase::new(1, crate::types::ShardMethod::Range, KeyType::Str, 0);
        let raw = json!({"a": "m", "b": ["t", "x"], "c": null, "d": 7, "e": true});
        let mut report = LoadReport::default();
        let parts = builder
            .parse_partitions(&vdb, raw.as_object().unwrap(), &mut report)
            .unwrap();
        let groups: Vec<&str> = parts.iter().map(Partition::group).collect();
        assert_eq!(groups, vec!["a", "b", "b", "c", "d"]);
        assert_eq!(report.skipped.len(), 1);
        assert!(report.skipped[0].to_string().contains("group e"));
        assert_eq!(
            parts[4].bound().and_then(|b| b.high.clone()),
            Some(KeyValue::Str("7".into()))
        );
    }

    #[test]
    fn test_hash_buckets_out_of_range_dropped() {
        let builder = ConfigBuilder::new();
        let vdb = VirtualDatabase::new(1, crate::types::ShardMethod::Hash, KeyType::Int, 2);
        let raw = json!({"g0": [0, 1, 5, -1]});
        let mut report = LoadReport::default();
        let parts = builder
            .parse_partitions(&vdb, raw.as_object().unwrap(), &mut report)
            .unwrap();
        let buckets: Vec<u32> = parts[0].buckets().unwrap().iter().collect();
        assert_eq!(buckets, vec![0, 1]);
        assert_eq!(report.skipped.len(), 2);
    }

    #[test]
    fn test_mixed_list_elements_are_reported() {
        let builder = ConfigBuilder::new();
        let vdb = VirtualDatabase::new(1, crate::types::ShardMethod::Range, KeyType::Str, 0);
        let raw = json!({"g0": ["f", 3, "t"]});
        let mut report = LoadReport::default();
        let parts = builder
            .parse_partitions(&vdb, raw.as_object().unwrap(), &mut report)
            .unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(report.skipped.len(), 1);
        assert!(matches!(report.skipped[0], ShardingError::Parse(_)));
    }

    #[test]
    fn test_vdb_id_reads_like_atoi() {
        assert_eq!(vdb_id(&json!(-5)), Some(-5));
        assert_eq!(vdb_id(&json!(4_294_967_296i64)), Some(4_294_967_296));
        assert_eq!(vdb_id(&json!(" 12abc")), Some(12));
        assert_eq!(vdb_id(&json!("-3")), Some(-3));
        assert_eq!(vdb_id(&json!("abc")), Some(0));
        assert_eq!(vdb_id(&json!(true)), None);
        assert_eq!(vdb_id(&json!([1])), None);
    }

    #[test]
    fn test_date_boundaries_use_epoch_parser() {
        let builder = ConfigBuilder::new();
        let mut report = LoadReport::default();
        let list = vec![json!({
            "id": "3", "type": "date", "method": "RANGE", "num": 0,
            "partitions": {"old": "1970-01-02", "new": null}
        })];
        let vdbs = builder.parse_vdbs(&list, &mut report);
        assert!(report.is_clean());
        assert_eq!(vdbs[0].id(), 3);
        assert_eq!(
            vdbs[0].partitions()[0].bound().and_then(|b| b.high.clone()),
            Some(KeyValue::Int(86_400))
        );
    }

    #[test]
    fn test_bad_date_skips_vdb() {
        let builder = ConfigBuilder::new();
        let mut report = LoadReport::default();
        let list = vec![json!({
            "id": 3, "type": "DATETIME", "method": "range", "num": 0,
            "partitions": {"old": "not a date"}
        })];
        assert!(builder.parse_vdbs(&list, &mut report).is_empty());
        assert_eq!(report.skipped.len(), 1);
    }

    #[test]
    fn test_unknown_key_type_skips_vdb() {
        let builder = ConfigBuilder::new();
        let mut report = LoadReport::default();
        let mut entry = vdb_entry(json!({"g0": null}));
        entry["type"] = json!("FLOAT");
        assert!(builder.parse_vdbs(&[entry], &mut report).is_empty());
        assert!(matches!(report.skipped[0], ShardingError::Parse(_)));
    }

    #[test]
    fn test_custom_epoch_parser() {
        let builder =
            ConfigBuilder::with_epoch_parser(Arc::new(|_: &str| -> Option<i64> { Some(5) }));
        let mut report = LoadReport::default();
        let list = vec![json!({
            "id": 1, "type": "DATE", "method": "range", "num": 0,
            "partitions": {"g0": "whenever"}
        })];
        let vdbs = builder.parse_vdbs(&list, &mut report);
        assert_eq!(
            vdbs[0].partitions()[0].bound().and_then(|b| b.high.clone()),
            Some(KeyValue::Int(5))
        );
    }

    #[test]
    fn test_parse_tables_skips_incomplete_entries() {
        let mut report = LoadReport::default();
        let list = vec![
            json!({"db": "shop", "table": "orders", "pkey": "id", "vdb": 1}),
            json!({"db": "shop", "table": "items", "pkey": "id", "vdb": "2"}),
            json!({"db": "shop", "table": "users", "vdb": 1}),
        ];
        let tables = parse_tables(&list, &mut report);
        assert_eq!(tables.len(), 2);
        assert_eq!(tables[1].vdb_id, 2);
        assert_eq!(report.skipped.len(), 1);
    }

    #[test]
    fn test_parse_single_tables() {
        let mut report = LoadReport::default();
        let list = vec![
            json!({"db": "shop", "table": "config", "group": "g0"}),
            json!({"db": "shop", "table": "config"}),
        ];
        let tables = parse_single_tables(&list, &mut report);
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].group, "g0");
        assert_eq!(report.skipped.len(), 1);
    }

    #[test]
    fn test_link_unknown_vdb_is_fatal() {
        let vdbs = vec![VirtualDatabase::new(
            1,
            crate::types::ShardMethod::Range,
            KeyType::Int,
            0,
        )];
        let tables = vec![TableSpec {
            schema: "shop".into(),
            name: "orders".into(),
            primary_key: "id".into(),
            vdb_id: 7,
        }];
        let err = link(&vdbs, tables).unwrap_err();
        assert!(matches!(err, ShardingError::Reference { vdb_id: 7, .. }));
    }

    #[test]
    fn test_missing_table_list_is_structural() {
        let builder = ConfigBuilder::new();
        let root = json!({"vdb": [vdb_entry(json!({"g0": null}))]});
        assert!(matches!(
            builder.build(&root, 1),
            Err(ShardingError::Structural(_))
        ));
    }

    #[test]
    fn test_duplicate_vdb_id_rejected() {
        let builder = ConfigBuilder::new();
        let root = json!({
            "vdb": [vdb_entry(json!({"g0": null})), vdb_entry(json!({"g1": null}))],
            "table": [{"db": "shop", "table": "orders", "pkey": "id", "vdb": 1}]
        });
        assert!(matches!(
            builder.build(&root, 2),
            Err(ShardingError::Validation { vdb_id: 1, .. })
        ));
    }

    #[test]
    fn test_invalid_json_text_is_structural() {
        let builder = ConfigBuilder::new();
        assert!(matches!(
            builder.build_str("{ not json", 1),
            Err(ShardingError::Structural(_))
        ));
    }
}

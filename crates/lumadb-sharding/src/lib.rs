//! LumaDB sharding index
//!
//! Turns a declarative shard map (virtual databases, partitions, tables and
//! backend groups) into an in-memory index answering "which group(s) own
//! this table or key". The committed map is immutable and replaced
//! atomically on reload.

pub mod builder;
pub mod epoch;
pub mod error;
pub mod index;
pub mod partition;
pub mod registry;
pub mod settings;
pub mod snapshot;
pub mod types;
pub mod vdb;

pub use builder::{ConfigBuilder, LoadReport};
pub use epoch::{ChronoEpochParser, EpochParser};
pub use error::{Result, ShardingError};
pub use index::ShardingIndex;
pub use partition::{BucketSet, Partition, PartitionPayload, RangeBound};
pub use registry::{GroupCatalog, SingleTableDescriptor, TableDescriptor};
pub use settings::Settings;
pub use snapshot::RoutingSnapshot;
pub use types::{KeyType, KeyValue, RawValue, ShardMethod, VdbId, MAX_HASH_VALUE_COUNT};
pub use vdb::VirtualDatabase;

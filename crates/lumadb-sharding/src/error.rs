//! Error types for shard map loading.

use thiserror::Error;

use crate::types::VdbId;

/// Errors raised while turning a shard map into a routing snapshot.
///
/// Queries against a committed snapshot never fail; a missing table or group
/// is reported as `None` instead.
#[derive(Error, Debug)]
pub enum ShardingError {
    /// One vdb/table/single-table entry is malformed. The entry is skipped.
    #[error("Parse Error: {0}")]
    Parse(String),
    /// A table refers to a vdb id that does not exist.
    #[error("Reference Error: table {schema}.{table} refers to unknown vdb {vdb_id}")]
    Reference {
        schema: String,
        table: String,
        vdb_id: VdbId,
    },
    /// A vdb is internally inconsistent or does not fit the cluster topology.
    #[error("Validation Error: vdb {vdb_id}: {reason}")]
    Validation { vdb_id: VdbId, reason: String },
    /// The configuration tree itself is missing or unusable.
    #[error("Structural Error: {0}")]
    Structural(String),
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Settings Error: {0}")]
    Settings(#[from] toml::de::Error),
}

impl ShardingError {
    pub fn validation(vdb_id: VdbId, reason: impl Into<String>) -> Self {
        ShardingError::Validation {
            vdb_id,
            reason: reason.into(),
        }
    }

    /// Whether this error rejects the whole load.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ShardingError::Parse(_))
    }
}

pub type Result<T> = std::result::Result<T, ShardingError>;

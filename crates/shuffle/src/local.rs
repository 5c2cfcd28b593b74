use nexec_common::{NexecError, Result};
use serde::{Deserialize, Serialize};

use crate::backend::ShuffleBackendFactory;
use crate::config::ShuffleConfig;

/// Name of the reference file-backed shuffle backend.
pub const LOCAL_PERSISTENT_SHUFFLE: &str = "local-persistent";

/// Required keys of a `local-persistent` shuffle configuration.
///
/// Other keys in the blob are ignored here and forwarded untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalShuffleInfo {
    /// Durable storage root all partitions are written under.
    pub root_path: String,
    /// Total number of shuffle partitions.
    pub num_partitions: u32,
}

impl LocalShuffleInfo {
    pub fn parse(config: &ShuffleConfig) -> Result<Self> {
        let info: LocalShuffleInfo =
            serde_json::from_value(serde_json::Value::Object(config.as_map().clone())).map_err(
                |e| {
                    NexecError::InvalidShuffleConfig(format!(
                        "{LOCAL_PERSISTENT_SHUFFLE} config: {e}"
                    ))
                },
            )?;
        if info.root_path.trim().is_empty() {
            return Err(NexecError::InvalidShuffleConfig(format!(
                "{LOCAL_PERSISTENT_SHUFFLE} config: rootPath must not be empty"
            )));
        }
        if info.num_partitions == 0 {
            return Err(NexecError::InvalidShuffleConfig(format!(
                "{LOCAL_PERSISTENT_SHUFFLE} config: numPartitions must be positive"
            )));
        }
        Ok(info)
    }
}

/// File-backed shuffle persisting partitions under a root directory.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalPersistentShuffle;

impl ShuffleBackendFactory for LocalPersistentShuffle {
    fn name(&self) -> &str {
        LOCAL_PERSISTENT_SHUFFLE
    }

    fn num_partitions(&self, config: &ShuffleConfig) -> Result<u32> {
        Ok(LocalShuffleInfo::parse(config)?.num_partitions)
    }
}

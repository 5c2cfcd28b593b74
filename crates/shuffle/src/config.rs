use nexec_common::{NexecError, Result};
use serde::{Deserialize, Serialize};

/// Key holding the total partition count in shuffle configurations.
pub const NUM_PARTITIONS_KEY: &str = "numPartitions";

/// Backend specific shuffle write configuration.
///
/// The blob is kept as a JSON object and handed to the shuffle write operator
/// as-is; only [`ShuffleConfig::num_partitions`] is interpreted on the
/// conversion path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShuffleConfig(serde_json::Map<String, serde_json::Value>);

impl ShuffleConfig {
    /// Parse the serialized configuration sent by the coordinator.
    pub fn from_json(raw: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(raw)
            .map_err(|e| NexecError::InvalidShuffleConfig(format!("malformed json: {e}")))?;
        Self::from_value(value)
    }

    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        match value {
            serde_json::Value::Object(map) => Ok(Self(map)),
            other => Err(NexecError::InvalidShuffleConfig(format!(
                "expected a json object, got {other}"
            ))),
        }
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    pub fn as_map(&self) -> &serde_json::Map<String, serde_json::Value> {
        &self.0
    }

    /// Serialized form forwarded to the runtime.
    pub fn to_json_string(&self) -> String {
        serde_json::Value::Object(self.0.clone()).to_string()
    }

    /// Declared total partition count; must be a positive integer that fits `u32`.
    pub fn num_partitions(&self) -> Result<u32> {
        let value = self.get(NUM_PARTITIONS_KEY).ok_or_else(|| {
            NexecError::InvalidShuffleConfig(format!("missing required key '{NUM_PARTITIONS_KEY}'"))
        })?;
        value
            .as_u64()
            .filter(|n| *n > 0)
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| {
                NexecError::InvalidShuffleConfig(format!(
                    "'{NUM_PARTITIONS_KEY}' must be a positive integer, got {value}"
                ))
            })
    }
}

use serde::{Deserialize, Serialize};

use crate::error::{NexecError, Result};

/// Session property overriding [`ConverterConfig::function_namespace`].
pub const FUNCTION_NAMESPACE_PROPERTY: &str = "native_function_namespace";
/// Session property overriding [`ConverterConfig::local_shuffle_partitions`].
pub const LOCAL_SHUFFLE_PARTITIONS_PROPERTY: &str = "native_local_shuffle_partitions";
/// Session property overriding [`ConverterConfig::max_plan_depth`].
pub const MAX_PLAN_DEPTH_PROPERTY: &str = "native_max_plan_depth";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConverterConfig {
    /// Namespace prefix stripped from protocol function names before catalog lookup.
    pub function_namespace: String,
    /// Local fan-out of the shuffle write chain in batch mode.
    pub local_shuffle_partitions: u32,
    /// Maximum plan nesting accepted before conversion is rejected.
    pub max_plan_depth: usize,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            function_namespace: "presto.default".to_string(),
            local_shuffle_partitions: 1,
            max_plan_depth: 512,
        }
    }
}

impl ConverterConfig {
    /// Apply session system properties on top of this config.
    ///
    /// Unknown properties are ignored; known properties with malformed values
    /// fail with [`NexecError::InvalidConfig`].
    pub fn with_overrides<'a>(
        &self,
        properties: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Result<Self> {
        let mut cfg = self.clone();
        for (name, value) in properties {
            match name {
                FUNCTION_NAMESPACE_PROPERTY => {
                    if value.trim().is_empty() {
                        return Err(NexecError::InvalidConfig(format!(
                            "{name} must not be empty"
                        )));
                    }
                    cfg.function_namespace = value.trim().to_string();
                }
                LOCAL_SHUFFLE_PARTITIONS_PROPERTY => {
                    cfg.local_shuffle_partitions = parse_positive(name, value)?;
                }
                MAX_PLAN_DEPTH_PROPERTY => {
                    cfg.max_plan_depth = parse_positive::<usize>(name, value)?;
                }
                _ => {}
            }
        }
        Ok(cfg)
    }
}

fn parse_positive<T>(name: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr + PartialOrd + Default,
{
    match value.trim().parse::<T>() {
        Ok(v) if v > T::default() => Ok(v),
        _ => Err(NexecError::InvalidConfig(format!(
            "{name} must be a positive integer, got '{value}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::{ConverterConfig, LOCAL_SHUFFLE_PARTITIONS_PROPERTY, MAX_PLAN_DEPTH_PROPERTY};
    use crate::NexecError;

    #[test]
    fn overrides_known_properties() {
        let cfg = ConverterConfig::default()
            .with_overrides([
                (LOCAL_SHUFFLE_PARTITIONS_PROPERTY, "4"),
                (MAX_PLAN_DEPTH_PROPERTY, "16"),
                ("query_max_memory", "1GB"),
            ])
            .expect("overrides");
        assert_eq!(cfg.local_shuffle_partitions, 4);
        assert_eq!(cfg.max_plan_depth, 16);
        assert_eq!(cfg.function_namespace, "presto.default");
    }

    #[test]
    fn rejects_non_positive_values() {
        let err = ConverterConfig::default()
            .with_overrides([(LOCAL_SHUFFLE_PARTITIONS_PROPERTY, "0")])
            .expect_err("zero partitions");
        assert!(matches!(err, NexecError::InvalidConfig(_)));

        let err = ConverterConfig::default()
            .with_overrides([(MAX_PLAN_DEPTH_PROPERTY, "deep")])
            .expect_err("not a number");
        assert!(matches!(err, NexecError::InvalidConfig(_)));
    }
}

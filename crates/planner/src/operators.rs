//! Operator nodes used by batch execution and local exchanges.

use arrow_schema::{DataType, Field, Schema};
use nexec_common::{NexecError, PlanNodeId, Result};
use nexec_shuffle::ShuffleConfig;
use serde::{Deserialize, Serialize};

use crate::expressions::TypedExpr;
use crate::plan_node::PlanNode;
use crate::types::type_signature;

/// Partition index column of the serialized layout.
pub const PARTITION_COLUMN: &str = "partition";
/// Serialized row column of the serialized layout.
pub const DATA_COLUMN: &str = "data";

/// `(partition INTEGER, data VARBINARY)`, produced by partition-and-serialize
/// and consumed by shuffle write.
pub fn serialized_layout() -> Schema {
    Schema::new(vec![
        Field::new(PARTITION_COLUMN, DataType::Int32, false),
        Field::new(DATA_COLUMN, DataType::Binary, false),
    ])
}

/// Computes a partition index and a serialized row for every input row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionAndSerializeNode {
    pub id: PlanNodeId,
    keys: Vec<TypedExpr>,
    num_partitions: u32,
    replicate_nulls_and_any: bool,
    serialized_row_type: Schema,
    pub input: Box<PlanNode>,
}

impl PartitionAndSerializeNode {
    /// Serializes every column of `input`.
    pub fn try_new(
        id: PlanNodeId,
        keys: Vec<TypedExpr>,
        num_partitions: u32,
        input: PlanNode,
    ) -> Result<Self> {
        if num_partitions == 0 {
            return Err(NexecError::Planning(format!(
                "partition-and-serialize node '{id}' needs at least one partition"
            )));
        }
        let row_type = input.output_type();
        for key in &keys {
            if let TypedExpr::Field { name, .. } = key {
                if row_type.index_of(name).is_err() {
                    return Err(NexecError::Planning(format!(
                        "partition key '{name}' of node '{id}' is not produced by '{}'",
                        input.id()
                    )));
                }
            }
        }
        Ok(Self {
            id,
            keys,
            num_partitions,
            replicate_nulls_and_any: false,
            serialized_row_type: row_type,
            input: Box::new(input),
        })
    }

    pub fn with_replicate_nulls_and_any(mut self, replicate: bool) -> Self {
        self.replicate_nulls_and_any = replicate;
        self
    }

    pub fn num_partitions(&self) -> u32 {
        self.num_partitions
    }

    pub fn keys(&self) -> &[TypedExpr] {
        &self.keys
    }

    pub fn replicate_nulls_and_any(&self) -> bool {
        self.replicate_nulls_and_any
    }

    /// Row type packed into the `data` column.
    pub fn serialized_row_type(&self) -> &Schema {
        &self.serialized_row_type
    }

    pub fn output_type(&self) -> Schema {
        serialized_layout()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LocalPartitionKind {
    /// All sources merged into a single stream.
    Gather,
    /// Rows redistributed across local drivers by key hash.
    Repartition,
}

/// In-process exchange between drivers of one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalPartitionNode {
    pub id: PlanNodeId,
    pub kind: LocalPartitionKind,
    /// Hash keys; empty for gather.
    pub keys: Vec<TypedExpr>,
    /// Layout every source produces.
    pub output_type: Schema,
    pub sources: Vec<PlanNode>,
}

impl LocalPartitionNode {
    pub fn gather(id: PlanNodeId, output_type: Schema, sources: Vec<PlanNode>) -> Self {
        Self {
            id,
            kind: LocalPartitionKind::Gather,
            keys: vec![],
            output_type,
            sources,
        }
    }

    pub fn repartition(
        id: PlanNodeId,
        keys: Vec<TypedExpr>,
        output_type: Schema,
        sources: Vec<PlanNode>,
    ) -> Self {
        Self {
            id,
            kind: LocalPartitionKind::Repartition,
            keys,
            output_type,
            sources,
        }
    }

    pub fn output_type(&self) -> Schema {
        self.output_type.clone()
    }
}

/// Hands serialized partitions to the named shuffle backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShuffleWriteNode {
    pub id: PlanNodeId,
    shuffle_name: String,
    config: ShuffleConfig,
    pub input: Box<PlanNode>,
}

impl ShuffleWriteNode {
    /// `input` must produce the `(partition, data)` layout.
    pub fn try_new(
        id: PlanNodeId,
        shuffle_name: impl Into<String>,
        config: ShuffleConfig,
        input: PlanNode,
    ) -> Result<Self> {
        let actual = input.output_type();
        if !is_serialized_layout(&actual) {
            return Err(NexecError::Planning(format!(
                "shuffle write node '{id}' expects input ({PARTITION_COLUMN} integer, {DATA_COLUMN} varbinary), got ({})",
                actual
                    .fields()
                    .iter()
                    .map(|f| format!("{} {}", f.name(), type_signature(f.data_type())))
                    .collect::<Vec<_>>()
                    .join(", ")
            )));
        }
        Ok(Self {
            id,
            shuffle_name: shuffle_name.into(),
            config,
            input: Box::new(input),
        })
    }

    /// Backend implementation selected at runtime.
    pub fn shuffle_name(&self) -> &str {
        &self.shuffle_name
    }

    /// Opaque backend configuration.
    pub fn config(&self) -> &ShuffleConfig {
        &self.config
    }

    /// Shuffle write is a sink.
    pub fn output_type(&self) -> Schema {
        Schema::empty()
    }
}

fn is_serialized_layout(schema: &Schema) -> bool {
    let expected = serialized_layout();
    schema.fields().len() == expected.fields().len()
        && schema
            .fields()
            .iter()
            .zip(expected.fields().iter())
            .all(|(a, b)| a.name() == b.name() && a.data_type() == b.data_type())
}

/// Reads and deserializes shuffled rows written by upstream batch fragments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShuffleReadNode {
    pub id: PlanNodeId,
    pub source_fragment_ids: Vec<String>,
    output_type: Schema,
}

impl ShuffleReadNode {
    pub fn new(id: PlanNodeId, source_fragment_ids: Vec<String>, output_type: Schema) -> Self {
        Self {
            id,
            source_fragment_ids,
            output_type,
        }
    }

    /// Deserialized row type.
    pub fn output_type(&self) -> &Schema {
        &self.output_type
    }
}

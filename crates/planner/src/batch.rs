//! Batch augmentation: replaces the fragment's root repartitioning exchange
//! with `ShuffleWrite <- LocalPartition <- PartitionAndSerialize`.

use std::collections::HashSet;

use arrow_schema::DataType;
use nexec_common::{NexecError, PlanNodeId, Result};
use nexec_shuffle::{ShuffleBackendRegistry, ShuffleConfig};
use tracing::info;

use crate::expressions::TypedExpr;
use crate::operators::{
    serialized_layout, LocalPartitionNode, PartitionAndSerializeNode, ShuffleWriteNode,
    PARTITION_COLUMN,
};
use crate::plan_node::{align_to_layout, PartitionCount, PlanNode};

/// Suffix of a synthesized projection renaming exchange inputs to the layout.
pub const RENAME_SUFFIX: &str = "rename";
/// Suffix of the synthesized partition-and-serialize node id.
pub const PARTITION_AND_SERIALIZE_SUFFIX: &str = "partition-and-serialize";
/// Suffix of the synthesized local partition node id.
pub const LOCAL_PARTITION_SUFFIX: &str = "local-partition";
/// Suffix of the synthesized shuffle write node id.
pub const SHUFFLE_WRITE_SUFFIX: &str = "shuffle-write";

/// Inputs of one augmentation besides the plan itself.
#[derive(Debug, Clone, Copy)]
pub struct BatchShuffleSpec<'a> {
    pub shuffle_name: &'a str,
    pub shuffle_config: Option<&'a ShuffleConfig>,
    /// Local fan-out of the shuffle write; 1 gathers into a single writer.
    pub local_partitions: u32,
}

/// Splice the shuffle write chain in place of the root exchange of `plan`.
///
/// Checks, in order: the config is present, the backend is registered, the
/// backend accepts the config, the root is a repartitioning exchange with one
/// source, and its partition count agrees with the config.
pub fn augment_batch_plan(
    plan: PlanNode,
    spec: BatchShuffleSpec<'_>,
    backends: &ShuffleBackendRegistry,
) -> Result<PlanNode> {
    let shuffle_name = spec.shuffle_name;
    let config = spec.shuffle_config.ok_or_else(|| {
        NexecError::InvalidShuffleConfig(format!(
            "no shuffle config given for backend '{shuffle_name}'"
        ))
    })?;
    let backend = backends.resolve(shuffle_name).ok_or_else(|| {
        NexecError::InvalidShuffleConfig(format!(
            "shuffle backend '{shuffle_name}' is not registered (registered: {})",
            backends.names().join(", ")
        ))
    })?;
    let config_partitions = backend.num_partitions(config)?;

    let mut taken = plan
        .node_ids()
        .into_iter()
        .map(|id| id.as_str().to_string())
        .collect::<HashSet<_>>();

    let exchange = match plan {
        PlanNode::Exchange(exchange) if exchange.is_repartition() => exchange,
        other => {
            return Err(NexecError::NoExchangeBoundary {
                node_id: other.id().to_string(),
                kind: other.name().to_string(),
            })
        }
    };
    let exchange_id = exchange.id.clone();
    if !exchange.ordering.is_empty() {
        return Err(NexecError::Unsupported(format!(
            "ordered exchange '{exchange_id}' as shuffle boundary"
        )));
    }
    let source_count = exchange.sources.len();
    let mut sources = exchange.sources;
    let child = match sources.pop() {
        Some(child) if source_count == 1 => child,
        _ => {
            return Err(NexecError::Planning(format!(
                "shuffle boundary '{exchange_id}' must have exactly one source, has {source_count}"
            )))
        }
    };

    match exchange.partitioning.partition_count {
        PartitionCount::Static(declared) if declared != config_partitions => {
            return Err(NexecError::PartitionCountMismatch {
                node_id: exchange_id.to_string(),
                exchange: declared,
                config: config_partitions,
            })
        }
        _ => {}
    }

    // partitioning keys name layout columns
    let input_names = exchange.inputs.first().ok_or_else(|| {
        NexecError::Planning(format!("shuffle boundary '{exchange_id}' has no input layout"))
    })?;
    let child = align_to_layout(child, input_names, &exchange.output_type, || {
        synthesize_id(&exchange_id, RENAME_SUFFIX, &mut taken)
    })?;
    let serialize_id = synthesize_id(&exchange_id, PARTITION_AND_SERIALIZE_SUFFIX, &mut taken);
    let local_id = synthesize_id(&exchange_id, LOCAL_PARTITION_SUFFIX, &mut taken);
    let write_id = synthesize_id(&exchange_id, SHUFFLE_WRITE_SUFFIX, &mut taken);

    let serialized = PartitionAndSerializeNode::try_new(
        serialize_id,
        exchange.partitioning.keys,
        config_partitions,
        child,
    )?
    .with_replicate_nulls_and_any(exchange.partitioning.replicate_nulls_and_any);
    let serialized = vec![PlanNode::PartitionAndSerialize(serialized)];
    let local = if spec.local_partitions <= 1 {
        LocalPartitionNode::gather(local_id, serialized_layout(), serialized)
    } else {
        LocalPartitionNode::repartition(
            local_id,
            vec![TypedExpr::field(PARTITION_COLUMN, DataType::Int32)],
            serialized_layout(),
            serialized,
        )
    };
    let write = ShuffleWriteNode::try_new(
        write_id,
        shuffle_name,
        config.clone(),
        PlanNode::LocalPartition(local),
    )?;

    info!(
        exchange_id = %exchange_id,
        shuffle = shuffle_name,
        num_partitions = config_partitions,
        local_partitions = spec.local_partitions,
        "spliced shuffle write boundary"
    );
    Ok(PlanNode::ShuffleWrite(write))
}

/// `<base>.<suffix>`, with `.1`, `.2`, ... appended until unused.
pub(crate) fn synthesize_id(base: &PlanNodeId, suffix: &str, taken: &mut HashSet<String>) -> PlanNodeId {
    let candidate = format!("{base}.{suffix}");
    let mut id = candidate.clone();
    let mut n = 0u32;
    while taken.contains(&id) {
        n += 1;
        id = format!("{candidate}.{n}");
    }
    taken.insert(id.clone());
    PlanNodeId(id)
}

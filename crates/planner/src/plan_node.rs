use arrow_schema::{Field, Schema};
use nexec_common::{NexecError, PlanNodeId, Result};
use serde::{Deserialize, Serialize};

use crate::connectors::{NativeColumnHandle, NativeTableHandle};
use crate::expressions::TypedExpr;
use crate::operators::{
    LocalPartitionNode, PartitionAndSerializeNode, ShuffleReadNode, ShuffleWriteNode,
};

/// The native operator tree handed to the execution runtime.
///
/// Every node carries the id of the protocol node it was converted from and
/// exclusively owns its children.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PlanNode {
    /// Connector table scan.
    TableScan(TableScanNode),
    /// Row filter.
    Filter(FilterNode),
    /// Projection.
    Project(ProjectNode),
    /// Hash or streaming aggregation of one step.
    Aggregate(AggregateNode),
    /// Offset + limit.
    Limit(LimitNode),
    /// Ordered limit.
    TopN(TopNNode),
    /// Full sort.
    Sort(SortNode),
    /// Remote data exchange boundary.
    Exchange(ExchangeNode),
    /// In-process exchange.
    LocalPartition(LocalPartitionNode),
    /// Streaming read of upstream fragments.
    RemoteSource(RemoteSourceNode),
    /// Inline rows.
    Values(ValuesNode),
    /// Equi-join.
    HashJoin(HashJoinNode),
    /// Join without equi-criteria.
    NestedLoopJoin(NestedLoopJoinNode),
    /// Partition index + serialized row per input row (batch mode).
    PartitionAndSerialize(PartitionAndSerializeNode),
    /// Shuffle write root of a batch fragment.
    ShuffleWrite(ShuffleWriteNode),
    /// Shuffle read leaf of a batch fragment.
    ShuffleRead(ShuffleReadNode),
    /// Node produced by an extension converter.
    Custom(CustomNode),
}

impl PlanNode {
    pub fn id(&self) -> &PlanNodeId {
        match self {
            PlanNode::TableScan(x) => &x.id,
            PlanNode::Filter(x) => &x.id,
            PlanNode::Project(x) => &x.id,
            PlanNode::Aggregate(x) => &x.id,
            PlanNode::Limit(x) => &x.id,
            PlanNode::TopN(x) => &x.id,
            PlanNode::Sort(x) => &x.id,
            PlanNode::Exchange(x) => &x.id,
            PlanNode::LocalPartition(x) => &x.id,
            PlanNode::RemoteSource(x) => &x.id,
            PlanNode::Values(x) => &x.id,
            PlanNode::HashJoin(x) => &x.id,
            PlanNode::NestedLoopJoin(x) => &x.id,
            PlanNode::PartitionAndSerialize(x) => &x.id,
            PlanNode::ShuffleWrite(x) => &x.id,
            PlanNode::ShuffleRead(x) => &x.id,
            PlanNode::Custom(x) => &x.id,
        }
    }

    /// Operator name used in logs and explain output.
    pub fn name(&self) -> &str {
        match self {
            PlanNode::TableScan(_) => "TableScan",
            PlanNode::Filter(_) => "Filter",
            PlanNode::Project(_) => "Project",
            PlanNode::Aggregate(_) => "Aggregate",
            PlanNode::Limit(_) => "Limit",
            PlanNode::TopN(_) => "TopN",
            PlanNode::Sort(_) => "Sort",
            PlanNode::Exchange(_) => "Exchange",
            PlanNode::LocalPartition(_) => "LocalPartition",
            PlanNode::RemoteSource(_) => "RemoteSource",
            PlanNode::Values(_) => "Values",
            PlanNode::HashJoin(_) => "HashJoin",
            PlanNode::NestedLoopJoin(_) => "NestedLoopJoin",
            PlanNode::PartitionAndSerialize(_) => "PartitionAndSerialize",
            PlanNode::ShuffleWrite(_) => "ShuffleWrite",
            PlanNode::ShuffleRead(_) => "ShuffleRead",
            PlanNode::Custom(x) => &x.name,
        }
    }

    /// Returns direct children in source order.
    pub fn children(&self) -> Vec<&PlanNode> {
        match self {
            PlanNode::TableScan(_)
            | PlanNode::RemoteSource(_)
            | PlanNode::Values(_)
            | PlanNode::ShuffleRead(_) => vec![],
            PlanNode::Filter(x) => vec![x.input.as_ref()],
            PlanNode::Project(x) => vec![x.input.as_ref()],
            PlanNode::Aggregate(x) => vec![x.input.as_ref()],
            PlanNode::Limit(x) => vec![x.input.as_ref()],
            PlanNode::TopN(x) => vec![x.input.as_ref()],
            PlanNode::Sort(x) => vec![x.input.as_ref()],
            PlanNode::Exchange(x) => x.sources.iter().collect(),
            PlanNode::LocalPartition(x) => x.sources.iter().collect(),
            PlanNode::HashJoin(x) => vec![x.left.as_ref(), x.right.as_ref()],
            PlanNode::NestedLoopJoin(x) => vec![x.left.as_ref(), x.right.as_ref()],
            PlanNode::PartitionAndSerialize(x) => vec![x.input.as_ref()],
            PlanNode::ShuffleWrite(x) => vec![x.input.as_ref()],
            PlanNode::Custom(x) => x.inputs.iter().collect(),
        }
    }

    /// Row type produced by this node.
    pub fn output_type(&self) -> Schema {
        match self {
            PlanNode::TableScan(x) => x.output_type.clone(),
            PlanNode::Filter(x) => x.input.output_type(),
            PlanNode::Project(x) => Schema::new(
                x.exprs
                    .iter()
                    .map(|(e, name)| Field::new(name, e.data_type().clone(), true))
                    .collect::<Vec<_>>(),
            ),
            PlanNode::Aggregate(x) => x.output_type.clone(),
            PlanNode::Limit(x) => x.input.output_type(),
            PlanNode::TopN(x) => x.input.output_type(),
            PlanNode::Sort(x) => x.input.output_type(),
            PlanNode::Exchange(x) => x.output_type.clone(),
            PlanNode::LocalPartition(x) => x.output_type(),
            PlanNode::RemoteSource(x) => x.output_type.clone(),
            PlanNode::Values(x) => x.output_type.clone(),
            PlanNode::HashJoin(x) => x.output_type.clone(),
            PlanNode::NestedLoopJoin(x) => x.output_type.clone(),
            PlanNode::PartitionAndSerialize(x) => x.output_type(),
            PlanNode::ShuffleWrite(x) => x.output_type(),
            PlanNode::ShuffleRead(x) => x.output_type().clone(),
            PlanNode::Custom(x) => x.output_type.clone(),
        }
    }

    /// Ids of this node and all descendants in pre-order.
    pub fn node_ids(&self) -> Vec<&PlanNodeId> {
        let mut out = Vec::new();
        collect_ids(self, &mut out);
        out
    }
}

fn collect_ids<'a>(node: &'a PlanNode, out: &mut Vec<&'a PlanNodeId>) {
    out.push(node.id());
    for child in node.children() {
        collect_ids(child, out);
    }
}

/// One scan output column bound to its connector column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanColumn {
    /// Output variable name.
    pub name: String,
    pub column: NativeColumnHandle,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableScanNode {
    pub id: PlanNodeId,
    pub table: NativeTableHandle,
    /// Assignments of output variables to connector columns.
    pub columns: Vec<ScanColumn>,
    pub output_type: Schema,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterNode {
    pub id: PlanNodeId,
    /// Boolean predicate.
    pub predicate: TypedExpr,
    pub input: Box<PlanNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectNode {
    pub id: PlanNodeId,
    /// (expr, output_name)
    pub exprs: Vec<(TypedExpr, String)>,
    pub input: Box<PlanNode>,
}

impl ProjectNode {
    /// Projection renaming `input_names` of `input`, positionally, to the
    /// fields of `layout`.
    pub fn onto_layout(
        id: PlanNodeId,
        input: PlanNode,
        input_names: &[String],
        layout: &Schema,
    ) -> Result<Self> {
        if input_names.len() != layout.fields().len() {
            return Err(NexecError::ColumnArityMismatch {
                node_id: id.to_string(),
                expected: layout.fields().len(),
                actual: input_names.len(),
            });
        }
        let produced = input.output_type();
        let exprs = input_names
            .iter()
            .zip(layout.fields().iter())
            .map(|(name, field)| {
                let source = produced.field_with_name(name).map_err(|_| {
                    NexecError::Planning(format!(
                        "'{name}' is not produced by node '{}'",
                        input.id()
                    ))
                })?;
                Ok((
                    TypedExpr::field(name.as_str(), source.data_type().clone()),
                    field.name().clone(),
                ))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            id,
            exprs,
            input: Box::new(input),
        })
    }
}

/// `source` as is when it already produces exactly `layout` from
/// `input_names`, otherwise wrapped in a renaming [`ProjectNode`] whose id
/// comes from `next_id`.
pub(crate) fn align_to_layout(
    source: PlanNode,
    input_names: &[String],
    layout: &Schema,
    next_id: impl FnOnce() -> PlanNodeId,
) -> Result<PlanNode> {
    let produced = source.output_type();
    let same_names = |names: Vec<&String>| {
        names.len() == layout.fields().len()
            && names
                .iter()
                .zip(layout.fields().iter())
                .all(|(name, field)| *name == field.name())
    };
    if same_names(input_names.iter().collect())
        && same_names(produced.fields().iter().map(|f| f.name()).collect())
    {
        return Ok(source);
    }
    let project = ProjectNode::onto_layout(next_id(), source, input_names, layout)?;
    Ok(PlanNode::Project(project))
}

/// Aggregation step, copied 1:1 from the protocol node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggregationStep {
    /// Raw input to intermediate state.
    Partial,
    /// Intermediate state to intermediate state.
    Intermediate,
    /// Intermediate state to final value.
    Final,
    /// Raw input to final value in one step.
    Single,
}

impl AggregationStep {
    /// Whether this step emits intermediate state rather than final values.
    pub fn is_partial_output(self) -> bool {
        matches!(self, AggregationStep::Partial | AggregationStep::Intermediate)
    }
}

/// One aggregate function application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateCall {
    /// Output column receiving the aggregate.
    pub output: String,
    /// `TypedExpr::Call` with the aggregate name and arguments.
    pub call: TypedExpr,
    /// Argument types of the raw input, independent of step.
    pub raw_input_types: Vec<arrow_schema::DataType>,
    /// Boolean column restricting the rows fed to this aggregate.
    pub mask: Option<String>,
    pub distinct: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateNode {
    pub id: PlanNodeId,
    pub step: AggregationStep,
    pub grouping_keys: Vec<TypedExpr>,
    /// Grouping keys the input is already clustered on.
    pub pre_grouped_keys: Vec<String>,
    pub aggregates: Vec<AggregateCall>,
    pub output_type: Schema,
    pub input: Box<PlanNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimitNode {
    pub id: PlanNodeId,
    pub offset: u64,
    pub count: u64,
    /// Partial limits run per driver before the final limit.
    pub partial: bool,
    pub input: Box<PlanNode>,
}

/// Ordering key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortKey {
    pub expr: TypedExpr,
    pub ascending: bool,
    pub nulls_first: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopNNode {
    pub id: PlanNodeId,
    pub count: u64,
    pub keys: Vec<SortKey>,
    pub partial: bool,
    pub input: Box<PlanNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortNode {
    pub id: PlanNodeId,
    pub keys: Vec<SortKey>,
    pub partial: bool,
    pub input: Box<PlanNode>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExchangeKind {
    Gather,
    Repartition,
    Replicate,
}

/// Partitioning function of an exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartitioningScheme {
    Single,
    CoordinatorOnly,
    Hash,
    RoundRobin,
    Broadcast,
    Arbitrary,
    Source,
}

/// Number of partitions an exchange produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartitionCount {
    /// Fixed by the coordinator.
    Static(u32),
    /// Chosen by the runtime (or the shuffle config in batch mode).
    RuntimeDetermined,
}

/// Partitioning contract of an exchange boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitioningSpec {
    pub scheme: PartitioningScheme,
    /// Partition key expressions in key order.
    pub keys: Vec<TypedExpr>,
    pub partition_count: PartitionCount,
    /// Send null-keyed rows (and one arbitrary row) to every partition.
    pub replicate_nulls_and_any: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeNode {
    pub id: PlanNodeId,
    pub kind: ExchangeKind,
    pub partitioning: PartitioningSpec,
    /// Merge ordering; empty for unordered exchanges.
    pub ordering: Vec<SortKey>,
    /// Per source, the source columns feeding the output layout in order.
    pub inputs: Vec<Vec<String>>,
    pub output_type: Schema,
    pub sources: Vec<PlanNode>,
}

impl ExchangeNode {
    /// Whether this exchange can become a batch shuffle boundary.
    pub fn is_repartition(&self) -> bool {
        self.kind == ExchangeKind::Repartition
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteSourceNode {
    pub id: PlanNodeId,
    pub source_fragment_ids: Vec<String>,
    /// Merge ordering; non-empty makes this a merging exchange.
    pub ordering: Vec<SortKey>,
    pub output_type: Schema,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValuesNode {
    pub id: PlanNodeId,
    pub rows: Vec<Vec<TypedExpr>>,
    pub output_type: Schema,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinDistribution {
    /// Both sides hash partitioned on the join keys.
    Partitioned,
    /// Build side broadcast to every probe task.
    Replicated,
}

/// Hash join. `keys` are positional `(left_key, right_key)` pairs; the right
/// side is the build side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HashJoinNode {
    pub id: PlanNodeId,
    pub join_type: JoinType,
    pub keys: Vec<(String, String)>,
    pub filter: Option<TypedExpr>,
    pub distribution: Option<JoinDistribution>,
    pub output_type: Schema,
    pub left: Box<PlanNode>,
    pub right: Box<PlanNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NestedLoopJoinNode {
    pub id: PlanNodeId,
    pub join_type: JoinType,
    pub filter: Option<TypedExpr>,
    pub output_type: Schema,
    pub left: Box<PlanNode>,
    pub right: Box<PlanNode>,
}

/// Operator emitted by an extension converter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomNode {
    pub id: PlanNodeId,
    /// Operator name understood by the runtime.
    pub name: String,
    /// Opaque operator configuration.
    #[serde(default)]
    pub config: serde_json::Map<String, serde_json::Value>,
    pub output_type: Schema,
    pub inputs: Vec<PlanNode>,
}

#[cfg(test)]
mod tests {
    use arrow_schema::{DataType, Field, Schema};
    use nexec_common::{NexecError, PlanNodeId};

    use super::{align_to_layout, PlanNode};
    use crate::expressions::TypedExpr;
    use crate::operators::ShuffleReadNode;

    fn read(columns: &[&str]) -> PlanNode {
        PlanNode::ShuffleRead(ShuffleReadNode::new(
            PlanNodeId::from("1"),
            vec![],
            Schema::new(
                columns
                    .iter()
                    .map(|c| Field::new(*c, DataType::Int64, true))
                    .collect::<Vec<_>>(),
            ),
        ))
    }

    fn names(columns: &[&str]) -> Vec<String> {
        columns.iter().map(|c| c.to_string()).collect()
    }

    fn layout() -> Schema {
        Schema::new(vec![
            Field::new("a", DataType::Int64, true),
            Field::new("b", DataType::Int64, true),
        ])
    }

    #[test]
    fn matching_source_is_kept() {
        let source = read(&["a", "b"]);
        let aligned = align_to_layout(source.clone(), &names(&["a", "b"]), &layout(), || {
            panic!("no id needed")
        })
        .expect("aligned");
        assert_eq!(aligned, source);
    }

    #[test]
    fn renamed_or_reordered_source_is_projected() {
        let aligned = align_to_layout(read(&["b", "a"]), &names(&["a", "b"]), &layout(), || {
            PlanNodeId::from("4.rename")
        })
        .expect("aligned");
        assert_eq!(aligned.id(), &PlanNodeId::from("4.rename"));
        assert_eq!(aligned.output_type(), layout());

        // same names, swapped positionally
        let PlanNode::Project(swap) =
            align_to_layout(read(&["a", "b"]), &names(&["b", "a"]), &layout(), || {
                PlanNodeId::from("4.rename")
            })
            .expect("aligned")
        else {
            panic!("expected project");
        };
        let renames = swap
            .exprs
            .iter()
            .map(|(expr, out)| match expr {
                TypedExpr::Field { name, .. } => (name.as_str(), out.as_str()),
                other => panic!("expected field reference, got {other:?}"),
            })
            .collect::<Vec<_>>();
        assert_eq!(renames, vec![("b", "a"), ("a", "b")]);

        // extra source columns are dropped
        let narrowed = align_to_layout(read(&["a", "b", "c"]), &names(&["a", "b"]), &layout(), || {
            PlanNodeId::from("4.rename")
        })
        .expect("aligned");
        assert_eq!(narrowed.output_type(), layout());
    }

    #[test]
    fn missing_input_column_is_rejected() {
        assert!(matches!(
            align_to_layout(read(&["a"]), &names(&["a", "z"]), &layout(), || {
                PlanNodeId::from("4.rename")
            }),
            Err(NexecError::Planning(_))
        ));
        assert!(matches!(
            align_to_layout(read(&["a"]), &names(&["a"]), &layout(), || {
                PlanNodeId::from("4.rename")
            }),
            Err(NexecError::ColumnArityMismatch { .. })
        ));
    }
}

use serde::de::Error as _;
use serde::ser::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::connector::{ColumnHandle, TableHandle};
use crate::expressions::{CallExpression, OrderingScheme, RowExpression, VariableReference};

/// Kind tags used in the `@type` field of serialized plan nodes.
pub mod kinds {
    pub const TABLE_SCAN: &str = "tableScan";
    pub const FILTER: &str = "filter";
    pub const PROJECT: &str = "project";
    pub const AGGREGATION: &str = "aggregation";
    pub const LIMIT: &str = "limit";
    pub const TOP_N: &str = "topN";
    pub const SORT: &str = "sort";
    pub const EXCHANGE: &str = "exchange";
    pub const REMOTE_SOURCE: &str = "remoteSource";
    pub const OUTPUT: &str = "output";
    pub const VALUES: &str = "values";
    pub const JOIN: &str = "join";
}

/// Protocol plan node tree as produced by the coordinator.
///
/// Known kinds deserialize into their typed variant. Any other `@type` lands
/// in [`PlanNode::Other`] with its remaining fields kept verbatim, so the
/// worker can decide (through its converter registry) whether it can handle
/// the kind instead of failing at parse time.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanNode {
    TableScan(TableScanNode),
    Filter(FilterNode),
    Project(ProjectNode),
    Aggregation(AggregationNode),
    Limit(LimitNode),
    TopN(TopNNode),
    Sort(SortNode),
    Exchange(ExchangeNode),
    RemoteSource(RemoteSourceNode),
    Output(OutputNode),
    Values(ValuesNode),
    Join(JoinNode),
    Other(GenericPlanNode),
}

impl PlanNode {
    /// Kind tag of this node.
    pub fn kind(&self) -> &str {
        match self {
            PlanNode::TableScan(_) => kinds::TABLE_SCAN,
            PlanNode::Filter(_) => kinds::FILTER,
            PlanNode::Project(_) => kinds::PROJECT,
            PlanNode::Aggregation(_) => kinds::AGGREGATION,
            PlanNode::Limit(_) => kinds::LIMIT,
            PlanNode::TopN(_) => kinds::TOP_N,
            PlanNode::Sort(_) => kinds::SORT,
            PlanNode::Exchange(_) => kinds::EXCHANGE,
            PlanNode::RemoteSource(_) => kinds::REMOTE_SOURCE,
            PlanNode::Output(_) => kinds::OUTPUT,
            PlanNode::Values(_) => kinds::VALUES,
            PlanNode::Join(_) => kinds::JOIN,
            PlanNode::Other(x) => &x.kind,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            PlanNode::TableScan(x) => &x.id,
            PlanNode::Filter(x) => &x.id,
            PlanNode::Project(x) => &x.id,
            PlanNode::Aggregation(x) => &x.id,
            PlanNode::Limit(x) => &x.id,
            PlanNode::TopN(x) => &x.id,
            PlanNode::Sort(x) => &x.id,
            PlanNode::Exchange(x) => &x.id,
            PlanNode::RemoteSource(x) => &x.id,
            PlanNode::Output(x) => &x.id,
            PlanNode::Values(x) => &x.id,
            PlanNode::Join(x) => &x.id,
            PlanNode::Other(x) => &x.id,
        }
    }

    /// Direct sources in protocol order.
    pub fn sources(&self) -> Vec<&PlanNode> {
        match self {
            PlanNode::TableScan(_) | PlanNode::RemoteSource(_) | PlanNode::Values(_) => vec![],
            PlanNode::Filter(x) => vec![x.source.as_ref()],
            PlanNode::Project(x) => vec![x.source.as_ref()],
            PlanNode::Aggregation(x) => vec![x.source.as_ref()],
            PlanNode::Limit(x) => vec![x.source.as_ref()],
            PlanNode::TopN(x) => vec![x.source.as_ref()],
            PlanNode::Sort(x) => vec![x.source.as_ref()],
            PlanNode::Exchange(x) => x.sources.iter().collect(),
            PlanNode::Output(x) => vec![x.source.as_ref()],
            PlanNode::Join(x) => vec![x.left.as_ref(), x.right.as_ref()],
            PlanNode::Other(x) => x.sources.iter().collect(),
        }
    }

    /// Node ids in pre-order.
    pub fn node_ids(&self) -> Vec<&str> {
        let mut out = Vec::new();
        collect_ids(self, &mut out);
        out
    }
}

fn collect_ids<'a>(node: &'a PlanNode, out: &mut Vec<&'a str>) {
    out.push(node.id());
    for source in node.sources() {
        collect_ids(source, out);
    }
}

impl Serialize for PlanNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let encoded = match self {
            PlanNode::TableScan(x) => serde_json::to_value(x),
            PlanNode::Filter(x) => serde_json::to_value(x),
            PlanNode::Project(x) => serde_json::to_value(x),
            PlanNode::Aggregation(x) => serde_json::to_value(x),
            PlanNode::Limit(x) => serde_json::to_value(x),
            PlanNode::TopN(x) => serde_json::to_value(x),
            PlanNode::Sort(x) => serde_json::to_value(x),
            PlanNode::Exchange(x) => serde_json::to_value(x),
            PlanNode::RemoteSource(x) => serde_json::to_value(x),
            PlanNode::Output(x) => serde_json::to_value(x),
            PlanNode::Values(x) => serde_json::to_value(x),
            PlanNode::Join(x) => serde_json::to_value(x),
            PlanNode::Other(x) => serde_json::to_value(x),
        };
        let mut value = encoded.map_err(S::Error::custom)?;
        if let serde_json::Value::Object(map) = &mut value {
            map.insert(
                "@type".to_string(),
                serde_json::Value::String(self.kind().to_string()),
            );
        }
        value.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for PlanNode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut value = serde_json::Value::deserialize(deserializer)?;
        let kind = match value.as_object_mut().and_then(|m| m.remove("@type")) {
            Some(serde_json::Value::String(kind)) => kind,
            Some(_) => return Err(D::Error::custom("plan node @type must be a string")),
            None => return Err(D::Error::missing_field("@type")),
        };
        let decoded = match kind.as_str() {
            kinds::TABLE_SCAN => serde_json::from_value(value).map(PlanNode::TableScan),
            kinds::FILTER => serde_json::from_value(value).map(PlanNode::Filter),
            kinds::PROJECT => serde_json::from_value(value).map(PlanNode::Project),
            kinds::AGGREGATION => serde_json::from_value(value).map(PlanNode::Aggregation),
            kinds::LIMIT => serde_json::from_value(value).map(PlanNode::Limit),
            kinds::TOP_N => serde_json::from_value(value).map(PlanNode::TopN),
            kinds::SORT => serde_json::from_value(value).map(PlanNode::Sort),
            kinds::EXCHANGE => serde_json::from_value(value).map(PlanNode::Exchange),
            kinds::REMOTE_SOURCE => serde_json::from_value(value).map(PlanNode::RemoteSource),
            kinds::OUTPUT => serde_json::from_value(value).map(PlanNode::Output),
            kinds::VALUES => serde_json::from_value(value).map(PlanNode::Values),
            kinds::JOIN => serde_json::from_value(value).map(PlanNode::Join),
            _ => serde_json::from_value::<GenericPlanNode>(value).map(|mut node| {
                node.kind = kind.clone();
                PlanNode::Other(node)
            }),
        };
        decoded.map_err(|e| D::Error::custom(format!("invalid {kind} node: {e}")))
    }
}

/// Node of a kind this crate has no typed model for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenericPlanNode {
    #[serde(skip)]
    pub kind: String,
    pub id: String,
    #[serde(default)]
    pub sources: Vec<PlanNode>,
    /// Remaining kind specific fields.
    #[serde(flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableScanNode {
    pub id: String,
    pub table: TableHandle,
    pub output_variables: Vec<VariableReference>,
    /// Output variable to connector column mapping.
    pub assignments: Vec<ColumnAssignment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnAssignment {
    pub variable: VariableReference,
    pub column: ColumnHandle,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterNode {
    pub id: String,
    pub source: Box<PlanNode>,
    pub predicate: RowExpression,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectNode {
    pub id: String,
    pub source: Box<PlanNode>,
    pub assignments: Vec<Assignment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub variable: VariableReference,
    pub expression: RowExpression,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AggregationStep {
    Partial,
    Intermediate,
    Final,
    Single,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregationNode {
    pub id: String,
    pub source: Box<PlanNode>,
    /// Aggregates in output order.
    pub aggregations: Vec<Aggregation>,
    pub grouping_keys: Vec<VariableReference>,
    #[serde(default)]
    pub pre_grouped_variables: Vec<VariableReference>,
    pub step: AggregationStep,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aggregation {
    /// Output variable receiving the aggregate (intermediate type for partial steps).
    pub variable: VariableReference,
    pub call: CallExpression,
    #[serde(default)]
    pub filter: Option<RowExpression>,
    #[serde(default)]
    pub mask: Option<VariableReference>,
    #[serde(default)]
    pub distinct: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LimitStep {
    Partial,
    #[default]
    Final,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimitNode {
    pub id: String,
    pub source: Box<PlanNode>,
    #[serde(default)]
    pub offset: u64,
    pub count: u64,
    #[serde(default)]
    pub step: LimitStep,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TopNStep {
    Single,
    Partial,
    Final,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopNNode {
    pub id: String,
    pub source: Box<PlanNode>,
    pub count: u64,
    pub ordering_scheme: OrderingScheme,
    pub step: TopNStep,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SortNode {
    pub id: String,
    pub source: Box<PlanNode>,
    pub ordering_scheme: OrderingScheme,
    #[serde(default)]
    pub is_partial: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExchangeType {
    Gather,
    Repartition,
    Replicate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExchangeScope {
    Local,
    RemoteStreaming,
    RemoteMaterialized,
}

impl ExchangeScope {
    pub fn is_remote(self) -> bool {
        !matches!(self, ExchangeScope::Local)
    }
}

/// System partitioning handles understood by the native runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PartitioningHandle {
    Single,
    CoordinatorOnly,
    Hash,
    RoundRobin,
    Broadcast,
    Arbitrary,
    Source,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Partitioning {
    pub handle: PartitioningHandle,
    /// Partition key expressions in key order.
    #[serde(default)]
    pub arguments: Vec<RowExpression>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitioningScheme {
    pub partitioning: Partitioning,
    pub output_layout: Vec<VariableReference>,
    #[serde(default)]
    pub replicate_nulls_and_any: bool,
    /// Static partition count; absent when the runtime decides.
    #[serde(default)]
    pub partition_count: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeNode {
    pub id: String,
    #[serde(rename = "type")]
    pub exchange_type: ExchangeType,
    pub scope: ExchangeScope,
    pub partitioning_scheme: PartitioningScheme,
    pub sources: Vec<PlanNode>,
    /// For each source, its variables in output layout order.
    pub inputs: Vec<Vec<VariableReference>>,
    #[serde(default)]
    pub ordering_scheme: Option<OrderingScheme>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteSourceNode {
    pub id: String,
    pub source_fragment_ids: Vec<String>,
    pub output_variables: Vec<VariableReference>,
    #[serde(default)]
    pub ordering_scheme: Option<OrderingScheme>,
    pub exchange_type: ExchangeType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputNode {
    pub id: String,
    pub source: Box<PlanNode>,
    pub column_names: Vec<String>,
    pub output_variables: Vec<VariableReference>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValuesNode {
    pub id: String,
    pub output_variables: Vec<VariableReference>,
    pub rows: Vec<Vec<RowExpression>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JoinDistributionType {
    Partitioned,
    Replicated,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquiJoinClause {
    pub left: VariableReference,
    pub right: VariableReference,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinNode {
    pub id: String,
    #[serde(rename = "type")]
    pub join_type: JoinType,
    pub left: Box<PlanNode>,
    pub right: Box<PlanNode>,
    pub criteria: Vec<EquiJoinClause>,
    #[serde(default)]
    pub filter: Option<RowExpression>,
    pub output_variables: Vec<VariableReference>,
    #[serde(default)]
    pub distribution_type: Option<JoinDistributionType>,
}

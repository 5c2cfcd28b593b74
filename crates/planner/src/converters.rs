//! Built-in converters, one per protocol node kind.
//!
//! Each converter converts its sources first so the native tree is built
//! bottom-up, then translates its own fields.

use arrow_schema::{DataType, Schema};
use nexec_common::{NexecError, PlanNodeId, Result};
use nexec_protocol as proto;
use nexec_protocol::kinds;

use crate::batch::RENAME_SUFFIX;
use crate::connectors::{NativeColumnHandle, NativeTableHandle};
use crate::dispatch::{ConversionContext, ExecutionMode, NodeConverterRegistry};
use crate::expressions::{ExpressionTranslator, TypedExpr};
use crate::operators::{LocalPartitionNode, ShuffleReadNode};
use crate::plan_node::{
    align_to_layout, AggregateCall, AggregateNode, AggregationStep, ExchangeKind, ExchangeNode, FilterNode,
    HashJoinNode, JoinDistribution, JoinType, LimitNode, NestedLoopJoinNode, PartitionCount,
    PartitioningScheme, PartitioningSpec, PlanNode, ProjectNode, RemoteSourceNode, ScanColumn,
    SortKey, SortNode, TableScanNode, TopNNode, ValuesNode,
};
use crate::types::{row_type, type_signature};

/// Register converters for the twelve built-in kinds.
pub fn register_builtins(registry: &NodeConverterRegistry) {
    registry.register_fn(kinds::TABLE_SCAN, convert_table_scan);
    registry.register_fn(kinds::FILTER, convert_filter);
    registry.register_fn(kinds::PROJECT, convert_project);
    registry.register_fn(kinds::AGGREGATION, convert_aggregation);
    registry.register_fn(kinds::LIMIT, convert_limit);
    registry.register_fn(kinds::TOP_N, convert_top_n);
    registry.register_fn(kinds::SORT, convert_sort);
    registry.register_fn(kinds::EXCHANGE, convert_exchange);
    registry.register_fn(kinds::REMOTE_SOURCE, convert_remote_source);
    registry.register_fn(kinds::OUTPUT, convert_output);
    registry.register_fn(kinds::VALUES, convert_values);
    registry.register_fn(kinds::JOIN, convert_join);
}

fn wrong_kind(expected: &str, node: &proto::PlanNode) -> NexecError {
    NexecError::Planning(format!(
        "{expected} converter received {} node '{}'",
        node.kind(),
        node.id()
    ))
}

fn sort_keys(
    translator: &ExpressionTranslator<'_>,
    scheme: Option<&proto::OrderingScheme>,
) -> Result<Vec<SortKey>> {
    scheme
        .map(|s| s.order_by.as_slice())
        .unwrap_or_default()
        .iter()
        .map(|o| {
            Ok(SortKey {
                expr: translator.translate_variable(&o.variable)?,
                ascending: o.sort_order.is_ascending(),
                nulls_first: o.sort_order.is_nulls_first(),
            })
        })
        .collect()
}

fn require_boolean(expr: &TypedExpr, node_id: &str, what: &str) -> Result<()> {
    match expr.data_type() {
        DataType::Boolean | DataType::Null => Ok(()),
        other => Err(NexecError::Planning(format!(
            "{what} of node '{node_id}' must be boolean, got {}",
            type_signature(other)
        ))),
    }
}

pub fn convert_table_scan(
    node: &proto::PlanNode,
    ctx: &mut ConversionContext<'_>,
) -> Result<PlanNode> {
    let proto::PlanNode::TableScan(scan) = node else {
        return Err(wrong_kind(kinds::TABLE_SCAN, node));
    };
    let id = PlanNodeId::from(scan.id.as_str());
    let table = NativeTableHandle::resolve(&scan.table, &id, ctx.connectors(), ctx.session())?;
    let columns = scan
        .output_variables
        .iter()
        .map(|v| {
            let assignment = scan
                .assignments
                .iter()
                .find(|a| a.variable.name == v.name)
                .ok_or_else(|| {
                    NexecError::Planning(format!(
                        "scan '{id}' output '{}' has no column assignment",
                        v.name
                    ))
                })?;
            Ok(ScanColumn {
                name: v.name.clone(),
                column: NativeColumnHandle::resolve(&assignment.column, &id, ctx.connectors())?,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    let output_type = row_type(&scan.output_variables)?;
    ctx.record_scan(id.clone());
    Ok(PlanNode::TableScan(TableScanNode {
        id,
        table,
        columns,
        output_type,
    }))
}

pub fn convert_filter(node: &proto::PlanNode, ctx: &mut ConversionContext<'_>) -> Result<PlanNode> {
    let proto::PlanNode::Filter(filter) = node else {
        return Err(wrong_kind(kinds::FILTER, node));
    };
    let input = ctx.convert(&filter.source)?;
    let predicate = ctx.translator().translate(&filter.predicate)?;
    require_boolean(&predicate, &filter.id, "filter predicate")?;
    Ok(PlanNode::Filter(FilterNode {
        id: PlanNodeId::from(filter.id.as_str()),
        predicate,
        input: Box::new(input),
    }))
}

pub fn convert_project(
    node: &proto::PlanNode,
    ctx: &mut ConversionContext<'_>,
) -> Result<PlanNode> {
    let proto::PlanNode::Project(project) = node else {
        return Err(wrong_kind(kinds::PROJECT, node));
    };
    let input = ctx.convert(&project.source)?;
    let translator = ctx.translator();
    let exprs = project
        .assignments
        .iter()
        .map(|a| Ok((translator.translate(&a.expression)?, a.variable.name.clone())))
        .collect::<Result<Vec<_>>>()?;
    Ok(PlanNode::Project(ProjectNode {
        id: PlanNodeId::from(project.id.as_str()),
        exprs,
        input: Box::new(input),
    }))
}

pub fn convert_aggregation(
    node: &proto::PlanNode,
    ctx: &mut ConversionContext<'_>,
) -> Result<PlanNode> {
    let proto::PlanNode::Aggregation(agg) = node else {
        return Err(wrong_kind(kinds::AGGREGATION, node));
    };
    let input = ctx.convert(&agg.source)?;
    let translator = ctx.translator();

    let grouping_keys = agg
        .grouping_keys
        .iter()
        .map(|k| translator.translate_variable(k))
        .collect::<Result<Vec<_>>>()?;
    let aggregates = agg
        .aggregations
        .iter()
        .map(|a| {
            if a.filter.is_some() {
                return Err(NexecError::Unsupported(format!(
                    "aggregation '{}' of node '{}' has an unlowered filter; expected a mask",
                    a.variable.name, agg.id
                )));
            }
            let (call, raw_input_types) = translator.translate_aggregate(&a.call)?;
            Ok(AggregateCall {
                output: a.variable.name.clone(),
                call,
                raw_input_types,
                mask: a.mask.as_ref().map(|m| m.name.clone()),
                distinct: a.distinct,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let output_type = row_type(
        &agg.grouping_keys
            .iter()
            .chain(agg.aggregations.iter().map(|a| &a.variable))
            .cloned()
            .collect::<Vec<_>>(),
    )?;
    let step = match agg.step {
        proto::AggregationStep::Partial => AggregationStep::Partial,
        proto::AggregationStep::Intermediate => AggregationStep::Intermediate,
        proto::AggregationStep::Final => AggregationStep::Final,
        proto::AggregationStep::Single => AggregationStep::Single,
    };
    Ok(PlanNode::Aggregate(AggregateNode {
        id: PlanNodeId::from(agg.id.as_str()),
        step,
        grouping_keys,
        pre_grouped_keys: agg
            .pre_grouped_variables
            .iter()
            .map(|v| v.name.clone())
            .collect(),
        aggregates,
        output_type,
        input: Box::new(input),
    }))
}

pub fn convert_limit(node: &proto::PlanNode, ctx: &mut ConversionContext<'_>) -> Result<PlanNode> {
    let proto::PlanNode::Limit(limit) = node else {
        return Err(wrong_kind(kinds::LIMIT, node));
    };
    let input = ctx.convert(&limit.source)?;
    Ok(PlanNode::Limit(LimitNode {
        id: PlanNodeId::from(limit.id.as_str()),
        offset: limit.offset,
        count: limit.count,
        partial: limit.step == proto::LimitStep::Partial,
        input: Box::new(input),
    }))
}

pub fn convert_top_n(node: &proto::PlanNode, ctx: &mut ConversionContext<'_>) -> Result<PlanNode> {
    let proto::PlanNode::TopN(top_n) = node else {
        return Err(wrong_kind(kinds::TOP_N, node));
    };
    let input = ctx.convert(&top_n.source)?;
    let keys = sort_keys(&ctx.translator(), Some(&top_n.ordering_scheme))?;
    Ok(PlanNode::TopN(TopNNode {
        id: PlanNodeId::from(top_n.id.as_str()),
        count: top_n.count,
        keys,
        partial: top_n.step == proto::TopNStep::Partial,
        input: Box::new(input),
    }))
}

pub fn convert_sort(node: &proto::PlanNode, ctx: &mut ConversionContext<'_>) -> Result<PlanNode> {
    let proto::PlanNode::Sort(sort) = node else {
        return Err(wrong_kind(kinds::SORT, node));
    };
    let input = ctx.convert(&sort.source)?;
    let keys = sort_keys(&ctx.translator(), Some(&sort.ordering_scheme))?;
    Ok(PlanNode::Sort(SortNode {
        id: PlanNodeId::from(sort.id.as_str()),
        keys,
        partial: sort.is_partial,
        input: Box::new(input),
    }))
}

/// Local exchanges become [`LocalPartitionNode`]s; remote ones keep their
/// partitioning contract on an [`ExchangeNode`].
pub fn convert_exchange(
    node: &proto::PlanNode,
    ctx: &mut ConversionContext<'_>,
) -> Result<PlanNode> {
    let proto::PlanNode::Exchange(exchange) = node else {
        return Err(wrong_kind(kinds::EXCHANGE, node));
    };
    let sources = ctx.convert_all(exchange.sources.iter())?;
    let id = PlanNodeId::from(exchange.id.as_str());
    let scheme = &exchange.partitioning_scheme;

    if exchange.inputs.len() != sources.len() {
        return Err(NexecError::Planning(format!(
            "exchange '{id}' has {} sources but {} input layouts",
            sources.len(),
            exchange.inputs.len()
        )));
    }
    for (source, input) in sources.iter().zip(&exchange.inputs) {
        if input.len() != scheme.output_layout.len() {
            return Err(NexecError::ColumnArityMismatch {
                node_id: id.to_string(),
                expected: scheme.output_layout.len(),
                actual: input.len(),
            });
        }
        let produced = source.output_type();
        if let Some(missing) = input
            .iter()
            .find(|v| produced.index_of(&v.name).is_err())
        {
            return Err(NexecError::Planning(format!(
                "exchange '{id}' input '{}' is not produced by source '{}'",
                missing.name,
                source.id()
            )));
        }
    }

    let translator = ctx.translator();
    let keys = translator.translate_all(&scheme.partitioning.arguments)?;
    let ordering = sort_keys(&translator, exchange.ordering_scheme.as_ref())?;

    if !exchange.scope.is_remote() {
        if !ordering.is_empty() {
            return Err(NexecError::Unsupported(format!(
                "ordered local exchange '{id}'"
            )));
        }
        let layout = row_type(&scheme.output_layout)?;
        let mut aligned = Vec::with_capacity(sources.len());
        for (source, input) in sources.into_iter().zip(&exchange.inputs) {
            let names = input.iter().map(|v| v.name.clone()).collect::<Vec<_>>();
            aligned.push(align_to_layout(source, &names, &layout, || {
                ctx.synthesize_id(&id, RENAME_SUFFIX)
            })?);
        }
        let local = match exchange.exchange_type {
            proto::ExchangeType::Gather => LocalPartitionNode::gather(id, layout, aligned),
            proto::ExchangeType::Repartition => {
                LocalPartitionNode::repartition(id, keys, layout, aligned)
            }
            proto::ExchangeType::Replicate => {
                return Err(NexecError::Unsupported(format!(
                    "local replicate exchange '{id}'"
                )))
            }
        };
        return Ok(PlanNode::LocalPartition(local));
    }

    let partition_count = match scheme.partition_count {
        Some(0) => {
            return Err(NexecError::Planning(format!(
                "exchange '{id}' declares zero partitions"
            )))
        }
        Some(n) => PartitionCount::Static(n),
        None => PartitionCount::RuntimeDetermined,
    };
    Ok(PlanNode::Exchange(ExchangeNode {
        id,
        kind: exchange_kind(exchange.exchange_type),
        partitioning: PartitioningSpec {
            scheme: partitioning_scheme(scheme.partitioning.handle),
            keys,
            partition_count,
            replicate_nulls_and_any: scheme.replicate_nulls_and_any,
        },
        ordering,
        inputs: exchange
            .inputs
            .iter()
            .map(|vars| vars.iter().map(|v| v.name.clone()).collect())
            .collect(),
        output_type: row_type(&scheme.output_layout)?,
        sources,
    }))
}

fn exchange_kind(kind: proto::ExchangeType) -> ExchangeKind {
    match kind {
        proto::ExchangeType::Gather => ExchangeKind::Gather,
        proto::ExchangeType::Repartition => ExchangeKind::Repartition,
        proto::ExchangeType::Replicate => ExchangeKind::Replicate,
    }
}

fn partitioning_scheme(handle: proto::PartitioningHandle) -> PartitioningScheme {
    match handle {
        proto::PartitioningHandle::Single => PartitioningScheme::Single,
        proto::PartitioningHandle::CoordinatorOnly => PartitioningScheme::CoordinatorOnly,
        proto::PartitioningHandle::Hash => PartitioningScheme::Hash,
        proto::PartitioningHandle::RoundRobin => PartitioningScheme::RoundRobin,
        proto::PartitioningHandle::Broadcast => PartitioningScheme::Broadcast,
        proto::PartitioningHandle::Arbitrary => PartitioningScheme::Arbitrary,
        proto::PartitioningHandle::Source => PartitioningScheme::Source,
    }
}

/// Streaming fragments read upstream output over the exchange protocol;
/// batch fragments read it back from the shuffle backend.
pub fn convert_remote_source(
    node: &proto::PlanNode,
    ctx: &mut ConversionContext<'_>,
) -> Result<PlanNode> {
    let proto::PlanNode::RemoteSource(remote) = node else {
        return Err(wrong_kind(kinds::REMOTE_SOURCE, node));
    };
    let id = PlanNodeId::from(remote.id.as_str());
    let output_type = row_type(&remote.output_variables)?;
    let ordering = sort_keys(&ctx.translator(), remote.ordering_scheme.as_ref())?;
    match ctx.mode() {
        ExecutionMode::Streaming => Ok(PlanNode::RemoteSource(RemoteSourceNode {
            id,
            source_fragment_ids: remote.source_fragment_ids.clone(),
            ordering,
            output_type,
        })),
        ExecutionMode::Batch if !ordering.is_empty() => Err(NexecError::Unsupported(format!(
            "ordered remote source '{id}' in batch mode"
        ))),
        ExecutionMode::Batch => Ok(PlanNode::ShuffleRead(ShuffleReadNode::new(
            id,
            remote.source_fragment_ids.clone(),
            output_type,
        ))),
    }
}

/// The output node becomes a projection renaming its variables to the
/// client visible column names.
pub fn convert_output(node: &proto::PlanNode, ctx: &mut ConversionContext<'_>) -> Result<PlanNode> {
    let proto::PlanNode::Output(output) = node else {
        return Err(wrong_kind(kinds::OUTPUT, node));
    };
    let input = ctx.convert(&output.source)?;
    let expected = output.column_names.len();
    let child_type = input.output_type();
    for actual in [output.output_variables.len(), child_type.fields().len()] {
        if actual != expected {
            return Err(NexecError::ColumnArityMismatch {
                node_id: output.id.clone(),
                expected,
                actual,
            });
        }
    }

    let exprs = output
        .output_variables
        .iter()
        .zip(&output.column_names)
        .map(|(v, column)| Ok((field_of(&child_type, &v.name, &output.id)?, column.clone())))
        .collect::<Result<Vec<_>>>()?;
    Ok(PlanNode::Project(ProjectNode {
        id: PlanNodeId::from(output.id.as_str()),
        exprs,
        input: Box::new(input),
    }))
}

fn field_of(schema: &Schema, name: &str, node_id: &str) -> Result<TypedExpr> {
    let field = schema
        .field_with_name(name)
        .map_err(|_| {
            NexecError::Planning(format!(
                "output '{name}' of node '{node_id}' is not produced by its source"
            ))
        })?;
    Ok(TypedExpr::field(name, field.data_type().clone()))
}

pub fn convert_values(node: &proto::PlanNode, ctx: &mut ConversionContext<'_>) -> Result<PlanNode> {
    let proto::PlanNode::Values(values) = node else {
        return Err(wrong_kind(kinds::VALUES, node));
    };
    let translator = ctx.translator();
    let width = values.output_variables.len();
    let rows = values
        .rows
        .iter()
        .map(|row| {
            if row.len() != width {
                return Err(NexecError::ColumnArityMismatch {
                    node_id: values.id.clone(),
                    expected: width,
                    actual: row.len(),
                });
            }
            translator.translate_all(row)
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(PlanNode::Values(ValuesNode {
        id: PlanNodeId::from(values.id.as_str()),
        rows,
        output_type: row_type(&values.output_variables)?,
    }))
}

/// Equi-joins become hash joins with the right side as build side; joins
/// without criteria become nested loop joins.
pub fn convert_join(node: &proto::PlanNode, ctx: &mut ConversionContext<'_>) -> Result<PlanNode> {
    let proto::PlanNode::Join(join) = node else {
        return Err(wrong_kind(kinds::JOIN, node));
    };
    let left = ctx.convert(&join.left)?;
    let right = ctx.convert(&join.right)?;
    let id = PlanNodeId::from(join.id.as_str());

    let filter = join
        .filter
        .as_ref()
        .map(|f| ctx.translator().translate(f))
        .transpose()?;
    if let Some(filter) = &filter {
        require_boolean(filter, &join.id, "join filter")?;
    }
    let join_type = match join.join_type {
        proto::JoinType::Inner => JoinType::Inner,
        proto::JoinType::Left => JoinType::Left,
        proto::JoinType::Right => JoinType::Right,
        proto::JoinType::Full => JoinType::Full,
    };
    let output_type = row_type(&join.output_variables)?;

    if join.criteria.is_empty() {
        return Ok(PlanNode::NestedLoopJoin(NestedLoopJoinNode {
            id,
            join_type,
            filter,
            output_type,
            left: Box::new(left),
            right: Box::new(right),
        }));
    }
    Ok(PlanNode::HashJoin(HashJoinNode {
        id,
        join_type,
        keys: join
            .criteria
            .iter()
            .map(|c| (c.left.name.clone(), c.right.name.clone()))
            .collect(),
        filter,
        distribution: join.distribution_type.map(|d| match d {
            proto::JoinDistributionType::Partitioned => JoinDistribution::Partitioned,
            proto::JoinDistributionType::Replicated => JoinDistribution::Replicated,
        }),
        output_type,
        left: Box::new(left),
        right: Box::new(right),
    }))
}

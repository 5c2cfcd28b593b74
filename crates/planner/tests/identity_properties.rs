mod support;

use nexec_planner::{AggregationStep, PlanNode};
use nexec_protocol::{
    AggregationNode, CallExpression, ExchangeNode, ExchangeScope, ExchangeType, FilterNode,
    FunctionHandle, FunctionKind, LimitNode, LimitStep, Ordering, OrderingScheme, Partitioning,
    PartitioningHandle, PartitioningScheme, PlanFragment, PlanNode as ProtoPlanNode,
    RemoteSourceNode, RowExpression, Signature, SortNode, SortOrder, TopNNode, TopNStep,
    ValuesNode, VariableReference,
};
use proptest::prelude::*;
use support::{
    converter, local_shuffle_config, native_ids, native_shape, protocol_ids, protocol_shape,
    session, spine, QUERY_ID,
};

/// Plan skeleton over a single `k bigint` column.
#[derive(Debug, Clone)]
enum Tree {
    Values(usize),
    Remote,
    Filter(Box<Tree>),
    Limit {
        offset: u64,
        count: u64,
        partial: bool,
        input: Box<Tree>,
    },
    TopN {
        count: u64,
        partial: bool,
        input: Box<Tree>,
    },
    Sort(Box<Tree>),
    Aggregate(u8, Box<Tree>),
    LocalGather(Vec<Tree>),
}

fn tree_strategy() -> impl Strategy<Value = Tree> {
    let leaf = prop_oneof![(0usize..3).prop_map(Tree::Values), Just(Tree::Remote)];
    leaf.prop_recursive(5, 24, 3, |inner| {
        prop_oneof![
            inner.clone().prop_map(|t| Tree::Filter(Box::new(t))),
            (0u64..10, 0u64..100, any::<bool>(), inner.clone()).prop_map(
                |(offset, count, partial, t)| Tree::Limit {
                    offset,
                    count,
                    partial,
                    input: Box::new(t),
                }
            ),
            (1u64..100, any::<bool>(), inner.clone()).prop_map(|(count, partial, t)| {
                Tree::TopN {
                    count,
                    partial,
                    input: Box::new(t),
                }
            }),
            inner.clone().prop_map(|t| Tree::Sort(Box::new(t))),
            (0u8..4, inner.clone()).prop_map(|(step, t)| Tree::Aggregate(step, Box::new(t))),
            prop::collection::vec(inner, 1..3).prop_map(Tree::LocalGather),
        ]
    })
}

fn k() -> VariableReference {
    VariableReference::new("k", "bigint")
}

fn ordering() -> OrderingScheme {
    OrderingScheme {
        order_by: vec![Ordering {
            variable: k(),
            sort_order: SortOrder::AscNullsLast,
        }],
    }
}

fn aggregation_step(step: u8) -> nexec_protocol::AggregationStep {
    match step {
        0 => nexec_protocol::AggregationStep::Partial,
        1 => nexec_protocol::AggregationStep::Intermediate,
        2 => nexec_protocol::AggregationStep::Final,
        _ => nexec_protocol::AggregationStep::Single,
    }
}

/// Materializes a protocol tree, numbering nodes in post-order.
struct Builder {
    next_id: usize,
}

impl Builder {
    fn id(&mut self) -> String {
        let id = self.next_id.to_string();
        self.next_id += 1;
        id
    }

    fn build(&mut self, tree: &Tree) -> ProtoPlanNode {
        match tree {
            Tree::Values(rows) => ProtoPlanNode::Values(ValuesNode {
                id: self.id(),
                output_variables: vec![k()],
                rows: (0..*rows)
                    .map(|i| vec![RowExpression::constant(serde_json::json!(i), "bigint")])
                    .collect(),
            }),
            Tree::Remote => ProtoPlanNode::RemoteSource(RemoteSourceNode {
                id: self.id(),
                source_fragment_ids: vec!["1".to_string()],
                output_variables: vec![k()],
                ordering_scheme: None,
                exchange_type: ExchangeType::Repartition,
            }),
            Tree::Filter(input) => {
                let source = Box::new(self.build(input));
                ProtoPlanNode::Filter(FilterNode {
                    id: self.id(),
                    source,
                    predicate: RowExpression::Call(CallExpression {
                        display_name: "GREATER_THAN".to_string(),
                        function_handle: FunctionHandle {
                            signature: Signature {
                                name: "presto.default.$operator$GREATER_THAN".to_string(),
                                kind: FunctionKind::Scalar,
                                return_type: "boolean".to_string(),
                                argument_types: vec!["bigint".to_string(), "bigint".to_string()],
                            },
                        },
                        return_type: "boolean".to_string(),
                        arguments: vec![
                            RowExpression::variable("k", "bigint"),
                            RowExpression::constant(serde_json::json!(0), "bigint"),
                        ],
                    }),
                })
            }
            Tree::Limit {
                offset,
                count,
                partial,
                input,
            } => {
                let source = Box::new(self.build(input));
                ProtoPlanNode::Limit(LimitNode {
                    id: self.id(),
                    source,
                    offset: *offset,
                    count: *count,
                    step: if *partial {
                        LimitStep::Partial
                    } else {
                        LimitStep::Final
                    },
                })
            }
            Tree::TopN {
                count,
                partial,
                input,
            } => {
                let source = Box::new(self.build(input));
                ProtoPlanNode::TopN(TopNNode {
                    id: self.id(),
                    source,
                    count: *count,
                    ordering_scheme: ordering(),
                    step: if *partial {
                        TopNStep::Partial
                    } else {
                        TopNStep::Single
                    },
                })
            }
            Tree::Sort(input) => {
                let source = Box::new(self.build(input));
                ProtoPlanNode::Sort(SortNode {
                    id: self.id(),
                    source,
                    ordering_scheme: ordering(),
                    is_partial: false,
                })
            }
            Tree::Aggregate(step, input) => {
                let source = Box::new(self.build(input));
                ProtoPlanNode::Aggregation(AggregationNode {
                    id: self.id(),
                    source,
                    aggregations: vec![],
                    grouping_keys: vec![k()],
                    pre_grouped_variables: vec![],
                    step: aggregation_step(*step),
                })
            }
            Tree::LocalGather(inputs) => {
                let sources = inputs.iter().map(|t| self.build(t)).collect::<Vec<_>>();
                ProtoPlanNode::Exchange(ExchangeNode {
                    id: self.id(),
                    exchange_type: ExchangeType::Gather,
                    scope: ExchangeScope::Local,
                    partitioning_scheme: PartitioningScheme {
                        partitioning: Partitioning {
                            handle: PartitioningHandle::Single,
                            arguments: vec![],
                        },
                        output_layout: vec![k()],
                        replicate_nulls_and_any: false,
                        partition_count: None,
                    },
                    inputs: vec![vec![k()]; sources.len()],
                    sources,
                    ordering_scheme: None,
                })
            }
        }
    }
}

fn fragment_of(root: ProtoPlanNode) -> PlanFragment {
    PlanFragment {
        id: "1".to_string(),
        root,
        partitioning: Some(PartitioningHandle::Source),
        table_scan_scheduling_order: vec![],
    }
}

fn build(tree: &Tree) -> PlanFragment {
    fragment_of(Builder { next_id: 0 }.build(tree))
}

/// Wraps the tree in a remote hash exchange with a static partition count.
fn build_with_boundary(tree: &Tree, partitions: u32) -> PlanFragment {
    let mut builder = Builder { next_id: 0 };
    let source = builder.build(tree);
    fragment_of(ProtoPlanNode::Exchange(ExchangeNode {
        id: builder.id(),
        exchange_type: ExchangeType::Repartition,
        scope: ExchangeScope::RemoteStreaming,
        partitioning_scheme: PartitioningScheme {
            partitioning: Partitioning {
                handle: PartitioningHandle::Hash,
                arguments: vec![RowExpression::variable("k", "bigint")],
            },
            output_layout: vec![k()],
            replicate_nulls_and_any: false,
            partition_count: Some(partitions),
        },
        sources: vec![source],
        inputs: vec![vec![k()]],
        ordering_scheme: None,
    }))
}

fn protocol_steps(node: &ProtoPlanNode, out: &mut Vec<(String, AggregationStep)>) {
    for source in node.sources() {
        protocol_steps(source, out);
    }
    if let ProtoPlanNode::Aggregation(agg) = node {
        let step = match agg.step {
            nexec_protocol::AggregationStep::Partial => AggregationStep::Partial,
            nexec_protocol::AggregationStep::Intermediate => AggregationStep::Intermediate,
            nexec_protocol::AggregationStep::Final => AggregationStep::Final,
            nexec_protocol::AggregationStep::Single => AggregationStep::Single,
        };
        out.push((agg.id.clone(), step));
    }
}

fn native_steps(node: &PlanNode, out: &mut Vec<(String, AggregationStep)>) {
    for child in node.children() {
        native_steps(child, out);
    }
    if let PlanNode::Aggregate(agg) = node {
        out.push((agg.id.to_string(), agg.step));
    }
}

fn protocol_limits(node: &ProtoPlanNode, out: &mut Vec<(String, u64, u64, bool)>) {
    for source in node.sources() {
        protocol_limits(source, out);
    }
    match node {
        ProtoPlanNode::Limit(l) => {
            out.push((l.id.clone(), l.offset, l.count, l.step == LimitStep::Partial))
        }
        ProtoPlanNode::TopN(t) => out.push((t.id.clone(), 0, t.count, t.step == TopNStep::Partial)),
        _ => {}
    }
}

fn native_limits(node: &PlanNode, out: &mut Vec<(String, u64, u64, bool)>) {
    for child in node.children() {
        native_limits(child, out);
    }
    match node {
        PlanNode::Limit(l) => out.push((l.id.to_string(), l.offset, l.count, l.partial)),
        PlanNode::TopN(t) => out.push((t.id.to_string(), 0, t.count, t.partial)),
        _ => {}
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Every protocol node maps to exactly one native node with the same id,
    /// in the same position.
    #[test]
    fn conversion_preserves_ids_and_shape(tree in tree_strategy()) {
        let fragment = build(&tree);
        let converted = converter()
            .to_native_query_plan(&fragment, &session(), QUERY_ID)
            .expect("converted");
        prop_assert_eq!(native_ids(&converted.plan), protocol_ids(&fragment.root));
        prop_assert_eq!(native_shape(&converted.plan), protocol_shape(&fragment.root));
    }

    #[test]
    fn conversion_is_deterministic(tree in tree_strategy()) {
        let fragment = build(&tree);
        let converter = converter();
        let first = converter
            .to_native_query_plan(&fragment, &session(), QUERY_ID)
            .expect("first");
        let second = converter
            .to_native_query_plan(&fragment, &session(), QUERY_ID)
            .expect("second");
        prop_assert_eq!(first, second);
    }

    #[test]
    fn steps_and_limits_are_carried(tree in tree_strategy()) {
        let fragment = build(&tree);
        let plan = converter()
            .to_native_query_plan(&fragment, &session(), QUERY_ID)
            .expect("converted")
            .plan;

        let (mut expected, mut actual) = (vec![], vec![]);
        protocol_steps(&fragment.root, &mut expected);
        native_steps(&plan, &mut actual);
        prop_assert_eq!(expected, actual);

        let (mut expected, mut actual) = (vec![], vec![]);
        protocol_limits(&fragment.root, &mut expected);
        native_limits(&plan, &mut actual);
        prop_assert_eq!(expected, actual);
    }

    /// The boundary exchange is replaced by the shuffle write chain while
    /// the rest of the tree converts as in streaming mode.
    #[test]
    fn batch_wraps_the_streaming_subtree(tree in tree_strategy(), partitions in 1u32..16) {
        let fragment = build_with_boundary(&tree, partitions);
        let config = local_shuffle_config(partitions);
        let batch = converter()
            .to_batch_native_query_plan(
                &fragment,
                &session(),
                QUERY_ID,
                "local-persistent",
                Some(&config),
            )
            .expect("batch plan");

        let names = spine(&batch.plan);
        prop_assert_eq!(
            &names[..3],
            &["ShuffleWrite", "LocalPartition", "PartitionAndSerialize"][..]
        );
        let serialize = batch.plan.children()[0].children()[0];
        let PlanNode::PartitionAndSerialize(serialize) = serialize else {
            panic!("expected partition and serialize");
        };
        prop_assert_eq!(serialize.num_partitions(), partitions);

        let subtree = serialize.input.as_ref();
        let ProtoPlanNode::Exchange(boundary) = &fragment.root else {
            panic!("expected boundary exchange");
        };
        prop_assert_eq!(native_ids(subtree), protocol_ids(&boundary.sources[0]));
        prop_assert_eq!(native_shape(subtree), protocol_shape(&boundary.sources[0]));
    }
}

mod support;

use std::sync::Arc;

use arrow_schema::{DataType, Schema};
use nexec_common::{NexecError, PlanNodeId};
use nexec_planner::{
    explain_native, register_global_connector, unregister_global_connector, AggregationStep,
    ConnectorRegistry, ConversionContext, CustomNode, NativePlanConverter, PartitionCount,
    PlanNode, TypedExpr,
};
use nexec_protocol::{GenericPlanNode, PlanFragment, PlanNode as ProtoPlanNode};
use support::{
    converter, converter_with, fragment, hive_connectors, native_ids, native_shape, protocol_ids,
    protocol_shape, session, spine, QUERY_ID,
};

fn assert_converts(name: &str) -> PlanNode {
    let fragment = fragment(name);
    let plan = converter()
        .to_native_query_plan(&fragment, &session(), QUERY_ID)
        .unwrap_or_else(|e| panic!("{name}: {e}"))
        .plan;
    assert_eq!(native_ids(&plan), protocol_ids(&fragment.root), "{name} ids");
    assert_eq!(native_shape(&plan), protocol_shape(&fragment.root), "{name} shape");
    plan
}

#[test]
fn scan_partial_aggregation() {
    let fragment = fragment("ScanAgg.json");
    let converted = converter()
        .to_native_query_plan(&fragment, &session(), QUERY_ID)
        .expect("converted");
    assert_eq!(converted.scan_node_id, Some(PlanNodeId::from("0")));
    assert_eq!(converted.scan_node_ids, vec![PlanNodeId::from("0")]);
    assert_eq!(
        spine(&converted.plan),
        vec!["Exchange", "Aggregate", "Project", "TableScan"]
    );

    let PlanNode::Exchange(exchange) = &converted.plan else {
        panic!("expected exchange root");
    };
    assert_eq!(exchange.partitioning.partition_count, PartitionCount::Static(3));
    assert_eq!(
        exchange.partitioning.keys,
        vec![TypedExpr::field("regionkey", DataType::Int64)]
    );
    let PlanNode::Aggregate(agg) = &exchange.sources[0] else {
        panic!("expected aggregate");
    };
    assert_eq!(agg.step, AggregationStep::Partial);
    assert!(agg.step.is_partial_output());
    assert_eq!(agg.aggregates[0].output, "sum");
}

#[test]
fn final_aggregation_over_remote_source() {
    let plan = assert_converts("FinalAgg.json");
    assert_eq!(spine(&plan), vec!["Exchange", "Aggregate", "RemoteSource"]);
    let PlanNode::Exchange(exchange) = &plan else {
        panic!("expected exchange root");
    };
    let PlanNode::Aggregate(agg) = &exchange.sources[0] else {
        panic!("expected aggregate");
    };
    assert_eq!(agg.step, AggregationStep::Final);
    assert!(!agg.step.is_partial_output());
}

#[test]
fn output_becomes_renaming_projection() {
    let plan = assert_converts("Output.json");
    let schema = plan.output_type();
    let names = schema
        .fields()
        .iter()
        .map(|f| f.name().as_str())
        .collect::<Vec<_>>();
    assert_eq!(names, vec!["regionkey", "_col1"]);
}

fn column_names(schema: &Schema) -> Vec<String> {
    schema.fields().iter().map(|f| f.name().clone()).collect()
}

#[test]
fn local_gather_union_renames_inputs() {
    let plan = converter()
        .to_native_query_plan(&fragment("LocalGatherUnion.json"), &session(), QUERY_ID)
        .expect("plan")
        .plan;
    assert_eq!(column_names(&plan.output_type()), vec!["a"]);
    assert_eq!(spine(&plan), vec!["Project", "LocalPartition", "Project", "Values"]);

    let PlanNode::LocalPartition(local) = plan.children()[0] else {
        panic!("expected local partition");
    };
    assert_eq!(column_names(&local.output_type()), vec!["a"]);
    let renames = local
        .sources
        .iter()
        .map(|source| {
            assert_eq!(source.name(), "Project");
            assert_eq!(column_names(&source.output_type()), vec!["a"]);
            (source.id().to_string(), source.children()[0].id().to_string())
        })
        .collect::<Vec<_>>();
    assert_eq!(
        renames,
        vec![
            ("2.rename".to_string(), "0".to_string()),
            ("2.rename.1".to_string(), "1".to_string()),
        ]
    );
}

#[test]
fn offset_limit_is_carried() {
    let plan = assert_converts("OffsetLimit.json");
    let limit = plan
        .children()
        .into_iter()
        .find_map(|c| match c {
            PlanNode::Limit(limit) => Some(limit),
            _ => None,
        })
        .expect("limit below output");
    assert_eq!((limit.offset, limit.count), (7, 5));

    let PlanNode::RemoteSource(remote) = limit.input.as_ref() else {
        panic!("expected remote source");
    };
    assert_eq!(remote.ordering.len(), 1);
    assert!(remote.ordering[0].ascending);
    assert!(!remote.ordering[0].nulls_first);
}

#[test]
fn scan_filter_project_translates_expressions() {
    let plan = assert_converts("ScanFilterProject.json");
    let rendered = explain_native(&plan);
    assert!(rendered.contains("Filter[2] and(gt(nationkey, 3), in(regionkey, 1, 2))"), "{rendered}");
    assert!(rendered.contains("discounted := multiply(cast(nationkey as double), 0.9)"), "{rendered}");
    assert!(rendered.contains("bucket := switch(eq(regionkey, 1), 'america', 'other')"), "{rendered}");
    assert!(rendered.contains("connector=hive-plus(hive)"), "{rendered}");

    let PlanNode::Exchange(exchange) = &plan else {
        panic!("expected exchange root");
    };
    assert_eq!(
        exchange.partitioning.partition_count,
        PartitionCount::RuntimeDetermined
    );
}

#[test]
fn conversion_is_deterministic() {
    let converter = converter();
    for name in [
        "ScanAgg.json",
        "FinalAgg.json",
        "Output.json",
        "OffsetLimit.json",
        "ScanFilterProject.json",
    ] {
        let fragment = fragment(name);
        let first = converter
            .to_native_query_plan(&fragment, &session(), QUERY_ID)
            .expect("first");
        let second = converter
            .to_native_query_plan(&fragment, &session(), QUERY_ID)
            .expect("second");
        assert_eq!(first, second, "{name}");
    }
}

#[test]
fn conversion_leaves_the_fragment_untouched() {
    let fragment = fragment("ScanAgg.json");
    let before = fragment.clone();
    converter()
        .to_native_query_plan(&fragment, &session(), QUERY_ID)
        .expect("converted");
    assert_eq!(fragment, before);
}

#[test]
fn connector_registration_scenario() {
    let connectors = Arc::new(ConnectorRegistry::default());
    let converter = converter_with(Arc::clone(&connectors));
    let fragment = fragment("ScanAgg.json");

    connectors.register_connector("hive", "hive");
    assert!(converter
        .to_native_query_plan(&fragment, &session(), QUERY_ID)
        .is_ok());

    assert!(connectors.unregister_connector("hive"));
    match converter.to_native_query_plan(&fragment, &session(), QUERY_ID) {
        Err(NexecError::ConnectorNotFound { connector, node_id }) => {
            assert_eq!(connector, "hive");
            assert_eq!(node_id, "0");
        }
        other => panic!("expected ConnectorNotFound, got {other:?}"),
    }
}

#[test]
fn global_connector_registry_is_used_by_default() {
    let mut fragment = fragment("ScanAgg.json");
    let connector = "hive-global-scenario";
    rename_connector(&mut fragment, connector);

    let converter = NativePlanConverter::new();
    register_global_connector(connector, "hive");
    assert!(converter
        .to_native_query_plan(&fragment, &session(), QUERY_ID)
        .is_ok());
    assert!(unregister_global_connector(connector));
    assert!(matches!(
        converter.to_native_query_plan(&fragment, &session(), QUERY_ID),
        Err(NexecError::ConnectorNotFound { .. })
    ));
}

fn rename_connector(fragment: &mut PlanFragment, connector: &str) {
    fn visit(node: &mut ProtoPlanNode, connector: &str) {
        match node {
            ProtoPlanNode::TableScan(scan) => {
                scan.table.connector_handle.connector_name = connector.to_string();
                for a in &mut scan.assignments {
                    a.column.connector_name = connector.to_string();
                }
            }
            ProtoPlanNode::Exchange(x) => x.sources.iter_mut().for_each(|s| visit(s, connector)),
            ProtoPlanNode::Aggregation(x) => visit(&mut x.source, connector),
            ProtoPlanNode::Project(x) => visit(&mut x.source, connector),
            _ => {}
        }
    }
    visit(&mut fragment.root, connector);
}

#[test]
fn unknown_kind_fails_with_node_context() {
    let mut fragment = fragment("Output.json");
    let ProtoPlanNode::Output(output) = &mut fragment.root else {
        panic!("expected output root");
    };
    output.source = Box::new(ProtoPlanNode::Other(GenericPlanNode {
        kind: "markDistinct".to_string(),
        id: "42".to_string(),
        sources: vec![],
        fields: serde_json::Map::new(),
    }));
    match converter().to_native_query_plan(&fragment, &session(), QUERY_ID) {
        Err(NexecError::UnsupportedPlanNode { kind, node_id }) => {
            assert_eq!(kind, "markDistinct");
            assert_eq!(node_id, "42");
        }
        other => panic!("expected UnsupportedPlanNode, got {other:?}"),
    }
}

fn convert_mark_distinct(
    node: &ProtoPlanNode,
    ctx: &mut ConversionContext<'_>,
) -> nexec_common::Result<PlanNode> {
    let ProtoPlanNode::Other(generic) = node else {
        return Err(NexecError::Planning("expected markDistinct".to_string()));
    };
    let inputs = ctx.convert_all(&generic.sources)?;
    let output_type = inputs
        .first()
        .map(PlanNode::output_type)
        .unwrap_or_else(Schema::empty);
    Ok(PlanNode::Custom(CustomNode {
        id: PlanNodeId::from(generic.id.as_str()),
        name: "MarkDistinct".to_string(),
        config: generic.fields.clone(),
        output_type,
        inputs,
    }))
}

#[test]
fn registered_converter_handles_extension_kind() {
    let mut fragment = fragment("Output.json");
    let ProtoPlanNode::Output(output) = &mut fragment.root else {
        panic!("expected output root");
    };
    let remote = std::mem::replace(
        &mut output.source,
        Box::new(ProtoPlanNode::Other(GenericPlanNode {
            kind: "markDistinct".to_string(),
            id: "42".to_string(),
            sources: vec![],
            fields: serde_json::Map::new(),
        })),
    );
    if let ProtoPlanNode::Other(generic) = output.source.as_mut() {
        generic.sources.push(*remote);
    }

    let converter = converter();
    assert!(!converter.register_converter("markDistinct", Arc::new(convert_mark_distinct)));
    let plan = converter
        .to_native_query_plan(&fragment, &session(), QUERY_ID)
        .expect("converted")
        .plan;
    assert_eq!(spine(&plan), vec!["Project", "MarkDistinct", "RemoteSource"]);
    assert_eq!(native_ids(&plan), protocol_ids(&fragment.root));
    assert!(converter.converters().kinds().contains(&"markDistinct".to_string()));
}

#[test]
fn session_overrides_function_namespace() {
    let fragment = fragment("ScanFilterProject.json");
    let session = session().with_system_property("native_function_namespace", "native.default");
    assert!(matches!(
        converter().to_native_query_plan(&fragment, &session, QUERY_ID),
        Err(NexecError::UnresolvedFunction { .. })
    ));

    let malformed = support::session().with_system_property("native_max_plan_depth", "deep");
    assert!(matches!(
        converter().to_native_query_plan(&fragment, &malformed, QUERY_ID),
        Err(NexecError::InvalidConfig(_))
    ));
}

#[test]
fn scheduling_order_selects_split_scan() {
    let mut fragment = fragment("ScanAgg.json");
    fragment.table_scan_scheduling_order = vec!["99".to_string(), "0".to_string()];
    let converted = converter()
        .to_native_query_plan(&fragment, &session(), QUERY_ID)
        .expect("converted");
    assert_eq!(converted.scan_node_id, Some(PlanNodeId::from("0")));

    let no_scan = converter()
        .to_native_query_plan(&self::fragment("Output.json"), &session(), QUERY_ID)
        .expect("converted");
    assert_eq!(no_scan.scan_node_id, None);
    assert!(no_scan.scan_node_ids.is_empty());
}

#[test]
fn scan_handles_carry_catalog_session_properties() {
    let fragment = fragment("ScanAgg.json");
    let session = session().with_catalog_property("hive", "collect_column_statistics_on_write", "true");
    let plan = converter()
        .to_native_query_plan(&fragment, &session, QUERY_ID)
        .expect("converted")
        .plan;
    let mut node = &plan;
    while let Some(child) = node.children().first().copied() {
        node = child;
    }
    let PlanNode::TableScan(scan) = node else {
        panic!("expected scan leaf, got {}", node.name());
    };
    assert_eq!(scan.table.connector_type, "hive");
    assert_eq!(
        scan.table
            .session_properties
            .get("collect_column_statistics_on_write")
            .map(String::as_str),
        Some("true")
    );
    assert_eq!(scan.columns[0].column.name, "regionkey");
    assert!(scan.columns[0].column.properties.contains_key("hiveColumnIndex"));
}

#[test]
fn hive_connectors_support_alias() {
    let connectors = hive_connectors();
    assert_eq!(connectors.resolve("hive-plus").as_deref(), Some("hive"));
}

use crate::expressions::{ScalarValue, TypedExpr};
use crate::operators::LocalPartitionKind;
use crate::plan_node::{PartitionCount, PlanNode, SortKey};
use crate::types::type_signature;

/// Render a native plan as human-readable multiline text.
pub fn explain_native(plan: &PlanNode) -> String {
    let mut s = String::new();
    fmt_plan(plan, 0, &mut s);
    s
}

fn fmt_plan(plan: &PlanNode, indent: usize, out: &mut String) {
    let pad = "  ".repeat(indent);
    let id = plan.id();
    match plan {
        PlanNode::TableScan(x) => {
            out.push_str(&format!(
                "{pad}TableScan[{id}] table={} connector={}({})\n",
                x.table.qualified_name(),
                x.table.connector_name,
                x.table.connector_type
            ));
            for c in &x.columns {
                out.push_str(&format!(
                    "{pad}  {} := {} {}\n",
                    c.name,
                    c.column.name,
                    type_signature(&c.column.data_type)
                ));
            }
        }
        PlanNode::Filter(x) => {
            out.push_str(&format!("{pad}Filter[{id}] {}\n", fmt_expr(&x.predicate)));
        }
        PlanNode::Project(x) => {
            out.push_str(&format!("{pad}Project[{id}]\n"));
            for (e, name) in &x.exprs {
                out.push_str(&format!("{pad}  {name} := {}\n", fmt_expr(e)));
            }
        }
        PlanNode::Aggregate(x) => {
            out.push_str(&format!("{pad}Aggregate[{id}] step={:?}\n", x.step));
            out.push_str(&format!("{pad}  group_by={}\n", fmt_exprs(&x.grouping_keys)));
            for a in &x.aggregates {
                let mut line = format!("{pad}  {} := {}", a.output, fmt_expr(&a.call));
                if a.distinct {
                    line.push_str(" distinct");
                }
                if let Some(mask) = &a.mask {
                    line.push_str(&format!(" mask={mask}"));
                }
                out.push_str(&line);
                out.push('\n');
            }
        }
        PlanNode::Limit(x) => {
            out.push_str(&format!(
                "{pad}Limit[{id}] offset={} count={} partial={}\n",
                x.offset, x.count, x.partial
            ));
        }
        PlanNode::TopN(x) => {
            out.push_str(&format!(
                "{pad}TopN[{id}] count={} partial={} by={}\n",
                x.count,
                x.partial,
                fmt_sort_keys(&x.keys)
            ));
        }
        PlanNode::Sort(x) => {
            out.push_str(&format!(
                "{pad}Sort[{id}] partial={} by={}\n",
                x.partial,
                fmt_sort_keys(&x.keys)
            ));
        }
        PlanNode::Exchange(x) => {
            let count = match x.partitioning.partition_count {
                PartitionCount::Static(n) => n.to_string(),
                PartitionCount::RuntimeDetermined => "runtime".to_string(),
            };
            out.push_str(&format!(
                "{pad}Exchange[{id}] kind={:?} scheme={:?} keys={} partitions={count}\n",
                x.kind,
                x.partitioning.scheme,
                fmt_exprs(&x.partitioning.keys)
            ));
        }
        PlanNode::LocalPartition(x) => match x.kind {
            LocalPartitionKind::Gather => out.push_str(&format!("{pad}LocalPartition[{id}] gather\n")),
            LocalPartitionKind::Repartition => out.push_str(&format!(
                "{pad}LocalPartition[{id}] repartition keys={}\n",
                fmt_exprs(&x.keys)
            )),
        },
        PlanNode::RemoteSource(x) => {
            out.push_str(&format!(
                "{pad}RemoteSource[{id}] fragments={:?}",
                x.source_fragment_ids
            ));
            if !x.ordering.is_empty() {
                out.push_str(&format!(" merge_by={}", fmt_sort_keys(&x.ordering)));
            }
            out.push('\n');
        }
        PlanNode::Values(x) => {
            out.push_str(&format!(
                "{pad}Values[{id}] rows={} columns={}\n",
                x.rows.len(),
                x.output_type.fields().len()
            ));
        }
        PlanNode::HashJoin(x) => {
            out.push_str(&format!(
                "{pad}HashJoin[{id}] type={:?} on={:?}",
                x.join_type, x.keys
            ));
            if let Some(f) = &x.filter {
                out.push_str(&format!(" filter={}", fmt_expr(f)));
            }
            out.push('\n');
        }
        PlanNode::NestedLoopJoin(x) => {
            out.push_str(&format!("{pad}NestedLoopJoin[{id}] type={:?}", x.join_type));
            if let Some(f) = &x.filter {
                out.push_str(&format!(" filter={}", fmt_expr(f)));
            }
            out.push('\n');
        }
        PlanNode::PartitionAndSerialize(x) => {
            out.push_str(&format!(
                "{pad}PartitionAndSerialize[{id}] partitions={} keys={}\n",
                x.num_partitions(),
                fmt_exprs(x.keys())
            ));
        }
        PlanNode::ShuffleWrite(x) => {
            out.push_str(&format!(
                "{pad}ShuffleWrite[{id}] shuffle={} config={}\n",
                x.shuffle_name(),
                x.config().to_json_string()
            ));
        }
        PlanNode::ShuffleRead(x) => {
            out.push_str(&format!(
                "{pad}ShuffleRead[{id}] fragments={:?}\n",
                x.source_fragment_ids
            ));
        }
        PlanNode::Custom(x) => {
            out.push_str(&format!("{pad}{}[{id}] (custom)\n", x.name));
        }
    }
    for child in plan.children() {
        fmt_plan(child, indent + 1, out);
    }
}

fn fmt_sort_keys(keys: &[SortKey]) -> String {
    keys.iter()
        .map(|k| {
            format!(
                "{} {} nulls {}",
                fmt_expr(&k.expr),
                if k.ascending { "asc" } else { "desc" },
                if k.nulls_first { "first" } else { "last" }
            )
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn fmt_exprs(exprs: &[TypedExpr]) -> String {
    format!(
        "[{}]",
        exprs.iter().map(fmt_expr).collect::<Vec<_>>().join(", ")
    )
}

fn fmt_expr(e: &TypedExpr) -> String {
    match e {
        TypedExpr::Field { name, .. } => name.clone(),
        TypedExpr::Constant { value, data_type } => match value {
            ScalarValue::Null => format!("null::{}", type_signature(data_type)),
            ScalarValue::Boolean(v) => v.to_string(),
            ScalarValue::Int(v) => v.to_string(),
            ScalarValue::Float(v) => v.to_string(),
            ScalarValue::Decimal(v) => format!("{v}::{}", type_signature(data_type)),
            ScalarValue::Utf8(v) => format!("'{v}'"),
            ScalarValue::Date(v) => format!("date({v})"),
            ScalarValue::Timestamp(v) => format!("timestamp({v})"),
        },
        TypedExpr::Dereference { input, index, .. } => {
            let name = match input.data_type() {
                arrow_schema::DataType::Struct(fields) => {
                    crate::expressions::struct_field_name(fields, *index)
                        .map(str::to_string)
                        .unwrap_or_else(|| index.to_string())
                }
                _ => index.to_string(),
            };
            format!("{}.{name}", fmt_expr(input))
        }
        TypedExpr::Call { name, args, .. } => format!(
            "{}({})",
            name,
            args.iter().map(fmt_expr).collect::<Vec<_>>().join(", ")
        ),
        TypedExpr::Cast {
            input,
            data_type,
            try_cast,
        } => format!(
            "{}({} as {})",
            if *try_cast { "try_cast" } else { "cast" },
            fmt_expr(input),
            type_signature(data_type)
        ),
    }
}

#[cfg(test)]
mod tests {
    use arrow_schema::{DataType, Field, Schema};
    use nexec_common::PlanNodeId;

    use super::explain_native;
    use crate::expressions::{ScalarValue, TypedExpr};
    use crate::plan_node::{FilterNode, LimitNode, PlanNode, ProjectNode, ValuesNode};

    #[test]
    fn renders_nested_plan_with_ids() {
        let values = PlanNode::Values(ValuesNode {
            id: PlanNodeId::from("0"),
            rows: vec![],
            output_type: Schema::new(vec![Field::new("k", DataType::Int64, true)]),
        });
        let filter = PlanNode::Filter(FilterNode {
            id: PlanNodeId::from("1"),
            predicate: TypedExpr::Call {
                name: "gt".to_string(),
                args: vec![
                    TypedExpr::field("k", DataType::Int64),
                    TypedExpr::Constant {
                        value: ScalarValue::Int(3),
                        data_type: DataType::Int64,
                    },
                ],
                data_type: DataType::Boolean,
            },
            input: Box::new(values),
        });
        let plan = PlanNode::Limit(LimitNode {
            id: PlanNodeId::from("2"),
            offset: 7,
            count: 5,
            partial: false,
            input: Box::new(filter),
        });
        assert_eq!(
            explain_native(&plan),
            "Limit[2] offset=7 count=5 partial=false\n  Filter[1] gt(k, 3)\n    Values[0] rows=0 columns=1\n"
        );
    }

    #[test]
    fn dereference_renders_struct_field_name() {
        let row = DataType::Struct(
            vec![
                Field::new("name", DataType::Utf8, true),
                Field::new("zip", DataType::Int64, true),
            ]
            .into(),
        );
        let project = PlanNode::Project(ProjectNode {
            id: PlanNodeId::from("1"),
            exprs: vec![
                (
                    TypedExpr::Dereference {
                        input: Box::new(TypedExpr::field("address", row.clone())),
                        index: 1,
                        data_type: DataType::Int64,
                    },
                    "zip".to_string(),
                ),
                (
                    TypedExpr::Dereference {
                        input: Box::new(TypedExpr::field("address", row.clone())),
                        index: 5,
                        data_type: DataType::Int64,
                    },
                    "missing".to_string(),
                ),
            ],
            input: Box::new(PlanNode::Values(ValuesNode {
                id: PlanNodeId::from("0"),
                rows: vec![],
                output_type: Schema::new(vec![Field::new("address", row, true)]),
            })),
        });
        let rendered = explain_native(&project);
        assert!(rendered.contains("address.zip"), "{rendered}");
        assert!(rendered.contains("address.5"), "{rendered}");
    }
}

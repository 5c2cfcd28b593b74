#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use nexec_planner::{ConnectorRegistry, NativePlanConverter, PlanNode};
use nexec_protocol::{PlanFragment, PlanNode as ProtoPlanNode, SessionContext};
use nexec_shuffle::{ShuffleBackendRegistry, ShuffleConfig};

pub const QUERY_ID: &str = "20201107_130540_00011_wrpkw.1.2.3";

pub fn fixture_path(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("data")
        .join(name)
}

/// Load a plan fragment fixture from `tests/data`.
pub fn fragment(name: &str) -> PlanFragment {
    let path = fixture_path(name);
    let raw = fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("read fixture {}: {e}", path.display()));
    serde_json::from_str(&raw).unwrap_or_else(|e| panic!("parse fixture {name}: {e}"))
}

pub fn session() -> SessionContext {
    SessionContext::new("test")
        .with_catalog("hive", "tpch")
        .with_time_zone("America/Los_Angeles")
}

/// Connector registry with `hive` and its `hive-plus` alias.
pub fn hive_connectors() -> Arc<ConnectorRegistry> {
    let registry = Arc::new(ConnectorRegistry::default());
    registry.register_connector("hive", "hive");
    registry.register_connector("hive-plus", "hive");
    registry
}

/// Converter isolated from the process-wide registries.
pub fn converter_with(connectors: Arc<ConnectorRegistry>) -> NativePlanConverter {
    NativePlanConverter::new()
        .with_connector_registry(connectors)
        .with_shuffle_backend_registry(Arc::new(ShuffleBackendRegistry::with_defaults()))
}

pub fn converter() -> NativePlanConverter {
    converter_with(hive_connectors())
}

pub fn local_shuffle_config(num_partitions: u32) -> ShuffleConfig {
    ShuffleConfig::from_value(serde_json::json!({
        "rootPath": std::env::temp_dir().join("nexec-shuffle").display().to_string(),
        "numPartitions": num_partitions,
    }))
    .expect("shuffle config")
}

/// Child-count skeleton of a tree, used to compare shapes across models.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shape(pub Vec<Shape>);

pub fn native_shape(node: &PlanNode) -> Shape {
    Shape(node.children().into_iter().map(native_shape).collect())
}

pub fn protocol_shape(node: &ProtoPlanNode) -> Shape {
    Shape(node.sources().into_iter().map(protocol_shape).collect())
}

pub fn native_ids(node: &PlanNode) -> Vec<String> {
    node.node_ids().into_iter().map(|id| id.to_string()).collect()
}

pub fn protocol_ids(node: &ProtoPlanNode) -> Vec<String> {
    node.node_ids().into_iter().map(str::to_string).collect()
}

/// Follow first children from `node`, returning operator names top-down.
pub fn spine(node: &PlanNode) -> Vec<String> {
    let mut names = vec![node.name().to_string()];
    let mut current = node;
    while let Some(child) = current.children().first().copied() {
        names.push(child.name().to_string());
        current = child;
    }
    names
}

use serde::{Deserialize, Serialize};

use crate::plan_node::{PartitioningHandle, PlanNode};

/// One distributable unit of a query plan, sent to a single worker stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanFragment {
    pub id: String,
    pub root: PlanNode,
    /// Stage distribution chosen by the coordinator.
    #[serde(default)]
    pub partitioning: Option<PartitioningHandle>,
    /// Scan node ids needing splits, in scheduling order.
    #[serde(default)]
    pub table_scan_scheduling_order: Vec<String>,
}

impl PlanFragment {
    pub fn new(id: impl Into<String>, root: PlanNode) -> Self {
        Self {
            id: id.into(),
            root,
            partitioning: None,
            table_scan_scheduling_order: Vec::new(),
        }
    }
}

//! Typed identifiers shared across protocol/planner components.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Query identifier handed to the worker with a fragment.
///
/// Coordinators usually pass a task-qualified id such as
/// `20201107_130540_00011_wrpkw.1.2.3` (`query.stage.execution.task`); the
/// bare query part is available through [`QueryId::query_part`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryId(
    /// Raw id value.
    pub String,
);

impl QueryId {
    /// Wrap a raw id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Query part of a task-qualified id.
    pub fn query_part(&self) -> &str {
        self.0.split('.').next().unwrap_or(&self.0)
    }
}

impl fmt::Display for QueryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Plan node identifier, preserved verbatim from protocol to native nodes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlanNodeId(
    /// Raw id value.
    pub String,
);

impl PlanNodeId {
    /// Borrow the raw id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlanNodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PlanNodeId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for PlanNodeId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl PartialEq<str> for PlanNodeId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for PlanNodeId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

//! Coordinator-side plan fragment model.
//!
//! These types mirror the JSON the coordinator ships with each task: a
//! [`PlanFragment`] holding a tree of [`PlanNode`] descriptors whose
//! expressions are [`RowExpression`] trees and whose types are type signature
//! strings. Everything here is plain data; resolution against the native
//! runtime happens in `nexec-planner`.

pub mod connector;
pub mod expressions;
pub mod fragment;
pub mod plan_node;
pub mod session;

pub use connector::*;
pub use expressions::*;
pub use fragment::*;
pub use plan_node::*;
pub use session::*;

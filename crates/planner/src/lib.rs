//! Converts protocol plan fragments into native executable plan trees.
//!
//! Architecture role:
//! - type and expression translation into arrow types and [`TypedExpr`] trees
//! - kind tag dispatch of protocol nodes to per-kind converters
//! - batch shuffle boundary augmentation of converted fragments
//!
//! Key modules:
//! - [`plan_converter`]: [`NativePlanConverter`] entry point
//! - [`dispatch`] and [`converters`]: per-kind conversion
//! - [`batch`]: shuffle write splice for batch fragments
//! - [`plan_node`] and [`operators`]: the native tree

pub mod batch;
pub mod connectors;
pub mod converters;
pub mod dispatch;
pub mod explain;
pub mod expressions;
pub mod functions;
pub mod operators;
pub mod plan_converter;
pub mod plan_node;
pub mod types;

pub use batch::{augment_batch_plan, BatchShuffleSpec};
pub use connectors::*;
pub use dispatch::{ConversionContext, ExecutionMode, NodeConverter, NodeConverterRegistry};
pub use explain::explain_native;
pub use expressions::{ExpressionTranslator, ScalarValue, TypedExpr};
pub use functions::{ArgType, FunctionCatalog, FunctionKind, FunctionSignature};
pub use operators::*;
pub use plan_converter::{NativePlanConverter, NativeQueryPlan};
pub use plan_node::*;
pub use types::{parse_type, row_type, type_signature};

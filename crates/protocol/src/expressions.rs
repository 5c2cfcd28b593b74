use serde::{Deserialize, Serialize};

/// Named, typed variable produced by a plan node.
///
/// `ty` is a type signature string such as `bigint`, `varchar(25)` or
/// `row(a bigint,b double)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableReference {
    /// Variable name, unique within the producing node's output.
    pub name: String,
    /// Type signature.
    #[serde(rename = "type")]
    pub ty: String,
}

impl VariableReference {
    pub fn new(name: impl Into<String>, ty: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: ty.into(),
        }
    }
}

/// Protocol expression tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "@type")]
pub enum RowExpression {
    #[serde(rename = "constant")]
    Constant(ConstantExpression),
    #[serde(rename = "variable")]
    Variable(VariableReference),
    #[serde(rename = "call")]
    Call(CallExpression),
    #[serde(rename = "special")]
    SpecialForm(SpecialFormExpression),
}

impl RowExpression {
    /// Declared result type signature.
    pub fn type_signature(&self) -> &str {
        match self {
            RowExpression::Constant(c) => &c.ty,
            RowExpression::Variable(v) => &v.ty,
            RowExpression::Call(c) => &c.return_type,
            RowExpression::SpecialForm(s) => &s.return_type,
        }
    }

    pub fn variable(name: impl Into<String>, ty: impl Into<String>) -> Self {
        RowExpression::Variable(VariableReference::new(name, ty))
    }

    pub fn constant(value: serde_json::Value, ty: impl Into<String>) -> Self {
        RowExpression::Constant(ConstantExpression {
            value,
            ty: ty.into(),
        })
    }
}

/// Literal value. `value` is plain JSON interpreted according to `ty`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstantExpression {
    pub value: serde_json::Value,
    #[serde(rename = "type")]
    pub ty: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallExpression {
    pub display_name: String,
    pub function_handle: FunctionHandle,
    pub return_type: String,
    pub arguments: Vec<RowExpression>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionHandle {
    pub signature: Signature,
}

/// Coordinator-resolved function signature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Signature {
    /// Qualified name, e.g. `presto.default.sum` or `presto.default.$operator$add`.
    pub name: String,
    pub kind: FunctionKind,
    pub return_type: String,
    pub argument_types: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FunctionKind {
    Scalar,
    Aggregate,
    Window,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecialFormExpression {
    pub form: Form,
    pub return_type: String,
    pub arguments: Vec<RowExpression>,
}

/// Special forms evaluated by the runtime rather than the function catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Form {
    If,
    NullIf,
    Switch,
    When,
    IsNull,
    Coalesce,
    In,
    And,
    Or,
    Dereference,
    RowConstructor,
}

/// One `ORDER BY` key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ordering {
    pub variable: VariableReference,
    pub sort_order: SortOrder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SortOrder {
    AscNullsFirst,
    AscNullsLast,
    DescNullsFirst,
    DescNullsLast,
}

impl SortOrder {
    pub fn is_ascending(self) -> bool {
        matches!(self, SortOrder::AscNullsFirst | SortOrder::AscNullsLast)
    }

    pub fn is_nulls_first(self) -> bool {
        matches!(self, SortOrder::AscNullsFirst | SortOrder::DescNullsFirst)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderingScheme {
    pub order_by: Vec<Ordering>,
}

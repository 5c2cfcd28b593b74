//! Native function catalog used to resolve protocol call expressions.

use std::collections::HashMap;

use arrow_schema::{DataType, TimeUnit};
use nexec_common::{NexecError, Result};

use crate::types::{is_integral, is_numeric, type_signature};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    Scalar,
    Aggregate,
}

/// Argument matcher of a catalog signature.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgType {
    Exact(DataType),
    Any,
    Numeric,
    Integral,
    String,
    Boolean,
    /// Same type as the argument at this position.
    SameAs(usize),
}

impl ArgType {
    fn matches(&self, ty: &DataType, args: &[DataType]) -> bool {
        // untyped null literals match anything
        if ty == &DataType::Null {
            return true;
        }
        match self {
            ArgType::Exact(expected) => expected == ty,
            ArgType::Any => true,
            ArgType::Numeric => is_numeric(ty),
            ArgType::Integral => is_integral(ty),
            ArgType::String => ty == &DataType::Utf8,
            ArgType::Boolean => ty == &DataType::Boolean,
            ArgType::SameAs(i) => match args.get(*i) {
                Some(DataType::Null) => true,
                Some(other) => other == ty,
                None => false,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionSignature {
    pub name: String,
    pub kind: FunctionKind,
    pub args: Vec<ArgType>,
    /// Matcher repeated for any number of trailing arguments.
    pub variadic: Option<ArgType>,
}

impl FunctionSignature {
    pub fn scalar(name: &str, args: Vec<ArgType>) -> Self {
        Self {
            name: name.to_string(),
            kind: FunctionKind::Scalar,
            args,
            variadic: None,
        }
    }

    pub fn aggregate(name: &str, args: Vec<ArgType>) -> Self {
        Self {
            kind: FunctionKind::Aggregate,
            ..Self::scalar(name, args)
        }
    }

    pub fn with_variadic(mut self, tail: ArgType) -> Self {
        self.variadic = Some(tail);
        self
    }

    fn accepts(&self, args: &[DataType]) -> bool {
        if args.len() < self.args.len() {
            return false;
        }
        if args.len() > self.args.len() && self.variadic.is_none() {
            return false;
        }
        args.iter().enumerate().all(|(i, ty)| {
            let matcher = self
                .args
                .get(i)
                .or(self.variadic.as_ref())
                .unwrap_or(&ArgType::Any);
            matcher.matches(ty, args)
        })
    }
}

/// Render `(bigint, varchar)` style argument lists for errors.
pub fn render_signature(args: &[DataType]) -> String {
    args.iter()
        .map(type_signature)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Catalog of scalar and aggregate functions keyed by normalized name.
#[derive(Debug, Clone, Default)]
pub struct FunctionCatalog {
    functions: HashMap<String, Vec<FunctionSignature>>,
}

impl FunctionCatalog {
    /// Empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog with the runtime's built-in functions.
    pub fn with_builtins() -> Self {
        let mut catalog = Self::new();
        register_builtin_scalars(&mut catalog);
        register_builtin_aggregates(&mut catalog);
        catalog
    }

    /// Add an overload.
    pub fn register(&mut self, signature: FunctionSignature) {
        self.functions
            .entry(signature.name.clone())
            .or_default()
            .push(signature);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Find the first overload of `name` of the given kind accepting `args`.
    pub fn resolve(
        &self,
        name: &str,
        kind: FunctionKind,
        args: &[DataType],
    ) -> Result<&FunctionSignature> {
        self.functions
            .get(name)
            .and_then(|overloads| {
                overloads
                    .iter()
                    .find(|sig| sig.kind == kind && sig.accepts(args))
            })
            .ok_or_else(|| NexecError::UnresolvedFunction {
                name: name.to_string(),
                signature: render_signature(args),
            })
    }
}

fn register_builtin_scalars(c: &mut FunctionCatalog) {
    use ArgType::*;

    for name in ["eq", "neq", "lt", "lte", "gt", "gte", "distinct_from"] {
        c.register(FunctionSignature::scalar(name, vec![Any, SameAs(0)]));
    }
    c.register(FunctionSignature::scalar(
        "between",
        vec![Any, SameAs(0), SameAs(0)],
    ));
    for name in ["plus", "minus", "multiply", "divide", "modulus"] {
        c.register(FunctionSignature::scalar(name, vec![Numeric, Numeric]));
    }
    c.register(FunctionSignature::scalar(
        "plus",
        vec![Exact(DataType::Date32), Any],
    ));
    c.register(FunctionSignature::scalar(
        "minus",
        vec![Exact(DataType::Date32), Any],
    ));
    for name in ["negate", "abs", "ceil", "floor", "sqrt", "ln", "exp", "sign"] {
        c.register(FunctionSignature::scalar(name, vec![Numeric]));
    }
    c.register(FunctionSignature::scalar("round", vec![Numeric]));
    c.register(FunctionSignature::scalar("round", vec![Numeric, Integral]));
    c.register(FunctionSignature::scalar("power", vec![Numeric, Numeric]));
    c.register(FunctionSignature::scalar("is_nan", vec![Numeric]));
    c.register(FunctionSignature::scalar("not", vec![Boolean]));

    for name in ["lower", "upper", "trim", "ltrim", "rtrim", "reverse", "length"] {
        c.register(FunctionSignature::scalar(name, vec![String]));
    }
    c.register(FunctionSignature::scalar("like", vec![String, String]));
    c.register(FunctionSignature::scalar("like", vec![String, String, String]));
    c.register(FunctionSignature::scalar("substr", vec![String, Integral]));
    c.register(FunctionSignature::scalar(
        "substr",
        vec![String, Integral, Integral],
    ));
    c.register(FunctionSignature::scalar("strpos", vec![String, String]));
    c.register(FunctionSignature::scalar("replace", vec![String, String]));
    c.register(FunctionSignature::scalar(
        "replace",
        vec![String, String, String],
    ));
    c.register(FunctionSignature::scalar("concat", vec![String]).with_variadic(String));

    for name in ["year", "quarter", "month", "day", "day_of_week"] {
        c.register(FunctionSignature::scalar(name, vec![Exact(DataType::Date32)]));
        c.register(FunctionSignature::scalar(
            name,
            vec![Exact(DataType::Timestamp(TimeUnit::Millisecond, None))],
        ));
    }
    c.register(FunctionSignature::scalar("date_trunc", vec![String, Any]));

    c.register(FunctionSignature::scalar("hash_code", vec![Any]));
    c.register(FunctionSignature::scalar("xxhash64", vec![Exact(DataType::Binary)]));
    c.register(FunctionSignature::scalar("cardinality", vec![Any]));
    c.register(FunctionSignature::scalar("element_at", vec![Any, Any]));
    c.register(FunctionSignature::scalar("subscript", vec![Any, Any]));
    c.register(FunctionSignature::scalar("contains", vec![Any, Any]));
    c.register(FunctionSignature::scalar("random", vec![]));
}

fn register_builtin_aggregates(c: &mut FunctionCatalog) {
    use ArgType::*;

    c.register(FunctionSignature::aggregate("count", vec![]));
    c.register(FunctionSignature::aggregate("count", vec![Any]));
    c.register(FunctionSignature::aggregate("count_if", vec![Boolean]));
    for name in ["sum", "avg", "stddev", "stddev_samp", "stddev_pop", "variance"] {
        c.register(FunctionSignature::aggregate(name, vec![Numeric]));
    }
    for name in ["min", "max", "arbitrary", "any_value", "array_agg", "approx_distinct"] {
        c.register(FunctionSignature::aggregate(name, vec![Any]));
    }
    c.register(FunctionSignature::aggregate(
        "approx_distinct",
        vec![Any, Numeric],
    ));
    for name in ["bool_and", "bool_or"] {
        c.register(FunctionSignature::aggregate(name, vec![Boolean]));
    }
    for name in ["min_by", "max_by"] {
        c.register(FunctionSignature::aggregate(name, vec![Any, Any]));
    }
}

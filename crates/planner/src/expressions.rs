//! Native typed expressions and the protocol expression translator.

use arrow_array::types::{Date32Type, Decimal128Type};
use arrow_cast::parse::Parser;
use arrow_schema::{DataType, Fields};
use nexec_common::{NexecError, Result};
use nexec_protocol::{
    CallExpression, ConstantExpression, Form, RowExpression, SpecialFormExpression,
    VariableReference,
};
use serde::{Deserialize, Serialize};

use crate::functions::{FunctionCatalog, FunctionKind};
use crate::types::parse_type;

/// Literal value of a [`TypedExpr::Constant`]; interpretation follows its type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ScalarValue {
    Null,
    Boolean(bool),
    Int(i64),
    Float(f64),
    /// Unscaled value; scale comes from the decimal type.
    Decimal(i128),
    Utf8(String),
    /// Days since the unix epoch.
    Date(i32),
    /// Milliseconds since the unix epoch.
    Timestamp(i64),
}

/// Resolved native expression tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TypedExpr {
    Constant {
        value: ScalarValue,
        data_type: DataType,
    },
    /// Reference to a column of the input row.
    Field { name: String, data_type: DataType },
    /// Access to the `index`-th field of a struct value.
    Dereference {
        input: Box<TypedExpr>,
        index: usize,
        data_type: DataType,
    },
    /// Catalog function or special form call.
    Call {
        name: String,
        args: Vec<TypedExpr>,
        data_type: DataType,
    },
    Cast {
        input: Box<TypedExpr>,
        data_type: DataType,
        try_cast: bool,
    },
}

impl TypedExpr {
    pub fn data_type(&self) -> &DataType {
        match self {
            TypedExpr::Constant { data_type, .. }
            | TypedExpr::Field { data_type, .. }
            | TypedExpr::Dereference { data_type, .. }
            | TypedExpr::Call { data_type, .. }
            | TypedExpr::Cast { data_type, .. } => data_type,
        }
    }

    pub fn field(name: impl Into<String>, data_type: DataType) -> Self {
        TypedExpr::Field {
            name: name.into(),
            data_type,
        }
    }
}

/// Translates protocol [`RowExpression`]s into [`TypedExpr`]s.
///
/// Stateless apart from its borrowed catalog: translating the same
/// expression twice yields equal trees.
#[derive(Debug, Clone, Copy)]
pub struct ExpressionTranslator<'a> {
    functions: &'a FunctionCatalog,
    namespace: &'a str,
}

impl<'a> ExpressionTranslator<'a> {
    /// `namespace` is stripped from qualified function names (`presto.default`).
    pub fn new(functions: &'a FunctionCatalog, namespace: &'a str) -> Self {
        Self {
            functions,
            namespace,
        }
    }

    pub fn translate(&self, expr: &RowExpression) -> Result<TypedExpr> {
        match expr {
            RowExpression::Constant(c) => translate_constant(c),
            RowExpression::Variable(v) => self.translate_variable(v),
            RowExpression::Call(call) => self.translate_call(call),
            RowExpression::SpecialForm(special) => self.translate_special(special),
        }
    }

    pub fn translate_all(&self, exprs: &[RowExpression]) -> Result<Vec<TypedExpr>> {
        exprs.iter().map(|e| self.translate(e)).collect()
    }

    pub fn translate_variable(&self, v: &VariableReference) -> Result<TypedExpr> {
        Ok(TypedExpr::field(&v.name, parse_type(&v.ty)?))
    }

    /// Normalized catalog name of a protocol function name.
    pub fn function_name(&self, qualified: &str) -> String {
        let lowered = qualified.to_ascii_lowercase();
        let prefix = format!("{}.", self.namespace.to_ascii_lowercase());
        let local = lowered.strip_prefix(&prefix).unwrap_or(&lowered);
        match local.strip_prefix("$operator$") {
            Some(op) => operator_name(op).to_string(),
            None => local.to_string(),
        }
    }

    /// Resolve an aggregate call against its declared raw input types.
    ///
    /// Final and intermediate steps feed intermediate states to the function,
    /// so resolution uses the signature rather than the argument expressions.
    pub fn translate_aggregate(&self, call: &CallExpression) -> Result<(TypedExpr, Vec<DataType>)> {
        let name = self.function_name(&call.function_handle.signature.name);
        let raw_input_types = call
            .function_handle
            .signature
            .argument_types
            .iter()
            .map(|t| parse_type(t))
            .collect::<Result<Vec<_>>>()?;
        self.functions
            .resolve(&name, FunctionKind::Aggregate, &raw_input_types)?;
        let args = self.translate_all(&call.arguments)?;
        let expr = TypedExpr::Call {
            name,
            args,
            data_type: parse_type(&call.return_type)?,
        };
        Ok((expr, raw_input_types))
    }

    fn translate_call(&self, call: &CallExpression) -> Result<TypedExpr> {
        let name = self.function_name(&call.function_handle.signature.name);
        let data_type = parse_type(&call.return_type)?;

        if matches!(name.as_str(), "cast" | "try_cast") {
            let [input] = call.arguments.as_slice() else {
                return Err(NexecError::Planning(format!(
                    "{name} expects 1 argument, got {}",
                    call.arguments.len()
                )));
            };
            return Ok(TypedExpr::Cast {
                input: Box::new(self.translate(input)?),
                data_type,
                try_cast: name == "try_cast",
            });
        }

        let args = self.translate_all(&call.arguments)?;
        let arg_types = args.iter().map(|a| a.data_type().clone()).collect::<Vec<_>>();
        self.functions
            .resolve(&name, FunctionKind::Scalar, &arg_types)?;
        Ok(TypedExpr::Call {
            name,
            args,
            data_type,
        })
    }

    fn translate_special(&self, special: &SpecialFormExpression) -> Result<TypedExpr> {
        let data_type = parse_type(&special.return_type)?;
        let args = &special.arguments;
        let (name, min, max) = match special.form {
            Form::And => ("and", 2, usize::MAX),
            Form::Or => ("or", 2, usize::MAX),
            Form::If => ("if", 2, 3),
            Form::NullIf => ("nullif", 2, 2),
            Form::IsNull => ("is_null", 1, 1),
            Form::Coalesce => ("coalesce", 1, usize::MAX),
            Form::In => ("in", 2, usize::MAX),
            Form::RowConstructor => ("row_constructor", 1, usize::MAX),
            Form::Switch => return self.translate_switch(args, data_type),
            Form::Dereference => return self.translate_dereference(args, data_type),
            Form::When => {
                return Err(NexecError::Planning(
                    "WHEN is only valid inside SWITCH".to_string(),
                ))
            }
        };
        if args.len() < min || args.len() > max {
            return Err(NexecError::Planning(format!(
                "{name} got {} arguments",
                args.len()
            )));
        }
        Ok(TypedExpr::Call {
            name: name.to_string(),
            args: self.translate_all(args)?,
            data_type,
        })
    }

    /// `SWITCH(operand, WHEN(v1, r1), ..., [else])` to `switch(c1, r1, ..., [else])`.
    ///
    /// A literal `true` operand is a searched CASE and the WHEN values are used
    /// as conditions directly; otherwise each condition is `eq(operand, v)`.
    fn translate_switch(&self, args: &[RowExpression], data_type: DataType) -> Result<TypedExpr> {
        let Some((operand, branches)) = args.split_first() else {
            return Err(NexecError::Planning("SWITCH without operand".to_string()));
        };
        let operand = self.translate(operand)?;
        let searched = matches!(
            &operand,
            TypedExpr::Constant {
                value: ScalarValue::Boolean(true),
                ..
            }
        );

        let mut out = Vec::with_capacity(branches.len() * 2);
        let mut saw_when = false;
        for (i, branch) in branches.iter().enumerate() {
            match branch {
                RowExpression::SpecialForm(w) if w.form == Form::When => {
                    let [value, result] = w.arguments.as_slice() else {
                        return Err(NexecError::Planning(format!(
                            "WHEN expects 2 arguments, got {}",
                            w.arguments.len()
                        )));
                    };
                    let value = self.translate(value)?;
                    let condition = if searched {
                        value
                    } else {
                        let types = [operand.data_type().clone(), value.data_type().clone()];
                        self.functions.resolve("eq", FunctionKind::Scalar, &types)?;
                        TypedExpr::Call {
                            name: "eq".to_string(),
                            args: vec![operand.clone(), value],
                            data_type: DataType::Boolean,
                        }
                    };
                    out.push(condition);
                    out.push(self.translate(result)?);
                    saw_when = true;
                }
                // only the last branch may be the ELSE value
                other if i + 1 == branches.len() && saw_when => {
                    out.push(self.translate(other)?);
                }
                _ => {
                    return Err(NexecError::Planning(
                        "SWITCH branches must be WHEN clauses followed by an optional else"
                            .to_string(),
                    ))
                }
            }
        }
        if !saw_when {
            return Err(NexecError::Planning("SWITCH without WHEN clauses".to_string()));
        }
        Ok(TypedExpr::Call {
            name: "switch".to_string(),
            args: out,
            data_type,
        })
    }

    fn translate_dereference(
        &self,
        args: &[RowExpression],
        data_type: DataType,
    ) -> Result<TypedExpr> {
        let [base, index] = args else {
            return Err(NexecError::Planning(format!(
                "DEREFERENCE expects 2 arguments, got {}",
                args.len()
            )));
        };
        let input = self.translate(base)?;
        let index = match self.translate(index)? {
            TypedExpr::Constant {
                value: ScalarValue::Int(i),
                ..
            } => usize::try_from(i).ok(),
            _ => None,
        }
        .ok_or_else(|| {
            NexecError::Planning("DEREFERENCE index must be a non-negative constant".to_string())
        })?;
        let field_count = match input.data_type() {
            DataType::Struct(fields) => fields.len(),
            other => {
                return Err(NexecError::Planning(format!(
                    "DEREFERENCE of non-row type {other:?}"
                )))
            }
        };
        if index >= field_count {
            return Err(NexecError::Planning(format!(
                "DEREFERENCE index {index} out of bounds for row of {field_count} fields"
            )));
        }
        Ok(TypedExpr::Dereference {
            input: Box::new(input),
            index,
            data_type,
        })
    }
}

fn operator_name(op: &str) -> &str {
    match op {
        "equal" => "eq",
        "not_equal" => "neq",
        "less_than" => "lt",
        "less_than_or_equal" => "lte",
        "greater_than" => "gt",
        "greater_than_or_equal" => "gte",
        "is_distinct_from" => "distinct_from",
        "add" => "plus",
        "subtract" => "minus",
        "multiply" => "multiply",
        "divide" => "divide",
        "modulus" => "modulus",
        "negation" => "negate",
        "subscript" => "subscript",
        "hash_code" => "hash_code",
        other => other,
    }
}

fn translate_constant(c: &ConstantExpression) -> Result<TypedExpr> {
    let data_type = parse_type(&c.ty)?;
    let value = scalar_from_json(&c.value, &data_type)?;
    Ok(TypedExpr::Constant { value, data_type })
}

/// Decode a JSON literal according to its declared native type.
pub fn scalar_from_json(value: &serde_json::Value, data_type: &DataType) -> Result<ScalarValue> {
    use serde_json::Value;

    let mismatch = || {
        NexecError::Planning(format!(
            "constant {value} does not match type {}",
            crate::types::type_signature(data_type)
        ))
    };

    if value.is_null() {
        return Ok(ScalarValue::Null);
    }
    let scalar = match (data_type, value) {
        (DataType::Boolean, Value::Bool(b)) => ScalarValue::Boolean(*b),
        (DataType::Int8 | DataType::Int16 | DataType::Int32 | DataType::Int64, Value::Number(n)) => {
            let v = n.as_i64().ok_or_else(mismatch)?;
            let (min, max) = match data_type {
                DataType::Int8 => (i8::MIN as i64, i8::MAX as i64),
                DataType::Int16 => (i16::MIN as i64, i16::MAX as i64),
                DataType::Int32 => (i32::MIN as i64, i32::MAX as i64),
                _ => (i64::MIN, i64::MAX),
            };
            if v < min || v > max {
                return Err(NexecError::Planning(format!(
                    "constant {v} out of range for {}",
                    crate::types::type_signature(data_type)
                )));
            }
            ScalarValue::Int(v)
        }
        (DataType::Float32 | DataType::Float64, Value::Number(n)) => {
            ScalarValue::Float(n.as_f64().ok_or_else(mismatch)?)
        }
        (DataType::Decimal128(precision, scale), Value::String(s)) => {
            ScalarValue::Decimal(parse_decimal(s, *precision, *scale).ok_or_else(mismatch)?)
        }
        (DataType::Decimal128(precision, scale), Value::Number(n)) => ScalarValue::Decimal(
            parse_decimal(&n.to_string(), *precision, *scale).ok_or_else(mismatch)?,
        ),
        (DataType::Utf8 | DataType::Binary, Value::String(s)) => ScalarValue::Utf8(s.clone()),
        (DataType::Date32, Value::Number(n)) => ScalarValue::Date(
            n.as_i64()
                .and_then(|d| i32::try_from(d).ok())
                .ok_or_else(mismatch)?,
        ),
        (DataType::Date32, Value::String(s)) => {
            ScalarValue::Date(parse_date(s).ok_or_else(mismatch)?)
        }
        (DataType::Timestamp(_, _), Value::Number(n)) => {
            ScalarValue::Timestamp(n.as_i64().ok_or_else(mismatch)?)
        }
        (DataType::Null, _) => return Err(mismatch()),
        (DataType::List(_) | DataType::Map(_, _) | DataType::Struct(_), _) => {
            return Err(NexecError::Unsupported(format!(
                "non-null constant of complex type {}",
                crate::types::type_signature(data_type)
            )))
        }
        _ => return Err(mismatch()),
    };
    Ok(scalar)
}

/// Unscaled `i128` of a decimal literal at `scale`; `None` when it is not a
/// decimal or does not fit `precision`.
fn parse_decimal(raw: &str, precision: u8, scale: i8) -> Option<i128> {
    arrow_cast::parse::parse_decimal::<Decimal128Type>(raw.trim(), precision, scale).ok()
}

/// Days since epoch of a `YYYY-MM-DD` date.
fn parse_date(raw: &str) -> Option<i32> {
    Date32Type::parse(raw.trim())
}

/// Name of the struct field at `index`, used when rendering dereferences.
pub fn struct_field_name(fields: &Fields, index: usize) -> Option<&str> {
    fields.get(index).map(|f| f.name().as_str())
}

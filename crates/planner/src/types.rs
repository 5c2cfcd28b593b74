//! Protocol type signatures to native arrow types.

use std::sync::Arc;

use arrow_schema::{DataType, Field, Fields, IntervalUnit, Schema, TimeUnit};
use nexec_common::{NexecError, Result};
use nexec_protocol::VariableReference;

/// Maximum decimal precision representable by the runtime.
pub const MAX_DECIMAL_PRECISION: u8 = 38;

/// Parse a type signature such as `map(varchar,array(bigint))` into a native type.
///
/// Fails with [`NexecError::UnsupportedType`] naming the whole signature when
/// any part of it is outside the supported set.
pub fn parse_type(signature: &str) -> Result<DataType> {
    let unsupported = || NexecError::UnsupportedType(signature.to_string());
    let mut parser = TypeParser::new(signature);
    let ty = parser.parse().ok_or_else(unsupported)?;
    parser.skip_ws();
    if !parser.at_end() {
        return Err(unsupported());
    }
    Ok(ty)
}

/// Map an ordered `(name, type)` list to a native row type.
pub fn row_type(variables: &[VariableReference]) -> Result<Schema> {
    let fields = variables
        .iter()
        .map(|v| Ok(Field::new(&v.name, parse_type(&v.ty)?, true)))
        .collect::<Result<Vec<_>>>()?;
    Ok(Schema::new(fields))
}

/// Render a native type in protocol spelling.
pub fn type_signature(ty: &DataType) -> String {
    match ty {
        DataType::Null => "unknown".to_string(),
        DataType::Boolean => "boolean".to_string(),
        DataType::Int8 => "tinyint".to_string(),
        DataType::Int16 => "smallint".to_string(),
        DataType::Int32 => "integer".to_string(),
        DataType::Int64 => "bigint".to_string(),
        DataType::Float32 => "real".to_string(),
        DataType::Float64 => "double".to_string(),
        DataType::Decimal128(p, s) => format!("decimal({p},{s})"),
        DataType::Utf8 => "varchar".to_string(),
        DataType::Binary => "varbinary".to_string(),
        DataType::Date32 => "date".to_string(),
        DataType::Timestamp(_, _) => "timestamp".to_string(),
        DataType::Duration(_) => "interval day to second".to_string(),
        DataType::Interval(_) => "interval year to month".to_string(),
        DataType::List(item) => format!("array({})", type_signature(item.data_type())),
        DataType::Map(entries, _) => match entries.data_type() {
            DataType::Struct(kv) if kv.len() == 2 => format!(
                "map({},{})",
                type_signature(kv[0].data_type()),
                type_signature(kv[1].data_type())
            ),
            other => format!("{other:?}"),
        },
        DataType::Struct(fields) => format!(
            "row({})",
            fields
                .iter()
                .map(|f| format!("{} {}", f.name(), type_signature(f.data_type())))
                .collect::<Vec<_>>()
                .join(",")
        ),
        other => format!("{other:?}"),
    }
}

pub fn is_numeric(ty: &DataType) -> bool {
    is_integral(ty) || matches!(ty, DataType::Float32 | DataType::Float64 | DataType::Decimal128(_, _))
}

pub fn is_integral(ty: &DataType) -> bool {
    matches!(
        ty,
        DataType::Int8 | DataType::Int16 | DataType::Int32 | DataType::Int64
    )
}

fn list_of(item: DataType) -> DataType {
    DataType::List(Arc::new(Field::new("item", item, true)))
}

fn map_of(key: DataType, value: DataType) -> DataType {
    let entries = Fields::from(vec![
        Field::new("key", key, false),
        Field::new("value", value, true),
    ]);
    DataType::Map(
        Arc::new(Field::new("entries", DataType::Struct(entries), false)),
        false,
    )
}

/// Recursive-descent parser over a type signature.
///
/// Returns `None` on any error; the caller reports the full signature.
struct TypeParser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> TypeParser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn skip_ws(&mut self) {
        let trimmed = self.rest().trim_start();
        self.pos = self.input.len() - trimmed.len();
    }

    fn eat(&mut self, c: char) -> bool {
        self.skip_ws();
        if self.rest().starts_with(c) {
            self.pos += c.len_utf8();
            true
        } else {
            false
        }
    }

    /// Base name up to the next delimiter, lower-cased with inner whitespace collapsed.
    fn base_name(&mut self) -> String {
        self.skip_ws();
        let len = self
            .rest()
            .find(['(', ')', ','])
            .unwrap_or(self.rest().len());
        let raw = &self.rest()[..len];
        self.pos += len;
        raw.split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_ascii_lowercase()
    }

    fn number(&mut self) -> Option<u64> {
        self.skip_ws();
        let len = self
            .rest()
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(self.rest().len());
        let digits = &self.rest()[..len];
        self.pos += len;
        digits.parse().ok()
    }

    fn parse(&mut self) -> Option<DataType> {
        let name = self.base_name();
        let ty = match name.as_str() {
            "boolean" => DataType::Boolean,
            "tinyint" => DataType::Int8,
            "smallint" => DataType::Int16,
            "integer" | "int" => DataType::Int32,
            "bigint" => DataType::Int64,
            "real" => DataType::Float32,
            "double" => DataType::Float64,
            "varbinary" => DataType::Binary,
            "date" => DataType::Date32,
            "timestamp" => DataType::Timestamp(TimeUnit::Millisecond, None),
            "interval day to second" => DataType::Duration(TimeUnit::Millisecond),
            "interval year to month" => DataType::Interval(IntervalUnit::YearMonth),
            "unknown" => DataType::Null,
            "varchar" | "char" => {
                if self.eat('(') {
                    self.number()?;
                    if !self.eat(')') {
                        return None;
                    }
                } else if name == "char" {
                    return None;
                }
                DataType::Utf8
            }
            "decimal" => {
                if !self.eat('(') {
                    return None;
                }
                let precision = u8::try_from(self.number()?).ok()?;
                let scale = if self.eat(',') {
                    i8::try_from(self.number()?).ok()?
                } else {
                    0
                };
                if !self.eat(')')
                    || precision == 0
                    || precision > MAX_DECIMAL_PRECISION
                    || scale < 0
                    || scale as u8 > precision
                {
                    return None;
                }
                DataType::Decimal128(precision, scale)
            }
            "array" => {
                if !self.eat('(') {
                    return None;
                }
                let item = self.parse()?;
                if !self.eat(')') {
                    return None;
                }
                list_of(item)
            }
            "map" => {
                if !self.eat('(') {
                    return None;
                }
                let key = self.parse()?;
                if !self.eat(',') {
                    return None;
                }
                let value = self.parse()?;
                if !self.eat(')') {
                    return None;
                }
                map_of(key, value)
            }
            "row" => {
                if !self.eat('(') {
                    return None;
                }
                let mut fields = Vec::new();
                loop {
                    fields.push(self.row_field(fields.len())?);
                    if self.eat(')') {
                        break;
                    }
                    if !self.eat(',') {
                        return None;
                    }
                }
                DataType::Struct(Fields::from(fields))
            }
            _ => return None,
        };
        Some(ty)
    }

    /// One `row` field: `name type`, `"quoted name" type` or an anonymous `type`.
    fn row_field(&mut self, index: usize) -> Option<Field> {
        self.skip_ws();
        if self.rest().starts_with('"') {
            let closing = self.rest()[1..].find('"')?;
            let name = self.rest()[1..=closing].to_string();
            self.pos += closing + 2;
            let ty = self.parse()?;
            return Some(Field::new(name, ty, true));
        }

        let word_len = self
            .rest()
            .find(|c: char| c.is_whitespace() || matches!(c, '(' | ')' | ','))
            .unwrap_or(self.rest().len());
        let after_word = self.rest()[word_len..].trim_start();
        let named = word_len > 0
            && self.rest()[word_len..].starts_with(char::is_whitespace)
            && !after_word.starts_with([',', ')', '('])
            && !after_word.is_empty();

        if named {
            let name = self.rest()[..word_len].to_string();
            let checkpoint = self.pos;
            self.pos += word_len;
            if let Some(ty) = self.parse() {
                return Some(Field::new(name, ty, true));
            }
            // multi-word anonymous type such as `double precision`
            self.pos = checkpoint;
        }
        let ty = self.parse()?;
        Some(Field::new(format!("field{index}"), ty, true))
    }
}

#[cfg(test)]
mod tests {
    use arrow_schema::{DataType, TimeUnit};
    use nexec_common::NexecError;
    use nexec_protocol::VariableReference;

    use super::{parse_type, row_type, type_signature};

    #[test]
    fn parses_primitives() {
        assert_eq!(parse_type("bigint").unwrap(), DataType::Int64);
        assert_eq!(parse_type("INTEGER").unwrap(), DataType::Int32);
        assert_eq!(parse_type("varchar(25)").unwrap(), DataType::Utf8);
        assert_eq!(parse_type("char(3)").unwrap(), DataType::Utf8);
        assert_eq!(parse_type("decimal(12, 2)").unwrap(), DataType::Decimal128(12, 2));
        assert_eq!(
            parse_type("timestamp").unwrap(),
            DataType::Timestamp(TimeUnit::Millisecond, None)
        );
        assert_eq!(
            parse_type("interval  day to second").unwrap(),
            DataType::Duration(TimeUnit::Millisecond)
        );
    }

    #[test]
    fn parses_nested_types() {
        let ty = parse_type("map(varchar,array(row(a bigint,\"b c\" double)))").unwrap();
        assert_eq!(
            type_signature(&ty),
            "map(varchar,array(row(a bigint,b c double)))"
        );

        let anonymous = parse_type("row(bigint, varchar)").unwrap();
        let DataType::Struct(fields) = anonymous else {
            panic!("expected struct");
        };
        assert_eq!(fields[0].name(), "field0");
        assert_eq!(fields[1].data_type(), &DataType::Utf8);
    }

    #[test]
    fn unsupported_types_name_the_signature() {
        for sig in [
            "hyperloglog",
            "decimal(40,2)",
            "decimal(5,6)",
            "array(json)",
            "map(bigint)",
            "bigint)",
            "char",
        ] {
            match parse_type(sig) {
                Err(NexecError::UnsupportedType(s)) => assert_eq!(s, sig),
                other => panic!("{sig}: expected UnsupportedType, got {other:?}"),
            }
        }
    }

    #[test]
    fn maps_row_type_in_order() {
        let schema = row_type(&[
            VariableReference::new("regionkey", "bigint"),
            VariableReference::new("name", "varchar(25)"),
        ])
        .unwrap();
        assert_eq!(schema.fields().len(), 2);
        assert_eq!(schema.field(0).name(), "regionkey");
        assert_eq!(schema.field(1).data_type(), &DataType::Utf8);
    }
}

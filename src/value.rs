//! Canonical data types and runtime values (spec section 3).
//!
//! Unlike the teacher's `Value`, which is an `Rc`/`Arc`-backed enum shared
//! across a whole evaluation stack, values here are short-lived: they exist
//! only while the front end evaluates literal expressions (for `INSERT`
//! defaults and literal folding) before a kernel is generated. Once a kernel
//! exists, all comparisons happen as generated C, not as `Value` arithmetic.

use std::fmt;

use crate::error::{Error, Result};

/// A column's declared type. `Varchar(n)` carries its fixed maximum length;
/// `Text` is a fixed large bound (spec section 3 suggests 4096).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Int32,
    Float64,
    Bool,
    Date,
    Varchar(u16),
    Text,
}

/// Fixed bound used for the `Text` type, per spec section 3.
pub const TEXT_BOUND: u16 = 4096;

impl DataType {
    /// Width, in bytes, of a value of this type as stored in a record.
    /// `Varchar(n)` and `Text` reserve `n+1`/`TEXT_BOUND+1` bytes for the
    /// stored characters plus the terminating nul the spec's on-disk form
    /// preserves.
    pub fn byte_width(self) -> usize {
        match self {
            DataType::Int32 => 4,
            DataType::Float64 => 8,
            DataType::Bool => 1,
            DataType::Date => 8, // Unix seconds, stored as i64
            DataType::Varchar(n) => n as usize + 1,
            DataType::Text => TEXT_BOUND as usize + 1,
        }
    }

    /// The C type used for this column in generated kernel/page source.
    pub fn c_type(self) -> &'static str {
        match self {
            DataType::Int32 => "int32_t",
            DataType::Float64 => "double",
            DataType::Bool => "uint8_t",
            DataType::Date => "int64_t",
            DataType::Varchar(_) | DataType::Text => "char",
        }
    }

    /// True if two values of this type may be compared with `<`, `<=`, `>`,
    /// `>=` (spec section 4.4: "string compared only by `=` / `!=`").
    pub fn ordered(self) -> bool {
        !matches!(self, DataType::Varchar(_) | DataType::Text)
    }

    pub fn is_string(self) -> bool {
        matches!(self, DataType::Varchar(_) | DataType::Text)
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, DataType::Int32 | DataType::Float64 | DataType::Date)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Int32 => write!(f, "INT"),
            DataType::Float64 => write!(f, "FLOAT"),
            DataType::Bool => write!(f, "BOOL"),
            DataType::Date => write!(f, "DATE"),
            DataType::Varchar(n) => write!(f, "VARCHAR({n})"),
            DataType::Text => write!(f, "TEXT"),
        }
    }
}

/// A literal/evaluated value, used while the front end folds constant
/// expressions (INSERT values, DEFAULT literals) prior to kernel synthesis.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int32(i32),
    Float64(f64),
    Bool(bool),
    Date(i64),
    Str(String),
    Null,
}

impl Value {
    /// The per-type sentinel value used in place of a null bitmap (spec
    /// section 3: "nulls are represented by sentinel values per type").
    pub fn sentinel(t: DataType) -> Value {
        match t {
            DataType::Int32 => Value::Int32(0),
            DataType::Float64 => Value::Float64(0.0),
            DataType::Bool => Value::Bool(false),
            DataType::Date => Value::Date(0),
            DataType::Varchar(_) | DataType::Text => Value::Str(String::new()),
        }
    }

    /// Coerce this value (as produced by the parser/evaluator) so it can be
    /// stored in a column of type `t`, rejecting mismatches.
    pub fn coerce(self, t: DataType) -> Result<Value> {
        if matches!(self, Value::Null) {
            return Ok(Value::sentinel(t));
        }
        let ok = match (&self, t) {
            (Value::Int32(_), DataType::Int32) => true,
            (Value::Int32(_), DataType::Date) => true,
            (Value::Date(_), DataType::Date) => true,
            (Value::Float64(_), DataType::Float64) => true,
            (Value::Int32(_), DataType::Float64) => true,
            (Value::Bool(_), DataType::Bool) => true,
            (Value::Str(s), DataType::Varchar(n)) => s.len() <= n as usize,
            (Value::Str(s), DataType::Text) => s.len() <= TEXT_BOUND as usize,
            _ => false,
        };
        if !ok {
            return Err(Error::TypeMismatch(format!(
                "cannot store {:?} in column of type {t}",
                self
            )));
        }
        Ok(match (self, t) {
            (Value::Int32(v), DataType::Date) => Value::Date(v as i64),
            (Value::Int32(v), DataType::Float64) => Value::Float64(v as f64),
            (v, _) => v,
        })
    }

    pub fn data_type(&self) -> Option<DataType> {
        match self {
            Value::Int32(_) => Some(DataType::Int32),
            Value::Float64(_) => Some(DataType::Float64),
            Value::Bool(_) => Some(DataType::Bool),
            Value::Date(_) => Some(DataType::Date),
            Value::Str(_) => None, // width depends on the target column
            Value::Null => None,
        }
    }

    /// Render this value as a C literal suitable for a static array
    /// initializer in generated page source.
    pub fn c_literal(&self, t: DataType) -> String {
        match self {
            Value::Int32(v) => v.to_string(),
            Value::Float64(v) => format!("{v:?}"),
            Value::Bool(v) => if *v { "1".to_string() } else { "0".to_string() },
            Value::Date(v) => v.to_string(),
            Value::Str(s) => c_string_initializer(s),
            Value::Null => Value::sentinel(t).c_literal(t),
        }
    }
}

/// Render a quoted, escaped C string literal. When used to initialize a
/// fixed-size `char[]` array, C zero-pads the remaining bytes itself, which
/// is exactly the "zero-value strings" null sentinel spec section 3 wants.
pub fn c_string_initializer(s: &str) -> String {
    let mut out = String::with_capacity(s.len() * 2 + 2);
    out.push('"');
    for b in s.bytes() {
        match b {
            b'"' => out.push_str("\\\""),
            b'\\' => out.push_str("\\\\"),
            0x20..=0x7e => out.push(b as char),
            _ => out.push_str(&format!("\\x{b:02x}")),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinel_matches_type() {
        assert_eq!(Value::sentinel(DataType::Int32), Value::Int32(0));
        assert_eq!(Value::sentinel(DataType::Varchar(8)), Value::Str(String::new()));
    }

    #[test]
    fn coerce_rejects_oversize_varchar() {
        let v = Value::Str("way too long".into());
        assert!(v.coerce(DataType::Varchar(3)).is_err());
    }

    #[test]
    fn coerce_widens_int_to_float() {
        let v = Value::Int32(7).coerce(DataType::Float64).unwrap();
        assert_eq!(v, Value::Float64(7.0));
    }
}

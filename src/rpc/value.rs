//! RPC value model
//!
//! [`Value`] is the dynamic value carried in calls and responses, and
//! [`TypeTag`] names its wire type. The set is closed: every value has
//! exactly one tag, and `int` and `double` are never interchangeable.

use crate::error::RpcError;
use chrono::NaiveDateTime;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Wire format used for `dateTime.iso8601` values
pub const DATETIME_FORMAT: &str = "%Y%m%dT%H:%M:%S";

/// Wire type of a [`Value`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeTag {
    Int,
    Double,
    String,
    Boolean,
    Array,
    Struct,
    Base64,
    DateTime,
}

impl TypeTag {
    /// Every tag, in the order the wire format documents them
    pub const ALL: [TypeTag; 8] = [
        TypeTag::Int,
        TypeTag::Double,
        TypeTag::String,
        TypeTag::Boolean,
        TypeTag::Array,
        TypeTag::Struct,
        TypeTag::Base64,
        TypeTag::DateTime,
    ];

    /// The tag name as it appears in signatures and on the wire
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            TypeTag::Int => "int",
            TypeTag::Double => "double",
            TypeTag::String => "string",
            TypeTag::Boolean => "boolean",
            TypeTag::Array => "array",
            TypeTag::Struct => "struct",
            TypeTag::Base64 => "base64",
            TypeTag::DateTime => "dateTime.iso8601",
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TypeTag {
    type Err = RpcError;

    /// Accepts the canonical names plus the `i4`/`i8` aliases for `int`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "int" | "i4" | "i8" => Ok(TypeTag::Int),
            "double" => Ok(TypeTag::Double),
            "string" => Ok(TypeTag::String),
            "boolean" => Ok(TypeTag::Boolean),
            "array" => Ok(TypeTag::Array),
            "struct" => Ok(TypeTag::Struct),
            "base64" => Ok(TypeTag::Base64),
            "dateTime.iso8601" => Ok(TypeTag::DateTime),
            other => Err(RpcError::Configuration(format!("unknown type tag '{other}'"))),
        }
    }
}

/// A dynamically typed RPC value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Double(f64),
    String(String),
    Boolean(bool),
    Array(Vec<Value>),
    Struct(BTreeMap<String, Value>),
    Base64(Vec<u8>),
    DateTime(NaiveDateTime),
}

impl Value {
    #[must_use]
    pub fn type_tag(&self) -> TypeTag {
        match self {
            Value::Int(_) => TypeTag::Int,
            Value::Double(_) => TypeTag::Double,
            Value::String(_) => TypeTag::String,
            Value::Boolean(_) => TypeTag::Boolean,
            Value::Array(_) => TypeTag::Array,
            Value::Struct(_) => TypeTag::Struct,
            Value::Base64(_) => TypeTag::Base64,
            Value::DateTime(_) => TypeTag::DateTime,
        }
    }

    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Double(n) => Some(*n),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_struct(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Struct(members) => Some(members),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Base64(bytes) => Some(bytes),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_datetime(&self) -> Option<&NaiveDateTime> {
        match self {
            Value::DateTime(dt) => Some(dt),
            _ => None,
        }
    }

    /// Whether every `double` in the value is finite
    ///
    /// NaN and the infinities have no `<double>` representation.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        match self {
            Value::Double(n) => n.is_finite(),
            Value::Array(items) => items.iter().all(Value::is_finite),
            Value::Struct(members) => members.values().all(Value::is_finite),
            _ => true,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(n) => write!(f, "{n}"),
            Value::Double(n) => write!(f, "{n}"),
            Value::String(s) => write!(f, "{s:?}"),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Value::Struct(members) => {
                f.write_str("{")?;
                for (i, (name, member)) in members.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{name:?}: {member}")?;
                }
                f.write_str("}")
            }
            Value::Base64(bytes) => write!(f, "<{} bytes>", bytes.len()),
            Value::DateTime(dt) => write!(f, "{}", dt.format(DATETIME_FORMAT)),
        }
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(i64::from(n))
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Double(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(members: BTreeMap<String, Value>) -> Self {
        Value::Struct(members)
    }
}

impl From<&[u8]> for Value {
    fn from(bytes: &[u8]) -> Self {
        Value::Base64(bytes.to_vec())
    }
}

impl From<NaiveDateTime> for Value {
    fn from(dt: NaiveDateTime) -> Self {
        Value::DateTime(dt)
    }
}

fn type_mismatch(expected: TypeTag, got: &Value) -> RpcError {
    RpcError::BadResponse(format!("expected {expected}, got {}", got.type_tag()))
}

macro_rules! impl_try_from_value {
    ($target:ty, $tag:expr, $pattern:pat => $out:expr) => {
        impl TryFrom<Value> for $target {
            type Error = RpcError;

            fn try_from(value: Value) -> Result<Self, Self::Error> {
                match value {
                    $pattern => Ok($out),
                    other => Err(type_mismatch($tag, &other)),
                }
            }
        }
    };
}

impl_try_from_value!(i64, TypeTag::Int, Value::Int(n) => n);
impl_try_from_value!(f64, TypeTag::Double, Value::Double(n) => n);
impl_try_from_value!(bool, TypeTag::Boolean, Value::Boolean(b) => b);
impl_try_from_value!(String, TypeTag::String, Value::String(s) => s);
impl_try_from_value!(Vec<Value>, TypeTag::Array, Value::Array(items) => items);
impl_try_from_value!(BTreeMap<String, Value>, TypeTag::Struct, Value::Struct(m) => m);
impl_try_from_value!(NaiveDateTime, TypeTag::DateTime, Value::DateTime(dt) => dt);

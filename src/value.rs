//! The reply value data model (SPEC_FULL.md §3) and the typed-narrowing conversion
//! traits referenced in §4.6 / §10.5.

use crate::error::{Error, Result, ServerError};
use std::collections::HashMap;

/// An arbitrary-precision integer, decoded from a RESP3 `(` frame. Kept as its raw decimal
/// text since the core has no bignum type of its own; callers that need arithmetic on it
/// parse the text with whatever bignum crate they already depend on.
pub type BigNumber = String;

/// A tagged reply value, recursive in all aggregate variants. Mirrors the RESP2/RESP3 grammar
/// decoded by [`crate::protocol::resp`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    BigNumber(BigNumber),
    SimpleString(String),
    /// A RESP3 verbatim string with its 3-char content-type hint already stripped.
    VerbatimString(Vec<u8>),
    BulkString(Vec<u8>),
    Boolean(bool),
    Double(f64),
    Error(ServerError),
    Array(Vec<Value>),
    /// A RESP3 map, order of arrival preserved.
    Map(Vec<(Value, Value)>),
    /// A RESP3 set.
    Set(Vec<Value>),
    /// A RESP3 attribute envelope: the attribute map plus the value it is attached to.
    Attribute {
        attributes: Vec<(Value, Value)>,
        value: Box<Value>,
    },
}

impl Value {
    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Borrow the bulk/simple/verbatim string content as bytes, if this value holds one.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::BulkString(b) | Value::VerbatimString(b) => Some(b),
            Value::SimpleString(s) => Some(s.as_bytes()),
            _ => None,
        }
    }

    /// Interpret this value's string content as UTF-8, if possible. Uses `simdutf8` for the
    /// validation pass since reply payloads are frequently on the hot path.
    pub fn as_str(&self) -> Option<&str> {
        let bytes = self.as_bytes()?;
        simdutf8::basic::from_utf8(bytes).ok()
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::BulkString(_) | Value::SimpleString(_) => self.as_str()?.parse().ok(),
            _ => None,
        }
    }

    /// Unwrap an [`Value::Attribute`] envelope down to its carried value, leaving any other
    /// variant untouched. Most callers that narrow a reply don't care about attributes.
    pub fn strip_attribute(self) -> Value {
        match self {
            Value::Attribute { value, .. } => value.strip_attribute(),
            other => other,
        }
    }
}

/// Narrows a generic [`Value`] into a concrete Rust type, the mechanism behind
/// SPEC_FULL.md §4.6's per-command return-type narrowing. Implemented for the primitives and
/// for `Option<T>` (nil-safe) and `Vec<T>` (array-of-T).
pub trait FromValue: Sized {
    fn from_value(value: Value) -> Result<Self>;
}

impl FromValue for Value {
    fn from_value(value: Value) -> Result<Self> {
        Ok(value)
    }
}

impl FromValue for () {
    fn from_value(value: Value) -> Result<Self> {
        match value.strip_attribute() {
            Value::Error(e) => Err(e.into()),
            _ => Ok(()),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> Result<Self> {
        match value.strip_attribute() {
            Value::Null => Ok(None),
            Value::Error(e) => Err(e.into()),
            other => Ok(Some(T::from_value(other)?)),
        }
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(value: Value) -> Result<Self> {
        match value.strip_attribute() {
            Value::Array(items) | Value::Set(items) => {
                items.into_iter().map(T::from_value).collect()
            }
            Value::Error(e) => Err(e.into()),
            other => Err(Error::TypeMismatch(other)),
        }
    }
}

impl FromValue for i64 {
    fn from_value(value: Value) -> Result<Self> {
        let stripped = value.strip_attribute();
        match &stripped {
            Value::Integer(i) => Ok(*i),
            Value::BulkString(_) | Value::SimpleString(_) => {
                stripped.as_i64().ok_or_else(|| Error::TypeMismatch(stripped.clone()))
            }
            Value::Error(e) => Err(e.clone().into()),
            _ => Err(Error::TypeMismatch(stripped)),
        }
    }
}

impl FromValue for f64 {
    fn from_value(value: Value) -> Result<Self> {
        let stripped = value.strip_attribute();
        match &stripped {
            Value::Double(d) => Ok(*d),
            Value::BulkString(b) | Value::VerbatimString(b) => simdutf8::basic::from_utf8(b)
                .ok()
                .and_then(parse_double)
                .ok_or_else(|| Error::TypeMismatch(stripped.clone())),
            Value::SimpleString(s) => {
                parse_double(s).ok_or_else(|| Error::TypeMismatch(stripped.clone()))
            }
            Value::Error(e) => Err(e.clone().into()),
            _ => Err(Error::TypeMismatch(stripped)),
        }
    }
}

impl FromValue for bool {
    fn from_value(value: Value) -> Result<Self> {
        match value.strip_attribute() {
            Value::Boolean(b) => Ok(b),
            Value::Integer(i) => Ok(i != 0),
            Value::SimpleString(ref s) if s == "OK" => Ok(true),
            Value::Error(e) => Err(e.into()),
            other => Err(Error::TypeMismatch(other)),
        }
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> Result<Self> {
        match value.strip_attribute() {
            Value::BulkString(b) | Value::VerbatimString(b) => {
                String::from_utf8(b).map_err(|e| Error::from_debug(e))
            }
            Value::SimpleString(s) => Ok(s),
            Value::Integer(i) => Ok(i.to_string()),
            Value::Error(e) => Err(e.into()),
            other => Err(Error::TypeMismatch(other)),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: Value) -> Result<Self> {
        match value.strip_attribute() {
            Value::BulkString(b) | Value::VerbatimString(b) => Ok(b),
            Value::SimpleString(s) => Ok(s.into_bytes()),
            Value::Error(e) => Err(e.into()),
            other => Err(Error::TypeMismatch(other)),
        }
    }
}

impl FromValue for HashMap<String, String> {
    fn from_value(value: Value) -> Result<Self> {
        match value.strip_attribute() {
            Value::Map(pairs) => pairs
                .into_iter()
                .map(|(k, v)| Ok((String::from_value(k)?, String::from_value(v)?)))
                .collect(),
            Value::Array(items) => {
                let mut map = HashMap::with_capacity(items.len() / 2);
                let mut it = items.into_iter();
                while let (Some(k), Some(v)) = (it.next(), it.next()) {
                    map.insert(String::from_value(k)?, String::from_value(v)?);
                }
                Ok(map)
            }
            Value::Error(e) => Err(e.into()),
            other => Err(Error::TypeMismatch(other)),
        }
    }
}

fn parse_double(s: &str) -> Option<f64> {
    match s {
        "inf" | "+inf" | "Inf" | "+Inf" => Some(f64::INFINITY),
        "-inf" | "-Inf" => Some(f64::NEG_INFINITY),
        "nan" | "NaN" => Some(f64::NAN),
        _ => s.parse().ok(),
    }
}

/// Converts a Rust value into the byte-string command arguments it contributes
/// (SPEC_FULL.md §10.5's `ToRedisArgs`-style trait, grounded on `redis-rs`'s conversion
/// idiom referenced by the pipeline file in the examples pack).
pub trait ToArgs {
    fn write_args(&self, out: &mut Vec<Vec<u8>>);
}

impl ToArgs for &str {
    fn write_args(&self, out: &mut Vec<Vec<u8>>) {
        out.push(self.as_bytes().to_vec());
    }
}

impl ToArgs for String {
    fn write_args(&self, out: &mut Vec<Vec<u8>>) {
        out.push(self.as_bytes().to_vec());
    }
}

impl ToArgs for &[u8] {
    fn write_args(&self, out: &mut Vec<Vec<u8>>) {
        out.push(self.to_vec());
    }
}

impl ToArgs for Vec<u8> {
    fn write_args(&self, out: &mut Vec<Vec<u8>>) {
        out.push(self.clone());
    }
}

macro_rules! impl_to_args_for_display {
    ($($ty:ty),*) => {
        $(
            impl ToArgs for $ty {
                fn write_args(&self, out: &mut Vec<Vec<u8>>) {
                    out.push(self.to_string().into_bytes());
                }
            }
        )*
    };
}

impl_to_args_for_display!(i64, i32, u64, u32, usize, f64, f32);

impl<T: ToArgs> ToArgs for &T {
    fn write_args(&self, out: &mut Vec<Vec<u8>>) {
        (*self).write_args(out);
    }
}

impl<T: ToArgs> ToArgs for [T] {
    fn write_args(&self, out: &mut Vec<Vec<u8>>) {
        for item in self {
            item.write_args(out);
        }
    }
}

impl ToArgs for &[&str] {
    fn write_args(&self, out: &mut Vec<Vec<u8>>) {
        for item in self.iter() {
            item.write_args(out);
        }
    }
}

impl ToArgs for &[&[u8]] {
    fn write_args(&self, out: &mut Vec<Vec<u8>>) {
        for item in self.iter() {
            item.write_args(out);
        }
    }
}

impl<T: ToArgs> ToArgs for Vec<T> {
    fn write_args(&self, out: &mut Vec<Vec<u8>>) {
        self.as_slice().write_args(out);
    }
}

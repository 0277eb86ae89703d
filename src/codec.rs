//! Bidirectional typed binary codec for broker payloads.
//!
//! Broker records carry opaque byte buffers for keys and values; flows work
//! with semantic values. This module converts between the two in both
//! directions over a fixed catalog of target types: JSON documents, text,
//! booleans, signed and unsigned integers of 1/2/4/8 bytes in both byte
//! orders, and 32-/64-bit IEEE-754 floats in both byte orders.
//!
//! Two contracts coexist:
//!
//! - **Strict**: [`decode`] and [`encode`] return a [`ConversionError`] when a
//!   buffer is undersized, a document is malformed, or a value cannot be
//!   represented in the target width.
//! - **Lenient**: [`decode_lenient`] preserves the historical soft-fail
//!   behavior — on any conversion failure the condition is logged and the
//!   original buffer is returned unchanged. Callers distinguish failure from
//!   success only by checking whether the result is still raw bytes.
//!
//! Symmetry holds for every fixed-width type `T` and byte order `O`:
//! `decode(encode(v, T_O), T_O) == v` for all `v` representable in `T`, and
//! `encode(decode(b, T_O), T_O) == b` for all `b` of the correct width. JSON
//! round-trips up to structural equality; text round-trips for valid UTF-8.

use bytes::Bytes;
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use tracing::warn;

use crate::error::{ConversionError, SelectorError};

/// Byte order for multi-byte numeric conversions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ByteOrder {
  /// Most significant byte first.
  Big,
  /// Least significant byte first.
  Little,
}

/// Target type for a key or value conversion.
///
/// Replaces the free-form string selectors of the original configuration
/// surface with a closed enum, so an invalid tag is rejected at the
/// configuration boundary instead of at message time. The original selector
/// strings (`json`, `string`, `boolean`, `int16be`, `doublele`, ...) still
/// parse via [`FromStr`] and serde.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(try_from = "String")]
pub enum ValueType {
  /// No conversion; buffers and scalars pass through unchanged.
  #[default]
  Raw,
  /// UTF-8 encoded JSON document.
  Json,
  /// UTF-8 text.
  Text,
  /// Single byte, non-zero meaning true.
  Bool,
  /// Signed 8-bit integer.
  Int8,
  /// Signed 16-bit integer at the given byte order.
  Int16(ByteOrder),
  /// Signed 32-bit integer at the given byte order.
  Int32(ByteOrder),
  /// Signed 64-bit integer at the given byte order.
  Int64(ByteOrder),
  /// Unsigned 8-bit integer.
  UInt8,
  /// Unsigned 16-bit integer at the given byte order.
  UInt16(ByteOrder),
  /// Unsigned 32-bit integer at the given byte order.
  UInt32(ByteOrder),
  /// Unsigned 64-bit integer at the given byte order.
  UInt64(ByteOrder),
  /// IEEE-754 single-precision float at the given byte order.
  Float32(ByteOrder),
  /// IEEE-754 double-precision float at the given byte order.
  Float64(ByteOrder),
}

impl ValueType {
  /// Fixed width in bytes, or `None` for variable-length and pass-through
  /// types.
  pub const fn width(self) -> Option<usize> {
    match self {
      ValueType::Raw | ValueType::Json | ValueType::Text => None,
      ValueType::Bool | ValueType::Int8 | ValueType::UInt8 => Some(1),
      ValueType::Int16(_) | ValueType::UInt16(_) => Some(2),
      ValueType::Int32(_) | ValueType::UInt32(_) | ValueType::Float32(_) => Some(4),
      ValueType::Int64(_) | ValueType::UInt64(_) | ValueType::Float64(_) => Some(8),
    }
  }
}

impl fmt::Display for ValueType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let (base, order) = match self {
      ValueType::Raw => return write!(f, "raw"),
      ValueType::Json => return write!(f, "json"),
      ValueType::Text => return write!(f, "string"),
      ValueType::Bool => return write!(f, "boolean"),
      ValueType::Int8 => return write!(f, "int8"),
      ValueType::UInt8 => return write!(f, "uint8"),
      ValueType::Int16(o) => ("int16", o),
      ValueType::Int32(o) => ("int32", o),
      ValueType::Int64(o) => ("int64", o),
      ValueType::UInt16(o) => ("uint16", o),
      ValueType::UInt32(o) => ("uint32", o),
      ValueType::UInt64(o) => ("uint64", o),
      ValueType::Float32(o) => ("float", o),
      ValueType::Float64(o) => ("double", o),
    };
    let suffix = match order {
      ByteOrder::Big => "be",
      ByteOrder::Little => "le",
    };
    write!(f, "{base}{suffix}")
  }
}

impl FromStr for ValueType {
  type Err = SelectorError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    use ByteOrder::{Big, Little};
    Ok(match s {
      "raw" => ValueType::Raw,
      "json" => ValueType::Json,
      "string" => ValueType::Text,
      "boolean" => ValueType::Bool,
      "int8" => ValueType::Int8,
      "int16be" => ValueType::Int16(Big),
      "int16le" => ValueType::Int16(Little),
      "int32be" => ValueType::Int32(Big),
      "int32le" => ValueType::Int32(Little),
      "int64be" => ValueType::Int64(Big),
      "int64le" => ValueType::Int64(Little),
      "uint8" => ValueType::UInt8,
      "uint16be" => ValueType::UInt16(Big),
      "uint16le" => ValueType::UInt16(Little),
      "uint32be" => ValueType::UInt32(Big),
      "uint32le" => ValueType::UInt32(Little),
      "uint64be" => ValueType::UInt64(Big),
      "uint64le" => ValueType::UInt64(Little),
      "floatbe" => ValueType::Float32(Big),
      "floatle" => ValueType::Float32(Little),
      "doublebe" => ValueType::Float64(Big),
      "doublele" => ValueType::Float64(Little),
      other => {
        return Err(SelectorError {
          what: "value type",
          value: other.to_string(),
        });
      }
    })
  }
}

impl TryFrom<String> for ValueType {
  type Error = SelectorError;

  fn try_from(value: String) -> Result<Self, Self::Error> {
    value.parse()
  }
}

/// A semantic value on either side of the codec.
///
/// `Bytes` is the undecoded form; everything else is a decoded value ready
/// for a flow, or a flow value waiting to be encoded for the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedValue {
  /// Raw, undecoded bytes.
  Bytes(Bytes),
  /// A structured JSON document.
  Json(Value),
  /// A character string.
  Text(String),
  /// A boolean.
  Bool(bool),
  /// Signed 8-bit integer.
  Int8(i8),
  /// Signed 16-bit integer.
  Int16(i16),
  /// Signed 32-bit integer.
  Int32(i32),
  /// Signed 64-bit integer.
  Int64(i64),
  /// Unsigned 8-bit integer.
  UInt8(u8),
  /// Unsigned 16-bit integer.
  UInt16(u16),
  /// Unsigned 32-bit integer.
  UInt32(u32),
  /// Unsigned 64-bit integer.
  UInt64(u64),
  /// Single-precision float.
  Float32(f32),
  /// Double-precision float.
  Float64(f64),
}

impl TypedValue {
  /// Returns true when the value is still raw bytes.
  pub const fn is_bytes(&self) -> bool {
    matches!(self, TypedValue::Bytes(_))
  }

  /// Borrows the raw buffer, if this value is one.
  pub const fn as_bytes(&self) -> Option<&Bytes> {
    match self {
      TypedValue::Bytes(bytes) => Some(bytes),
      _ => None,
    }
  }

  /// Variant name for error reporting.
  pub const fn kind(&self) -> &'static str {
    match self {
      TypedValue::Bytes(_) => "bytes",
      TypedValue::Json(_) => "json",
      TypedValue::Text(_) => "string",
      TypedValue::Bool(_) => "boolean",
      TypedValue::Int8(_) => "int8",
      TypedValue::Int16(_) => "int16",
      TypedValue::Int32(_) => "int32",
      TypedValue::Int64(_) => "int64",
      TypedValue::UInt8(_) => "uint8",
      TypedValue::UInt16(_) => "uint16",
      TypedValue::UInt32(_) => "uint32",
      TypedValue::UInt64(_) => "uint64",
      TypedValue::Float32(_) => "float",
      TypedValue::Float64(_) => "double",
    }
  }

  /// Widens any integer variant, preserving the sign.
  fn as_i128(&self) -> Option<i128> {
    match self {
      TypedValue::Int8(n) => Some(i128::from(*n)),
      TypedValue::Int16(n) => Some(i128::from(*n)),
      TypedValue::Int32(n) => Some(i128::from(*n)),
      TypedValue::Int64(n) => Some(i128::from(*n)),
      TypedValue::UInt8(n) => Some(i128::from(*n)),
      TypedValue::UInt16(n) => Some(i128::from(*n)),
      TypedValue::UInt32(n) => Some(i128::from(*n)),
      TypedValue::UInt64(n) => Some(i128::from(*n)),
      _ => None,
    }
  }

  /// Widens any numeric variant to a double.
  fn as_f64(&self) -> Option<f64> {
    match self {
      TypedValue::Float32(f) => Some(f64::from(*f)),
      TypedValue::Float64(f) => Some(*f),
      other => other.as_i128().map(|n| n as f64),
    }
  }

  /// Truthiness used for boolean encoding, mirroring the permissive coercion
  /// of the original implementation.
  fn is_truthy(&self) -> bool {
    match self {
      TypedValue::Bytes(b) => !b.is_empty(),
      TypedValue::Json(v) => !(v.is_null() || *v == Value::Bool(false)),
      TypedValue::Text(s) => !s.is_empty(),
      TypedValue::Bool(b) => *b,
      TypedValue::Int8(n) => *n != 0,
      TypedValue::Int16(n) => *n != 0,
      TypedValue::Int32(n) => *n != 0,
      TypedValue::Int64(n) => *n != 0,
      TypedValue::UInt8(n) => *n != 0,
      TypedValue::UInt16(n) => *n != 0,
      TypedValue::UInt32(n) => *n != 0,
      TypedValue::UInt64(n) => *n != 0,
      TypedValue::Float32(f) => *f != 0.0,
      TypedValue::Float64(f) => *f != 0.0,
    }
  }

  /// Converts to a JSON document for the `json` encoding leg.
  pub fn to_json(&self) -> Value {
    match self {
      TypedValue::Bytes(b) => Value::String(String::from_utf8_lossy(b).into_owned()),
      TypedValue::Json(v) => v.clone(),
      TypedValue::Text(s) => Value::String(s.clone()),
      TypedValue::Bool(b) => Value::Bool(*b),
      TypedValue::Int8(n) => Value::from(*n),
      TypedValue::Int16(n) => Value::from(*n),
      TypedValue::Int32(n) => Value::from(*n),
      TypedValue::Int64(n) => Value::from(*n),
      TypedValue::UInt8(n) => Value::from(*n),
      TypedValue::UInt16(n) => Value::from(*n),
      TypedValue::UInt32(n) => Value::from(*n),
      TypedValue::UInt64(n) => Value::from(*n),
      TypedValue::Float32(f) => Value::from(*f),
      TypedValue::Float64(f) => Value::from(*f),
    }
  }
}

impl fmt::Display for TypedValue {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      TypedValue::Bytes(b) => write!(f, "{}", String::from_utf8_lossy(b)),
      TypedValue::Json(v) => write!(f, "{v}"),
      TypedValue::Text(s) => write!(f, "{s}"),
      TypedValue::Bool(b) => write!(f, "{b}"),
      TypedValue::Int8(n) => write!(f, "{n}"),
      TypedValue::Int16(n) => write!(f, "{n}"),
      TypedValue::Int32(n) => write!(f, "{n}"),
      TypedValue::Int64(n) => write!(f, "{n}"),
      TypedValue::UInt8(n) => write!(f, "{n}"),
      TypedValue::UInt16(n) => write!(f, "{n}"),
      TypedValue::UInt32(n) => write!(f, "{n}"),
      TypedValue::UInt64(n) => write!(f, "{n}"),
      TypedValue::Float32(n) => write!(f, "{n}"),
      TypedValue::Float64(n) => write!(f, "{n}"),
    }
  }
}

impl From<&str> for TypedValue {
  fn from(s: &str) -> Self {
    TypedValue::Text(s.to_string())
  }
}

impl From<String> for TypedValue {
  fn from(s: String) -> Self {
    TypedValue::Text(s)
  }
}

impl From<Value> for TypedValue {
  fn from(v: Value) -> Self {
    TypedValue::Json(v)
  }
}

impl From<Bytes> for TypedValue {
  fn from(b: Bytes) -> Self {
    TypedValue::Bytes(b)
  }
}

impl From<Vec<u8>> for TypedValue {
  fn from(b: Vec<u8>) -> Self {
    TypedValue::Bytes(Bytes::from(b))
  }
}

fn fixed<const N: usize>(ty: ValueType, buf: &Bytes) -> Result<[u8; N], ConversionError> {
  buf.as_ref().try_into().map_err(|_| ConversionError::WidthMismatch {
    ty,
    expected: N,
    actual: buf.len(),
  })
}

macro_rules! decode_num {
  ($buf:expr, $ty:expr, $order:expr, $prim:ty, $variant:ident, $width:literal) => {{
    let raw = fixed::<$width>($ty, &$buf)?;
    TypedValue::$variant(match $order {
      ByteOrder::Big => <$prim>::from_be_bytes(raw),
      ByteOrder::Little => <$prim>::from_le_bytes(raw),
    })
  }};
}

macro_rules! encode_int {
  ($value:expr, $ty:expr, $order:expr, $prim:ty) => {{
    let wide = $value.as_i128().ok_or(ConversionError::Incompatible {
      ty: $ty,
      actual: $value.kind(),
    })?;
    let narrow = <$prim>::try_from(wide).map_err(|_| ConversionError::OutOfRange {
      ty: $ty,
      value: wide.to_string(),
    })?;
    let encoded = match $order {
      ByteOrder::Big => narrow.to_be_bytes().to_vec(),
      ByteOrder::Little => narrow.to_le_bytes().to_vec(),
    };
    TypedValue::Bytes(Bytes::from(encoded))
  }};
}

/// Decodes a raw buffer into the requested target type.
///
/// A value that is not a byte buffer is returned unchanged; this pass-through
/// is a documented permissive behavior at the codec boundary, not an error.
///
/// # Errors
///
/// Returns a [`ConversionError`] when the buffer length does not match the
/// fixed width of the target type, when text is not valid UTF-8, or when a
/// JSON document is malformed.
pub fn decode(value: TypedValue, ty: ValueType) -> Result<TypedValue, ConversionError> {
  use ByteOrder::Big;

  let TypedValue::Bytes(buf) = value else {
    return Ok(value);
  };

  Ok(match ty {
    ValueType::Raw => TypedValue::Bytes(buf),
    ValueType::Json => TypedValue::Json(serde_json::from_slice(&buf)?),
    ValueType::Text => TypedValue::Text(String::from_utf8(buf.to_vec())?),
    ValueType::Bool => TypedValue::Bool(fixed::<1>(ty, &buf)?[0] != 0),
    ValueType::Int8 => decode_num!(buf, ty, Big, i8, Int8, 1),
    ValueType::Int16(o) => decode_num!(buf, ty, o, i16, Int16, 2),
    ValueType::Int32(o) => decode_num!(buf, ty, o, i32, Int32, 4),
    ValueType::Int64(o) => decode_num!(buf, ty, o, i64, Int64, 8),
    ValueType::UInt8 => decode_num!(buf, ty, Big, u8, UInt8, 1),
    ValueType::UInt16(o) => decode_num!(buf, ty, o, u16, UInt16, 2),
    ValueType::UInt32(o) => decode_num!(buf, ty, o, u32, UInt32, 4),
    ValueType::UInt64(o) => decode_num!(buf, ty, o, u64, UInt64, 8),
    ValueType::Float32(o) => decode_num!(buf, ty, o, f32, Float32, 4),
    ValueType::Float64(o) => decode_num!(buf, ty, o, f64, Float64, 8),
  })
}

/// Decodes with the soft-fail compatibility contract.
///
/// On conversion failure the condition is logged at `warn` and the original
/// buffer is returned unchanged, so downstream flows that expect raw bytes
/// when a conversion does not apply keep working. Callers detect the
/// soft-fail by checking [`TypedValue::is_bytes`] on the result.
pub fn decode_lenient(value: TypedValue, ty: ValueType) -> TypedValue {
  if !value.is_bytes() {
    return value;
  }
  match decode(value.clone(), ty) {
    Ok(decoded) => decoded,
    Err(error) => {
      warn!(target_type = %ty, error = %error, "payload conversion failed, passing raw bytes through");
      value
    }
  }
}

/// Encodes a value into a wire buffer of the requested target type.
///
/// A value that is already a byte buffer is returned as-is without
/// re-encoding, and the `raw` target passes any value through unchanged —
/// both are part of the permissive compatibility contract. Fixed-width
/// targets produce a buffer of exactly their width.
///
/// # Errors
///
/// Returns a [`ConversionError`] when the value cannot be represented in the
/// target type, either because the variant is incompatible or because the
/// value is out of range for the fixed width.
pub fn encode(value: TypedValue, ty: ValueType) -> Result<TypedValue, ConversionError> {
  use ByteOrder::Big;

  if value.is_bytes() {
    return Ok(value);
  }

  Ok(match ty {
    ValueType::Raw => value,
    ValueType::Json => TypedValue::Bytes(Bytes::from(serde_json::to_vec(&value.to_json())?)),
    ValueType::Text => TypedValue::Bytes(Bytes::from(value.to_string().into_bytes())),
    ValueType::Bool => TypedValue::Bytes(Bytes::from(vec![u8::from(value.is_truthy())])),
    ValueType::Int8 => encode_int!(value, ty, Big, i8),
    ValueType::Int16(o) => encode_int!(value, ty, o, i16),
    ValueType::Int32(o) => encode_int!(value, ty, o, i32),
    ValueType::Int64(o) => encode_int!(value, ty, o, i64),
    ValueType::UInt8 => encode_int!(value, ty, Big, u8),
    ValueType::UInt16(o) => encode_int!(value, ty, o, u16),
    ValueType::UInt32(o) => encode_int!(value, ty, o, u32),
    ValueType::UInt64(o) => encode_int!(value, ty, o, u64),
    ValueType::Float32(o) => {
      let wide = value.as_f64().ok_or(ConversionError::Incompatible {
        ty,
        actual: value.kind(),
      })?;
      let narrow = wide as f32;
      let encoded = match o {
        ByteOrder::Big => narrow.to_be_bytes().to_vec(),
        ByteOrder::Little => narrow.to_le_bytes().to_vec(),
      };
      TypedValue::Bytes(Bytes::from(encoded))
    }
    ValueType::Float64(o) => {
      let wide = value.as_f64().ok_or(ConversionError::Incompatible {
        ty,
        actual: value.kind(),
      })?;
      let encoded = match o {
        ByteOrder::Big => wide.to_be_bytes().to_vec(),
        ByteOrder::Little => wide.to_le_bytes().to_vec(),
      };
      TypedValue::Bytes(Bytes::from(encoded))
    }
  })
}

//! # Element Types and Byte Codec
//!
//! Every element in the runtime is an opaque byte buffer; the stack that
//! holds it supplies the interpretation through its declared [`ElemType`].
//! This module is the single place where values cross between native Rust
//! scalars and that canonical byte form.
//!
//! ## Encoding
//! Fixed-width types use big-endian layout:
//!
//! ```text
//! +-------+---------------------------------+
//! | Int   | 8 bytes, i64, big-endian        |
//! | Uint  | 8 bytes, u64, big-endian        |
//! | Float | 8 bytes, f64 bit pattern, BE    |
//! | Bool  | 1 byte, 0 or 1                  |
//! | Str   | UTF-8 bytes, no length prefix   |
//! | Bytes | raw bytes                       |
//! +-------+---------------------------------+
//! ```
//!
//! Decoding is strict: a wrong-length buffer, a bool byte other than 0/1,
//! or invalid UTF-8 for `Str` is an [`StackError::Encoding`] fault, never a
//! silent truncation.
//!
//! ## Round trip
//! For every supported type `T` and value `v`, `decode(encode(v)) == v`.
//! NaN floats round-trip by bit pattern.

use std::fmt;

use crate::error::StackError;

/// Declared interpretation of a stack's elements. Fixed at construction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ElemType {
    /// Signed 64-bit integer.
    Int,
    /// Unsigned 64-bit integer.
    Uint,
    /// 64-bit IEEE-754 float.
    Float,
    /// UTF-8 string.
    Str,
    /// Raw bytes, uninterpreted.
    Bytes,
    /// Boolean truth value.
    Bool,
}

impl ElemType {
    /// Encoded size for fixed-width types; `None` for `Str` and `Bytes`.
    pub fn fixed_size(self) -> Option<usize> {
        match self {
            ElemType::Int | ElemType::Uint | ElemType::Float => Some(8),
            ElemType::Bool => Some(1),
            ElemType::Str | ElemType::Bytes => None,
        }
    }
}

impl fmt::Display for ElemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ElemType::Int => "int",
            ElemType::Uint => "uint",
            ElemType::Float => "float",
            ElemType::Str => "str",
            ElemType::Bytes => "bytes",
            ElemType::Bool => "bool",
        };
        f.write_str(name)
    }
}

//
// --- Encoders -------------------------------------------------------------
//

/// Encode a signed integer as 8 big-endian bytes.
pub fn encode_int(v: i64) -> Vec<u8> {
    v.to_be_bytes().to_vec()
}

/// Encode an unsigned integer as 8 big-endian bytes.
pub fn encode_uint(v: u64) -> Vec<u8> {
    v.to_be_bytes().to_vec()
}

/// Encode a float as its 8-byte big-endian bit pattern.
pub fn encode_float(v: f64) -> Vec<u8> {
    v.to_bits().to_be_bytes().to_vec()
}

/// Encode a boolean as a single 0/1 byte.
pub fn encode_bool(v: bool) -> Vec<u8> {
    vec![v as u8]
}

/// Encode a string as its UTF-8 bytes.
pub fn encode_str(v: &str) -> Vec<u8> {
    v.as_bytes().to_vec()
}

//
// --- Decoders -------------------------------------------------------------
//

/// Interpret 8 big-endian bytes as an i64.
pub fn decode_int(b: &[u8]) -> Result<i64, StackError> {
    let bytes: [u8; 8] = b
        .try_into()
        .map_err(|_| StackError::Encoding(ElemType::Int))?;
    Ok(i64::from_be_bytes(bytes))
}

/// Interpret 8 big-endian bytes as a u64.
pub fn decode_uint(b: &[u8]) -> Result<u64, StackError> {
    let bytes: [u8; 8] = b
        .try_into()
        .map_err(|_| StackError::Encoding(ElemType::Uint))?;
    Ok(u64::from_be_bytes(bytes))
}

/// Interpret 8 big-endian bytes as an f64 bit pattern.
pub fn decode_float(b: &[u8]) -> Result<f64, StackError> {
    let bytes: [u8; 8] = b
        .try_into()
        .map_err(|_| StackError::Encoding(ElemType::Float))?;
    Ok(f64::from_bits(u64::from_be_bytes(bytes)))
}

/// Interpret a single 0/1 byte as a bool.
pub fn decode_bool(b: &[u8]) -> Result<bool, StackError> {
    match b {
        [0] => Ok(false),
        [1] => Ok(true),
        _ => Err(StackError::Encoding(ElemType::Bool)),
    }
}

/// Interpret bytes as a UTF-8 string.
pub fn decode_str(b: &[u8]) -> Result<String, StackError> {
    String::from_utf8(b.to_vec()).map_err(|_| StackError::Encoding(ElemType::Str))
}

/// Check that `bytes` is a valid encoding of `ty`.
///
/// Pushed elements are validated once here so that every live element of a
/// stack satisfies the type invariant and decode on the read side cannot
/// fail for well-behaved programs.
pub fn validate(ty: ElemType, bytes: &[u8]) -> Result<(), StackError> {
    match ty {
        ElemType::Int | ElemType::Uint | ElemType::Float => {
            if bytes.len() == 8 {
                Ok(())
            } else {
                Err(StackError::Encoding(ty))
            }
        }
        ElemType::Bool => decode_bool(bytes).map(|_| ()),
        ElemType::Str => std::str::from_utf8(bytes)
            .map(|_| ())
            .map_err(|_| StackError::Encoding(ElemType::Str)),
        ElemType::Bytes => Ok(()),
    }
}

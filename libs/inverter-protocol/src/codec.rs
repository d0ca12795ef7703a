//! Value Codec
//!
//! Pure conversion between raw register words and engineering values.
//! No I/O happens here; the adapter feeds in exactly the words it read.

use serde::Serialize;
use std::fmt;

use crate::error::CodecError;
use crate::register_map::{DecodeKind, RegisterDescriptor};

/// Decoded parameter value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    /// Scaled reading
    Number(f64),
    /// Flag field, bit-exact
    Integer(u64),
    /// Formatted value such as a clock reading
    Text(String),
}

impl Value {
    /// Alarm fields are reported only when this holds
    pub fn is_nonzero(&self) -> bool {
        match self {
            Value::Number(n) => *n != 0.0,
            Value::Integer(i) => *i != 0,
            Value::Text(_) => true,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Integer(i) => Some(*i as f64),
            Value::Text(_) => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{}", trim_float(*n)),
            Value::Integer(i) => write!(f, "{i:#X}"),
            Value::Text(s) => f.write_str(s),
        }
    }
}

/// Value with the unit declared by its descriptor
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterValue {
    pub value: Value,
    pub unit: String,
}

impl ParameterValue {
    pub fn new(value: Value, unit: impl Into<String>) -> Self {
        Self {
            value,
            unit: unit.into(),
        }
    }
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.unit.is_empty() {
            write!(f, "{}", self.value)
        } else {
            write!(f, "{} {}", self.value, self.unit)
        }
    }
}

// Scale factors like 0.1 leave artifacts such as 229.70000000000002
fn trim_float(n: f64) -> f64 {
    (n * 1e6).round() / 1e6
}

/// Decode `words` according to `descriptor`.
///
/// `words` must hold exactly `descriptor.word_count` registers.
pub fn decode(descriptor: &RegisterDescriptor, words: &[u16]) -> Result<Value, CodecError> {
    if words.len() != usize::from(descriptor.word_count) {
        return Err(CodecError::WordCountMismatch {
            expected: descriptor.word_count,
            actual: words.len(),
        });
    }

    let value = match descriptor.kind {
        DecodeKind::ScaledInt => Value::Number(f64::from(words[0]) * descriptor.scale),
        DecodeKind::WideScaledInt => {
            let raw = (u32::from(words[0]) << 16) | u32::from(words[1]);
            Value::Number(f64::from(raw) * descriptor.scale)
        },
        DecodeKind::BitmaskWide => {
            let mask = words
                .iter()
                .enumerate()
                .fold(0u64, |acc, (i, &w)| acc | (u64::from(w) << (16 * i)));
            Value::Integer(mask)
        },
        DecodeKind::TimeTriple => Value::Text(format!(
            "{:02}:{:02}:{:02}",
            words[0], words[1], words[2]
        )),
    };
    Ok(value)
}

/// Encode an engineering value into one register word.
///
/// Rounds to the nearest raw step. Only single-register descriptors are writable.
pub fn encode(descriptor: &RegisterDescriptor, value: f64) -> Result<u16, CodecError> {
    if descriptor.word_count != 1 {
        return Err(CodecError::MultiRegisterWrite {
            word_count: descriptor.word_count,
        });
    }
    if !value.is_finite() {
        return Err(CodecError::NonFinite(value));
    }

    let raw = (value / descriptor.scale).round();
    if !(0.0..=f64::from(u16::MAX)).contains(&raw) {
        return Err(CodecError::OutOfRange { value, raw });
    }
    Ok(raw as u16)
}

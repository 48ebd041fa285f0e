//! Little-endian scalar codecs shared by both archive directions.
//!
//! Readers take the whole input plus a cursor and advance it; writers append
//! to an output vector. Errors are reported as bare [`ErrorKind`]s, the
//! archive attaches offsets.

use serde_json::{Number, Value};

use crate::error::ErrorKind;

pub(super) fn take<'a>(bytes: &'a [u8], cursor: &mut usize, n: usize) -> Result<&'a [u8], ErrorKind> {
    let have = bytes.len().saturating_sub(*cursor);
    if n > have {
        return Err(ErrorKind::TruncatedInput { need: n, have });
    }
    let slice = &bytes[*cursor..*cursor + n];
    *cursor += n;
    Ok(slice)
}

pub(super) fn read_u8(bytes: &[u8], cursor: &mut usize) -> Result<u8, ErrorKind> {
    Ok(take(bytes, cursor, 1)?[0])
}

pub(super) fn read_i32(bytes: &[u8], cursor: &mut usize) -> Result<i32, ErrorKind> {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(take(bytes, cursor, 4)?);
    Ok(i32::from_le_bytes(buf))
}

pub(super) fn read_i64(bytes: &[u8], cursor: &mut usize) -> Result<i64, ErrorKind> {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(take(bytes, cursor, 8)?);
    Ok(i64::from_le_bytes(buf))
}

pub(super) fn read_f32(bytes: &[u8], cursor: &mut usize) -> Result<f32, ErrorKind> {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(take(bytes, cursor, 4)?);
    Ok(f32::from_le_bytes(buf))
}

/// Length-prefixed string: positive lengths are single-byte text, negative
/// lengths count UTF-16 code units. Both forms carry a trailing NUL.
pub(super) fn read_string(bytes: &[u8], cursor: &mut usize) -> Result<String, ErrorKind> {
    let len = read_i32(bytes, cursor)?;
    match len {
        0 => Ok(String::new()),
        n if n > 0 => {
            let raw = take(bytes, cursor, n as usize)?;
            let raw = raw.strip_suffix(&[0u8]).unwrap_or(raw);
            Ok(raw.iter().map(|&b| char::from(b)).collect())
        }
        n => {
            let units = n
                .checked_neg()
                .ok_or_else(|| ErrorKind::StructuralMismatch(format!("invalid string length {}", n)))?
                as usize;
            let byte_len = units
                .checked_mul(2)
                .ok_or_else(|| ErrorKind::StructuralMismatch(format!("invalid string length {}", n)))?;
            let raw = take(bytes, cursor, byte_len)?;
            let mut wide: Vec<u16> = raw.chunks_exact(2).map(|c| u16::from_le_bytes([c[0], c[1]])).collect();
            if wide.last() == Some(&0) {
                wide.pop();
            }
            String::from_utf16(&wide)
                .map_err(|_| ErrorKind::StructuralMismatch("string is not valid UTF-16".to_string()))
        }
    }
}

pub(super) fn write_i32(out: &mut Vec<u8>, value: i32) {
    out.extend_from_slice(&value.to_le_bytes());
}

pub(super) fn write_i64(out: &mut Vec<u8>, value: i64) {
    out.extend_from_slice(&value.to_le_bytes());
}

pub(super) fn write_f32(out: &mut Vec<u8>, value: f32) {
    out.extend_from_slice(&value.to_le_bytes());
}

pub(super) fn write_string(out: &mut Vec<u8>, value: &str) -> Result<(), ErrorKind> {
    if value.is_empty() {
        write_i32(out, 0);
        return Ok(());
    }
    if value.is_ascii() {
        let len = i32::try_from(value.len() + 1).map_err(|_| overflow("string length", value.len()))?;
        write_i32(out, len);
        out.extend_from_slice(value.as_bytes());
        out.push(0);
    } else {
        let wide: Vec<u16> = value.encode_utf16().collect();
        let len = i32::try_from(wide.len() + 1).map_err(|_| overflow("string length", wide.len()))?;
        write_i32(out, -len);
        for unit in wide {
            out.extend_from_slice(&unit.to_le_bytes());
        }
        out.extend_from_slice(&[0, 0]);
    }
    Ok(())
}

pub(super) fn overflow(target: impl Into<String>, value: impl ToString) -> ErrorKind {
    ErrorKind::EncodingOverflow {
        target: target.into(),
        value: value.to_string(),
    }
}

fn wrong_type(expected: &str, value: &Value) -> ErrorKind {
    ErrorKind::InvalidValue(format!("expected {}, found {}", expected, value))
}

pub(super) fn value_to_i64(value: &Value, target: &str) -> Result<i64, ErrorKind> {
    match value {
        Value::Number(n) => {
            if let Some(v) = n.as_i64() {
                Ok(v)
            } else if let Some(v) = n.as_u64() {
                Err(overflow(target, v))
            } else {
                Err(wrong_type("an integer", value))
            }
        }
        _ => Err(wrong_type("an integer", value)),
    }
}

/// Floats are stored with their shortest f32 representation so that
/// documents stay readable and re-encode to the same bits.
pub(super) fn f32_to_value(v: f32) -> Value {
    if v.is_nan() {
        return Value::String("NaN".to_string());
    }
    if v.is_infinite() {
        let text = if v > 0.0 { "Infinity" } else { "-Infinity" };
        return Value::String(text.to_string());
    }
    let mut buf = ryu::Buffer::new();
    let wide = buf.format_finite(v).parse::<f64>().unwrap_or(f64::from(v));
    Number::from_f64(wide).map(Value::Number).unwrap_or(Value::Null)
}

pub(super) fn value_to_f32(value: &Value) -> Result<f32, ErrorKind> {
    match value {
        Value::Number(n) => {
            let wide = n.as_f64().ok_or_else(|| wrong_type("a float", value))?;
            if wide.is_finite() && wide.abs() > f64::from(f32::MAX) {
                return Err(overflow("f32", wide));
            }
            Ok(wide as f32)
        }
        Value::String(s) => match s.as_str() {
            "NaN" => Ok(f32::NAN),
            "Infinity" => Ok(f32::INFINITY),
            "-Infinity" => Ok(f32::NEG_INFINITY),
            _ => Err(wrong_type("a float", value)),
        },
        _ => Err(wrong_type("a float", value)),
    }
}

pub(super) fn value_to_str(value: &Value) -> Result<&str, ErrorKind> {
    value.as_str().ok_or_else(|| wrong_type("a string", value))
}

pub(super) fn hex_to_bytes(value: &Value) -> Result<Vec<u8>, ErrorKind> {
    let text = value_to_str(value)?;
    hex::decode(text).map_err(|e| ErrorKind::InvalidValue(format!("bad hex {:?}: {}", text, e)))
}

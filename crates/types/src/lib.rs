use std::cmp::Ordering;

use bytes::{Buf, BufMut};

/// Maximum payload of a `Text` field in bytes. Longer strings are truncated
/// on encode; shorter ones are zero-padded to this width on disk.
pub const TEXT_FIELD_BYTES: usize = 128;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum FieldType {
    Int,
    Text,
}

impl FieldType {
    /// On-disk width of a value of this type. Fixed per type, so row widths
    /// are computable from a schema alone.
    pub fn wire_len(&self) -> usize {
        match self {
            FieldType::Int => 4,
            FieldType::Text => 4 + TEXT_FIELD_BYTES,
        }
    }

    /// Decode one value of this type from the front of `buf`.
    ///
    /// Returns `None` if the buffer is too short or a text length prefix is
    /// out of range.
    pub fn decode(&self, buf: &mut impl Buf) -> Option<Value> {
        if buf.remaining() < self.wire_len() {
            return None;
        }
        match self {
            FieldType::Int => Some(Value::Int(buf.get_i32())),
            FieldType::Text => {
                let len = buf.get_i32();
                if len < 0 || len as usize > TEXT_FIELD_BYTES {
                    return None;
                }
                let mut raw = vec![0u8; TEXT_FIELD_BYTES];
                buf.copy_to_slice(&mut raw);
                raw.truncate(len as usize);
                let text = String::from_utf8(raw).ok()?;
                Some(Value::Text(text))
            }
        }
    }
}

/// Comparison operators usable in filter predicates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Value {
    Int(i32),
    Text(String),
}

impl Value {
    pub fn field_type(&self) -> FieldType {
        match self {
            Value::Int(_) => FieldType::Int,
            Value::Text(_) => FieldType::Text,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Ordering between two values of the same variant; `None` when the
    /// variants differ (the caller decides how to surface the mismatch).
    pub fn cmp_same_type(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Evaluate `self op other`, or `None` on a cross-variant comparison.
    pub fn compare(&self, op: CmpOp, other: &Value) -> Option<bool> {
        let ord = self.cmp_same_type(other)?;
        Some(match op {
            CmpOp::Eq => ord == Ordering::Equal,
            CmpOp::Ne => ord != Ordering::Equal,
            CmpOp::Lt => ord == Ordering::Less,
            CmpOp::Le => ord != Ordering::Greater,
            CmpOp::Gt => ord == Ordering::Greater,
            CmpOp::Ge => ord != Ordering::Less,
        })
    }

    /// Append the fixed wire encoding of this value to `buf`.
    pub fn encode(&self, buf: &mut impl BufMut) {
        match self {
            Value::Int(v) => buf.put_i32(*v),
            Value::Text(text) => {
                let raw = text.as_bytes();
                let len = raw.len().min(TEXT_FIELD_BYTES);
                buf.put_i32(len as i32);
                buf.put_slice(&raw[..len]);
                buf.put_bytes(0, TEXT_FIELD_BYTES - len);
            }
        }
    }
}

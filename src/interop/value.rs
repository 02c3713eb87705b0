//! Dynamically typed host values crossing the native boundary

use super::pointer::Pointer;
use std::sync::Arc;

/// Host value passed to or returned from a native function
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// No value (`void` results, null pointers)
    Nil,
    Bool(bool),
    Int(i64),
    /// Unsigned integers above `i64::MAX`
    UInt(u64),
    Float(f64),
    /// Read-only NUL-terminated bytes
    Str(Arc<[u8]>),
    Pointer(Pointer),
    /// Value of untrusted origin
    Tainted(Box<Value>),
}

impl Value {
    /// Build a string value; a terminating NUL is appended
    pub fn string(s: impl AsRef<[u8]>) -> Self {
        let bytes = s.as_ref();
        let mut buf = Vec::with_capacity(bytes.len() + 1);
        buf.extend_from_slice(bytes);
        buf.push(0);
        Self::Str(buf.into())
    }

    /// Mark this value as untrusted
    pub fn taint(self) -> Self {
        match self {
            tainted @ Self::Tainted(_) => tainted,
            other => Self::Tainted(Box::new(other)),
        }
    }

    #[inline]
    pub fn is_tainted(&self) -> bool {
        matches!(self, Self::Tainted(_))
    }

    /// Value with any taint marker removed
    #[inline]
    pub fn untainted(&self) -> &Value {
        match self {
            Self::Tainted(inner) => inner.untainted(),
            other => other,
        }
    }

    #[inline]
    pub fn is_nil(&self) -> bool {
        matches!(self.untainted(), Self::Nil)
    }

    /// Pointer wrapper held by this value, if any
    pub fn as_pointer(&self) -> Option<&Pointer> {
        match self.untainted() {
            Self::Pointer(ptr) => Some(ptr),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self.untainted() {
            Self::Int(v) => Some(*v),
            Self::UInt(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self.untainted() {
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// String contents without the trailing NUL
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self.untainted() {
            Self::Str(bytes) => Some(&bytes[..bytes.len().saturating_sub(1)]),
            _ => None,
        }
    }

    /// Host type name (for error messages)
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Nil => "nil",
            Self::Bool(_) => "bool",
            Self::Int(_) | Self::UInt(_) => "integer",
            Self::Float(_) => "float",
            Self::Str(_) => "string",
            Self::Pointer(_) => "pointer",
            Self::Tainted(_) => "tainted value",
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(v.into())
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        match i64::try_from(v) {
            Ok(small) => Self::Int(small),
            Err(_) => Self::UInt(v),
        }
    }
}

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Self::from(v as u64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Self::Float(v.into())
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::string(s)
    }
}

impl From<Pointer> for Value {
    fn from(ptr: Pointer) -> Self {
        Self::Pointer(ptr)
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Self::Nil
    }
}

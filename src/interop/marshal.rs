//! Type marshaling - host values <-> native slots
//!
//! Design: one table-driven conversion per direction, dispatching on the
//! canonical tag. Out-of-range integers are truncated to the slot width by
//! two's-complement bit pattern; values never cross classification (a float
//! slot never accepts a string, an integer slot never accepts a bool). Bool
//! slots take bools or integers, normalised to 0/1.

use super::pointer::Pointer;
use super::types::{Classification, NativeSlot, TypeTag};
use super::value::Value;
use crate::errors::{FiddleError, Result};
use core::ffi::c_void;

/// Marshal a host value into the slot for `tag`
pub fn to_native(tag: TypeTag, value: &Value) -> Result<NativeSlot> {
    let mut slot = NativeSlot::zeroed();

    match tag.classification() {
        Classification::Void => return Err(mismatch(tag, value)),
        Classification::Pointer => {
            let addr = Pointer::coerce_address(value).map_err(|_| mismatch(tag, value))?;
            slot.ptr = addr as *mut c_void;
        }
        Classification::SignedInt | Classification::UnsignedInt => {
            let bits = integer_bits(tag, value)?;
            match tag {
                TypeTag::I8 => slot.i8 = bits as i8,
                TypeTag::U8 => slot.u8 = bits as u8,
                TypeTag::I16 => slot.i16 = bits as i16,
                TypeTag::U16 => slot.u16 = bits as u16,
                TypeTag::I32 => slot.i32 = bits as i32,
                TypeTag::U32 => slot.u32 = bits as u32,
                TypeTag::I64 => slot.i64 = bits as i64,
                _ => slot.u64 = bits,
            }
        }
        Classification::Bool => {
            slot.u8 = match value.untainted() {
                Value::Bool(b) => *b as u8,
                Value::Int(v) => (*v != 0) as u8,
                Value::UInt(v) => (*v != 0) as u8,
                _ => return Err(mismatch(tag, value)),
            };
        }
        Classification::Float => {
            let v = match value.untainted() {
                Value::Float(v) => *v,
                Value::Int(v) => *v as f64,
                Value::UInt(v) => *v as f64,
                _ => return Err(mismatch(tag, value)),
            };
            if tag == TypeTag::F32 {
                slot.f32 = v as f32;
            } else {
                slot.f64 = v;
            }
        }
    }

    Ok(slot)
}

/// Marshal a native slot back into a host value
pub fn from_native(tag: TypeTag, slot: &NativeSlot) -> Value {
    // SAFETY: the slot was written for `tag` by `to_native` or by the
    // engine for a return of type `tag`
    unsafe {
        match tag {
            TypeTag::Void => Value::Nil,
            TypeTag::I8 => Value::Int(slot.i8.into()),
            TypeTag::U8 => Value::Int(slot.u8.into()),
            TypeTag::I16 => Value::Int(slot.i16.into()),
            TypeTag::U16 => Value::Int(slot.u16.into()),
            TypeTag::I32 => Value::Int(slot.i32.into()),
            TypeTag::U32 => Value::Int(slot.u32.into()),
            TypeTag::I64 => Value::Int(slot.i64),
            TypeTag::U64 => Value::from(slot.u64),
            TypeTag::F32 => Value::Float(slot.f32.into()),
            TypeTag::F64 => Value::Float(slot.f64),
            TypeTag::Pointer => Value::Pointer(Pointer::new(slot.address())),
            TypeTag::Bool => Value::Bool(slot.u8 != 0),
        }
    }
}

/// Marshal an argument list against its tags
///
/// Errors carry the index of the offending argument.
pub fn marshal_args(tags: &[TypeTag], args: &[Value], out: &mut [NativeSlot]) -> Result<()> {
    debug_assert_eq!(tags.len(), args.len());
    debug_assert_eq!(tags.len(), out.len());

    for (i, ((tag, arg), slot)) in tags.iter().zip(args).zip(out.iter_mut()).enumerate() {
        *slot = to_native(*tag, arg).map_err(|e| e.at_argument(i))?;
    }
    Ok(())
}

/// Integer value as a 64-bit pattern, ready for truncation
fn integer_bits(tag: TypeTag, value: &Value) -> Result<u64> {
    match value.untainted() {
        Value::Int(v) => Ok(*v as u64),
        Value::UInt(v) => Ok(*v),
        Value::Float(v) if v.is_finite() => Ok(*v as i64 as u64),
        Value::Pointer(ptr) => Ok(ptr.addr() as u64),
        _ => Err(mismatch(tag, value)),
    }
}

#[inline]
fn mismatch(tag: TypeTag, value: &Value) -> FiddleError {
    FiddleError::Type {
        index: None,
        expected: tag,
        found: value.untainted().kind(),
    }
}

/// Host type name for a tag (for error messages)
pub const fn host_type_name(tag: TypeTag) -> &'static str {
    match tag.classification() {
        Classification::Void => "nil",
        Classification::SignedInt | Classification::UnsignedInt => "integer",
        Classification::Float => "float",
        Classification::Pointer => "pointer",
        Classification::Bool => "bool",
    }
}

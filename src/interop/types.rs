//! Native type vocabulary
//!
//! Defines the canonical type tags, their layout descriptors and the
//! fixed-size slot every native value travels in.

use core::ffi::c_void;
use core::fmt;
use core::mem::{align_of, size_of};

/// Canonical native type class
///
/// Host-facing codes (including platform aliases such as `long` or
/// `size_t`) are resolved to one of these by the registry, so nothing
/// downstream ever special-cases an alias.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TypeTag {
    Void,
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
    Pointer,
    /// C `bool`, one byte holding 0 or 1
    Bool,
}

impl TypeTag {
    /// Every canonical tag, in registry order
    pub const ALL: [TypeTag; 13] = [
        Self::Void,
        Self::I8,
        Self::U8,
        Self::I16,
        Self::U16,
        Self::I32,
        Self::U32,
        Self::I64,
        Self::U64,
        Self::F32,
        Self::F64,
        Self::Pointer,
        Self::Bool,
    ];

    /// Size of the native type in bytes
    #[inline]
    pub const fn size(self) -> usize {
        match self {
            Self::Void => 0,
            Self::I8 | Self::U8 | Self::Bool => 1,
            Self::I16 | Self::U16 => 2,
            Self::I32 | Self::U32 | Self::F32 => 4,
            Self::I64 | Self::U64 | Self::F64 => 8,
            Self::Pointer => size_of::<*mut c_void>(),
        }
    }

    /// Alignment requirement
    #[inline]
    pub const fn align(self) -> usize {
        match self {
            Self::Void => 1,
            Self::I8 | Self::U8 => align_of::<i8>(),
            Self::I16 | Self::U16 => align_of::<i16>(),
            Self::I32 | Self::U32 => align_of::<i32>(),
            Self::I64 | Self::U64 => align_of::<i64>(),
            Self::F32 => align_of::<f32>(),
            Self::F64 => align_of::<f64>(),
            Self::Pointer => align_of::<*mut c_void>(),
            Self::Bool => align_of::<bool>(),
        }
    }

    #[inline]
    pub const fn classification(self) -> Classification {
        match self {
            Self::Void => Classification::Void,
            Self::I8 | Self::I16 | Self::I32 | Self::I64 => Classification::SignedInt,
            Self::U8 | Self::U16 | Self::U32 | Self::U64 => Classification::UnsignedInt,
            Self::F32 | Self::F64 => Classification::Float,
            Self::Pointer => Classification::Pointer,
            Self::Bool => Classification::Bool,
        }
    }

    /// Check if type is integral
    #[inline]
    pub const fn is_integral(self) -> bool {
        matches!(
            self.classification(),
            Classification::SignedInt | Classification::UnsignedInt
        )
    }

    /// Check if type is floating point
    #[inline]
    pub const fn is_float(self) -> bool {
        matches!(self, Self::F32 | Self::F64)
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Void => "void",
            Self::I8 => "int8",
            Self::U8 => "uint8",
            Self::I16 => "int16",
            Self::U16 => "uint16",
            Self::I32 => "int32",
            Self::U32 => "uint32",
            Self::I64 => "int64",
            Self::U64 => "uint64",
            Self::F32 => "float",
            Self::F64 => "double",
            Self::Pointer => "pointer",
            Self::Bool => "bool",
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How the native-call engine treats a value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Classification {
    Void,
    SignedInt,
    UnsignedInt,
    Float,
    Pointer,
    Bool,
}

/// Layout descriptor for one canonical tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeDesc {
    pub tag: TypeTag,
    pub size: usize,
    pub align: usize,
    pub class: Classification,
}

impl TypeDesc {
    pub const fn of(tag: TypeTag) -> Self {
        Self {
            tag,
            size: tag.size(),
            align: tag.align(),
            class: tag.classification(),
        }
    }
}

/// Fixed-size storage for one native value (untagged union)
///
/// The tag lives next to the slot in the signature; the slot array itself
/// must stay a plain contiguous union array because the engine reads it
/// through raw pointers. Every member starts at offset 0.
#[repr(C)]
pub union NativeSlot {
    pub i8: i8,
    pub u8: u8,
    pub i16: i16,
    pub u16: u16,
    pub i32: i32,
    pub u32: u32,
    pub i64: i64,
    pub u64: u64,
    pub f32: f32,
    pub f64: f64,
    pub ptr: *mut c_void,
}

impl NativeSlot {
    /// All-zero slot
    #[inline]
    pub const fn zeroed() -> Self {
        Self { u64: 0 }
    }

    /// Create from pointer
    #[inline]
    pub const fn from_ptr(ptr: *mut c_void) -> Self {
        Self { ptr }
    }

    /// Raw address held by a pointer slot
    #[inline]
    pub fn address(&self) -> usize {
        // SAFETY: every bit pattern is a valid raw pointer
        unsafe { self.ptr as usize }
    }
}

impl Default for NativeSlot {
    #[inline]
    fn default() -> Self {
        Self::zeroed()
    }
}

impl Copy for NativeSlot {}
impl Clone for NativeSlot {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}

impl fmt::Debug for NativeSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Which member is live is only known from the signature
        f.write_str("NativeSlot { .. }")
    }
}

const _: () = {
    assert!(size_of::<NativeSlot>() >= size_of::<u64>());
    assert!(size_of::<NativeSlot>() >= size_of::<*mut c_void>());
    assert!(align_of::<NativeSlot>() >= align_of::<*mut c_void>());
};

//! Type registry - host type codes to native layouts
//!
//! Built once on first use and read-only afterwards, so lookups need no
//! locking. Platform aliases (`long`, `size_t`, `intptr_t`, ...) are folded
//! into canonical tags while the table is built.

use super::types::{TypeDesc, TypeTag};
use crate::errors::{FiddleError, Result};
use core::ffi::{c_int, c_long, c_longlong, c_short};
use core::fmt;
use core::mem::size_of;
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Host-facing type identifier
///
/// Negative codes name the unsigned variant of an integer code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeCode(pub i32);

impl TypeCode {
    /// Unsigned variant of an integer code
    #[inline]
    pub const fn unsigned(self) -> Self {
        Self(-self.0)
    }
}

impl fmt::Display for TypeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i32> for TypeCode {
    #[inline]
    fn from(code: i32) -> Self {
        Self(code)
    }
}

impl From<TypeTag> for TypeCode {
    fn from(tag: TypeTag) -> Self {
        match tag {
            TypeTag::Void => code::VOID,
            TypeTag::Pointer => code::VOIDP,
            TypeTag::I8 => code::INT8_T,
            TypeTag::U8 => code::UINT8_T,
            TypeTag::I16 => code::INT16_T,
            TypeTag::U16 => code::UINT16_T,
            TypeTag::I32 => code::INT32_T,
            TypeTag::U32 => code::UINT32_T,
            TypeTag::I64 => code::INT64_T,
            TypeTag::U64 => code::UINT64_T,
            TypeTag::F32 => code::FLOAT,
            TypeTag::F64 => code::DOUBLE,
            TypeTag::Bool => code::BOOL,
        }
    }
}

/// Type codes understood by the registry
pub mod code {
    use super::TypeCode;
    use core::ffi::{c_int, c_long, c_short};
    use core::mem::size_of;

    pub const VOID: TypeCode = TypeCode(0);
    pub const VOIDP: TypeCode = TypeCode(1);
    pub const CHAR: TypeCode = TypeCode(2);
    pub const SHORT: TypeCode = TypeCode(3);
    pub const INT: TypeCode = TypeCode(4);
    pub const LONG: TypeCode = TypeCode(5);
    pub const LONG_LONG: TypeCode = TypeCode(6);
    pub const FLOAT: TypeCode = TypeCode(7);
    pub const DOUBLE: TypeCode = TypeCode(8);
    // 9 is reserved for variadic arguments, which are not supported
    pub const CONST_STRING: TypeCode = TypeCode(10);
    pub const BOOL: TypeCode = TypeCode(11);

    pub const UCHAR: TypeCode = CHAR.unsigned();
    pub const USHORT: TypeCode = SHORT.unsigned();
    pub const UINT: TypeCode = INT.unsigned();
    pub const ULONG: TypeCode = LONG.unsigned();
    pub const ULONG_LONG: TypeCode = LONG_LONG.unsigned();

    pub const INT8_T: TypeCode = signed_of_size(1);
    pub const UINT8_T: TypeCode = INT8_T.unsigned();
    pub const INT16_T: TypeCode = signed_of_size(2);
    pub const UINT16_T: TypeCode = INT16_T.unsigned();
    pub const INT32_T: TypeCode = signed_of_size(4);
    pub const UINT32_T: TypeCode = INT32_T.unsigned();
    pub const INT64_T: TypeCode = signed_of_size(8);
    pub const UINT64_T: TypeCode = INT64_T.unsigned();

    pub const SSIZE_T: TypeCode = signed_of_size(size_of::<isize>());
    pub const SIZE_T: TypeCode = SSIZE_T.unsigned();
    pub const PTRDIFF_T: TypeCode = signed_of_size(size_of::<isize>());
    pub const INTPTR_T: TypeCode = signed_of_size(size_of::<isize>());
    pub const UINTPTR_T: TypeCode = INTPTR_T.unsigned();

    /// Smallest C integer code with the given width
    const fn signed_of_size(size: usize) -> TypeCode {
        if size == 1 {
            CHAR
        } else if size == size_of::<c_short>() {
            SHORT
        } else if size == size_of::<c_int>() {
            INT
        } else if size == size_of::<c_long>() {
            LONG
        } else {
            LONG_LONG
        }
    }
}

/// Process-wide code to layout table
pub struct TypeRegistry {
    entries: HashMap<TypeCode, TypeDesc>,
}

static REGISTRY: Lazy<TypeRegistry> = Lazy::new(TypeRegistry::build);

/// Canonical descriptors, indexed by `TypeTag as usize`
static CANONICAL: [TypeDesc; 13] = [
    TypeDesc::of(TypeTag::Void),
    TypeDesc::of(TypeTag::I8),
    TypeDesc::of(TypeTag::U8),
    TypeDesc::of(TypeTag::I16),
    TypeDesc::of(TypeTag::U16),
    TypeDesc::of(TypeTag::I32),
    TypeDesc::of(TypeTag::U32),
    TypeDesc::of(TypeTag::I64),
    TypeDesc::of(TypeTag::U64),
    TypeDesc::of(TypeTag::F32),
    TypeDesc::of(TypeTag::F64),
    TypeDesc::of(TypeTag::Pointer),
    TypeDesc::of(TypeTag::Bool),
];

impl TypeRegistry {
    fn build() -> Self {
        let mut entries = HashMap::new();

        let mut register = |code: TypeCode, tag: TypeTag| {
            entries.insert(code, TypeDesc::of(tag));
        };

        register(code::VOID, TypeTag::Void);
        register(code::VOIDP, TypeTag::Pointer);
        register(code::CONST_STRING, TypeTag::Pointer);
        register(code::FLOAT, TypeTag::F32);
        register(code::DOUBLE, TypeTag::F64);
        register(code::BOOL, TypeTag::Bool);

        for (code, size) in [
            (code::CHAR, 1),
            (code::SHORT, size_of::<c_short>()),
            (code::INT, size_of::<c_int>()),
            (code::LONG, size_of::<c_long>()),
            (code::LONG_LONG, size_of::<c_longlong>()),
        ] {
            register(code, signed_tag(size));
            register(code.unsigned(), unsigned_tag(size));
        }

        tracing::debug!(entries = entries.len(), "type registry built");

        Self { entries }
    }

    /// Shared registry instance
    #[inline]
    pub fn global() -> &'static TypeRegistry {
        &REGISTRY
    }

    /// Layout for a host type code
    pub fn describe(&self, code: TypeCode) -> Result<&TypeDesc> {
        self.entries
            .get(&code)
            .ok_or(FiddleError::UnsupportedType { code: code.0, position: None })
    }

    /// Layout for a canonical tag
    #[inline]
    pub fn canonical(tag: TypeTag) -> &'static TypeDesc {
        &CANONICAL[tag as usize]
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Look up a code in the process-wide registry
#[inline]
pub fn describe(code: TypeCode) -> Result<&'static TypeDesc> {
    TypeRegistry::global().describe(code)
}

fn signed_tag(size: usize) -> TypeTag {
    match size {
        1 => TypeTag::I8,
        2 => TypeTag::I16,
        4 => TypeTag::I32,
        _ => TypeTag::I64,
    }
}

fn unsigned_tag(size: usize) -> TypeTag {
    match size {
        1 => TypeTag::U8,
        2 => TypeTag::U16,
        4 => TypeTag::U32,
        _ => TypeTag::U64,
    }
}

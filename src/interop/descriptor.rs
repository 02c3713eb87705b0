//! Call descriptors - signatures compiled once, reused for every call

use super::abi::Abi;
use super::engine::CallEngine;
use super::registry::{self, TypeCode};
use super::types::{NativeSlot, TypeDesc, TypeTag};
use crate::errors::{FiddleError, Result, TypePosition};
use core::ffi::c_void;
use core::fmt;
use core::mem::size_of;
use tracing::debug;

/// Upper bound (exclusive) on argument counts
///
/// Largest count for which `(count + 1) * (pointer + slot)` cannot overflow
/// `usize`, so frame sizing is always representable.
pub const MAX_ARGS: usize = usize::MAX / (size_of::<*mut c_void>() + size_of::<NativeSlot>()) - 1;

/// Reject argument counts at or above `MAX_ARGS`
#[inline]
pub fn check_max_args(what: &'static str, len: usize) -> Result<()> {
    if len < MAX_ARGS {
        Ok(())
    } else {
        Err(FiddleError::Overflow { what, len, max: MAX_ARGS })
    }
}

/// Declared argument and return types plus calling convention
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature {
    args: Box<[TypeTag]>,
    ret: TypeTag,
    abi: Abi,
}

impl Signature {
    #[inline]
    pub fn args(&self) -> &[TypeTag] {
        &self.args
    }

    #[inline]
    pub fn ret(&self) -> TypeTag {
        self.ret
    }

    #[inline]
    pub fn abi(&self) -> Abi {
        self.abi
    }

    #[inline]
    pub fn arity(&self) -> usize {
        self.args.len()
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, tag) in self.args.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", tag)?;
        }
        write!(f, ") -> {}", self.ret)
    }
}

/// Immutable compiled signature accepted by engine `E`
pub struct CallDescriptor<E: CallEngine> {
    signature: Signature,
    prepared: E::Prepared,
}

impl<E: CallEngine> CallDescriptor<E> {
    /// Compile argument and return codes for `engine`
    ///
    /// The argument count is checked against `MAX_ARGS` from the iterator's
    /// length, before anything is collected or allocated.
    pub fn compile<I>(engine: &E, args: I, ret: impl Into<TypeCode>, abi: Abi) -> Result<Self>
    where
        I: IntoIterator,
        I::IntoIter: ExactSizeIterator,
        I::Item: Into<TypeCode>,
    {
        let args = args.into_iter();
        check_max_args("number of arguments", args.len())?;

        let mut descs: Vec<&'static TypeDesc> = Vec::with_capacity(args.len());
        for (i, code) in args.enumerate() {
            let code = code.into();
            let position = TypePosition::Argument(i);
            let desc = registry::describe(code).map_err(|e| e.at_position(position))?;
            if desc.tag == TypeTag::Void {
                return Err(FiddleError::UnsupportedType {
                    code: code.0,
                    position: Some(position),
                });
            }
            descs.push(desc);
        }

        let ret = registry::describe(ret.into()).map_err(|e| e.at_position(TypePosition::Return))?;

        let prepared = engine
            .prepare(&descs, ret, abi)
            .map_err(|status| FiddleError::Prepare { status, abi })?;

        let signature = Signature {
            args: descs.iter().map(|desc| desc.tag).collect(),
            ret: ret.tag,
            abi,
        };

        super::record_prepare();
        debug!(signature = %signature, abi = abi.raw(), "call descriptor compiled");

        Ok(Self { signature, prepared })
    }

    #[inline]
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Engine-specific compiled form
    #[inline]
    pub fn prepared(&self) -> &E::Prepared {
        &self.prepared
    }
}

impl<E: CallEngine> fmt::Debug for CallDescriptor<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallDescriptor")
            .field("signature", &self.signature)
            .finish_non_exhaustive()
    }
}

//! Pointer wrapper - a raw address with a declared size and ownership
//!
//! Addresses returned from native code are wrapped with size 0 and no
//! ownership. Only `Pointer::malloc` produces owned memory, released when
//! the last clone is dropped.

use super::types::TypeTag;
use super::value::Value;
use crate::errors::{FiddleError, Result};
use core::ffi::c_void;
use core::fmt;
use core::ptr::NonNull;
use std::ffi::CStr;
use std::sync::Arc;

/// Owned native allocation
struct Block(NonNull<c_void>);

impl Drop for Block {
    fn drop(&mut self) {
        tracing::trace!(address = ?self.0.as_ptr(), "freeing pointer block");
        // SAFETY: allocated by `libc::calloc` in `Pointer::malloc` and freed
        // exactly once, when the last `Arc` goes away
        unsafe { libc::free(self.0.as_ptr()) }
    }
}

// SAFETY: the block is plain heap memory with no thread affinity
unsafe impl Send for Block {}
unsafe impl Sync for Block {}

#[derive(Clone)]
pub struct Pointer {
    addr: usize,
    size: usize,
    block: Option<Arc<Block>>,
}

impl Pointer {
    /// Wrap a raw address with no declared size and no ownership
    #[inline]
    pub const fn new(addr: usize) -> Self {
        Self::with_size(addr, 0)
    }

    #[inline]
    pub const fn with_size(addr: usize, size: usize) -> Self {
        Self { addr, size, block: None }
    }

    #[inline]
    pub const fn null() -> Self {
        Self::new(0)
    }

    /// Allocate `size` zeroed bytes owned by the returned pointer
    pub fn malloc(size: usize) -> Result<Self> {
        // SAFETY: calloc has no preconditions; null is handled below
        let raw = unsafe { libc::calloc(1, size.max(1)) };
        let block = NonNull::new(raw).ok_or(FiddleError::Alloc { size })?;
        tracing::trace!(size, address = ?raw, "allocated pointer block");
        Ok(Self {
            addr: raw as usize,
            size,
            block: Some(Arc::new(Block(block))),
        })
    }

    #[inline]
    pub fn addr(&self) -> usize {
        self.addr
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        self.addr == 0
    }

    /// Whether this wrapper frees the memory it points to
    #[inline]
    pub fn is_owned(&self) -> bool {
        self.block.is_some()
    }

    #[inline]
    pub fn as_mut_ptr(&self) -> *mut c_void {
        self.addr as *mut c_void
    }

    /// Coerce a host value to a raw address
    ///
    /// Pointer wrappers are used directly, `Nil` is the null address,
    /// strings yield the address of their bytes and numbers are taken as
    /// raw addresses.
    pub fn coerce_address(value: &Value) -> Result<usize> {
        match value.untainted() {
            Value::Nil => Ok(0),
            Value::Pointer(ptr) => Ok(ptr.addr),
            Value::Str(bytes) => Ok(bytes.as_ptr() as usize),
            Value::Int(v) => Ok(*v as usize),
            Value::UInt(v) => Ok(*v as usize),
            Value::Float(v) if v.is_finite() => Ok(*v as i64 as usize),
            other => Err(FiddleError::Type {
                index: None,
                expected: TypeTag::Pointer,
                found: other.kind(),
            }),
        }
    }

    /// Copy `bytes` into an owned buffer at `offset`
    pub fn write_bytes(&self, offset: usize, bytes: &[u8]) -> Result<()> {
        let end = offset.checked_add(bytes.len()).filter(|end| *end <= self.size);
        match (&self.block, end) {
            (Some(block), Some(_)) => {
                // SAFETY: range checked against the owned allocation above
                unsafe {
                    core::ptr::copy_nonoverlapping(
                        bytes.as_ptr(),
                        (block.0.as_ptr() as *mut u8).add(offset),
                        bytes.len(),
                    );
                }
                Ok(())
            }
            _ => Err(FiddleError::Overflow {
                what: "pointer write",
                len: offset.saturating_add(bytes.len()),
                max: if self.is_owned() { self.size } else { 0 },
            }),
        }
    }

    /// Contents of an owned buffer
    pub fn to_vec(&self) -> Option<Vec<u8>> {
        self.block.as_ref().map(|block| {
            // SAFETY: the block holds `size` initialised (zeroed) bytes
            unsafe {
                core::slice::from_raw_parts(block.0.as_ptr() as *const u8, self.size).to_vec()
            }
        })
    }

    /// Copy `len` bytes starting at the address
    ///
    /// # Safety
    /// The range must be readable memory.
    pub unsafe fn read_bytes(&self, len: usize) -> Vec<u8> {
        if self.is_null() || len == 0 {
            return Vec::new();
        }
        core::slice::from_raw_parts(self.addr as *const u8, len).to_vec()
    }

    /// Read a NUL-terminated string at the address
    ///
    /// # Safety
    /// The address must point to a readable NUL-terminated byte sequence.
    pub unsafe fn read_c_str(&self) -> Option<Vec<u8>> {
        if self.is_null() {
            return None;
        }
        Some(CStr::from_ptr(self.addr as *const libc::c_char).to_bytes().to_vec())
    }
}

impl PartialEq for Pointer {
    fn eq(&self, other: &Self) -> bool {
        self.addr == other.addr && self.size == other.size
    }
}

impl fmt::Debug for Pointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Pointer {{ ptr: {:#x}, size: {}, owned: {} }}",
            self.addr,
            self.size,
            self.is_owned()
        )
    }
}

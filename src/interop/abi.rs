//! Calling convention identifiers
//!
//! The numeric value is opaque here and handed to the native-call engine
//! as-is; the engine decides whether the current platform supports it.

use core::fmt;
use libffi::raw;

/// Calling convention identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Abi(u32);

impl Abi {
    /// Platform default convention
    pub const DEFAULT: Abi = Abi(raw::ffi_abi_FFI_DEFAULT_ABI as u32);

    /// Win32 stdcall
    #[cfg(all(target_arch = "x86", target_os = "windows"))]
    pub const STDCALL: Abi = Abi(raw::ffi_abi_FFI_STDCALL as u32);

    /// Wrap a raw engine convention number
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn is_default(self) -> bool {
        self.0 == Self::DEFAULT.0
    }
}

impl Default for Abi {
    #[inline]
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for Abi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_default() {
            write!(f, "default abi ({})", self.0)
        } else {
            write!(f, "abi {}", self.0)
        }
    }
}

impl From<u32> for Abi {
    #[inline]
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

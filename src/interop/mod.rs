//! Interoperability - call native functions with dynamically typed values
//!
//! Design: compile a signature once, marshal per call through one table
//!
//! Architecture:
//! - `types.rs` - canonical type tags, layouts, `NativeSlot`
//! - `registry.rs` - host type codes and platform aliases -> layouts
//! - `value.rs` / `pointer.rs` - host values and the pointer wrapper
//! - `marshal.rs` - host value <-> native slot conversions
//! - `abi.rs` - calling convention identifiers
//! - `engine.rs` - native-call engine contract and the libffi engine
//! - `descriptor.rs` - compiled signatures and the argument-count bound
//! - `frame.rs` - per-call argument buffers
//! - `function.rs` - construction and the invocation protocol
//! - `last_error.rs` - platform error state after each call
//! - `library.rs` - dynamic library loading and symbol lookup

mod abi;
mod descriptor;
mod engine;
mod frame;
mod function;
pub mod last_error;
mod library;
mod marshal;
mod pointer;
mod registry;
mod types;
mod value;

pub use abi::Abi;
pub use descriptor::{check_max_args, CallDescriptor, Signature, MAX_ARGS};
pub use engine::{CallEngine, Libffi, LibffiCif};
pub use frame::frame_size;
pub use function::{Address, Function, FunctionBuilder, TrustPolicy};
pub use library::{Handle, LoadError, SymbolError};
pub use marshal::{from_native, host_type_name, marshal_args, to_native};
pub use pointer::Pointer;
pub use registry::{code, describe, TypeCode, TypeRegistry};
pub use types::{Classification, NativeSlot, TypeDesc, TypeTag};
pub use value::Value;

use std::sync::atomic::{AtomicUsize, Ordering};

static CALLS_MADE: AtomicUsize = AtomicUsize::new(0);
static MARSHALING_ERRORS: AtomicUsize = AtomicUsize::new(0);
static DESCRIPTORS_PREPARED: AtomicUsize = AtomicUsize::new(0);

#[inline]
pub(crate) fn record_call() {
    CALLS_MADE.fetch_add(1, Ordering::Relaxed);
}

#[inline]
pub(crate) fn record_marshal_error() {
    MARSHALING_ERRORS.fetch_add(1, Ordering::Relaxed);
}

#[inline]
pub(crate) fn record_prepare() {
    DESCRIPTORS_PREPARED.fetch_add(1, Ordering::Relaxed);
}

/// Get interop statistics
pub fn stats() -> InteropStats {
    InteropStats {
        calls_made: CALLS_MADE.load(Ordering::Relaxed),
        marshaling_errors: MARSHALING_ERRORS.load(Ordering::Relaxed),
        descriptors_prepared: DESCRIPTORS_PREPARED.load(Ordering::Relaxed),
    }
}

/// Interop statistics for monitoring
///
/// Counters are process-wide and only ever grow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InteropStats {
    pub calls_made: usize,
    pub marshaling_errors: usize,
    pub descriptors_prepared: usize,
}

#[cfg(test)]
mod tests;

//! Fiddle - call native functions from a dynamically typed host
//!
//! A `Function` binds a native address to a signature made of host type
//! codes. The signature is compiled once into a libffi call interface;
//! every call marshals the host values into native slots, calls through
//! libffi, records `errno` and converts the result back.
//!
//! ```no_run
//! use fiddle::{code, Function, Handle, Pointer, Value};
//!
//! let libc = Handle::this_process()?;
//! let strcpy = Function::builder(libc.symbol("strcpy")?)
//!     .args([code::VOIDP, code::VOIDP])
//!     .returns(code::VOIDP)
//!     .name("strcpy")
//!     .build()?;
//!
//! let buf = Pointer::malloc(4)?;
//! let out = unsafe { strcpy.invoke(&[buf.clone().into(), Value::from("123")])? };
//! assert_eq!(out.as_pointer().map(Pointer::addr), Some(buf.addr()));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod config;
pub mod errors;
pub mod interop;
pub mod logging;

// Re-export commonly used items
pub use config::{Config, ConfigError};
pub use errors::{FiddleError, Result, TypePosition};
pub use interop::{
    code, last_error, Abi, Function, FunctionBuilder, Handle, Pointer, TrustPolicy, TypeCode,
    TypeTag, Value, MAX_ARGS,
};

/// Apply a configuration: install logging and make it the process default
pub fn init(config: Config) {
    logging::init_with_config((&config.logging).into());
    logging::info!(
        reject_tainted = config.security.reject_tainted,
        "fiddle initialized"
    );
    config::set_global(config);
}

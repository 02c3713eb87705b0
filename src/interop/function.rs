//! Native functions callable with dynamically typed arguments
//!
//! A `Function` pairs a target address with a call descriptor compiled once
//! at construction. Invocation reuses the descriptor, marshals arguments
//! into a fresh frame, calls through the engine and records the platform
//! error state.

use super::abi::Abi;
use super::descriptor::{check_max_args, CallDescriptor, Signature};
use super::engine::{CallEngine, Libffi};
use super::frame::ArgFrame;
use super::last_error;
use super::marshal;
use super::pointer::Pointer;
use super::registry::{code, TypeCode};
use super::types::{NativeSlot, TypeTag};
use super::value::Value;
use crate::config::{self, SecurityConfig};
use crate::errors::{FiddleError, Result};
use crate::logging;
use core::fmt;
use tracing::debug;

/// Target address of a native function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address(pub usize);

impl From<usize> for Address {
    fn from(addr: usize) -> Self {
        Self(addr)
    }
}

impl From<&Pointer> for Address {
    fn from(ptr: &Pointer) -> Self {
        Self(ptr.addr())
    }
}

impl From<Pointer> for Address {
    fn from(ptr: Pointer) -> Self {
        Self(ptr.addr())
    }
}

/// Provenance check applied to arguments before a call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustPolicy {
    /// Accept every argument
    Permissive,
    /// Reject tainted arguments with `FiddleError::Security`
    RejectTainted,
}

impl TrustPolicy {
    /// Index of the first argument this policy rejects
    pub fn first_rejected(self, args: &[Value]) -> Option<usize> {
        match self {
            Self::Permissive => None,
            Self::RejectTainted => args.iter().position(Value::is_tainted),
        }
    }
}

impl From<&SecurityConfig> for TrustPolicy {
    fn from(config: &SecurityConfig) -> Self {
        if config.reject_tainted {
            Self::RejectTainted
        } else {
            Self::Permissive
        }
    }
}

impl Default for TrustPolicy {
    /// Policy from the process-wide configuration
    fn default() -> Self {
        Self::from(&config::global().security)
    }
}

/// Collects construction parameters for a `Function`
#[derive(Debug, Clone)]
pub struct FunctionBuilder {
    address: Address,
    args: Vec<TypeCode>,
    ret: TypeCode,
    abi: Abi,
    name: Option<String>,
    trust: Option<TrustPolicy>,
}

impl FunctionBuilder {
    pub fn new(address: impl Into<Address>) -> Self {
        Self {
            address: address.into(),
            args: Vec::new(),
            ret: code::VOID,
            abi: Abi::DEFAULT,
            name: None,
            trust: None,
        }
    }

    /// Argument type codes, in order
    pub fn args<I>(mut self, codes: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<TypeCode>,
    {
        self.args = codes.into_iter().map(Into::into).collect();
        self
    }

    pub fn arg(mut self, code: impl Into<TypeCode>) -> Self {
        self.args.push(code.into());
        self
    }

    /// Return type code (void when not set)
    pub fn returns(mut self, code: impl Into<TypeCode>) -> Self {
        self.ret = code.into();
        self
    }

    pub fn abi(mut self, abi: Abi) -> Self {
        self.abi = abi;
        self
    }

    /// Diagnostic name, used in logs only
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Override the trust policy taken from the global configuration
    pub fn trust_policy(mut self, policy: TrustPolicy) -> Self {
        self.trust = Some(policy);
        self
    }

    /// Compile with the libffi engine
    pub fn build(self) -> Result<Function<Libffi>> {
        self.build_with(Libffi)
    }

    /// Compile with a specific engine
    ///
    /// Either a ready `Function` is returned or nothing is: a failed
    /// compilation leaves no descriptor behind.
    pub fn build_with<E: CallEngine>(self, engine: E) -> Result<Function<E>> {
        if self.address.0 == 0 {
            return Err(FiddleError::NullAddress);
        }

        let descriptor = CallDescriptor::compile(&engine, self.args, self.ret, self.abi)?;
        let trust = self.trust.unwrap_or_default();

        debug!(
            function = self.name.as_deref().unwrap_or("<anonymous>"),
            address = self.address.0,
            signature = %descriptor.signature(),
            "function ready"
        );

        Ok(Function {
            address: self.address.0,
            descriptor,
            name: self.name,
            trust,
            engine,
        })
    }
}

/// A native function bound to a compiled signature
pub struct Function<E: CallEngine = Libffi> {
    address: usize,
    descriptor: CallDescriptor<E>,
    name: Option<String>,
    trust: TrustPolicy,
    engine: E,
}

impl Function<Libffi> {
    /// Start building a function at `address`
    pub fn builder(address: impl Into<Address>) -> FunctionBuilder {
        FunctionBuilder::new(address)
    }

    /// Shorthand for `builder(address).args(args).returns(ret).build()`
    pub fn new<I>(address: impl Into<Address>, args: I, ret: impl Into<TypeCode>) -> Result<Self>
    where
        I: IntoIterator,
        I::Item: Into<TypeCode>,
    {
        FunctionBuilder::new(address).args(args).returns(ret).build()
    }
}

impl<E: CallEngine> Function<E> {
    #[inline]
    pub fn address(&self) -> usize {
        self.address
    }

    /// Address as an unowned pointer wrapper
    pub fn to_pointer(&self) -> Pointer {
        Pointer::new(self.address)
    }

    #[inline]
    pub fn signature(&self) -> &Signature {
        self.descriptor.signature()
    }

    #[inline]
    pub fn arg_types(&self) -> &[TypeTag] {
        self.signature().args()
    }

    #[inline]
    pub fn return_type(&self) -> TypeTag {
        self.signature().ret()
    }

    #[inline]
    pub fn abi(&self) -> Abi {
        self.signature().abi()
    }

    #[inline]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    #[inline]
    pub fn trust_policy(&self) -> TrustPolicy {
        self.trust
    }

    #[inline]
    pub fn descriptor(&self) -> &CallDescriptor<E> {
        &self.descriptor
    }

    #[inline]
    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Call the function with `args`
    ///
    /// Validation and marshaling failures are reported before the native
    /// call happens. Afterwards the platform error state is available from
    /// [`last_error::get`].
    ///
    /// # Safety
    /// - the address must be a function with exactly the declared signature
    /// - pointer arguments must satisfy whatever the native function
    ///   requires of them (validity, size, lifetime, aliasing)
    pub unsafe fn invoke(&self, args: &[Value]) -> Result<Value> {
        let label = self.name.as_deref().unwrap_or("<anonymous>");

        self.validate(args).map_err(|e| {
            logging::log_rejected(label, &e);
            e
        })?;

        let mut frame = ArgFrame::new(args.len())?;
        if let Err(e) = marshal::marshal_args(self.arg_types(), args, frame.slots_mut()) {
            super::record_marshal_error();
            logging::log_rejected(label, &e);
            return Err(e);
        }
        let pointers = frame.finish();

        let mut ret = NativeSlot::zeroed();
        logging::log_call(label, args.len(), frame.size());

        self.engine
            .call(self.descriptor.prepared(), self.address, &mut ret, pointers);
        let errno = last_error::capture();

        super::record_call();
        logging::log_return(label, errno);
        drop(frame);

        Ok(marshal::from_native(self.return_type(), &ret))
    }

    /// Checks that run before any buffer is allocated
    fn validate(&self, args: &[Value]) -> Result<()> {
        let expected = self.signature().arity();
        if args.len() != expected {
            return Err(FiddleError::ArgumentCount { expected, given: args.len() });
        }

        check_max_args("number of arguments", args.len())?;

        if let Some(index) = self.trust.first_rejected(args) {
            return Err(FiddleError::Security { index });
        }

        Ok(())
    }
}

impl<E: CallEngine> fmt::Debug for Function<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("name", &self.name)
            .field("address", &format_args!("{:#x}", self.address))
            .field("signature", self.signature())
            .field("abi", &self.abi())
            .finish()
    }
}

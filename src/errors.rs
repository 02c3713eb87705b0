use crate::interop::{Abi, TypeTag};
use std::fmt;

pub type Result<T> = std::result::Result<T, FiddleError>;

/// Where an offending type code appeared in a signature
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypePosition {
    Argument(usize),
    Return,
}

impl fmt::Display for TypePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Argument(index) => write!(f, "argument {}", index),
            Self::Return => write!(f, "return type"),
        }
    }
}

/// Errors raised while building or invoking a native function
///
/// Every variant is raised before the native call happens; a failed
/// construction yields no descriptor and a failed invocation never reaches
/// the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum FiddleError {
    /// Type code not present in the registry (or not valid where it appeared)
    UnsupportedType { code: i32, position: Option<TypePosition> },
    /// Argument count would overflow call-frame sizing
    Overflow { what: &'static str, len: usize, max: usize },
    /// Native-call engine rejected a structurally valid signature
    Prepare { status: u32, abi: Abi },
    ArgumentCount { expected: usize, given: usize },
    /// Value could not be coerced to the type its slot requires
    Type { index: Option<usize>, expected: TypeTag, found: &'static str },
    /// Argument rejected by the trust policy
    Security { index: usize },
    NullAddress,
    Alloc { size: usize },
}

impl FiddleError {
    /// Attach the signature position to an `UnsupportedType` error
    pub fn at_position(self, position: TypePosition) -> Self {
        match self {
            Self::UnsupportedType { code, .. } => Self::UnsupportedType {
                code,
                position: Some(position),
            },
            other => other,
        }
    }

    /// Attach the argument index to a `Type` error
    pub fn at_argument(self, index: usize) -> Self {
        match self {
            Self::Type { expected, found, .. } => Self::Type {
                index: Some(index),
                expected,
                found,
            },
            other => other,
        }
    }
}

impl fmt::Display for FiddleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedType { code, position: Some(position) } => {
                write!(f, "unsupported type code {} for {}", code, position)
            }
            Self::UnsupportedType { code, position: None } => {
                write!(f, "unsupported type code {}", code)
            }
            Self::Overflow { what, len, max } => {
                write!(
                    f,
                    "{} is so large that it can cause integer overflow ({}, limit {})",
                    what, len, max
                )
            }
            Self::Prepare { status, abi } => {
                write!(f, "error creating call interface for {}: status {}", abi, status)
            }
            Self::ArgumentCount { expected, given } => {
                write!(f, "wrong number of arguments ({} for {})", given, expected)
            }
            Self::Type { index: Some(index), expected, found } => {
                write!(f, "argument {}: cannot convert {} to {}", index, found, expected)
            }
            Self::Type { index: None, expected, found } => {
                write!(f, "cannot convert {} to {}", found, expected)
            }
            Self::Security { index } => {
                write!(f, "tainted parameter not allowed (argument {})", index)
            }
            Self::NullAddress => write!(f, "function address is null"),
            Self::Alloc { size } => write!(f, "failed to allocate {} bytes", size),
        }
    }
}

impl std::error::Error for FiddleError {}

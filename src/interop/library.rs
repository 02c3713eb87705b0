//! Dynamic library handles and symbol resolution
//!
//! Platform-agnostic wrapper over `libloading`. Symbols resolve to plain
//! addresses, ready to build a `Function` from.

use core::ffi::c_void;
use core::fmt;
use libloading::Library;

/// Handle to a dynamically loaded library
pub struct Handle {
    library: Library,
    name: Option<String>,
}

impl Handle {
    /// Load a library by name or path
    pub fn open(name: &str) -> Result<Self, LoadError> {
        if name.contains('\0') {
            return Err(LoadError::InvalidName);
        }

        // SAFETY: loading runs the library's initialisers; callers choose
        // which libraries they trust
        let library = unsafe { Library::new(name) }
            .map_err(|e| LoadError::LoadFailed(e.to_string()))?;

        tracing::debug!(library = name, "library loaded");
        Ok(Self { library, name: Some(name.to_string()) })
    }

    /// Handle to the running program and the libraries it already links
    pub fn this_process() -> Result<Self, LoadError> {
        let library = Self::this_impl()?;
        tracing::debug!(library = "<self>", "library loaded");
        Ok(Self { library, name: None })
    }

    #[cfg(unix)]
    fn this_impl() -> Result<Library, LoadError> {
        Ok(libloading::os::unix::Library::this().into())
    }

    #[cfg(windows)]
    fn this_impl() -> Result<Library, LoadError> {
        libloading::os::windows::Library::this()
            .map(Library::from)
            .map_err(|e| LoadError::LoadFailed(e.to_string()))
    }

    /// Library name, `None` for the process handle
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Address of an exported symbol
    pub fn symbol(&self, name: &str) -> Result<usize, SymbolError> {
        if name.contains('\0') {
            return Err(SymbolError::InvalidName);
        }

        // SAFETY: the symbol is read as an opaque address, never called or
        // dereferenced here
        let ptr = unsafe { self.library.get::<*mut c_void>(name.as_bytes()) }
            .map(|symbol| *symbol)
            .map_err(|_| SymbolError::NotFound(name.to_string()))?;

        if ptr.is_null() {
            Err(SymbolError::NotFound(name.to_string()))
        } else {
            Ok(ptr as usize)
        }
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("name", &self.name.as_deref().unwrap_or("<self>"))
            .finish_non_exhaustive()
    }
}

/// Library loading errors
#[derive(Debug)]
pub enum LoadError {
    InvalidName,
    LoadFailed(String),
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidName => write!(f, "Invalid library name"),
            Self::LoadFailed(msg) => write!(f, "Failed to load library: {}", msg),
        }
    }
}

impl std::error::Error for LoadError {}

/// Symbol lookup errors
#[derive(Debug)]
pub enum SymbolError {
    InvalidName,
    NotFound(String),
}

impl fmt::Display for SymbolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidName => write!(f, "Invalid symbol name"),
            Self::NotFound(name) => write!(f, "Symbol not found: {}", name),
        }
    }
}

impl std::error::Error for SymbolError {}

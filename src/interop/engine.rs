//! Native-call engines
//!
//! The engine owns the ABI mechanics: it turns a list of type descriptors
//! into a prepared call interface and performs calls through it. `Libffi`
//! is the production engine; tests substitute their own.

use super::abi::Abi;
use super::types::{NativeSlot, TypeDesc, TypeTag};
use core::ffi::{c_uint, c_void};
use core::ptr::{self, addr_of_mut};
use libffi::raw;

/// Engine contract consumed by call descriptors
pub trait CallEngine {
    /// Compiled call interface, reused for every invocation
    type Prepared;

    /// Compile a signature; `Err` carries the engine's status code
    fn prepare(&self, args: &[&TypeDesc], ret: &TypeDesc, abi: Abi) -> Result<Self::Prepared, u32>;

    /// Perform one call
    ///
    /// # Safety
    /// - `address` must be a function matching the prepared signature
    /// - `args` must hold one pointer per argument, each to a slot written
    ///   for that argument's type, followed by a null sentinel
    /// - `ret` must be valid for writes of one `NativeSlot`
    unsafe fn call(
        &self,
        prepared: &Self::Prepared,
        address: usize,
        ret: *mut NativeSlot,
        args: *mut *mut c_void,
    );
}

/// libffi-backed engine
#[derive(Debug, Clone, Copy, Default)]
pub struct Libffi;

/// Prepared libffi call interface
///
/// The cif keeps a raw pointer into `arg_types`; both are boxed so moving
/// the descriptor never invalidates it.
pub struct LibffiCif {
    cif: Box<raw::ffi_cif>,
    // Null-terminated; the cif points at the first element
    arg_types: Box<[*mut raw::ffi_type]>,
    ret: TypeTag,
}

// SAFETY: the cif and its type array are never mutated after
// `ffi_prep_cif`, and `ffi_call` only reads them. The `ffi_type` pointers
// refer to libffi's immutable builtin type statics.
unsafe impl Send for LibffiCif {}
unsafe impl Sync for LibffiCif {}

impl LibffiCif {
    pub fn arg_count(&self) -> usize {
        self.arg_types.len() - 1
    }

    /// Sentinel-terminated argument type array
    pub fn arg_types(&self) -> &[*mut raw::ffi_type] {
        &self.arg_types
    }
}

impl CallEngine for Libffi {
    type Prepared = LibffiCif;

    fn prepare(&self, args: &[&TypeDesc], ret: &TypeDesc, abi: Abi) -> Result<LibffiCif, u32> {
        let nargs = c_uint::try_from(args.len()).map_err(|_| raw::ffi_status_FFI_BAD_TYPEDEF as u32)?;

        let mut arg_types: Box<[*mut raw::ffi_type]> = args
            .iter()
            .map(|desc| ffi_type_for(desc.tag))
            .chain(core::iter::once(ptr::null_mut()))
            .collect();

        // SAFETY: ffi_cif is plain data; all-zero is its unprepared state
        let mut cif: Box<raw::ffi_cif> = Box::new(unsafe { core::mem::zeroed() });

        // SAFETY: `cif` and `arg_types` are live, boxed (address-stable)
        // and owned by the returned value; the type pointers are libffi
        // builtins
        let status = unsafe {
            raw::ffi_prep_cif(
                &mut *cif,
                abi.raw() as raw::ffi_abi,
                nargs,
                ffi_type_for(ret.tag),
                arg_types.as_mut_ptr(),
            )
        };

        if status != raw::ffi_status_FFI_OK {
            return Err(status as u32);
        }

        Ok(LibffiCif { cif, arg_types, ret: ret.tag })
    }

    unsafe fn call(
        &self,
        prepared: &LibffiCif,
        address: usize,
        ret: *mut NativeSlot,
        args: *mut *mut c_void,
    ) {
        // SAFETY: caller guarantees a valid, non-null function address
        let code: unsafe extern "C" fn() = core::mem::transmute(address);

        raw::ffi_call(
            &*prepared.cif as *const raw::ffi_cif as *mut raw::ffi_cif,
            Some(code),
            ret as *mut c_void,
            args,
        );

        widen_return(prepared.ret, ret);
    }
}

/// Normalise integer returns narrower than a register
///
/// libffi stores such results as a full `ffi_arg`; re-store them at their
/// own width so the slot can be read through the matching union member on
/// any endianness.
unsafe fn widen_return(tag: TypeTag, ret: *mut NativeSlot) {
    if !(tag.is_integral() || tag == TypeTag::Bool)
        || tag.size() >= core::mem::size_of::<raw::ffi_arg>()
    {
        return;
    }

    let word = ptr::read(ret as *const raw::ffi_arg);
    let mut slot = NativeSlot::zeroed();
    match tag {
        TypeTag::I8 => slot.i8 = word as i8,
        TypeTag::U8 => slot.u8 = word as u8,
        TypeTag::I16 => slot.i16 = word as i16,
        TypeTag::U16 => slot.u16 = word as u16,
        TypeTag::I32 => slot.i32 = word as i32,
        TypeTag::U32 => slot.u32 = word as u32,
        TypeTag::Bool => slot.u8 = (word as u8 != 0) as u8,
        _ => return,
    }
    ptr::write(ret, slot);
}

/// libffi builtin type for a canonical tag
fn ffi_type_for(tag: TypeTag) -> *mut raw::ffi_type {
    // SAFETY: only the address of the statics is taken; libffi never
    // mutates its builtin scalar types
    unsafe {
        match tag {
            TypeTag::Void => addr_of_mut!(raw::ffi_type_void),
            TypeTag::I8 => addr_of_mut!(raw::ffi_type_sint8),
            TypeTag::U8 => addr_of_mut!(raw::ffi_type_uint8),
            TypeTag::I16 => addr_of_mut!(raw::ffi_type_sint16),
            TypeTag::U16 => addr_of_mut!(raw::ffi_type_uint16),
            TypeTag::I32 => addr_of_mut!(raw::ffi_type_sint32),
            TypeTag::U32 => addr_of_mut!(raw::ffi_type_uint32),
            TypeTag::I64 => addr_of_mut!(raw::ffi_type_sint64),
            TypeTag::U64 => addr_of_mut!(raw::ffi_type_uint64),
            TypeTag::F32 => addr_of_mut!(raw::ffi_type_float),
            TypeTag::F64 => addr_of_mut!(raw::ffi_type_double),
            TypeTag::Pointer => addr_of_mut!(raw::ffi_type_pointer),
            TypeTag::Bool => addr_of_mut!(raw::ffi_type_uint8),
        }
    }
}

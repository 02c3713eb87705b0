//! Argument frames - one contiguous buffer per call
//!
//! Layout: `argc` slots followed by `argc + 1` slot pointers, the last one
//! a null sentinel. The slot region comes first so both regions are
//! naturally aligned. The buffer is released on drop, so every exit path
//! (including a marshaling failure halfway through) frees it.

use super::descriptor::check_max_args;
use super::types::NativeSlot;
use crate::errors::{FiddleError, Result};
use core::ffi::c_void;
use core::mem::{align_of, size_of};
use core::ptr::{self, NonNull};
use std::alloc::{self, Layout};

/// Exact byte size of a frame for `argc` arguments
pub fn frame_size(argc: usize) -> Result<usize> {
    check_max_args("number of arguments", argc)?;
    let overflow = || FiddleError::Overflow {
        what: "argument frame",
        len: argc,
        max: super::descriptor::MAX_ARGS,
    };

    let slots = argc.checked_mul(size_of::<NativeSlot>()).ok_or_else(overflow)?;
    let pointers = argc
        .checked_add(1)
        .and_then(|n| n.checked_mul(size_of::<*mut c_void>()))
        .ok_or_else(overflow)?;
    slots.checked_add(pointers).ok_or_else(overflow)
}

pub(crate) struct ArgFrame {
    base: NonNull<u8>,
    layout: Layout,
    argc: usize,
}

impl ArgFrame {
    /// Allocate a zeroed frame for `argc` arguments
    pub fn new(argc: usize) -> Result<Self> {
        let size = frame_size(argc)?;
        let layout = Layout::from_size_align(size, align_of::<NativeSlot>())
            .map_err(|_| FiddleError::Alloc { size })?;

        // SAFETY: size is at least one pointer, never zero
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        let base = NonNull::new(raw).ok_or(FiddleError::Alloc { size })?;

        Ok(Self { base, layout, argc })
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.layout.size()
    }

    #[inline]
    fn slots(&self) -> *mut NativeSlot {
        self.base.as_ptr() as *mut NativeSlot
    }

    #[inline]
    fn pointers(&self) -> *mut *mut c_void {
        // SAFETY: the pointer region starts right after `argc` slots,
        // within the allocation
        unsafe { self.base.as_ptr().add(self.argc * size_of::<NativeSlot>()) as *mut *mut c_void }
    }

    /// The slot region, zero-initialised
    pub fn slots_mut(&mut self) -> &mut [NativeSlot] {
        // SAFETY: `argc` slots live at the start of the allocation, which is
        // zeroed (a valid `NativeSlot`) and exclusively borrowed through `self`
        unsafe { core::slice::from_raw_parts_mut(self.slots(), self.argc) }
    }

    /// Point entry `i` at slot `i`, write the null sentinel and hand out
    /// the pointer region
    pub fn finish(&mut self) -> *mut *mut c_void {
        let slots = self.slots();
        let pointers = self.pointers();
        // SAFETY: entries `0..=argc` are exactly the pointer region
        unsafe {
            for i in 0..self.argc {
                ptr::write(pointers.add(i), slots.add(i) as *mut c_void);
            }
            ptr::write(pointers.add(self.argc), ptr::null_mut());
        }
        pointers
    }
}

impl Drop for ArgFrame {
    fn drop(&mut self) {
        // SAFETY: allocated in `new` with this exact layout
        unsafe { alloc::dealloc(self.base.as_ptr(), self.layout) }
    }
}

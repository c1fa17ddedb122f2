//! [`NanPoison`], the global allocator that gives the allocation hook
//! something to hook.

use std::{
    alloc::{GlobalAlloc, Layout, System},
    cmp, ptr,
};

use super::hook::current_hook;
use crate::util::hint::cold;

/// A wrapper around another `GlobalAlloc` that routes `alloc()` through the
/// process-wide allocation hook. Register it as the global allocator to make
/// poisoning possible at all:
///
/// ```no_run
/// use std::alloc::System;
/// use fpetrap::NanPoison;
///
/// #[global_allocator]
/// static GLOBAL: NanPoison<System> = NanPoison::new(System);
/// # fn main() {}
/// ```
///
/// With no hook installed it costs one atomic load per allocation.
pub struct NanPoison<A = System> {
    inner: A,
}

impl<A> NanPoison<A> {
    pub const fn new(inner: A) -> Self {
        Self { inner }
    }

    /// The allocator this forwards to
    pub const fn inner(&self) -> &A {
        &self.inner
    }
}

unsafe impl<A> GlobalAlloc for NanPoison<A>
where
    A: GlobalAlloc,
{
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        match current_hook() {
            None => self.inner.alloc(layout),
            // SAFETY: hooks promise to allocate from `real` and respect
            // `layout` (see `MallocHook`)
            Some(hook) => hook(layout, &self.inner),
        }
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        // Zeroes were asked for, so there's nothing uninitialised to poison
        self.inner.alloc_zeroed(layout)
    }

    unsafe fn dealloc(&self, data: *mut u8, layout: Layout) {
        // SAFETY: everything we hand out was allocated by `inner`, hooked or
        // not. Same contract as the caller otherwise.
        self.inner.dealloc(data, layout)
    }

    unsafe fn realloc(&self, data: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        if current_hook().is_none() {
            return self.inner.realloc(data, layout, new_size);
        }
        // Hooked: go through `alloc()` so the grown tail gets the hook too.
        // SAFETY: the caller guarantees `new_size` rounded up to
        // `layout.align()` doesn't overflow
        let new_layout = Layout::from_size_align_unchecked(new_size, layout.align());
        let new = self.alloc(new_layout);
        if new.is_null() {
            return cold(|| new);
        }
        // SAFETY: both blocks are live, distinct, and at least this big
        ptr::copy_nonoverlapping(data, new, cmp::min(layout.size(), new_size));
        self.dealloc(data, layout);
        new
    }
}

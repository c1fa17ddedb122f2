//! The process-wide allocation hook.
//!
//! Rust allocates through the `#[global_allocator]`, not through a patchable
//! `malloc()`. [`NanPoison`](super::NanPoison) supplies the patch point: on
//! every `alloc()` it looks here, and if a hook is set it calls that instead of
//! the allocator it wraps.

use std::{
    alloc::{GlobalAlloc, Layout},
    mem,
    ptr,
    sync::atomic::{AtomicPtr, Ordering},
};

/// Replacement for `GlobalAlloc::alloc()`.
///
/// `real` is the allocator `NanPoison` wraps. A hook must get its memory from
/// `real` (the block is later handed to `real.dealloc()`), and must return
/// null or a block that fits `layout`.
pub type MallocHook = unsafe fn(layout: Layout, real: &dyn GlobalAlloc) -> *mut u8;

/// null = no hook
static MALLOC_HOOK: AtomicPtr<()> = AtomicPtr::new(ptr::null_mut());

fn encode(hook: Option<MallocHook>) -> *mut () {
    match hook {
        Some(hook) => hook as *mut (),
        None => ptr::null_mut(),
    }
}

fn decode(raw: *mut ()) -> Option<MallocHook> {
    if raw.is_null() {
        None
    } else {
        // SAFETY: the only non-null values ever stored come from `encode()`
        Some(unsafe { mem::transmute::<*mut (), MallocHook>(raw) })
    }
}

/// The hook currently installed, if any
pub fn current_hook() -> Option<MallocHook> {
    decode(MALLOC_HOOK.load(Ordering::Acquire))
}

/// Is any hook installed?
pub fn is_hooked() -> bool {
    !MALLOC_HOOK.load(Ordering::Acquire).is_null()
}

/// Install `hook` (or clear the slot with `None`), returning the previous one.
pub fn swap_hook(hook: Option<MallocHook>) -> Option<MallocHook> {
    decode(MALLOC_HOOK.swap(encode(hook), Ordering::AcqRel))
}

/// Install `new` only if the slot still holds `expected`. Otherwise the slot
/// is left as it is and its occupant is returned.
pub fn replace_hook(
    expected: Option<MallocHook>,
    new: Option<MallocHook>,
) -> Result<(), Option<MallocHook>> {
    MALLOC_HOOK
        .compare_exchange(encode(expected), encode(new), Ordering::AcqRel, Ordering::Acquire)
        .map(drop)
        .map_err(decode)
}

#[cfg(test)]
mod tests {
    use super::*;

    unsafe fn passthrough(layout: Layout, real: &dyn GlobalAlloc) -> *mut u8 {
        real.alloc(layout)
    }

    fn addr(hook: Option<MallocHook>) -> usize {
        encode(hook) as usize
    }

    #[test]
    fn replace_only_lands_on_the_expected_occupant() {
        assert!(!is_hooked());
        replace_hook(None, Some(passthrough)).unwrap();
        assert_eq!(addr(current_hook()), addr(Some(passthrough)));

        // Slot isn't empty any more, so this must not clear it
        let occupant = replace_hook(None, None).unwrap_err();
        assert_eq!(addr(occupant), addr(Some(passthrough)));
        assert!(is_hooked());

        replace_hook(Some(passthrough), None).unwrap();
        assert!(!is_hooked());
    }
}

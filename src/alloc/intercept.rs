//! Poisoning fresh allocations, and whether we can.

use std::{
    alloc::{GlobalAlloc, Layout},
    cell::Cell,
    mem::{self, size_of},
    ptr,
    sync::atomic::{AtomicPtr, Ordering},
};

use super::hook::MallocHook;
use crate::{
    error::TrapError,
    nan::{fill_signalling_nan_raw, Scalar},
    util::hint::cold,
};

/// Something that can put the NaN hook in place of the allocation hook and
/// take it out again. [`PlatformInterceptor`] is the one for this build.
pub trait AllocInterceptor {
    /// Would [`install()`](Self::install) actually see allocations?
    fn supported(&self) -> bool;

    /// Start poisoning, returning the hook that was installed before.
    fn install(&self) -> Result<Option<MallocHook>, TrapError>;

    /// Undo [`install()`](Self::install)
    fn restore(&self, previous: Option<MallocHook>);
}

/// For builds where allocations can't be intercepted. Never supported.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoInterceptor;

impl AllocInterceptor for NoInterceptor {
    fn supported(&self) -> bool {
        false
    }

    fn install(&self) -> Result<Option<MallocHook>, TrapError> {
        Err(TrapError::ConfigurationUnsupported)
    }

    fn restore(&self, _: Option<MallocHook>) {}
}

#[cfg(all(unix, feature = "alloc-hook"))]
pub use self::hooked::HookInterceptor;

#[cfg(all(unix, feature = "alloc-hook"))]
pub type PlatformInterceptor = HookInterceptor;
#[cfg(not(all(unix, feature = "alloc-hook")))]
pub type PlatformInterceptor = NoInterceptor;

#[cfg(all(unix, feature = "alloc-hook"))]
mod hooked {
    use std::{
        alloc::{GlobalAlloc, Layout},
        hint::black_box,
        ptr,
        sync::atomic::{AtomicBool, Ordering},
    };

    use once_cell::sync::OnceCell;

    use super::{nan_malloc_hook, AllocInterceptor, CHAINED_HOOK};
    use crate::{
        alloc::hook::{current_hook, replace_hook, swap_hook, MallocHook},
        error::TrapError,
    };

    static PROBED: AtomicBool = AtomicBool::new(false);
    /// Whether the probe reached the hook slot. Decided once per process.
    static CAPABLE: OnceCell<bool> = OnceCell::new();

    unsafe fn probe_hook(layout: Layout, real: &dyn GlobalAlloc) -> *mut u8 {
        PROBED.store(true, Ordering::Relaxed);
        real.alloc(layout)
    }

    /// Put `probe_hook` in the empty slot, allocate once, and take it out
    /// again. Fails, touching nothing, if the slot is occupied.
    fn probe() -> Result<bool, Option<MallocHook>> {
        PROBED.store(false, Ordering::Relaxed);
        replace_hook(None, Some(probe_hook))?;
        drop(black_box(Box::new(0u64)));
        // Only fails if someone swapped the slot behind our back, and then
        // their hook is the one that should stay
        let _ = replace_hook(Some(probe_hook), None);
        Ok(PROBED.load(Ordering::Relaxed))
    }

    /// Installs [`nan_malloc_hook()`] into the hook slot that
    /// [`NanPoison`](crate::NanPoison) consults.
    #[derive(Clone, Copy, Debug, Default)]
    pub struct HookInterceptor;

    impl AllocInterceptor for HookInterceptor {
        /// Only if a `NanPoison` is the global allocator. The first call probes
        /// the empty hook slot, later calls reuse the answer. A slot some other
        /// hook already holds is never touched; that counts as unsupported
        /// until a probe gets to run.
        fn supported(&self) -> bool {
            match CAPABLE.get_or_try_init(probe) {
                Ok(&capable) => capable,
                Err(_) => {
                    log::debug!("allocation hook slot busy, not probing");
                    false
                }
            }
        }

        fn install(&self) -> Result<Option<MallocHook>, TrapError> {
            // Chain first: the moment the swap lands, the hook may run
            let previous = current_hook();
            CHAINED_HOOK.store(encode(previous), Ordering::Release);
            Ok(swap_hook(Some(nan_malloc_hook)))
        }

        fn restore(&self, previous: Option<MallocHook>) {
            swap_hook(previous);
            CHAINED_HOOK.store(ptr::null_mut(), Ordering::Release);
        }
    }

    fn encode(hook: Option<MallocHook>) -> *mut () {
        hook.map_or(ptr::null_mut(), |hook| hook as *mut ())
    }
}

/// The hook that was installed before ours; allocations go through it (or
/// straight to `real` when null) before being poisoned.
static CHAINED_HOOK: AtomicPtr<()> = AtomicPtr::new(ptr::null_mut());

fn chained_hook() -> Option<MallocHook> {
    let raw = CHAINED_HOOK.load(Ordering::Acquire);
    if raw.is_null() {
        None
    } else {
        // SAFETY: only `MallocHook`s are ever stored
        Some(unsafe { mem::transmute::<*mut (), MallocHook>(raw) })
    }
}

thread_local! {
    /// Set while this thread is inside [`nan_malloc_hook()`]
    static POISONING: Cell<bool> = const { Cell::new(false) };
}

/// Marks the current thread as poisoning until dropped.
pub struct ReentrancyGuard(());

impl ReentrancyGuard {
    /// `None` if this thread is already inside the hook (or is tearing down
    /// its thread locals, in which case poisoning isn't worth the risk).
    pub fn enter() -> Option<Self> {
        POISONING
            .try_with(|p| (!p.replace(true)).then(|| Self(())))
            .ok()
            .flatten()
    }
}

impl Drop for ReentrancyGuard {
    fn drop(&mut self) {
        let _ = POISONING.try_with(|p| p.set(false));
    }
}

/// Allocate through the previous hook (or `real`), then fill every whole
/// [`Scalar`] of the block with signalling NaN. Null and short blocks come
/// back untouched, and so does anything allocated while this thread is
/// already in here.
///
/// # Safety
///
/// The `GlobalAlloc::alloc()` contract: `layout` has non-zero size.
pub unsafe fn nan_malloc_hook(layout: Layout, real: &dyn GlobalAlloc) -> *mut u8 {
    let Some(_guard) = ReentrancyGuard::enter() else {
        return cold(|| real.alloc(layout));
    };
    let data = match chained_hook() {
        Some(hook) => hook(layout, real),
        None => real.alloc(layout),
    };
    if !data.is_null() {
        poison_block(data, layout.size());
    }
    data
}

/// Fill the whole `Scalar`s of a `size`-byte block. The tail (and any block
/// smaller than one `Scalar`) is left alone.
///
/// # Safety
///
/// `data` must be valid for writes of `size` bytes.
pub unsafe fn poison_block(data: *mut u8, size: usize) {
    let len = size / size_of::<Scalar>();
    if len > 0 {
        fill_signalling_nan_raw(data.cast::<Scalar>(), len);
    }
}

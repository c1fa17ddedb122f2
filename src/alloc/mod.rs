//! Allocation interception: the hook slot, the `GlobalAlloc` that consults
//! it, and the hook that poisons.

pub mod hook;
pub mod intercept;
pub mod nan_poison;

pub use hook::{current_hook, is_hooked, replace_hook, swap_hook, MallocHook};
pub use intercept::{nan_malloc_hook, AllocInterceptor, NoInterceptor, PlatformInterceptor};
pub use nan_poison::NanPoison;

#[cfg(all(unix, feature = "alloc-hook"))]
pub use intercept::HookInterceptor;

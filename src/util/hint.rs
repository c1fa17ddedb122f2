/// Mark the enclosed path as unlikely. Used on the failure and re-entry
/// branches of the allocation path.
#[cold]
#[inline(never)]
pub fn cold<R, F: FnOnce() -> R>(f: F) -> R {
    f()
}

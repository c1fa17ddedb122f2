//! Call stack printing for the signal handler.
//!
//! glibc's `backtrace_symbols_fd()` writes straight to a descriptor without
//! calling malloc(). `backtrace()` itself only allocates the first time, when
//! it dlopen()s libgcc_s, so [`warm_up()`] does that in normal context.

#[cfg(all(target_os = "linux", target_env = "gnu"))]
mod imp {
    use std::ptr;

    use libc::{c_int, c_void, STDERR_FILENO};
    use once_cell::sync::OnceCell;

    const MAX_FRAMES: usize = 64;

    extern "C" {
        fn backtrace(buffer: *mut *mut c_void, size: c_int) -> c_int;
        fn backtrace_symbols_fd(buffer: *const *mut c_void, size: c_int, fd: c_int);
    }

    static WARM: OnceCell<()> = OnceCell::new();

    pub fn warm_up() {
        WARM.get_or_init(|| {
            let mut frames = [ptr::null_mut(); 1];
            // SAFETY: room for exactly one frame
            unsafe { backtrace(frames.as_mut_ptr(), 1) };
        });
    }

    pub fn print_stack() {
        let mut frames = [ptr::null_mut::<c_void>(); MAX_FRAMES];
        // SAFETY: `frames` has room for MAX_FRAMES entries and
        // backtrace_symbols_fd() reads back only the `n` that were filled
        unsafe {
            let n = backtrace(frames.as_mut_ptr(), MAX_FRAMES as c_int);
            if n > 0 {
                backtrace_symbols_fd(frames.as_ptr(), n, STDERR_FILENO);
            }
        }
    }
}

#[cfg(not(all(target_os = "linux", target_env = "gnu")))]
mod imp {
    use crate::util::print::putstr;

    pub fn warm_up() {}

    pub fn print_stack() {
        putstr("    (not available on this platform)\n");
    }
}

/// Make sure [`print_stack()`] won't need to allocate. Idempotent.
pub fn warm_up() {
    imp::warm_up()
}

/// Write the current call stack to stderr. Async-signal-safe after
/// [`warm_up()`].
pub fn print_stack() {
    imp::print_stack()
}

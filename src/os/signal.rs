//! The SIGFPE disposition and the handler that ends the process.
//!
//! Everything reachable from [`sigfpe_handler()`] is async-signal-safe: no
//! allocation, no locks, no `log`. Output goes through fixed stack buffers
//! straight to fd 2.

use std::{fmt, io, mem, ptr};

use libc::{c_int, c_void, siginfo_t};

pub use libc::SIGFPE;

use crate::{
    error::TrapError,
    os::backtrace,
    util::print::{putstr, StackBuf},
};

/// Flags the kernel or libc add on their own (`SA_RESTORER` on Linux). They
/// show up in a queried disposition even though nobody asked for them.
#[cfg(any(target_os = "linux", target_os = "android"))]
const IMPLICIT_FLAGS: c_int = 0x0400_0000;
#[cfg(not(any(target_os = "linux", target_os = "android")))]
const IMPLICIT_FLAGS: c_int = 0;

/// Highest signal number we compare masks over (`_NSIG - 1` on Linux).
const MAX_SIGNAL: c_int = 64;

/// A signal disposition as `sigaction()` reported it. Opaque: all you can do
/// is put it back, or compare it with another one.
#[derive(Clone, Copy)]
pub struct SavedDisposition {
    action: libc::sigaction,
}

impl SavedDisposition {
    /// What `sig` is set to right now
    pub fn query(sig: c_int) -> Result<Self, TrapError> {
        // SAFETY: all-zeroes is a valid `sigaction` (SIG_DFL, empty mask).
        // A null `act` makes this a pure query.
        let mut action: libc::sigaction = unsafe { mem::zeroed() };
        if unsafe { libc::sigaction(sig, ptr::null(), &mut action) } != 0 {
            return Err(TrapError::Sigaction(io::Error::last_os_error()));
        }
        Ok(Self { action })
    }

    /// The handler address, or `SIG_DFL`/`SIG_IGN`
    pub fn handler(&self) -> libc::sighandler_t {
        self.action.sa_sigaction
    }

    pub fn is_default(&self) -> bool {
        self.handler() == libc::SIG_DFL
    }

    /// Is this the disposition [`install_sigfpe_handler()`] sets?
    pub fn is_fpetrap_handler(&self) -> bool {
        self.handler() == sigfpe_handler as libc::sighandler_t
    }

    fn flags(&self) -> c_int {
        self.action.sa_flags & !IMPLICIT_FLAGS
    }

    fn blocks(&self, sig: c_int) -> bool {
        // SAFETY: `sa_mask` is initialised (zeroed or filled by the kernel).
        // An invalid `sig` just gives -1, which compares fine.
        unsafe { libc::sigismember(&self.action.sa_mask, sig) == 1 }
    }
}

impl PartialEq for SavedDisposition {
    fn eq(&self, other: &Self) -> bool {
        self.handler() == other.handler()
            && self.flags() == other.flags()
            && (1..=MAX_SIGNAL).all(|sig| self.blocks(sig) == other.blocks(sig))
    }
}

impl Eq for SavedDisposition {}

impl fmt::Debug for SavedDisposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("SavedDisposition");
        match self.handler() {
            libc::SIG_DFL => d.field("handler", &"SIG_DFL"),
            libc::SIG_IGN => d.field("handler", &"SIG_IGN"),
            h => d.field("handler", &(h as *const c_void)),
        };
        d.field("flags", &format_args!("{:#x}", self.flags())).finish()
    }
}

/// Point SIGFPE at [`sigfpe_handler()`], returning the disposition it had.
pub fn install_sigfpe_handler() -> Result<SavedDisposition, TrapError> {
    // SAFETY: zeroed is a valid `sigaction`. The handler has the
    // `SA_SIGINFO` signature.
    unsafe {
        let mut action: libc::sigaction = mem::zeroed();
        action.sa_sigaction = sigfpe_handler as libc::sighandler_t;
        action.sa_flags = libc::SA_SIGINFO;
        libc::sigemptyset(&mut action.sa_mask);
        replace(SIGFPE, &action)
    }
}

/// Put back a disposition from [`SavedDisposition::query()`] or
/// [`install_sigfpe_handler()`].
pub fn restore(sig: c_int, saved: &SavedDisposition) -> Result<(), TrapError> {
    // SAFETY: `saved` came out of sigaction(), so it's a valid disposition
    unsafe { replace(sig, &saved.action) }.map(|_| ())
}

unsafe fn replace(sig: c_int, action: &libc::sigaction) -> Result<SavedDisposition, TrapError> {
    let mut old: libc::sigaction = mem::zeroed();
    if libc::sigaction(sig, action, &mut old) != 0 {
        return Err(TrapError::Sigaction(io::Error::last_os_error()));
    }
    Ok(SavedDisposition { action: old })
}

// si_code values for SIGFPE
#[cfg(not(any(target_os = "macos", target_os = "ios")))]
mod code {
    use libc::c_int;
    pub const INTDIV: c_int = 1;
    pub const INTOVF: c_int = 2;
    pub const FLTDIV: c_int = 3;
    pub const FLTOVF: c_int = 4;
    pub const FLTUND: c_int = 5;
    pub const FLTRES: c_int = 6;
    pub const FLTINV: c_int = 7;
    pub const FLTSUB: c_int = 8;
}

#[cfg(any(target_os = "macos", target_os = "ios"))]
mod code {
    use libc::c_int;
    pub const FLTDIV: c_int = 1;
    pub const FLTOVF: c_int = 2;
    pub const FLTUND: c_int = 3;
    pub const FLTRES: c_int = 4;
    pub const FLTINV: c_int = 5;
    pub const FLTSUB: c_int = 6;
    pub const INTDIV: c_int = 7;
    pub const INTOVF: c_int = 8;
}

/// Human name for a SIGFPE `si_code`
pub fn describe_code(si_code: c_int) -> &'static str {
    match si_code {
        code::INTDIV => "integer divide by zero",
        code::INTOVF => "integer overflow",
        code::FLTDIV => "floating point divide by zero",
        code::FLTOVF => "floating point overflow",
        code::FLTUND => "floating point underflow",
        code::FLTRES => "floating point inexact result",
        code::FLTINV => "floating point invalid operation",
        code::FLTSUB => "subscript out of range",
        _ => "unknown cause",
    }
}

#[cfg(any(target_os = "linux", target_os = "android"))]
unsafe fn fault_address(info: &siginfo_t) -> *mut c_void {
    info.si_addr()
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
unsafe fn fault_address(info: &siginfo_t) -> *mut c_void {
    info.si_addr
}

/// Runs on the faulting thread. Never returns control to the faulting code:
/// it resets SIGFPE to `SIG_DFL` first, prints what it can, and re-raises so
/// the process dies by the signal (core dump and all) rather than exiting.
extern "C" fn sigfpe_handler(sig: c_int, info: *mut siginfo_t, _: *mut c_void) {
    use fmt::Write;

    // SAFETY: sigaction() and raise() are async-signal-safe. Resetting first
    // means a fault inside the diagnostics below also ends the process.
    unsafe {
        let mut dfl: libc::sigaction = mem::zeroed();
        dfl.sa_sigaction = libc::SIG_DFL;
        libc::sigaction(sig, &dfl, ptr::null_mut());
    }

    let mut buf = StackBuf::<160>::new();
    let _ = write!(buf, "\n*** Floating point exception (signal {sig})");
    // SAFETY: with SA_SIGINFO the kernel passes a valid `siginfo_t`
    if let Some(info) = unsafe { info.as_ref() } {
        let _ = write!(
            buf,
            ": {} at {:p}",
            describe_code(info.si_code),
            unsafe { fault_address(info) }
        );
    }
    let _ = buf.write_str(" ***\n");
    buf.flush();

    putstr("Call stack:\n");
    backtrace::print_stack();

    // SIGFPE is blocked until we return. It's delivered with the default
    // action as soon as we do, and if the faulting instruction runs again
    // first, that raises it with the default action too.
    unsafe {
        libc::raise(sig);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queries_agree_with_each_other() {
        let a = SavedDisposition::query(libc::SIGFPE).unwrap();
        let b = SavedDisposition::query(libc::SIGFPE).unwrap();
        assert_eq!(a, b);
        assert!(!a.is_fpetrap_handler());
    }

    #[test]
    fn bad_signal_numbers_are_an_error() {
        assert!(matches!(
            SavedDisposition::query(-1),
            Err(TrapError::Sigaction(_))
        ));
    }

    #[test]
    fn codes_have_names() {
        assert_eq!(describe_code(code::FLTINV), "floating point invalid operation");
        assert_eq!(describe_code(code::FLTDIV), "floating point divide by zero");
        assert_eq!(describe_code(code::INTDIV), "integer divide by zero");
        assert_eq!(describe_code(-42), "unknown cause");
    }
}

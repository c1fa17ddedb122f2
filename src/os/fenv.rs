//! Which floating point exceptions trap.
//!
//! This is per-thread state (x87 control word, MXCSR, FPCR...). Changing it
//! affects the calling thread and threads it spawns afterwards, nothing else.

use std::{fmt, ops::BitOr};

use libc::c_int;

use crate::error::TrapError;

/// A set of `FE_*` exception flags, in the platform's own encoding.
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct FpExceptions(c_int);

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
mod bits {
    use libc::c_int;
    pub const INVALID: c_int = 0x01;
    pub const DIVBYZERO: c_int = 0x04;
    pub const OVERFLOW: c_int = 0x08;
    pub const UNDERFLOW: c_int = 0x10;
    pub const INEXACT: c_int = 0x20;
}

#[cfg(any(target_arch = "aarch64", target_arch = "arm"))]
mod bits {
    use libc::c_int;
    pub const INVALID: c_int = 0x01;
    pub const DIVBYZERO: c_int = 0x02;
    pub const OVERFLOW: c_int = 0x04;
    pub const UNDERFLOW: c_int = 0x08;
    pub const INEXACT: c_int = 0x10;
}

#[cfg(any(target_arch = "riscv32", target_arch = "riscv64"))]
mod bits {
    use libc::c_int;
    pub const INEXACT: c_int = 0x01;
    pub const UNDERFLOW: c_int = 0x02;
    pub const OVERFLOW: c_int = 0x04;
    pub const DIVBYZERO: c_int = 0x08;
    pub const INVALID: c_int = 0x10;
}

// Somewhere we don't know the encoding of. Nothing can be enabled there anyway.
#[cfg(not(any(
    target_arch = "x86",
    target_arch = "x86_64",
    target_arch = "aarch64",
    target_arch = "arm",
    target_arch = "riscv32",
    target_arch = "riscv64"
)))]
mod bits {
    use libc::c_int;
    pub const INVALID: c_int = 0x01;
    pub const DIVBYZERO: c_int = 0x02;
    pub const OVERFLOW: c_int = 0x04;
    pub const UNDERFLOW: c_int = 0x08;
    pub const INEXACT: c_int = 0x10;
}

impl FpExceptions {
    pub const NONE: Self = Self(0);
    pub const INVALID: Self = Self(bits::INVALID);
    pub const DIVIDE_BY_ZERO: Self = Self(bits::DIVBYZERO);
    pub const OVERFLOW: Self = Self(bits::OVERFLOW);
    pub const UNDERFLOW: Self = Self(bits::UNDERFLOW);
    pub const INEXACT: Self = Self(bits::INEXACT);
    pub const ALL: Self = Self(
        bits::INVALID | bits::DIVBYZERO | bits::OVERFLOW | bits::UNDERFLOW | bits::INEXACT,
    );

    /// The classes that mean a real bug: invalid operation, divide by zero and
    /// overflow. Underflow and inexact happen in correct code all the time.
    pub const TRAPPED: Self = Self(bits::INVALID | bits::DIVBYZERO | bits::OVERFLOW);

    pub const fn bits(self) -> c_int {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    // Only the glibc backend reads masks back
    #[allow(dead_code)]
    const fn from_bits_truncate(bits: c_int) -> Self {
        Self(bits & Self::ALL.0)
    }
}

impl BitOr for FpExceptions {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Debug for FpExceptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(FpExceptions, &str); 5] = [
            (FpExceptions::INVALID, "INVALID"),
            (FpExceptions::DIVIDE_BY_ZERO, "DIVBYZERO"),
            (FpExceptions::OVERFLOW, "OVERFLOW"),
            (FpExceptions::UNDERFLOW, "UNDERFLOW"),
            (FpExceptions::INEXACT, "INEXACT"),
        ];
        let mut set = f.debug_set();
        for (flag, name) in NAMES {
            if self.contains(flag) {
                set.entry(&format_args!("{name}"));
            }
        }
        set.finish()
    }
}

/// glibc has `feenableexcept()` and friends. musl, the BSDs and macOS don't.
#[cfg(all(
    target_os = "linux",
    target_env = "gnu",
    any(
        target_arch = "x86",
        target_arch = "x86_64",
        target_arch = "aarch64",
        target_arch = "arm",
        target_arch = "riscv32",
        target_arch = "riscv64"
    )
))]
mod imp {
    use libc::c_int;

    use super::FpExceptions;
    use crate::error::TrapError;

    #[link(name = "m")]
    extern "C" {
        fn feenableexcept(excepts: c_int) -> c_int;
        fn fedisableexcept(excepts: c_int) -> c_int;
        fn fegetexcept() -> c_int;
        fn feclearexcept(excepts: c_int) -> c_int;
    }

    pub fn enabled() -> FpExceptions {
        // SAFETY: reads this thread's control register, nothing else
        let bits = unsafe { fegetexcept() };
        if bits < 0 {
            FpExceptions::NONE
        } else {
            FpExceptions::from_bits_truncate(bits)
        }
    }

    pub fn enable(excepts: FpExceptions) -> Result<FpExceptions, TrapError> {
        // SAFETY: FE_* bits for this arch. Sticky flags raised before now
        // must not fire the moment the trap is unmasked, so clear them first.
        let old = unsafe {
            feclearexcept(FpExceptions::ALL.bits());
            feenableexcept(excepts.bits())
        };
        if old < 0 {
            // e.g. most aarch64 cores implement no trapping at all
            return Err(TrapError::FenvUnsupported);
        }
        Ok(FpExceptions::from_bits_truncate(old))
    }

    pub fn set_enabled(excepts: FpExceptions) -> Result<(), TrapError> {
        // SAFETY: as above
        unsafe {
            fedisableexcept((FpExceptions::ALL.bits()) & !excepts.bits());
            if !excepts.is_empty() && feenableexcept(excepts.bits()) < 0 {
                return Err(TrapError::FenvUnsupported);
            }
        }
        Ok(())
    }
}

#[cfg(not(all(
    target_os = "linux",
    target_env = "gnu",
    any(
        target_arch = "x86",
        target_arch = "x86_64",
        target_arch = "aarch64",
        target_arch = "arm",
        target_arch = "riscv32",
        target_arch = "riscv64"
    )
)))]
mod imp {
    use super::FpExceptions;
    use crate::error::TrapError;

    pub fn enabled() -> FpExceptions {
        FpExceptions::NONE
    }

    pub fn enable(_: FpExceptions) -> Result<FpExceptions, TrapError> {
        Err(TrapError::FenvUnsupported)
    }

    pub fn set_enabled(excepts: FpExceptions) -> Result<(), TrapError> {
        if excepts.is_empty() {
            Ok(())
        } else {
            Err(TrapError::FenvUnsupported)
        }
    }
}

/// The exceptions that currently trap on this thread
pub fn enabled() -> FpExceptions {
    imp::enabled()
}

/// Unmask `excepts` on this thread (in addition to whatever already traps),
/// returning what trapped before.
pub fn enable(excepts: FpExceptions) -> Result<FpExceptions, TrapError> {
    imp::enable(excepts)
}

/// Make exactly `excepts` trap on this thread. Used to put back what
/// [`enable()`] returned.
pub fn set_enabled(excepts: FpExceptions) -> Result<(), TrapError> {
    imp::set_enabled(excepts)
}

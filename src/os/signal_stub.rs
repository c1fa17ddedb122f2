//! No signals here. Installing fails with `SignalsUnsupported` and the
//! controller carries on without a trap.

use libc::c_int;

use crate::error::TrapError;

pub const SIGFPE: c_int = 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SavedDisposition(());

impl SavedDisposition {
    pub fn query(_: c_int) -> Result<Self, TrapError> {
        Err(TrapError::SignalsUnsupported)
    }

    pub fn is_default(&self) -> bool {
        true
    }

    pub fn is_fpetrap_handler(&self) -> bool {
        false
    }
}

pub fn install_sigfpe_handler() -> Result<SavedDisposition, TrapError> {
    Err(TrapError::SignalsUnsupported)
}

pub fn restore(_: c_int, _: &SavedDisposition) -> Result<(), TrapError> {
    Ok(())
}

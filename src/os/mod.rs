pub mod backtrace;
pub mod fenv;

#[cfg(unix)]
pub mod signal;

#[cfg(not(unix))]
#[path = "signal_stub.rs"]
pub mod signal;

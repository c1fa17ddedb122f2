//! Fail fast on floating point bugs.
//!
//! [`SigFpe`] unmasks invalid-operation, divide-by-zero and overflow and turns
//! the resulting SIGFPE into a loud, core-dumping death with a call stack,
//! instead of a NaN quietly spreading through the rest of the run. With
//! [`NanPoison`] as the global allocator it can also fill every fresh
//! allocation with signalling NaN, so reading a scalar that was never written
//! traps on the spot.
//!
//! Both are switched by environment variables, [`config::TRAP_VAR`] and
//! [`config::POISON_VAR`]:
//!
//! ```no_run
//! use std::alloc::System;
//! use fpetrap::{NanPoison, SigFpe};
//!
//! #[global_allocator]
//! static GLOBAL: NanPoison<System> = NanPoison::new(System);
//!
//! fn main() {
//!     let mut sigfpe = SigFpe::new();
//!     sigfpe.set(true);
//!     // ... the rest of the program; `sigfpe` puts everything back on drop
//! }
//! ```

pub mod alloc;
pub mod config;
pub mod error;
pub mod nan;
pub mod os;
pub mod trap;
pub mod util;

pub use alloc::NanPoison;
pub use config::TrapConfig;
pub use error::TrapError;
pub use nan::{fill_signalling_nan, Scalar, SignallingNan};
pub use trap::SigFpe;

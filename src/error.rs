use std::{fmt, io};

/// Everything that can go wrong while arming or disarming the traps. None of
/// these are fatal: [`SigFpe`](crate::SigFpe) turns them into log records.
#[derive(Debug)]
pub enum TrapError {
    /// Poisoning was requested, but allocations can't be intercepted here.
    ConfigurationUnsupported,
    /// Something already owns the process-wide state we wanted to install.
    TrapAlreadyInstalled {
        /// `"SIGFPE handler"` or `"allocation hook"`
        what: &'static str,
    },
    /// The floating point environment can't unmask traps on this target.
    FenvUnsupported,
    /// This target has no POSIX signals.
    SignalsUnsupported,
    /// `sigaction()` said no.
    Sigaction(io::Error),
    /// A toggle variable held something that isn't a switch word.
    InvalidToggle {
        name: &'static str,
        value: String,
    },
}

impl fmt::Display for TrapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigurationUnsupported => write!(
                f,
                "initialising allocated memory to NaN is not supported on this \
                 platform (is `NanPoison` the global allocator?)"
            ),
            Self::TrapAlreadyInstalled { what } => {
                write!(f, "{what} already installed, ignoring")
            }
            Self::FenvUnsupported => write!(
                f,
                "floating point exception trapping is not supported on this platform"
            ),
            Self::SignalsUnsupported => write!(f, "signals are not supported on this platform"),
            Self::Sigaction(e) => write!(f, "cannot change SIGFPE disposition: {e}"),
            Self::InvalidToggle { name, value } => {
                write!(f, "{name}={value:?} is not a valid switch, treating as off")
            }
        }
    }
}

impl std::error::Error for TrapError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Sigaction(e) => Some(e),
            _ => None,
        }
    }
}

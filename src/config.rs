//! The two switches that decide what [`SigFpe::set`](crate::SigFpe::set)
//! turns on.

use std::env;

use crate::error::TrapError;

/// Trap floating point exceptions when set.
pub const TRAP_VAR: &str = "FPETRAP_SIGFPE";

/// Fill every fresh allocation with signalling NaN when set. Combined with
/// [`TRAP_VAR`] this makes reads of uninitialised scalars abort.
pub const POISON_VAR: &str = "FPETRAP_SETNAN";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TrapConfig {
    /// Unmask FPEs and install the SIGFPE handler
    pub trap: bool,
    /// Poison allocations with signalling NaN
    pub poison: bool,
}

impl TrapConfig {
    /// Everything on
    pub const ALL: Self = Self {
        trap: true,
        poison: true,
    };

    /// Read [`TRAP_VAR`] and [`POISON_VAR`]. A variable that doesn't parse is
    /// reported and counts as off.
    pub fn from_env() -> Self {
        Self {
            trap: env_switch_or_off(TRAP_VAR),
            poison: env_switch_or_off(POISON_VAR),
        }
    }
}

fn env_switch_or_off(name: &'static str) -> bool {
    env_switch(name).unwrap_or_else(|e| {
        log::warn!("{e}");
        false
    })
}

/// Read a switch from the environment. Unset (or not unicode) is off.
pub fn env_switch(name: &'static str) -> Result<bool, TrapError> {
    match env::var(name) {
        Ok(value) => parse_switch(&value).ok_or(TrapError::InvalidToggle { name, value }),
        Err(_) => Ok(false),
    }
}

/// `Some(on)` for the usual switch words, `None` for anything else. Empty is
/// off, so `VAR= ./solver` disables.
pub fn parse_switch(s: &str) -> Option<bool> {
    const ON: [&str; 6] = ["1", "true", "yes", "on", "y", "t"];
    const OFF: [&str; 7] = ["0", "false", "no", "off", "n", "f", "none"];

    let s = s.trim();
    if s.is_empty() {
        return Some(false);
    }
    if ON.iter().any(|w| w.eq_ignore_ascii_case(s)) {
        Some(true)
    } else if OFF.iter().any(|w| w.eq_ignore_ascii_case(s)) {
        Some(false)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn switch_words_parse_either_way() {
        for on in ["1", "true", "TRUE", "Yes", "on", "y", " t "] {
            assert_eq!(parse_switch(on), Some(true), "{on:?}");
        }
        for off in ["0", "false", "No", "OFF", "n", "f", "none", ""] {
            assert_eq!(parse_switch(off), Some(false), "{off:?}");
        }
    }

    #[test]
    fn garbage_is_rejected() {
        assert_eq!(parse_switch("maybe"), None);
        assert_eq!(parse_switch("2"), None);
        assert_eq!(parse_switch("yess"), None);
    }

    #[test]
    fn all_turns_on_both_and_default_neither() {
        assert!(TrapConfig::ALL.trap && TrapConfig::ALL.poison);
        assert_eq!(
            TrapConfig::default(),
            TrapConfig {
                trap: false,
                poison: false
            }
        );
    }

    #[test]
    fn unset_variable_is_off() {
        assert!(!env_switch("FPETRAP_TEST_SURELY_UNSET_VARIABLE").unwrap());
    }
}

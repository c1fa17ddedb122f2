//! [`SigFpe`], the guard that owns everything this crate changes about the
//! process.

use std::{
    marker::PhantomData,
    sync::atomic::{AtomicBool, Ordering},
};

use crate::{
    alloc::{AllocInterceptor, MallocHook, PlatformInterceptor},
    config::TrapConfig,
    error::TrapError,
    os::{
        backtrace,
        fenv::{self, FpExceptions},
        signal::{self, SavedDisposition, SIGFPE},
    },
};

/// Someone has the SIGFPE handler installed
static TRAP_OWNER: AtomicBool = AtomicBool::new(false);
/// Someone has the NaN allocation hook installed
static POISON_OWNER: AtomicBool = AtomicBool::new(false);

/// Traps floating point exceptions and poisons fresh allocations, for as long
/// as it lives.
///
/// Constructing one changes nothing that is in use: at most the first one in
/// the process probes the hook slot, and only while it is empty. [`set()`](Self::set) installs whatever
/// the environment asks for, and dropping puts every bit of it back. Only one
/// `SigFpe` in the process can have each piece installed at a time; the rest
/// get [`TrapError::TrapAlreadyInstalled`].
///
/// Create it on the main thread before spawning anything and drop it on the
/// same thread (the exception mask is per-thread, so `SigFpe` is `!Send`).
///
/// ```no_run
/// let mut sigfpe = fpetrap::SigFpe::new();
/// sigfpe.set(true);
///
/// let zero = std::hint::black_box(0.0f64);
/// let _ = zero / zero; // SIGFPE if FPETRAP_SIGFPE=1
/// ```
pub struct SigFpe<I = PlatformInterceptor>
where
    I: AllocInterceptor,
{
    /// SIGFPE as it was before `set()`
    old_action: Option<SavedDisposition>,
    /// This thread's trapping exceptions before `set()`
    old_fp_mask: Option<FpExceptions>,
    /// The allocation hook before `set()`. `Some(None)` means "there was no
    /// hook", plain `None` means "we never installed ours".
    old_hook: Option<Option<MallocHook>>,
    interceptor: I,
    /// Can `interceptor` see allocations?
    supports_poison: bool,
    verbose: bool,
    _not_send: PhantomData<*const ()>,
}

impl SigFpe {
    pub fn new() -> Self {
        Self::with_interceptor(PlatformInterceptor::default())
    }
}

impl Default for SigFpe {
    fn default() -> Self {
        Self::new()
    }
}

impl<I> SigFpe<I>
where
    I: AllocInterceptor,
{
    /// Use a particular way of intercepting allocations. Whether it works is
    /// decided here, once.
    pub fn with_interceptor(interceptor: I) -> Self {
        let supports_poison = interceptor.supported();
        Self {
            old_action: None,
            old_fp_mask: None,
            old_hook: None,
            interceptor,
            supports_poison,
            verbose: false,
            _not_send: PhantomData,
        }
    }

    /// Install what [`TrapConfig::from_env()`] asks for. Never fails: anything
    /// that can't be done is reported through `log` (as a warning when
    /// `verbose`, at debug level otherwise) and skipped.
    pub fn set(&mut self, verbose: bool) {
        self.set_with(TrapConfig::from_env(), verbose)
    }

    /// [`set()`](Self::set), with the switches given instead of read.
    pub fn set_with(&mut self, config: TrapConfig, verbose: bool) {
        self.verbose = verbose;

        if config.trap {
            match self.install_trap() {
                Ok(()) if verbose => log::info!("trapping floating point exceptions"),
                Ok(()) => {}
                Err(e) => self.report(e),
            }
        }

        if config.poison {
            match self.install_poison() {
                Ok(()) if verbose => log::info!("initialising allocated memory to signalling NaN"),
                Ok(()) => {}
                Err(e) => self.report(e),
            }
        }
    }

    fn install_trap(&mut self) -> Result<(), TrapError> {
        let already = TrapError::TrapAlreadyInstalled {
            what: "SIGFPE handler",
        };
        if self.old_action.is_some() {
            return Err(already);
        }
        if TRAP_OWNER
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(already);
        }

        // Handler before mask: nothing may trap while SIGFPE is still
        // whatever it was before.
        backtrace::warm_up();
        let old_action = match signal::install_sigfpe_handler() {
            Ok(old) => old,
            Err(e) => {
                TRAP_OWNER.store(false, Ordering::Release);
                return Err(e);
            }
        };
        let old_mask = match fenv::enable(FpExceptions::TRAPPED) {
            Ok(old) => old,
            Err(e) => {
                if let Err(undo) = signal::restore(SIGFPE, &old_action) {
                    self.report(undo);
                }
                TRAP_OWNER.store(false, Ordering::Release);
                return Err(e);
            }
        };

        log::debug!("SIGFPE was {old_action:?}, trapping was {old_mask:?}");
        self.old_action = Some(old_action);
        self.old_fp_mask = Some(old_mask);
        Ok(())
    }

    fn install_poison(&mut self) -> Result<(), TrapError> {
        if !self.supports_poison {
            return Err(TrapError::ConfigurationUnsupported);
        }
        let already = TrapError::TrapAlreadyInstalled {
            what: "allocation hook",
        };
        if self.old_hook.is_some() {
            return Err(already);
        }
        if POISON_OWNER
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(already);
        }

        match self.interceptor.install() {
            Ok(previous) => {
                self.old_hook = Some(previous);
                Ok(())
            }
            Err(e) => {
                POISON_OWNER.store(false, Ordering::Release);
                Err(e)
            }
        }
    }

    /// Put back everything [`set()`](Self::set) changed. Safe to call any
    /// number of times, and a no-op if nothing was installed. `Drop` calls
    /// this.
    pub fn restore(&mut self) {
        // Mask first, so nothing traps into a handler that's gone
        if let Some(mask) = self.old_fp_mask.take() {
            if let Err(e) = fenv::set_enabled(mask) {
                self.report(e);
            }
        }
        if let Some(old_action) = self.old_action.take() {
            if let Err(e) = signal::restore(SIGFPE, &old_action) {
                self.report(e);
            }
            TRAP_OWNER.store(false, Ordering::Release);
        }
        if let Some(previous) = self.old_hook.take() {
            self.interceptor.restore(previous);
            POISON_OWNER.store(false, Ordering::Release);
        }
    }

    /// Is our SIGFPE handler installed?
    pub fn is_trapping(&self) -> bool {
        self.old_action.is_some()
    }

    /// Is our allocation hook installed?
    pub fn is_poisoning(&self) -> bool {
        self.old_hook.is_some()
    }

    /// Could [`set()`](Self::set) poison allocations?
    pub fn supports_poison(&self) -> bool {
        self.supports_poison
    }

    /// The SIGFPE disposition that [`restore()`](Self::restore) will put back
    pub fn saved_disposition(&self) -> Option<&SavedDisposition> {
        self.old_action.as_ref()
    }

    fn report(&self, e: TrapError) {
        if self.verbose {
            log::warn!("{e}");
        } else {
            log::debug!("{e}");
        }
    }
}

impl<I> Drop for SigFpe<I>
where
    I: AllocInterceptor,
{
    fn drop(&mut self) {
        self.restore()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::NoInterceptor;

    const POISON_ONLY: TrapConfig = TrapConfig {
        trap: false,
        poison: true,
    };

    #[test]
    fn fresh_guard_has_nothing_installed() {
        let sigfpe = SigFpe::with_interceptor(NoInterceptor);
        assert!(!sigfpe.is_trapping());
        assert!(!sigfpe.is_poisoning());
        assert!(sigfpe.saved_disposition().is_none());
    }

    #[test]
    fn restoring_an_unset_guard_is_a_no_op() {
        let mut sigfpe = SigFpe::with_interceptor(NoInterceptor);
        sigfpe.restore();
        sigfpe.restore();
        assert!(!sigfpe.is_trapping());
    }

    #[test]
    fn poisoning_without_capability_is_skipped() {
        let mut sigfpe = SigFpe::with_interceptor(NoInterceptor);
        assert!(!sigfpe.supports_poison());
        sigfpe.set_with(POISON_ONLY, true);
        assert!(!sigfpe.is_poisoning());
        assert!(!sigfpe.is_trapping());
    }

    #[test]
    fn all_off_installs_nothing() {
        let mut sigfpe = SigFpe::with_interceptor(NoInterceptor);
        sigfpe.set_with(TrapConfig::default(), true);
        assert!(!sigfpe.is_trapping());
        assert!(!sigfpe.is_poisoning());
    }
}

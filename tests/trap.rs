//! SIGFPE installation and teardown. The disposition is process-wide, so every
//! test here holds `LOCK`.

use std::sync::{Mutex, MutexGuard};

use fpetrap::{
    alloc::NoInterceptor,
    os::signal::{SavedDisposition, SIGFPE},
    SigFpe, TrapConfig,
};

static LOCK: Mutex<()> = Mutex::new(());

const TRAP_ONLY: TrapConfig = TrapConfig {
    trap: true,
    poison: false,
};

fn serial() -> MutexGuard<'static, ()> {
    let _ = env_logger::builder().is_test(true).try_init();
    LOCK.lock().unwrap_or_else(|e| e.into_inner())
}

fn disposition() -> SavedDisposition {
    SavedDisposition::query(SIGFPE).unwrap()
}

#[test]
fn teardown_without_activation_changes_nothing() {
    let _lock = serial();
    let before = disposition();
    drop(SigFpe::with_interceptor(NoInterceptor));
    assert_eq!(disposition(), before);
}

#[test]
fn activate_then_drop_restores_the_disposition() {
    let _lock = serial();
    let before = disposition();
    {
        let mut sigfpe = SigFpe::with_interceptor(NoInterceptor);
        sigfpe.set_with(TRAP_ONLY, true);
        if sigfpe.is_trapping() {
            assert!(disposition().is_fpetrap_handler());
            assert_eq!(sigfpe.saved_disposition(), Some(&before));
        } else {
            // No trapping on this target: nothing may have been left behind
            assert_eq!(disposition(), before);
        }
    }
    assert_eq!(disposition(), before);
}

#[test]
fn activating_twice_does_not_stack() {
    let _lock = serial();
    let before = disposition();
    let mut sigfpe = SigFpe::with_interceptor(NoInterceptor);
    sigfpe.set_with(TRAP_ONLY, true);
    let trapping = sigfpe.is_trapping();
    sigfpe.set_with(TRAP_ONLY, true);
    assert_eq!(sigfpe.is_trapping(), trapping);
    if trapping {
        assert_eq!(sigfpe.saved_disposition(), Some(&before));
        assert!(disposition().is_fpetrap_handler());
    }
    drop(sigfpe);
    assert_eq!(disposition(), before);
}

#[test]
fn a_second_guard_is_refused_while_the_first_is_active() {
    let _lock = serial();
    let before = disposition();
    let mut first = SigFpe::with_interceptor(NoInterceptor);
    first.set_with(TRAP_ONLY, true);

    let mut second = SigFpe::with_interceptor(NoInterceptor);
    second.set_with(TRAP_ONLY, true);
    assert!(!second.is_trapping());
    drop(second);
    if first.is_trapping() {
        // Dropping the refused guard must not have undone the first one
        assert!(disposition().is_fpetrap_handler());
    }

    drop(first);
    assert_eq!(disposition(), before);

    // ...and once the first is gone, a new guard may install again
    let mut third = SigFpe::with_interceptor(NoInterceptor);
    third.set_with(TRAP_ONLY, false);
    if third.is_trapping() {
        assert_eq!(third.saved_disposition(), Some(&before));
    }
}

#[test]
fn explicit_restore_is_idempotent() {
    let _lock = serial();
    let before = disposition();
    let mut sigfpe = SigFpe::with_interceptor(NoInterceptor);
    sigfpe.set_with(TRAP_ONLY, true);
    sigfpe.restore();
    assert!(!sigfpe.is_trapping());
    assert_eq!(disposition(), before);
    sigfpe.restore();
    drop(sigfpe);
    assert_eq!(disposition(), before);
}

/// The fatal path, checked from outside: run this very test binary again,
/// filtered down to `child_divides_zero_by_zero`, and watch how it dies.
#[cfg(all(
    target_os = "linux",
    target_env = "gnu",
    any(target_arch = "x86", target_arch = "x86_64")
))]
mod fatal {
    use std::{env, hint::black_box, os::unix::process::ExitStatusExt, process::Command};

    use fpetrap::{config::TRAP_VAR, SigFpe};

    const CHILD_VAR: &str = "FPETRAP_TEST_CHILD";

    #[test]
    #[ignore = "run by zero_divided_by_zero_kills_the_process"]
    fn child_divides_zero_by_zero() {
        if env::var_os(CHILD_VAR).is_none() {
            return;
        }
        let mut sigfpe = SigFpe::new();
        sigfpe.set(true);
        let zero = black_box(0.0f64);
        let nan = black_box(zero / zero);
        std::process::exit(if nan.is_nan() { 0 } else { 1 });
    }

    #[test]
    fn zero_divided_by_zero_kills_the_process() {
        let output = Command::new(env::current_exe().unwrap())
            .args([
                "--exact",
                "fatal::child_divides_zero_by_zero",
                "--ignored",
                "--nocapture",
                "--test-threads=1",
            ])
            .env(CHILD_VAR, "1")
            .env(TRAP_VAR, "1")
            .output()
            .unwrap();

        assert!(!output.status.success());
        assert_eq!(output.status.signal(), Some(libc::SIGFPE));
        let stderr = String::from_utf8_lossy(&output.stderr);
        assert!(
            stderr.contains("Floating point exception"),
            "stderr was:\n{stderr}"
        );
        assert!(stderr.contains("invalid operation"), "stderr was:\n{stderr}");
    }

    #[test]
    fn without_the_switch_the_child_survives() {
        let output = Command::new(env::current_exe().unwrap())
            .args([
                "--exact",
                "fatal::child_divides_zero_by_zero",
                "--ignored",
                "--test-threads=1",
            ])
            .env(CHILD_VAR, "1")
            .env(TRAP_VAR, "0")
            .output()
            .unwrap();

        assert_eq!(output.status.code(), Some(0));
    }
}

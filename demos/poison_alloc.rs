//! Show what a fresh allocation looks like with poisoning on.
//!
//! ```sh
//! FPETRAP_SETNAN=1 RUST_LOG=info cargo run --example poison_alloc
//! ```
//!
//! Add `FPETRAP_SIGFPE=1` and the final sum traps, because one element was
//! never written.

use std::{alloc::System, hint::black_box};

use fpetrap::{NanPoison, Scalar, SigFpe, SignallingNan};

#[global_allocator]
static GLOBAL: NanPoison<System> = NanPoison::new(System);

fn main() {
    env_logger::init();

    let mut sigfpe = SigFpe::new();
    sigfpe.set(true);

    let mut v: Vec<Scalar> = Vec::with_capacity(4);
    for (i, x) in v.spare_capacity_mut().iter().enumerate() {
        // SAFETY: reading raw bits, whatever they are
        let bits = unsafe { x.as_ptr().cast::<<Scalar as SignallingNan>::Bits>().read() };
        println!(
            "v[{i}] = {bits:#x}{}",
            if bits == Scalar::SIGNALLING_NAN_BITS { " (signalling NaN)" } else { "" }
        );
    }

    v.extend([1.0, 2.0, 3.0]);
    // Forgot the fourth one
    // SAFETY: deliberately reading the element that was never written
    unsafe { v.set_len(4) };
    let sum: Scalar = black_box(&v).iter().sum();
    println!("sum = {sum}");
}

//! Divide zero by zero with the trap armed.
//!
//! ```sh
//! FPETRAP_SIGFPE=1 RUST_LOG=info cargo run --example trap_divide
//! ```
//!
//! Without `FPETRAP_SIGFPE` this prints `NaN` and exits normally. With it, the
//! process dies by SIGFPE and prints a call stack on the way out.

use std::hint::black_box;

use fpetrap::SigFpe;

fn average(xs: &[f64]) -> f64 {
    xs.iter().sum::<f64>() / xs.len() as f64
}

fn main() {
    env_logger::init();

    let mut sigfpe = SigFpe::new();
    sigfpe.set(true);

    let empty: Vec<f64> = black_box(Vec::new());
    println!("average of nothing = {}", average(&empty));
}

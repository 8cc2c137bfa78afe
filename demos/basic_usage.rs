//! Example usage of the signal derivative crate

use ndarray::{Array1, Array2};
use signal_derivative::{dxdt, methods, smooth_x, with_default_cache, Kind, Value};

fn default_params(kind: Kind) -> Vec<(&'static str, Value)> {
    match kind {
        Kind::Spectral => vec![("filter", signal_derivative::FrequencyFilter::low_pass(5.0).into())],
        Kind::Spline => vec![("s", Value::Float(0.05))],
        Kind::TrendFiltered => vec![("order", Value::Int(0)), ("alpha", Value::Float(0.01))],
        Kind::FiniteDifference => vec![("k", Value::Int(2))],
        Kind::SavitzkyGolay => vec![
            ("left", Value::Int(5)),
            ("right", Value::Int(5)),
            ("order", Value::Int(3)),
            ("iwindow", Value::Bool(true)),
        ],
        Kind::Kalman => vec![("alpha", Value::Float(0.5))],
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Signal Derivative Examples ===\n");

    let t: Vec<f64> = (0..40).map(|i| i as f64 * 0.025).collect();
    let clean: Vec<f64> = t
        .iter()
        .map(|&v| (2.0 * std::f64::consts::PI * v).sin())
        .collect();

    // Deterministic pseudo-noise
    let noisy: Vec<f64> = clean
        .iter()
        .enumerate()
        .map(|(i, v)| v + 0.05 * ((i * 7919 % 13) as f64 / 6.0 - 1.0))
        .collect();
    let x = Array1::from(noisy);

    println!("Noisy signal:");
    print_signal(x.as_slice().unwrap_or(&[]));

    // Example 1: Every method on the same signal
    for &kind in methods() {
        let params = default_params(kind);
        let slope = dxdt(&x, &t, kind, 1, &params)?;
        println!("\n{} derivative:", kind);
        print_signal(&slope.iter().copied().collect::<Vec<_>>());
    }

    // Example 2: Smoothing, then differentiating, reuses the shared fit
    println!("\nKalman smoothing:");
    let params = [("alpha", Value::Float(0.5))];
    let smoothed = smooth_x(&x, &t, "kalman", 1, &params)?;
    print_signal(&smoothed.iter().copied().collect::<Vec<_>>());
    let _ = dxdt(&x, &t, "kalman", 1, &params)?;
    let info = with_default_cache(|cache| cache.cache_info());
    println!("Method cache: {:?}", info);

    // Example 3: Several channels at once, time along axis 1
    println!("\n3 channels, finite differences:");
    let channels = Array2::from_shape_fn((3, t.len()), |(c, i)| (c as f64 + 1.0) * t[i]);
    let slopes = dxdt(&channels, &t, Kind::FiniteDifference, 1, &[("k", Value::Int(1))])?;
    for row in slopes.outer_iter() {
        print_signal(&row.iter().copied().collect::<Vec<_>>());
    }

    Ok(())
}

fn print_signal(signal: &[f64]) {
    for (i, &value) in signal.iter().enumerate() {
        print!("{:7.3}", value);
        if i > 0 && (i + 1) % 8 == 0 {
            println!();
        }
    }
    if signal.len() % 8 != 0 {
        println!();
    }
}

// Prelude module for conditional wasm compatibility

// fmt
#[cfg(feature = "wasm")]
pub use core::fmt;
#[cfg(not(feature = "wasm"))]
pub use std::fmt;

// OnceLock / OnceCell
#[cfg(feature = "wasm")]
pub use once_cell::sync::OnceCell as OnceLock;
#[cfg(not(feature = "wasm"))]
pub use std::sync::OnceLock;

// collections
#[cfg(feature = "wasm")]
pub use hashbrown::HashMap;
#[cfg(not(feature = "wasm"))]
pub use std::collections::HashMap;

// PI constant
pub use core::f64::consts::PI;

/// Deterministic random value in `[-1, 1)` for the given seed. Used by the sample-and-hold
/// LFO, which must return the same value whenever the same cycle is evaluated again.
#[cfg(feature = "wasm")]
pub fn seeded_random(seed: u64) -> f64 {
    let mut rng = fastrand::Rng::with_seed(seed);
    rng.f64() * 2.0 - 1.0
}

#[cfg(not(feature = "wasm"))]
pub fn seeded_random(seed: u64) -> f64 {
    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};
    let mut rng = SmallRng::seed_from_u64(seed);
    rng.random_range(-1.0..1.0)
}

/// Clamps a parameter into `min..=max`, warning when the requested value was out of range.
pub fn clamped<T: PartialOrd + Copy + fmt::Debug>(name: &str, value: T, min: T, max: T) -> T {
    if value < min {
        log::warn!("{name} {value:?} below minimum, clamping to {min:?}");
        min
    } else if value > max {
        log::warn!("{name} {value:?} above maximum, clamping to {max:?}");
        max
    } else {
        value
    }
}

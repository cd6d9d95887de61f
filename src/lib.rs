pub mod synth;

#[cfg(feature = "native")]
pub mod audio;
#[cfg(any(feature = "native", feature = "wasm"))]
pub mod runtime;

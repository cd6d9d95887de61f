pub mod algorithm;
pub mod automation;
pub mod channel;
pub mod config;
pub mod context;
pub mod core;
pub mod envelope;
pub mod error;
pub mod frequency;
pub mod lfo;
pub mod note;
pub mod operator;
pub mod patch;
pub mod prelude;
pub mod render;
pub mod tuning;
pub mod waveform;

pub use self::channel::Channel;
pub use self::config::SynthConfig;
pub use self::core::Synth;
pub use self::error::Error;
pub use self::render::OfflineRenderer;

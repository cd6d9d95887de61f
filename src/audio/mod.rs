mod cpal_backend;
pub use self::cpal_backend::CpalBackend;

use crate::synth::Error;

pub trait AudioBackend {
    fn start(&mut self) -> Result<(), Error>;
    fn stop(&mut self) -> Result<(), Error>;
}

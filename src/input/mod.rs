//! Physical input: rotary encoder, encoder push switch and record button
//!
//! On Linux the controls are read through evdev. The board's device-tree
//! overlays (`rotary-encoder`, `gpio-keys`) turn GPIO edges into relative
//! axis and key events, so this module never touches pins directly.
//!
//! Raw edges pass through [`InputDecoder`] which debounces them and emits
//! only semantically stable events onto the coordinator queue. The source
//! knows nothing about modes.

pub mod decoder;
#[cfg(target_os = "linux")]
pub mod evdev_source;

pub use decoder::{InputDecoder, RawInput};

use crate::config::InputConfig;
use crate::error::InputError;
use crate::event::EventSender;

/// A non-restartable producer of input events
#[async_trait::async_trait]
pub trait InputSource: Send {
    /// Begin posting events. Calling `start` a second time fails with
    /// `AlreadyStarted`, even after `stop`.
    async fn start(&mut self, events: EventSender) -> Result<(), InputError>;

    /// Stop posting events and release the devices
    async fn stop(&mut self);
}

/// Factory function to create the platform input source
#[cfg(target_os = "linux")]
pub fn create_source(config: &InputConfig) -> Result<Box<dyn InputSource>, InputError> {
    Ok(Box::new(evdev_source::EvdevSource::new(config)?))
}

/// Factory function to create the platform input source
#[cfg(not(target_os = "linux"))]
pub fn create_source(_config: &InputConfig) -> Result<Box<dyn InputSource>, InputError> {
    Err(InputError::NotSupported(
        "encoder and buttons are read through Linux evdev".to_string(),
    ))
}

#![doc = include_str!("../README.md")]

mod error;

pub mod decoder;
pub mod mnsc;
pub mod rc;
pub mod timestamp;

pub use decoder::{TimestampDecoder, TimestampHandle};
pub use error::{Error, Result};
pub use timestamp::{FrameTimestamp, TICKS_PER_SECOND};

//! # Statestream Serde
//! Byte-oriented wire-format primitives for the statestream binary protocol.

mod error;
mod reader;
mod wire;
mod writer;

pub use error::WireError;
pub use reader::{ByteReader, WireRead};
pub use wire::{ser_str, Wire, MAX_STRING_BYTES};
pub use writer::{ByteWriter, WireWrite};

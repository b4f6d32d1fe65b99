use crate::error::WireError;

/// Byte-oriented write half of the wire format.
///
/// Implemented by the growable [`ByteWriter`](crate::ByteWriter) used for
/// whole-stream encodes, and by the multiplexer's per-opcode writer which
/// appends into pooled fixed-size buffers.
pub trait WireWrite {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), WireError>;
}

/// A WireWrite implementation backed by a growable Vec<u8>.
///
/// Used for encoding outside the buffer pool (tests, file backends, or
/// pre-sizing a payload before handing it to the multiplexer).
pub struct ByteWriter {
    buffer: Vec<u8>,
}

impl ByteWriter {
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(256),
        }
    }

    pub fn to_bytes(self) -> Vec<u8> {
        self.buffer
    }

    pub fn bytes_written(&self) -> usize {
        self.buffer.len()
    }
}

impl Default for ByteWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl WireWrite for ByteWriter {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), WireError> {
        self.buffer.extend_from_slice(bytes);
        Ok(())
    }
}

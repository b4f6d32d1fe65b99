use crate::error::WireError;

/// Byte-oriented read half of the wire format.
///
/// Implemented by [`ByteReader`](crate::ByteReader) over a borrowed slice,
/// and by the multiplexer's buffer reader which decrements the buffer's
/// remaining-byte counter as bytes are consumed.
pub trait WireRead {
    fn read_exact(&mut self, out: &mut [u8]) -> Result<(), WireError>;

    /// Number of bytes left to read.
    fn remaining(&self) -> usize;
}

/// A WireRead implementation over a borrowed byte slice.
pub struct ByteReader<'a> {
    bytes: &'a [u8],
    cursor: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, cursor: 0 }
    }

    pub fn bytes_read(&self) -> usize {
        self.cursor
    }
}

impl WireRead for ByteReader<'_> {
    fn read_exact(&mut self, out: &mut [u8]) -> Result<(), WireError> {
        let remaining = self.bytes.len() - self.cursor;
        if out.len() > remaining {
            return Err(WireError::UnexpectedEnd {
                needed: out.len() - remaining,
                remaining,
            });
        }
        out.copy_from_slice(&self.bytes[self.cursor..self.cursor + out.len()]);
        self.cursor += out.len();
        Ok(())
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.cursor
    }
}

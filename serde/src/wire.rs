use crate::{error::WireError, reader::WireRead, writer::WireWrite};

/// Maximum encoded string payload, in bytes.
pub const MAX_STRING_BYTES: usize = 1024;

/// A value that can be encoded to and decoded from the wire format.
///
/// All scalars are little-endian. Strings are written as a 32-bit length
/// rounded up to a 4-byte boundary, followed by the UTF-8 payload and zero
/// padding; the empty string is a single zero length word. Word alignment
/// keeps every operand of an opcode on a 4-byte boundary.
pub trait Wire: Sized {
    fn ser(&self, writer: &mut dyn WireWrite) -> Result<(), WireError>;
    fn de(reader: &mut dyn WireRead) -> Result<Self, WireError>;
}

// Scalars

macro_rules! wire_scalar {
    ($type:ty, $bytes:expr) => {
        impl Wire for $type {
            fn ser(&self, writer: &mut dyn WireWrite) -> Result<(), WireError> {
                writer.write_all(&self.to_le_bytes())
            }

            fn de(reader: &mut dyn WireRead) -> Result<Self, WireError> {
                let mut raw = [0u8; $bytes];
                reader.read_exact(&mut raw)?;
                Ok(<$type>::from_le_bytes(raw))
            }
        }
    };
}

wire_scalar!(i16, 2);
wire_scalar!(i32, 4);
wire_scalar!(u32, 4);
wire_scalar!(i64, 8);
wire_scalar!(f32, 4);

// Strings

impl Wire for String {
    fn ser(&self, writer: &mut dyn WireWrite) -> Result<(), WireError> {
        ser_str(self, writer)
    }

    fn de(reader: &mut dyn WireRead) -> Result<Self, WireError> {
        let padded = i32::de(reader)? as usize;
        if padded == 0 {
            return Ok(String::new());
        }
        if padded > MAX_STRING_BYTES {
            return Err(WireError::StringTooLong {
                length: padded,
                max: MAX_STRING_BYTES,
            });
        }
        let mut raw = vec![0u8; padded];
        reader.read_exact(&mut raw)?;
        while raw.last() == Some(&0) {
            raw.pop();
        }
        String::from_utf8(raw).map_err(|_| WireError::BadString)
    }
}

/// Encode a string slice without allocating an owned String first.
pub fn ser_str(value: &str, writer: &mut dyn WireWrite) -> Result<(), WireError> {
    let bytes = value.as_bytes();
    if bytes.is_empty() {
        return 0i32.ser(writer);
    }
    if bytes.len() > MAX_STRING_BYTES {
        return Err(WireError::StringTooLong {
            length: bytes.len(),
            max: MAX_STRING_BYTES,
        });
    }
    // round up to the next multiple of 4, pad included in the length word
    let padded = (bytes.len() + 3) & !3;
    (padded as i32).ser(writer)?;
    writer.write_all(bytes)?;
    writer.write_all(&[0u8; 4][..padded - bytes.len()])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{reader::ByteReader, writer::ByteWriter};

    #[test]
    fn scalars_round_trip() {
        let mut writer = ByteWriter::new();
        (-7i32).ser(&mut writer).unwrap();
        (300i16).ser(&mut writer).unwrap();
        (1.5f32).ser(&mut writer).unwrap();
        (i64::MIN).ser(&mut writer).unwrap();

        let bytes = writer.to_bytes();
        let mut reader = ByteReader::new(&bytes);
        assert_eq!(i32::de(&mut reader).unwrap(), -7);
        assert_eq!(i16::de(&mut reader).unwrap(), 300);
        assert_eq!(f32::de(&mut reader).unwrap(), 1.5);
        assert_eq!(i64::de(&mut reader).unwrap(), i64::MIN);
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn strings_pad_to_word_boundary() {
        let mut writer = ByteWriter::new();
        ser_str("abcde", &mut writer).unwrap();
        let bytes = writer.to_bytes();
        // 4-byte length word + 5 payload bytes padded to 8
        assert_eq!(bytes.len(), 12);
        assert_eq!(&bytes[0..4], &8i32.to_le_bytes());

        let mut reader = ByteReader::new(&bytes);
        assert_eq!(String::de(&mut reader).unwrap(), "abcde");
    }

    #[test]
    fn empty_string_is_one_word() {
        let mut writer = ByteWriter::new();
        ser_str("", &mut writer).unwrap();
        let bytes = writer.to_bytes();
        assert_eq!(bytes, 0i32.to_le_bytes());

        let mut reader = ByteReader::new(&bytes);
        assert_eq!(String::de(&mut reader).unwrap(), "");
    }

    #[test]
    fn oversize_string_is_rejected() {
        let big = "x".repeat(MAX_STRING_BYTES + 1);
        let mut writer = ByteWriter::new();
        let result = ser_str(&big, &mut writer);
        assert!(matches!(result, Err(WireError::StringTooLong { .. })));
    }
}

//! Standalone streams carrying their decoded size in front
//!
//! | Form     | Bytes | Layout                                             |
//! |----------|-------|----------------------------------------------------|
//! | Inline   | 4     | `u32` LE: `length << 8 \| 0x19`                    |
//! | Extended | 8     | `u32` LE `0x00000019`, then `u32` LE length        |
//!
//! The inline form holds lengths up to 24 bits. Zero is always written in the extended form,
//! since its inline word would read as the extended marker.

use std::io::{Cursor, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use tracing::{instrument, warn};

use crate::decode::decompress;
use crate::encode::{compress, EncoderOptions};
use crate::error::{Error, Result};

/// Low byte of every size prefix
pub const SIZE_MARKER: u8 = 0x19;

const MAX_INLINE_SIZE: u32 = 0x00FF_FFFF;

/// Decoded size written in front of a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizePrefix {
    /// Decoded size of the stream that follows
    pub raw_size: u32,
}

impl SizePrefix {
    /// Prefix for data of `len` bytes
    pub fn from_len(len: u64) -> Result<Self> {
        let raw_size = u32::try_from(len).map_err(|_| Error::PayloadTooLarge(len))?;
        Ok(Self { raw_size })
    }

    fn is_inline(&self) -> bool {
        self.raw_size != 0 && self.raw_size <= MAX_INLINE_SIZE
    }

    /// Number of bytes [`SizePrefix::write`] produces
    pub fn encoded_len(&self) -> usize {
        if self.is_inline() {
            4
        } else {
            8
        }
    }

    /// Read a prefix in either form.
    ///
    /// A first word whose low byte is not [`SIZE_MARKER`] is still taken as an inline prefix.
    pub fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let word = reader.read_u32::<LittleEndian>()?;

        if word == SIZE_MARKER as u32 {
            let raw_size = reader.read_u32::<LittleEndian>()?;
            return Ok(Self { raw_size });
        }

        if word as u8 != SIZE_MARKER {
            warn!("unexpected size prefix marker in {word:#010x}");
        }

        Ok(Self {
            raw_size: word >> 8,
        })
    }

    /// Write the inline form when it can hold the size, otherwise the extended form
    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        if self.is_inline() {
            writer.write_u32::<LittleEndian>((self.raw_size << 8) | SIZE_MARKER as u32)?;
        } else {
            writer.write_u32::<LittleEndian>(SIZE_MARKER as u32)?;
            writer.write_u32::<LittleEndian>(self.raw_size)?;
        }
        Ok(())
    }
}

/// Encode `data` and put its size in front of the stream.
///
/// ```
/// use taiko_lz::encode::EncoderOptions;
/// use taiko_lz::prefix::{compress_prefixed, decompress_prefixed};
///
/// let buffer = compress_prefixed(b"0123456789", &EncoderOptions::default())?;
/// assert_eq!(&buffer[..4], &[0x19, 0x0A, 0x00, 0x00]);
///
/// let (data, declared) = decompress_prefixed(&buffer)?;
/// assert_eq!(data, b"0123456789");
/// assert_eq!(declared, 10);
/// # Ok::<(), taiko_lz::error::Error>(())
/// ```
#[instrument(skip(data), err, fields(size = data.len()))]
pub fn compress_prefixed(data: &[u8], options: &EncoderOptions) -> Result<Vec<u8>> {
    let prefix = SizePrefix::from_len(data.len() as u64)?;
    let stream = compress(data, options);

    let mut buffer = Vec::with_capacity(prefix.encoded_len() + stream.len());
    prefix.write(&mut buffer)?;
    buffer.extend_from_slice(&stream);
    Ok(buffer)
}

/// Decode a prefixed stream and return the data together with its declared size.
///
/// The declared size is not enforced; a stream decoding to a different length is logged.
#[instrument(skip_all, err, fields(size = buffer.len()))]
pub fn decompress_prefixed(buffer: &[u8]) -> Result<(Vec<u8>, u64)> {
    let mut cursor = Cursor::new(buffer);
    let prefix = SizePrefix::read(&mut cursor)?;
    let stream = &buffer[cursor.position() as usize..];

    let data = decompress(stream, &[])?;
    let declared = prefix.raw_size as u64;
    if data.len() as u64 != declared {
        warn!(declared, decoded = data.len(), "decoded size differs from prefix");
    }

    Ok((data, declared))
}

#[cfg(test)]
mod test {
    use std::io::Cursor;

    use pretty_assertions::assert_eq;
    use tracing_test::traced_test;

    use crate::encode::{EncodeMode, EncoderOptions};
    use crate::error::{Error, Result};
    use crate::prefix::{compress_prefixed, decompress_prefixed, SizePrefix};

    fn write(prefix: SizePrefix) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        prefix.write(&mut out)?;
        Ok(out)
    }

    #[test]
    fn inline_prefix() -> Result<()> {
        let prefix = SizePrefix { raw_size: 10 };
        assert_eq!(write(prefix)?, vec![0x19, 0x0A, 0x00, 0x00]);
        assert_eq!(prefix.encoded_len(), 4);
        Ok(())
    }

    #[test]
    fn largest_inline_prefix() -> Result<()> {
        let prefix = SizePrefix {
            raw_size: 0x00FF_FFFF,
        };
        assert_eq!(write(prefix)?, vec![0x19, 0xFF, 0xFF, 0xFF]);
        Ok(())
    }

    #[test]
    fn extended_prefix() -> Result<()> {
        let prefix = SizePrefix {
            raw_size: 0x0100_0000,
        };
        let bytes = write(prefix)?;

        assert_eq!(
            bytes,
            vec![0x19, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01]
        );
        assert_eq!(SizePrefix::read(&mut Cursor::new(&bytes))?, prefix);
        Ok(())
    }

    #[test]
    fn large_payload_uses_extended_form() -> Result<()> {
        let data = vec![0x00; 0x0100_0000];
        let options = EncoderOptions::builder().mode(EncodeMode::Greedy).build();

        let buffer = compress_prefixed(&data, &options)?;
        assert_eq!(&buffer[..8], &[0x19, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01]);

        let (decoded, declared) = decompress_prefixed(&buffer)?;
        assert_eq!(declared, 0x0100_0000);
        assert!(decoded == data);
        Ok(())
    }

    #[test]
    fn zero_length_uses_extended_form() -> Result<()> {
        let bytes = write(SizePrefix { raw_size: 0 })?;
        assert_eq!(bytes, vec![0x19, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]);

        let (data, declared) = decompress_prefixed(&compress_prefixed(&[], &Default::default())?)?;
        assert!(data.is_empty());
        assert_eq!(declared, 0);
        Ok(())
    }

    #[test]
    fn too_large() {
        assert!(matches!(
            SizePrefix::from_len(0x1_0000_0000),
            Err(Error::PayloadTooLarge(0x1_0000_0000))
        ));
    }

    #[traced_test]
    #[test]
    fn foreign_marker_is_tolerated() -> Result<()> {
        let prefix = SizePrefix::read(&mut Cursor::new([0x42, 0x03, 0x00, 0x00]))?;
        assert_eq!(prefix.raw_size, 3);
        assert!(logs_contain("unexpected size prefix marker"));
        Ok(())
    }

    #[test]
    fn truncated_prefix() {
        assert!(matches!(
            SizePrefix::read(&mut Cursor::new([0x19, 0x00, 0x00, 0x00, 0x05])),
            Err(Error::IOError(_))
        ));
    }

    #[traced_test]
    #[test]
    fn greedy_round_trip() -> Result<()> {
        let data = b"prefixed streams stand alone. ".repeat(64);
        let options = EncoderOptions::builder().mode(EncodeMode::Greedy).build();

        let buffer = compress_prefixed(&data, &options)?;
        assert_eq!(&buffer[..4], &[0x19, 0x80, 0x07, 0x00]);

        let (decoded, declared) = decompress_prefixed(&buffer)?;
        assert_eq!(decoded, data);
        assert_eq!(declared, data.len() as u64);
        Ok(())
    }
}

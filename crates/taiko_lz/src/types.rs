//! Base types for the opcode stream and chunk tables.

use binrw::{BinRead, BinWrite};

use crate::error::{CorruptReason, Error, Result};

/// Longest run a `0x01..=0x3F` literal opcode can carry
pub const MAX_SHORT_LITERAL: usize = 0x3F;

/// Longest run the two-byte `0x00 1xxxxxxx` literal opcode can carry
pub const MAX_MEDIUM_LITERAL: usize = 0x40 + 0x7F;

/// Longest run the three-byte `0x00 flag flag2` literal opcode can carry
pub const MAX_LONG_LITERAL: usize = 0xBF + 0x7FFF;

/// Bytes written after the last token of every encoded stream
pub const TERMINATOR: [u8; 3] = [0x00, 0x00, 0x00];

/// Bit of [`ChunkEntry::size`] that marks a compressed chunk
pub const COMPRESSED_FLAG: u32 = 0x8000_0000;

/// Largest payload a single chunk can describe
pub const MAX_CHUNK_LENGTH: u32 = !COMPRESSED_FLAG;

/// A single decoded token header
///
/// Literal tokens only describe how many raw bytes follow the header; the decoder copies them
/// itself. Back-reference lengths and distances are always in the range their opcode class can
/// express.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Token {
    /// Copy the next `length` bytes of the stream verbatim
    Literal {
        /// Number of raw bytes following the header
        length: usize,
    },

    /// `0x40..=0x7F`: one byte, clamped copy
    ShortCopy {
        /// 2..=5
        length: usize,
        /// 1..=16
        distance: usize,
    },

    /// `0x80..=0xBF`: two bytes, clamped copy
    Copy {
        /// 3..=18, bit 6 of the opcode is always clear
        length: usize,
        /// 1..=1024
        distance: usize,
    },

    /// `0xC0..=0xFF`: three bytes, unclamped copy
    LongCopy {
        /// 4..=131
        length: usize,
        /// 1..=32768
        distance: usize,
    },

    /// `0x00 0x00 0x00` at the end of the stream or followed by another zero
    End,
}

impl Token {
    /// Parse the token header starting at `offset`.
    ///
    /// Returns the token and the size of its header in bytes.
    pub fn parse(stream: &[u8], offset: usize) -> Result<(Token, usize)> {
        let truncated = |c: u8| Error::CorruptStream {
            offset,
            reason: CorruptReason::TruncatedOperand(c),
        };
        let operand = |n: usize| stream.get(offset + n).copied();

        let c = operand(0).ok_or(truncated(0))?;
        match c {
            0x00 => {
                let flag = operand(1).ok_or(truncated(c))?;
                if flag & 0x80 != 0 {
                    return Ok((
                        Token::Literal {
                            length: 0x40 + (flag & 0x7F) as usize,
                        },
                        2,
                    ));
                }

                let flag2 = operand(2).ok_or(truncated(c))?;
                if flag == 0 && flag2 == 0 && operand(3).map_or(true, |next| next == 0x00) {
                    return Ok((Token::End, 3));
                }

                Ok((
                    Token::Literal {
                        length: 0xBF + flag2 as usize + ((flag as usize) << 8),
                    },
                    3,
                ))
            }
            0x01..=0x3F => Ok((Token::Literal { length: c as usize }, 1)),
            0x40..=0x7F => Ok((
                Token::ShortCopy {
                    length: (c >> 4) as usize - 2,
                    distance: (c & 0x0F) as usize + 1,
                },
                1,
            )),
            0x80..=0xBF => {
                let low = operand(1).ok_or(truncated(c))?;
                let mut length = ((c >> 2) & 0x1F) as usize;
                if c & 0x80 != 0 {
                    length += 3;
                }

                Ok((
                    Token::Copy {
                        length,
                        distance: (((c & 0x03) as usize) << 8) + low as usize + 1,
                    },
                    2,
                ))
            }
            0xC0..=0xFF => {
                let extra = operand(1).ok_or(truncated(c))?;
                let low = operand(2).ok_or(truncated(c))?;
                let mut length = (c - 0xBE) as usize * 2;
                if extra & 0x80 != 0 {
                    length += 1;
                }

                Ok((
                    Token::LongCopy {
                        length,
                        distance: (((extra & 0x7F) as usize) << 8) + low as usize + 1,
                    },
                    3,
                ))
            }
        }
    }

    /// Append the header bytes of this token to `out`
    ///
    /// Lengths and distances must be within the range of the variant.
    pub fn write(&self, out: &mut Vec<u8>) {
        match *self {
            Token::Literal { length } if length <= MAX_SHORT_LITERAL => {
                debug_assert!(length > 0);
                out.push(length as u8);
            }
            Token::Literal { length } if length <= MAX_MEDIUM_LITERAL => {
                out.extend_from_slice(&[0x00, 0x80 | (length - 0x40) as u8]);
            }
            Token::Literal { length } => {
                debug_assert!(length <= MAX_LONG_LITERAL);
                let value = length - 0xBF;
                out.extend_from_slice(&[0x00, (value >> 8) as u8, value as u8]);
            }
            Token::ShortCopy { length, distance } => {
                debug_assert!((2..=5).contains(&length) && (1..=16).contains(&distance));
                out.push((((length + 2) << 4) | (distance - 1)) as u8);
            }
            Token::Copy { length, distance } => {
                debug_assert!((3..=18).contains(&length) && (1..=1024).contains(&distance));
                let distance = distance - 1;
                out.extend_from_slice(&[
                    0x80 | ((length - 3) << 2) as u8 | (distance >> 8) as u8,
                    distance as u8,
                ]);
            }
            Token::LongCopy { length, distance } => {
                debug_assert!((4..=131).contains(&length) && (1..=32768).contains(&distance));
                let distance = distance - 1;
                let odd = if length % 2 == 1 { 0x80 } else { 0x00 };
                out.extend_from_slice(&[
                    0xBE + (length / 2) as u8,
                    odd | (distance >> 8) as u8,
                    distance as u8,
                ]);
            }
            Token::End => out.extend_from_slice(&TERMINATOR),
        }
    }
}

/// A slice of a file's payload which is either stored or compressed
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Whether the payload is an opcode stream
    pub compressed: bool,

    /// Length of the payload in bytes, at most [`MAX_CHUNK_LENGTH`]
    pub length: u32,
}

impl Chunk {
    /// A chunk with a payload of `length` bytes, which must be at most [`MAX_CHUNK_LENGTH`]
    pub fn new(compressed: bool, length: usize) -> Result<Self> {
        match u32::try_from(length) {
            Ok(length) if length <= MAX_CHUNK_LENGTH => Ok(Self { compressed, length }),
            _ => Err(Error::InvalidChunkSize(length)),
        }
    }

    /// A chunk holding raw bytes
    pub const fn stored(length: u32) -> Self {
        debug_assert!(length <= MAX_CHUNK_LENGTH);
        Self {
            compressed: false,
            length,
        }
    }

    /// A chunk holding an opcode stream
    pub const fn compressed(length: u32) -> Self {
        debug_assert!(length <= MAX_CHUNK_LENGTH);
        Self {
            compressed: true,
            length,
        }
    }
}

/// Chunk table entry
///
/// Defines one chunk of a file inside an archive. All data is stored in little endian format.
#[derive(BinRead, BinWrite, Debug, Default, Copy, Clone, PartialEq, Eq)]
#[brw(little)]
pub struct ChunkEntry {
    /// Payload length, with [`COMPRESSED_FLAG`] set for compressed chunks
    pub size: u32,

    /// Always zero
    pub reserved: u16,

    /// Position of this chunk within its file
    pub index: u16,
}

impl ChunkEntry {
    /// Build the table entry for the `index`th chunk of a file
    pub fn new(chunk: Chunk, index: u16) -> Self {
        debug_assert!(chunk.length <= MAX_CHUNK_LENGTH);
        let flag = if chunk.compressed { COMPRESSED_FLAG } else { 0 };
        Self {
            size: flag | chunk.length,
            reserved: 0,
            index,
        }
    }

    /// Whether the chunk holds an opcode stream
    pub fn is_compressed(&self) -> bool {
        self.size & COMPRESSED_FLAG != 0
    }

    /// Length of the chunk payload in bytes
    pub fn len(&self) -> u32 {
        self.size & MAX_CHUNK_LENGTH
    }

    /// Whether the chunk has no payload
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<ChunkEntry> for Chunk {
    fn from(value: ChunkEntry) -> Self {
        Chunk {
            compressed: value.is_compressed(),
            length: value.len(),
        }
    }
}

#[cfg(test)]
mod test {
    use std::io::Cursor;

    use binrw::BinRead;
    use binrw::BinWrite;
    use pretty_assertions::assert_eq;

    use crate::error::{CorruptReason, Error, Result};
    use crate::types::{Chunk, ChunkEntry, Token};

    #[test]
    fn parse_every_class() -> Result<()> {
        assert_eq!(
            Token::parse(&[0x05], 0)?,
            (Token::Literal { length: 5 }, 1)
        );
        assert_eq!(
            Token::parse(&[0x7F], 0)?,
            (
                Token::ShortCopy {
                    length: 5,
                    distance: 16
                },
                1
            )
        );
        assert_eq!(
            Token::parse(&[0x8F, 0x20], 0)?,
            (
                Token::Copy {
                    length: 6,
                    distance: 0x321
                },
                2
            )
        );
        assert_eq!(
            Token::parse(&[0xC0, 0x81, 0x00], 0)?,
            (
                Token::LongCopy {
                    length: 5,
                    distance: 0x101
                },
                3
            )
        );
        assert_eq!(
            Token::parse(&[0x00, 0x85], 0)?,
            (Token::Literal { length: 0x45 }, 2)
        );
        assert_eq!(
            Token::parse(&[0x00, 0x01, 0x02, 0x00], 0)?,
            (Token::Literal { length: 0x1C1 }, 3)
        );

        Ok(())
    }

    #[test]
    fn parse_terminator() -> Result<()> {
        assert_eq!(Token::parse(&[0x00, 0x00, 0x00], 0)?, (Token::End, 3));
        assert_eq!(
            Token::parse(&[0x00, 0x00, 0x00, 0x00], 0)?,
            (Token::End, 3)
        );

        // Followed by data, the same bytes open a 0xBF byte literal run
        assert_eq!(
            Token::parse(&[0x00, 0x00, 0x00, 0x41], 0)?,
            (Token::Literal { length: 0xBF }, 3)
        );

        Ok(())
    }

    #[test]
    fn parse_truncated() {
        let result = Token::parse(&[0x12, 0xC4, 0x80], 1);
        assert!(matches!(
            result,
            Err(Error::CorruptStream {
                offset: 1,
                reason: CorruptReason::TruncatedOperand(0xC4)
            })
        ));

        assert!(Token::parse(&[0x00], 0).is_err());
        assert!(Token::parse(&[0x80], 0).is_err());
    }

    #[test]
    fn write_matches_parse() -> Result<()> {
        let tokens = [
            Token::Literal { length: 1 },
            Token::Literal { length: 63 },
            Token::Literal { length: 64 },
            Token::Literal { length: 191 },
            Token::Literal { length: 192 },
            Token::Literal { length: 0x80BE },
            Token::ShortCopy {
                length: 2,
                distance: 1,
            },
            Token::Copy {
                length: 18,
                distance: 1024,
            },
            Token::LongCopy {
                length: 4,
                distance: 1,
            },
            Token::LongCopy {
                length: 131,
                distance: 32768,
            },
        ];

        for token in tokens {
            let mut header = Vec::new();
            token.write(&mut header);
            // Literal headers need a non-zero byte behind them to never look like an end marker
            header.push(0xFF);
            assert_eq!(Token::parse(&header, 0)?, (token, header.len() - 1));
        }

        Ok(())
    }

    #[test]
    fn read_chunk_entry() -> Result<()> {
        #[rustfmt::skip]
        let mut input = Cursor::new(vec![
            0x34, 0x12, 0x00, 0x80,
            0x00, 0x00,
            0x02, 0x00,
        ]);

        let entry = ChunkEntry::read(&mut input)?;
        assert_eq!(
            entry,
            ChunkEntry {
                size: 0x8000_1234,
                reserved: 0,
                index: 2,
            }
        );
        assert_eq!(Chunk::from(entry), Chunk::compressed(0x1234));

        Ok(())
    }

    #[test]
    fn write_chunk_entry() -> Result<()> {
        #[rustfmt::skip]
        let expected = vec![
            0x00, 0x00, 0x01, 0x00,
            0x00, 0x00,
            0x07, 0x00,
        ];

        let entry = ChunkEntry::new(Chunk::stored(0x10000), 7);
        assert!(!entry.is_compressed());
        assert_eq!(entry.len(), 0x10000);

        let mut actual = Vec::new();
        entry.write(&mut Cursor::new(&mut actual))?;

        assert_eq!(actual, expected);

        Ok(())
    }

    #[test]
    fn chunk_length_limit() -> Result<()> {
        assert_eq!(
            Chunk::new(true, 0x7FFF_FFFF)?,
            Chunk::compressed(0x7FFF_FFFF)
        );
        assert!(matches!(
            Chunk::new(false, 0x8000_0000),
            Err(Error::InvalidChunkSize(0x8000_0000))
        ));
        assert!(matches!(
            Chunk::new(false, usize::MAX),
            Err(Error::InvalidChunkSize(usize::MAX))
        ));

        Ok(())
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic]
    fn stored_chunk_past_limit() {
        Chunk::stored(0x8000_0000);
    }
}

//! This library decodes and encodes the byte-oriented LZ77 scheme used for compressed files in
//! *Taiko no Tatsujin* archives.
//!
//! # Stream Format
//!
//! A stream is a sequence of tokens. Every token starts with an opcode byte `c`, and its class
//! decides how many operand bytes follow and what is produced.
//!
//! | Opcode              | Bytes | Length                            | Distance                        |
//! |---------------------|-------|-----------------------------------|---------------------------------|
//! | `0x01..=0x3F`       | 1     | `c` literal bytes follow          |                                 |
//! | `0x40..=0x7F`       | 1     | `(c >> 4) - 2`                    | `(c & 0xF) + 1`                 |
//! | `0x80..=0xBF`       | 2     | `((c >> 2) & 0x1F) + 3`           | `((c & 3) << 8) + b1 + 1`       |
//! | `0xC0..=0xFF`       | 3     | `(c - 0xBE) * 2`, `+1` if `b1 & 0x80` | `((b1 & 0x7F) << 8) + b2 + 1` |
//! | `0x00 1xxxxxxx`     | 2     | `0x40 + (b1 & 0x7F)` literal bytes |                                |
//! | `0x00 f f2`         | 3     | `0xBF + f2 + (f << 8)` literal bytes |                              |
//!
//! `0x00 0x00 0x00` ends the stream when it is followed by another zero byte or by the end of
//! the input. Otherwise it is a literal run of `0xBF` bytes.
//!
//! ## Back-references
//!
//! Back-references copy from bytes already in the output, and one copy may read bytes it has
//! written itself. The two shorter classes are clamped: once the copied index passes the length
//! the output had when the copy started, the last byte of that output is repeated instead. The
//! three-byte class is not clamped. In every class a distance further back than the output is an
//! error.
//!
//! # Chunked Files
//!
//! Inside an archive a file is split into chunks, each either stored raw or holding a stream.
//! A compressed chunk is decoded on top of all chunks decoded before it in the same file, so its
//! back-references may reach into them. See [`chunk`].
//!
//! | Offset | Field     | Description                                                    |
//! |--------|-----------|----------------------------------------------------------------|
//! | 0x0000 | Size      | 4 bytes: payload length, bit 31 set for compressed chunks      |
//! | 0x0004 | Reserved  | 2 bytes                                                        |
//! | 0x0006 | Index     | 2 bytes: position of the chunk within its file                 |
//!
//! Decoded files are checked against their declared size and CRC-32.
//!
//! # Size Prefixed Streams
//!
//! Streams outside of archives carry their decoded size in front of them. See [`prefix`].
//!
//! ## Additional Information
//!
//! - **Endianness**: Little-endian for all multi-byte integers
//! - **Window**: Back-references reach at most 32768 bytes
//!

pub mod chunk;
pub mod decode;
pub mod encode;
pub mod error;
pub mod prefix;
pub mod types;

pub use chunk::{compress_chunked, decompress_chunked, ChunkedWriter, FileEntry};
pub use decode::{decompress, decompress_into};
pub use encode::compress;
pub use prefix::{compress_prefixed, decompress_prefixed};

//! Error types that can be emitted from this library

use miette::Diagnostic;
use thiserror::Error;

/// Error type for library
#[derive(Error, Diagnostic, Debug)]
pub enum Error {
    /// Transparent wrapper for [`std::io::Error`]
    #[error(transparent)]
    IOError(#[from] std::io::Error),

    /// Transparent wrapper for [`binrw::Error`]
    #[error(transparent)]
    BinRWError(#[from] binrw::Error),

    /// The opcode stream is truncated or structurally invalid
    #[error("corrupt stream at offset {offset:#x}: {reason}")]
    #[diagnostic(help("the stream cannot be recovered by decoding it again"))]
    CorruptStream {
        /// Offset of the opcode that failed, relative to the start of the stream
        offset: usize,
        /// What was wrong with the opcode
        reason: CorruptReason,
    },

    /// Decoded length differs from the declared raw size
    #[error("decoded {actual:#x} bytes but {expected:#x} were declared")]
    LengthMismatch {
        /// Declared raw size
        expected: u64,
        /// Number of bytes actually produced
        actual: u64,
    },

    /// Checksum of the assembled data differs from the declared checksum
    #[error("checksum {actual:#010x} does not match declared {expected:#010x}")]
    ChecksumMismatch {
        /// Declared CRC-32
        expected: u32,
        /// CRC-32 of the decoded data
        actual: u32,
    },

    /// A chunk reaches past the end of the payload it was read from
    #[error("chunk {index} needs bytes {start:#x}..{end:#x} but the payload is only {available:#x} bytes")]
    ChunkOutOfBounds {
        /// Position of the chunk within its file
        index: usize,
        /// Payload offset where the chunk starts
        start: usize,
        /// Payload offset where the chunk ends
        end: usize,
        /// Length of the payload
        available: usize,
    },

    /// The payload is too large to be described by a 32-bit length
    #[error("payload of {0:#x} bytes does not fit in a 32-bit length")]
    PayloadTooLarge(u64),

    /// Chunk window or payload length outside of `1..=0x7FFFFFFF`
    #[error("invalid chunk size {0:#x}")]
    InvalidChunkSize(usize),

    /// A file has more chunks than a 16-bit chunk index can number
    #[error("{0} chunks do not fit in a chunk table")]
    TooManyChunks(usize),
}

/// Reason attached to [`Error::CorruptStream`]
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorruptReason {
    /// operand bytes missing after opcode {0:#04x}
    #[error("operand bytes missing after opcode {0:#04x}")]
    TruncatedOperand(u8),

    /// literal run of {wanted} bytes but only {remaining} remain
    #[error("literal run of {wanted} bytes but only {remaining} remain")]
    TruncatedLiteral {
        /// Length declared by the opcode
        wanted: usize,
        /// Bytes left in the stream
        remaining: usize,
    },

    /// back-reference {distance} bytes behind a buffer of {available} bytes
    #[error("back-reference {distance} bytes behind a buffer of {available} bytes")]
    DistanceOutOfRange {
        /// Distance requested by the opcode
        distance: usize,
        /// Bytes produced so far
        available: usize,
    },
}

/// Generic result type with crate's Error as its error variant
pub type Result<T> = core::result::Result<T, Error>;

//! Decoding of opcode streams
//!

use tracing::{debug, instrument};

use crate::error::{CorruptReason, Error, Result};
use crate::types::Token;

/// Decode `stream` and return `seed` followed by the decoded bytes.
///
/// Back-references may reach into `seed`, which is how a compressed chunk sees the data of the
/// chunks before it.
///
/// ```
/// let stream = [0x03, b'a', b'b', b'c', 0x00, 0x00, 0x00];
/// let data = taiko_lz::decompress(&stream, b"xyz")?;
/// assert_eq!(data, b"xyzabc");
/// # Ok::<(), taiko_lz::error::Error>(())
/// ```
pub fn decompress(stream: &[u8], seed: &[u8]) -> Result<Vec<u8>> {
    let mut output = Vec::with_capacity(seed.len() + stream.len() * 2);
    output.extend_from_slice(seed);
    decompress_into(&mut output, stream)?;
    Ok(output)
}

/// Decode `stream`, appending to `output`, and return the number of bytes appended.
///
/// On error `output` is truncated back to the length it had on entry.
#[instrument(skip_all, err, fields(stream = stream.len(), seed = output.len()))]
pub fn decompress_into(output: &mut Vec<u8>, stream: &[u8]) -> Result<usize> {
    let start = output.len();

    if let Err(e) = run(output, stream) {
        output.truncate(start);
        return Err(e);
    }

    let produced = output.len() - start;
    debug!(produced, "decoded stream");
    Ok(produced)
}

fn run(output: &mut Vec<u8>, stream: &[u8]) -> Result<()> {
    let mut offset = 0;

    while offset < stream.len() {
        let (token, header) = Token::parse(stream, offset)?;
        let body = offset + header;

        let corrupt = move |reason| Error::CorruptStream { offset, reason };

        offset = match token {
            Token::End => break,
            Token::Literal { length } => {
                let bytes = stream.get(body..body + length).ok_or(corrupt(
                    CorruptReason::TruncatedLiteral {
                        wanted: length,
                        remaining: stream.len() - body,
                    },
                ))?;
                output.extend_from_slice(bytes);
                body + length
            }
            Token::ShortCopy { length, distance }
            | Token::Copy { length, distance }
            | Token::LongCopy { length, distance } => {
                if distance > output.len() {
                    return Err(corrupt(CorruptReason::DistanceOutOfRange {
                        distance,
                        available: output.len(),
                    }));
                }
                if matches!(token, Token::LongCopy { .. }) {
                    copy_overlapping(output, length, distance);
                } else {
                    copy_clamped(output, length, distance);
                }
                body
            }
        };
    }

    Ok(())
}

/// Copy for the `0x40..=0xBF` classes.
///
/// Copied index `i` reads the last byte of the buffer as it stood when the copy started once
/// `i` exceeds that length. `distance` must be in `1..=output.len()`.
fn copy_clamped(output: &mut Vec<u8>, length: usize, distance: usize) {
    let end = output.len();
    let last = output[end - 1];

    output.reserve(length);
    for i in 0..length {
        let byte = if i > end {
            last
        } else {
            output[end + i - distance]
        };
        output.push(byte);
    }
}

/// Copy for the `0xC0..=0xFF` class. `distance` must not exceed the buffer length.
fn copy_overlapping(output: &mut Vec<u8>, length: usize, distance: usize) {
    let start = output.len() - distance;

    if distance >= length {
        output.extend_from_within(start..start + length);
        return;
    }

    output.reserve(length);
    for i in 0..length {
        let byte = output[start + i];
        output.push(byte);
    }
}

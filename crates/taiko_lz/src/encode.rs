//! Encoding of opcode streams
//!

use bon::Builder;
use tracing::{debug, instrument};

use crate::types::{Token, MAX_LONG_LITERAL, MAX_SHORT_LITERAL, TERMINATOR};

const HASH_BITS: u32 = 15;
const WINDOW: usize = 32768;
const MIN_MATCH: usize = 3;
const MAX_MATCH: usize = 131;

/// How the encoder looks for repeated data
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum EncodeMode {
    /// Only emit literal runs of at most 63 bytes, as the stock archive packer does
    #[default]
    Store,

    /// Replace repeated data with back-references found through a hash of the next 3 bytes
    Greedy,
}

/// Options for how data should be encoded
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Builder)]
pub struct EncoderOptions {
    /// The match finding strategy
    #[builder(default)]
    pub mode: EncodeMode,
}

/// Encode `data` into an opcode stream terminated by three zero bytes.
///
/// ```
/// use taiko_lz::encode::{EncodeMode, EncoderOptions};
///
/// let data = b"abcabcabcabcabcabc";
/// let options = EncoderOptions::builder().mode(EncodeMode::Greedy).build();
/// let stream = taiko_lz::compress(data, &options);
/// assert_eq!(taiko_lz::decompress(&stream, &[])?, data);
/// # Ok::<(), taiko_lz::error::Error>(())
/// ```
#[instrument(skip(data), fields(size = data.len()))]
pub fn compress(data: &[u8], options: &EncoderOptions) -> Vec<u8> {
    let stream = match options.mode {
        EncodeMode::Store => compress_store(data),
        EncodeMode::Greedy => compress_greedy(data),
    };

    debug!(encoded = stream.len(), "encoded stream");
    stream
}

/// Encode `data` as literal runs of at most 63 bytes.
pub fn compress_store(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(
        data.len() + data.len().div_ceil(MAX_SHORT_LITERAL) + TERMINATOR.len(),
    );

    for run in data.chunks(MAX_SHORT_LITERAL) {
        Token::Literal { length: run.len() }.write(&mut out);
        out.extend_from_slice(run);
    }

    Token::End.write(&mut out);
    out
}

fn compress_greedy(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() / 2 + TERMINATOR.len());
    let mut table = vec![usize::MAX; 1 << HASH_BITS];

    let mut literal_start = 0;
    let mut pos = 0;

    while pos + MIN_MATCH <= data.len() {
        let slot = bucket(key3(data, pos));
        let candidate = table[slot];
        table[slot] = pos;

        if candidate != usize::MAX && pos - candidate <= WINDOW {
            let distance = pos - candidate;
            let limit = MAX_MATCH.min(data.len() - pos);
            let length = common_prefix(&data[candidate..], &data[pos..], limit);

            if let Some((token, length)) = choose(length, distance, pos) {
                push_literals(&mut out, &data[literal_start..pos]);
                token.write(&mut out);

                for skipped in pos + 1..(pos + length).min(data.len() + 1 - MIN_MATCH) {
                    table[bucket(key3(data, skipped))] = skipped;
                }

                pos += length;
                literal_start = pos;
                continue;
            }
        }

        pos += 1;
    }

    push_literals(&mut out, &data[literal_start..]);
    Token::End.write(&mut out);
    out
}

/// Pick the cheapest token for a match found at `pos`.
///
/// The two clamped classes are only used when the decoder's clamp cannot trigger, which holds
/// for a distance of one or when every copied index stays at or below the starting length.
fn choose(length: usize, distance: usize, pos: usize) -> Option<(Token, usize)> {
    if length < MIN_MATCH {
        return None;
    }

    let clamp_safe = distance == 1 || length <= pos + 1;

    if clamp_safe && length <= 5 && distance <= 16 {
        Some((Token::ShortCopy { length, distance }, length))
    } else if clamp_safe && length <= 18 && distance <= 1024 {
        Some((Token::Copy { length, distance }, length))
    } else if length >= 4 {
        let length = length.min(MAX_MATCH);
        Some((Token::LongCopy { length, distance }, length))
    } else {
        None
    }
}

fn push_literals(out: &mut Vec<u8>, literals: &[u8]) {
    for run in literals.chunks(MAX_LONG_LITERAL) {
        Token::Literal { length: run.len() }.write(out);
        out.extend_from_slice(run);
    }
}

fn common_prefix(a: &[u8], b: &[u8], limit: usize) -> usize {
    a.iter()
        .zip(b)
        .take(limit)
        .take_while(|(x, y)| x == y)
        .count()
}

fn key3(data: &[u8], i: usize) -> u32 {
    (data[i] as u32) | ((data[i + 1] as u32) << 8) | ((data[i + 2] as u32) << 16)
}

fn bucket(key: u32) -> usize {
    (key.wrapping_mul(0x1e35_a7bd) >> (32 - HASH_BITS)) as usize
}

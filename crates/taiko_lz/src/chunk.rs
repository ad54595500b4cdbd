//! Chunked storage of a single file
//!
//! A file is cut into fixed size windows and every window becomes one chunk, stored either as
//! raw bytes or as an opcode stream. Compressed chunks are decoded on top of everything decoded
//! from the chunks before them, so their back-references may reach into earlier chunks.

use std::borrow::Cow;
use std::io::{self, Write};

use bon::Builder;
use crc::{Crc, Digest, CRC_32_ISO_HDLC};
use tracing::{debug, instrument};

use crate::decode::decompress_into;
use crate::encode::{compress, EncoderOptions};
use crate::error::{Error, Result};
use crate::types::{Chunk, ChunkEntry, MAX_CHUNK_LENGTH};

/// Window size used by the stock archive packer
pub const DEFAULT_CHUNK_SIZE: usize = 0x10000;

static CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// CRC-32 of `data` as recorded for files in an archive
pub fn checksum(data: &[u8]) -> u32 {
    CRC32.checksum(data)
}

/// Decides which windows are written compressed
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum ChunkPolicy {
    /// Every chunk holds raw bytes
    #[default]
    Store,

    /// Every chunk holds an opcode stream
    Compress,

    /// A chunk holds an opcode stream only when that is smaller than the raw bytes
    Smallest,
}

/// Options for how a file is split into chunks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Builder)]
pub struct ChunkOptions {
    /// Raw bytes per chunk
    #[builder(default = DEFAULT_CHUNK_SIZE)]
    pub chunk_size: usize,

    /// Which chunks are compressed
    #[builder(default)]
    pub policy: ChunkPolicy,

    /// Encoder used for compressed chunks
    #[builder(default)]
    pub encoder: EncoderOptions,
}

impl Default for ChunkOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl ChunkOptions {
    fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 || self.chunk_size > MAX_CHUNK_LENGTH as usize {
            return Err(Error::InvalidChunkSize(self.chunk_size));
        }
        Ok(())
    }

    fn encode_window<'a>(&self, window: &'a [u8]) -> (Chunk, Cow<'a, [u8]>) {
        if self.policy != ChunkPolicy::Store {
            let encoded = compress(window, &self.encoder);
            let keep = match self.policy {
                ChunkPolicy::Smallest => encoded.len() < window.len(),
                _ => encoded.len() <= MAX_CHUNK_LENGTH as usize,
            };
            if keep {
                return (Chunk::compressed(encoded.len() as u32), Cow::Owned(encoded));
            }
        }

        (Chunk::stored(window.len() as u32), Cow::Borrowed(window))
    }
}

/// Everything the codec needs to know about one file in an archive
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileEntry {
    /// Chunks in file order
    pub chunks: Vec<Chunk>,

    /// Size of the file when decoded
    pub raw_size: u64,

    /// CRC-32 of the decoded file
    pub crc32: u32,
}

impl FileEntry {
    /// Build a file entry from its slice of the chunk table
    pub fn from_entries(entries: &[ChunkEntry], raw_size: u64, crc32: u32) -> Self {
        Self {
            chunks: entries.iter().copied().map(Chunk::from).collect(),
            raw_size,
            crc32,
        }
    }

    /// Chunk table entries for this file, numbered from zero
    pub fn entries(&self) -> Result<Vec<ChunkEntry>> {
        self.chunks
            .iter()
            .enumerate()
            .map(|(index, chunk)| {
                u16::try_from(index)
                    .map(|index| ChunkEntry::new(*chunk, index))
                    .map_err(|_| Error::TooManyChunks(self.chunks.len()))
            })
            .collect()
    }

    /// Number of payload bytes the chunks occupy
    pub fn compressed_size(&self) -> u64 {
        self.chunks.iter().map(|c| c.length as u64).sum()
    }

    /// Decode the file from its payload.
    ///
    /// The result is not checked against [`FileEntry::raw_size`] or [`FileEntry::crc32`]; use
    /// [`FileEntry::verify`] for that.
    pub fn decode(&self, payload: &[u8]) -> Result<Vec<u8>> {
        decompress_chunked(&self.chunks, payload)
    }

    /// Check decoded data against the declared size and checksum.
    ///
    /// The size is checked first.
    #[instrument(skip_all, err, fields(size = data.len()))]
    pub fn verify(&self, data: &[u8]) -> Result<()> {
        if data.len() as u64 != self.raw_size {
            return Err(Error::LengthMismatch {
                expected: self.raw_size,
                actual: data.len() as u64,
            });
        }

        let actual = checksum(data);
        if actual != self.crc32 {
            return Err(Error::ChecksumMismatch {
                expected: self.crc32,
                actual,
            });
        }

        Ok(())
    }
}

/// Decode a file from its chunks and their concatenated payload.
///
/// Chunks are processed in order. Bytes after the last chunk are ignored.
///
/// ```
/// use taiko_lz::types::Chunk;
///
/// let payload = [b'A', b'B', 0x41, 0x01, b'C'];
/// let chunks = [Chunk::stored(2), Chunk::compressed(3)];
/// assert_eq!(taiko_lz::decompress_chunked(&chunks, &payload)?, b"ABABC");
/// # Ok::<(), taiko_lz::error::Error>(())
/// ```
#[instrument(skip_all, err, fields(chunks = chunks.len(), payload = payload.len()))]
pub fn decompress_chunked(chunks: &[Chunk], payload: &[u8]) -> Result<Vec<u8>> {
    let mut output = Vec::new();
    let mut offset = 0;

    for (index, chunk) in chunks.iter().enumerate() {
        let end = offset + chunk.length as usize;
        let data = payload.get(offset..end).ok_or(Error::ChunkOutOfBounds {
            index,
            start: offset,
            end,
            available: payload.len(),
        })?;

        if chunk.compressed {
            decompress_into(&mut output, data)?;
        } else {
            output.extend_from_slice(data);
        }

        offset = end;
    }

    if offset < payload.len() {
        debug!(ignored = payload.len() - offset, "payload continues past last chunk");
    }

    Ok(output)
}

/// Split `data` into chunks and return the file entry together with the payload.
#[instrument(skip(data), err, fields(size = data.len()))]
pub fn compress_chunked(data: &[u8], options: &ChunkOptions) -> Result<(FileEntry, Vec<u8>)> {
    let mut writer = ChunkedWriter::new(Vec::with_capacity(data.len()), *options)?;
    writer.write_all(data)?;
    let (payload, entry) = writer.finish()?;
    Ok((entry, payload))
}

/// Streams a file into chunk payloads
///
/// ```
/// # fn doit() -> taiko_lz::error::Result<()>
/// # {
/// use std::io::Write;
/// use taiko_lz::chunk::{ChunkOptions, ChunkPolicy, ChunkedWriter};
///
/// let mut writer = ChunkedWriter::new(
///     Vec::new(),
///     ChunkOptions::builder()
///         .chunk_size(4)
///         .policy(ChunkPolicy::Store)
///         .build(),
/// )?;
/// writer.write_all(b"Hello, World!")?;
///
/// let (payload, entry) = writer.finish()?;
/// assert_eq!(payload, b"Hello, World!");
/// assert_eq!(entry.chunks.len(), 4);
/// assert_eq!(entry.decode(&payload)?, b"Hello, World!");
/// # Ok(())
/// # }
/// # doit().unwrap();
/// ```
pub struct ChunkedWriter<W: Write> {
    inner: W,
    options: ChunkOptions,
    window: Vec<u8>,
    chunks: Vec<Chunk>,
    raw_size: u64,
    digest: Digest<'static, u32>,
}

impl<W: Write> ChunkedWriter<W> {
    /// Start a new file which writes its payload into `inner`
    pub fn new(inner: W, options: ChunkOptions) -> Result<ChunkedWriter<W>> {
        options.validate()?;

        Ok(ChunkedWriter {
            inner,
            window: Vec::with_capacity(options.chunk_size.min(DEFAULT_CHUNK_SIZE)),
            options,
            chunks: Vec::new(),
            raw_size: 0,
            digest: CRC32.digest(),
        })
    }

    /// Number of raw bytes accepted so far
    pub fn raw_size(&self) -> u64 {
        self.raw_size
    }

    /// Chunks emitted so far, not counting buffered data
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    #[instrument(skip(self), err, fields(window = self.window.len()))]
    fn emit_window(&mut self) -> io::Result<()> {
        let (chunk, payload) = self.options.encode_window(&self.window);
        self.inner.write_all(&payload)?;
        self.chunks.push(chunk);
        self.window.clear();
        Ok(())
    }

    /// Write the final partial chunk and return the inner writer with the file entry
    #[instrument(skip(self), err)]
    pub fn finish(mut self) -> Result<(W, FileEntry)> {
        if !self.window.is_empty() {
            self.emit_window()?;
        }
        self.inner.flush()?;

        let entry = FileEntry {
            chunks: self.chunks,
            raw_size: self.raw_size,
            crc32: self.digest.finalize(),
        };
        debug!(
            chunks = entry.chunks.len(),
            raw = entry.raw_size,
            compressed = entry.compressed_size(),
            "finished file"
        );

        Ok((self.inner, entry))
    }
}

impl<W: Write> Write for ChunkedWriter<W> {
    #[instrument(skip_all, err, fields(size = buf.len()))]
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let room = self.options.chunk_size - self.window.len();
        let taken = &buf[..buf.len().min(room)];

        self.window.extend_from_slice(taken);
        self.digest.update(taken);
        self.raw_size += taken.len() as u64;

        if self.window.len() == self.options.chunk_size {
            self.emit_window()?;
        }

        Ok(taken.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

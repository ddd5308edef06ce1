// SPDX-FileCopyrightText: 2025 Manuel Quarneti <mq1@ik.me>
// SPDX-License-Identifier: GPL-2.0-only

//! File preallocation strategies.
//!
//! A strategy grows a freshly created file to an exact target length. The
//! fast strategy only touches file metadata and lets the filesystem represent
//! the new region sparsely; the slow strategy writes every byte explicitly.

use log::{debug, info, trace};
use std::fs::File;
use std::io::{self, Seek, SeekFrom, Write};

/// Size of the reusable zero buffer used by [`ZeroFill`]: 16 KiB.
pub const DEFAULT_CHUNK_SIZE: usize = 16 * 1024;

/// Largest accepted zero-fill chunk: 64 MiB.
pub const MAX_CHUNK_SIZE: usize = 64 * 1024 * 1024;

/// Something that can grow an open file to an exact length.
pub trait Preallocate {
    /// How this strategy preallocates, for log output.
    fn name(&self) -> &'static str;

    /// Grows `file` so that it ends exactly at `size` bytes.
    ///
    /// Returns the number of bytes written to the file in the process.
    fn preallocate(&self, file: &mut File, size: u64) -> io::Result<u64>;
}

/// Extends the file by moving the end-of-file marker.
///
/// `File::set_len` is `ftruncate` on POSIX systems and the native
/// end-of-file call on Windows, so no data is written.
#[derive(Debug, Clone, Copy, Default)]
pub struct SetLen;

impl Preallocate for SetLen {
    fn name(&self) -> &'static str {
        "quickly"
    }

    fn preallocate(&self, file: &mut File, size: u64) -> io::Result<u64> {
        let position = file.seek(SeekFrom::Start(size))?;
        file.set_len(position)?;
        debug!("Set end of file at offset {position}");
        Ok(0)
    }
}

/// Extends the file by writing zeroes until it reaches the target length.
#[derive(Debug, Clone, Copy)]
pub struct ZeroFill {
    chunk_size: usize,
}

impl ZeroFill {
    /// Creates a zero-filler writing chunks of at most `chunk_size` bytes.
    ///
    /// The chunk size is clamped to `1..=MAX_CHUNK_SIZE`.
    #[must_use]
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.clamp(1, MAX_CHUNK_SIZE),
        }
    }

    #[must_use]
    pub const fn chunk_size(&self) -> usize {
        self.chunk_size
    }
}

impl Default for ZeroFill {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE)
    }
}

impl Preallocate for ZeroFill {
    fn name(&self) -> &'static str {
        "slowly"
    }

    fn preallocate(&self, file: &mut File, size: u64) -> io::Result<u64> {
        let written = zero_fill(file, size, self.chunk_size)?;
        info!("Zeroed {written} bytes");
        Ok(written)
    }
}

/// Appends zeroes to `writer` until its end reaches `size`.
///
/// Filling starts from the current end of the stream, not from offset 0.
/// If the stream is already at least `size` bytes long nothing is written.
/// The last chunk is shrunk so the total is exact, and the zero buffer is
/// never larger than what is left to write.
pub fn zero_fill<W: Write + Seek>(writer: &mut W, size: u64, chunk_size: usize) -> io::Result<u64> {
    let end = writer.seek(SeekFrom::End(0))?;
    let mut remaining = size.saturating_sub(end);
    let buf_len = chunk_size
        .max(1)
        .min(usize::try_from(remaining).unwrap_or(usize::MAX));
    let buf = vec![0u8; buf_len];
    let mut written = 0;

    while remaining > 0 {
        let len = usize::try_from(remaining).map_or(buf.len(), |r| r.min(buf.len()));
        trace!("Writing {len} zero bytes at offset {}", end + written);
        writer.write_all(&buf[..len])?;

        let len = len as u64;
        remaining -= len;
        written += len;
    }

    Ok(written)
}

/// The two benchmarked preallocation approaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Move the end-of-file marker.
    Fast,
    /// Write zeroes chunk by chunk.
    Slow,
}

impl Strategy {
    /// Picks the implementation for this strategy.
    #[must_use]
    pub fn preallocator(self, chunk_size: usize) -> Box<dyn Preallocate> {
        match self {
            Self::Fast => Box::new(SetLen),
            Self::Slow => Box::new(ZeroFill::new(chunk_size)),
        }
    }

    /// Label used for section banners.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Fast => "fast",
            Self::Slow => "slow",
        }
    }
}

// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Data sources for uploads.
//!
//! The client reads the data to upload one block at a time, so a source must
//! know its total size upfront and support reads at arbitrary offsets.

use bytes::Bytes;
use std::ops::Range;
use std::path::Path;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

/// Provides the data for an upload.
///
/// The client calls [read_range][BlockSource::read_range] once for each
/// block, in increasing offset order. The bytes are kept in memory until the
/// block is written, including any retries.
pub trait BlockSource {
    /// The error type.
    type Error: std::error::Error + Send + Sync + 'static;

    /// The total number of bytes to upload.
    fn size(&self) -> u64;

    /// Returns the bytes in `range`.
    ///
    /// The range is never empty, and never extends past [size][Self::size].
    /// Implementations must return exactly `range.end - range.start` bytes.
    fn read_range(
        &mut self,
        range: Range<u64>,
    ) -> impl Future<Output = Result<Bytes, Self::Error>> + Send;
}

/// An in-memory [BlockSource].
///
/// # Example
/// ```
/// # use azure_blob_upload::source::{BlockSource, BytesSource};
/// let source = BytesSource::from("the quick brown fox jumps over the lazy dog");
/// assert_eq!(source.size(), 43);
/// ```
#[derive(Clone, Debug)]
pub struct BytesSource {
    contents: Bytes,
}

impl BytesSource {
    pub fn new(contents: Bytes) -> Self {
        Self { contents }
    }
}

impl BlockSource for BytesSource {
    type Error = std::io::Error;

    fn size(&self) -> u64 {
        self.contents.len() as u64
    }

    async fn read_range(&mut self, range: Range<u64>) -> Result<Bytes, Self::Error> {
        if range.start > range.end || range.end > self.size() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!(
                    "range {}..{} is out of bounds for a source of {} bytes",
                    range.start,
                    range.end,
                    self.size()
                ),
            ));
        }
        Ok(self
            .contents
            .slice(range.start as usize..range.end as usize))
    }
}

impl From<Bytes> for BytesSource {
    fn from(value: Bytes) -> Self {
        Self::new(value)
    }
}

impl From<Vec<u8>> for BytesSource {
    fn from(value: Vec<u8>) -> Self {
        Self::new(Bytes::from(value))
    }
}

impl From<&'static str> for BytesSource {
    fn from(value: &'static str) -> Self {
        Self::new(Bytes::from_static(value.as_bytes()))
    }
}

impl From<&'static [u8]> for BytesSource {
    fn from(value: &'static [u8]) -> Self {
        Self::new(Bytes::from_static(value))
    }
}

/// Converts values into a [BlockSource].
///
/// Implemented for all [BlockSource] types and for the common in-memory
/// buffers, so `upload_blob()` accepts a `&'static str`, `Vec<u8>` or
/// `bytes::Bytes` directly.
pub trait IntoBlockSource {
    type Source: BlockSource;
    fn into_block_source(self) -> Self::Source;
}

impl<S: BlockSource> IntoBlockSource for S {
    type Source = S;
    fn into_block_source(self) -> S {
        self
    }
}

impl IntoBlockSource for &'static str {
    type Source = BytesSource;
    fn into_block_source(self) -> Self::Source {
        self.into()
    }
}

impl IntoBlockSource for Vec<u8> {
    type Source = BytesSource;
    fn into_block_source(self) -> Self::Source {
        self.into()
    }
}

impl IntoBlockSource for bytes::Bytes {
    type Source = BytesSource;
    fn into_block_source(self) -> Self::Source {
        self.into()
    }
}

/// A [BlockSource] backed by a local file.
///
/// The size is captured when the file is opened. The file should not change
/// while the upload is in progress.
#[derive(Debug)]
pub struct FileSource {
    file: tokio::fs::File,
    size: u64,
}

impl FileSource {
    /// Opens the file at `path` for reading.
    pub async fn open<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let file = tokio::fs::File::open(path).await?;
        Self::from_file(file).await
    }

    /// Uses an already open file.
    pub async fn from_file(file: tokio::fs::File) -> std::io::Result<Self> {
        let size = file.metadata().await?.len();
        Ok(Self { file, size })
    }
}

impl BlockSource for FileSource {
    type Error = std::io::Error;

    fn size(&self) -> u64 {
        self.size
    }

    async fn read_range(&mut self, range: Range<u64>) -> Result<Bytes, Self::Error> {
        let len = range.end.saturating_sub(range.start);
        let mut buffer = vec![0_u8; len as usize];
        self.file.seek(std::io::SeekFrom::Start(range.start)).await?;
        self.file.read_exact(&mut buffer).await?;
        Ok(Bytes::from_owner(buffer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    type Result = anyhow::Result<()>;

    const CONTENTS: &[u8] = b"how vexingly quick daft zebras jump";

    #[tokio::test]
    async fn bytes_read_range() -> Result {
        let mut source = BytesSource::from(CONTENTS);
        assert_eq!(source.size(), CONTENTS.len() as u64);
        let got = source.read_range(4..12).await?;
        assert_eq!(got[..], CONTENTS[4..12], "{got:?}");
        let got = source.read_range(30..35).await?;
        assert_eq!(got[..], CONTENTS[30..35], "{got:?}");
        Ok(())
    }

    #[tokio::test]
    async fn bytes_out_of_bounds() -> Result {
        let mut source = BytesSource::from(CONTENTS);
        let err = source.read_range(30..36).await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::UnexpectedEof, "{err:?}");
        Ok(())
    }

    #[tokio::test]
    async fn bytes_conversions() -> Result {
        const LAZY: &str = "the quick brown fox jumps over the lazy dog";
        assert_eq!(BytesSource::from(LAZY).size(), LAZY.len() as u64);
        assert_eq!(BytesSource::from(LAZY.as_bytes().to_vec()).size(), 43);
        assert_eq!(BytesSource::from(Bytes::new()).size(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn empty_file() -> Result {
        let file = NamedTempFile::new()?;
        let source = FileSource::open(file.path()).await?;
        assert_eq!(source.size(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn file_read_range() -> Result {
        let mut file = NamedTempFile::new()?;
        assert_eq!(file.write(CONTENTS)?, CONTENTS.len());
        file.flush()?;
        let mut source = FileSource::open(file.path()).await?;
        assert_eq!(source.size(), CONTENTS.len() as u64);

        // Reads may happen in any order, including repeats.
        let got = source.read_range(8..16).await?;
        assert_eq!(got[..], CONTENTS[8..16], "{got:?}");
        let got = source.read_range(0..4).await?;
        assert_eq!(got[..], CONTENTS[0..4], "{got:?}");
        let got = source.read_range(8..16).await?;
        assert_eq!(got[..], CONTENTS[8..16], "{got:?}");
        Ok(())
    }

    #[tokio::test]
    async fn file_read_past_end() -> Result {
        let mut file = NamedTempFile::new()?;
        assert_eq!(file.write(CONTENTS)?, CONTENTS.len());
        file.flush()?;
        let mut source = FileSource::from_file(tokio::fs::File::from(file.reopen()?)).await?;
        let err = source
            .read_range(30..(CONTENTS.len() as u64 + 10))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::UnexpectedEof, "{err:?}");
        Ok(())
    }

    #[tokio::test]
    async fn missing_file() -> Result {
        let dir = tempfile::tempdir()?;
        let err = FileSource::open(dir.path().join("missing.bin"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::NotFound, "{err:?}");
        Ok(())
    }
}

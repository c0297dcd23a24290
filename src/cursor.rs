use std::collections::VecDeque;
use std::io::SeekFrom;

use async_trait::async_trait;
use futures::TryStreamExt;
use tokio::fs::File;
use tokio::io::{self, AsyncRead, AsyncReadExt, AsyncSeekExt};
use tokio_util::io::StreamReader;

use crate::error::ProbeError;

/// An ordered byte source a [`StreamCursor`] can pull from.
///
/// `unread` hands back bytes the cursor no longer wants buffered; a later
/// `pull` must replay them in order before producing any new bytes.
#[async_trait]
pub trait ByteSource: Send {
    async fn pull(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    async fn unread(&mut self, data: Vec<u8>) -> io::Result<()>;
}

/// Byte source backed by a local file handle.
pub struct LocalSource {
    file: File,
}

impl LocalSource {
    pub fn new(file: File) -> Self {
        Self { file }
    }
}

#[async_trait]
impl ByteSource for LocalSource {
    async fn pull(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf).await
    }

    async fn unread(&mut self, data: Vec<u8>) -> io::Result<()> {
        // The file is seekable, so replay is just rewinding the handle.
        self.file
            .seek(SeekFrom::Current(-(data.len() as i64)))
            .await?;
        Ok(())
    }
}

/// Byte source backed by a live network response body.
///
/// The body cannot be rewound, so bytes handed back via `unread` go onto a
/// replay queue that is drained before the body is polled again.
pub struct RemoteSource {
    inner: Box<dyn AsyncRead + Send + Unpin>,
    pending: VecDeque<u8>,
}

impl RemoteSource {
    pub fn new(reader: Box<dyn AsyncRead + Send + Unpin>) -> Self {
        Self {
            inner: reader,
            pending: VecDeque::new(),
        }
    }

    pub fn from_response(response: reqwest::Response) -> Self {
        let stream = Box::pin(response.bytes_stream().map_err(io::Error::other));
        Self::new(Box::new(StreamReader::new(stream)))
    }
}

#[async_trait]
impl ByteSource for RemoteSource {
    async fn pull(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if !self.pending.is_empty() {
            let n = buf.len().min(self.pending.len());
            for slot in buf.iter_mut().take(n) {
                *slot = self.pending.pop_front().unwrap_or_default();
            }
            return Ok(n);
        }
        self.inner.read(buf).await
    }

    async fn unread(&mut self, data: Vec<u8>) -> io::Result<()> {
        for byte in data.into_iter().rev() {
            self.pending.push_front(byte);
        }
        Ok(())
    }
}

/// A forward reader with limited backward seeking over a byte source.
///
/// Every byte pulled during a probe is retained in `buffered`, so any offset
/// that has already been read can be sought back to and re-read with
/// identical content. A backward seek trims the buffer to the target offset
/// and pushes the trimmed tail back onto the source.
pub struct StreamCursor<S: ByteSource> {
    buffered: Vec<u8>,
    position: usize,
    source: S,
}

impl<S: ByteSource> StreamCursor<S> {
    pub fn new(source: S) -> Self {
        Self {
            buffered: Vec::new(),
            position: 0,
            source,
        }
    }

    /// Reads up to `n` bytes, returning fewer only when the source is
    /// exhausted.
    pub async fn read(&mut self, n: usize) -> Result<Vec<u8>, ProbeError> {
        while self.buffered.len() - self.position < n {
            let deficit = n - (self.buffered.len() - self.position);
            let mut chunk = vec![0u8; deficit];
            let got = self.source.pull(&mut chunk).await?;
            if got == 0 {
                break;
            }
            self.buffered.extend_from_slice(&chunk[..got]);
        }
        let end = self.buffered.len().min(self.position + n);
        let out = self.buffered[self.position..end].to_vec();
        self.position = end;
        Ok(out)
    }

    /// Repositions the cursor at an absolute offset.
    ///
    /// Seeking backward works for any offset already read in this session;
    /// seeking forward past the buffered tail pulls and retains the
    /// intervening bytes.
    pub async fn seek(&mut self, offset: usize) -> Result<(), ProbeError> {
        if offset <= self.buffered.len() {
            if offset < self.buffered.len() {
                let tail = self.buffered.split_off(offset);
                self.source.unread(tail).await?;
            }
            self.position = offset;
        } else {
            let delta = offset - self.buffered.len();
            self.position = self.buffered.len();
            self.read(delta).await?;
        }
        Ok(())
    }
}

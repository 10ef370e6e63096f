//! Buffered frame I/O over a monoio stream.

use std::io::{self, Cursor};

use bytes::{Buf, BytesMut};
use monoio::io::{AsyncReadRent, AsyncWriteRent, AsyncWriteRentExt};
use monoio_codec::{Decoded, Decoder, FramedRead};

use crate::{
    error::{Error, Result},
    protocol::frame::FrameHeader,
};

/// Decoder for a frame header, including the extended length and the mask key.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeaderDecoder;

impl Decoder for HeaderDecoder {
    type Item = (FrameHeader, u64);
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Decoded<Self::Item>, Self::Error> {
        let (parsed, consumed) = {
            let mut cursor = Cursor::new(&src[..]);
            let parsed = FrameHeader::parse(&mut cursor)?;
            (parsed, cursor.position() as usize)
        };

        Ok(match parsed {
            Some(item) => {
                src.advance(consumed);
                Decoded::Some(item)
            }
            None => Decoded::Insufficient,
        })
    }
}

/// Decoder yielding whatever is buffered, up to `limit` bytes.
#[derive(Debug, Clone, Copy)]
pub struct PayloadDecoder {
    limit: usize,
}

impl PayloadDecoder {
    /// Creates a decoder that yields at most `limit` bytes per item.
    pub fn new(limit: usize) -> Self {
        Self { limit }
    }
}

impl Decoder for PayloadDecoder {
    type Item = BytesMut;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Decoded<Self::Item>, Self::Error> {
        if src.is_empty() || self.limit == 0 {
            return Ok(Decoded::Insufficient);
        }

        let n = self.limit.min(src.len());
        Ok(Decoded::Some(src.split_to(n)))
    }
}

/// Byte stream with a read buffer, shared by the handshake and the frame layer.
///
/// Bytes the server sent right after its handshake response stay in the read buffer and are
/// consumed by the first frame read.
#[derive(Debug)]
pub struct FrameCodec<IO> {
    inner: FramedRead<IO, HeaderDecoder>,
}

impl<IO> FrameCodec<IO> {
    /// Creates a new `FrameCodec` with a read buffer of the given initial capacity.
    pub fn new(io: IO, initial_read_capacity: usize) -> Self {
        Self {
            inner: FramedRead::with_capacity(io, HeaderDecoder, initial_read_capacity),
        }
    }

    /// Returns a reference to the underlying `IO`.
    pub fn get_ref(&self) -> &IO {
        self.inner.get_ref()
    }

    /// Returns a mutable reference to the underlying `IO`.
    pub fn get_mut(&mut self) -> &mut IO {
        self.inner.get_mut()
    }

    /// Consumes the `FrameCodec` and returns the underlying `IO`.
    ///
    /// Buffered bytes that were not consumed yet are lost.
    pub fn into_inner(self) -> IO {
        self.inner.into_inner()
    }

    /// Returns a reference to the read buffer.
    pub fn read_buffer(&self) -> &BytesMut {
        self.inner.read_buffer()
    }

    /// Decodes one item with a custom decoder. The end of the stream is reported as
    /// [`io::ErrorKind::UnexpectedEof`].
    pub async fn next_with<C>(&mut self, codec: &mut C) -> Result<C::Item>
    where
        IO: AsyncReadRent,
        C: Decoder<Error = Error>,
    {
        match self.inner.next_with(codec).await {
            Some(item) => item,
            None => Err(Error::Io(io::ErrorKind::UnexpectedEof.into())),
        }
    }

    /// Reads the next frame header.
    pub async fn read_header(&mut self) -> Result<(FrameHeader, u64)>
    where
        IO: AsyncReadRent,
    {
        self.next_with(&mut HeaderDecoder).await
    }

    /// Fills `dst` completely, reading from the stream as often as needed.
    pub async fn read_exact(&mut self, dst: &mut [u8]) -> Result<()>
    where
        IO: AsyncReadRent,
    {
        let mut filled = 0;
        while filled < dst.len() {
            let chunk = self
                .next_with(&mut PayloadDecoder::new(dst.len() - filled))
                .await?;
            dst[filled..filled + chunk.len()].copy_from_slice(&chunk);
            filled += chunk.len();
        }
        Ok(())
    }

    /// Reads and drops `count` bytes, at most `chunk_size` bytes at a time.
    pub async fn skip(&mut self, mut count: u64, chunk_size: usize) -> Result<()>
    where
        IO: AsyncReadRent,
    {
        let chunk_size = chunk_size.max(1);
        while count > 0 {
            let want = count.min(chunk_size as u64) as usize;
            let chunk = self.next_with(&mut PayloadDecoder::new(want)).await?;
            count -= chunk.len() as u64;
        }
        Ok(())
    }

    /// Writes the whole buffer in one transport call and hands the buffer back for reuse.
    pub async fn write_all(&mut self, buf: BytesMut) -> (Result<()>, BytesMut)
    where
        IO: AsyncWriteRent,
    {
        let (res, buf) = self.get_mut().write_all(buf).await;
        (res.map(|_| ()).map_err(Error::from), buf)
    }

    /// Flushes the underlying stream.
    pub async fn flush(&mut self) -> Result<()>
    where
        IO: AsyncWriteRent,
    {
        self.get_mut().flush().await?;
        Ok(())
    }

    /// Shuts down the write side of the underlying stream.
    pub async fn shutdown(&mut self) -> Result<()>
    where
        IO: AsyncWriteRent,
    {
        self.get_mut().shutdown().await?;
        Ok(())
    }
}

use bytes::{BufMut, BytesMut};
use log::{debug, trace};
use monoio::io::{AsyncReadRent, AsyncWriteRent};
use rand::rngs::ThreadRng;

use crate::{
    error::{CapacityError, Error, ProtocolError, Result},
    protocol::{
        frame::{FrameHeader, apply_mask, codec::FrameCodec, coding::OpCode},
        message::Message,
    },
    random::{RandomSource, default_source},
};

/// The configuration for WebSocket connection.
#[derive(Debug, Clone, Copy)]
#[non_exhaustive]
pub struct WebSocketConfig {
    /// The largest handshake request the client will send.
    ///
    /// The default value is 4096 bytes.
    pub max_request_size: usize,
    /// The largest handshake response head (status line and headers) the client will buffer
    /// while looking for the end of the headers.
    ///
    /// The default value is 4096 bytes.
    pub max_response_size: usize,
    /// The initial capacity of the read buffer.
    ///
    /// The default value is 8 KiB.
    pub initial_read_capacity: usize,
    /// The largest piece of unread payload discarded at once when a new frame is requested
    /// before the previous one was fully read.
    ///
    /// The default value is 1024 bytes.
    pub drain_chunk_size: usize,
    /// The size of the pieces an outgoing payload is masked and written in.
    ///
    /// The default value is 2048 bytes.
    pub write_chunk_size: usize,
    /// The maximum size of a message returned by
    /// [`read_message`](crate::protocol::WebSocket::read_message). `None` means no size limit.
    ///
    /// The default value is 64 MiB, which should be reasonably big for all normal use-cases but
    /// small enough to prevent memory eating by a malicious user.
    pub max_message_size: Option<usize>,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            max_request_size: 4096,
            max_response_size: 4096,
            initial_read_capacity: 8 * 1024,
            drain_chunk_size: 1024,
            write_chunk_size: 2048,
            max_message_size: Some(64 << 20),
        }
    }
}

impl WebSocketConfig {
    /// Sets [`Self::max_request_size`].
    pub fn max_request_size(mut self, max_request_size: usize) -> Self {
        self.max_request_size = max_request_size;
        self
    }

    /// Sets [`Self::max_response_size`].
    pub fn max_response_size(mut self, max_response_size: usize) -> Self {
        self.max_response_size = max_response_size;
        self
    }

    /// Sets [`Self::initial_read_capacity`].
    pub fn initial_read_capacity(mut self, initial_read_capacity: usize) -> Self {
        self.initial_read_capacity = initial_read_capacity;
        self
    }

    /// Sets [`Self::drain_chunk_size`]. Zero is treated as one.
    pub fn drain_chunk_size(mut self, drain_chunk_size: usize) -> Self {
        self.drain_chunk_size = drain_chunk_size.max(1);
        self
    }

    /// Sets [`Self::write_chunk_size`]. Zero is treated as one.
    pub fn write_chunk_size(mut self, write_chunk_size: usize) -> Self {
        self.write_chunk_size = write_chunk_size.max(1);
        self
    }

    /// Sets [`Self::max_message_size`].
    pub fn max_message_size(mut self, max_message_size: Option<usize>) -> Self {
        self.max_message_size = max_message_size;
        self
    }
}

/// Outcome of a [`WebSocket::receive`] or [`WebSocket::receive_more`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Received {
    /// Opcode of the frame the bytes belong to.
    pub opcode: OpCode,
    /// Number of payload bytes written into the caller's buffer.
    pub len: usize,
    /// Payload bytes of the same frame still waiting on the stream.
    pub remaining: u64,
}

impl Received {
    /// Tells whether the buffer was too small for the rest of the frame.
    pub fn is_truncated(&self) -> bool {
        self.remaining > 0
    }
}

/// The frame whose payload is being read.
#[derive(Debug, Clone, Copy)]
struct Incoming {
    opcode: OpCode,
    mask: Option<[u8; 4]>,
    /// Payload bytes already handed out, for the mask key index.
    position: usize,
    remaining: u64,
}

/// A client WebSocket connection.
///
/// Created by [`connect`](crate::connect) or [`client`](crate::client) once the handshake
/// succeeded. Frames are sent with [`send`](Self::send) and received with
/// [`receive`](Self::receive), or as whole messages with [`write_message`](Self::write_message)
/// and [`read_message`](Self::read_message).
///
/// All operations take `&mut self`: a connection has one reader and one writer at a time.
#[derive(Debug)]
pub struct WebSocket<S, R = ThreadRng> {
    frame_codec: FrameCodec<S>,
    rng: R,
    /// Receive: the frame being read, if its payload is not exhausted.
    incoming: Option<Incoming>,
    /// Set once a transport or protocol error left the stream at an unknown position.
    poisoned: bool,
    /// Set once a frame could not be written completely.
    send_failed: bool,
    config: WebSocketConfig,
}

impl<S> WebSocket<S>
where
    S: AsyncReadRent + AsyncWriteRent,
{
    /// Converts a raw socket into a WebSocket without performing a handshake.
    pub fn from_raw_socket(stream: S, config: Option<WebSocketConfig>) -> Self {
        let config = config.unwrap_or_default();
        let frame_codec = FrameCodec::new(stream, config.initial_read_capacity);
        Self::from_frame_codec(frame_codec, default_source(), config)
    }
}

impl<S, R> WebSocket<S, R>
where
    S: AsyncReadRent + AsyncWriteRent,
    R: RandomSource,
{
    /// Same as [`from_raw_socket`](WebSocket::from_raw_socket), masking with the given random
    /// source.
    pub fn from_raw_socket_with_rng(stream: S, rng: R, config: Option<WebSocketConfig>) -> Self {
        let config = config.unwrap_or_default();
        let frame_codec = FrameCodec::new(stream, config.initial_read_capacity);
        Self::from_frame_codec(frame_codec, rng, config)
    }

    /// Creates a [`WebSocket`] from the frame codec the handshake ran on, keeping the bytes it
    /// already buffered.
    pub(crate) fn from_frame_codec(
        frame_codec: FrameCodec<S>,
        rng: R,
        config: WebSocketConfig,
    ) -> Self {
        Self {
            frame_codec,
            rng,
            incoming: None,
            poisoned: false,
            send_failed: false,
            config,
        }
    }

    /// Returns a shared reference to the inner stream.
    pub fn get_ref(&self) -> &S {
        self.frame_codec.get_ref()
    }

    /// Returns a mutable reference to the inner stream.
    pub fn get_mut(&mut self) -> &mut S {
        self.frame_codec.get_mut()
    }

    /// Reads the configuration.
    pub fn get_config(&self) -> &WebSocketConfig {
        &self.config
    }

    /// Changes the configuration.
    pub fn set_config(&mut self, set_func: impl FnOnce(&mut WebSocketConfig)) {
        set_func(&mut self.config);
    }

    /// Payload bytes of the current inbound frame not yet delivered.
    pub fn remaining(&self) -> u64 {
        self.incoming.map(|incoming| incoming.remaining).unwrap_or(0)
    }

    /// Receives the payload of the next frame into `buf`.
    ///
    /// Unread payload of the previous frame is discarded first, so every call starts at a frame
    /// boundary. When `buf` is smaller than the payload, the returned [`Received`] is
    /// [truncated](Received::is_truncated) and the rest can be fetched with
    /// [`receive_more`](Self::receive_more) before the next `receive`.
    pub async fn receive(&mut self, buf: &mut [u8]) -> Result<Received> {
        self.check_usable()?;
        let res = self.receive_frame(buf).await;
        self.poison_on_error(res)
    }

    /// Continues reading the payload of the current frame into `buf`.
    ///
    /// Returns `None` when the current frame has been read completely.
    pub async fn receive_more(&mut self, buf: &mut [u8]) -> Result<Option<Received>> {
        self.check_usable()?;
        let res = self.read_payload(buf).await;
        self.poison_on_error(res)
    }

    /// Discards the unread payload of the current frame.
    pub async fn skip_remaining(&mut self) -> Result<()> {
        self.check_usable()?;
        let res = self.drain().await;
        self.poison_on_error(res)
    }

    /// Sends `payload` as a single final, masked frame.
    ///
    /// Returns the number of payload bytes written. The payload is written in chunks; if a write
    /// fails, the bytes already written are not retracted.
    pub async fn send(&mut self, opcode: OpCode, payload: &[u8]) -> Result<usize> {
        self.check_usable()?;
        let res = self.send_frame(opcode, payload).await;
        self.send_failed |= res.is_err();
        self.poison_on_error(res)
    }

    /// Sends a text frame.
    pub async fn send_text(&mut self, text: &str) -> Result<usize> {
        self.send(OpCode::Text, text.as_bytes()).await
    }

    /// Sends a binary frame.
    pub async fn send_binary(&mut self, data: &[u8]) -> Result<usize> {
        self.send(OpCode::Binary, data).await
    }

    /// Sends a ping frame.
    pub async fn ping(&mut self, data: &[u8]) -> Result<usize> {
        self.send(OpCode::Ping, data).await
    }

    /// Sends a pong frame.
    pub async fn pong(&mut self, data: &[u8]) -> Result<usize> {
        self.send(OpCode::Pong, data).await
    }

    /// Reads one complete frame as a [`Message`].
    ///
    /// Unread payload of a previous [`receive`](Self::receive) is discarded first. A frame larger
    /// than [`WebSocketConfig::max_message_size`] is reported as
    /// [`CapacityError::MessageTooLong`] and its payload is left for the next call to discard.
    pub async fn read_message(&mut self) -> Result<Message> {
        self.check_usable()?;
        let res = self.read_message_frame().await;
        self.poison_on_error(res)
    }

    /// Writes a [`Message`] as one frame.
    pub async fn write_message(&mut self, message: Message) -> Result<()> {
        let (opcode, payload) = message.into_frame();
        self.send(opcode, &payload).await?;
        Ok(())
    }

    /// Sends an empty close frame and releases the transport.
    ///
    /// Never fails: errors while sending the close frame or shutting the stream down are
    /// ignored, since the connection is torn down either way. The close frame is attempted even
    /// after a failed read; only a failed send, which may have left a partial frame on the wire,
    /// skips it.
    pub async fn close(mut self) {
        if !self.send_failed
            && let Err(e) = self.send_frame(OpCode::Close, &[]).await
        {
            debug!("Failed to send close frame: {e}");
        }

        if let Err(e) = self.frame_codec.shutdown().await {
            debug!("Failed to shut down stream: {e}");
        }
    }

    /// Consumes the WebSocket and returns the underlying stream without sending a close frame.
    pub fn into_inner(self) -> S {
        self.frame_codec.into_inner()
    }

    async fn receive_frame(&mut self, buf: &mut [u8]) -> Result<Received> {
        self.drain().await?;

        let (header, length) = self.read_frame_header().await?;
        let incoming = Incoming {
            opcode: header.opcode,
            mask: header.mask,
            position: 0,
            remaining: length,
        };
        self.incoming = Some(incoming);

        self.read_payload_of(incoming, buf).await
    }

    /// Reads a frame header, rejecting anything but a complete, unfragmented frame.
    async fn read_frame_header(&mut self) -> Result<(FrameHeader, u64)> {
        let (header, length) = self.frame_codec.read_header().await?;
        trace!("Received frame header: {header:?}, payload length {length}");

        if !header.is_final || header.opcode == OpCode::Continue {
            return Err(Error::Protocol(ProtocolError::UnsupportedFragmentation));
        }

        Ok((header, length))
    }

    /// Copies the next piece of the current frame's payload into `buf`, if there is a current
    /// frame.
    async fn read_payload(&mut self, buf: &mut [u8]) -> Result<Option<Received>> {
        match self.incoming {
            Some(incoming) => Ok(Some(self.read_payload_of(incoming, buf).await?)),
            None => Ok(None),
        }
    }

    async fn read_payload_of(
        &mut self,
        mut incoming: Incoming,
        buf: &mut [u8],
    ) -> Result<Received> {
        let n = buf.len().min(usize::try_from(incoming.remaining).unwrap_or(usize::MAX));
        let dst = &mut buf[..n];
        self.frame_codec.read_exact(dst).await?;
        if let Some(mask) = incoming.mask {
            apply_mask(dst, mask, incoming.position);
        }

        incoming.position += n;
        incoming.remaining -= n as u64;
        self.incoming = (incoming.remaining > 0).then_some(incoming);

        Ok(Received {
            opcode: incoming.opcode,
            len: n,
            remaining: incoming.remaining,
        })
    }

    /// Discards whatever is left of the current frame.
    async fn drain(&mut self) -> Result<()> {
        if let Some(incoming) = self.incoming {
            trace!("Skipping {} unread payload bytes", incoming.remaining);
            self.frame_codec
                .skip(incoming.remaining, self.config.drain_chunk_size)
                .await?;
            self.incoming = None;
        }
        Ok(())
    }

    async fn read_message_frame(&mut self) -> Result<Message> {
        self.drain().await?;

        let (header, length) = self.read_frame_header().await?;
        let incoming = Incoming {
            opcode: header.opcode,
            mask: header.mask,
            position: 0,
            remaining: length,
        };
        self.incoming = Some(incoming);

        let max_size = self.config.max_message_size;
        let too_long = || {
            Error::Capacity(CapacityError::MessageTooLong {
                size: length,
                max_size: max_size.unwrap_or(isize::MAX as usize),
            })
        };

        if max_size.is_some_and(|max_size| length > max_size as u64) {
            return Err(too_long());
        }

        let size = usize::try_from(length).map_err(|_| too_long())?;
        let mut payload = Vec::new();
        payload.try_reserve_exact(size).map_err(|_| too_long())?;
        payload.resize(size, 0);
        self.read_payload_of(incoming, &mut payload).await?;
        Message::from_frame(header.opcode, payload)
    }

    async fn send_frame(&mut self, opcode: OpCode, payload: &[u8]) -> Result<usize> {
        // 5. If the data is being sent by the client, the frame(s) MUST be
        // masked as defined in Section 5.3. (RFC 6455)
        let mut mask = [0u8; 4];
        self.rng.fill(&mut mask);

        let header = FrameHeader {
            is_final: true,
            opcode,
            mask: Some(mask),
        };
        trace!("Sending frame: {header:?}, payload length {}", payload.len());

        let mut buf = BytesMut::with_capacity(FrameHeader::MAX_SIZE);
        header.format(payload.len() as u64, &mut buf);
        let (res, mut buf) = self.frame_codec.write_all(buf).await;
        res?;

        let chunk_size = self.config.write_chunk_size.max(1);
        let mut written = 0;
        for chunk in payload.chunks(chunk_size) {
            buf.clear();
            buf.put_slice(chunk);
            apply_mask(&mut buf, mask, written);

            let (res, returned) = self.frame_codec.write_all(buf).await;
            buf = returned;
            res?;
            written += chunk.len();
        }

        self.frame_codec.flush().await?;
        Ok(written)
    }

    fn check_usable(&self) -> Result<()> {
        if self.poisoned {
            Err(Error::AlreadyClosed)
        } else {
            Ok(())
        }
    }

    /// Marks the connection unusable when `res` is an error: after a failed transport call or a
    /// protocol violation the stream position is unknown.
    fn poison_on_error<T>(&mut self, res: Result<T>) -> Result<T> {
        if let Err(ref e) = res
            && !matches!(e, Error::Capacity(CapacityError::MessageTooLong { .. }))
        {
            self.poisoned = true;
        }
        res
    }
}

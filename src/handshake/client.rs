//! Client handshake.

use bytes::{Bytes, BytesMut};
use http::{HeaderName, HeaderValue, Response as HttpResponse, StatusCode};
use httparse::Status;
use log::debug;
use monoio::io::{AsyncReadRent, AsyncWriteRent};
use monoio_codec::{Decoded, Decoder, Encoder};

use super::{derive_accept_key, generate_key};
use crate::{
    error::{CapacityError, Error, ProtocolError, Result},
    protocol::{WebSocket, WebSocketConfig, frame::codec::FrameCodec},
    random::RandomSource,
};

/// Client response type.
pub type Response = HttpResponse<()>;

/// Limit for the number of header lines.
const MAX_HEADERS: usize = 124;

/// The only status line a successful upgrade may start with.
const SWITCHING_PROTOCOLS: &[u8] = b"HTTP/1.1 101 Switching Protocols";

/// The upgrade request: where to connect and what to send along.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    host: String,
    path: String,
    headers: Vec<(String, String)>,
}

impl Request {
    /// Creates a request for `path` on `host`. The host should include the port when it is not
    /// the default one. An empty path means `/`.
    pub fn new(host: impl Into<String>, path: impl Into<String>) -> Self {
        let mut path = path.into();
        if path.is_empty() {
            path.push('/');
        }

        Self {
            host: host.into(),
            path,
            headers: Vec::new(),
        }
    }

    /// Adds a header sent after the ones the handshake requires, e.g. `Origin` or
    /// `Authorization`.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// The value of the `Host` header.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The request target.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Additional headers.
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }
}

/// Performs a client handshake over `stream`.
///
/// On success the returned [`WebSocket`] is ready for frame traffic; bytes the server sent
/// after its response are kept for the first read. On failure the stream is dropped.
pub async fn client_handshake<S, R>(
    request: Request,
    stream: S,
    mut rng: R,
    config: Option<WebSocketConfig>,
) -> Result<(WebSocket<S, R>, Response)>
where
    S: AsyncReadRent + AsyncWriteRent,
    R: RandomSource,
{
    let config = config.unwrap_or_default();
    let key = generate_key(&mut rng);

    let mut buf = BytesMut::with_capacity(config.max_request_size.min(4096));
    RequestEncoder::new(&key, config.max_request_size).encode(&request, &mut buf)?;

    let mut framed = FrameCodec::new(stream, config.initial_read_capacity);
    debug!(
        "Sending handshake request for {}{}",
        request.host(),
        request.path()
    );
    let (res, _) = framed.write_all(buf).await;
    res?;
    framed.flush().await?;

    let head = match framed
        .next_with(&mut ResponseDecoder::new(config.max_response_size))
        .await
    {
        Ok(head) => head,
        Err(Error::Io(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(Error::Protocol(ProtocolError::HandshakeIncomplete));
        }
        Err(e) => return Err(e),
    };

    let response = verify_response(&head, &key)?;
    debug!("Handshake with {} complete", request.host());

    let ws = WebSocket::from_frame_codec(framed, rng, config);
    Ok((ws, response))
}

/// Encoder for the upgrade request.
#[derive(Debug, Clone, Copy)]
pub struct RequestEncoder<'k> {
    key: &'k str,
    max_size: usize,
}

impl<'k> RequestEncoder<'k> {
    /// Creates an encoder sending `key` as `Sec-WebSocket-Key` and refusing requests longer
    /// than `max_size` bytes.
    pub fn new(key: &'k str, max_size: usize) -> Self {
        Self { key, max_size }
    }
}

impl Encoder<&Request> for RequestEncoder<'_> {
    type Error = Error;

    fn encode(&mut self, req: &Request, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let start = dst.len();

        check_field("request target", &req.path)?;
        put_line(dst, &["GET ", req.path.as_str(), " HTTP/1.1"]);

        let required = [
            ("Host", req.host.as_str()),
            ("Upgrade", "websocket"),
            ("Connection", "Upgrade"),
            ("Sec-WebSocket-Key", self.key),
            ("Sec-WebSocket-Version", "13"),
        ];
        let extra = req.headers.iter().map(|(k, v)| (k.as_str(), v.as_str()));

        for (name, value) in required.into_iter().chain(extra) {
            check_field(name, name)?;
            check_field(name, value)?;
            put_line(dst, &[name, ": ", value]);
        }
        dst.extend_from_slice(b"\r\n");

        let size = dst.len() - start;
        if size > self.max_size {
            dst.truncate(start);
            return Err(Error::Capacity(CapacityError::RequestTooLong {
                size,
                max_size: self.max_size,
            }));
        }

        Ok(())
    }
}

fn put_line(dst: &mut BytesMut, parts: &[&str]) {
    for part in parts {
        dst.extend_from_slice(part.as_bytes());
    }
    dst.extend_from_slice(b"\r\n");
}

/// Line breaks would let a value inject headers of its own.
fn check_field(name: &str, value: &str) -> Result<()> {
    if value.bytes().any(|b| matches!(b, b'\r' | b'\n' | b'\0')) {
        return Err(Error::Protocol(ProtocolError::InvalidHeader(name.to_owned())));
    }
    Ok(())
}

/// Decoder collecting the response head, i.e. everything up to and including the empty line.
#[derive(Debug, Clone, Copy)]
pub struct ResponseDecoder {
    max_size: usize,
    /// How far previous calls already searched for the terminator.
    scanned: usize,
}

impl ResponseDecoder {
    /// Creates a decoder giving up once `max_size` bytes arrived without the end of the head.
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size,
            scanned: 0,
        }
    }

    fn too_long(&self) -> Error {
        Error::Capacity(CapacityError::ResponseTooLong {
            max_size: self.max_size,
        })
    }
}

impl Decoder for ResponseDecoder {
    type Item = Bytes;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Decoded<Self::Item>, Self::Error> {
        // The terminator may straddle the previous read.
        let from = self.scanned.saturating_sub(3);
        let end = src[from..]
            .windows(4)
            .position(|w| w == b"\r\n\r\n")
            .map(|pos| from + pos + 4);

        match end {
            Some(end) if end <= self.max_size => {
                self.scanned = 0;
                Ok(Decoded::Some(src.split_to(end).freeze()))
            }
            None if src.len() < self.max_size => {
                self.scanned = src.len();
                Ok(Decoded::Insufficient)
            }
            _ if is_refusal(src) => Err(rejected(&src[..src.len().min(self.max_size)])),
            _ => Err(self.too_long()),
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Decoded<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Decoded::Some(head) => Ok(Decoded::Some(head)),
            _ if is_refusal(src) => Err(rejected(src)),
            _ => Err(Error::Protocol(ProtocolError::HandshakeIncomplete)),
        }
    }
}

/// Whether the bytes received so far already differ from the upgrade status line.
fn is_refusal(head: &[u8]) -> bool {
    let n = head.len().min(SWITCHING_PROTOCOLS.len());
    head[..n] != SWITCHING_PROTOCOLS[..n]
}

fn rejected(head: &[u8]) -> Error {
    Error::Protocol(ProtocolError::HandshakeRejected(
        String::from_utf8_lossy(head).into_owned(),
    ))
}

/// Checks the response head against the key sent in the request.
pub fn verify_response(head: &[u8], key: &str) -> Result<Response> {
    // 1. If the status code received from the server is not 101, the
    // client handles the response per HTTP [RFC2616] procedures. (RFC 6455)
    if !head.starts_with(SWITCHING_PROTOCOLS) {
        return Err(rejected(head));
    }

    let response = parse_response(head)?;

    // 4. If the response lacks a |Sec-WebSocket-Accept| header field or
    // the |Sec-WebSocket-Accept| contains a value other than the
    // base64-encoded SHA-1 of ... the client MUST _Fail the WebSocket
    // Connection_. (RFC 6455)
    let accept_key = derive_accept_key(key.as_bytes());
    match response.headers().get("Sec-WebSocket-Accept") {
        None => Err(Error::Protocol(ProtocolError::MissingAcceptHeader)),
        Some(value) if value.as_bytes() == accept_key.as_bytes() => Ok(response),
        Some(_) => Err(Error::Protocol(ProtocolError::AcceptKeyMismatch)),
    }
}

fn parse_response(head: &[u8]) -> Result<Response> {
    let mut hbuffer = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut raw = httparse::Response::new(&mut hbuffer);
    if let Status::Partial = raw.parse(head)? {
        return Err(Error::Protocol(ProtocolError::HandshakeIncomplete));
    }

    let mut response = Response::new(());
    *response.status_mut() = StatusCode::SWITCHING_PROTOCOLS;
    *response.version_mut() = http::Version::HTTP_11;

    let headers = response.headers_mut();
    for header in raw.headers.iter() {
        let name = HeaderName::from_bytes(header.name.as_bytes()).map_err(http::Error::from)?;
        let value = HeaderValue::from_bytes(header.value).map_err(http::Error::from)?;
        headers.append(name, value);
    }

    Ok(response)
}

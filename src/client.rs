//! Methods to connect to a WebSocket as a client.

use http::Uri;
use log::debug;
use monoio::{
    io::{AsyncReadRent, AsyncWriteRent},
    net::TcpStream,
};

use crate::{
    error::{Error, Result, UrlError},
    handshake::client::{Request, Response, client_handshake},
    protocol::{WebSocket, WebSocketConfig},
    random::default_source,
    tls::{MaybeTlsStream, Mode, wrap_stream},
};

/// Connects to the given WebSocket.
///
/// Accepts anything that implements [`IntoClientRequest`], which is often just `&str`, or a
/// [`ClientRequestBuilder`] when extra headers are needed.
pub async fn connect<R: IntoClientRequest>(
    request: R,
) -> Result<(WebSocket<MaybeTlsStream<TcpStream>>, Response)> {
    connect_with_config(request, None, false).await
}

/// The same as [`connect`] but the one can specify a websocket configuration. `disable_nagle`
/// specifies if the Nagle's algorithm must be disabled, i.e. `set_nodelay(true)`. If you don't know
/// what the Nagle's algorithm is, better leave it set to `false`.
pub async fn connect_with_config<R: IntoClientRequest>(
    request: R,
    config: Option<WebSocketConfig>,
    disable_nagle: bool,
) -> Result<(WebSocket<MaybeTlsStream<TcpStream>>, Response)> {
    let (uri, request) = request.into_client_request()?;
    let mode = uri_mode(&uri)?;

    #[cfg(not(any(feature = "native-tls", feature = "rustls-tls")))]
    if mode == Mode::Tls {
        return Err(Error::Url(UrlError::TlsFeatureNotEnabled));
    }

    let host = match uri.host() {
        Some(d) if d.starts_with('[') && d.ends_with(']') => d[1..d.len() - 1].to_string(),
        Some(d) => d.to_string(),
        None => return Err(Error::Url(UrlError::NoHostName)),
    };

    let port = uri.port_u16().unwrap_or(mode.default_port());

    debug!("Connecting to {host}:{port}");
    let stream = TcpStream::connect((host.as_str(), port)).await?;
    if disable_nagle {
        stream.set_nodelay(true)?;
    }

    let stream = wrap_stream(stream, &host, mode, None).await?;
    client_with_config(request, stream, config).await
}

/// Gets the mode of the given URL.
pub fn uri_mode(uri: &Uri) -> Result<Mode> {
    match uri.scheme_str() {
        Some("ws") => Ok(Mode::Plain),
        Some("wss") => Ok(Mode::Tls),
        _ => Err(Error::Url(UrlError::UnsupportedUrlScheme)),
    }
}

/// Performs the client handshake over the given stream given a web socket configuration. Passing
/// `None` as configuration is equal to calling [`client`] function.
///
/// Masks and the handshake key come from the thread-local generator; use [`client_handshake`]
/// to supply another [`RandomSource`](crate::RandomSource).
pub async fn client_with_config<S>(
    request: Request,
    stream: S,
    config: Option<WebSocketConfig>,
) -> Result<(WebSocket<S>, Response)>
where
    S: AsyncReadRent + AsyncWriteRent,
{
    client_handshake(request, stream, default_source(), config).await
}

/// Performs the client handshake over the given stream.
pub async fn client<S>(request: Request, stream: S) -> Result<(WebSocket<S>, Response)>
where
    S: AsyncReadRent + AsyncWriteRent,
{
    client_with_config(request, stream, None).await
}

/// Trait for converting various types into the target of a client connection.
///
/// This trait is implemented by default for string slices, strings, [`http::Uri`] and
/// [`ClientRequestBuilder`]. The returned URI decides where to connect; the [`Request`]
/// carries what is sent once connected.
pub trait IntoClientRequest {
    /// Convert into the URI to connect to and the request to send there.
    fn into_client_request(self) -> Result<(Uri, Request)>;
}

impl IntoClientRequest for &str {
    fn into_client_request(self) -> Result<(Uri, Request)> {
        self.parse::<Uri>()?.into_client_request()
    }
}

impl IntoClientRequest for &String {
    fn into_client_request(self) -> Result<(Uri, Request)> {
        <&str as IntoClientRequest>::into_client_request(self)
    }
}

impl IntoClientRequest for String {
    fn into_client_request(self) -> Result<(Uri, Request)> {
        <&str as IntoClientRequest>::into_client_request(&self)
    }
}

impl IntoClientRequest for &Uri {
    fn into_client_request(self) -> Result<(Uri, Request)> {
        self.clone().into_client_request()
    }
}

impl IntoClientRequest for Uri {
    fn into_client_request(self) -> Result<(Uri, Request)> {
        let authority = self
            .authority()
            .ok_or(Error::Url(UrlError::NoHostName))?
            .as_str();
        let host = authority
            .find('@')
            .map(|idx| authority.split_at(idx + 1).1)
            .unwrap_or(authority);

        if host.is_empty() {
            return Err(Error::Url(UrlError::EmptyHostName));
        }

        let path = self.path_and_query().map(|p| p.as_str()).unwrap_or("/");
        let request = Request::new(host, path);
        Ok((self, request))
    }
}

impl IntoClientRequest for ClientRequestBuilder {
    fn into_client_request(self) -> Result<(Uri, Request)> {
        let (uri, request) = self.uri.into_client_request()?;
        let request = self
            .additional_headers
            .into_iter()
            .fold(request, |req, (k, v)| req.with_header(k, v));
        Ok((uri, request))
    }
}

/// Builder for a custom [`IntoClientRequest`] with options to add
/// custom additional headers.
#[derive(Debug, Clone)]
pub struct ClientRequestBuilder {
    uri: Uri,
    /// Additional [`Request`] handshake headers
    additional_headers: Vec<(String, String)>,
}

impl ClientRequestBuilder {
    /// Initializes an empty request builder
    #[must_use]
    pub const fn new(uri: Uri) -> Self {
        Self {
            uri,
            additional_headers: Vec::new(),
        }
    }

    /// Adds (`key`, `value`) as an additional header to the handshake request
    pub fn with_header<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.additional_headers.push((key.into(), value.into()));
        self
    }
}

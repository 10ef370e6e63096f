//! Upgrading a connected socket to TLS before the handshake, and the stream type that hides
//! whether that happened.

use monoio::{
    BufResult,
    buf::{IoBuf, IoBufMut, IoVecBuf, IoVecBufMut},
    io::{AsyncReadRent, AsyncWriteRent},
};

use crate::error::Result;

/// Whether a connection is plain TCP or TLS, as decided by the URL scheme.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    /// `ws://`
    Plain,
    /// `wss://`
    Tls,
}

impl Mode {
    /// The port used when the URL names none.
    pub fn default_port(self) -> u16 {
        match self {
            Mode::Plain => 80,
            Mode::Tls => 443,
        }
    }
}

/// A socket, possibly wrapped in TLS by one of the enabled TLS implementations.
#[non_exhaustive]
#[derive(Debug)]
#[allow(clippy::large_enum_variant)]
pub enum MaybeTlsStream<S> {
    /// Unencrypted socket stream.
    Plain(S),
    /// Encrypted socket stream using `native-tls`.
    #[cfg(feature = "native-tls")]
    NativeTls(monoio_native_tls::TlsStream<S>),
    /// Encrypted socket stream using `rustls`.
    #[cfg(feature = "rustls-tls")]
    Rustls(monoio_rustls::ClientTlsStream<S>),
}

/// Runs `$body` with `$s` bound to whichever stream the variant holds.
macro_rules! each_stream {
    ($stream:expr, $s:ident => $body:expr) => {
        match $stream {
            MaybeTlsStream::Plain($s) => $body,
            #[cfg(feature = "native-tls")]
            MaybeTlsStream::NativeTls($s) => $body,
            #[cfg(feature = "rustls-tls")]
            MaybeTlsStream::Rustls($s) => $body,
        }
    };
}

impl<S> MaybeTlsStream<S> {
    /// The mode the stream was opened in.
    pub fn mode(&self) -> Mode {
        match self {
            MaybeTlsStream::Plain(_) => Mode::Plain,
            #[allow(unreachable_patterns)]
            _ => Mode::Tls,
        }
    }
}

impl<S: AsyncReadRent + AsyncWriteRent> AsyncReadRent for MaybeTlsStream<S> {
    async fn read<T: IoBufMut>(&mut self, buf: T) -> BufResult<usize, T> {
        each_stream!(self, s => s.read(buf).await)
    }

    async fn readv<T: IoVecBufMut>(&mut self, buf: T) -> BufResult<usize, T> {
        each_stream!(self, s => s.readv(buf).await)
    }
}

impl<S: AsyncReadRent + AsyncWriteRent> AsyncWriteRent for MaybeTlsStream<S> {
    async fn write<T: IoBuf>(&mut self, buf: T) -> BufResult<usize, T> {
        each_stream!(self, s => s.write(buf).await)
    }

    async fn writev<T: IoVecBuf>(&mut self, buf: T) -> BufResult<usize, T> {
        each_stream!(self, s => s.writev(buf).await)
    }

    async fn flush(&mut self) -> std::io::Result<()> {
        each_stream!(self, s => s.flush().await)
    }

    async fn shutdown(&mut self) -> std::io::Result<()> {
        each_stream!(self, s => s.shutdown().await)
    }
}

/// A connector that can be used when establishing connections, allowing to control whether
/// `native-tls` or `rustls` is used to create a TLS connection. Or TLS can be disabled with the
/// `Plain` variant.
#[non_exhaustive]
#[allow(missing_debug_implementations)]
pub enum Connector {
    /// Plain (non-TLS) connector.
    Plain,
    /// `native-tls` TLS connector.
    #[cfg(feature = "native-tls")]
    NativeTls(monoio_native_tls::TlsConnector),
    /// `rustls` TLS connector.
    #[cfg(feature = "rustls-tls")]
    Rustls(std::sync::Arc<rustls::ClientConfig>),
}

mod encryption {
    #[cfg(feature = "native-tls")]
    pub mod native_tls {
        use monoio::io::{AsyncReadRent, AsyncWriteRent};
        use monoio_native_tls::TlsConnector;

        use crate::{
            error::{Error, Result},
            tls::{MaybeTlsStream, Mode},
        };

        pub async fn wrap_stream<S>(
            socket: S,
            domain: &str,
            mode: Mode,
            connector: Option<TlsConnector>,
        ) -> Result<MaybeTlsStream<S>>
        where
            S: AsyncReadRent + AsyncWriteRent,
        {
            match mode {
                Mode::Plain => Ok(MaybeTlsStream::Plain(socket)),
                Mode::Tls => {
                    let connector = match connector {
                        Some(connector) => connector,
                        None => ::native_tls::TlsConnector::new()
                            .map_err(|e| Error::Tls(e.into()))?
                            .into(),
                    };
                    let stream = connector
                        .connect(domain, socket)
                        .await
                        .map_err(|e| Error::Tls(e.into()))?;
                    Ok(MaybeTlsStream::NativeTls(stream))
                }
            }
        }
    }

    #[cfg(feature = "rustls-tls")]
    pub mod rustls {
        use std::sync::Arc;

        use monoio::io::{AsyncReadRent, AsyncWriteRent};
        use monoio_rustls::TlsConnector;
        use rustls::{ClientConfig, RootCertStore, pki_types::ServerName};

        use crate::{
            error::{Error, Result},
            tls::{MaybeTlsStream, Mode},
        };

        pub async fn wrap_stream<S>(
            socket: S,
            domain: &str,
            mode: Mode,
            config: Option<Arc<ClientConfig>>,
        ) -> Result<MaybeTlsStream<S>>
        where
            S: AsyncReadRent + AsyncWriteRent,
        {
            match mode {
                Mode::Plain => Ok(MaybeTlsStream::Plain(socket)),
                Mode::Tls => {
                    let config = config.unwrap_or_else(|| {
                        let mut root_store = RootCertStore::empty();
                        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
                        Arc::new(
                            ClientConfig::builder()
                                .with_root_certificates(root_store)
                                .with_no_client_auth(),
                        )
                    });
                    let domain = ServerName::try_from(domain.to_owned())
                        .map_err(|e| Error::Tls(e.into()))?;
                    let stream = TlsConnector::from(config)
                        .connect(domain, socket)
                        .await
                        .map_err(|e| Error::Tls(e.into()))?;
                    Ok(MaybeTlsStream::Rustls(stream))
                }
            }
        }
    }

    pub mod plain {
        use monoio::io::{AsyncReadRent, AsyncWriteRent};

        use crate::{
            error::{Error, Result, UrlError},
            tls::{MaybeTlsStream, Mode},
        };

        pub async fn wrap_stream<S>(socket: S, mode: Mode) -> Result<MaybeTlsStream<S>>
        where
            S: AsyncReadRent + AsyncWriteRent,
        {
            match mode {
                Mode::Plain => Ok(MaybeTlsStream::Plain(socket)),
                Mode::Tls => Err(Error::Url(UrlError::TlsFeatureNotEnabled)),
            }
        }
    }
}

/// Wraps `socket` according to `mode`, picking the TLS implementation from the connector or,
/// without one, from the enabled features (`native-tls` first).
#[cfg_attr(
    not(any(feature = "native-tls", feature = "rustls-tls")),
    allow(unused_variables)
)]
pub async fn wrap_stream<S>(
    socket: S,
    domain: &str,
    mode: Mode,
    connector: Option<Connector>,
) -> Result<MaybeTlsStream<S>>
where
    S: AsyncReadRent + AsyncWriteRent,
{
    match connector {
        Some(Connector::Plain) => encryption::plain::wrap_stream(socket, mode).await,
        #[cfg(feature = "native-tls")]
        Some(Connector::NativeTls(conn)) => {
            encryption::native_tls::wrap_stream(socket, domain, mode, Some(conn)).await
        }
        #[cfg(feature = "rustls-tls")]
        Some(Connector::Rustls(conf)) => {
            encryption::rustls::wrap_stream(socket, domain, mode, Some(conf)).await
        }
        None => {
            #[cfg(feature = "native-tls")]
            {
                encryption::native_tls::wrap_stream(socket, domain, mode, None).await
            }
            #[cfg(all(feature = "rustls-tls", not(feature = "native-tls")))]
            {
                encryption::rustls::wrap_stream(socket, domain, mode, None).await
            }
            #[cfg(not(any(feature = "native-tls", feature = "rustls-tls")))]
            {
                encryption::plain::wrap_stream(socket, mode).await
            }
        }
    }
}

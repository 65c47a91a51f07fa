//! The duplex byte stream underneath a [`super::conn::Conn`] (SPEC_FULL.md §4.2): a plain TCP
//! socket, optionally upgraded to TLS, wrapped in buffered reader/writer halves so the codec can
//! read line-oriented RESP frames without re-reading the socket one byte at a time.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use socket2::{SockRef, TcpKeepalive};
use tokio::io::{AsyncRead, AsyncWrite, BufReader, BufWriter, ReadBuf};
use tokio::net::TcpStream;

#[cfg(feature = "tls")]
use tokio_native_tls::TlsStream;

use crate::error::{Error, Result};
use crate::Opts;

/// The raw transport, before buffering. TLS is a thin wrapper around the same `TcpStream`, so
/// both variants are driven by polling the inner socket directly.
enum RawStream {
    Tcp(TcpStream),
    #[cfg(feature = "tls")]
    Tls(Box<TlsStream<TcpStream>>),
    #[cfg(test)]
    Duplex(tokio::io::DuplexStream),
}

impl AsyncRead for RawStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Tcp(s) => Pin::new(s).poll_read(cx, buf),
            #[cfg(feature = "tls")]
            Self::Tls(s) => Pin::new(s).poll_read(cx, buf),
            #[cfg(test)]
            Self::Duplex(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for RawStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Self::Tcp(s) => Pin::new(s).poll_write(cx, buf),
            #[cfg(feature = "tls")]
            Self::Tls(s) => Pin::new(s).poll_write(cx, buf),
            #[cfg(test)]
            Self::Duplex(s) => Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Tcp(s) => Pin::new(s).poll_flush(cx),
            #[cfg(feature = "tls")]
            Self::Tls(s) => Pin::new(s).poll_flush(cx),
            #[cfg(test)]
            Self::Duplex(s) => Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Tcp(s) => Pin::new(s).poll_shutdown(cx),
            #[cfg(feature = "tls")]
            Self::Tls(s) => Pin::new(s).poll_shutdown(cx),
            #[cfg(test)]
            Self::Duplex(s) => Pin::new(s).poll_shutdown(cx),
        }
    }
}

/// A connected, buffered RESP transport. Read and write halves are buffered independently so a
/// pipelined write doesn't have to wait on the reader's internal buffer.
pub struct Stream {
    pub reader: BufReader<tokio::io::ReadHalf<RawStream>>,
    pub writer: BufWriter<tokio::io::WriteHalf<RawStream>>,
}

impl Stream {
    /// Resolves `opts.host:opts.port`, connects, applies nodelay/keepalive tuning, and upgrades
    /// to TLS if `opts.tls` is set.
    pub async fn connect(opts: &Opts) -> Result<Self> {
        let (host, port) = opts.addr();
        let tcp = TcpStream::connect((host.as_str(), port)).await?;
        apply_socket_opts(&tcp, opts)?;

        let raw = if opts.tls {
            upgrade_to_tls(tcp, &host).await?
        } else {
            RawStream::Tcp(tcp)
        };

        let (read_half, write_half) = tokio::io::split(raw);
        Ok(Self {
            reader: BufReader::new(read_half),
            writer: BufWriter::new(write_half),
        })
    }

    /// Wraps an in-process duplex half as a `Stream`, so connection-level tests can drive a
    /// mock server without touching the network (SPEC_FULL.md §10.4).
    #[cfg(test)]
    pub(crate) fn test_duplex(half: tokio::io::DuplexStream) -> Self {
        let (read_half, write_half) = tokio::io::split(RawStream::Duplex(half));
        Self {
            reader: BufReader::new(read_half),
            writer: BufWriter::new(write_half),
        }
    }
}

fn apply_socket_opts(tcp: &TcpStream, opts: &Opts) -> Result<()> {
    tcp.set_nodelay(opts.tcp_nodelay)?;

    if opts.keepalive {
        let mut keepalive = TcpKeepalive::new();
        if let Some(idle) = opts.keepalive_idle {
            keepalive = keepalive.with_time(idle);
        }
        if let Some(interval) = opts.keepalive_interval {
            keepalive = keepalive.with_interval(interval);
        }
        if let Some(count) = opts.keepalive_count {
            keepalive = keepalive.with_retries(count);
        }
        SockRef::from(tcp).set_tcp_keepalive(&keepalive)?;
    }

    Ok(())
}

#[cfg(feature = "tls")]
async fn upgrade_to_tls(tcp: TcpStream, host: &str) -> Result<RawStream> {
    let connector = native_tls::TlsConnector::new().map_err(Error::from_debug)?;
    let connector = tokio_native_tls::TlsConnector::from(connector);
    let tls = connector.connect(host, tcp).await.map_err(Error::from_debug)?;
    Ok(RawStream::Tls(Box::new(tls)))
}

#[cfg(not(feature = "tls"))]
async fn upgrade_to_tls(_tcp: TcpStream, _host: &str) -> Result<RawStream> {
    Err(Error::Config(
        "rediss:// requires the 'tls' feature".to_string(),
    ))
}

//! Per-connection setup shared by every engine: permit, tracking, TLS.
//!
//! The own-loop engines call [`ConnectionAcceptor::establish`] with the
//! permit taken by [`Listener::accept`](crate::net::Listener::accept).
//! `axum-server` drives the same acceptor through its [`Accept`] trait and
//! the permit is taken here instead.

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum_server::accept::Accept;
use axum_server::tls_rustls::RustlsAcceptor;
use futures_util::future::BoxFuture;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio::sync::Semaphore;

use crate::net::connection::{ConnectionGuard, ConnectionId, ConnectionTracker};
use crate::net::listener::ConnectionPermit;

/// Byte stream of an accepted connection, plain or TLS.
pub(crate) trait Io: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send + 'static> Io for T {}

/// An established connection. Releases its permit and tracking slot on drop.
pub(crate) struct Connection {
    io: Box<dyn Io>,
    guard: ConnectionGuard,
    _permit: ConnectionPermit,
}

impl Connection {
    pub(crate) fn id(&self) -> ConnectionId {
        self.guard.id()
    }
}

impl AsyncRead for Connection {
    fn poll_read(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.io).poll_read(cx, buf)
    }
}

impl AsyncWrite for Connection {
    fn poll_write(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.io).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.io).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.io).poll_shutdown(cx)
    }

    fn poll_write_vectored(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.io).poll_write_vectored(cx, bufs)
    }

    fn is_write_vectored(&self) -> bool {
        self.io.is_write_vectored()
    }
}

/// Turns accepted TCP streams into tracked, optionally encrypted connections.
#[derive(Clone)]
pub(crate) struct ConnectionAcceptor {
    tls: Option<RustlsAcceptor>,
    connections: ConnectionTracker,
    limit: Arc<Semaphore>,
}

impl ConnectionAcceptor {
    pub(crate) fn new(tls: Option<RustlsAcceptor>, connections: ConnectionTracker, max_connections: usize) -> Self {
        Self {
            tls,
            connections,
            limit: Arc::new(Semaphore::new(max_connections.max(1))),
        }
    }

    /// Track the connection and run the TLS handshake if configured.
    pub(crate) async fn establish(&self, tcp: TcpStream, permit: ConnectionPermit) -> io::Result<Connection> {
        let guard = self.connections.track();
        if let Err(e) = tcp.set_nodelay(true) {
            tracing::debug!(connection_id = %guard.id(), error = %e, "Failed to set TCP_NODELAY");
        }

        let io: Box<dyn Io> = match &self.tls {
            Some(acceptor) => {
                let (stream, ()) = acceptor.accept(tcp, ()).await?;
                Box::new(stream)
            }
            None => Box::new(tcp),
        };

        Ok(Connection {
            io,
            guard,
            _permit: permit,
        })
    }
}

impl<S: Send + 'static> Accept<TcpStream, S> for ConnectionAcceptor {
    type Stream = Connection;
    type Service = S;
    type Future = BoxFuture<'static, io::Result<(Connection, S)>>;

    fn accept(&self, stream: TcpStream, service: S) -> Self::Future {
        let acceptor = self.clone();
        Box::pin(async move {
            let permit = Arc::clone(&acceptor.limit)
                .acquire_owned()
                .await
                .map_err(|_| io::Error::other("connection limiter closed"))?;
            let connection = acceptor.establish(stream, ConnectionPermit::new(permit)).await?;
            Ok((connection, service))
        })
    }
}

//! The handle returned by `serve`.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;

use crate::lifecycle::manager::Lifecycle;
use crate::net::ConnectionTracker;
use crate::runtime::Runtime;
use crate::ws::registry::SocketRegistry;
use crate::ws::socket::WebSocket;

/// Transport of a bound listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Tcp,
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Tcp => f.write_str("tcp"),
        }
    }
}

/// Where a server actually listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerAddress {
    /// Hostname as requested (or the default wildcard).
    pub hostname: String,
    /// Bound port; the ephemeral port when 0 was requested.
    pub port: u16,
    pub transport: Transport,
    pub tls: bool,
    /// Bound socket address.
    pub local_addr: SocketAddr,
}

impl ServerAddress {
    /// A URL clients on this host can use. Wildcard binds map to loopback.
    pub fn url(&self) -> String {
        let scheme = if self.tls { "https" } else { "http" };
        let ip = match self.local_addr.ip() {
            IpAddr::V4(ip) if ip.is_unspecified() => IpAddr::V4(Ipv4Addr::LOCALHOST),
            IpAddr::V6(ip) if ip.is_unspecified() => IpAddr::V6(Ipv6Addr::LOCALHOST),
            ip => ip,
        };
        format!("{}://{}/", scheme, SocketAddr::new(ip, self.port))
    }
}

/// Control over a running server.
///
/// Cloning yields another handle to the same server.
#[derive(Clone)]
pub struct ServerHandle {
    inner: Arc<Inner>,
}

struct Inner {
    runtime: Runtime,
    address: ServerAddress,
    lifecycle: Arc<Lifecycle>,
    connections: ConnectionTracker,
    registry: SocketRegistry,
}

impl ServerHandle {
    pub(crate) fn new(
        runtime: Runtime,
        address: ServerAddress,
        lifecycle: Arc<Lifecycle>,
        connections: ConnectionTracker,
        registry: SocketRegistry,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                runtime,
                address,
                lifecycle,
                connections,
                registry,
            }),
        }
    }

    pub fn runtime(&self) -> Runtime {
        self.inner.runtime
    }

    pub fn address(&self) -> &ServerAddress {
        &self.inner.address
    }

    pub fn hostname(&self) -> &str {
        &self.inner.address.hostname
    }

    pub fn port(&self) -> u16 {
        self.inner.address.port
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.inner.address.local_addr
    }

    pub fn url(&self) -> String {
        self.inner.address.url()
    }

    /// Stop accepting new connections.
    ///
    /// In-flight exchanges and open sockets are left alone; close sockets
    /// from [`open_sockets`](Self::open_sockets) for a hard cutoff. Returns
    /// `false` when the server was already stopping.
    pub fn stop(&self) -> bool {
        self.inner.lifecycle.stop()
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.lifecycle.is_stopping()
    }

    /// Resolve once the listener has been released.
    pub async fn stopped(&self) {
        self.inner.lifecycle.closed().await
    }

    /// Let the listener keep the process alive (the default).
    pub fn keep_alive(&self) {
        self.inner.lifecycle.keep_alive();
    }

    /// Stop the listener alone from keeping the process alive. Open
    /// connections and sockets still do.
    pub fn unref(&self) {
        self.inner.lifecycle.unref();
    }

    pub fn active_connections(&self) -> u64 {
        self.inner.connections.active_count()
    }

    /// Snapshot of the sockets currently open on this server.
    pub fn open_sockets(&self) -> Vec<WebSocket> {
        self.inner.registry.sockets()
    }

    pub fn sockets(&self) -> &SocketRegistry {
        &self.inner.registry
    }
}

impl fmt::Debug for ServerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerHandle")
            .field("runtime", &self.inner.runtime)
            .field("address", &self.inner.address)
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address(local: &str, tls: bool) -> ServerAddress {
        let local_addr: SocketAddr = local.parse().unwrap();
        ServerAddress {
            hostname: local_addr.ip().to_string(),
            port: local_addr.port(),
            transport: Transport::Tcp,
            tls,
            local_addr,
        }
    }

    #[test]
    fn url_maps_wildcard_to_loopback() {
        assert_eq!(address("0.0.0.0:8080", false).url(), "http://127.0.0.1:8080/");
        assert_eq!(address("[::]:8443", true).url(), "https://[::1]:8443/");
        assert_eq!(address("10.0.0.5:80", false).url(), "http://10.0.0.5:80/");
    }
}

use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::stream::TrackerStream;

/// Port GT06 tracking servers listen on by convention.
pub const DEFAULT_PORT: u16 = 5023;

/// Connection establishment budget used when the caller has no preference.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// TCP transport.
///
/// Provides connect for the device side and bind/accept for the server
/// side (used by the simulator and tests).
pub struct TcpTransport {
    listener: TcpListener,
    addr: SocketAddr,
}

impl TcpTransport {
    /// Bind and listen on `addr` (e.g. `0.0.0.0:5023`, `127.0.0.1:0`).
    pub fn bind(addr: &str) -> Result<Self> {
        let listener = TcpListener::bind(addr).map_err(|e| TransportError::Bind {
            addr: addr.to_string(),
            source: e,
        })?;
        let local = listener.local_addr().map_err(|e| TransportError::Bind {
            addr: addr.to_string(),
            source: e,
        })?;

        info!(addr = %local, "listening for tracker connections");

        Ok(Self {
            listener,
            addr: local,
        })
    }

    /// Accept an incoming connection (blocking).
    pub fn accept(&self) -> Result<TrackerStream> {
        let (stream, peer) = self.listener.accept().map_err(TransportError::Accept)?;
        debug!(%peer, "accepted tracker connection");
        Ok(TrackerStream::from_tcp(stream))
    }

    /// Connect using [`DEFAULT_CONNECT_TIMEOUT`].
    pub fn connect(addr: &str) -> Result<TrackerStream> {
        Self::connect_timeout(addr, DEFAULT_CONNECT_TIMEOUT)
    }

    /// Resolve `addr` and connect to the first address that answers within
    /// `timeout`.
    ///
    /// A bare host name gets [`DEFAULT_PORT`] appended. Every resolved
    /// address gets its own `timeout` budget; the last failure is reported.
    pub fn connect_timeout(addr: &str, timeout: Duration) -> Result<TrackerStream> {
        let endpoint = with_default_port(addr);
        let candidates: Vec<SocketAddr> = endpoint
            .to_socket_addrs()
            .map_err(|e| TransportError::Resolve {
                addr: endpoint.clone(),
                source: e,
            })?
            .collect();

        let mut last_err = None;
        for candidate in candidates {
            match TcpStream::connect_timeout(&candidate, timeout) {
                Ok(stream) => {
                    debug!(addr = %candidate, "connected to tracking server");
                    return Ok(TrackerStream::from_tcp(stream));
                }
                Err(err) => {
                    debug!(addr = %candidate, error = %err, "connect attempt failed");
                    last_err = Some(err);
                }
            }
        }

        match last_err {
            Some(source) => Err(TransportError::Connect {
                addr: endpoint,
                source,
            }),
            None => Err(TransportError::NoAddress(endpoint)),
        }
    }

    /// The address this listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }
}

/// Append [`DEFAULT_PORT`] when `addr` names a host without a port.
pub fn with_default_port(addr: &str) -> String {
    if addr.parse::<SocketAddr>().is_ok() || addr.contains(':') {
        addr.to_string()
    } else {
        format!("{addr}:{DEFAULT_PORT}")
    }
}

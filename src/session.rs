//! This module contains the client session: one TCP connection per query, bounded by a timeout

use std::time::Duration;

use tokio::{net::TcpStream, time::timeout};
use tracing::{debug, info, instrument, trace, warn};

use crate::{Connection, FingerError, FingerResult, Request, Response};

/// How long a whole query (connect, send and receive) may take by default
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Client {
    timeout: Duration,
}

impl Default for Client {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl Client {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Send `query` to `host:port` exactly as given, and read the response
    ///
    /// The timeout covers the entire exchange; if it expires the connection is dropped, which
    /// closes it. A refused or unreachable host is a [`FingerError::ConnectionFailure`], never
    /// a timeout.
    #[instrument(skip(self))]
    pub async fn finger(&self, host: &str, query: &str, port: u16) -> FingerResult<Response> {
        // Encode before connecting so a bad query never touches the network
        let connection = Connection::new(host, port, query)?;

        let exchange = async move {
            trace!("Connecting");
            let stream = TcpStream::connect((host, port)).await.map_err(|source| {
                FingerError::ConnectionFailure {
                    host: host.to_string(),
                    port,
                    source,
                }
            })?;
            if let Ok(peer) = stream.peer_addr() {
                debug!("Connected to {peer}");
            }
            connection.run(stream).await
        };

        match timeout(self.timeout, exchange).await {
            Ok(Ok(response)) => {
                info!("Received {} bytes", response.body().len());
                Ok(response)
            }
            Ok(Err(e)) => {
                warn!("Query failed: {e}");
                Err(e)
            }
            Err(_) => {
                warn!("Query timed out after {:?}", self.timeout);
                Err(FingerError::Timeout(self.timeout))
            }
        }
    }

    /// Parse a user-entered query and run it
    ///
    /// `host` is used when the query doesn't name a host itself (e.g. `alice` rather than
    /// `alice@example.com`).
    #[instrument(skip(self))]
    pub async fn query(&self, query: &str, host: Option<&str>, port: u16) -> FingerResult<Response> {
        let request = Request::parse(query, host.filter(|h| !h.is_empty()), port);
        debug!("Parsed {} query for {:?}", request.query_type(), request.hostname());

        // A query like "alice@" names no host of its own, so fall back to the caller's
        let target = match request.target_host() {
            "" => host.unwrap_or_default(),
            first_hop => first_hop,
        };
        if target.is_empty() {
            return Err(FingerError::InvalidQuery("No host specified".to_string()));
        }

        self.finger(target, &request.wire_query(), request.port())
            .await
    }
}

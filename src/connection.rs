//! This module contains the per-connection receive state machine
//!
//! Finger has no length header and no terminator: the response is simply everything the server
//! sends before it closes the connection. The [`Connection`] therefore only ever completes in
//! two ways, the peer closing (cleanly or not) or the response outgrowing [`MAX_RESPONSE_SIZE`].

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace, warn};

use crate::{encode_query, FingerError, FingerResult, Response};

/// Upper bound on the response we're willing to buffer, to protect against hostile servers
pub const MAX_RESPONSE_SIZE: usize = 10 * 1024 * 1024;

const READ_CHUNK_SIZE: usize = 8 * 1024;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Idle,
    Connected,
    Receiving,
    Terminated,
}

/// What the transport should do after handing the engine some data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum Flow {
    Continue,
    Close,
}

#[derive(Debug)]
pub struct Connection {
    host: String,
    port: u16,
    query: String,
    request: Vec<u8>,
    state: ConnectionState,
    buffer: Vec<u8>,
    outcome: Option<FingerResult<Response>>,
}

impl Connection {
    /// Prepare a connection that will send `query`
    ///
    /// The query is encoded up front so that a non-ASCII query fails before any socket is opened.
    pub fn new(host: impl Into<String>, port: u16, query: impl Into<String>) -> FingerResult<Self> {
        let query = query.into();
        let request = encode_query(&query)?;

        Ok(Self {
            host: host.into(),
            port,
            query,
            request,
            state: ConnectionState::Idle,
            buffer: Vec::new(),
            outcome: None,
        })
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Everything received so far
    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    pub fn is_finished(&self) -> bool {
        self.outcome.is_some()
    }

    /// The transport is up: returns the request bytes, which must be written in one go
    ///
    /// The request is handed out only once; later calls return nothing.
    pub fn connection_made(&mut self) -> Vec<u8> {
        if self.state == ConnectionState::Idle {
            self.state = ConnectionState::Connected;
        }
        trace!("Sending {} byte request", self.request.len());
        std::mem::take(&mut self.request)
    }

    pub fn data_received(&mut self, chunk: &[u8]) -> Flow {
        if self.state == ConnectionState::Terminated {
            return Flow::Close;
        }
        self.state = ConnectionState::Receiving;

        self.buffer.extend_from_slice(chunk);
        trace!(
            "Received {} bytes ({} total)",
            chunk.len(),
            self.buffer.len()
        );

        if self.buffer.len() > MAX_RESPONSE_SIZE {
            warn!(
                "Response from {}:{} exceeded {} bytes, closing connection",
                self.host, self.port, MAX_RESPONSE_SIZE
            );
            self.finalize(Err(FingerError::ResponseTooLarge {
                limit: MAX_RESPONSE_SIZE,
            }));
            return Flow::Close;
        }

        Flow::Continue
    }

    /// The server has finished sending
    ///
    /// We have nothing more to say either, so this just waits for the transport to close.
    pub fn eof_received(&mut self) {
        debug!("Server closed its end after {} bytes", self.buffer.len());
    }

    /// The transport has closed, with `error` if it did so abnormally
    pub fn connection_lost(&mut self, error: Option<io::Error>) {
        let outcome = match error {
            None => Ok(Response::from_bytes(
                &self.buffer,
                self.host.as_str(),
                self.port,
                self.query.as_str(),
            )),
            Some(source) => Err(FingerError::ConnectionFailure {
                host: self.host.clone(),
                port: self.port,
                source,
            }),
        };
        self.finalize(outcome);
    }

    /// Record the final outcome, unless one has already been recorded
    fn finalize(&mut self, outcome: FingerResult<Response>) {
        self.state = ConnectionState::Terminated;
        if self.outcome.is_some() {
            trace!("Connection already finalized, ignoring {outcome:?}");
            return;
        }
        debug!("Connection finalized (success: {})", outcome.is_ok());
        self.outcome = Some(outcome);
    }

    /// Take the recorded outcome; `None` if the connection hasn't terminated yet
    pub fn into_outcome(self) -> Option<FingerResult<Response>> {
        self.outcome
    }

    /// Drive this connection over an already-open stream until the server closes it
    ///
    /// The stream is dropped, and so closed, before this returns.
    pub async fn run<S>(mut self, mut stream: S) -> FingerResult<Response>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let request = self.connection_made();
        if let Err(e) = stream.write_all(&request).await {
            self.connection_lost(Some(e));
        } else {
            let mut chunk = vec![0_u8; READ_CHUNK_SIZE];
            loop {
                match stream.read(&mut chunk).await {
                    Ok(0) => {
                        self.eof_received();
                        self.connection_lost(None);
                        break;
                    }
                    Ok(len) => {
                        if self.data_received(&chunk[..len]) == Flow::Close {
                            break;
                        }
                    }
                    Err(e) => {
                        self.connection_lost(Some(e));
                        break;
                    }
                }
            }
        }
        drop(stream);

        let (host, port) = (self.host.clone(), self.port);
        self.into_outcome().unwrap_or_else(|| {
            Err(FingerError::ConnectionFailure {
                host,
                port,
                source: io::Error::new(io::ErrorKind::Other, "connection ended without a result"),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection(query: &str) -> Connection {
        Connection::new("example.com", 79, query).unwrap()
    }

    #[test]
    fn sends_query_on_connect() {
        assert_eq!(connection("alice").connection_made(), b"alice\r\n");
        assert_eq!(connection("").connection_made(), b"\r\n");
        assert_eq!(connection("/W alice").connection_made(), b"/W alice\r\n");
    }

    #[test]
    fn request_is_sent_once() {
        let mut conn = connection("alice");
        assert_eq!(conn.state(), ConnectionState::Idle);
        assert_eq!(conn.connection_made(), b"alice\r\n");
        assert_eq!(conn.state(), ConnectionState::Connected);
        assert!(conn.connection_made().is_empty());
    }

    #[test]
    fn non_ascii_query_fails_before_connecting() {
        assert!(matches!(
            Connection::new("example.com", 79, "ålice"),
            Err(FingerError::EncodeFailure { .. })
        ));
    }

    #[test]
    fn accumulates_chunks() {
        let mut conn = connection("alice");
        let _ = conn.connection_made();

        assert_eq!(conn.data_received(b"Hello "), Flow::Continue);
        assert_eq!(conn.buffer(), b"Hello ");
        assert_eq!(conn.data_received(b"World"), Flow::Continue);
        assert_eq!(conn.buffer(), b"Hello World");
        assert_eq!(conn.state(), ConnectionState::Receiving);
        assert!(!conn.is_finished());
    }

    #[test]
    fn byte_at_a_time() {
        let mut conn = connection("alice");
        let _ = conn.connection_made();
        for byte in b"Hello World\r\n" {
            assert_eq!(conn.data_received(&[*byte]), Flow::Continue);
        }
        conn.connection_lost(None);

        let response = conn.into_outcome().unwrap().unwrap();
        assert_eq!(response.body(), "Hello World\r\n");
    }

    #[test]
    fn exactly_at_limit_is_accepted() {
        let mut conn = connection("alice");
        let _ = conn.connection_made();

        assert_eq!(conn.data_received(&vec![b'x'; MAX_RESPONSE_SIZE]), Flow::Continue);
        assert!(!conn.is_finished());

        conn.connection_lost(None);
        let response = conn.into_outcome().unwrap().unwrap();
        assert_eq!(response.body().len(), MAX_RESPONSE_SIZE);
    }

    #[test]
    fn over_limit_closes_and_fails() {
        let mut conn = connection("alice");
        let _ = conn.connection_made();

        assert_eq!(conn.data_received(&vec![b'x'; MAX_RESPONSE_SIZE]), Flow::Continue);
        assert_eq!(conn.data_received(b"x"), Flow::Close);
        assert!(conn.is_finished());
        assert_eq!(conn.state(), ConnectionState::Terminated);

        // Anything arriving afterwards is ignored
        let len = conn.buffer().len();
        assert_eq!(conn.data_received(b"more"), Flow::Close);
        assert_eq!(conn.buffer().len(), len);
    }

    #[test]
    fn size_failure_survives_clean_close() {
        let mut conn = connection("alice");
        let _ = conn.connection_made();
        assert_eq!(conn.data_received(&vec![b'x'; MAX_RESPONSE_SIZE + 1]), Flow::Close);

        conn.connection_lost(None);
        conn.connection_lost(Some(io::ErrorKind::ConnectionReset.into()));

        assert!(matches!(
            conn.into_outcome(),
            Some(Err(FingerError::ResponseTooLarge {
                limit: MAX_RESPONSE_SIZE
            }))
        ));
    }

    #[test]
    fn clean_close_builds_response() {
        let mut conn = connection("alice");
        let _ = conn.connection_made();
        assert_eq!(conn.data_received(b"Login: alice\r\n"), Flow::Continue);
        assert_eq!(conn.data_received(b"Name: Alice Smith\r\n"), Flow::Continue);
        conn.eof_received();
        conn.connection_lost(None);

        let response = conn.into_outcome().unwrap().unwrap();
        assert_eq!(response.body(), "Login: alice\r\nName: Alice Smith\r\n");
        assert_eq!(response.host(), "example.com");
        assert_eq!(response.port(), 79);
        assert_eq!(response.query(), "alice");
        assert_eq!(response.lines().len(), 2);
    }

    #[test]
    fn empty_response() {
        let mut conn = connection("alice");
        conn.connection_lost(None);

        let response = conn.into_outcome().unwrap().unwrap();
        assert_eq!(response.body(), "");
        assert!(response.lines().is_empty());
    }

    #[test]
    fn invalid_bytes_never_fail() {
        let mut conn = connection("alice");
        assert_eq!(conn.data_received(b"Hello \xff\xfe World"), Flow::Continue);
        conn.connection_lost(None);

        let response = conn.into_outcome().unwrap().unwrap();
        assert!(response.body().contains('\u{fffd}'));
        assert!(response.body().starts_with("Hello"));
        assert!(response.body().ends_with("World"));
    }

    #[test]
    fn reset_is_a_connection_failure() {
        let mut conn = connection("alice");
        conn.connection_lost(Some(io::Error::new(
            io::ErrorKind::ConnectionReset,
            "Connection reset by peer",
        )));

        match conn.into_outcome() {
            Some(Err(FingerError::ConnectionFailure { source, .. })) => {
                assert_eq!(source.kind(), io::ErrorKind::ConnectionReset);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn unfinished_connection_has_no_outcome() {
        let mut conn = connection("alice");
        let _ = conn.connection_made();
        assert_eq!(conn.data_received(b"partial"), Flow::Continue);
        assert!(conn.into_outcome().is_none());
    }

    #[tokio::test]
    async fn runs_over_a_stream() {
        let (client, mut server) = tokio::io::duplex(64);

        let server_task = tokio::spawn(async move {
            let mut request = [0_u8; 7];
            server.read_exact(&mut request).await.unwrap();
            server.write_all(b"Login: alice\r\n").await.unwrap();
            request
        });

        let response = connection("alice").run(client).await.unwrap();
        assert_eq!(&server_task.await.unwrap(), b"alice\r\n");
        assert_eq!(response.lines(), vec!["Login: alice"]);
    }

    #[tokio::test]
    async fn oversized_stream_is_cut_off() {
        let (client, mut server) = tokio::io::duplex(READ_CHUNK_SIZE);

        tokio::spawn(async move {
            let mut request = [0_u8; 7];
            server.read_exact(&mut request).await.unwrap();
            // The client hangs up partway, so the write is expected to fail eventually
            let _ = server.write_all(&vec![b'x'; MAX_RESPONSE_SIZE + 1]).await;
        });

        let err = connection("alice").run(client).await.unwrap_err();
        assert!(matches!(err, FingerError::ResponseTooLarge { .. }));
    }
}

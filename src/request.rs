//! This module turns user-entered queries into Finger requests and encodes them for the wire

use std::fmt;

use crate::{FingerError, FingerResult};

/// Well-known Finger port (RFC 1288)
pub const DEFAULT_PORT: u16 = 79;
/// Every request line ends with this
pub const CRLF: &[u8] = b"\r\n";
/// Query prefix asking the server for its long ("whois") output format
pub const VERBOSE_PREFIX: &str = "/W";

const HOST_SEPARATOR: char = '@';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryType {
    /// Empty query: list everyone logged in
    ListUsers,
    /// `user`, answered by the host we connect to
    UserLocal,
    /// `user@host[@host...]`
    UserRemote,
    /// `@host[@host...]`: list users on a remote host
    HostOnly,
}

impl QueryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryType::ListUsers => "list",
            QueryType::UserLocal => "user",
            QueryType::UserRemote => "remote",
            QueryType::HostOnly => "host",
        }
    }
}

impl fmt::Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed Finger query
///
/// Fields are private so a request can't be changed once parsed; everything else is derived
/// from them on demand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    query_type: QueryType,
    username: String,
    hostname: String,
    verbose: bool,
    port: u16,
}

impl Request {
    /// Parse a query as a user would type it
    ///
    /// `default_host` fills in the host for queries that don't name one; if it's `None` the
    /// hostname is left empty and it's up to the caller to reject the request.
    pub fn parse(query: &str, default_host: Option<&str>, port: u16) -> Self {
        let (verbose, core) = strip_verbose(query);
        let default_host = default_host.unwrap_or_default();

        let (query_type, username, hostname) = if core.is_empty() {
            (QueryType::ListUsers, "", default_host)
        } else if let Some(hosts) = core.strip_prefix(HOST_SEPARATOR) {
            (QueryType::HostOnly, "", hosts)
        } else if let Some((user, hosts)) = core.split_once(HOST_SEPARATOR) {
            // Only the first '@' matters here; later hops are forwarded untouched
            (QueryType::UserRemote, user, hosts)
        } else {
            (QueryType::UserLocal, core, default_host)
        };

        Self {
            query_type,
            username: username.to_string(),
            hostname: hostname.to_string(),
            verbose,
            port,
        }
    }

    pub fn query_type(&self) -> QueryType {
        self.query_type
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// The full host chain, e.g. `host1@host2`
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn verbose(&self) -> bool {
        self.verbose
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// The host to actually connect to: the first hop of the chain
    pub fn target_host(&self) -> &str {
        self.hostname
            .split_once(HOST_SEPARATOR)
            .map_or(self.hostname.as_str(), |(first, _)| first)
    }

    fn is_chained(&self) -> bool {
        self.hostname.contains(HOST_SEPARATOR)
    }

    /// The query line to send to `target_host`, without the trailing CRLF
    pub fn wire_query(&self) -> String {
        let base = match self.query_type {
            QueryType::ListUsers => String::new(),
            QueryType::UserLocal => self.username.clone(),
            QueryType::HostOnly => format!("{HOST_SEPARATOR}{}", self.hostname),
            // The first hop needs the whole chain to know where to forward to; a single hop is
            // the final authority and only needs the bare username
            QueryType::UserRemote if self.is_chained() => {
                format!("{}{HOST_SEPARATOR}{}", self.username, self.hostname)
            }
            QueryType::UserRemote => self.username.clone(),
        };

        match (self.verbose, base.is_empty()) {
            (false, _) => base,
            (true, true) => VERBOSE_PREFIX.to_string(),
            (true, false) => format!("{VERBOSE_PREFIX} {base}"),
        }
    }

    /// Bytes to write to the server
    pub fn to_wire(&self) -> FingerResult<Vec<u8>> {
        encode_query(&self.wire_query())
    }
}

/// Split off a leading `/W` token, which must be followed by at least one space or end the query
fn strip_verbose(query: &str) -> (bool, &str) {
    match query.strip_prefix(VERBOSE_PREFIX) {
        Some("") => (true, ""),
        Some(rest) if rest.starts_with(' ') => (true, rest.trim_start_matches(' ')),
        _ => (false, query),
    }
}

/// Encode a wire query as ASCII and terminate it with CRLF
pub fn encode_query(query: &str) -> FingerResult<Vec<u8>> {
    if let Some((position, character)) = query.char_indices().find(|(_, c)| !c.is_ascii()) {
        return Err(FingerError::EncodeFailure {
            query: query.to_string(),
            character,
            position,
        });
    }

    let mut wire = Vec::with_capacity(query.len() + CRLF.len());
    wire.extend_from_slice(query.as_bytes());
    wire.extend_from_slice(CRLF);
    Ok(wire)
}

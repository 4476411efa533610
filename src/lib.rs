//! Core library for finger-rs, a Finger protocol (RFC 1288) client

mod args;
#[cfg(feature = "cli")]
pub use args::*;
mod connection;
pub use connection::*;
mod error;
pub use error::*;
mod request;
pub use request::*;
mod response;
pub use response::*;
mod session;
pub use session::*;

/// Run a single query with the default timeout
///
/// Shorthand for `Client::new().query(query, host, port)`.
pub async fn finger(query: &str, host: Option<&str>, port: u16) -> FingerResult<Response> {
    Client::new().query(query, host, port).await
}

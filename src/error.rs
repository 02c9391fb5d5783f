use std::io;
use std::net::SocketAddr;

use thiserror::Error;

/// Everything that can go wrong between the wire and a parsed request.
///
/// Startup failures (`SocketCreate` through `ListenFailed`) are fatal;
/// everything else belongs to a single connection and ends it.
#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to create socket: {0}")]
    SocketCreate(#[source] io::Error),

    #[error("failed to configure socket: {0}")]
    SocketConfigure(#[source] io::Error),

    #[error("address already in use: {0}")]
    AddressInUse(SocketAddr),

    #[error("permission denied binding {0}")]
    PermissionDenied(SocketAddr),

    #[error("failed to listen on socket: {0}")]
    ListenFailed(#[source] io::Error),

    #[error("invalid listen address {0:?}")]
    BadAddress(String),

    #[error("request size exceeded limit")]
    RequestTooLarge,

    #[error("request header size exceeded limit")]
    HeaderTooLarge,

    #[error("invalid request line")]
    MalformedRequestLine,

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    /// True when the kernel-side timeout fired rather than the peer
    /// misbehaving. The keep-alive loop treats both the same way, but
    /// callers log them differently.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Io(e) if e.kind() == io::ErrorKind::TimedOut)
    }
}

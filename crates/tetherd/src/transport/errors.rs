//! Error types for transport selection, binding and connecting.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

use crate::asyncreq::{ExecutorError, OsError};

/// Errors surfaced while creating servers or client connections.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("unsupported transport `{name}`")]
    Unsupported { name: String },
    #[error("invalid port `{port}`")]
    InvalidPort { port: String },
    #[error("failed to resolve TCP address {host}:{port}: {source}")]
    Resolve {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },
    #[error("no TCP addresses resolved for {host}:{port}")]
    ResolveEmpty { host: String, port: u16 },
    #[error("failed to bind TCP listener at {addr}: {source}")]
    BindTcp {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("failed to read bound address: {source}")]
    LocalAddr {
        #[source]
        source: io::Error,
    },
    #[error("unix transport requires a socket path in the Host property")]
    MissingPath,
    #[error("failed to bind unix listener at {path}: {source}")]
    BindUnix {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("existing unix socket {path} is already in use")]
    UnixInUse { path: String },
    #[error("unix socket path {path} is not a socket")]
    UnixNotSocket { path: String },
    #[error("failed to read metadata for unix socket {path}: {source}")]
    UnixMetadata {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to probe existing unix socket {path}: {source}")]
    UnixProbe {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to remove stale unix socket {path}: {source}")]
    UnixCleanup {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to create socket: {source}")]
    Socket {
        #[source]
        source: io::Error,
    },
    #[error("failed to connect to {peer}: {source}")]
    Connect {
        peer: String,
        #[source]
        source: OsError,
    },
    #[error(transparent)]
    Executor(#[from] ExecutorError),
}

//! Domain Errors

use std::io;

#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("no CRLFCRLF boundary between head and body")]
    MissingHeadBoundary,
    #[error("empty request line")]
    EmptyRequestLine,
    #[error("request line must have exactly three tokens, found {0}")]
    MalformedRequestLine(usize),
    #[error("method or version is not valid text")]
    NonTextToken,
    #[error("header line without `: ` separator")]
    MalformedHeader,
    #[error("request head exceeds {0} bytes")]
    HeadTooLarge(usize),
    #[error("request body of {0} bytes exceeds the limit")]
    BodyTooLarge(usize),
    #[error("invalid Content-Length value")]
    InvalidContentLength,
    #[error("connection closed after {received} of {expected} body bytes")]
    IncompleteBody { expected: usize, received: usize },
    #[error("timed out waiting for the request")]
    ReadTimeout,
    #[error("connection closed before any byte was received")]
    ConnectionClosed,
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl RequestError {
    /// Everything that is not a transport failure means the client sent garbage.
    pub fn is_malformed(&self) -> bool {
        !matches!(self, Self::Io(_) | Self::ConnectionClosed)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("file name `{0}` is not a single path component")]
    InvalidName(String),
    #[error("file not found")]
    NotFound,
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl StorageError {
    pub(crate) fn from_stat(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => Self::NotFound,
            _ => Self::Io(err),
        }
    }
}

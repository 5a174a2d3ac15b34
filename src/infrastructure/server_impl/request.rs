use std::str::FromStr;

use fnv::FnvHashMap;

use crate::infrastructure::server_impl::server::Method;

/// A parsed request, borrowing the connection's read buffer.
///
/// Only the method and version have to be text. The resource and headers stay raw bytes, header
/// names are kept exactly as sent and on duplicates the last one wins.
#[derive(Debug, Clone, PartialEq)]
pub struct Request<'a> {
    pub method: &'a str,
    pub resource: &'a [u8],
    pub version: &'a str,
    pub headers: FnvHashMap<&'a [u8], &'a [u8]>,
    pub body: &'a [u8],
}

impl<'a> Request<'a> {
    /// `None` for any verb the server does not know about.
    pub fn known_method(&self) -> Option<Method> {
        Method::from_str(self.method).ok()
    }

    /// Case-sensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&'a [u8]> {
        self.headers.get(name.as_bytes()).copied()
    }
}

use bytes::{BufMut, Bytes, BytesMut};
use compact_str::CompactString;
use fnv::FnvHashMap;
use strum::{EnumMessage, EnumString, IntoStaticStr};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::infrastructure::server_impl::server::Header;

#[allow(clippy::upper_case_acronyms, non_camel_case_types)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, IntoStaticStr, EnumString, EnumMessage)]
pub enum StatusCode {
    #[strum(serialize = "200", message = "OK")]
    Ok,
    #[strum(serialize = "201", message = "Created")]
    Created,
    #[strum(serialize = "404", message = "Not Found")]
    NotFound,
    #[strum(serialize = "405", message = "Method Not Allowed")]
    MethodNotAllowed,
    #[strum(serialize = "500", message = "Internal Server Error")]
    InternalServerError,
}

impl StatusCode {
    pub fn code(self) -> &'static str {
        self.into()
    }

    pub fn reason(self) -> &'static str {
        self.get_message().unwrap_or_default()
    }
}

/// Response under construction. Handlers fill it in, the encoder finalizes `Content-Length`
/// and [Response::write_to] consumes it.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub version: CompactString,
    pub status_code: StatusCode,
    pub headers: FnvHashMap<Header, CompactString>,
    pub body: Bytes,
}

impl Response {
    pub fn from_status_code(version: &str, value: StatusCode) -> Self {
        Self {
            version: version.into(),
            status_code: value,
            headers: Default::default(),
            body: Bytes::new(),
        }
    }

    pub fn set_status(&mut self, status_code: StatusCode) -> &mut Self {
        self.status_code = status_code;
        self
    }

    pub fn set_header(&mut self, header: Header, value: impl Into<CompactString>) -> &mut Self {
        self.headers.insert(header, value.into());
        self
    }

    pub fn set_body(&mut self, body: impl Into<Bytes>) -> &mut Self {
        self.body = body.into();
        self
    }

    pub fn header(&self, header: Header) -> Option<&str> {
        self.headers.get(&header).map(CompactString::as_str)
    }

    /// Status line, headers and the blank line.
    pub fn head(&self) -> Bytes {
        let mut buf = String::with_capacity(64 + self.headers.len() * 32);

        buf.push_str(&self.version);
        buf.push(' ');
        buf.push_str(self.status_code.code());
        buf.push(' ');
        buf.push_str(self.status_code.reason());
        buf.push_str("\r\n");
        for (header, value) in &self.headers {
            buf.push_str(header.into());
            buf.push_str(": ");
            buf.push_str(value);
            buf.push_str("\r\n");
        }
        buf.push_str("\r\n");

        buf.into()
    }

    /// Full wire representation.
    pub fn into_http(self) -> Bytes {
        let head = self.head();
        let mut buf = BytesMut::with_capacity(head.len() + self.body.len());
        buf.put(head);
        buf.put(self.body);
        buf.freeze()
    }

    /// Writes the head, then the body. The first failing write aborts the exchange.
    pub async fn write_to<W>(self, writer: &mut W) -> std::io::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        writer.write_all(&self.head()).await?;
        writer.write_all(&self.body).await?;
        writer.flush().await
    }
}

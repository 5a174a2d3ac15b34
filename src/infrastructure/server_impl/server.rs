use std::str::FromStr;

use bytes::BytesMut;
use eyre::WrapErr;
use fnv::FnvHashMap;
use memchr::memmem;
use strum::{EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tracing::{debug, warn};

use crate::api::{echo_route, file_get_route, file_post_route, user_agent_route};
use crate::application::file_store::FileStore;
use crate::application::{ReadLimits, ServerData};
use crate::domain::errors::RequestError;
use crate::infrastructure::server_impl::encoder::{accepts_gzip, maybe_encode};
use crate::infrastructure::server_impl::request::Request;
use crate::infrastructure::server_impl::response::{Response, StatusCode};
use crate::AnyResult;

const HEAD_BOUNDARY: &[u8] = b"\r\n\r\n";
const CRLF: &[u8] = b"\r\n";
const HEADER_SEPARATOR: &[u8] = b": ";
const READ_CHUNK: usize = 2048;

/// Response headers this server emits.
#[allow(clippy::upper_case_acronyms, non_camel_case_types)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, IntoStaticStr, EnumIter)]
#[non_exhaustive]
pub enum Header {
    #[strum(serialize = "Connection")]
    CONNECTION,
    #[strum(serialize = "Content-Encoding")]
    CONTENT_ENCODING,
    #[strum(serialize = "Content-Length")]
    CONTENT_LENGTH,
    #[strum(serialize = "Content-Type")]
    CONTENT_TYPE,
}

impl FromStr for Header {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::iter().find(|c| unicase::eq(c.into(), s)).ok_or(())
    }
}

#[allow(clippy::upper_case_acronyms, non_camel_case_types)]
#[derive(Debug, Copy, Clone, PartialEq, EnumString, IntoStaticStr)]
pub enum Method {
    GET,
    POST,
}

/// What a request resolves to. Borrowed parts point into the request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Action<'a> {
    Root,
    Echo(&'a [u8]),
    UserAgent(&'a [u8]),
    FileGet(&'a [u8]),
    FilePost(&'a [u8], &'a [u8]),
    NotFound,
    MethodNotAllowed,
}

/// Pure mapping from method and path to an [Action].
pub fn route<'a>(request: &Request<'a>) -> Action<'a> {
    let path = request.resource;

    match request.known_method() {
        Some(Method::GET) => {
            if path == b"/" {
                Action::Root
            } else if let Some(echo) = path.strip_prefix(b"/echo/") {
                Action::Echo(echo)
            } else if path == b"/user-agent" {
                Action::UserAgent(request.header("User-Agent").unwrap_or_default())
            } else if let Some(name) = path.strip_prefix(b"/files/") {
                Action::FileGet(name)
            } else {
                Action::NotFound
            }
        }
        Some(Method::POST) => match path.strip_prefix(b"/files/") {
            Some(name) => Action::FilePost(name, request.body),
            None => Action::NotFound,
        },
        None => Action::MethodNotAllowed,
    }
}

/// Runs the handler for the routed action. The body is not encoded yet.
pub async fn match_routes<S: FileStore>(
    server_data: &ServerData<S>,
    request: &Request<'_>,
) -> Response {
    let mut response = Response::from_status_code(request.version, StatusCode::Ok);
    let store = server_data.store.as_ref();

    match route(request) {
        Action::Root => response,
        Action::Echo(echo) => echo_route(response, echo),
        Action::UserAgent(agent) => user_agent_route(response, agent),
        Action::FileGet(name) => file_get_route(response, store, name).await,
        Action::FilePost(name, body) => file_post_route(response, store, name, body).await,
        Action::NotFound => {
            response.set_status(StatusCode::NotFound);
            response
        }
        Action::MethodNotAllowed => {
            response.set_status(StatusCode::MethodNotAllowed);
            response
        }
    }
}

fn split_once<'a>(haystack: &'a [u8], needle: &[u8]) -> Option<(&'a [u8], &'a [u8])> {
    memmem::find(haystack, needle).map(|idx| (&haystack[..idx], &haystack[idx + needle.len()..]))
}

/// Splits on CRLF only, a bare LF stays inside its line.
fn lines(head: &[u8]) -> impl Iterator<Item = &[u8]> {
    let mut rest = Some(head);
    std::iter::from_fn(move || {
        let current = rest?;
        match split_once(current, CRLF) {
            Some((line, tail)) => {
                rest = Some(tail);
                Some(line)
            }
            None => {
                rest = None;
                Some(current)
            }
        }
    })
}

/// Strips trailing NULs, left over as padding when a client's bytes land in a zeroed buffer.
/// Framed bodies have no padding, so a body that really ends in NUL bytes loses them too.
fn parse_body(body: &[u8]) -> &[u8] {
    let end = body.iter().rposition(|&b| b != b'\0').map_or(0, |idx| idx + 1);
    &body[..end]
}

fn to_token(str_like: &[u8]) -> Result<&str, RequestError> {
    std::str::from_utf8(str_like).map_err(|_| RequestError::NonTextToken)
}

/// The resource is any byte run without a space, method and version must be text.
fn parse_request_line(line: &[u8]) -> Result<(&str, &[u8], &str), RequestError> {
    if line.is_empty() {
        return Err(RequestError::EmptyRequestLine);
    }

    let parts = line.split(|&b| b == b' ').collect::<Vec<_>>();
    match parts[..] {
        [method, resource, version]
            if !method.is_empty() && !resource.is_empty() && !version.is_empty() =>
        {
            Ok((to_token(method)?, resource, to_token(version)?))
        }
        _ => Err(RequestError::MalformedRequestLine(parts.len())),
    }
}

fn parse_header(line: &[u8]) -> Result<(&[u8], &[u8]), RequestError> {
    split_once(line, HEADER_SEPARATOR).ok_or(RequestError::MalformedHeader)
}

/// Returns a [Request] borrowing `request`.
///
/// Everything after the first CRLFCRLF is body, even if it holds more CRLFCRLFs.
pub fn parse_http(request: &[u8]) -> Result<Request<'_>, RequestError> {
    let (head, body) =
        split_once(request, HEAD_BOUNDARY).ok_or(RequestError::MissingHeadBoundary)?;

    let mut head_lines = lines(head);
    let (method, resource, version) =
        parse_request_line(head_lines.next().unwrap_or_default())?;

    let mut headers = FnvHashMap::default();
    for line in head_lines {
        let (name, value) = parse_header(line)?;
        headers.insert(name, value);
    }

    Ok(Request {
        method,
        resource,
        version,
        headers,
        body: parse_body(body),
    })
}

/// `Content-Length` of a complete head, name matched case-insensitively.
fn content_length(head: &[u8]) -> Result<Option<usize>, RequestError> {
    let mut length = None;
    for line in lines(head).skip(1) {
        let Some(colon) = memchr::memchr(b':', line) else {
            continue;
        };
        let Ok(name) = std::str::from_utf8(&line[..colon]) else {
            continue;
        };
        if Header::from_str(name) != Ok(Header::CONTENT_LENGTH) {
            continue;
        }

        let value = std::str::from_utf8(&line[colon + 1..])
            .ok()
            .and_then(|v| v.trim().parse::<usize>().ok())
            .ok_or(RequestError::InvalidContentLength)?;
        length = Some(value);
    }
    Ok(length)
}

/// Reads one request into `buf` and returns how many leading bytes of it form the request.
///
/// Stops at the head boundary when there is no `Content-Length`, otherwise once the announced
/// body arrived. Not time bounded, see [read_request_with_timeout].
pub async fn read_request<R>(
    reader: &mut R,
    buf: &mut BytesMut,
    limits: &ReadLimits,
) -> Result<usize, RequestError>
where
    R: AsyncRead + Unpin,
{
    let mut searched = 0;
    let head_end = loop {
        if let Some(idx) = memmem::find(&buf[searched..], HEAD_BOUNDARY) {
            break searched + idx + HEAD_BOUNDARY.len();
        }
        // the boundary may straddle two reads
        searched = buf.len().saturating_sub(HEAD_BOUNDARY.len() - 1);

        if buf.len() >= limits.max_head_bytes {
            return Err(RequestError::HeadTooLarge(limits.max_head_bytes));
        }

        buf.reserve(READ_CHUNK);
        if reader.read_buf(buf).await? == 0 {
            return Err(match buf.is_empty() {
                true => RequestError::ConnectionClosed,
                false => RequestError::MissingHeadBoundary,
            });
        }
    };

    let Some(length) = content_length(&buf[..head_end])? else {
        return Ok(buf.len());
    };
    if length > limits.max_body_bytes {
        return Err(RequestError::BodyTooLarge(length));
    }

    let frame = head_end + length;
    while buf.len() < frame {
        buf.reserve(frame - buf.len());
        if reader.read_buf(buf).await? == 0 {
            return Err(RequestError::IncompleteBody {
                expected: length,
                received: buf.len() - head_end,
            });
        }
    }

    Ok(frame)
}

pub async fn read_request_with_timeout<R>(
    reader: &mut R,
    buf: &mut BytesMut,
    limits: &ReadLimits,
) -> Result<usize, RequestError>
where
    R: AsyncRead + Unpin,
{
    tokio::time::timeout(limits.timeout, read_request(reader, buf, limits))
        .await
        .unwrap_or(Err(RequestError::ReadTimeout))
}

/// Serves exactly one request on `stream`. Malformed requests get no response at all.
///
/// Errors are transport failures only; the caller closes the connection either way.
pub async fn handle_connection<S, T>(server_data: &ServerData<S>, stream: &mut T) -> AnyResult<()>
where
    S: FileStore,
    T: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf = BytesMut::with_capacity(READ_CHUNK);

    let frame = match read_request_with_timeout(stream, &mut buf, &server_data.limits).await {
        Ok(frame) => frame,
        Err(RequestError::ConnectionClosed) => {
            debug!("connection closed without a request");
            return Ok(());
        }
        Err(err) if err.is_malformed() => {
            warn!(%err, "dropping malformed request");
            return Ok(());
        }
        Err(err) => return Err(err).wrap_err("failed to read request"),
    };

    let request = match parse_http(&buf[..frame]) {
        Ok(request) => request,
        Err(err) => {
            warn!(%err, "dropping malformed request");
            return Ok(());
        }
    };

    debug!(
        method = request.method,
        resource = %String::from_utf8_lossy(request.resource),
        version = request.version,
        headers = ?request.headers,
        body_len = request.body.len(),
        "parsed request"
    );

    let negotiated = accepts_gzip(&request);
    let mut response = match_routes(server_data, &request).await;
    response.set_header(Header::CONNECTION, "close");

    let response = maybe_encode(response, negotiated).wrap_err("failed to encode response")?;
    debug!(status = response.status_code.code(), body_len = response.body.len(), "responding");

    response
        .write_to(stream)
        .await
        .wrap_err("failed to write response")
}

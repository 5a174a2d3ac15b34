use std::io::{self, Write};

use flate2::write::GzEncoder;
use flate2::Compression;
use memchr::memmem;

use crate::infrastructure::server_impl::request::Request;
use crate::infrastructure::server_impl::response::Response;
use crate::infrastructure::server_impl::server::Header;

/// Plain substring check on the raw `Accept-Encoding` value, no q-values.
pub fn accepts_gzip(request: &Request<'_>) -> bool {
    request
        .header("Accept-Encoding")
        .is_some_and(|value| memmem::find(value, b"gzip").is_some())
}

pub fn gzip(body: &[u8]) -> io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(body.len() / 2 + 32), Compression::default());
    encoder.write_all(body)?;
    encoder.finish()
}

/// Compresses the body when `negotiated` and sets `Content-Length` to the length of whatever
/// body is going to be written. Must run exactly once, after the handler is done.
pub fn maybe_encode(mut response: Response, negotiated: bool) -> io::Result<Response> {
    if negotiated {
        let compressed = gzip(&response.body)?;
        response
            .set_header(Header::CONTENT_ENCODING, "gzip")
            .set_body(compressed);
    }

    let length = response.body.len();
    response.set_header(Header::CONTENT_LENGTH, compact_str::format_compact!("{length}"));
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::server_impl::response::StatusCode;
    use crate::infrastructure::server_impl::server::parse_http;
    use flate2::read::GzDecoder;
    use std::io::Read;

    fn gunzip(data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        GzDecoder::new(data).read_to_end(&mut out).unwrap();
        out
    }

    fn response_with(body: &'static [u8]) -> Response {
        let mut response = Response::from_status_code("HTTP/1.1", StatusCode::Ok);
        response.set_body(body);
        response
    }

    #[test]
    fn success_accepts_gzip_substring() {
        let sample = b"GET / HTTP/1.1\r\nAccept-Encoding: deflate, gzip;q=0.5\r\n\r\n";
        assert!(accepts_gzip(&parse_http(sample).unwrap()));

        let sample = b"GET / HTTP/1.1\r\nAccept-Encoding: xgzipx\r\n\r\n";
        assert!(accepts_gzip(&parse_http(sample).unwrap()));
    }

    #[test]
    fn failure_accepts_gzip() {
        for sample in [
            &b"GET / HTTP/1.1\r\n\r\n"[..],
            b"GET / HTTP/1.1\r\nAccept-Encoding: deflate\r\n\r\n",
            b"GET / HTTP/1.1\r\nAccept-Encoding: GZIP\r\n\r\n",
            b"GET / HTTP/1.1\r\naccept-encoding: gzip\r\n\r\n",
        ] {
            assert!(!accepts_gzip(&parse_http(sample).unwrap()));
        }
    }

    #[test]
    fn success_plain_length() {
        let response = maybe_encode(response_with(b"hello"), false).unwrap();
        assert_eq!(response.header(Header::CONTENT_LENGTH), Some("5"));
        assert_eq!(response.header(Header::CONTENT_ENCODING), None);
        assert_eq!(&response.body[..], b"hello");
    }

    #[test]
    fn success_gzip_round_trip() {
        let body: &'static [u8] = b"abcabcabcabcabcabcabcabcabcabcabcabcabcabc";
        let response = maybe_encode(response_with(body), true).unwrap();

        assert_eq!(response.header(Header::CONTENT_ENCODING), Some("gzip"));
        assert_eq!(
            response.header(Header::CONTENT_LENGTH),
            Some(response.body.len().to_string().as_str())
        );
        assert_eq!(gunzip(&response.body), body);
    }

    #[test]
    fn success_gzip_empty_body() {
        let response = maybe_encode(response_with(b""), true).unwrap();
        assert!(!response.body.is_empty());
        assert!(gunzip(&response.body).is_empty());
    }
}

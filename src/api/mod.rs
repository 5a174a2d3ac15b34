//! Route handlers. Each one fills in the response it is given; `Content-Length` is left to the
//! encoder.

use bytes::Bytes;
use tracing::{debug, warn};

use crate::application::file_store::FileStore;
use crate::domain::errors::StorageError;
use crate::infrastructure::server_impl::response::{Response, StatusCode};
use crate::infrastructure::server_impl::server::Header;

const TEXT_PLAIN: &str = "text/plain";
const OCTET_STREAM: &str = "application/octet-stream";

fn text_response(mut response: Response, text: &[u8]) -> Response {
    response
        .set_header(Header::CONTENT_TYPE, TEXT_PLAIN)
        .set_body(Bytes::copy_from_slice(text));
    response
}

pub fn echo_route(response: Response, echo: &[u8]) -> Response {
    text_response(response, echo)
}

pub fn user_agent_route(response: Response, user_agent: &[u8]) -> Response {
    text_response(response, user_agent)
}

/// Store names are text; anything else can't name a file.
fn file_name(name: &[u8]) -> Result<&str, StorageError> {
    std::str::from_utf8(name)
        .map_err(|_| StorageError::InvalidName(String::from_utf8_lossy(name).into_owned()))
}

async fn read_file<S: FileStore>(store: &S, name: &[u8]) -> Result<Vec<u8>, StorageError> {
    let name = file_name(name)?;
    let size = store.stat(name).await?;
    debug!(name, size, "serving file");
    store.read_all(name).await
}

async fn write_file<S: FileStore>(store: &S, name: &[u8], body: &[u8]) -> Result<(), StorageError> {
    let name = file_name(name)?;
    store.create_and_write(name, body).await?;
    debug!(name, len = body.len(), "file written");
    Ok(())
}

pub async fn file_get_route<S: FileStore>(
    mut response: Response,
    store: Option<&S>,
    name: &[u8],
) -> Response {
    let Some(store) = store else {
        response.set_status(StatusCode::NotFound);
        return response;
    };

    match read_file(store, name).await {
        Ok(contents) => {
            response
                .set_status(StatusCode::Ok)
                .set_header(Header::CONTENT_TYPE, OCTET_STREAM)
                .set_body(contents);
        }
        Err(StorageError::NotFound) => {
            debug!(name = %String::from_utf8_lossy(name), "file not found");
            response.set_status(StatusCode::NotFound);
        }
        Err(err) => {
            warn!(%err, "failed to read file");
            response.set_status(StatusCode::NotFound);
        }
    }

    response
}

pub async fn file_post_route<S: FileStore>(
    mut response: Response,
    store: Option<&S>,
    name: &[u8],
    body: &[u8],
) -> Response {
    let Some(store) = store else {
        response.set_status(StatusCode::NotFound);
        return response;
    };

    let status_code = match write_file(store, name, body).await {
        Ok(()) => StatusCode::Created,
        Err(err @ StorageError::InvalidName(_)) => {
            warn!(%err, "rejected file name");
            StatusCode::NotFound
        }
        Err(err) => {
            warn!(name = %String::from_utf8_lossy(name), %err, "failed to write file");
            StatusCode::InternalServerError
        }
    };

    response.set_status(status_code);
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::file_store::tests::TempRoot;
    use crate::application::file_store::DirectoryStore;

    fn ok() -> Response {
        Response::from_status_code("HTTP/1.1", StatusCode::Ok)
    }

    #[test]
    fn success_echo() {
        let response = echo_route(ok(), b"abc");
        assert_eq!(response.status_code, StatusCode::Ok);
        assert_eq!(response.header(Header::CONTENT_TYPE), Some(TEXT_PLAIN));
        assert_eq!(&response.body[..], b"abc");
    }

    #[tokio::test]
    async fn success_file_round_trip() {
        let root = TempRoot::new();
        let store = root.store();

        let response = file_post_route(ok(), Some(&store), b"a.bin", b"\xde\xad\xbe\xef").await;
        assert_eq!(response.status_code, StatusCode::Created);
        assert!(response.body.is_empty());

        let response = file_get_route(ok(), Some(&store), b"a.bin").await;
        assert_eq!(response.status_code, StatusCode::Ok);
        assert_eq!(response.header(Header::CONTENT_TYPE), Some(OCTET_STREAM));
        assert_eq!(&response.body[..], b"\xde\xad\xbe\xef");
    }

    #[tokio::test]
    async fn failure_file_get() {
        let root = TempRoot::new();
        let store = root.store();
        for name in [&b"missing.txt"[..], b"../secret", b"", b"caf\xe9"] {
            let response = file_get_route(ok(), Some(&store), name).await;
            assert_eq!(response.status_code, StatusCode::NotFound);
            assert!(response.body.is_empty());
            assert_eq!(response.header(Header::CONTENT_TYPE), None);
        }
    }

    #[tokio::test]
    async fn failure_file_post_without_store() {
        let response = file_post_route::<DirectoryStore>(ok(), None, b"a.txt", b"x").await;
        assert_eq!(response.status_code, StatusCode::NotFound);
    }
}

//! Loopback HTTP file server for the remote source tests.
//!
//! Serves one body under every path, honours single byte ranges, optionally
//! demands a bearer token, and records each request line.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::extract::State;
use axum::http::header::{
    AUTHORIZATION, CONTENT_LENGTH, CONTENT_RANGE, ETAG, LAST_MODIFIED, RANGE,
};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;

struct Served {
    body: Bytes,
    token: Option<String>,
    requests: Mutex<Vec<String>>,
}

pub(crate) struct FileServer {
    addr: SocketAddr,
    state: Arc<Served>,
}

impl FileServer {
    pub(crate) async fn start(body: Bytes, token: Option<&str>) -> Self {
        let state = Arc::new(Served {
            body,
            token: token.map(str::to_string),
            requests: Mutex::new(Vec::new()),
        });
        let app = Router::new().fallback(serve_file).with_state(state.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Self { addr, state }
    }

    /// `path_and_query` starts with `/`.
    pub(crate) fn url(&self, path_and_query: &str) -> String {
        format!("http://{}{path_and_query}", self.addr)
    }

    /// `"<METHOD> <path?query>"` per request, in arrival order.
    pub(crate) fn requests(&self) -> Vec<String> {
        self.state.requests.lock().unwrap().clone()
    }
}

async fn serve_file(
    State(served): State<Arc<Served>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    served.requests.lock().unwrap().push(format!("{method} {uri}"));

    if let Some(token) = &served.token {
        let expected = format!("Bearer {token}");
        let given = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());
        if given != Some(expected.as_str()) {
            return (StatusCode::UNAUTHORIZED, "token required").into_response();
        }
    }

    let total = served.body.len();
    let range = headers
        .get(RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(|r| byte_range(r, total));

    let mut out = HeaderMap::new();
    out.insert(LAST_MODIFIED, HeaderValue::from_static("Wed, 01 Jan 2025 00:00:00 GMT"));
    out.insert(ETAG, HeaderValue::from_static("\"journeys-v1\""));
    let (status, body) = match range {
        Some((start, end)) => {
            let value = format!("bytes {start}-{}/{total}", end - 1);
            out.insert(CONTENT_RANGE, HeaderValue::from_str(&value).unwrap());
            (StatusCode::PARTIAL_CONTENT, served.body.slice(start..end))
        }
        None => (StatusCode::OK, served.body.clone()),
    };
    out.insert(CONTENT_LENGTH, HeaderValue::from(body.len()));
    (status, out, body).into_response()
}

/// Parses `bytes=a-b`, `bytes=a-` and `bytes=-n` into a half-open range.
fn byte_range(header: &str, total: usize) -> Option<(usize, usize)> {
    let (start, end) = header.strip_prefix("bytes=")?.split_once('-')?;
    let (start, end) = match (start.is_empty(), end.is_empty()) {
        (true, false) => (total.saturating_sub(end.parse().ok()?), total),
        (false, true) => (start.parse().ok()?, total),
        (false, false) => (start.parse().ok()?, (end.parse::<usize>().ok()? + 1).min(total)),
        (true, true) => return None,
    };
    (start < end).then_some((start, end))
}

#[test]
fn test_byte_range() {
    assert_eq!(byte_range("bytes=0-9", 100), Some((0, 10)));
    assert_eq!(byte_range("bytes=90-", 100), Some((90, 100)));
    assert_eq!(byte_range("bytes=-8", 100), Some((92, 100)));
    assert_eq!(byte_range("bytes=95-200", 100), Some((95, 100)));
    assert_eq!(byte_range("bytes=-", 100), None);
}

//! Minimal HTTP/1.1 request parsing and response encoding.
//!
//! One request per connection: bodies are delimited by `Content-Length` and
//! every response carries `Connection: close`.  Header lines are read through
//! a byte budget, so an unterminated line is rejected once it exceeds
//! [`MAX_HEADER_BYTES`] instead of being buffered whole.

use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Largest accepted request body.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;
/// Largest accepted header section (request line included).
pub const MAX_HEADER_BYTES: usize = 16 * 1024;
/// Default time allowed for a peer to deliver one complete request.
pub const READ_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed request: {0}")]
    Malformed(String),
    #[error("request too large")]
    TooLarge,
    #[error("request not received in time")]
    Timeout,
    /// Bodies framed any other way than `Content-Length` are not read.
    #[error("unsupported transfer encoding {0:?}")]
    LengthRequired(String),
}

impl HttpError {
    /// The response sent back for a request that failed to parse.
    pub fn response(&self) -> Option<Response> {
        match self {
            HttpError::Io(_) => None,
            HttpError::Malformed(_) => Some(Response::message(400, "Malformed request.")),
            HttpError::TooLarge => Some(Response::message(413, "Request too large.")),
            HttpError::Timeout => Some(Response::message(408, "Request timeout.")),
            HttpError::LengthRequired(_) => Some(Response::message(411, "Content-Length required.")),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Request
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: String,
    /// Path without the query string.
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Request {
    pub fn new(method: &str, path: &str) -> Self {
        Self {
            method: method.to_ascii_uppercase(),
            path: path.to_string(),
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// A request carrying `value` as an `application/json` body.
    pub fn with_json(self, value: &Value) -> Self {
        self.with_header("Content-Type", "application/json")
            .with_body(value.to_string())
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// `true` for `application/json` and `application/*+json` content types.
    pub fn is_json(&self) -> bool {
        let Some(content_type) = self.header("content-type") else {
            return false;
        };
        let mime = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        mime == "application/json" || (mime.starts_with("application/") && mime.ends_with("+json"))
    }

    /// The body parsed as JSON, if it is valid JSON.
    pub fn json(&self) -> Option<Value> {
        serde_json::from_slice(&self.body).ok()
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Response
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    pub content_type: &'static str,
    pub body: Vec<u8>,
}

impl Response {
    pub fn json<T: Serialize>(status: u16, body: &T) -> Self {
        let body = serde_json::to_vec(body).unwrap_or_else(|_| b"null".to_vec());
        Self {
            status,
            content_type: "application/json",
            body,
        }
    }

    /// `{"message": ...}` with the given status.
    pub fn message(status: u16, message: &str) -> Self {
        Self::json(status, &serde_json::json!({ "message": message }))
    }

    pub fn text(status: u16, content_type: &'static str, body: String) -> Self {
        Self {
            status,
            content_type,
            body: body.into_bytes(),
        }
    }

    pub fn not_found() -> Self {
        Self::message(404, "Not found.")
    }

    pub fn method_not_allowed() -> Self {
        Self::message(405, "Method not allowed.")
    }

    /// The body parsed as JSON (`Value::Null` when it is not JSON).
    pub fn json_body(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap_or(Value::Null)
    }

    pub fn text_body(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        408 => "Request Timeout",
        411 => "Length Required",
        413 => "Payload Too Large",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        _ => "Unknown",
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Wire I/O
// ─────────────────────────────────────────────────────────────────────────────

/// Read one request.  Returns `Ok(None)` when the peer closed the connection
/// before sending anything.
pub async fn read_request<R>(reader: &mut R) -> Result<Option<Request>, HttpError>
where
    R: AsyncBufRead + Unpin,
{
    let Some(line) = read_line_within(reader, MAX_HEADER_BYTES).await? else {
        return Ok(None);
    };
    let mut header_bytes = line.len();

    let mut parts = line.split_whitespace();
    let (Some(method), Some(target), Some(version)) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(HttpError::Malformed(format!("bad request line: {:?}", line.trim_end())));
    };
    if !version.starts_with("HTTP/1.") {
        return Err(HttpError::Malformed(format!("unsupported version {version}")));
    }
    let path = target.split('?').next().unwrap_or_default();
    let mut request = Request::new(method, path);

    while let Some(raw) = read_line_within(reader, MAX_HEADER_BYTES - header_bytes).await? {
        header_bytes += raw.len();
        let header = raw.trim_end_matches(['\r', '\n']);
        if header.is_empty() {
            break;
        }
        let Some((name, value)) = header.split_once(':') else {
            return Err(HttpError::Malformed(format!("bad header line: {header:?}")));
        };
        request
            .headers
            .push((name.trim().to_string(), value.trim().to_string()));
    }

    if let Some(encoding) = request.header("transfer-encoding") {
        return Err(HttpError::LengthRequired(encoding.to_string()));
    }
    let length = match request.header("content-length") {
        Some(v) => v
            .parse::<usize>()
            .map_err(|_| HttpError::Malformed(format!("bad content-length {v:?}")))?,
        None => 0,
    };
    if length > MAX_BODY_BYTES {
        return Err(HttpError::TooLarge);
    }
    let mut body = vec![0u8; length];
    reader.read_exact(&mut body).await?;
    request.body = body;

    Ok(Some(request))
}

/// [`read_request`] bounded by `limit`; a slow or stalled peer yields
/// [`HttpError::Timeout`].
pub async fn read_request_within<R>(reader: &mut R, limit: Duration) -> Result<Option<Request>, HttpError>
where
    R: AsyncBufRead + Unpin,
{
    tokio::time::timeout(limit, read_request(reader))
        .await
        .map_err(|_| HttpError::Timeout)?
}

/// Read one line, consuming at most `budget` bytes.  `Ok(None)` at end of
/// stream.
async fn read_line_within<R>(reader: &mut R, budget: usize) -> Result<Option<String>, HttpError>
where
    R: AsyncBufRead + Unpin,
{
    if budget == 0 {
        return Err(HttpError::TooLarge);
    }
    let mut buf = Vec::new();
    let n = (&mut *reader)
        .take(budget as u64)
        .read_until(b'\n', &mut buf)
        .await?;
    if n == 0 {
        return Ok(None);
    }
    if !buf.ends_with(b"\n") && n >= budget {
        return Err(HttpError::TooLarge);
    }
    String::from_utf8(buf)
        .map(Some)
        .map_err(|_| HttpError::Malformed("header is not UTF-8".to_string()))
}

/// Serialise `response` onto `writer` and flush it.
pub async fn write_response<W>(writer: &mut W, response: &Response) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let head = format!(
        "HTTP/1.1 {} {}\r\n\
         Content-Type: {}\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n",
        response.status,
        reason_phrase(response.status),
        response.content_type,
        response.body.len()
    );
    writer.write_all(head.as_bytes()).await?;
    writer.write_all(&response.body).await?;
    writer.flush().await
}

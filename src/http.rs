//! Request/response types and the minimal HTTP/1.1 wire handling the server needs.

use serde::Serialize;
use std::collections::HashMap;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

const MAX_HEADER_BYTES: usize = 16 * 1024;

/// An inbound HTTP request. `params` is filled by the router from the matched path pattern.
#[derive(Clone, Debug, Default)]
pub struct Request {
    pub method: String,
    pub path: String,
    pub query: HashMap<String, String>,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
    pub params: HashMap<String, String>,
}

impl Request {
    /// Build a request by hand, e.g. `Request::new("GET", "/about?x=1")`.
    pub fn new(method: &str, target: &str) -> Self {
        let (path, query) = split_target(target);
        Request {
            method: method.to_ascii_uppercase(),
            path,
            query,
            ..Default::default()
        }
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers
            .insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    /// Header lookup, case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

fn split_target(target: &str) -> (String, HashMap<String, String>) {
    match target.split_once('?') {
        Some((path, q)) => (
            path.to_string(),
            url::form_urlencoded::parse(q.as_bytes())
                .into_owned()
                .collect(),
        ),
        None => (target.to_string(), HashMap::new()),
    }
}

/// Represents the outcome of an HTTP handler.
/// Supports HTML, JSON, and custom status/headers.
#[derive(Debug)]
pub struct Response {
    pub status_code: u16,
    pub body: String,
    pub headers: HashMap<String, String>,
}

impl Response {
    /// Construct a new HTTP 200 response with text body.
    pub fn ok(body: impl Into<String>) -> Self {
        Response::with_status(200, body)
    }

    pub fn with_status(status_code: u16, body: impl Into<String>) -> Self {
        Response {
            status_code,
            body: body.into(),
            headers: HashMap::new(),
        }
    }

    pub fn html(status_code: u16, body: impl Into<String>) -> Self {
        let mut resp = Response::with_status(status_code, body);
        resp.headers.insert(
            "Content-Type".to_string(),
            "text/html; charset=utf-8".to_string(),
        );
        resp
    }

    pub fn no_content() -> Self {
        Response::with_status(204, "")
    }

    pub fn bad_request(body: impl Into<String>) -> Self {
        Response::with_status(400, body)
    }

    /// Construct a new HTTP 403 response with text body.
    pub fn forbidden(body: impl Into<String>) -> Self {
        Response::with_status(403, body)
    }

    /// Construct a new HTTP 404 "not found" response.
    pub fn not_found() -> Self {
        Response::with_status(404, "404 Not Found")
    }

    pub fn method_not_allowed() -> Self {
        Response::with_status(405, "405 Method Not Allowed")
    }

    pub fn length_required() -> Self {
        Response::with_status(411, "411 Length Required")
    }

    pub fn payload_too_large() -> Self {
        Response::with_status(413, "413 Payload Too Large")
    }

    pub fn server_error() -> Self {
        Response::html(500, "<h1>Server Error (500)</h1>")
    }

    /// Construct a JSON response from any serde-serializable payload.
    pub fn json<T: Serialize>(
        data: T,
        status_code: u16,
        mut headers: HashMap<String, String>,
    ) -> Self {
        headers.insert(
            "Content-Type".to_string(),
            "application/json; charset=utf-8".to_string(),
        );
        match serde_json::to_string(&data) {
            Ok(body) => Response {
                status_code,
                body,
                headers,
            },
            Err(e) => {
                log::error!("Response serialization failed: {}", e);
                Response {
                    status_code: 500,
                    body: "{\"error\": \"Serialization failed\"}".to_string(),
                    headers,
                }
            }
        }
    }
}

/// Maps status codes to HTTP status text for responses.
pub fn status_text(code: u16) -> &'static str {
    match code {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        400 => "Bad Request",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        411 => "Length Required",
        413 => "Payload Too Large",
        500 => "Internal Server Error",
        _ => "Unknown",
    }
}

#[derive(Debug)]
pub enum ReadError {
    /// Connection closed before a full request arrived.
    Closed,
    Malformed,
    /// The body is not framed by `Content-Length` (e.g. chunked).
    LengthRequired,
    TooLarge,
    Io(std::io::Error),
}

impl From<std::io::Error> for ReadError {
    fn from(e: std::io::Error) -> Self {
        ReadError::Io(e)
    }
}

fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

/// Read one request: the head up to `\r\n\r\n`, then `Content-Length` bytes of body.
pub async fn read_request<S: AsyncRead + Unpin>(
    stream: &mut S,
    max_body_bytes: usize,
) -> Result<Request, ReadError> {
    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 4096];

    let head_end = loop {
        if let Some(pos) = find_header_end(&buf) {
            break pos;
        }
        if buf.len() > MAX_HEADER_BYTES {
            return Err(ReadError::TooLarge);
        }
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(ReadError::Closed);
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = std::str::from_utf8(&buf[..head_end]).map_err(|_| ReadError::Malformed)?;
    let mut lines = head.split("\r\n");
    let request_line = lines.next().ok_or(ReadError::Malformed)?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().ok_or(ReadError::Malformed)?;
    let target = parts.next().ok_or(ReadError::Malformed)?;

    let mut request = Request::new(method, target);
    for line in lines {
        if let Some((name, value)) = line.split_once(':') {
            request
                .headers
                .insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
        }
    }

    if request.header("transfer-encoding").is_some() {
        return Err(ReadError::LengthRequired);
    }
    let content_length = match request.header("content-length") {
        Some(v) => v.parse::<usize>().map_err(|_| ReadError::Malformed)?,
        None => 0,
    };
    if content_length > max_body_bytes {
        return Err(ReadError::TooLarge);
    }

    let mut body = buf.split_off(head_end + 4);
    while body.len() < content_length {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(ReadError::Closed);
        }
        body.extend_from_slice(&chunk[..n]);
    }
    body.truncate(content_length);
    request.body = body;
    Ok(request)
}

/// Serializes and sends an HTTP response. With `head_only` (answers to HEAD)
/// the body is left out but `Content-Length` still describes it.
pub async fn write_response<S: AsyncWrite + Unpin>(
    stream: &mut S,
    response: &Response,
    head_only: bool,
) -> std::io::Result<()> {
    let mut head = format!(
        "HTTP/1.1 {} {}\r\nContent-Length: {}\r\nConnection: close\r\n",
        response.status_code,
        status_text(response.status_code),
        response.body.len(),
    );
    for (key, value) in &response.headers {
        head.push_str(&format!("{}: {}\r\n", key, value));
    }
    head.push_str("\r\n");

    stream.write_all(head.as_bytes()).await?;
    if !head_only {
        stream.write_all(response.body.as_bytes()).await?;
    }
    stream.flush().await
}

//! HTTP/1.x wire codec for peer exchanges.
//!
//! # Responsibilities
//! - Encode a fully buffered request into a self-contained byte buffer
//! - Parse such a buffer back into a request
//! - Same for responses, carrying `Content-Length` explicitly
//!
//! # Design Decisions
//! - The peer transport is message oriented, so every message carries its
//!   own framing (request/status line, headers, explicit body length)
//! - Header names are written lowercase; order and case are not preserved
//! - Chunked bodies are accepted on parse and re-framed with `Content-Length`

use axum::body::{Body, Bytes};
use axum::http::{
    header::{CONTENT_LENGTH, HOST, TRANSFER_ENCODING},
    request, HeaderMap, HeaderName, HeaderValue, Method, Request, Response, StatusCode, Uri,
    Version,
};
use thiserror::Error;

/// Upper bound on the number of headers accepted in one message.
const MAX_HEADERS: usize = 100;

/// Errors produced while decoding a serialized HTTP exchange.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The buffer ended before the message head was complete.
    #[error("incomplete message head")]
    Incomplete,

    /// The message head is not valid HTTP/1.x.
    #[error("malformed message: {0}")]
    Malformed(#[from] httparse::Error),

    /// A component of the head parsed but is not acceptable.
    #[error("invalid {what}: {detail}")]
    Invalid { what: &'static str, detail: String },

    /// The body is shorter than its declared length.
    #[error("body truncated: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },
}

impl CodecError {
    fn invalid(what: &'static str, detail: impl ToString) -> Self {
        CodecError::Invalid {
            what,
            detail: detail.to_string(),
        }
    }
}

/// A fully buffered HTTP request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub uri: Uri,
    pub version: Version,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl HttpRequest {
    /// Build from the parts of a live request and its buffered body.
    pub fn from_parts(parts: request::Parts, body: Bytes) -> Self {
        Self {
            method: parts.method,
            uri: parts.uri,
            version: parts.version,
            headers: parts.headers,
            body,
        }
    }

    /// Convert into a request the backend can serve.
    pub fn into_request(self) -> Request<Body> {
        let mut request = Request::new(Body::from(self.body));
        *request.method_mut() = self.method;
        *request.uri_mut() = self.uri;
        *request.version_mut() = self.version;
        *request.headers_mut() = self.headers;
        request
    }

    /// Encode as an HTTP/1.x message.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = Vec::with_capacity(256 + self.body.len());
        let target = self
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");

        buf.extend_from_slice(self.method.as_str().as_bytes());
        buf.push(b' ');
        buf.extend_from_slice(target.as_bytes());
        buf.push(b' ');
        buf.extend_from_slice(version_str(self.version).as_bytes());
        buf.extend_from_slice(b"\r\n");

        // Host goes first, falling back to the URI authority.
        if let Some(host) = self.headers.get(HOST) {
            write_header(&mut buf, HOST.as_str(), host.as_bytes());
        } else if let Some(authority) = self.uri.authority() {
            write_header(&mut buf, HOST.as_str(), authority.as_str().as_bytes());
        }

        for (name, value) in self.headers.iter() {
            if name == HOST || name == CONTENT_LENGTH || name == TRANSFER_ENCODING {
                continue;
            }
            write_header(&mut buf, name.as_str(), value.as_bytes());
        }

        if !self.body.is_empty() || self.headers.contains_key(CONTENT_LENGTH) {
            write_header(
                &mut buf,
                CONTENT_LENGTH.as_str(),
                self.body.len().to_string().as_bytes(),
            );
        }

        buf.extend_from_slice(b"\r\n");
        buf.extend_from_slice(&self.body);
        Bytes::from(buf)
    }

    /// Parse an HTTP/1.x request message.
    pub fn parse(raw: &[u8]) -> Result<Self, CodecError> {
        let mut header_buf = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut parsed = httparse::Request::new(&mut header_buf);
        let head_len = match parsed.parse(raw)? {
            httparse::Status::Complete(len) => len,
            httparse::Status::Partial => return Err(CodecError::Incomplete),
        };

        let method = parsed
            .method
            .ok_or(CodecError::Incomplete)
            .and_then(|m| {
                Method::from_bytes(m.as_bytes()).map_err(|e| CodecError::invalid("method", e))
            })?;
        let uri = parsed
            .path
            .ok_or(CodecError::Incomplete)
            .and_then(|p| {
                p.parse::<Uri>()
                    .map_err(|e| CodecError::invalid("request target", e))
            })?;
        let version = parse_version(parsed.version)?;
        let mut headers = collect_headers(parsed.headers)?;

        let rest = &raw[head_len..];
        let body = if is_chunked(&headers) {
            headers.remove(TRANSFER_ENCODING);
            decode_chunked(rest)?
        } else if let Some(len) = declared_length(&headers)? {
            take_exact(rest, len)?
        } else {
            Bytes::new()
        };

        Ok(Self {
            method,
            uri,
            version,
            headers,
            body,
        })
    }
}

/// A fully buffered HTTP response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Length declared by the `Content-Length` header, when it parsed.
    pub content_length: Option<u64>,
}

impl HttpResponse {
    /// Convert into a response that can be returned to a client.
    pub fn into_response(self) -> Response<Body> {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }

    /// Encode as an HTTP/1.1 message answering a `method` request.
    ///
    /// A HEAD reply keeps its declared length; otherwise the length is that
    /// of the captured body.
    pub fn to_bytes(&self, method: &Method) -> Bytes {
        let mut buf = Vec::with_capacity(256 + self.body.len());

        buf.extend_from_slice(b"HTTP/1.1 ");
        buf.extend_from_slice(self.status.as_str().as_bytes());
        buf.push(b' ');
        buf.extend_from_slice(self.status.canonical_reason().unwrap_or("").as_bytes());
        buf.extend_from_slice(b"\r\n");

        for (name, value) in self.headers.iter() {
            if name == CONTENT_LENGTH || name == TRANSFER_ENCODING {
                continue;
            }
            write_header(&mut buf, name.as_str(), value.as_bytes());
        }

        if status_has_body(self.status) {
            let length = match self.content_length {
                Some(declared) if *method == Method::HEAD => declared,
                _ => self.body.len() as u64,
            };
            write_header(&mut buf, CONTENT_LENGTH.as_str(), length.to_string().as_bytes());
        }

        buf.extend_from_slice(b"\r\n");
        buf.extend_from_slice(&self.body);
        Bytes::from(buf)
    }

    /// Parse an HTTP/1.x response message.
    ///
    /// `method` is the method of the request this answers; a HEAD reply never
    /// carries a body.
    pub fn parse(raw: &[u8], method: &Method) -> Result<Self, CodecError> {
        let mut header_buf = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut parsed = httparse::Response::new(&mut header_buf);
        let head_len = match parsed.parse(raw)? {
            httparse::Status::Complete(len) => len,
            httparse::Status::Partial => return Err(CodecError::Incomplete),
        };

        let status = parsed
            .code
            .ok_or(CodecError::Incomplete)
            .and_then(|c| {
                StatusCode::from_u16(c).map_err(|e| CodecError::invalid("status code", e))
            })?;
        parse_version(parsed.version)?;
        let mut headers = collect_headers(parsed.headers)?;
        let content_length = declared_length(&headers)?;

        let rest = &raw[head_len..];
        let body = if *method == Method::HEAD || !status_has_body(status) {
            Bytes::new()
        } else if is_chunked(&headers) {
            headers.remove(TRANSFER_ENCODING);
            decode_chunked(rest)?
        } else if let Some(len) = content_length {
            take_exact(rest, len)?
        } else {
            // No framing: the body runs to the end of the message.
            Bytes::copy_from_slice(rest)
        };

        Ok(Self {
            status,
            headers,
            body,
            content_length: content_length.map(|len| len as u64),
        })
    }
}

fn version_str(version: Version) -> &'static str {
    if version == Version::HTTP_10 {
        "HTTP/1.0"
    } else {
        "HTTP/1.1"
    }
}

fn parse_version(minor: Option<u8>) -> Result<Version, CodecError> {
    match minor {
        Some(0) => Ok(Version::HTTP_10),
        Some(1) => Ok(Version::HTTP_11),
        Some(other) => Err(CodecError::invalid("version", format!("HTTP/1.{}", other))),
        None => Err(CodecError::Incomplete),
    }
}

fn write_header(buf: &mut Vec<u8>, name: &str, value: &[u8]) {
    buf.extend_from_slice(name.as_bytes());
    buf.extend_from_slice(b": ");
    buf.extend_from_slice(value);
    buf.extend_from_slice(b"\r\n");
}

fn collect_headers(raw: &[httparse::Header<'_>]) -> Result<HeaderMap, CodecError> {
    let mut headers = HeaderMap::with_capacity(raw.len());
    for header in raw {
        let name = HeaderName::from_bytes(header.name.as_bytes())
            .map_err(|e| CodecError::invalid("header name", e))?;
        let value = HeaderValue::from_bytes(header.value)
            .map_err(|e| CodecError::invalid("header value", e))?;
        headers.append(name, value);
    }
    Ok(headers)
}

fn declared_length(headers: &HeaderMap) -> Result<Option<usize>, CodecError> {
    match headers.get(CONTENT_LENGTH) {
        None => Ok(None),
        Some(value) => value
            .to_str()
            .ok()
            .and_then(|v| v.trim().parse::<usize>().ok())
            .map(Some)
            .ok_or_else(|| {
                CodecError::invalid("content-length", String::from_utf8_lossy(value.as_bytes()))
            }),
    }
}

fn is_chunked(headers: &HeaderMap) -> bool {
    headers
        .get_all(TRANSFER_ENCODING)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .any(|v| v.split(',').any(|coding| coding.trim().eq_ignore_ascii_case("chunked")))
}

fn status_has_body(status: StatusCode) -> bool {
    !(status.is_informational()
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED)
}

fn take_exact(rest: &[u8], len: usize) -> Result<Bytes, CodecError> {
    if rest.len() < len {
        return Err(CodecError::Truncated {
            expected: len,
            actual: rest.len(),
        });
    }
    Ok(Bytes::copy_from_slice(&rest[..len]))
}

fn decode_chunked(mut rest: &[u8]) -> Result<Bytes, CodecError> {
    let mut body = Vec::new();
    loop {
        let (consumed, size) = match httparse::parse_chunk_size(rest) {
            Ok(httparse::Status::Complete(found)) => found,
            Ok(httparse::Status::Partial) => return Err(CodecError::Incomplete),
            Err(_) => return Err(CodecError::invalid("chunk size", "not a hex length")),
        };
        rest = &rest[consumed..];
        if size == 0 {
            // Trailers are dropped.
            return Ok(Bytes::from(body));
        }
        let size = usize::try_from(size).map_err(|e| CodecError::invalid("chunk size", e))?;
        let framed = size
            .checked_add(2)
            .ok_or_else(|| CodecError::invalid("chunk size", size))?;
        if rest.len() < framed {
            return Err(CodecError::Truncated {
                expected: framed,
                actual: rest.len(),
            });
        }
        if &rest[size..framed] != b"\r\n" {
            return Err(CodecError::invalid("chunk", "data not terminated by CRLF"));
        }
        body.extend_from_slice(&rest[..size]);
        rest = &rest[framed..];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_request() -> HttpRequest {
        let mut headers = HeaderMap::new();
        headers.insert(HOST, HeaderValue::from_static("127.0.0.1:5001"));
        headers.insert("X-Custom-Header", HeaderValue::from_static("alpha"));
        headers.append("accept", HeaderValue::from_static("text/plain"));
        headers.append("accept", HeaderValue::from_static("application/json"));
        HttpRequest {
            method: Method::POST,
            uri: "/api/items?limit=5".parse().unwrap(),
            version: Version::HTTP_11,
            headers,
            body: Bytes::from_static(b"{\"name\":\"widget\"}"),
        }
    }

    #[test]
    fn request_round_trip_preserves_method_path_body_and_headers() {
        let original = sample_request();
        let parsed = HttpRequest::parse(&original.to_bytes()).unwrap();

        assert_eq!(parsed.method, Method::POST);
        assert_eq!(parsed.uri, "/api/items?limit=5");
        assert_eq!(parsed.version, Version::HTTP_11);
        assert_eq!(parsed.body, original.body);
        for name in original.headers.keys() {
            let sent: Vec<_> = original.headers.get_all(name).iter().collect();
            let received: Vec<_> = parsed.headers.get_all(name).iter().collect();
            assert_eq!(sent, received, "header {} differs", name);
        }
        assert_eq!(parsed.headers.get("x-custom-header").unwrap(), "alpha");
        assert_eq!(parsed.headers.get(CONTENT_LENGTH).unwrap(), "17");
    }

    #[test]
    fn request_without_body_matches_wire_format() {
        let mut headers = HeaderMap::new();
        headers.insert(HOST, HeaderValue::from_static("localhost"));
        let request = HttpRequest {
            method: Method::GET,
            uri: "/".parse().unwrap(),
            version: Version::HTTP_11,
            headers,
            body: Bytes::new(),
        };

        assert_eq!(
            &request.to_bytes()[..],
            b"GET / HTTP/1.1\r\nhost: localhost\r\n\r\n"
        );
    }

    #[test]
    fn request_host_falls_back_to_uri_authority() {
        let request = HttpRequest {
            method: Method::GET,
            uri: "http://10.1.2.3:5000/path".parse().unwrap(),
            version: Version::HTTP_11,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        };

        let parsed = HttpRequest::parse(&request.to_bytes()).unwrap();
        assert_eq!(parsed.uri, "/path");
        assert_eq!(parsed.headers.get(HOST).unwrap(), "10.1.2.3:5000");
    }

    #[test]
    fn parse_rejects_garbage_and_partial_heads() {
        assert!(matches!(
            HttpRequest::parse(b"\x00\x01 not http at all"),
            Err(CodecError::Malformed(_))
        ));
        assert!(matches!(
            HttpRequest::parse(b"GET / HTTP/1.1\r\nHost: a"),
            Err(CodecError::Incomplete)
        ));
        assert!(matches!(HttpRequest::parse(b""), Err(CodecError::Incomplete)));
    }

    #[test]
    fn parse_detects_truncated_body() {
        let raw = b"POST /x HTTP/1.1\r\nContent-Length: 10\r\n\r\nshort";
        assert!(matches!(
            HttpRequest::parse(raw),
            Err(CodecError::Truncated { expected: 10, actual: 5 })
        ));
    }

    #[test]
    fn parse_decodes_chunked_request_body() {
        let raw = b"PUT /upload HTTP/1.1\r\nHost: a\r\nTransfer-Encoding: chunked\r\n\r\n\
5\r\nhello\r\n6\r\n world\r\n0\r\n\r\n";
        let parsed = HttpRequest::parse(raw).unwrap();
        assert_eq!(parsed.body, Bytes::from_static(b"hello world"));
        assert!(parsed.headers.get(TRANSFER_ENCODING).is_none());
    }

    #[test]
    fn parses_backend_response() {
        let raw = b"HTTP/1.1 201 OK\r\n\
Content-Length: 50\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
Date: Tue, 06 Nov 2018 20:59:14 GMT\r\n\
X-Proxy: ringpop\r\n\
\r\n\
Hello from backend :4001 to client 127.0.0.1:50245";

        let response = HttpResponse::parse(raw, &Method::GET).unwrap();
        assert_eq!(response.status, StatusCode::CREATED);
        assert_eq!(response.content_length, Some(50));
        assert_eq!(
            response.body,
            Bytes::from_static(b"Hello from backend :4001 to client 127.0.0.1:50245")
        );
        assert_eq!(response.headers.get("x-proxy").unwrap(), "ringpop");
    }

    #[test]
    fn response_round_trip_keeps_status_and_body() {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", HeaderValue::from_static("text/plain"));
        headers.append("set-cookie", HeaderValue::from_static("a=1"));
        headers.append("set-cookie", HeaderValue::from_static("b=2"));
        let response = HttpResponse {
            status: StatusCode::IM_A_TEAPOT,
            headers,
            body: Bytes::from_static(b"short and stout"),
            content_length: None,
        };

        let parsed = HttpResponse::parse(&response.to_bytes(&Method::GET), &Method::GET).unwrap();
        assert_eq!(parsed.status, StatusCode::IM_A_TEAPOT);
        assert_eq!(parsed.body, response.body);
        assert_eq!(parsed.content_length, Some(15));
        assert_eq!(parsed.headers.get_all("set-cookie").iter().count(), 2);
    }

    #[test]
    fn head_response_keeps_declared_length_without_body() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("42"));
        let response = HttpResponse {
            status: StatusCode::OK,
            headers,
            body: Bytes::new(),
            content_length: Some(42),
        };

        let raw = response.to_bytes(&Method::HEAD);
        assert!(raw.ends_with(b"content-length: 42\r\n\r\n"));

        let parsed = HttpResponse::parse(&raw, &Method::HEAD).unwrap();
        assert!(parsed.body.is_empty());
        assert_eq!(parsed.content_length, Some(42));
    }

    #[test]
    fn unframed_response_body_runs_to_end() {
        let raw = b"HTTP/1.0 200 OK\r\nServer: legacy\r\n\r\neverything that follows";
        let parsed = HttpResponse::parse(raw, &Method::GET).unwrap();
        assert_eq!(parsed.body, Bytes::from_static(b"everything that follows"));
        assert_eq!(parsed.content_length, None);
    }

    #[test]
    fn no_content_response_has_no_body_or_length() {
        let response = HttpResponse {
            status: StatusCode::NO_CONTENT,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            content_length: None,
        };
        assert_eq!(
            &response.to_bytes(&Method::GET)[..],
            b"HTTP/1.1 204 No Content\r\n\r\n"
        );
    }

    const CHUNKED_HEAD: &[u8] =
        b"POST /x HTTP/1.1\r\nHost: a\r\nTransfer-Encoding: chunked\r\n\r\n";
    const CHUNKED_REPLY_HEAD: &[u8] = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n";

    fn with_body(head: &[u8], body: &[u8]) -> Vec<u8> {
        [head, body].concat()
    }

    #[test]
    fn oversized_chunk_size_is_rejected() {
        let body = b"ffffffffffffffff\r\nabc\r\n0\r\n\r\n";

        let request = HttpRequest::parse(&with_body(CHUNKED_HEAD, body));
        assert!(matches!(
            request,
            Err(CodecError::Invalid { .. } | CodecError::Truncated { .. })
        ));

        let response = HttpResponse::parse(&with_body(CHUNKED_REPLY_HEAD, body), &Method::GET);
        assert!(matches!(
            response,
            Err(CodecError::Invalid { .. } | CodecError::Truncated { .. })
        ));
    }

    #[test]
    fn chunk_data_must_end_with_crlf() {
        let body = b"3\r\nabcXY0\r\n\r\n";

        assert!(matches!(
            HttpRequest::parse(&with_body(CHUNKED_HEAD, body)),
            Err(CodecError::Invalid { what: "chunk", .. })
        ));
        assert!(matches!(
            HttpResponse::parse(&with_body(CHUNKED_REPLY_HEAD, body), &Method::GET),
            Err(CodecError::Invalid { what: "chunk", .. })
        ));
    }

    #[test]
    fn empty_capture_is_framed_with_its_own_length() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("42"));
        let response = HttpResponse {
            status: StatusCode::OK,
            headers,
            body: Bytes::new(),
            content_length: Some(42),
        };

        let raw = response.to_bytes(&Method::GET);
        assert!(raw.ends_with(b"content-length: 0\r\n\r\n"));

        let parsed = HttpResponse::parse(&raw, &Method::GET).unwrap();
        assert!(parsed.body.is_empty());
        assert_eq!(parsed.content_length, Some(0));
    }
}

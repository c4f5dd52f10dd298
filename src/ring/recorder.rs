//! In-memory capture of a backend response.

use axum::body::{Body, Bytes};
use axum::http::{header::CONTENT_LENGTH, HeaderMap, Response, StatusCode};
use futures_util::StreamExt;

use crate::http::codec::HttpResponse;

/// Accumulates status, headers and body of one backend invocation.
#[derive(Debug, Default)]
pub struct ResponseRecorder {
    headers: HeaderMap,
    body: Vec<u8>,
    status: Option<StatusCode>,
}

impl ResponseRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Record the status code. Later calls are ignored.
    pub fn write_header(&mut self, status: StatusCode) {
        if self.status.is_none() {
            self.status = Some(status);
        }
    }

    /// Append body bytes, returning how many were accepted.
    pub fn write(&mut self, chunk: &[u8]) -> usize {
        if self.status.is_none() {
            self.status = Some(StatusCode::OK);
        }
        self.body.extend_from_slice(chunk);
        chunk.len()
    }

    /// Recorded status, `200 OK` if none was written.
    pub fn status(&self) -> StatusCode {
        self.status.unwrap_or(StatusCode::OK)
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Drain a backend response into a new recorder.
    ///
    /// A body read error ends the capture; what was read so far is kept.
    pub async fn record(response: Response<Body>) -> Self {
        let (parts, body) = response.into_parts();
        let mut recorder = Self::new();
        recorder.write_header(parts.status);
        *recorder.headers_mut() = parts.headers;

        let mut stream = body.into_data_stream();
        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(data) => {
                    recorder.write(&data);
                }
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        captured = recorder.body.len(),
                        "Error reading backend response body"
                    );
                    break;
                }
            }
        }

        recorder
    }

    /// Materialize the captured response.
    pub fn reconstruct(self) -> HttpResponse {
        let content_length = self
            .headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());

        HttpResponse {
            status: self.status(),
            headers: self.headers,
            body: Bytes::from(self.body),
            content_length,
        }
    }
}

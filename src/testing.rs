//! Test doubles for the routing seams.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use axum::body::{Body, Bytes};
use axum::http::{Request, Response, StatusCode};

use crate::backend::Backend;
use crate::discovery::DiscoverProvider;
use crate::http::response::HEADER_RECEIVED_BY;
use crate::ring::error::RingError;
use crate::ring::forwarder::Forwarder;
use crate::ring::membership::Membership;
use crate::ring::transport::ForwardRequest;
use tokio_util::sync::CancellationToken;

/// Membership where every key belongs to one fixed owner.
pub struct MockMembership {
    identity: String,
    owner: String,
    ready: AtomicBool,
    forwarded: Mutex<Vec<ForwardRequest>>,
}

impl MockMembership {
    pub fn new(identity: &str, owner: &str) -> Self {
        Self {
            identity: identity.to_string(),
            owner: owner.to_string(),
            ready: AtomicBool::new(true),
            forwarded: Mutex::new(Vec::new()),
        }
    }

    pub fn not_ready(self) -> Self {
        self.ready.store(false, Ordering::SeqCst);
        self
    }

    pub fn forwarded(&self) -> Vec<ForwardRequest> {
        self.forwarded.lock().unwrap().clone()
    }
}

#[async_trait]
impl Membership for MockMembership {
    fn who_am_i(&self) -> Result<String, RingError> {
        Ok(self.identity.clone())
    }

    fn ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn lookup(&self, _key: &str) -> Result<String, RingError> {
        Ok(self.owner.clone())
    }

    async fn forward(
        &self,
        request: ForwardRequest,
        _cancel: CancellationToken,
    ) -> Result<Bytes, RingError> {
        let payload = request.payload.clone();
        self.forwarded.lock().unwrap().push(request);
        Ok(payload)
    }

    async fn bootstrap(&self, provider: &dyn DiscoverProvider) -> Result<Vec<String>, RingError> {
        self.ready.store(true, Ordering::SeqCst);
        provider.hosts().await.map_err(|e| RingError::Discovery(e.to_string()))
    }
}

/// Forwarder that records calls and answers with a canned reply.
pub struct RecordingForwarder {
    reply: Result<Bytes, fn(&str) -> RingError>,
    calls: Mutex<Vec<(String, String, Bytes)>>,
}

impl RecordingForwarder {
    pub fn replying(reply: &'static [u8]) -> Self {
        Self {
            reply: Ok(Bytes::from_static(reply)),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(error: fn(&str) -> RingError) -> Self {
        Self {
            reply: Err(error),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// `(node, key, payload)` of every call.
    pub fn calls(&self) -> Vec<(String, String, Bytes)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Forwarder for RecordingForwarder {
    async fn forward(
        &self,
        node: &str,
        key: &str,
        request: Bytes,
        _cancel: CancellationToken,
    ) -> Result<Bytes, RingError> {
        self.calls
            .lock()
            .unwrap()
            .push((node.to_string(), key.to_string(), request));
        match &self.reply {
            Ok(bytes) => Ok(bytes.clone()),
            Err(make) => Err(make(node)),
        }
    }
}

/// Forwarder that holds every call open until its token is cancelled.
#[derive(Default)]
pub struct StalledForwarder {
    token: Mutex<Option<CancellationToken>>,
}

impl StalledForwarder {
    /// Token handed to the most recent call.
    pub fn token(&self) -> Option<CancellationToken> {
        self.token.lock().unwrap().clone()
    }
}

#[async_trait]
impl Forwarder for StalledForwarder {
    async fn forward(
        &self,
        node: &str,
        _key: &str,
        _request: Bytes,
        cancel: CancellationToken,
    ) -> Result<Bytes, RingError> {
        *self.token.lock().unwrap() = Some(cancel.clone());
        cancel.cancelled().await;
        Err(RingError::Cancelled {
            node: node.to_string(),
        })
    }
}

/// Backend answering `"{name} {method} {path?query} {body}"`.
///
/// Echoes the received-by marker back in `x-echo-received-by`.
pub struct EchoBackend {
    name: String,
    calls: Mutex<usize>,
}

impl EchoBackend {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            calls: Mutex::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl Backend for EchoBackend {
    async fn serve(&self, request: Request<Body>) -> Response<Body> {
        *self.calls.lock().unwrap() += 1;

        let (parts, body) = request.into_parts();
        let body = axum::body::to_bytes(body, usize::MAX).await.unwrap();
        let target = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| "/".to_string());

        let mut builder = Response::builder().status(StatusCode::OK);
        if let Some(received_by) = parts.headers.get(HEADER_RECEIVED_BY) {
            builder = builder.header("x-echo-received-by", received_by);
        }
        builder
            .body(Body::from(format!(
                "{} {} {} {}",
                self.name,
                parts.method,
                target,
                String::from_utf8_lossy(&body)
            )))
            .unwrap()
    }
}

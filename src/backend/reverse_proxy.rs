//! Reverse proxy to a single HTTP backend.
//!
//! # Responsibilities
//! - Rewrite the request URI onto the target (scheme, authority, path prefix)
//! - Strip hop-by-hop headers in both directions
//! - Report the client address in `X-Forwarded-For`
//! - Turn transport failures into 502 and slow backends into 504

use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header::HeaderName, HeaderValue, Request, Response, StatusCode, Uri},
    response::IntoResponse,
};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use url::Url;

use crate::backend::Backend;
use crate::http::request::{request_id, ClientAddr};
use crate::http::response::strip_hop_by_hop;

const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

pub struct ReverseProxyBackend {
    target: Url,
    client: Client<HttpConnector, Body>,
    timeout: Duration,
}

impl ReverseProxyBackend {
    pub fn new(target: &str, timeout: Duration) -> Result<Self, url::ParseError> {
        let target = Url::parse(target)?;
        if !target.has_host() {
            return Err(url::ParseError::EmptyHost);
        }
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Ok(Self {
            target,
            client,
            timeout,
        })
    }

    /// URI of `uri` on the target.
    fn upstream_uri(&self, uri: &Uri) -> Result<Uri, axum::http::Error> {
        let path = join_paths(self.target.path(), uri.path());
        let query = match (self.target.query(), uri.query()) {
            (Some(a), Some(b)) if !a.is_empty() => Some(format!("{}&{}", a, b)),
            (Some(a), None) if !a.is_empty() => Some(a.to_string()),
            (_, Some(b)) => Some(b.to_string()),
            _ => None,
        };

        let authority = match self.target.port() {
            Some(port) => format!("{}:{}", self.target.host_str().unwrap_or_default(), port),
            None => self.target.host_str().unwrap_or_default().to_string(),
        };
        let path_and_query = match query {
            Some(q) => format!("{}?{}", path, q),
            None => path,
        };

        Uri::builder()
            .scheme(self.target.scheme())
            .authority(authority.as_str())
            .path_and_query(path_and_query.as_str())
            .build()
    }
}

#[async_trait]
impl Backend for ReverseProxyBackend {
    async fn serve(&self, request: Request<Body>) -> Response<Body> {
        let request_id = request_id(request.headers()).to_string();
        let (mut parts, body) = request.into_parts();

        parts.uri = match self.upstream_uri(&parts.uri) {
            Ok(uri) => uri,
            Err(e) => {
                tracing::error!(
                    request_id = %request_id,
                    error = %e,
                    "Failed to build upstream URI"
                );
                return (StatusCode::BAD_GATEWAY, "Upstream request failed").into_response();
            }
        };

        strip_hop_by_hop(&mut parts.headers);
        if let Some(ClientAddr(addr)) = parts.extensions.get::<ClientAddr>().copied() {
            append_forwarded_for(&mut parts.headers, &addr.ip().to_string());
        }

        let upstream = parts.uri.clone();
        let request = Request::from_parts(parts, body);

        match tokio::time::timeout(self.timeout, self.client.request(request)).await {
            Ok(Ok(response)) => {
                tracing::debug!(
                    request_id = %request_id,
                    upstream = %upstream,
                    status = %response.status(),
                    "Backend responded"
                );
                let (mut parts, body) = response.into_parts();
                strip_hop_by_hop(&mut parts.headers);
                Response::from_parts(parts, Body::new(body))
            }
            Ok(Err(e)) => {
                tracing::error!(
                    request_id = %request_id,
                    upstream = %upstream,
                    error = %e,
                    "Upstream error"
                );
                (StatusCode::BAD_GATEWAY, "Upstream request failed").into_response()
            }
            Err(_) => {
                tracing::error!(
                    request_id = %request_id,
                    upstream = %upstream,
                    timeout = ?self.timeout,
                    "Upstream timed out"
                );
                (StatusCode::GATEWAY_TIMEOUT, "Upstream request timed out").into_response()
            }
        }
    }
}

/// Join two paths with exactly one slash between them.
fn join_paths(base: &str, path: &str) -> String {
    match (base.ends_with('/'), path.starts_with('/')) {
        (true, true) => format!("{}{}", base, &path[1..]),
        (false, false) => format!("{}/{}", base, path),
        _ => format!("{}{}", base, path),
    }
}

fn append_forwarded_for(headers: &mut axum::http::HeaderMap, client_ip: &str) {
    let prior: Vec<&str> = headers
        .get_all(&X_FORWARDED_FOR)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .collect();

    let value = if prior.is_empty() {
        client_ip.to_string()
    } else {
        format!("{}, {}", prior.join(", "), client_ip)
    };

    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(X_FORWARDED_FOR, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderMap;

    #[test]
    fn joins_paths_with_single_slash() {
        assert_eq!(join_paths("/", "/users"), "/users");
        assert_eq!(join_paths("/api/", "/users"), "/api/users");
        assert_eq!(join_paths("/api", "users"), "/api/users");
        assert_eq!(join_paths("/api", "/users"), "/api/users");
    }

    #[test]
    fn rewrites_uri_onto_target() {
        let timeout = Duration::from_secs(1);
        let backend =
            ReverseProxyBackend::new("http://127.0.0.1:4000/base?fixed=1", timeout).unwrap();
        let uri: Uri = "/users/7?page=2".parse().unwrap();
        assert_eq!(
            backend.upstream_uri(&uri).unwrap(),
            "http://127.0.0.1:4000/base/users/7?fixed=1&page=2"
        );

        let backend = ReverseProxyBackend::new("http://127.0.0.1:4000/", timeout).unwrap();
        let uri: Uri = "/".parse().unwrap();
        assert_eq!(backend.upstream_uri(&uri).unwrap(), "http://127.0.0.1:4000/");
    }

    #[test]
    fn rejects_target_without_host() {
        assert!(ReverseProxyBackend::new("not a url", Duration::from_secs(1)).is_err());
    }

    #[test]
    fn appends_client_to_forwarded_for() {
        let mut headers = HeaderMap::new();
        append_forwarded_for(&mut headers, "127.0.0.1");
        assert_eq!(headers[&X_FORWARDED_FOR], "127.0.0.1");

        headers.insert(&X_FORWARDED_FOR, HeaderValue::from_static("203.0.113.5"));
        append_forwarded_for(&mut headers, "10.0.0.2");
        assert_eq!(headers[&X_FORWARDED_FOR], "203.0.113.5, 10.0.0.2");
    }

    #[tokio::test]
    async fn unreachable_backend_is_bad_gateway() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let backend =
            ReverseProxyBackend::new(&format!("http://{}/", addr), Duration::from_secs(2)).unwrap();
        let response = backend.serve(Request::new(Body::empty())).await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }
}

// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Throwaway HTTP upstreams on loopback.

use axum::{
    body::{Body, Bytes},
    http::{header::CONTENT_TYPE, HeaderMap, Method, Uri},
    response::Response,
    Router,
};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

/// A request the stub received.
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl CapturedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap()
    }
}

/// Canned answer for requests whose method matches and whose path and
/// query contain `needle`.
#[derive(Debug, Clone)]
pub struct Route {
    pub method: Method,
    pub needle: &'static str,
    pub status: u16,
    pub body: serde_json::Value,
}

impl Route {
    pub fn new(method: &str, needle: &'static str, status: u16, body: serde_json::Value) -> Self {
        Self {
            method: method.parse().unwrap(),
            needle,
            status,
            body,
        }
    }

    fn matches(&self, method: &Method, uri: &Uri) -> bool {
        let target = uri.path_and_query().map_or(uri.path(), |pq| pq.as_str());
        self.method == *method && target.contains(self.needle)
    }
}

/// Upstream answering every request with one canned response.
pub struct Stub {
    pub addr: SocketAddr,
    requests: Arc<Mutex<Vec<CapturedRequest>>>,
}

impl Stub {
    pub async fn start(status: u16, content_type: Option<&'static str>, body: &str) -> Self {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let captured = requests.clone();
        let body = body.to_string();

        let app = Router::new().fallback(
            move |method: Method, uri: Uri, headers: HeaderMap, payload: Bytes| {
                let captured = captured.clone();
                let body = body.clone();
                async move {
                    captured.lock().unwrap().push(CapturedRequest {
                        method,
                        uri,
                        headers,
                        body: payload,
                    });
                    let mut response = Response::builder().status(status);
                    if let Some(content_type) = content_type {
                        response = response.header(CONTENT_TYPE, content_type);
                    }
                    response.body(Body::from(body)).unwrap()
                }
            },
        );

        let addr = serve(app).await;
        Self { addr, requests }
    }

    pub async fn json(status: u16, body: serde_json::Value) -> Self {
        Self::start(status, Some("application/json"), &body.to_string()).await
    }

    /// Upstream answering from the first matching route; 404 otherwise.
    pub async fn routed(routes: Vec<Route>) -> Self {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let captured = requests.clone();
        let routes = Arc::new(routes);

        let app = Router::new().fallback(
            move |method: Method, uri: Uri, headers: HeaderMap, payload: Bytes| {
                let captured = captured.clone();
                let routes = routes.clone();
                async move {
                    let (status, body) = routes
                        .iter()
                        .find(|route| route.matches(&method, &uri))
                        .map_or((404, serde_json::json!({ "message": "no route" })), |route| {
                            (route.status, route.body.clone())
                        });
                    captured.lock().unwrap().push(CapturedRequest {
                        method,
                        uri,
                        headers,
                        body: payload,
                    });
                    Response::builder()
                        .status(status)
                        .header(CONTENT_TYPE, "application/json")
                        .body(Body::from(body.to_string()))
                        .unwrap()
                }
            },
        );

        let addr = serve(app).await;
        Self { addr, requests }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn requests(&self) -> Vec<CapturedRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Requests with `method` whose path is exactly `path`.
    pub fn requests_to(&self, method: &str, path: &str) -> Vec<CapturedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.method.as_str() == method && r.uri.path() == path)
            .collect()
    }

    pub fn only_request(&self) -> CapturedRequest {
        let requests = self.requests();
        assert_eq!(requests.len(), 1, "expected exactly one request");
        requests.into_iter().next().unwrap()
    }
}

/// Serve `app` on an ephemeral loopback port.
pub async fn serve(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// An address nothing listens on.
pub async fn closed_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

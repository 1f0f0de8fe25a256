//! Scrape Server
//!
//! Minimal HTTP/1 server exposing a [`MetricSet`] at `/metrics`, plus
//! liveness endpoints. Reads never block writers: gauges are encoded from
//! whatever values are current at scrape time.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::metrics::MetricSet;

/// Bound scrape server, ready to serve.
pub struct MetricsServer {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl MetricsServer {
    /// Bind the listening socket. Failure here is a startup error.
    pub async fn bind(addr: SocketAddr) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| Error::Server(format!("Failed to bind metrics server on {}: {}", addr, e)))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| Error::Server(format!("Failed to read bound address: {}", e)))?;

        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Address actually bound (resolves port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept connections until `shutdown` is cancelled.
    pub async fn serve(self, metrics: Arc<MetricSet>, shutdown: CancellationToken) -> Result<()> {
        info!("Metrics server listening on {}", self.local_addr);

        loop {
            let (stream, peer) = tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Metrics server shutting down");
                    return Ok(());
                }
                accepted = self.listener.accept() => match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!("Metrics server accept error: {}", e);
                        continue;
                    }
                },
            };

            debug!(%peer, "Accepted scrape connection");
            let io = TokioIo::new(stream);
            let metrics = Arc::clone(&metrics);

            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let metrics = Arc::clone(&metrics);
                    async move { Ok::<_, Infallible>(handle(&metrics, &req)) }
                });

                if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                    error!("Metrics server connection error: {}", e);
                }
            });
        }
    }
}

impl std::fmt::Debug for MetricsServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsServer")
            .field("local_addr", &self.local_addr)
            .finish()
    }
}

fn handle<B>(metrics: &MetricSet, req: &Request<B>) -> Response<Full<Bytes>> {
    if req.method() != Method::GET && req.method() != Method::HEAD {
        return text(StatusCode::METHOD_NOT_ALLOWED, "method not allowed");
    }

    match req.uri().path() {
        "/metrics" => match metrics.encode_text() {
            Ok(buffer) => {
                let mut response = Response::new(Full::new(Bytes::from(buffer)));
                response
                    .headers_mut()
                    .insert(CONTENT_TYPE, HeaderValue::from_static(prometheus::TEXT_FORMAT));
                response
            }
            Err(e) => {
                error!("Failed to encode metrics: {}", e);
                text(StatusCode::INTERNAL_SERVER_ERROR, "failed to encode metrics")
            }
        },
        "/healthz" | "/livez" | "/readyz" => text(StatusCode::OK, "ok"),
        _ => text(StatusCode::NOT_FOUND, "not found"),
    }
}

fn text(status: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from_static(body.as_bytes())));
    *response.status_mut() = status;
    response
}

//! Request outcome logging
//!
//! Every request is logged once its response is ready, with the caller address,
//! status and latency. The level follows the status class so the daily log file
//! separates routine traffic from client mistakes and server failures.

use axum::{
    body::Body,
    http::{Request, Response},
};
use futures::future::BoxFuture;
use std::{
    task::{Context, Poll},
    time::Instant,
};
use tower::{Layer, Service};

use super::extract::client_ip;

/// Layer for HTTP request logging
#[derive(Clone, Default)]
pub struct RequestLoggingLayer;

impl<S> Layer<S> for RequestLoggingLayer {
    type Service = RequestLoggingMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestLoggingMiddleware { inner }
    }
}

/// Middleware service for HTTP request logging
#[derive(Clone)]
pub struct RequestLoggingMiddleware<S> {
    inner: S,
}

impl<S, ResBody> Service<Request<Body>> for RequestLoggingMiddleware<S>
where
    S: Service<Request<Body>, Response = Response<ResBody>> + Send + Clone + 'static,
    S::Future: Send + 'static,
    ResBody: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        // Take the instance that was driven to readiness, leave a fresh clone behind
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let method = request.method().to_string();
            let path = request.uri().path().to_string();
            let ip = client_ip(request.headers(), request.extensions());
            let started = Instant::now();

            let response = inner.call(request).await?;

            let status = response.status();
            let elapsed_ms = started.elapsed().as_millis();
            if status.is_server_error() {
                tracing::error!("{} {} from {} -> {} ({}ms)", method, path, ip, status.as_u16(), elapsed_ms);
            } else if status.is_client_error() {
                tracing::warn!("{} {} from {} -> {} ({}ms)", method, path, ip, status.as_u16(), elapsed_ms);
            } else {
                tracing::info!("{} {} from {} -> {} ({}ms)", method, path, ip, status.as_u16(), elapsed_ms);
            }

            Ok(response)
        })
    }
}

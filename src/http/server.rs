//! HTTP server implementation.

use axum::{middleware, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

use super::middleware::{access_log_middleware, rate_limit_middleware, RateLimitState};
use crate::config::ServerConfig;
use crate::error::{Result, SlidegateError};
use crate::ratelimit::RateLimiter;

/// HTTP server that fronts an application router with the middleware stack.
pub struct HttpServer {
    /// Address to bind to
    addr: SocketAddr,
    /// Rate limiting middleware state
    state: RateLimitState,
}

impl HttpServer {
    /// Create a new HTTP server.
    pub fn new(config: &ServerConfig, rate_limiter: Arc<RateLimiter>) -> Self {
        Self {
            addr: config.http_addr,
            state: RateLimitState::new(rate_limiter, config),
        }
    }

    /// Address the server binds to.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Wrap `app` in access logging (outermost) and rate limiting.
    pub fn router(&self, app: Router) -> Router {
        app.layer(middleware::from_fn_with_state(
            self.state.clone(),
            rate_limit_middleware,
        ))
        .layer(middleware::from_fn(access_log_middleware))
    }

    /// Start the HTTP server with graceful shutdown.
    ///
    /// The server will shut down when the provided signal resolves.
    pub async fn serve_with_shutdown<F>(self, app: Router, signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.addr).await?;
        let local_addr = listener.local_addr()?;

        info!(addr = %local_addr, "Starting HTTP server");

        let app = self.router(app);
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(signal)
        .await
        .map_err(|e| {
            error!(error = %e, "HTTP server failed");
            SlidegateError::Server(e.to_string())
        })
    }
}

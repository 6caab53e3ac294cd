//! Request middleware: rate limiting and access logging.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::{ServerConfig, UnresolvedClientPolicy};
use crate::ratelimit::{ClientId, Decision, RateLimiter, FORWARDED_FOR_HEADER};

/// Body message returned with every 429 response.
pub const RATE_LIMIT_MESSAGE: &str = "Rate limit exceeded. Try again later.";

/// Body message returned when the client address cannot be determined.
pub const UNRESOLVED_CLIENT_MESSAGE: &str = "Unable to determine client address.";

/// State shared by every invocation of [`rate_limit_middleware`].
#[derive(Clone)]
pub struct RateLimitState {
    /// The rate limiter instance
    pub limiter: Arc<RateLimiter>,
    /// Honour `X-Forwarded-For` when resolving the client
    pub trust_forwarded_header: bool,
    /// Handling of requests with no resolvable client
    pub unresolved_client: UnresolvedClientPolicy,
}

impl RateLimitState {
    /// Create middleware state from a limiter and the server settings.
    pub fn new(limiter: Arc<RateLimiter>, server: &ServerConfig) -> Self {
        Self {
            limiter,
            trust_forwarded_header: server.trust_forwarded_header,
            unresolved_client: server.unresolved_client,
        }
    }

    /// Resolve the client a request is accounted to.
    fn resolve_client(&self, request: &Request) -> Option<ClientId> {
        // Non-ASCII bytes are kept (lossily) so the header still names the client
        let forwarded_for = self
            .trust_forwarded_header
            .then(|| request.headers().get(FORWARDED_FOR_HEADER))
            .flatten()
            .map(|value| String::from_utf8_lossy(value.as_bytes()));

        let peer = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);

        ClientId::resolve(forwarded_for.as_deref(), peer)
    }
}

/// Admit or reject a request according to its client's recent history.
pub async fn rate_limit_middleware(
    State(state): State<RateLimitState>,
    request: Request,
    next: Next,
) -> Response {
    let client = match state.resolve_client(&request) {
        Some(client) => client,
        None => match state.unresolved_client {
            UnresolvedClientPolicy::Shared => ClientId::unknown(),
            UnresolvedClientPolicy::Reject => {
                warn!("Rejecting request with no resolvable client address");
                return error_response(StatusCode::BAD_REQUEST, UNRESOLVED_CLIENT_MESSAGE);
            }
        },
    };

    match state.limiter.check(&client) {
        Decision::Allow => {
            debug!(client = %client, "Request within rate limit");
            next.run(request).await
        }
        Decision::Reject => {
            warn!(client = %client, "Rate limit exceeded");
            error_response(StatusCode::TOO_MANY_REQUESTS, RATE_LIMIT_MESSAGE)
        }
    }
}

/// Log each request on arrival and once its response is ready.
pub async fn access_log_middleware(request: Request, next: Next) -> Response {
    let span = info_span!(
        "request",
        request_id = %Uuid::new_v4(),
        method = %request.method(),
        path = %request.uri().path(),
    );

    async move {
        info!("Request received");
        let start = Instant::now();

        let response = next.run(request).await;

        info!(
            status = response.status().as_u16(),
            elapsed = %format!("{:.2}s", start.elapsed().as_secs_f64()),
            "Request completed"
        );
        response
    }
    .instrument(span)
    .await
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RateLimitingConfig;
    use axum::{
        body::Body,
        http::{header, HeaderValue, Request as HttpRequest},
        middleware,
        routing::get,
        Router,
    };
    use tower::ServiceExt;

    fn app(max_requests: usize, server: ServerConfig) -> (Router, Arc<RateLimiter>) {
        let config = RateLimitingConfig {
            max_requests,
            ..RateLimitingConfig::default()
        };
        let limiter = Arc::new(RateLimiter::new(&config));
        let state = RateLimitState::new(Arc::clone(&limiter), &server);

        let router = Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(middleware::from_fn_with_state(state, rate_limit_middleware))
            .layer(middleware::from_fn(access_log_middleware));

        (router, limiter)
    }

    fn forwarded_request(forwarded_for: &str) -> Request {
        HttpRequest::builder()
            .uri("/")
            .header(FORWARDED_FOR_HEADER, forwarded_for)
            .body(Body::empty())
            .unwrap()
    }

    fn peer_request(peer: &str) -> Request {
        let mut request = HttpRequest::builder().uri("/").body(Body::empty()).unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo::<SocketAddr>(peer.parse().unwrap()));
        request
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_allows_then_rejects_with_429() {
        let (app, _) = app(2, ServerConfig::default());

        for _ in 0..2 {
            let response = app.clone().oneshot(forwarded_request("9.9.9.9")).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = app.clone().oneshot(forwarded_request("9.9.9.9")).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/json"
        );
        assert_eq!(
            body_json(response).await,
            json!({ "error": "Rate limit exceeded. Try again later." })
        );
    }

    #[tokio::test]
    async fn test_forwarded_header_keys_on_first_entry() {
        let (app, limiter) = app(5, ServerConfig::default());

        app.clone()
            .oneshot(forwarded_request("9.9.9.9, 10.0.0.1"))
            .await
            .unwrap();

        assert_eq!(limiter.visit_count(&ClientId::new("9.9.9.9")), Some(1));
        assert_eq!(limiter.visit_count(&ClientId::new("10.0.0.1")), None);
    }

    #[tokio::test]
    async fn test_forwarded_header_with_non_ascii_bytes() {
        let (app, limiter) = app(5, ServerConfig::default());

        let mut request = peer_request("10.0.0.7:1");
        request.headers_mut().insert(
            FORWARDED_FOR_HEADER,
            HeaderValue::from_bytes(b"9.9.9.\xe9, 1.1.1.1").unwrap(),
        );
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(limiter.visit_count(&ClientId::new("9.9.9.\u{fffd}")), Some(1));
        assert_eq!(limiter.visit_count(&ClientId::new("10.0.0.7")), None);
        assert_eq!(limiter.client_count(), 1);
    }

    #[tokio::test]
    async fn test_peer_address_used_without_header() {
        let (app, limiter) = app(1, ServerConfig::default());

        let response = app.clone().oneshot(peer_request("127.0.0.1:50000")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        // Same IP, different port: same client
        let response = app.clone().oneshot(peer_request("127.0.0.1:50001")).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

        assert_eq!(limiter.visit_count(&ClientId::new("127.0.0.1")), Some(1));
    }

    #[tokio::test]
    async fn test_clients_limited_independently() {
        let (app, _) = app(1, ServerConfig::default());

        let first = app.clone().oneshot(forwarded_request("1.1.1.1")).await.unwrap();
        let over = app.clone().oneshot(forwarded_request("1.1.1.1")).await.unwrap();
        let other = app.clone().oneshot(forwarded_request("2.2.2.2")).await.unwrap();

        assert_eq!(first.status(), StatusCode::OK);
        assert_eq!(over.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(other.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_untrusted_forwarded_header_ignored() {
        let server = ServerConfig {
            trust_forwarded_header: false,
            ..ServerConfig::default()
        };
        let (app, limiter) = app(5, server);

        let mut request = peer_request("10.1.1.1:4000");
        request
            .headers_mut()
            .insert(FORWARDED_FOR_HEADER, "9.9.9.9".parse().unwrap());
        app.oneshot(request).await.unwrap();

        assert_eq!(limiter.visit_count(&ClientId::new("10.1.1.1")), Some(1));
        assert_eq!(limiter.visit_count(&ClientId::new("9.9.9.9")), None);
    }

    #[tokio::test]
    async fn test_unresolved_clients_share_bucket() {
        let (app, limiter) = app(1, ServerConfig::default());
        let bare = || HttpRequest::builder().uri("/").body(Body::empty()).unwrap();

        let first = app.clone().oneshot(bare()).await.unwrap();
        let second = app.clone().oneshot(bare()).await.unwrap();

        assert_eq!(first.status(), StatusCode::OK);
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(limiter.visit_count(&ClientId::unknown()), Some(1));
    }

    #[tokio::test]
    async fn test_unresolved_clients_rejected_by_policy() {
        let server = ServerConfig {
            unresolved_client: UnresolvedClientPolicy::Reject,
            ..ServerConfig::default()
        };
        let (app, limiter) = app(5, server);

        let request = HttpRequest::builder().uri("/").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await,
            json!({ "error": UNRESOLVED_CLIENT_MESSAGE })
        );
        assert_eq!(limiter.client_count(), 0);
    }
}

//! HTTP front end: middleware, routes and server.

mod middleware;
mod routes;
mod server;

pub use middleware::{
    access_log_middleware, rate_limit_middleware, RateLimitState, RATE_LIMIT_MESSAGE,
    UNRESOLVED_CLIENT_MESSAGE,
};
pub use routes::default_routes;
pub use server::HttpServer;

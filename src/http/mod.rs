//! HTTP layer: agent API, health and the spectator socket

pub mod middleware;
pub mod routes;

pub use routes::build_router;

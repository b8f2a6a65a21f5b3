//! HTTP boundary: governance middleware, admin routes and the server.

mod admin;
mod middleware;
mod routes;
mod server;

pub use admin::{admin_router, GovernanceStatus, MaintenanceStatus, MaintenanceUpdate};
pub use middleware::{describe, governance_middleware};
pub use routes::router;
pub use server::{serve_listener, HttpServer};

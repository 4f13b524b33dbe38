//! API server and routes

pub mod auth;
pub mod middleware;
pub mod routes;
mod server;
pub mod types;

pub use auth::{AuthState, AuthUser};
pub use routes::ReportsApiState;
pub use server::{ApiServer, build_router};

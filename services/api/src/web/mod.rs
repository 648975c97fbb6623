pub mod middleware;
pub mod rest;
pub mod router;
pub mod state;

pub use middleware::require_session;
pub use router::build_router;

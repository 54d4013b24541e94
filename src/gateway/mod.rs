//! HTTP server, router, and the authenticated registry proxy.

pub mod router;
pub mod server;

pub use router::{AppState, create_router};
pub use server::Portal;

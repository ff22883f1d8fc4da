//! REST API layer: error mapping, shared context, routes and the
//! server lifecycle.

pub mod endpoints;
pub mod error;
pub mod router;
pub mod server;
pub mod types;

pub use server::{start_server, ApiServer};

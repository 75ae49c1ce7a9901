//! HTTP surface: auth endpoints, bearer middleware, and the proxy forwarder.

pub mod auth;
pub mod forward;
pub mod router;
pub mod server;

pub use server::Gateway;

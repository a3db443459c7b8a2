//! HTTP bootstrap: request pipeline, routing, and the listener.

pub mod app;
pub mod authz;
pub mod context;
pub mod errors;
pub mod middleware;
pub mod routes;
pub mod server;

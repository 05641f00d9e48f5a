//! Credits API library
//!
//! Exposes the handlers, routes and middleware for the binary and the
//! integration tests.

pub mod handlers;
pub mod middleware;
pub mod models;
pub mod openapi;
pub mod routes;

// Library exports for Graphicgram.
// Integration tests and the client library build on these modules.

pub mod auth;
pub mod client;
pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod maintenance;
pub mod routes;
pub mod state;
pub mod text;
pub mod validation;

// Library exports for linkshelf
// This allows integration tests and the binary to share the same modules

pub mod auth;
pub mod config;
pub mod db;
pub mod enrichment;
pub mod error;
pub mod extractors;
pub mod feed;
pub mod metadata;
pub mod routes;
pub mod state;

//! natours: a tours, users and reviews REST API over an in-memory document
//! store.
//!
//! The store (`engine`, `collection`, `query`, `aggregate`) knows nothing about
//! HTTP. Models (`model`, `schema`) describe each collection; `database` runs
//! every read and write through them, applying the visibility predicate and
//! the persist stages. `factory`, `tours`, `users` and `auth` hold the handler
//! logic, and `http` wires it to axum.

pub mod aggregate;
pub mod auth;
pub mod collection;
pub mod config;
pub mod database;
pub mod document;
pub mod engine;
pub mod errors;
pub mod factory;
pub mod http;
pub mod logger;
pub mod model;
pub mod ndjson;
pub mod query;
pub mod ratings;
pub mod schema;
pub mod telemetry;
pub mod tours;
pub mod types;
pub mod users;
pub mod visibility;

pub use database::Database;
pub use errors::AppError;

//! Routing configuration.
//!
//! Routing config is structured data validated against an embedded JSON
//! Schema, then checked semantically. Errors surface at load time.

mod parser;
mod schema;

pub use parser::{ConfigError, RoutingConfig};
pub use schema::validate_routing_schema;

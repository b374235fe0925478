//! Flow run API contract types and validation
//!
//! This crate defines the wire types exchanged with the remote flow
//! execution service and with callers of the `/generate` endpoint. These
//! types are shared between the REST client, the CLI and the server.

pub mod error;
pub mod types;
pub mod validation;

pub use error::*;
pub use types::*;

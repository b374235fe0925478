//! HTTP front end that answers prompts by running the configured flow

pub mod http;
pub mod service;
pub mod sse;

pub use service::{ApiError, AppState};

//! Small shared helpers.

pub mod http_client;
pub mod text;

pub use text::{redact_token, truncate_string};

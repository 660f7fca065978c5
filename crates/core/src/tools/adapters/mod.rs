//! Verifier transport adapters.

mod command;
mod http;

pub use command::CommandVerifier;
pub use http::HttpVerifier;

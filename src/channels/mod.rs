//! Transports that feed the router and carry its speech events.

pub mod channel;
pub mod cli;
pub mod http;

pub use channel::*;
pub use cli::CliChannel;
pub use http::http_routes;

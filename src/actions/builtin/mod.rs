//! Built-in action handlers: local command, remote HTTP, and Home Assistant.

pub mod command;
pub mod home_assistant;
pub mod remote_http;

pub use command::CommandHandler;
pub use home_assistant::HomeAssistantHandler;
pub use remote_http::RemoteHttpHandler;

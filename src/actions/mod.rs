//! Action discovery and the handlers that carry actions out.

pub mod builtin;
pub mod catalog;
pub mod environment;
pub mod handler;
pub mod http;
pub mod registry;

pub use catalog::{FactoryResult, HandlerCatalog, HandlerFactory, HandlerReference};
pub use environment::ActionEnvironment;
pub use handler::{HandlerResponse, HandlerSettings, IntentHandler};
pub use registry::{Action, ActionRegistry};

//! Tool system: handler trait, registry, and concrete handlers.

pub mod base;
pub mod handlers;
pub mod registry;

pub use base::{ToolHandler, ToolInvocation, ToolOutput};
pub use registry::ToolRegistry;

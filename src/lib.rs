//! # ro-agent-core
//!
//! A tool-using LLM agent runtime for OpenAI-compatible chat-completions
//! servers (LM Studio, Ollama, llama.cpp, vLLM, and hosted OpenAI-compatible
//! providers). The runtime streams a model's response, executes any tool
//! calls it requests against a capability-scoped [`tools::ToolRegistry`],
//! and loops back with results until the model produces a final answer.
//!
//! ## Key pieces
//!
//! - [`agent::Agent`] — the turn loop: stream, dispatch tools, auto-compact,
//!   cancel.
//! - [`session::Session`] — conversation history and token bookkeeping.
//! - [`client::ModelClient`] — streaming + non-streaming chat-completions
//!   client.
//! - [`capability`] — [`capability::CapabilityProfile`], approval policy,
//!   and the [`capability::factory::ToolFactory`] that assembles a registry
//!   from a profile.
//! - [`tools`] — the [`tools::ToolHandler`] trait and the concrete
//!   filesystem/shell/database handlers.
//! - [`observability`] — per-session/turn/tool-execution telemetry, fanned
//!   out through an [`observability::exporter::Exporter`].
//! - [`eval`] — a harness for running the agent against DBBench/OS-style
//!   benchmark tasks with incremental, resumable persistence.
//!
//! ## Example
//!
//! ```rust,no_run
//! use ro_agent_core::{Agent, ModelClient, Session, ToolRegistry};
//!
//! #[tokio::main]
//! async fn main() -> ro_agent_core::Result<()> {
//!     let client = ModelClient::new("qwen2.5-32b-instruct", "http://localhost:1234/v1", "", None)?;
//!     let session = Session::new("You are a helpful assistant.");
//!     let mut agent = Agent::new(session, ToolRegistry::new(), client);
//!
//!     for event in agent.run_turn("What's 2+2?").await {
//!         println!("{event:?}");
//!     }
//!     Ok(())
//! }
//! ```

pub mod agent;
pub mod capability;
pub mod cli;
pub mod client;
pub mod config;
pub mod context;
pub mod conversations;
pub mod error;
pub mod eval;
pub mod observability;
pub mod retry;
pub mod session;
pub mod signals;
pub mod tools;
pub mod types;
mod utils;

// --- Agent loop ---

pub use agent::{Agent, AgentEvent, ApprovalCallback, CompactResult, CompactTrigger, TurnUsage};

// --- Model client ---

pub use client::{ModelClient, Prompt, StreamEvent, ToolCall, Usage};

// --- Session / conversation state ---

pub use session::{Session, ToolResult};

// --- Capability / approval ---

pub use capability::approval::ApprovalPolicy;
pub use capability::factory::ToolFactory;
pub use capability::{ApprovalMode, CapabilityProfile, DatabaseMode, FileWriteMode, ShellMode};

// --- Tool system ---

pub use tools::{ToolHandler, ToolInvocation, ToolOutput, ToolRegistry};

// --- Observability ---

pub use observability::context::{TelemetryContext, ToolExecutionContext, TurnContext};
pub use observability::exporter::{create_exporter, Exporter};
pub use observability::processor::ObservabilityProcessor;
pub use observability::ObservabilityConfig;

// --- CLI surface ---

pub use cli::CliArgs;

// --- Eval harness ---

pub use eval::harness::EvalHarness;
pub use eval::{EvalConfig, EvalMetrics, TaskResult, TaskStatus};

// --- Persistence ---

pub use conversations::{Conversation, ConversationMetadata, ConversationStore};
pub use signals::{AgentInfo, SignalManager};

// --- Context management ---

pub use context::{estimate_tokens, is_approaching_limit, truncate_messages};

// --- Error handling ---

pub use error::{Error, Result};

// --- Core types ---

pub use types::{FunctionCall, Message, MessageRole, ToolCallRequest};

/// Convenience re-exports for the most commonly used types and functions.
///
/// ```rust,no_run
/// use ro_agent_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        Agent, AgentEvent, CapabilityProfile, Error, Message, MessageRole, ModelClient, Result, Session, ToolHandler,
        ToolOutput, ToolRegistry,
    };
}

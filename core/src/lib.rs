//! Agent side of the gateway: settings, the pipeline descriptor, the runtime
//! seam with its OpenAI-backed implementation, and the adapter the HTTP layer
//! calls.

pub mod adapter;
pub mod config;
pub mod error;
pub mod llm;
pub mod pipeline;
pub mod runtime;

pub use adapter::{AgentAdapter, FRAGMENT_SEPARATOR, NO_TEXT_RESPONSE};
pub use config::{AgentSettings, Settings};
pub use error::AgentError;
pub use llm::OpenAiRuntime;
pub use pipeline::{AgentSpec, Pipeline};
pub use runtime::{AgentEvent, AgentRuntime, EventStream, ToolCall};

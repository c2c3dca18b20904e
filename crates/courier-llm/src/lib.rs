//! # courier-llm
//!
//! The reply oracle: turns a user message plus recent channel history into
//! reply text. Backed by the Anthropic or OpenAI HTTP APIs, or by a mock.

pub mod anthropic;
pub mod mock;
pub mod openai;
pub mod oracle;

pub use anthropic::AnthropicOracle;
pub use mock::MockOracle;
pub use openai::OpenAiOracle;
pub use oracle::{OracleSettings, ReplyOracle, from_config, truncate_reply};

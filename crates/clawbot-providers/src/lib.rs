//! Model providers for Clawbot.
//!
//! - [`traits::ModelClient`] — what the conversation loop calls
//! - [`anthropic::AnthropicClient`] — Anthropic Messages API over `reqwest`

pub mod anthropic;
pub mod traits;

pub use anthropic::AnthropicClient;
pub use traits::{ModelClient, ModelRequestConfig};

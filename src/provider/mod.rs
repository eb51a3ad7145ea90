//! Chat-completion providers.
//!
//! Everything here speaks the OpenAI-compatible wire format (Groq by
//! default), streamed over Server-Sent Events or as a single JSON reply.

mod api_provider;
mod client;
mod error;
mod http;
mod openai_compat;
mod types;

pub use api_provider::Provider;
pub use client::{Client, Connect, Endpoint, LlmApi};
pub use error::{Error, format_api_error};
pub use types::*;

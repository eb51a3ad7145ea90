//! Transport under the chat client: authenticated POSTs and SSE framing.

mod client;
mod sse;

pub use client::{AuthConfig, HttpClient};
pub use sse::{SseFrame, SseParser};

//! Groq, OpenAI, OpenRouter and Ollama all speak `/chat/completions`.
//! `quirks` records where they differ.

mod client;
mod quirks;
mod request;
mod response;

pub use client::OpenAICompatClient;

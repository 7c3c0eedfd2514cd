//! LLM client module for the hosted chat-completion endpoint.

mod client;

pub use client::{LlmClient, select_model};

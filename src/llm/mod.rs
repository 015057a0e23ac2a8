//! LLM answer generation.

pub mod client;

pub use client::{LlmAnswer, LlmClient, build_prompt, parse_response_content};

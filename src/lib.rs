//! Client for the CablyAI inference API.
//!
//! Chat completions, image generation, audio transcription and speech, and
//! moderation over one authenticated HTTP endpoint, plus a tool-augmented
//! completion loop that lets the model call local tools (`search`, `fetch`)
//! until it produces a final answer.

pub mod agent;
pub mod client;
pub mod config;
pub mod error;
pub mod tools;
pub mod types;

pub use agent::{Conversation, LoopOptions, ToolLoop};
pub use client::CablyClient;
pub use error::{Error, Result};

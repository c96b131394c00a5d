//! Tool-augmented chat completion.

pub mod conversation;
pub mod loop_;

pub use conversation::Conversation;
pub use loop_::{LoopOptions, LoopState, ToolLoop};

//! Chat module - assistant conversation history.

mod chat_model;

pub use chat_model::{Message, Role};

//! 对话记忆
//!
//! Message/Role 为对话的基本单元；ThreadStore 按 thread_id 维护进程级的多轮历史。

pub mod thread;

pub use thread::{Message, Role, ThreadStore};

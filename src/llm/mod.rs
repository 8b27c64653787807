//! LLM 客户端抽象
//!
//! 后端（通义千问 / Mock）实现 LlmClient：complete（非流式）、complete_stream（流式 Token）。
//! Agent 运行时只依赖该 trait，实际推理服务在组合根注入。

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;

use crate::memory::Message;

pub mod mock;
pub mod qwen;

pub use mock::{MockLlmClient, MockScript};
pub use qwen::QwenClient;

/// 单个 Token 流：Ok 为增量文本，Err 表示流中断
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String, String>> + Send>>;

/// LLM 客户端 trait：非流式完成与流式完成（返回 Token 流）
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 非流式完成
    async fn complete(&self, messages: &[Message]) -> Result<String, String>;

    /// 流式完成，返回 Token 流
    async fn complete_stream(&self, messages: &[Message]) -> Result<TokenStream, String>;
}

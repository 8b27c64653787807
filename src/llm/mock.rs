//! Mock LLM 客户端（用于测试，无需 API）
//!
//! 按脚本顺序返回预设输出；流式时把文本切成小段 Token，
//! StreamError 脚本项先产出若干 Token 再以 Err 中断，用于模拟生产者中途失败。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use futures_util::stream;

use crate::llm::{LlmClient, TokenStream};
use crate::memory::Message;

/// 流式时每个 Token 的字符数
const MOCK_TOKEN_CHARS: usize = 4;

/// 一次 LLM 调用的脚本
#[derive(Debug, Clone)]
pub enum MockScript {
    /// 正常返回该文本
    Reply(String),
    /// 产出若干 Token 后流中断
    StreamError { tokens: Vec<String>, error: String },
}

/// Mock 客户端：顺序消费脚本，耗尽后返回错误
#[derive(Debug, Default)]
pub struct MockLlmClient {
    script: Mutex<VecDeque<MockScript>>,
}

impl MockLlmClient {
    pub fn new(turns: Vec<MockScript>) -> Self {
        Self {
            script: Mutex::new(turns.into()),
        }
    }

    /// 便捷构造：每项为一次正常回复
    pub fn replies(texts: &[&str]) -> Self {
        Self::new(texts.iter().map(|t| MockScript::Reply(t.to_string())).collect())
    }

    fn next_turn(&self) -> Result<MockScript, String> {
        self.script
            .lock()
            .expect("mock script lock")
            .pop_front()
            .ok_or_else(|| "Mock 脚本已耗尽".to_string())
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, _messages: &[Message]) -> Result<String, String> {
        match self.next_turn()? {
            MockScript::Reply(text) => Ok(text),
            MockScript::StreamError { error, .. } => Err(error),
        }
    }

    async fn complete_stream(&self, _messages: &[Message]) -> Result<TokenStream, String> {
        match self.next_turn()? {
            MockScript::Reply(text) => {
                let tokens: Vec<Result<String, String>> = text
                    .chars()
                    .collect::<Vec<_>>()
                    .chunks(MOCK_TOKEN_CHARS)
                    .map(|c| Ok(c.iter().collect()))
                    .collect();
                Ok(Box::pin(stream::iter(tokens)))
            }
            MockScript::StreamError { tokens, error } => {
                let items: Vec<Result<String, String>> = tokens
                    .into_iter()
                    .map(Ok)
                    .chain(std::iter::once(Err(error)))
                    .collect();
                Ok(Box::pin(stream::iter(items)))
            }
        }
    }
}

//! 通义千问客户端（DashScope OpenAI 兼容模式）
//!
//! 通过 async_openai 调用 DashScope 兼容端点；base_url 可配置，亦可指向任意 OpenAI 兼容服务。

use async_openai::config::OpenAIConfig;
use async_openai::types::chat::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs,
};
use async_openai::Client;
use async_trait::async_trait;
use futures_util::StreamExt;

use crate::config::LlmSection;
use crate::llm::{LlmClient, TokenStream};
use crate::memory::{Message, Role};

/// DashScope 兼容模式端点
pub const DASHSCOPE_BASE_URL: &str = "https://dashscope.aliyuncs.com/compatible-mode/v1";

/// 通义千问客户端：持有 Client 与 model 名
pub struct QwenClient {
    client: Client<OpenAIConfig>,
    model: String,
}

impl QwenClient {
    pub fn new(base_url: Option<&str>, model: &str, api_key: Option<&str>) -> Self {
        let api_key = api_key
            .map(String::from)
            .or_else(|| std::env::var("DASHSCOPE_API_KEY").ok())
            .unwrap_or_else(|| "sk-placeholder".to_string());

        let config = OpenAIConfig::new()
            .with_api_base(base_url.unwrap_or(DASHSCOPE_BASE_URL))
            .with_api_key(api_key);

        Self {
            client: Client::with_config(config),
            model: model.to_string(),
        }
    }

    /// 按 [llm] 配置段创建：api key 从配置指定的环境变量读取
    pub fn from_config(cfg: &LlmSection) -> Self {
        let api_key = std::env::var(&cfg.api_key_env).ok();
        Self::new(cfg.base_url.as_deref(), &cfg.model, api_key.as_deref())
    }

    fn to_api_messages(&self, messages: &[Message]) -> Vec<ChatCompletionRequestMessage> {
        messages
            .iter()
            .map(|m| match m.role {
                Role::System => ChatCompletionRequestMessage::System(
                    ChatCompletionRequestSystemMessageArgs::default()
                        .content(m.content.clone())
                        .build()
                        .unwrap(),
                ),
                Role::Assistant => ChatCompletionRequestMessage::Assistant(
                    ChatCompletionRequestAssistantMessageArgs::default()
                        .content(m.content.clone())
                        .build()
                        .unwrap(),
                ),
                // 兼容端点没有独立的工具协议，观察结果以 user 消息形式回传
                Role::User | Role::Tool => ChatCompletionRequestMessage::User(
                    ChatCompletionRequestUserMessageArgs::default()
                        .content(m.content.clone())
                        .build()
                        .unwrap(),
                ),
            })
            .collect()
    }
}

#[async_trait]
impl LlmClient for QwenClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, String> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(self.to_api_messages(messages))
            .build()
            .map_err(|e| e.to_string())?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| e.to_string())?;

        let content = response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default();

        Ok(content)
    }

    async fn complete_stream(&self, messages: &[Message]) -> Result<TokenStream, String> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(self.to_api_messages(messages))
            .stream(true)
            .build()
            .map_err(|e| e.to_string())?;

        let stream = self
            .client
            .chat()
            .create_stream(request)
            .await
            .map_err(|e| e.to_string())?;

        let tokens = stream.map(|item| match item {
            Ok(chunk) => Ok(chunk
                .choices
                .first()
                .and_then(|c| c.delta.content.clone())
                .unwrap_or_default()),
            Err(e) => Err(e.to_string()),
        });

        Ok(Box::pin(tokens))
    }
}

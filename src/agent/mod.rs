//! 对话 Agent 编排层
//!
//! ChatAgent 是进程级长生命周期句柄：由服务的组合根显式构造一次并注入，
//! 持有运行时（LLM + 工具 + 线程记忆）。chat_stream 把一组消息与可选页面
//! 上下文变成一个 TurnStream；status 暴露能力元数据。

pub mod bridge;
pub mod events;
pub mod reducer;
pub mod runtime;

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

pub use bridge::TurnStream;
pub use events::{AgentEvent, StreamedEvent};
pub use reducer::{TurnError, FALLBACK_REPLY};
pub use runtime::{AgentRuntime, ReactRuntime, TurnParams};

use crate::config::AppConfig;
use crate::error::AgentError;
use crate::llm::{LlmClient, QwenClient};
use crate::memory::{Message, Role, ThreadStore};
use crate::tools::{
    ReadDocTool, SearchTool, ToolExecutor, ToolRegistry, WebpageTool, WriteDocTool,
};

/// HTTP 契约不携带线程标识，所有请求汇入默认线程（与原服务一致）
pub const DEFAULT_THREAD_ID: &str = "default";

/// 基础系统提示词缺省值（config/prompts/system.md 存在时以其为准）
const DEFAULT_SYSTEM_PROMPT: &str = "\
你是一个友好、智能的AI助手，可以帮助用户解决各种问题。

你具备以下能力：
1. 📚 读取和分析文档内容（当用户需要时）
2. ✍️ 创建和修改文件（当用户需要时）
3. 🌐 提取和分析网页内容（当用户询问某个网址的内容时）
4. 🔍 搜索互联网信息
5. 💬 进行自然、友好的对话

请自然地与用户对话，根据用户的具体需求来决定是否使用工具：
- 只有当用户明确询问文档内容或需要查看特定文件时，才使用 read_document 工具
- 只有当用户明确要求创建或修改文件时，才使用 write_document 工具
- 当用户询问某个具体网址的内容时，使用 extract_webpage 工具
- 当用户需要搜索信息时，使用 search 工具
- 对于一般性的问候、闲聊或咨询，请直接友好地回应

保持对话自然流畅，不要主动提及技术细节或页面信息，除非用户特别询问。";

/// 状态端点的能力元数据
#[derive(Debug, Clone, Serialize)]
pub struct AgentStatus {
    pub provider: String,
    pub agent_type: String,
    pub tools_count: usize,
    pub features: Vec<String>,
}

/// 进程级对话 Agent 句柄
pub struct ChatAgent {
    runtime: Arc<dyn AgentRuntime>,
    status: AgentStatus,
}

/// 读取基础系统提示词：config/prompts/system.md 优先，否则用内置缺省
fn load_base_prompt() -> String {
    ["config/prompts/system.md", "../config/prompts/system.md"]
        .iter()
        .find_map(|p| std::fs::read_to_string(p).ok())
        .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string())
}

/// 基础提示词 + 可用工具清单 + 工具调用协议
fn compose_system_prompt(base: &str, tools: &[(String, String)]) -> String {
    let list: String = tools
        .iter()
        .map(|(name, desc)| format!("- {}: {}", name, desc))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "{}\n\n可用工具：\n{}\n\n调用工具时，仅输出一个 JSON 对象：{{\"tool\": \"名称\", \"args\": {{...}}}}，不要附加其他文字；直接回答时输出普通文本。",
        base, list
    )
}

impl ChatAgent {
    /// 组合根入口：按配置构建全部组件；API Key 缺失视为初始化失败
    pub fn from_config(cfg: &AppConfig) -> Result<Self, AgentError> {
        let api_key = std::env::var(&cfg.llm.api_key_env).map_err(|_| {
            AgentError::ConfigError(format!("环境变量 {} 未设置", cfg.llm.api_key_env))
        })?;
        let llm: Arc<dyn LlmClient> = Arc::new(QwenClient::new(
            cfg.llm.base_url.as_deref(),
            &cfg.llm.model,
            Some(&api_key),
        ));
        Ok(Self::with_llm(cfg, llm))
    }

    /// 注入任意 LLM 后端（测试与多后端场景）
    pub fn with_llm(cfg: &AppConfig, llm: Arc<dyn LlmClient>) -> Self {
        let mut tools = ToolRegistry::new();
        tools.register(ReadDocTool::new(&cfg.tools.docs_root));
        tools.register(WriteDocTool::new(
            &cfg.tools.staging_root,
            &cfg.tools.docs_root,
            Duration::from_secs(cfg.tools.write.commit_delay_secs),
        ));
        tools.register(WebpageTool::new(
            cfg.tools.webpage.timeout_secs,
            cfg.tools.webpage.max_result_chars,
        ));
        tools.register(SearchTool::from_config(&cfg.tools.search));

        let tools_count = tools.len();
        let system_prompt = compose_system_prompt(&load_base_prompt(), &tools.tool_descriptions());
        let executor = ToolExecutor::new(tools, cfg.tools.tool_timeout_secs);
        let threads = Arc::new(ThreadStore::new(cfg.app.max_context_turns));
        let runtime = Arc::new(ReactRuntime::new(
            llm,
            executor,
            threads,
            system_prompt,
            Duration::from_secs(cfg.app.turn_timeout_secs),
        ));

        Self {
            runtime,
            status: AgentStatus {
                provider: "ReAct Agent + 通义千问".to_string(),
                agent_type: "ReAct Agent".to_string(),
                tools_count,
                features: vec![
                    "🤖 ReAct Agent 智能对话".to_string(),
                    "📚 文档读取和分析".to_string(),
                    "✍️ 文件创建和修改".to_string(),
                    "🌐 网页内容提取".to_string(),
                    "🔍 互联网搜索".to_string(),
                    "🌊 流式输出体验".to_string(),
                    "💾 对话记忆功能".to_string(),
                ],
            },
        }
    }

    /// 发起一轮对话：取最后一条消息为用户输入，页面上下文仅拼入本轮提交
    pub fn chat_stream(&self, messages: &[Message], page_path: Option<String>) -> TurnStream {
        let user_input = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .or_else(|| messages.last())
            .map(|m| m.content.clone())
            .unwrap_or_default();

        let params = TurnParams {
            thread_id: DEFAULT_THREAD_ID.to_string(),
            user_input,
            page_path: page_path.filter(|p| !p.is_empty()),
        };
        TurnStream::spawn(self.runtime.clone(), params)
    }

    pub fn status(&self) -> &AgentStatus {
        &self.status
    }
}

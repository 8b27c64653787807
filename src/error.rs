//! Agent 错误类型
//!
//! 只有请求格式错误与生产者流失败会上升为对外可见的传输层信号；
//! 工具错误在执行器边界内转为观察文本，不经由此枚举中止整轮对话。

use thiserror::Error;

/// Agent 运行过程中可能出现的错误（LLM、解析、工具、路径逃逸等）
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("JSON parse error: {0}")]
    JsonParseError(String),

    #[error("Tool execution failed: {0}")]
    ToolExecutionFailed(String),

    #[error("Tool timeout: {0}")]
    ToolTimeout(String),

    /// LLM 请求了未注册的工具
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Path escape attempt: {0}")]
    PathEscape(String),

    /// 整轮对话超出时长上限
    #[error("Turn timeout after {0}s")]
    TurnTimeout(u64),

    #[error("Cancelled")]
    Cancelled,
}

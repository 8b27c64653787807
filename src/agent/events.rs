//! Agent 流式事件
//!
//! 运行时在一轮对话中产出的异构事件序列。封闭枚举 + 穷尽匹配，
//! 新增事件种类时编译器会在所有消费点报错，而非运行时漏分类。

use serde::Serialize;

/// 单个过程事件（可序列化，供诊断日志使用）
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// 模型产出的一段可见文本，必须原序转发
    TextFragment { text: String },
    /// 模型请求调用工具（对用户静默）
    ToolCallRequest {
        tool_name: String,
        arguments: serde_json::Value,
    },
    /// 工具返回结果（对用户静默）
    ToolResult { tool_name: String, content: String },
    /// 无法解析的工具调用片段（对用户静默）
    InvalidToolCall { reason: String },
}

/// 事件 + 产生它的推理节点标注；node 仅用于诊断，绝不外发
#[derive(Debug, Clone, Serialize)]
pub struct StreamedEvent {
    #[serde(flatten)]
    pub event: AgentEvent,
    pub node: &'static str,
}

impl StreamedEvent {
    pub fn new(event: AgentEvent, node: &'static str) -> Self {
        Self { event, node }
    }
}

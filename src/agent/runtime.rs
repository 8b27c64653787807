//! Agent 运行时
//!
//! AgentRuntime 是编排层驱动的抽象生产者：给定线程与用户输入，向通道推送
//! 类型化事件。ReactRuntime 为其具体实现：每步调用 LLM，输出要么是一个
//! JSON 工具调用（执行后把观察结果写回上下文进入下一步），要么是面向用户
//! 的最终回复（逐 Token 作为 TextFragment 转发）。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::agent::events::{AgentEvent, StreamedEvent};
use crate::error::AgentError;
use crate::llm::LlmClient;
use crate::memory::{Message, ThreadStore};
use crate::tools::ToolExecutor;

/// 单次对话内最大推理步数，防止死循环
const MAX_REACT_STEPS: usize = 20;
/// 非流式得到的整段回复按此字符数切块转发
const CHUNK_CHARS: usize = 6;
/// 工具调用 JSON 解析失败时的最大纠正次数
const MAX_PARSE_RETRIES: usize = 2;
/// 观察结果日志预览最大字符数
const OBSERVATION_PREVIEW_CHARS: usize = 200;

/// 事件来源节点标注
pub const NODE_PLANNER: &str = "planner";
pub const NODE_TOOLS: &str = "tools";

/// 一轮对话的输入
#[derive(Debug, Clone)]
pub struct TurnParams {
    pub thread_id: String,
    /// 用户原始输入（写入线程历史的版本）
    pub user_input: String,
    /// 页面上下文：仅拼接进本轮提交内容，不持久化
    pub page_path: Option<String>,
}

/// 抽象事件生产者：编排层只依赖该接口，实际推理后端在组合根注入
#[async_trait]
pub trait AgentRuntime: Send + Sync {
    /// 执行一轮对话，事件经 events 推送；正常结束（含静默轮）返回 Ok
    async fn run_turn(
        &self,
        params: &TurnParams,
        events: mpsc::UnboundedSender<StreamedEvent>,
        cancel: CancellationToken,
    ) -> Result<(), AgentError>;
}

/// LLM 输出中的工具调用
#[derive(Debug, Clone, Deserialize)]
pub struct ToolCall {
    pub tool: String,
    #[serde(default)]
    pub args: serde_json::Value,
}

/// 解析 LLM 输出：含有效 JSON 且 tool 非空则为工具调用；
/// 无 JSON 外形返回 Ok(None)（普通回复）；JSON 损坏返回 Err
pub fn parse_tool_call(output: &str) -> Result<Option<ToolCall>, AgentError> {
    let trimmed = output.trim();

    let json_str = if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        rest.find("```")
            .map(|end| rest[..end].trim())
            .unwrap_or_else(|| rest.trim())
    } else if let Some(start) = trimmed.find('{') {
        match trimmed.rfind('}') {
            Some(end) => &trimmed[start..=end],
            None => trimmed,
        }
    } else {
        return Ok(None);
    };

    let parsed: ToolCall = serde_json::from_str(json_str)
        .map_err(|e| AgentError::JsonParseError(format!("{}: {}", e, json_str)))?;

    if parsed.tool.is_empty() {
        Ok(None)
    } else {
        Ok(Some(parsed))
    }
}

/// 前缀是否仍可能是工具调用（{ 或 ``` 开头）；为真时继续缓冲而非转发
fn may_be_tool_call(probe: &str) -> bool {
    let t = probe.trim_start();
    if t.is_empty() {
        return true;
    }
    t.starts_with('{') || t.starts_with("```") || "```".starts_with(t)
}

fn send_event(tx: &mpsc::UnboundedSender<StreamedEvent>, event: AgentEvent, node: &'static str) {
    let _ = tx.send(StreamedEvent::new(event, node));
}

/// 整段文本按 CHUNK_CHARS 切块转发（保持流式契约）
fn emit_chunked(tx: &mpsc::UnboundedSender<StreamedEvent>, text: &str) {
    let chars: Vec<char> = text.chars().collect();
    for chunk in chars.chunks(CHUNK_CHARS) {
        send_event(
            tx,
            AgentEvent::TextFragment {
                text: chunk.iter().collect(),
            },
            NODE_PLANNER,
        );
    }
}

/// ReAct 风格运行时：LLM + 工具执行器 + 线程记忆
pub struct ReactRuntime {
    llm: Arc<dyn LlmClient>,
    executor: ToolExecutor,
    threads: Arc<ThreadStore>,
    system_prompt: String,
    turn_timeout: Duration,
}

impl ReactRuntime {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        executor: ToolExecutor,
        threads: Arc<ThreadStore>,
        system_prompt: String,
        turn_timeout: Duration,
    ) -> Self {
        Self {
            llm,
            executor,
            threads,
            system_prompt,
            turn_timeout,
        }
    }

    pub fn tool_count(&self) -> usize {
        self.executor.tool_count()
    }

    async fn turn_inner(
        &self,
        params: &TurnParams,
        events: &mpsc::UnboundedSender<StreamedEvent>,
        cancel: &CancellationToken,
    ) -> Result<(), AgentError> {
        let turn_id = uuid::Uuid::new_v4();
        tracing::info!(
            turn_id = %turn_id,
            thread_id = %params.thread_id,
            page_path = params.page_path.as_deref().unwrap_or(""),
            "开始处理对话轮"
        );

        // 页面上下文只进入本轮提交内容，线程历史保存原始输入
        let submitted = match params.page_path.as_deref() {
            Some(p) if !p.is_empty() => {
                format!("{}\n\n当前用户浏览的文档路径：{}", params.user_input, p)
            }
            _ => params.user_input.clone(),
        };
        self.threads
            .append(&params.thread_id, Message::user(params.user_input.clone()))
            .await;

        let mut msgs = vec![Message::system(self.system_prompt.clone())];
        msgs.extend(self.threads.history(&params.thread_id).await);
        if let Some(last) = msgs.last_mut() {
            last.content = submitted;
        }

        let mut parse_retries = 0;
        for _step in 0..MAX_REACT_STEPS {
            if cancel.is_cancelled() {
                return Err(AgentError::Cancelled);
            }

            let mut stream = self
                .llm
                .complete_stream(&msgs)
                .await
                .map_err(AgentError::LlmError)?;

            let mut full = String::new();
            let mut probe = String::new();
            let mut streaming_text = false;
            loop {
                let item = tokio::select! {
                    _ = cancel.cancelled() => return Err(AgentError::Cancelled),
                    item = stream.next() => item,
                };
                let tok = match item {
                    Some(t) => t.map_err(AgentError::LlmError)?,
                    None => break,
                };
                if tok.is_empty() {
                    continue;
                }
                full.push_str(&tok);
                if streaming_text {
                    send_event(events, AgentEvent::TextFragment { text: tok }, NODE_PLANNER);
                } else {
                    probe.push_str(&tok);
                    if !may_be_tool_call(&probe) {
                        // 确认不是工具调用，冲刷缓冲并转入逐 Token 转发
                        streaming_text = true;
                        send_event(
                            events,
                            AgentEvent::TextFragment {
                                text: probe.clone(),
                            },
                            NODE_PLANNER,
                        );
                    }
                }
            }

            if full.trim().is_empty() {
                // 静默轮：不产出任何片段，由归约器兜底
                return Ok(());
            }

            if streaming_text {
                self.threads
                    .append(&params.thread_id, Message::assistant(full))
                    .await;
                return Ok(());
            }

            match parse_tool_call(&full) {
                Ok(Some(call)) => {
                    send_event(
                        events,
                        AgentEvent::ToolCallRequest {
                            tool_name: call.tool.clone(),
                            arguments: call.args.clone(),
                        },
                        NODE_PLANNER,
                    );
                    // 工具失败收敛为观察文本，本轮继续
                    let observation = match self.executor.execute(&call.tool, call.args).await {
                        Ok(o) => o,
                        Err(e) => format!("❌ 工具执行失败：{}", e),
                    };
                    let preview: String =
                        observation.chars().take(OBSERVATION_PREVIEW_CHARS).collect();
                    tracing::debug!(tool = %call.tool, preview = %preview, "工具观察结果");
                    send_event(
                        events,
                        AgentEvent::ToolResult {
                            tool_name: call.tool.clone(),
                            content: observation.clone(),
                        },
                        NODE_TOOLS,
                    );
                    let obs = Message::tool(format!("Observation ({}): {}", call.tool, observation));
                    self.threads.append(&params.thread_id, obs.clone()).await;
                    msgs.push(obs);
                }
                Ok(None) => {
                    // JSON 外形但没有工具名，按普通回复转发
                    emit_chunked(events, &full);
                    self.threads
                        .append(&params.thread_id, Message::assistant(full))
                        .await;
                    return Ok(());
                }
                Err(e) => {
                    send_event(
                        events,
                        AgentEvent::InvalidToolCall {
                            reason: e.to_string(),
                        },
                        NODE_PLANNER,
                    );
                    if parse_retries < MAX_PARSE_RETRIES {
                        parse_retries += 1;
                        msgs.push(Message::user(format!(
                            "上次输出的 JSON 无法解析：{}。若要调用工具，请仅输出一个 JSON 对象 {{\"tool\": \"名称\", \"args\": {{...}}}}，不要附加其他文字；若直接回答，请输出普通文本。",
                            e
                        )));
                    } else {
                        // 多次纠正仍无效，按普通回复转发原文
                        emit_chunked(events, &full);
                        self.threads
                            .append(&params.thread_id, Message::assistant(full))
                            .await;
                        return Ok(());
                    }
                }
            }
        }

        let final_text = format!("达到最大步数限制（{}），请换个问法再试。", MAX_REACT_STEPS);
        emit_chunked(events, &final_text);
        self.threads
            .append(&params.thread_id, Message::assistant(final_text))
            .await;
        Ok(())
    }
}

#[async_trait]
impl AgentRuntime for ReactRuntime {
    async fn run_turn(
        &self,
        params: &TurnParams,
        events: mpsc::UnboundedSender<StreamedEvent>,
        cancel: CancellationToken,
    ) -> Result<(), AgentError> {
        let secs = self.turn_timeout.as_secs();
        match timeout(self.turn_timeout, self.turn_inner(params, &events, &cancel)).await {
            Ok(result) => result,
            Err(_) => Err(AgentError::TurnTimeout(secs)),
        }
    }
}

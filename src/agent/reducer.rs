//! 流式事件归约器
//!
//! 单趟状态过滤：逐事件分类，非空文本片段立即原序转发，工具类事件静默丢弃；
//! 整轮无产出时补一条兜底回复；生产者自身失败则转为恰好一个终止错误项。
//! 状态只有一位：本轮是否已有产出。不回溯、不重排。

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use crate::agent::events::{AgentEvent, StreamedEvent};
use crate::error::AgentError;

/// 整轮无文本产出时的兜底回复
pub const FALLBACK_REPLY: &str = "你好！我收到了你的消息。有什么可以帮助你的吗？";

/// 轮级失败：生产者中断后传给消费端的终止错误项
#[derive(Debug, Error)]
#[error("{0}")]
pub struct TurnError(pub String);

/// 归约一轮事件流为输出块流
///
/// events 关闭（生产者结束）后读取 outcome：正常且无产出补兜底块；
/// 失败则发送一个 TurnError 项并结束。消费端放弃（chunks 关闭）时直接返回。
pub async fn reduce_turn(
    mut events: mpsc::UnboundedReceiver<StreamedEvent>,
    outcome: oneshot::Receiver<Result<(), AgentError>>,
    chunks: mpsc::Sender<Result<String, TurnError>>,
) {
    let mut saw_output = false;

    while let Some(ev) = events.recv().await {
        match ev.event {
            AgentEvent::TextFragment { text } => {
                if text.is_empty() {
                    continue;
                }
                saw_output = true;
                if chunks.send(Ok(text)).await.is_err() {
                    return;
                }
            }
            AgentEvent::ToolCallRequest { tool_name, .. } => {
                tracing::info!(node = ev.node, tool = %tool_name, "工具调用（对用户静默）");
            }
            AgentEvent::ToolResult { tool_name, .. } => {
                tracing::debug!(node = ev.node, tool = %tool_name, "工具结果（对用户静默）");
            }
            AgentEvent::InvalidToolCall { reason } => {
                tracing::debug!(node = ev.node, reason = %reason, "跳过无效工具调用片段");
            }
        }
    }

    match outcome.await {
        Ok(Ok(())) => {
            if !saw_output {
                tracing::info!("本轮无有效输出，使用兜底回复");
                let _ = chunks.send(Ok(FALLBACK_REPLY.to_string())).await;
            }
        }
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "生产者失败，转为终止错误项");
            let _ = chunks
                .send(Err(TurnError(format!("❌ Agent 执行错误：{}", e))))
                .await;
        }
        Err(_) => {
            let _ = chunks
                .send(Err(TurnError("❌ Agent 任务提前终止".to_string())))
                .await;
        }
    }
}

//! 拉取式转接器
//!
//! 把一轮协作式调度的事件生产桥接为可逐个拉取的块序列。每轮 spawn 一对
//! 生产者/归约器任务（不跨轮共享），块经有界通道按产出顺序传出；
//! async 调用方用 next().await，无法挂起的调用方用 blocking_next()。
//! 丢弃 TurnStream（如客户端提前断开）即取消令牌并中止任务，
//! 不留下孤儿生产循环；write_document 的延迟提交是独立任务，不受影响。

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::agent::reducer::{reduce_turn, TurnError};
use crate::agent::runtime::{AgentRuntime, TurnParams};

/// 块通道容量：消费端停滞时对生产侧形成背压
const CHUNK_BUFFER: usize = 32;

/// 一轮对话的输出块序列（拉取端）
pub struct TurnStream {
    chunks: mpsc::Receiver<Result<String, TurnError>>,
    cancel: CancellationToken,
    producer: JoinHandle<()>,
    reducer: JoinHandle<()>,
}

impl TurnStream {
    /// 启动一轮：生产者推送事件，归约器过滤成块
    pub fn spawn(runtime: Arc<dyn AgentRuntime>, params: TurnParams) -> Self {
        let cancel = CancellationToken::new();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (outcome_tx, outcome_rx) = oneshot::channel();
        let (chunk_tx, chunk_rx) = mpsc::channel(CHUNK_BUFFER);

        let cancel_run = cancel.clone();
        let producer = tokio::spawn(async move {
            let result = runtime.run_turn(&params, event_tx, cancel_run).await;
            let _ = outcome_tx.send(result);
        });
        let reducer = tokio::spawn(reduce_turn(event_rx, outcome_rx, chunk_tx));

        Self {
            chunks: chunk_rx,
            cancel,
            producer,
            reducer,
        }
    }

    /// 拉取下一块；None 表示本轮正常结束
    pub async fn next(&mut self) -> Option<Result<String, TurnError>> {
        self.chunks.recv().await
    }

    /// 同步拉取，供无法挂起的调用方使用（不得在异步上下文内调用）
    pub fn blocking_next(&mut self) -> Option<Result<String, TurnError>> {
        self.chunks.blocking_recv()
    }
}

impl Drop for TurnStream {
    fn drop(&mut self) {
        self.cancel.cancel();
        // 任务已结束时 abort 为空操作；阻塞在外部 IO 上的生产者由此兜底回收
        self.producer.abort();
        self.reducer.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::events::{AgentEvent, StreamedEvent};
    use crate::error::AgentError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// 快速产出固定片段序列的测试运行时
    struct ScriptedRuntime {
        fragments: Vec<String>,
    }

    #[async_trait]
    impl AgentRuntime for ScriptedRuntime {
        async fn run_turn(
            &self,
            _params: &TurnParams,
            events: mpsc::UnboundedSender<StreamedEvent>,
            _cancel: CancellationToken,
        ) -> Result<(), AgentError> {
            for f in &self.fragments {
                let _ = events.send(StreamedEvent::new(
                    AgentEvent::TextFragment { text: f.clone() },
                    "planner",
                ));
            }
            Ok(())
        }
    }

    /// 持续产出直到被取消的测试运行时，计数器记录产出次数
    struct EndlessRuntime {
        emitted: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl AgentRuntime for EndlessRuntime {
        async fn run_turn(
            &self,
            _params: &TurnParams,
            events: mpsc::UnboundedSender<StreamedEvent>,
            cancel: CancellationToken,
        ) -> Result<(), AgentError> {
            loop {
                if cancel.is_cancelled() {
                    return Err(AgentError::Cancelled);
                }
                self.emitted.fetch_add(1, Ordering::SeqCst);
                let _ = events.send(StreamedEvent::new(
                    AgentEvent::TextFragment {
                        text: "块".to_string(),
                    },
                    "planner",
                ));
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        }
    }

    fn params() -> TurnParams {
        TurnParams {
            thread_id: "t".to_string(),
            user_input: "输入".to_string(),
            page_path: None,
        }
    }

    #[tokio::test]
    async fn test_pull_preserves_order_and_terminates() {
        let runtime = Arc::new(ScriptedRuntime {
            fragments: vec!["一".to_string(), "二".to_string(), "三".to_string()],
        });
        let mut turn = TurnStream::spawn(runtime, params());

        let mut got = Vec::new();
        while let Some(item) = turn.next().await {
            got.push(item.unwrap());
        }
        assert_eq!(got, vec!["一", "二", "三"]);
    }

    #[tokio::test]
    async fn test_drop_stops_producer() {
        let emitted = Arc::new(AtomicUsize::new(0));
        let runtime = Arc::new(EndlessRuntime {
            emitted: emitted.clone(),
        });
        let mut turn = TurnStream::spawn(runtime, params());

        // 消费一块后放弃
        let first = turn.next().await.unwrap().unwrap();
        assert_eq!(first, "块");
        drop(turn);

        // 生产必须停止：计数在短暂宽限后不再增长
        tokio::time::sleep(Duration::from_millis(50)).await;
        let after_drop = emitted.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(emitted.load(Ordering::SeqCst), after_drop);
    }

    #[tokio::test]
    async fn test_blocking_next_from_sync_caller() {
        let runtime = Arc::new(ScriptedRuntime {
            fragments: vec!["同步块".to_string()],
        });
        let mut turn = TurnStream::spawn(runtime, params());

        let got = tokio::task::spawn_blocking(move || {
            let mut out = Vec::new();
            while let Some(item) = turn.blocking_next() {
                out.push(item.unwrap());
            }
            out
        })
        .await
        .unwrap();
        assert_eq!(got, vec!["同步块"]);
    }
}

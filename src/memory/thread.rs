//! 会话线程记忆
//!
//! 每个 thread_id 对应一条只追加的消息序列，首次使用时隐式创建；
//! 超出保留窗口时丢弃最旧消息（保留最近 max_turns*2 条），供跨轮上下文使用。

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// 消息角色（与 LLM API 一致；tool 为工具观察结果）
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// 单条消息，追加后不可变
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn tool(content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
        }
    }
}

/// 单线程历史：只追加，超窗口时剪枝
#[derive(Clone, Debug, Default)]
struct ConversationThread {
    messages: Vec<Message>,
}

impl ConversationThread {
    fn push(&mut self, msg: Message, max_turns: usize) {
        self.messages.push(msg);
        // 每轮约 user + assistant 两条，窗口为 max_turns*2
        let keep = max_turns * 2;
        if self.messages.len() > keep {
            self.messages.drain(..self.messages.len() - keep);
        }
    }
}

/// 进程级线程存储：append / history，按 thread_id 寻址
///
/// 同一线程的顺序复用是安全的；对同一 thread_id 的并发轮次不提供顺序保证。
pub struct ThreadStore {
    threads: RwLock<HashMap<String, ConversationThread>>,
    max_turns: usize,
}

impl ThreadStore {
    pub fn new(max_turns: usize) -> Self {
        Self {
            threads: RwLock::new(HashMap::new()),
            max_turns,
        }
    }

    /// 追加一条消息，线程不存在时隐式创建
    pub async fn append(&self, thread_id: &str, msg: Message) {
        let mut threads = self.threads.write().await;
        threads
            .entry(thread_id.to_string())
            .or_default()
            .push(msg, self.max_turns);
    }

    /// 返回该线程的历史快照（按追加顺序）
    pub async fn history(&self, thread_id: &str) -> Vec<Message> {
        let threads = self.threads.read().await;
        threads
            .get(thread_id)
            .map(|t| t.messages.clone())
            .unwrap_or_default()
    }

    /// 该线程当前消息条数（不存在时为 0）
    pub async fn len(&self, thread_id: &str) -> usize {
        let threads = self.threads.read().await;
        threads.get(thread_id).map(|t| t.messages.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_append_and_history_order() {
        let store = ThreadStore::new(10);
        store.append("t1", Message::user("第一句")).await;
        store.append("t1", Message::assistant("第二句")).await;
        store.append("t1", Message::user("第三句")).await;

        let history = store.history("t1").await;
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].content, "第一句");
        assert_eq!(history[1].content, "第二句");
        assert_eq!(history[2].content, "第三句");
        assert_eq!(history[2].role, Role::User);
    }

    #[tokio::test]
    async fn test_implicit_creation_and_isolation() {
        let store = ThreadStore::new(10);
        assert!(store.history("未知线程").await.is_empty());

        store.append("a", Message::user("给 a")).await;
        store.append("b", Message::user("给 b")).await;
        assert_eq!(store.len("a").await, 1);
        assert_eq!(store.len("b").await, 1);
        assert_eq!(store.history("a").await[0].content, "给 a");
    }

    #[tokio::test]
    async fn test_prune_keeps_recent_window() {
        let store = ThreadStore::new(2);
        for i in 0..10 {
            store.append("t", Message::user(format!("消息{}", i))).await;
        }
        let history = store.history("t").await;
        assert_eq!(history.len(), 4);
        assert_eq!(history[0].content, "消息6");
        assert_eq!(history[3].content, "消息9");
    }
}

//! 对话轮集成测试：Mock LLM 驱动完整链路（运行时 -> 归约器 -> 拉取转接器）

use std::sync::Arc;
use std::time::Duration;

use hengheng::agent::{ChatAgent, ReactRuntime, TurnParams, TurnStream, FALLBACK_REPLY};
use hengheng::config::AppConfig;
use hengheng::llm::{MockLlmClient, MockScript};
use hengheng::memory::{Message, Role, ThreadStore};
use hengheng::tools::{ReadDocTool, ToolExecutor, ToolRegistry};

/// 指向临时目录的测试配置（工具不会触碰真实文档目录）
fn test_config(docs: &tempfile::TempDir, staging: &tempfile::TempDir) -> AppConfig {
    let mut cfg = AppConfig::default();
    cfg.tools.docs_root = docs.path().to_path_buf();
    cfg.tools.staging_root = staging.path().to_path_buf();
    cfg.tools.write.commit_delay_secs = 1;
    cfg
}

async fn collect(turn: &mut TurnStream) -> Vec<Result<String, String>> {
    let mut out = Vec::new();
    while let Some(item) = turn.next().await {
        out.push(item.map_err(|e| e.to_string()));
    }
    out
}

#[tokio::test]
async fn test_tool_turn_streams_only_final_reply() {
    let docs = tempfile::tempdir().unwrap();
    let staging = tempfile::tempdir().unwrap();
    std::fs::write(docs.path().join("intro.md"), "# 入门指南").unwrap();
    let cfg = test_config(&docs, &staging);

    let llm = MockLlmClient::replies(&[
        r#"{"tool": "read_document", "args": {"file_path": "/docs/intro"}}"#,
        "根据文档，这里是入门指南的内容。",
    ]);
    let agent = ChatAgent::with_llm(&cfg, Arc::new(llm));

    let messages = vec![Message::user("这篇文档讲了什么？")];
    let mut turn = agent.chat_stream(&messages, Some("/docs/intro".to_string()));
    let chunks = collect(&mut turn).await;

    // 工具调用与结果绝不出现在输出块里
    let texts: Vec<String> = chunks.into_iter().map(|r| r.unwrap()).collect();
    assert!(!texts.is_empty());
    for t in &texts {
        assert!(!t.contains("read_document"));
        assert!(!t.contains("tool"));
    }
    assert_eq!(texts.concat(), "根据文档，这里是入门指南的内容。");
}

#[tokio::test]
async fn test_silent_turn_falls_back() {
    let docs = tempfile::tempdir().unwrap();
    let staging = tempfile::tempdir().unwrap();
    let cfg = test_config(&docs, &staging);

    let agent = ChatAgent::with_llm(&cfg, Arc::new(MockLlmClient::replies(&[""])));
    let messages = vec![Message::user("嗯")];
    let mut turn = agent.chat_stream(&messages, None);
    let chunks = collect(&mut turn).await;

    let texts: Vec<String> = chunks.into_iter().map(|r| r.unwrap()).collect();
    assert_eq!(texts, vec![FALLBACK_REPLY.to_string()]);
}

#[tokio::test]
async fn test_stream_failure_yields_fragments_then_error() {
    let docs = tempfile::tempdir().unwrap();
    let staging = tempfile::tempdir().unwrap();
    let cfg = test_config(&docs, &staging);

    let llm = MockLlmClient::new(vec![MockScript::StreamError {
        tokens: vec!["你好".to_string(), "呀".to_string()],
        error: "连接被重置".to_string(),
    }]);
    let agent = ChatAgent::with_llm(&cfg, Arc::new(llm));

    let messages = vec![Message::user("在吗")];
    let mut turn = agent.chat_stream(&messages, None);
    let chunks = collect(&mut turn).await;

    // 两个真实块，随后恰好一个错误项，然后流终止
    assert_eq!(chunks.len(), 3);
    assert_eq!(chunks[0].as_ref().unwrap(), "你好");
    assert_eq!(chunks[1].as_ref().unwrap(), "呀");
    let err = chunks[2].as_ref().unwrap_err();
    assert!(err.contains("Agent 执行错误"));
    assert!(err.contains("连接被重置"));
}

#[tokio::test]
async fn test_page_context_not_persisted_in_history() {
    let docs = tempfile::tempdir().unwrap();
    let llm = MockLlmClient::replies(&["好的。"]);
    let mut registry = ToolRegistry::new();
    registry.register(ReadDocTool::new(docs.path()));
    let threads = Arc::new(ThreadStore::new(10));
    let runtime = Arc::new(ReactRuntime::new(
        Arc::new(llm),
        ToolExecutor::new(registry, 5),
        threads.clone(),
        "测试提示".to_string(),
        Duration::from_secs(30),
    ));

    let params = TurnParams {
        thread_id: "t".to_string(),
        user_input: "总结一下".to_string(),
        page_path: Some("/docs/intro".to_string()),
    };
    let mut turn = TurnStream::spawn(runtime, params);
    while turn.next().await.is_some() {}

    // 线程历史保存原始输入；页面上下文只进当轮提交，不落入历史
    let history = threads.history("t").await;
    let user_msgs: Vec<&Message> = history.iter().filter(|m| m.role == Role::User).collect();
    assert_eq!(user_msgs.len(), 1);
    assert_eq!(user_msgs[0].content, "总结一下");
    assert!(!user_msgs[0].content.contains("/docs/intro"));
    assert_eq!(history.last().unwrap().content, "好的。");
}

#[tokio::test]
async fn test_multi_turn_memory_accumulates() {
    let docs = tempfile::tempdir().unwrap();
    let staging = tempfile::tempdir().unwrap();
    let cfg = test_config(&docs, &staging);

    let llm = MockLlmClient::replies(&["第一轮回复", "第二轮回复"]);
    let agent = ChatAgent::with_llm(&cfg, Arc::new(llm));

    let mut turn = agent.chat_stream(&[Message::user("第一问")], None);
    let first: String = collect(&mut turn).await.into_iter().map(|r| r.unwrap()).collect();
    assert_eq!(first, "第一轮回复");

    let mut turn = agent.chat_stream(&[Message::user("第二问")], None);
    let second: String = collect(&mut turn).await.into_iter().map(|r| r.unwrap()).collect();
    assert_eq!(second, "第二轮回复");
}

//! 猪哼哼知识库 AI 助手服务
//!
//! 启动: cargo run --bin hengheng-chat
//! POST /api/chat 流式对话（SSE），GET /api/status 能力元数据，GET /health 存活检查。

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, HeaderName, HeaderValue, StatusCode},
    response::{
        sse::{Event, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures_util::stream;
use serde::Deserialize;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use hengheng::agent::ChatAgent;
use hengheng::config::load_config;
use hengheng::memory::{Message, Role};

struct AppState {
    /// 组合根一次性构造；失败保留错误文本供 /api/status 报告
    agent: Result<Arc<ChatAgent>, String>,
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    #[serde(default)]
    messages: Vec<IncomingMessage>,
    #[serde(default, rename = "pagePath")]
    page_path: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IncomingMessage {
    #[serde(default)]
    role: String,
    #[serde(default)]
    content: String,
}

fn to_message(m: &IncomingMessage) -> Message {
    let role = match m.role.as_str() {
        "assistant" => Role::Assistant,
        "system" => Role::System,
        "tool" => Role::Tool,
        _ => Role::User,
    };
    Message {
        role,
        content: m.content.clone(),
    }
}

fn error_json(status: StatusCode, error: &str) -> Response {
    (
        status,
        Json(serde_json::json!({ "success": false, "error": error })),
    )
        .into_response()
}

/// POST /api/chat：流式对话
///
/// 每块 `data: {"content": ...}`，正常结束 `data: [DONE]`；流内失败以
/// `data: {"error": ...}` 顶替一块并直接结束。消息列表为空属于请求格式
/// 错误，在开流前以顶层 JSON 拒绝。
async fn api_chat(State(state): State<Arc<AppState>>, Json(req): Json<ChatRequest>) -> Response {
    if req.messages.is_empty() {
        return error_json(StatusCode::INTERNAL_SERVER_ERROR, "消息列表为空");
    }
    let agent = match &state.agent {
        Ok(a) => Arc::clone(a),
        Err(e) => return error_json(StatusCode::INTERNAL_SERVER_ERROR, e),
    };

    let messages: Vec<Message> = req.messages.iter().map(to_message).collect();
    let turn = agent.chat_stream(&messages, req.page_path);

    let stream = stream::unfold((turn, false), |(mut turn, done)| async move {
        if done {
            return None;
        }
        match turn.next().await {
            Some(Ok(chunk)) => {
                let payload = serde_json::json!({ "content": chunk }).to_string();
                Some((
                    Ok::<_, Infallible>(Event::default().data(payload)),
                    (turn, false),
                ))
            }
            Some(Err(e)) => {
                let payload = serde_json::json!({ "error": e.to_string() }).to_string();
                Some((Ok(Event::default().data(payload)), (turn, true)))
            }
            None => Some((Ok(Event::default().data("[DONE]")), (turn, true))),
        }
    });

    let mut res = Sse::new(stream).into_response();
    // 禁止缓存与中间层缓冲，保证逐块送达
    res.headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    res.headers_mut().insert(
        HeaderName::from_static("x-accel-buffering"),
        HeaderValue::from_static("no"),
    );
    res
}

fn no_cache_headers(res: &mut Response) {
    res.headers_mut().insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-cache, no-store, must-revalidate"),
    );
    res.headers_mut()
        .insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    res.headers_mut()
        .insert(header::EXPIRES, HeaderValue::from_static("0"));
}

/// GET /api/status：能力元数据；初始化失败时报告错误并返回 500
async fn api_status(State(state): State<Arc<AppState>>) -> Response {
    let mut res = match &state.agent {
        Ok(agent) => {
            let s = agent.status();
            Json(serde_json::json!({
                "provider": s.provider,
                "configured": true,
                "agent_type": s.agent_type,
                "tools_count": s.tools_count,
                "features": s.features,
            }))
            .into_response()
        }
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({
                "provider": "Agent 初始化失败",
                "configured": false,
                "error": e,
            })),
        )
            .into_response(),
    };
    no_cache_headers(&mut res);
    res
}

/// GET /health：存活检查
async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let agent_status = if state.agent.is_ok() { "active" } else { "error" };
    Json(serde_json::json!({
        "service": "Hengheng AI Agent Service",
        "status": "healthy",
        "agent_status": agent_status,
    }))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .with(fmt::layer())
        .init();

    let cfg = load_config(None).unwrap_or_default();

    let agent = match ChatAgent::from_config(&cfg) {
        Ok(a) => Ok(Arc::new(a)),
        Err(e) => {
            tracing::error!(error = %e, "Agent 初始化失败，/api/chat 将不可用");
            Err(e.to_string())
        }
    };
    let state = Arc::new(AppState { agent });

    let app = Router::new()
        .route("/api/chat", post(api_chat))
        .route("/api/status", get(api_status))
        .route("/health", get(health))
        .with_state(state);

    let addr = cfg.server.chat_addr.clone();
    tracing::info!("🤖 AI Agent 服务启动: http://{}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

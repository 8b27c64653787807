//! 猪哼哼知识库文件管理服务
//!
//! 启动: cargo run --bin hengheng-files
//! /api/files/tree 文件树，/api/files/{read,write,create,delete,rename} CRUD，/health 存活检查。
//! 所有操作先经沙箱路径校验，再触碰文件系统。

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use hengheng::config::load_config;
use hengheng::files::{EntryKind, FileError, FileManager, Workspace};

struct AppState {
    fm: FileManager,
}

fn default_workspace() -> String {
    "docs".to_string()
}

#[derive(Debug, Deserialize)]
struct TreeQuery {
    #[serde(default = "default_workspace")]
    workspace: String,
}

#[derive(Debug, Deserialize)]
struct PathRequest {
    #[serde(default = "default_workspace")]
    workspace: String,
    #[serde(default)]
    path: String,
}

#[derive(Debug, Deserialize)]
struct WriteRequest {
    #[serde(default = "default_workspace")]
    workspace: String,
    #[serde(default)]
    path: String,
    #[serde(default)]
    content: String,
}

fn default_entry_type() -> String {
    "file".to_string()
}

#[derive(Debug, Deserialize)]
struct CreateRequest {
    #[serde(default = "default_workspace")]
    workspace: String,
    #[serde(default)]
    path: String,
    #[serde(default = "default_entry_type", rename = "type")]
    entry_type: String,
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct RenameRequest {
    #[serde(default = "default_workspace")]
    workspace: String,
    #[serde(default, rename = "oldPath")]
    old_path: String,
    #[serde(default, rename = "newPath")]
    new_path: String,
}

/// 错误 -> HTTP 状态码：路径/冲突类 400，缺失类 404，其余 500
fn error_status(e: &FileError) -> StatusCode {
    match e {
        FileError::UnsafePath | FileError::AlreadyExists | FileError::TargetExists => {
            StatusCode::BAD_REQUEST
        }
        FileError::FileNotFound | FileError::EntryNotFound | FileError::SourceNotFound => {
            StatusCode::NOT_FOUND
        }
        FileError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(e: FileError) -> Response {
    (
        error_status(&e),
        Json(serde_json::json!({ "success": false, "error": e.to_string() })),
    )
        .into_response()
}

/// GET /api/files/tree?workspace=docs|blog
async fn api_tree(State(state): State<Arc<AppState>>, Query(q): Query<TreeQuery>) -> Response {
    let ws = Workspace::parse(&q.workspace);
    let tree = state.fm.tree(ws);
    Json(serde_json::json!({
        "success": true,
        "tree": tree,
        "workspace": ws.tag(),
    }))
    .into_response()
}

/// POST /api/files/read
async fn api_read(State(state): State<Arc<AppState>>, Json(req): Json<PathRequest>) -> Response {
    let ws = Workspace::parse(&req.workspace);
    match state.fm.read(ws, &req.path) {
        Ok(content) => Json(serde_json::json!({
            "success": true,
            "content": content,
            "path": req.path,
        }))
        .into_response(),
        Err(e) => error_response(e),
    }
}

/// POST /api/files/write
async fn api_write(State(state): State<Arc<AppState>>, Json(req): Json<WriteRequest>) -> Response {
    let ws = Workspace::parse(&req.workspace);
    match state.fm.write(ws, &req.path, &req.content) {
        Ok(()) => Json(serde_json::json!({
            "success": true,
            "message": "文件保存成功",
            "path": req.path,
        }))
        .into_response(),
        Err(e) => error_response(e),
    }
}

/// POST /api/files/create
async fn api_create(State(state): State<Arc<AppState>>, Json(req): Json<CreateRequest>) -> Response {
    let ws = Workspace::parse(&req.workspace);
    let kind = EntryKind::parse(&req.entry_type);
    match state.fm.create(ws, &req.path, kind, &req.content) {
        Ok(message) => Json(serde_json::json!({
            "success": true,
            "message": message,
            "path": req.path,
        }))
        .into_response(),
        Err(e) => error_response(e),
    }
}

/// POST /api/files/delete
async fn api_delete(State(state): State<Arc<AppState>>, Json(req): Json<PathRequest>) -> Response {
    let ws = Workspace::parse(&req.workspace);
    match state.fm.delete(ws, &req.path) {
        Ok(message) => Json(serde_json::json!({
            "success": true,
            "message": message,
            "path": req.path,
        }))
        .into_response(),
        Err(e) => error_response(e),
    }
}

/// POST /api/files/rename
async fn api_rename(State(state): State<Arc<AppState>>, Json(req): Json<RenameRequest>) -> Response {
    let ws = Workspace::parse(&req.workspace);
    match state.fm.rename(ws, &req.old_path, &req.new_path) {
        Ok(()) => Json(serde_json::json!({
            "success": true,
            "message": "重命名成功",
            "oldPath": req.old_path,
            "newPath": req.new_path,
        }))
        .into_response(),
        Err(e) => error_response(e),
    }
}

/// GET /health：存活检查
async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "service": "File Management Service",
        "status": "healthy",
        "workspaces": ["docs", "blog"],
    }))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .with(fmt::layer())
        .init();

    let cfg = load_config(None).unwrap_or_default();
    let state = Arc::new(AppState {
        fm: FileManager::new(&cfg.files.docs_root, &cfg.files.blog_root),
    });

    let app = Router::new()
        .route("/api/files/tree", get(api_tree))
        .route("/api/files/read", post(api_read))
        .route("/api/files/write", post(api_write))
        .route("/api/files/create", post(api_create))
        .route("/api/files/delete", post(api_delete))
        .route("/api/files/rename", post(api_rename))
        .route("/health", get(health))
        .with_state(state);

    let addr = cfg.server.files_addr.clone();
    tracing::info!("📁 文件管理服务启动: http://{}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

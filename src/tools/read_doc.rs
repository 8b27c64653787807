//! 文档读取工具
//!
//! 把用户页面路径（可能 URL 编码、可能带 /docs/ 前缀）归一化为文档根目录下的
//! 相对路径，缺省补 .md 扩展名后读取。按契约，找不到文件等失败以普通文本返回
//! （而非 Err），让 LLM 能把失败当作对话内容转述给用户。

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use percent_encoding::percent_decode_str;
use serde_json::Value;

use crate::tools::Tool;

/// 文档读取工具：绑定知识库文档根目录
pub struct ReadDocTool {
    docs_root: PathBuf,
}

/// 归一化文档路径：URL 解码 -> 去首尾空白 -> 去 /docs/ 或 docs/ 前缀 ->
/// 去首尾斜杠 -> 缺 .md 时补上
pub fn normalize_doc_path(raw: &str) -> String {
    let decoded = percent_decode_str(raw)
        .decode_utf8()
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| raw.to_string());
    let trimmed = decoded.trim();

    let rel = trimmed
        .strip_prefix("/docs/")
        .or_else(|| trimmed.strip_prefix("docs/"))
        .unwrap_or(trimmed);
    let rel = rel.trim_start_matches('/').trim_end_matches('/');

    let mut path = rel.to_string();
    if !path.ends_with(".md") {
        path.push_str(".md");
    }
    path
}

impl ReadDocTool {
    pub fn new(docs_root: impl AsRef<Path>) -> Self {
        Self {
            docs_root: docs_root.as_ref().to_path_buf(),
        }
    }

    /// 归一化并校验在文档根目录内；含 .. 的路径视同不存在
    fn resolve(&self, raw: &str) -> Result<PathBuf, String> {
        let rel = normalize_doc_path(raw);
        let rel_path = Path::new(&rel);
        if rel_path
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(rel);
        }
        Ok(self.docs_root.join(rel_path))
    }
}

#[async_trait]
impl Tool for ReadDocTool {
    fn name(&self) -> &str {
        "read_document"
    }

    fn description(&self) -> &str {
        "读取知识库文档内容（用户当前浏览的文档或任意文档路径）。Args: {\"file_path\": \"/docs/xxx 或相对路径，可省略 .md\"}"
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let raw = args
            .get("file_path")
            .and_then(|v| v.as_str())
            .ok_or("Missing file_path")?;

        let full_path = match self.resolve(raw) {
            Ok(p) => p,
            Err(rel) => return Ok(format!("文件未找到：{}", rel)),
        };
        tracing::info!(path = %full_path.display(), "read_document");

        match std::fs::read_to_string(&full_path) {
            Ok(content) => Ok(format!("文件内容：\n\n{}", content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Ok(format!("文件未找到：{}", full_path.display()))
            }
            Err(e) => Ok(format!("读取文件时出错：{}", e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_equivalent_forms() {
        // /docs/intro、docs/intro、intro 归一到同一路径
        assert_eq!(normalize_doc_path("/docs/intro"), "intro.md");
        assert_eq!(normalize_doc_path("docs/intro"), "intro.md");
        assert_eq!(normalize_doc_path("intro"), "intro.md");
        assert_eq!(normalize_doc_path("/docs/intro/"), "intro.md");
    }

    #[test]
    fn test_normalize_url_encoded_and_extension() {
        assert_eq!(normalize_doc_path("/docs/rust%20notes"), "rust notes.md");
        assert_eq!(normalize_doc_path("%E6%96%87%E6%A1%A3"), "文档.md");
        assert_eq!(normalize_doc_path("guide/setup.md"), "guide/setup.md");
    }

    #[tokio::test]
    async fn test_read_existing_and_missing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("intro.md"), "# 入门").unwrap();
        let tool = ReadDocTool::new(dir.path());

        for raw in ["/docs/intro", "docs/intro", "intro"] {
            let out = tool
                .execute(serde_json::json!({ "file_path": raw }))
                .await
                .unwrap();
            assert_eq!(out, "文件内容：\n\n# 入门");
        }

        // 不存在的文件：以普通文本报告，而非 Err
        let out = tool
            .execute(serde_json::json!({ "file_path": "没有这篇" }))
            .await
            .unwrap();
        assert!(out.starts_with("文件未找到："));
    }

    #[tokio::test]
    async fn test_escape_reported_as_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let tool = ReadDocTool::new(dir.path());
        let out = tool
            .execute(serde_json::json!({ "file_path": "../../etc/passwd" }))
            .await
            .unwrap();
        assert!(out.starts_with("文件未找到："));
    }
}

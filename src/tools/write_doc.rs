//! 文档写入工具（暂存提交）
//!
//! 立即写入暂存目录并返回确认，再由独立后台任务在固定延迟后移动到文档根目录，
//! 避免可见的文件系统变化打断仍在进行的对话轮。后台提交不绑定请求生命周期，
//! 客户端提前断开不会取消待提交的移动；提交失败仅记录日志（届时已无调用方在等待）。
//! 返回的确认描述最终路径、报告暂存大小，调用方应将其视为最终一致而非立即落盘。

use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::tools::Tool;

/// 文档写入工具：暂存目录 + 最终目录 + 提交延迟
pub struct WriteDocTool {
    staging_root: PathBuf,
    docs_root: PathBuf,
    commit_delay: Duration,
}

impl WriteDocTool {
    pub fn new(
        staging_root: impl AsRef<Path>,
        docs_root: impl AsRef<Path>,
        commit_delay: Duration,
    ) -> Self {
        Self {
            staging_root: staging_root.as_ref().to_path_buf(),
            docs_root: docs_root.as_ref().to_path_buf(),
            commit_delay,
        }
    }

    /// 校验文件名为纯相对路径（禁止 .. 与绝对路径），缺 .md 时补上
    fn sanitize_name(file_name: &str) -> Result<PathBuf, String> {
        let mut name = file_name.trim().to_string();
        if name.is_empty() {
            return Err("文件名为空".to_string());
        }
        if !name.ends_with(".md") {
            name.push_str(".md");
        }
        let path = PathBuf::from(&name);
        if path
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(format!("非法的文件名：{}", file_name));
        }
        Ok(path)
    }
}

/// 延迟后把暂存文件移动到最终位置；跨设备 rename 失败时退化为复制+删除
async fn delayed_commit(staged: PathBuf, final_path: PathBuf, delay: Duration) {
    tokio::time::sleep(delay).await;

    if let Some(parent) = final_path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            tracing::warn!(path = %parent.display(), error = %e, "创建最终目录失败");
            return;
        }
    }
    let moved = std::fs::rename(&staged, &final_path).or_else(|_| {
        std::fs::copy(&staged, &final_path)
            .and_then(|_| std::fs::remove_file(&staged))
            .map(|_| ())
    });
    match moved {
        Ok(()) => tracing::info!(path = %final_path.display(), "文件已移动到最终位置"),
        Err(e) => tracing::warn!(path = %final_path.display(), error = %e, "延迟移动文件失败"),
    }
}

#[async_trait]
impl Tool for WriteDocTool {
    fn name(&self) -> &str {
        "write_document"
    }

    fn description(&self) -> &str {
        "创建或修改 Markdown 文档（延迟几秒后出现在文档目录）。Args: {\"file_name\": \"名称，可省略 .md\", \"content\": \"文档内容\"}"
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let file_name = args
            .get("file_name")
            .and_then(|v| v.as_str())
            .ok_or("Missing file_name")?;
        let content = args
            .get("content")
            .and_then(|v| v.as_str())
            .ok_or("Missing content")?;

        let rel = Self::sanitize_name(file_name)?;
        let staged = self.staging_root.join(&rel);
        let final_path = self.docs_root.join(&rel);

        if let Some(parent) = staged.parent() {
            std::fs::create_dir_all(parent).map_err(|e| format!("创建暂存目录失败：{}", e))?;
        }
        std::fs::write(&staged, content).map_err(|e| format!("写入文件时发生错误：{}", e))?;
        let staged_size = content.len();
        tracing::info!(path = %staged.display(), size = staged_size, "文件已写入暂存目录");

        // 独立后台任务：不随本轮取消，提交失败只记日志
        tokio::spawn(delayed_commit(staged, final_path.clone(), self.commit_delay));

        Ok(format!(
            "✅ 文件创建成功！\n📄 文件名: {}\n📍 路径: {}\n📊 大小: {} 字节\n💾 编码: UTF-8\n\n💡 提示：文件将在几秒后出现在文档目录中，避免打断当前对话。",
            rel.display(),
            final_path.display(),
            staged_size
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_staged_then_committed_after_delay() {
        let staging = tempfile::tempdir().unwrap();
        let docs = tempfile::tempdir().unwrap();
        let tool = WriteDocTool::new(staging.path(), docs.path(), Duration::from_millis(100));

        let out = tool
            .execute(serde_json::json!({ "file_name": "note", "content": "hello" }))
            .await
            .unwrap();

        // 确认立即返回：引用最终路径并报告暂存大小
        let final_path = docs.path().join("note.md");
        assert!(out.contains(&final_path.display().to_string()));
        assert!(out.contains("5 字节"));

        // 延迟窗口内：暂存已有，最终位置还没有
        assert!(staging.path().join("note.md").exists());
        assert!(!final_path.exists());

        // 延迟过后：已提交到最终位置，暂存清空
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(std::fs::read_to_string(&final_path).unwrap(), "hello");
        assert!(!staging.path().join("note.md").exists());
    }

    #[tokio::test]
    async fn test_md_extension_and_subdir() {
        let staging = tempfile::tempdir().unwrap();
        let docs = tempfile::tempdir().unwrap();
        let tool = WriteDocTool::new(staging.path(), docs.path(), Duration::from_millis(10));

        tool.execute(serde_json::json!({ "file_name": "rust/开篇", "content": "x" }))
            .await
            .unwrap();
        assert!(staging.path().join("rust/开篇.md").exists());
    }

    #[tokio::test]
    async fn test_rejects_escaping_name() {
        let staging = tempfile::tempdir().unwrap();
        let docs = tempfile::tempdir().unwrap();
        let tool = WriteDocTool::new(staging.path(), docs.path(), Duration::from_millis(10));

        let err = tool
            .execute(serde_json::json!({ "file_name": "../逃逸", "content": "x" }))
            .await
            .unwrap_err();
        assert!(err.contains("非法的文件名"));
    }
}

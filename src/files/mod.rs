//! 文件管理：docs / blog 双工作区的沙箱 CRUD
//!
//! 所有用户路径先做词法清洗（拒绝绝对路径与 .. 分量），已存在的路径再经
//! canonicalize 校验仍在工作区根之下（防符号链接逃逸），之后才触碰文件系统。

use std::path::{Component, Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

/// 文件操作错误；Display 文本即对外错误消息
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FileError {
    #[error("非法的文件路径")]
    UnsafePath,
    #[error("文件不存在")]
    FileNotFound,
    #[error("文件或文件夹不存在")]
    EntryNotFound,
    #[error("源文件或文件夹不存在")]
    SourceNotFound,
    #[error("文件或文件夹已存在")]
    AlreadyExists,
    #[error("目标文件或文件夹已存在")]
    TargetExists,
    #[error("IO 错误：{0}")]
    Io(String),
}

/// 工作区标签；与原服务一致，非 "blog" 一律落到 docs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Workspace {
    Docs,
    Blog,
}

impl Workspace {
    pub fn parse(tag: &str) -> Self {
        if tag == "blog" {
            Workspace::Blog
        } else {
            Workspace::Docs
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            Workspace::Docs => "docs",
            Workspace::Blog => "blog",
        }
    }
}

/// 文件树节点
#[derive(Debug, Clone, Serialize)]
pub struct TreeNode {
    pub name: String,
    pub path: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<TreeNode>>,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Folder,
    File,
}

/// 创建类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Folder,
}

impl EntryKind {
    pub fn parse(tag: &str) -> Self {
        if tag == "folder" {
            EntryKind::Folder
        } else {
            EntryKind::File
        }
    }
}

/// 词法清洗：仅允许普通分量，拒绝绝对路径、.. 与盘符
fn sanitize(user_path: &str) -> Result<PathBuf, FileError> {
    let p = Path::new(user_path);
    if p.is_absolute() {
        return Err(FileError::UnsafePath);
    }
    let mut clean = PathBuf::new();
    for comp in p.components() {
        match comp {
            Component::Normal(c) => clean.push(c),
            Component::CurDir => {}
            _ => return Err(FileError::UnsafePath),
        }
    }
    Ok(clean)
}

/// 双工作区文件管理器
pub struct FileManager {
    docs_root: PathBuf,
    blog_root: PathBuf,
}

impl FileManager {
    pub fn new(docs_root: impl AsRef<Path>, blog_root: impl AsRef<Path>) -> Self {
        Self {
            docs_root: docs_root.as_ref().to_path_buf(),
            blog_root: blog_root.as_ref().to_path_buf(),
        }
    }

    fn root(&self, ws: Workspace) -> &Path {
        match ws {
            Workspace::Docs => &self.docs_root,
            Workspace::Blog => &self.blog_root,
        }
    }

    /// 解析用户路径为工作区内的完整路径；任何逃逸尝试报 UnsafePath
    pub fn resolve(&self, ws: Workspace, user_path: &str) -> Result<PathBuf, FileError> {
        let root = self.root(ws);
        let full = root.join(sanitize(user_path)?);
        // 已存在的路径再校验 canonicalize 后仍在根下
        if let Ok(canon) = full.canonicalize() {
            let root_canon = root
                .canonicalize()
                .unwrap_or_else(|_| root.to_path_buf());
            if !canon.starts_with(&root_canon) {
                return Err(FileError::UnsafePath);
            }
        }
        Ok(full)
    }

    /// 构建文件树：跳过隐藏项，按名称排序，文件夹携带 children
    pub fn tree(&self, ws: Workspace) -> Vec<TreeNode> {
        let root = self.root(ws);
        std::fs::create_dir_all(root).ok();
        build_tree(root, "")
    }

    pub fn read(&self, ws: Workspace, path: &str) -> Result<String, FileError> {
        let full = self.resolve(ws, path)?;
        if !full.is_file() {
            return Err(FileError::FileNotFound);
        }
        std::fs::read_to_string(&full).map_err(|e| FileError::Io(e.to_string()))
    }

    pub fn write(&self, ws: Workspace, path: &str, content: &str) -> Result<(), FileError> {
        let full = self.resolve(ws, path)?;
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent).map_err(|e| FileError::Io(e.to_string()))?;
        }
        std::fs::write(&full, content).map_err(|e| FileError::Io(e.to_string()))
    }

    /// 创建文件或文件夹；已存在时报错，返回对外提示语
    pub fn create(
        &self,
        ws: Workspace,
        path: &str,
        kind: EntryKind,
        content: &str,
    ) -> Result<&'static str, FileError> {
        let full = self.resolve(ws, path)?;
        if full.exists() {
            return Err(FileError::AlreadyExists);
        }
        match kind {
            EntryKind::Folder => {
                std::fs::create_dir_all(&full).map_err(|e| FileError::Io(e.to_string()))?;
                Ok("文件夹创建成功")
            }
            EntryKind::File => {
                if let Some(parent) = full.parent() {
                    std::fs::create_dir_all(parent).map_err(|e| FileError::Io(e.to_string()))?;
                }
                std::fs::write(&full, content).map_err(|e| FileError::Io(e.to_string()))?;
                Ok("文件创建成功")
            }
        }
    }

    /// 删除文件或文件夹，返回对外提示语
    pub fn delete(&self, ws: Workspace, path: &str) -> Result<&'static str, FileError> {
        let full = self.resolve(ws, path)?;
        if !full.exists() {
            return Err(FileError::EntryNotFound);
        }
        if full.is_dir() {
            std::fs::remove_dir_all(&full).map_err(|e| FileError::Io(e.to_string()))?;
            Ok("文件夹删除成功")
        } else {
            std::fs::remove_file(&full).map_err(|e| FileError::Io(e.to_string()))?;
            Ok("文件删除成功")
        }
    }

    pub fn rename(&self, ws: Workspace, old_path: &str, new_path: &str) -> Result<(), FileError> {
        let old_full = self.resolve(ws, old_path)?;
        let new_full = self.resolve(ws, new_path)?;
        if !old_full.exists() {
            return Err(FileError::SourceNotFound);
        }
        if new_full.exists() {
            return Err(FileError::TargetExists);
        }
        if let Some(parent) = new_full.parent() {
            std::fs::create_dir_all(parent).map_err(|e| FileError::Io(e.to_string()))?;
        }
        std::fs::rename(&old_full, &new_full).map_err(|e| FileError::Io(e.to_string()))
    }
}

fn build_tree(root: &Path, current: &str) -> Vec<TreeNode> {
    let full = if current.is_empty() {
        root.to_path_buf()
    } else {
        root.join(current)
    };
    let entries = match std::fs::read_dir(&full) {
        Ok(rd) => rd,
        Err(e) => {
            tracing::warn!(path = %full.display(), error = %e, "读取目录失败");
            return Vec::new();
        }
    };

    let mut names: Vec<String> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().to_string())
        .filter(|n| !n.starts_with('.'))
        .collect();
    names.sort();

    let mut tree = Vec::new();
    for name in names {
        let item_path = if current.is_empty() {
            name.clone()
        } else {
            format!("{}/{}", current, name)
        };
        let full_item = root.join(&item_path);
        if full_item.is_dir() {
            tree.push(TreeNode {
                name,
                path: item_path.clone(),
                kind: NodeKind::Folder,
                children: Some(build_tree(root, &item_path)),
            });
        } else {
            tree.push(TreeNode {
                name,
                path: item_path,
                kind: NodeKind::File,
                children: None,
            });
        }
    }
    tree
}

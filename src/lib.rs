//! Hengheng - 猪哼哼知识库后端
//!
//! 模块划分：
//! - **agent**: 流式对话编排（事件、运行时、归约器、拉取转接器）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **error**: Agent 错误类型
//! - **files**: docs/blog 双工作区的沙箱文件管理
//! - **llm**: LLM 客户端抽象与实现（通义千问 / Mock）
//! - **memory**: 按线程寻址的对话记忆
//! - **tools**: 工具箱（read_document、write_document、extract_webpage、search）与执行器

pub mod agent;
pub mod config;
pub mod error;
pub mod files;
pub mod llm;
pub mod memory;
pub mod tools;

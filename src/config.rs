//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `HH__*` 覆盖（双下划线表示嵌套，如 `HH__LLM__MODEL=qwen-plus`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppSection,
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub tools: ToolsSection,
    #[serde(default)]
    pub files: FilesSection,
    #[serde(default)]
    pub server: ServerSection,
}

/// [app] 段：应用名、对话轮数上限、整轮超时
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppSection {
    pub name: Option<String>,
    /// 每个会话线程保留的对话轮数（短期记忆窗口）
    #[serde(default = "default_max_context_turns")]
    pub max_context_turns: usize,
    /// 单轮对话总超时（秒）
    #[serde(default = "default_turn_timeout_secs")]
    pub turn_timeout_secs: u64,
}

fn default_max_context_turns() -> usize {
    50
}

fn default_turn_timeout_secs() -> u64 {
    300
}

/// [llm] 段：OpenAI 兼容端点（默认 DashScope 通义千问）
#[derive(Debug, Clone, Deserialize, Default)]
pub struct LlmSection {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// 不设置时使用 DashScope 兼容模式端点
    pub base_url: Option<String>,
    /// 存放 API Key 的环境变量名
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

fn default_provider() -> String {
    "qwen".to_string()
}

fn default_model() -> String {
    "qwen-max".to_string()
}

fn default_api_key_env() -> String {
    "DASHSCOPE_API_KEY".to_string()
}

/// [tools] 段：文档根目录、暂存目录、单次工具调用超时与各工具子配置
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ToolsSection {
    /// 知识库文档根目录（read_document 的查找范围、write_document 的最终位置）
    #[serde(default = "default_docs_root")]
    pub docs_root: PathBuf,
    /// write_document 的暂存目录，延迟提交前文件停留在此
    #[serde(default = "default_staging_root")]
    pub staging_root: PathBuf,
    /// 单次工具调用超时（秒）
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
    #[serde(default)]
    pub write: WriteSection,
    #[serde(default)]
    pub webpage: WebpageSection,
    #[serde(default)]
    pub search: SearchSection,
}

fn default_docs_root() -> PathBuf {
    PathBuf::from("../docs")
}

fn default_staging_root() -> PathBuf {
    PathBuf::from("../temp_docs")
}

fn default_tool_timeout_secs() -> u64 {
    30
}

/// [tools.write] 段：暂存提交延迟
#[derive(Debug, Clone, Deserialize, Default)]
pub struct WriteSection {
    /// 暂存文件移动到最终位置前等待的秒数（避免打断进行中的回复）
    #[serde(default = "default_commit_delay_secs")]
    pub commit_delay_secs: u64,
}

fn default_commit_delay_secs() -> u64 {
    8
}

/// [tools.webpage] 段：网页抓取超时与结果大小限制
#[derive(Debug, Clone, Deserialize, Default)]
pub struct WebpageSection {
    #[serde(default = "default_webpage_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_result_chars")]
    pub max_result_chars: usize,
}

fn default_webpage_timeout_secs() -> u64 {
    15
}

fn default_max_result_chars() -> usize {
    8000
}

/// [tools.search] 段：搜索 API 配置
#[derive(Debug, Clone, Deserialize, Default)]
pub struct SearchSection {
    /// 存放 Tavily API Key 的环境变量名
    #[serde(default = "default_search_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default = "default_search_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_search_api_key_env() -> String {
    "TAVILY_API_KEY".to_string()
}

fn default_max_results() -> usize {
    2
}

fn default_search_timeout_secs() -> u64 {
    15
}

/// [files] 段：文件管理服务的两个工作区根目录
#[derive(Debug, Clone, Deserialize, Default)]
pub struct FilesSection {
    #[serde(default = "default_docs_root")]
    pub docs_root: PathBuf,
    #[serde(default = "default_blog_root")]
    pub blog_root: PathBuf,
}

fn default_blog_root() -> PathBuf {
    PathBuf::from("../blog")
}

/// [server] 段：两个服务的监听地址
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ServerSection {
    #[serde(default = "default_chat_addr")]
    pub chat_addr: String,
    #[serde(default = "default_files_addr")]
    pub files_addr: String,
}

fn default_chat_addr() -> String {
    "0.0.0.0:5005".to_string()
}

fn default_files_addr() -> String {
    "0.0.0.0:5006".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app: AppSection::default(),
            llm: LlmSection::default(),
            tools: ToolsSection::default(),
            files: FilesSection::default(),
            server: ServerSection::default(),
        }
    }
}

/// 从 config 目录加载配置，环境变量 HH__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 HH__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("HH")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_sections() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.llm.model, "qwen-max");
        assert_eq!(cfg.tools.write.commit_delay_secs, 8);
        assert_eq!(cfg.tools.search.max_results, 2);
        assert_eq!(cfg.server.chat_addr, "0.0.0.0:5005");
    }
}
